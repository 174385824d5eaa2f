//! Keyword candidate generation strategies.
//!
//! Each strategy is a pure function from the mined insights (and the
//! set of already-known keywords) to a list of proposals; the engine
//! runs them through a shared dedup before persisting.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use lazy_static::lazy_static;
use parking_lot::Mutex;
use regex::Regex;
use tracing::{info, warn};

use super::analyzer::{KeywordInsights, KNOWN_BRANDS};
use crate::matcher::{extract_model_numbers_from_text, extract_product_info, is_apparel,
    keywords_are_similar};
use crate::keepa::KeepaProduct;
use crate::scraper::AuctionScraper;
use crate::store::Store;

/// A proposed keyword with its generation provenance.
#[derive(Debug, Clone)]
pub struct CandidateProposal {
    pub keyword: String,
    pub strategy: &'static str,
    pub confidence: f64,
    pub parent_keyword_id: Option<i64>,
    pub reasoning: String,
}

lazy_static! {
    /// English ↔ katakana product nouns for synonym generation.
    static ref SYNONYM_MAP: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("switch", "スイッチ");
        m.insert("card", "カード");
        m.insert("game", "ゲーム");
        m.insert("controller", "コントローラー");
        m.insert("camera", "カメラ");
        m.insert("headphone", "ヘッドホン");
        m.insert("speaker", "スピーカー");
        m.insert("figure", "フィギュア");
        m.insert("model", "モデル");
        m.insert("watch", "ウォッチ");
        m.insert("tablet", "タブレット");
        m.insert("printer", "プリンター");
        m.insert("lens", "レンズ");
        m.insert("monitor", "モニター");
        m.insert("keyboard", "キーボード");
        m.insert("mouse", "マウス");
        m.insert("router", "ルーター");
        m.insert("drone", "ドローン");
        m.insert("robot", "ロボット");
        m
    };

    /// Common console abbreviations and their searchable long forms.
    static ref ABBREVIATION_MAP: HashMap<&'static str, &'static str> = {
        let mut m = HashMap::new();
        m.insert("ps5", "PlayStation 5");
        m.insert("ps4", "PlayStation 4");
        m.insert("ps3", "PlayStation 3");
        m.insert("ps2", "PlayStation 2");
        m.insert("3ds", "ニンテンドー3DS");
        m.insert("ds", "ニンテンドーDS");
        m.insert("gc", "ゲームキューブ");
        m.insert("sfc", "スーパーファミコン");
        m.insert("fc", "ファミコン");
        m.insert("gb", "ゲームボーイ");
        m.insert("gba", "ゲームボーイアドバンス");
        m
    };

    /// Tokens too generic to anchor a keyword (colors, condition words,
    /// packaging).
    static ref LOW_QUALITY_TOKENS: HashSet<&'static str> = [
        // Colors
        "ブラック", "黒", "白", "ホワイト", "シルバー", "ゴールド", "レッド", "赤",
        "ブルー", "青", "グリーン", "グレー", "ピンク", "パープル", "オレンジ",
        "black", "white", "silver", "gold", "red", "blue", "green", "grey", "gray",
        "bk", "wh",
        // Condition
        "新品", "中古", "未使用", "美品", "良品", "並品", "動作確認済み", "動作保証",
        "動作品", "完動品", "現状品", "訳あり", "難あり",
        // Packaging / quantity
        "セット", "まとめ", "本体", "限定", "付属品", "箱付き", "箱なし",
        "1個", "2個", "3個",
        // Generic specs
        "型", "インチ", "サイズ",
    ]
    .into_iter()
    .collect();

    /// Canonical brand → (Japanese form, English form) for auction search.
    static ref BRAND_BOTH_FORMS: HashMap<&'static str, (&'static str, &'static str)> = {
        let mut m = HashMap::new();
        m.insert("nintendo", ("任天堂", "Nintendo"));
        m.insert("sony", ("ソニー", "SONY"));
        m.insert("playstation", ("プレイステーション", "PlayStation"));
        m.insert("microsoft", ("マイクロソフト", "Microsoft"));
        m.insert("sega", ("セガ", "SEGA"));
        m.insert("bandai", ("バンダイ", "BANDAI"));
        m.insert("konami", ("コナミ", "KONAMI"));
        m.insert("capcom", ("カプコン", "CAPCOM"));
        m.insert("apple", ("Apple", "Apple"));
        m.insert("samsung", ("サムスン", "Samsung"));
        m.insert("panasonic", ("パナソニック", "Panasonic"));
        m.insert("sharp", ("シャープ", "SHARP"));
        m.insert("toshiba", ("東芝", "TOSHIBA"));
        m.insert("hitachi", ("日立", "HITACHI"));
        m.insert("canon", ("キヤノン", "Canon"));
        m.insert("nikon", ("ニコン", "Nikon"));
        m.insert("olympus", ("オリンパス", "OLYMPUS"));
        m.insert("fujifilm", ("富士フイルム", "FUJIFILM"));
        m.insert("casio", ("カシオ", "CASIO"));
        m.insert("epson", ("エプソン", "EPSON"));
        m.insert("bose", ("Bose", "Bose"));
        m.insert("jbl", ("JBL", "JBL"));
        m.insert("sennheiser", ("ゼンハイザー", "Sennheiser"));
        m.insert("audio-technica", ("オーディオテクニカ", "audio-technica"));
        m.insert("dyson", ("ダイソン", "Dyson"));
        m.insert("irobot", ("アイロボット", "iRobot"));
        m.insert("braun", ("ブラウン", "BRAUN"));
        m.insert("philips", ("フィリップス", "Philips"));
        m.insert("daikin", ("ダイキン", "DAIKIN"));
        m.insert("makita", ("マキタ", "Makita"));
        m.insert("mitsubishi", ("三菱", "三菱"));
        m.insert("buffalo", ("バッファロー", "BUFFALO"));
        m.insert("logicool", ("ロジクール", "Logicool"));
        m.insert("anker", ("Anker", "Anker"));
        m.insert("pioneer", ("パイオニア", "Pioneer"));
        m.insert("tiger", ("タイガー", "TIGER"));
        m.insert("zojirushi", ("象印", "象印"));
        m.insert("tefal", ("ティファール", "T-fal"));
        m.insert("delonghi", ("デロンギ", "DeLonghi"));
        m.insert("iris ohyama", ("アイリスオーヤマ", "IRIS OHYAMA"));
        m.insert("balmuda", ("バルミューダ", "BALMUDA"));
        m.insert("roomba", ("ルンバ", "Roomba"));
        m.insert("shure", ("Shure", "Shure"));
        m.insert("gopro", ("GoPro", "GoPro"));
        m.insert("lego", ("レゴ", "LEGO"));
        m.insert("twinbird", ("ツインバード", "TWINBIRD"));
        m.insert("elecom", ("エレコム", "ELECOM"));
        m
    };

    /// Analytics-provider brand strings → short searchable forms.
    static ref BRAND_SHORT_MAP: Vec<(&'static str, &'static str)> = vec![
        ("ソニー・インタラクティブエンタテインメント", "ソニー"),
        ("sony interactive entertainment", "ソニー"),
        ("sony corporation", "ソニー"),
        ("sony group corporation", "ソニー"),
        ("パナソニック株式会社", "パナソニック"),
        ("panasonic corporation", "パナソニック"),
        ("panasonic holdings", "パナソニック"),
        ("任天堂株式会社", "任天堂"),
        ("nintendo co., ltd.", "任天堂"),
        ("シャープ株式会社", "シャープ"),
        ("sharp corporation", "シャープ"),
        ("日立グローバルライフソリューションズ", "日立"),
        ("日立製作所", "日立"),
        ("ダイソン・テクノロジー", "ダイソン"),
        ("dyson technology limited", "ダイソン"),
        ("dyson", "ダイソン"),
        ("buffalo inc.", "バッファロー"),
        ("アイリスオーヤマ株式会社", "アイリスオーヤマ"),
        ("ブラザー工業株式会社", "ブラザー"),
        ("brother industries", "ブラザー"),
        ("キヤノン株式会社", "キヤノン"),
        ("canon inc.", "キヤノン"),
        ("エプソン販売株式会社", "エプソン"),
        ("seiko epson", "エプソン"),
    ];

    static ref SERIES_DECOMPOSE_RE: Regex = Regex::new(r"^([a-z]+)(\d+)([a-z]*)$").unwrap();
    static ref BARCODE_RE: Regex = Regex::new(r"^\d{8,}$").unwrap();
}

/// Condition / packaging variants appended in the category strategy.
const CONDITION_SUFFIXES: &[&str] = &["中古", "ジャンク", "BOX", "セット", "本体", "限定"];

/// Decompose a model number into (prefix, number, suffix):
/// "xd900" → ("xd", 900, ""); "cfi1200a" → ("cfi", 1200, "a");
/// "wh1000xm4" is too complex and yields `None`.
pub fn decompose_model(model: &str) -> Option<(String, i64, String)> {
    let caps = SERIES_DECOMPOSE_RE.captures(model)?;
    let num: i64 = caps[2].parse().ok()?;
    Some((caps[1].to_string(), num, caps[3].to_string()))
}

/// Guess the numeric step between sibling models.
pub fn guess_step(num: i64) -> i64 {
    if num >= 100 && num % 100 == 0 {
        100 // xd900 → xd800, xd1000
    } else if num >= 10 && num % 10 == 0 {
        10 // wf110 → wf100, wf120
    } else {
        1 // ps5 → ps4, ps6
    }
}

/// All-digit strings of 8+ characters are EAN/JAN codes masquerading
/// as model numbers.
pub fn is_barcode(text: &str) -> bool {
    BARCODE_RE.is_match(text.trim())
}

/// Shorten provider brand strings into auction-searchable forms.
pub fn clean_brand(brand: &str) -> String {
    let stripped = brand.trim();
    if stripped.is_empty() {
        return String::new();
    }
    let lower = stripped.to_lowercase();
    for (long_form, short_form) in BRAND_SHORT_MAP.iter() {
        if lower.contains(&long_form.to_lowercase()) {
            return short_form.to_string();
        }
    }
    if stripped.chars().count() > 20 {
        let first_word = stripped.split_whitespace().next().unwrap_or(stripped);
        if first_word.chars().count() >= 2 {
            return first_word.to_string();
        }
        return String::new();
    }
    stripped.to_string()
}

/// Cache of the preferred (Japanese vs English) brand form for auction
/// search, resolved by comparing result counts once per brand.
#[derive(Default)]
pub struct BrandPreferenceCache {
    inner: Mutex<HashMap<String, String>>,
}

impl BrandPreferenceCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, brand: &str) -> Option<String> {
        self.inner.lock().get(brand).cloned()
    }

    /// Resolve which written form of a brand finds more listings.
    /// Defaults to the Japanese form on error.
    pub async fn resolve(&self, scraper: &AuctionScraper, brand: &str) -> String {
        if let Some(cached) = self.get(brand) {
            return cached;
        }
        let (ja, en) = match BRAND_BOTH_FORMS.get(brand) {
            Some(forms) => *forms,
            None => {
                self.inner.lock().insert(brand.to_string(), brand.to_string());
                return brand.to_string();
            }
        };
        if ja == en {
            self.inner.lock().insert(brand.to_string(), ja.to_string());
            return ja.to_string();
        }

        let winner = match (scraper.search(ja, 1).await, scraper.search(en, 1).await) {
            (Ok(ja_results), Ok(en_results)) => {
                let (jc, ec) = (ja_results.len(), en_results.len());
                let winner = if jc >= ec { ja } else { en };
                info!(brand, winner, ja_count = jc, en_count = ec, "Brand preference resolved");
                winner
            }
            _ => ja,
        };
        self.inner.lock().insert(brand.to_string(), winner.to_string());
        winner.to_string()
    }
}

/// Keyword format for auction search: a model of 4+ chars identifies
/// the product alone; shorter models need the brand attached.
pub fn format_model_keyword(
    brand: Option<&str>,
    model: &str,
    prefs: Option<&BrandPreferenceCache>,
) -> String {
    let brand = match brand {
        Some(b) if !b.is_empty() => b,
        _ => return model.to_string(),
    };
    if model.chars().count() >= 4 {
        return model.to_string();
    }
    let preferred = prefs
        .and_then(|p| p.get(brand))
        .or_else(|| BRAND_BOTH_FORMS.get(brand).map(|(ja, _)| ja.to_string()))
        .unwrap_or_else(|| brand.to_string());
    format!("{preferred} {model}")
}

fn good_brands(insights: &KeywordInsights) -> Vec<&super::analyzer::BrandPattern> {
    insights
        .brand_patterns
        .iter()
        .filter(|b| b.avg_profit >= 3000.0 && b.deal_count >= 3 && b.total_profit >= 15_000)
        .collect()
}

fn brand_parent_map(insights: &KeywordInsights) -> HashMap<String, i64> {
    let mut map = HashMap::new();
    for kp in &insights.top_keywords {
        for brand in &insights.brand_patterns {
            if kp.keyword.to_lowercase().contains(&brand.brand_name) {
                map.entry(brand.brand_name.clone()).or_insert(kp.keyword_id);
                break;
            }
        }
    }
    map
}

fn is_low_quality(token: &str) -> bool {
    LOW_QUALITY_TOKENS.contains(token) || LOW_QUALITY_TOKENS.contains(token.to_lowercase().as_str())
}

/// Strategy 1 (brand): profitable brands × top product-type tokens.
pub fn generate_brand_expansion(
    insights: &KeywordInsights,
    existing: &HashSet<String>,
    max_count: usize,
) -> Vec<CandidateProposal> {
    let mut candidates = Vec::new();
    let parents = brand_parent_map(insights);

    let top_types: Vec<&str> = insights
        .product_type_patterns
        .iter()
        .take(15)
        .map(|p| p.product_type.as_str())
        .filter(|t| !is_low_quality(t))
        .collect();

    for brand in good_brands(insights) {
        let parent_id = parents.get(&brand.brand_name).copied();
        for ptype in &top_types {
            if ptype.to_lowercase() == brand.brand_name.to_lowercase() {
                continue;
            }
            let keyword = format!("{} {ptype}", brand.brand_name);
            if existing.contains(&keyword.to_lowercase()) {
                continue;
            }
            candidates.push(CandidateProposal {
                keyword,
                strategy: "brand",
                confidence: 0.70,
                parent_keyword_id: parent_id,
                reasoning: format!(
                    "ブランド「{}」({}件Deal, 平均利益¥{:.0}) × 商品種別「{ptype}」",
                    brand.brand_name, brand.deal_count, brand.avg_profit
                ),
            });
            if candidates.len() >= max_count {
                return candidates;
            }
        }
    }
    candidates
}

/// Strategy 2 (title): pair up the highest-scoring title tokens.
pub fn generate_title_decomp(
    insights: &KeywordInsights,
    existing: &HashSet<String>,
    max_count: usize,
) -> Vec<CandidateProposal> {
    let mut candidates = Vec::new();

    let top_tokens: Vec<(&str, f64)> = insights
        .title_tokens
        .iter()
        .filter(|(token, score)| {
            *score >= 1.0
                && !KNOWN_BRANDS.contains(token.to_lowercase().as_str())
                && !is_low_quality(token)
                && token.chars().count() >= 3
        })
        .take(20)
        .map(|(t, s)| (t.as_str(), *s))
        .collect();
    if top_tokens.len() < 2 {
        return candidates;
    }

    let parent_id = insights.top_keywords.first().map(|kp| kp.keyword_id);

    for (i, (t1, s1)) in top_tokens.iter().enumerate() {
        for (t2, s2) in &top_tokens[i + 1..] {
            let keyword = format!("{t1} {t2}");
            if existing.contains(&keyword.to_lowercase()) {
                continue;
            }
            candidates.push(CandidateProposal {
                keyword,
                strategy: "title",
                confidence: 0.60,
                parent_keyword_id: parent_id,
                reasoning: format!(
                    "高スコアトークン「{t1}」(スコア{s1:.1}) + 「{t2}」(スコア{s2:.1})"
                ),
            });
            if candidates.len() >= max_count {
                return candidates;
            }
        }
    }
    candidates
}

/// Strategy 3 (category): profitable brands × condition/packaging
/// suffix words.
pub fn generate_category_keywords(
    insights: &KeywordInsights,
    existing: &HashSet<String>,
    max_count: usize,
) -> Vec<CandidateProposal> {
    let mut candidates = Vec::new();
    let parents = brand_parent_map(insights);

    for brand in good_brands(insights) {
        let parent_id = parents.get(&brand.brand_name).copied();
        for suffix in CONDITION_SUFFIXES {
            let keyword = format!("{} {suffix}", brand.brand_name);
            if existing.contains(&keyword.to_lowercase()) {
                continue;
            }
            candidates.push(CandidateProposal {
                keyword,
                strategy: "category",
                confidence: 0.65,
                parent_keyword_id: parent_id,
                reasoning: format!(
                    "高利益ブランド「{}」のバリエーション「{suffix}」",
                    brand.brand_name
                ),
            });
            if candidates.len() >= max_count {
                return candidates;
            }
        }
    }
    candidates
}

/// Strategy 4 (synonym): English↔katakana swaps and abbreviation
/// expansion over the top performers.
pub fn generate_synonyms(
    insights: &KeywordInsights,
    existing: &HashSet<String>,
    max_count: usize,
) -> Vec<CandidateProposal> {
    let mut candidates: Vec<CandidateProposal> = Vec::new();

    // Both directions of the synonym table
    let mut swap_map: HashMap<String, String> = HashMap::new();
    for (en, ja) in SYNONYM_MAP.iter() {
        swap_map.insert(en.to_string(), ja.to_string());
        swap_map.insert(ja.to_lowercase(), en.to_string());
    }

    for kp in &insights.top_keywords {
        if kp.performance_score < 0.1 {
            continue;
        }
        let tokens: Vec<String> = kp.keyword.to_lowercase().split_whitespace().map(String::from).collect();

        for (i, token) in tokens.iter().enumerate() {
            if let Some(replacement) = swap_map.get(token) {
                let mut new_tokens = tokens.clone();
                new_tokens[i] = replacement.clone();
                let keyword = new_tokens.join(" ");
                if !existing.contains(&keyword.to_lowercase()) {
                    candidates.push(CandidateProposal {
                        keyword,
                        strategy: "synonym",
                        confidence: 0.50,
                        parent_keyword_id: Some(kp.keyword_id),
                        reasoning: format!(
                            "「{}」の類義語: {token} → {replacement}",
                            kp.keyword
                        ),
                    });
                }
            }

            if let Some(expanded) = ABBREVIATION_MAP.get(token.as_str()) {
                let keyword = kp.keyword.to_lowercase().replace(token, expanded);
                if !existing.contains(&keyword.to_lowercase()) {
                    candidates.push(CandidateProposal {
                        keyword,
                        strategy: "synonym",
                        confidence: 0.50,
                        parent_keyword_id: Some(kp.keyword_id),
                        reasoning: format!(
                            "「{}」の略称展開: {token} → {expanded}",
                            kp.keyword
                        ),
                    });
                }
            }
        }
        if candidates.len() >= max_count {
            break;
        }
    }
    candidates.truncate(max_count);
    candidates
}

/// Strategy 5 (series): numeric siblings of models from profitable
/// historical alerts, most profitable first.
pub fn generate_series_expansion(
    store: &Store,
    min_profit: i64,
    existing: &HashSet<String>,
    max_count: usize,
    prefs: Option<&BrandPreferenceCache>,
) -> Result<Vec<CandidateProposal>> {
    let profitable = store.list_profitable_alerts(min_profit, 50)?;

    let mut seen_models: HashSet<String> = HashSet::new();
    let mut candidates = Vec::new();

    'outer: for alert in &profitable {
        let (brand, models, _) = extract_product_info(&alert.yahoo_title);
        for model in models {
            if !seen_models.insert(model.clone()) {
                continue;
            }
            let (prefix, num, suffix) = match decompose_model(&model) {
                Some(parts) => parts,
                None => continue,
            };
            let step = guess_step(num);

            for offset in [-2i64, -1, 1, 2] {
                let sibling_num = num + offset * step;
                if sibling_num <= 0 {
                    continue;
                }
                let sibling_model = format!("{prefix}{sibling_num}{suffix}");
                let keyword = format_model_keyword(brand.as_deref(), &sibling_model, prefs);
                if existing.contains(&keyword.to_lowercase()) {
                    continue;
                }
                candidates.push(CandidateProposal {
                    keyword,
                    strategy: "series",
                    confidence: 0.75,
                    parent_keyword_id: Some(alert.keyword_id),
                    reasoning: format!(
                        "利益確認済み「{} {}」(¥{})のシリーズ展開",
                        brand.as_deref().unwrap_or(""),
                        model,
                        alert.gross_profit
                    ),
                });
            }
            if candidates.len() >= max_count {
                break 'outer;
            }
        }
    }
    candidates.truncate(max_count);
    Ok(candidates)
}

/// Strategy 6 (demand): model numbers of products that demonstrably
/// sell on the marketplace, from the Product Finder output.
pub fn generate_demand(
    demand_products: &[KeepaProduct],
    existing: &HashSet<String>,
    max_count: usize,
    prefs: Option<&BrandPreferenceCache>,
) -> Vec<CandidateProposal> {
    let mut candidates = Vec::new();

    for p in demand_products {
        let mut model = p.model.clone().unwrap_or_default().trim().to_string();
        if is_barcode(&model) {
            model.clear();
        }
        if model.is_empty() || model == "None" {
            let title = p.title.clone().unwrap_or_default();
            let mut extracted: Vec<String> =
                extract_model_numbers_from_text(&title).into_iter().collect();
            extracted.sort();
            model = match extracted.into_iter().next() {
                Some(m) => m,
                None => continue,
            };
        }
        if is_barcode(&model) {
            continue;
        }

        let brand = clean_brand(p.brand.as_deref().unwrap_or(""));
        let keyword = if brand.is_empty() {
            model.clone()
        } else {
            format_model_keyword(Some(&brand), &model, prefs)
        };
        if keyword.chars().count() < 4 {
            continue;
        }
        if existing.contains(&keyword.to_lowercase()) {
            continue;
        }

        let drops30 = p
            .stats
            .as_ref()
            .and_then(|s| s.sales_rank_drops30)
            .unwrap_or(0);
        candidates.push(CandidateProposal {
            keyword,
            strategy: "demand",
            confidence: 0.80,
            parent_keyword_id: None,
            reasoning: format!("Amazon中古で月{drops30}回売れている商品"),
        });
        if candidates.len() >= max_count {
            break;
        }
    }
    candidates
}

/// All keyword texts already occupied: watched keywords plus
/// non-rejected candidates, lowercased.
pub fn existing_keyword_set(store: &Store) -> Result<HashSet<String>> {
    let mut existing: HashSet<String> = store
        .list_keyword_texts()?
        .into_iter()
        .map(|k| k.trim().to_lowercase())
        .collect();
    existing.extend(
        store
            .list_open_candidate_texts()?
            .into_iter()
            .map(|k| k.trim().to_lowercase()),
    );
    Ok(existing)
}

/// Run every history-based strategy and dedup the union: exact matches,
/// apparel, and anything similar to an existing keyword or an
/// earlier-kept candidate.
pub fn generate_all(
    insights: &KeywordInsights,
    store: &Store,
    series_min_profit: i64,
    demand_products: &[KeepaProduct],
    max_per_strategy: usize,
    prefs: Option<&BrandPreferenceCache>,
) -> Result<Vec<CandidateProposal>> {
    let existing = existing_keyword_set(store)?;

    let mut candidates = Vec::new();
    candidates.extend(generate_brand_expansion(insights, &existing, max_per_strategy));
    candidates.extend(generate_title_decomp(insights, &existing, max_per_strategy));
    candidates.extend(generate_category_keywords(insights, &existing, max_per_strategy));
    candidates.extend(generate_synonyms(insights, &existing, max_per_strategy));
    match generate_series_expansion(store, series_min_profit, &existing, max_per_strategy, prefs) {
        Ok(series) => candidates.extend(series),
        Err(e) => warn!(error = ?e, "Series strategy failed"),
    }
    candidates.extend(generate_demand(demand_products, &existing, max_per_strategy, prefs));

    let total = candidates.len();
    let existing_texts: Vec<String> = existing.iter().cloned().collect();
    let mut seen: HashSet<String> = HashSet::new();
    let mut kept: Vec<CandidateProposal> = Vec::new();

    'candidate: for c in candidates {
        let key = c.keyword.trim().to_lowercase();
        if key.is_empty() || seen.contains(&key) || existing.contains(&key) {
            continue;
        }
        if is_apparel(&c.keyword) {
            continue;
        }
        for other in existing_texts.iter() {
            if keywords_are_similar(&c.keyword, other, 0.6) {
                continue 'candidate;
            }
        }
        for other in &kept {
            if keywords_are_similar(&c.keyword, &other.keyword, 0.6) {
                continue 'candidate;
            }
        }
        seen.insert(key);
        kept.push(c);
    }

    info!(unique = kept.len(), total, "Candidate generation finished");
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_decomposition() {
        assert_eq!(decompose_model("xd900"), Some(("xd".into(), 900, "".into())));
        assert_eq!(
            decompose_model("cfi1200a"),
            Some(("cfi".into(), 1200, "a".into()))
        );
        assert_eq!(decompose_model("wh1000xm4"), None);
    }

    #[test]
    fn step_guessing() {
        assert_eq!(guess_step(900), 100);
        assert_eq!(guess_step(110), 10);
        assert_eq!(guess_step(5), 1);
        assert_eq!(guess_step(1200), 100);
    }

    #[test]
    fn barcode_detection() {
        assert!(is_barcode("4902370536485"));
        assert!(!is_barcode("xd900"));
        assert!(!is_barcode("1234567"));
    }

    #[test]
    fn brand_cleaning() {
        assert_eq!(clean_brand("Sony Interactive Entertainment Inc."), "ソニー");
        assert_eq!(clean_brand("パナソニック株式会社"), "パナソニック");
        assert_eq!(clean_brand("Anker"), "Anker");
        assert_eq!(clean_brand(""), "");
    }

    #[test]
    fn model_keyword_formatting() {
        // Long models search alone
        assert_eq!(format_model_keyword(Some("casio"), "xd900", None), "xd900");
        // Short models carry the preferred (Japanese) brand form
        assert_eq!(format_model_keyword(Some("dyson"), "v8", None), "ダイソン v8");
        assert_eq!(format_model_keyword(None, "v8", None), "v8");
    }

    #[test]
    fn demand_strategy_rejects_barcodes_and_short_keywords() {
        let products: Vec<KeepaProduct> = vec![
            serde_json::from_value(serde_json::json!({
                "asin": "B01", "title": "Casio XD-900 電子辞書",
                "brand": "CASIO計算機株式会社", "model": "4971850034476"
            }))
            .unwrap(),
            serde_json::from_value(serde_json::json!({
                "asin": "B02", "title": "ダイソン掃除機",
                "brand": "Dyson Technology Limited", "model": "SV10KSLM"
            }))
            .unwrap(),
        ];
        let out = generate_demand(&products, &HashSet::new(), 10, None);
        // First product: barcode model, falls back to the title model
        assert!(out.iter().any(|c| c.keyword.contains("xd900")));
        // Second: model field used directly (4+ chars → model only)
        assert!(out.iter().any(|c| c.keyword == "sv10kslm" || c.keyword == "SV10KSLM"));
        assert!(out.iter().all(|c| c.confidence == 0.80));
    }
}
