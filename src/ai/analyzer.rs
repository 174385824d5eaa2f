//! Deal-history mining: keyword performance scores and the brand /
//! product-type / price-range patterns that feed keyword generation.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use chrono::Utc;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use crate::models::{DealAlert, WatchedKeyword};
use crate::store::Store;

lazy_static! {
    /// Brands that recur in auction→marketplace reselling.
    pub static ref KNOWN_BRANDS: HashSet<&'static str> = [
        // Gaming
        "nintendo", "sony", "playstation", "xbox", "sega", "bandai", "konami",
        "capcom", "square", "enix", "namco", "taito",
        // Electronics
        "apple", "samsung", "panasonic", "sharp", "toshiba", "hitachi",
        "canon", "nikon", "olympus", "fujifilm", "casio", "epson",
        "bose", "jbl", "sennheiser", "audio-technica",
        // Home / lifestyle
        "dyson", "irobot", "roomba", "daikin", "braun", "philips",
        // Toys / collectibles
        "pokemon", "lego", "takara", "tomy", "medicom", "figma",
        "goodsmile", "kotobukiya", "megahouse", "bearbrick",
    ]
    .into_iter()
    .collect();

    /// Listing noise excluded from pattern mining.
    pub static ref STOPWORDS: HashSet<&'static str> = [
        "送料", "無料", "中古", "美品", "新品", "未使用", "未開封", "即決",
        "セット", "まとめ", "ジャンク", "動作", "確認", "済み", "品", "付き",
        "箱", "あり", "なし", "本体", "のみ", "限定", "非売品",
        "の", "が", "で", "に", "は", "を", "と", "も", "や", "から", "まで",
        "より", "こそ", "さえ", "でも", "しか", "など", "ほど",
        "a", "the", "and", "or", "for", "with", "in", "on", "at", "to", "of",
        "is", "it", "no", "not", "be", "an", "as", "by",
    ]
    .into_iter()
    .collect();

    static ref TOKEN_SPLIT_RE: Regex =
        Regex::new(r"[\s\-_/\\,;:!?。、（）\(\)\[\]【】「」『』]+").unwrap();
}

const MIN_TOKEN_LEN: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct BrandPattern {
    pub brand_name: String,
    pub deal_count: usize,
    pub avg_profit: f64,
    pub total_profit: i64,
    pub example_keywords: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductTypePattern {
    pub product_type: String,
    pub deal_count: usize,
    pub avg_profit: f64,
    /// frequency × capped average-profit weight
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct PriceRangePattern {
    pub range_label: String,
    pub min_price: i64,
    pub max_price: i64,
    pub deal_count: usize,
    pub avg_margin: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct KeywordPerformance {
    pub keyword_id: i64,
    pub keyword: String,
    pub total_deals: i64,
    pub total_scans: i64,
    pub avg_gross_profit: f64,
    pub avg_gross_margin: f64,
    pub performance_score: f64,
    pub source: String,
}

/// Complete analysis of the deal history.
#[derive(Debug, Clone, Serialize)]
pub struct KeywordInsights {
    pub top_keywords: Vec<KeywordPerformance>,
    pub brand_patterns: Vec<BrandPattern>,
    pub product_type_patterns: Vec<ProductTypePattern>,
    pub price_range_patterns: Vec<PriceRangePattern>,
    /// token → interest score
    pub title_tokens: Vec<(String, f64)>,
    pub total_deals: usize,
    pub total_keywords: usize,
}

fn mining_tokens(text: &str) -> Vec<String> {
    TOKEN_SPLIT_RE
        .split(&text.to_lowercase())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// 0.0–1.0 performance score for a keyword:
/// `0.4·profit + 0.3·deal_rate + 0.2·margin + 0.1·recency`, rounded to
/// four decimals.
pub fn compute_performance_score(kw: &WatchedKeyword, alerts: &[&DealAlert]) -> f64 {
    if kw.total_scans == 0 {
        return 0.0;
    }

    let deal_rate = (kw.total_deals_found as f64 / kw.total_scans.max(1) as f64).min(1.0);
    let avg_profit = kw.total_gross_profit as f64 / kw.total_deals_found.max(1) as f64;
    let profit_score = (avg_profit / 10_000.0).min(1.0);

    let margin_score = if alerts.is_empty() {
        0.0
    } else {
        let avg_margin =
            alerts.iter().map(|a| a.gross_margin_pct).sum::<f64>() / alerts.len() as f64;
        (avg_margin / 100.0).min(1.0)
    };

    let recency = alerts
        .iter()
        .map(|a| a.notified_at)
        .max()
        .map(|most_recent| {
            let days = (Utc::now() - most_recent).num_days();
            if days <= 7 {
                1.0
            } else if days <= 14 {
                0.5
            } else {
                0.0
            }
        })
        .unwrap_or(0.0);

    let score = 0.4 * profit_score + 0.3 * deal_rate + 0.2 * margin_score + 0.1 * recency;
    (score * 10_000.0).round() / 10_000.0
}

/// Analyze all alerts and keywords; writes updated performance scores
/// back to the keyword rows.
pub fn analyze_deal_history(store: &Store) -> Result<KeywordInsights> {
    let alerts = store.list_all_alerts()?;
    let keywords = store.list_keywords()?;

    let kw_map: HashMap<i64, &WatchedKeyword> = keywords.iter().map(|k| (k.id, k)).collect();
    let mut alerts_by_kw: HashMap<i64, Vec<&DealAlert>> = HashMap::new();
    for a in &alerts {
        alerts_by_kw.entry(a.keyword_id).or_default().push(a);
    }

    let mut performances = Vec::with_capacity(keywords.len());
    for kw in &keywords {
        let empty = Vec::new();
        let kw_alerts = alerts_by_kw.get(&kw.id).unwrap_or(&empty);
        let score = compute_performance_score(kw, kw_alerts);

        if (score - kw.performance_score).abs() > f64::EPSILON {
            let mut updated = kw.clone();
            updated.performance_score = score;
            store.update_keyword(&updated)?;
        }

        let (avg_profit, avg_margin) = if kw_alerts.is_empty() {
            (0.0, 0.0)
        } else {
            (
                kw_alerts.iter().map(|a| a.gross_profit).sum::<i64>() as f64
                    / kw_alerts.len() as f64,
                kw_alerts.iter().map(|a| a.gross_margin_pct).sum::<f64>()
                    / kw_alerts.len() as f64,
            )
        };

        performances.push(KeywordPerformance {
            keyword_id: kw.id,
            keyword: kw.keyword.clone(),
            total_deals: kw.total_deals_found,
            total_scans: kw.total_scans,
            avg_gross_profit: avg_profit,
            avg_gross_margin: avg_margin,
            performance_score: score,
            source: kw.source.clone(),
        });
    }
    performances.sort_by(|a, b| {
        b.performance_score
            .partial_cmp(&a.performance_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let brands = extract_brand_patterns(&alerts, &kw_map);
    let products = extract_product_types(&alerts);
    let price_ranges = extract_price_ranges(&alerts);
    let tokens = extract_title_tokens(&alerts);

    Ok(KeywordInsights {
        top_keywords: performances,
        brand_patterns: brands,
        product_type_patterns: products,
        price_range_patterns: price_ranges,
        title_tokens: tokens,
        total_deals: alerts.len(),
        total_keywords: keywords.len(),
    })
}

/// Brand tokens and their profitability; one brand per title, ≥2 deals.
fn extract_brand_patterns(
    alerts: &[DealAlert],
    kw_map: &HashMap<i64, &WatchedKeyword>,
) -> Vec<BrandPattern> {
    let mut brand_deals: HashMap<String, Vec<&DealAlert>> = HashMap::new();
    let mut brand_keywords: HashMap<String, HashSet<String>> = HashMap::new();

    for alert in alerts {
        for token in mining_tokens(&alert.yahoo_title) {
            if KNOWN_BRANDS.contains(token.as_str()) {
                brand_deals.entry(token.clone()).or_default().push(alert);
                if let Some(kw) = kw_map.get(&alert.keyword_id) {
                    brand_keywords
                        .entry(token)
                        .or_default()
                        .insert(kw.keyword.clone());
                }
                break;
            }
        }
    }

    let mut patterns: Vec<BrandPattern> = brand_deals
        .into_iter()
        .filter(|(_, deals)| deals.len() >= 2)
        .map(|(brand, deals)| {
            let total_profit: i64 = deals.iter().map(|d| d.gross_profit).sum();
            BrandPattern {
                example_keywords: brand_keywords
                    .get(&brand)
                    .map(|s| s.iter().take(5).cloned().collect())
                    .unwrap_or_default(),
                avg_profit: total_profit as f64 / deals.len() as f64,
                deal_count: deals.len(),
                total_profit,
                brand_name: brand,
            }
        })
        .collect();
    patterns.sort_by(|a, b| b.total_profit.cmp(&a.total_profit));
    patterns
}

/// Product-type tokens: ≥3 deals, scored `count × min(avg/5000, 2.0)`,
/// top 30.
fn extract_product_types(alerts: &[DealAlert]) -> Vec<ProductTypePattern> {
    let mut token_deals: HashMap<String, Vec<&DealAlert>> = HashMap::new();
    for alert in alerts {
        let mut seen = HashSet::new();
        for t in mining_tokens(&alert.yahoo_title) {
            if seen.contains(&t)
                || STOPWORDS.contains(t.as_str())
                || KNOWN_BRANDS.contains(t.as_str())
                || t.chars().count() < MIN_TOKEN_LEN
            {
                continue;
            }
            seen.insert(t.clone());
            token_deals.entry(t).or_default().push(alert);
        }
    }

    let mut patterns: Vec<ProductTypePattern> = token_deals
        .into_iter()
        .filter(|(_, deals)| deals.len() >= 3)
        .map(|(token, deals)| {
            let avg_profit =
                deals.iter().map(|d| d.gross_profit).sum::<i64>() as f64 / deals.len() as f64;
            ProductTypePattern {
                score: deals.len() as f64 * (avg_profit / 5000.0).min(2.0),
                deal_count: deals.len(),
                avg_profit,
                product_type: token,
            }
        })
        .collect();
    patterns.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
    patterns.truncate(30);
    patterns
}

fn extract_price_ranges(alerts: &[DealAlert]) -> Vec<PriceRangePattern> {
    const BUCKETS: &[(&str, i64, i64)] = &[
        ("0-3000", 0, 3000),
        ("3000-5000", 3000, 5000),
        ("5000-10000", 5000, 10_000),
        ("10000-30000", 10_000, 30_000),
        ("30000+", 30_000, 999_999_999),
    ];

    BUCKETS
        .iter()
        .filter_map(|(label, lo, hi)| {
            let deals: Vec<&DealAlert> = alerts
                .iter()
                .filter(|a| *lo <= a.yahoo_price && a.yahoo_price < *hi)
                .collect();
            if deals.is_empty() {
                return None;
            }
            let avg_margin =
                deals.iter().map(|d| d.gross_margin_pct).sum::<f64>() / deals.len() as f64;
            Some(PriceRangePattern {
                range_label: label.to_string(),
                min_price: *lo,
                max_price: *hi,
                deal_count: deals.len(),
                avg_margin: (avg_margin * 10.0).round() / 10.0,
            })
        })
        .collect()
}

/// Token → score map over deal titles; tokens seen on ≥2 deals.
fn extract_title_tokens(alerts: &[DealAlert]) -> Vec<(String, f64)> {
    let mut token_profits: HashMap<String, Vec<i64>> = HashMap::new();
    for alert in alerts {
        let mut seen = HashSet::new();
        for t in mining_tokens(&alert.yahoo_title) {
            if seen.contains(&t)
                || STOPWORDS.contains(t.as_str())
                || t.chars().count() < MIN_TOKEN_LEN
            {
                continue;
            }
            seen.insert(t.clone());
            token_profits.entry(t).or_default().push(alert.gross_profit);
        }
    }

    let mut scores: Vec<(String, f64)> = token_profits
        .into_iter()
        .filter(|(_, profits)| profits.len() >= 2)
        .map(|(token, profits)| {
            let avg = profits.iter().sum::<i64>() as f64 / profits.len() as f64;
            let score = profits.len() as f64 * (avg / 5000.0).min(2.0);
            (token, (score * 1000.0).round() / 1000.0)
        })
        .collect();
    scores.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertStatus;

    fn keyword(id: i64, scans: i64, deals: i64, profit: i64) -> WatchedKeyword {
        WatchedKeyword {
            id,
            keyword: format!("kw{id}"),
            is_active: true,
            last_scanned_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            notes: String::new(),
            source: "manual".into(),
            parent_keyword_id: None,
            performance_score: 0.0,
            total_scans: scans,
            total_deals_found: deals,
            total_gross_profit: profit,
            scans_since_last_deal: 0,
            confidence: 1.0,
            auto_deactivated_at: None,
        }
    }

    fn alert(keyword_id: i64, title: &str, profit: i64, margin: f64) -> DealAlert {
        DealAlert {
            id: 0,
            keyword_id,
            yahoo_auction_id: format!("x{profit}"),
            amazon_asin: format!("B{profit:09}"),
            yahoo_title: title.to_string(),
            yahoo_url: String::new(),
            yahoo_image_url: String::new(),
            amazon_title: String::new(),
            yahoo_price: 4000,
            yahoo_shipping: 0,
            sell_price: 10_000,
            gross_profit: profit,
            gross_margin_pct: margin,
            amazon_fee_pct: 10.0,
            forwarding_cost: 800,
            notified_at: Utc::now(),
            status: AlertStatus::Active,
            rejection_reason: None,
            rejection_note: String::new(),
            rejected_at: None,
        }
    }

    #[test]
    fn performance_score_formula() {
        let kw = keyword(1, 10, 5, 50_000);
        let a1 = alert(1, "t", 10_000, 50.0);
        let a2 = alert(1, "t", 10_000, 50.0);
        let alerts = vec![&a1, &a2];
        // profit_score = min(10000/10000, 1) = 1.0
        // deal_rate = min(5/10, 1) = 0.5
        // margin_score = min(50/100, 1) = 0.5
        // recency = 1.0 (just notified)
        // 0.4 + 0.15 + 0.1 + 0.1 = 0.75
        assert_eq!(compute_performance_score(&kw, &alerts), 0.75);
    }

    #[test]
    fn zero_scans_scores_zero() {
        let kw = keyword(1, 0, 0, 0);
        assert_eq!(compute_performance_score(&kw, &[]), 0.0);
    }

    #[test]
    fn brand_patterns_need_two_deals() {
        let alerts = vec![
            alert(1, "dyson v8 fluffy", 5000, 45.0),
            alert(1, "dyson v10 absolute", 6000, 50.0),
            alert(1, "makita 充電器", 4000, 42.0),
        ];
        let patterns = extract_brand_patterns(&alerts, &HashMap::new());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].brand_name, "dyson");
        assert_eq!(patterns[0].deal_count, 2);
        assert_eq!(patterns[0].total_profit, 11_000);
    }

    #[test]
    fn product_types_need_three_deals_and_skip_stopwords() {
        let alerts: Vec<DealAlert> = (0..3)
            .map(|i| alert(1, "dyson 掃除機 中古", 5000 + i, 45.0))
            .collect();
        let patterns = extract_product_types(&alerts);
        let types: Vec<&str> = patterns.iter().map(|p| p.product_type.as_str()).collect();
        assert!(types.contains(&"掃除機"));
        assert!(!types.contains(&"中古"));
        assert!(!types.contains(&"dyson"));
    }
}
