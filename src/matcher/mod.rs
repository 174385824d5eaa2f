//! Product matching: decides whether an auction listing and a
//! marketplace product are the same SKU.
//!
//! Handles case folding, full-width/half-width forms, katakana→hiragana,
//! Japanese↔English brand names, model-number extraction and comparison,
//! product synonym mapping, product-type conflicts (パック ≠ BOX),
//! quantity mismatches (1個 vs 3個セット), accessory-vs-main detection
//! (イヤーパッド vs ヘッドホン), and noise-word removal.
//!
//! Scoring weights:
//!   model number match    → +0.50  (strongest signal)
//!   model number conflict → -0.30
//!   brand match           → +0.20
//!   brand conflict        → -0.10 and hard reject
//!   product type conflict → -0.20
//!   quantity conflict     → -0.40 and hard reject
//!   accessory conflict    → -0.40 (-0.60 when leading) and hard reject
//!   token Jaccard         → +0.30 × similarity
//!
//! Acceptance needs model evidence on at least one side and
//! score ≥ 0.40 (plus any learned threshold delta).

pub mod lexicon;
pub mod overrides;

use std::collections::HashSet;

use lazy_static::lazy_static;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use lexicon::*;
pub use overrides::{MatcherOverrides, OverrideSnapshot};

pub const MATCH_THRESHOLD: f64 = 0.40;
/// For high-margin deals, which usually mean mismatched products.
pub const STRICT_MATCH_THRESHOLD: f64 = 0.55;

const KATA_HIRA_OFFSET: u32 = 0x60;

fn kata_to_hira(text: &str) -> String {
    text.chars()
        .map(|ch| {
            let cp = ch as u32;
            if (0x30A1..=0x30F6).contains(&cp) {
                // ァ–ヶ fold to ぁ–ゖ; the long-vowel mark ー stays put
                char::from_u32(cp - KATA_HIRA_OFFSET).unwrap_or(ch)
            } else {
                ch
            }
        })
        .collect()
}

fn is_cjk(ch: char) -> bool {
    let cp = ch as u32;
    (0x3040..=0x309F).contains(&cp)       // Hiragana
        || (0x30A0..=0x30FF).contains(&cp) // Katakana
        || (0x4E00..=0x9FFF).contains(&cp) // CJK Unified Ideographs
        || (0x3400..=0x4DBF).contains(&cp) // CJK Extension A
        || (0xFF65..=0xFF9F).contains(&cp) // Halfwidth Katakana
}

/// Insert spaces at CJK↔Latin/digit boundaries:
/// "ニンテンドーSwitch" → "ニンテンドー Switch".
fn insert_boundary_spaces(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    if chars.len() < 2 {
        return text.to_string();
    }
    let mut result = String::with_capacity(text.len() + 8);
    result.push(chars[0]);
    for window in chars.windows(2) {
        let (prev, curr) = (window[0], window[1]);
        if prev != ' ' && curr != ' ' && is_cjk(prev) != is_cjk(curr) {
            result.push(' ');
        }
        result.push(curr);
    }
    result
}

lazy_static! {
    static ref WHITESPACE_RE: Regex = Regex::new(r"\s+").unwrap();
    static ref TOKEN_SPLIT_RE: Regex =
        Regex::new(r"[\s/\[\]\(\)（）【】「」『』、。,\.]+").unwrap();
    static ref SPEC_UNIT_RE: Regex =
        Regex::new(r"^\d+(?:mah|mhz|ghz|gb|tb|mb|hz|mm|cm|kg|mp|db|lm|ch|k|w|v)$").unwrap();
    static ref MODEL_STRIP_RE: Regex = Regex::new(r"[-ー]").unwrap();
    static ref ASCII_LETTER_RE: Regex = Regex::new(r"[a-z]").unwrap();
    static ref ASCII_DIGIT_RE: Regex = Regex::new(r"[0-9]").unwrap();
    static ref MODEL_PREFIX_RE: Regex = Regex::new(r"^([a-z]+)").unwrap();
    static ref QTY_JA_RE: Regex = Regex::new(
        r"(\d+)\s*(?:個|本|枚|箱|袋|缶|足|台|丁|組|点|巻)(?:せっと|set|いり|入り|入|ぱっく|pack)?"
    )
    .unwrap();
    static ref QTY_JA_SET_RE: Regex = Regex::new(r"(\d+)\s*こ?\s*せっと").unwrap();
    static ref QTY_EN_RE: Regex = Regex::new(
        r"(?i)(\d+)\s*-?\s*(?:pack|pcs|pieces|set|count)\b|(?:set\s+of|pack\s+of)\s+(\d+)|[x×]\s*(\d+)\b"
    )
    .unwrap();
    /// Brand aliases sorted longest-first so the most specific wins.
    static ref SORTED_ALIASES: Vec<&'static str> = {
        let mut aliases: Vec<&'static str> = BRAND_ALIASES.keys().copied().collect();
        aliases.sort_by(|a, b| {
            b.chars()
                .count()
                .cmp(&a.chars().count())
                .then_with(|| a.cmp(b))
        });
        aliases
    };
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// NFKC → lowercase → katakana→hiragana → boundary spaces → collapse.
pub fn normalize(text: &str) -> String {
    let text: String = text.nfkc().collect();
    let text = text.to_lowercase();
    let text = kata_to_hira(&text);
    let text = insert_boundary_spaces(&text);
    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}

/// Split normalized text on whitespace and delimiter punctuation.
pub fn tokenize(text: &str) -> Vec<String> {
    TOKEN_SPLIT_RE
        .split(text)
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// Split tokens that start with a known brand name:
/// "にんてんどーすいっち" → ["にんてんどー", "すいっち"].
/// Short aliases (<3 chars, e.g. "ps") only split off a numeric remainder.
fn split_known_brands(tokens: Vec<String>) -> Vec<String> {
    let mut result = Vec::with_capacity(tokens.len());
    for token in tokens {
        let mut split = false;
        for alias in SORTED_ALIASES.iter() {
            if char_len(alias) < 2 {
                continue;
            }
            if token == *alias {
                break; // exact match, no split needed
            }
            if let Some(remainder) = token.strip_prefix(alias) {
                if remainder.is_empty() {
                    continue;
                }
                if char_len(alias) < 3 && !remainder.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                result.push(alias.to_string());
                result.push(remainder.to_string());
                split = true;
                break;
            }
        }
        if !split {
            result.push(token);
        }
    }
    result
}

/// Replace known brand names and product synonyms with canonical forms.
fn canonicalize_tokens(tokens: Vec<String>) -> Vec<String> {
    tokens
        .into_iter()
        .map(|t| {
            if let Some(canon) = BRAND_ALIASES.get(t.as_str()) {
                canon.to_string()
            } else if let Some(canon) = PRODUCT_SYNONYMS.get(t.as_str()) {
                canon.to_string()
            } else {
                t
            }
        })
        .collect()
}

/// Merge product-line names with adjacent number tokens:
/// ["gopro", "hero", "12", "black"] → ["gopro", "hero12", "black"].
fn merge_product_number_tokens(tokens: Vec<String>) -> Vec<String> {
    let mut result = Vec::with_capacity(tokens.len());
    let mut i = 0;
    while i < tokens.len() {
        if i + 1 < tokens.len()
            && MERGE_PREFIX_WORDS.contains(&tokens[i].as_str())
            && tokens[i + 1].chars().all(|c| c.is_ascii_digit())
            && !tokens[i + 1].is_empty()
        {
            result.push(format!("{}{}", tokens[i], tokens[i + 1]));
            i += 2;
        } else {
            result.push(tokens[i].clone());
            i += 1;
        }
    }
    result
}

/// Extract tokens that look like model numbers: after stripping hyphens
/// and the long-vowel mark, ≥2 chars containing both a letter and a
/// digit, excluding spec/unit tokens (4k, 1ch, 128gb, 60hz).
fn extract_model_numbers(tokens: &[String]) -> HashSet<String> {
    let mut models = HashSet::new();
    for t in tokens {
        let stripped = MODEL_STRIP_RE.replace_all(t, "").to_string();
        if char_len(&stripped) < 2 {
            continue;
        }
        if ASCII_LETTER_RE.is_match(&stripped) && ASCII_DIGIT_RE.is_match(&stripped) {
            if SPEC_UNIT_RE.is_match(&stripped) {
                continue;
            }
            models.insert(stripped);
        }
    }
    models
}

/// Models match modulo a color-code suffix: HP04 vs HP04IBN, SV18 vs
/// SV18FF. The suffix must be purely alphabetic and ≥2 chars (a single
/// letter may be a real variant).
fn models_color_suffix_match(models_a: &HashSet<String>, models_b: &HashSet<String>) -> bool {
    for a in models_a {
        for b in models_b {
            if a == b {
                continue;
            }
            let (longer, shorter) = if char_len(b) > char_len(a) {
                (b, a)
            } else if char_len(a) > char_len(b) {
                (a, b)
            } else {
                continue;
            };
            if let Some(suffix) = longer.strip_prefix(shorter.as_str()) {
                if char_len(suffix) >= 2 && suffix.chars().all(|c| c.is_alphabetic()) {
                    return true;
                }
            }
        }
    }
    false
}

/// First known brand among canonicalized tokens.
fn extract_brand(tokens: &[String]) -> Option<String> {
    tokens
        .iter()
        .find(|t| BRAND_VALUES.contains(t.as_str()))
        .cloned()
}

/// Count distinct model families. "v8 + sv10k" is one family (paired
/// series name + model code); "v7 + v8" is two. A title carrying two
/// or more families reads as a universal accessory ("V7/V8用").
pub fn count_model_families(models: &HashSet<String>) -> usize {
    if models.len() <= 1 {
        return models.len();
    }

    let prefix_of = |m: &str| -> String {
        MODEL_PREFIX_RE
            .captures(m)
            .map(|c| c[1].to_string())
            .unwrap_or_else(|| m.to_string())
    };

    let mut remaining: HashSet<String> = models.clone();
    let mut pairs_found = 0;
    for pair in PAIRED_PREFIXES {
        let mut by_prefix: std::collections::HashMap<String, Vec<String>> = Default::default();
        for m in &remaining {
            let p = prefix_of(m);
            if pair.contains(&p.as_str()) {
                by_prefix.entry(p).or_default().push(m.clone());
            }
        }
        // A valid pair: exactly one model from each of two different prefixes
        if by_prefix.len() == 2 && by_prefix.values().all(|v| v.len() == 1) {
            pairs_found += 1;
            for ms in by_prefix.values() {
                remaining.remove(&ms[0]);
            }
        }
    }
    pairs_found + remaining.len()
}

fn extract_product_types(tokens: &[String]) -> HashSet<usize> {
    tokens
        .iter()
        .filter_map(|t| TYPE_TOKEN_TO_GROUP.get(t.as_str()).copied())
        .collect()
}

/// Submodel words present in the tokens, in canonical English form.
/// Long katakana compounds are checked by substring
/// ("くりえいたーえでぃしょん" contains "くりえいたー"), and adjacent
/// pairs are joined for compounds ("total"+"clean" → "totalclean").
fn extract_submodel_hits(tokens: &[String]) -> HashSet<String> {
    let canon = |w: &str| -> String {
        SUBMODEL_CANONICAL
            .get(w)
            .map(|c| c.to_string())
            .unwrap_or_else(|| w.to_string())
    };

    let mut found = HashSet::new();
    for t in tokens {
        if SUBMODEL_WORDS.contains(t.as_str()) {
            found.insert(canon(t));
        } else if char_len(t) >= 6 {
            for sw in SUBMODEL_WORDS.iter() {
                if char_len(sw) >= 4 && t.contains(sw) {
                    found.insert(canon(sw));
                }
            }
        }
    }
    for window in tokens.windows(2) {
        let combined = format!("{}{}", window[0], window[1]);
        if SUBMODEL_WORDS.contains(combined.as_str()) {
            found.insert(canon(&combined));
        }
    }
    found
}

/// Variant words differ between the two titles. One side omitting the
/// variant name is not a conflict; the listing simply doesn't mention it.
fn submodel_conflict(y_tokens: &[String], a_tokens: &[String]) -> bool {
    let y_sub = extract_submodel_hits(y_tokens);
    let a_sub = extract_submodel_hits(a_tokens);
    if y_sub.is_empty() || a_sub.is_empty() {
        return false;
    }
    y_sub != a_sub
}

/// Token list contains part/accessory language. Exact match plus a
/// suffix match ("電源あだぷたー") and a guarded prefix match
/// ("へっど軽量版": remainder must be short or carry a confirming
/// suffix, so "こーどれすくりーなー" does not trip it).
fn has_accessory_words(tokens: &[String], extra: &HashSet<String>) -> bool {
    for t in tokens {
        if ACCESSORY_WORDS.contains(t.as_str()) || extra.contains(t.as_str()) {
            return true;
        }
    }
    for t in tokens {
        if char_len(t) < 4 {
            continue;
        }
        for aw in ACCESSORY_WORDS.iter() {
            if char_len(aw) < 3 || t == aw {
                continue;
            }
            if t.ends_with(aw) {
                return true;
            }
            if let Some(remainder) = t.strip_prefix(aw) {
                if char_len(remainder) <= 2 {
                    return true;
                }
                if ACCESSORY_PREFIX_SUFFIXES
                    .iter()
                    .any(|sfx| remainder.ends_with(sfx))
                {
                    return true;
                }
            }
        }
    }
    false
}

/// Accessory words among the first meaningful tokens. Sellers put 検索用
/// filler at the end of titles, so the leading tokens carry the real
/// product type.
fn accessory_in_leading_tokens(tokens: &[String], extra: &HashSet<String>) -> bool {
    const MAX_POS: usize = 5;
    let meaningful: Vec<String> = tokens
        .iter()
        .take(MAX_POS * 2)
        .filter(|t| !NOISE_WORDS.contains(t.as_str()) && char_len(t) >= 2)
        .take(MAX_POS)
        .cloned()
        .collect();
    has_accessory_words(&meaningful, extra)
}

/// Product quantity from normalized text ("3個セット", "2-pack", "×5").
/// Returns 1 when no counter is present.
fn extract_quantity(text: &str) -> u32 {
    let in_range = |qty: u32| (2..=100).contains(&qty);

    for m in QTY_JA_RE.captures_iter(text) {
        if let Ok(qty) = m[1].parse::<u32>() {
            if in_range(qty) {
                return qty;
            }
        }
    }
    for m in QTY_JA_SET_RE.captures_iter(text) {
        if let Ok(qty) = m[1].parse::<u32>() {
            if in_range(qty) {
                return qty;
            }
        }
    }
    for m in QTY_EN_RE.captures_iter(text) {
        let group = m.get(1).or_else(|| m.get(2)).or_else(|| m.get(3));
        if let Some(g) = group {
            if let Ok(qty) = g.as_str().parse::<u32>() {
                if in_range(qty) {
                    return qty;
                }
            }
        }
    }
    1
}

/// Full normalization + tokenization pipeline shared by the matcher
/// entry points.
fn pipeline(title: &str) -> Vec<String> {
    let tokens = tokenize(&normalize(title));
    let tokens = split_known_brands(tokens);
    let tokens = canonicalize_tokens(tokens);
    merge_product_number_tokens(tokens)
}

/// Extract (brand, model numbers, key tokens) from a product title.
pub fn extract_product_info(title: &str) -> (Option<String>, HashSet<String>, Vec<String>) {
    let canon = pipeline(title);
    let brand = extract_brand(&canon);
    let models = extract_model_numbers(&canon);
    let key_tokens = canon
        .iter()
        .filter(|t| {
            !NOISE_WORDS.contains(t.as_str())
                && char_len(t) >= 2
                && !models.contains(t.as_str())
                && Some(t.as_str()) != brand.as_deref()
        })
        .cloned()
        .collect();
    (brand, models, key_tokens)
}

/// Model numbers from arbitrary text (descriptions, features, etc.).
pub fn extract_model_numbers_from_text(text: &str) -> HashSet<String> {
    extract_model_numbers(&pipeline(text))
}

/// Arbitrary text contains accessory/parts language.
pub fn extract_accessory_signals_from_text(text: &str, extra: &HashSet<String>) -> bool {
    let tokens = canonicalize_tokens(split_known_brands(tokenize(&normalize(text))));
    has_accessory_words(&tokens, extra)
}

/// Text is apparel-related (brand or product type), checked on both the
/// raw and normalized forms so it works early in the pipeline.
pub fn is_apparel(text: &str) -> bool {
    let lower = text.to_lowercase();
    let normalized = normalize(text);
    for brand in APPAREL_BRANDS.iter() {
        if lower.contains(brand) || normalized.contains(brand) {
            return true;
        }
    }
    let tokens: HashSet<String> = tokenize(&normalized).into_iter().collect();
    tokens.iter().any(|t| APPAREL_WORDS.contains(t.as_str()))
}

/// Result of comparing two product titles.
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub score: f64,
    pub model_match: bool,
    pub model_conflict: bool,
    pub brand_match: bool,
    pub brand_conflict: bool,
    pub type_conflict: bool,
    pub qty_conflict: bool,
    pub accessory_conflict: bool,
    /// Jaccard similarity of meaningful tokens.
    pub token_overlap: f64,
    /// Set by callers when the provider's model field confirms the match.
    pub keepa_model_match: bool,
    has_models: bool,
    threshold_delta: f64,
}

impl MatchResult {
    pub fn is_likely_match(&self) -> bool {
        if self.qty_conflict
            || self.brand_conflict
            || self.model_conflict
            || self.accessory_conflict
        {
            return false;
        }
        // Model evidence is required: a pair where neither title yields a
        // model number (and the provider doesn't confirm one) is too weak
        // to act on, whatever the token overlap says.
        if !self.has_models && !self.keepa_model_match {
            return false;
        }
        self.score >= MATCH_THRESHOLD + self.threshold_delta
    }

    /// Stricter validation for high-margin deals, which usually mean
    /// mismatched products.
    pub fn passes_strict_check(&self) -> bool {
        if self.qty_conflict || self.model_conflict || self.type_conflict {
            return false;
        }
        if self.score < STRICT_MATCH_THRESHOLD {
            return false;
        }
        self.model_match || self.token_overlap >= 0.40
    }
}

/// Compare an auction title with a marketplace product title.
pub fn match_products(yahoo_title: &str, amazon_title: &str) -> MatchResult {
    match_products_with(yahoo_title, amazon_title, &OverrideSnapshot::default())
}

/// `match_products` with the learned override snapshot applied
/// (extra accessory words and threshold delta).
pub fn match_products_with(
    yahoo_title: &str,
    amazon_title: &str,
    ov: &OverrideSnapshot,
) -> MatchResult {
    let y_norm = normalize(yahoo_title);
    let a_norm = normalize(amazon_title);

    let y_tokens = tokenize(&y_norm);
    let a_tokens = tokenize(&a_norm);
    if y_tokens.is_empty() || a_tokens.is_empty() {
        return MatchResult::default();
    }

    let y_canon = merge_product_number_tokens(canonicalize_tokens(split_known_brands(y_tokens)));
    let a_canon = merge_product_number_tokens(canonicalize_tokens(split_known_brands(a_tokens)));

    let mut score = 0.0_f64;

    // Model number comparison (strongest signal)
    let y_models = extract_model_numbers(&y_canon);
    let a_models = extract_model_numbers(&a_canon);
    let mut model_match = false;
    let mut model_conflict = false;

    if !y_models.is_empty() && !a_models.is_empty() {
        if y_models.intersection(&a_models).next().is_some()
            || models_color_suffix_match(&y_models, &a_models)
        {
            model_match = true;
            score += 0.50;
        } else {
            model_conflict = true;
            score -= 0.30;
        }
    }

    // Brand comparison
    let y_brand = extract_brand(&y_canon);
    let a_brand = extract_brand(&a_canon);
    let mut brand_match = false;
    let mut brand_conflict = false;
    if let (Some(yb), Some(ab)) = (&y_brand, &a_brand) {
        if yb == ab {
            brand_match = true;
            score += 0.20;
        } else {
            brand_conflict = true;
            score -= 0.10;
        }
    }

    // Product type conflict (パック vs BOX, ケース vs 本体)
    let y_types = extract_product_types(&y_canon);
    let a_types = extract_product_types(&a_canon);
    let mut type_conflict = false;
    if !y_types.is_empty()
        && !a_types.is_empty()
        && y_types.intersection(&a_types).next().is_none()
    {
        type_conflict = true;
        score -= 0.20;
    }

    // A title carrying 2+ distinct model families is a "V7/V8用"
    // universal part; "v8 sv10k" is one product (series + code).
    let y_multi_model = count_model_families(&y_models) >= 2;
    let a_multi_model = count_model_families(&a_models) >= 2;

    // "用" (for / compatible with): "V11用ローラーヘッド" is a part for V11
    let y_has_you = y_canon.iter().any(|t| t.starts_with('用') || t.ends_with('用'));
    let a_has_you = a_canon.iter().any(|t| t.starts_with('用') || t.ends_with('用'));

    // Accessory vs main product conflict
    let y_is_accessory =
        has_accessory_words(&y_canon, &ov.extra_accessory_words) || y_multi_model || y_has_you;
    let a_is_accessory =
        has_accessory_words(&a_canon, &ov.extra_accessory_words) || a_multi_model || a_has_you;
    let mut accessory_conflict = false;
    if y_is_accessory != a_is_accessory {
        accessory_conflict = true;
        if accessory_in_leading_tokens(&y_canon, &ov.extra_accessory_words)
            || accessory_in_leading_tokens(&a_canon, &ov.extra_accessory_words)
        {
            score -= 0.60;
        } else {
            score -= 0.40;
        }
    }

    // Same base model but different variant (Slim vs non-Slim)
    if model_match && submodel_conflict(&y_canon, &a_canon) {
        model_match = false;
        model_conflict = true;
        score -= 0.50; // reverse the bonus and penalize
    }

    // Quantity conflict (1個 vs 3個セット)
    let qty_conflict = extract_quantity(&y_norm) != extract_quantity(&a_norm);
    if qty_conflict {
        score -= 0.40;
    }

    // Token Jaccard similarity, noise excluded
    let y_clean: HashSet<&String> = y_canon
        .iter()
        .filter(|t| !NOISE_WORDS.contains(t.as_str()) && char_len(t) >= 2)
        .collect();
    let a_clean: HashSet<&String> = a_canon
        .iter()
        .filter(|t| !NOISE_WORDS.contains(t.as_str()) && char_len(t) >= 2)
        .collect();
    let mut jaccard = 0.0;
    if !y_clean.is_empty() && !a_clean.is_empty() {
        let intersection = y_clean.intersection(&a_clean).count();
        let union = y_clean.union(&a_clean).count();
        if union > 0 {
            jaccard = intersection as f64 / union as f64;
            score += 0.30 * jaccard;
        }
    }

    MatchResult {
        score: score.clamp(0.0, 1.0),
        model_match,
        model_conflict,
        brand_match,
        brand_conflict,
        type_conflict,
        qty_conflict,
        accessory_conflict,
        token_overlap: jaccard,
        keepa_model_match: false,
        has_models: !y_models.is_empty() || !a_models.is_empty(),
        threshold_delta: ov.threshold_adjustment,
    }
}

/// Two search keywords are near-duplicates.
///
/// Three-layer check: a brand or model disagreement means different
/// search intent (never similar); then token Jaccard; then, for short
/// keywords, character-bigram overlap of the space-stripped forms
/// (catches compound tokens like "さいくろん式" vs "さいくろん掃除機").
pub fn keywords_are_similar(kw1: &str, kw2: &str, threshold: f64) -> bool {
    let n1 = normalize(kw1);
    let n2 = normalize(kw2);

    let clean = |n: &str| -> HashSet<String> {
        canonicalize_tokens(split_known_brands(tokenize(n)))
            .into_iter()
            .filter(|t| !NOISE_WORDS.contains(t.as_str()) && char_len(t) >= 2)
            .collect()
    };
    let t1 = clean(&n1);
    let t2 = clean(&n2);
    if t1.is_empty() || t2.is_empty() {
        return false;
    }

    let b1: HashSet<&String> = t1.iter().filter(|t| BRAND_VALUES.contains(t.as_str())).collect();
    let b2: HashSet<&String> = t2.iter().filter(|t| BRAND_VALUES.contains(t.as_str())).collect();
    // Different brands, or brand on only one side: different intent
    if !b1.is_empty() && !b2.is_empty() && b1 != b2 {
        return false;
    }
    if b1.is_empty() != b2.is_empty() {
        return false;
    }

    // "x v8" vs "x v10" are different searches
    let v1: Vec<String> = t1.iter().cloned().collect();
    let v2: Vec<String> = t2.iter().cloned().collect();
    let m1 = extract_model_numbers(&v1);
    let m2 = extract_model_numbers(&v2);
    if !m1.is_empty() && !m2.is_empty() && m1.intersection(&m2).next().is_none() {
        return false;
    }

    let jaccard =
        t1.intersection(&t2).count() as f64 / t1.union(&t2).count() as f64;
    if jaccard >= threshold {
        return true;
    }

    if t1.len() <= 4 && t2.len() <= 4 {
        let s1: Vec<char> = n1.chars().filter(|c| *c != ' ').collect();
        let s2: Vec<char> = n2.chars().filter(|c| *c != ' ').collect();
        if s1.len() < 4 || s2.len() < 4 {
            return false;
        }
        let bigrams = |s: &[char]| -> HashSet<(char, char)> {
            s.windows(2).map(|w| (w[0], w[1])).collect()
        };
        let bg1 = bigrams(&s1);
        let bg2 = bigrams(&s2);
        let union = bg1.union(&bg2).count();
        if union > 0 {
            let sim = bg1.intersection(&bg2).count() as f64 / union as f64;
            if sim >= 0.6 {
                return true;
            }
        }
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_folds_width_case_and_kana() {
        assert_eq!(normalize("ＳＯＮＹ"), "sony");
        assert_eq!(normalize("ニンテンドー"), "にんてんどー");
        assert_eq!(normalize("ニンテンドーSwitch"), "にんてんどー switch");
    }

    #[test]
    fn model_extraction_skips_spec_units() {
        let models = extract_model_numbers_from_text("SONY WH-1000XM4 128GB 60Hz 4K");
        assert!(models.contains("wh1000xm4"));
        assert!(!models.contains("128gb"));
        assert!(!models.contains("60hz"));
        assert!(!models.contains("4k"));
    }

    #[test]
    fn same_model_different_language_matches() {
        let r = match_products(
            "Sony WH-1000XM4 ワイヤレスヘッドホン",
            "Sony WH-1000XM4 Wireless Headphones",
        );
        assert!(r.is_likely_match());
        assert!(r.model_match);
        assert!(r.brand_match);
    }

    #[test]
    fn different_model_conflicts() {
        let r = match_products("Sony WH-1000XM4 ヘッドホン", "Sony WH-1000XM5 ヘッドホン");
        assert!(!r.is_likely_match());
        assert!(r.model_conflict);
    }

    #[test]
    fn accessory_vs_main_conflicts() {
        let r = match_products("WH-1000XM5 イヤーパッド", "Sony WH-1000XM5 ヘッドホン");
        assert!(!r.is_likely_match());
        assert!(r.accessory_conflict);
    }

    #[test]
    fn different_brand_conflicts() {
        let r = match_products("アイリスオーヤマ IC-SLDCP5", "ツインバード TC-E123");
        assert!(!r.is_likely_match());
        assert!(r.brand_conflict);
    }

    #[test]
    fn self_match_requires_model_evidence() {
        // With a model number: a sure match
        let with_model = "Casio XD-900 電子辞書";
        let r = match_products(with_model, with_model);
        assert!(r.is_likely_match());

        // Without one: identical titles are still too weak to act on
        let without_model = "ソニー ワイヤレスヘッドホン 黒";
        let r = match_products(without_model, without_model);
        assert!(!r.is_likely_match());
    }

    #[test]
    fn keepa_model_match_supplies_evidence() {
        let mut r = match_products("ダイソン コードレスクリーナー", "Dyson コードレスクリーナー");
        assert!(!r.is_likely_match());
        r.keepa_model_match = true;
        assert!(r.is_likely_match());
    }

    #[test]
    fn match_is_symmetric() {
        let pairs = [
            ("Sony WH-1000XM4 ヘッドホン", "Sony WH-1000XM5 ヘッドホン"),
            ("WH-1000XM5 イヤーパッド", "Sony WH-1000XM5 ヘッドホン"),
            ("GoPro HERO12 Black", "GoPro ヒーロー12 ブラック"),
        ];
        for (a, b) in pairs {
            assert_eq!(
                match_products(a, b).is_likely_match(),
                match_products(b, a).is_likely_match(),
                "asymmetric for {a} / {b}"
            );
        }
    }

    #[test]
    fn match_is_idempotent_under_normalization() {
        let y = "ＳＯＮＹ ＷＨ-１０００ＸＭ４ ヘッドホン";
        let a = "Sony WH-1000XM4 Headphones";
        let raw = match_products(y, a);
        let renorm = match_products(&normalize(y), &normalize(a));
        assert_eq!(raw.is_likely_match(), renorm.is_likely_match());
        assert_eq!(raw.model_match, renorm.model_match);
    }

    #[test]
    fn quantity_mismatch_rejects() {
        let r = match_products(
            "Panasonic エネループ 単3 BK-3MCC",
            "Panasonic エネループ 単3 BK-3MCC 4個セット",
        );
        assert!(r.qty_conflict);
        assert!(!r.is_likely_match());
    }

    #[test]
    fn color_suffix_counts_as_model_match() {
        let r = match_products("Dyson SV18 コードレスクリーナー", "Dyson SV18FF 掃除機");
        assert!(r.model_match);
        assert!(!r.model_conflict);
    }

    #[test]
    fn submodel_variant_breaks_model_match() {
        let r = match_products(
            "ダイソン V8 Slim Fluffy Extra 掃除機",
            "Dyson V8 Fluffy 掃除機",
        );
        assert!(r.model_conflict);
        assert!(!r.is_likely_match());
    }

    #[test]
    fn paired_prefixes_are_one_family() {
        let models: HashSet<String> =
            ["v8".to_string(), "sv10k".to_string()].into_iter().collect();
        assert_eq!(count_model_families(&models), 1);

        let models: HashSet<String> =
            ["v7".to_string(), "v8".to_string()].into_iter().collect();
        assert_eq!(count_model_families(&models), 2);
    }

    #[test]
    fn hero_merges_with_number() {
        let (_, models, _) = extract_product_info("GoPro ヒーロー12 ブラック");
        assert!(models.contains("hero12"));
    }

    #[test]
    fn learned_accessory_word_flips_conflict() {
        let y = "WH-1000XM5 せんようけーす";
        let a = "Sony WH-1000XM5 ヘッドホン";
        // The word is unknown to the static lexicon: the pair matches
        let r = match_products(y, a);
        assert!(!r.accessory_conflict);
        assert!(r.is_likely_match());

        // Once learned as an accessory word, the same pair hard-rejects
        let mut ov = OverrideSnapshot::default();
        ov.extra_accessory_words.insert("せんようけーす".to_string());
        let r = match_products_with(y, a, &ov);
        assert!(r.accessory_conflict);
        assert!(!r.is_likely_match());
    }

    #[test]
    fn apparel_detection() {
        assert!(is_apparel("NIKE エアマックス スニーカー 27cm"));
        assert!(is_apparel("ルイヴィトン 長財布"));
        assert!(!is_apparel("Sony WH-1000XM4 ヘッドホン"));
    }

    #[test]
    fn similar_keywords_collapse() {
        assert!(keywords_are_similar("Sony ヘッドホン", "ソニー ヘッドホン", 0.6));
        assert!(!keywords_are_similar("sony ヘッドホン", "dyson ヘッドホン", 0.6));
        assert!(!keywords_are_similar("ダイソン v8", "ダイソン v10", 0.6));
        // Brand on one side only: different intent
        assert!(!keywords_are_similar("ヘッドホン", "ソニー ヘッドホン", 0.6));
    }

    #[test]
    fn bigram_layer_catches_compound_tokens() {
        assert!(keywords_are_similar(
            "サイクロン式掃除機",
            "サイクロン掃除機",
            0.6
        ));
    }
}
