//! Rejection learning: turn operator feedback on false-positive alerts
//! into matcher overrides.

use std::collections::{HashMap, HashSet};

use anyhow::Result;
use serde::Serialize;
use serde_json::json;
use tracing::info;

use crate::matcher::{
    self, count_model_families, extract_model_numbers_from_text, lexicon, match_products,
    normalize, tokenize,
};
use crate::models::{DealAlert, PatternType, RejectionReason};
use crate::store::Store;

/// One proposed rejection reason for the operator dialog.
#[derive(Debug, Clone, Serialize)]
pub struct SuggestedReason {
    pub reason: RejectionReason,
    pub label: String,
    pub confidence: f64,
}

/// Pre-UI heuristic: rank likely rejection reasons for an alert from
/// the matcher flags, the token sets, and past rejections of the same
/// ASIN. At most five suggestions, best first.
pub fn suggest_reasons(alert: &DealAlert, store: &Store) -> Result<Vec<SuggestedReason>> {
    let mut suggestions: Vec<SuggestedReason> = Vec::new();

    let y_tokens = tokenize(&normalize(&alert.yahoo_title));
    let a_tokens = tokenize(&normalize(&alert.amazon_title));
    let result = match_products(&alert.yahoo_title, &alert.amazon_title);

    let y_models = extract_model_numbers_from_text(&alert.yahoo_title);
    let a_models = extract_model_numbers_from_text(&alert.amazon_title);

    if result.model_conflict && !y_models.is_empty() && !a_models.is_empty() {
        let fmt = |models: &HashSet<String>| {
            let mut sorted: Vec<&String> = models.iter().collect();
            sorted.sort();
            sorted
                .iter()
                .take(3)
                .map(|m| m.to_uppercase())
                .collect::<Vec<_>>()
                .join("/")
        };
        suggestions.push(SuggestedReason {
            reason: RejectionReason::ModelVariant,
            label: format!("モデル番号違い: {} ≠ {}", fmt(&y_models), fmt(&a_models)),
            confidence: 0.95,
        });
    }

    if result.accessory_conflict {
        let detected = y_tokens
            .iter()
            .find(|t| lexicon::ACCESSORY_WORDS.contains(t.as_str()));
        match detected {
            Some(word) => suggestions.push(SuggestedReason {
                reason: RejectionReason::Accessory,
                label: format!("部品/アクセサリー ({word})"),
                confidence: 0.90,
            }),
            None => suggestions.push(SuggestedReason {
                reason: RejectionReason::Accessory,
                label: "部品/アクセサリー (本体ではない可能性)".to_string(),
                confidence: 0.75,
            }),
        }
    }

    // Multiple model families on the auction side: a universal part
    if !result.accessory_conflict && count_model_families(&y_models) >= 2 {
        let mut sorted: Vec<&String> = y_models.iter().collect();
        sorted.sort();
        let models_str = sorted
            .iter()
            .take(4)
            .map(|m| m.to_uppercase())
            .collect::<Vec<_>>()
            .join("/");
        suggestions.push(SuggestedReason {
            reason: RejectionReason::Accessory,
            label: format!("汎用パーツ ({models_str}用)"),
            confidence: 0.80,
        });
    }

    if alert.yahoo_price > 0 && alert.sell_price > 0 {
        let ratio = alert.yahoo_price as f64 / alert.sell_price as f64;
        if ratio < 0.20 {
            suggestions.push(SuggestedReason {
                reason: RejectionReason::Accessory,
                label: format!(
                    "価格差が大きい (仕入{}円 vs 販売{}円)",
                    alert.yahoo_price, alert.sell_price
                ),
                confidence: 0.70,
            });
        } else if ratio > 0.85 {
            suggestions.push(SuggestedReason {
                reason: RejectionReason::BadPrice,
                label: "利益が出ない価格帯".to_string(),
                confidence: 0.65,
            });
        }
    }

    if result.brand_conflict {
        suggestions.push(SuggestedReason {
            reason: RejectionReason::WrongProduct,
            label: "ブランド違い".to_string(),
            confidence: 0.90,
        });
    }
    if result.type_conflict {
        suggestions.push(SuggestedReason {
            reason: RejectionReason::WrongProduct,
            label: "商品タイプ違い".to_string(),
            confidence: 0.70,
        });
    }
    if result.qty_conflict {
        suggestions.push(SuggestedReason {
            reason: RejectionReason::WrongProduct,
            label: "数量/セット内容違い".to_string(),
            confidence: 0.80,
        });
    }

    // Tokens only on the auction side that flag a partial item
    const PARTIAL_SIGNALS: &[&str] = &[
        "単体", "たんたい", "のみ", "only", "単品", "たんぴん", "ジャンク", "じゃんく",
    ];
    let a_set: HashSet<&String> = a_tokens.iter().collect();
    let found_partial = y_tokens.iter().find(|t| {
        !a_set.contains(t)
            && !lexicon::NOISE_WORDS.contains(t.as_str())
            && PARTIAL_SIGNALS.contains(&t.as_str())
    });
    if let Some(word) = found_partial {
        if !suggestions
            .iter()
            .any(|s| s.reason == RejectionReason::Accessory)
        {
            suggestions.push(SuggestedReason {
                reason: RejectionReason::Accessory,
                label: format!("部分品の可能性 ({word})"),
                confidence: 0.60,
            });
        }
    }

    // A prior rejection of the same ASIN trumps everything
    if let Some(past) = store.find_problem_pair_for_asin(&alert.amazon_asin)? {
        let data: serde_json::Value =
            serde_json::from_str(&past.pattern_data).unwrap_or(serde_json::Value::Null);
        let prev_reason = data["reason"]
            .as_str()
            .and_then(RejectionReason::parse_str)
            .unwrap_or(RejectionReason::WrongProduct);
        suggestions.insert(
            0,
            SuggestedReason {
                reason: prev_reason,
                label: format!("過去に同様の却下あり ({}回)", past.hit_count),
                confidence: 0.98,
            },
        );
    }

    // Dedup by (reason, label), keep the highest confidence, rank
    let mut best: HashMap<String, SuggestedReason> = HashMap::new();
    for s in suggestions {
        let key = format!("{}:{}", s.reason.as_str(), s.label);
        match best.get(&key) {
            Some(existing) if existing.confidence >= s.confidence => {}
            _ => {
                best.insert(key, s);
            }
        }
    }
    let mut ranked: Vec<SuggestedReason> = best.into_values().collect();
    ranked.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked.truncate(5);
    Ok(ranked)
}

/// Learn from a single confirmed rejection: upsert the pattern rows the
/// matcher reads back through its override snapshot.
pub fn analyze_single_rejection(
    alert: &DealAlert,
    reason: RejectionReason,
    store: &Store,
) -> Result<()> {
    let y_tokens = tokenize(&normalize(&alert.yahoo_title));
    let a_tokens = tokenize(&normalize(&alert.amazon_title));

    match reason {
        RejectionReason::Accessory => learn_accessory_words(alert, &y_tokens, &a_tokens, store)?,
        RejectionReason::ModelVariant => learn_model_conflict(alert, store)?,
        RejectionReason::BadPrice => learn_price_pattern(alert, store)?,
        RejectionReason::NeverShow => {
            store.upsert_rejection_pattern(
                PatternType::NeverShowPair,
                &format!("{}:{}", alert.yahoo_auction_id, alert.amazon_asin),
                &json!({
                    "yahoo_title": alert.yahoo_title,
                    "amazon_title": alert.amazon_title,
                })
                .to_string(),
                0.9,
            )?;
        }
        RejectionReason::WrongProduct | RejectionReason::Other => {}
    }

    // Always record the problem pair for future reference
    store.upsert_rejection_pattern(
        PatternType::ProblemPair,
        &format!("{}:{}", alert.yahoo_auction_id, alert.amazon_asin),
        &json!({
            "reason": reason.as_str(),
            "yahoo_title": truncate(&alert.yahoo_title, 100),
            "amazon_title": truncate(&alert.amazon_title, 100),
            "yahoo_price": alert.yahoo_price,
            "sell_price": alert.sell_price,
        })
        .to_string(),
        0.8,
    )?;

    // Three strikes on one ASIN blocks it outright
    let asin_rejections = store.count_rejected_alerts_for_asin(&alert.amazon_asin)?;
    if asin_rejections >= 3 {
        store.upsert_rejection_pattern(
            PatternType::BlockedAsin,
            &alert.amazon_asin,
            &json!({
                "rejection_count": asin_rejections,
                "last_reason": reason.as_str(),
            })
            .to_string(),
            (0.5 + asin_rejections as f64 * 0.1).min(1.0),
        )?;
    }

    info!(
        alert_id = alert.id,
        reason = reason.as_str(),
        asin = %alert.amazon_asin,
        "Rejection patterns extracted"
    );
    Ok(())
}

/// Auction-side tokens missing from the marketplace title are accessory
/// candidates; each starts at low confidence and earns its way into the
/// matcher through repeat hits.
fn learn_accessory_words(
    alert: &DealAlert,
    y_tokens: &[String],
    a_tokens: &[String],
    store: &Store,
) -> Result<()> {
    let a_set: HashSet<&String> = a_tokens.iter().collect();
    for word in y_tokens {
        if a_set.contains(word)
            || lexicon::NOISE_WORDS.contains(word.as_str())
            || lexicon::ACCESSORY_WORDS.contains(word.as_str())
        {
            continue;
        }
        if word.chars().count() < 2 || word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        // Starts below the matcher's 0.6 activation floor; the second
        // observation lifts it over (0.5 + 0.1) with hit_count 2
        store.upsert_rejection_pattern(
            PatternType::AccessoryWord,
            word,
            &json!({
                "word": word,
                "source_title": truncate(&alert.yahoo_title, 100),
            })
            .to_string(),
            0.5,
        )?;
    }
    Ok(())
}

fn learn_model_conflict(alert: &DealAlert, store: &Store) -> Result<()> {
    let y_models = extract_model_numbers_from_text(&alert.yahoo_title);
    let a_models = extract_model_numbers_from_text(&alert.amazon_title);
    if y_models.is_empty() || a_models.is_empty() || y_models == a_models {
        return Ok(());
    }

    let join = |models: &HashSet<String>| {
        let mut sorted: Vec<String> = models.iter().cloned().collect();
        sorted.sort();
        sorted.join("|")
    };
    let y_sorted: Vec<String> = {
        let mut v: Vec<String> = y_models.iter().cloned().collect();
        v.sort();
        v
    };
    let a_sorted: Vec<String> = {
        let mut v: Vec<String> = a_models.iter().cloned().collect();
        v.sort();
        v
    };

    store.upsert_rejection_pattern(
        PatternType::ModelConflict,
        &format!("{}:{}", join(&y_models), join(&a_models)),
        &json!({
            "yahoo_models": y_sorted,
            "amazon_models": a_sorted,
            "yahoo_title": truncate(&alert.yahoo_title, 100),
            "amazon_title": truncate(&alert.amazon_title, 100),
        })
        .to_string(),
        0.7,
    )?;
    Ok(())
}

fn learn_price_pattern(alert: &DealAlert, store: &Store) -> Result<()> {
    if alert.sell_price <= 0 {
        return Ok(());
    }
    let ratio = alert.yahoo_price as f64 / alert.sell_price as f64;
    store.upsert_rejection_pattern(
        PatternType::ThresholdHint,
        "price_ratio",
        &json!({
            "latest_ratio": (ratio * 1000.0).round() / 1000.0,
            "yahoo_price": alert.yahoo_price,
            "sell_price": alert.sell_price,
        })
        .to_string(),
        0.5,
    )?;
    Ok(())
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct RejectionSummary {
    pub total: usize,
    pub by_reason: HashMap<String, usize>,
    pub false_positive_rate: f64,
    pub new_accessory_words: Vec<String>,
    pub threshold_adjustment: f64,
}

/// Batch pass over all rejections, run at the tail of every discovery
/// cycle: compute the false-positive rate, raise the match threshold
/// when it runs hot, and report the accessory words that have earned
/// matcher status.
pub fn analyze_all_rejections(store: &Store) -> Result<RejectionSummary> {
    let all = store.list_all_alerts()?;
    let rejected: Vec<&DealAlert> = all
        .iter()
        .filter(|a| a.status == crate::models::AlertStatus::Rejected)
        .collect();

    if rejected.is_empty() {
        return Ok(RejectionSummary::default());
    }

    let mut by_reason: HashMap<String, usize> = HashMap::new();
    for a in &rejected {
        let key = a
            .rejection_reason
            .map(|r| r.as_str().to_string())
            .unwrap_or_default();
        *by_reason.entry(key).or_insert(0) += 1;
    }

    let fp_rate = rejected.len() as f64 / all.len().max(1) as f64;

    let new_accessory_words: Vec<String> = store
        .list_patterns_of_type(PatternType::AccessoryWord)?
        .into_iter()
        .filter(|p| p.hit_count >= 2 && p.confidence >= 0.6)
        .map(|p| p.pattern_key)
        .collect();

    let threshold_adj = if fp_rate > 0.5 && rejected.len() >= 5 {
        0.05
    } else if fp_rate > 0.3 && rejected.len() >= 10 {
        0.03
    } else {
        0.0
    };

    if threshold_adj > 0.0 {
        store.upsert_rejection_pattern(
            PatternType::ThresholdHint,
            "match_threshold",
            &json!({
                "adjustment": threshold_adj,
                "false_positive_rate": (fp_rate * 1000.0).round() / 1000.0,
                "total_rejected": rejected.len(),
                "total_alerts": all.len(),
            })
            .to_string(),
            (0.5 + fp_rate).min(1.0),
        )?;
    }

    info!(
        rejected = rejected.len(),
        total = all.len(),
        fp_rate = format!("{:.0}%", fp_rate * 100.0),
        learned_accessory_words = new_accessory_words.len(),
        threshold_adj,
        "Batch rejection analysis"
    );

    Ok(RejectionSummary {
        total: rejected.len(),
        by_reason,
        false_positive_rate: (fp_rate * 1000.0).round() / 1000.0,
        new_accessory_words,
        threshold_adjustment: threshold_adj,
    })
}

fn truncate(s: &str, max_chars: usize) -> String {
    s.chars().take(max_chars).collect()
}

/// Full rejection flow used by the HTTP surface: persist the status
/// change, learn from it, and reload the matcher overrides.
pub fn reject_alert(
    alert_id: i64,
    reason: RejectionReason,
    note: &str,
    store: &Store,
    overrides: &matcher::MatcherOverrides,
) -> Result<Option<DealAlert>> {
    let mut alert = match store.get_alert(alert_id)? {
        Some(alert) => alert,
        None => return Ok(None),
    };
    alert.status = crate::models::AlertStatus::Rejected;
    alert.rejection_reason = Some(reason);
    alert.rejection_note = note.to_string();
    alert.rejected_at = Some(chrono::Utc::now());
    store.update_alert(&alert)?;

    analyze_single_rejection(&alert, reason, store)?;
    overrides.reload(&store.list_active_patterns()?);
    Ok(Some(alert))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AlertStatus;
    use crate::store::NewKeyword;
    use chrono::Utc;

    fn alert(store: &Store, auction_id: &str, asin: &str, y: &str, a: &str) -> DealAlert {
        let kw = store
            .insert_keyword(&NewKeyword::manual(&format!("kw-{auction_id}-{asin}")))
            .unwrap()
            .unwrap();
        store
            .insert_alert(&DealAlert {
                id: 0,
                keyword_id: kw.id,
                yahoo_auction_id: auction_id.to_string(),
                amazon_asin: asin.to_string(),
                yahoo_title: y.to_string(),
                yahoo_url: String::new(),
                yahoo_image_url: String::new(),
                amazon_title: a.to_string(),
                yahoo_price: 3000,
                yahoo_shipping: 0,
                sell_price: 10_000,
                gross_profit: 5100,
                gross_margin_pct: 51.0,
                amazon_fee_pct: 10.0,
                forwarding_cost: 800,
                notified_at: Utc::now(),
                status: AlertStatus::Active,
                rejection_reason: None,
                rejection_note: String::new(),
                rejected_at: None,
            })
            .unwrap()
            .unwrap()
    }

    #[test]
    fn model_conflict_suggests_variant() {
        let store = Store::open_in_memory().unwrap();
        let a = alert(
            &store,
            "x1",
            "B0A",
            "Sony WH-1000XM4 ヘッドホン",
            "Sony WH-1000XM5 ヘッドホン",
        );
        let reasons = suggest_reasons(&a, &store).unwrap();
        assert_eq!(reasons[0].reason, RejectionReason::ModelVariant);
        assert!(reasons[0].label.contains("WH1000XM4"));
    }

    #[test]
    fn accessory_rejection_learns_yahoo_only_words() {
        let store = Store::open_in_memory().unwrap();
        let a = alert(
            &store,
            "x2",
            "B0B",
            "WH-1000XM5 せんようきっと",
            "Sony WH-1000XM5 ヘッドホン",
        );
        analyze_single_rejection(&a, RejectionReason::Accessory, &store).unwrap();

        let words: Vec<String> = store
            .list_patterns_of_type(PatternType::AccessoryWord)
            .unwrap()
            .into_iter()
            .map(|p| p.pattern_key)
            .collect();
        assert!(words.contains(&"せんようきっと".to_string()));
        // Model number itself is never an accessory word
        assert!(!words.iter().any(|w| w.contains("1000xm5")));
    }

    #[test]
    fn learned_word_reaches_matcher_after_two_hits() {
        let store = Store::open_in_memory().unwrap();
        let overrides = matcher::MatcherOverrides::new();
        let y = "WH-1000XM5 せんようきっと";
        let a_title = "Sony WH-1000XM5 ヘッドホン";

        // First observation: hit_count 1 keeps the word out
        let a = alert(&store, "x30", "B0C1", y, a_title);
        reject_alert(a.id, RejectionReason::Accessory, "", &store, &overrides).unwrap();
        let snap = overrides.snapshot();
        assert!(!snap.extra_accessory_words.contains("せんようきっと"));

        // Second observation: hit_count 2, confidence 0.6 — active
        let a = alert(&store, "x31", "B0C2", y, a_title);
        reject_alert(a.id, RejectionReason::Accessory, "", &store, &overrides).unwrap();
        let snap = overrides.snapshot();
        assert!(snap.extra_accessory_words.contains("せんようきっと"));

        // And the matcher now hard-rejects the pair
        let r = matcher::match_products_with(y, a_title, &snap);
        assert!(r.accessory_conflict);
        assert!(!r.is_likely_match());
    }

    #[test]
    fn third_rejection_blocks_the_asin() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..3 {
            let a = alert(
                &store,
                &format!("x5{i}"),
                "B0SAME",
                "title a",
                "title b",
            );
            let mut rejected = a.clone();
            rejected.status = AlertStatus::Rejected;
            rejected.rejection_reason = Some(RejectionReason::WrongProduct);
            store.update_alert(&rejected).unwrap();
            analyze_single_rejection(&rejected, RejectionReason::WrongProduct, &store).unwrap();
        }
        let blocked = store
            .list_patterns_of_type(PatternType::BlockedAsin)
            .unwrap();
        assert_eq!(blocked.len(), 1);
        assert_eq!(blocked[0].pattern_key, "B0SAME");
    }

    #[test]
    fn batch_analysis_raises_threshold_on_high_fp_rate() {
        let store = Store::open_in_memory().unwrap();
        for i in 0..6 {
            let a = alert(&store, &format!("x6{i}"), &format!("B0D{i}"), "y", "a");
            let mut rejected = a;
            rejected.status = AlertStatus::Rejected;
            rejected.rejection_reason = Some(RejectionReason::WrongProduct);
            store.update_alert(&rejected).unwrap();
        }

        let summary = analyze_all_rejections(&store).unwrap();
        assert_eq!(summary.total, 6);
        assert!((summary.threshold_adjustment - 0.05).abs() < 1e-9);

        let hints = store
            .list_patterns_of_type(PatternType::ThresholdHint)
            .unwrap();
        assert!(hints.iter().any(|p| p.pattern_key == "match_threshold"));
    }
}
