//! Dynamic matcher overrides learned from rejection patterns.
//!
//! Supplements the static lexicon with data mined from operator
//! rejections. Loaded at startup and refreshed after each rejection and
//! at the end of every discovery cycle.

use std::collections::HashSet;

use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;

use crate::models::{PatternType, RejectionPattern};

/// An immutable view of the learned overrides at one point in time.
#[derive(Debug, Clone, Default)]
pub struct OverrideSnapshot {
    pub extra_accessory_words: HashSet<String>,
    /// (auction_id, asin) pairs that must never match again.
    pub blocked_pairs: HashSet<(String, String)>,
    /// (yahoo_title, amazon_title) pairs the operator marked never-show.
    pub never_show_pairs: HashSet<(String, String)>,
    pub threshold_adjustment: f64,
}

/// Thread-safe container for the dynamic matcher data.
#[derive(Default)]
pub struct MatcherOverrides {
    inner: Mutex<OverrideSnapshot>,
}

impl MatcherOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild the snapshot from active rejection patterns.
    ///
    /// Accessory words require hit_count ≥ 2 and confidence ≥ 0.6 so a
    /// single stray rejection cannot poison the matcher; blocked pairs
    /// require hit_count ≥ 2.
    pub fn reload(&self, patterns: &[RejectionPattern]) {
        let mut accessory = HashSet::new();
        let mut blocked_pairs = HashSet::new();
        let mut never_show_pairs = HashSet::new();
        let mut threshold_adj = 0.0;

        for p in patterns.iter().filter(|p| p.is_active) {
            match p.pattern_type {
                PatternType::AccessoryWord => {
                    if p.hit_count >= 2 && p.confidence >= 0.6 {
                        accessory.insert(p.pattern_key.clone());
                    }
                }
                PatternType::ProblemPair => {
                    if p.hit_count >= 2 {
                        if let Some((auction_id, asin)) = p.pattern_key.split_once(':') {
                            blocked_pairs.insert((auction_id.to_string(), asin.to_string()));
                        }
                    }
                }
                PatternType::NeverShowPair => {
                    let data = safe_json(&p.pattern_data);
                    let y = data["yahoo_title"].as_str().unwrap_or("");
                    let a = data["amazon_title"].as_str().unwrap_or("");
                    if !y.is_empty() && !a.is_empty() {
                        never_show_pairs.insert((y.to_string(), a.to_string()));
                    }
                }
                PatternType::ThresholdHint => {
                    if p.pattern_key == "match_threshold" {
                        threshold_adj = safe_json(&p.pattern_data)["adjustment"]
                            .as_f64()
                            .unwrap_or(0.0);
                    }
                }
                PatternType::ModelConflict | PatternType::BlockedAsin => {}
            }
        }

        info!(
            accessory_words = accessory.len(),
            blocked_pairs = blocked_pairs.len(),
            never_show_pairs = never_show_pairs.len(),
            threshold_adj,
            "Matcher overrides reloaded"
        );

        *self.inner.lock() = OverrideSnapshot {
            extra_accessory_words: accessory,
            blocked_pairs,
            never_show_pairs,
            threshold_adjustment: threshold_adj,
        };
    }

    /// Current snapshot, cloned out from under the lock.
    pub fn snapshot(&self) -> OverrideSnapshot {
        self.inner.lock().clone()
    }
}

fn safe_json(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or(Value::Null)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn pattern(
        pattern_type: PatternType,
        key: &str,
        data: &str,
        hit_count: i64,
        confidence: f64,
    ) -> RejectionPattern {
        RejectionPattern {
            id: 0,
            pattern_type,
            pattern_key: key.to_string(),
            pattern_data: data.to_string(),
            hit_count,
            confidence,
            is_active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn reload_filters_by_hits_and_confidence() {
        let ov = MatcherOverrides::new();
        ov.reload(&[
            pattern(PatternType::AccessoryWord, "ほごふぃるむ", "{}", 2, 0.6),
            pattern(PatternType::AccessoryWord, "いちどだけ", "{}", 1, 0.9),
            pattern(PatternType::ProblemPair, "x123:B000TEST00", "{}", 2, 0.8),
            pattern(PatternType::ProblemPair, "x999:B000TEST99", "{}", 1, 0.8),
            pattern(
                PatternType::ThresholdHint,
                "match_threshold",
                r#"{"adjustment": 0.05}"#,
                1,
                0.7,
            ),
        ]);

        let snap = ov.snapshot();
        assert!(snap.extra_accessory_words.contains("ほごふぃるむ"));
        assert!(!snap.extra_accessory_words.contains("いちどだけ"));
        assert!(snap
            .blocked_pairs
            .contains(&("x123".to_string(), "B000TEST00".to_string())));
        assert_eq!(snap.blocked_pairs.len(), 1);
        assert!((snap.threshold_adjustment - 0.05).abs() < f64::EPSILON);
    }

    #[test]
    fn never_show_pairs_come_from_payload() {
        let ov = MatcherOverrides::new();
        ov.reload(&[pattern(
            PatternType::NeverShowPair,
            "x1:B0",
            r#"{"yahoo_title": "A", "amazon_title": "B"}"#,
            1,
            0.5,
        )]);
        assert!(ov
            .snapshot()
            .never_show_pairs
            .contains(&("A".to_string(), "B".to_string())));
    }
}
