//! Keyword candidate, discovery log, rejection pattern, and reference
//! data queries.

use anyhow::Result;
use chrono::Utc;
use rusqlite::{params, Row};

use super::{dt_from_sql, dt_to_sql, opt_dt_from_sql, opt_dt_to_sql, Store};
use crate::models::{
    CandidateStatus, Condition, ConditionTemplate, DiscoveryLog, KeywordCandidate, ListingPreset,
    PatternType, RejectionPattern, ShippingPattern,
};

const CANDIDATE_COLUMNS: &str = "id, keyword, strategy, confidence, parent_keyword_id, \
     reasoning, status, validation_result, created_at, resolved_at";

fn map_candidate(row: &Row) -> rusqlite::Result<KeywordCandidate> {
    Ok(KeywordCandidate {
        id: row.get(0)?,
        keyword: row.get(1)?,
        strategy: row.get(2)?,
        confidence: row.get(3)?,
        parent_keyword_id: row.get(4)?,
        reasoning: row.get(5)?,
        status: CandidateStatus::parse_str(&row.get::<_, String>(6)?),
        validation_result: row.get(7)?,
        created_at: dt_from_sql(&row.get::<_, String>(8)?),
        resolved_at: opt_dt_from_sql(row.get(9)?),
    })
}

const PATTERN_COLUMNS: &str =
    "id, pattern_type, pattern_key, pattern_data, hit_count, confidence, is_active, \
     created_at, updated_at";

fn map_pattern(row: &Row) -> rusqlite::Result<RejectionPattern> {
    let type_str: String = row.get(1)?;
    Ok(RejectionPattern {
        id: row.get(0)?,
        pattern_type: PatternType::parse_str(&type_str).unwrap_or(PatternType::ProblemPair),
        pattern_key: row.get(2)?,
        pattern_data: row.get(3)?,
        hit_count: row.get(4)?,
        confidence: row.get(5)?,
        is_active: row.get(6)?,
        created_at: dt_from_sql(&row.get::<_, String>(7)?),
        updated_at: dt_from_sql(&row.get::<_, String>(8)?),
    })
}

impl Store {
    // --- Keyword candidates ---

    pub fn insert_candidate(&self, c: &KeywordCandidate) -> Result<KeywordCandidate> {
        let id = self.with(|conn| {
            conn.execute(
                "INSERT INTO keyword_candidates
                    (keyword, strategy, confidence, parent_keyword_id, reasoning,
                     status, validation_result, created_at, resolved_at)
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9)",
                params![
                    c.keyword,
                    c.strategy,
                    c.confidence,
                    c.parent_keyword_id,
                    c.reasoning,
                    c.status.as_str(),
                    c.validation_result,
                    dt_to_sql(&c.created_at),
                    opt_dt_to_sql(&c.resolved_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        let mut out = c.clone();
        out.id = id;
        Ok(out)
    }

    pub fn get_candidate(&self, id: i64) -> Result<Option<KeywordCandidate>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {CANDIDATE_COLUMNS} FROM keyword_candidates WHERE id=?1"),
                [id],
                map_candidate,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    pub fn list_candidates(&self, status: Option<CandidateStatus>) -> Result<Vec<KeywordCandidate>> {
        self.with(|conn| match status {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CANDIDATE_COLUMNS} FROM keyword_candidates
                     WHERE status=?1 ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map([s.as_str()], map_candidate)?.collect();
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {CANDIDATE_COLUMNS} FROM keyword_candidates ORDER BY created_at DESC"
                ))?;
                let rows = stmt.query_map([], map_candidate)?.collect();
                rows
            }
        })
    }

    /// Validation order: most promising first.
    pub fn list_pending_candidates_by_confidence(&self) -> Result<Vec<KeywordCandidate>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CANDIDATE_COLUMNS} FROM keyword_candidates
                 WHERE status='pending' ORDER BY confidence DESC"
            ))?;
            let rows = stmt.query_map([], map_candidate)?.collect();
            rows
        })
    }

    /// All candidate texts that have not been rejected, for dedup.
    pub fn list_open_candidate_texts(&self) -> Result<Vec<String>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT keyword FROM keyword_candidates WHERE status != 'rejected'",
            )?;
            let rows = stmt.query_map([], |r| r.get(0))?.collect();
            rows
        })
    }

    pub fn update_candidate(&self, c: &KeywordCandidate) -> Result<()> {
        self.with(|conn| {
            conn.execute(
                "UPDATE keyword_candidates SET
                    status=?2, validation_result=?3, resolved_at=?4
                 WHERE id=?1",
                params![
                    c.id,
                    c.status.as_str(),
                    c.validation_result,
                    opt_dt_to_sql(&c.resolved_at),
                ],
            )?;
            Ok(())
        })
    }

    // --- Discovery log ---

    pub fn start_discovery_log(&self) -> Result<i64> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO discovery_log (started_at, status) VALUES (?1, 'running')",
                [dt_to_sql(&Utc::now())],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn finish_discovery_log(&self, log: &DiscoveryLog) -> Result<()> {
        self.with(|conn| {
            conn.execute(
                "UPDATE discovery_log SET
                    finished_at=?2, status=?3, candidates_generated=?4,
                    candidates_validated=?5, keywords_added=?6, keywords_deactivated=?7,
                    keepa_tokens_used=?8, strategy_breakdown=?9, error_message=?10
                 WHERE id=?1",
                params![
                    log.id,
                    opt_dt_to_sql(&log.finished_at),
                    log.status,
                    log.candidates_generated,
                    log.candidates_validated,
                    log.keywords_added,
                    log.keywords_deactivated,
                    log.keepa_tokens_used,
                    log.strategy_breakdown,
                    log.error_message,
                ],
            )?;
            Ok(())
        })
    }

    pub fn latest_discovery_log(&self) -> Result<Option<DiscoveryLog>> {
        self.with(|conn| {
            conn.query_row(
                "SELECT id, started_at, finished_at, status, candidates_generated,
                        candidates_validated, keywords_added, keywords_deactivated,
                        keepa_tokens_used, strategy_breakdown, error_message
                 FROM discovery_log ORDER BY id DESC LIMIT 1",
                [],
                |row| {
                    Ok(DiscoveryLog {
                        id: row.get(0)?,
                        started_at: dt_from_sql(&row.get::<_, String>(1)?),
                        finished_at: opt_dt_from_sql(row.get(2)?),
                        status: row.get(3)?,
                        candidates_generated: row.get(4)?,
                        candidates_validated: row.get(5)?,
                        keywords_added: row.get(6)?,
                        keywords_deactivated: row.get(7)?,
                        keepa_tokens_used: row.get(8)?,
                        strategy_breakdown: row.get(9)?,
                        error_message: row.get(10)?,
                    })
                },
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    // --- Rejection patterns ---

    /// Insert or bump a pattern: on hit, `hit_count += 1` and
    /// `confidence = min(confidence + 0.1, 1.0)`; the payload is
    /// refreshed to the latest observation.
    pub fn upsert_rejection_pattern(
        &self,
        pattern_type: PatternType,
        pattern_key: &str,
        pattern_data: &str,
        initial_confidence: f64,
    ) -> Result<RejectionPattern> {
        let now = dt_to_sql(&Utc::now());
        self.with(|conn| {
            let existing = conn
                .query_row(
                    &format!(
                        "SELECT {PATTERN_COLUMNS} FROM rejection_patterns
                         WHERE pattern_type=?1 AND pattern_key=?2"
                    ),
                    params![pattern_type.as_str(), pattern_key],
                    map_pattern,
                )
                .map(Some)
                .or_else(|e| match e {
                    rusqlite::Error::QueryReturnedNoRows => Ok(None),
                    e => Err(e),
                })?;

            match existing {
                Some(mut p) => {
                    p.hit_count += 1;
                    p.confidence = (p.confidence + 0.1).min(1.0);
                    p.pattern_data = pattern_data.to_string();
                    conn.execute(
                        "UPDATE rejection_patterns SET
                            hit_count=?2, confidence=?3, pattern_data=?4, updated_at=?5
                         WHERE id=?1",
                        params![p.id, p.hit_count, p.confidence, p.pattern_data, now],
                    )?;
                    Ok(p)
                }
                None => {
                    conn.execute(
                        "INSERT INTO rejection_patterns
                            (pattern_type, pattern_key, pattern_data, hit_count,
                             confidence, is_active, created_at, updated_at)
                         VALUES (?1,?2,?3,1,?4,1,?5,?5)",
                        params![
                            pattern_type.as_str(),
                            pattern_key,
                            pattern_data,
                            initial_confidence,
                            now,
                        ],
                    )?;
                    let id = conn.last_insert_rowid();
                    conn.query_row(
                        &format!("SELECT {PATTERN_COLUMNS} FROM rejection_patterns WHERE id=?1"),
                        [id],
                        map_pattern,
                    )
                }
            }
        })
    }

    pub fn list_active_patterns(&self) -> Result<Vec<RejectionPattern>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PATTERN_COLUMNS} FROM rejection_patterns WHERE is_active=1"
            ))?;
            let rows = stmt.query_map([], map_pattern)?.collect();
            rows
        })
    }

    pub fn list_patterns_of_type(&self, pattern_type: PatternType) -> Result<Vec<RejectionPattern>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PATTERN_COLUMNS} FROM rejection_patterns
                 WHERE pattern_type=?1 AND is_active=1"
            ))?;
            let rows = stmt.query_map([pattern_type.as_str()], map_pattern)?.collect();
            rows
        })
    }

    /// First active problem-pair pattern touching the given ASIN.
    pub fn find_problem_pair_for_asin(&self, asin: &str) -> Result<Option<RejectionPattern>> {
        self.with(|conn| {
            conn.query_row(
                &format!(
                    "SELECT {PATTERN_COLUMNS} FROM rejection_patterns
                     WHERE pattern_type='problem_pair' AND pattern_key LIKE ?1 AND is_active=1
                     ORDER BY hit_count DESC LIMIT 1"
                ),
                [format!("%:{asin}")],
                map_pattern,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    // --- Reference data ---

    pub fn upsert_condition_template(&self, condition_type: &str, title: &str, body: &str) -> Result<()> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO condition_templates (condition_type, title, body, updated_at)
                 VALUES (?1,?2,?3,?4)
                 ON CONFLICT(condition_type)
                 DO UPDATE SET title=excluded.title, body=excluded.body,
                               updated_at=excluded.updated_at",
                params![condition_type, title, body, dt_to_sql(&Utc::now())],
            )?;
            Ok(())
        })
    }

    pub fn list_condition_templates(&self) -> Result<Vec<ConditionTemplate>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, condition_type, title, body, updated_at
                 FROM condition_templates ORDER BY condition_type",
            )?;
            let rows = stmt.query_map([], |row| {
                Ok(ConditionTemplate {
                    id: row.get(0)?,
                    condition_type: row.get(1)?,
                    title: row.get(2)?,
                    body: row.get(3)?,
                    updated_at: dt_from_sql(&row.get::<_, String>(4)?),
                })
            })?
            .collect();
            rows
        })
    }

    pub fn insert_listing_preset(&self, preset: &ListingPreset) -> Result<i64> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO listing_presets
                    (asin, condition, condition_note, shipping_pattern, created_at)
                 VALUES (?1,?2,?3,?4,?5)",
                params![
                    preset.asin,
                    preset.condition.as_str(),
                    preset.condition_note,
                    preset.shipping_pattern.as_str(),
                    dt_to_sql(&preset.created_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_presets_for_asin(&self, asin: &str) -> Result<Vec<ListingPreset>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, asin, condition, condition_note, shipping_pattern, created_at
                 FROM listing_presets WHERE asin=?1 ORDER BY created_at DESC",
            )?;
            let rows = stmt.query_map([asin], |row| {
                Ok(ListingPreset {
                    id: row.get(0)?,
                    asin: row.get(1)?,
                    condition: Condition::parse_str(&row.get::<_, String>(2)?),
                    condition_note: row.get(3)?,
                    shipping_pattern: ShippingPattern::parse_str(&row.get::<_, String>(4)?),
                    created_at: dt_from_sql(&row.get::<_, String>(5)?),
                })
            })?
            .collect();
            rows
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_upsert_bumps_hits_and_caps_confidence() {
        let store = Store::open_in_memory().unwrap();
        let p1 = store
            .upsert_rejection_pattern(PatternType::AccessoryWord, "ほるだー", "{}", 0.3)
            .unwrap();
        assert_eq!(p1.hit_count, 1);
        assert!((p1.confidence - 0.3).abs() < 1e-9);

        let p2 = store
            .upsert_rejection_pattern(PatternType::AccessoryWord, "ほるだー", "{}", 0.3)
            .unwrap();
        assert_eq!(p2.hit_count, 2);
        assert!((p2.confidence - 0.4).abs() < 1e-9);

        for _ in 0..10 {
            store
                .upsert_rejection_pattern(PatternType::AccessoryWord, "ほるだー", "{}", 0.3)
                .unwrap();
        }
        let capped = store
            .list_patterns_of_type(PatternType::AccessoryWord)
            .unwrap();
        assert!((capped[0].confidence - 1.0).abs() < 1e-9);
    }

    #[test]
    fn discovery_log_lifecycle() {
        let store = Store::open_in_memory().unwrap();
        let id = store.start_discovery_log().unwrap();
        let mut log = store.latest_discovery_log().unwrap().unwrap();
        assert_eq!(log.id, id);
        assert_eq!(log.status, "running");

        log.status = "completed".into();
        log.finished_at = Some(Utc::now());
        log.candidates_generated = 7;
        store.finish_discovery_log(&log).unwrap();
        let done = store.latest_discovery_log().unwrap().unwrap();
        assert_eq!(done.status, "completed");
        assert_eq!(done.candidates_generated, 7);
    }

    #[test]
    fn problem_pair_lookup_by_asin_suffix() {
        let store = Store::open_in_memory().unwrap();
        store
            .upsert_rejection_pattern(PatternType::ProblemPair, "x55:B000ASIN77", "{}", 0.8)
            .unwrap();
        assert!(store
            .find_problem_pair_for_asin("B000ASIN77")
            .unwrap()
            .is_some());
        assert!(store.find_problem_pair_for_asin("B000NOPE").unwrap().is_none());
    }
}
