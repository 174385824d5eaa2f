//! Discovery engine: the periodic analyze → generate → validate →
//! register → learn cycle.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info, warn};

use super::analyzer::{analyze_deal_history, compute_performance_score};
use super::generator::{self, CandidateProposal};
use super::llm::get_llm_suggestions;
use super::rejection::analyze_all_rejections;
use super::suggest::generate_suggest_crossmatch;
use super::validator::{should_auto_add, validate_candidate};
use crate::config::Config;
use crate::keepa::{KeepaClient, KeepaProduct};
use crate::matcher::{keywords_are_similar, MatcherOverrides};
use crate::models::{CandidateStatus, DealAlert, KeywordCandidate, WatchedKeyword};
use crate::scraper::AuctionScraper;
use crate::store::{NewKeyword, Store};

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryCycleResult {
    pub candidates_generated: i64,
    pub candidates_validated: i64,
    pub keywords_added: i64,
    pub keywords_deactivated: i64,
    pub keywords_deduped: i64,
    pub keepa_tokens_used: i64,
}

pub struct DiscoveryEngine {
    store: Arc<Store>,
    scraper: Arc<AuctionScraper>,
    keepa: Arc<KeepaClient>,
    overrides: Arc<MatcherOverrides>,
    config: Config,
    brand_prefs: generator::BrandPreferenceCache,
}

impl DiscoveryEngine {
    pub fn new(
        store: Arc<Store>,
        scraper: Arc<AuctionScraper>,
        keepa: Arc<KeepaClient>,
        overrides: Arc<MatcherOverrides>,
        config: Config,
    ) -> Self {
        Self {
            store,
            scraper,
            keepa,
            overrides,
            config,
            brand_prefs: generator::BrandPreferenceCache::new(),
        }
    }

    /// One full discovery pass, summarised into a DiscoveryLog row.
    /// Any uncaught error marks the row `error` and carries the message.
    pub async fn run_discovery_cycle(&self) -> DiscoveryCycleResult {
        let log_id = match self.store.start_discovery_log() {
            Ok(id) => id,
            Err(e) => {
                error!(error = ?e, "Failed to open discovery log");
                return DiscoveryCycleResult::default();
            }
        };

        let mut strategy_breakdown: HashMap<String, i64> = HashMap::new();
        let outcome = self.cycle_body(&mut strategy_breakdown).await;

        let mut log = crate::models::DiscoveryLog {
            id: log_id,
            started_at: Utc::now(),
            finished_at: Some(Utc::now()),
            status: "completed".to_string(),
            candidates_generated: 0,
            candidates_validated: 0,
            keywords_added: 0,
            keywords_deactivated: 0,
            keepa_tokens_used: 0,
            strategy_breakdown: serde_json::to_string(&strategy_breakdown).unwrap_or_default(),
            error_message: String::new(),
        };

        let result = match outcome {
            Ok(result) => {
                log.candidates_generated = result.candidates_generated;
                log.candidates_validated = result.candidates_validated;
                log.keywords_added = result.keywords_added;
                log.keywords_deactivated = result.keywords_deactivated;
                log.keepa_tokens_used = result.keepa_tokens_used;
                info!(
                    generated = result.candidates_generated,
                    validated = result.candidates_validated,
                    added = result.keywords_added,
                    deactivated = result.keywords_deactivated,
                    deduped = result.keywords_deduped,
                    "Discovery cycle complete"
                );
                result
            }
            Err(e) => {
                error!(error = ?e, "Discovery cycle error");
                log.status = "error".to_string();
                log.error_message = e.to_string();
                DiscoveryCycleResult::default()
            }
        };

        if let Err(e) = self.store.finish_discovery_log(&log) {
            error!(error = ?e, "Failed to finalise discovery log");
        }
        result
    }

    async fn cycle_body(
        &self,
        strategy_breakdown: &mut HashMap<String, i64>,
    ) -> Result<DiscoveryCycleResult> {
        let mut result = DiscoveryCycleResult::default();

        // 1–2. Mine the deal history
        let insights = analyze_deal_history(&self.store)?;
        info!(
            deals = insights.total_deals,
            keywords = insights.total_keywords,
            "Discovery: history analyzed"
        );

        // 3. Demand products from the analytics Product Finder
        let mut demand_products: Vec<KeepaProduct> = Vec::new();
        if self.config.demand_finder_enabled {
            let selection = json!({
                "salesRankDrops30_gte": self.config.demand_finder_min_drops30,
                "current_USED_gte": self.config.demand_finder_min_used_price,
                "perPage": self.config.demand_finder_max_results,
            });
            match self.keepa.product_finder(&selection, None).await {
                Ok(products) => {
                    demand_products = products;
                    demand_products.truncate(self.config.demand_finder_max_results as usize);
                    info!(count = demand_products.len(), "Demand finder products");
                }
                Err(e) => warn!(error = %e, "Demand finder failed"),
            }
        }

        // 4. Generate and persist candidates. Series/demand keywords
        // carry the brand form that actually finds listings, so resolve
        // the preferred written form for the proven brands first.
        if insights.total_deals as i64 >= self.config.discovery_min_deals {
            for brand in insights.brand_patterns.iter().take(5) {
                self.brand_prefs
                    .resolve(&self.scraper, &brand.brand_name)
                    .await;
            }

            let mut candidates = generator::generate_all(
                &insights,
                &self.store,
                self.config.series_expansion_min_profit,
                &demand_products,
                10,
                Some(&self.brand_prefs),
            )?;

            if self.config.suggest_crossmatch_enabled {
                let existing = generator::existing_keyword_set(&self.store)?;
                let suggested = generate_suggest_crossmatch(
                    &self.scraper,
                    &existing,
                    Some(&insights),
                    &self.config.scraper_user_agent,
                    15,
                )
                .await;
                for s in suggested {
                    let duplicate = candidates
                        .iter()
                        .any(|c| keywords_are_similar(&c.keyword, &s.keyword, 0.6));
                    if !duplicate {
                        candidates.push(s);
                    }
                }
            }

            if self.config.llm_enabled() {
                candidates.extend(get_llm_suggestions(&insights, &self.config, 10).await);
            }

            result.candidates_generated = self.persist_candidates(&candidates, strategy_breakdown)?;

            // 5. Validate under the token budget, best first
            let mut token_budget = self.token_budget();
            for kc in self.store.list_pending_candidates_by_confidence()? {
                if token_budget <= 0 {
                    break;
                }
                let proposal = candidate_to_proposal(&kc);
                let vresult = validate_candidate(
                    &proposal,
                    &self.scraper,
                    &self.keepa,
                    token_budget,
                    &self.config,
                )
                .await;
                token_budget -= vresult.keepa_tokens_used;
                result.keepa_tokens_used += vresult.keepa_tokens_used;
                result.candidates_validated += 1;

                let mut updated = kc.clone();
                updated.validation_result = vresult.to_json();
                updated.resolved_at = Some(Utc::now());
                updated.status = if vresult.is_valid {
                    if should_auto_add(&proposal, &vresult, self.config.discovery_auto_add_threshold)
                    {
                        if self.register_keyword(&kc)? {
                            result.keywords_added += 1;
                            CandidateStatus::AutoAdded
                        } else {
                            // AI cap reached: keep for operator review
                            CandidateStatus::Validated
                        }
                    } else {
                        CandidateStatus::Validated
                    }
                } else {
                    CandidateStatus::Rejected
                };
                self.store.update_candidate(&updated)?;
            }
        } else {
            info!(
                deals = insights.total_deals,
                min = self.config.discovery_min_deals,
                "Discovery: not enough deals, history-based generation skipped"
            );
            // 6. Demand products still generate without history
            if !demand_products.is_empty() {
                let existing = generator::existing_keyword_set(&self.store)?;
                let demand_candidates =
                    generator::generate_demand(&demand_products, &existing, 10, None);
                result.candidates_generated =
                    self.persist_candidates(&demand_candidates, strategy_breakdown)?;
            }
        }

        // 7. Learn from rejections, then refresh the matcher
        match analyze_all_rejections(&self.store) {
            Ok(summary) if !summary.new_accessory_words.is_empty() => {
                info!(
                    words = summary.new_accessory_words.len(),
                    "Rejection learning: accessory words active"
                );
            }
            Ok(_) => {}
            Err(e) => warn!(error = ?e, "Rejection analysis failed"),
        }
        self.overrides.reload(&self.store.list_active_patterns()?);

        // 8. Refresh scores, deactivate underperforming AI keywords
        result.keywords_deactivated = self.update_scores()?;

        // 9. Collapse near-duplicate keywords
        result.keywords_deduped = self.cleanup_duplicate_keywords()?;

        Ok(result)
    }

    fn persist_candidates(
        &self,
        candidates: &[CandidateProposal],
        strategy_breakdown: &mut HashMap<String, i64>,
    ) -> Result<i64> {
        for c in candidates {
            self.store.insert_candidate(&KeywordCandidate {
                id: 0,
                keyword: c.keyword.clone(),
                strategy: c.strategy.to_string(),
                confidence: c.confidence,
                parent_keyword_id: c.parent_keyword_id,
                reasoning: c.reasoning.clone(),
                status: CandidateStatus::Pending,
                validation_result: String::new(),
                created_at: Utc::now(),
                resolved_at: None,
            })?;
            *strategy_breakdown.entry(c.strategy.to_string()).or_insert(0) += 1;
        }
        Ok(candidates.len() as i64)
    }

    /// Token budget for one cycle: a tenth of what is left, capped by
    /// configuration.
    fn token_budget(&self) -> i64 {
        match self.keepa.tokens_left() {
            Some(left) => ((left as f64 * 0.1) as i64).min(self.config.discovery_token_budget),
            None => self.config.discovery_token_budget,
        }
    }

    /// Promote a candidate to a watched keyword, respecting the active
    /// AI keyword cap. Returns false when the cap blocked it.
    fn register_keyword(&self, kc: &KeywordCandidate) -> Result<bool> {
        let ai_count = self.store.count_active_ai_keywords()?;
        if ai_count >= self.config.discovery_max_ai_keywords {
            info!(ai_count, "AI keyword cap reached, skipping registration");
            return Ok(false);
        }
        let source = format!("ai_{}", kc.strategy);
        let added = self.store.insert_keyword(&NewKeyword {
            keyword: &kc.keyword,
            source: &source,
            parent_keyword_id: kc.parent_keyword_id,
            confidence: kc.confidence,
            notes: "",
            is_active: true,
        })?;
        if added.is_some() {
            info!(keyword = %kc.keyword, strategy = %kc.strategy, "Auto-added AI keyword");
        }
        Ok(added.is_some())
    }

    /// Recompute performance scores; auto-deactivate AI keywords that
    /// scanned enough to prove themselves and didn't.
    fn update_scores(&self) -> Result<i64> {
        let alerts = self.store.list_all_alerts()?;
        let mut alerts_by_kw: HashMap<i64, Vec<&DealAlert>> = HashMap::new();
        for a in &alerts {
            alerts_by_kw.entry(a.keyword_id).or_default().push(a);
        }

        let mut deactivated = 0;
        for mut kw in self.store.list_keywords()? {
            let empty = Vec::new();
            let kw_alerts = alerts_by_kw.get(&kw.id).unwrap_or(&empty);
            kw.performance_score = compute_performance_score(&kw, kw_alerts);

            if !kw.is_manual()
                && kw.is_active
                && kw.auto_deactivated_at.is_none()
                && kw.total_scans >= self.config.discovery_deactivation_scans
                && kw.performance_score < self.config.discovery_deactivation_threshold
            {
                kw.is_active = false;
                kw.auto_deactivated_at = Some(Utc::now());
                deactivated += 1;
                info!(
                    keyword = %kw.keyword,
                    score = kw.performance_score,
                    scans = kw.total_scans,
                    "Auto-deactivated AI keyword"
                );
            }
            self.store.update_keyword(&kw)?;
        }
        Ok(deactivated)
    }

    /// Pairwise similarity dedup over active keywords. The loser is
    /// picked by: manual beats AI, then more deals, then higher profit,
    /// then the older row survives.
    fn cleanup_duplicate_keywords(&self) -> Result<i64> {
        let keywords = self.store.list_active_keywords()?;
        let mut to_delete: std::collections::HashSet<i64> = Default::default();

        for (i, kw_a) in keywords.iter().enumerate() {
            if to_delete.contains(&kw_a.id) {
                continue;
            }
            for kw_b in &keywords[i + 1..] {
                if to_delete.contains(&kw_b.id) {
                    continue;
                }
                if !keywords_are_similar(&kw_a.keyword, &kw_b.keyword, 0.6) {
                    continue;
                }
                let loser = pick_loser(kw_a, kw_b);
                let winner = if loser.id == kw_a.id { kw_b } else { kw_a };
                info!(
                    loser = %loser.keyword,
                    winner = %winner.keyword,
                    "Dedup: removing duplicate keyword"
                );
                to_delete.insert(loser.id);
            }
        }

        for id in &to_delete {
            self.store.delete_keyword(*id)?;
        }
        Ok(to_delete.len() as i64)
    }
}

fn pick_loser<'a>(a: &'a WatchedKeyword, b: &'a WatchedKeyword) -> &'a WatchedKeyword {
    // Manual always beats AI
    match (a.is_manual(), b.is_manual()) {
        (true, false) => return b,
        (false, true) => return a,
        _ => {}
    }
    // More deals wins
    if a.total_deals_found != b.total_deals_found {
        return if a.total_deals_found > b.total_deals_found { b } else { a };
    }
    // Higher profit wins
    if a.total_gross_profit != b.total_gross_profit {
        return if a.total_gross_profit > b.total_gross_profit { b } else { a };
    }
    // Older survives
    if a.created_at <= b.created_at {
        b
    } else {
        a
    }
}

/// Operator approval: register the candidate as a watched keyword and
/// auto-reject every still-pending candidate that is merely a variant
/// of it. Returns the approved candidate and the auto-reject count.
pub fn approve_candidate(
    store: &Store,
    candidate_id: i64,
) -> Result<Option<(KeywordCandidate, usize)>> {
    let mut candidate = match store.get_candidate(candidate_id)? {
        Some(c) => c,
        None => return Ok(None),
    };

    let source = format!("ai_{}", candidate.strategy);
    store.insert_keyword(&NewKeyword {
        keyword: &candidate.keyword,
        source: &source,
        parent_keyword_id: candidate.parent_keyword_id,
        confidence: candidate.confidence,
        notes: "",
        is_active: true,
    })?;

    candidate.status = CandidateStatus::Approved;
    candidate.resolved_at = Some(Utc::now());
    store.update_candidate(&candidate)?;

    let mut auto_rejected = 0;
    for other in store.list_candidates(Some(CandidateStatus::Pending))? {
        if other.id == candidate.id {
            continue;
        }
        if keywords_are_similar(&candidate.keyword, &other.keyword, 0.6) {
            let mut rejected = other;
            rejected.status = CandidateStatus::Rejected;
            rejected.resolved_at = Some(Utc::now());
            store.update_candidate(&rejected)?;
            auto_rejected += 1;
        }
    }
    Ok(Some((candidate, auto_rejected)))
}

fn candidate_to_proposal(kc: &KeywordCandidate) -> CandidateProposal {
    CandidateProposal {
        keyword: kc.keyword.clone(),
        strategy: match kc.strategy.as_str() {
            "brand" => "brand",
            "title" => "title",
            "category" => "category",
            "synonym" => "synonym",
            "series" => "series",
            "demand" => "demand",
            "suggest" => "suggest",
            "llm" => "llm",
            _ => "manual",
        },
        confidence: kc.confidence,
        parent_keyword_id: kc.parent_keyword_id,
        reasoning: kc.reasoning.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keyword(id: i64, source: &str, deals: i64, profit: i64, age_days: i64) -> WatchedKeyword {
        WatchedKeyword {
            id,
            keyword: format!("kw{id}"),
            is_active: true,
            last_scanned_at: None,
            created_at: Utc::now() - chrono::Duration::days(age_days),
            updated_at: Utc::now(),
            notes: String::new(),
            source: source.to_string(),
            parent_keyword_id: None,
            performance_score: 0.0,
            total_scans: 10,
            total_deals_found: deals,
            total_gross_profit: profit,
            scans_since_last_deal: 0,
            confidence: 1.0,
            auto_deactivated_at: None,
        }
    }

    #[test]
    fn manual_keyword_always_survives_dedup() {
        let manual = keyword(1, "manual", 0, 0, 1);
        let ai = keyword(2, "ai_brand", 50, 500_000, 100);
        assert_eq!(pick_loser(&manual, &ai).id, 2);
        assert_eq!(pick_loser(&ai, &manual).id, 2);
    }

    #[test]
    fn more_deals_then_profit_then_age() {
        let few = keyword(1, "manual", 2, 9000, 1);
        let many = keyword(2, "manual", 5, 1000, 1);
        assert_eq!(pick_loser(&few, &many).id, 1);

        let poor = keyword(3, "manual", 2, 1000, 1);
        let rich = keyword(4, "manual", 2, 9000, 1);
        assert_eq!(pick_loser(&poor, &rich).id, 3);

        let old = keyword(5, "manual", 2, 1000, 30);
        let new = keyword(6, "manual", 2, 1000, 1);
        assert_eq!(pick_loser(&old, &new).id, 6);
    }
}
