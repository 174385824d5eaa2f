//! Candidate validation: does the keyword actually surface supply on
//! the auction side and demand on the marketplace side, with a real
//! price gap between them?

use serde::Serialize;
use tracing::warn;

use super::generator::CandidateProposal;
use crate::config::Config;
use crate::keepa::scorer::score_deal;
use crate::keepa::KeepaClient;
use crate::scraper::AuctionScraper;

#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationResult {
    pub is_valid: bool,
    pub yahoo_result_count: usize,
    pub keepa_result_count: usize,
    pub potential_deals: usize,
    pub best_margin: f64,
    pub best_profit: i64,
    pub keepa_tokens_used: i64,
    pub rejection_reason: String,
}

impl ValidationResult {
    pub fn to_json(&self) -> String {
        serde_json::json!({
            "yahoo_count": self.yahoo_result_count,
            "keepa_count": self.keepa_result_count,
            "deals": self.potential_deals,
            "best_margin": self.best_margin,
            "best_profit": self.best_profit,
        })
        .to_string()
    }

    fn rejected(reason: String) -> Self {
        Self {
            rejection_reason: reason,
            ..Default::default()
        }
    }
}

/// Validate one candidate under a token budget.
///
/// 1. auction search (free) — fewer than 3 results rejects;
/// 2. an exhausted budget defers (the candidate stays pending);
/// 3. analytics search (1 token) — zero results rejects;
/// 4. top-5 × top-5 scoring must find at least one deal over the
///    margin + profit thresholds.
pub async fn validate_candidate(
    candidate: &CandidateProposal,
    scraper: &AuctionScraper,
    keepa: &KeepaClient,
    token_budget: i64,
    config: &Config,
) -> ValidationResult {
    let yahoo_results = match scraper.search(&candidate.keyword, 1).await {
        Ok(results) => results,
        Err(e) => {
            warn!(keyword = %candidate.keyword, error = ?e, "Yahoo search failed");
            return ValidationResult::rejected(format!("Yahoo search error: {e}"));
        }
    };
    let yahoo_count = yahoo_results.len();
    if yahoo_count < 3 {
        return ValidationResult {
            yahoo_result_count: yahoo_count,
            rejection_reason: format!("Yahoo results too few ({yahoo_count} < 3)"),
            ..Default::default()
        };
    }

    if token_budget <= 0 {
        return ValidationResult {
            yahoo_result_count: yahoo_count,
            rejection_reason: "Keepa token budget exhausted (deferred)".to_string(),
            ..Default::default()
        };
    }

    let keepa_products = match keepa.search_products(&candidate.keyword, None).await {
        Ok(products) => products,
        Err(e) => {
            warn!(keyword = %candidate.keyword, error = %e, "Keepa search failed");
            return ValidationResult {
                yahoo_result_count: yahoo_count,
                keepa_tokens_used: 1,
                rejection_reason: format!("Keepa search error: {e}"),
                ..Default::default()
            };
        }
    };
    let keepa_count = keepa_products.len();
    if keepa_count == 0 {
        return ValidationResult {
            yahoo_result_count: yahoo_count,
            keepa_tokens_used: 1,
            rejection_reason: "No Keepa results (no Amazon demand)".to_string(),
            ..Default::default()
        };
    }

    let mut deals_found = 0usize;
    let mut best_margin = 0.0;
    let mut best_profit = 0i64;

    for yr in yahoo_results.iter().take(5) {
        if yr.current_price <= 0 {
            continue;
        }
        let shipping = yr.shipping_cost.unwrap_or(0);
        for kp in keepa_products.iter().take(5) {
            let deal = score_deal(
                yr.current_price,
                kp,
                shipping,
                config.deal_forwarding_cost,
                config.deal_system_fee,
                config.deal_amazon_fee_pct,
                config.keepa_good_rank_threshold,
            );
            if let Some(deal) = deal {
                if deal.gross_margin_pct >= config.deal_min_gross_margin_pct
                    && deal.gross_profit >= config.deal_min_gross_profit
                {
                    deals_found += 1;
                    if deal.gross_profit > best_profit {
                        best_profit = deal.gross_profit;
                        best_margin = deal.gross_margin_pct;
                    }
                }
            }
        }
    }

    if deals_found == 0 {
        return ValidationResult {
            yahoo_result_count: yahoo_count,
            keepa_result_count: keepa_count,
            keepa_tokens_used: 1,
            rejection_reason: "No profitable deals found in top matches".to_string(),
            ..Default::default()
        };
    }

    ValidationResult {
        is_valid: true,
        yahoo_result_count: yahoo_count,
        keepa_result_count: keepa_count,
        potential_deals: deals_found,
        best_margin,
        best_profit,
        keepa_tokens_used: 1,
        rejection_reason: String::new(),
    }
}

/// A valid candidate auto-promotes to a watched keyword when it is both
/// confident and demonstrably productive.
pub fn should_auto_add(
    candidate: &CandidateProposal,
    result: &ValidationResult,
    threshold: f64,
) -> bool {
    result.is_valid
        && candidate.confidence >= threshold
        && result.potential_deals >= 3
        && result.best_profit >= 5000
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proposal(confidence: f64) -> CandidateProposal {
        CandidateProposal {
            keyword: "dyson v8".into(),
            strategy: "series",
            confidence,
            parent_keyword_id: None,
            reasoning: String::new(),
        }
    }

    #[test]
    fn auto_add_requires_confidence_deals_and_profit() {
        let good = ValidationResult {
            is_valid: true,
            potential_deals: 3,
            best_profit: 5000,
            ..Default::default()
        };
        assert!(should_auto_add(&proposal(0.75), &good, 0.6));
        assert!(!should_auto_add(&proposal(0.5), &good, 0.6));

        let few_deals = ValidationResult {
            is_valid: true,
            potential_deals: 2,
            best_profit: 9000,
            ..Default::default()
        };
        assert!(!should_auto_add(&proposal(0.75), &few_deals, 0.6));

        let thin_profit = ValidationResult {
            is_valid: true,
            potential_deals: 5,
            best_profit: 4999,
            ..Default::default()
        };
        assert!(!should_auto_add(&proposal(0.75), &thin_profit, 0.6));
    }
}
