//! Suggest cross-match strategy: marketplace autocomplete × auction
//! search results.
//!
//! Model numbers the autocomplete proposes have confirmed demand;
//! the same models appearing in live auction listings have confirmed
//! supply. The intersection makes a strong keyword candidate.

use std::collections::{HashMap, HashSet};

use futures::join;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

use super::analyzer::KeywordInsights;
use super::generator::CandidateProposal;
use crate::matcher::{extract_model_numbers_from_text, is_apparel};
use crate::scraper::AuctionScraper;

const AMAZON_SUGGEST_URL: &str = "https://completion.amazon.co.jp/api/2017/suggestions";
const AMAZON_MARKETPLACE_ID: &str = "A1VC38T7YXB528";

/// Curated cold-start seeds: high-turnover resale categories.
const DEFAULT_SEEDS: &[&str] = &[
    // Gaming
    "Nintendo Switch",
    "PlayStation",
    // Audio
    "SONY WH",
    "SONY WF",
    "Bose",
    "JBL",
    // Camera
    "Canon",
    "Nikon",
    "FUJIFILM",
    // Electronics
    "Dyson",
    "Panasonic",
    "Pioneer",
    // Collectibles
    "GoPro",
    "SEGA",
    "Bandai",
];

const MAX_SEEDS_PER_CYCLE: usize = 10;
const MAX_SUGGESTIONS_PER_SEED: usize = 10;
const INTER_SEED_DELAY: Duration = Duration::from_millis(500);

async fn fetch_amazon_suggestions(
    query: &str,
    client: &reqwest::Client,
) -> Vec<String> {
    let resp = client
        .get(AMAZON_SUGGEST_URL)
        .query(&[
            ("mid", AMAZON_MARKETPLACE_ID),
            ("alias", "aps"),
            ("prefix", query),
        ])
        .send()
        .await;
    let resp = match resp {
        Ok(r) if r.status().is_success() => r,
        Ok(r) => {
            debug!(query, status = r.status().as_u16(), "Autocomplete non-200");
            return Vec::new();
        }
        Err(e) => {
            debug!(query, error = %e, "Autocomplete error");
            return Vec::new();
        }
    };

    let body: Value = match resp.json().await {
        Ok(v) => v,
        Err(_) => return Vec::new(),
    };
    body["suggestions"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|s| s["value"].as_str())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty() && v.to_lowercase() != query.to_lowercase())
                .take(MAX_SUGGESTIONS_PER_SEED)
                .collect()
        })
        .unwrap_or_default()
}

async fn fetch_yahoo_models(query: &str, scraper: &AuctionScraper) -> HashSet<String> {
    match scraper.search(query, 1).await {
        Ok(results) => {
            let mut models = HashSet::new();
            for item in results {
                models.extend(extract_model_numbers_from_text(&item.title));
            }
            models
        }
        Err(e) => {
            debug!(query, error = ?e, "Yahoo model extraction error");
            HashSet::new()
        }
    }
}

fn build_seed_list(insights: Option<&KeywordInsights>) -> Vec<String> {
    let mut seeds: Vec<String> = Vec::new();

    // Proven-profitable brands first
    if let Some(insights) = insights {
        for bp in insights.brand_patterns.iter().take(10) {
            if bp.deal_count >= 2 && bp.avg_profit >= 2000.0 {
                seeds.push(bp.brand_name.clone());
            }
        }
    }

    let mut seen: HashSet<String> = seeds.iter().map(|s| s.to_lowercase()).collect();
    for brand in DEFAULT_SEEDS {
        if seen.insert(brand.to_lowercase()) {
            seeds.push(brand.to_string());
        }
    }

    seeds.truncate(MAX_SEEDS_PER_CYCLE);
    seeds
}

/// Strategy 7: cross-match autocomplete suggestions with auction
/// listings. Cross-matched models get confidence 0.75,
/// autocomplete-only models 0.60. Never fails; returns what it found.
pub async fn generate_suggest_crossmatch(
    scraper: &AuctionScraper,
    existing: &HashSet<String>,
    insights: Option<&KeywordInsights>,
    user_agent: &str,
    max_count: usize,
) -> Vec<CandidateProposal> {
    let seeds = build_seed_list(insights);
    if seeds.is_empty() {
        return Vec::new();
    }

    let client = match reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .user_agent(user_agent)
        .default_headers({
            let mut headers = reqwest::header::HeaderMap::new();
            headers.insert(
                reqwest::header::ACCEPT_LANGUAGE,
                "ja-JP,ja;q=0.9".parse().expect("static header"),
            );
            headers
        })
        .build()
    {
        Ok(client) => client,
        Err(_) => return Vec::new(),
    };

    let mut candidates: Vec<CandidateProposal> = Vec::new();

    for brand in &seeds {
        if candidates.len() >= max_count {
            break;
        }

        // Demand side and supply side, concurrently
        let (amazon_suggestions, yahoo_models) = join!(
            fetch_amazon_suggestions(brand, &client),
            fetch_yahoo_models(brand, scraper),
        );

        // model number → the suggestion text it came from
        let mut amazon_models: HashMap<String, String> = HashMap::new();
        for suggestion in &amazon_suggestions {
            for model in extract_model_numbers_from_text(suggestion) {
                amazon_models.entry(model).or_insert_with(|| suggestion.clone());
            }
        }
        if amazon_models.is_empty() {
            tokio::time::sleep(INTER_SEED_DELAY).await;
            continue;
        }

        let mut cross_matched: Vec<&String> = amazon_models
            .keys()
            .filter(|m| yahoo_models.contains(*m))
            .collect();
        cross_matched.sort();
        let mut amazon_only: Vec<&String> = amazon_models
            .keys()
            .filter(|m| !yahoo_models.contains(*m))
            .collect();
        amazon_only.sort();

        for model in cross_matched {
            if candidates.len() >= max_count {
                break;
            }
            let keyword = format!("{brand} {model}");
            if existing.contains(&keyword.to_lowercase()) || is_apparel(&keyword) {
                continue;
            }
            candidates.push(CandidateProposal {
                keyword,
                strategy: "suggest",
                confidence: 0.75,
                parent_keyword_id: None,
                reasoning: format!(
                    "Amazon検索サジェスト＋Yahoo出品の両方で確認: 「{}」",
                    amazon_models[model]
                ),
            });
        }

        for model in amazon_only {
            if candidates.len() >= max_count {
                break;
            }
            let keyword = format!("{brand} {model}");
            if existing.contains(&keyword.to_lowercase()) || is_apparel(&keyword) {
                continue;
            }
            candidates.push(CandidateProposal {
                keyword,
                strategy: "suggest",
                confidence: 0.60,
                parent_keyword_id: None,
                reasoning: format!("Amazonサジェストで検出: 「{}」", amazon_models[model]),
            });
        }

        tokio::time::sleep(INTER_SEED_DELAY).await;
    }

    info!(
        candidates = candidates.len(),
        seeds = seeds.len(),
        "Suggest cross-match finished"
    );
    candidates
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::analyzer::BrandPattern;

    #[test]
    fn seed_list_prefers_proven_brands() {
        let insights = KeywordInsights {
            top_keywords: Vec::new(),
            brand_patterns: vec![BrandPattern {
                brand_name: "dyson".into(),
                deal_count: 4,
                avg_profit: 6000.0,
                total_profit: 24_000,
                example_keywords: Vec::new(),
            }],
            product_type_patterns: Vec::new(),
            price_range_patterns: Vec::new(),
            title_tokens: Vec::new(),
            total_deals: 4,
            total_keywords: 1,
        };
        let seeds = build_seed_list(Some(&insights));
        assert_eq!(seeds[0], "dyson");
        assert!(seeds.len() <= MAX_SEEDS_PER_CYCLE);
        // Curated default "Dyson" must not duplicate the proven brand
        assert_eq!(
            seeds.iter().filter(|s| s.to_lowercase() == "dyson").count(),
            1
        );
    }

    #[test]
    fn seed_list_caps_at_ten() {
        assert!(build_seed_list(None).len() <= MAX_SEEDS_PER_CYCLE);
    }
}
