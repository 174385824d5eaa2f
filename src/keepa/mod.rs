//! Client for the Keepa-style marketplace analytics provider.
//!
//! Every search or query consumes paid tokens; `tokens_left` is updated
//! from each response and gates the scanner and discovery cycles.

pub mod scorer;

use std::collections::HashMap;

use parking_lot::Mutex;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

const KEEPA_API_BASE: &str = "https://api.keepa.com";
/// Amazon.co.jp.
const DOMAIN_JP: u32 = 5;
/// Cached search results per cycle; evict-all on insert once full.
const SEARCH_CACHE_MAX: usize = 50;

/// Stats array indices. Value -1 means "no data".
pub const IDX_AMAZON: usize = 0;
pub const IDX_NEW: usize = 1;
pub const IDX_USED: usize = 2;
pub const IDX_SALES_RANK: usize = 3;

#[derive(Debug, Error)]
pub enum KeepaError {
    #[error("Keepa API error: {message} (tokens left: {tokens_left:?})")]
    Api {
        message: String,
        tokens_left: Option<i64>,
    },
    #[error("Keepa HTTP error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl KeepaError {
    pub fn tokens_left(&self) -> Option<i64> {
        match self {
            KeepaError::Api { tokens_left, .. } => *tokens_left,
            KeepaError::Transport(_) => None,
        }
    }
}

/// Rolling statistics block. Entries are either scalars (-1 = no data)
/// or `[keepa_time, value]` pairs for the interval min/max arrays.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaStats {
    pub current: Vec<Value>,
    pub avg30: Vec<Value>,
    pub avg90: Vec<Value>,
    #[serde(rename = "minInInterval")]
    pub min_in_interval: Vec<Value>,
    #[serde(rename = "maxInInterval")]
    pub max_in_interval: Vec<Value>,
    #[serde(rename = "salesRankDrops30")]
    pub sales_rank_drops30: Option<i64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct KeepaProduct {
    pub asin: String,
    pub title: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub stats: Option<KeepaStats>,
    #[serde(rename = "packageLength")]
    pub package_length: Option<i64>,
    #[serde(rename = "packageWidth")]
    pub package_width: Option<i64>,
    #[serde(rename = "packageHeight")]
    pub package_height: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct KeepaResponse {
    #[serde(rename = "tokensLeft")]
    tokens_left: Option<i64>,
    products: Option<Vec<KeepaProduct>>,
    #[serde(rename = "asinList")]
    asin_list: Option<Vec<String>>,
    error: Option<Value>,
}

pub struct KeepaClient {
    client: Client,
    api_key: String,
    default_stats_days: u32,
    tokens_left: Mutex<Option<i64>>,
    search_cache: Mutex<HashMap<String, Vec<KeepaProduct>>>,
}

impl KeepaClient {
    pub fn new(api_key: String, default_stats_days: u32) -> Result<Self, KeepaError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            api_key,
            default_stats_days,
            tokens_left: Mutex::new(None),
            search_cache: Mutex::new(HashMap::new()),
        })
    }

    /// Remaining API tokens, as of the last response.
    pub fn tokens_left(&self) -> Option<i64> {
        *self.tokens_left.lock()
    }

    /// Call at the start of each scan cycle.
    pub fn clear_search_cache(&self) {
        self.search_cache.lock().clear();
    }

    /// Product data for a single ASIN.
    pub async fn query_product(
        &self,
        asin: &str,
        stats: Option<u32>,
        history: bool,
    ) -> Result<KeepaProduct, KeepaError> {
        let products = self.query_products(&[asin.to_string()], stats, history).await?;
        products.into_iter().next().ok_or_else(|| KeepaError::Api {
            message: format!("No product data returned for ASIN {asin}"),
            tokens_left: self.tokens_left(),
        })
    }

    /// Product data for up to 100 ASINs per request.
    pub async fn query_products(
        &self,
        asins: &[String],
        stats: Option<u32>,
        history: bool,
    ) -> Result<Vec<KeepaProduct>, KeepaError> {
        let stats = stats.unwrap_or(self.default_stats_days);
        let resp = self
            .client
            .get(format!("{KEEPA_API_BASE}/product"))
            .query(&[
                ("key", self.api_key.clone()),
                ("domain", DOMAIN_JP.to_string()),
                ("asin", asins.join(",")),
                ("stats", stats.to_string()),
                ("history", if history { "1" } else { "0" }.to_string()),
            ])
            .send()
            .await?;
        self.read_products(resp).await
    }

    /// Keyword search, up to 40 results, cached per (term, stats_days).
    pub async fn search_products(
        &self,
        term: &str,
        stats: Option<u32>,
    ) -> Result<Vec<KeepaProduct>, KeepaError> {
        let stat_days = stats.unwrap_or(self.default_stats_days);
        let cache_key = format!("{term}:{stat_days}");
        if let Some(cached) = self.search_cache.lock().get(&cache_key) {
            debug!(term, "Keepa search cache hit");
            return Ok(cached.clone());
        }

        let resp = self
            .client
            .get(format!("{KEEPA_API_BASE}/search"))
            .query(&[
                ("key", self.api_key.clone()),
                ("domain", DOMAIN_JP.to_string()),
                ("type", "product".to_string()),
                ("term", term.to_string()),
                ("stats", stat_days.to_string()),
            ])
            .send()
            .await?;
        let products = self.read_products(resp).await?;

        let mut cache = self.search_cache.lock();
        if cache.len() >= SEARCH_CACHE_MAX {
            cache.clear();
        }
        cache.insert(cache_key, products.clone());
        Ok(products)
    }

    /// Product Finder: filter query → ASIN list → details for the top 50.
    pub async fn product_finder(
        &self,
        selection: &Value,
        stats: Option<u32>,
    ) -> Result<Vec<KeepaProduct>, KeepaError> {
        let resp = self
            .client
            .get(format!("{KEEPA_API_BASE}/query"))
            .query(&[
                ("key", self.api_key.clone()),
                ("domain", DOMAIN_JP.to_string()),
                ("selection", selection.to_string()),
            ])
            .send()
            .await?;
        let body = self.read_response(resp).await?;

        let asin_list = body.asin_list.unwrap_or_default();
        if asin_list.is_empty() {
            info!("Product Finder returned 0 ASINs");
            return Ok(Vec::new());
        }
        info!(count = asin_list.len(), "Product Finder returned ASINs");

        let top: Vec<String> = asin_list.into_iter().take(50).collect();
        self.query_products(&top, stats, false).await
    }

    async fn read_products(
        &self,
        resp: reqwest::Response,
    ) -> Result<Vec<KeepaProduct>, KeepaError> {
        let body = self.read_response(resp).await?;
        match body.products {
            Some(products) => Ok(products),
            None => Err(KeepaError::Api {
                message: body
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Unknown error".to_string()),
                tokens_left: self.tokens_left(),
            }),
        }
    }

    async fn read_response(&self, resp: reqwest::Response) -> Result<KeepaResponse, KeepaError> {
        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(KeepaError::Api {
                message: format!("Keepa API returned {status}: {text}"),
                tokens_left: self.tokens_left(),
            });
        }

        let body: KeepaResponse = resp.json().await?;
        if let Some(left) = body.tokens_left {
            *self.tokens_left.lock() = Some(left);
            if left <= 0 {
                warn!(tokens_left = left, "Keepa API tokens exhausted");
            }
        }
        Ok(body)
    }
}

/// Extract a scalar from a stats array; `None` for missing or -1.
pub fn stat_val(arr: &[Value], idx: usize) -> Option<i64> {
    let v = arr.get(idx)?.as_i64()?;
    if v == -1 {
        None
    } else {
        Some(v)
    }
}

/// Extract a min/max entry. Interval arrays hold `[keepa_time, value]`
/// pairs; fall back to treating the entry as a scalar.
pub fn stat_minmax(arr: &[Value], idx: usize) -> Option<i64> {
    let entry = arr.get(idx)?;
    let v = match entry {
        Value::Array(pair) if pair.len() >= 2 => pair[1].as_i64()?,
        Value::Array(pair) if pair.len() == 1 => pair[0].as_i64()?,
        other => other.as_i64()?,
    };
    if v == -1 {
        None
    } else {
        Some(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stat_helpers_treat_minus_one_as_missing() {
        let arr = vec![json!(5000), json!(-1), json!(12000), json!(null)];
        assert_eq!(stat_val(&arr, 0), Some(5000));
        assert_eq!(stat_val(&arr, 1), None);
        assert_eq!(stat_val(&arr, 2), Some(12000));
        assert_eq!(stat_val(&arr, 3), None);
        assert_eq!(stat_val(&arr, 9), None);
    }

    #[test]
    fn minmax_reads_time_value_pairs() {
        let arr = vec![json!([123456, 9800]), json!(-1), json!(7000)];
        assert_eq!(stat_minmax(&arr, 0), Some(9800));
        assert_eq!(stat_minmax(&arr, 1), None);
        assert_eq!(stat_minmax(&arr, 2), Some(7000));
    }

    #[test]
    fn product_deserializes_with_partial_fields() {
        let p: KeepaProduct = serde_json::from_value(json!({
            "asin": "B000TEST01",
            "title": "Test product",
            "stats": {"current": [-1, 15000, 10000, 45000]}
        }))
        .unwrap();
        assert_eq!(p.asin, "B000TEST01");
        let stats = p.stats.unwrap();
        assert_eq!(stat_val(&stats.current, IDX_USED), Some(10000));
        assert_eq!(stat_val(&stats.current, IDX_AMAZON), None);
    }
}
