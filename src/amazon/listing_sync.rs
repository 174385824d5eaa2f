//! Periodic reconciliation: detect offers deleted or re-priced directly
//! in Seller Central and mirror those changes into the local store.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use parking_lot::Mutex;
use serde_json::Value;
use std::time::Duration;
use tracing::{info, warn};

use super::{AmazonApiError, SpApiClient};
use crate::config::Config;
use crate::models::{ChangeType, ListingStatus, MonitoredItem, StatusHistory};
use crate::store::Store;

pub struct ListingSyncChecker {
    client: Arc<SpApiClient>,
    store: Arc<Store>,
    seller_id: String,
    /// Consecutive not-found counts per SKU. A single miss may be API
    /// flakiness; deletion is only believed on the second consecutive
    /// miss.
    fail_counts: Mutex<HashMap<String, u32>>,
}

impl ListingSyncChecker {
    pub fn new(client: Arc<SpApiClient>, store: Arc<Store>, config: &Config) -> Self {
        Self {
            client,
            store,
            seller_id: config.sp_api_seller_id.clone(),
            fail_counts: Mutex::new(HashMap::new()),
        }
    }

    pub async fn check_all(&self) -> Result<()> {
        let items = self.store.list_items_with_listing()?;
        if items.is_empty() {
            return Ok(());
        }
        info!(count = items.len(), "Listing sync: checking marketplace listings");

        let mut cleaned = 0;
        let mut price_synced = 0;
        for mut item in items {
            let sku = match item.amazon_sku.clone() {
                Some(sku) => sku,
                None => continue,
            };

            match self.fetch_listing(&sku).await {
                None => {
                    let count = {
                        let mut counts = self.fail_counts.lock();
                        let c = counts.entry(sku.clone()).or_insert(0);
                        *c += 1;
                        *c
                    };
                    if count >= 2 {
                        warn!(
                            sku = %sku,
                            auction_id = %item.auction_id,
                            "Listing gone from marketplace, clearing local state"
                        );
                        let old_sku = sku.clone();
                        item.amazon_sku = None;
                        item.amazon_listing_status = Some(ListingStatus::Delisted);
                        item.amazon_last_synced_at = None;
                        item.updated_at = Utc::now();
                        self.store.update_item(&item)?;

                        let mut change =
                            StatusHistory::change(item.id, &item.auction_id, ChangeType::AmazonDelist);
                        change.old_status = Some(old_sku.clone());
                        change.new_status = Some("セラーセントラルで削除検知".to_string());
                        self.store.add_history(&change)?;

                        self.fail_counts.lock().remove(&old_sku);
                        cleaned += 1;
                    }
                }
                Some(listing) => {
                    self.fail_counts.lock().remove(&sku);
                    if self.sync_price(&mut item, &listing)? {
                        price_synced += 1;
                    }
                }
            }

            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        if cleaned > 0 {
            info!(cleaned, "Listing sync: cleaned stale listings");
        }
        if price_synced > 0 {
            info!(price_synced, "Listing sync: synced price changes from Seller Central");
        }
        if cleaned == 0 && price_synced == 0 {
            info!("Listing sync: all listings OK");
        }
        Ok(())
    }

    /// Mirror an external price change; returns true when one was found.
    fn sync_price(&self, item: &mut MonitoredItem, listing: &Value) -> Result<bool> {
        let amazon_price = match extract_price(listing) {
            Some(p) if p > 0 => p,
            _ => return Ok(false),
        };
        let local_price = item.amazon_price.unwrap_or(0);
        if amazon_price == local_price {
            return Ok(false);
        }

        let old_price = local_price;
        item.amazon_price = Some(amazon_price);

        // Margin implied by the Seller Central price:
        // margin = (1 - cost/price - fee_pct/100) * 100
        let cost = item.estimated_win_price + item.shipping_cost;
        if cost > 0 {
            let actual_margin =
                (1.0 - cost as f64 / amazon_price as f64 - item.amazon_fee_pct / 100.0) * 100.0;
            item.amazon_margin_pct = (actual_margin * 10.0).round() / 10.0;
        }
        item.amazon_last_synced_at = Some(Utc::now());
        item.updated_at = Utc::now();
        self.store.update_item(item)?;

        let mut change = StatusHistory::change(item.id, &item.auction_id, ChangeType::PriceChange);
        change.old_price = Some(old_price);
        change.new_price = Some(amazon_price);
        change.old_status = Some("セラーセントラルで価格変更検知".to_string());
        self.store.add_history(&change)?;

        info!(
            auction_id = %item.auction_id,
            sku = item.amazon_sku.as_deref().unwrap_or("-"),
            old_price,
            new_price = amazon_price,
            margin = item.amazon_margin_pct,
            "Price synced from Seller Central"
        );
        Ok(true)
    }

    /// `None` = confirmed not found; empty object = exists but
    /// unreadable (throttling etc. must not look like a deletion).
    async fn fetch_listing(&self, sku: &str) -> Option<Value> {
        match self.client.get_listing(&self.seller_id, sku).await {
            Ok(listing) => Some(listing),
            Err(e @ AmazonApiError::Api { .. }) if e.is_not_found() => None,
            Err(e) => {
                warn!(sku, error = %e, "Listing fetch error, treating as present");
                Some(Value::Null)
            }
        }
    }
}

/// Current price from a getListingsItem response:
/// `summaries[*].price.amount` first, then the purchasable_offer
/// schedule in the raw attributes.
fn extract_price(listing: &Value) -> Option<i64> {
    if let Some(summaries) = listing["summaries"].as_array() {
        for summary in summaries {
            if let Some(amount) = summary["price"]["amount"].as_f64() {
                return Some(amount as i64);
            }
        }
    }

    let offers = listing["attributes"]["purchasable_offer"]
        .as_array()
        .or_else(|| listing["attributes"]["our_price"].as_array())?;
    for entry in offers {
        let prices = entry["our_price"]
            .as_array()
            .cloned()
            .unwrap_or_else(|| vec![entry.clone()]);
        for price_entry in &prices {
            if let Some(schedule) = price_entry["schedule"].as_array() {
                for s in schedule {
                    if let Some(v) = s["value_with_tax"].as_f64().or_else(|| s["value"].as_f64()) {
                        return Some(v as i64);
                    }
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_comes_from_summaries_first() {
        let listing = json!({
            "summaries": [{"price": {"amount": 5980.0, "currencyCode": "JPY"}}],
            "attributes": {"purchasable_offer": [{"our_price": [{"schedule": [{"value_with_tax": 9999}]}]}]}
        });
        assert_eq!(extract_price(&listing), Some(5980));
    }

    #[test]
    fn price_falls_back_to_purchasable_offer() {
        let listing = json!({
            "attributes": {"purchasable_offer": [{
                "marketplace_id": "A1VC38T7YXB528",
                "our_price": [{"schedule": [{"value_with_tax": 12800}]}]
            }]}
        });
        assert_eq!(extract_price(&listing), Some(12800));
    }

    #[test]
    fn no_price_yields_none() {
        assert_eq!(extract_price(&json!({"summaries": []})), None);
        assert_eq!(extract_price(&Value::Null), None);
    }
}
