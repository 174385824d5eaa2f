//! Marketplace reaction to auction status changes: when a tracked
//! auction ends, the corresponding offer is withdrawn.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::{error, info};

use super::SpApiClient;
use crate::models::{ChangeType, ListingStatus, MonitoredItem, StatusHistory};
use crate::notifier::Notifier;

pub struct AmazonNotifier {
    client: Arc<SpApiClient>,
    seller_id: String,
}

impl AmazonNotifier {
    pub fn new(client: Arc<SpApiClient>, seller_id: String) -> Self {
        Self { client, seller_id }
    }

    async fn delete_listing(&self, item: &mut MonitoredItem) -> bool {
        let sku = match item.amazon_sku.clone() {
            Some(sku) => sku,
            None => return true,
        };
        info!(
            auction_id = %item.auction_id,
            sku = %sku,
            "Deleting marketplace listing for ended auction"
        );
        match self.client.delete_listing(&self.seller_id, &sku).await {
            Ok(_) => {
                item.amazon_sku = None;
                item.amazon_listing_status = Some(ListingStatus::Delisted);
                item.amazon_last_synced_at = None;
                item.updated_at = Utc::now();
                true
            }
            Err(e) => {
                error!(sku = %sku, error = %e, "Failed to delete marketplace listing");
                item.amazon_listing_status = Some(ListingStatus::Error);
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for AmazonNotifier {
    fn channel(&self) -> &'static str {
        "amazon"
    }

    async fn notify(&self, item: &mut MonitoredItem, change: &StatusHistory) -> bool {
        if change.change_type != ChangeType::StatusChange {
            return true;
        }
        if item.amazon_sku.is_none() {
            return true;
        }
        let ended = change
            .new_status
            .as_deref()
            .is_some_and(|s| s.starts_with("ended_"));
        if ended {
            return self.delete_listing(item).await;
        }
        true
    }

    fn format_message(&self, item: &MonitoredItem, change: &StatusHistory) -> String {
        let mut base = format!(
            "{}: {} → {}",
            item.title,
            change.old_status.as_deref().unwrap_or("?"),
            change.new_status.as_deref().unwrap_or("?"),
        );
        if let Some(sku) = &item.amazon_sku {
            base.push_str(&format!(
                "\nAmazon SKU: {sku} | Status: {}",
                item.amazon_listing_status
                    .map(|s| s.as_str())
                    .unwrap_or("-")
            ));
        }
        base
    }
}
