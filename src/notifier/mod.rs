//! Notifier dispatch: every monitor-loop change fans out to the
//! registered notifiers (log, webhook, marketplace sync).

pub mod webhook;

use async_trait::async_trait;
use tracing::info;

use crate::models::{ChangeType, MonitoredItem, StatusHistory};
pub use webhook::{send_webhook, WebhookNotifier};

/// A consumer of item change events.
///
/// `notify` may mutate the item (the marketplace notifier clears the
/// SKU after delisting); the monitor loop persists the item afterwards
/// inside the same transaction.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name recorded in the notification log.
    fn channel(&self) -> &'static str;

    async fn notify(&self, item: &mut MonitoredItem, change: &StatusHistory) -> bool;

    fn format_message(&self, item: &MonitoredItem, change: &StatusHistory) -> String {
        match change.change_type {
            ChangeType::StatusChange => format!(
                "{}: {} → {}",
                item.title,
                change.old_status.as_deref().unwrap_or("?"),
                change.new_status.as_deref().unwrap_or("?"),
            ),
            ChangeType::PriceChange => format!(
                "{}: ¥{} → ¥{}",
                item.title,
                change.old_price.unwrap_or(0),
                change.new_price.unwrap_or(0),
            ),
            ChangeType::BidChange => format!(
                "{}: bids {} → {}",
                item.title,
                change.old_bid_count.unwrap_or(0),
                change.new_bid_count.unwrap_or(0),
            ),
            _ => format!("{}: {}", item.title, change.change_type.as_str()),
        }
    }
}

/// Writes every change to the application log. Always succeeds.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn channel(&self) -> &'static str {
        "log"
    }

    async fn notify(&self, item: &mut MonitoredItem, change: &StatusHistory) -> bool {
        info!(
            auction_id = %item.auction_id,
            change = change.change_type.as_str(),
            "{}",
            self.format_message(item, change)
        );
        true
    }
}

/// Event type recorded in the notification log for a change.
pub fn event_type_for(change: &StatusHistory) -> &'static str {
    match change.change_type {
        ChangeType::StatusChange => {
            if change.new_status.as_deref() == Some("ended_sold") {
                "sold"
            } else {
                "ended"
            }
        }
        ChangeType::PriceChange => "price_change",
        ChangeType::BidChange => "bid_change",
        _ => "other",
    }
}
