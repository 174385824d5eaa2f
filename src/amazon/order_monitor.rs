//! Polls the marketplace Orders API and pushes new-order notifications.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::SpApiClient;
use crate::notifier::send_webhook;
use crate::store::Store;

const SELLER_CENTRAL_ORDER_URL: &str =
    "https://sellercentral.amazon.co.jp/orders-v3/order/{order_id}";

/// Seen-set bounds: trim to the newer half once the cap is reached.
const SEEN_CAP: usize = 500;
const SEEN_TRIM_TO: usize = 200;

pub struct OrderMonitor {
    client: Arc<SpApiClient>,
    store: Arc<Store>,
    webhook_url: String,
    webhook_type: String,
    /// Checkpoint starts at process start so only genuinely new orders
    /// notify; not persisted — a restart re-notifies at most one cycle.
    last_checked_at: Mutex<DateTime<Utc>>,
    seen_order_ids: Mutex<Vec<String>>,
}

impl OrderMonitor {
    pub fn new(
        client: Arc<SpApiClient>,
        store: Arc<Store>,
        webhook_url: String,
        webhook_type: String,
    ) -> Self {
        Self {
            client,
            store,
            webhook_url,
            webhook_type,
            last_checked_at: Mutex::new(Utc::now()),
            seen_order_ids: Mutex::new(Vec::new()),
        }
    }

    pub async fn check_orders(&self) {
        let created_after = self
            .last_checked_at
            .lock()
            .format("%Y-%m-%dT%H:%M:%SZ")
            .to_string();

        let orders = match self.client.get_new_orders(&created_after).await {
            Ok(orders) => orders,
            Err(e) => {
                warn!(error = %e, "Order monitor: SP-API error");
                return;
            }
        };

        // Advance the checkpoint before processing so a failed webhook
        // can never cause a re-fetch loop.
        let now = Utc::now();

        let new_orders: Vec<Value> = {
            let seen: HashSet<String> = self.seen_order_ids.lock().iter().cloned().collect();
            orders
                .into_iter()
                .filter(|o| {
                    o["AmazonOrderId"]
                        .as_str()
                        .map(|id| !seen.contains(id))
                        .unwrap_or(false)
                })
                .collect()
        };

        if new_orders.is_empty() {
            debug!(since = %created_after, "Order monitor: no new orders");
            *self.last_checked_at.lock() = now;
            return;
        }
        info!(count = new_orders.len(), "Order monitor: new orders found");

        for order in &new_orders {
            let order_id = order["AmazonOrderId"].as_str().unwrap_or("unknown").to_string();
            self.seen_order_ids.lock().push(order_id);
            self.notify_order(order).await;
        }

        *self.last_checked_at.lock() = now;

        let mut seen = self.seen_order_ids.lock();
        if seen.len() > SEEN_CAP {
            let keep_from = seen.len() - SEEN_TRIM_TO;
            seen.drain(..keep_from);
        }
    }

    async fn notify_order(&self, order: &Value) {
        let order_id = order["AmazonOrderId"].as_str().unwrap_or("unknown");
        let sc_url = SELLER_CENTRAL_ORDER_URL.replace("{order_id}", order_id);
        let product_info = self.lookup_product_info();

        let payload = if self.webhook_type == "discord" {
            build_discord_payload(order, &sc_url, product_info.as_ref())
        } else {
            let mut message = format!(
                "[Amazon注文通知]\n注文ID: {order_id}\nステータス: {}\n金額: {} {}\n商品数: {}\nセラセン: {sc_url}",
                order["OrderStatus"].as_str().unwrap_or("unknown"),
                order["OrderTotal"]["CurrencyCode"].as_str().unwrap_or("JPY"),
                order["OrderTotal"]["Amount"].as_str().unwrap_or("?"),
                order["NumberOfItemsUnshipped"].as_i64().unwrap_or(0),
            );
            if let Some(info) = &product_info {
                message.push_str(&format!("\n商品: {}", info["title"].as_str().unwrap_or("")));
            }
            if self.webhook_type == "slack" {
                json!({ "text": message })
            } else {
                json!({ "message": message })
            }
        };

        if send_webhook(&self.webhook_url, &payload, &self.webhook_type).await {
            info!(order_id, "Order notification sent");
        } else {
            warn!(order_id, "Failed to send order notification");
        }
    }

    /// The orders list response carries no per-item SKU. When exactly
    /// one item has a live marketplace offer the order can only be that
    /// product; otherwise stay silent rather than guess.
    fn lookup_product_info(&self) -> Option<Value> {
        let items = self.store.list_items_with_active_listing().ok()?;
        if items.len() != 1 {
            return None;
        }
        let item = &items[0];
        Some(json!({
            "title": item.title,
            "sku": item.amazon_sku,
            "yahoo_url": item.url,
            "asin": item.amazon_asin,
        }))
    }
}

fn build_discord_payload(order: &Value, sc_url: &str, product_info: Option<&Value>) -> Value {
    let order_id = order["AmazonOrderId"].as_str().unwrap_or("unknown");
    let total_amount = order["OrderTotal"]["Amount"].as_str().unwrap_or("?");
    let total_currency = order["OrderTotal"]["CurrencyCode"].as_str().unwrap_or("JPY");

    let amount_display = if total_currency == "JPY" && total_amount != "?" {
        total_amount
            .parse::<f64>()
            .map(|a| format!("¥{}", a as i64))
            .unwrap_or_else(|_| "?".to_string())
    } else {
        format!("{total_currency} {total_amount}")
    };

    let mut fields = vec![
        json!({"name": "注文ID", "value": format!("[{order_id}]({sc_url})"), "inline": false}),
        json!({"name": "金額", "value": amount_display, "inline": true}),
        json!({"name": "商品数", "value": order["NumberOfItemsUnshipped"].as_i64().unwrap_or(0).to_string(), "inline": true}),
        json!({"name": "ステータス", "value": order["OrderStatus"].as_str().unwrap_or("unknown"), "inline": true}),
        json!({"name": "注文日時", "value": order["PurchaseDate"].as_str().unwrap_or(""), "inline": false}),
    ];
    if let Some(info) = product_info {
        if let Some(title) = info["title"].as_str().filter(|t| !t.is_empty()) {
            let title: String = title.chars().take(200).collect();
            fields.push(json!({"name": "商品名", "value": title, "inline": false}));
        }
        if let Some(sku) = info["sku"].as_str() {
            fields.push(json!({"name": "SKU", "value": sku, "inline": true}));
        }
        if let Some(url) = info["yahoo_url"].as_str().filter(|u| !u.is_empty()) {
            fields.push(json!({"name": "ヤフオク", "value": format!("[出品ページ]({url})"), "inline": true}));
        }
    }

    json!({
        "content": "@here Amazon新規注文!",
        "embeds": [{
            "title": "Amazon 新規注文通知",
            "url": sc_url,
            "color": 0x00AA00,
            "fields": fields,
            "footer": {"text": "Order Monitor"},
            "timestamp": Utc::now().to_rfc3339(),
        }],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn discord_order_payload_formats_jpy() {
        let order = json!({
            "AmazonOrderId": "503-1234567-1234567",
            "OrderStatus": "Unshipped",
            "PurchaseDate": "2026-07-01T12:00:00Z",
            "OrderTotal": {"Amount": "5980.0", "CurrencyCode": "JPY"},
            "NumberOfItemsUnshipped": 1
        });
        let payload = build_discord_payload(&order, "https://example.invalid/order", None);
        let fields = payload["embeds"][0]["fields"].as_array().unwrap();
        assert_eq!(fields[1]["value"], "¥5980");
    }
}
