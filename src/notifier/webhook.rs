//! Webhook delivery for Discord / Slack / LINE Notify.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;
use tracing::{debug, warn};

use super::Notifier;
use crate::keepa::scorer::DealCandidate;
use crate::models::{MonitoredItem, StatusHistory, WatchedKeyword};

const MAX_RETRIES: u32 = 3;
const RETRY_BACKOFF_SECS: [u64; 3] = [1, 3, 5];
pub const LINE_NOTIFY_URL: &str = "https://notify-api.line.me/api/notify";

/// POST a payload to a webhook with retry + backoff.
///
/// LINE Notify takes a form-encoded body with a Bearer token (the
/// "webhook URL" setting holds the token); Discord/Slack/generic get
/// the payload as JSON. Returns false after the final failed attempt.
pub async fn send_webhook(url: &str, payload: &Value, webhook_type: &str) -> bool {
    for attempt in 0..MAX_RETRIES {
        let result = async {
            let client = reqwest::Client::builder()
                .timeout(Duration::from_secs(10))
                .build()?;
            let resp = if webhook_type == "line" {
                let token = payload["token"].as_str().unwrap_or("");
                let message = payload["message"].as_str().unwrap_or("");
                let mut req = client.post(url).form(&[("message", message)]);
                if !token.is_empty() {
                    req = req.bearer_auth(token);
                }
                req.send().await?
            } else {
                client.post(url).json(payload).send().await?
            };
            resp.error_for_status()?;
            Ok::<(), reqwest::Error>(())
        }
        .await;

        match result {
            Ok(()) => return true,
            Err(e) => {
                let wait = RETRY_BACKOFF_SECS[(attempt as usize).min(RETRY_BACKOFF_SECS.len() - 1)];
                if attempt + 1 < MAX_RETRIES {
                    warn!(
                        attempt = attempt + 1,
                        max = MAX_RETRIES,
                        error = %e,
                        "Webhook attempt failed, retrying in {wait}s"
                    );
                    tokio::time::sleep(Duration::from_secs(wait)).await;
                } else {
                    warn!(max = MAX_RETRIES, error = %e, "Webhook failed after all attempts");
                }
            }
        }
    }
    false
}

/// Build the deal notification payload for the configured sink.
pub fn build_deal_payload(deal: &DealCandidate, kw: &WatchedKeyword, webhook_type: &str) -> Value {
    let yahoo_url = if deal.yahoo_url.is_empty() {
        format!("https://auctions.yahoo.co.jp/jp/auction/{}", deal.yahoo_auction_id)
    } else {
        deal.yahoo_url.clone()
    };
    let amazon_url = format!("https://amazon.co.jp/dp/{}", deal.amazon_asin);

    match webhook_type {
        "discord" => {
            let title: String = deal.yahoo_title.chars().take(100).collect();
            let shipping = if deal.yahoo_shipping == 0 {
                " (送料無料)".to_string()
            } else {
                format!(" (+送料¥{})", deal.yahoo_shipping)
            };
            let mut embed = json!({
                "title": format!("Deal: {title}"),
                "url": yahoo_url,
                "color": 0x00C853,
                "fields": [
                    {"name": "Yahoo", "value": format!("¥{}{shipping}", deal.yahoo_price), "inline": true},
                    {"name": "Amazon中古", "value": format!("¥{}", deal.sell_price), "inline": true},
                    {"name": "粗利", "value": format!("¥{} ({}%)", deal.gross_profit, deal.gross_margin_pct), "inline": true},
                    {"name": "ランク", "value": deal.sales_rank.map(|r| r.to_string()).unwrap_or_else(|| "-".into()), "inline": true},
                    {"name": "リンク", "value": format!("[Yahoo]({yahoo_url}) | [Amazon]({amazon_url})"), "inline": false},
                ],
                "footer": {"text": format!("キーワード: {}", kw.keyword)},
            });
            if !deal.yahoo_image_url.is_empty() {
                embed["thumbnail"] = json!({"url": deal.yahoo_image_url});
            }
            json!({ "embeds": [embed] })
        }
        "slack" => {
            let msg = format!(
                "*Deal:* {}\nYahoo ¥{} → Amazon中古 ¥{}\n粗利 ¥{} ({}%)\n<{yahoo_url}|Yahoo> | <{amazon_url}|Amazon>\nキーワード: {}",
                deal.yahoo_title, deal.yahoo_price, deal.sell_price,
                deal.gross_profit, deal.gross_margin_pct, kw.keyword,
            );
            json!({
                "text": msg,
                "blocks": [{"type": "section", "text": {"type": "mrkdwn", "text": msg}}],
            })
        }
        "line" => {
            let msg = format!(
                "\nDeal: {}\nYahoo ¥{} → Amazon中古 ¥{}\n粗利 ¥{} ({}%)\nYahoo: {yahoo_url}\nAmazon: {amazon_url}\nキーワード: {}",
                deal.yahoo_title, deal.yahoo_price, deal.sell_price,
                deal.gross_profit, deal.gross_margin_pct, kw.keyword,
            );
            json!({ "message": msg })
        }
        _ => {
            let msg = format!(
                "Deal: {}\nYahoo ¥{} → Amazon中古 ¥{}\n粗利 ¥{} ({}%)\nYahoo: {yahoo_url}\nAmazon: {amazon_url}\nキーワード: {}",
                deal.yahoo_title, deal.yahoo_price, deal.sell_price,
                deal.gross_profit, deal.gross_margin_pct, kw.keyword,
            );
            json!({ "message": msg })
        }
    }
}

/// Sends item status changes to the configured webhook sink.
pub struct WebhookNotifier {
    url: String,
    webhook_type: String,
}

impl WebhookNotifier {
    pub fn new(url: String, webhook_type: String) -> Self {
        Self { url, webhook_type }
    }

    fn build_payload(&self, message: &str, item: &MonitoredItem) -> Value {
        match self.webhook_type.as_str() {
            "discord" => {
                let color = if item.status.is_ended() { 0xFF4500 } else { 0x00BFFF };
                let mut embed = json!({
                    "title": item.title,
                    "url": item.url,
                    "color": color,
                    "fields": [
                        {"name": "Price", "value": format!("¥{}", item.current_price), "inline": true},
                        {"name": "Bids", "value": item.bid_count.to_string(), "inline": true},
                        {"name": "Status", "value": item.status.as_str(), "inline": true},
                    ],
                });
                if !item.image_url.is_empty() {
                    embed["thumbnail"] = json!({"url": item.image_url});
                }
                json!({ "content": message, "embeds": [embed] })
            }
            "slack" => json!({
                "text": message,
                "blocks": [{"type": "section", "text": {"type": "mrkdwn", "text": message}}],
            }),
            // token rides in the payload for LINE Notify
            "line" => json!({ "message": message, "token": self.url }),
            _ => json!({ "message": message }),
        }
    }

    fn target_url(&self) -> &str {
        if self.webhook_type == "line" {
            LINE_NOTIFY_URL
        } else {
            &self.url
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn channel(&self) -> &'static str {
        "webhook"
    }

    async fn notify(&self, item: &mut MonitoredItem, change: &StatusHistory) -> bool {
        if self.url.is_empty() {
            debug!("Webhook URL not configured; skipping");
            return false;
        }
        let msg = self.format_message(item, change);
        let payload = self.build_payload(&msg, item);
        send_webhook(self.target_url(), &payload, &self.webhook_type).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deal() -> DealCandidate {
        DealCandidate {
            yahoo_title: "Sony WH-1000XM4".into(),
            yahoo_price: 3000,
            yahoo_shipping: 0,
            yahoo_auction_id: "x1".into(),
            yahoo_url: String::new(),
            yahoo_image_url: "https://example.invalid/img.jpg".into(),
            amazon_asin: "B000TEST01".into(),
            amazon_title: "Sony WH-1000XM4 Headphones".into(),
            amazon_used_price: Some(10_000),
            amazon_new_price: None,
            sales_rank: Some(45_000),
            sells_well: true,
            sell_price: 10_000,
            total_cost: 3900,
            amazon_fee: 1000,
            amazon_fee_pct: 10.0,
            forwarding_cost: 800,
            gross_profit: 5100,
            gross_margin_pct: 51.0,
            rank_trend: "stable",
            price_trend: "stable",
        }
    }

    fn keyword() -> WatchedKeyword {
        WatchedKeyword {
            id: 1,
            keyword: "sony wh-1000xm4".into(),
            is_active: true,
            last_scanned_at: None,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
            notes: String::new(),
            source: "manual".into(),
            parent_keyword_id: None,
            performance_score: 0.0,
            total_scans: 0,
            total_deals_found: 0,
            total_gross_profit: 0,
            scans_since_last_deal: 0,
            confidence: 1.0,
            auto_deactivated_at: None,
        }
    }

    #[test]
    fn discord_payload_shape() {
        let payload = build_deal_payload(&deal(), &keyword(), "discord");
        let embed = &payload["embeds"][0];
        assert!(embed["title"].as_str().unwrap().starts_with("Deal:"));
        assert_eq!(embed["thumbnail"]["url"], "https://example.invalid/img.jpg");
        assert!(embed["fields"].as_array().unwrap().len() >= 4);
    }

    #[test]
    fn slack_payload_has_text_and_blocks() {
        let payload = build_deal_payload(&deal(), &keyword(), "slack");
        assert!(payload["text"].as_str().unwrap().contains("粗利"));
        assert!(payload["blocks"].is_array());
    }

    #[test]
    fn line_payload_is_message_only() {
        let payload = build_deal_payload(&deal(), &keyword(), "line");
        assert!(payload["message"].as_str().unwrap().contains("Deal:"));
        assert!(payload["embeds"].is_null());
    }

    #[tokio::test]
    async fn failing_webhook_returns_false_after_retries() {
        // Unroutable local port: three fast connection failures
        let payload = serde_json::json!({"message": "test"});
        let ok = send_webhook("http://127.0.0.1:9/bad", &payload, "generic").await;
        assert!(!ok);
    }
}
