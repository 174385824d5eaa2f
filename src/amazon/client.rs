//! Async SP-API client.
//!
//! Speaks the Selling Partner REST API directly over reqwest with LWA
//! refresh-token auth, so nothing here ever blocks the event loop.
//! Covers the Listings Items, Feeds, Catalog Items, Listing
//! Restrictions, Product Fees, and Orders surfaces used by the listing
//! flow and the reconciliation jobs.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use reqwest::{Client, Method};
use serde_json::{json, Value};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, warn};

use super::AmazonApiError;
use crate::config::Config;

const LWA_TOKEN_URL: &str = "https://api.amazon.com/auth/o2/token";
/// Far East endpoint (covers the JP marketplace).
const SP_API_ENDPOINT: &str = "https://sellingpartnerapi-fe.amazon.com";

const FEE_CACHE_MAX: usize = 200;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

pub struct SpApiClient {
    http: Client,
    lwa_app_id: String,
    lwa_client_secret: String,
    refresh_token: String,
    marketplace_id: String,
    seller_id: String,
    token: AsyncMutex<Option<CachedToken>>,
    /// ASIN → referral fee %. Fee rates are category-stable, so a small
    /// clear-on-fill cache is enough.
    fee_cache: AsyncMutex<HashMap<String, f64>>,
    last_fee_request_at: AsyncMutex<Option<Instant>>,
}

impl SpApiClient {
    pub fn new(config: &Config) -> Result<Self, AmazonApiError> {
        let http = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            lwa_app_id: config.sp_api_lwa_app_id.clone(),
            lwa_client_secret: config.sp_api_lwa_client_secret.clone(),
            refresh_token: config.sp_api_refresh_token.clone(),
            marketplace_id: config.sp_api_marketplace.clone(),
            seller_id: config.sp_api_seller_id.clone(),
            token: AsyncMutex::new(None),
            fee_cache: AsyncMutex::new(HashMap::new()),
            last_fee_request_at: AsyncMutex::new(None),
        })
    }

    async fn access_token(&self) -> Result<String, AmazonApiError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.expires_at > Instant::now() {
                return Ok(cached.access_token.clone());
            }
        }

        let resp = self
            .http
            .post(LWA_TOKEN_URL)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", &self.refresh_token),
                ("client_id", &self.lwa_app_id),
                ("client_secret", &self.lwa_client_secret),
            ])
            .send()
            .await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            return Err(AmazonApiError::Api {
                message: format!("LWA token refresh failed: {text}"),
                status: Some(status),
            });
        }
        let body: Value = resp.json().await?;
        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| AmazonApiError::Api {
                message: "LWA response missing access_token".into(),
                status: None,
            })?
            .to_string();
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);

        *guard = Some(CachedToken {
            access_token: access_token.clone(),
            // refresh a minute early
            expires_at: Instant::now() + Duration::from_secs(expires_in.saturating_sub(60)),
        });
        Ok(access_token)
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
    ) -> Result<Value, AmazonApiError> {
        let token = self.access_token().await?;
        let mut req = self
            .http
            .request(method, format!("{SP_API_ENDPOINT}{path}"))
            .header("x-amz-access-token", token)
            .query(query);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(AmazonApiError::Api {
                message: text,
                status: Some(status.as_u16()),
            });
        }
        if status.as_u16() == 204 {
            return Ok(Value::Null);
        }
        Ok(resp.json().await.unwrap_or(Value::Null))
    }

    fn marketplace_query(&self) -> (&'static str, String) {
        ("marketplaceIds", self.marketplace_id.clone())
    }

    // --- Orders ---

    /// Line items for one order (SKU, ASIN, title, price).
    pub async fn get_order_items(&self, order_id: &str) -> Result<Vec<Value>, AmazonApiError> {
        let body = self
            .request(
                Method::GET,
                &format!("/orders/v0/orders/{order_id}/orderItems"),
                &[],
                None,
            )
            .await?;
        Ok(as_array(&body["payload"]["OrderItems"]))
    }

    /// Unshipped orders created after the given ISO timestamp.
    pub async fn get_new_orders(&self, created_after: &str) -> Result<Vec<Value>, AmazonApiError> {
        let body = self
            .request(
                Method::GET,
                "/orders/v0/orders",
                &[
                    ("CreatedAfter", created_after.to_string()),
                    ("MarketplaceIds", self.marketplace_id.clone()),
                    ("OrderStatuses", "Unshipped".to_string()),
                ],
                None,
            )
            .await?;
        Ok(as_array(&body["payload"]["Orders"]))
    }

    // --- Catalog ---

    pub async fn get_catalog_item(&self, asin: &str) -> Result<Value, AmazonApiError> {
        self.request(
            Method::GET,
            &format!("/catalog/2022-04-01/items/{asin}"),
            &[
                self.marketplace_query(),
                ("includedData", "summaries,images,salesRanks".to_string()),
            ],
            None,
        )
        .await
    }

    /// The product type for an ASIN (e.g. "SPACE_HEATER"); "PRODUCT"
    /// when the lookup fails.
    pub async fn get_product_type(&self, asin: &str) -> String {
        let result = self
            .request(
                Method::GET,
                &format!("/catalog/2022-04-01/items/{asin}"),
                &[
                    self.marketplace_query(),
                    ("includedData", "productTypes".to_string()),
                ],
                None,
            )
            .await;
        match result {
            Ok(body) => {
                for pt in as_array(&body["productTypes"]) {
                    if let Some(t) = pt["productType"].as_str() {
                        debug!(asin, product_type = t, "Resolved productType");
                        return t.to_string();
                    }
                }
                "PRODUCT".to_string()
            }
            Err(e) => {
                warn!(asin, error = %e, "Failed to get productType");
                "PRODUCT".to_string()
            }
        }
    }

    pub async fn search_catalog_items(
        &self,
        keywords: &str,
        page_size: u32,
    ) -> Result<Vec<Value>, AmazonApiError> {
        let body = self
            .request(
                Method::GET,
                "/catalog/2022-04-01/items",
                &[
                    ("keywords", keywords.to_string()),
                    self.marketplace_query(),
                    ("includedData", "summaries,images".to_string()),
                    ("pageSize", page_size.to_string()),
                ],
                None,
            )
            .await?;
        Ok(as_array(&body["items"]))
    }

    // --- Listing restrictions ---

    /// Restrictions for an ASIN+condition. Empty = listable. A failed
    /// lookup also returns empty so the listing attempt can proceed.
    pub async fn get_listing_restrictions(
        &self,
        asin: &str,
        condition_type: &str,
    ) -> Vec<Value> {
        let result = self
            .request(
                Method::GET,
                "/listings/2021-08-01/restrictions",
                &[
                    ("asin", asin.to_string()),
                    ("sellerId", self.seller_id.clone()),
                    self.marketplace_query(),
                    ("conditionType", condition_type.to_string()),
                    ("reasonLocale", "ja_JP".to_string()),
                ],
                None,
            )
            .await;
        match result {
            Ok(body) => as_array(&body["restrictions"]),
            Err(e) => {
                warn!(asin, error = %e, "Listing restrictions check failed");
                Vec::new()
            }
        }
    }

    // --- Listings ---

    fn listing_path(&self, seller_id: &str, sku: &str) -> String {
        format!("/listings/2021-08-01/items/{seller_id}/{sku}")
    }

    pub async fn create_listing(
        &self,
        seller_id: &str,
        sku: &str,
        product_type: &str,
        attributes: Value,
        offer_only: bool,
    ) -> Result<Value, AmazonApiError> {
        let mut body = json!({
            "productType": product_type,
            "attributes": attributes,
        });
        if offer_only {
            body["requirements"] = json!("LISTING_OFFER_ONLY");
        }

        let payload = self
            .request(
                Method::PUT,
                &self.listing_path(seller_id, sku),
                &[self.marketplace_query()],
                Some(&body),
            )
            .await?;

        let status = payload["status"].as_str().unwrap_or("");
        if status == "INVALID" {
            let msgs: Vec<String> = as_array(&payload["issues"])
                .iter()
                .map(|i| {
                    i["message"]
                        .as_str()
                        .or_else(|| i["code"].as_str())
                        .unwrap_or("")
                        .to_string()
                })
                .filter(|m| !m.is_empty())
                .collect();
            return Err(AmazonApiError::Api {
                message: format!(
                    "Listing rejected (INVALID): {}",
                    if msgs.is_empty() {
                        "unknown error".to_string()
                    } else {
                        msgs.join("; ")
                    }
                ),
                status: None,
            });
        }

        info!(
            sku,
            status,
            submission_id = payload["submissionId"].as_str().unwrap_or(""),
            "Listing created"
        );
        Ok(payload)
    }

    async fn patch_listing(
        &self,
        seller_id: &str,
        sku: &str,
        patches: Value,
    ) -> Result<Value, AmazonApiError> {
        let body = json!({ "productType": "PRODUCT", "patches": patches });
        self.request(
            Method::PATCH,
            &self.listing_path(seller_id, sku),
            &[self.marketplace_query()],
            Some(&body),
        )
        .await
    }

    pub async fn patch_listing_quantity(
        &self,
        seller_id: &str,
        sku: &str,
        quantity: i64,
    ) -> Result<Value, AmazonApiError> {
        self.patch_listing(
            seller_id,
            sku,
            json!([{
                "op": "replace",
                "path": "/attributes/fulfillment_availability",
                "value": [{"fulfillment_channel_code": "DEFAULT", "quantity": quantity}],
            }]),
        )
        .await
    }

    pub async fn patch_listing_price(
        &self,
        seller_id: &str,
        sku: &str,
        price_jpy: i64,
    ) -> Result<Value, AmazonApiError> {
        self.patch_listing(
            seller_id,
            sku,
            json!([{
                "op": "replace",
                "path": "/attributes/purchasable_offer",
                "value": [{
                    "marketplace_id": self.marketplace_id,
                    "currency": "JPY",
                    "our_price": [{"schedule": [{"value_with_tax": price_jpy}]}],
                }],
            }]),
        )
        .await
    }

    pub async fn patch_listing_lead_time(
        &self,
        seller_id: &str,
        sku: &str,
        days: i64,
    ) -> Result<Value, AmazonApiError> {
        self.patch_listing(
            seller_id,
            sku,
            json!([{
                "op": "replace",
                "path": "/attributes/lead_time_to_ship_max_days",
                "value": [{"value": days}],
            }]),
        )
        .await
    }

    pub async fn patch_listing_shipping_group(
        &self,
        seller_id: &str,
        sku: &str,
        group_name: &str,
    ) -> Result<Value, AmazonApiError> {
        self.patch_listing(
            seller_id,
            sku,
            json!([{
                "op": "replace",
                "path": "/attributes/merchant_shipping_group",
                "value": [{"value": group_name}],
            }]),
        )
        .await
    }

    /// Offer-level images: first URL becomes the main image, up to five
    /// more become the numbered secondary slots.
    pub async fn patch_offer_images(
        &self,
        seller_id: &str,
        sku: &str,
        image_urls: &[String],
    ) -> Result<Value, AmazonApiError> {
        let mut patches = Vec::new();
        if let Some(main) = image_urls.first() {
            patches.push(json!({
                "op": "replace",
                "path": "/attributes/main_offer_image_locator",
                "value": [{"media_location": main}],
            }));
        }
        for (i, url) in image_urls.iter().skip(1).take(5).enumerate() {
            patches.push(json!({
                "op": "replace",
                "path": format!("/attributes/other_offer_image_locator_{}", i + 1),
                "value": [{"media_location": url}],
            }));
        }
        if patches.is_empty() {
            return Ok(Value::Null);
        }
        self.patch_listing(seller_id, sku, Value::Array(patches)).await
    }

    pub async fn get_listing(&self, seller_id: &str, sku: &str) -> Result<Value, AmazonApiError> {
        self.request(
            Method::GET,
            &self.listing_path(seller_id, sku),
            &[self.marketplace_query()],
            None,
        )
        .await
    }

    pub async fn delete_listing(&self, seller_id: &str, sku: &str) -> Result<Value, AmazonApiError> {
        self.request(
            Method::DELETE,
            &self.listing_path(seller_id, sku),
            &[self.marketplace_query()],
            None,
        )
        .await
    }

    // --- Feeds (Seller Central price & inventory sync) ---
    // XML pricing feeds are rejected for newer sellers; everything goes
    // through JSON_LISTINGS_FEED schema 2.0.

    pub async fn submit_price_feed(
        &self,
        seller_id: &str,
        sku: &str,
        price_jpy: i64,
    ) -> Result<Value, AmazonApiError> {
        let feed = json!({
            "header": {"sellerId": seller_id, "version": "2.0", "issueLocale": "ja_JP"},
            "messages": [{
                "messageId": 1,
                "sku": sku,
                "operationType": "PATCH",
                "productType": "PRODUCT",
                "patches": [{
                    "op": "replace",
                    "path": "/attributes/purchasable_offer",
                    "value": [{
                        "marketplace_id": self.marketplace_id,
                        "currency": "JPY",
                        "our_price": [{"schedule": [{"value_with_tax": price_jpy}]}],
                    }],
                }],
            }],
        });
        self.submit_json_feed(&feed).await
    }

    pub async fn submit_inventory_feed(
        &self,
        seller_id: &str,
        sku: &str,
        quantity: i64,
        _lead_time: i64,
    ) -> Result<Value, AmazonApiError> {
        let feed = json!({
            "header": {"sellerId": seller_id, "version": "2.0", "issueLocale": "ja_JP"},
            "messages": [{
                "messageId": 1,
                "sku": sku,
                "operationType": "PATCH",
                "productType": "PRODUCT",
                "patches": [{
                    "op": "replace",
                    "path": "/attributes/fulfillment_availability",
                    "value": [{
                        "fulfillment_channel_code": "DEFAULT",
                        "quantity": quantity,
                    }],
                }],
            }],
        });
        self.submit_json_feed(&feed).await
    }

    /// Three-step feed submission: create the document, upload the
    /// payload to the returned URL, then create the feed.
    async fn submit_json_feed(&self, feed: &Value) -> Result<Value, AmazonApiError> {
        let doc = self
            .request(
                Method::POST,
                "/feeds/2021-06-30/documents",
                &[],
                Some(&json!({"contentType": "application/json; charset=UTF-8"})),
            )
            .await?;
        let upload_url = doc["url"].as_str().ok_or_else(|| AmazonApiError::Api {
            message: "Feed document response missing upload url".into(),
            status: None,
        })?;
        let document_id = doc["feedDocumentId"]
            .as_str()
            .ok_or_else(|| AmazonApiError::Api {
                message: "Feed document response missing feedDocumentId".into(),
                status: None,
            })?
            .to_string();

        let upload = self
            .http
            .put(upload_url)
            .header("Content-Type", "application/json; charset=UTF-8")
            .body(feed.to_string())
            .send()
            .await?;
        if !upload.status().is_success() {
            return Err(AmazonApiError::Api {
                message: format!("Feed document upload failed: {}", upload.status()),
                status: Some(upload.status().as_u16()),
            });
        }

        self.request(
            Method::POST,
            "/feeds/2021-06-30/feeds",
            &[],
            Some(&json!({
                "feedType": "JSON_LISTINGS_FEED",
                "marketplaceIds": [self.marketplace_id],
                "inputFeedDocumentId": document_id,
            })),
        )
        .await
    }

    // --- Product fees ---

    /// Referral fee percentage for an ASIN at a given price, or `None`
    /// when the estimate is unavailable. Cached per ASIN and limited to
    /// one request per second.
    pub async fn get_referral_fee_pct(&self, asin: &str, price: i64) -> Option<f64> {
        if let Some(pct) = self.fee_cache.lock().await.get(asin) {
            return Some(*pct);
        }
        if price <= 0 {
            return None;
        }

        {
            let mut last = self.last_fee_request_at.lock().await;
            if let Some(at) = *last {
                let elapsed = at.elapsed();
                if elapsed < Duration::from_secs(1) {
                    tokio::time::sleep(Duration::from_secs(1) - elapsed).await;
                }
            }
            *last = Some(Instant::now());
        }

        let body = json!({
            "FeesEstimateRequest": {
                "MarketplaceId": self.marketplace_id,
                "IsAmazonFulfilled": false,
                "Identifier": format!("fee-{asin}"),
                "PriceToEstimateFees": {
                    "ListingPrice": {"CurrencyCode": "JPY", "Amount": price}
                },
            }
        });
        let result = self
            .request(
                Method::POST,
                &format!("/products/fees/v0/items/{asin}/feesEstimate"),
                &[],
                Some(&body),
            )
            .await;
        let payload = match result {
            Ok(v) => v,
            Err(e) => {
                warn!(asin, error = %e, "Fee estimate failed");
                return None;
            }
        };

        let fees = &payload["payload"]["FeesEstimateResult"]["FeesEstimate"];
        for fee in as_array(&fees["FeeDetailList"]) {
            if fee["FeeType"].as_str() == Some("ReferralFee") {
                let amount = fee["FeeAmount"]["Amount"].as_f64()?;
                let pct = (amount / price as f64 * 100.0 * 10.0).round() / 10.0;
                let mut cache = self.fee_cache.lock().await;
                if cache.len() >= FEE_CACHE_MAX {
                    cache.clear();
                }
                cache.insert(asin.to_string(), pct);
                debug!(asin, pct, "Referral fee resolved");
                return Some(pct);
            }
        }
        None
    }
}

fn as_array(v: &Value) -> Vec<Value> {
    v.as_array().cloned().unwrap_or_default()
}
