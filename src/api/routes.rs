//! JSON route handlers. Thin shells: every endpoint is an idempotent
//! database operation plus at most one call into the core.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::ai::rejection::{self, suggest_reasons};
use crate::models::{
    AlertStatus, CandidateStatus, ChangeType, ItemStatus, MonitoredItem, RejectionReason,
    StatusHistory,
};
use crate::scraper::extract_auction_id;
use crate::services::Services;
use crate::store::NewKeyword;

pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn not_found(what: &str) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: format!("{what} not found"),
        }
    }

    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn conflict(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(e: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: e.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"detail": self.message}))).into_response()
    }
}

type ApiResult<T> = Result<T, ApiError>;

// --- System ---

pub async fn health(State(services): State<Arc<Services>>) -> ApiResult<Json<Value>> {
    let items = services.store.list_items()?;
    let active = items
        .iter()
        .filter(|i| i.status == ItemStatus::Active)
        .count();
    Ok(Json(json!({
        "status": "ok",
        "scheduler_running": services.scheduler.is_running(),
        "monitored_count": items.len(),
        "active_count": active,
        "services": [
            {"name": "keepa", "status": if services.keepa.is_some() { "ok" } else { "unavailable" }},
            {"name": "sp_api", "status": if services.sp_api.is_some() { "ok" } else { "unavailable" }},
        ],
    })))
}

#[derive(Deserialize)]
pub struct SchedulerAction {
    pub action: String,
}

pub async fn scheduler_action(
    State(services): State<Arc<Services>>,
    Json(body): Json<SchedulerAction>,
) -> ApiResult<Json<Value>> {
    match body.action.as_str() {
        "pause" => services.scheduler.pause(),
        "resume" => services.scheduler.resume(),
        other => return Err(ApiError::bad_request(format!("Unknown action: {other}"))),
    }
    Ok(Json(
        json!({"running": services.scheduler.is_running()}),
    ))
}

// --- Items ---

#[derive(Deserialize)]
pub struct ItemCreate {
    pub auction_id: Option<String>,
    pub url: Option<String>,
    #[serde(default = "default_check_interval")]
    pub check_interval_seconds: i64,
    #[serde(default = "default_true")]
    pub auto_adjust_interval: bool,
    #[serde(default)]
    pub notes: String,
}

fn default_check_interval() -> i64 {
    300
}
fn default_true() -> bool {
    true
}

pub async fn list_items(State(services): State<Arc<Services>>) -> ApiResult<Json<Value>> {
    let items = services.store.list_items()?;
    Ok(Json(json!({"items": items, "total": items.len()})))
}

pub async fn create_item(
    State(services): State<Arc<Services>>,
    Json(body): Json<ItemCreate>,
) -> ApiResult<(StatusCode, Json<MonitoredItem>)> {
    let input = body
        .auction_id
        .clone()
        .or(body.url.clone())
        .ok_or_else(|| ApiError::bad_request("auction_id or url is required"))?;
    let auction_id = extract_auction_id(&input)
        .ok_or_else(|| ApiError::bad_request("Could not extract an auction id"))?;

    if services
        .store
        .get_item_by_auction_id(&auction_id)?
        .is_some()
    {
        return Err(ApiError::conflict("Auction is already monitored"));
    }

    let snapshot = services
        .scraper
        .fetch_auction(&auction_id)
        .await?
        .ok_or_else(|| ApiError::bad_request("Auction page could not be parsed"))?;

    let now = Utc::now();
    let item = MonitoredItem {
        id: 0,
        auction_id: snapshot.auction_id.clone(),
        title: snapshot.title.clone(),
        url: snapshot.url.clone(),
        image_url: snapshot.image_url.clone(),
        category_id: snapshot.category_id.clone(),
        seller_id: snapshot.seller_id.clone(),
        current_price: snapshot.current_price,
        start_price: snapshot.start_price,
        buy_now_price: snapshot.buy_now_price,
        win_price: snapshot.win_price,
        start_time: snapshot.start_time,
        end_time: snapshot.end_time,
        bid_count: snapshot.bid_count,
        status: snapshot.status(),
        check_interval_seconds: body.check_interval_seconds,
        auto_adjust_interval: body.auto_adjust_interval,
        is_monitoring_active: true,
        last_checked_at: Some(now),
        created_at: now,
        updated_at: now,
        notes: body.notes,
        amazon_asin: None,
        amazon_sku: None,
        amazon_condition: crate::models::Condition::UsedVeryGood,
        amazon_listing_status: None,
        amazon_price: None,
        estimated_win_price: 0,
        shipping_cost: 0,
        forwarding_cost: 0,
        amazon_fee_pct: services.config.deal_amazon_fee_pct,
        amazon_margin_pct: services.config.sp_api_default_margin_pct,
        amazon_lead_time_days: 4,
        amazon_shipping_pattern: crate::models::ShippingPattern::TwoToThreeDays,
        amazon_condition_note: String::new(),
        amazon_last_synced_at: None,
        seller_central_checklist: String::new(),
    };
    let saved = services.store.insert_item(&item)?;

    let mut initial = StatusHistory::change(saved.id, &saved.auction_id, ChangeType::Initial);
    initial.new_status = Some(saved.status.as_str().to_string());
    initial.new_price = Some(saved.current_price);
    initial.new_bid_count = Some(saved.bid_count);
    services.store.add_history(&initial)?;

    Ok((StatusCode::CREATED, Json(saved)))
}

pub async fn get_item(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
) -> ApiResult<Json<MonitoredItem>> {
    services
        .store
        .get_item_by_auction_id(&auction_id)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("Item"))
}

#[derive(Deserialize)]
pub struct ItemUpdate {
    pub check_interval_seconds: Option<i64>,
    pub auto_adjust_interval: Option<bool>,
    pub is_monitoring_active: Option<bool>,
    pub notes: Option<String>,
}

pub async fn update_item(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
    Json(body): Json<ItemUpdate>,
) -> ApiResult<Json<MonitoredItem>> {
    let mut item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;

    if let Some(v) = body.check_interval_seconds {
        item.check_interval_seconds = v.max(services.config.min_check_interval as i64);
    }
    if let Some(v) = body.auto_adjust_interval {
        item.auto_adjust_interval = v;
    }
    if let Some(v) = body.is_monitoring_active {
        item.is_monitoring_active = v;
    }
    if let Some(v) = body.notes {
        item.notes = v;
    }
    item.updated_at = Utc::now();

    services
        .store
        .retry_busy(|| services.store.update_item(&item))
        .await?;
    Ok(Json(item))
}

pub async fn delete_item(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
) -> ApiResult<StatusCode> {
    let item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    services.store.delete_item(item.id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn item_history(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    let history = services.store.list_history(item.id, 100)?;
    Ok(Json(json!({"history": history})))
}

// --- Search ---

#[derive(Deserialize)]
pub struct SearchParams {
    pub q: String,
    #[serde(default = "default_page")]
    pub page: u32,
}

fn default_page() -> u32 {
    1
}

pub async fn search(
    State(services): State<Arc<Services>>,
    Query(params): Query<SearchParams>,
) -> ApiResult<Json<Value>> {
    let items = services.scraper.search(&params.q, params.page).await?;
    Ok(Json(json!({
        "query": params.q,
        "page": params.page,
        "items": items,
        "total_results": items.len(),
    })))
}

// --- Keywords ---

#[derive(Deserialize)]
pub struct KeywordCreate {
    pub keyword: String,
    #[serde(default)]
    pub notes: String,
}

pub async fn list_keywords(State(services): State<Arc<Services>>) -> ApiResult<Json<Value>> {
    let keywords = services.store.list_keywords()?;
    Ok(Json(json!({"keywords": keywords, "total": keywords.len()})))
}

pub async fn create_keyword(
    State(services): State<Arc<Services>>,
    Json(body): Json<KeywordCreate>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let mut new = NewKeyword::manual(&body.keyword);
    new.notes = &body.notes;
    match services.store.insert_keyword(&new)? {
        Some(kw) => Ok((StatusCode::CREATED, Json(json!(kw)))),
        None => Err(ApiError::conflict("Keyword already exists")),
    }
}

#[derive(Deserialize)]
pub struct KeywordUpdate {
    pub is_active: Option<bool>,
    pub notes: Option<String>,
}

pub async fn update_keyword(
    State(services): State<Arc<Services>>,
    Path(id): Path<i64>,
    Json(body): Json<KeywordUpdate>,
) -> ApiResult<Json<Value>> {
    let mut kw = services
        .store
        .get_keyword(id)?
        .ok_or_else(|| ApiError::not_found("Keyword"))?;
    if let Some(v) = body.is_active {
        kw.is_active = v;
        if v {
            kw.auto_deactivated_at = None;
        }
    }
    if let Some(v) = body.notes {
        kw.notes = v;
    }
    services.store.update_keyword(&kw)?;
    Ok(Json(json!(kw)))
}

pub async fn delete_keyword(
    State(services): State<Arc<Services>>,
    Path(id): Path<i64>,
) -> ApiResult<StatusCode> {
    services
        .store
        .get_keyword(id)?
        .ok_or_else(|| ApiError::not_found("Keyword"))?;
    services.store.delete_keyword(id)?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn scan_keyword(
    State(services): State<Arc<Services>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let scanner = services
        .deal_scanner
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("Deal scanner is not configured"))?;
    let new_deals = scanner.scan_keyword_by_id(id).await?;
    Ok(Json(json!({"new_deals": new_deals})))
}

// --- Deal alerts ---

#[derive(Deserialize)]
pub struct AlertsParams {
    pub status: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    100
}

pub async fn list_alerts(
    State(services): State<Arc<Services>>,
    Query(params): Query<AlertsParams>,
) -> ApiResult<Json<Value>> {
    let status = params.status.as_deref().map(AlertStatus::parse_str);
    let alerts = services.store.list_alerts(status, params.limit)?;
    Ok(Json(json!({"alerts": alerts, "total": alerts.len()})))
}

pub async fn alert_suggested_reasons(
    State(services): State<Arc<Services>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let alert = services
        .store
        .get_alert(id)?
        .ok_or_else(|| ApiError::not_found("Alert"))?;
    let reasons = suggest_reasons(&alert, &services.store)?;
    Ok(Json(json!({"suggestions": reasons})))
}

#[derive(Deserialize)]
pub struct AlertReject {
    pub reason: String,
    #[serde(default)]
    pub note: String,
}

pub async fn reject_alert(
    State(services): State<Arc<Services>>,
    Path(id): Path<i64>,
    Json(body): Json<AlertReject>,
) -> ApiResult<Json<Value>> {
    let reason = RejectionReason::parse_str(&body.reason)
        .ok_or_else(|| ApiError::bad_request(format!("Unknown reason: {}", body.reason)))?;
    let alert = rejection::reject_alert(
        id,
        reason,
        &body.note,
        &services.store,
        &services.overrides,
    )?
    .ok_or_else(|| ApiError::not_found("Alert"))?;
    Ok(Json(json!(alert)))
}

// --- Keyword candidates ---

#[derive(Deserialize)]
pub struct CandidatesParams {
    pub status: Option<String>,
}

pub async fn list_candidates(
    State(services): State<Arc<Services>>,
    Query(params): Query<CandidatesParams>,
) -> ApiResult<Json<Value>> {
    let status = params.status.as_deref().map(CandidateStatus::parse_str);
    let candidates = services.store.list_candidates(status)?;
    Ok(Json(json!({"candidates": candidates, "total": candidates.len()})))
}

/// Approving a candidate registers the keyword and auto-rejects every
/// still-pending candidate that is merely a variant of it.
pub async fn approve_candidate(
    State(services): State<Arc<Services>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let candidate = services
        .store
        .get_candidate(id)?
        .ok_or_else(|| ApiError::not_found("Candidate"))?;
    if candidate.status == CandidateStatus::Approved
        || candidate.status == CandidateStatus::AutoAdded
    {
        return Err(ApiError::conflict("Candidate is already approved"));
    }

    let (candidate, auto_rejected) =
        crate::ai::engine::approve_candidate(&services.store, id)?
            .ok_or_else(|| ApiError::not_found("Candidate"))?;

    Ok(Json(json!({
        "candidate": candidate,
        "auto_rejected_similar": auto_rejected,
    })))
}

pub async fn reject_candidate(
    State(services): State<Arc<Services>>,
    Path(id): Path<i64>,
) -> ApiResult<Json<Value>> {
    let mut candidate = services
        .store
        .get_candidate(id)?
        .ok_or_else(|| ApiError::not_found("Candidate"))?;
    candidate.status = CandidateStatus::Rejected;
    candidate.resolved_at = Some(Utc::now());
    services.store.update_candidate(&candidate)?;
    Ok(Json(json!(candidate)))
}

// --- Discovery ---

pub async fn discovery_status(State(services): State<Arc<Services>>) -> ApiResult<Json<Value>> {
    let last_cycle = services.store.latest_discovery_log()?;
    let pending = services
        .store
        .list_candidates(Some(CandidateStatus::Pending))?
        .len();
    let active_ai = services.store.count_active_ai_keywords()?;
    Ok(Json(json!({
        "enabled": services.discovery_engine.is_some(),
        "last_cycle": last_cycle,
        "active_ai_keywords": active_ai,
        "pending_candidates": pending,
    })))
}

pub async fn run_discovery(State(services): State<Arc<Services>>) -> ApiResult<Json<Value>> {
    let engine = services
        .discovery_engine
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("Discovery engine is not configured"))?;
    let result = engine.run_discovery_cycle().await;
    Ok(Json(json!(result)))
}

/// Mined patterns behind the generator, for the operator dashboard.
pub async fn discovery_insights(
    State(services): State<Arc<Services>>,
) -> ApiResult<Json<Value>> {
    let insights = crate::ai::analyzer::analyze_deal_history(&services.store)?;
    Ok(Json(json!({
        "top_brands": insights.brand_patterns,
        "top_product_types": insights.product_type_patterns,
        "price_ranges": insights.price_range_patterns,
        "keyword_count": insights.total_keywords,
        "deal_count": insights.total_deals,
    })))
}

#[derive(Deserialize)]
pub struct SeedRequest {
    #[serde(default = "default_seed_count")]
    pub count: usize,
}

fn default_seed_count() -> usize {
    40
}

/// Cold-start: ask the LLM for seed keywords and register them as
/// `ai_seed` watched keywords. Duplicates and apparel are skipped.
pub async fn seed_keywords(
    State(services): State<Arc<Services>>,
    Json(body): Json<SeedRequest>,
) -> ApiResult<Json<Value>> {
    if !services.config.llm_enabled() {
        return Err(ApiError::bad_request("LLM API key is not configured"));
    }
    let seeds = crate::ai::llm::get_seed_keywords(&services.config, body.count).await;

    let mut added = 0;
    for (keyword, category, reasoning, confidence) in &seeds {
        if crate::matcher::is_apparel(keyword) {
            continue;
        }
        let notes = format!("[{category}] {reasoning}");
        let inserted = services.store.insert_keyword(&NewKeyword {
            keyword,
            source: "ai_seed",
            parent_keyword_id: None,
            confidence: *confidence,
            notes: &notes,
            is_active: true,
        })?;
        if inserted.is_some() {
            added += 1;
        }
    }
    Ok(Json(json!({"suggested": seeds.len(), "added": added})))
}

// --- Keepa analysis ---

pub async fn keepa_analysis(
    State(services): State<Arc<Services>>,
    Path(asin): Path<String>,
) -> ApiResult<Json<Value>> {
    let keepa = services
        .keepa
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("Keepa API is not configured"))?;
    let product = keepa
        .query_product(&asin, None, false)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    let rank = crate::keepa::scorer::analyze_sales_rank(
        &product,
        services.config.keepa_good_rank_threshold,
    );
    let price = crate::keepa::scorer::analyze_used_price(&product);
    Ok(Json(json!({
        "asin": asin,
        "title": product.title,
        "sales_rank": rank,
        "used_price": price,
        "tokens_left": keepa.tokens_left(),
    })))
}

// --- Marketplace listing flow ---

#[derive(Deserialize)]
pub struct ListingCreate {
    pub asin: String,
    #[serde(default)]
    pub condition: Option<String>,
    pub estimated_win_price: i64,
    #[serde(default)]
    pub shipping_cost: Option<i64>,
    #[serde(default)]
    pub margin_pct: Option<f64>,
    #[serde(default)]
    pub shipping_pattern: Option<String>,
    #[serde(default)]
    pub condition_note: String,
    #[serde(default)]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub save_preset: bool,
}

/// Create a marketplace offer for a monitored auction: price it from
/// the cost inputs, create the offer-only listing, attach images, and
/// mirror the state onto the item.
pub async fn create_listing(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
    Json(body): Json<ListingCreate>,
) -> ApiResult<Json<Value>> {
    use crate::amazon::pricing::{calculate_amazon_price, generate_sku};
    use crate::models::{Condition, ListingStatus, ShippingPattern};

    let sp_api = services
        .sp_api
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("SP-API is not configured"))?;
    let mut item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    if item.amazon_sku.is_some() {
        return Err(ApiError::conflict("Item already has a marketplace listing"));
    }

    let condition = body
        .condition
        .as_deref()
        .map(Condition::parse_str)
        .unwrap_or(Condition::UsedVeryGood);
    let shipping_pattern = body
        .shipping_pattern
        .as_deref()
        .map(ShippingPattern::parse_str)
        .unwrap_or(ShippingPattern::TwoToThreeDays);
    let shipping_cost = body
        .shipping_cost
        .unwrap_or(services.config.sp_api_default_shipping_cost);
    let margin_pct = body
        .margin_pct
        .unwrap_or(services.config.sp_api_default_margin_pct);

    let restrictions = sp_api
        .get_listing_restrictions(&body.asin, condition.as_str())
        .await;
    if !restrictions.is_empty() {
        return Err(ApiError::bad_request(format!(
            "ASIN {} is restricted for condition {}",
            body.asin,
            condition.as_str()
        )));
    }

    let price = calculate_amazon_price(
        body.estimated_win_price,
        shipping_cost,
        margin_pct,
        services.config.deal_amazon_fee_pct,
    )
    .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if price <= 0 {
        return Err(ApiError::bad_request("estimated_win_price must be positive"));
    }

    let sku = generate_sku(&item.auction_id);
    let product_type = sp_api.get_product_type(&body.asin).await;
    let seller_id = services.config.sp_api_seller_id.clone();

    let attributes = json!({
        "condition_type": [{"value": condition.as_str()}],
        "condition_note": [{"value": body.condition_note, "language_tag": "ja_JP"}],
        "merchant_suggested_asin": [{"value": body.asin}],
        "fulfillment_availability": [{"fulfillment_channel_code": "DEFAULT", "quantity": 1}],
        "purchasable_offer": [{
            "currency": "JPY",
            "our_price": [{"schedule": [{"value_with_tax": price}]}],
        }],
        "lead_time_to_ship_max_days": [{"value": shipping_pattern.lead_time_days()}],
    });
    sp_api
        .create_listing(&seller_id, &sku, &product_type, attributes, true)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    // Offer images: caller-picked URLs, else everything on the auction
    let image_urls = if body.image_urls.is_empty() {
        services
            .scraper
            .fetch_auction_images(&item.auction_id)
            .await
            .unwrap_or_default()
    } else {
        body.image_urls.clone()
    };
    if !image_urls.is_empty() {
        if let Err(e) = sp_api.patch_offer_images(&seller_id, &sku, &image_urls).await {
            tracing::warn!(sku = %sku, error = %e, "Offer image patch failed");
        }
    }

    item.amazon_asin = Some(body.asin.clone());
    item.amazon_sku = Some(sku.clone());
    item.amazon_condition = condition;
    item.amazon_listing_status = Some(ListingStatus::Active);
    item.amazon_price = Some(price);
    item.estimated_win_price = body.estimated_win_price;
    item.shipping_cost = shipping_cost;
    item.amazon_margin_pct = margin_pct;
    item.amazon_lead_time_days = shipping_pattern.lead_time_days();
    item.amazon_shipping_pattern = shipping_pattern;
    item.amazon_condition_note = body.condition_note.clone();
    item.amazon_last_synced_at = Some(Utc::now());
    item.updated_at = Utc::now();
    services
        .store
        .retry_busy(|| services.store.update_item(&item))
        .await?;

    let mut change = StatusHistory::change(item.id, &item.auction_id, ChangeType::AmazonListing);
    change.new_status = Some(sku.clone());
    change.new_price = Some(price);
    services.store.add_history(&change)?;

    if body.save_preset {
        services.store.insert_listing_preset(&crate::models::ListingPreset {
            id: 0,
            asin: body.asin.clone(),
            condition,
            condition_note: body.condition_note.clone(),
            shipping_pattern,
            created_at: Utc::now(),
        })?;
    }

    Ok(Json(json!({"sku": sku, "price": price, "product_type": product_type})))
}

pub async fn delete_listing(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
) -> ApiResult<Json<Value>> {
    use crate::models::ListingStatus;

    let sp_api = services
        .sp_api
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("SP-API is not configured"))?;
    let mut item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    let sku = item
        .amazon_sku
        .clone()
        .ok_or_else(|| ApiError::bad_request("Item has no marketplace listing"))?;

    sp_api
        .delete_listing(&services.config.sp_api_seller_id, &sku)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    item.amazon_sku = None;
    item.amazon_listing_status = Some(ListingStatus::Delisted);
    item.amazon_last_synced_at = None;
    item.updated_at = Utc::now();
    services.store.update_item(&item)?;

    let mut change = StatusHistory::change(item.id, &item.auction_id, ChangeType::AmazonDelist);
    change.old_status = Some(sku);
    services.store.add_history(&change)?;

    Ok(Json(json!(item)))
}

#[derive(Deserialize)]
pub struct PriceUpdate {
    pub price: i64,
}

/// Reprice a live listing and push the same price through the feed so
/// Seller Central reflects it.
pub async fn update_listing_price(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
    Json(body): Json<PriceUpdate>,
) -> ApiResult<Json<Value>> {
    let sp_api = services
        .sp_api
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("SP-API is not configured"))?;
    let mut item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    let sku = item
        .amazon_sku
        .clone()
        .ok_or_else(|| ApiError::bad_request("Item has no marketplace listing"))?;
    if body.price <= 0 {
        return Err(ApiError::bad_request("price must be positive"));
    }

    let seller_id = services.config.sp_api_seller_id.clone();
    sp_api
        .patch_listing_price(&seller_id, &sku, body.price)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if let Err(e) = sp_api.submit_price_feed(&seller_id, &sku, body.price).await {
        tracing::warn!(sku = %sku, error = %e, "Price feed submission failed");
    }

    let old_price = item.amazon_price.unwrap_or(0);
    item.amazon_price = Some(body.price);
    item.amazon_last_synced_at = Some(Utc::now());
    item.updated_at = Utc::now();
    services.store.update_item(&item)?;

    let mut change = StatusHistory::change(item.id, &item.auction_id, ChangeType::PriceChange);
    change.old_price = Some(old_price);
    change.new_price = Some(body.price);
    services.store.add_history(&change)?;

    Ok(Json(json!(item)))
}

#[derive(Deserialize)]
pub struct InventoryUpdate {
    pub quantity: i64,
}

/// Adjust listing quantity (0 pauses the offer without deleting it).
pub async fn update_listing_inventory(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
    Json(body): Json<InventoryUpdate>,
) -> ApiResult<Json<Value>> {
    use crate::models::ListingStatus;

    let sp_api = services
        .sp_api
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("SP-API is not configured"))?;
    let mut item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    let sku = item
        .amazon_sku
        .clone()
        .ok_or_else(|| ApiError::bad_request("Item has no marketplace listing"))?;
    if body.quantity < 0 {
        return Err(ApiError::bad_request("quantity must be non-negative"));
    }

    let seller_id = services.config.sp_api_seller_id.clone();
    sp_api
        .patch_listing_quantity(&seller_id, &sku, body.quantity)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    if let Err(e) = sp_api
        .submit_inventory_feed(&seller_id, &sku, body.quantity, item.amazon_lead_time_days)
        .await
    {
        tracing::warn!(sku = %sku, error = %e, "Inventory feed submission failed");
    }

    item.amazon_listing_status = Some(if body.quantity > 0 {
        ListingStatus::Active
    } else {
        ListingStatus::Inactive
    });
    item.amazon_last_synced_at = Some(Utc::now());
    item.updated_at = Utc::now();
    services.store.update_item(&item)?;
    Ok(Json(json!(item)))
}

#[derive(Deserialize)]
pub struct ShippingUpdate {
    pub pattern: String,
}

/// Switch a listing's ship-by window: patch the lead time and the
/// Seller Central shipping template.
pub async fn update_listing_shipping(
    State(services): State<Arc<Services>>,
    Path(auction_id): Path<String>,
    Json(body): Json<ShippingUpdate>,
) -> ApiResult<Json<Value>> {
    use crate::models::ShippingPattern;

    let sp_api = services
        .sp_api
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("SP-API is not configured"))?;
    let mut item = services
        .store
        .get_item_by_auction_id(&auction_id)?
        .ok_or_else(|| ApiError::not_found("Item"))?;
    let sku = item
        .amazon_sku
        .clone()
        .ok_or_else(|| ApiError::bad_request("Item has no marketplace listing"))?;

    let pattern = ShippingPattern::parse_str(&body.pattern);
    let template = match pattern {
        ShippingPattern::OneToTwoDays => &services.config.shipping_template_1_2_days,
        ShippingPattern::TwoToThreeDays => &services.config.shipping_template_2_3_days,
        ShippingPattern::ThreeToSevenDays => &services.config.shipping_template_3_7_days,
    };

    let seller_id = services.config.sp_api_seller_id.clone();
    sp_api
        .patch_listing_lead_time(&seller_id, &sku, pattern.lead_time_days())
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    sp_api
        .patch_listing_shipping_group(&seller_id, &sku, template)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;

    item.amazon_shipping_pattern = pattern;
    item.amazon_lead_time_days = pattern.lead_time_days();
    item.amazon_last_synced_at = Some(Utc::now());
    item.updated_at = Utc::now();
    services.store.update_item(&item)?;
    Ok(Json(json!(item)))
}

#[derive(Deserialize)]
pub struct CatalogSearchParams {
    pub q: String,
}

pub async fn catalog_search(
    State(services): State<Arc<Services>>,
    Query(params): Query<CatalogSearchParams>,
) -> ApiResult<Json<Value>> {
    let sp_api = services
        .sp_api
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("SP-API is not configured"))?;
    let items = sp_api
        .search_catalog_items(&params.q, 10)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(json!({"keywords": params.q, "items": items})))
}

pub async fn order_items(
    State(services): State<Arc<Services>>,
    Path(order_id): Path<String>,
) -> ApiResult<Json<Value>> {
    let sp_api = services
        .sp_api
        .as_ref()
        .ok_or_else(|| ApiError::bad_request("SP-API is not configured"))?;
    let items = sp_api
        .get_order_items(&order_id)
        .await
        .map_err(|e| ApiError::bad_request(e.to_string()))?;
    Ok(Json(json!({"order_id": order_id, "items": items})))
}

// --- Reference data ---

pub async fn list_templates(State(services): State<Arc<Services>>) -> ApiResult<Json<Value>> {
    let templates = services.store.list_condition_templates()?;
    Ok(Json(json!({"templates": templates})))
}

#[derive(Deserialize)]
pub struct TemplateUpsert {
    pub condition_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: String,
}

pub async fn upsert_template(
    State(services): State<Arc<Services>>,
    Json(body): Json<TemplateUpsert>,
) -> ApiResult<Json<Value>> {
    services
        .store
        .upsert_condition_template(&body.condition_type, &body.title, &body.body)?;
    Ok(Json(json!({"ok": true})))
}

pub async fn list_presets(
    State(services): State<Arc<Services>>,
    Path(asin): Path<String>,
) -> ApiResult<Json<Value>> {
    let presets = services.store.list_presets_for_asin(&asin)?;
    Ok(Json(json!({"asin": asin, "presets": presets})))
}
