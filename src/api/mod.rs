//! HTTP surface: a thin axum router over the core.

pub mod auth;
pub mod routes;

use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, patch, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::Services;

pub fn build_router(services: Arc<Services>, metrics_handle: PrometheusHandle) -> Router {
    let api = Router::new()
        // Items
        .route("/items", get(routes::list_items).post(routes::create_item))
        .route(
            "/items/:auction_id",
            get(routes::get_item)
                .patch(routes::update_item)
                .delete(routes::delete_item),
        )
        .route("/items/:auction_id/history", get(routes::item_history))
        // Search
        .route("/search", get(routes::search))
        // Keywords
        .route(
            "/keywords",
            get(routes::list_keywords).post(routes::create_keyword),
        )
        .route(
            "/keywords/:id",
            patch(routes::update_keyword).delete(routes::delete_keyword),
        )
        .route("/keywords/:id/scan", post(routes::scan_keyword))
        // Deal alerts
        .route("/alerts", get(routes::list_alerts))
        .route(
            "/alerts/:id/suggested-reasons",
            get(routes::alert_suggested_reasons),
        )
        .route("/alerts/:id/reject", post(routes::reject_alert))
        // Keyword candidates
        .route("/candidates", get(routes::list_candidates))
        .route("/candidates/:id/approve", post(routes::approve_candidate))
        .route("/candidates/:id/reject", post(routes::reject_candidate))
        // Discovery
        .route("/discovery/status", get(routes::discovery_status))
        .route("/discovery/run", post(routes::run_discovery))
        .route("/discovery/insights", get(routes::discovery_insights))
        .route("/discovery/seed-keywords", post(routes::seed_keywords))
        // Analytics
        .route("/keepa/:asin", get(routes::keepa_analysis))
        // Marketplace listing flow
        .route("/items/:auction_id/list", post(routes::create_listing))
        .route("/items/:auction_id/delist", post(routes::delete_listing))
        .route("/items/:auction_id/price", post(routes::update_listing_price))
        .route(
            "/items/:auction_id/inventory",
            post(routes::update_listing_inventory),
        )
        .route(
            "/items/:auction_id/shipping",
            post(routes::update_listing_shipping),
        )
        .route("/amazon/catalog", get(routes::catalog_search))
        .route("/amazon/orders/:order_id/items", get(routes::order_items))
        // Reference data
        .route(
            "/templates",
            get(routes::list_templates).put(routes::upsert_template),
        )
        .route("/presets/:asin", get(routes::list_presets))
        // Scheduler
        .route("/scheduler", post(routes::scheduler_action));

    Router::new()
        .nest("/api", api)
        .route("/health", get(routes::health))
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(middleware::from_fn_with_state(
            Arc::clone(&services),
            auth::api_key_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(services)
}
