//! Runtime configuration loaded from environment variables / .env.

use std::env;

fn env_str(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON" | "yes"))
        .unwrap_or(default)
}

const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Application configuration.
#[derive(Debug, Clone)]
pub struct Config {
    // Server
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub log_level: String,

    // Scraper
    pub scraper_user_agent: String,
    pub scraper_request_timeout: u64,
    pub scraper_use_browser_fallback: bool,

    // Monitor
    pub default_check_interval: u64,
    pub min_check_interval: u64,

    // Webhook
    pub webhook_url: String,
    pub webhook_type: String, // discord / slack / line

    // Amazon SP-API
    pub sp_api_refresh_token: String,
    pub sp_api_lwa_app_id: String,
    pub sp_api_lwa_client_secret: String,
    pub sp_api_seller_id: String,
    pub sp_api_marketplace: String,
    pub sp_api_default_margin_pct: f64,
    pub sp_api_default_shipping_cost: i64,
    // Shipping templates registered in Seller Central
    pub shipping_template_1_2_days: String,
    pub shipping_template_2_3_days: String,
    pub shipping_template_3_7_days: String,

    // Keepa-style analytics provider
    pub keepa_api_key: String,
    pub keepa_default_stats_days: u32,
    pub keepa_good_rank_threshold: i64,

    // Deal scanner
    pub deal_forwarding_cost: i64,
    pub deal_system_fee: i64,
    pub deal_amazon_fee_pct: f64,
    pub deal_min_gross_margin_pct: f64,
    pub deal_max_gross_margin_pct: f64,
    pub deal_min_gross_profit: i64,
    pub deal_scan_interval: u64,
    pub deal_default_shipping: i64,
    pub deal_scan_max_pages: u32,
    pub deal_max_keepa_searches_per_keyword: u32,
    pub deal_min_price_for_keepa_search: i64,
    pub deal_deep_validation_enabled: bool,
    pub deal_deep_validation_max_per_cycle: u32,
    pub deal_deep_validation_margin_threshold: f64,

    // AI discovery
    pub discovery_enabled: bool,
    pub discovery_interval: u64,
    pub discovery_token_budget: i64,
    pub discovery_min_deals: i64,
    pub discovery_auto_add_threshold: f64,
    pub discovery_max_ai_keywords: i64,
    pub discovery_deactivation_scans: i64,
    pub discovery_deactivation_threshold: f64,

    // Series expansion
    pub series_expansion_min_profit: i64,
    pub series_expansion_max_siblings: usize,
    pub series_expansion_max_per_cycle: usize,

    // Demand finder (analytics product finder)
    pub demand_finder_enabled: bool,
    pub demand_finder_min_drops30: i64,
    pub demand_finder_min_used_price: i64,
    pub demand_finder_max_results: u32,

    // Suggest cross-match
    pub suggest_crossmatch_enabled: bool,

    // LLM keyword suggestions (optional)
    pub llm_api_key: String,
    pub llm_api_url: String,
    pub llm_model: String,

    // Order monitor
    pub order_monitor_enabled: bool,
    pub order_monitor_interval: u64,
    pub order_webhook_url: String,

    // Auth: set to enable API-key protection of /api paths; empty = open
    pub api_key: String,
}

impl Config {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        Self {
            host: env_str("HOST", "127.0.0.1"),
            port: env_parse("PORT", 8001),
            database_url: env_str("DATABASE_URL", "./scoutbot.db"),
            log_level: env_str("LOG_LEVEL", "info"),

            scraper_user_agent: env_str("SCRAPER_USER_AGENT", DEFAULT_USER_AGENT),
            scraper_request_timeout: env_parse("SCRAPER_REQUEST_TIMEOUT", 30),
            scraper_use_browser_fallback: env_bool("SCRAPER_USE_BROWSER_FALLBACK", false),

            default_check_interval: env_parse("DEFAULT_CHECK_INTERVAL", 300),
            min_check_interval: env_parse("MIN_CHECK_INTERVAL", 30).max(30),

            webhook_url: env_str("WEBHOOK_URL", ""),
            webhook_type: env_str("WEBHOOK_TYPE", "discord"),

            sp_api_refresh_token: env_str("SP_API_REFRESH_TOKEN", ""),
            sp_api_lwa_app_id: env_str("SP_API_LWA_APP_ID", ""),
            sp_api_lwa_client_secret: env_str("SP_API_LWA_CLIENT_SECRET", ""),
            sp_api_seller_id: env_str("SP_API_SELLER_ID", ""),
            sp_api_marketplace: env_str("SP_API_MARKETPLACE", "A1VC38T7YXB528"),
            sp_api_default_margin_pct: env_parse("SP_API_DEFAULT_MARGIN_PCT", 15.0),
            sp_api_default_shipping_cost: env_parse("SP_API_DEFAULT_SHIPPING_COST", 800),
            shipping_template_1_2_days: env_str("SHIPPING_TEMPLATE_1_2_DAYS", "1～2の場合"),
            shipping_template_2_3_days: env_str("SHIPPING_TEMPLATE_2_3_DAYS", "2～3の場合"),
            shipping_template_3_7_days: env_str("SHIPPING_TEMPLATE_3_7_DAYS", "3～7の場合"),

            keepa_api_key: env_str("KEEPA_API_KEY", ""),
            keepa_default_stats_days: env_parse("KEEPA_DEFAULT_STATS_DAYS", 90),
            keepa_good_rank_threshold: env_parse("KEEPA_GOOD_RANK_THRESHOLD", 100_000),

            deal_forwarding_cost: env_parse("DEAL_FORWARDING_COST", 960),
            deal_system_fee: env_parse("DEAL_SYSTEM_FEE", 100),
            deal_amazon_fee_pct: env_parse("DEAL_AMAZON_FEE_PCT", 10.0),
            deal_min_gross_margin_pct: env_parse("DEAL_MIN_GROSS_MARGIN_PCT", 40.0),
            deal_max_gross_margin_pct: env_parse("DEAL_MAX_GROSS_MARGIN_PCT", 70.0),
            deal_min_gross_profit: env_parse("DEAL_MIN_GROSS_PROFIT", 3000),
            deal_scan_interval: env_parse("DEAL_SCAN_INTERVAL", 600),
            deal_default_shipping: env_parse("DEAL_DEFAULT_SHIPPING", 700),
            deal_scan_max_pages: env_parse("DEAL_SCAN_MAX_PAGES", 3),
            deal_max_keepa_searches_per_keyword: env_parse(
                "DEAL_MAX_KEEPA_SEARCHES_PER_KEYWORD",
                10,
            ),
            deal_min_price_for_keepa_search: env_parse("DEAL_MIN_PRICE_FOR_KEEPA_SEARCH", 2000),
            deal_deep_validation_enabled: env_bool("DEAL_DEEP_VALIDATION_ENABLED", true),
            deal_deep_validation_max_per_cycle: env_parse("DEAL_DEEP_VALIDATION_MAX_PER_CYCLE", 10),
            deal_deep_validation_margin_threshold: env_parse(
                "DEAL_DEEP_VALIDATION_MARGIN_THRESHOLD",
                50.0,
            ),

            discovery_enabled: env_bool("DISCOVERY_ENABLED", true),
            discovery_interval: env_parse("DISCOVERY_INTERVAL", 3600),
            discovery_token_budget: env_parse("DISCOVERY_TOKEN_BUDGET", 10),
            discovery_min_deals: env_parse("DISCOVERY_MIN_DEALS", 5),
            discovery_auto_add_threshold: env_parse("DISCOVERY_AUTO_ADD_THRESHOLD", 0.6),
            discovery_max_ai_keywords: env_parse("DISCOVERY_MAX_AI_KEYWORDS", 50),
            discovery_deactivation_scans: env_parse("DISCOVERY_DEACTIVATION_SCANS", 10),
            discovery_deactivation_threshold: env_parse("DISCOVERY_DEACTIVATION_THRESHOLD", 0.05),

            series_expansion_min_profit: env_parse("SERIES_EXPANSION_MIN_PROFIT", 3000),
            series_expansion_max_siblings: env_parse("SERIES_EXPANSION_MAX_SIBLINGS", 4),
            series_expansion_max_per_cycle: env_parse("SERIES_EXPANSION_MAX_PER_CYCLE", 10),

            demand_finder_enabled: env_bool("DEMAND_FINDER_ENABLED", true),
            demand_finder_min_drops30: env_parse("DEMAND_FINDER_MIN_DROPS30", 5),
            demand_finder_min_used_price: env_parse("DEMAND_FINDER_MIN_USED_PRICE", 10_000),
            demand_finder_max_results: env_parse("DEMAND_FINDER_MAX_RESULTS", 50),

            suggest_crossmatch_enabled: env_bool("SUGGEST_CROSSMATCH_ENABLED", false),

            llm_api_key: env_str("LLM_API_KEY", ""),
            llm_api_url: env_str("LLM_API_URL", "https://api.anthropic.com/v1/messages"),
            llm_model: env_str("LLM_MODEL", "claude-haiku-4-5-20251001"),

            order_monitor_enabled: env_bool("ORDER_MONITOR_ENABLED", true),
            order_monitor_interval: env_parse("ORDER_MONITOR_INTERVAL", 300),
            order_webhook_url: env_str("ORDER_WEBHOOK_URL", ""),

            api_key: env_str("API_KEY", ""),
        }
    }

    pub fn sp_api_enabled(&self) -> bool {
        !self.sp_api_refresh_token.is_empty() && !self.sp_api_lwa_app_id.is_empty()
    }

    pub fn keepa_enabled(&self) -> bool {
        !self.keepa_api_key.is_empty()
    }

    pub fn llm_enabled(&self) -> bool {
        !self.llm_api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = Config::from_env();
        assert_eq!(config.deal_system_fee, 100);
        assert_eq!(config.deal_min_gross_margin_pct, 40.0);
        assert_eq!(config.deal_max_gross_margin_pct, 70.0);
        assert!(config.min_check_interval >= 30);
        assert!(!config.sp_api_enabled());
    }
}
