//! The deal scanner: periodically searches watched keywords for
//! auction→marketplace price gaps worth an alert.
//!
//! Paid analytics tokens are the scarce resource, so listings are
//! grouped by extracted (brand, models) signature and each group costs
//! one targeted search; everything else shares a single fallback
//! search on the raw keyword. Scanning stops for the cycle once the
//! provider reports ≤5 tokens, leaving the rest for the next rotation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crate::ai::generator::{decompose_model, guess_step};
use crate::amazon::SpApiClient;
use crate::config::Config;
use crate::keepa::scorer::{score_deal, DealCandidate};
use crate::keepa::{KeepaClient, KeepaProduct};
use crate::matcher::{
    self, extract_model_numbers_from_text, extract_product_info, is_apparel, MatcherOverrides,
};
use crate::models::{
    AlertStatus, CandidateStatus, DealAlert, KeywordCandidate, WatchedKeyword,
};
use crate::notifier::webhook::build_deal_payload;
use crate::notifier::send_webhook;
use crate::scraper::{AuctionScraper, SearchResultItem};
use crate::store::Store;

/// Scanning pauses for the cycle at or below this many tokens.
const TOKEN_FLOOR: i64 = 5;

/// An auction priced far below the marketplace product is a part, not
/// the product.
const MIN_PRICE_RATIO: f64 = 0.25;

pub struct DealScanner {
    store: Arc<Store>,
    scraper: Arc<AuctionScraper>,
    keepa: Arc<KeepaClient>,
    sp_api: Option<Arc<SpApiClient>>,
    overrides: Arc<MatcherOverrides>,
    config: Config,
    deep_validation_count: AtomicU32,
}

impl DealScanner {
    pub fn new(
        store: Arc<Store>,
        scraper: Arc<AuctionScraper>,
        keepa: Arc<KeepaClient>,
        sp_api: Option<Arc<SpApiClient>>,
        overrides: Arc<MatcherOverrides>,
        config: Config,
    ) -> Self {
        Self {
            store,
            scraper,
            keepa,
            sp_api,
            overrides,
            config,
            deep_validation_count: AtomicU32::new(0),
        }
    }

    /// Scan all active keywords in rotation order. Keywords skipped for
    /// token exhaustion keep their stale `last_scanned_at` and jump the
    /// queue next cycle.
    pub async fn scan_all(&self) {
        if let Err(e) = self.scan_all_inner().await {
            error!(error = ?e, "Error in deal scan loop");
        }
    }

    async fn scan_all_inner(&self) -> Result<()> {
        self.deep_validation_count.store(0, Ordering::Relaxed);
        self.keepa.clear_search_cache();

        let keywords = self.store.list_keywords_for_scan()?;
        if keywords.is_empty() {
            return Ok(());
        }

        let total = keywords.len();
        let mut scanned = 0;
        for mut kw in keywords {
            if let Some(tokens) = self.keepa.tokens_left() {
                if tokens <= TOKEN_FLOOR {
                    info!(
                        tokens,
                        scanned,
                        total,
                        "Keepa tokens low, pausing scan; remaining keywords go first next cycle"
                    );
                    break;
                }
            }

            match self.scan_keyword(&mut kw).await {
                Ok(new_deals) => {
                    kw.last_scanned_at = Some(Utc::now());
                    kw.total_scans += 1;
                    if new_deals > 0 {
                        kw.scans_since_last_deal = 0;
                    } else {
                        kw.scans_since_last_deal += 1;
                    }
                    self.store.update_keyword(&kw)?;
                    scanned += 1;
                }
                Err(e) => {
                    warn!(keyword = %kw.keyword, error = ?e, "Error scanning keyword");
                }
            }
        }

        self.cleanup_keywords()?;
        info!(scanned, total, "Scan cycle complete");
        metrics::increment_counter!("deal_scan_cycles_total");
        Ok(())
    }

    /// Manual single-keyword scan for the HTTP surface.
    pub async fn scan_keyword_by_id(&self, keyword_id: i64) -> Result<usize> {
        let mut kw = match self.store.get_keyword(keyword_id)? {
            Some(kw) => kw,
            None => return Ok(0),
        };
        let new_deals = self.scan_keyword(&mut kw).await?;
        kw.last_scanned_at = Some(Utc::now());
        self.store.update_keyword(&kw)?;
        Ok(new_deals)
    }

    /// Scan one keyword; returns the number of new alerts.
    async fn scan_keyword(&self, kw: &mut WatchedKeyword) -> Result<usize> {
        let deals = self.find_deals(&kw.keyword).await?;
        if deals.is_empty() {
            return Ok(0);
        }

        let mut new_deals = 0;
        for deal in deals {
            if self
                .store
                .alert_exists(&deal.yahoo_auction_id, &deal.amazon_asin)?
            {
                continue;
            }

            let alert = DealAlert {
                id: 0,
                keyword_id: kw.id,
                yahoo_auction_id: deal.yahoo_auction_id.clone(),
                amazon_asin: deal.amazon_asin.clone(),
                yahoo_title: deal.yahoo_title.clone(),
                yahoo_url: deal.yahoo_url.clone(),
                yahoo_image_url: deal.yahoo_image_url.clone(),
                amazon_title: deal.amazon_title.clone(),
                yahoo_price: deal.yahoo_price,
                yahoo_shipping: deal.yahoo_shipping,
                sell_price: deal.sell_price,
                gross_profit: deal.gross_profit,
                gross_margin_pct: deal.gross_margin_pct,
                amazon_fee_pct: if deal.sell_price > 0 {
                    ((deal.amazon_fee as f64 / deal.sell_price as f64) * 1000.0).round() / 10.0
                } else {
                    self.config.deal_amazon_fee_pct
                },
                forwarding_cost: deal.forwarding_cost,
                notified_at: Utc::now(),
                status: AlertStatus::Active,
                rejection_reason: None,
                rejection_note: String::new(),
                rejected_at: None,
            };

            // Savepoint insert: a concurrent duplicate is a silent no-op
            if self.store.insert_alert(&alert)?.is_none() {
                debug!(
                    auction_id = %deal.yahoo_auction_id,
                    asin = %deal.amazon_asin,
                    "Duplicate alert skipped"
                );
                continue;
            }

            kw.total_deals_found += 1;
            kw.total_gross_profit += deal.gross_profit;
            new_deals += 1;

            self.send_deal_webhook(&deal, kw).await;

            if deal.gross_profit >= self.config.series_expansion_min_profit {
                if let Err(e) = self.enqueue_series_candidates(&deal, kw) {
                    warn!(error = ?e, "Series expansion failed");
                }
            }
        }

        info!(keyword = %kw.keyword, new_deals, "Keyword scan finished");
        Ok(new_deals)
    }

    /// Search the auction site, run targeted + fallback analytics
    /// searches, match, score, and filter.
    async fn find_deals(&self, keyword: &str) -> Result<Vec<DealCandidate>> {
        // Step 1: auction search, multiple pages
        let mut yahoo_results: Vec<SearchResultItem> = Vec::new();
        for page in 1..=self.config.deal_scan_max_pages {
            match self.scraper.search(keyword, page).await {
                Ok(page_results) => {
                    if page_results.is_empty() {
                        break;
                    }
                    yahoo_results.extend(page_results);
                }
                Err(e) => {
                    warn!(keyword, page, error = ?e, "Auction search page failed");
                    break;
                }
            }
        }
        if yahoo_results.is_empty() {
            return Ok(Vec::new());
        }

        // Step 2: classify listings by (brand, models) signature
        type GroupKey = (Option<String>, Vec<String>);
        let mut targeted_groups: HashMap<GroupKey, Vec<SearchResultItem>> = HashMap::new();
        let mut fallback_listings: Vec<SearchResultItem> = Vec::new();

        for yr in yahoo_results {
            if yr.buy_now_price <= 0 {
                continue;
            }
            if is_apparel(&yr.title) {
                continue;
            }
            let (brand, models, _) = extract_product_info(&yr.title);
            if !models.is_empty() && yr.buy_now_price >= self.config.deal_min_price_for_keepa_search
            {
                let mut sorted_models: Vec<String> = models.into_iter().collect();
                sorted_models.sort();
                targeted_groups
                    .entry((brand, sorted_models))
                    .or_default()
                    .push(yr);
            } else {
                fallback_listings.push(yr);
            }
        }

        // Step 3: one targeted search per group within the budget
        let max_searches = self.config.deal_max_keepa_searches_per_keyword;
        let mut searches_done = 0u32;
        let mut matched: Vec<(Vec<SearchResultItem>, Vec<KeepaProduct>)> = Vec::new();

        for ((brand, models), listings) in targeted_groups {
            if searches_done >= max_searches {
                fallback_listings.extend(listings);
                continue;
            }
            let mut query_parts: Vec<String> = Vec::new();
            if let Some(b) = &brand {
                query_parts.push(b.clone());
            }
            query_parts.extend(models.iter().take(2).cloned());
            let query = query_parts.join(" ");

            match self.keepa.search_products(&query, None).await {
                Ok(products) => {
                    debug!(query = %query, results = products.len(), "Targeted Keepa search");
                    searches_done += 1;
                    matched.push((listings, products));
                }
                Err(e) => {
                    warn!(query = %query, error = %e, "Targeted Keepa search failed");
                    fallback_listings.extend(listings);
                }
            }
        }

        // Step 4: at most one fallback search for the leftovers
        if !fallback_listings.is_empty() {
            match self.keepa.search_products(keyword, None).await {
                Ok(products) if !products.is_empty() => {
                    matched.push((fallback_listings, products));
                }
                Ok(_) => {}
                Err(e) => warn!(keyword, error = %e, "Fallback Keepa search failed"),
            }
        }

        // Step 5: match & score each listing against its candidate set
        let mut deals: Vec<DealCandidate> = Vec::new();
        for (listings, products) in &matched {
            if products.is_empty() {
                continue;
            }
            for yr in listings {
                if let Some(deal) = self.match_and_score(yr, products).await {
                    deals.push(deal);
                }
            }
        }

        info!(
            keyword,
            searches = searches_done,
            raw_deals = deals.len(),
            "Keyword pipeline finished"
        );

        // Step 6: margin window + profit floor
        let mut filtered: Vec<DealCandidate> = deals
            .into_iter()
            .filter(|d| {
                d.gross_margin_pct >= self.config.deal_min_gross_margin_pct
                    && d.gross_margin_pct <= self.config.deal_max_gross_margin_pct
                    && d.gross_profit >= self.config.deal_min_gross_profit
            })
            .collect();
        filtered.sort_by(|a, b| b.gross_profit.cmp(&a.gross_profit));
        Ok(filtered)
    }

    /// Best-scoring acceptable match for one listing, or `None`.
    async fn match_and_score(
        &self,
        yr: &SearchResultItem,
        products: &[KeepaProduct],
    ) -> Option<DealCandidate> {
        let yahoo_price = yr.buy_now_price;
        let yahoo_shipping = yr
            .shipping_cost
            .unwrap_or(self.config.deal_default_shipping);
        let ov = self.overrides.snapshot();

        let mut best: Option<(f64, DealCandidate)> = None;

        for kp in products {
            let amazon_title = match kp.title.as_deref() {
                Some(t) if !t.is_empty() => t,
                _ => continue,
            };

            let mut result = matcher::match_products_with(&yr.title, amazon_title, &ov);

            // The provider's model field can confirm what the titles
            // alone could not
            if !result.model_match {
                if let Some(keepa_model) = kp.model.as_deref().filter(|m| !m.is_empty()) {
                    let yahoo_models = extract_model_numbers_from_text(&yr.title);
                    let keepa_models = extract_model_numbers_from_text(keepa_model);
                    if yahoo_models.intersection(&keepa_models).next().is_some() {
                        result.keepa_model_match = true;
                    }
                }
            }

            if !result.is_likely_match() {
                continue;
            }

            // Learned blocklists
            if ov
                .blocked_pairs
                .contains(&(yr.auction_id.clone(), kp.asin.clone()))
            {
                continue;
            }
            if ov
                .never_show_pairs
                .contains(&(yr.title.clone(), amazon_title.to_string()))
            {
                continue;
            }

            if best.as_ref().is_some_and(|(score, _)| result.score <= *score) {
                continue;
            }

            // Live referral fee when the marketplace client is present
            let mut fee_pct = self.config.deal_amazon_fee_pct;
            if let Some(sp_api) = &self.sp_api {
                let used_price = kp
                    .stats
                    .as_ref()
                    .and_then(|s| crate::keepa::stat_val(&s.current, crate::keepa::IDX_USED))
                    .unwrap_or(0);
                if !kp.asin.is_empty() && used_price > 0 {
                    if let Some(actual) = sp_api.get_referral_fee_pct(&kp.asin, used_price).await {
                        fee_pct = actual;
                    }
                }
            }

            let mut deal = match score_deal(
                yahoo_price,
                kp,
                yahoo_shipping,
                self.config.deal_forwarding_cost,
                self.config.deal_system_fee,
                fee_pct,
                self.config.keepa_good_rank_threshold,
            ) {
                Some(deal) => deal,
                None => continue,
            };

            // A fraction of the sell price buys a part, not the product
            if deal.sell_price > 0
                && (yahoo_price as f64) < deal.sell_price as f64 * MIN_PRICE_RATIO
            {
                continue;
            }

            // High margins are usually mismatches: tighten up
            if deal.gross_margin_pct >= self.config.deal_deep_validation_margin_threshold {
                if !result.passes_strict_check() {
                    continue;
                }
                if self.config.deal_deep_validation_enabled
                    && self.deep_validation_count.load(Ordering::Relaxed)
                        < self.config.deal_deep_validation_max_per_cycle
                    && !self.deep_validate(&yr.auction_id, &yr.title, &ov).await
                {
                    continue;
                }
            }

            deal.yahoo_title = yr.title.clone();
            deal.yahoo_auction_id = yr.auction_id.clone();
            deal.yahoo_url = yr.url.clone();
            deal.yahoo_image_url = yr.image_url.clone();
            best = Some((result.score, deal));
        }

        best.map(|(_, deal)| deal)
    }

    /// Fetch the auction description and reject on any accessory
    /// signal. Fetch failures pass: the title already made the cut.
    async fn deep_validate(
        &self,
        auction_id: &str,
        yahoo_title: &str,
        ov: &matcher::OverrideSnapshot,
    ) -> bool {
        self.deep_validation_count.fetch_add(1, Ordering::Relaxed);
        let description = match self.scraper.fetch_auction_description(auction_id).await {
            Ok(description) => description,
            Err(e) => {
                warn!(auction_id, error = ?e, "Deep validation fetch failed");
                return true;
            }
        };
        if description.is_empty() {
            return true;
        }
        let combined = format!("{yahoo_title} {description}");
        if matcher::extract_accessory_signals_from_text(&combined, &ov.extra_accessory_words) {
            info!(auction_id, "Deep validation rejected: accessory signal in description");
            return false;
        }
        true
    }

    async fn send_deal_webhook(&self, deal: &DealCandidate, kw: &WatchedKeyword) {
        if self.config.webhook_url.is_empty() {
            info!(
                title = %deal.yahoo_title,
                yahoo_price = deal.yahoo_price,
                sell_price = deal.sell_price,
                gross_profit = deal.gross_profit,
                margin = deal.gross_margin_pct,
                "Deal found (no webhook configured)"
            );
            return;
        }
        let payload = build_deal_payload(deal, kw, &self.config.webhook_type);
        let url = if self.config.webhook_type == "line" {
            crate::notifier::webhook::LINE_NOTIFY_URL
        } else {
            &self.config.webhook_url
        };
        let mut payload = payload;
        if self.config.webhook_type == "line" {
            payload["token"] = serde_json::json!(self.config.webhook_url);
        }
        if !send_webhook(url, &payload, &self.config.webhook_type).await {
            warn!(title = %deal.yahoo_title, "Deal webhook failed");
        }
    }

    /// When a deal proves a model profitable, its numeric siblings are
    /// worth watching too: xd900 → xd700/xd800/xd1000/xd1100.
    fn enqueue_series_candidates(&self, deal: &DealCandidate, kw: &WatchedKeyword) -> Result<()> {
        let (brand, models, _) = extract_product_info(&deal.yahoo_title);
        if models.is_empty() {
            return Ok(());
        }

        let mut existing: std::collections::HashSet<String> = self
            .store
            .list_keyword_texts()?
            .into_iter()
            .map(|k| k.to_lowercase())
            .collect();
        existing.extend(
            self.store
                .list_open_candidate_texts()?
                .into_iter()
                .map(|k| k.to_lowercase()),
        );

        let mut count = 0usize;
        for model in &models {
            let (prefix, num, suffix) = match decompose_model(model) {
                Some(parts) => parts,
                None => continue,
            };
            let step = guess_step(num);

            for offset in [-2i64, -1, 1, 2] {
                let sibling_num = num + offset * step;
                if sibling_num <= 0 {
                    continue;
                }
                let sibling_model = format!("{prefix}{sibling_num}{suffix}");
                let keyword = match &brand {
                    Some(b) => format!("{b} {sibling_model}"),
                    None => sibling_model,
                };
                if existing.contains(&keyword.to_lowercase()) {
                    continue;
                }

                self.store.insert_candidate(&KeywordCandidate {
                    id: 0,
                    keyword: keyword.clone(),
                    strategy: "series".to_string(),
                    confidence: 0.75,
                    parent_keyword_id: Some(kw.id),
                    reasoning: format!(
                        "利益確認済み「{} {}」(¥{})のシリーズ展開",
                        brand.as_deref().unwrap_or(""),
                        model,
                        deal.gross_profit
                    ),
                    status: CandidateStatus::Pending,
                    validation_result: String::new(),
                    created_at: Utc::now(),
                    resolved_at: None,
                })?;
                existing.insert(keyword.to_lowercase());
                count += 1;

                if count >= self.config.series_expansion_max_siblings {
                    info!(count, title = %deal.yahoo_title, "Series expansion enqueued");
                    return Ok(());
                }
            }
        }

        if count > 0 {
            info!(count, title = %deal.yahoo_title, "Series expansion enqueued");
        }
        Ok(())
    }

    /// Post-cycle keyword hygiene:
    /// - AI keywords with 0 deals in 10+ scans are deleted
    /// - manual keywords with 0 deals in 50+ scans are deleted
    /// - manual keywords that went 50+ scans since their last deal pause
    fn cleanup_keywords(&self) -> Result<()> {
        const CLEANUP_THRESHOLD_MANUAL: i64 = 50;
        const CLEANUP_THRESHOLD_AI: i64 = 10;

        for mut kw in self.store.list_active_keywords()? {
            if !kw.is_manual()
                && kw.total_deals_found == 0
                && kw.total_scans >= CLEANUP_THRESHOLD_AI
            {
                info!(keyword = %kw.keyword, scans = kw.total_scans, "Auto-deleting AI keyword");
                self.store.delete_keyword(kw.id)?;
                continue;
            }
            if kw.is_manual() && kw.total_deals_found == 0 && kw.total_scans >= CLEANUP_THRESHOLD_MANUAL
            {
                info!(keyword = %kw.keyword, scans = kw.total_scans, "Auto-deleting manual keyword");
                self.store.delete_keyword(kw.id)?;
                continue;
            }
            if kw.is_manual()
                && kw.total_deals_found > 0
                && kw.scans_since_last_deal >= CLEANUP_THRESHOLD_MANUAL
            {
                info!(
                    keyword = %kw.keyword,
                    dormant_scans = kw.scans_since_last_deal,
                    "Auto-pausing manual keyword"
                );
                kw.is_active = false;
                self.store.update_keyword(&kw)?;
            }
        }
        Ok(())
    }
}
