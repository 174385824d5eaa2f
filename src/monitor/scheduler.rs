//! Cooperative job scheduler and the auction monitor loop.
//!
//! Each registered job is one tokio task running a fixed-interval loop;
//! two ticks of the same job can never overlap because the tick body is
//! awaited inside the loop. Different jobs overlap freely and share
//! only the store.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant};
use tracing::{debug, error, info, warn};

use crate::models::{
    AlertStatus, ChangeType, MonitoredItem, NotificationLog, StatusHistory,
};
use crate::notifier::{event_type_for, Notifier};
use crate::scraper::AuctionScraper;
use crate::store::Store;

pub struct Scheduler {
    paused: Arc<AtomicBool>,
    running: AtomicBool,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            paused: Arc::new(AtomicBool::new(false)),
            running: AtomicBool::new(false),
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Register a periodic job. The first tick fires one full interval
    /// after registration.
    pub fn add_job<F, Fut>(&self, name: &'static str, every: Duration, job: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send,
    {
        let paused = Arc::clone(&self.paused);
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + every, every);
            loop {
                ticker.tick().await;
                if paused.load(Ordering::Relaxed) {
                    debug!(job = name, "Scheduler paused, skipping tick");
                    continue;
                }
                debug!(job = name, "Job tick");
                job().await;
            }
        });
        self.handles.lock().push(handle);
        self.running.store(true, Ordering::Relaxed);
        info!(job = name, interval_secs = every.as_secs(), "Job registered");
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Relaxed);
        self.running.store(false, Ordering::Relaxed);
        info!("Scheduler paused");
    }

    pub fn resume(&self) {
        self.paused.store(false, Ordering::Relaxed);
        self.running.store(true, Ordering::Relaxed);
        info!("Scheduler resumed");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Stop without waiting for in-flight work; outbound calls settle
    /// or get cancelled within their own timeouts.
    pub fn shutdown(&self) {
        for handle in self.handles.lock().drain(..) {
            handle.abort();
        }
        self.running.store(false, Ordering::Relaxed);
        info!("Scheduler shut down");
    }
}

/// The auction polling loop plus the alert-expiry housekeeping.
pub struct MonitorLoop {
    store: Arc<Store>,
    scraper: Arc<AuctionScraper>,
    notifiers: Vec<Arc<dyn Notifier>>,
    min_check_interval: u64,
}

impl MonitorLoop {
    pub fn new(
        store: Arc<Store>,
        scraper: Arc<AuctionScraper>,
        notifiers: Vec<Arc<dyn Notifier>>,
        min_check_interval: u64,
    ) -> Self {
        Self {
            store,
            scraper,
            notifiers,
            min_check_interval,
        }
    }

    /// One monitor tick: poll every item that is due.
    pub async fn check_all(&self) {
        if let Err(e) = self.check_all_inner().await {
            error!(error = ?e, "Error in monitor loop");
        }
    }

    async fn check_all_inner(&self) -> Result<()> {
        let items = self.store.list_items_to_monitor()?;
        if !items.is_empty() {
            info!(count = items.len(), "Monitor loop: active items to check");
        }

        let now = Utc::now();
        for item in items {
            let due = match item.last_checked_at {
                Some(at) => {
                    (now - at).num_seconds() as f64 >= self.effective_interval(&item)
                }
                None => true,
            };
            if !due {
                continue;
            }
            if let Err(e) = self.check_item(item).await {
                warn!(error = ?e, "Failed to check item");
            }
        }

        // Ended items linger 7 days for review, then go
        let removed = self
            .store
            .delete_stale_ended_items(now - ChronoDuration::days(7))?;
        if removed > 0 {
            info!(removed, "Auto-cleanup: removed old ended items");
        }

        // Auctions rarely run longer than a week; stale alerts are dead
        let expired = self
            .store
            .expire_alerts_older_than(now - ChronoDuration::days(7))?;
        if expired > 0 {
            info!(expired, "Expired old deal alerts");
        }

        metrics::increment_counter!("monitor_ticks_total");
        Ok(())
    }

    async fn check_item(&self, mut item: MonitoredItem) -> Result<()> {
        debug!(auction_id = %item.auction_id, "Checking auction");
        let snapshot = match self.scraper.fetch_auction(&item.auction_id).await? {
            Some(snapshot) => snapshot,
            None => {
                warn!(auction_id = %item.auction_id, "Failed to parse auction page");
                item.last_checked_at = Some(Utc::now());
                self.store.update_item(&item)?;
                return Ok(());
            }
        };

        let new_status = snapshot.status();
        let mut changes: Vec<StatusHistory> = Vec::new();

        if new_status != item.status {
            let mut c = StatusHistory::change(item.id, &item.auction_id, ChangeType::StatusChange);
            c.old_status = Some(item.status.as_str().to_string());
            c.new_status = Some(new_status.as_str().to_string());
            changes.push(c);
        }
        if snapshot.current_price != item.current_price {
            let mut c = StatusHistory::change(item.id, &item.auction_id, ChangeType::PriceChange);
            c.old_price = Some(item.current_price);
            c.new_price = Some(snapshot.current_price);
            changes.push(c);
        }
        if snapshot.bid_count != item.bid_count {
            let mut c = StatusHistory::change(item.id, &item.auction_id, ChangeType::BidChange);
            c.old_bid_count = Some(item.bid_count);
            c.new_bid_count = Some(snapshot.bid_count);
            changes.push(c);
        }

        // History first, then the field mutations
        for change in &changes {
            self.store.add_history(change)?;
        }

        if !snapshot.title.is_empty() {
            item.title = snapshot.title.clone();
        }
        item.current_price = snapshot.current_price;
        item.win_price = snapshot.win_price;
        item.bid_count = snapshot.bid_count;
        if snapshot.end_time.is_some() {
            item.end_time = snapshot.end_time;
        }
        item.status = new_status;
        item.last_checked_at = Some(Utc::now());
        item.updated_at = Utc::now();

        if new_status.is_ended() {
            item.is_monitoring_active = false;
            info!(
                auction_id = %item.auction_id,
                status = new_status.as_str(),
                "Auction ended, stopping monitor"
            );
            let expired = self.store.expire_alerts_for_auction(&item.auction_id)?;
            if expired > 0 {
                info!(
                    expired,
                    auction_id = %item.auction_id,
                    "Expired deal alerts for ended auction"
                );
            }
        }
        self.store.update_item(&item)?;

        // Notifier dispatch may mutate the item again (the marketplace
        // notifier clears the SKU after delisting)
        for change in &changes {
            self.dispatch_notifiers(&mut item, change).await?;
        }
        Ok(())
    }

    async fn dispatch_notifiers(
        &self,
        item: &mut MonitoredItem,
        change: &StatusHistory,
    ) -> Result<()> {
        for notifier in &self.notifiers {
            let sku_before = item.amazon_sku.clone();
            let success = notifier.notify(item, change).await;
            self.store.add_notification_log(&NotificationLog {
                id: 0,
                item_id: item.id,
                channel: notifier.channel().to_string(),
                event_type: event_type_for(change).to_string(),
                message: notifier.format_message(item, change),
                success,
                sent_at: Utc::now(),
            })?;

            // Record listing withdrawals performed by the notifier
            if let Some(sku) = sku_before {
                use crate::models::ListingStatus;
                if item.amazon_sku.is_none()
                    && item.amazon_listing_status == Some(ListingStatus::Delisted)
                {
                    let mut c = StatusHistory::change(
                        item.id,
                        &item.auction_id,
                        ChangeType::AmazonDelistAuto,
                    );
                    c.old_status = Some(sku);
                    self.store.add_history(&c)?;
                    self.store.update_item(item)?;
                } else if item.amazon_listing_status == Some(ListingStatus::Error) {
                    let mut c = StatusHistory::change(
                        item.id,
                        &item.auction_id,
                        ChangeType::AmazonError,
                    );
                    c.old_status = Some(sku);
                    c.new_status = Some("取り下げ失敗".to_string());
                    self.store.add_history(&c)?;
                    self.store.update_item(item)?;
                }
            }
        }
        Ok(())
    }

    /// Polling interval for one item: shrink as the end time nears.
    fn effective_interval(&self, item: &MonitoredItem) -> f64 {
        let base = item.check_interval_seconds as f64;
        if !item.auto_adjust_interval {
            return base;
        }
        let end = match item.end_time {
            Some(end) => end,
            None => return base,
        };
        let remaining = (end - Utc::now()).num_seconds() as f64;
        if remaining <= 0.0 {
            base // the next check will observe the ended state
        } else if remaining < 1800.0 {
            self.min_check_interval as f64
        } else if remaining < 7200.0 {
            base / 2.0
        } else {
            base
        }
    }

    /// The 30-minute housekeeping job: re-fetch auctions behind active
    /// alerts and expire alerts whose auctions have ended.
    pub async fn expire_ended_alerts(&self) {
        let active = match self.store.list_alerts(Some(AlertStatus::Active), u32::MAX) {
            Ok(alerts) => alerts,
            Err(e) => {
                error!(error = ?e, "Alert cleanup: failed to list alerts");
                return;
            }
        };
        if active.is_empty() {
            return;
        }

        let mut by_auction: std::collections::HashMap<String, usize> = Default::default();
        for alert in &active {
            *by_auction.entry(alert.yahoo_auction_id.clone()).or_insert(0) += 1;
        }
        info!(
            auctions = by_auction.len(),
            alerts = active.len(),
            "Alert cleanup: checking auctions for active alerts"
        );

        let mut expired = 0;
        for auction_id in by_auction.keys() {
            match self.scraper.fetch_auction(auction_id).await {
                Ok(Some(snapshot)) if snapshot.status().is_ended() => {
                    match self.store.expire_alerts_for_auction(auction_id) {
                        Ok(n) => expired += n,
                        Err(e) => warn!(auction_id, error = ?e, "Alert cleanup: expire failed"),
                    }
                }
                Ok(_) => {}
                Err(e) => warn!(auction_id, error = ?e, "Alert cleanup: fetch failed"),
            }
        }
        if expired > 0 {
            info!(expired, "Alert cleanup: expired alerts for ended auctions");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Condition, ItemStatus, ShippingPattern};
    use std::sync::atomic::AtomicU32;

    fn item_ending_in(secs: i64) -> MonitoredItem {
        MonitoredItem {
            id: 1,
            auction_id: "x1".into(),
            title: String::new(),
            url: String::new(),
            image_url: String::new(),
            category_id: String::new(),
            seller_id: String::new(),
            current_price: 0,
            start_price: 0,
            buy_now_price: 0,
            win_price: 0,
            start_time: None,
            end_time: Some(Utc::now() + ChronoDuration::seconds(secs)),
            bid_count: 0,
            status: ItemStatus::Active,
            check_interval_seconds: 300,
            auto_adjust_interval: true,
            is_monitoring_active: true,
            last_checked_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            notes: String::new(),
            amazon_asin: None,
            amazon_sku: None,
            amazon_condition: Condition::UsedVeryGood,
            amazon_listing_status: None,
            amazon_price: None,
            estimated_win_price: 0,
            shipping_cost: 0,
            forwarding_cost: 0,
            amazon_fee_pct: 10.0,
            amazon_margin_pct: 15.0,
            amazon_lead_time_days: 4,
            amazon_shipping_pattern: ShippingPattern::TwoToThreeDays,
            amazon_condition_note: String::new(),
            amazon_last_synced_at: None,
            seller_central_checklist: String::new(),
        }
    }

    fn monitor() -> MonitorLoop {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let client =
            crate::scraper::AuctionClient::new("test-agent", 30, false).unwrap();
        MonitorLoop::new(
            store,
            Arc::new(AuctionScraper::new(client)),
            Vec::new(),
            30,
        )
    }

    #[tokio::test]
    async fn interval_shrinks_toward_auction_end() {
        let m = monitor();

        // Far out: base interval
        assert_eq!(m.effective_interval(&item_ending_in(100_000)), 300.0);
        // Under two hours: halved
        assert_eq!(m.effective_interval(&item_ending_in(7000)), 150.0);
        // Under thirty minutes: floor
        assert_eq!(m.effective_interval(&item_ending_in(1000)), 30.0);

        // Auto-adjust off: always base
        let mut fixed = item_ending_in(1000);
        fixed.auto_adjust_interval = false;
        assert_eq!(m.effective_interval(&fixed), 300.0);

        // No end time: base
        let mut open = item_ending_in(1000);
        open.end_time = None;
        assert_eq!(m.effective_interval(&open), 300.0);
    }

    #[tokio::test]
    async fn same_job_never_overlaps_itself() {
        let scheduler = Scheduler::new();
        let concurrent = Arc::new(AtomicU32::new(0));
        let max_seen = Arc::new(AtomicU32::new(0));

        let (c, m) = (Arc::clone(&concurrent), Arc::clone(&max_seen));
        scheduler.add_job("overlap-test", Duration::from_millis(10), move || {
            let (c, m) = (Arc::clone(&c), Arc::clone(&m));
            async move {
                let now = c.fetch_add(1, Ordering::SeqCst) + 1;
                m.fetch_max(now, Ordering::SeqCst);
                // Tick body far longer than the interval
                tokio::time::sleep(Duration::from_millis(30)).await;
                c.fetch_sub(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(200)).await;
        scheduler.shutdown();
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn paused_scheduler_skips_ticks() {
        let scheduler = Scheduler::new();
        let ticks = Arc::new(AtomicU32::new(0));
        let t = Arc::clone(&ticks);
        scheduler.add_job("pause-test", Duration::from_millis(10), move || {
            let t = Arc::clone(&t);
            async move {
                t.fetch_add(1, Ordering::SeqCst);
            }
        });
        scheduler.pause();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(ticks.load(Ordering::SeqCst), 0);

        scheduler.resume();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(ticks.load(Ordering::SeqCst) > 0);
        scheduler.shutdown();
    }
}
