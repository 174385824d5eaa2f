//! Monitored item, status history, and notification log queries.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{dt_from_sql, dt_to_sql, opt_dt_from_sql, opt_dt_to_sql, Store};
use crate::models::{
    ChangeType, Condition, ItemStatus, ListingStatus, MonitoredItem, NotificationLog,
    ShippingPattern, StatusHistory,
};

const ITEM_COLUMNS: &str = "id, auction_id, title, url, image_url, category_id, seller_id, \
     current_price, start_price, buy_now_price, win_price, start_time, end_time, bid_count, \
     status, check_interval_seconds, auto_adjust_interval, is_monitoring_active, \
     last_checked_at, created_at, updated_at, notes, amazon_asin, amazon_sku, \
     amazon_condition, amazon_listing_status, amazon_price, estimated_win_price, \
     shipping_cost, forwarding_cost, amazon_fee_pct, amazon_margin_pct, \
     amazon_lead_time_days, amazon_shipping_pattern, amazon_condition_note, \
     amazon_last_synced_at, seller_central_checklist";

fn map_item(row: &Row) -> rusqlite::Result<MonitoredItem> {
    Ok(MonitoredItem {
        id: row.get(0)?,
        auction_id: row.get(1)?,
        title: row.get(2)?,
        url: row.get(3)?,
        image_url: row.get(4)?,
        category_id: row.get(5)?,
        seller_id: row.get(6)?,
        current_price: row.get(7)?,
        start_price: row.get(8)?,
        buy_now_price: row.get(9)?,
        win_price: row.get(10)?,
        start_time: opt_dt_from_sql(row.get(11)?),
        end_time: opt_dt_from_sql(row.get(12)?),
        bid_count: row.get(13)?,
        status: ItemStatus::parse_str(&row.get::<_, String>(14)?),
        check_interval_seconds: row.get(15)?,
        auto_adjust_interval: row.get(16)?,
        is_monitoring_active: row.get(17)?,
        last_checked_at: opt_dt_from_sql(row.get(18)?),
        created_at: dt_from_sql(&row.get::<_, String>(19)?),
        updated_at: dt_from_sql(&row.get::<_, String>(20)?),
        notes: row.get(21)?,
        amazon_asin: row.get(22)?,
        amazon_sku: row.get(23)?,
        amazon_condition: Condition::parse_str(&row.get::<_, String>(24)?),
        amazon_listing_status: row
            .get::<_, Option<String>>(25)?
            .as_deref()
            .and_then(ListingStatus::parse_str),
        amazon_price: row.get(26)?,
        estimated_win_price: row.get(27)?,
        shipping_cost: row.get(28)?,
        forwarding_cost: row.get(29)?,
        amazon_fee_pct: row.get(30)?,
        amazon_margin_pct: row.get(31)?,
        amazon_lead_time_days: row.get(32)?,
        amazon_shipping_pattern: ShippingPattern::parse_str(&row.get::<_, String>(33)?),
        amazon_condition_note: row.get(34)?,
        amazon_last_synced_at: opt_dt_from_sql(row.get(35)?),
        seller_central_checklist: row.get(36)?,
    })
}

impl Store {
    /// Insert a new item; returns it with the assigned id. `id` on the
    /// input is ignored.
    pub fn insert_item(&self, item: &MonitoredItem) -> Result<MonitoredItem> {
        let id = self.with(|conn| {
            conn.execute(
                "INSERT INTO monitored_items (
                    auction_id, title, url, image_url, category_id, seller_id,
                    current_price, start_price, buy_now_price, win_price,
                    start_time, end_time, bid_count, status,
                    check_interval_seconds, auto_adjust_interval, is_monitoring_active,
                    last_checked_at, created_at, updated_at, notes,
                    amazon_asin, amazon_sku, amazon_condition, amazon_listing_status,
                    amazon_price, estimated_win_price, shipping_cost, forwarding_cost,
                    amazon_fee_pct, amazon_margin_pct, amazon_lead_time_days,
                    amazon_shipping_pattern, amazon_condition_note,
                    amazon_last_synced_at, seller_central_checklist
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,
                          ?18,?19,?20,?21,?22,?23,?24,?25,?26,?27,?28,?29,?30,?31,?32,
                          ?33,?34,?35,?36)",
                params![
                    item.auction_id,
                    item.title,
                    item.url,
                    item.image_url,
                    item.category_id,
                    item.seller_id,
                    item.current_price,
                    item.start_price,
                    item.buy_now_price,
                    item.win_price,
                    opt_dt_to_sql(&item.start_time),
                    opt_dt_to_sql(&item.end_time),
                    item.bid_count,
                    item.status.as_str(),
                    item.check_interval_seconds,
                    item.auto_adjust_interval,
                    item.is_monitoring_active,
                    opt_dt_to_sql(&item.last_checked_at),
                    dt_to_sql(&item.created_at),
                    dt_to_sql(&item.updated_at),
                    item.notes,
                    item.amazon_asin,
                    item.amazon_sku,
                    item.amazon_condition.as_str(),
                    item.amazon_listing_status.map(|s| s.as_str()),
                    item.amazon_price,
                    item.estimated_win_price,
                    item.shipping_cost,
                    item.forwarding_cost,
                    item.amazon_fee_pct,
                    item.amazon_margin_pct,
                    item.amazon_lead_time_days,
                    item.amazon_shipping_pattern.as_str(),
                    item.amazon_condition_note,
                    opt_dt_to_sql(&item.amazon_last_synced_at),
                    item.seller_central_checklist,
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })?;
        let mut out = item.clone();
        out.id = id;
        Ok(out)
    }

    /// Write every mutable field back. The monitor loop mutates the
    /// struct in memory and persists it in one statement.
    pub fn update_item(&self, item: &MonitoredItem) -> Result<()> {
        self.with(|conn| {
            conn.execute(
                "UPDATE monitored_items SET
                    title=?2, url=?3, image_url=?4, category_id=?5, seller_id=?6,
                    current_price=?7, start_price=?8, buy_now_price=?9, win_price=?10,
                    start_time=?11, end_time=?12, bid_count=?13, status=?14,
                    check_interval_seconds=?15, auto_adjust_interval=?16,
                    is_monitoring_active=?17, last_checked_at=?18, updated_at=?19,
                    notes=?20, amazon_asin=?21, amazon_sku=?22, amazon_condition=?23,
                    amazon_listing_status=?24, amazon_price=?25, estimated_win_price=?26,
                    shipping_cost=?27, forwarding_cost=?28, amazon_fee_pct=?29,
                    amazon_margin_pct=?30, amazon_lead_time_days=?31,
                    amazon_shipping_pattern=?32, amazon_condition_note=?33,
                    amazon_last_synced_at=?34, seller_central_checklist=?35
                 WHERE id=?1",
                params![
                    item.id,
                    item.title,
                    item.url,
                    item.image_url,
                    item.category_id,
                    item.seller_id,
                    item.current_price,
                    item.start_price,
                    item.buy_now_price,
                    item.win_price,
                    opt_dt_to_sql(&item.start_time),
                    opt_dt_to_sql(&item.end_time),
                    item.bid_count,
                    item.status.as_str(),
                    item.check_interval_seconds,
                    item.auto_adjust_interval,
                    item.is_monitoring_active,
                    opt_dt_to_sql(&item.last_checked_at),
                    dt_to_sql(&item.updated_at),
                    item.notes,
                    item.amazon_asin,
                    item.amazon_sku,
                    item.amazon_condition.as_str(),
                    item.amazon_listing_status.map(|s| s.as_str()),
                    item.amazon_price,
                    item.estimated_win_price,
                    item.shipping_cost,
                    item.forwarding_cost,
                    item.amazon_fee_pct,
                    item.amazon_margin_pct,
                    item.amazon_lead_time_days,
                    item.amazon_shipping_pattern.as_str(),
                    item.amazon_condition_note,
                    opt_dt_to_sql(&item.amazon_last_synced_at),
                    item.seller_central_checklist,
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_item(&self, id: i64) -> Result<Option<MonitoredItem>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM monitored_items WHERE id=?1"),
                [id],
                map_item,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    pub fn get_item_by_auction_id(&self, auction_id: &str) -> Result<Option<MonitoredItem>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM monitored_items WHERE auction_id=?1"),
                [auction_id],
                map_item,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    pub fn list_items(&self) -> Result<Vec<MonitoredItem>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM monitored_items ORDER BY updated_at DESC"
            ))?;
            let rows = stmt.query_map([], map_item)?;
            rows.collect()
        })
    }

    /// Items the monitor loop should consider this tick.
    pub fn list_items_to_monitor(&self) -> Result<Vec<MonitoredItem>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM monitored_items
                 WHERE is_monitoring_active=1 AND status='active'"
            ))?;
            let rows = stmt.query_map([], map_item)?;
            rows.collect()
        })
    }

    /// Items with a marketplace offer worth verifying (listing sync).
    pub fn list_items_with_listing(&self) -> Result<Vec<MonitoredItem>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM monitored_items
                 WHERE amazon_sku IS NOT NULL
                   AND amazon_listing_status IN ('active','inactive')"
            ))?;
            let rows = stmt.query_map([], map_item)?;
            rows.collect()
        })
    }

    /// Items with a live marketplace offer (order enrichment).
    pub fn list_items_with_active_listing(&self) -> Result<Vec<MonitoredItem>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ITEM_COLUMNS} FROM monitored_items
                 WHERE amazon_sku IS NOT NULL AND amazon_listing_status='active'"
            ))?;
            let rows = stmt.query_map([], map_item)?;
            rows.collect()
        })
    }

    pub fn delete_item(&self, id: i64) -> Result<()> {
        self.with(|conn| {
            conn.execute("DELETE FROM monitored_items WHERE id=?1", [id])?;
            Ok(())
        })
    }

    /// Remove ended items untouched for 7+ days, unless a listing is
    /// still live or stuck in an error state.
    pub fn delete_stale_ended_items(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with(|conn| {
            conn.execute(
                "DELETE FROM monitored_items
                 WHERE status LIKE 'ended_%'
                   AND (amazon_listing_status IS NULL
                        OR amazon_listing_status NOT IN ('active','error'))
                   AND updated_at < ?1",
                [dt_to_sql(&cutoff)],
            )
        })
    }

    pub fn add_history(&self, change: &StatusHistory) -> Result<i64> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO status_history (
                    item_id, auction_id, change_type, old_status, new_status,
                    old_price, new_price, old_bid_count, new_bid_count, recorded_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
                params![
                    change.item_id,
                    change.auction_id,
                    change.change_type.as_str(),
                    change.old_status,
                    change.new_status,
                    change.old_price,
                    change.new_price,
                    change.old_bid_count,
                    change.new_bid_count,
                    dt_to_sql(&change.recorded_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    pub fn list_history(&self, item_id: i64, limit: u32) -> Result<Vec<StatusHistory>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, item_id, auction_id, change_type, old_status, new_status,
                        old_price, new_price, old_bid_count, new_bid_count, recorded_at
                 FROM status_history WHERE item_id=?1
                 ORDER BY recorded_at DESC LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![item_id, limit], |row| {
                Ok(StatusHistory {
                    id: row.get(0)?,
                    item_id: row.get(1)?,
                    auction_id: row.get(2)?,
                    change_type: ChangeType::parse_str(&row.get::<_, String>(3)?),
                    old_status: row.get(4)?,
                    new_status: row.get(5)?,
                    old_price: row.get(6)?,
                    new_price: row.get(7)?,
                    old_bid_count: row.get(8)?,
                    new_bid_count: row.get(9)?,
                    recorded_at: dt_from_sql(&row.get::<_, String>(10)?),
                })
            })?;
            rows.collect()
        })
    }

    pub fn add_notification_log(&self, log: &NotificationLog) -> Result<i64> {
        self.with(|conn| {
            conn.execute(
                "INSERT INTO notification_log (item_id, channel, event_type, message, success, sent_at)
                 VALUES (?1,?2,?3,?4,?5,?6)",
                params![
                    log.item_id,
                    log.channel,
                    log.event_type,
                    log.message,
                    log.success,
                    dt_to_sql(&log.sent_at),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blank_item(auction_id: &str) -> MonitoredItem {
        let now = Utc::now();
        MonitoredItem {
            id: 0,
            auction_id: auction_id.to_string(),
            title: "test".into(),
            url: String::new(),
            image_url: String::new(),
            category_id: String::new(),
            seller_id: String::new(),
            current_price: 1000,
            start_price: 1000,
            buy_now_price: 0,
            win_price: 0,
            start_time: None,
            end_time: None,
            bid_count: 0,
            status: ItemStatus::Active,
            check_interval_seconds: 300,
            auto_adjust_interval: true,
            is_monitoring_active: true,
            last_checked_at: None,
            created_at: now,
            updated_at: now,
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

    #[test]
    fn item_round_trip() {
        let store = Store::open_in_memory().unwrap();
        let mut item = blank_item("x100");
        item.amazon_asin = Some("B000TEST01".into());
        let saved = store.insert_item(&item).unwrap();
        assert!(saved.id > 0);

        let loaded = store.get_item_by_auction_id("x100").unwrap().unwrap();
        assert_eq!(loaded.amazon_asin.as_deref(), Some("B000TEST01"));
        assert_eq!(loaded.status, ItemStatus::Active);

        let mut loaded = loaded;
        loaded.status = ItemStatus::EndedSold;
        loaded.is_monitoring_active = false;
        store.update_item(&loaded).unwrap();
        let reloaded = store.get_item(loaded.id).unwrap().unwrap();
        assert_eq!(reloaded.status, ItemStatus::EndedSold);
        assert!(!reloaded.is_monitoring_active);
    }

    #[test]
    fn history_cascades_with_item() {
        let store = Store::open_in_memory().unwrap();
        let item = store.insert_item(&blank_item("x200")).unwrap();
        let mut change = StatusHistory::change(item.id, "x200", ChangeType::PriceChange);
        change.old_price = Some(1000);
        change.new_price = Some(1500);
        store.add_history(&change).unwrap();
        assert_eq!(store.list_history(item.id, 10).unwrap().len(), 1);

        store.delete_item(item.id).unwrap();
        assert_eq!(store.list_history(item.id, 10).unwrap().len(), 0);
    }

    #[test]
    fn stale_ended_cleanup_skips_live_listings() {
        let store = Store::open_in_memory().unwrap();
        let old = Utc::now() - chrono::Duration::days(10);

        let mut gone = blank_item("x300");
        gone.status = ItemStatus::EndedNoWinner;
        gone.updated_at = old;
        store.insert_item(&gone).unwrap();

        let mut listed = blank_item("x301");
        listed.status = ItemStatus::EndedSold;
        listed.updated_at = old;
        listed.amazon_listing_status = Some(ListingStatus::Active);
        store.insert_item(&listed).unwrap();

        let removed = store
            .delete_stale_ended_items(Utc::now() - chrono::Duration::days(7))
            .unwrap();
        assert_eq!(removed, 1);
        assert!(store.get_item_by_auction_id("x301").unwrap().is_some());
    }
}
