//! Watched keyword and deal alert queries.

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Row};

use super::{dt_from_sql, dt_to_sql, opt_dt_from_sql, opt_dt_to_sql, Store};
use crate::models::{AlertStatus, DealAlert, RejectionReason, WatchedKeyword};

const KEYWORD_COLUMNS: &str = "id, keyword, is_active, last_scanned_at, created_at, updated_at, \
     notes, source, parent_keyword_id, performance_score, total_scans, total_deals_found, \
     total_gross_profit, scans_since_last_deal, confidence, auto_deactivated_at";

fn map_keyword(row: &Row) -> rusqlite::Result<WatchedKeyword> {
    Ok(WatchedKeyword {
        id: row.get(0)?,
        keyword: row.get(1)?,
        is_active: row.get(2)?,
        last_scanned_at: opt_dt_from_sql(row.get(3)?),
        created_at: dt_from_sql(&row.get::<_, String>(4)?),
        updated_at: dt_from_sql(&row.get::<_, String>(5)?),
        notes: row.get(6)?,
        source: row.get(7)?,
        parent_keyword_id: row.get(8)?,
        performance_score: row.get(9)?,
        total_scans: row.get(10)?,
        total_deals_found: row.get(11)?,
        total_gross_profit: row.get(12)?,
        scans_since_last_deal: row.get(13)?,
        confidence: row.get(14)?,
        auto_deactivated_at: opt_dt_from_sql(row.get(15)?),
    })
}

const ALERT_COLUMNS: &str = "id, keyword_id, yahoo_auction_id, amazon_asin, yahoo_title, \
     yahoo_url, yahoo_image_url, amazon_title, yahoo_price, yahoo_shipping, sell_price, \
     gross_profit, gross_margin_pct, amazon_fee_pct, forwarding_cost, notified_at, status, \
     rejection_reason, rejection_note, rejected_at";

fn map_alert(row: &Row) -> rusqlite::Result<DealAlert> {
    Ok(DealAlert {
        id: row.get(0)?,
        keyword_id: row.get(1)?,
        yahoo_auction_id: row.get(2)?,
        amazon_asin: row.get(3)?,
        yahoo_title: row.get(4)?,
        yahoo_url: row.get(5)?,
        yahoo_image_url: row.get(6)?,
        amazon_title: row.get(7)?,
        yahoo_price: row.get(8)?,
        yahoo_shipping: row.get(9)?,
        sell_price: row.get(10)?,
        gross_profit: row.get(11)?,
        gross_margin_pct: row.get(12)?,
        amazon_fee_pct: row.get(13)?,
        forwarding_cost: row.get(14)?,
        notified_at: dt_from_sql(&row.get::<_, String>(15)?),
        status: AlertStatus::parse_str(&row.get::<_, String>(16)?),
        rejection_reason: RejectionReason::parse_str(&row.get::<_, String>(17)?),
        rejection_note: row.get(18)?,
        rejected_at: opt_dt_from_sql(row.get(19)?),
    })
}

/// Fields for a new keyword row.
pub struct NewKeyword<'a> {
    pub keyword: &'a str,
    pub source: &'a str,
    pub parent_keyword_id: Option<i64>,
    pub confidence: f64,
    pub notes: &'a str,
    pub is_active: bool,
}

impl<'a> NewKeyword<'a> {
    pub fn manual(keyword: &'a str) -> Self {
        Self {
            keyword,
            source: "manual",
            parent_keyword_id: None,
            confidence: 1.0,
            notes: "",
            is_active: true,
        }
    }
}

impl Store {
    /// Insert a keyword; `None` when the (trimmed) text already exists.
    pub fn insert_keyword(&self, new: &NewKeyword) -> Result<Option<WatchedKeyword>> {
        let keyword = new.keyword.trim();
        if keyword.is_empty() {
            return Ok(None);
        }
        let now = dt_to_sql(&Utc::now());
        let id = self.with(|conn| {
            match conn.execute(
                "INSERT INTO watched_keywords
                    (keyword, is_active, created_at, updated_at, notes, source,
                     parent_keyword_id, confidence)
                 VALUES (?1,?2,?3,?3,?4,?5,?6,?7)",
                params![
                    keyword,
                    new.is_active,
                    now,
                    new.notes,
                    new.source,
                    new.parent_keyword_id,
                    new.confidence,
                ],
            ) {
                Ok(_) => Ok(Some(conn.last_insert_rowid())),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;
        match id {
            Some(id) => self.get_keyword(id),
            None => Ok(None),
        }
    }

    pub fn get_keyword(&self, id: i64) -> Result<Option<WatchedKeyword>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {KEYWORD_COLUMNS} FROM watched_keywords WHERE id=?1"),
                [id],
                map_keyword,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    pub fn list_keywords(&self) -> Result<Vec<WatchedKeyword>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {KEYWORD_COLUMNS} FROM watched_keywords ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], map_keyword)?.collect();
            rows
        })
    }

    pub fn list_active_keywords(&self) -> Result<Vec<WatchedKeyword>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {KEYWORD_COLUMNS} FROM watched_keywords
                 WHERE is_active=1 ORDER BY created_at"
            ))?;
            let rows = stmt.query_map([], map_keyword)?.collect();
            rows
        })
    }

    /// Scan rotation order: never-scanned first, then stalest first.
    pub fn list_keywords_for_scan(&self) -> Result<Vec<WatchedKeyword>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {KEYWORD_COLUMNS} FROM watched_keywords
                 WHERE is_active=1
                 ORDER BY last_scanned_at IS NULL DESC, last_scanned_at ASC"
            ))?;
            let rows = stmt.query_map([], map_keyword)?.collect();
            rows
        })
    }

    pub fn update_keyword(&self, kw: &WatchedKeyword) -> Result<()> {
        self.with(|conn| {
            conn.execute(
                "UPDATE watched_keywords SET
                    keyword=?2, is_active=?3, last_scanned_at=?4, updated_at=?5,
                    notes=?6, source=?7, parent_keyword_id=?8, performance_score=?9,
                    total_scans=?10, total_deals_found=?11, total_gross_profit=?12,
                    scans_since_last_deal=?13, confidence=?14, auto_deactivated_at=?15
                 WHERE id=?1",
                params![
                    kw.id,
                    kw.keyword,
                    kw.is_active,
                    opt_dt_to_sql(&kw.last_scanned_at),
                    dt_to_sql(&Utc::now()),
                    kw.notes,
                    kw.source,
                    kw.parent_keyword_id,
                    kw.performance_score,
                    kw.total_scans,
                    kw.total_deals_found,
                    kw.total_gross_profit,
                    kw.scans_since_last_deal,
                    kw.confidence,
                    opt_dt_to_sql(&kw.auto_deactivated_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn delete_keyword(&self, id: i64) -> Result<()> {
        self.with(|conn| {
            conn.execute("DELETE FROM watched_keywords WHERE id=?1", [id])?;
            Ok(())
        })
    }

    pub fn count_active_ai_keywords(&self) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM watched_keywords
                 WHERE source != 'manual' AND is_active=1",
                [],
                |r| r.get(0),
            )
        })
    }

    pub fn list_keyword_texts(&self) -> Result<Vec<String>> {
        self.with(|conn| {
            let mut stmt = conn.prepare("SELECT keyword FROM watched_keywords")?;
            let rows = stmt.query_map([], |r| r.get(0))?.collect();
            rows
        })
    }

    // --- Deal alerts ---

    /// Insert inside a savepoint so a duplicate (auction, asin) pair is
    /// a silent no-op and never poisons the surrounding transaction.
    /// Returns the stored alert, or `None` on duplicate.
    pub fn insert_alert(&self, alert: &DealAlert) -> Result<Option<DealAlert>> {
        let inserted = self.with_mut(|conn| {
            let mut sp = conn.savepoint()?;
            let result = sp.execute(
                "INSERT INTO deal_alerts (
                    keyword_id, yahoo_auction_id, amazon_asin, yahoo_title, yahoo_url,
                    yahoo_image_url, amazon_title, yahoo_price, yahoo_shipping,
                    sell_price, gross_profit, gross_margin_pct, amazon_fee_pct,
                    forwarding_cost, notified_at, status, rejection_reason,
                    rejection_note, rejected_at
                ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19)",
                params![
                    alert.keyword_id,
                    alert.yahoo_auction_id,
                    alert.amazon_asin,
                    alert.yahoo_title,
                    alert.yahoo_url,
                    alert.yahoo_image_url,
                    alert.amazon_title,
                    alert.yahoo_price,
                    alert.yahoo_shipping,
                    alert.sell_price,
                    alert.gross_profit,
                    alert.gross_margin_pct,
                    alert.amazon_fee_pct,
                    alert.forwarding_cost,
                    dt_to_sql(&alert.notified_at),
                    alert.status.as_str(),
                    alert.rejection_reason.map(|r| r.as_str()).unwrap_or(""),
                    alert.rejection_note,
                    opt_dt_to_sql(&alert.rejected_at),
                ],
            );
            match result {
                Ok(_) => {
                    let id = sp.last_insert_rowid();
                    sp.commit()?;
                    Ok(Some(id))
                }
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == rusqlite::ErrorCode::ConstraintViolation =>
                {
                    sp.rollback()?;
                    Ok(None)
                }
                Err(e) => Err(e),
            }
        })?;
        match inserted {
            Some(id) => {
                let mut out = alert.clone();
                out.id = id;
                Ok(Some(out))
            }
            None => Ok(None),
        }
    }

    pub fn get_alert(&self, id: i64) -> Result<Option<DealAlert>> {
        self.with(|conn| {
            conn.query_row(
                &format!("SELECT {ALERT_COLUMNS} FROM deal_alerts WHERE id=?1"),
                [id],
                map_alert,
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                e => Err(e),
            })
        })
    }

    pub fn alert_exists(&self, auction_id: &str, asin: &str) -> Result<bool> {
        self.with(|conn| {
            conn.query_row(
                "SELECT 1 FROM deal_alerts WHERE yahoo_auction_id=?1 AND amazon_asin=?2",
                params![auction_id, asin],
                |_| Ok(true),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                e => Err(e),
            })
        })
    }

    pub fn list_alerts(&self, status: Option<AlertStatus>, limit: u32) -> Result<Vec<DealAlert>> {
        self.with(|conn| match status {
            Some(s) => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ALERT_COLUMNS} FROM deal_alerts WHERE status=?1
                     ORDER BY notified_at DESC LIMIT ?2"
                ))?;
                let rows = stmt.query_map(params![s.as_str(), limit], map_alert)?.collect();
                rows
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "SELECT {ALERT_COLUMNS} FROM deal_alerts
                     ORDER BY notified_at DESC LIMIT ?1"
                ))?;
                let rows = stmt.query_map([limit], map_alert)?.collect();
                rows
            }
        })
    }

    pub fn list_all_alerts(&self) -> Result<Vec<DealAlert>> {
        self.with(|conn| {
            let mut stmt =
                conn.prepare(&format!("SELECT {ALERT_COLUMNS} FROM deal_alerts"))?;
            let rows = stmt.query_map([], map_alert)?.collect();
            rows
        })
    }

    /// Non-rejected alerts at or above a profit floor, best first.
    pub fn list_profitable_alerts(&self, min_profit: i64, limit: u32) -> Result<Vec<DealAlert>> {
        self.with(|conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ALERT_COLUMNS} FROM deal_alerts
                 WHERE gross_profit >= ?1 AND status != 'rejected'
                 ORDER BY gross_profit DESC LIMIT ?2"
            ))?;
            let rows = stmt.query_map(params![min_profit, limit], map_alert)?.collect();
            rows
        })
    }

    pub fn update_alert(&self, alert: &DealAlert) -> Result<()> {
        self.with(|conn| {
            conn.execute(
                "UPDATE deal_alerts SET
                    status=?2, rejection_reason=?3, rejection_note=?4, rejected_at=?5
                 WHERE id=?1",
                params![
                    alert.id,
                    alert.status.as_str(),
                    alert.rejection_reason.map(|r| r.as_str()).unwrap_or(""),
                    alert.rejection_note,
                    opt_dt_to_sql(&alert.rejected_at),
                ],
            )?;
            Ok(())
        })
    }

    /// Expire open alerts for an ended auction. Returns the count.
    pub fn expire_alerts_for_auction(&self, auction_id: &str) -> Result<usize> {
        self.with(|conn| {
            conn.execute(
                "UPDATE deal_alerts SET status='expired'
                 WHERE yahoo_auction_id=?1 AND status='active'",
                [auction_id],
            )
        })
    }

    /// Expire active alerts notified before the cutoff.
    pub fn expire_alerts_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        self.with(|conn| {
            conn.execute(
                "UPDATE deal_alerts SET status='expired'
                 WHERE status='active' AND notified_at < ?1",
                [dt_to_sql(&cutoff)],
            )
        })
    }

    pub fn count_alerts(&self) -> Result<i64> {
        self.with(|conn| conn.query_row("SELECT COUNT(*) FROM deal_alerts", [], |r| r.get(0)))
    }

    pub fn count_rejected_alerts_for_asin(&self, asin: &str) -> Result<i64> {
        self.with(|conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM deal_alerts WHERE amazon_asin=?1 AND status='rejected'",
                [asin],
                |r| r.get(0),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(keyword_id: i64, auction_id: &str, asin: &str) -> DealAlert {
        DealAlert {
            id: 0,
            keyword_id,
            yahoo_auction_id: auction_id.to_string(),
            amazon_asin: asin.to_string(),
            yahoo_title: "y".into(),
            yahoo_url: String::new(),
            yahoo_image_url: String::new(),
            amazon_title: "a".into(),
            yahoo_price: 3000,
            yahoo_shipping: 0,
            sell_price: 10_000,
            gross_profit: 5100,
            gross_margin_pct: 51.0,
            amazon_fee_pct: 10.0,
            forwarding_cost: 800,
            notified_at: Utc::now(),
            status: AlertStatus::Active,
            rejection_reason: None,
            rejection_note: String::new(),
            rejected_at: None,
        }
    }

    #[test]
    fn duplicate_alert_is_silent_noop() {
        let store = Store::open_in_memory().unwrap();
        let kw = store
            .insert_keyword(&NewKeyword::manual("dyson v8"))
            .unwrap()
            .unwrap();

        assert!(store.insert_alert(&alert(kw.id, "x1", "B0A")).unwrap().is_some());
        assert!(store.insert_alert(&alert(kw.id, "x1", "B0A")).unwrap().is_none());
        assert_eq!(store.count_alerts().unwrap(), 1);
    }

    #[test]
    fn keyword_scan_order_puts_nulls_first() {
        let store = Store::open_in_memory().unwrap();
        let mut old = store
            .insert_keyword(&NewKeyword::manual("scanned"))
            .unwrap()
            .unwrap();
        old.last_scanned_at = Some(Utc::now() - chrono::Duration::hours(1));
        store.update_keyword(&old).unwrap();
        store.insert_keyword(&NewKeyword::manual("fresh")).unwrap();

        let order = store.list_keywords_for_scan().unwrap();
        assert_eq!(order[0].keyword, "fresh");
        assert_eq!(order[1].keyword, "scanned");
    }

    #[test]
    fn expiry_targets_only_active_alerts() {
        let store = Store::open_in_memory().unwrap();
        let kw = store
            .insert_keyword(&NewKeyword::manual("sony wh"))
            .unwrap()
            .unwrap();
        let stored = store.insert_alert(&alert(kw.id, "x2", "B0B")).unwrap().unwrap();
        let mut rejected = alert(kw.id, "x2", "B0C");
        rejected.status = AlertStatus::Rejected;
        store.insert_alert(&rejected).unwrap();

        assert_eq!(store.expire_alerts_for_auction("x2").unwrap(), 1);
        assert_eq!(
            store.get_alert(stored.id).unwrap().unwrap().status,
            AlertStatus::Expired
        );
    }

    #[test]
    fn duplicate_keyword_insert_returns_none() {
        let store = Store::open_in_memory().unwrap();
        assert!(store.insert_keyword(&NewKeyword::manual("gopro hero12")).unwrap().is_some());
        assert!(store.insert_keyword(&NewKeyword::manual("gopro hero12")).unwrap().is_none());
    }
}
