//! SQLite persistence layer.
//!
//! One connection behind a `parking_lot::Mutex`; jobs run on the tokio
//! runtime but every statement here is short-lived, so the lock is held
//! only for microseconds at a time. WAL journaling plus a 30-second
//! busy timeout let the dashboard read while a scan cycle writes.

mod discovery;
mod items;
mod keywords;
mod migrations;

pub use keywords::NewKeyword;

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::Connection;
use tracing::warn;

pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open (or create) the database, apply pragmas and run migrations.
    /// Migration failure is fatal by design: the process must not start
    /// against a half-upgraded schema.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database at {path}"))?;
        Self::init(conn)
    }

    /// In-memory database for tests.
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.pragma_update(None, "journal_mode", "WAL").ok();
        conn.pragma_update(None, "busy_timeout", 30_000)
            .context("Failed to set busy_timeout")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("Failed to enable foreign keys")?;

        let store = Self {
            conn: Mutex::new(conn),
        };
        migrations::run(&store.conn.lock()).context("Database migration failed")?;
        Ok(store)
    }

    /// Run a closure against the connection.
    pub(crate) fn with<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let conn = self.conn.lock();
        Ok(f(&conn)?)
    }

    /// Run a closure against a mutable connection (transactions).
    pub(crate) fn with_mut<T>(
        &self,
        f: impl FnOnce(&mut Connection) -> rusqlite::Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        Ok(f(&mut conn)?)
    }

    /// Operator-initiated writes retry a few times when the writer slot
    /// is taken, then give up with the underlying error.
    pub async fn retry_busy<T>(&self, mut f: impl FnMut() -> Result<T>) -> Result<T> {
        const ATTEMPTS: u32 = 3;
        for attempt in 1..=ATTEMPTS {
            match f() {
                Ok(v) => return Ok(v),
                Err(e) if is_busy(&e) && attempt < ATTEMPTS => {
                    warn!(attempt, "Database busy, retrying in 1s");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(e) => return Err(e),
            }
        }
        unreachable!()
    }
}

fn is_busy(e: &anyhow::Error) -> bool {
    matches!(
        e.downcast_ref::<rusqlite::Error>(),
        Some(rusqlite::Error::SqliteFailure(err, _))
            if err.code == rusqlite::ErrorCode::DatabaseBusy
                || err.code == rusqlite::ErrorCode::DatabaseLocked
    )
}

// Datetime columns are RFC 3339 TEXT.

pub(crate) fn dt_to_sql(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn opt_dt_to_sql(dt: &Option<DateTime<Utc>>) -> Option<String> {
    dt.as_ref().map(dt_to_sql)
}

pub(crate) fn dt_from_sql(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|d| d.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

pub(crate) fn opt_dt_from_sql(s: Option<String>) -> Option<DateTime<Utc>> {
    s.as_deref().map(dt_from_sql)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_and_migrate_in_memory() {
        let store = Store::open_in_memory().unwrap();
        // Re-running migrations on an up-to-date schema is a no-op
        store
            .with(|conn| {
                conn.query_row("SELECT COUNT(*) FROM schema_migrations", [], |r| {
                    r.get::<_, i64>(0)
                })
            })
            .unwrap();
    }

    #[test]
    fn datetime_round_trip() {
        let now = Utc::now();
        let s = dt_to_sql(&now);
        let back = dt_from_sql(&s);
        assert_eq!(now.timestamp_millis(), back.timestamp_millis());
    }
}
