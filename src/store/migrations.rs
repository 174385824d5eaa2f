//! Ordered, tracked schema migrations.
//!
//! Each step runs once, inside its own transaction, and is recorded in
//! `schema_migrations`. The sequence is append-only: released steps are
//! never edited.

use rusqlite::Connection;
use tracing::info;

const MIGRATIONS: &[(&str, &str)] = &[
    (
        "0001_monitored_items",
        r#"
        CREATE TABLE monitored_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            auction_id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            url TEXT NOT NULL DEFAULT '',
            image_url TEXT NOT NULL DEFAULT '',
            category_id TEXT NOT NULL DEFAULT '',
            seller_id TEXT NOT NULL DEFAULT '',
            current_price INTEGER NOT NULL DEFAULT 0,
            start_price INTEGER NOT NULL DEFAULT 0,
            buy_now_price INTEGER NOT NULL DEFAULT 0,
            win_price INTEGER NOT NULL DEFAULT 0,
            start_time TEXT,
            end_time TEXT,
            bid_count INTEGER NOT NULL DEFAULT 0,
            status TEXT NOT NULL DEFAULT 'active',
            check_interval_seconds INTEGER NOT NULL DEFAULT 300,
            auto_adjust_interval INTEGER NOT NULL DEFAULT 1,
            is_monitoring_active INTEGER NOT NULL DEFAULT 1,
            last_checked_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT ''
        );
        CREATE INDEX idx_items_auction_id ON monitored_items(auction_id);
        CREATE INDEX idx_items_status ON monitored_items(status);

        CREATE TABLE status_history (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL REFERENCES monitored_items(id) ON DELETE CASCADE,
            auction_id TEXT NOT NULL,
            change_type TEXT NOT NULL,
            old_status TEXT,
            new_status TEXT,
            old_price INTEGER,
            new_price INTEGER,
            old_bid_count INTEGER,
            new_bid_count INTEGER,
            recorded_at TEXT NOT NULL
        );
        CREATE INDEX idx_history_item ON status_history(item_id, recorded_at DESC);

        CREATE TABLE notification_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            item_id INTEGER NOT NULL REFERENCES monitored_items(id) ON DELETE CASCADE,
            channel TEXT NOT NULL,
            event_type TEXT NOT NULL,
            message TEXT NOT NULL DEFAULT '',
            success INTEGER NOT NULL DEFAULT 1,
            sent_at TEXT NOT NULL
        );
        CREATE INDEX idx_notification_item ON notification_log(item_id, sent_at DESC);
        "#,
    ),
    (
        "0002_watched_keywords_and_deal_alerts",
        r#"
        CREATE TABLE watched_keywords (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            keyword TEXT NOT NULL UNIQUE,
            is_active INTEGER NOT NULL DEFAULT 1,
            last_scanned_at TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            notes TEXT NOT NULL DEFAULT ''
        );

        CREATE TABLE deal_alerts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            keyword_id INTEGER NOT NULL REFERENCES watched_keywords(id) ON DELETE CASCADE,
            yahoo_auction_id TEXT NOT NULL,
            amazon_asin TEXT NOT NULL,
            yahoo_title TEXT NOT NULL DEFAULT '',
            yahoo_url TEXT NOT NULL DEFAULT '',
            yahoo_image_url TEXT NOT NULL DEFAULT '',
            amazon_title TEXT NOT NULL DEFAULT '',
            yahoo_price INTEGER NOT NULL DEFAULT 0,
            yahoo_shipping INTEGER NOT NULL DEFAULT 0,
            sell_price INTEGER NOT NULL DEFAULT 0,
            gross_profit INTEGER NOT NULL DEFAULT 0,
            gross_margin_pct REAL NOT NULL DEFAULT 0.0,
            notified_at TEXT NOT NULL,
            UNIQUE (yahoo_auction_id, amazon_asin)
        );
        CREATE INDEX idx_alerts_auction ON deal_alerts(yahoo_auction_id);
        CREATE INDEX idx_alerts_keyword ON deal_alerts(keyword_id);
        "#,
    ),
    (
        "0003_item_marketplace_block",
        r#"
        ALTER TABLE monitored_items ADD COLUMN amazon_asin TEXT;
        ALTER TABLE monitored_items ADD COLUMN amazon_sku TEXT;
        ALTER TABLE monitored_items ADD COLUMN amazon_condition TEXT NOT NULL DEFAULT 'used_very_good';
        ALTER TABLE monitored_items ADD COLUMN amazon_listing_status TEXT;
        ALTER TABLE monitored_items ADD COLUMN amazon_price INTEGER;
        ALTER TABLE monitored_items ADD COLUMN estimated_win_price INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE monitored_items ADD COLUMN shipping_cost INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE monitored_items ADD COLUMN forwarding_cost INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE monitored_items ADD COLUMN amazon_fee_pct REAL NOT NULL DEFAULT 10.0;
        ALTER TABLE monitored_items ADD COLUMN amazon_margin_pct REAL NOT NULL DEFAULT 15.0;
        ALTER TABLE monitored_items ADD COLUMN amazon_lead_time_days INTEGER NOT NULL DEFAULT 4;
        ALTER TABLE monitored_items ADD COLUMN amazon_shipping_pattern TEXT NOT NULL DEFAULT '2_3_days';
        ALTER TABLE monitored_items ADD COLUMN amazon_condition_note TEXT NOT NULL DEFAULT '';
        ALTER TABLE monitored_items ADD COLUMN amazon_last_synced_at TEXT;
        ALTER TABLE monitored_items ADD COLUMN seller_central_checklist TEXT NOT NULL DEFAULT '';
        CREATE INDEX idx_items_asin ON monitored_items(amazon_asin);
        "#,
    ),
    (
        "0004_deal_alert_costs_and_rejection",
        r#"
        ALTER TABLE deal_alerts ADD COLUMN amazon_fee_pct REAL NOT NULL DEFAULT 10.0;
        ALTER TABLE deal_alerts ADD COLUMN forwarding_cost INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE deal_alerts ADD COLUMN status TEXT NOT NULL DEFAULT 'active';
        ALTER TABLE deal_alerts ADD COLUMN rejection_reason TEXT NOT NULL DEFAULT '';
        ALTER TABLE deal_alerts ADD COLUMN rejection_note TEXT NOT NULL DEFAULT '';
        ALTER TABLE deal_alerts ADD COLUMN rejected_at TEXT;
        CREATE INDEX idx_alerts_status ON deal_alerts(status);
        "#,
    ),
    (
        "0005_ai_discovery",
        r#"
        ALTER TABLE watched_keywords ADD COLUMN source TEXT NOT NULL DEFAULT 'manual';
        ALTER TABLE watched_keywords ADD COLUMN parent_keyword_id INTEGER REFERENCES watched_keywords(id);
        ALTER TABLE watched_keywords ADD COLUMN performance_score REAL NOT NULL DEFAULT 0.0;
        ALTER TABLE watched_keywords ADD COLUMN total_scans INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE watched_keywords ADD COLUMN total_deals_found INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE watched_keywords ADD COLUMN total_gross_profit INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE watched_keywords ADD COLUMN scans_since_last_deal INTEGER NOT NULL DEFAULT 0;
        ALTER TABLE watched_keywords ADD COLUMN confidence REAL NOT NULL DEFAULT 1.0;
        ALTER TABLE watched_keywords ADD COLUMN auto_deactivated_at TEXT;

        CREATE TABLE keyword_candidates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            keyword TEXT NOT NULL,
            strategy TEXT NOT NULL DEFAULT '',
            confidence REAL NOT NULL DEFAULT 0.0,
            parent_keyword_id INTEGER REFERENCES watched_keywords(id),
            reasoning TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'pending',
            validation_result TEXT NOT NULL DEFAULT '',
            created_at TEXT NOT NULL,
            resolved_at TEXT
        );
        CREATE INDEX idx_candidates_status ON keyword_candidates(status);
        CREATE INDEX idx_candidates_keyword ON keyword_candidates(keyword);

        CREATE TABLE discovery_log (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            status TEXT NOT NULL DEFAULT 'running',
            candidates_generated INTEGER NOT NULL DEFAULT 0,
            candidates_validated INTEGER NOT NULL DEFAULT 0,
            keywords_added INTEGER NOT NULL DEFAULT 0,
            keywords_deactivated INTEGER NOT NULL DEFAULT 0,
            keepa_tokens_used INTEGER NOT NULL DEFAULT 0,
            strategy_breakdown TEXT NOT NULL DEFAULT '{}',
            error_message TEXT NOT NULL DEFAULT ''
        );
        "#,
    ),
    (
        "0006_rejection_patterns",
        r#"
        CREATE TABLE rejection_patterns (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            pattern_type TEXT NOT NULL,
            pattern_key TEXT NOT NULL DEFAULT '',
            pattern_data TEXT NOT NULL DEFAULT '{}',
            hit_count INTEGER NOT NULL DEFAULT 1,
            confidence REAL NOT NULL DEFAULT 0.5,
            is_active INTEGER NOT NULL DEFAULT 1,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            UNIQUE (pattern_type, pattern_key)
        );
        CREATE INDEX idx_patterns_type ON rejection_patterns(pattern_type);
        "#,
    ),
    (
        "0007_condition_templates_and_presets",
        r#"
        CREATE TABLE condition_templates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            condition_type TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL DEFAULT '',
            updated_at TEXT NOT NULL
        );

        CREATE TABLE listing_presets (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            asin TEXT NOT NULL,
            condition TEXT NOT NULL,
            condition_note TEXT NOT NULL DEFAULT '',
            shipping_pattern TEXT NOT NULL DEFAULT '2_3_days',
            created_at TEXT NOT NULL
        );
        CREATE INDEX idx_presets_asin ON listing_presets(asin);
        "#,
    ),
];

pub fn run(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_migrations (
            name TEXT PRIMARY KEY,
            applied_at TEXT NOT NULL
        );",
    )?;

    for (name, sql) in MIGRATIONS {
        let applied: bool = conn
            .query_row(
                "SELECT 1 FROM schema_migrations WHERE name = ?1",
                [name],
                |_| Ok(true),
            )
            .unwrap_or(false);
        if applied {
            continue;
        }

        conn.execute_batch(&format!("BEGIN;\n{sql}\nCOMMIT;"))?;
        conn.execute(
            "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)",
            rusqlite::params![name, chrono::Utc::now().to_rfc3339()],
        )?;
        info!(migration = name, "Applied migration");
    }
    Ok(())
}
