//! Auction→marketplace arbitrage discovery backend.
//!
//! Core pieces: the product matcher, the Keepa-style analytics client
//! and deal scorer, the auction scraper, the SP-API facade, the
//! periodic scheduler (monitor loop, deal scanner, discovery engine,
//! listing reconciliation, order polling), the rejection learner, and
//! the SQLite store tying them together.

pub mod ai;
pub mod amazon;
pub mod api;
pub mod config;
pub mod keepa;
pub mod matcher;
pub mod models;
pub mod monitor;
pub mod notifier;
pub mod scraper;
pub mod services;
pub mod store;

pub use config::Config;
pub use services::Services;
