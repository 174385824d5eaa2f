//! The explicit service registry handed to the HTTP surface and the
//! background jobs. Everything optional degrades gracefully when its
//! credentials are absent.

use std::sync::Arc;

use crate::ai::DiscoveryEngine;
use crate::amazon::SpApiClient;
use crate::config::Config;
use crate::keepa::KeepaClient;
use crate::matcher::MatcherOverrides;
use crate::monitor::{DealScanner, Scheduler};
use crate::scraper::AuctionScraper;
use crate::store::Store;

pub struct Services {
    pub config: Config,
    pub store: Arc<Store>,
    pub scraper: Arc<AuctionScraper>,
    pub keepa: Option<Arc<KeepaClient>>,
    pub sp_api: Option<Arc<SpApiClient>>,
    pub overrides: Arc<MatcherOverrides>,
    pub scheduler: Arc<Scheduler>,
    pub deal_scanner: Option<Arc<DealScanner>>,
    pub discovery_engine: Option<Arc<DiscoveryEngine>>,
}
