//! Auction-site scraping orchestrator.

pub mod client;
pub mod parser;

use anyhow::Result;
use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::models::ItemStatus;
pub use client::{auction_url, AuctionClient, ScrapeError};
use parser::{AuctionPageParser, SearchResultsParser};

/// Parsed state of one auction page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuctionSnapshot {
    pub auction_id: String,
    pub title: String,
    pub url: String,
    pub image_url: String,
    pub category_id: String,
    pub seller_id: String,
    pub current_price: i64,
    pub start_price: i64,
    pub buy_now_price: i64,
    pub win_price: i64,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub bid_count: i64,
    pub is_closed: bool,
    pub has_winner: bool,
}

impl AuctionSnapshot {
    pub fn status(&self) -> ItemStatus {
        if !self.is_closed {
            ItemStatus::Active
        } else if self.has_winner {
            ItemStatus::EndedSold
        } else {
            ItemStatus::EndedNoWinner
        }
    }
}

/// One row of a search results page.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResultItem {
    pub auction_id: String,
    pub title: String,
    pub url: String,
    pub image_url: String,
    pub current_price: i64,
    pub buy_now_price: i64,
    pub start_price: i64,
    pub bid_count: i64,
    pub end_time: Option<DateTime<Utc>>,
    pub seller_id: String,
    pub category_id: String,
    /// `None` = unknown / cash on delivery, 0 = free shipping.
    pub shipping_cost: Option<i64>,
}

lazy_static! {
    static ref AUCTION_ID_RE: Regex = Regex::new(r"([a-zA-Z]?\d{7,})").unwrap();
}

/// Extract an auction id from a URL or raw id string.
pub fn extract_auction_id(input: &str) -> Option<String> {
    AUCTION_ID_RE.captures(input).map(|c| c[1].to_string())
}

pub struct AuctionScraper {
    client: AuctionClient,
}

impl AuctionScraper {
    pub fn new(client: AuctionClient) -> Self {
        Self { client }
    }

    /// Fetch and parse one auction page.
    ///
    /// A 404/410 means the page was removed: returns a synthetic closed
    /// snapshot with no winner so the monitor can expire the item
    /// without treating the fetch as an error. `None` means the page
    /// fetched but did not parse.
    pub async fn fetch_auction(&self, auction_id: &str) -> Result<Option<AuctionSnapshot>> {
        let html = match self.client.fetch_auction_page(auction_id).await {
            Ok(html) => html,
            Err(ScrapeError::Gone { .. }) => {
                info!(auction_id, "Auction removed (404/410), treating as ended");
                return Ok(Some(AuctionSnapshot {
                    auction_id: auction_id.to_string(),
                    url: auction_url(auction_id),
                    is_closed: true,
                    has_winner: false,
                    ..Default::default()
                }));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(AuctionPageParser::parse(&html))
    }

    /// All product image URLs from an auction page.
    pub async fn fetch_auction_images(&self, auction_id: &str) -> Result<Vec<String>> {
        let html = self.client.fetch_auction_page(auction_id).await?;
        Ok(AuctionPageParser::extract_all_images(&html))
    }

    /// Seller description text. One HTTP request per call; reserve it
    /// for secondary validation of high-value candidates.
    pub async fn fetch_auction_description(&self, auction_id: &str) -> Result<String> {
        let html = self.client.fetch_auction_page(auction_id).await?;
        Ok(AuctionPageParser::extract_description(&html))
    }

    /// One page of search results (50 per page).
    pub async fn search(&self, query: &str, page: u32) -> Result<Vec<SearchResultItem>> {
        let html = self.client.fetch_search_page(query, page).await?;
        Ok(SearchResultsParser::parse(&html))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auction_id_extraction() {
        assert_eq!(
            extract_auction_id("https://auctions.yahoo.co.jp/jp/auction/x1012345678"),
            Some("x1012345678".to_string())
        );
        assert_eq!(
            extract_auction_id("b2087654321"),
            Some("b2087654321".to_string())
        );
        assert_eq!(extract_auction_id("not-an-id"), None);
    }

    #[test]
    fn snapshot_status_derivation() {
        let mut snap = AuctionSnapshot::default();
        assert_eq!(snap.status(), ItemStatus::Active);
        snap.is_closed = true;
        assert_eq!(snap.status(), ItemStatus::EndedNoWinner);
        snap.has_winner = true;
        assert_eq!(snap.status(), ItemStatus::EndedSold);
    }
}
