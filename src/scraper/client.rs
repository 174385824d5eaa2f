//! HTTP client for the auction site, with an optional headless-browser
//! fallback for blocked fetches.

use std::sync::{Arc, OnceLock};

use headless_chrome::{Browser, LaunchOptions};
use parking_lot::Mutex;
use reqwest::Client;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub const AUCTION_ITEM_URL: &str = "https://auctions.yahoo.co.jp/jp/auction/{}";
const SEARCH_URL: &str = "https://auctions.yahoo.co.jp/search/search";

pub fn auction_url(auction_id: &str) -> String {
    AUCTION_ITEM_URL.replace("{}", auction_id)
}

#[derive(Debug, Error)]
pub enum ScrapeError {
    /// 404/410: the auction page is gone. The monitor treats this as a
    /// silent termination without a known winner, not as a failure.
    #[error("Auction gone (HTTP {status}): {url}")]
    Gone { url: String, status: u16 },
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },
    #[error("Request error: {0}")]
    Transport(#[from] reqwest::Error),
}

pub struct AuctionClient {
    client: Client,
    use_browser_fallback: bool,
}

// One shared browser process, launched on first use.
static BROWSER: OnceLock<Mutex<Option<Arc<Browser>>>> = OnceLock::new();

impl AuctionClient {
    pub fn new(
        user_agent: &str,
        timeout_secs: u64,
        use_browser_fallback: bool,
    ) -> anyhow::Result<Self> {
        let client = Client::builder()
            .user_agent(user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .default_headers({
                let mut headers = reqwest::header::HeaderMap::new();
                headers.insert(
                    reqwest::header::ACCEPT,
                    "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8"
                        .parse()
                        .expect("static header"),
                );
                headers.insert(
                    reqwest::header::ACCEPT_LANGUAGE,
                    "ja,en-US;q=0.7,en;q=0.3".parse().expect("static header"),
                );
                headers
            })
            .build()?;
        Ok(Self {
            client,
            use_browser_fallback,
        })
    }

    pub async fn fetch_auction_page(&self, auction_id: &str) -> Result<String, ScrapeError> {
        self.fetch(&auction_url(auction_id), &[]).await
    }

    pub async fn fetch_search_page(&self, query: &str, page: u32) -> Result<String, ScrapeError> {
        let offset = ((page.max(1) - 1) * 50 + 1).to_string();
        let params = [
            ("p", query.to_string()),
            ("b", offset),
            ("n", "50".to_string()),
        ];
        self.fetch(SEARCH_URL, &params).await
    }

    async fn fetch(&self, url: &str, params: &[(&str, String)]) -> Result<String, ScrapeError> {
        let resp = match self.client.get(url).query(params).send().await {
            Ok(resp) => resp,
            Err(e) => {
                warn!(url, error = %e, "Request error");
                return self.fallback_or(url, ScrapeError::Transport(e)).await;
            }
        };

        let status = resp.status();
        if status.is_success() {
            return Ok(resp.text().await?);
        }
        warn!(url, status = status.as_u16(), "HTTP error");
        if status.as_u16() == 404 || status.as_u16() == 410 {
            return Err(ScrapeError::Gone {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        self.fallback_or(
            url,
            ScrapeError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            },
        )
        .await
    }

    async fn fallback_or(&self, url: &str, err: ScrapeError) -> Result<String, ScrapeError> {
        if !self.use_browser_fallback {
            return Err(err);
        }
        let url = url.to_string();
        // headless_chrome is a blocking API; keep it off the event loop
        let fetched = tokio::task::spawn_blocking(move || browser_fetch(&url)).await;
        match fetched {
            Ok(Some(html)) => Ok(html),
            _ => Err(err),
        }
    }
}

fn browser_fetch(url: &str) -> Option<String> {
    let mutex = BROWSER.get_or_init(|| Mutex::new(None));
    let browser = {
        let mut guard = mutex.lock();
        match guard.as_ref() {
            Some(b) if b.get_version().is_ok() => Arc::clone(b),
            _ => {
                info!("Launching headless browser for blocked fetch");
                let launched = LaunchOptions::default_builder()
                    .headless(true)
                    .sandbox(false)
                    .idle_browser_timeout(Duration::from_secs(300))
                    .build()
                    .ok()
                    .and_then(|opts| Browser::new(opts).ok())
                    .map(Arc::new);
                match launched {
                    Some(b) => {
                        *guard = Some(Arc::clone(&b));
                        b
                    }
                    None => {
                        warn!("Headless browser launch failed; cannot use fallback");
                        return None;
                    }
                }
            }
        }
    };

    let tab = browser.new_tab().ok()?;
    tab.navigate_to(url).ok()?;
    tab.wait_until_navigated().ok()?;
    let html = tab.get_content().ok();
    tab.close(true).ok();
    html
}
