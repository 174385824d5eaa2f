//! Marketplace SP-API integration: listing lifecycle, feeds, orders,
//! fees, and the reconciliation jobs built on top of them.

pub mod client;
pub mod listing_sync;
pub mod notifier;
pub mod order_monitor;
pub mod pricing;

use thiserror::Error;

pub use client::SpApiClient;
pub use listing_sync::ListingSyncChecker;
pub use notifier::AmazonNotifier;
pub use order_monitor::OrderMonitor;

#[derive(Debug, Error)]
pub enum AmazonApiError {
    #[error("SP-API error (status {status:?}): {message}")]
    Api {
        message: String,
        status: Option<u16>,
    },
    #[error("SP-API transport error: {0}")]
    Transport(#[from] reqwest::Error),
}

impl AmazonApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            AmazonApiError::Api { status, .. } => *status,
            AmazonApiError::Transport(e) => e.status().map(|s| s.as_u16()),
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}
