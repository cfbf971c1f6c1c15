//! Library behind the `mango-dl` command line tool.
//!
//! Manga are scraped from a [source](sources) into a [Manga](models::Manga), stored in a
//! [Cache](cache::Cache) under the hash of their url, and their chapters are downloaded
//! page by page with a [Downloader](downloader::Downloader). Every network request goes
//! through one shared [RateLimiter](requests::limiter::RateLimiter).

pub mod cache;
pub mod config;
pub mod downloader;
pub mod error;
pub mod hash;
pub mod models;
pub mod requests;
pub mod sources;

mod fs_utils;

pub use error::{Error, Result};

use requests::limiter::RateLimiter;

use std::sync::Arc;

/// HTTP client used by the sources and the downloader. Cloning is cheap and clones share
/// both the connection pool and the [RateLimiter]
#[derive(Debug, Clone)]
pub struct MangoClient {
    pub(crate) client: reqwest_middleware::ClientWithMiddleware,
    pub(crate) limiter: Arc<RateLimiter>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use config::Config;

    #[test]
    fn test_clients_share_limiter() {
        let config = Config {
            max_concurrent: 3,
            ..Default::default()
        };
        let limiter = Arc::new(config.rate_limiter());

        let client = MangoClient::from_config(&config, Arc::clone(&limiter)).unwrap();
        let other = client.clone();

        assert!(Arc::ptr_eq(client.limiter(), other.limiter()));
        assert_eq!(other.limiter().max_in_flight(), 3);
    }
}
