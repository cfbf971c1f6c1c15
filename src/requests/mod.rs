//! HTTP plumbing: the rate limited client, page fetching and retries

pub mod limiter;
pub mod media;
pub mod query_utils;

use crate::config::Config;
use crate::error::{Error, Result, ServerResponseError};
use crate::MangoClient;
use limiter::RateLimiter;
use query_utils::{Query, ResponseResultOk as _};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use serde_json::Value;

use std::sync::Arc;
use std::time::Duration;

/// A fetched resource
#[derive(Debug, Clone)]
pub struct Page {
    pub bytes: Bytes,
    pub content_type: Option<String>,
}

impl Page {
    pub fn extension(&self) -> &'static str {
        media::infer_extension(&self.bytes, self.content_type.as_deref())
    }
}

/// Fetches one resource. This is the seam the downloader talks to, admission through the
/// [RateLimiter] and retries happen around it
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<Page>;
}

/// How often and how patiently a failed fetch is retried
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub retries: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const MAX_BACKOFF: Duration = Duration::from_secs(30);

    pub fn none() -> Self {
        Self {
            retries: 0,
            backoff: Duration::ZERO,
        }
    }

    /// Delay before retry number `attempt` (starting at 0)
    pub fn delay(&self, attempt: u32) -> Duration {
        self.backoff
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(Self::MAX_BACKOFF)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Fetches `url` through `limiter`, retrying transient failures with exponential backoff.
/// Every attempt is admitted separately
#[tracing::instrument(skip(fetcher, limiter))]
pub async fn fetch_with_retry(
    fetcher: &dyn Fetch,
    limiter: &RateLimiter,
    retry: RetryPolicy,
    url: &str,
) -> Result<Page> {
    let mut attempt = 0;

    loop {
        let result = {
            let _admission = limiter.acquire().await;
            fetcher.fetch(url).await
        };

        match result {
            Ok(page) => return Ok(page),
            Err(e) if e.is_transient() && attempt < retry.retries => {
                let delay = retry.delay(attempt);
                tracing::warn!("attempt {} failed: {e}, retrying in {delay:?}", attempt + 1);

                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(e) if e.is_transient() => {
                return Err(match e {
                    e @ (Error::TransportFailure { .. } | Error::HttpStatus { .. }) => e,
                    e => Error::TransportFailure {
                        url: url.to_owned(),
                        reason: e.to_string(),
                    },
                })
            }
            Err(e) => return Err(e),
        }
    }
}

impl MangoClient {
    pub const USER_AGENT: &'static str = concat!("mango-dl/", env!("CARGO_PKG_VERSION"));
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

    /// Client with default settings and its own [RateLimiter]
    pub fn new() -> Result<Self> {
        Self::with_limiter(
            Arc::new(RateLimiter::default()),
            Self::USER_AGENT,
            Self::DEFAULT_TIMEOUT,
        )
    }

    /// Client sharing `limiter` with the rest of the process
    pub fn with_limiter(
        limiter: Arc<RateLimiter>,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(reqwest_tracing::TracingMiddleware::default())
            .build();

        Ok(Self { client, limiter })
    }

    pub fn from_config(config: &Config, limiter: Arc<RateLimiter>) -> Result<Self> {
        Self::with_limiter(limiter, &config.user_agent, config.timeout())
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Lowest level function that executes arbitrary [Query] and returns its JSON response.
    /// The limiter admission is held until the whole body is read
    #[tracing::instrument(skip(self))]
    pub async fn query(&self, base_url: &str, query: &impl Query) -> Result<Value> {
        let query_data = serde_qs::to_string(query)?;

        let url = if query_data.is_empty() {
            base_url.to_owned()
        } else {
            format!("{base_url}?{query_data}")
        };

        let _admission = self.limiter.acquire().await;
        let resp = self.client.get(url).send().await?;

        Ok(resp.json().await?)
    }

    /// Executes the query and deserializes the `data` member of the JSON response
    pub async fn get_data<T: DeserializeOwned>(
        &self,
        base_url: &str,
        query: &impl Query,
    ) -> Result<T> {
        let resp = self.query(base_url, query).await?;

        Self::parse_respond_data(resp)
    }

    /// Executes the query and deserializes the whole JSON response
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        base_url: &str,
        query: &impl Query,
    ) -> Result<T> {
        let resp = self.query(base_url, query).await?;

        if resp.response_result_ok()? {
            Ok(serde_json::from_value(resp)?)
        } else {
            Err(Self::response_errors(resp))
        }
    }

    /// Deserializes the `data` member of a response, or the errors the server reported
    pub fn parse_respond_data<T: DeserializeOwned>(mut resp: Value) -> Result<T> {
        if resp.response_result_ok()? {
            let data = match resp.get_mut("data") {
                Some(d) => d,
                None => return Err(Error::ParseError),
            };

            Ok(serde_json::from_value::<T>(data.take())?)
        } else {
            Err(Self::response_errors(resp))
        }
    }

    fn response_errors(mut resp: Value) -> Error {
        let errors = match resp.get_mut("errors") {
            Some(errors) => errors.take(),
            None => return Error::ParseError,
        };

        match serde_json::from_value::<Vec<ServerResponseError>>(errors) {
            Ok(errors) => {
                tracing::warn!("got {errors:?} from server");
                Error::ServerError(errors)
            }
            Err(e) => Error::JsonError(e),
        }
    }
}

#[async_trait]
impl Fetch for MangoClient {
    async fn fetch(&self, url: &str) -> Result<Page> {
        tracing::debug!("fetching {url}");

        let failure = |reason: String| Error::TransportFailure {
            url: url.to_owned(),
            reason,
        };

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| failure(e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(Error::HttpStatus {
                url: url.to_owned(),
                status: status.as_u16(),
            });
        }

        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned);

        let bytes = resp.bytes().await.map_err(|e| failure(e.to_string()))?;

        Ok(Page {
            bytes,
            content_type,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use parking_lot::Mutex;
    use serde_json::json;

    /// Fails with a transport error a fixed number of times before succeeding
    struct Flaky {
        failures: Mutex<u32>,
    }

    #[async_trait]
    impl Fetch for Flaky {
        async fn fetch(&self, url: &str) -> Result<Page> {
            let mut failures = self.failures.lock();

            if *failures > 0 {
                *failures -= 1;
                return Err(Error::TransportFailure {
                    url: url.to_owned(),
                    reason: "connection reset".to_owned(),
                });
            }

            Ok(Page {
                bytes: Bytes::from_static(b"ok"),
                content_type: None,
            })
        }
    }

    /// Always answers with `status`, counting the attempts
    struct Status {
        status: u16,
        attempts: Mutex<u32>,
    }

    impl Status {
        fn new(status: u16) -> Self {
            Self {
                status,
                attempts: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl Fetch for Status {
        async fn fetch(&self, url: &str) -> Result<Page> {
            *self.attempts.lock() += 1;

            Err(Error::HttpStatus {
                url: url.to_owned(),
                status: self.status,
            })
        }
    }

    struct Broken;

    #[async_trait]
    impl Fetch for Broken {
        async fn fetch(&self, _url: &str) -> Result<Page> {
            Err(Error::ParseError)
        }
    }

    fn retry(retries: u32) -> RetryPolicy {
        RetryPolicy {
            retries,
            backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_backoff_grows_and_caps() {
        let policy = RetryPolicy {
            retries: 10,
            backoff: Duration::from_millis(100),
        };

        assert_eq!(policy.delay(0), Duration::from_millis(100));
        assert_eq!(policy.delay(2), Duration::from_millis(400));
        assert_eq!(policy.delay(20), RetryPolicy::MAX_BACKOFF);
    }

    #[tokio::test]
    async fn test_retry_recovers() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let fetcher = Flaky {
            failures: Mutex::new(2),
        };

        let page = fetch_with_retry(&fetcher, &limiter, retry(2), "https://example.com/1.png")
            .await
            .unwrap();

        assert_eq!(page.bytes.as_ref(), b"ok");
    }

    #[tokio::test]
    async fn test_retry_exhausted() {
        let limiter = RateLimiter::new(1, Duration::ZERO);
        let fetcher = Flaky {
            failures: Mutex::new(3),
        };

        let err = fetch_with_retry(&fetcher, &limiter, retry(2), "https://example.com/1.png")
            .await
            .unwrap_err();

        match err {
            Error::TransportFailure { url, .. } => assert_eq!(url, "https://example.com/1.png"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_permanent_errors_are_not_retried() {
        let limiter = RateLimiter::new(1, Duration::ZERO);

        let err = fetch_with_retry(&Broken, &limiter, retry(5), "https://example.com/1.png")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::ParseError));
    }

    #[tokio::test]
    async fn test_client_errors_are_not_retried() {
        let limiter = RateLimiter::new(1, Duration::ZERO);

        for status in [403, 404] {
            let fetcher = Status::new(status);
            let err = fetch_with_retry(&fetcher, &limiter, retry(3), "https://example.com/1.png")
                .await
                .unwrap_err();

            assert!(matches!(err, Error::HttpStatus { status: s, .. } if s == status));
            assert_eq!(*fetcher.attempts.lock(), 1);
        }
    }

    #[tokio::test]
    async fn test_server_errors_are_retried() {
        let limiter = RateLimiter::new(1, Duration::ZERO);

        for status in [429, 503] {
            let fetcher = Status::new(status);
            let err = fetch_with_retry(&fetcher, &limiter, retry(3), "https://example.com/1.png")
                .await
                .unwrap_err();

            assert!(matches!(err, Error::HttpStatus { status: s, .. } if s == status));
            assert_eq!(*fetcher.attempts.lock(), 4);
        }
    }

    #[tokio::test]
    async fn test_query_holds_admission_until_body_is_read() {
        use query_utils::EmptyQuery;
        use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (release, released) = tokio::sync::oneshot::channel::<()>();

        // sends the headers and half the body, the rest once released
        let server = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await.unwrap();

            let body = br#"{"result":"ok","data":[1,2]}"#;
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n",
                body.len()
            );
            socket.write_all(head.as_bytes()).await.unwrap();
            socket.write_all(&body[..10]).await.unwrap();
            socket.flush().await.unwrap();

            released.await.unwrap();
            socket.write_all(&body[10..]).await.unwrap();
            socket.flush().await.unwrap();
        });

        let client = MangoClient::with_limiter(
            Arc::new(RateLimiter::new(1, Duration::ZERO)),
            MangoClient::USER_AGENT,
            MangoClient::DEFAULT_TIMEOUT,
        )
        .unwrap();

        let data = {
            let client = client.clone();
            let url = format!("http://{addr}/manga");
            tokio::spawn(async move { client.get_data::<Vec<u32>>(&url, &EmptyQuery {}).await })
        };

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(client.limiter().in_flight(), 1);

        release.send(()).unwrap();
        assert_eq!(data.await.unwrap().unwrap(), vec![1, 2]);
        assert_eq!(client.limiter().in_flight(), 0);

        server.await.unwrap();
    }

    #[test]
    fn test_parse_respond_data() {
        let data: Vec<u32> =
            MangoClient::parse_respond_data(json!({"result": "ok", "data": [1, 2]})).unwrap();
        assert_eq!(data, vec![1, 2]);

        let err = MangoClient::parse_respond_data::<Vec<u32>>(json!({
            "result": "error",
            "errors": [{"id": "x", "status": 404, "title": "Not Found", "detail": null, "context": null}],
        }))
        .unwrap_err();

        assert!(matches!(err, Error::ServerError(ref errors) if errors[0].status == 404));
        assert_eq!(err.to_string(), "404 server response");
    }
}
