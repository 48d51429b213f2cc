use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, ACCEPT_LANGUAGE};
use reqwest::StatusCode;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::warn;

use crate::config::FetchConfig;

#[derive(Debug, Error)]
pub enum FetchError {
    /// Definitive HTTP error (404 and friends); never retried.
    #[error("HTTP {status} for {url}")]
    Status { url: String, status: StatusCode },
    /// Request could not be built at all (malformed URL etc.).
    #[error("bad request for {url}: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    /// Transient failures outlasted the retry budget.
    #[error("gave up on {url} after {attempts} attempts: {last}")]
    Exhausted {
        url: String,
        attempts: u32,
        last: String,
    },
}

/// Retry on rate limiting and server-side blips, not on client errors.
fn is_transient(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

enum AttemptError {
    Retry(String),
    Fatal(FetchError),
}

/// Bounded-concurrency HTTP client with retry, backoff and a politeness
/// delay. All outbound traffic for one run goes through a single
/// `Fetcher`, so the semaphore is the global in-flight cap.
pub struct Fetcher {
    client: reqwest::Client,
    semaphore: Arc<Semaphore>,
    cfg: FetchConfig,
}

impl Fetcher {
    pub fn new(cfg: FetchConfig) -> anyhow::Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/json;q=0.9,*/*;q=0.8",
            ),
        );
        headers.insert(
            ACCEPT_LANGUAGE,
            HeaderValue::from_static("az-AZ,az;q=0.9,ru;q=0.7,en;q=0.5"),
        );

        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent(cfg.user_agent.as_str())
            .default_headers(headers)
            .gzip(true)
            .build()?;

        Ok(Self {
            client,
            semaphore: Arc::new(Semaphore::new(cfg.concurrency)),
            cfg,
        })
    }

    pub async fn get(&self, url: &str) -> Result<String, FetchError> {
        self.request(url, None).await
    }

    /// Form-encoded POST; some phone-reveal endpoints only answer POST.
    pub async fn post_form(
        &self,
        url: &str,
        form: &[(String, String)],
    ) -> Result<String, FetchError> {
        self.request(url, Some(form)).await
    }

    async fn request(
        &self,
        url: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<String, FetchError> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .expect("fetch semaphore closed");

        let mut last = String::new();
        for attempt in 0..self.cfg.max_retries {
            match self.attempt(url, form).await {
                Ok(body) => {
                    // Hold the slot through the politeness window so one
                    // permit cannot fire faster than the configured floor.
                    tokio::time::sleep(self.politeness_delay()).await;
                    return Ok(body);
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retry(msg)) => {
                    last = msg;
                    if attempt + 1 < self.cfg.max_retries {
                        let backoff = self.backoff_delay(attempt);
                        warn!(
                            "transient failure on {} (attempt {}/{}): {}; backing off {:.1}s",
                            url,
                            attempt + 1,
                            self.cfg.max_retries,
                            last,
                            backoff.as_secs_f64()
                        );
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts: self.cfg.max_retries,
            last,
        })
    }

    async fn attempt(
        &self,
        url: &str,
        form: Option<&[(String, String)]>,
    ) -> Result<String, AttemptError> {
        let request = match form {
            Some(fields) => self.client.post(url).form(fields),
            None => self.client.get(url),
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) if e.is_builder() => {
                return Err(AttemptError::Fatal(FetchError::Request {
                    url: url.to_string(),
                    source: e,
                }));
            }
            // Timeouts, resets and DNS blips all get another attempt.
            Err(e) => return Err(AttemptError::Retry(e.to_string())),
        };

        let status = response.status();
        if status.is_success() {
            response
                .text()
                .await
                .map_err(|e| AttemptError::Retry(e.to_string()))
        } else if is_transient(status) {
            Err(AttemptError::Retry(format!("HTTP {status}")))
        } else {
            Err(AttemptError::Fatal(FetchError::Status {
                url: url.to_string(),
                status,
            }))
        }
    }

    /// `base * 2^attempt` plus up to half a second of jitter.
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let base = self.cfg.backoff_base * 2u32.saturating_pow(attempt);
        base + Duration::from_millis(rand::thread_rng().gen_range(0..500))
    }

    fn politeness_delay(&self) -> Duration {
        let (lo, hi) = (
            self.cfg.delay_min.as_millis() as u64,
            self.cfg.delay_max.as_millis() as u64,
        );
        Duration::from_millis(rand::thread_rng().gen_range(lo..=hi.max(lo)))
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::testutil::{self, TestServer};

    fn fetcher() -> Fetcher {
        Fetcher::new(FetchConfig::default()).unwrap()
    }

    /// Millisecond-scale delays so retry tests run in well under a second.
    fn fast_cfg() -> FetchConfig {
        FetchConfig {
            concurrency: 4,
            max_retries: 3,
            timeout: Duration::from_secs(5),
            backoff_base: Duration::from_millis(5),
            delay_min: Duration::from_millis(1),
            delay_max: Duration::from_millis(2),
            ..FetchConfig::default()
        }
    }

    #[tokio::test]
    async fn recovers_after_rate_limiting() {
        let server = TestServer::start(HashMap::from([(
            "/flaky".to_string(),
            vec![
                testutil::status(429),
                testutil::status(429),
                testutil::ok("done"),
            ],
        )]))
        .await;

        let f = Fetcher::new(fast_cfg()).unwrap();
        let body = f.get(&server.url("/flaky")).await.unwrap();
        assert_eq!(body, "done");
        assert_eq!(server.hits("/flaky"), 3);
    }

    #[tokio::test]
    async fn always_failing_target_is_exhausted() {
        let server = TestServer::start(HashMap::from([(
            "/down".to_string(),
            vec![testutil::status(500)],
        )]))
        .await;

        let f = Fetcher::new(fast_cfg()).unwrap();
        match f.get(&server.url("/down")).await {
            Err(FetchError::Exhausted { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(server.hits("/down"), 3);
    }

    #[tokio::test]
    async fn not_found_fails_without_retry() {
        let server = TestServer::start(HashMap::new()).await;

        let f = Fetcher::new(fast_cfg()).unwrap();
        match f.get(&server.url("/missing")).await {
            Err(FetchError::Status { status, .. }) => {
                assert_eq!(status, StatusCode::NOT_FOUND);
            }
            other => panic!("expected Status, got {other:?}"),
        }
        assert_eq!(server.hits("/missing"), 1);
    }

    #[tokio::test]
    async fn post_form_reaches_the_endpoint() {
        let server = TestServer::start(HashMap::from([(
            "/ajax.php".to_string(),
            vec![testutil::ok(r#"{"tel":"(050) 234-56-78"}"#)],
        )]))
        .await;

        let f = Fetcher::new(fast_cfg()).unwrap();
        let form = vec![
            ("act".to_string(), "telshow".to_string()),
            ("id".to_string(), "123".to_string()),
        ];
        let body = f.post_form(&server.url("/ajax.php"), &form).await.unwrap();
        assert!(body.contains("tel"));
    }

    #[tokio::test]
    async fn in_flight_requests_never_exceed_bound() {
        let server = TestServer::start(HashMap::from([(
            "/slow".to_string(),
            vec![testutil::ok_slow("x", 40)],
        )]))
        .await;

        // Politeness keeps each slot busy well past the server's
        // response, so the gauge cannot race a freed permit.
        let cfg = FetchConfig {
            concurrency: 2,
            delay_min: Duration::from_millis(10),
            delay_max: Duration::from_millis(15),
            ..fast_cfg()
        };
        let f = std::sync::Arc::new(Fetcher::new(cfg).unwrap());

        let mut tasks = tokio::task::JoinSet::new();
        for _ in 0..8 {
            let f = std::sync::Arc::clone(&f);
            let url = server.url("/slow");
            tasks.spawn(async move { f.get(&url).await.unwrap() });
        }
        while tasks.join_next().await.is_some() {}

        assert_eq!(server.hits("/slow"), 8);
        assert!(server.max_in_flight() <= 2);
    }

    #[test]
    fn transient_statuses() {
        assert!(is_transient(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient(StatusCode::BAD_GATEWAY));
        assert!(is_transient(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!is_transient(StatusCode::NOT_FOUND));
        assert!(!is_transient(StatusCode::FORBIDDEN));
        assert!(!is_transient(StatusCode::OK));
    }

    #[test]
    fn backoff_doubles_per_attempt() {
        let f = fetcher();
        let base = f.cfg.backoff_base;
        for attempt in 0..3 {
            let d = f.backoff_delay(attempt);
            let floor = base * 2u32.pow(attempt);
            assert!(d >= floor);
            assert!(d < floor + Duration::from_millis(500));
        }
    }

    #[test]
    fn politeness_stays_in_window() {
        let f = fetcher();
        for _ in 0..32 {
            let d = f.politeness_delay();
            assert!(d >= f.cfg.delay_min);
            assert!(d <= f.cfg.delay_max);
        }
    }
}
