use std::time::Duration;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// HTTP client tuning. One instance is handed to `Fetcher::new`; nothing
/// here lives in module-level state.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// Max simultaneous in-flight requests.
    pub concurrency: usize,
    /// Attempts per URL before giving up.
    pub max_retries: u32,
    /// Per-request timeout.
    pub timeout: Duration,
    /// First backoff step; doubles per attempt.
    pub backoff_base: Duration,
    /// Inter-request delay floor, applied even on success.
    pub delay_min: Duration,
    pub delay_max: Duration,
    pub user_agent: String,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            concurrency: 10,
            max_retries: 3,
            timeout: Duration::from_secs(30),
            backoff_base: Duration::from_secs(2),
            delay_min: Duration::from_millis(500),
            delay_max: Duration::from_secs(2),
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// Per-run pipeline tuning.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Leads buffered before the persister flushes a batch.
    pub batch_size: usize,
    /// Stop after this many consecutive pages with zero records.
    pub empty_streak_limit: u32,
    /// Hard cap on pages per site, regardless of discovery mode.
    pub page_cap: Option<u32>,
    /// Stop a site run after this many valid leads.
    pub record_limit: Option<usize>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: 50,
            empty_streak_limit: 3,
            page_cap: None,
            record_limit: None,
        }
    }
}
