use tracing::{info, warn};

use crate::fetch::Fetcher;
use crate::sites::Extractor;

/// One page of a listing site, ready to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageDescriptor {
    pub number: u32,
    pub url: String,
}

/// How a site exposes its listing pages.
#[derive(Debug, Clone)]
pub enum Pagination {
    /// Caller-supplied page range.
    Range { first: u32, last: u32 },
    /// Read a total-page indicator off a probe page; fall back to
    /// `default_pages` when the widget cannot be parsed.
    Probe { url: String, default_pages: u32 },
}

/// Resolve a site's pagination into concrete page descriptors.
///
/// Probe failures never abort the run; they downgrade to the configured
/// default bound with a warning.
pub async fn resolve_pages(
    site: &dyn Extractor,
    fetcher: &Fetcher,
    page_cap: Option<u32>,
) -> Vec<PageDescriptor> {
    let (first, mut last) = match site.pagination() {
        Pagination::Range { first, last } => (first, last),
        Pagination::Probe { url, default_pages } => {
            let parsed = match fetcher.get(&url).await {
                Ok(html) => site.total_pages(&html),
                Err(e) => {
                    warn!("pagination probe for {} failed: {}", site.site(), e);
                    None
                }
            };
            (1, probed_total(parsed, default_pages, site.site()))
        }
    };

    if let Some(cap) = page_cap {
        let capped = first.saturating_add(cap.saturating_sub(1));
        if capped < last {
            last = capped;
        }
    }

    (first..=last)
        .map(|number| PageDescriptor {
            number,
            url: site.page_url(number),
        })
        .collect()
}

fn probed_total(parsed: Option<u32>, default_pages: u32, site: &str) -> u32 {
    match parsed {
        Some(total) if total > 0 => {
            info!("{}: pagination probe reports {} pages", site, total);
            total
        }
        _ => {
            warn!(
                "{}: no usable page count from probe, assuming {}",
                site, default_pages
            );
            default_pages
        }
    }
}

/// Counts consecutive zero-record pages; stops runaway pagination when a
/// site's markup drifts and every page starts parsing as empty.
#[derive(Debug)]
pub struct EmptyStreak {
    limit: u32,
    run: u32,
}

impl EmptyStreak {
    pub fn new(limit: u32) -> Self {
        Self { limit, run: 0 }
    }

    /// Record one page's record count; true once the limit is reached.
    pub fn record(&mut self, records: usize) -> bool {
        if records == 0 {
            self.run += 1;
        } else {
            self.run = 0;
        }
        self.run >= self.limit
    }
}

// ── Tests ──
