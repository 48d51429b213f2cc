use std::sync::Arc;

use anyhow::Result;
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::RunConfig;
use crate::db::{BatchPersister, Lead, PersistCounts};
use crate::dedup::SeenSet;
use crate::discover::{self, EmptyStreak};
use crate::fetch::Fetcher;
use crate::phone::{self, RejectReason};
use crate::sites::{Extractor, RawRecord};

const INVALID_SAMPLE_CAP: usize = 5;

/// Per-run counters, emitted as the summary at the end of every run.
#[derive(Debug, Default)]
pub struct ScraperStats {
    pub pages: u32,
    pub fetched: u32,
    pub fetch_errors: u32,
    pub records: u64,
    pub valid: u64,
    pub invalid: u64,
    pub duplicates: u64,
    pub inserted: u64,
    pub updated: u64,
    pub persist_failed: u64,
    invalid_samples: Vec<String>,
}

impl ScraperStats {
    fn note_invalid(&mut self, raw: &str, reason: &RejectReason) {
        self.invalid += 1;
        if self.invalid_samples.len() < INVALID_SAMPLE_CAP {
            self.invalid_samples.push(format!("{raw:?}: {reason}"));
        }
    }

    pub fn invalid_samples(&self) -> &[String] {
        &self.invalid_samples
    }

    fn absorb_persist_delta(&mut self, before: PersistCounts, after: PersistCounts) {
        self.inserted += after.inserted - before.inserted;
        self.updated += after.updated - before.updated;
        self.persist_failed += after.failed - before.failed;
    }

    pub fn print(&self, site: &str) {
        println!("\n{site}:");
        println!("  Pages:      {} ({} fetched, {} errors)", self.pages, self.fetched, self.fetch_errors);
        println!("  Records:    {}", self.records);
        println!("  Valid:      {}", self.valid);
        println!("  Invalid:    {}", self.invalid);
        println!("  Duplicates: {}", self.duplicates);
        println!("  Inserted:   {}", self.inserted);
        println!("  Updated:    {}", self.updated);
        if self.persist_failed > 0 {
            println!("  Write errors: {}", self.persist_failed);
        }
        if !self.invalid_samples.is_empty() {
            println!("  Sample rejects:");
            for sample in &self.invalid_samples {
                println!("    {sample}");
            }
        }
    }
}

/// Normalize and dedup one raw record. Returns the lead to persist, or
/// counts the rejection/duplicate and returns None.
fn process_record(
    site: &str,
    record: RawRecord,
    seen_phones: &SeenSet,
    stats: &mut ScraperStats,
) -> Option<Lead> {
    let canonical = match phone::normalize(&record.phone_raw) {
        Ok(c) => c,
        Err(reason) => {
            stats.note_invalid(&record.phone_raw, &reason);
            return None;
        }
    };
    stats.valid += 1;

    if !seen_phones.insert(&canonical) {
        stats.duplicates += 1;
        return None;
    }

    Some(Lead {
        name: record.name,
        phone: canonical,
        website: site.to_string(),
        link: record.source_url,
        scraped_at: Utc::now(),
        raw_data: record.payload,
    })
}

/// Run the whole pipeline for one site: discover pages, fetch them,
/// follow detail links in bounded waves, normalize and dedup phones,
/// and hand leads to the persister.
///
/// Page-level failures are counted and skipped; the only hard errors
/// out of here are storage-level ones. The persister's buffer is always
/// flushed on the way out, including after a cancellation.
pub async fn run_site(
    extractor: Arc<dyn Extractor>,
    fetcher: Arc<Fetcher>,
    persister: &mut BatchPersister,
    cfg: &RunConfig,
    cancel: CancellationToken,
) -> Result<ScraperStats> {
    let site = extractor.site();
    let mut stats = ScraperStats::default();
    let seen_urls = SeenSet::new();
    let seen_phones = SeenSet::new();
    let mut streak = EmptyStreak::new(cfg.empty_streak_limit);
    let persisted_before = persister.counts();
    let mut emitted = 0usize;

    let pages = discover::resolve_pages(extractor.as_ref(), &fetcher, cfg.page_cap).await;
    info!("{}: {} pages to process", site, pages.len());

    let pb = ProgressBar::new(pages.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );
    pb.set_message(site);

    'pages: for page in pages {
        if cancel.is_cancelled() {
            info!("{}: stop requested, not starting further pages", site);
            break;
        }
        stats.pages += 1;

        let body = match fetcher.get(&page.url).await {
            Ok(b) => {
                stats.fetched += 1;
                b
            }
            Err(e) => {
                warn!("{}: page {} failed: {}", site, page.number, e);
                stats.fetch_errors += 1;
                pb.inc(1);
                if streak.record(0) {
                    break;
                }
                continue;
            }
        };

        // Records carried by the page itself, plus detail links to follow.
        let mut page_records = extractor.extract(&page.url, &body);
        let links: Vec<String> = extractor
            .listing_urls(&body)
            .into_iter()
            .filter(|u| seen_urls.insert(u))
            .collect();

        // One wave of detail fetches per page; the fetch semaphore keeps
        // at most `concurrency` of these in flight.
        let mut tasks: JoinSet<Result<Vec<RawRecord>, (String, crate::fetch::FetchError)>> =
            JoinSet::new();
        for link in links {
            let extractor = Arc::clone(&extractor);
            let fetcher = Arc::clone(&fetcher);
            tasks.spawn(async move {
                match fetcher.get(&link).await {
                    Ok(content) => Ok(extractor.extract(&link, &content)),
                    Err(e) => Err((link, e)),
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(records)) => page_records.extend(records),
                Ok(Err((link, e))) => {
                    warn!("{}: detail {} failed: {}", site, link, e);
                    stats.fetch_errors += 1;
                }
                Err(e) => warn!("{}: detail task panicked: {}", site, e),
            }
        }

        let found = page_records.len();
        for record in page_records {
            stats.records += 1;
            if let Some(lead) = process_record(site, record, &seen_phones, &mut stats) {
                persister.add(lead)?;
                emitted += 1;
                if cfg.record_limit.is_some_and(|limit| emitted >= limit) {
                    info!("{}: record limit {} reached", site, emitted);
                    break 'pages;
                }
            }
        }

        pb.inc(1);
        if streak.record(found) {
            info!(
                "{}: {} consecutive empty pages, assuming end of listings",
                site, cfg.empty_streak_limit
            );
            break;
        }
    }
    pb.finish_and_clear();

    // Buffered leads always land, even on cancellation or early exit.
    persister.flush()?;
    stats.absorb_persist_delta(persisted_before, persister.counts());

    info!(
        "{}: {} records, {} valid, {} invalid, {} duplicates, {} inserted, {} updated",
        site, stats.records, stats.valid, stats.invalid, stats.duplicates, stats.inserted, stats.updated
    );
    Ok(stats)
}

// ── Tests ──
