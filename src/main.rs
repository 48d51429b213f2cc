mod config;
mod db;
mod dedup;
mod discover;
mod fetch;
mod phone;
mod pipeline;
mod sites;
#[cfg(test)]
mod testutil;

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use config::{FetchConfig, RunConfig};
use db::BatchPersister;
use fetch::Fetcher;
use sites::Extractor;

#[derive(Parser)]
#[command(name = "az_leads", about = "Azerbaijani classifieds lead harvester")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape sites and upsert leads into the store
    Run {
        /// Site ids to scrape (default: every registered site)
        sites: Vec<String>,
        /// Max pages per site, overriding discovery
        #[arg(short, long)]
        pages: Option<u32>,
        /// Stop a site after this many leads
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        /// Max simultaneous in-flight requests
        #[arg(short, long)]
        concurrency: Option<usize>,
        /// Leads per write batch
        #[arg(long)]
        batch_size: Option<usize>,
        /// SQLite database path
        #[arg(long, default_value = db::DEFAULT_DB_PATH)]
        db: String,
    },
    /// List registered site extractors
    Sites,
    /// Lead counts overall and per website
    Stats {
        #[arg(long, default_value = db::DEFAULT_DB_PATH)]
        db: String,
    },
    /// Re-validate stored phones and print a breakdown
    Audit {
        /// Max rows to audit (default: all)
        #[arg(short = 'n', long)]
        limit: Option<usize>,
        #[arg(long, default_value = db::DEFAULT_DB_PATH)]
        db: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run {
            sites,
            pages,
            limit,
            concurrency,
            batch_size,
            db,
        } => run(sites, pages, limit, concurrency, batch_size, &db).await,
        Commands::Sites => {
            for extractor in sites::all() {
                println!("{}", extractor.site());
            }
            Ok(())
        }
        Commands::Stats { db } => {
            let conn = db::connect(&db)?;
            db::init_schema(&conn)?;
            let s = db::get_stats(&conn)?;
            println!("Leads: {}", s.total);
            for (website, count) in &s.by_website {
                println!("  {:<16} {}", website, count);
            }
            Ok(())
        }
        Commands::Audit { limit, db } => audit(&db, limit),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn run(
    site_ids: Vec<String>,
    pages: Option<u32>,
    limit: Option<usize>,
    concurrency: Option<usize>,
    batch_size: Option<usize>,
    db_path: &str,
) -> Result<()> {
    let selected: Vec<Arc<dyn Extractor>> = if site_ids.is_empty() {
        sites::all()
    } else {
        site_ids
            .iter()
            .map(|id| match sites::find(id) {
                Some(e) => Ok(e),
                None => bail!("unknown site {:?}; see 'az_leads sites'", id),
            })
            .collect::<Result<_>>()?
    };

    let mut fetch_cfg = FetchConfig::default();
    if let Some(c) = concurrency {
        fetch_cfg.concurrency = c.max(1);
    }
    let mut run_cfg = RunConfig {
        page_cap: pages,
        record_limit: limit,
        ..RunConfig::default()
    };
    if let Some(b) = batch_size {
        run_cfg.batch_size = b.max(1);
    }

    // A store we cannot reach at all is the one fatal condition.
    let conn = db::connect(db_path)?;
    db::init_schema(&conn)?;
    let mut persister = BatchPersister::new(conn, run_cfg.batch_size);
    let fetcher = Arc::new(Fetcher::new(fetch_cfg)?);

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received; finishing in-flight work and flushing");
                cancel.cancel();
            }
        });
    }

    for extractor in selected {
        if cancel.is_cancelled() {
            break;
        }
        println!("Scraping {}...", extractor.site());
        let stats = pipeline::run_site(
            Arc::clone(&extractor),
            Arc::clone(&fetcher),
            &mut persister,
            &run_cfg,
            cancel.clone(),
        )
        .await?;
        stats.print(extractor.site());
    }

    Ok(())
}

/// Re-run the validator over stored phones: totals, carrier and website
/// breakdowns, error types, a few sample rejects.
fn audit(db_path: &str, limit: Option<usize>) -> Result<()> {
    let conn = db::connect(db_path)?;
    db::init_schema(&conn)?;
    let rows = db::fetch_phones(&conn, limit)?;
    if rows.is_empty() {
        println!("No leads to audit.");
        return Ok(());
    }

    let mut valid = 0usize;
    let mut by_prefix: BTreeMap<String, usize> = BTreeMap::new();
    let mut by_website: BTreeMap<String, (usize, usize)> = BTreeMap::new();
    let mut error_types: BTreeMap<String, usize> = BTreeMap::new();
    let mut samples: Vec<(String, String)> = Vec::new();

    for row in &rows {
        let entry = by_website.entry(row.website.clone()).or_default();
        match phone::normalize(&row.phone) {
            Ok(canonical) => {
                valid += 1;
                entry.0 += 1;
                *by_prefix.entry(phone::prefix(&canonical).to_string()).or_default() += 1;
            }
            Err(reason) => {
                entry.1 += 1;
                *error_types.entry(reason.to_string()).or_default() += 1;
                if samples.len() < 5 {
                    samples.push((row.phone.clone(), reason.to_string()));
                }
            }
        }
    }

    let total = rows.len();
    let invalid = total - valid;
    println!("Phone audit");
    println!("{}", "=".repeat(40));
    println!("Total:   {total}");
    println!("Valid:   {valid} ({:.1}%)", valid as f64 / total as f64 * 100.0);
    println!("Invalid: {invalid}");

    println!("\nBy carrier prefix:");
    let mut prefixes: Vec<_> = by_prefix.into_iter().collect();
    prefixes.sort_by(|a, b| b.1.cmp(&a.1));
    for (prefix, count) in prefixes {
        println!("  {prefix}: {count}");
    }

    println!("\nBy website:");
    for (website, (ok, bad)) in &by_website {
        println!("  {website}: {} valid, {} invalid", ok, bad);
    }

    if !error_types.is_empty() {
        println!("\nError types:");
        for (error, count) in &error_types {
            println!("  {error}: {count}");
        }
    }
    if !samples.is_empty() {
        println!("\nSample invalid numbers:");
        for (number, reason) in &samples {
            println!("  {number}: {reason}");
        }
    }

    Ok(())
}

fn format_duration(d: std::time::Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
