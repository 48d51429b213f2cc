use std::collections::HashSet;

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use tracing::warn;

pub const DEFAULT_DB_PATH: &str = "data/leads.sqlite";

pub fn connect(path: &str) -> Result<Connection> {
    if let Some(dir) = std::path::Path::new(path).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    let conn = Connection::open(path)?;
    conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
    Ok(conn)
}

pub fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS leads (
            id         INTEGER PRIMARY KEY,
            name       TEXT,
            phone      TEXT NOT NULL UNIQUE,
            website    TEXT NOT NULL,
            link       TEXT NOT NULL,
            scraped_at TEXT NOT NULL,
            raw_data   TEXT,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_leads_website ON leads(website);
        ",
    )?;
    Ok(())
}

// ── Leads ──

/// The persisted entity, keyed by canonical phone.
#[derive(Debug, Clone)]
pub struct Lead {
    pub name: Option<String>,
    pub phone: String,
    pub website: String,
    pub link: String,
    pub scraped_at: DateTime<Utc>,
    pub raw_data: serde_json::Value,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PersistCounts {
    pub inserted: u64,
    pub updated: u64,
    pub failed: u64,
    pub batch_deduped: u64,
}

/// Buffers leads and writes them in bounded transactional batches.
///
/// Owns the connection: all writes for a run are serialized through this
/// one component, whatever parallelism feeds it. A row that fails to
/// write is logged and counted without dropping the rest of its batch.
pub struct BatchPersister {
    conn: Connection,
    buf: Vec<Lead>,
    batch_size: usize,
    counts: PersistCounts,
}

impl BatchPersister {
    pub fn new(conn: Connection, batch_size: usize) -> Self {
        Self {
            conn,
            buf: Vec::with_capacity(batch_size),
            batch_size: batch_size.max(1),
            counts: PersistCounts::default(),
        }
    }

    /// Buffer a lead; flushes automatically once the batch fills up.
    pub fn add(&mut self, lead: Lead) -> Result<()> {
        self.buf.push(lead);
        if self.buf.len() >= self.batch_size {
            self.flush()?;
        }
        Ok(())
    }

    /// Write out everything buffered. Upserts are keyed on `phone`:
    /// insert when absent, otherwise update the mutable fields and leave
    /// `phone`/`created_at` alone. Returns an error only when the store
    /// itself is unusable (transaction cannot open or commit).
    pub fn flush(&mut self) -> Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        let batch = std::mem::take(&mut self.buf);

        // A single response can list the same seller twice; keep the
        // first occurrence of each phone.
        let mut seen = HashSet::new();
        let mut unique = Vec::with_capacity(batch.len());
        for lead in batch {
            if seen.insert(lead.phone.clone()) {
                unique.push(lead);
            } else {
                self.counts.batch_deduped += 1;
            }
        }

        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO leads (name, phone, website, link, scraped_at, raw_data)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                 ON CONFLICT(phone) DO NOTHING",
            )?;
            let mut update = tx.prepare(
                "UPDATE leads
                 SET name = ?1, website = ?2, link = ?3, scraped_at = ?4, raw_data = ?5
                 WHERE phone = ?6",
            )?;

            for lead in &unique {
                match upsert_one(&mut insert, &mut update, lead) {
                    Ok(UpsertOutcome::Inserted) => self.counts.inserted += 1,
                    Ok(UpsertOutcome::Updated) => self.counts.updated += 1,
                    Err(e) => {
                        warn!("failed to save lead {}: {}", lead.phone, e);
                        self.counts.failed += 1;
                    }
                }
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn counts(&self) -> PersistCounts {
        self.counts
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

fn upsert_one(
    insert: &mut rusqlite::Statement,
    update: &mut rusqlite::Statement,
    lead: &Lead,
) -> rusqlite::Result<UpsertOutcome> {
    let scraped_at = lead.scraped_at.to_rfc3339();
    let raw_data = lead.raw_data.to_string();

    let inserted = insert.execute(rusqlite::params![
        lead.name, lead.phone, lead.website, lead.link, scraped_at, raw_data,
    ])?;
    if inserted == 1 {
        Ok(UpsertOutcome::Inserted)
    } else {
        update.execute(rusqlite::params![
            lead.name, lead.website, lead.link, scraped_at, raw_data, lead.phone,
        ])?;
        Ok(UpsertOutcome::Updated)
    }
}

// ── Stats ──

pub struct DbStats {
    pub total: usize,
    pub by_website: Vec<(String, usize)>,
}

pub fn get_stats(conn: &Connection) -> Result<DbStats> {
    let total: usize = conn.query_row("SELECT COUNT(*) FROM leads", [], |r| r.get(0))?;
    let mut stmt = conn.prepare(
        "SELECT website, COUNT(*) FROM leads GROUP BY website ORDER BY COUNT(*) DESC",
    )?;
    let by_website = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(DbStats { total, by_website })
}

// ── Audit ──

pub struct AuditRow {
    pub phone: String,
    pub website: String,
}

pub fn fetch_phones(conn: &Connection, limit: Option<usize>) -> Result<Vec<AuditRow>> {
    let sql = match limit {
        Some(n) => format!("SELECT phone, website FROM leads ORDER BY id LIMIT {}", n),
        None => "SELECT phone, website FROM leads ORDER BY id".to_string(),
    };
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok(AuditRow {
                phone: row.get(0)?,
                website: row.get(1)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ── Tests ──
