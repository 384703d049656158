// 🗄️ Archive Store - fingerprint-keyed history of imported records
// Detects records already seen in earlier sessions. Completely independent
// of the matching pipeline, which never reads the archive.

use crate::fingerprint::fingerprint;
use crate::transaction::{DateValue, Transaction};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// ENTRIES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerSide {
    Bank,
    Book,
}

impl LedgerSide {
    pub fn name(&self) -> &'static str {
        match self {
            LedgerSide::Bank => "bank",
            LedgerSide::Book => "book",
        }
    }
}

/// Archived snapshot of a transaction. Holds only the matching-relevant
/// fields plus provenance; run-scoped ids are deliberately not stored since
/// they are meaningless across sessions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveEntry {
    pub side: LedgerSide,
    pub date: DateValue,
    pub amount: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_amount: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_no: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    pub imported_at: DateTime<Utc>,
}

impl ArchiveEntry {
    pub fn snapshot(tx: &Transaction, side: LedgerSide) -> Self {
        ArchiveEntry {
            side,
            date: tx.date.clone(),
            amount: tx.amount,
            display_amount: tx.display_amount,
            ref_no: tx.ref_no.clone(),
            desc: tx.desc.clone(),
            imported_at: Utc::now(),
        }
    }
}

// ============================================================================
// STORE INTERFACE
// ============================================================================

/// Key-value association from fingerprint to snapshot. A store instance
/// covers one ledger side. If shared across concurrent callers, external
/// synchronization is the caller's responsibility.
pub trait ArchiveStore {
    fn lookup(&self, fingerprint: &str) -> Result<Option<ArchiveEntry>>;

    /// At-most-once insert: returns false (no-op, never an overwrite) when
    /// the fingerprint is already present.
    fn insert(&mut self, fingerprint: &str, entry: &ArchiveEntry) -> Result<bool>;

    fn enumerate(&self) -> Result<Vec<ArchiveEntry>>;
}

// ============================================================================
// SQLITE STORE
// ============================================================================

pub struct SqliteArchive {
    conn: Connection,
    side: LedgerSide,
}

impl SqliteArchive {
    pub fn open(path: &Path, side: LedgerSide) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open archive database {}", path.display()))?;
        Self::setup(&conn)?;
        Ok(SqliteArchive { conn, side })
    }

    pub fn open_in_memory(side: LedgerSide) -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory archive")?;
        Self::setup(&conn)?;
        Ok(SqliteArchive { conn, side })
    }

    fn setup(conn: &Connection) -> Result<()> {
        // WAL for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS archive (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                side TEXT NOT NULL,
                fingerprint TEXT NOT NULL,
                snapshot TEXT NOT NULL,
                imported_at TEXT NOT NULL,
                UNIQUE(side, fingerprint)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_archive_side ON archive(side)",
            [],
        )?;

        Ok(())
    }

    /// Wipe this side's history. Returns the number of rows removed.
    pub fn clear(&mut self) -> Result<usize> {
        let removed = self
            .conn
            .execute("DELETE FROM archive WHERE side = ?1", params![self.side.name()])?;
        Ok(removed)
    }
}

impl ArchiveStore for SqliteArchive {
    fn lookup(&self, fingerprint: &str) -> Result<Option<ArchiveEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT snapshot FROM archive WHERE side = ?1 AND fingerprint = ?2")?;
        let mut rows = stmt.query(params![self.side.name(), fingerprint])?;
        match rows.next()? {
            Some(row) => {
                let json: String = row.get(0)?;
                let entry =
                    serde_json::from_str(&json).context("Corrupt archive snapshot")?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    fn insert(&mut self, fingerprint: &str, entry: &ArchiveEntry) -> Result<bool> {
        let json = serde_json::to_string(entry)?;
        let result = self.conn.execute(
            "INSERT INTO archive (side, fingerprint, snapshot, imported_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                self.side.name(),
                fingerprint,
                json,
                entry.imported_at.to_rfc3339(),
            ],
        );

        match result {
            Ok(_) => Ok(true),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                // already recorded in an earlier session
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn enumerate(&self) -> Result<Vec<ArchiveEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT snapshot FROM archive WHERE side = ?1 ORDER BY imported_at DESC, id DESC",
        )?;
        let rows = stmt.query_map(params![self.side.name()], |row| row.get::<_, String>(0))?;

        let mut entries = Vec::new();
        for json in rows {
            let json = json?;
            entries.push(serde_json::from_str(&json).context("Corrupt archive snapshot")?);
        }
        Ok(entries)
    }
}

// ============================================================================
// MEMORY STORE
// ============================================================================

/// BTreeMap-backed store for tests and archive-less runs.
#[derive(Debug, Default)]
pub struct MemoryArchive {
    entries: BTreeMap<String, ArchiveEntry>,
}

impl MemoryArchive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ArchiveStore for MemoryArchive {
    fn lookup(&self, fingerprint: &str) -> Result<Option<ArchiveEntry>> {
        Ok(self.entries.get(fingerprint).cloned())
    }

    fn insert(&mut self, fingerprint: &str, entry: &ArchiveEntry) -> Result<bool> {
        if self.entries.contains_key(fingerprint) {
            return Ok(false);
        }
        self.entries.insert(fingerprint.to_string(), entry.clone());
        Ok(true)
    }

    fn enumerate(&self) -> Result<Vec<ArchiveEntry>> {
        Ok(self.entries.values().cloned().collect())
    }
}

// ============================================================================
// SCREENING
// ============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct DedupReport {
    pub fresh: Vec<Transaction>,
    pub duplicates: Vec<Transaction>,
}

/// Partition a batch into never-seen and previously-archived records.
/// A record the store fails to look up counts as fresh — screening must
/// never block an import.
pub fn screen(store: &dyn ArchiveStore, items: &[Transaction]) -> DedupReport {
    let mut fresh = Vec::new();
    let mut duplicates = Vec::new();

    for item in items {
        match store.lookup(&fingerprint(item)) {
            Ok(Some(_)) => duplicates.push(item.clone()),
            _ => fresh.push(item.clone()),
        }
    }

    DedupReport { fresh, duplicates }
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryReport {
    pub added: usize,
    pub skipped: usize,
    /// Per-record storage failures; recoverable, the reconciliation result
    /// stands regardless
    pub warnings: Vec<String>,
}

/// Record a batch into the archive. Duplicate fingerprints are skipped,
/// storage failures are collected as warnings rather than propagated.
pub fn record(store: &mut dyn ArchiveStore, items: &[Transaction], side: LedgerSide) -> HistoryReport {
    let mut report = HistoryReport {
        added: 0,
        skipped: 0,
        warnings: Vec::new(),
    };

    for item in items {
        let entry = ArchiveEntry::snapshot(item, side);
        match store.insert(&fingerprint(item), &entry) {
            Ok(true) => report.added += 1,
            Ok(false) => report.skipped += 1,
            Err(e) => report
                .warnings
                .push(format!("failed to archive record {}: {e:#}", item.id)),
        }
    }

    report
}

// ============================================================================
// TESTS
// ============================================================================
