// Ledger Reconcile - Core Library
// Pairs a bank ledger against a book ledger: six-pass matching pipeline,
// fingerprint-keyed duplicate archive, and manual-match assistance.

pub mod archive;
pub mod fingerprint;
pub mod matching;
pub mod ranking;
pub mod report;
pub mod session;
pub mod transaction;

// Re-export commonly used types
pub use archive::{
    record, screen, ArchiveEntry, ArchiveStore, DedupReport, HistoryReport, LedgerSide,
    MemoryArchive, SqliteArchive,
};
pub use fingerprint::fingerprint;
pub use matching::{
    Match, MatchEngine, MatchKind, MatchSide, MatchStatus, ReconcileOptions, ReconcileOutcome,
};
pub use ranking::rank_candidates;
pub use report::export_session;
pub use session::{
    Confirmation, ManualMatchError, ReconcileSession, SessionSummary, MANUAL_VARIANCE_GATE,
};
pub use transaction::{
    day_diff, load_transactions, read_transactions, sign_compatible, DateValue, Sign, Transaction,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
