use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;

use ledger_reconcile::{
    export_session, load_transactions, record, screen, ArchiveStore, LedgerSide, MatchEngine,
    ReconcileOptions, ReconcileSession, SqliteArchive,
};

const DEFAULT_ARCHIVE: &str = "reconcile_history.db";

fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("reconcile") => run_reconcile(&args[2..]),
        Some("history") => run_history(&args[2..]),
        Some("clear-history") => run_clear_history(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("ledger-reconcile {}", ledger_reconcile::VERSION);
    println!();
    println!("Usage:");
    println!("  ledger-reconcile reconcile <bank.csv> <book.csv> [options]");
    println!("  ledger-reconcile history [--archive PATH]");
    println!("  ledger-reconcile clear-history [--archive PATH]");
    println!();
    println!("Options:");
    println!("  --tolerance <days>   acceptable clearing delay (default 0)");
    println!("  --require-ref        exact matches must share a reference number");
    println!("  --archive <path>     screen against and record into this history db");
    println!("  --export <dir>       write CSV report files into this directory");
}

struct ReconcileArgs {
    bank: PathBuf,
    book: PathBuf,
    tolerance_days: i64,
    require_ref: bool,
    archive: Option<PathBuf>,
    export: Option<PathBuf>,
}

fn parse_reconcile_args(args: &[String]) -> Result<ReconcileArgs> {
    let mut positional = Vec::new();
    let mut tolerance_days = 0i64;
    let mut require_ref = false;
    let mut archive = None;
    let mut export = None;

    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--tolerance" => {
                let value = it.next().context("--tolerance requires a value")?;
                tolerance_days = value
                    .parse()
                    .with_context(|| format!("invalid --tolerance value: {value}"))?;
            }
            "--require-ref" => require_ref = true,
            "--archive" => {
                archive = Some(PathBuf::from(
                    it.next().context("--archive requires a path")?,
                ));
            }
            "--export" => {
                export = Some(PathBuf::from(
                    it.next().context("--export requires a directory")?,
                ));
            }
            other if other.starts_with("--") => bail!("unknown flag: {other}"),
            other => positional.push(other.to_string()),
        }
    }

    if positional.len() != 2 {
        bail!("expected two ledger files: <bank.csv> <book.csv>");
    }
    if tolerance_days < 0 {
        bail!("--tolerance must be >= 0");
    }

    Ok(ReconcileArgs {
        bank: PathBuf::from(&positional[0]),
        book: PathBuf::from(&positional[1]),
        tolerance_days,
        require_ref,
        archive,
        export,
    })
}

fn run_reconcile(args: &[String]) -> Result<()> {
    let args = parse_reconcile_args(args)?;

    println!("📂 Loading ledgers...");
    let bank = load_transactions(&args.bank)?;
    println!("✓ Bank:  {} records from {}", bank.len(), args.bank.display());
    let book = load_transactions(&args.book)?;
    println!("✓ Book:  {} records from {}", book.len(), args.book.display());

    // Screening is informational only; matching never consults the archive
    if let Some(path) = &args.archive {
        let bank_store = SqliteArchive::open(path, LedgerSide::Bank)?;
        let bank_dedup = screen(&bank_store, &bank);
        let book_store = SqliteArchive::open(path, LedgerSide::Book)?;
        let book_dedup = screen(&book_store, &book);
        println!(
            "🔍 History: {} bank / {} book records seen in earlier sessions",
            bank_dedup.duplicates.len(),
            book_dedup.duplicates.len()
        );
    }

    println!("\n⚖️  Reconciling (tolerance {} days)...", args.tolerance_days);
    let engine = MatchEngine::new();
    let opts = ReconcileOptions {
        tolerance_days: args.tolerance_days,
        require_ref_match: args.require_ref,
    };
    let outcome = engine.reconcile(&bank, &book, &opts);
    let session = ReconcileSession::new(outcome);
    let summary = session.summary();

    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!(
        "✓ Confirmed:       {:>5}  ({:>12.2})",
        summary.confirmed_count, summary.confirmed_total
    );
    println!(
        "✓ Needs review:    {:>5}  ({:>12.2})",
        summary.possible_count, summary.possible_total
    );
    println!(
        "✓ Amount-only:     {:>5}  ({:>12.2})",
        summary.amount_only_count, summary.amount_only_total
    );
    println!(
        "✓ Unmatched bank:  {:>5}  ({:>12.2})",
        summary.unmatched_bank_count, summary.unmatched_bank_total
    );
    println!(
        "✓ Unmatched book:  {:>5}  ({:>12.2})",
        summary.unmatched_book_count, summary.unmatched_book_total
    );

    if let Some(dir) = &args.export {
        export_session(dir, &session)?;
        println!("\n💾 Report written to {}", dir.display());
    }

    if let Some(path) = &args.archive {
        let mut bank_store = SqliteArchive::open(path, LedgerSide::Bank)?;
        let bank_report = record(&mut bank_store, &bank, LedgerSide::Bank);
        let mut book_store = SqliteArchive::open(path, LedgerSide::Book)?;
        let book_report = record(&mut book_store, &book, LedgerSide::Book);
        println!(
            "\n🗄️  Archived {} new records ({} already known)",
            bank_report.added + book_report.added,
            bank_report.skipped + book_report.skipped
        );
        for warning in bank_report.warnings.iter().chain(&book_report.warnings) {
            eprintln!("⚠ {warning}");
        }
    }

    Ok(())
}

fn archive_path(args: &[String]) -> Result<PathBuf> {
    let mut path = PathBuf::from(DEFAULT_ARCHIVE);
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--archive" => {
                path = PathBuf::from(it.next().context("--archive requires a path")?);
            }
            other => bail!("unknown argument: {other}"),
        }
    }
    Ok(path)
}

fn run_history(args: &[String]) -> Result<()> {
    let path = archive_path(args)?;

    for side in [LedgerSide::Bank, LedgerSide::Book] {
        let store = SqliteArchive::open(&path, side)?;
        let entries = store.enumerate()?;
        println!("📒 {} history: {} records", side.name(), entries.len());
        for entry in &entries {
            println!(
                "   {} | {:>12.2} | {} | {}",
                entry.imported_at.format("%Y-%m-%d %H:%M"),
                entry.amount,
                entry.ref_no.as_deref().unwrap_or("-"),
                entry.desc.as_deref().unwrap_or("-"),
            );
        }
    }

    Ok(())
}

fn run_clear_history(args: &[String]) -> Result<()> {
    let path = archive_path(args)?;

    let mut removed = 0;
    for side in [LedgerSide::Bank, LedgerSide::Book] {
        let mut store = SqliteArchive::open(&path, side)?;
        removed += store.clear()?;
    }
    println!("✓ Cleared {removed} archived records from {}", path.display());

    Ok(())
}
