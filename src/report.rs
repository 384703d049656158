// 📤 Report Export - CSV files summarizing a reconciliation session

use crate::matching::{Match, MatchSide};
use crate::session::ReconcileSession;
use crate::transaction::Transaction;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// One side of a match flattened for tabular output. Groups collapse into
/// their total, a combined reference list and a fixed narration.
struct SideView {
    date: String,
    amount: f64,
    ref_no: String,
    desc: String,
}

fn side_view(side: &MatchSide) -> SideView {
    match side {
        MatchSide::Single(tx) => SideView {
            date: tx.date.display(),
            amount: tx.amount,
            ref_no: tx.ref_no.clone().unwrap_or_default(),
            desc: tx.desc.clone().unwrap_or_default(),
        },
        MatchSide::Group(txs) => {
            let refs: Vec<&str> = txs.iter().filter_map(|tx| tx.ref_no.as_deref()).collect();
            SideView {
                date: txs.first().map(|tx| tx.date.display()).unwrap_or_default(),
                amount: txs.iter().map(|tx| tx.amount).sum(),
                ref_no: if refs.is_empty() {
                    "Multiple".to_string()
                } else {
                    refs.join(", ")
                },
                desc: "Group Match".to_string(),
            }
        }
    }
}

fn write_matches<'a>(
    path: &Path,
    matches: impl Iterator<Item = &'a Match>,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;

    writer.write_record([
        "ID",
        "Type",
        "Bank_Date",
        "Bank_Amount",
        "Bank_Ref",
        "Bank_Desc",
        "Book_Date",
        "Book_Amount",
        "Book_Ref",
        "Book_Desc",
        "Variance",
    ])?;

    for m in matches {
        let bank = side_view(&m.bank);
        let book = side_view(&m.book);
        let row = [
            m.id.clone(),
            m.kind.label().to_string(),
            bank.date,
            format!("{:.2}", bank.amount),
            bank.ref_no,
            bank.desc,
            book.date,
            format!("{:.2}", book.amount),
            book.ref_no,
            book.desc,
            format!("{:.2}", m.amount_diff.unwrap_or(0.0)),
        ];
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

fn write_unmatched(path: &Path, items: &[Transaction]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create report file {}", path.display()))?;

    writer.write_record(["Date", "Amount", "Ref", "Desc"])?;
    for tx in items {
        let row = [
            tx.date.display(),
            format!("{:.2}", tx.amount),
            tx.ref_no.clone().unwrap_or_default(),
            tx.desc.clone().unwrap_or_default(),
        ];
        writer.write_record(&row)?;
    }

    writer.flush()?;
    Ok(())
}

/// Write the session as five CSV files mirroring the review workflow:
/// confirmed matches, potential review, amount-only suggestions and the two
/// unmatched sides. Returns the paths written.
pub fn export_session(dir: &Path, session: &ReconcileSession) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create report directory {}", dir.display()))?;

    let confirmed = dir.join("confirmed_matches.csv");
    let review = dir.join("potential_review.csv");
    let amount_only = dir.join("amount_only.csv");
    let bank = dir.join("unmatched_bank.csv");
    let book = dir.join("unmatched_book.csv");

    write_matches(&confirmed, session.confirmed())?;
    write_matches(&review, session.possible())?;
    write_matches(&amount_only, session.amount_only())?;
    write_unmatched(&bank, session.unmatched_bank())?;
    write_unmatched(&book, session.unmatched_book())?;

    Ok(vec![confirmed, review, amount_only, bank, book])
}

// ============================================================================
// TESTS
// ============================================================================
