// 💳 Canonical Transaction Model
// The normalized record shape shared by the matching pipeline and the archive

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

// ============================================================================
// DATE VALUE
// ============================================================================

/// Calendar date as an explicit tri-state.
///
/// Source data is heterogeneous: some rows carry a clean date, some carry
/// text no format matches, some carry nothing. The three cases behave
/// differently downstream (an `Invalid` date still contributes its raw text
/// to the fingerprint; both `Invalid` and `Missing` fail every
/// day-difference bound), so they are kept distinct instead of collapsing
/// into an `Option`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateValue {
    /// Successfully parsed calendar date
    Parsed(NaiveDate),

    /// Non-empty text that no supported format matched (raw text retained)
    Invalid(String),

    /// No date at all
    Missing,
}

/// Date formats accepted by the loader, tried in order.
/// ISO first, then day-first forms (the dominant regional convention in the
/// source ledgers), then month-first as a last resort.
const DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%m/%d/%Y"];

impl DateValue {
    pub fn parse(raw: &str) -> DateValue {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return DateValue::Missing;
        }
        for fmt in DATE_FORMATS {
            if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
                return DateValue::Parsed(date);
            }
        }
        DateValue::Invalid(trimmed.to_string())
    }

    pub fn as_date(&self) -> Option<NaiveDate> {
        match self {
            DateValue::Parsed(date) => Some(*date),
            _ => None,
        }
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, DateValue::Parsed(_))
    }

    /// Display form: ISO for parsed dates, raw text for invalid ones,
    /// empty for missing.
    pub fn display(&self) -> String {
        match self {
            DateValue::Parsed(date) => date.format("%Y-%m-%d").to_string(),
            DateValue::Invalid(raw) => raw.clone(),
            DateValue::Missing => String::new(),
        }
    }
}

/// Absolute day count between two dates.
///
/// `None` whenever either side is not a parsed date. Callers must treat
/// `None` as failing any day-difference bound check — an unknown distance
/// never satisfies a threshold.
pub fn day_diff(a: &DateValue, b: &DateValue) -> Option<i64> {
    match (a.as_date(), b.as_date()) {
        (Some(d1), Some(d2)) => Some((d2 - d1).num_days().abs()),
        _ => None,
    }
}

// ============================================================================
// SIGN
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Sign {
    Negative,
    Zero,
    Positive,
}

impl Sign {
    pub fn of(value: f64) -> Sign {
        if value > 0.0 {
            Sign::Positive
        } else if value < 0.0 {
            Sign::Negative
        } else {
            Sign::Zero
        }
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

/// A single ledger entry in canonical form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    /// Opaque unique id, assigned at load time; never reused within a run
    pub id: String,

    /// Calendar date (tri-state, see DateValue)
    pub date: DateValue,

    /// Non-negative magnitude of the transaction's effect
    pub amount: f64,

    /// Signed magnitude; positive = inflow, negative = outflow.
    /// None for legacy records where the sign was never captured —
    /// sign checks treat those as compatible with anything.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_amount: Option<f64>,

    /// Free-text reference / check number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_no: Option<String>,

    /// Free-text narration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
}

impl Transaction {
    /// Build from a signed amount, keeping `amount == display_amount.abs()`.
    pub fn new(id: impl Into<String>, date: DateValue, signed_amount: f64) -> Self {
        Transaction {
            id: id.into(),
            date,
            amount: signed_amount.abs(),
            display_amount: Some(signed_amount),
            ref_no: None,
            desc: None,
        }
    }

    /// Builder: attach a reference number
    pub fn with_ref(mut self, ref_no: impl Into<String>) -> Self {
        self.ref_no = Some(ref_no.into());
        self
    }

    /// Builder: attach a narration
    pub fn with_desc(mut self, desc: impl Into<String>) -> Self {
        self.desc = Some(desc.into());
        self
    }

    /// Builder: drop the signed amount (legacy record without sign data)
    pub fn with_unknown_sign(mut self) -> Self {
        self.display_amount = None;
        self
    }

    pub fn sign(&self) -> Option<Sign> {
        self.display_amount.map(Sign::of)
    }

    /// Zero and non-finite magnitudes can never participate in a match.
    pub fn is_matchable(&self) -> bool {
        self.amount.is_finite() && self.amount != 0.0
    }

    /// Reference number trimmed and lowercased; empty treated as absent.
    pub fn normalized_ref(&self) -> Option<String> {
        let normalized = self.ref_no.as_deref()?.trim().to_lowercase();
        if normalized.is_empty() {
            None
        } else {
            Some(normalized)
        }
    }
}

/// Sign compatibility between two records.
///
/// Signs must be equal when both sides carry a signed amount; when either
/// side lacks one the check is vacuously true (permissive fallback for
/// degraded data).
pub fn sign_compatible(a: &Transaction, b: &Transaction) -> bool {
    match (a.sign(), b.sign()) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// Strip currency symbols and grouping separators, keeping digits, the
/// decimal point and a leading minus. Unparsable text becomes 0.
pub fn normalize_amount(raw: &str) -> f64 {
    let clean: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    clean.parse::<f64>().unwrap_or(0.0)
}

#[derive(Debug, Deserialize)]
struct CsvRecord {
    #[serde(rename = "Date", default)]
    date: String,

    #[serde(rename = "Amount", default)]
    amount: String,

    #[serde(rename = "Ref", default)]
    ref_no: String,

    #[serde(rename = "Description", default)]
    desc: String,
}

fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Read canonical transactions from CSV (columns: Date, Amount, Ref,
/// Description). Each record gets a fresh id; the signed amount column
/// feeds both `amount` (magnitude) and `display_amount`.
pub fn read_transactions<R: Read>(reader: R) -> Result<Vec<Transaction>> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut transactions = Vec::new();

    for row in rdr.deserialize() {
        let record: CsvRecord = row.context("Failed to deserialize transaction row")?;
        let signed = normalize_amount(&record.amount);

        let mut tx = Transaction::new(
            uuid::Uuid::new_v4().to_string(),
            DateValue::parse(&record.date),
            signed,
        );
        tx.ref_no = non_empty(&record.ref_no);
        tx.desc = non_empty(&record.desc);
        transactions.push(tx);
    }

    Ok(transactions)
}

pub fn load_transactions(path: &Path) -> Result<Vec<Transaction>> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("Failed to open ledger file {}", path.display()))?;
    read_transactions(file)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_date_parse_formats() {
        assert_eq!(
            DateValue::parse("2024-01-05"),
            DateValue::Parsed(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
        assert_eq!(
            DateValue::parse("05/01/2024"),
            DateValue::Parsed(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
        assert_eq!(
            DateValue::parse("05-01-2024"),
            DateValue::Parsed(NaiveDate::from_ymd_opt(2024, 1, 5).unwrap())
        );
    }

    #[test]
    fn test_date_parse_degrades() {
        assert_eq!(DateValue::parse(""), DateValue::Missing);
        assert_eq!(DateValue::parse("   "), DateValue::Missing);
        assert_eq!(
            DateValue::parse("sometime in march"),
            DateValue::Invalid("sometime in march".to_string())
        );
    }

    #[test]
    fn test_day_diff_requires_both_parsed() {
        let a = DateValue::parse("2024-01-05");
        let b = DateValue::parse("2024-01-08");
        assert_eq!(day_diff(&a, &b), Some(3));
        assert_eq!(day_diff(&b, &a), Some(3));

        assert_eq!(day_diff(&a, &DateValue::Missing), None);
        assert_eq!(day_diff(&DateValue::Invalid("??".into()), &b), None);
    }

    #[test]
    fn test_normalize_amount_strips_noise() {
        assert_eq!(normalize_amount("1,234.56"), 1234.56);
        assert_eq!(normalize_amount("$45.99"), 45.99);
        assert_eq!(normalize_amount("-300.00 SAR"), -300.0);
        assert_eq!(normalize_amount("n/a"), 0.0);
    }

    #[test]
    fn test_sign_compatibility() {
        let deposit = Transaction::new("a", DateValue::Missing, 100.0);
        let withdrawal = Transaction::new("b", DateValue::Missing, -100.0);
        let legacy = Transaction::new("c", DateValue::Missing, 100.0).with_unknown_sign();

        assert!(!sign_compatible(&deposit, &withdrawal));
        assert!(sign_compatible(&deposit, &deposit));
        assert!(sign_compatible(&deposit, &legacy));
        assert!(sign_compatible(&withdrawal, &legacy));
    }

    #[test]
    fn test_zero_amount_not_matchable() {
        let zero = Transaction::new("z", DateValue::Missing, 0.0);
        assert!(!zero.is_matchable());
        let normal = Transaction::new("n", DateValue::parse("2024-01-05"), 12.5);
        assert!(normal.is_matchable());
    }

    #[test]
    fn test_normalized_ref() {
        let tx = Transaction::new("a", DateValue::Missing, 10.0).with_ref("  CHK99 ");
        assert_eq!(tx.normalized_ref(), Some("chk99".to_string()));

        let blank = Transaction::new("b", DateValue::Missing, 10.0).with_ref("   ");
        assert_eq!(blank.normalized_ref(), None);
    }

    #[test]
    fn test_read_transactions_from_csv() {
        let data = "\
Date,Amount,Ref,Description
2024-01-05,100.00,CHK99,Office rent
05/02/2024,-45.99,,Card payment
,$1.5,,
";
        let txs = read_transactions(data.as_bytes()).unwrap();
        assert_eq!(txs.len(), 3);

        assert_eq!(txs[0].amount, 100.0);
        assert_eq!(txs[0].display_amount, Some(100.0));
        assert_eq!(txs[0].ref_no.as_deref(), Some("CHK99"));
        assert!(txs[0].date.is_parsed());

        assert_eq!(txs[1].amount, 45.99);
        assert_eq!(txs[1].display_amount, Some(-45.99));
        assert_eq!(txs[1].ref_no, None);

        assert_eq!(txs[2].date, DateValue::Missing);
        assert_eq!(txs[2].amount, 1.5);

        // ids are unique
        assert_ne!(txs[0].id, txs[1].id);
    }
}
