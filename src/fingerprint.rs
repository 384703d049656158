// 🔑 Fingerprint Engine - stable identity strings for duplicate detection
// Independent of the matching pipeline: equal fingerprints mean "same
// real-world record already archived", never "these two entries reconcile".

use crate::transaction::{DateValue, Transaction};

/// Date token when a record carries no date at all.
pub const NO_DATE: &str = "no-date";

/// Date token when a record carries date text that could not be used.
pub const INVALID_DATE: &str = "invalid-date";

/// A reference shorter than this is too weak to serve as identity on its own.
pub const MIN_REF_LEN: usize = 3;

/// How much of an unparsable date / of the narration feeds the key.
const EXCERPT_LEN: usize = 10;

/// Derive the archive key for a transaction.
///
/// Pure and total: malformed fields degrade into fixed tokens, never into a
/// panic. A reference number plus amount is treated as sufficient identity;
/// without one, a coarse date + amount + narration excerpt stands in.
/// Collisions are accepted by design — two records indistinguishable by
/// these fields are treated as duplicates rather than risking a repeat
/// import of the same entry.
pub fn fingerprint(tx: &Transaction) -> String {
    let amount = if tx.amount.is_finite() {
        format!("{:.2}", tx.amount)
    } else {
        "0.00".to_string()
    };

    if let Some(ref_no) = tx.normalized_ref() {
        if ref_no.chars().count() >= MIN_REF_LEN {
            return format!("REF:{ref_no}|AMT:{amount}");
        }
    }

    let date_str = match &tx.date {
        DateValue::Parsed(date) => date.format("%Y-%m-%d").to_string(),
        DateValue::Invalid(raw) if !raw.is_empty() => raw.chars().take(EXCERPT_LEN).collect(),
        DateValue::Invalid(_) => INVALID_DATE.to_string(),
        DateValue::Missing => NO_DATE.to_string(),
    };

    let desc_hash: String = tx
        .desc
        .as_deref()
        .unwrap_or("")
        .to_lowercase()
        .chars()
        .filter(|c| !c.is_whitespace())
        .take(EXCERPT_LEN)
        .collect();

    format!("NOREF:{date_str}|AMT:{amount}|DSC:{desc_hash}")
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::DateValue;

    fn tx(signed_amount: f64) -> Transaction {
        Transaction::new("t1", DateValue::parse("2024-01-05"), signed_amount)
    }

    #[test]
    fn test_ref_path_normalizes() {
        let a = tx(12.5).with_ref("  CHK99 ");
        assert_eq!(fingerprint(&a), "REF:chk99|AMT:12.50");
    }

    #[test]
    fn test_short_ref_falls_back() {
        // two characters is below the identity threshold
        let a = tx(12.5).with_ref("A1").with_desc("Office rent");
        assert_eq!(fingerprint(&a), "NOREF:2024-01-05|AMT:12.50|DSC:officerent");
    }

    #[test]
    fn test_missing_date_token() {
        let a = Transaction::new("t1", DateValue::Missing, 7.0);
        assert_eq!(fingerprint(&a), "NOREF:no-date|AMT:7.00|DSC:");
    }

    #[test]
    fn test_invalid_date_excerpt() {
        let a = Transaction::new("t1", DateValue::Invalid("sometime in march".into()), 7.0);
        assert_eq!(fingerprint(&a), "NOREF:sometime i|AMT:7.00|DSC:");
    }

    #[test]
    fn test_desc_excerpt_ignores_whitespace() {
        // narration differing only in spacing collapses to the same key
        let a = tx(30.0).with_desc("Wire  Transfer Fee");
        let b = tx(30.0).with_desc("WireTransferFee");
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_eq!(fingerprint(&a), "NOREF:2024-01-05|AMT:30.00|DSC:wiretransf");
    }

    #[test]
    fn test_stable_across_calls() {
        let a = tx(99.99).with_ref("INV-2024-001");
        assert_eq!(fingerprint(&a), fingerprint(&a));
    }

    #[test]
    fn test_amount_fixed_two_decimals() {
        let a = tx(12.0).with_ref("CHK42");
        assert_eq!(fingerprint(&a), "REF:chk42|AMT:12.00");
    }
}
