// 🧾 Reconcile Session - the human phase after the pipeline
// Holds the pipeline outcome, buckets matches by confidence, and applies
// manual actions: match, unmatch, approve. Manual matches with unequal
// totals pass through a two-step confirmation gate.

use crate::matching::{Match, MatchKind, MatchSide, MatchStatus, ReconcileOutcome};
use crate::ranking::rank_candidates;
use crate::transaction::Transaction;
use serde::Serialize;
use std::fmt;

/// Selection totals differing by more than this require the two-step
/// confirmation before a manual match is recorded.
pub const MANUAL_VARIANCE_GATE: f64 = 0.02;

// ============================================================================
// MANUAL CONFIRMATION GATE
// ============================================================================

/// Escalation level supplied with a manual-match request. The gate is
/// friction against accidental unequal matches, not a technical check: the
/// caller must come back twice, each time with the next level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Confirmation {
    None,
    AcknowledgeVariance,
    RecordDiscrepancy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ManualMatchError {
    /// Nothing selected on either side
    EmptySelection,

    /// A selected id is not in the unmatched pools
    UnknownId(String),

    /// First gate: totals differ, caller must acknowledge
    VarianceWarning { diff: f64 },

    /// Second gate: caller must explicitly record the difference as a
    /// discrepancy
    RecordDiscrepancyRequired { diff: f64 },
}

impl fmt::Display for ManualMatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ManualMatchError::EmptySelection => write!(f, "no records selected"),
            ManualMatchError::UnknownId(id) => {
                write!(f, "no unmatched record with id {id}")
            }
            ManualMatchError::VarianceWarning { diff } => {
                write!(
                    f,
                    "selection totals differ by {diff:.2}; acknowledge the variance to continue"
                )
            }
            ManualMatchError::RecordDiscrepancyRequired { diff } => {
                write!(
                    f,
                    "confirm recording the {diff:.2} difference as a discrepancy"
                )
            }
        }
    }
}

impl std::error::Error for ManualMatchError {}

// ============================================================================
// SESSION
// ============================================================================

pub struct ReconcileSession {
    matches: Vec<Match>,
    unmatched_bank: Vec<Transaction>,
    unmatched_book: Vec<Transaction>,
    manual_seq: usize,
}

impl ReconcileSession {
    pub fn new(outcome: ReconcileOutcome) -> Self {
        ReconcileSession {
            matches: outcome.matches,
            unmatched_bank: outcome.residual_bank,
            unmatched_book: outcome.residual_book,
            manual_seq: 0,
        }
    }

    pub fn matches(&self) -> &[Match] {
        &self.matches
    }

    pub fn unmatched_bank(&self) -> &[Transaction] {
        &self.unmatched_bank
    }

    pub fn unmatched_book(&self) -> &[Transaction] {
        &self.unmatched_book
    }

    // ========================================================================
    // CONFIDENCE BUCKETS
    // ========================================================================

    /// Exact, grouped and manual matches: safe to confirm as-is.
    pub fn confirmed(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(|m| m.kind.is_confirmed())
    }

    /// Evidence-backed but date-drifted: needs a human eye.
    pub fn possible(&self) -> impl Iterator<Item = &Match> {
        self.matches
            .iter()
            .filter(|m| m.kind == MatchKind::PotentialStrong)
    }

    /// Same-number-only and variance suggestions: weakest bucket.
    pub fn amount_only(&self) -> impl Iterator<Item = &Match> {
        self.matches.iter().filter(|m| {
            matches!(
                m.kind,
                MatchKind::PotentialAmount | MatchKind::AmountVariance
            )
        })
    }

    // ========================================================================
    // RANKED SUGGESTIONS
    // ========================================================================

    /// Unmatched book records ordered against the selected bank records.
    pub fn suggest_book(&self, selected_bank_ids: &[&str]) -> Vec<Transaction> {
        let selection = select(&self.unmatched_bank, selected_bank_ids);
        rank_candidates(&self.unmatched_book, &selection)
    }

    /// Unmatched bank records ordered against the selected book records.
    pub fn suggest_bank(&self, selected_book_ids: &[&str]) -> Vec<Transaction> {
        let selection = select(&self.unmatched_book, selected_book_ids);
        rank_candidates(&self.unmatched_bank, &selection)
    }

    // ========================================================================
    // MANUAL ACTIONS
    // ========================================================================

    /// Commit a manual match from the unmatched pools.
    ///
    /// Totals are the signed amounts where known. When they differ by more
    /// than MANUAL_VARIANCE_GATE the call fails twice — first with
    /// `VarianceWarning`, then with `RecordDiscrepancyRequired` — until the
    /// caller escalates `confirmation` accordingly. One-sided selections are
    /// allowed (write-offs).
    pub fn manual_match(
        &mut self,
        bank_ids: &[&str],
        book_ids: &[&str],
        confirmation: Confirmation,
    ) -> Result<&Match, ManualMatchError> {
        let bank_sel = select_strict(&self.unmatched_bank, bank_ids)?;
        let book_sel = select_strict(&self.unmatched_book, book_ids)?;
        if bank_sel.is_empty() && book_sel.is_empty() {
            return Err(ManualMatchError::EmptySelection);
        }

        let bank_total = signed_total(&bank_sel);
        let book_total = signed_total(&book_sel);
        let diff = (bank_total - book_total).abs();

        if diff > MANUAL_VARIANCE_GATE {
            match confirmation {
                Confirmation::None => return Err(ManualMatchError::VarianceWarning { diff }),
                Confirmation::AcknowledgeVariance => {
                    return Err(ManualMatchError::RecordDiscrepancyRequired { diff })
                }
                Confirmation::RecordDiscrepancy => {}
            }
        }

        self.unmatched_bank
            .retain(|tx| !bank_ids.contains(&tx.id.as_str()));
        self.unmatched_book
            .retain(|tx| !book_ids.contains(&tx.id.as_str()));

        self.manual_seq += 1;
        let m = Match {
            id: format!("manual-{}", self.manual_seq),
            kind: MatchKind::Manual,
            bank: MatchSide::from_vec(bank_sel),
            book: MatchSide::from_vec(book_sel),
            amount: bank_total,
            amount_diff: if diff > 0.0 { Some(diff) } else { None },
            date_diff: 0,
            status: MatchStatus::Confirmed,
        };
        self.matches.insert(0, m);
        Ok(&self.matches[0])
    }

    /// Revert a match: delete it and return its constituents to the ends of
    /// the unmatched pools. Returns false when the id is unknown.
    pub fn unmatch(&mut self, match_id: &str) -> bool {
        let Some(pos) = self.matches.iter().position(|m| m.id == match_id) else {
            return false;
        };
        let m = self.matches.remove(pos);
        match m.bank {
            MatchSide::Single(tx) => self.unmatched_bank.push(tx),
            MatchSide::Group(txs) => self.unmatched_bank.extend(txs),
        }
        match m.book {
            MatchSide::Single(tx) => self.unmatched_book.push(tx),
            MatchSide::Group(txs) => self.unmatched_book.extend(txs),
        }
        true
    }

    /// Promote a review-bucket match to confirmed status. Workflow label
    /// only; the match itself is untouched.
    pub fn approve(&mut self, match_id: &str) -> bool {
        match self.matches.iter_mut().find(|m| m.id == match_id) {
            Some(m) => {
                m.status = MatchStatus::Confirmed;
                true
            }
            None => false,
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let (confirmed_count, confirmed_total) = bucket_totals(self.confirmed());
        let (possible_count, possible_total) = bucket_totals(self.possible());
        let (amount_only_count, amount_only_total) = bucket_totals(self.amount_only());
        SessionSummary {
            confirmed_count,
            confirmed_total,
            possible_count,
            possible_total,
            amount_only_count,
            amount_only_total,
            unmatched_bank_count: self.unmatched_bank.len(),
            unmatched_bank_total: self.unmatched_bank.iter().map(|tx| tx.amount).sum(),
            unmatched_book_count: self.unmatched_book.len(),
            unmatched_book_total: self.unmatched_book.iter().map(|tx| tx.amount).sum(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub confirmed_count: usize,
    pub confirmed_total: f64,
    pub possible_count: usize,
    pub possible_total: f64,
    pub amount_only_count: usize,
    pub amount_only_total: f64,
    pub unmatched_bank_count: usize,
    pub unmatched_bank_total: f64,
    pub unmatched_book_count: usize,
    pub unmatched_book_total: f64,
}

// ============================================================================
// HELPERS
// ============================================================================

fn bucket_totals<'a>(matches: impl Iterator<Item = &'a Match>) -> (usize, f64) {
    matches.fold((0, 0.0), |(count, total), m| (count + 1, total + m.amount))
}

fn signed_total(txs: &[Transaction]) -> f64 {
    txs.iter()
        .map(|tx| tx.display_amount.unwrap_or(tx.amount))
        .sum()
}

/// Pool records whose ids are in the selection, in pool order; unknown ids
/// are ignored.
fn select(pool: &[Transaction], ids: &[&str]) -> Vec<Transaction> {
    pool.iter()
        .filter(|tx| ids.contains(&tx.id.as_str()))
        .cloned()
        .collect()
}

fn select_strict(pool: &[Transaction], ids: &[&str]) -> Result<Vec<Transaction>, ManualMatchError> {
    for id in ids {
        if !pool.iter().any(|tx| tx.id == *id) {
            return Err(ManualMatchError::UnknownId((*id).to_string()));
        }
    }
    Ok(select(pool, ids))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matching::{MatchEngine, ReconcileOptions};
    use crate::transaction::DateValue;

    fn tx(id: &str, date: &str, signed_amount: f64) -> Transaction {
        Transaction::new(id, DateValue::parse(date), signed_amount)
    }

    fn session(bank: Vec<Transaction>, book: Vec<Transaction>) -> ReconcileSession {
        let outcome = MatchEngine::new().reconcile(&bank, &book, &ReconcileOptions::default());
        ReconcileSession::new(outcome)
    }

    #[test]
    fn test_buckets() {
        let bank = vec![
            tx("b1", "2024-01-05", 100.0),
            tx("b2", "2024-01-01", 50.0).with_ref("CHK9"),
            tx("b3", "2024-02-01", 40.02),
        ];
        let book = vec![
            tx("k1", "2024-01-05", 100.0),
            tx("k2", "2024-02-10", 50.0).with_ref("CHK9"),
            tx("k3", "2024-02-01", 40.00),
        ];
        let s = session(bank, book);

        assert_eq!(s.confirmed().count(), 1);
        assert_eq!(s.possible().count(), 1);
        assert_eq!(s.amount_only().count(), 1);
    }

    #[test]
    fn test_manual_match_equal_totals() {
        let mut s = session(
            vec![tx("b1", "2024-01-05", 80.0)],
            vec![tx("k1", "2024-03-05", 80.0)],
        );
        assert_eq!(s.unmatched_bank().len(), 1);

        let m = s
            .manual_match(&["b1"], &["k1"], Confirmation::None)
            .unwrap()
            .clone();
        assert_eq!(m.kind, MatchKind::Manual);
        assert_eq!(m.status, MatchStatus::Confirmed);
        assert_eq!(m.amount, 80.0);
        assert!(s.unmatched_bank().is_empty());
        assert!(s.unmatched_book().is_empty());
    }

    #[test]
    fn test_manual_match_two_step_gate() {
        let mut s = session(
            vec![tx("b1", "2024-01-05", 80.0)],
            vec![tx("k1", "2024-03-05", 75.0)],
        );

        let first = s.manual_match(&["b1"], &["k1"], Confirmation::None);
        assert!(matches!(first, Err(ManualMatchError::VarianceWarning { .. })));

        let second = s.manual_match(&["b1"], &["k1"], Confirmation::AcknowledgeVariance);
        assert!(matches!(
            second,
            Err(ManualMatchError::RecordDiscrepancyRequired { .. })
        ));

        // pools untouched while the gate holds
        assert_eq!(s.unmatched_bank().len(), 1);

        let third = s
            .manual_match(&["b1"], &["k1"], Confirmation::RecordDiscrepancy)
            .unwrap()
            .clone();
        let diff = third.amount_diff.unwrap();
        assert!((diff - 5.0).abs() < 1e-9);
        assert!(s.unmatched_bank().is_empty());
    }

    #[test]
    fn test_manual_match_one_sided_write_off() {
        let mut s = session(vec![tx("b1", "2024-01-05", 0.01)], vec![]);
        let result = s.manual_match(&["b1"], &[], Confirmation::None);
        assert!(result.is_ok());
        assert!(s.unmatched_bank().is_empty());
    }

    #[test]
    fn test_manual_match_unknown_id() {
        let mut s = session(vec![tx("b1", "2024-01-05", 10.0)], vec![]);
        let result = s.manual_match(&["nope"], &[], Confirmation::None);
        assert_eq!(
            result.unwrap_err(),
            ManualMatchError::UnknownId("nope".to_string())
        );
    }

    #[test]
    fn test_manual_match_empty_selection() {
        let mut s = session(vec![], vec![]);
        let result = s.manual_match(&[], &[], Confirmation::None);
        assert_eq!(result.unwrap_err(), ManualMatchError::EmptySelection);
    }

    #[test]
    fn test_unmatch_restores_pools() {
        let bank = vec![tx("b1", "2024-03-02", 150.0), tx("b2", "2024-03-02", 150.0)];
        let book = vec![tx("k1", "2024-03-01", 300.0)];
        let mut s = session(bank, book);
        assert_eq!(s.matches().len(), 1);
        let id = s.matches()[0].id.clone();

        assert!(s.unmatch(&id));
        assert!(s.matches().is_empty());
        assert_eq!(s.unmatched_bank().len(), 2);
        assert_eq!(s.unmatched_book().len(), 1);

        assert!(!s.unmatch("gone"));
    }

    #[test]
    fn test_approve_flips_status_only() {
        let bank = vec![tx("b1", "2024-01-01", 50.0).with_ref("CHK9")];
        let book = vec![tx("k1", "2024-02-10", 50.0).with_ref("CHK9")];
        let mut s = session(bank, book);

        let id = s.matches()[0].id.clone();
        assert_eq!(s.matches()[0].status, MatchStatus::NeedsReview);
        assert!(s.approve(&id));
        assert_eq!(s.matches()[0].status, MatchStatus::Confirmed);
        assert_eq!(s.matches()[0].kind, MatchKind::PotentialStrong);
    }

    #[test]
    fn test_suggestions_use_ranking() {
        let bank = vec![tx("b1", "2024-01-05", 60.0).with_ref("CHK77")];
        let book = vec![
            tx("k1", "2024-01-08", 10.0),
            tx("k2", "2024-04-01", 60.0).with_ref("CHK77"),
        ];
        // amounts/dates chosen so the pipeline matches nothing
        let s = session(bank, book);

        let ranked = s.suggest_book(&["b1"]);
        assert_eq!(ranked[0].id, "k2");
    }

    #[test]
    fn test_summary_counts() {
        let bank = vec![tx("b1", "2024-01-05", 100.0), tx("b2", "2024-09-01", 5.0)];
        let book = vec![tx("k1", "2024-01-05", 100.0)];
        let s = session(bank, book);
        let summary = s.summary();

        assert_eq!(summary.confirmed_count, 1);
        assert_eq!(summary.confirmed_total, 100.0);
        assert_eq!(summary.unmatched_bank_count, 1);
        assert_eq!(summary.unmatched_book_count, 0);
    }
}
