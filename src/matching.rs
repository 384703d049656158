// ⚖️ Matching Pipeline - six-pass classification of bank vs book entries
// Greedy, first-fit-in-input-order, non-backtracking: a record consumed by
// an earlier pass is gone for all later passes. Predictable and explainable
// pairing, deliberately NOT an optimal bipartite assignment.

use crate::transaction::{day_diff, sign_compatible, Transaction};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

// ============================================================================
// TOLERANCES
// ============================================================================

/// Two amounts closer than this are considered equal.
pub const AMOUNT_EPSILON: f64 = 0.01;

/// Allowed drift between a group's sum and its anchor amount.
pub const GROUP_SUM_TOLERANCE: f64 = 0.05;

/// Date window for evidence-backed matches (delayed check clearing).
pub const STRONG_DATE_WINDOW: i64 = 60;

/// Grouping passes widen the caller's tolerance to at least this.
pub const GROUP_MIN_WINDOW: i64 = 3;

/// Amount-only suggestions widen the caller's tolerance to at least this.
pub const AMOUNT_ONLY_MIN_WINDOW: i64 = 7;

/// Variance suggestions widen the caller's tolerance to at least this.
pub const VARIANCE_MIN_WINDOW: i64 = 5;

/// Variance matches cover amount differences in [AMOUNT_EPSILON, VARIANCE_MAX).
pub const VARIANCE_MAX: f64 = 1.0;

/// Subset-search cap: a one-to-many group never exceeds this many members.
pub const MAX_GROUP_SIZE: usize = 5;

/// Grouped matches need at least this many members.
pub const MIN_GROUP_MEMBERS: usize = 2;

// ============================================================================
// MATCH TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchKind {
    /// Same amount, same day, sign-compatible (ref equality when required)
    #[serde(rename = "Exact")]
    Exact,

    /// Same amount within 60 days, backed by ref or narration evidence
    #[serde(rename = "Potential-Strong")]
    PotentialStrong,

    /// Several bank entries summing to one book entry
    #[serde(rename = "Many-to-One")]
    ManyToOne,

    /// One bank entry split across several book entries
    #[serde(rename = "One-to-Many (Smart)")]
    OneToMany,

    /// Same amount, plausible date, no supporting evidence
    #[serde(rename = "Potential-Amount")]
    PotentialAmount,

    /// Near-identical amounts, likely a rounding or fee discrepancy
    #[serde(rename = "Amount-Variance")]
    AmountVariance,

    /// Committed by a human from the unmatched pools
    #[serde(rename = "Manual-Match")]
    Manual,
}

impl MatchKind {
    pub fn label(&self) -> &'static str {
        match self {
            MatchKind::Exact => "Exact",
            MatchKind::PotentialStrong => "Potential-Strong",
            MatchKind::ManyToOne => "Many-to-One",
            MatchKind::OneToMany => "One-to-Many (Smart)",
            MatchKind::PotentialAmount => "Potential-Amount",
            MatchKind::AmountVariance => "Amount-Variance",
            MatchKind::Manual => "Manual-Match",
        }
    }

    pub(crate) fn id_prefix(&self) -> &'static str {
        match self {
            MatchKind::Exact => "perfect",
            MatchKind::PotentialStrong => "strong",
            MatchKind::ManyToOne => "m2o",
            MatchKind::OneToMany => "o2m",
            MatchKind::PotentialAmount => "amount",
            MatchKind::AmountVariance => "var",
            MatchKind::Manual => "manual",
        }
    }

    /// Kinds trusted enough to land in the confirmed bucket without review.
    pub fn is_confirmed(&self) -> bool {
        matches!(
            self,
            MatchKind::Exact | MatchKind::ManyToOne | MatchKind::OneToMany | MatchKind::Manual
        )
    }

    fn default_status(&self) -> MatchStatus {
        if self.is_confirmed() {
            MatchStatus::Confirmed
        } else {
            MatchStatus::NeedsReview
        }
    }
}

/// One side of a match: a single record, or an ordered group for the
/// grouped kinds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MatchSide {
    Single(Transaction),
    Group(Vec<Transaction>),
}

impl MatchSide {
    pub fn transactions(&self) -> &[Transaction] {
        match self {
            MatchSide::Single(tx) => std::slice::from_ref(tx),
            MatchSide::Group(txs) => txs,
        }
    }

    pub fn len(&self) -> usize {
        self.transactions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions().is_empty()
    }

    pub fn total(&self) -> f64 {
        self.transactions().iter().map(|tx| tx.amount).sum()
    }

    pub(crate) fn from_vec(mut txs: Vec<Transaction>) -> MatchSide {
        if txs.len() == 1 {
            MatchSide::Single(txs.remove(0))
        } else {
            MatchSide::Group(txs)
        }
    }
}

/// Workflow label only — never consulted by matching logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchStatus {
    #[serde(rename = "confirmed")]
    Confirmed,
    #[serde(rename = "needs-review")]
    NeedsReview,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    /// Deterministic per run: `<kind-prefix>-<seq>` in creation order
    pub id: String,

    #[serde(rename = "matchType")]
    pub kind: MatchKind,

    pub bank: MatchSide,
    pub book: MatchSide,

    /// Matched magnitude (the anchor side's total)
    pub amount: f64,

    /// Signed variance (bank - book), present for variance-class matches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount_diff: Option<f64>,

    /// Day count between the two sides (0 where not meaningful)
    pub date_diff: i64,

    pub status: MatchStatus,
}

// ============================================================================
// ENGINE
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOptions {
    /// Acceptable clearing delay in days (>= 0)
    pub tolerance_days: i64,

    /// Pass 1 additionally demands equal non-empty reference numbers
    pub require_ref_match: bool,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        ReconcileOptions {
            tolerance_days: 0,
            require_ref_match: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub matches: Vec<Match>,
    pub residual_bank: Vec<Transaction>,
    pub residual_book: Vec<Transaction>,
}

pub struct MatchEngine {
    pub amount_epsilon: f64,
    pub group_sum_tolerance: f64,
    pub strong_date_window: i64,
    pub group_min_window: i64,
    pub amount_only_min_window: i64,
    pub variance_min_window: i64,
    pub variance_max: f64,
    pub max_group_size: usize,
}

impl MatchEngine {
    pub fn new() -> Self {
        MatchEngine {
            amount_epsilon: AMOUNT_EPSILON,
            group_sum_tolerance: GROUP_SUM_TOLERANCE,
            strong_date_window: STRONG_DATE_WINDOW,
            group_min_window: GROUP_MIN_WINDOW,
            amount_only_min_window: AMOUNT_ONLY_MIN_WINDOW,
            variance_min_window: VARIANCE_MIN_WINDOW,
            variance_max: VARIANCE_MAX,
            max_group_size: MAX_GROUP_SIZE,
        }
    }

    /// Run the full six-pass pipeline.
    ///
    /// Inputs are never mutated; zero/non-finite amounts are filtered out
    /// before pass 1 and appear in neither matches nor residuals. Output is
    /// deterministic for identical inputs and options.
    pub fn reconcile(
        &self,
        bank: &[Transaction],
        book: &[Transaction],
        opts: &ReconcileOptions,
    ) -> ReconcileOutcome {
        let bank: Vec<Transaction> = bank.iter().filter(|tx| tx.is_matchable()).cloned().collect();
        let book: Vec<Transaction> = book.iter().filter(|tx| tx.is_matchable()).cloned().collect();

        let mut matches = Vec::new();
        let mut seq = 0usize;

        // Pass 1: exact amount, same day, ref equality when demanded
        let (bank, book) =
            self.exact_pass(bank, book, opts.require_ref_match, &mut matches, &mut seq);

        // Pass 2: exact amount, evidence-backed, loose date
        let (bank, book) = self.strong_pass(bank, book, &mut matches, &mut seq);

        // Pass 3: several bank entries covering one book entry
        let (bank, book) =
            self.many_to_one_pass(bank, book, opts.tolerance_days, &mut matches, &mut seq);

        // Pass 4: one bank entry split across several book entries
        let (bank, book) =
            self.one_to_many_pass(bank, book, opts.tolerance_days, &mut matches, &mut seq);

        // Pass 5: exact amount, plausible date, no evidence
        let (bank, book) =
            self.amount_only_pass(bank, book, opts.tolerance_days, &mut matches, &mut seq);

        // Pass 6: near-identical amounts (rounding / fee discrepancies)
        let (bank, book) =
            self.variance_pass(bank, book, opts.tolerance_days, &mut matches, &mut seq);

        ReconcileOutcome {
            matches,
            residual_bank: bank,
            residual_book: book,
        }
    }

    // ========================================================================
    // PAIRWISE PASSES
    // ========================================================================

    /// Shared scaffolding for the one-to-one passes: scan bank records in
    /// input order, take the first acceptable not-yet-consumed book record.
    fn pairwise_pass<F>(
        &self,
        bank: Vec<Transaction>,
        book: Vec<Transaction>,
        kind: MatchKind,
        matches: &mut Vec<Match>,
        seq: &mut usize,
        accept: F,
    ) -> (Vec<Transaction>, Vec<Transaction>)
    where
        F: Fn(&Transaction, &Transaction) -> bool,
    {
        let mut used = vec![false; book.len()];
        let mut residual_bank = Vec::with_capacity(bank.len());

        for bank_tx in bank {
            let mut hit = None;
            for (i, book_tx) in book.iter().enumerate() {
                if !used[i] && accept(&bank_tx, book_tx) {
                    hit = Some(i);
                    break;
                }
            }

            match hit {
                Some(i) => {
                    used[i] = true;
                    let book_tx = book[i].clone();
                    let date_diff = day_diff(&bank_tx.date, &book_tx.date).unwrap_or(0);
                    let amount = bank_tx.amount;
                    let amount_diff = if kind == MatchKind::AmountVariance {
                        Some(bank_tx.amount - book_tx.amount)
                    } else {
                        None
                    };
                    *seq += 1;
                    matches.push(Match {
                        id: format!("{}-{}", kind.id_prefix(), *seq),
                        kind,
                        bank: MatchSide::Single(bank_tx),
                        book: MatchSide::Single(book_tx),
                        amount,
                        amount_diff,
                        date_diff,
                        status: kind.default_status(),
                    });
                }
                None => residual_bank.push(bank_tx),
            }
        }

        let residual_book = book
            .into_iter()
            .zip(used)
            .filter(|(_, consumed)| !*consumed)
            .map(|(tx, _)| tx)
            .collect();

        (residual_bank, residual_book)
    }

    fn exact_pass(
        &self,
        bank: Vec<Transaction>,
        book: Vec<Transaction>,
        require_ref: bool,
        matches: &mut Vec<Match>,
        seq: &mut usize,
    ) -> (Vec<Transaction>, Vec<Transaction>) {
        self.pairwise_pass(bank, book, MatchKind::Exact, matches, seq, |b, k| {
            if (b.amount - k.amount).abs() >= self.amount_epsilon {
                return false;
            }
            if day_diff(&b.date, &k.date) != Some(0) {
                return false;
            }
            if require_ref && !refs_equal(b, k) {
                return false;
            }
            sign_compatible(b, k)
        })
    }

    fn strong_pass(
        &self,
        bank: Vec<Transaction>,
        book: Vec<Transaction>,
        matches: &mut Vec<Match>,
        seq: &mut usize,
    ) -> (Vec<Transaction>, Vec<Transaction>) {
        self.pairwise_pass(bank, book, MatchKind::PotentialStrong, matches, seq, |b, k| {
            if (b.amount - k.amount).abs() >= self.amount_epsilon {
                return false;
            }
            if !sign_compatible(b, k) {
                return false;
            }
            match day_diff(&b.date, &k.date) {
                Some(diff) if diff <= self.strong_date_window => {}
                _ => return false,
            }
            refs_equal(b, k) || desc_overlap(b.desc.as_deref(), k.desc.as_deref())
        })
    }

    fn amount_only_pass(
        &self,
        bank: Vec<Transaction>,
        book: Vec<Transaction>,
        tolerance_days: i64,
        matches: &mut Vec<Match>,
        seq: &mut usize,
    ) -> (Vec<Transaction>, Vec<Transaction>) {
        // tolerance 0 usually means "strict", but suggestions still help
        let window = self.amount_only_min_window.max(tolerance_days);
        self.pairwise_pass(bank, book, MatchKind::PotentialAmount, matches, seq, |b, k| {
            (b.amount - k.amount).abs() < self.amount_epsilon
                && sign_compatible(b, k)
                && matches!(day_diff(&b.date, &k.date), Some(diff) if diff <= window)
        })
    }

    fn variance_pass(
        &self,
        bank: Vec<Transaction>,
        book: Vec<Transaction>,
        tolerance_days: i64,
        matches: &mut Vec<Match>,
        seq: &mut usize,
    ) -> (Vec<Transaction>, Vec<Transaction>) {
        let window = self.variance_min_window.max(tolerance_days);
        self.pairwise_pass(bank, book, MatchKind::AmountVariance, matches, seq, |b, k| {
            if !sign_compatible(b, k) {
                return false;
            }
            let diff = (b.amount - k.amount).abs();
            if diff < self.amount_epsilon || diff >= self.variance_max {
                return false;
            }
            matches!(day_diff(&b.date, &k.date), Some(days) if days <= window)
        })
    }

    // ========================================================================
    // GROUPING PASSES
    // ========================================================================

    /// For each book anchor, take ALL eligible bank candidates and test their
    /// sum. Deliberately no subset search: with more candidates in the window
    /// than the sum needs, the group is rejected rather than narrowed.
    fn many_to_one_pass(
        &self,
        bank: Vec<Transaction>,
        book: Vec<Transaction>,
        tolerance_days: i64,
        matches: &mut Vec<Match>,
        seq: &mut usize,
    ) -> (Vec<Transaction>, Vec<Transaction>) {
        let range = self.group_min_window.max(tolerance_days);
        let mut bank_used = vec![false; bank.len()];
        let mut book_used = vec![false; book.len()];

        for (anchor_idx, anchor) in book.iter().enumerate() {
            if book_used[anchor_idx] {
                continue;
            }

            let mut candidates = Vec::new();
            let mut sum = 0.0;
            for (i, candidate) in bank.iter().enumerate() {
                if bank_used[i] || !sign_compatible(candidate, anchor) {
                    continue;
                }
                if let Some(diff) = day_diff(&anchor.date, &candidate.date) {
                    if diff <= range {
                        candidates.push(i);
                        sum += candidate.amount;
                    }
                }
            }

            if candidates.len() >= MIN_GROUP_MEMBERS
                && (sum - anchor.amount).abs() < self.group_sum_tolerance
            {
                book_used[anchor_idx] = true;
                for &i in &candidates {
                    bank_used[i] = true;
                }
                *seq += 1;
                matches.push(Match {
                    id: format!("{}-{}", MatchKind::ManyToOne.id_prefix(), *seq),
                    kind: MatchKind::ManyToOne,
                    bank: MatchSide::Group(candidates.iter().map(|&i| bank[i].clone()).collect()),
                    book: MatchSide::Single(anchor.clone()),
                    amount: anchor.amount,
                    amount_diff: None,
                    date_diff: 0,
                    status: MatchKind::ManyToOne.default_status(),
                });
            }
        }

        (
            retain_unused(bank, &bank_used),
            retain_unused(book, &book_used),
        )
    }

    /// For each bank anchor, bounded depth-first subset search over book
    /// candidates sorted by descending amount. First subset within tolerance
    /// wins — not necessarily the smallest or best one.
    fn one_to_many_pass(
        &self,
        bank: Vec<Transaction>,
        book: Vec<Transaction>,
        tolerance_days: i64,
        matches: &mut Vec<Match>,
        seq: &mut usize,
    ) -> (Vec<Transaction>, Vec<Transaction>) {
        let range = self.group_min_window.max(tolerance_days);
        let mut bank_used = vec![false; bank.len()];
        let mut book_used = vec![false; book.len()];

        for (anchor_idx, anchor) in bank.iter().enumerate() {
            if bank_used[anchor_idx] {
                continue;
            }

            let mut candidates: Vec<usize> = book
                .iter()
                .enumerate()
                .filter(|(j, item)| {
                    if book_used[*j] || !sign_compatible(anchor, item) {
                        return false;
                    }
                    if item.amount > anchor.amount + self.amount_epsilon {
                        return false;
                    }
                    matches!(day_diff(&anchor.date, &item.date), Some(diff) if diff <= range)
                })
                .map(|(j, _)| j)
                .collect();

            candidates.sort_by(|&x, &y| {
                book[y]
                    .amount
                    .partial_cmp(&book[x].amount)
                    .unwrap_or(Ordering::Equal)
            });

            let mut solution = None;
            if candidates.len() >= MIN_GROUP_MEMBERS {
                let mut chosen = Vec::new();
                self.solve_subset(
                    &book,
                    &candidates,
                    0,
                    0.0,
                    anchor.amount,
                    &mut chosen,
                    &mut solution,
                );
            }

            if let Some(member_indices) = solution {
                // a single-member "subset" is not a split; discarded, not retried
                if member_indices.len() >= MIN_GROUP_MEMBERS {
                    bank_used[anchor_idx] = true;
                    for &j in &member_indices {
                        book_used[j] = true;
                    }
                    *seq += 1;
                    matches.push(Match {
                        id: format!("{}-{}", MatchKind::OneToMany.id_prefix(), *seq),
                        kind: MatchKind::OneToMany,
                        bank: MatchSide::Single(anchor.clone()),
                        book: MatchSide::Group(
                            member_indices.iter().map(|&j| book[j].clone()).collect(),
                        ),
                        amount: anchor.amount,
                        amount_diff: None,
                        date_diff: 0,
                        status: MatchKind::OneToMany.default_status(),
                    });
                }
            }
        }

        (
            retain_unused(bank, &bank_used),
            retain_unused(book, &book_used),
        )
    }

    /// Include-first depth-first search: prune on sum overshoot, cap group
    /// size, stop at the first subset whose sum lands within tolerance.
    #[allow(clippy::too_many_arguments)]
    fn solve_subset(
        &self,
        book: &[Transaction],
        candidates: &[usize],
        idx: usize,
        sum: f64,
        target: f64,
        chosen: &mut Vec<usize>,
        solution: &mut Option<Vec<usize>>,
    ) {
        if solution.is_some() {
            return;
        }
        if (sum - target).abs() < self.group_sum_tolerance {
            *solution = Some(chosen.clone());
            return;
        }
        if idx >= candidates.len() || chosen.len() >= self.max_group_size {
            return;
        }
        if sum > target + self.group_sum_tolerance {
            return;
        }

        chosen.push(candidates[idx]);
        self.solve_subset(
            book,
            candidates,
            idx + 1,
            sum + book[candidates[idx]].amount,
            target,
            chosen,
            solution,
        );
        chosen.pop();
        self.solve_subset(book, candidates, idx + 1, sum, target, chosen, solution);
    }
}

impl Default for MatchEngine {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// HELPERS
// ============================================================================

fn refs_equal(a: &Transaction, b: &Transaction) -> bool {
    match (&a.ref_no, &b.ref_no) {
        (Some(x), Some(y)) => !x.is_empty() && x == y,
        _ => false,
    }
}

fn retain_unused(items: Vec<Transaction>, used: &[bool]) -> Vec<Transaction> {
    items
        .into_iter()
        .zip(used)
        .filter(|(_, consumed)| !**consumed)
        .map(|(tx, _)| tx)
        .collect()
}

/// Token intersection between two narrations. Keeps Latin and Arabic
/// letters plus digits, drops everything else, then looks for any shared
/// token longer than two characters.
pub(crate) fn desc_overlap(a: Option<&str>, b: Option<&str>) -> bool {
    let (a, b) = match (a, b) {
        (Some(a), Some(b)) => (a, b),
        _ => return false,
    };
    let tokens_a = desc_tokens(a);
    if tokens_a.is_empty() {
        return false;
    }
    let tokens_b = desc_tokens(b);
    tokens_a.iter().any(|token| tokens_b.contains(token))
}

fn desc_tokens(text: &str) -> Vec<String> {
    let cleaned: String = text
        .to_lowercase()
        .chars()
        .filter(|c| {
            c.is_ascii_alphanumeric() || ('\u{0600}'..='\u{06FF}').contains(c) || c.is_whitespace()
        })
        .collect();
    cleaned
        .split_whitespace()
        .filter(|token| token.chars().count() > 2)
        .map(str::to_string)
        .collect()
}

// ============================================================================
// TESTS
// ============================================================================
