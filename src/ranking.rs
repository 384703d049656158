// 🎯 Candidate Ranking - ordering help for leftover manual matching
// Re-orders one side's unmatched records against the records a human has
// tentatively selected on the other side. Suggests, never commits.

use crate::transaction::Transaction;
use chrono::NaiveDate;

// ============================================================================
// WEIGHTS
// ============================================================================

/// Candidate ref exactly equals a selected ref.
pub const REF_EXACT_SCORE: i64 = 1000;

/// One ref contains the other as a substring.
pub const REF_PARTIAL_SCORE: i64 = 500;

/// Candidate amount matches the selection total within AMOUNT_PROXIMITY.
pub const AMOUNT_SCORE: i64 = 200;

/// One narration contains the other.
pub const DESC_CONTAINS_SCORE: i64 = 100;

/// Per shared narration token.
pub const DESC_TOKEN_SCORE: i64 = 20;

/// Scores within this margin count as a tie and fall back to date proximity.
pub const SCORE_TIE_MARGIN: i64 = 10;

pub const AMOUNT_PROXIMITY: f64 = 0.05;

/// Selected refs shorter than this carry no evidence.
const MIN_REF_LEN: usize = 3;

const MIN_TOKEN_LEN: usize = 3;

// ============================================================================
// RANKING
// ============================================================================

/// Order `candidates` by estimated relevance to `selection`.
///
/// An empty selection returns the input order unchanged. The comparator is a
/// single dual-key ordering: a coarse score bucket first, then ascending
/// day-distance to the last selected record when two scores land within
/// SCORE_TIE_MARGIN of each other. This is a human-assistive approximation —
/// near-ties are deliberately treated as equivalent, and exact global
/// transitivity is not guaranteed.
pub fn rank_candidates(candidates: &[Transaction], selection: &[Transaction]) -> Vec<Transaction> {
    if selection.is_empty() {
        return candidates.to_vec();
    }

    let target_amount: f64 = selection.iter().map(|tx| tx.amount).sum();
    let target_refs: Vec<String> = selection
        .iter()
        .filter_map(|tx| tx.normalized_ref())
        .filter(|r| r.chars().count() >= MIN_REF_LEN)
        .collect();
    let target_descs: Vec<String> = selection
        .iter()
        .filter_map(|tx| tx.desc.as_deref())
        .map(str::to_lowercase)
        .filter(|d| !d.is_empty())
        .collect();
    let target_date = selection.last().and_then(|tx| tx.date.as_date());

    let mut scored: Vec<(i64, i64, &Transaction)> = candidates
        .iter()
        .map(|tx| {
            (
                score_candidate(tx, &target_refs, target_amount, &target_descs),
                date_distance(tx, target_date),
                tx,
            )
        })
        .collect();

    scored.sort_by(|a, b| {
        if (a.0 - b.0).abs() > SCORE_TIE_MARGIN {
            b.0.cmp(&a.0)
        } else {
            a.1.cmp(&b.1)
        }
    });

    scored.into_iter().map(|(_, _, tx)| tx.clone()).collect()
}

fn score_candidate(
    candidate: &Transaction,
    target_refs: &[String],
    target_amount: f64,
    target_descs: &[String],
) -> i64 {
    let mut score = 0;

    // A. Reference evidence (strongest signal)
    if let Some(ref_no) = candidate.normalized_ref() {
        if target_refs.iter().any(|target| *target == ref_no) {
            score += REF_EXACT_SCORE;
        } else if target_refs
            .iter()
            .any(|target| target.contains(&ref_no) || ref_no.contains(target.as_str()))
        {
            score += REF_PARTIAL_SCORE;
        }
    }

    // B. Amount against the selection total (signs may be flipped, compare
    // magnitudes)
    if (candidate.amount.abs() - target_amount.abs()).abs() < AMOUNT_PROXIMITY {
        score += AMOUNT_SCORE;
    }

    // C. Narration similarity
    if let Some(desc) = candidate.desc.as_deref() {
        let desc = desc.to_lowercase();
        if !desc.is_empty() {
            score += target_descs
                .iter()
                .map(|target| {
                    if desc.contains(target.as_str()) || target.contains(&desc) {
                        DESC_CONTAINS_SCORE
                    } else {
                        shared_token_count(&desc, target) as i64 * DESC_TOKEN_SCORE
                    }
                })
                .max()
                .unwrap_or(0);
        }
    }

    score
}

fn shared_token_count(candidate_desc: &str, target_desc: &str) -> usize {
    let target_tokens: Vec<&str> = split_tokens(target_desc);
    split_tokens(candidate_desc)
        .into_iter()
        .filter(|token| token.chars().count() >= MIN_TOKEN_LEN && target_tokens.contains(token))
        .count()
}

fn split_tokens(text: &str) -> Vec<&str> {
    text.split(|c: char| c.is_whitespace() || c == '-' || c == '_')
        .filter(|t| !t.is_empty())
        .collect()
}

/// Day distance to the last selected record, used only as the tie-break.
/// Candidates without a usable date sort behind everything in their tie
/// group; without a usable target date, distance is flat zero for everyone.
fn date_distance(candidate: &Transaction, target: Option<NaiveDate>) -> i64 {
    match target {
        Some(target_date) => match candidate.date.as_date() {
            Some(date) => (date - target_date).num_days().abs(),
            None => i64::MAX,
        },
        None => 0,
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::DateValue;

    fn tx(id: &str, date: &str, signed_amount: f64) -> Transaction {
        Transaction::new(id, DateValue::parse(date), signed_amount)
    }

    fn ids(ranked: &[Transaction]) -> Vec<&str> {
        ranked.iter().map(|tx| tx.id.as_str()).collect()
    }

    #[test]
    fn test_empty_selection_keeps_input_order() {
        let candidates = vec![tx("a", "2024-01-01", 10.0), tx("b", "2024-01-02", 20.0)];
        let ranked = rank_candidates(&candidates, &[]);
        assert_eq!(ids(&ranked), vec!["a", "b"]);
    }

    #[test]
    fn test_exact_ref_dominates() {
        let selection = vec![tx("s", "2024-01-10", 75.0).with_ref("CHK450")];
        let candidates = vec![
            tx("amount-only", "2024-01-10", 75.0),
            tx("ref-hit", "2024-03-20", 12.0).with_ref("chk450"),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        assert_eq!(ids(&ranked)[0], "ref-hit");
    }

    #[test]
    fn test_partial_ref_beats_no_evidence() {
        let selection = vec![tx("s", "2024-01-10", 75.0).with_ref("INV-2024")];
        let candidates = vec![
            tx("nothing", "2024-01-10", 9.0),
            tx("partial", "2024-02-01", 9.0).with_ref("inv-2024-0017"),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        assert_eq!(ids(&ranked)[0], "partial");
    }

    #[test]
    fn test_short_selected_ref_ignored() {
        // a two-character ref is too weak to rank on
        let selection = vec![tx("s", "2024-01-10", 75.0).with_ref("A1")];
        let candidates = vec![
            tx("near", "2024-01-11", 9.0).with_ref("A1"),
            tx("far", "2024-05-01", 9.0).with_ref("A1"),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        // both score zero; the tie-break prefers the nearer date
        assert_eq!(ids(&ranked), vec!["near", "far"]);
    }

    #[test]
    fn test_amount_total_bonus() {
        let selection = vec![tx("s1", "2024-01-10", 40.0), tx("s2", "2024-01-12", 60.0)];
        let candidates = vec![
            tx("off", "2024-01-12", 55.0),
            tx("sum-hit", "2024-04-01", 100.0),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        assert_eq!(ids(&ranked)[0], "sum-hit");
    }

    #[test]
    fn test_desc_containment_beats_token_overlap() {
        let selection = vec![tx("s", "2024-01-10", 30.0).with_desc("Monthly office rent")];
        let candidates = vec![
            tx("tokens", "2024-01-10", 1.0).with_desc("rent deposit refund"),
            tx("contains", "2024-01-10", 1.0).with_desc("monthly office rent january"),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        assert_eq!(ids(&ranked)[0], "contains");
    }

    #[test]
    fn test_near_tie_falls_back_to_date_proximity() {
        // both candidates hit the amount bonus only; scores are equal,
        // so the later-listed but nearer-dated one comes first
        let selection = vec![tx("s", "2024-01-10", 50.0)];
        let candidates = vec![
            tx("far", "2024-03-01", 50.0),
            tx("near", "2024-01-11", 50.0),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        assert_eq!(ids(&ranked), vec!["near", "far"]);
    }

    #[test]
    fn test_clear_score_gap_ignores_dates() {
        let selection = vec![tx("s", "2024-01-10", 50.0).with_ref("CHK88")];
        let candidates = vec![
            tx("near-no-ref", "2024-01-10", 50.0),
            tx("far-ref", "2024-06-01", 50.0).with_ref("CHK88"),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        assert_eq!(ids(&ranked)[0], "far-ref");
    }

    #[test]
    fn test_dateless_candidate_sorts_last_within_tie() {
        let selection = vec![tx("s", "2024-01-10", 50.0)];
        let candidates = vec![
            Transaction::new("dateless", DateValue::Missing, 50.0),
            tx("dated", "2024-02-10", 50.0),
        ];
        let ranked = rank_candidates(&candidates, &selection);
        assert_eq!(ids(&ranked), vec!["dated", "dateless"]);
    }
}
