//! Roster reconciler: pairs external roster rows to locally observed patient
//! rows by name similarity, with duplicate-collapse and row-reuse rules.

use std::collections::{HashMap, HashSet};

use crate::models::{MatchOutcome, MatchQuality, MatchResult, ObservedRow, RosterRow, UnmatchedPatient};

use super::normalize::normalize_name;
use super::similarity::name_similarity;

/// Pairs below this score are reported unmatched for operator review.
pub const ACCEPT_THRESHOLD: f64 = 0.666;
pub const EXACT_THRESHOLD: f64 = 0.95;
pub const GOOD_THRESHOLD: f64 = 0.85;

/// Match locally observed patients against the roster.
///
/// Precondition: `locals` is already restricted to rows whose status the
/// caller considers matchable; the allowed set is policy, not hard-coded here.
///
/// Duplicate local names (same normalized form) collapse to their first
/// occurrence in table order; later duplicates are skipped entirely so the
/// same roster identifier is never assigned twice through near-identical
/// rows. A roster row consumed by an exact match stays available to further
/// exact matches (legitimate same-name collisions in the roster); a row
/// consumed below exact confidence leaves the candidate pool.
pub fn match_roster(roster: &[RosterRow], locals: &[ObservedRow], prefix_len: usize) -> MatchOutcome {
    let mut outcome = MatchOutcome::default();

    // Deterministic processing order: stable sort by normalized name keeps
    // table order among duplicates, so "first occurrence" is well defined.
    let mut ordered: Vec<(String, &ObservedRow)> = locals
        .iter()
        .map(|row| (normalize_name(&row.name), row))
        .collect();
    ordered.sort_by(|a, b| a.0.cmp(&b.0));

    let mut processed_names: HashSet<String> = HashSet::new();
    let mut consumed: HashMap<usize, MatchQuality> = HashMap::new();

    for (local_name, local) in ordered {
        if !processed_names.insert(local_name.clone()) {
            tracing::debug!(patient = %local.name, "skipping duplicate local name");
            continue;
        }

        let mut best_score = 0.0_f64;
        let mut best_index: Option<usize> = None;

        for (index, candidate) in roster.iter().enumerate() {
            let score = name_similarity(&local_name, &normalize_name(&candidate.name));

            match consumed.get(&index) {
                Some(MatchQuality::Exact) if score < EXACT_THRESHOLD => continue,
                Some(MatchQuality::Exact) => {}
                Some(_) => continue,
                None => {}
            }

            if score > best_score {
                best_score = score;
                best_index = Some(index);
            }
        }

        match best_index {
            Some(index) if best_score >= ACCEPT_THRESHOLD => {
                let row = &roster[index];
                let quality = classify(best_score);
                consumed.insert(index, quality);

                tracing::info!(
                    patient = %local.name,
                    roster = %row.name,
                    score = best_score,
                    quality = ?quality,
                    "roster match"
                );

                outcome.matches.push(MatchResult {
                    roster: row.clone(),
                    local: local.clone(),
                    similarity: best_score,
                    quality,
                    suffix: identifier_suffix(&row.full_identifier, prefix_len),
                });
            }
            best => {
                let best_candidate = best.map(|i| roster[i].clone());
                tracing::warn!(
                    patient = %local.name,
                    best_score,
                    candidate = best_candidate.as_ref().map(|r| r.name.as_str()).unwrap_or("none"),
                    "no roster match above threshold"
                );
                outcome.unmatched.push(UnmatchedPatient {
                    local: local.clone(),
                    best_candidate,
                    best_score,
                });
            }
        }
    }

    outcome
}

fn classify(score: f64) -> MatchQuality {
    if score >= EXACT_THRESHOLD {
        MatchQuality::Exact
    } else if score >= GOOD_THRESHOLD {
        MatchQuality::Good
    } else {
        MatchQuality::Partial
    }
}

/// The patient-specific tail of a roster identifier: everything past the
/// fixed-length session prefix. Identifiers at or below the prefix length
/// are propagated whole.
fn identifier_suffix(full_identifier: &str, prefix_len: usize) -> String {
    if full_identifier.len() > prefix_len {
        full_identifier[prefix_len..].to_string()
    } else {
        full_identifier.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config;

    fn roster_row(name: &str, id: &str, line: usize) -> RosterRow {
        RosterRow {
            name: name.to_string(),
            full_identifier: id.to_string(),
            source_line: line,
        }
    }

    fn observed(name: &str, row_ref: usize) -> ObservedRow {
        ObservedRow {
            name: name.to_string(),
            status_label: config::STATUS_COMPLETE.to_string(),
            row_ref,
            suffix: None,
        }
    }

    #[test]
    fn transposed_name_matches_and_other_row_stays_free() {
        let roster = vec![
            roster_row("Popescu Maria", "25S1901", 2),
            roster_row("Ionescu Ana", "25S1902", 3),
        ];
        let locals = vec![observed("Maria Popescu", 0)];

        let outcome = match_roster(&roster, &locals, config::ID_PREFIX_LEN);

        assert_eq!(outcome.matches.len(), 1);
        assert!(outcome.unmatched.is_empty());
        let m = &outcome.matches[0];
        assert_eq!(m.roster.full_identifier, "25S1901");
        assert!(matches!(m.quality, MatchQuality::Exact | MatchQuality::Good));
        assert_eq!(m.suffix, "01");
    }

    #[test]
    fn below_threshold_is_reported_not_dropped() {
        // Shared surname only: 1 of 2 tokens matches → 0.5, under threshold.
        let roster = vec![roster_row("Popescu Ion", "25S1903", 2)];
        let locals = vec![observed("Popescu Maria", 0)];

        let outcome = match_roster(&roster, &locals, config::ID_PREFIX_LEN);

        assert!(outcome.matches.is_empty());
        assert_eq!(outcome.unmatched.len(), 1);
        let u = &outcome.unmatched[0];
        assert_eq!(u.local.name, "Popescu Maria");
        assert!(u.best_score < ACCEPT_THRESHOLD);
        assert_eq!(u.best_candidate.as_ref().unwrap().name, "Popescu Ion");
    }

    #[test]
    fn zero_similarity_reports_no_candidate() {
        let roster = vec![roster_row("Georgescu Vasile", "25S1903", 2)];
        let locals = vec![observed("Popescu Maria", 0)];

        let outcome = match_roster(&roster, &locals, config::ID_PREFIX_LEN);

        assert_eq!(outcome.unmatched.len(), 1);
        assert!(outcome.unmatched[0].best_candidate.is_none());
        assert_eq!(outcome.unmatched[0].best_score, 0.0);
    }

    #[test]
    fn duplicate_local_names_collapse_to_first_row() {
        let roster = vec![roster_row("Popescu Maria", "25S1901", 2)];
        let locals = vec![observed("Popescu Maria", 0), observed("Popescu Maria", 4)];

        let outcome = match_roster(&roster, &locals, config::ID_PREFIX_LEN);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.matches[0].local.row_ref, 0);
        assert!(outcome.unmatched.is_empty());
    }

    #[test]
    fn exact_rows_may_be_reused_at_exact_confidence_only() {
        // Two distinct local rows that both normalize to near-identical
        // names against a single roster entry.
        let roster = vec![roster_row("Popescu Maria", "25S1901", 2)];
        let locals = vec![observed("Popescu Maria", 0), observed("Popescu Mariă", 3)];

        let outcome = match_roster(&roster, &locals, config::ID_PREFIX_LEN);

        // Both normalize to "popescu maria" → second is a duplicate, skipped.
        assert_eq!(outcome.matches.len(), 1);

        // Distinct normalized names, both exact against the same roster row.
        let locals = vec![observed("Popescu Maria", 0), observed("Maria Popescu", 3)];
        let outcome = match_roster(&roster, &locals, config::ID_PREFIX_LEN);
        assert_eq!(outcome.matches.len(), 2);
        assert!(outcome
            .matches
            .iter()
            .all(|m| m.roster.full_identifier == "25S1901"));
    }

    #[test]
    fn non_exact_consumption_removes_row_from_pool() {
        // First local consumes the row partially; the second local's only
        // candidate is therefore gone and it lands in unmatched.
        let roster = vec![roster_row("Popescu Ana Maria", "25S1901", 2)];
        let locals = vec![observed("Popescu Ana", 0), observed("Popescu Ana Ioana", 1)];

        let outcome = match_roster(&roster, &locals, config::ID_PREFIX_LEN);

        assert_eq!(outcome.matches.len(), 1);
        assert_eq!(outcome.unmatched.len(), 1);
        let m = &outcome.matches[0];
        assert!(m.similarity < EXACT_THRESHOLD);
    }

    #[test]
    fn quality_bands() {
        assert_eq!(classify(1.0), MatchQuality::Exact);
        assert_eq!(classify(0.95), MatchQuality::Exact);
        assert_eq!(classify(0.90), MatchQuality::Good);
        assert_eq!(classify(0.70), MatchQuality::Partial);
    }

    #[test]
    fn suffix_strips_fixed_prefix_only_when_longer() {
        assert_eq!(identifier_suffix("25S1905", 5), "05");
        assert_eq!(identifier_suffix("25S19", 5), "25S19");
        assert_eq!(identifier_suffix("25S", 5), "25S");
    }

    #[test]
    fn deterministic_across_input_order() {
        let roster = vec![
            roster_row("Popescu Maria", "25S1901", 2),
            roster_row("Ionescu Ana", "25S1902", 3),
        ];
        let a = vec![observed("Ionescu Ana", 0), observed("Popescu Maria", 1)];
        let b = vec![observed("Popescu Maria", 1), observed("Ionescu Ana", 0)];

        let out_a = match_roster(&roster, &a, config::ID_PREFIX_LEN);
        let out_b = match_roster(&roster, &b, config::ID_PREFIX_LEN);

        assert_eq!(out_a.matches, out_b.matches);
    }
}
