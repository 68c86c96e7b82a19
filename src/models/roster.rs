use serde::{Deserialize, Serialize};

/// One entry of the externally supplied roster: a full identifier associated
/// with a patient name. Consumed once per matching pass, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RosterRow {
    pub name: String,
    pub full_identifier: String,
    /// 1-based line number in the source feed, for operator-facing messages.
    pub source_line: usize,
}

/// A patient row observed in the source listing. `row_ref` is the
/// caller-assigned reference back into whatever surface produced the row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedRow {
    pub name: String,
    pub status_label: String,
    pub row_ref: usize,
    /// Identifier tail, once assigned by matching or supplied by the operator.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suffix: Option<String>,
}

/// Confidence band for a matched pair, for downstream display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchQuality {
    Exact,
    Good,
    Partial,
}

/// A roster row paired with a locally observed patient row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchResult {
    pub roster: RosterRow,
    pub local: ObservedRow,
    pub similarity: f64,
    pub quality: MatchQuality,
    /// Roster identifier minus the fixed-length session prefix.
    pub suffix: String,
}

/// A local patient no roster row matched above threshold. Reported for
/// operator review, never silently dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnmatchedPatient {
    pub local: ObservedRow,
    pub best_candidate: Option<RosterRow>,
    pub best_score: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchOutcome {
    pub matches: Vec<MatchResult>,
    pub unmatched: Vec<UnmatchedPatient>,
}
