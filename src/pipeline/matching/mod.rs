//! Identity reconciliation: name canonicalization, similarity scoring and
//! the roster matcher that assigns per-patient identifier suffixes.

pub mod matcher;
pub mod normalize;
pub mod similarity;

pub use matcher::{match_roster, ACCEPT_THRESHOLD, EXACT_THRESHOLD, GOOD_THRESHOLD};
pub use normalize::normalize_name;
pub use similarity::{levenshtein_similarity, name_similarity};
