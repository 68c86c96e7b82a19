//! Generic positional fallback for reports outside the declared vocabulary.
//!
//! Runs only when the primary pass found nothing: `value label [range]`
//! shapes scanned over the whole text, with a plausibility filter on the
//! captured label. Trades precision for recall, and only as a last resort.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::models::ExtractedTestResult;

use super::engine::clean_value;

static GENERIC_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    vec![
        // value, longer label, [range]
        Regex::new(r"([<>]?\s*[0-9.,]+)\s+([A-Za-z0-9\s\-()]{5,50}?)\s+\[([0-9.,\s\-<>]+)\]").unwrap(),
        // value, ^-flagged short label, [range], optional unit
        Regex::new(r"([<>]?\s*[0-9.,]+)\s+\^\s*([A-Za-z0-9\s\-]{3,25}?)\s+\[([0-9.,\s\-<>]+)\]\s*([a-zA-Z/]*)").unwrap(),
        // value, short label, [range], optional unit
        Regex::new(r"([<>]?\s*[0-9.,]+)\s+([A-Za-z0-9\s\-]{3,25}?)\s+\[([0-9.,\s\-<>]+)\]\s*([a-zA-Z/]*)").unwrap(),
    ]
});

/// Boilerplate fragments that mark a capture as a table header, not a test.
const HEADER_FRAGMENTS: &[&str] = &["REZULTATE", "INTERVAL", "BIOLOGIC", "REFERINTA"];
const HEADER_WORDS: &[&str] = &["UM", "ANALIZE", "IMUNOLOGIE"];

/// Substrings that identify a label as a plausible medical test name.
const MEDICAL_TERMS: &[&str] = &[
    "hemoglobina", "hba1c", "glicozilata", "feritina", "vitamina", "colesterol",
    "trigliceride", "glicemie", "tsh", "ft3", "ft4", "anti-tpo", "tiroidperoxidaza",
    "cortizol", "psa", "cea", "afp", "antigen", "prostatic", "magneziu", "calciu",
    "potasiu", "seric", "sideremie", "homocistein", "proteina", "reactiva", "crp",
    "insulina", "homa", "indice", "fosfor", "albumina", "creatinina", "uree",
    "bilirubina", "vsh", "inr", "aptt", "calcitonina", "pth", "parathormon",
    "anticorpi", "hcv", "hbs", "estradiol", "prolactina",
];

static LABEL_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9\s\-()]+$").unwrap());

/// Scan the text with every generic pattern; keep captures whose label
/// passes the plausibility filter. Last occurrence of a label wins, same
/// as in the primary pass.
pub fn extract_generic(text: &str) -> BTreeMap<String, ExtractedTestResult> {
    let mut results = BTreeMap::new();

    for pattern in GENERIC_PATTERNS.iter() {
        for caps in pattern.captures_iter(text) {
            let label = clean_label(&caps[2]);
            if !is_plausible_test_label(&label) {
                tracing::debug!(label = %label, "rejected implausible label");
                continue;
            }
            let Some(candidate) = clean_value(&caps[1]) else {
                continue;
            };
            tracing::debug!(label = %label, value = %candidate.value, "generic pattern match");
            results.insert(label, candidate);
        }
    }

    results
}

/// Strip the `^` flag marker and collapse whitespace in a captured label.
fn clean_label(label: &str) -> String {
    label
        .trim_start_matches('^')
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Name-plausibility filter: sane length, not a known boilerplate/header
/// term, and either containing a known medical-term substring or shaped
/// like a test name.
fn is_plausible_test_label(label: &str) -> bool {
    if label.len() < 3 || label.len() > 60 {
        return false;
    }
    if HEADER_FRAGMENTS.iter().any(|f| label.contains(f)) {
        return false;
    }
    if HEADER_WORDS.contains(&label.to_uppercase().as_str()) {
        return false;
    }

    let lower = label.to_lowercase();
    let has_medical_term = MEDICAL_TERMS.iter().any(|t| lower.contains(t));

    has_medical_term || LABEL_SHAPE.is_match(label)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_value_label_range_shape() {
        let results = extract_generic("3.2 Fosfor seric [2.5-4.5] mg/dL");
        assert_eq!(results["Fosfor seric"].value, "3.2");
    }

    #[test]
    fn rejects_header_boilerplate() {
        let results = extract_generic("10 REZULTATE ANALIZE [1-2]\n20 INTERVAL BIOLOGIC [3-4]");
        assert!(results.is_empty());
    }

    #[test]
    fn rejects_single_header_words() {
        assert!(!is_plausible_test_label("UM"));
        assert!(!is_plausible_test_label("ANALIZE"));
        assert!(!is_plausible_test_label("Imunologie"));
    }

    #[test]
    fn accepts_known_medical_terms() {
        assert!(is_plausible_test_label("Cortizol seric"));
        assert!(is_plausible_test_label("Creatinina"));
    }

    #[test]
    fn accepts_plain_alphanumeric_shapes() {
        assert!(is_plausible_test_label("Examen complet (screening)"));
    }

    #[test]
    fn length_bounds() {
        assert!(!is_plausible_test_label("ab"));
        assert!(!is_plausible_test_label(&"x".repeat(61)));
    }

    #[test]
    fn caret_flag_stripped_from_label() {
        assert_eq!(clean_label("^ Cortizol  seric"), "Cortizol seric");
    }

    #[test]
    fn comparison_marker_handled_in_generic_pass() {
        let results = extract_generic("< 0.5 Cortizol seric [5-25] µg/dL");
        let r = &results["Cortizol seric"];
        assert_eq!(r.value, "0.5");
        assert!(r.comparison.is_some());
    }
}
