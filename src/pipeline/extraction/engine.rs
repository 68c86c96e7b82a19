//! Primary extraction pass: one compiled search rule per test definition.
//!
//! Each rule matches `<optional comparison marker><numeric token>` followed
//! by an optional `^` flag marker and the test label — the value precedes
//! the label in the report layout. The whole text is scanned per rule;
//! when a label occurs more than once the last occurrence wins, as later
//! page positions carry the authoritative final reading in this format.

use std::collections::BTreeMap;

use regex::Regex;

use crate::models::{Comparison, ExtractedTestResult, TestDefinition};

use super::{fallback, ExtractionError};

/// A test definition with its search rule compiled once at startup.
pub struct CompiledRule {
    pub key: &'static str,
    pub name: &'static str,
    regex: Regex,
}

/// Compile the definition table into search rules, preserving table order.
pub fn compile_rules(definitions: &[TestDefinition]) -> Result<Vec<CompiledRule>, ExtractionError> {
    definitions
        .iter()
        .map(|def| {
            let pattern = format!(r"([<>]?\s*[0-9.,]+)\s+\^?\s*{}", def.pattern);
            let regex = Regex::new(&pattern)
                .map_err(|source| ExtractionError::Pattern { key: def.key, source })?;
            Ok(CompiledRule { key: def.key, name: def.name, regex })
        })
        .collect()
}

/// Extract test results from report text.
///
/// Zero matches is not an error; only absent text is. When the declared
/// vocabulary finds nothing at all, a generic positional fallback pass runs
/// over the same text (recall over precision, and only then).
pub fn extract(
    text: &str,
    rules: &[CompiledRule],
) -> Result<BTreeMap<String, ExtractedTestResult>, ExtractionError> {
    if text.trim().is_empty() {
        return Err(ExtractionError::EmptyReport);
    }

    let mut results = BTreeMap::new();

    for rule in rules {
        for caps in rule.regex.captures_iter(text) {
            let raw = &caps[1];
            let Some(candidate) = clean_value(raw) else {
                tracing::debug!(test = rule.key, raw, "rejected invalid value");
                continue;
            };
            tracing::debug!(test = rule.key, value = %candidate.value, "matched test value");
            // Later occurrences overwrite: last match wins.
            results.insert(rule.key.to_string(), candidate);
        }
    }

    if results.is_empty() {
        tracing::debug!("no declared tests found, trying generic patterns");
        results = fallback::extract_generic(text);
    }

    tracing::info!(tests = results.len(), "extraction complete");
    Ok(results)
}

/// Strip comparison markers from a raw value token and apply the sole
/// validity gate: non-empty, at most 50 characters, contains a digit.
/// The marker itself is preserved as a typed fact on the result.
pub(super) fn clean_value(raw: &str) -> Option<ExtractedTestResult> {
    let comparison = if raw.contains('<') {
        Some(Comparison::Below)
    } else if raw.contains('>') {
        Some(Comparison::Above)
    } else {
        None
    };

    let value: String = raw.chars().filter(|c| *c != '<' && *c != '>').collect();
    let value = value.trim().to_string();

    if value.is_empty() || value.len() > 50 || !value.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }

    Some(ExtractedTestResult { value, comparison })
}
