//! External roster feed: a tabular text with at least a name column and an
//! identifier column, header-detected by substring matching.

use std::collections::HashMap;

use thiserror::Error;

use crate::config;
use crate::models::RosterRow;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("roster feed must have a header line and at least one data row")]
    TooShort,

    #[error("required columns not found; expected a name column (e.g. \"Nume și prenume\") and an identifier column (e.g. \"ID\"), found: {found}")]
    MissingColumns { found: String },
}

const NAME_VARIANTS: &[&str] = &[
    "nume și prenume",
    "nume si prenume",
    "nume",
    "name",
    "full name",
    "patient name",
];
const ID_VARIANTS: &[&str] = &["id", "patient id", "cod pacient", "identifier"];

/// Parse a roster feed. The whole feed is rejected when either required
/// column cannot be located; data rows missing one of the two values are
/// skipped individually.
pub fn parse_roster(content: &str) -> Result<Vec<RosterRow>, RosterError> {
    let lines: Vec<(usize, &str)> = content
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .collect();

    if lines.len() < 2 {
        return Err(RosterError::TooShort);
    }

    let header: Vec<String> = lines[0]
        .1
        .split(',')
        .map(|h| h.trim().replace('"', ""))
        .collect();

    let mut name_column = None;
    let mut id_column = None;
    for (index, column) in header.iter().enumerate() {
        let lower = column.to_lowercase();
        if NAME_VARIANTS.iter().any(|v| lower.contains(v)) {
            name_column = Some(index);
        }
        if ID_VARIANTS.iter().any(|v| lower.contains(v)) {
            id_column = Some(index);
        }
    }

    let (name_column, id_column) = match (name_column, id_column) {
        (Some(n), Some(i)) => (n, i),
        _ => {
            return Err(RosterError::MissingColumns { found: header.join(", ") });
        }
    };
    tracing::debug!(name_column, id_column, "roster columns detected");

    let mut rows = Vec::new();
    for (line_index, line) in &lines[1..] {
        let fields = split_line(line);
        if fields.len() <= name_column.max(id_column) {
            continue;
        }
        let name = fields[name_column].trim();
        let id = fields[id_column].trim();
        if name.is_empty() || id.is_empty() {
            continue;
        }
        rows.push(RosterRow {
            name: name.to_string(),
            full_identifier: id.to_string(),
            source_line: line_index + 1,
        });
    }

    tracing::info!(patients = rows.len(), "roster feed parsed");
    Ok(rows)
}

/// Split one feed line on commas, honoring double-quoted fields and `""`
/// escapes inside them.
fn split_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '"' => {
                if in_quotes && chars.peek() == Some(&'"') {
                    current.push('"');
                    chars.next();
                } else {
                    in_quotes = !in_quotes;
                }
            }
            ',' if !in_quotes => {
                fields.push(current.trim().to_string());
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    fields.push(current.trim().to_string());
    fields
}

/// The most common fixed-length prefix across roster identifiers, used to
/// pre-fill the session prefix. Ties resolve to the first prefix seen.
pub fn auto_detect_prefix(rows: &[RosterRow]) -> Option<String> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut order: Vec<&str> = Vec::new();

    for row in rows {
        if row.full_identifier.len() >= config::ID_PREFIX_LEN {
            let prefix = &row.full_identifier[..config::ID_PREFIX_LEN];
            let count = counts.entry(prefix).or_insert(0);
            if *count == 0 {
                order.push(prefix);
            }
            *count += 1;
        }
    }

    let mut best: Option<(&str, usize)> = None;
    for prefix in order {
        let count = counts[prefix];
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((prefix, count));
        }
    }

    best.map(|(prefix, count)| {
        tracing::info!(prefix, count, total = rows.len(), "auto-detected identifier prefix");
        prefix.to_string()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_romanian_header() {
        let feed = "Nr,Nume și prenume,ID\n1,Popescu Maria,25S1901\n2,Ionescu Ana,25S1902\n";
        let rows = parse_roster(feed).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].name, "Popescu Maria");
        assert_eq!(rows[0].full_identifier, "25S1901");
        assert_eq!(rows[0].source_line, 2);
    }

    #[test]
    fn parses_english_header_variants() {
        let feed = "Patient Name,Identifier\nPopescu Maria,25S1901\n";
        let rows = parse_roster(feed).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn missing_columns_reject_whole_feed_naming_found() {
        let feed = "Data,Valoare\n1,2\n";
        let err = parse_roster(feed).unwrap_err();
        match err {
            RosterError::MissingColumns { found } => {
                assert!(found.contains("Data"));
                assert!(found.contains("Valoare"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn header_only_feed_is_too_short() {
        assert!(matches!(parse_roster("Nume,ID\n"), Err(RosterError::TooShort)));
        assert!(matches!(parse_roster(""), Err(RosterError::TooShort)));
    }

    #[test]
    fn quoted_fields_with_embedded_commas() {
        let feed = "Nume,ID\n\"Popescu, Maria\",25S1901\n";
        let rows = parse_roster(feed).unwrap();
        assert_eq!(rows[0].name, "Popescu, Maria");
    }

    #[test]
    fn escaped_quotes_inside_quoted_field() {
        assert_eq!(split_line(r#""a""b",c"#), vec![r#"a"b"#, "c"]);
    }

    #[test]
    fn incomplete_rows_are_skipped_not_fatal() {
        let feed = "Nume,ID\nPopescu Maria,25S1901\nFaraId,\n,25S1903\n";
        let rows = parse_roster(feed).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let feed = "Nume,ID\n\nPopescu Maria,25S1901\n\n";
        let rows = parse_roster(feed).unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn detects_most_common_prefix() {
        let rows = vec![
            RosterRow { name: "A".into(), full_identifier: "25S1901".into(), source_line: 2 },
            RosterRow { name: "B".into(), full_identifier: "25S1902".into(), source_line: 3 },
            RosterRow { name: "C".into(), full_identifier: "24X0101".into(), source_line: 4 },
        ];
        assert_eq!(auto_detect_prefix(&rows).as_deref(), Some("25S19"));
    }

    #[test]
    fn prefix_detection_skips_short_identifiers() {
        let rows = vec![
            RosterRow { name: "A".into(), full_identifier: "01".into(), source_line: 2 },
        ];
        assert_eq!(auto_detect_prefix(&rows), None);
    }

    #[test]
    fn prefix_ties_resolve_to_first_seen() {
        let rows = vec![
            RosterRow { name: "A".into(), full_identifier: "25S1901".into(), source_line: 2 },
            RosterRow { name: "B".into(), full_identifier: "24X0101".into(), source_line: 3 },
        ];
        assert_eq!(auto_detect_prefix(&rows).as_deref(), Some("25S19"));
    }
}
