//! Locale-aware name canonicalization.
//!
//! Applied identically to roster names and locally observed names so that
//! similarity scores are comparable between the two sides.

/// Canonicalize a patient name: lowercase, Romanian diacritics folded to
/// their base letter, hyphens/underscores treated as spaces, every other
/// non-letter character dropped, whitespace collapsed. Pure and total.
pub fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());

    for ch in name.to_lowercase().chars() {
        match ch {
            'ă' | 'â' => out.push('a'),
            'î' => out.push('i'),
            // Both the comma-below and legacy cedilla forms occur in feeds.
            'ș' | 'ş' => out.push('s'),
            'ț' | 'ţ' => out.push('t'),
            '-' | '_' => out.push(' '),
            c if c.is_ascii_lowercase() => out.push(c),
            c if c.is_whitespace() => out.push(' '),
            _ => {}
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    let mut last_was_space = true;
    for c in out.chars() {
        if c == ' ' {
            if !last_was_space {
                collapsed.push(' ');
            }
            last_was_space = true;
        } else {
            collapsed.push(c);
            last_was_space = false;
        }
    }
    collapsed.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lowercases_and_trims() {
        assert_eq!(normalize_name("  Popescu Maria  "), "popescu maria");
    }

    #[test]
    fn folds_romanian_diacritics() {
        assert_eq!(normalize_name("Ștefănescu Brândușa"), "stefanescu brandusa");
        assert_eq!(normalize_name("Îndreica Țunea"), "indreica tunea");
    }

    #[test]
    fn folds_legacy_cedilla_forms() {
        // U+015F and U+0163 instead of the comma-below codepoints.
        assert_eq!(normalize_name("Şerban Ţepeş"), "serban tepes");
    }

    #[test]
    fn hyphens_become_token_boundaries() {
        assert_eq!(normalize_name("Popescu Ana-Maria"), "popescu ana maria");
        assert_eq!(normalize_name("popescu_ana"), "popescu ana");
    }

    #[test]
    fn strips_punctuation_and_digits() {
        assert_eq!(normalize_name("Popescu, Maria (1975)"), "popescu maria");
    }

    #[test]
    fn collapses_internal_whitespace() {
        assert_eq!(normalize_name("Popescu \t  Maria"), "popescu maria");
    }

    #[test]
    fn total_on_degenerate_input() {
        assert_eq!(normalize_name(""), "");
        assert_eq!(normalize_name("123 --- !!!"), "");
    }
}
