//! Token-based name similarity over normalized Levenshtein distance.
//!
//! Rewards names sharing most tokens under transposition or missing middle
//! names, penalizes extra unmatched tokens (compound surnames approximately).

/// A token must beat this against its best counterpart to count as matched.
const TOKEN_MATCH_THRESHOLD: f64 = 0.8;

/// Similarity between two already-normalized names, in [0, 1].
///
/// Exact equality scores 1.0. Otherwise both names split into tokens longer
/// than one character (initials carry no discriminating signal); each token
/// of `a` is paired with its best Levenshtein match in `b`, and the score is
/// matched-token count over the larger token count.
pub fn name_similarity(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let tokens_a: Vec<&str> = a.split_whitespace().filter(|w| w.len() > 1).collect();
    let tokens_b: Vec<&str> = b.split_whitespace().filter(|w| w.len() > 1).collect();

    if tokens_a.is_empty() || tokens_b.is_empty() {
        return 0.0;
    }

    let total = tokens_a.len().max(tokens_b.len());
    let matched = tokens_a
        .iter()
        .filter(|ta| {
            tokens_b
                .iter()
                .map(|tb| levenshtein_similarity(ta, tb))
                .fold(0.0_f64, f64::max)
                > TOKEN_MATCH_THRESHOLD
        })
        .count();

    matched as f64 / total as f64
}

/// Normalized Levenshtein similarity: `1 - distance / max(len)`.
pub fn levenshtein_similarity(a: &str, b: &str) -> f64 {
    let len_a = a.chars().count();
    let len_b = b.chars().count();

    if len_a == 0 {
        return if len_b == 0 { 1.0 } else { 0.0 };
    }
    if len_b == 0 {
        return 0.0;
    }

    let distance = levenshtein(a, b);
    1.0 - distance as f64 / len_a.max(len_b) as f64
}

/// Classic two-row edit distance over chars.
fn levenshtein(a: &str, b: &str) -> usize {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();

    let mut prev: Vec<usize> = (0..=b_chars.len()).collect();
    let mut curr = vec![0usize; b_chars.len() + 1];

    for (i, ca) in a_chars.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b_chars.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b_chars.len()]
}
