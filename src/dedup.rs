//! Fuzzy title matching used to keep near-identical titles out of a catalog.

use strsim::normalized_levenshtein;

/// Scores strictly above this count as the same title.
pub const DUPLICATE_THRESHOLD: u8 = 85;

/// Arabic "film"/"series" and English articles that do not distinguish titles.
const IGNORED_PREFIXES: [&str; 5] = ["فيلم", "مسلسل", "the", "a", "an"];

/// Lowercases, drops punctuation and one leading ignorable word.
pub fn normalize_title(title: &str) -> String {
    let cleaned: String = title
        .to_lowercase()
        .chars()
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace() || *ch == '_')
        .collect();
    let cleaned = cleaned.trim_start();
    let stripped = IGNORED_PREFIXES
        .iter()
        .find_map(|prefix| {
            cleaned
                .strip_prefix(prefix)
                .filter(|rest| rest.starts_with(char::is_whitespace))
        })
        .unwrap_or(cleaned);
    stripped.trim().to_string()
}

/// Similarity of two titles after normalization, 0 to 100.
pub fn similarity(a: &str, b: &str) -> u8 {
    let score = normalized_levenshtein(&normalize_title(a), &normalize_title(b));
    (score * 100.0).round() as u8
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateMatch {
    pub title: String,
    pub score: u8,
}

/// Best match for `title` among `existing` when it clears `threshold`.
pub fn find_duplicate<'a, I>(title: &str, existing: I, threshold: u8) -> Option<DuplicateMatch>
where
    I: IntoIterator<Item = &'a str>,
{
    existing
        .into_iter()
        .map(|candidate| DuplicateMatch {
            title: candidate.to_string(),
            score: similarity(title, candidate),
        })
        .filter(|found| found.score > threshold)
        .max_by_key(|found| found.score)
}
