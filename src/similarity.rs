//! Token-overlap similarity used to rank fuzzy metadata candidates.

/// Counts reference tokens present in the candidate, case-folded.
///
/// Deterministic and order-stable; callers ranking by this score keep the
/// first-seen maximum on ties.
pub fn similarity(reference: &str, candidate: &str) -> usize {
    let candidate_tokens: Vec<String> = candidate
        .split_whitespace()
        .map(str::to_lowercase)
        .collect();
    reference
        .split_whitespace()
        .map(str::to_lowercase)
        .filter(|token| candidate_tokens.iter().any(|other| other == token))
        .count()
}

/// Deletes punctuation (including underscores) and collapses whitespace
/// runs. Punctuation vanishes rather than splitting words, so
/// `"Don't"` becomes `"Dont"`.
///
/// Applied to titles before the fallback-source query and to author names
/// before the title+author re-query.
pub fn sanitize_title(raw: &str) -> String {
    let stripped: String = raw
        .chars()
        .filter(|ch| ch.is_alphanumeric() || ch.is_whitespace())
        .collect();
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}
