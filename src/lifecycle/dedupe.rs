//! Question de-duplication for market creation.
//!
//! The oracle proposes free text, so near-identical questions come back in
//! different casing, punctuation and padding. A candidate is rejected when
//! it collides with any question on an unresolved market or on one
//! resolved within the last day.

use std::collections::HashSet;

use crate::store::MarketRecord;

/// Share of words (against the larger question) that marks a duplicate.
const OVERLAP_THRESHOLD: f64 = 0.7;

/// Resolved markets stay in the comparison set this long.
pub const DEDUPE_RESOLVED_WINDOW_SECS: i64 = 24 * 60 * 60;

/// Questions created within this window feed the oracle's avoid list.
pub const AVOID_WINDOW_SECS: i64 = 7 * 24 * 60 * 60;

fn normalize(question: &str) -> String {
    question.to_lowercase().replace(['?', '!'], "").trim().to_string()
}

/// Whether two questions ask the same thing: equal after normalization,
/// one contained in the other, or sharing at least [`OVERLAP_THRESHOLD`]
/// of the larger question's words.
pub fn questions_alike(a: &str, b: &str) -> bool {
    let na = normalize(a);
    let nb = normalize(b);
    if na.is_empty() || nb.is_empty() {
        return na == nb;
    }
    if na == nb || na.contains(&nb) || nb.contains(&na) {
        return true;
    }

    let wa: HashSet<&str> = na.split_whitespace().collect();
    let wb: HashSet<&str> = nb.split_whitespace().collect();
    let shared = wa.intersection(&wb).count();
    let larger = wa.len().max(wb.len());
    shared as f64 / larger as f64 >= OVERLAP_THRESHOLD
}

/// First stored question the candidate collides with, if any.
pub fn find_duplicate<'a>(candidate: &str, existing: &'a [String]) -> Option<&'a str> {
    existing
        .iter()
        .find(|q| questions_alike(candidate, q))
        .map(|s| s.as_str())
}

/// Questions the candidate must not duplicate: every unresolved market
/// plus markets resolved within [`DEDUPE_RESOLVED_WINDOW_SECS`].
pub fn comparison_set(markets: &[MarketRecord], now: i64) -> Vec<String> {
    markets
        .iter()
        .filter(|m| !m.corrupted)
        .filter(|m| {
            if !m.resolved {
                return true;
            }
            let resolved_at = m.resolved_at.unwrap_or(m.resolution_time);
            now.saturating_sub(resolved_at) <= DEDUPE_RESOLVED_WINDOW_SECS
        })
        .map(|m| m.question.clone())
        .collect()
}

/// Recently created questions, newest first, for the oracle's avoid list.
pub fn avoid_questions(markets: &[MarketRecord], now: i64) -> Vec<String> {
    let mut recent: Vec<&MarketRecord> = markets
        .iter()
        .filter(|m| now.saturating_sub(m.created_at) <= AVOID_WINDOW_SECS)
        .collect();
    recent.sort_unstable_by_key(|m| std::cmp::Reverse(m.created_at));
    recent.into_iter().map(|m| m.question.clone()).collect()
}
