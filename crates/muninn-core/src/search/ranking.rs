//! Composite ranking math.
//!
//! The backend computes BM25; this module only combines the raw `rank`
//! column it returns with priority/recency/access factors computed in Rust.
//! It never reimplements BM25 or Porter stemming itself.

use chrono::{DateTime, Utc};

/// `priority_weight = 1 + 0.3 × priority` ⇒ { -1 → 0.7, 0 → 1.0, 1 → 1.3, 2 → 1.6 }.
pub fn priority_weight(priority: i64) -> f64 {
    1.0 + 0.3 * priority as f64
}

/// `recency_decay = 1 / (1 + age_days × 0.01)`.
pub fn recency_decay(age_days: f64) -> f64 {
    1.0 / (1.0 + age_days.max(0.0) * 0.01)
}

/// `access_boost = 1 + 0.2 × ln(1 + access_count)`, applied only when the
/// caller opts into episodic boosting.
pub fn access_boost(access_count: i64) -> f64 {
    1.0 + 0.2 * (1.0 + access_count as f64).ln()
}

pub fn age_days(now: DateTime<Utc>, reference: DateTime<Utc>) -> f64 {
    (now - reference).num_seconds() as f64 / 86_400.0
}

/// `score = bm25 × priority_weight × recency_decay [× access_boost]`.
///
/// `bm25_relevance` is expected already inverted so higher is better (SQLite's
/// `bm25()` returns a lower-is-better weight; the transport layer negates it
/// before this function ever sees it — see `Row`/mock `rank` handling).
pub fn composite_score(
    bm25_relevance: f64,
    priority: i64,
    age_days: f64,
    access_count: Option<i64>,
) -> f64 {
    let mut score = bm25_relevance * priority_weight(priority) * recency_decay(age_days);
    if let Some(count) = access_count {
        score *= access_boost(count);
    }
    score
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_weight_matches_the_documented_table() {
        assert!((priority_weight(-1) - 0.7).abs() < 1e-9);
        assert!((priority_weight(0) - 1.0).abs() < 1e-9);
        assert!((priority_weight(1) - 1.3).abs() < 1e-9);
        assert!((priority_weight(2) - 1.6).abs() < 1e-9);
    }

    #[test]
    fn higher_priority_outranks_lower_at_equal_bm25_and_age() {
        let low = composite_score(1.0, 0, 10.0, None);
        let high = composite_score(1.0, 2, 10.0, None);
        assert!(high > low);
    }

    #[test]
    fn more_recent_access_outranks_older_at_equal_priority() {
        let stale = composite_score(1.0, 0, 30.0, None);
        let fresh = composite_score(1.0, 0, 1.0, None);
        assert!(fresh > stale);
    }
}
