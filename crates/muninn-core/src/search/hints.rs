//! Hints: proactive surfacing from free-form context.
//!
//! The stopword list is a small, fixed, documented set rather than a
//! configurable one.

use std::collections::HashSet;

use crate::memory::Memory;

/// Minimum token length considered a candidate term.
pub const MIN_TERM_LEN: usize = 3;

pub const STOPWORDS: &[&str] = &[
    "the", "and", "for", "with", "that", "this", "from", "have", "has", "had", "not", "are",
    "was", "were", "been", "being", "will", "would", "could", "should", "can", "about", "into",
    "over", "under", "then", "than", "when", "what", "which", "who", "whom", "but",
];

/// A compact stub returned by `recall_hints`: headline fields only.
#[derive(Debug, Clone)]
pub struct HintStub {
    pub id: String,
    pub r#type: String,
    pub t: String,
    pub tags: Vec<String>,
    pub summary_head: String,
}

/// Maximum characters of `summary` carried into a stub's headline.
const SUMMARY_HEAD_LEN: usize = 120;

/// Extracts candidate terms: lowercased, stopword-stripped, `len >= 3`.
pub fn candidate_terms(context: Option<&str>, extra_terms: &[String]) -> Vec<String> {
    let stop: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let from_context = context.into_iter().flat_map(|c| c.split_whitespace());
    let from_extra = extra_terms.iter().map(String::as_str);

    for raw in from_context.chain(from_extra) {
        let term: String = raw
            .chars()
            .filter(|c| c.is_alphanumeric())
            .collect::<String>()
            .to_lowercase();
        if term.len() < MIN_TERM_LEN || stop.contains(term.as_str()) {
            continue;
        }
        if seen.insert(term.clone()) {
            out.push(term);
        }
    }
    out
}

/// Scores one candidate record against the term set: `|terms ∩ tags| +
/// (include_summaries ? hits in summary head : 0)`.
pub fn score_stub(memory: &Memory, terms: &[String], include_tags: bool, include_summaries: bool) -> usize {
    let mut score = 0;
    if include_tags {
        score += memory
            .tags
            .iter()
            .filter(|tag| terms.iter().any(|t| t == &tag.to_lowercase()))
            .count();
    }
    if include_summaries {
        let haystack = memory.summary.to_lowercase();
        score += terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    }
    score
}

pub fn to_stub(memory: &Memory) -> HintStub {
    let summary_head: String = memory.summary.chars().take(SUMMARY_HEAD_LEN).collect();
    HintStub {
        id: memory.id.clone(),
        r#type: memory.r#type.as_str().to_string(),
        t: memory.t.to_rfc3339(),
        tags: memory.tags.clone(),
        summary_head,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stopwords_and_short_tokens_are_dropped() {
        let terms = candidate_terms(Some("the cat sat on a mat about streaming kafka"), &[]);
        assert!(terms.contains(&"streaming".to_string()));
        assert!(terms.contains(&"kafka".to_string()));
        assert!(!terms.contains(&"the".to_string()));
        assert!(terms.contains(&"cat".to_string())); // len 3 but not a stopword — kept
        assert!(!terms.contains(&"on".to_string())); // too short
    }

    #[test]
    fn extra_terms_are_merged_and_deduped() {
        let terms = candidate_terms(Some("kafka streams"), &["kafka".to_string(), "lag".to_string()]);
        assert_eq!(terms.iter().filter(|t| *t == "kafka").count(), 1);
        assert!(terms.contains(&"lag".to_string()));
    }
}
