//! Fuzzy duplicate elimination over merged stage findings.
//!
//! Greedy single-pass clustering: each finding is compared against the
//! already-accepted set in insertion order and the first match wins, so
//! the first-seen finding of a cluster is the one retained. Not
//! globally optimal, by intent.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::Finding;

const URL_SIMILARITY_THRESHOLD: f64 = 0.8;
const TITLE_SIMILARITY_THRESHOLD: f64 = 0.6;

#[derive(Debug)]
pub struct DedupeOutcome {
    pub deduplicated: Vec<Finding>,
    pub removed: usize,
    /// Kept-finding id -> number of duplicates folded into it.
    pub duplicate_counts: HashMap<Uuid, usize>,
}

pub fn dedupe(findings: Vec<Finding>) -> DedupeOutcome {
    let mut accepted: Vec<Finding> = Vec::with_capacity(findings.len());
    let mut duplicate_counts: HashMap<Uuid, usize> = HashMap::new();
    let mut removed = 0;

    for candidate in findings {
        let existing = accepted.iter().find(|kept| is_duplicate(kept, &candidate));
        match existing {
            Some(kept) => {
                *duplicate_counts.entry(kept.id).or_insert(0) += 1;
                removed += 1;
            }
            None => accepted.push(candidate),
        }
    }

    DedupeOutcome {
        deduplicated: accepted,
        removed,
        duplicate_counts,
    }
}

fn is_duplicate(kept: &Finding, candidate: &Finding) -> bool {
    // A shared tool-assigned plugin identity is authoritative.
    if let (Some(a), Some(b)) = (kept.plugin_id(), candidate.plugin_id()) {
        if a == b {
            return true;
        }
    }

    let url_similarity = similarity(
        kept.affected_url.as_deref().unwrap_or(""),
        candidate.affected_url.as_deref().unwrap_or(""),
    );
    if url_similarity < URL_SIMILARITY_THRESHOLD {
        return false;
    }

    if similarity(&kept.title, &candidate.title) < TITLE_SIMILARITY_THRESHOLD {
        return false;
    }

    kept.severity == candidate.severity && kept.category == candidate.category
}

/// Normalized edit-distance similarity in [0, 1]:
/// `1 - levenshtein(a, b) / max(len)`, computed on trimmed, lowercased
/// input. Empty input on either side scores 0.
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.trim().to_lowercase().chars().collect();
    let b: Vec<char> = b.trim().to_lowercase().chars().collect();

    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    if a == b {
        return 1.0;
    }

    let distance = levenshtein(&a, &b);
    1.0 - distance as f64 / a.len().max(b.len()) as f64
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            current[j + 1] = substitution
                .min(previous[j + 1] + 1)
                .min(current[j] + 1);
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Severity;

    fn finding(title: &str, url: &str, severity: Severity, category: &str) -> Finding {
        Finding::new(Uuid::new_v4(), category, severity, title).with_url(url)
    }

    #[test]
    fn similarity_identical_is_one() {
        assert_eq!(similarity("Hello", "Hello"), 1.0);
        assert_eq!(similarity("  Hello ", "hello"), 1.0);
    }

    #[test]
    fn similarity_empty_is_zero() {
        assert_eq!(similarity("", "x"), 0.0);
        assert_eq!(similarity("x", ""), 0.0);
        assert_eq!(similarity("", ""), 0.0);
    }

    #[test]
    fn similarity_kitten_sitting() {
        let s = similarity("kitten", "sitting");
        assert!((s - (1.0 - 3.0 / 7.0)).abs() < 1e-9);
    }

    #[test]
    fn shared_plugin_identity_always_merges() {
        let details = serde_json::json!({ "plugin_id": "40012" });
        let a = finding("Reflected XSS", "https://a.example/x", Severity::High, "web")
            .with_tool_details(details.clone());
        let b = finding(
            "Completely different title",
            "https://unrelated.invalid/zzz",
            Severity::Low,
            "network",
        )
        .with_tool_details(details);

        let outcome = dedupe(vec![a.clone(), b]);
        assert_eq!(outcome.deduplicated.len(), 1);
        assert_eq!(outcome.removed, 1);
        assert_eq!(outcome.duplicate_counts.get(&a.id), Some(&1));
    }

    #[test]
    fn near_identical_findings_merge() {
        let a = finding(
            "Outdated server banner",
            "https://example.com/page1",
            Severity::Medium,
            "web",
        );
        let b = finding(
            "Outdated server banners",
            "https://example.com/page2",
            Severity::Medium,
            "web",
        );
        let outcome = dedupe(vec![a, b]);
        assert_eq!(outcome.deduplicated.len(), 1);
    }

    #[test]
    fn severity_mismatch_unmerges() {
        let a = finding(
            "Outdated server banner",
            "https://example.com/page1",
            Severity::Medium,
            "web",
        );
        let b = finding(
            "Outdated server banners",
            "https://example.com/page2",
            Severity::High,
            "web",
        );
        let outcome = dedupe(vec![a, b]);
        assert_eq!(outcome.deduplicated.len(), 2);
        assert_eq!(outcome.removed, 0);
    }

    #[test]
    fn dissimilar_urls_stay_distinct() {
        let a = finding(
            "Missing security header",
            "https://example.com/a",
            Severity::Low,
            "web",
        );
        let b = finding(
            "Missing security header",
            "https://other-host.invalid/completely/else",
            Severity::Low,
            "web",
        );
        let outcome = dedupe(vec![a, b]);
        assert_eq!(outcome.deduplicated.len(), 2);
    }

    #[test]
    fn first_seen_finding_is_retained() {
        let a = finding(
            "Directory listing enabled",
            "https://example.com/files/",
            Severity::Low,
            "web",
        );
        let b = finding(
            "Directory listing enabled",
            "https://example.com/files1/",
            Severity::Low,
            "web",
        );
        let first_id = a.id;
        let outcome = dedupe(vec![a, b]);
        assert_eq!(outcome.deduplicated[0].id, first_id);
    }
}
