use crate::models::RawLabel;
use serde::Serialize;
use std::collections::HashMap;

/// Labels that carry no information and are always discarded
const STOP_LABELS: &[&str] = &["unknown", "error", "other", "undefined"];

/// Canonical spellings applied after whitespace normalization
const SYNONYMS: &[(&str, &str)] = &[
    ("jpg", "jpeg"),
    ("pic", "image"),
    ("picture", "image"),
    ("photo", "image"),
    ("img", "image"),
    ("movie", "video"),
    ("clip", "video"),
    ("doc", "document"),
    ("paper", "document"),
    ("file", "document"),
];

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TagPolicy {
    pub min_confidence: f32,
    pub max_tags: usize,
}

impl Default for TagPolicy {
    fn default() -> Self {
        Self {
            min_confidence: 0.7,
            max_tags: 15,
        }
    }
}

/// A label that survived processing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredTag {
    pub label: String,
    pub confidence: f32,
}

/// Lowercase, trim, collapse internal whitespace, then map through the synonym table.
/// Returns `None` for labels that normalize to nothing or to a stop word.
pub fn normalize_label(raw: &str) -> Option<String> {
    let collapsed = raw
        .split_whitespace()
        .map(|part| part.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ");

    if collapsed.is_empty() || STOP_LABELS.contains(&collapsed.as_str()) {
        return None;
    }

    let canonical = SYNONYMS
        .iter()
        .find(|(from, _)| *from == collapsed)
        .map(|(_, to)| to.to_string())
        .unwrap_or(collapsed);

    Some(canonical)
}

/// Turns raw analyzer output into the final ordered tag set.
///
/// Pure and deterministic: entries are normalized, filtered by `min_confidence`, merged by
/// label keeping the highest confidence, sorted by confidence descending and truncated to
/// `max_tags`. Equal confidences keep the order in which the label first appears in `raw`,
/// counting entries that were later filtered out by the threshold.
pub fn process(raw: &[RawLabel], policy: &TagPolicy) -> Vec<ScoredTag> {
    let mut first_seen: HashMap<String, usize> = HashMap::new();
    let mut best: HashMap<String, f32> = HashMap::new();

    for (position, entry) in raw.iter().enumerate() {
        if !entry.confidence.is_finite() {
            continue;
        }
        let Some(label) = normalize_label(&entry.label) else {
            continue;
        };
        first_seen.entry(label.clone()).or_insert(position);

        let confidence = entry.confidence.clamp(0.0, 1.0);
        if confidence < policy.min_confidence {
            continue;
        }
        best.entry(label)
            .and_modify(|current| {
                if confidence > *current {
                    *current = confidence;
                }
            })
            .or_insert(confidence);
    }

    let merged: HashMap<String, (usize, f32)> = best
        .into_iter()
        .map(|(label, confidence)| {
            let position = first_seen.get(&label).copied().unwrap_or(usize::MAX);
            (label, (position, confidence))
        })
        .collect();

    let mut ordered: Vec<(String, usize, f32)> = merged
        .into_iter()
        .map(|(label, (position, confidence))| (label, position, confidence))
        .collect();

    ordered.sort_by(|a, b| b.2.total_cmp(&a.2).then_with(|| a.1.cmp(&b.1)));
    ordered.truncate(policy.max_tags);

    ordered
        .into_iter()
        .map(|(label, _, confidence)| ScoredTag { label, confidence })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(items: &[(&str, f32)]) -> Vec<RawLabel> {
        items.iter().map(|(l, c)| RawLabel::new(*l, *c)).collect()
    }

    fn names(tags: &[ScoredTag]) -> Vec<&str> {
        tags.iter().map(|t| t.label.as_str()).collect()
    }

    #[test]
    fn test_normalize_label() {
        assert_eq!(normalize_label("  Golden   Retriever "), Some("golden retriever".into()));
        assert_eq!(normalize_label("PHOTO"), Some("image".into()));
        assert_eq!(normalize_label("jpg"), Some("jpeg".into()));
        assert_eq!(normalize_label("   "), None);
        assert_eq!(normalize_label("Unknown"), None);
    }

    #[test]
    fn test_keeps_remote_ranking() {
        let raw = labels(&[
            ("cat", 0.98),
            ("furniture", 0.95),
            ("sofa", 0.92),
            ("pet", 0.89),
            ("indoor", 0.85),
        ]);
        let tags = process(&raw, &TagPolicy::default());
        assert_eq!(names(&tags), vec!["cat", "furniture", "sofa", "pet", "indoor"]);
        assert_eq!(tags[0].confidence, 0.98);
    }

    #[test]
    fn test_filters_below_threshold() {
        let raw = labels(&[("sky", 0.69), ("cloud", 0.7), ("tree", 0.2)]);
        let tags = process(&raw, &TagPolicy::default());
        assert_eq!(names(&tags), vec!["cloud"]);
    }

    #[test]
    fn test_merges_duplicates_keeping_highest() {
        let raw = labels(&[("Dog", 0.75), ("cat", 0.8), ("dog ", 0.9)]);
        let tags = process(&raw, &TagPolicy::default());
        assert_eq!(
            tags,
            vec![
                ScoredTag {
                    label: "dog".into(),
                    confidence: 0.9
                },
                ScoredTag {
                    label: "cat".into(),
                    confidence: 0.8
                },
            ]
        );
    }

    #[test]
    fn test_ties_keep_first_seen_order() {
        let raw = labels(&[("zebra", 0.8), ("apple", 0.8), ("mango", 0.9), ("kiwi", 0.8)]);
        let tags = process(&raw, &TagPolicy::default());
        assert_eq!(names(&tags), vec!["mango", "zebra", "apple", "kiwi"]);
    }

    #[test]
    fn test_tie_position_counts_entries_below_threshold() {
        // "river" appears first at a low score and again later at the tied score.
        let raw = labels(&[("river", 0.3), ("lake", 0.8), ("River", 0.8)]);
        let tags = process(&raw, &TagPolicy::default());
        assert_eq!(names(&tags), vec!["river", "lake"]);
    }

    #[test]
    fn test_truncates_to_max_tags() {
        let policy = TagPolicy {
            min_confidence: 0.5,
            max_tags: 4,
        };
        let raw = labels(&[
            ("a", 0.81),
            ("b", 0.95),
            ("c", 0.60),
            ("d", 0.90),
            ("e", 0.99),
        ]);
        let tags = process(&raw, &policy);
        assert_eq!(tags.len(), 4);
        assert_eq!(names(&tags), vec!["e", "b", "d", "a"]);
    }

    #[test]
    fn test_drops_invalid_confidences_and_clamps() {
        let raw = vec![
            RawLabel::new("nan", f32::NAN),
            RawLabel::new("inf", f32::INFINITY),
            RawLabel::new("over", 1.7),
        ];
        let tags = process(&raw, &TagPolicy::default());
        assert_eq!(
            tags,
            vec![ScoredTag {
                label: "over".into(),
                confidence: 1.0
            }]
        );
    }

    #[test]
    fn test_is_deterministic() {
        let raw = labels(&[
            ("beach", 0.8),
            ("sea", 0.9),
            ("sand", 0.8),
            ("Sea", 0.85),
            ("sun", 0.8),
            ("sky", 0.95),
        ]);
        let policy = TagPolicy::default();
        let first = process(&raw, &policy);
        for _ in 0..50 {
            assert_eq!(process(&raw, &policy), first);
        }
    }

    #[test]
    fn test_empty_input() {
        assert!(process(&[], &TagPolicy::default()).is_empty());
    }
}
