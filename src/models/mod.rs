use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// Where a tag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "kebab-case")]
pub enum TagSource {
    RemoteAnalysis,
    LocalHeuristic,
    Manual,
}

impl TagSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            TagSource::RemoteAnalysis => "remote-analysis",
            TagSource::LocalHeuristic => "local-heuristic",
            TagSource::Manual => "manual",
        }
    }
}

impl fmt::Display for TagSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TagSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "remote-analysis" => Ok(TagSource::RemoteAnalysis),
            "local-heuristic" => Ok(TagSource::LocalHeuristic),
            "manual" => Ok(TagSource::Manual),
            other => Err(format!("unknown tag source '{}'", other)),
        }
    }
}

/// Coarse grouping of accepted uploads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum FileCategory {
    Image,
    Document,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileCategory::Image => "image",
            FileCategory::Document => "document",
        }
    }
}

/// A candidate label straight out of an analyzer, before normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawLabel {
    pub label: String,
    pub confidence: f32,
}

impl RawLabel {
    pub fn new(label: impl Into<String>, confidence: f32) -> Self {
        Self {
            label: label.into(),
            confidence,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ProcessedFile {
    pub id: String,
    pub filename: String,
    pub storage_path: String,
    /// Detected MIME type, never the client-declared one
    pub file_type: String,
    pub category: String,
    pub file_size: i64,
    /// SHA-256 of the stored bytes
    pub checksum: String,
    pub project_ref: String,
    pub vision_enabled: bool,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Tag {
    pub file_id: String,
    pub label: String,
    pub confidence: f32,
    pub source: TagSource,
    pub created_at: DateTime<Utc>,
}

/// A file together with every tag it carries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct FileRecord {
    pub file: ProcessedFile,
    pub tags: Vec<Tag>,
}

/// A file whose tags matched at least one query label
#[derive(Debug, Clone, PartialEq)]
pub struct TagMatch {
    pub file_id: String,
    pub processed_at: DateTime<Utc>,
    pub matching_tags: Vec<Tag>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct SearchHit {
    pub file_id: String,
    pub matching_tags: Vec<Tag>,
    pub relevance_score: f64,
    pub processed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct TagCount {
    pub label: String,
    pub files: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Statistics {
    pub total_files: u64,
    pub categories: BTreeMap<String, u64>,
    pub top_tags: Vec<TagCount>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_source_round_trip() {
        for source in [
            TagSource::RemoteAnalysis,
            TagSource::LocalHeuristic,
            TagSource::Manual,
        ] {
            assert_eq!(source.as_str().parse::<TagSource>().unwrap(), source);
        }
        assert!("vision".parse::<TagSource>().is_err());
    }

    #[test]
    fn test_tag_source_serializes_kebab_case() {
        let json = serde_json::to_value(TagSource::LocalHeuristic).unwrap();
        assert_eq!(json, "local-heuristic");
    }
}
