use std::env;

use crate::services::tag_processor::TagPolicy;

/// Default extensions accepted by the intake pipeline
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] =
    &["jpg", "jpeg", "png", "gif", "bmp", "webp", "pdf"];

/// Policy consumed by the intake pipeline. Built once and injected read-only.
#[derive(Debug, Clone)]
pub struct PipelinePolicy {
    /// Use the remote vision analyzer when it is configured (default: false)
    pub vision_enabled: bool,

    /// Tags below this confidence are dropped (default: 0.7)
    pub min_tag_confidence: f32,

    /// Maximum number of tags kept per file (default: 15)
    pub max_tags_per_file: usize,

    /// Maximum upload size in bytes (default: 50 MB)
    pub max_file_size: usize,

    /// Lowercase extensions without the leading dot
    pub allowed_extensions: Vec<String>,

    /// Fall back to the local heuristic when remote analysis fails (default: true)
    pub allow_local_fallback: bool,
}

impl Default for PipelinePolicy {
    fn default() -> Self {
        Self {
            vision_enabled: false,
            min_tag_confidence: 0.7,
            max_tags_per_file: 15,
            max_file_size: 50 * 1024 * 1024, // 50 MB
            allowed_extensions: DEFAULT_ALLOWED_EXTENSIONS
                .iter()
                .map(|e| e.to_string())
                .collect(),
            allow_local_fallback: true,
        }
    }
}

impl PipelinePolicy {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            vision_enabled: env::var("VISION_ENABLED")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(default.vision_enabled),

            min_tag_confidence: env::var("MIN_TAG_CONFIDENCE")
                .ok()
                .and_then(|v| v.parse::<f32>().ok())
                .filter(|v| (0.0..=1.0).contains(v))
                .unwrap_or(default.min_tag_confidence),

            max_tags_per_file: env::var("MAX_TAGS_PER_FILE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_tags_per_file),

            max_file_size: env::var("MAX_FILE_SIZE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_file_size),

            allowed_extensions: env::var("ALLOWED_EXTENSIONS")
                .ok()
                .map(|v| parse_extensions(&v))
                .filter(|v| !v.is_empty())
                .unwrap_or(default.allowed_extensions),

            allow_local_fallback: env::var("ALLOW_LOCAL_FALLBACK")
                .map(|v| v.to_lowercase() != "false" && v != "0")
                .unwrap_or(default.allow_local_fallback),
        }
    }

    /// Create config for development (local analysis only)
    pub fn development() -> Self {
        Self {
            vision_enabled: false,
            allow_local_fallback: true,
            ..Self::default()
        }
    }

    /// Create config for production (remote analysis, no silent downgrade)
    pub fn production() -> Self {
        Self {
            vision_enabled: true,
            allow_local_fallback: env::var("ALLOW_LOCAL_FALLBACK")
                .map(|v| v.to_lowercase() == "true" || v == "1")
                .unwrap_or(false),
            ..Self::from_env()
        }
    }

    pub fn tag_policy(&self) -> TagPolicy {
        TagPolicy {
            min_confidence: self.min_tag_confidence,
            max_tags: self.max_tags_per_file,
        }
    }

    pub fn is_extension_allowed(&self, extension: &str) -> bool {
        let ext = extension.trim_start_matches('.').to_lowercase();
        self.allowed_extensions.iter().any(|allowed| *allowed == ext)
    }
}

/// Remote vision provider settings
#[derive(Debug, Clone)]
pub struct VisionConfig {
    /// API key for the provider; remote analysis is unavailable without it
    pub api_key: Option<String>,

    /// Annotate endpoint (default: Google Cloud Vision `images:annotate`)
    pub endpoint: String,

    /// Per-call timeout in seconds (default: 15)
    pub timeout_secs: u64,

    /// Maximum labels requested per image (default: 10)
    pub max_results: u32,

    /// Seconds between re-probes of an unreachable provider (default: 60)
    pub reprobe_interval_secs: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: "https://vision.googleapis.com/v1/images:annotate".to_string(),
            timeout_secs: 15,
            max_results: 10,
            reprobe_interval_secs: 60,
        }
    }
}

impl VisionConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            api_key: env::var("VISION_API_KEY").ok().filter(|k| !k.trim().is_empty()),
            endpoint: env::var("VISION_ENDPOINT").unwrap_or(default.endpoint),
            timeout_secs: env::var("VISION_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.timeout_secs),
            max_results: env::var("VISION_MAX_RESULTS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.max_results),
            reprobe_interval_secs: env::var("VISION_REPROBE_INTERVAL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.reprobe_interval_secs),
        }
    }
}

/// Content store settings
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// "local" or "s3" (default: "local")
    pub backend: String,

    /// Root directory for the local backend (default: "uploads")
    pub upload_dir: String,

    /// Delay before the single retry of a transient storage failure (default: 200 ms)
    pub retry_backoff_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: "local".to_string(),
            upload_dir: "uploads".to_string(),
            retry_backoff_ms: 200,
        }
    }
}

impl StorageConfig {
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            backend: env::var("STORAGE_BACKEND").unwrap_or(default.backend),
            upload_dir: env::var("UPLOAD_DIR").unwrap_or(default.upload_dir),
            retry_backoff_ms: env::var("STORAGE_RETRY_BACKOFF_MS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(default.retry_backoff_ms),
        }
    }
}

fn parse_extensions(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}
