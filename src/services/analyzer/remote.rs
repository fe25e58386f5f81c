use super::{AnalysisError, Analyzer, sanitize_labels};
use crate::config::VisionConfig;
use crate::models::{RawLabel, TagSource};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// External label-detection service, consumed only through its request/response contract.
#[async_trait]
pub trait VisionProvider: Send + Sync {
    /// Returns labels in the provider's own ranking order.
    async fn annotate(&self, image: &[u8], mime_type: &str)
    -> Result<Vec<RawLabel>, AnalysisError>;

    /// Whether credentials are present
    fn is_configured(&self) -> bool;

    /// Check if the provider is reachable
    async fn health_check(&self) -> bool;

    fn name(&self) -> &str;
}

/// Google Cloud Vision `images:annotate` over REST.
pub struct GoogleVisionProvider {
    client: reqwest::Client,
    config: VisionConfig,
}

impl GoogleVisionProvider {
    pub fn new(config: VisionConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }

    fn url(&self) -> Result<String, AnalysisError> {
        let key = self
            .config
            .api_key
            .as_deref()
            .ok_or_else(|| AnalysisError::Unavailable("no API key configured".to_string()))?;
        Ok(format!("{}?key={}", self.config.endpoint, key))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<AnnotateImageRequest>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
}

#[derive(Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
    max_results: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
    error: Option<ProviderStatus>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    #[serde(default)]
    label_annotations: Vec<LabelAnnotation>,
    error: Option<ProviderStatus>,
}

#[derive(Debug, Deserialize)]
struct LabelAnnotation {
    description: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct ProviderStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

impl ProviderStatus {
    fn into_error(self) -> AnalysisError {
        let detail = format!("{} ({})", self.message, self.code);
        match self.status.as_str() {
            "RESOURCE_EXHAUSTED" => AnalysisError::QuotaExceeded(detail),
            "INVALID_ARGUMENT" => AnalysisError::InvalidInput(detail),
            _ => AnalysisError::Unavailable(detail),
        }
    }
}

/// Maps a non-success HTTP status (and its body, when it carries a provider status) to an error.
pub(crate) fn map_http_error(status: reqwest::StatusCode, body: &str) -> AnalysisError {
    if let Ok(AnnotateResponse {
        error: Some(provider_status),
        ..
    }) = serde_json::from_str::<AnnotateResponse>(body)
    {
        if matches!(
            provider_status.status.as_str(),
            "RESOURCE_EXHAUSTED" | "INVALID_ARGUMENT"
        ) {
            return provider_status.into_error();
        }
    }

    let detail = format!("HTTP {}", status.as_u16());
    match status.as_u16() {
        429 => AnalysisError::QuotaExceeded(detail),
        400 => AnalysisError::InvalidInput(detail),
        _ => AnalysisError::Unavailable(detail),
    }
}

/// Parses a successful `images:annotate` body for a single-image request.
pub(crate) fn parse_annotate_response(body: &str) -> Result<Vec<RawLabel>, AnalysisError> {
    let parsed: AnnotateResponse = serde_json::from_str(body)
        .map_err(|e| AnalysisError::MalformedResponse(e.to_string()))?;

    if let Some(status) = parsed.error {
        return Err(status.into_error());
    }

    let response = parsed
        .responses
        .into_iter()
        .next()
        .ok_or_else(|| AnalysisError::MalformedResponse("empty responses array".to_string()))?;

    if let Some(status) = response.error {
        return Err(status.into_error());
    }

    Ok(response
        .label_annotations
        .into_iter()
        .map(|a| RawLabel::new(a.description, a.score))
        .collect())
}

#[async_trait]
impl VisionProvider for GoogleVisionProvider {
    async fn annotate(
        &self,
        image: &[u8],
        mime_type: &str,
    ) -> Result<Vec<RawLabel>, AnalysisError> {
        let url = self.url()?;
        let request = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: BASE64.encode(image),
                },
                features: vec![Feature {
                    kind: "LABEL_DETECTION",
                    max_results: self.config.max_results,
                }],
            }],
        };

        debug!(mime_type, size = image.len(), "vision: annotate request");

        let response = self
            .client
            .post(&url)
            .json(&request)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .send()
            .await
            .map_err(|e| {
                AnalysisError::Unavailable(format!("request failed: {}", e.without_url()))
            })?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                AnalysisError::Unavailable(format!("failed to read body: {}", e.without_url()))
            })?;

        if !status.is_success() {
            return Err(map_http_error(status, &body));
        }

        parse_annotate_response(&body)
    }

    fn is_configured(&self) -> bool {
        self.config.api_key.is_some()
    }

    async fn health_check(&self) -> bool {
        let Ok(url) = self.url() else {
            return false;
        };
        // An empty batch costs no quota and still authenticates the key.
        match self
            .client
            .post(&url)
            .json(&AnnotateRequest { requests: vec![] })
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn name(&self) -> &str {
        "google-cloud-vision"
    }
}

const DEFAULT_REPROBE_INTERVAL: Duration = Duration::from_secs(60);

/// Remote variant of the analyzer: a provider call bounded by a timeout.
pub struct RemoteAnalyzer {
    provider: Arc<dyn VisionProvider>,
    timeout: Duration,
    reachable: AtomicBool,
    reprobe_interval: Duration,
    created: Instant,
    /// Milliseconds after `created` at which the last probe started
    last_probe_ms: AtomicU64,
}

impl RemoteAnalyzer {
    pub fn new(provider: Arc<dyn VisionProvider>, timeout: Duration) -> Self {
        Self {
            provider,
            timeout,
            reachable: AtomicBool::new(true),
            reprobe_interval: DEFAULT_REPROBE_INTERVAL,
            created: Instant::now(),
            last_probe_ms: AtomicU64::new(0),
        }
    }

    pub fn with_reprobe_interval(mut self, interval: Duration) -> Self {
        self.reprobe_interval = interval;
        self
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Record the outcome of the last reachability probe.
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::Relaxed);
    }

    /// Configured and not known to be unreachable
    pub fn is_available(&self) -> bool {
        self.provider.is_configured() && self.reachable.load(Ordering::Relaxed)
    }

    pub async fn probe(&self) -> bool {
        self.last_probe_ms.store(self.elapsed_ms(), Ordering::Relaxed);
        let reachable = self.provider.health_check().await;
        self.set_reachable(reachable);
        reachable
    }

    /// Re-probes an unreachable provider once `reprobe_interval` has passed since the last
    /// probe. Concurrent callers race for the slot and only the winner probes.
    pub async fn refresh(&self) {
        if !self.provider.is_configured() || self.reachable.load(Ordering::Relaxed) {
            return;
        }

        let now = self.elapsed_ms();
        let last = self.last_probe_ms.load(Ordering::Relaxed);
        let interval = u64::try_from(self.reprobe_interval.as_millis()).unwrap_or(u64::MAX);
        if now.saturating_sub(last) < interval {
            return;
        }
        if self
            .last_probe_ms
            .compare_exchange(last, now, Ordering::AcqRel, Ordering::Relaxed)
            .is_err()
        {
            return;
        }

        let reachable = self.provider.health_check().await;
        self.set_reachable(reachable);
        if reachable {
            info!("👁️  Vision provider '{}' reachable again", self.provider_name());
        } else {
            debug!(provider = self.provider_name(), "vision: provider still unreachable");
        }
    }

    fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.created.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait]
impl Analyzer for RemoteAnalyzer {
    fn source(&self) -> TagSource {
        TagSource::RemoteAnalysis
    }

    async fn analyze(&self, data: Bytes, file_type: &str) -> Result<Vec<RawLabel>, AnalysisError> {
        if !file_type.starts_with("image/") {
            return Err(AnalysisError::InvalidInput(format!(
                "{} is not an image type",
                file_type
            )));
        }

        match tokio::time::timeout(self.timeout, self.provider.annotate(&data, file_type)).await {
            Ok(result) => result.map(sanitize_labels),
            Err(_) => Err(AnalysisError::Unavailable(format!(
                "timed out after {:?}",
                self.timeout
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct SlowProvider;

    #[async_trait]
    impl VisionProvider for SlowProvider {
        async fn annotate(&self, _: &[u8], _: &str) -> Result<Vec<RawLabel>, AnalysisError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(vec![])
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn health_check(&self) -> bool {
            true
        }
        fn name(&self) -> &str {
            "slow"
        }
    }

    /// Health follows a shared flag; counts health checks.
    #[derive(Default)]
    struct FlakyProvider {
        healthy: AtomicBool,
        checks: std::sync::atomic::AtomicUsize,
    }

    #[async_trait]
    impl VisionProvider for FlakyProvider {
        async fn annotate(&self, _: &[u8], _: &str) -> Result<Vec<RawLabel>, AnalysisError> {
            Ok(vec![RawLabel::new("cat", 0.9)])
        }
        fn is_configured(&self) -> bool {
            true
        }
        async fn health_check(&self) -> bool {
            self.checks.fetch_add(1, Ordering::SeqCst);
            self.healthy.load(Ordering::SeqCst)
        }
        fn name(&self) -> &str {
            "flaky"
        }
    }

    #[test]
    fn test_parse_label_annotations() {
        let body = r#"{
            "responses": [{
                "labelAnnotations": [
                    {"mid": "/m/01yrx", "description": "Cat", "score": 0.98, "topicality": 0.98},
                    {"mid": "/m/0c_jw", "description": "Furniture", "score": 0.95}
                ]
            }]
        }"#;
        let labels = parse_annotate_response(body).unwrap();
        assert_eq!(
            labels,
            vec![RawLabel::new("Cat", 0.98), RawLabel::new("Furniture", 0.95)]
        );
    }

    #[test]
    fn test_parse_empty_annotations() {
        let labels = parse_annotate_response(r#"{"responses": [{}]}"#).unwrap();
        assert!(labels.is_empty());
    }

    #[test]
    fn test_parse_malformed() {
        assert!(matches!(
            parse_annotate_response("<html>oops</html>"),
            Err(AnalysisError::MalformedResponse(_))
        ));
        assert!(matches!(
            parse_annotate_response(r#"{"responses": []}"#),
            Err(AnalysisError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_parse_per_image_error() {
        let body = r#"{"responses": [{"error": {"code": 3, "message": "Bad image data.", "status": "INVALID_ARGUMENT"}}]}"#;
        assert!(matches!(
            parse_annotate_response(body),
            Err(AnalysisError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_map_http_error() {
        use reqwest::StatusCode;

        assert!(matches!(
            map_http_error(StatusCode::TOO_MANY_REQUESTS, ""),
            AnalysisError::QuotaExceeded(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::BAD_REQUEST, ""),
            AnalysisError::InvalidInput(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::SERVICE_UNAVAILABLE, ""),
            AnalysisError::Unavailable(_)
        ));
        assert!(matches!(
            map_http_error(StatusCode::FORBIDDEN, ""),
            AnalysisError::Unavailable(_)
        ));

        let quota = r#"{"error": {"code": 403, "message": "Quota exceeded", "status": "RESOURCE_EXHAUSTED"}}"#;
        assert!(matches!(
            map_http_error(StatusCode::FORBIDDEN, quota),
            AnalysisError::QuotaExceeded(_)
        ));
    }

    #[test]
    fn test_request_serialization() {
        let request = AnnotateRequest {
            requests: vec![AnnotateImageRequest {
                image: ImageContent {
                    content: BASE64.encode(b"img"),
                },
                features: vec![Feature {
                    kind: "LABEL_DETECTION",
                    max_results: 10,
                }],
            }],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["requests"][0]["image"]["content"], "aW1n");
        assert_eq!(json["requests"][0]["features"][0]["type"], "LABEL_DETECTION");
        assert_eq!(json["requests"][0]["features"][0]["maxResults"], 10);
    }

    #[test]
    fn test_unconfigured_provider() {
        let provider = GoogleVisionProvider::new(VisionConfig::default());
        assert!(!provider.is_configured());
        let analyzer = RemoteAnalyzer::new(Arc::new(provider), Duration::from_secs(1));
        assert!(!analyzer.is_available());
    }

    #[tokio::test]
    async fn test_unconfigured_provider_fails_unavailable() {
        let provider = GoogleVisionProvider::new(VisionConfig::default());
        assert!(matches!(
            provider.annotate(b"img", "image/png").await,
            Err(AnalysisError::Unavailable(_))
        ));
        assert!(!provider.health_check().await);
    }

    #[tokio::test]
    async fn test_timeout_maps_to_unavailable() {
        let analyzer = RemoteAnalyzer::new(Arc::new(SlowProvider), Duration::from_millis(20));
        let result = analyzer
            .analyze(Bytes::from_static(b"img"), "image/jpeg")
            .await;
        assert!(matches!(result, Err(AnalysisError::Unavailable(_))));
    }

    #[tokio::test]
    async fn test_rejects_non_image_types() {
        let analyzer = RemoteAnalyzer::new(Arc::new(SlowProvider), Duration::from_millis(20));
        let result = analyzer
            .analyze(Bytes::from_static(b"%PDF"), "application/pdf")
            .await;
        assert!(matches!(result, Err(AnalysisError::InvalidInput(_))));
    }

    #[test]
    fn test_unreachable_provider_is_not_available() {
        let analyzer = RemoteAnalyzer::new(Arc::new(SlowProvider), Duration::from_secs(1));
        assert!(analyzer.is_available());
        analyzer.set_reachable(false);
        assert!(!analyzer.is_available());
    }

    #[tokio::test]
    async fn test_refresh_recovers_after_outage() {
        let provider = Arc::new(FlakyProvider::default());
        let analyzer = RemoteAnalyzer::new(provider.clone(), Duration::from_secs(1))
            .with_reprobe_interval(Duration::ZERO);

        assert!(!analyzer.probe().await);
        assert!(!analyzer.is_available());

        analyzer.refresh().await;
        assert!(!analyzer.is_available());

        provider.healthy.store(true, Ordering::SeqCst);
        analyzer.refresh().await;
        assert!(analyzer.is_available());
        assert_eq!(provider.checks.load(Ordering::SeqCst), 3);

        // Reachable providers are not re-checked.
        analyzer.refresh().await;
        assert_eq!(provider.checks.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_refresh_waits_for_interval() {
        let provider = Arc::new(FlakyProvider::default());
        let analyzer = RemoteAnalyzer::new(provider.clone(), Duration::from_secs(1))
            .with_reprobe_interval(Duration::from_secs(3600));

        assert!(!analyzer.probe().await);
        provider.healthy.store(true, Ordering::SeqCst);
        analyzer.refresh().await;

        assert!(!analyzer.is_available());
        assert_eq!(provider.checks.load(Ordering::SeqCst), 1);
    }
}
