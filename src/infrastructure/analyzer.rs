use crate::config::{PipelinePolicy, VisionConfig};
use crate::services::analyzer::{GoogleVisionProvider, RemoteAnalyzer};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Builds the remote analyzer when vision analysis is enabled, probing the provider once.
/// Later probes happen on intake while the provider stays unreachable.
/// Returns `None` when remote analysis is switched off.
pub async fn setup_remote_analyzer(
    policy: &PipelinePolicy,
    vision: &VisionConfig,
) -> Option<Arc<RemoteAnalyzer>> {
    if !policy.vision_enabled {
        info!("👁️  Vision analysis disabled, using local heuristics only");
        return None;
    }

    let provider = Arc::new(GoogleVisionProvider::new(vision.clone()));
    let analyzer = Arc::new(
        RemoteAnalyzer::new(provider, Duration::from_secs(vision.timeout_secs))
            .with_reprobe_interval(Duration::from_secs(vision.reprobe_interval_secs)),
    );

    if vision.api_key.is_none() {
        tracing::warn!("⚠️  VISION_ENABLED is set but VISION_API_KEY is missing! Using local heuristics.");
    } else if analyzer.probe().await {
        info!("👁️  Vision provider '{}' connected successfully", analyzer.provider_name());
    } else {
        tracing::warn!(
            "⚠️  Vision provider '{}' unreachable! Images will be tagged locally.",
            analyzer.provider_name()
        );
    }

    Some(analyzer)
}
