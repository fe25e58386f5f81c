pub mod api;
pub mod config;
pub mod entities;
pub mod infrastructure;
pub mod models;
pub mod services;
pub mod utils;

use crate::services::file_service::FileService;
use axum::{
    Router,
    middleware::from_fn,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

#[derive(OpenApi)]
#[openapi(
    paths(
        api::handlers::files::process_file,
        api::handlers::files::list_files,
        api::handlers::files::get_file,
        api::handlers::files::get_tags,
        api::handlers::files::update_tags,
        api::handlers::files::get_content,
        api::handlers::files::delete_file,
        api::handlers::search::search_files,
        api::handlers::search::statistics,
        api::handlers::health::health_check,
    ),
    components(
        schemas(
            api::handlers::types::ProcessFileRequest,
            api::handlers::types::FileListResponse,
            api::handlers::types::UpdateTagsRequest,
            api::handlers::types::SearchRequest,
            api::handlers::types::SearchResponse,
            api::handlers::health::HealthResponse,
            models::FileRecord,
            models::ProcessedFile,
            models::Tag,
            models::TagSource,
            models::FileCategory,
            models::SearchHit,
            models::Statistics,
            models::TagCount,
            services::file_service::PipelineStage,
        )
    ),
    tags(
        (name = "files", description = "File intake and tag management"),
        (name = "search", description = "Tag search and statistics"),
        (name = "system", description = "Health checks")
    )
)]
pub struct ApiDoc;

#[derive(Clone)]
pub struct AppState {
    pub file_service: Arc<FileService>,
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.file_service.policy().max_file_size + 10 * 1024 * 1024; // multipart overhead

    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/health", get(api::handlers::health::health_check))
        .route(
            "/api/files/process",
            post(api::handlers::files::process_file)
                .layer(axum::extract::DefaultBodyLimit::max(body_limit)),
        )
        .route("/api/files", get(api::handlers::files::list_files))
        .route(
            "/api/files/statistics",
            get(api::handlers::search::statistics),
        )
        .route(
            "/api/files/search",
            post(api::handlers::search::search_files),
        )
        .route(
            "/api/files/:id",
            get(api::handlers::files::get_file).delete(api::handlers::files::delete_file),
        )
        .route(
            "/api/files/:id/tags",
            get(api::handlers::files::get_tags).put(api::handlers::files::update_tags),
        )
        .route(
            "/api/files/:id/content",
            get(api::handlers::files::get_content),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Wraps the app in request tracing. The request-id layer sits outside the trace layer so
/// every span carries the id, including ones generated for requests that arrive without it.
pub fn with_request_tracing(app: Router) -> Router {
    app.layer(
        TraceLayer::new_for_http()
            .make_span_with(|request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(api::middleware::request_id::REQUEST_ID_HEADER)
                    .and_then(|v| v.to_str().ok())
                    .unwrap_or_default();
                tracing::info_span!(
                    "http_request",
                    method = %request.method(),
                    uri = %request.uri(),
                    request_id = %request_id,
                )
            })
            .on_request(|request: &axum::http::Request<_>, _span: &tracing::Span| {
                info!("📥 {} {}", request.method(), request.uri());
            })
            .on_response(
                |response: &axum::http::Response<_>,
                 latency: std::time::Duration,
                 _span: &tracing::Span| {
                    info!(
                        "📤 Finished in {:?} with status {}",
                        latency,
                        response.status()
                    );
                },
            ),
    )
    .layer(from_fn(api::middleware::request_id::request_id_middleware))
}
