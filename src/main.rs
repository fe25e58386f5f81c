use clap::Parser;
use dotenvy::dotenv;
use rust_file_tagger::config::{PipelinePolicy, StorageConfig, VisionConfig};
use rust_file_tagger::infrastructure::{analyzer, database, storage};
use rust_file_tagger::services::file_service::FileService;
use rust_file_tagger::services::repository::SeaOrmMetadataRepository;
use rust_file_tagger::{AppState, create_app, with_request_tracing};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(author, version, about = "File intake and tagging service")]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value_t = 3000)]
    port: u16,

    /// Address to bind
    #[arg(long, env = "BIND_ADDRESS", default_value = "127.0.0.1")]
    host: std::net::IpAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let args = Args::parse();

    // Initialize tracing with EnvFilter
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "rust_file_tagger=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("🚀 Starting Rust File Tagger...");

    let policy = PipelinePolicy::from_env();
    let vision_config = VisionConfig::from_env();
    let storage_config = StorageConfig::from_env();
    info!(
        "🏷️  Pipeline Policy: Max Size={}MB, Vision={}, Min Confidence={}, Max Tags={}, Fallback={}",
        policy.max_file_size / 1024 / 1024,
        policy.vision_enabled,
        policy.min_tag_confidence,
        policy.max_tags_per_file,
        policy.allow_local_fallback
    );

    // Setup Infrastructure
    let db = database::setup_database().await?;
    let store = storage::setup_storage(&storage_config).await?;
    let remote = analyzer::setup_remote_analyzer(&policy, &vision_config).await;

    let repository = Arc::new(SeaOrmMetadataRepository::new(db));
    let file_service = Arc::new(FileService::new(
        policy,
        store,
        repository,
        remote,
        Duration::from_millis(storage_config.retry_backoff_ms),
    ));

    let state = AppState { file_service };

    let app = with_request_tracing(create_app(state));

    let addr = SocketAddr::from((args.host, args.port));
    info!("✅ Server ready at http://{}", addr);
    info!("📖 Swagger UI: http://{}/swagger-ui", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("🛑 Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("⌨️  Ctrl+C received, starting graceful shutdown...");
        },
        _ = terminate => {
            info!("💤 SIGTERM received, starting graceful shutdown...");
        },
    }
}
