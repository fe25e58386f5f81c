use crate::entities::{file_tags, processed_files};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Schema, Statement};
use std::env;
use std::time::Duration;
use tracing::info;

pub async fn setup_database() -> anyhow::Result<DatabaseConnection> {
    let db_url = env::var("DATABASE_URL")
        .unwrap_or_else(|_| "sqlite://file_tagger.db?mode=rwc".to_string());

    info!("📂 Database: {}", db_url);

    let mut opt = ConnectOptions::new(&db_url);
    opt.max_connections(20)
        .min_connections(1)
        .connect_timeout(Duration::from_secs(30))
        .acquire_timeout(Duration::from_secs(30))
        .idle_timeout(Duration::from_secs(600))
        .max_lifetime(Duration::from_secs(1800))
        .sqlx_logging(true)
        .sqlx_logging_level(log::LevelFilter::Debug);

    let db = Database::connect(opt).await?;

    info!("✅ Database connected successfully");

    run_migrations(&db).await?;

    Ok(db)
}

/// Creates both tables and their indexes if they do not exist yet.
pub async fn run_migrations(db: &DatabaseConnection) -> anyhow::Result<()> {
    info!("🔄 Running SeaORM auto-migrations...");
    let builder = db.get_database_backend();
    let schema = Schema::new(builder);

    // Parent table first so the foreign key on file_tags resolves.
    let stmts = vec![
        schema
            .create_table_from_entity(processed_files::Entity)
            .if_not_exists()
            .to_owned(),
        schema
            .create_table_from_entity(file_tags::Entity)
            .if_not_exists()
            .to_owned(),
    ];

    for stmt in stmts {
        db.execute(builder.build(&stmt)).await?;
    }

    let indexes = [
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_file_tags_file_label_source ON file_tags(file_id, label, source);",
        "CREATE INDEX IF NOT EXISTS idx_file_tags_label ON file_tags(label);",
        "CREATE INDEX IF NOT EXISTS idx_processed_files_category ON processed_files(category);",
        "CREATE INDEX IF NOT EXISTS idx_processed_files_processed_at ON processed_files(processed_at);",
    ];

    for sql in indexes {
        db.execute(Statement::from_string(builder, sql.to_string()))
            .await?;
    }

    Ok(())
}
