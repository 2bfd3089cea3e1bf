//! Catalog bring-up: retrying connection plus startup migrations.

use std::path::Path;

use anyhow::{Context, Result};
use sqlx::PgPool;

use clipstream_core::Config;

pub async fn setup_database(config: &Config) -> Result<PgPool> {
    let pool = clipstream_db::connect_with_retry(&config.database_dsn).await;

    // Workspace migrations/ directory, resolved from this crate's root.
    let migrations_dir = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../migrations");
    let migrator = sqlx::migrate::Migrator::new(migrations_dir)
        .await
        .context("failed to load migrations")?;
    migrator
        .run(&pool)
        .await
        .context("failed to run database migrations")?;
    tracing::info!("database migrations applied");

    Ok(pool)
}
