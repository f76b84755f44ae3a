use anyhow::Result;
use sqlx::{Executor, PgPool};
use tracing::{debug, info};

/// Migration scripts in execution order. Tables first, indexes last.
const MIGRATIONS: &[(&str, &str)] = &[
    (
        "001_create_anpr_plates.sql",
        include_str!("sql/001_create_anpr_plates.sql"),
    ),
    (
        "002_create_anpr_events.sql",
        include_str!("sql/002_create_anpr_events.sql"),
    ),
    (
        "003_create_anpr_event_photos.sql",
        include_str!("sql/003_create_anpr_event_photos.sql"),
    ),
    (
        "004_normalize_plate_function.sql",
        include_str!("sql/004_normalize_plate_function.sql"),
    ),
    ("add_indexes.sql", include_str!("sql/add_indexes.sql")),
];

pub async fn run_migrations(pool: &PgPool) -> Result<()> {
    for (name, sql) in MIGRATIONS {
        execute_migration(pool, name, sql).await?;
        info!("Applied migration: {}", name);
    }

    Ok(())
}

async fn execute_migration(pool: &PgPool, name: &str, sql: &str) -> Result<()> {
    debug!("Executing migration: {}", name);

    // Multi-statement scripts go through the simple query protocol
    pool.execute(sql)
        .await
        .map_err(|e| anyhow::anyhow!("migration {} failed: {}", name, e))?;

    Ok(())
}
