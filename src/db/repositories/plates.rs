use crate::db::models::Plate;
use crate::error::Error;
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Plate dictionary repository
#[derive(Clone)]
pub struct PlatesRepository {
    pool: Arc<PgPool>,
}

impl PlatesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Id of the plate row for `normalized`, inserting it on first sighting.
    ///
    /// A concurrent insert of the same plate resolves on the unique index; the
    /// spelling already on file is kept.
    pub async fn get_or_create(&self, number: &str, normalized: &str) -> Result<Uuid> {
        let id = sqlx::query_scalar::<_, Uuid>(
            r#"
            INSERT INTO anpr_plates (number, normalized)
            VALUES ($1, $2)
            ON CONFLICT (normalized) DO UPDATE SET normalized = EXCLUDED.normalized
            RETURNING id
            "#,
        )
        .bind(number)
        .bind(normalized)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get or create plate: {}", e)))?;

        Ok(id)
    }

    /// Find a plate by its normalized form
    pub async fn find_by_normalized(&self, normalized: &str) -> Result<Option<Plate>> {
        let result = sqlx::query_as::<_, Plate>(
            r#"
            SELECT id, number, normalized, country, region, created_at
            FROM anpr_plates
            WHERE normalized = $1
            "#,
        )
        .bind(normalized)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to find plate: {}", e)))?;

        Ok(result)
    }
}
