use crate::db::models::VehicleRecord;
use crate::error::Error;
use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;

/// Read-only access to the external `vehicles` table
#[derive(Clone)]
pub struct VehiclesRepository {
    pool: Arc<PgPool>,
}

impl VehiclesRepository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Active vehicle registered under the normalized plate
    pub async fn find_active_by_plate(&self, normalized_plate: &str) -> Result<Option<VehicleRecord>> {
        let result = sqlx::query_as::<_, VehicleRecord>(
            r#"
            SELECT brand,
                   model,
                   color,
                   year::int AS year,
                   body_volume_m3::float8 AS cargo_capacity_m3,
                   contractor_id AS organization_id
            FROM vehicles
            WHERE is_active = true
              AND normalize_plate_number(plate_number) = $1
            LIMIT 1
            "#,
        )
        .bind(normalized_plate)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get vehicle: {}", e)))?;

        Ok(result)
    }
}
