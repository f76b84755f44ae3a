use crate::db::models::{AnprEvent, EventFilter, EventPhoto, ReportFilter, ReportSummary};
use crate::error::Error;
use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const EVENT_COLUMNS: &str = r#"
    id, plate_id, camera_id, camera_model, direction, lane, raw_plate, normalized_plate,
    confidence, vehicle_color, vehicle_type, vehicle_brand, vehicle_model, vehicle_country,
    vehicle_plate_color, vehicle_speed, snapshot_url, event_time, snow_volume_percentage,
    snow_volume_confidence, matched_snow, snow_volume_m3, contractor_id, polygon_id,
    raw_payload, created_at
"#;

/// Events repository for recognition events and their photos
#[derive(Clone)]
pub struct EventsRepository {
    pool: Arc<PgPool>,
}

impl EventsRepository {
    /// Create a new events repository
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Insert an event under its caller-supplied id
    pub async fn create(&self, event: &AnprEvent) -> Result<AnprEvent> {
        let sql = format!(
            r#"
            INSERT INTO anpr_events (
                id, plate_id, camera_id, camera_model, direction, lane, raw_plate, normalized_plate,
                confidence, vehicle_color, vehicle_type, vehicle_brand, vehicle_model, vehicle_country,
                vehicle_plate_color, vehicle_speed, snapshot_url, event_time, snow_volume_percentage,
                snow_volume_confidence, matched_snow, snow_volume_m3, contractor_id, polygon_id,
                raw_payload
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17,
                    $18, $19, $20, $21, $22, $23, $24, $25)
            RETURNING {}
            "#,
            EVENT_COLUMNS
        );

        let result = sqlx::query_as::<_, AnprEvent>(&sql)
            .bind(event.id)
            .bind(event.plate_id)
            .bind(&event.camera_id)
            .bind(&event.camera_model)
            .bind(&event.direction)
            .bind(event.lane)
            .bind(&event.raw_plate)
            .bind(&event.normalized_plate)
            .bind(event.confidence)
            .bind(&event.vehicle_color)
            .bind(&event.vehicle_type)
            .bind(&event.vehicle_brand)
            .bind(&event.vehicle_model)
            .bind(&event.vehicle_country)
            .bind(&event.vehicle_plate_color)
            .bind(event.vehicle_speed)
            .bind(&event.snapshot_url)
            .bind(event.event_time)
            .bind(event.cargo_fill_percentage)
            .bind(event.cargo_fill_confidence)
            .bind(event.matched_cargo)
            .bind(event.cargo_volume_m3)
            .bind(event.organization_id)
            .bind(event.site_id)
            .bind(&event.raw_payload)
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to create event: {}", e)))?;

        Ok(result)
    }

    /// Insert photo rows for an event; display order follows slice order
    pub async fn create_photos(&self, event_id: &Uuid, urls: &[String]) -> Result<Vec<EventPhoto>> {
        if urls.is_empty() {
            return Ok(Vec::new());
        }

        let result = sqlx::query_as::<_, EventPhoto>(
            r#"
            INSERT INTO anpr_event_photos (event_id, photo_url, display_order)
            SELECT $1, t.url, (t.ord - 1)::int
            FROM UNNEST($2::text[]) WITH ORDINALITY AS t(url, ord)
            RETURNING id, event_id, photo_url, display_order, created_at
            "#,
        )
        .bind(event_id)
        .bind(urls)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to create event photos: {}", e)))?;

        Ok(result)
    }

    /// Whether an event for the plate/camera pair exists inside `[from, to]`
    pub async fn exists_recent(
        &self,
        normalized_plate: &str,
        camera_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM anpr_events
                WHERE normalized_plate = $1
                  AND camera_id = $2
                  AND event_time BETWEEN $3 AND $4
            )
            "#,
        )
        .bind(normalized_plate)
        .bind(camera_id)
        .bind(from)
        .bind(to)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to check recent events: {}", e)))?;

        Ok(exists)
    }

    /// Get event by ID
    pub async fn get_by_id(&self, id: &Uuid) -> Result<Option<AnprEvent>> {
        let sql = format!("SELECT {} FROM anpr_events WHERE id = $1", EVENT_COLUMNS);

        let result = sqlx::query_as::<_, AnprEvent>(&sql)
            .bind(id)
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get event by ID: {}", e)))?;

        Ok(result)
    }

    /// Photos of an event in display order
    pub async fn get_photos(&self, event_id: &Uuid) -> Result<Vec<EventPhoto>> {
        let result = sqlx::query_as::<_, EventPhoto>(
            r#"
            SELECT id, event_id, photo_url, display_order, created_at
            FROM anpr_event_photos
            WHERE event_id = $1
            ORDER BY display_order ASC
            "#,
        )
        .bind(event_id)
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get event photos: {}", e)))?;

        Ok(result)
    }

    /// Search events with combined filters, newest first
    pub async fn search(&self, filter: &EventFilter) -> Result<Vec<AnprEvent>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM anpr_events
            WHERE ($1::text IS NULL OR normalized_plate = $1)
              AND ($2::timestamptz IS NULL OR event_time >= $2)
              AND ($3::timestamptz IS NULL OR event_time <= $3)
              AND ($4::text IS NULL OR direction = $4)
            ORDER BY event_time DESC
            LIMIT $5 OFFSET $6
            "#,
            EVENT_COLUMNS
        );

        let result = sqlx::query_as::<_, AnprEvent>(&sql)
            .bind(&filter.plate)
            .bind(filter.from)
            .bind(filter.to)
            .bind(&filter.direction)
            .bind(filter.limit)
            .bind(filter.offset)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to search events: {}", e)))?;

        Ok(result)
    }

    /// Events of one plate inside a time range, oldest first
    pub async fn find_by_plate_and_time(
        &self,
        normalized_plate: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        direction: Option<&str>,
    ) -> Result<Vec<AnprEvent>> {
        let sql = format!(
            r#"
            SELECT {}
            FROM anpr_events
            WHERE normalized_plate = $1
              AND event_time >= $2
              AND event_time <= $3
              AND ($4::text IS NULL OR direction = $4)
            ORDER BY event_time ASC
            "#,
            EVENT_COLUMNS
        );

        let result = sqlx::query_as::<_, AnprEvent>(&sql)
            .bind(normalized_plate)
            .bind(start_time)
            .bind(end_time)
            .bind(direction)
            .fetch_all(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to get events for plate: {}", e)))?;

        Ok(result)
    }

    /// Most recent sighting of a plate
    pub async fn last_event_time_for_plate(
        &self,
        normalized_plate: &str,
    ) -> Result<Option<DateTime<Utc>>> {
        let result = sqlx::query_scalar::<_, Option<DateTime<Utc>>>(
            "SELECT MAX(event_time) FROM anpr_events WHERE normalized_plate = $1",
        )
        .bind(normalized_plate)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to get last event time: {}", e)))?;

        Ok(result)
    }

    /// Delete events created before the cutoff; photos go with them
    pub async fn delete_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let result = sqlx::query("DELETE FROM anpr_events WHERE created_at < $1")
            .bind(cutoff)
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete old events: {}", e)))?;

        debug!("Deleted {} events created before {}", result.rows_affected(), cutoff);
        Ok(result.rows_affected())
    }

    /// Delete every event
    pub async fn delete_all(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM anpr_events")
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Failed to delete all events: {}", e)))?;

        Ok(result.rows_affected())
    }

    /// Total derived volume and trip count over events with a positive volume
    pub async fn report_summary(&self, filter: &ReportFilter) -> Result<ReportSummary> {
        let result = sqlx::query_as::<_, ReportSummary>(
            r#"
            SELECT COALESCE(SUM(snow_volume_m3), 0)::float8 AS total_volume_m3,
                   COUNT(*) AS trip_count
            FROM anpr_events
            WHERE snow_volume_m3 IS NOT NULL AND snow_volume_m3 > 0
              AND event_time >= $1
              AND event_time <= $2
              AND ($3::uuid IS NULL OR contractor_id = $3)
              AND ($4::uuid IS NULL OR polygon_id = $4)
              AND ($5::text IS NULL OR normalized_plate = $5)
            "#,
        )
        .bind(filter.from)
        .bind(filter.to)
        .bind(filter.organization_id)
        .bind(filter.site_id)
        .bind(&filter.plate)
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| Error::Database(format!("Failed to build report summary: {}", e)))?;

        Ok(result)
    }
}
