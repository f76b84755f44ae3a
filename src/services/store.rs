//! Persistence seams used by the enrichment engine and the query service.

use crate::db::models::{
    AnprEvent, EventFilter, EventPhoto, Plate, ReportFilter, ReportSummary, VehicleRecord,
};
use crate::db::repositories::{
    EventsRepository, PlatesRepository, SitesRepository, VehiclesRepository,
};
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

/// Event log and plate dictionary
#[async_trait]
pub trait EventStore: Send + Sync {
    /// Atomic get-or-create keyed by the normalized plate
    async fn get_or_create_plate(&self, raw_plate: &str, normalized: &str) -> Result<Uuid>;

    async fn find_plate(&self, normalized: &str) -> Result<Option<Plate>>;

    /// Single-row insert under the caller's id
    async fn create_event(&self, event: &AnprEvent) -> Result<AnprEvent>;

    async fn create_photos(&self, event_id: &Uuid, urls: &[String]) -> Result<Vec<EventPhoto>>;

    /// Whether an event with this plate and camera has `event_time` in `[from, to]`
    async fn exists_recent(
        &self,
        normalized_plate: &str,
        camera_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool>;

    async fn get_event(&self, id: &Uuid) -> Result<Option<AnprEvent>>;

    async fn get_photos(&self, event_id: &Uuid) -> Result<Vec<EventPhoto>>;

    async fn search_events(&self, filter: &EventFilter) -> Result<Vec<AnprEvent>>;

    async fn events_by_plate_and_time(
        &self,
        normalized_plate: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        direction: Option<&str>,
    ) -> Result<Vec<AnprEvent>>;

    async fn last_event_time(&self, normalized_plate: &str) -> Result<Option<DateTime<Utc>>>;

    /// Bulk delete by creation time, photos included
    async fn delete_events_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn delete_all_events(&self) -> Result<u64>;

    async fn report_summary(&self, filter: &ReportFilter) -> Result<ReportSummary>;

    /// Readiness probe
    async fn ping(&self) -> Result<()>;
}

/// Fleet whitelist; only active vehicles are visible
#[async_trait]
pub trait VehicleRegistry: Send + Sync {
    async fn lookup(&self, normalized_plate: &str) -> Result<Option<VehicleRecord>>;
}

/// Camera id to site (polygon) mapping
#[async_trait]
pub trait SiteResolver: Send + Sync {
    async fn resolve(&self, camera_id: &str) -> Result<Option<Uuid>>;
}

/// Postgres-backed [`EventStore`]
#[derive(Clone)]
pub struct PgEventStore {
    pool: Arc<PgPool>,
    events: EventsRepository,
    plates: PlatesRepository,
}

impl PgEventStore {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self {
            events: EventsRepository::new(pool.clone()),
            plates: PlatesRepository::new(pool.clone()),
            pool,
        }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn get_or_create_plate(&self, raw_plate: &str, normalized: &str) -> Result<Uuid> {
        self.plates.get_or_create(raw_plate, normalized).await
    }

    async fn find_plate(&self, normalized: &str) -> Result<Option<Plate>> {
        self.plates.find_by_normalized(normalized).await
    }

    async fn create_event(&self, event: &AnprEvent) -> Result<AnprEvent> {
        self.events.create(event).await
    }

    async fn create_photos(&self, event_id: &Uuid, urls: &[String]) -> Result<Vec<EventPhoto>> {
        self.events.create_photos(event_id, urls).await
    }

    async fn exists_recent(
        &self,
        normalized_plate: &str,
        camera_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        self.events
            .exists_recent(normalized_plate, camera_id, from, to)
            .await
    }

    async fn get_event(&self, id: &Uuid) -> Result<Option<AnprEvent>> {
        self.events.get_by_id(id).await
    }

    async fn get_photos(&self, event_id: &Uuid) -> Result<Vec<EventPhoto>> {
        self.events.get_photos(event_id).await
    }

    async fn search_events(&self, filter: &EventFilter) -> Result<Vec<AnprEvent>> {
        self.events.search(filter).await
    }

    async fn events_by_plate_and_time(
        &self,
        normalized_plate: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        direction: Option<&str>,
    ) -> Result<Vec<AnprEvent>> {
        self.events
            .find_by_plate_and_time(normalized_plate, start_time, end_time, direction)
            .await
    }

    async fn last_event_time(&self, normalized_plate: &str) -> Result<Option<DateTime<Utc>>> {
        self.events.last_event_time_for_plate(normalized_plate).await
    }

    async fn delete_events_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        self.events.delete_created_before(cutoff).await
    }

    async fn delete_all_events(&self) -> Result<u64> {
        self.events.delete_all().await
    }

    async fn report_summary(&self, filter: &ReportFilter) -> Result<ReportSummary> {
        self.events.report_summary(filter).await
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&*self.pool)
            .await
            .map_err(|e| Error::Database(format!("Database unreachable: {}", e)))?;
        Ok(())
    }
}

#[async_trait]
impl VehicleRegistry for VehiclesRepository {
    async fn lookup(&self, normalized_plate: &str) -> Result<Option<VehicleRecord>> {
        self.find_active_by_plate(normalized_plate).await
    }
}

#[async_trait]
impl SiteResolver for SitesRepository {
    async fn resolve(&self, camera_id: &str) -> Result<Option<Uuid>> {
        self.resolve_polygon_id(camera_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::migrations;
    use crate::services::memory::stored_event;
    use chrono::Duration;
    use sqlx::postgres::PgPoolOptions;

    /// Round-trip tests need a disposable Postgres; they are skipped without one.
    async fn test_store() -> Option<PgEventStore> {
        let url = std::env::var("TEST_DATABASE_URL").ok()?;
        let pool = PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        Some(PgEventStore::new(Arc::new(pool)))
    }

    fn unique_plate() -> String {
        let suffix = Uuid::new_v4().simple().to_string().to_uppercase();
        format!("T{}", &suffix[..9])
    }

    #[tokio::test]
    async fn plate_get_or_create_is_idempotent() {
        let Some(store) = test_store().await else {
            return;
        };
        let plate = unique_plate();

        let first = store.get_or_create_plate(&plate, &plate).await.unwrap();
        let second = store.get_or_create_plate(&plate, &plate).await.unwrap();
        assert_eq!(first, second);

        let found = store.find_plate(&plate).await.unwrap().unwrap();
        assert_eq!(found.id, first);
    }

    #[tokio::test]
    async fn events_and_photos_round_trip() {
        let Some(store) = test_store().await else {
            return;
        };
        store.ping().await.unwrap();

        let plate = unique_plate();
        let now = Utc::now();
        let mut event = stored_event(&plate, "pg-test-cam", now);
        event.plate_id = Some(store.get_or_create_plate(&plate, &plate).await.unwrap());
        event.cargo_volume_m3 = Some(8.5);

        let saved = store.create_event(&event).await.unwrap();
        assert_eq!(saved.id, event.id);

        let urls = vec!["https://cdn/a.jpg".to_string(), "https://cdn/b.jpg".to_string()];
        store.create_photos(&event.id, &urls).await.unwrap();
        let photos = store.get_photos(&event.id).await.unwrap();
        let stored: Vec<_> = photos.into_iter().map(|p| p.photo_url).collect();
        assert_eq!(stored, urls);

        assert!(store
            .exists_recent(&plate, "pg-test-cam", now - Duration::minutes(5), now + Duration::minutes(5))
            .await
            .unwrap());
        assert!(!store
            .exists_recent(&plate, "other-cam", now - Duration::minutes(5), now + Duration::minutes(5))
            .await
            .unwrap());

        let loaded = store.get_event(&event.id).await.unwrap().unwrap();
        assert_eq!(loaded.cargo_volume_m3, Some(8.5));
        assert_eq!(loaded.normalized_plate, plate);
    }

    #[tokio::test]
    async fn sql_normaliser_matches_rust_normaliser() {
        let Some(store) = test_store().await else {
            return;
        };

        for raw in [
            "123 abc 02",
            "  123-ABC-02  ",
            "123 аbc 02",
            "ä-12 ß\t34",
            "Ωmega 7",
        ] {
            let sql: String = sqlx::query_scalar("SELECT normalize_plate_number($1)")
                .bind(raw)
                .fetch_one(&*store.pool)
                .await
                .unwrap();
            assert_eq!(sql, crate::utils::normalize_plate(raw), "{:?}", raw);
        }
    }
}
