use super::store::EventStore;
use crate::db::models::{
    AnprEvent, EnrichedEvent, EventFilter, PlateInfo, ReportFilter, ReportSummary,
};
use crate::error::Error;
use crate::utils::normalize_plate;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use log::{info, warn};
use std::sync::Arc;
use uuid::Uuid;

pub const DEFAULT_PAGE_SIZE: i64 = 50;
pub const MAX_PAGE_SIZE: i64 = 100;

/// Listing parameters as received from the API
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    pub plate: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub direction: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

/// Read and maintenance operations over the event log
#[derive(Clone)]
pub struct EventQueryService {
    store: Arc<dyn EventStore>,
}

impl EventQueryService {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// Dictionary entry for a plate, with its most recent sighting
    pub async fn find_plates(&self, plate_query: &str) -> Result<Vec<PlateInfo>> {
        let normalized = normalize_plate(plate_query);
        if normalized.is_empty() {
            return Err(Error::InvalidInput("plate query cannot be empty".to_string()).into());
        }

        let Some(plate) = self.store.find_plate(&normalized).await? else {
            return Ok(Vec::new());
        };

        let last_event_time = match self.store.last_event_time(&normalized).await {
            Ok(time) => time,
            Err(e) => {
                warn!("Failed to get last event time for {}: {:#}", normalized, e);
                None
            }
        };

        Ok(vec![PlateInfo {
            plate_id: plate.id,
            number: plate.number,
            normalized: plate.normalized,
            last_event_time,
        }])
    }

    pub async fn find_events(&self, query: EventQuery) -> Result<Vec<AnprEvent>> {
        let plate = match query.plate.as_deref() {
            Some(raw) => {
                let normalized = normalize_plate(raw);
                (!normalized.is_empty()).then_some(normalized)
            }
            None => None,
        };

        let direction = match query.direction.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(d) => {
                let d = d.to_lowercase();
                if d != "entry" && d != "exit" {
                    return Err(Error::InvalidInput(format!(
                        "direction must be 'entry' or 'exit', got {:?}",
                        d
                    ))
                    .into());
                }
                Some(d)
            }
        };

        let limit = match query.limit {
            Some(limit) if limit > 0 => limit.min(MAX_PAGE_SIZE),
            _ => DEFAULT_PAGE_SIZE,
        };
        let offset = query.offset.unwrap_or(0).max(0);

        let filter = EventFilter {
            plate,
            from: query.from,
            to: query.to,
            direction,
            limit,
            offset,
        };

        self.store.search_events(&filter).await
    }

    /// Single event with its photos in display order
    pub async fn get_event(&self, id: &Uuid) -> Result<EnrichedEvent> {
        let event = self
            .store
            .get_event(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("event {} not found", id)))?;

        let photos = match self.store.get_photos(id).await {
            Ok(photos) => photos.into_iter().map(|p| p.photo_url).collect(),
            Err(e) => {
                warn!("Failed to load photos for event {}: {:#}", id, e);
                Vec::new()
            }
        };

        Ok(EnrichedEvent { event, photos })
    }

    /// Time-range lookup by plate for service-to-service consumers
    pub async fn events_by_plate_and_time(
        &self,
        plate: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        direction: Option<&str>,
    ) -> Result<Vec<AnprEvent>> {
        let normalized = normalize_plate(plate);
        if normalized.is_empty() {
            return Err(Error::InvalidInput("plate is required".to_string()).into());
        }
        if end_time < start_time {
            return Err(
                Error::InvalidInput("end_time must not be before start_time".to_string()).into(),
            );
        }

        let direction = direction
            .map(|d| d.trim().to_lowercase())
            .filter(|d| !d.is_empty());

        self.store
            .events_by_plate_and_time(&normalized, start_time, end_time, direction.as_deref())
            .await
    }

    /// Delete events created more than `days` days ago
    pub async fn delete_old_events(&self, days: i64) -> Result<u64> {
        if days < 1 {
            return Err(Error::InvalidInput("days must be at least 1".to_string()).into());
        }

        let cutoff = Utc::now() - Duration::days(days);
        let deleted = self.store.delete_events_created_before(cutoff).await?;
        info!("Deleted {} events created before {}", deleted, cutoff);
        Ok(deleted)
    }

    pub async fn delete_all_events(&self) -> Result<u64> {
        let deleted = self.store.delete_all_events().await?;
        warn!("Deleted all {} events", deleted);
        Ok(deleted)
    }

    /// Total volume and trip count; the window defaults to the last 24 hours
    pub async fn report_summary(
        &self,
        organization_id: Option<Uuid>,
        site_id: Option<Uuid>,
        plate: Option<&str>,
        from: Option<DateTime<Utc>>,
        to: Option<DateTime<Utc>>,
    ) -> Result<ReportSummary> {
        let to = to.unwrap_or_else(Utc::now);
        let from = from.unwrap_or(to - Duration::hours(24));
        if to < from {
            return Err(Error::InvalidInput("to must not be before from".to_string()).into());
        }

        let filter = ReportFilter {
            organization_id,
            site_id,
            plate: plate.map(normalize_plate).filter(|p| !p.is_empty()),
            from,
            to,
        };

        self.store.report_summary(&filter).await
    }
}
