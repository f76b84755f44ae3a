//! In-memory store used by unit tests in place of Postgres.

use super::store::{EventStore, SiteResolver, VehicleRegistry};
use crate::db::models::{
    AnprEvent, EventFilter, EventPhoto, Plate, ReportFilter, ReportSummary, VehicleRecord,
};
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

#[derive(Default)]
pub struct MemoryStore {
    pub plates: Mutex<Vec<Plate>>,
    pub events: Mutex<Vec<AnprEvent>>,
    pub photos: Mutex<Vec<EventPhoto>>,
    pub vehicles: Mutex<HashMap<String, VehicleRecord>>,
    pub sites: Mutex<HashMap<String, Uuid>>,
    pub fail_photos: AtomicBool,
    pub fail_sites: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_vehicle(&self, normalized_plate: &str, record: VehicleRecord) {
        self.vehicles
            .lock()
            .await
            .insert(normalized_plate.to_string(), record);
    }

    pub async fn add_site(&self, camera_id: &str, site_id: Uuid) {
        self.sites
            .lock()
            .await
            .insert(camera_id.to_lowercase(), site_id);
    }

    pub async fn event_count(&self) -> usize {
        self.events.lock().await.len()
    }

    pub async fn photo_count(&self) -> usize {
        self.photos.lock().await.len()
    }

    /// Rewrite an event's creation time, for retention tests
    pub async fn backdate(&self, id: &Uuid, created_at: DateTime<Utc>) {
        if let Some(event) = self.events.lock().await.iter_mut().find(|e| e.id == *id) {
            event.created_at = created_at;
        }
    }
}

#[async_trait]
impl EventStore for MemoryStore {
    async fn get_or_create_plate(&self, raw_plate: &str, normalized: &str) -> Result<Uuid> {
        let mut plates = self.plates.lock().await;
        if let Some(plate) = plates.iter().find(|p| p.normalized == normalized) {
            return Ok(plate.id);
        }
        let plate = Plate {
            id: Uuid::new_v4(),
            number: raw_plate.to_string(),
            normalized: normalized.to_string(),
            country: None,
            region: None,
            created_at: Utc::now(),
        };
        let id = plate.id;
        plates.push(plate);
        Ok(id)
    }

    async fn find_plate(&self, normalized: &str) -> Result<Option<Plate>> {
        let plates = self.plates.lock().await;
        Ok(plates.iter().find(|p| p.normalized == normalized).cloned())
    }

    async fn create_event(&self, event: &AnprEvent) -> Result<AnprEvent> {
        let mut events = self.events.lock().await;
        if events.iter().any(|e| e.id == event.id) {
            return Err(Error::Database(format!("duplicate key: {}", event.id)).into());
        }
        let mut stored = event.clone();
        stored.created_at = Utc::now();
        events.push(stored.clone());
        Ok(stored)
    }

    async fn create_photos(&self, event_id: &Uuid, urls: &[String]) -> Result<Vec<EventPhoto>> {
        if self.fail_photos.load(Ordering::SeqCst) {
            return Err(Error::Database("photo insert failed".to_string()).into());
        }
        let mut photos = self.photos.lock().await;
        let created: Vec<EventPhoto> = urls
            .iter()
            .enumerate()
            .map(|(index, url)| EventPhoto {
                id: Uuid::new_v4(),
                event_id: *event_id,
                photo_url: url.clone(),
                display_order: index as i32,
                created_at: Utc::now(),
            })
            .collect();
        photos.extend(created.iter().cloned());
        Ok(created)
    }

    async fn exists_recent(
        &self,
        normalized_plate: &str,
        camera_id: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<bool> {
        let events = self.events.lock().await;
        Ok(events.iter().any(|e| {
            e.normalized_plate == normalized_plate
                && e.camera_id == camera_id
                && e.event_time >= from
                && e.event_time <= to
        }))
    }

    async fn get_event(&self, id: &Uuid) -> Result<Option<AnprEvent>> {
        let events = self.events.lock().await;
        Ok(events.iter().find(|e| e.id == *id).cloned())
    }

    async fn get_photos(&self, event_id: &Uuid) -> Result<Vec<EventPhoto>> {
        let photos = self.photos.lock().await;
        let mut result: Vec<EventPhoto> = photos
            .iter()
            .filter(|p| p.event_id == *event_id)
            .cloned()
            .collect();
        result.sort_by_key(|p| p.display_order);
        Ok(result)
    }

    async fn search_events(&self, filter: &EventFilter) -> Result<Vec<AnprEvent>> {
        let events = self.events.lock().await;
        let mut result: Vec<AnprEvent> = events
            .iter()
            .filter(|e| filter.plate.as_deref().map_or(true, |p| e.normalized_plate == p))
            .filter(|e| filter.from.map_or(true, |from| e.event_time >= from))
            .filter(|e| filter.to.map_or(true, |to| e.event_time <= to))
            .filter(|e| filter.direction.as_deref().map_or(true, |d| e.direction == d))
            .cloned()
            .collect();
        result.sort_by(|a, b| b.event_time.cmp(&a.event_time));
        Ok(result
            .into_iter()
            .skip(filter.offset.max(0) as usize)
            .take(filter.limit.max(0) as usize)
            .collect())
    }

    async fn events_by_plate_and_time(
        &self,
        normalized_plate: &str,
        start_time: DateTime<Utc>,
        end_time: DateTime<Utc>,
        direction: Option<&str>,
    ) -> Result<Vec<AnprEvent>> {
        let events = self.events.lock().await;
        let mut result: Vec<AnprEvent> = events
            .iter()
            .filter(|e| e.normalized_plate == normalized_plate)
            .filter(|e| e.event_time >= start_time && e.event_time <= end_time)
            .filter(|e| direction.map_or(true, |d| e.direction == d))
            .cloned()
            .collect();
        result.sort_by_key(|e| e.event_time);
        Ok(result)
    }

    async fn last_event_time(&self, normalized_plate: &str) -> Result<Option<DateTime<Utc>>> {
        let events = self.events.lock().await;
        Ok(events
            .iter()
            .filter(|e| e.normalized_plate == normalized_plate)
            .map(|e| e.event_time)
            .max())
    }

    async fn delete_events_created_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut events = self.events.lock().await;
        let doomed: Vec<Uuid> = events
            .iter()
            .filter(|e| e.created_at < cutoff)
            .map(|e| e.id)
            .collect();
        events.retain(|e| !doomed.contains(&e.id));
        self.photos
            .lock()
            .await
            .retain(|p| !doomed.contains(&p.event_id));
        Ok(doomed.len() as u64)
    }

    async fn delete_all_events(&self) -> Result<u64> {
        let mut events = self.events.lock().await;
        let count = events.len() as u64;
        events.clear();
        self.photos.lock().await.clear();
        Ok(count)
    }

    async fn report_summary(&self, filter: &ReportFilter) -> Result<ReportSummary> {
        let events = self.events.lock().await;
        let volumes: Vec<f64> = events
            .iter()
            .filter(|e| e.event_time >= filter.from && e.event_time <= filter.to)
            .filter(|e| filter.organization_id.map_or(true, |o| e.organization_id == Some(o)))
            .filter(|e| filter.site_id.map_or(true, |s| e.site_id == Some(s)))
            .filter(|e| filter.plate.as_deref().map_or(true, |p| e.normalized_plate == p))
            .filter_map(|e| e.cargo_volume_m3.filter(|v| *v > 0.0))
            .collect();
        Ok(ReportSummary {
            total_volume_m3: volumes.iter().sum(),
            trip_count: volumes.len() as i64,
        })
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
impl VehicleRegistry for MemoryStore {
    async fn lookup(&self, normalized_plate: &str) -> Result<Option<VehicleRecord>> {
        Ok(self.vehicles.lock().await.get(normalized_plate).cloned())
    }
}

#[async_trait]
impl SiteResolver for MemoryStore {
    async fn resolve(&self, camera_id: &str) -> Result<Option<Uuid>> {
        if self.fail_sites.load(Ordering::SeqCst) {
            return Err(Error::Database("polygons unavailable".to_string()).into());
        }
        Ok(self.sites.lock().await.get(&camera_id.to_lowercase()).copied())
    }
}

/// Minimal stored event for seeding the store directly
pub fn stored_event(normalized_plate: &str, camera_id: &str, event_time: DateTime<Utc>) -> AnprEvent {
    AnprEvent {
        id: Uuid::new_v4(),
        plate_id: None,
        camera_id: camera_id.to_string(),
        camera_model: None,
        direction: "entry".to_string(),
        lane: None,
        raw_plate: normalized_plate.to_string(),
        normalized_plate: normalized_plate.to_string(),
        confidence: None,
        vehicle_color: None,
        vehicle_type: None,
        vehicle_brand: None,
        vehicle_model: None,
        vehicle_country: None,
        vehicle_plate_color: None,
        vehicle_speed: None,
        snapshot_url: None,
        event_time,
        cargo_fill_percentage: 0.0,
        cargo_fill_confidence: 0.0,
        matched_cargo: false,
        cargo_volume_m3: None,
        organization_id: None,
        site_id: None,
        raw_payload: None,
        created_at: event_time,
    }
}
