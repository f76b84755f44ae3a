//! Turns a canonical recognition event into a persisted, whitelisted event.

use super::dedup::{dedup_window, DedupGuard};
use super::store::{EventStore, SiteResolver, VehicleRegistry};
use crate::config::IngestConfig;
use crate::db::models::{AnprEvent, EnrichedEvent, VehicleRecord};
use crate::error::Error;
use crate::ingest::CanonicalEvent;
use crate::utils::{first_non_empty, normalize_plate};
use anyhow::Result;
use chrono::Utc;
use log::{debug, error, info, warn};
use serde_json::{json, Value};
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Enrichment pipeline. Holds no per-request state.
#[derive(Clone)]
pub struct EnrichmentEngine {
    store: Arc<dyn EventStore>,
    registry: Arc<dyn VehicleRegistry>,
    sites: Arc<dyn SiteResolver>,
    dedup: DedupGuard,
    config: IngestConfig,
}

impl EnrichmentEngine {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: Arc<dyn VehicleRegistry>,
        sites: Arc<dyn SiteResolver>,
        config: IngestConfig,
    ) -> Self {
        Self {
            dedup: DedupGuard::new(store.clone()),
            store,
            registry,
            sites,
            config,
        }
    }

    /// Validate, deduplicate, whitelist, enrich and persist one event.
    ///
    /// `event_id` is minted by the caller so that evidence can be uploaded
    /// under it before the insert. Cancellation is honoured up to the insert;
    /// once the event row exists the call runs to completion.
    pub async fn process(
        &self,
        event: CanonicalEvent,
        default_camera_model: &str,
        event_id: Uuid,
        evidence_urls: Vec<String>,
        cancel: &CancellationToken,
    ) -> Result<EnrichedEvent> {
        if event.plate.trim().is_empty() {
            return Err(Error::InvalidInput("plate is required".to_string()).into());
        }
        if event.camera_id.trim().is_empty() {
            return Err(Error::InvalidInput("camera_id is required".to_string()).into());
        }
        let Some(event_time) = event.event_time else {
            return Err(Error::InvalidInput("event_time is required".to_string()).into());
        };

        let normalized = normalize_plate(&event.plate);
        if normalized.is_empty() {
            return Err(Error::InvalidInput(
                "plate cannot be empty after normalization".to_string(),
            )
            .into());
        }

        let recent = guarded(
            cancel,
            self.dedup
                .exists_recent(&normalized, &event.camera_id, event_time, dedup_window()),
        )
        .await
        .map_err(|e| e.context("failed to check duplicate event"))?;
        if recent {
            warn!(
                "Duplicate event for plate {} on camera {} within the dedup window, skipping",
                normalized, event.camera_id
            );
            return Err(Error::DuplicateEvent(format!(
                "plate {} already seen by camera {}",
                normalized, event.camera_id
            ))
            .into());
        }

        let plate_id = guarded(
            cancel,
            self.store.get_or_create_plate(&event.plate, &normalized),
        )
        .await
        .map_err(|e| {
            error!("Failed to get or create plate {}: {:#}", normalized, e);
            e.context("failed to get or create plate")
        })?;
        debug!("Plate {} resolved to {}", normalized, plate_id);

        let vehicle = guarded(cancel, self.registry.lookup(&normalized))
            .await
            .map_err(|e| {
                error!("Failed to look up vehicle {}: {:#}", normalized, e);
                e.context("failed to get vehicle data")
            })?;
        let Some(vehicle) = vehicle else {
            warn!(
                "Vehicle {} from camera {} is not in the registry, rejecting",
                normalized, event.camera_id
            );
            return Err(Error::VehicleNotWhitelisted(format!(
                "vehicle {} not found in registry",
                normalized
            ))
            .into());
        };

        let direction = self.resolve_direction(&event.direction);
        let cargo_volume_m3 = derive_cargo_volume(&normalized, &event, &vehicle);

        let site_id = match guarded(cancel, self.sites.resolve(&event.camera_id)).await {
            Ok(site) => site,
            Err(e) if is_cancelled(&e) => return Err(e),
            Err(e) => {
                warn!(
                    "Failed to resolve site for camera {}: {:#}",
                    event.camera_id, e
                );
                None
            }
        };

        let record = build_record(
            event_id,
            plate_id,
            normalized,
            direction,
            default_camera_model,
            event,
            &vehicle,
            cargo_volume_m3,
            site_id,
        );

        if cancel.is_cancelled() {
            return Err(Error::Cancelled("request cancelled before commit".to_string()).into());
        }

        let stored = self.store.create_event(&record).await.map_err(|e| {
            error!(
                "Failed to create event for plate {} on camera {}: {:#}",
                record.normalized_plate, record.camera_id, e
            );
            e.context("failed to create ANPR event")
        })?;

        let mut photos = Vec::new();
        if !evidence_urls.is_empty() {
            match self.store.create_photos(&stored.id, &evidence_urls).await {
                Ok(created) => {
                    info!("Saved {} photos for event {}", created.len(), stored.id);
                    photos = created.into_iter().map(|p| p.photo_url).collect();
                }
                Err(e) => {
                    warn!(
                        "Failed to save {} photos for event {}: {:#}",
                        evidence_urls.len(),
                        stored.id,
                        e
                    );
                }
            }
        }

        info!(
            "Saved event {} for plate {} (raw {:?}) from camera {} at {}",
            stored.id, stored.normalized_plate, stored.raw_plate, stored.camera_id, stored.event_time
        );

        Ok(EnrichedEvent {
            event: stored,
            photos,
        })
    }

    fn resolve_direction(&self, direction: &str) -> String {
        let direction = direction.trim().to_lowercase();
        if direction.is_empty() || direction == "unknown" {
            self.config.default_direction.clone()
        } else {
            direction
        }
    }
}

/// `(percentage / 100) * capacity`, only for a positive registry capacity
fn derive_cargo_volume(normalized: &str, event: &CanonicalEvent, vehicle: &VehicleRecord) -> Option<f64> {
    let percentage = event.resolved_cargo_fill();
    match vehicle.positive_capacity() {
        Some(capacity) => {
            let volume = (percentage / 100.0) * capacity;
            debug!(
                "Cargo volume for {}: {}% of {} m3 = {} m3",
                normalized, percentage, capacity, volume
            );
            Some(volume)
        }
        None => {
            if percentage > 0.0 {
                warn!(
                    "Cannot derive cargo volume for {}: capacity {:?} is not positive",
                    normalized, vehicle.cargo_capacity_m3
                );
            }
            None
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn build_record(
    event_id: Uuid,
    plate_id: Uuid,
    normalized: String,
    direction: String,
    default_camera_model: &str,
    event: CanonicalEvent,
    vehicle: &VehicleRecord,
    cargo_volume_m3: Option<f64>,
    site_id: Option<Uuid>,
) -> AnprEvent {
    let cargo_fill_percentage = event.resolved_cargo_fill();
    let cargo_fill_confidence = event.resolved_cargo_confidence();
    let matched_cargo = event.resolved_matched_cargo();

    // Registry attributes win; camera values only fill registry gaps
    let prefer = |registry: &Option<String>, camera: &Option<String>| {
        first_non_empty(
            [registry.as_deref(), camera.as_deref()]
                .into_iter()
                .flatten(),
        )
    };
    let vehicle_brand = prefer(&vehicle.brand, &event.vehicle.brand);
    let vehicle_model = prefer(&vehicle.model, &event.vehicle.model);
    let vehicle_color = prefer(&vehicle.color, &event.vehicle.color);

    let camera_model = first_non_empty(
        [event.camera_model.as_deref(), Some(default_camera_model)]
            .into_iter()
            .flatten(),
    );

    let mut payload = event.raw_payload;
    if let Some(year) = vehicle.year {
        payload.insert("vehicle_year".to_string(), json!(year));
    }

    AnprEvent {
        id: event_id,
        plate_id: Some(plate_id),
        camera_id: event.camera_id,
        camera_model,
        direction,
        lane: event.lane,
        raw_plate: event.plate,
        normalized_plate: normalized,
        confidence: event.confidence,
        vehicle_color,
        vehicle_type: event.vehicle.vehicle_type,
        vehicle_brand,
        vehicle_model,
        vehicle_country: event.vehicle.country,
        vehicle_plate_color: event.vehicle.plate_color,
        vehicle_speed: event.vehicle.speed,
        snapshot_url: event.snapshot_url,
        event_time: event.event_time.unwrap_or_else(Utc::now),
        cargo_fill_percentage,
        cargo_fill_confidence,
        matched_cargo,
        cargo_volume_m3,
        organization_id: vehicle.organization_id,
        site_id,
        raw_payload: Some(Value::Object(payload)),
        created_at: Utc::now(),
    }
}

/// Race a store call against the request's cancellation.
async fn guarded<T, F>(cancel: &CancellationToken, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    if cancel.is_cancelled() {
        return Err(Error::Cancelled("request cancelled".to_string()).into());
    }
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::Cancelled("request cancelled".to_string()).into()),
        result = fut => result,
    }
}

fn is_cancelled(err: &anyhow::Error) -> bool {
    matches!(err.downcast_ref::<Error>(), Some(Error::Cancelled(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ingest::{hikvision, structured, VehicleAppearance, BAG_CARGO_PERCENTAGE};
    use crate::services::memory::MemoryStore;
    use assert_matches::assert_matches;
    use chrono::{DateTime, Duration, TimeZone};
    use std::sync::atomic::Ordering;

    fn engine(store: &Arc<MemoryStore>) -> EnrichmentEngine {
        EnrichmentEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            IngestConfig::default(),
        )
    }

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 2, 3, 9, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn event(plate: &str, camera: &str, time: DateTime<Utc>) -> CanonicalEvent {
        CanonicalEvent {
            camera_id: camera.to_string(),
            plate: plate.to_string(),
            event_time: Some(time),
            ..Default::default()
        }
    }

    fn truck(capacity: Option<f64>) -> VehicleRecord {
        VehicleRecord {
            brand: Some("KAMAZ".to_string()),
            model: Some("65115".to_string()),
            color: Some("orange".to_string()),
            year: Some(2019),
            cargo_capacity_m3: capacity,
            organization_id: Some(Uuid::new_v4()),
        }
    }

    async fn run(
        engine: &EnrichmentEngine,
        event: CanonicalEvent,
        urls: Vec<String>,
    ) -> Result<EnrichedEvent> {
        engine
            .process(event, "DS-TCG406-E", Uuid::new_v4(), urls, &CancellationToken::new())
            .await
    }

    fn kind(err: &anyhow::Error) -> Option<&Error> {
        err.downcast_ref::<Error>()
    }

    #[tokio::test]
    async fn missing_fields_are_invalid_input() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);

        let err = run(&engine, event("", "gate", at(0)), vec![]).await.unwrap_err();
        assert_matches!(kind(&err), Some(Error::InvalidInput(_)));

        let err = run(&engine, event("ABC", "", at(0)), vec![]).await.unwrap_err();
        assert_matches!(kind(&err), Some(Error::InvalidInput(_)));

        let mut no_time = event("ABC", "gate", at(0));
        no_time.event_time = None;
        let err = run(&engine, no_time, vec![]).await.unwrap_err();
        assert_matches!(kind(&err), Some(Error::InvalidInput(_)));

        let err = run(&engine, event(" - - ", "gate", at(0)), vec![]).await.unwrap_err();
        assert_matches!(kind(&err), Some(Error::InvalidInput(_)));

        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn unregistered_plate_is_rejected_and_not_stored() {
        let store = Arc::new(MemoryStore::new());
        let engine = engine(&store);

        let err = run(&engine, event("999 ZZZ 01", "gate", at(0)), vec![])
            .await
            .unwrap_err();
        assert_matches!(kind(&err), Some(Error::VehicleNotWhitelisted(_)));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn repeat_within_window_is_duplicate_outside_is_new_trip() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("123ABC02", truck(Some(17.0))).await;
        let engine = engine(&store);

        run(&engine, event("123 ABC 02", "gate", at(0)), vec![]).await.unwrap();

        let err = run(&engine, event("123-abc-02", "gate", at(4)), vec![])
            .await
            .unwrap_err();
        assert_matches!(kind(&err), Some(Error::DuplicateEvent(_)));
        assert_eq!(store.event_count().await, 1);

        // Other camera is a different sighting
        run(&engine, event("123ABC02", "exit-gate", at(4)), vec![]).await.unwrap();

        run(&engine, event(" 123ABC02 ", "gate", at(6)), vec![]).await.unwrap();
        assert_eq!(store.event_count().await, 3);
    }

    #[tokio::test]
    async fn cargo_volume_uses_registry_capacity() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("111AAA01", truck(Some(17.0))).await;
        store.add_vehicle("222BBB02", truck(Some(0.0))).await;
        store.add_vehicle("333CCC03", truck(None)).await;
        let engine = engine(&store);

        let mut full = event("111AAA01", "gate", at(0));
        full.cargo_fill_percentage = Some(50.0);
        let enriched = run(&engine, full, vec![]).await.unwrap();
        assert_eq!(enriched.event.cargo_volume_m3, Some(8.5));
        assert_eq!(enriched.event.cargo_fill_percentage, 50.0);

        let mut zero_capacity = event("222BBB02", "gate", at(0));
        zero_capacity.cargo_fill_percentage = Some(50.0);
        let enriched = run(&engine, zero_capacity, vec![]).await.unwrap();
        assert_eq!(enriched.event.cargo_volume_m3, None);

        let mut no_capacity = event("333CCC03", "gate", at(0));
        no_capacity.cargo_fill_percentage = Some(50.0);
        let enriched = run(&engine, no_capacity, vec![]).await.unwrap();
        assert_eq!(enriched.event.cargo_volume_m3, None);
    }

    #[tokio::test]
    async fn json_and_vendor_events_enrich_identically() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("123ABC02", truck(Some(17.0))).await;
        let engine = engine(&store);
        let received = at(30);

        let body = json!({
            "plate": "123 abc 02",
            "camera_id": "gate-json",
            "event_time": "2025-02-03T09:00:00Z",
            "snow_volume_percentage": "50",
        });
        let from_json =
            structured::decode_json(body.to_string().as_bytes(), "default", received).unwrap();

        let xml = r#"<EventNotificationAlert version="2.0" xmlns="http://www.hikvision.com/ver20/XMLSchema">
            <channelID>gate-xml</channelID>
            <dateTime>2025-02-03 09:00:00</dateTime>
            <ANPR><licensePlate>123-ABC-02</licensePlate></ANPR>
        </EventNotificationAlert>"#;
        let mut from_xml = hikvision::decode(xml, "default", received).unwrap();
        // The alert has no fill reading; it comes from the payload bag
        from_xml
            .raw_payload
            .insert(BAG_CARGO_PERCENTAGE.to_string(), json!(50));

        let a = run(&engine, from_json, vec![]).await.unwrap();
        let b = run(&engine, from_xml, vec![]).await.unwrap();

        assert_ne!(a.event.camera_id, b.event.camera_id);
        assert_eq!(a.event.event_time, b.event.event_time);
        assert_eq!(a.event.normalized_plate, "123ABC02");
        assert_eq!(a.event.normalized_plate, b.event.normalized_plate);
        assert_eq!(a.event.plate_id, b.event.plate_id);
        assert_eq!(a.event.cargo_volume_m3, Some(8.5));
        assert_eq!(a.event.cargo_volume_m3, b.event.cargo_volume_m3);
    }

    #[tokio::test]
    async fn cargo_signals_default_to_zero() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("111AAA01", truck(Some(20.0))).await;
        let engine = engine(&store);

        let enriched = run(&engine, event("111AAA01", "gate", at(0)), vec![])
            .await
            .unwrap();
        assert_eq!(enriched.event.cargo_fill_percentage, 0.0);
        assert_eq!(enriched.event.cargo_fill_confidence, 0.0);
        assert!(!enriched.event.matched_cargo);
        assert_eq!(enriched.event.cargo_volume_m3, Some(0.0));
    }

    #[tokio::test]
    async fn registry_appearance_overrides_camera() {
        let store = Arc::new(MemoryStore::new());
        let record = truck(Some(17.0));
        store.add_vehicle("111AAA01", record.clone()).await;
        let engine = engine(&store);

        let mut incoming = event("111AAA01", "gate", at(0));
        incoming.vehicle = VehicleAppearance {
            color: Some("white".to_string()),
            brand: Some("Volvo".to_string()),
            model: Some("FH".to_string()),
            vehicle_type: Some("truck".to_string()),
            ..Default::default()
        };

        let enriched = run(&engine, incoming, vec![]).await.unwrap();
        let stored = enriched.event;
        assert_eq!(stored.vehicle_brand.as_deref(), Some("KAMAZ"));
        assert_eq!(stored.vehicle_model.as_deref(), Some("65115"));
        assert_eq!(stored.vehicle_color.as_deref(), Some("orange"));
        assert_eq!(stored.vehicle_type.as_deref(), Some("truck"));
        assert_eq!(stored.organization_id, record.organization_id);
        assert_eq!(stored.camera_model.as_deref(), Some("DS-TCG406-E"));
        let payload = stored.raw_payload.unwrap();
        assert_eq!(payload["vehicle_year"], json!(2019));
    }

    #[tokio::test]
    async fn direction_defaults_only_when_missing_or_unknown() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("111AAA01", truck(Some(17.0))).await;
        let engine = engine(&store);

        let cases = [("", "entry"), ("Unknown", "entry"), ("exit", "exit"), ("EXIT", "exit")];
        for (index, (given, expected)) in cases.iter().enumerate() {
            let mut incoming = event("111AAA01", "gate", at(index as i64 * 10));
            incoming.direction = given.to_string();
            let enriched = run(&engine, incoming, vec![]).await.unwrap();
            assert_eq!(enriched.event.direction, *expected);
        }
    }

    #[tokio::test]
    async fn photos_follow_the_event_and_failures_are_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("111AAA01", truck(Some(17.0))).await;
        let engine = engine(&store);

        let urls = vec!["https://cdn/a.jpg".to_string(), "https://cdn/b.jpg".to_string()];
        let enriched = run(&engine, event("111AAA01", "gate", at(0)), urls.clone())
            .await
            .unwrap();
        assert_eq!(enriched.photos, urls);
        let photos = store.get_photos(&enriched.event.id).await.unwrap();
        assert_eq!(photos[1].display_order, 1);

        store.fail_photos.store(true, Ordering::SeqCst);
        let enriched = run(&engine, event("111AAA01", "gate", at(30)), urls)
            .await
            .unwrap();
        assert!(enriched.photos.is_empty());
        assert_eq!(store.event_count().await, 2);
    }

    #[tokio::test]
    async fn site_resolution_failure_is_not_fatal() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("111AAA01", truck(Some(17.0))).await;
        let site = Uuid::new_v4();
        store.add_site("Yakor", site).await;
        let engine = engine(&store);

        let enriched = run(&engine, event("111AAA01", "yakor", at(0)), vec![])
            .await
            .unwrap();
        assert_eq!(enriched.event.site_id, Some(site));

        store.fail_sites.store(true, Ordering::SeqCst);
        let enriched = run(&engine, event("111AAA01", "yakor", at(30)), vec![])
            .await
            .unwrap();
        assert_eq!(enriched.event.site_id, None);
    }

    #[tokio::test]
    async fn cancelled_request_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("111AAA01", truck(Some(17.0))).await;
        let engine = engine(&store);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = engine
            .process(
                event("111AAA01", "gate", at(0)),
                "DS-TCG406-E",
                Uuid::new_v4(),
                vec![],
                &cancel,
            )
            .await
            .unwrap_err();
        assert_matches!(kind(&err), Some(Error::Cancelled(_)));
        assert_eq!(store.event_count().await, 0);
    }

    #[tokio::test]
    async fn caller_id_is_kept() {
        let store = Arc::new(MemoryStore::new());
        store.add_vehicle("111AAA01", truck(Some(17.0))).await;
        let engine = engine(&store);

        let id = Uuid::new_v4();
        let enriched = engine
            .process(
                event("111AAA01", "gate", at(0)),
                "DS-TCG406-E",
                id,
                vec![],
                &CancellationToken::new(),
            )
            .await
            .unwrap();
        assert_eq!(enriched.event.id, id);
        assert!(store.get_event(&id).await.unwrap().is_some());
    }
}
