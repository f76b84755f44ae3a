use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persisted recognition event
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct AnprEvent {
    pub id: Uuid,
    pub plate_id: Option<Uuid>,
    pub camera_id: String,
    pub camera_model: Option<String>,
    pub direction: String,
    pub lane: Option<i32>,
    pub raw_plate: String,
    pub normalized_plate: String,
    /// Camera scale, not rescaled (see `CanonicalEvent::confidence`)
    pub confidence: Option<f64>,
    pub vehicle_color: Option<String>,
    pub vehicle_type: Option<String>,
    pub vehicle_brand: Option<String>,
    pub vehicle_model: Option<String>,
    pub vehicle_country: Option<String>,
    pub vehicle_plate_color: Option<String>,
    pub vehicle_speed: Option<f64>,
    pub snapshot_url: Option<String>,
    pub event_time: DateTime<Utc>,
    // Cargo columns keep their historical names in the table
    #[sqlx(rename = "snow_volume_percentage")]
    pub cargo_fill_percentage: f64,
    #[sqlx(rename = "snow_volume_confidence")]
    pub cargo_fill_confidence: f64,
    #[sqlx(rename = "matched_snow")]
    pub matched_cargo: bool,
    #[sqlx(rename = "snow_volume_m3")]
    pub cargo_volume_m3: Option<f64>,
    #[sqlx(rename = "contractor_id")]
    pub organization_id: Option<Uuid>,
    #[sqlx(rename = "polygon_id")]
    pub site_id: Option<Uuid>,
    pub raw_payload: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

/// Photo reference attached to an event
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct EventPhoto {
    pub id: Uuid,
    pub event_id: Uuid,
    pub photo_url: String,
    pub display_order: i32,
    pub created_at: DateTime<Utc>,
}

/// Event together with the photo URLs that were attached to it, in display order
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedEvent {
    #[serde(flatten)]
    pub event: AnprEvent,
    pub photos: Vec<String>,
}

/// Listing filter; `plate` is already normalized
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    pub plate: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    pub direction: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

#[derive(Debug, Clone, Default)]
pub struct ReportFilter {
    pub organization_id: Option<Uuid>,
    pub site_id: Option<Uuid>,
    pub plate: Option<String>,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

/// Aggregate over events with a positive derived volume
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ReportSummary {
    pub total_volume_m3: f64,
    pub trip_count: i64,
}
