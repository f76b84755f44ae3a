//! Wire-format adapters.
//!
//! Both camera protocols decode into a [`CanonicalEvent`], the only shape the
//! enrichment engine understands.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub mod form;
pub mod hikvision;
pub mod structured;

pub use form::FormPart;

/// Camera-supplied vehicle appearance. Overridden by registry data on a match.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VehicleAppearance {
    pub color: Option<String>,
    #[serde(rename = "type")]
    pub vehicle_type: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub country: Option<String>,
    pub plate_color: Option<String>,
    pub speed: Option<f64>,
}

/// Wire-format independent recognition event, alive for one request.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CanonicalEvent {
    pub camera_id: String,
    pub camera_model: Option<String>,
    /// Plate text as recognised, before normalization
    pub plate: String,
    /// Recognition confidence exactly as the camera reported it. Structured
    /// cameras send [0, 1]; Hikvision `confidenceLevel` is on a 0-100 scale.
    pub confidence: Option<f64>,
    pub direction: String,
    pub lane: Option<i32>,
    /// `None` only when a caller builds the event by hand; adapters default it
    /// to the ingestion time.
    pub event_time: Option<DateTime<Utc>>,
    pub vehicle: VehicleAppearance,
    pub snapshot_url: Option<String>,
    pub cargo_fill_percentage: Option<f64>,
    pub cargo_fill_confidence: Option<f64>,
    pub matched_cargo: Option<bool>,
    /// Fields the adapter did not recognise, kept for audit
    pub raw_payload: Map<String, Value>,
}

/// Opaque bag key fallbacks for cargo signals carried outside the typed fields.
pub const BAG_CARGO_PERCENTAGE: &str = "snow_volume_percentage";
pub const BAG_CARGO_CONFIDENCE: &str = "snow_volume_confidence";
pub const BAG_MATCHED_CARGO: &str = "matched_snow";

impl CanonicalEvent {
    /// Fill percentage: typed field, then the opaque bag, then 0.0.
    pub fn resolved_cargo_fill(&self) -> f64 {
        self.cargo_fill_percentage
            .or_else(|| self.raw_payload.get(BAG_CARGO_PERCENTAGE).and_then(coerce_f64))
            .unwrap_or(0.0)
    }

    /// Fill confidence, same fallback chain as the percentage.
    pub fn resolved_cargo_confidence(&self) -> f64 {
        self.cargo_fill_confidence
            .or_else(|| self.raw_payload.get(BAG_CARGO_CONFIDENCE).and_then(coerce_f64))
            .unwrap_or(0.0)
    }

    pub fn resolved_matched_cargo(&self) -> bool {
        self.matched_cargo
            .or_else(|| self.raw_payload.get(BAG_MATCHED_CARGO).and_then(coerce_bool))
            .unwrap_or(false)
    }
}

/// Any JSON numeric encoding (integer, float, numeric string) as `f64`.
pub fn coerce_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

pub fn coerce_i32(value: &Value) -> Option<i32> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .and_then(|v| i32::try_from(v).ok()),
        Value::String(s) => s.trim().parse::<i32>().ok(),
        _ => None,
    }
}

pub fn coerce_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Some(true),
            "false" | "0" => Some(false),
            _ => None,
        },
        Value::Number(n) => n.as_i64().map(|v| v != 0),
        _ => None,
    }
}

/// String value of a scalar; numbers are rendered, blanks dropped.
pub fn coerce_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => crate::utils::non_empty(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
