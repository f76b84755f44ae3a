//! Structured JSON events, sent either as the request body or as the `event`
//! field of a multipart form with `photos` attachments.

use super::{coerce_bool, coerce_f64, coerce_i32, coerce_string, CanonicalEvent, FormPart, VehicleAppearance};
use crate::error::Error;
use anyhow::Result;
use chrono::{DateTime, Utc};
use log::debug;
use serde_json::{Map, Value};

/// Top-level fields decoded into typed slots; everything else lands in the bag.
const KNOWN_FIELDS: &[&str] = &[
    "camera_id",
    "camera_model",
    "plate",
    "confidence",
    "direction",
    "lane",
    "event_time",
    "vehicle",
    "snapshot_url",
    "raw_payload",
    "snow_volume_percentage",
    "snow_volume_confidence",
    "snow_volume_m3",
    "matched_snow",
];

pub const EVENT_FIELD: &str = "event";
pub const PHOTOS_FIELD: &str = "photos";

/// Decode a JSON request body.
pub fn decode_json(
    body: &[u8],
    default_camera_id: &str,
    received_at: DateTime<Utc>,
) -> Result<CanonicalEvent> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| Error::InvalidInput(format!("failed to parse request: {}", e)))?;
    decode_value(value, default_camera_id, received_at)
}

/// Decode a multipart form; returns the event and its photo parts in form order.
pub fn decode_form<'a>(
    parts: &'a [FormPart],
    default_camera_id: &str,
    received_at: DateTime<Utc>,
) -> Result<(CanonicalEvent, Vec<&'a FormPart>)> {
    let event_json = parts
        .iter()
        .find(|p| p.name == EVENT_FIELD && !p.is_file())
        .and_then(FormPart::text)
        .filter(|text| !text.trim().is_empty())
        .ok_or_else(|| Error::InvalidInput("event field is required".to_string()))?;

    let value: Value = serde_json::from_str(event_json)
        .map_err(|e| Error::InvalidInput(format!("invalid event JSON: {}", e)))?;
    let event = decode_value(value, default_camera_id, received_at)?;

    let photos = parts
        .iter()
        .filter(|p| p.name == PHOTOS_FIELD && p.is_file())
        .collect();

    Ok((event, photos))
}

/// Decode an already parsed JSON object.
pub fn decode_value(
    value: Value,
    default_camera_id: &str,
    received_at: DateTime<Utc>,
) -> Result<CanonicalEvent> {
    let Value::Object(mut map) = value else {
        return Err(Error::InvalidInput("event must be a JSON object".to_string()).into());
    };

    let event_time = match map.get("event_time") {
        None | Some(Value::Null) => received_at,
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(s.trim())
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| Error::InvalidInput(format!("invalid event_time {:?}: {}", s, e)))?,
        Some(other) => {
            return Err(
                Error::InvalidInput(format!("invalid event_time: {}", other)).into(),
            )
        }
    };

    let mut raw_payload = match map.remove("raw_payload") {
        Some(Value::Object(nested)) => nested,
        _ => Map::new(),
    };

    let text = |key: &str| map.get(key).and_then(coerce_string);
    let number = |key: &str| map.get(key).and_then(coerce_f64);

    let camera_id = text("camera_id").unwrap_or_else(|| default_camera_id.to_string());
    let camera_model = text("camera_model");
    let plate = map
        .get("plate")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let confidence = number("confidence");
    let direction = text("direction").unwrap_or_default();
    let lane = map.get("lane").and_then(coerce_i32);
    let snapshot_url = text("snapshot_url");
    let cargo_fill_percentage = number("snow_volume_percentage");
    let cargo_fill_confidence = number("snow_volume_confidence");
    let matched_cargo = map.get("matched_snow").and_then(coerce_bool);
    let vehicle = map
        .get("vehicle")
        .and_then(Value::as_object)
        .map(decode_vehicle)
        .unwrap_or_default();

    for (key, value) in map {
        if !KNOWN_FIELDS.contains(&key.as_str()) && !value.is_null() {
            raw_payload.insert(key, value);
        }
    }

    debug!(
        "Decoded structured event: plate={:?} camera_id={} extra_fields={}",
        plate,
        camera_id,
        raw_payload.len()
    );

    Ok(CanonicalEvent {
        camera_id,
        camera_model,
        plate,
        confidence,
        direction,
        lane,
        event_time: Some(event_time),
        vehicle,
        snapshot_url,
        cargo_fill_percentage,
        cargo_fill_confidence,
        matched_cargo,
        raw_payload,
    })
}

fn decode_vehicle(map: &Map<String, Value>) -> VehicleAppearance {
    let text = |key: &str| map.get(key).and_then(coerce_string);
    VehicleAppearance {
        color: text("color"),
        vehicle_type: text("type"),
        brand: text("brand"),
        model: text("model"),
        country: text("country"),
        plate_color: text("plate_color"),
        speed: map.get("speed").and_then(coerce_f64),
    }
}
