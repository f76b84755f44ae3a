//! Hikvision `EventNotificationAlert` ANPR notifications.
//!
//! Cameras post a multipart form carrying the alert XML and, optionally, the
//! plate and scene pictures.

use super::{CanonicalEvent, FormPart, VehicleAppearance};
use crate::error::Error;
use crate::utils::{first_non_empty, non_empty, tagged_code};
use anyhow::Result;
use chrono::{DateTime, NaiveDateTime, Utc};
use log::debug;
use serde::Serialize;
use serde_json::{json, Map, Value};
use xml::reader::{EventReader, XmlEvent as ReadEvent};
use xml::writer::{EmitterConfig, XmlEvent as WriteEvent};
use yaserde_derive::YaDeserialize;

#[derive(Debug, Default, YaDeserialize, Serialize)]
#[yaserde(rename = "EventNotificationAlert")]
pub struct EventNotificationAlert {
    #[yaserde(rename = "ipAddress")]
    pub ip_address: String,
    #[yaserde(rename = "portNo")]
    pub port_no: String,
    #[yaserde(rename = "protocolType")]
    pub protocol_type: String,
    #[yaserde(rename = "channelID")]
    pub channel_id: String,
    #[yaserde(rename = "deviceID")]
    pub device_id: String,
    #[yaserde(rename = "deviceName")]
    pub device_name: String,
    #[yaserde(rename = "dateTime")]
    pub date_time: String,
    #[yaserde(rename = "eventType")]
    pub event_type: String,
    #[yaserde(rename = "eventDescription")]
    pub event_description: String,
    #[yaserde(rename = "ANPR")]
    pub anpr: AnprBlock,
    #[yaserde(rename = "vehicleInfo")]
    pub vehicle_info: VehicleInfoBlock,
    #[yaserde(rename = "VehicleGATInfo")]
    pub vehicle_gat_info: VehicleGatInfoBlock,
    #[yaserde(rename = "picInfo")]
    pub pic_info: PicInfoBlock,
}

/// Recognition result
#[derive(Debug, Default, YaDeserialize, Serialize)]
pub struct AnprBlock {
    #[yaserde(rename = "licensePlate")]
    pub license_plate: String,
    #[yaserde(rename = "confidenceLevel")]
    pub confidence_level: String,
    #[yaserde(rename = "vehicleType")]
    pub vehicle_type: String,
    #[yaserde(rename = "vehicleColor")]
    pub vehicle_color: String,
    #[yaserde(rename = "color")]
    pub color: String,
    #[yaserde(rename = "plateColor")]
    pub plate_color: String,
    #[yaserde(rename = "country")]
    pub country: String,
    #[yaserde(rename = "brand")]
    pub brand: String,
    #[yaserde(rename = "direction")]
    pub direction: String,
    #[yaserde(rename = "laneNo")]
    pub lane_no: String,
    #[yaserde(rename = "speed")]
    pub speed: String,
}

/// Textual vehicle appearance plus recognised logo/model codes
#[derive(Debug, Default, YaDeserialize, Serialize)]
pub struct VehicleInfoBlock {
    #[yaserde(rename = "vehicleType")]
    pub vehicle_type: String,
    #[yaserde(rename = "color")]
    pub color: String,
    #[yaserde(rename = "vehicleColor")]
    pub vehicle_color: String,
    #[yaserde(rename = "brand")]
    pub brand: String,
    #[yaserde(rename = "vehicleLogoRecog")]
    pub vehicle_logo_recog: String,
    #[yaserde(rename = "vehicleModel")]
    pub vehicle_model: String,
    // Misspelled by the firmware
    #[yaserde(rename = "vehileModel")]
    pub vehile_model: String,
    #[yaserde(rename = "plateColor")]
    pub plate_color: String,
    #[yaserde(rename = "country")]
    pub country: String,
    #[yaserde(rename = "speed")]
    pub speed: String,
}

/// GA/T coded appearance. Colour codes are not human readable and never used.
#[derive(Debug, Default, YaDeserialize, Serialize)]
pub struct VehicleGatInfoBlock {
    #[yaserde(rename = "vehicleTypeByGAT")]
    pub vehicle_type_by_gat: String,
    #[yaserde(rename = "colorByGAT")]
    pub color_by_gat: String,
    // Misspelled by the firmware
    #[yaserde(rename = "palteTypeByGAT")]
    pub plate_type_by_gat: String,
    #[yaserde(rename = "plateColorByGAT")]
    pub plate_color_by_gat: String,
}

#[derive(Debug, Default, YaDeserialize, Serialize)]
pub struct PicInfoBlock {
    #[yaserde(rename = "ftpPath")]
    pub ftp_path: String,
    #[yaserde(rename = "filePath")]
    pub file_path: String,
    #[yaserde(rename = "filePathList")]
    pub file_path_list: FilePathList,
}

#[derive(Debug, Default, YaDeserialize, Serialize)]
pub struct FilePathList {
    #[yaserde(rename = "filePath")]
    pub file_paths: Vec<String>,
}

/// Parse the alert document.
pub fn parse_alert(xml: &str) -> Result<EventNotificationAlert> {
    let local = strip_namespaces(xml)?;
    yaserde::de::from_str::<EventNotificationAlert>(&local)
        .map_err(|e| Error::InvalidInput(format!("invalid xml payload: {}", e)).into())
}

/// Re-emit the document with local names only. Firmware versions disagree on
/// the schema URI (ver10, ver20 or none) and the alert is matched on local
/// names.
fn strip_namespaces(xml: &str) -> Result<String> {
    let mut out = Vec::with_capacity(xml.len());
    let mut writer = EmitterConfig::new()
        .write_document_declaration(false)
        .create_writer(&mut out);

    for event in EventReader::from_str(xml) {
        let event =
            event.map_err(|e| Error::InvalidInput(format!("invalid xml payload: {}", e)))?;
        let written = match event {
            ReadEvent::StartElement {
                name, attributes, ..
            } => {
                let mut element = WriteEvent::start_element(name.local_name.as_str());
                for attribute in &attributes {
                    element = element.attr(attribute.name.local_name.as_str(), &attribute.value);
                }
                writer.write(element)
            }
            ReadEvent::EndElement { .. } => writer.write(WriteEvent::end_element()),
            ReadEvent::Characters(text) | ReadEvent::Whitespace(text) => {
                writer.write(WriteEvent::characters(&text))
            }
            ReadEvent::CData(text) => writer.write(WriteEvent::cdata(&text)),
            _ => Ok(()),
        };
        written.map_err(|e| Error::InvalidInput(format!("invalid xml payload: {}", e)))?;
    }
    drop(writer);

    String::from_utf8(out)
        .map_err(|e| Error::InvalidInput(format!("invalid xml payload: {}", e)).into())
}

/// Alert XML part of a camera form: an XML file first, then a text field
/// whose name mentions xml.
pub fn find_xml_part(parts: &[FormPart]) -> Option<&FormPart> {
    parts.iter().find(|p| p.looks_like_xml()).or_else(|| {
        parts
            .iter()
            .find(|p| !p.is_file() && p.name.to_ascii_lowercase().contains("xml"))
    })
}

/// Decode a camera form into the event and the picture parts attached to it.
pub fn decode_form<'a>(
    parts: &'a [FormPart],
    fallback_camera_id: &str,
    received_at: DateTime<Utc>,
) -> Result<(CanonicalEvent, Vec<&'a FormPart>)> {
    let xml_part = find_xml_part(parts)
        .ok_or_else(|| Error::InvalidInput("xml payload not found".to_string()))?;
    let xml = xml_part
        .text()
        .ok_or_else(|| Error::InvalidInput("xml payload is not valid UTF-8".to_string()))?;

    let event = decode(xml, fallback_camera_id, received_at)?;

    let pictures = parts
        .iter()
        .filter(|p| !std::ptr::eq(*p, xml_part) && p.looks_like_image())
        .collect();

    Ok((event, pictures))
}

/// Decode an alert document into a canonical event.
///
/// `fallback_camera_id` is used when the alert names neither a channel nor a
/// device. An unreadable `dateTime` falls back to `received_at`.
pub fn decode(xml: &str, fallback_camera_id: &str, received_at: DateTime<Utc>) -> Result<CanonicalEvent> {
    let alert = parse_alert(xml)?;

    debug!(
        "Parsed Hikvision alert: type={} plate={:?} device={} channel={} time={:?}",
        alert.event_type,
        alert.anpr.license_plate,
        alert.device_id,
        alert.channel_id,
        alert.date_time
    );

    let anpr = &alert.anpr;
    let info = &alert.vehicle_info;
    let gat = &alert.vehicle_gat_info;
    let pics = &alert.pic_info;

    let color = first_non_empty([
        info.color.as_str(),
        info.vehicle_color.as_str(),
        anpr.vehicle_color.as_str(),
        anpr.color.as_str(),
    ]);
    let vehicle_type = first_non_empty([
        anpr.vehicle_type.as_str(),
        gat.vehicle_type_by_gat.as_str(),
        info.vehicle_type.as_str(),
    ]);
    let plate_color = first_non_empty([
        anpr.plate_color.as_str(),
        gat.plate_color_by_gat.as_str(),
        info.plate_color.as_str(),
    ]);
    let country = first_non_empty([anpr.country.as_str(), info.country.as_str()]);
    let brand = first_non_empty([info.brand.as_str(), anpr.brand.as_str()])
        .or_else(|| tagged_code("brand_id", &info.vehicle_logo_recog));
    let model = non_empty(&info.vehicle_model)
        .filter(|m| m != "0")
        .or_else(|| tagged_code("model_id", &info.vehile_model));
    let speed = first_non_empty([info.speed.as_str(), anpr.speed.as_str()])
        .and_then(|s| s.parse::<f64>().ok());

    let snapshot_url = first_non_empty([pics.ftp_path.as_str(), pics.file_path.as_str()]).or_else(|| {
        pics.file_path_list
            .file_paths
            .first()
            .and_then(|p| non_empty(p))
    });

    let camera_id = first_non_empty([
        alert.channel_id.as_str(),
        alert.device_id.as_str(),
        fallback_camera_id,
    ])
    .unwrap_or_default();
    let camera_model = first_non_empty([alert.device_name.as_str(), alert.device_id.as_str()]);

    let event_time = parse_timestamp(&alert.date_time).unwrap_or(received_at);
    let lane = anpr.lane_no.trim().parse::<i32>().ok();
    let confidence = anpr.confidence_level.trim().parse::<f64>().ok();

    let vehicle = VehicleAppearance {
        color,
        vehicle_type,
        brand,
        model,
        country,
        plate_color,
        speed,
    };

    Ok(CanonicalEvent {
        camera_id,
        camera_model,
        plate: anpr.license_plate.trim().to_string(),
        confidence,
        direction: anpr.direction.trim().to_string(),
        lane,
        event_time: Some(event_time),
        vehicle,
        snapshot_url,
        cargo_fill_percentage: None,
        cargo_fill_confidence: None,
        matched_cargo: None,
        raw_payload: audit_payload(&alert, xml),
    })
}

fn audit_payload(alert: &EventNotificationAlert, xml: &str) -> Map<String, Value> {
    let mut bag = Map::new();
    bag.insert("event_type".to_string(), json!(alert.event_type));
    bag.insert("event_description".to_string(), json!(alert.event_description));
    bag.insert("device_id".to_string(), json!(alert.device_id));
    bag.insert("device_name".to_string(), json!(alert.device_name));
    bag.insert("channel_id".to_string(), json!(alert.channel_id));
    bag.insert("ip_address".to_string(), json!(alert.ip_address));
    bag.insert("port_no".to_string(), json!(alert.port_no));
    bag.insert("protocol_type".to_string(), json!(alert.protocol_type));
    bag.insert("anpr".to_string(), json!(alert.anpr));
    bag.insert("vehicle_info".to_string(), json!(alert.vehicle_info));
    bag.insert("vehicle_gat_info".to_string(), json!(alert.vehicle_gat_info));
    bag.insert("xml".to_string(), json!(xml));
    bag
}

/// Camera timestamps, tried in order. Zone-less layouts are read as UTC.
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }

    if let Ok(ts) = DateTime::parse_from_rfc3339(value) {
        return Some(ts.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|layout| NaiveDateTime::parse_from_str(value, layout).ok())
        .map(|naive| naive.and_utc())
}
