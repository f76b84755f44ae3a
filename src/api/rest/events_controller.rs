use crate::api::rest::{ApiResult, AppState};
use crate::error::Error;
use crate::security::Claims;
use crate::services::EventQuery;
use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::response::Json;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct PlateParams {
    pub plate: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListEventsParams {
    pub plate: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub direction: Option<String>,
    pub limit: Option<String>,
    pub offset: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReportParams {
    pub organization_id: Option<String>,
    pub site_id: Option<String>,
    pub plate: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InternalEventsParams {
    pub plate: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub direction: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeleteOldRequest {
    days: i64,
}

#[derive(Debug, Deserialize)]
struct DeleteAllRequest {
    #[serde(default)]
    confirm: bool,
}

fn data(value: impl serde::Serialize) -> Json<Value> {
    Json(json!({ "data": value }))
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn parse_time(name: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, Error> {
    value
        .map(|v| {
            DateTime::parse_from_rfc3339(v)
                .map(|t| t.with_timezone(&Utc))
                .map_err(|_| {
                    Error::InvalidInput(format!("invalid {} format, expected RFC 3339", name))
                })
        })
        .transpose()
}

fn parse_uuid(name: &str, value: Option<&str>) -> Result<Option<Uuid>, Error> {
    value
        .map(|v| Uuid::parse_str(v).map_err(|_| Error::InvalidInput(format!("invalid {}", name))))
        .transpose()
}

pub async fn list_plates(
    State(state): State<AppState>,
    Query(params): Query<PlateParams>,
) -> ApiResult<Json<Value>> {
    let plate = present(&params.plate)
        .ok_or_else(|| Error::InvalidInput("plate parameter is required".to_string()))?;

    let plates = state.events.find_plates(plate).await?;
    Ok(data(plates))
}

pub async fn list_events(
    State(state): State<AppState>,
    Query(params): Query<ListEventsParams>,
) -> ApiResult<Json<Value>> {
    // Unparseable paging values fall back to the defaults
    let query = EventQuery {
        plate: present(&params.plate).map(str::to_string),
        from: parse_time("from", present(&params.from))?,
        to: parse_time("to", present(&params.to))?,
        direction: present(&params.direction).map(str::to_string),
        limit: present(&params.limit).and_then(|l| l.parse().ok()),
        offset: present(&params.offset).and_then(|o| o.parse().ok()),
    };

    let events = state.events.find_events(query).await?;
    Ok(data(events))
}

pub async fn get_event(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Value>> {
    let id = Uuid::parse_str(id.trim())
        .map_err(|_| Error::InvalidInput("invalid event id".to_string()))?;

    let event = state.events.get_event(&id).await?;
    Ok(data(event))
}

pub async fn report_summary(
    State(state): State<AppState>,
    Query(params): Query<ReportParams>,
) -> ApiResult<Json<Value>> {
    let organization_id = parse_uuid("organization_id", present(&params.organization_id))?;
    let site_id = parse_uuid("site_id", present(&params.site_id))?;
    let from = parse_time("from", present(&params.from))?;
    let to = parse_time("to", present(&params.to))?;

    let summary = state
        .events
        .report_summary(organization_id, site_id, present(&params.plate), from, to)
        .await?;
    Ok(data(summary))
}

pub async fn delete_old_events(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let days = serde_json::from_slice::<DeleteOldRequest>(&body)
        .ok()
        .map(|req| req.days)
        .filter(|days| *days >= 1)
        .ok_or_else(|| {
            Error::InvalidInput("days parameter is required and must be >= 1".to_string())
        })?;

    let deleted = state.events.delete_old_events(days).await?;
    info!("Deleted {} events older than {} days", deleted, days);

    Ok(Json(json!({
        "status": "ok",
        "deleted_count": deleted,
        "message": format!("deleted {} events older than {} days", deleted, days),
    })))
}

pub async fn delete_all_events(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> ApiResult<Json<Value>> {
    let confirmed = serde_json::from_slice::<DeleteAllRequest>(&body)
        .map(|req| req.confirm)
        .unwrap_or(false);
    if !confirmed {
        return Err(
            Error::InvalidInput("confirmation required: set confirm=true".to_string()).into(),
        );
    }

    warn!("Delete of ALL events requested by {}", claims.sub);
    let deleted = state.events.delete_all_events().await?;

    Ok(Json(json!({
        "status": "ok",
        "deleted_count": deleted,
        "message": format!("deleted all {} events", deleted),
    })))
}

/// Ascending time-range lookup for service-to-service consumers
pub async fn internal_events(
    State(state): State<AppState>,
    Query(params): Query<InternalEventsParams>,
) -> ApiResult<Json<Value>> {
    let plate = present(&params.plate)
        .ok_or_else(|| Error::InvalidInput("plate parameter is required".to_string()))?;
    let start_time = parse_time("start_time", present(&params.start_time))?
        .ok_or_else(|| Error::InvalidInput("start_time parameter is required".to_string()))?;
    let end_time = parse_time("end_time", present(&params.end_time))?
        .ok_or_else(|| Error::InvalidInput("end_time parameter is required".to_string()))?;

    let direction = present(&params.direction).map(str::to_lowercase);
    if let Some(d) = direction.as_deref() {
        if d != "entry" && d != "exit" {
            return Err(
                Error::InvalidInput("direction must be 'entry' or 'exit'".to_string()).into(),
            );
        }
    }

    let events = state
        .events
        .events_by_plate_and_time(plate, start_time, end_time, direction.as_deref())
        .await?;

    info!(
        "Returning {} internal events for {} between {} and {}",
        events.len(),
        plate,
        start_time,
        end_time
    );
    Ok(data(events))
}
