use crate::api::rest::{ApiResult, AppState};
use crate::db::models::EnrichedEvent;
use crate::error::Error;
use crate::ingest::form::collect_parts;
use crate::ingest::{hikvision, structured, CanonicalEvent, FormPart};
use crate::storage::EvidenceUploader;
use axum::body::{Body, Bytes};
use axum::extract::{FromRequest, Multipart, Query, State};
use axum::http::{header, Request, StatusCode};
use axum::response::Json;
use chrono::{DateTime, Utc};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Body returned to the camera after a successful ingestion
#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: &'static str,
    pub event_id: Uuid,
    pub plate_id: Option<Uuid>,
    pub plate: String,
    pub vehicle_exists: bool,
    /// Always empty; kept for older camera integrations
    pub hits: Vec<Value>,
    pub photos: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
}

impl IngestResponse {
    fn from_enriched(enriched: EnrichedEvent) -> Self {
        Self {
            status: "ok",
            event_id: enriched.event.id,
            plate_id: enriched.event.plate_id,
            plate: enriched.event.normalized_plate,
            vehicle_exists: true,
            hits: Vec::new(),
            photos: enriched.photos,
            processed: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct HikvisionParams {
    pub camera_id: Option<String>,
}

fn is_multipart(request: &Request<Body>) -> bool {
    request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|ct| ct.trim().to_ascii_lowercase().starts_with("multipart/form-data"))
        .unwrap_or(false)
}

async fn read_parts(request: Request<Body>, state: &AppState) -> ApiResult<Vec<FormPart>> {
    let multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| Error::InvalidInput(format!("invalid multipart payload: {}", e)))?;
    Ok(collect_parts(multipart).await?)
}

/// Best-effort evidence upload under the pre-minted event id
async fn upload_evidence(
    state: &AppState,
    photos: &[&FormPart],
    event_id: &Uuid,
    event: &CanonicalEvent,
    received_at: DateTime<Utc>,
) -> Vec<String> {
    if photos.is_empty() {
        return Vec::new();
    }

    let Some(store) = state.evidence.as_deref() else {
        warn!(
            "Evidence storage is not configured; skipping {} photos for event {}",
            photos.len(),
            event_id
        );
        return Vec::new();
    };

    let uploader = EvidenceUploader::new(
        store,
        &state.config.evidence,
        state.config.ingest.max_photo_mb,
    );
    let urls = uploader
        .upload_all(
            photos,
            event_id,
            event.event_time.unwrap_or(received_at),
            &event.camera_id,
        )
        .await;

    info!(
        "Uploaded {}/{} photos for event {}",
        urls.len(),
        photos.len(),
        event_id
    );
    urls
}

/// Run the engine on a per-request token that is cancelled if the request is dropped
async fn process(
    state: &AppState,
    event: CanonicalEvent,
    event_id: Uuid,
    evidence_urls: Vec<String>,
) -> ApiResult<EnrichedEvent> {
    let cancel = state.shutdown.child_token();
    let _guard = cancel.clone().drop_guard();

    let uploaded = evidence_urls.clone();
    let result = state
        .engine
        .process(
            event,
            &state.config.camera.default_camera_model,
            event_id,
            evidence_urls,
            &cancel,
        )
        .await;

    match result {
        Ok(enriched) => Ok(enriched),
        Err(err) => {
            // Objects were written under an id that will never be stored
            if !uploaded.is_empty() {
                warn!(
                    "Event {} not stored ({}); orphaned evidence: {}",
                    event_id,
                    err,
                    uploaded.join(", ")
                );
            }
            Err(err.into())
        }
    }
}

/// Structured camera event: JSON body, or multipart with `event` and `photos`
pub async fn create_event(
    State(state): State<AppState>,
    request: Request<Body>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let received_at = Utc::now();
    let event_id = Uuid::new_v4();
    let default_camera_id = state.config.camera.default_camera_id.clone();

    let (event, evidence_urls) = if is_multipart(&request) {
        let parts = read_parts(request, &state).await?;
        let (event, photos) = structured::decode_form(&parts, &default_camera_id, received_at)?;
        let urls = upload_evidence(&state, &photos, &event_id, &event, received_at).await;
        (event, urls)
    } else {
        let body = Bytes::from_request(request, &state)
            .await
            .map_err(|e| Error::InvalidInput(format!("failed to read request body: {}", e)))?;
        let event = structured::decode_json(&body, &default_camera_id, received_at)?;
        (event, Vec::new())
    };

    info!(
        "Received ANPR event {}: plate={:?} camera_id={} photos={}",
        event_id,
        event.plate,
        event.camera_id,
        evidence_urls.len()
    );

    let enriched = process(&state, event, event_id, evidence_urls).await?;

    info!(
        "Saved ANPR event {} for plate {}",
        enriched.event.id, enriched.event.normalized_plate
    );
    Ok((
        StatusCode::CREATED,
        Json(IngestResponse::from_enriched(enriched)),
    ))
}

/// Vendor alert: multipart with an XML part and optional pictures
pub async fn create_hikvision_event(
    State(state): State<AppState>,
    Query(params): Query<HikvisionParams>,
    request: Request<Body>,
) -> ApiResult<(StatusCode, Json<IngestResponse>)> {
    let received_at = Utc::now();
    let event_id = Uuid::new_v4();

    let fallback_camera_id = params
        .camera_id
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or(&state.config.camera.default_camera_id)
        .to_string();

    info!(
        "Received Hikvision request: content_type={:?}",
        request.headers().get(header::CONTENT_TYPE)
    );

    let parts = read_parts(request, &state).await?;
    let (event, pictures) = hikvision::decode_form(&parts, &fallback_camera_id, received_at)?;
    let evidence_urls = upload_evidence(&state, &pictures, &event_id, &event, received_at).await;

    let enriched = process(&state, event, event_id, evidence_urls).await?;

    info!(
        "Saved Hikvision event {} for plate {}",
        enriched.event.id, enriched.event.normalized_plate
    );
    let mut response = IngestResponse::from_enriched(enriched);
    response.processed = Some(true);
    Ok((StatusCode::CREATED, Json(response)))
}

/// Cameras probe the endpoint with GET before sending alerts
pub async fn hikvision_probe() -> Json<Value> {
    info!("Hikvision endpoint check");
    Json(json!({
        "status": "ok",
        "message": "Hikvision ANPR endpoint is available",
    }))
}
