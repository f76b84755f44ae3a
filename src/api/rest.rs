use crate::config::Config;
use crate::error::Error;
use crate::security::SecurityService;
use crate::services::{EnrichmentEngine, EventQueryService, EventStore, SiteResolver, VehicleRegistry};
use crate::storage::EvidenceStore;
use anyhow::Result;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode},
    middleware::{from_fn_with_state, Next},
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use log::{error, info};
use serde::Serialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{Any, CorsLayer};

mod events_controller;
mod ingest_controller;

// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn EventStore>,
    pub engine: EnrichmentEngine,
    pub events: EventQueryService,
    pub evidence: Option<Arc<dyn EvidenceStore>>,
    pub security: Arc<SecurityService>,
    /// Process-wide token; every request works on a child of it
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        store: Arc<dyn EventStore>,
        registry: Arc<dyn VehicleRegistry>,
        sites: Arc<dyn SiteResolver>,
        evidence: Option<Arc<dyn EvidenceStore>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            engine: EnrichmentEngine::new(store.clone(), registry, sites, config.ingest.clone()),
            events: EventQueryService::new(store.clone()),
            security: Arc::new(SecurityService::new(config.security.clone())),
            store,
            evidence,
            shutdown,
            config,
        }
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(rename = "error")]
    pub message: String,
    #[serde(skip)]
    pub status: u16,
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if !err.is_client_error() {
            error!("Request failed: {}", err);
            return ApiError::internal();
        }

        let status = match err {
            Error::InvalidInput(_) => StatusCode::BAD_REQUEST,
            Error::Authentication(_) => StatusCode::UNAUTHORIZED,
            Error::VehicleNotWhitelisted(_) => StatusCode::FORBIDDEN,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::DuplicateEvent(_) => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };

        ApiError {
            message: err.to_string(),
            status: status.as_u16(),
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        if let Some(domain) = err.downcast_ref::<Error>() {
            if !domain.is_client_error() {
                error!("Request failed: {:#}", err);
                return ApiError::internal();
            }
            return domain.clone().into();
        }

        error!("Request failed: {:#}", err);
        ApiError::internal()
    }
}

impl ApiError {
    /// Opaque failure; details stay in the log
    pub fn internal() -> Self {
        ApiError {
            message: "internal error".to_string(),
            status: StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self)).into_response()
    }
}

/// Bearer JWT gate for the query API
async fn require_jwt<B>(
    State(state): State<AppState>,
    mut req: Request<B>,
    next: Next<B>,
) -> ApiResult<Response> {
    let claims = state.security.authenticate(req.headers())?;
    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Shared-secret gate for service-to-service endpoints
async fn require_internal_token<B>(
    State(state): State<AppState>,
    req: Request<B>,
    next: Next<B>,
) -> ApiResult<Response> {
    state.security.check_internal_token(req.headers())?;
    Ok(next.run(req).await)
}

async fn live() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

async fn ready(State(state): State<AppState>) -> Response {
    match tokio::time::timeout(Duration::from_secs(5), state.store.ping()).await {
        Ok(Ok(())) => Json(json!({ "status": "ok" })).into_response(),
        Ok(Err(e)) => {
            error!("Readiness check failed: {:#}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
                .into_response()
        }
        Err(_) => {
            error!("Readiness check timed out");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unhealthy" })),
            )
                .into_response()
        }
    }
}

/// Build the full router: camera-facing, JWT-protected and internal routes
pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .allow_credentials(false)
        .max_age(Duration::from_secs(12 * 3600));

    let body_limit = state.config.api.max_body_mb * 1024 * 1024;

    let protected = Router::new()
        .route("/api/v1/plates", get(events_controller::list_plates))
        .route("/api/v1/events", get(events_controller::list_events))
        .route("/api/v1/events/:id", get(events_controller::get_event))
        .route(
            "/api/v1/reports/summary",
            get(events_controller::report_summary),
        )
        .route(
            "/api/v1/anpr/events/old",
            delete(events_controller::delete_old_events),
        )
        .route(
            "/api/v1/anpr/events/all",
            delete(events_controller::delete_all_events),
        )
        .route_layer(from_fn_with_state(state.clone(), require_jwt));

    let internal = Router::new()
        .route(
            "/internal/anpr/events",
            get(events_controller::internal_events),
        )
        .route_layer(from_fn_with_state(state.clone(), require_internal_token));

    Router::new()
        .route("/api/v1/anpr/events", post(ingest_controller::create_event))
        .route(
            "/api/v1/anpr/hikvision",
            post(ingest_controller::create_hikvision_event).get(ingest_controller::hikvision_probe),
        )
        .route("/health/live", get(live))
        .route("/health/ready", get(ready))
        .merge(protected)
        .merge(internal)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .with_state(state)
}

pub struct RestApi {
    state: AppState,
}

impl RestApi {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    /// Serve until the shutdown token is cancelled, then drain in-flight requests
    pub async fn run(self) -> Result<()> {
        let api = &self.state.config.api;
        let addr: SocketAddr = format!("{}:{}", api.address, api.port).parse()?;

        info!("API server listening on {}", addr);

        let listener = TcpListener::bind(addr).await?;
        let shutdown = self.state.shutdown.clone();

        axum::Server::from_tcp(listener.into_std()?)?
            .serve(router(self.state).into_make_service())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        info!("API server stopped");
        Ok(())
    }
}
