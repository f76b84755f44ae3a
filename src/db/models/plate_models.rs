use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Plate dictionary entry
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Plate {
    pub id: Uuid,
    /// Spelling seen on first sighting
    pub number: String,
    pub normalized: String,
    pub country: Option<String>,
    pub region: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Plate lookup result returned by the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlateInfo {
    pub plate_id: Uuid,
    pub number: String,
    pub normalized: String,
    pub last_event_time: Option<DateTime<Utc>>,
}
