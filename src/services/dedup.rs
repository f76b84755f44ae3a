use super::store::EventStore;
use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

/// Half-width of the duplicate window, in seconds
pub const DEDUP_WINDOW_SECS: i64 = 5 * 60;

pub fn dedup_window() -> Duration {
    Duration::seconds(DEDUP_WINDOW_SECS)
}

/// Detects repeat sightings of one plate by one camera
#[derive(Clone)]
pub struct DedupGuard {
    store: Arc<dyn EventStore>,
}

impl DedupGuard {
    pub fn new(store: Arc<dyn EventStore>) -> Self {
        Self { store }
    }

    /// True if an event with the same plate and camera lies in `event_time ± window`
    pub async fn exists_recent(
        &self,
        normalized_plate: &str,
        camera_id: &str,
        event_time: DateTime<Utc>,
        window: Duration,
    ) -> Result<bool> {
        self.store
            .exists_recent(
                normalized_plate,
                camera_id,
                event_time - window,
                event_time + window,
            )
            .await
    }
}
