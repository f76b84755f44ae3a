use crate::config::RetentionConfig;
use crate::services::EventQueryService;
use anyhow::Result;
use log::{error, info};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Periodic purge of events past the retention window
pub struct EventRetentionService {
    config: RetentionConfig,
    events: EventQueryService,
}

impl EventRetentionService {
    pub fn new(config: RetentionConfig, events: EventQueryService) -> Self {
        Self { config, events }
    }

    /// Start the purge loop in the background. Returns `None` when disabled.
    pub fn start(self: Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if !self.config.enabled {
            info!("Event retention is disabled");
            return None;
        }

        info!(
            "Starting event retention: keeping {} days, checking every {} seconds",
            self.config.retention_days, self.config.check_interval_secs
        );

        Some(tokio::spawn(async move {
            let mut ticker = interval(Duration::from_secs(self.config.check_interval_secs.max(1)));
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Event retention stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = self.run_once().await {
                            error!("Error purging old events: {:#}", e);
                        }
                    }
                }
            }
        }))
    }

    /// One purge pass
    pub async fn run_once(&self) -> Result<u64> {
        let deleted = self
            .events
            .delete_old_events(self.config.retention_days)
            .await?;
        if deleted > 0 {
            info!(
                "Purged {} events older than {} days",
                deleted, self.config.retention_days
            );
        }
        Ok(deleted)
    }
}
