use crate::error::Error;
use anyhow::Result;
use sqlx::PgPool;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Resolves camera ids to rows of the external `polygons` table
#[derive(Clone)]
pub struct SitesRepository {
    pool: Arc<PgPool>,
    /// Lowercased camera alias -> polygon name
    aliases: Arc<HashMap<String, String>>,
}

impl SitesRepository {
    pub fn new(pool: Arc<PgPool>, aliases: &HashMap<String, String>) -> Self {
        let aliases = aliases
            .iter()
            .map(|(alias, name)| (alias.trim().to_lowercase(), name.clone()))
            .collect();
        Self {
            pool,
            aliases: Arc::new(aliases),
        }
    }

    pub fn site_name_for(&self, camera_id: &str) -> Option<&str> {
        let alias = camera_id.trim().to_lowercase();
        if alias.is_empty() {
            return None;
        }
        self.aliases.get(&alias).map(String::as_str)
    }

    /// Polygon id for the camera, `None` when the camera has no alias or the
    /// polygon does not exist
    pub async fn resolve_polygon_id(&self, camera_id: &str) -> Result<Option<Uuid>> {
        let Some(name) = self.site_name_for(camera_id) else {
            return Ok(None);
        };

        let result = sqlx::query_scalar::<_, Uuid>(
            "SELECT id FROM polygons WHERE LOWER(name) = LOWER($1) LIMIT 1",
        )
        .bind(name)
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| {
            Error::Database(format!(
                "Failed to resolve polygon for camera_id {:?}: {}",
                camera_id, e
            ))
        })?;

        Ok(result)
    }
}
