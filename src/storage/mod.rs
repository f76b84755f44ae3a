//! Evidence photo storage.
//!
//! Uploads are best effort: a photo that fails validation or upload is logged
//! and left out, it never fails the event it belongs to.

use crate::config::EvidenceConfig;
use crate::error::Error;
use crate::ingest::FormPart;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Offset, Utc};
use log::{debug, warn};
use uuid::Uuid;

pub mod s3;

pub use s3::S3EvidenceStore;

pub const UNKNOWN_CAMERA_SEGMENT: &str = "unknown_camera";

/// Binary object store returning a public URL per object
#[async_trait]
pub trait EvidenceStore: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String>;
}

/// Lowercase `[a-z0-9_-]`; other runs collapse to a single `_`.
pub fn sanitize_path_segment(value: &str, fallback: &str) -> String {
    let normalized = value.trim().to_lowercase();
    let mut out = String::with_capacity(normalized.len());
    let mut prev_underscore = false;

    for c in normalized.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_' {
            out.push(c);
            prev_underscore = false;
        } else if !prev_underscore {
            out.push('_');
            prev_underscore = true;
        }
    }

    let trimmed = out.trim_matches('_');
    if trimmed.is_empty() {
        fallback.to_string()
    } else {
        trimmed.to_string()
    }
}

/// `{prefix}/{YYYY-MM-DD}/{camera}/{HH-MM-SS}/{event_id}-photo-{index}{ext}` in local time
pub fn photo_key(
    prefix: &str,
    offset: FixedOffset,
    event_time: DateTime<Utc>,
    camera_id: &str,
    event_id: &Uuid,
    index: usize,
    extension: &str,
) -> String {
    let local = event_time.with_timezone(&offset);
    let prefix = prefix.trim_matches('/');
    let rest = format!(
        "{}/{}/{}/{}-photo-{}{}",
        local.format("%Y-%m-%d"),
        sanitize_path_segment(camera_id, UNKNOWN_CAMERA_SEGMENT),
        local.format("%H-%M-%S"),
        event_id,
        index,
        extension
    );
    if prefix.is_empty() {
        rest
    } else {
        format!("{}/{}", prefix, rest)
    }
}

/// Content type from the part header, else sniffed from the bytes.
fn resolve_content_type(part: &FormPart) -> String {
    part.content_type
        .as_deref()
        .map(str::trim)
        .filter(|ct| !ct.is_empty() && *ct != "application/octet-stream")
        .map(str::to_ascii_lowercase)
        .or_else(|| {
            image::guess_format(&part.data)
                .ok()
                .map(|format| format.to_mime_type().to_string())
        })
        .unwrap_or_else(|| "image/jpeg".to_string())
}

fn resolve_extension(part: &FormPart, content_type: &str) -> String {
    let from_name = part
        .file_name
        .as_deref()
        .and_then(|name| std::path::Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()));

    from_name.unwrap_or_else(|| {
        if content_type.contains("png") {
            ".png".to_string()
        } else if content_type.contains("webp") {
            ".webp".to_string()
        } else {
            ".jpg".to_string()
        }
    })
}

/// Uploads event photos under keys derived from the event
pub struct EvidenceUploader<'a> {
    store: &'a dyn EvidenceStore,
    config: &'a EvidenceConfig,
    max_bytes: usize,
}

impl<'a> EvidenceUploader<'a> {
    pub fn new(store: &'a dyn EvidenceStore, config: &'a EvidenceConfig, max_photo_mb: usize) -> Self {
        Self {
            store,
            config,
            max_bytes: max_photo_mb * 1024 * 1024,
        }
    }

    fn offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.config.local_utc_offset_hours * 3600)
            .unwrap_or_else(|| Utc.fix())
    }

    /// Validate and upload one photo
    pub async fn upload(
        &self,
        part: &FormPart,
        event_id: &Uuid,
        event_time: DateTime<Utc>,
        camera_id: &str,
        index: usize,
    ) -> Result<String> {
        if part.data.is_empty() {
            return Err(Error::InvalidInput("photo is empty".to_string()).into());
        }
        if part.data.len() > self.max_bytes {
            return Err(Error::InvalidInput(format!(
                "photo too large: {} bytes, max {}",
                part.data.len(),
                self.max_bytes
            ))
            .into());
        }

        let content_type = resolve_content_type(part);
        if !content_type.starts_with("image/") {
            return Err(Error::InvalidInput(format!(
                "file must be an image, got {}",
                content_type
            ))
            .into());
        }

        let extension = resolve_extension(part, &content_type);
        let key = photo_key(
            &self.config.key_prefix,
            self.offset(),
            event_time,
            camera_id,
            event_id,
            index,
            &extension,
        );

        debug!("Uploading photo {} ({} bytes) to {}", index, part.data.len(), key);
        self.store.put(&key, part.data.to_vec(), &content_type).await
    }

    /// Upload every photo, keeping the URLs of the ones that succeeded in order
    pub async fn upload_all(
        &self,
        parts: &[&FormPart],
        event_id: &Uuid,
        event_time: DateTime<Utc>,
        camera_id: &str,
    ) -> Vec<String> {
        let mut urls = Vec::with_capacity(parts.len());
        for (index, part) in parts.iter().enumerate() {
            match self.upload(part, event_id, event_time, camera_id, index).await {
                Ok(url) => urls.push(url),
                Err(e) => warn!(
                    "Failed to upload photo {:?} for event {}: {:#}",
                    part.file_name, event_id, e
                ),
            }
        }
        urls
    }
}
