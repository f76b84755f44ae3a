use super::EvidenceStore;
use crate::config::EvidenceConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use log::{debug, info};

/// S3-compatible bucket (R2, MinIO) addressed with path-style URLs
pub struct S3EvidenceStore {
    client: Client,
    bucket: String,
    base_url: String,
}

impl S3EvidenceStore {
    pub fn new(config: &EvidenceConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(Error::Config(
                "evidence storage requires endpoint, access_key_id, secret_access_key and bucket"
                    .to_string(),
            )
            .into());
        }

        let endpoint = config.endpoint.trim().trim_end_matches('/').to_string();
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "anpr-static",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .endpoint_url(&endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        let base_url = base_url(config);

        info!(
            "Evidence storage configured: bucket={} base_url={}",
            config.bucket, base_url
        );

        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            base_url,
        })
    }

    pub fn object_url(&self, key: &str) -> String {
        object_url(&self.base_url, &self.bucket, key)
    }
}

/// Public links use `public_base_url` when set, else the endpoint
fn base_url(config: &EvidenceConfig) -> String {
    let public = config.public_base_url.trim().trim_end_matches('/');
    if public.is_empty() {
        config.endpoint.trim().trim_end_matches('/').to_string()
    } else {
        public.to_string()
    }
}

fn object_url(base_url: &str, bucket: &str, key: &str) -> String {
    format!("{}/{}/{}", base_url, bucket, key.trim_start_matches('/'))
}

#[async_trait]
impl EvidenceStore for S3EvidenceStore {
    async fn put(&self, key: &str, bytes: Vec<u8>, content_type: &str) -> Result<String> {
        if bytes.is_empty() {
            return Err(Error::InvalidInput("object must not be empty".to_string()).into());
        }

        let size = bytes.len() as i64;
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .content_length(size)
            .send()
            .await
            .map_err(|e| Error::Storage(format!("failed to upload {}: {}", key, e)))?;

        debug!("Uploaded {} ({} bytes)", key, size);
        Ok(self.object_url(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_path_style() {
        assert_eq!(
            object_url("https://cdn.example", "evidence", "/anpr_events/a.jpg"),
            "https://cdn.example/evidence/anpr_events/a.jpg"
        );
    }

    #[test]
    fn incomplete_config_is_rejected() {
        let config = EvidenceConfig {
            endpoint: "https://r2.example".to_string(),
            ..Default::default()
        };
        let err = S3EvidenceStore::new(&config).err().unwrap();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
    }

    #[test]
    fn public_base_url_wins_over_endpoint() {
        let mut config = EvidenceConfig {
            endpoint: "https://account.r2.example/".to_string(),
            ..Default::default()
        };
        assert_eq!(base_url(&config), "https://account.r2.example");

        config.public_base_url = "https://cdn.example/".to_string();
        assert_eq!(base_url(&config), "https://cdn.example");
    }
}
