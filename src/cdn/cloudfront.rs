//! Amazon CloudFront invalidation client.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_cloudfront::Client;
use aws_sdk_cloudfront::config::Credentials;
use aws_sdk_cloudfront::types::{InvalidationBatch, Paths};
use chrono::Utc;
use tracing::debug;

use crate::config::CdnSettings;
use crate::error::{Error, Result};

use super::InvalidationClient;

/// Amazon CloudFront, authenticated with the keys from [`CdnSettings`].
pub struct CloudFrontClient {
    client: Client,
    sequence: AtomicU64,
}

impl CloudFrontClient {
    pub async fn from_settings(settings: &CdnSettings) -> Result<Self> {
        let creds = settings.require()?;
        let credentials = Credentials::new(
            creds.access_key_id,
            creds.secret_access_key,
            None,
            None,
            "tsu-settings",
        );
        // CloudFront is a global service served from us-east-1.
        let config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new("us-east-1"))
            .credentials_provider(credentials)
            .load()
            .await;
        Ok(Self { client: Client::new(&config), sequence: AtomicU64::new(0) })
    }

    fn caller_reference(&self) -> String {
        let n = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!("tsu-{}-{n}", Utc::now().format("%Y%m%d%H%M%S%.f"))
    }
}

#[async_trait]
impl InvalidationClient for CloudFrontClient {
    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<()> {
        let items = Paths::builder()
            .quantity(path_quantity(paths.len())?)
            .set_items(Some(paths.to_vec()))
            .build()
            .map_err(|e| Error::Cdn(e.to_string()))?;
        let batch = InvalidationBatch::builder()
            .paths(items)
            .caller_reference(self.caller_reference())
            .build()
            .map_err(|e| Error::Cdn(e.to_string()))?;

        let out = self
            .client
            .create_invalidation()
            .distribution_id(distribution_id)
            .invalidation_batch(batch)
            .send()
            .await
            .map_err(|e| Error::Cdn(aws_sdk_cloudfront::error::DisplayErrorContext(e).to_string()))?;
        debug!(
            id = out.invalidation().map(|i| i.id()).unwrap_or_default(),
            "invalidation created"
        );
        Ok(())
    }
}

/// The API counts paths as an `i32`.
fn path_quantity(len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| Error::Cdn(format!("too many paths in one batch: {len}")))
}
