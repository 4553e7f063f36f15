//! Remote image optimisation.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

use super::command::write_temp;

/// Something that can make an image smaller.
#[async_trait]
pub trait ImageOptimizer: Send + Sync + 'static {
    /// `Ok(None)` means "keep the original": the service declined or was
    /// unreachable. `Err` means the optimizer itself is unusable, such as
    /// running out of API keys.
    async fn optimize(&self, path: &Path) -> Result<Option<NamedTempFile>>;
}

/// API keys used in order; the next one is taken when the current key
/// hits its daily quota.
#[derive(Debug)]
pub struct ApiKeys {
    keys: Vec<String>,
    index: usize,
}

impl ApiKeys {
    pub fn new(keys: Vec<String>) -> Self {
        Self { keys, index: 0 }
    }

    pub fn current(&self) -> Result<&str> {
        self.keys.get(self.index).map(String::as_str).ok_or(Error::KeysExhausted)
    }

    /// Moves to the next key. Fails, without moving, on the last one.
    pub fn advance(&mut self) -> Result<()> {
        if self.index + 1 >= self.keys.len() {
            return Err(Error::KeysExhausted);
        }
        self.index += 1;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    error: Option<String>,
    savings_percent: Option<f64>,
    optimized_url: Option<String>,
}

/// Client for the punypng.com optimisation API.
///
/// Uploads the image with the current key, then downloads the optimised
/// version from the URL in the reply.
pub struct PunyPng {
    client: reqwest::Client,
    endpoint: String,
    keys: Mutex<ApiKeys>,
}

impl PunyPng {
    pub fn new(endpoint: impl Into<String>, keys: Vec<String>) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(60)).build()?;
        Ok(Self { client, endpoint: endpoint.into(), keys: Mutex::new(ApiKeys::new(keys)) })
    }

    async fn upload(&self, data: &[u8], file_name: &str, key: &str) -> reqwest::Result<Reply> {
        debug!(key, "punypng upload");
        let form = Form::new()
            .part("img", Part::bytes(data.to_vec()).file_name(file_name.to_owned()))
            .text("key", key.to_owned());
        self.client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await?
            .error_for_status()?
            .json::<Reply>()
            .await
    }

    async fn download(&self, url: &str) -> reqwest::Result<bytes::Bytes> {
        self.client.get(url).send().await?.error_for_status()?.bytes().await
    }
}

#[async_trait]
impl ImageOptimizer for PunyPng {
    async fn optimize(&self, path: &Path) -> Result<Option<NamedTempFile>> {
        let data = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_owned());

        let reply = loop {
            let key = self.keys.lock().current()?.to_owned();
            let reply = match self.upload(&data, &file_name, &key).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!("punypng unreachable: {e}");
                    return Ok(None);
                }
            };
            match reply.error.as_deref() {
                None => break reply,
                Some(error) if error.contains("daily limit") => {
                    info!("punypng key hit its daily limit, switching keys");
                    self.keys.lock().advance()?;
                }
                Some(error) => {
                    warn!("punypng error: {error}");
                    return Ok(None);
                }
            }
        };

        if let Some(savings) = reply.savings_percent {
            info!(file = %file_name, "compression rate: {}%", 100.0 - savings);
        }
        let Some(url) = reply.optimized_url else {
            return Err(Error::Optimizer("reply has neither error nor optimized_url".into()));
        };

        match self.download(&url).await {
            Ok(body) => Ok(Some(write_temp(&body, path)?)),
            Err(e) => {
                warn!(%url, "punypng download failed: {e}");
                Ok(None)
            }
        }
    }
}
