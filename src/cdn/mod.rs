//! CDN cache invalidation for freshly collected static files.

#[cfg(feature = "cloudfront")]
mod cloudfront;
mod plan;

use async_trait::async_trait;
use tracing::{error, info};

use crate::config::CdnSettings;
use crate::error::{Error, Result};

#[cfg(feature = "cloudfront")]
pub use cloudfront::CloudFrontClient;
pub use plan::{InvalidationPlan, dump_manifest};

/// A CDN that accepts path invalidation requests.
#[async_trait]
pub trait InvalidationClient: Send + Sync {
    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NothingToInvalidate,
    Complete { batches: usize },
}

/// Invalidates the CDN paths of `changed` static file names, one request
/// per batch.
///
/// When the provider rejects a batch, the paths not yet invalidated are
/// dumped to a JSON manifest named in the returned error.
pub async fn invalidate<C>(client: &C, settings: &CdnSettings, changed: &[String]) -> Result<Outcome>
where
    C: InvalidationClient + ?Sized,
{
    let distribution_id = settings
        .distribution_id
        .as_deref()
        .ok_or_else(|| Error::Config("please specify cdn.distribution_id in settings".into()))?;

    let plan = InvalidationPlan::new(
        &settings.static_url,
        changed,
        settings.batch_size,
        settings.max_batches,
    )?;
    if plan.is_empty() {
        info!("nothing to invalidate");
        return Ok(Outcome::NothingToInvalidate);
    }

    info!(paths = plan.paths().len(), "invalidating files");
    let mut done = 0;
    for (i, batch) in plan.batches().enumerate() {
        if let Err(e) = client.create_invalidation(distribution_id, batch).await {
            error!(batch = i, "invalidation request failed: {e}");
            let manifest = dump_manifest(&plan.paths()[done..])?;
            return Err(Error::Invalidation { message: e.to_string(), manifest });
        }
        done += batch.len();
    }

    let batches = plan.batches().len();
    info!(batches, "invalidation complete");
    Ok(Outcome::Complete { batches })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<(String, Vec<String>)>>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl InvalidationClient for Recorder {
        async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<()> {
            let mut calls = self.calls.lock();
            if self.fail_on == Some(calls.len()) {
                return Err(Error::Cdn("TooManyInvalidationsInProgress".into()));
            }
            calls.push((distribution_id.to_owned(), paths.to_vec()));
            Ok(())
        }
    }

    fn settings() -> CdnSettings {
        CdnSettings {
            distribution_id: Some("E123".into()),
            batch_size: 2,
            max_batches: 3,
            ..Default::default()
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("f{i}.css")).collect()
    }

    #[tokio::test]
    async fn test_empty_set_makes_no_requests() {
        let client = Recorder::default();
        let outcome = invalidate(&client, &settings(), &["".to_string()]).await.unwrap();
        assert_eq!(outcome, Outcome::NothingToInvalidate);
        assert!(client.calls.lock().is_empty());
    }

    #[tokio::test]
    async fn test_consecutive_batches() {
        let client = Recorder::default();
        let outcome = invalidate(&client, &settings(), &names(5)).await.unwrap();
        assert_eq!(outcome, Outcome::Complete { batches: 3 });

        let calls = client.calls.lock();
        assert_eq!(calls[0], ("E123".to_string(), vec!["/static/f0.css".into(), "/static/f1.css".into()]));
        assert_eq!(calls[1].1, ["/static/f2.css", "/static/f3.css"]);
        assert_eq!(calls[2].1, ["/static/f4.css"]);
    }

    #[tokio::test]
    async fn test_provider_error_dumps_remaining_paths() {
        let client = Recorder { fail_on: Some(1), ..Default::default() };
        let err = invalidate(&client, &settings(), &names(5)).await.unwrap_err();
        let Error::Invalidation { message, manifest } = err else {
            panic!("expected Invalidation");
        };
        assert!(message.contains("TooManyInvalidationsInProgress"));

        let dumped: Vec<String> =
            serde_json::from_str(&std::fs::read_to_string(&manifest).unwrap()).unwrap();
        assert_eq!(dumped, ["/static/f2.css", "/static/f3.css", "/static/f4.css"]);
        std::fs::remove_file(manifest).unwrap();
    }

    #[tokio::test]
    async fn test_missing_distribution_is_config_error() {
        let client = Recorder::default();
        let settings = CdnSettings::default();
        let err = invalidate(&client, &settings, &names(1)).await.unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
