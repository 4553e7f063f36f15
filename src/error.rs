//! Unified error type.

use std::path::PathBuf;

/// The error type returned by the crate's fallible operations.
///
/// Application-level failures (404, 422, etc.) are still expressed as HTTP
/// [`Response`](crate::Response) values. This type surfaces infrastructure
/// failures: sockets, worker threads, compressors, the CDN.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("improperly configured: {0}")]
    Config(String),

    #[error("task queue is shut down")]
    QueueClosed,

    #[error("{compressor}: {message}")]
    Compress { compressor: String, message: String },

    #[error("image optimizer: {0}")]
    Optimizer(String),

    #[error("ran out of image optimizer keys, add more to assets.punypng_keys")]
    KeysExhausted,

    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cdn: {0}")]
    Cdn(String),

    #[error(
        "there are more than {max} files to invalidate; file names dumped to {}, please invalidate manually",
        manifest.display()
    )]
    TooManyInvalidations { max: usize, manifest: PathBuf },

    #[error(
        "invalidation failed: {message}; unprocessed files dumped to {}, please invalidate manually",
        manifest.display()
    )]
    Invalidation { message: String, manifest: PathBuf },

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<config::ConfigError> for Error {
    fn from(e: config::ConfigError) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_errors_are_json_errors() {
        let err: Error = serde_json::from_str::<u32>("nope").unwrap_err().into();
        assert!(matches!(err, Error::Json(_)));
        assert!(err.to_string().starts_with("json: "));
    }
}
