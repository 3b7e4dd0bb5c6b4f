use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Failure modes of the collection pipeline.
///
/// None of these stop the poll loop; they are logged and the affected
/// fields keep their last known value.
#[derive(Debug, Error)]
pub enum CollectorError {
    #[error("privileged sampling is not permitted without a password")]
    PermissionDenied,

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("malformed sampler record: {0}")]
    Decode(#[from] plist::Error),

    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{count} stray {name} process(es) still running; not starting another")]
    StraySampler { name: String, count: usize },

    #[error("permission setup failed: {0}")]
    Setup(String),

    #[error("refusing to write privilege policy: {0}")]
    InvalidPolicy(String),
}

pub type Result<T> = std::result::Result<T, CollectorError>;
