use std::path::PathBuf;

/// Errors that abort a curation run.
///
/// Per-sequence failures (missing or malformed annotation files) never surface
/// here; they are folded into [`crate::types::CurationStats`] and diagnostics.
#[derive(Debug, thiserror::Error)]
pub enum CurateError {
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("json error at {path}: {source}")]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("no image files to curate")]
    NoImages,
    #[error("invalid class configuration: {0}")]
    InvalidClassConfig(String),
    #[error("no valid images found in {path}")]
    NoLabels { path: PathBuf },
    #[error("failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
    #[error("cache error at {path}: {msg}")]
    Cache { path: PathBuf, msg: String },
}

pub type Result<T> = std::result::Result<T, CurateError>;
