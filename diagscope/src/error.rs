//! Errors surfaced by an aggregation run.

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("path does not exist: {0}")]
    PathNotFound(PathBuf),
    #[error("no metrics or keyhole_stats files found in {0:?}")]
    NoMatchingFiles(Vec<PathBuf>),
    #[error("batch mixes capture files and keyhole_stats files ({capture} vs {lines})")]
    MixedBatch { capture: PathBuf, lines: PathBuf },
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no diagnostic data found")]
    NoDiagnosticData,
    #[error("worker task failed: {0}")]
    Worker(#[from] tokio::task::JoinError),
}

pub type Result<T> = std::result::Result<T, Error>;
