//! Application-level error type shared across binaries and services.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::AppConfigError;
use crate::extract::ExtractError;
use crate::services::chat::ChatError;
use crate::services::orchestrator::GenerationError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    ConfigLoad(#[from] AppConfigError),
    #[error(transparent)]
    Server(#[from] melete_server::ServerError),
    #[error(transparent)]
    Extract(#[from] ExtractError),
    #[error(transparent)]
    Storage(#[from] StorageError),
    #[error(transparent)]
    Generation(#[from] GenerationError),
    #[error(transparent)]
    Chat(#[from] ChatError),
    #[error("failed to read input file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot determine document format for `{path}` (pass --media-type)")]
    UnknownInputFormat { path: PathBuf },
}
