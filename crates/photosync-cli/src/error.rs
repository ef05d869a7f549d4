use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] photosync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("No password provided")]
    EmptyPassword,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Another upload is running: {0}")]
    Locked(String),
    #[error(
        "No server configured. Run `photosync --server <URL> init` or set PHOTOSYNC_SERVER_URL."
    )]
    ServerNotConfigured,
}
