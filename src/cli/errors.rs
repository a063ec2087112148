use std::path::PathBuf;

use thiserror::Error;

/// Application-specific errors for the CLI
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not a directory: {path:?}")]
    NotADirectory { path: PathBuf },

    #[error("Overview width must be greater than 0, got: {width}")]
    ZeroWidth { width: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Library(#[from] rastermeta::Error),
}
