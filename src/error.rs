//! Crate-level error type and `Result` alias.
//! Converts the I/O, raster engine, decoder, mosaic and archive errors, and
//! provides semantic variants for missing companions and invalid arguments.
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("GDAL error: {0}")]
    Gdal(#[from] crate::io::GdalError),

    #[error("Header decode error: {0}")]
    Decode(#[from] crate::io::DecodeError),

    #[error("Mosaic error: {0}")]
    Mosaic(#[from] crate::core::mosaic::MosaicError),

    #[error("Archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Referenced file is missing: {0:?}")]
    MissingFile(PathBuf),

    #[error("Required field `{field}` missing from {path:?}")]
    MissingField { field: String, path: PathBuf },

    #[error("Invalid argument: {arg}={value}")]
    InvalidArgument { arg: &'static str, value: String },

    #[error("Size must be greater than 0, got: {size}")]
    ZeroSize { size: usize },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("Processing error: {0}")]
    Processing(String),

    #[error("External error: {0}")]
    External(String),
}

impl Error {
    pub fn external<E: std::fmt::Display>(e: E) -> Self {
        Error::External(e.to_string())
    }

    pub fn missing_field(field: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Error::MissingField {
            field: field.into(),
            path: path.into(),
        }
    }
}
