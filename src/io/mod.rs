//! I/O layer: fixed-record and grouped-text decoders, the `/vsizip/` virtual
//! filesystem, GDAL adapters, the built-in format drivers, and `writers` for
//! preview images, world files and JSON records.
pub mod decode;
pub use decode::DecodeError;

pub mod formats;

pub mod gdal;
pub use gdal::{GdalError, GdalMetadata, GdalRaster};

pub mod vfs;
pub mod writers;
