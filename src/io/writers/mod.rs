//! Preview encoders (JPEG, TIFF), world/projection sidecars and the JSON
//! metadata record writer.
pub mod jpeg;
pub mod metadata;
pub mod tiff;
pub mod worldfile;
