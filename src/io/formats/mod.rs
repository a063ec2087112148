//! Built-in format drivers and the registry that dispatches files to them.
//!
//! Registration order is match priority: vendor formats first, the generic
//! raster engine driver last.
use std::sync::Arc;

use once_cell::sync::OnceCell;

use crate::core::registry::{FormatDescriptor, FormatRegistry};
use crate::error::Result;

pub mod alos;
pub mod default;
pub mod digitalglobe;
pub mod fast;
pub mod landsat;

pub use alos::AlosDriver;
pub use default::DefaultDriver;
pub use digitalglobe::DigitalGlobeDriver;
pub use fast::FastDriver;
pub use landsat::LandsatDriver;

static BUILTIN: OnceCell<FormatRegistry> = OnceCell::new();

/// A fresh registry with every built-in driver
pub fn new_builtin_registry() -> Result<FormatRegistry> {
    let default = FormatDescriptor::new("default", &[".*"], Arc::new(DefaultDriver))?;
    let mut registry = FormatRegistry::new(default);
    registry.register(FormatDescriptor::new("alos", alos::PATTERNS, Arc::new(AlosDriver))?);
    registry.register(FormatDescriptor::new(
        "digitalglobe",
        digitalglobe::PATTERNS,
        Arc::new(DigitalGlobeDriver),
    )?);
    registry.register(FormatDescriptor::new(
        "landsat_mtl",
        landsat::PATTERNS,
        Arc::new(LandsatDriver),
    )?);
    registry.register(FormatDescriptor::new("fast", fast::PATTERNS, Arc::new(FastDriver))?);
    Ok(registry)
}

/// Process-wide registry, built on first use
pub fn builtin_registry() -> Result<&'static FormatRegistry> {
    BUILTIN.get_or_try_init(new_builtin_registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::FileCandidate;

    fn matched(name: &str) -> String {
        builtin_registry()
            .unwrap()
            .match_file(&FileCandidate::new(name))
            .name
            .clone()
    }

    #[test]
    fn dispatch_by_basename() {
        assert_eq!(matched("/d/LED-ALAV2A051692870-O1B2R_U"), "alos");
        assert_eq!(matched("/d/LED-ALPSMN051692870-O1B2R_UN"), "alos");
        assert_eq!(matched("/d/05NOV23034641-M2AS-000000000010_01_P001.IMD"), "digitalglobe");
        assert_eq!(matched("/d/LC08_L1TP_090084_20170304_MTL.txt"), "landsat_mtl");
        assert_eq!(matched("/d/HEADER.DAT"), "fast");
        assert_eq!(matched("/d/L71090084_HRF.FST"), "fast");
        assert_eq!(matched("/d/scene.tif"), "default");
        assert_eq!(matched("/d/IMG-01-ALAV2A051692870-O1B2R_U"), "default");
    }

    #[test]
    fn registry_lists_default_last() {
        let registry = builtin_registry().unwrap();
        let names: Vec<_> = registry.descriptors().map(|d| d.name.as_str()).collect();
        assert_eq!(names, ["alos", "digitalglobe", "landsat_mtl", "fast", "default"]);
        assert_eq!(registry.len(), 5);
    }
}
