use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::OutputFormat;

/// Preview settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OverviewParams {
    /// Target width in pixels; height follows the aspect ratio
    pub width: usize,
    pub format: OutputFormat,
}

impl Default for OverviewParams {
    fn default() -> Self {
        Self {
            width: 800,
            format: OutputFormat::Jpeg,
        }
    }
}

/// Crawl parameters suitable for config files
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrawlParams {
    /// Descend into subdirectories
    pub recurse: bool,
    /// Expand zip archives into their members
    pub archives: bool,
    /// Generate a preview per dataset when set
    pub overview: Option<OverviewParams>,
}

impl CrawlParams {
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_partial_config_with_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("params.json");
        std::fs::write(
            &path,
            r#"{"recurse": true, "overview": {"width": 256, "format": "tiff"}}"#,
        )
        .unwrap();
        let params = CrawlParams::from_json_file(&path).unwrap();
        assert!(params.recurse);
        assert!(!params.archives);
        assert_eq!(
            params.overview,
            Some(OverviewParams {
                width: 256,
                format: OutputFormat::Tiff
            })
        );
    }

    #[test]
    fn bad_config_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("params.json");
        std::fs::write(&path, "{recurse: yes}").unwrap();
        assert!(CrawlParams::from_json_file(&path).is_err());
        assert!(CrawlParams::from_json_file(&tmp.path().join("none.json")).is_err());
    }
}
