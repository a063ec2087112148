//! High-level, ergonomic library API: crawl a directory into datasets, collect
//! their metadata records in one pass, and render previews to files or
//! in-memory buffers. Prefer these entrypoints over the low-level `core`
//! modules when integrating rastermeta.
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::core::crawler::{CrawlError, Crawler};
use crate::core::dataset::{Dataset, MetadataRecord};
use crate::core::overview::{OverviewOutput, OverviewRequest, OverviewTarget};
use crate::core::params::{CrawlParams, OverviewParams};
use crate::core::registry::FormatRegistry;
use crate::error::{Error, Result};
use crate::io::vfs;

pub use crate::io::writers::metadata::write_records_json;

/// Process-wide registry of the built-in drivers
pub fn builtin_registry() -> Result<&'static FormatRegistry> {
    crate::io::formats::builtin_registry()
}

/// Lazily crawl `root` with the built-in registry
pub fn crawl(root: &Path, params: &CrawlParams) -> Result<Crawler<'static>> {
    Crawler::new(builtin_registry()?, root, params)
}

/// Outcome of a full crawl
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub records: Vec<MetadataRecord>,
    pub errors: Vec<CrawlError>,
    /// Preview images written, in crawl order
    pub overviews: Vec<PathBuf>,
}

/// Crawl `root` to completion, optionally writing a preview of every dataset
/// into `overview_dir` (laid out like the crawled tree). Per-file failures end up in the report, never in the
/// returned `Result`.
pub fn crawl_directory(
    root: &Path,
    overview_dir: Option<&Path>,
    params: &CrawlParams,
) -> Result<CrawlReport> {
    let mut report = CrawlReport::default();
    let overview = params.overview.clone().unwrap_or_default();
    let mut crawler = crawl(root, params)?;

    for dataset in crawler.by_ref() {
        if let Some(dir) = overview_dir {
            let dir = mirrored_dir(root, dir, dataset.path());
            match generate_overview_to_path(&dataset, &dir, &overview) {
                Ok(path) => report.overviews.push(path),
                Err(e) => {
                    warn!("Overview of {:?} failed: {}", dataset.path(), e);
                    report.errors.push(CrawlError::from_error(dataset.path(), &e));
                }
            }
        }
        report.records.push(dataset.record());
    }
    report.errors.extend(crawler.take_errors());

    info!(
        "Crawled {:?}: datasets={} errors={} overviews={}",
        root,
        report.records.len(),
        report.errors.len(),
        report.overviews.len()
    );
    Ok(report)
}

/// Directory under `out` that mirrors where `path` sits below `root`, so
/// same-named files from different folders never share a preview. Members of
/// a zip archive go below a folder named after the archive.
fn mirrored_dir(root: &Path, out: &Path, path: &Path) -> PathBuf {
    let (outer, member) = match vfs::split_zip_path(path) {
        Some((archive, member)) => (archive, Some(member)),
        None => (path.to_path_buf(), None),
    };
    let Ok(relative) = outer.strip_prefix(root) else {
        return out.to_path_buf();
    };
    let mut dir = out.to_path_buf();
    match member {
        Some(member) => {
            dir.push(relative);
            dir.extend(Path::new(&member).parent());
        }
        None => dir.extend(relative.parent()),
    }
    dir
}

/// Write a preview of `dataset` into `dir` and return the image path
pub fn generate_overview_to_path(
    dataset: &Dataset,
    dir: &Path,
    params: &OverviewParams,
) -> Result<PathBuf> {
    let request = OverviewRequest {
        width: params.width,
        format: params.format,
        target: OverviewTarget::Directory(dir.to_path_buf()),
    };
    match dataset.overview(&request)? {
        OverviewOutput::Written { path, .. } => Ok(path),
        OverviewOutput::Bytes { .. } => Err(Error::Processing(
            "Driver returned an in-memory preview for a directory request".into(),
        )),
    }
}

/// Encoded preview bytes of `dataset` (no disk I/O besides reading the raster)
pub fn generate_overview_to_buffer(dataset: &Dataset, params: &OverviewParams) -> Result<OverviewOutput> {
    let request = OverviewRequest {
        width: params.width,
        format: params.format,
        target: OverviewTarget::Memory,
    };
    match dataset.overview(&request)? {
        out @ OverviewOutput::Bytes { .. } => Ok(out),
        OverviewOutput::Written { path, .. } => Err(Error::Processing(format!(
            "Driver wrote {path:?} for an in-memory request"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_dirs_mirror_the_crawled_tree() {
        let root = Path::new("/data");
        let out = Path::new("/previews");
        assert_eq!(mirrored_dir(root, out, Path::new("/data/scene.tif")), out);
        assert_eq!(
            mirrored_dir(root, out, Path::new("/data/a/b/scene.tif")),
            Path::new("/previews/a/b")
        );
        assert_eq!(
            mirrored_dir(root, out, &vfs::zip_member_path(Path::new("/data/x/bundle.zip"), "in/scene.tif")),
            Path::new("/previews/x/bundle.zip/in")
        );
        assert_eq!(mirrored_dir(root, out, Path::new("/elsewhere/scene.tif")), out);
    }
}
