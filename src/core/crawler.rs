//! Directory crawler.
//!
//! Enumerates every file below a root (optionally expanding zip archives),
//! orders the files into per-format buckets and then lazily yields one
//! [`Dataset`] per product. Files claimed by a product are removed from the
//! queue as soon as the product is constructed, so companions are never tried
//! on their own. Failures become [`CrawlError`] records and iteration goes on.
use std::collections::{HashMap, HashSet, VecDeque};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::dataset::{Dataset, FileCandidate};
use crate::core::params::CrawlParams;
use crate::core::registry::{FormatRegistry, is_sidecar};
use crate::error::{Error, Result};
use crate::io::vfs;

/// A file that could not be turned into a dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrawlError {
    pub path: PathBuf,
    /// One-line description
    pub message: String,
    /// Full diagnostic: debug rendering plus the chain of causes
    pub detail: String,
}

impl CrawlError {
    pub fn from_error(path: &Path, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut detail = format!("{err:?}");
        let mut source = err.source();
        while let Some(cause) = source {
            detail.push_str("\ncaused by: ");
            detail.push_str(&cause.to_string());
            source = cause.source();
        }
        Self {
            path: path.to_path_buf(),
            message: err.to_string(),
            detail,
        }
    }
}

/// Pending queue and accumulated errors of one crawl
#[derive(Debug, Default)]
pub struct CrawlState {
    queue: VecDeque<FileCandidate>,
    remaining: usize,
    errors: Vec<CrawlError>,
}

impl CrawlState {
    pub fn remaining(&self) -> usize {
        self.remaining
    }

    pub fn errors(&self) -> &[CrawlError] {
        &self.errors
    }

    fn pop(&mut self) -> Option<FileCandidate> {
        let next = self.queue.pop_front();
        self.remaining = self.queue.len();
        next
    }

    fn remove(&mut self, files: &HashSet<&Path>) {
        self.queue.retain(|c| !files.contains(c.path.as_path()));
        self.remaining = self.queue.len();
    }
}

/// List every file below `root` in path order. Unreadable entries and archives
/// are reported in `errors` and skipped.
pub fn enumerate_files(
    root: &Path,
    params: &CrawlParams,
    errors: &mut Vec<CrawlError>,
) -> Result<Vec<PathBuf>> {
    if !root.is_dir() {
        return Err(Error::InvalidArgument {
            arg: "root",
            value: root.display().to_string(),
        });
    }
    let max_depth = if params.recurse { usize::MAX } else { 1 };
    let mut files = Vec::new();
    for entry in WalkDir::new(root).min_depth(1).max_depth(max_depth) {
        match entry {
            Ok(e) if e.file_type().is_file() => files.push(e.into_path()),
            Ok(_) => {}
            Err(e) => {
                let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
                warn!("Cannot read {:?}: {}", path, e);
                errors.push(CrawlError::from_error(&path, &e));
            }
        }
    }
    files.sort();

    if !params.archives {
        return Ok(files);
    }
    let mut expanded = Vec::with_capacity(files.len());
    for path in files {
        if !vfs::is_archive(&path) {
            expanded.push(path);
            continue;
        }
        match vfs::archive_members(&path, params.recurse) {
            Ok(members) => {
                debug!("Expanded {:?} into {} members", path, members.len());
                expanded.extend(members);
            }
            Err(e) => {
                warn!("Cannot list archive {:?}: {}", path, e);
                errors.push(CrawlError::from_error(&path, &e));
            }
        }
    }
    Ok(expanded)
}

/// Lazy sequence of datasets found under a root
pub struct Crawler<'r> {
    registry: &'r FormatRegistry,
    state: CrawlState,
    /// File to the serial number of the dataset that claimed it
    claimed: HashMap<PathBuf, usize>,
    serial: usize,
}

impl<'r> Crawler<'r> {
    pub fn new(registry: &'r FormatRegistry, root: &Path, params: &CrawlParams) -> Result<Self> {
        let mut errors = Vec::new();
        let files = enumerate_files(root, params, &mut errors)?;
        info!("Found {} files under {:?}", files.len(), root);
        let mut crawler = Self::from_files(registry, files);
        crawler.state.errors = errors;
        Ok(crawler)
    }

    /// Crawl an explicit list of files
    pub fn from_files(registry: &'r FormatRegistry, files: Vec<PathBuf>) -> Self {
        let default_bucket = registry.len() - 1;
        let mut buckets: Vec<Vec<FileCandidate>> = vec![Vec::new(); registry.len()];
        for path in files {
            let candidate = FileCandidate::new(path);
            let idx = registry.match_index(&candidate).unwrap_or(default_bucket);
            buckets[idx].push(candidate);
        }
        let mut queue = VecDeque::new();
        for bucket in buckets {
            let (sidecars, primaries): (Vec<_>, Vec<_>) =
                bucket.into_iter().partition(|c| is_sidecar(&c.basename));
            queue.extend(primaries);
            queue.extend(sidecars);
        }
        let remaining = queue.len();
        Self {
            registry,
            state: CrawlState {
                queue,
                remaining,
                errors: Vec::new(),
            },
            claimed: HashMap::new(),
            serial: 0,
        }
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn errors(&self) -> &[CrawlError] {
        &self.state.errors
    }

    pub fn take_errors(&mut self) -> Vec<CrawlError> {
        std::mem::take(&mut self.state.errors)
    }

    /// Record the dataset's files as consumed and drop them from the queue.
    /// Files already owned by an earlier dataset are removed from its list.
    fn claim(&mut self, dataset: &mut Dataset) {
        let serial = self.serial;
        let claimed = &mut self.claimed;
        dataset.filelist.retain(|f| match claimed.get(f) {
            Some(&owner) if owner != serial => {
                debug!("{:?} already belongs to another dataset", f);
                false
            }
            _ => {
                claimed.insert(f.clone(), serial);
                true
            }
        });
        let files: HashSet<&Path> = dataset.filelist.iter().map(PathBuf::as_path).collect();
        self.state.remove(&files);
    }

    fn build(&mut self, candidate: &FileCandidate) -> Result<Dataset> {
        self.serial += 1;
        let registry = self.registry;
        let descriptor = registry.match_file(candidate);
        debug!("{:?} -> {}", candidate.path, descriptor.name);
        let constructed = descriptor.driver.clone().construct(candidate)?;
        let mut dataset = match constructed {
            Some(ds) => ds,
            None => {
                debug!(
                    "{} does not apply to {:?}, using default driver",
                    descriptor.name, candidate.path
                );
                let default = registry.default_descriptor();
                default.driver.clone().construct(candidate)?.ok_or_else(|| {
                    Error::UnsupportedFormat(candidate.path.display().to_string())
                })?
            }
        };
        // Companions leave the queue before extraction so a failing product
        // does not get its parts retried one by one.
        self.claim(&mut dataset);
        dataset.extract()?;
        self.claim(&mut dataset);
        Ok(dataset)
    }
}

impl Iterator for Crawler<'_> {
    type Item = Dataset;

    fn next(&mut self) -> Option<Dataset> {
        while let Some(candidate) = self.state.pop() {
            if self.claimed.contains_key(&candidate.path) {
                continue;
            }
            match self.build(&candidate) {
                Ok(dataset) => {
                    debug!(
                        "Yielding {:?} ({} files)",
                        dataset.path(),
                        dataset.filelist.len()
                    );
                    return Some(dataset);
                }
                Err(e) => {
                    warn!("Skipping {:?}: {}", candidate.path, e);
                    self.state.errors.push(CrawlError::from_error(&candidate.path, &e));
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::sync::Arc;

    use crate::core::dataset::{Driver, RasterSource};
    use crate::core::overview::{OverviewOutput, OverviewRequest};
    use crate::core::registry::FormatDescriptor;

    /// Claims `<stem>.*` siblings; fails extraction when the stem is "bad"
    struct Group;

    impl Driver for Group {
        fn name(&self) -> &'static str {
            "group"
        }
        fn construct(self: Arc<Self>, c: &FileCandidate) -> Result<Option<Dataset>> {
            let mut ds = Dataset::new(self, &c.path)?;
            let stem = c.basename.trim_end_matches(".hdr").to_string();
            for sib in vfs::siblings(&c.path)? {
                if vfs::basename_lower(&sib).starts_with(&format!("{stem}.")) {
                    ds.add_file(sib);
                }
            }
            Ok(Some(ds))
        }
        fn extract(&self, ds: &mut Dataset) -> Result<()> {
            if ds.fileinfo.name.starts_with("bad") {
                return Err(Error::MissingFile(ds.path().with_extension("img")));
            }
            ds.source = RasterSource::File(ds.path().to_path_buf());
            Ok(())
        }
        fn overview(&self, _: &Dataset, _: &OverviewRequest) -> Result<OverviewOutput> {
            Err(Error::Processing("none".into()))
        }
    }

    /// Accepts anything except files named "broken*" (error) or "ignored*"
    /// (not applicable)
    struct Plain;

    impl Driver for Plain {
        fn name(&self) -> &'static str {
            "plain"
        }
        fn construct(self: Arc<Self>, c: &FileCandidate) -> Result<Option<Dataset>> {
            if c.basename.starts_with("broken") {
                return Err(Error::UnsupportedFormat(c.basename.clone()));
            }
            if c.basename.starts_with("ignored") {
                return Ok(None);
            }
            Ok(Some(Dataset::new(self, &c.path)?))
        }
        fn extract(&self, _: &mut Dataset) -> Result<()> {
            Ok(())
        }
        fn overview(&self, _: &Dataset, _: &OverviewRequest) -> Result<OverviewOutput> {
            Err(Error::Processing("none".into()))
        }
    }

    /// Matches `.lbl` files but never applies to them
    struct Declines;

    impl Driver for Declines {
        fn name(&self) -> &'static str {
            "declines"
        }
        fn construct(self: Arc<Self>, _: &FileCandidate) -> Result<Option<Dataset>> {
            Ok(None)
        }
        fn extract(&self, _: &mut Dataset) -> Result<()> {
            Ok(())
        }
        fn overview(&self, _: &Dataset, _: &OverviewRequest) -> Result<OverviewOutput> {
            Err(Error::Processing("none".into()))
        }
    }

    fn registry() -> FormatRegistry {
        let mut reg =
            FormatRegistry::new(FormatDescriptor::new("plain", &[".*"], Arc::new(Plain)).unwrap());
        reg.register(FormatDescriptor::new("group", &[r"\.hdr$"], Arc::new(Group)).unwrap());
        reg.register(FormatDescriptor::new("declines", &[r"\.lbl$"], Arc::new(Declines)).unwrap());
        reg
    }

    fn touch(dir: &Path, names: &[&str]) {
        for n in names {
            fs::write(dir.join(n), n.as_bytes()).unwrap();
        }
    }

    #[test]
    fn companions_are_consumed_once() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &["a.hdr", "a.img", "a.tfw", "b.tif", "b.tfw"]);
        let reg = registry();
        let mut crawler = Crawler::new(&reg, tmp.path(), &CrawlParams::default()).unwrap();
        let found: Vec<Dataset> = crawler.by_ref().collect();
        let names: Vec<_> = found.iter().map(|d| d.fileinfo.name.clone()).collect();
        // b.tfw is a sidecar so it is tried after b.tif, then alone
        assert_eq!(names, vec!["a.hdr", "b.tif", "b.tfw"]);
        assert_eq!(found[0].filelist.len(), 3);
        assert!(crawler.errors().is_empty());
        assert_eq!(crawler.state().remaining(), 0);

        let mut seen = HashSet::new();
        for ds in &found {
            for f in &ds.filelist {
                assert!(seen.insert(f.clone()), "{f:?} in two datasets");
            }
        }
    }

    #[test]
    fn failed_extraction_records_header_and_keeps_companions_out() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &["bad.hdr", "bad.img", "bad.rrd", "c.tif"]);
        let reg = registry();
        let mut crawler = Crawler::new(&reg, tmp.path(), &CrawlParams::default()).unwrap();
        let names: Vec<_> = crawler.by_ref().map(|d| d.fileinfo.name).collect();
        assert_eq!(names, vec!["c.tif"]);
        assert_eq!(crawler.errors().len(), 1);
        assert!(crawler.errors()[0].path.ends_with("bad.hdr"));
        assert!(crawler.errors()[0].message.contains("missing"));
    }

    #[test]
    fn construct_errors_are_recorded_and_iteration_continues() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &["broken.tif", "fine.tif"]);
        let reg = registry();
        let mut crawler = Crawler::new(&reg, tmp.path(), &CrawlParams::default()).unwrap();
        assert_eq!(crawler.by_ref().count(), 1);
        let errors = crawler.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].detail.contains("UnsupportedFormat"));
    }

    #[test]
    fn not_applicable_falls_back_to_default_driver() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &["scene.lbl"]);
        let reg = registry();
        let mut crawler = Crawler::new(&reg, tmp.path(), &CrawlParams::default()).unwrap();
        let found: Vec<Dataset> = crawler.by_ref().collect();
        assert!(crawler.errors().is_empty());
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].fileinfo.name, "scene.lbl");
        assert_eq!(found[0].metadata.get("filetype"), Some("plain"));
    }

    #[test]
    fn declined_by_every_driver_is_unsupported() {
        let tmp = tempfile::tempdir().unwrap();
        touch(tmp.path(), &["ignored.lbl", "kept.tif"]);
        let reg = registry();
        let mut crawler = Crawler::new(&reg, tmp.path(), &CrawlParams::default()).unwrap();
        let names: Vec<_> = crawler.by_ref().map(|d| d.fileinfo.name).collect();
        assert_eq!(names, vec!["kept.tif"]);
        let errors = crawler.take_errors();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].path.ends_with("ignored.lbl"));
        assert!(errors[0].detail.contains("UnsupportedFormat"));
    }

    #[test]
    fn recursion_flag_controls_depth() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir(tmp.path().join("sub")).unwrap();
        touch(tmp.path(), &["top.tif", "sub/deep.tif"]);
        let reg = registry();
        let flat = Crawler::new(&reg, tmp.path(), &CrawlParams::default()).unwrap().count();
        let params = CrawlParams {
            recurse: true,
            ..CrawlParams::default()
        };
        let deep = Crawler::new(&reg, tmp.path(), &params).unwrap().count();
        assert_eq!((flat, deep), (1, 2));
        assert!(Crawler::new(&reg, &tmp.path().join("none"), &params).is_err());
    }

    #[test]
    fn archives_are_expanded_when_enabled() {
        use std::io::Write;
        let tmp = tempfile::tempdir().unwrap();
        let zip_path = tmp.path().join("pack.zip");
        let mut zip = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
        zip.start_file("inner.tif", zip::write::FileOptions::default()).unwrap();
        zip.write_all(b"pixels").unwrap();
        zip.finish().unwrap();

        let reg = registry();
        let closed: Vec<_> = Crawler::new(&reg, tmp.path(), &CrawlParams::default())
            .unwrap()
            .map(|d| d.fileinfo.name)
            .collect();
        assert_eq!(closed, vec!["pack.zip"]);

        let params = CrawlParams {
            archives: true,
            ..CrawlParams::default()
        };
        let opened: Vec<_> = Crawler::new(&reg, tmp.path(), &params)
            .unwrap()
            .map(|d| d.path().to_path_buf())
            .collect();
        assert_eq!(opened, vec![vfs::zip_member_path(&zip_path, "inner.tif")]);
    }
}
