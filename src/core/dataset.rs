//! The dataset contract shared by every format driver.
//!
//! A [`Driver`] turns a [`FileCandidate`] into a [`Dataset`] (`construct`),
//! fills in its metadata and extent (`extract`) and renders previews
//! (`overview`). A `Dataset` is one logical imagery product: it knows every
//! physical file it spans and how to open its pixels through the raster engine,
//! but only opens them when asked.
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core::geometry::{close_ring, footprint, format_point, rotation};
use crate::core::overview::{OverviewOutput, OverviewRequest};
use crate::error::Result;
use crate::io::gdal::{CodecGuard, GdalError, GdalRaster};
use crate::io::vfs;

/// Bytes hashed into the dataset identifier
const GUID_PREFIX_LEN: usize = 64 * 1024;

/// Format-specific implementation of the dataset contract
pub trait Driver: Send + Sync {
    fn name(&self) -> &'static str;

    /// Build the dataset for `candidate` and determine its file list.
    /// `Ok(None)` means the file is not this format after all.
    fn construct(self: Arc<Self>, candidate: &FileCandidate) -> Result<Option<Dataset>>;

    /// Populate metadata, extent and raster source
    fn extract(&self, dataset: &mut Dataset) -> Result<()>;

    fn overview(&self, dataset: &Dataset, request: &OverviewRequest) -> Result<OverviewOutput>;
}

/// A file found by traversal, not yet dispatched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileCandidate {
    pub path: PathBuf,
    /// Lower-cased basename used for pattern matching
    pub basename: String,
}

impl FileCandidate {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let basename = vfs::basename_lower(&path);
        Self { path, basename }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub path: PathBuf,
    pub name: String,
    /// Stable identifier derived from the file size and leading bytes
    pub guid: Uuid,
}

impl FileInfo {
    pub fn from_path(path: &Path) -> Result<Self> {
        let len = vfs::file_len(path)?;
        let head = vfs::read_prefix(path, GUID_PREFIX_LEN)?;
        let mut seed = Vec::with_capacity(head.len() + 8);
        seed.extend_from_slice(&len.to_le_bytes());
        seed.extend_from_slice(&head);
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self {
            path: path.to_path_buf(),
            name,
            guid: Uuid::new_v5(&Uuid::NAMESPACE_OID, &seed),
        })
    }
}

/// Flat field to value map. Multi-valued fields are comma-joined.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Metadata(BTreeMap<String, String>);

impl Metadata {
    /// Set a field; blank values are ignored
    pub fn set(&mut self, key: &str, value: impl ToString) {
        let value = value.to_string();
        let value = value.trim();
        if !value.is_empty() {
            self.0.insert(key.to_string(), value.to_string());
        }
    }

    pub fn set_opt<T: ToString>(&mut self, key: &str, value: Option<T>) {
        if let Some(v) = value {
            self.set(key, v);
        }
    }

    /// Set a field to the distinct values joined with commas
    pub fn set_joined<T: ToString>(&mut self, key: &str, values: &[T]) {
        let mut distinct: Vec<String> = Vec::new();
        for v in values.iter().map(ToString::to_string) {
            if !distinct.contains(&v) {
                distinct.push(v);
            }
        }
        self.set(key, distinct.join(","));
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(|v| v.parse().ok())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// What a crawl hands to consumers for each dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataRecord {
    pub fields: Metadata,
    pub extent: Vec<(f64, f64)>,
    pub filelist: Vec<PathBuf>,
}

/// Where the raster engine reads a dataset's pixels from
#[derive(Debug, Clone, PartialEq)]
pub enum RasterSource {
    File(PathBuf),
    /// Subdataset name as reported by the raster engine
    Subdataset(String),
    /// Virtual raster XML
    Vrt(String),
}

impl RasterSource {
    pub fn open(&self) -> std::result::Result<GdalRaster, GdalError> {
        match self {
            RasterSource::File(path) => GdalRaster::open(path),
            RasterSource::Subdataset(name) => GdalRaster::open(Path::new(name)),
            RasterSource::Vrt(xml) => GdalRaster::open_vrt(xml),
        }
    }
}

/// A raster handle together with the codec guard that must outlive it
pub struct OpenRaster {
    pub raster: GdalRaster,
    _guard: CodecGuard,
}

pub struct Dataset {
    pub driver: Arc<dyn Driver>,
    pub fileinfo: FileInfo,
    /// Every physical file of the product, header first
    pub filelist: Vec<PathBuf>,
    pub metadata: Metadata,
    /// Closed footprint polygon, empty until extracted
    pub extent: Vec<(f64, f64)>,
    pub source: RasterSource,
    /// Vendor-supplied browse image
    pub browse: Option<PathBuf>,
    /// Raster engine drivers to deregister while the raster is open
    pub disabled_codecs: Vec<&'static str>,
}

impl fmt::Debug for Dataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dataset")
            .field("driver", &self.driver.name())
            .field("fileinfo", &self.fileinfo)
            .field("filelist", &self.filelist)
            .field("metadata", &self.metadata)
            .field("extent", &self.extent)
            .field("source", &self.source)
            .field("browse", &self.browse)
            .finish()
    }
}

impl Dataset {
    pub fn new(driver: Arc<dyn Driver>, path: &Path) -> Result<Self> {
        let fileinfo = FileInfo::from_path(path)?;
        let mut metadata = Metadata::default();
        metadata.set("filename", &fileinfo.name);
        metadata.set("filepath", path.display());
        metadata.set("guid", fileinfo.guid);
        metadata.set("filetype", driver.name());
        Ok(Self {
            driver,
            fileinfo,
            filelist: vec![path.to_path_buf()],
            metadata,
            extent: Vec::new(),
            source: RasterSource::File(path.to_path_buf()),
            browse: None,
            disabled_codecs: Vec::new(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.fileinfo.path
    }

    /// Add a file to the file list unless already present
    pub fn add_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        if !self.filelist.contains(&path) {
            self.filelist.push(path);
        }
    }

    pub fn extract(&mut self) -> Result<()> {
        let driver = Arc::clone(&self.driver);
        driver.extract(self)
    }

    pub fn overview(&self, request: &OverviewRequest) -> Result<OverviewOutput> {
        self.driver.overview(self, request)
    }

    /// Open the pixels, with this dataset's codecs disabled while the handle lives
    pub fn open_raster(&self) -> Result<OpenRaster> {
        let guard = CodecGuard::disable(&self.disabled_codecs);
        let raster = self.source.open()?;
        Ok(OpenRaster {
            raster,
            _guard: guard,
        })
    }

    /// Footprint and cell size from an affine geotransform
    pub fn set_geotransform_extent(&mut self, gt: &[f64; 6], cols: usize, rows: usize) {
        let ring = footprint(gt, cols, rows);
        self.set_extent(ring);
        self.metadata.set("cellx", gt[1].abs());
        self.metadata.set("celly", gt[5].abs());
        self.metadata.set("rotation", rotation(gt));
    }

    /// Footprint from corner coordinates UL, UR, LR, LL
    pub fn set_corner_extent(&mut self, corners: [(f64, f64); 4]) {
        self.set_extent(close_ring(corners));
    }

    fn set_extent(&mut self, ring: Vec<(f64, f64)>) {
        for (key, p) in ["ul", "ur", "lr", "ll"].iter().zip(ring.iter()) {
            self.metadata.set(key, format_point(*p));
        }
        self.extent = ring;
    }

    pub fn record(&self) -> MetadataRecord {
        MetadataRecord {
            fields: self.metadata.clone(),
            extent: self.extent.clone(),
            filelist: self.filelist.clone(),
        }
    }
}
