//! Adapter over the GDAL raster engine.
//!
//! Everything the crate asks of GDAL goes through here: opening by path or by
//! VRT XML, reading dataset/band metadata, subdatasets, ground control points
//! and file lists, reading resampled bands for previews, and temporarily
//! deregistering codecs with [`CodecGuard`].
use std::collections::BTreeMap;
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};

use gdal::raster::ResampleAlg;
use gdal::{Dataset, Metadata, errors::GdalError as GdalCrateError};
use ndarray::Array2;
use thiserror::Error;
use tracing::debug;

use crate::core::geometry::Gcp;

/// Errors encountered when using the raster engine
#[derive(Debug, Error)]
pub enum GdalError {
    #[error("GDAL error: {0}")]
    Gdal(#[from] GdalCrateError),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
    #[error("Dimension mismatch: expected {0}x{1}, got {2}x{3}")]
    DimensionMismatch(usize, usize, usize, usize),
}

/// Metadata read from a GDAL-supported dataset
#[derive(Debug, Clone, Default)]
pub struct GdalMetadata {
    /// Short name of the GDAL driver that opened the dataset
    pub driver: String,
    /// Width (pixels) of the raster
    pub size_x: usize,
    /// Height (lines) of the raster
    pub size_y: usize,
    /// Number of raster bands
    pub bands: usize,
    /// Affine geotransform, `None` when the dataset has none
    pub geotransform: Option<[f64; 6]>,
    /// Projection as `EPSG:xxxx` when an authority code is present, else WKT
    pub projection: String,
    /// Data type name per band
    pub band_types: Vec<String>,
    /// Bits per sample of band 1 (NBITS when set, else the type size)
    pub nbits: Option<u32>,
    /// No-data value of band 1
    pub nodata: Option<f64>,
    /// Compression reported in the IMAGE_STRUCTURE domain
    pub compression: Option<String>,
    /// Ground control points and their projection
    pub gcps: Vec<Gcp>,
    pub gcp_projection: Option<String>,
    /// (name, description) pairs from the SUBDATASETS domain
    pub subdatasets: Vec<(String, String)>,
    /// Additional metadata key-value pairs (domain "")
    pub metadata: BTreeMap<String, String>,
    /// Files GDAL considers part of the dataset (raster, sidecars, overviews)
    pub file_list: Vec<PathBuf>,
}

/// An open raster plus the metadata read when it was opened
pub struct GdalRaster {
    pub dataset: Dataset,
    pub metadata: GdalMetadata,
}

// Helper to extract EPSG code from WKT authority tag
pub fn parse_epsg(wkt: &str) -> Option<String> {
    const KEY: &str = "AUTHORITY[\"EPSG\",\"";
    if let Some(idx) = wkt.rfind(KEY) {
        let start = idx + KEY.len();
        if let Some(end) = wkt[start..].find('"') {
            let code = &wkt[start..start + end];
            return Some(format!("EPSG:{}", code));
        }
    }
    // WKT2 style: ID["EPSG",4326]
    const KEY2: &str = "ID[\"EPSG\",";
    if let Some(idx) = wkt.rfind(KEY2) {
        let start = idx + KEY2.len();
        if let Some(end) = wkt[start..].find(']') {
            let code = wkt[start..start + end].trim();
            if code.chars().all(|c| c.is_ascii_digit()) && !code.is_empty() {
                return Some(format!("EPSG:{}", code));
            }
        }
    }
    None
}

fn normalize_projection(proj: String) -> String {
    if proj.starts_with("EPSG:") {
        proj
    } else if let Some(code) = parse_epsg(&proj) {
        code
    } else {
        proj
    }
}

fn split_metadata(entries: Option<Vec<String>>) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for entry in entries.unwrap_or_default() {
        if let Some((key, val)) = entry.split_once('=') {
            map.insert(key.to_string(), val.to_string());
        }
    }
    map
}

/// Files GDAL reports as belonging to the open dataset
pub fn file_list(dataset: &Dataset) -> Vec<PathBuf> {
    let mut out = Vec::new();
    unsafe {
        let list = gdal_sys::GDALGetFileList(dataset.c_dataset());
        if list.is_null() {
            return out;
        }
        let mut i = 0;
        loop {
            let item = *list.add(i);
            if item.is_null() {
                break;
            }
            out.push(PathBuf::from(CStr::from_ptr(item).to_string_lossy().into_owned()));
            i += 1;
        }
        gdal_sys::CSLDestroy(list);
    }
    out
}

/// Ground control points attached to the dataset
pub fn read_gcps(dataset: &Dataset) -> Vec<Gcp> {
    let mut out = Vec::new();
    unsafe {
        let handle = dataset.c_dataset();
        let count = gdal_sys::GDALGetGCPCount(handle);
        let gcps = gdal_sys::GDALGetGCPs(handle);
        if count <= 0 || gcps.is_null() {
            return out;
        }
        for i in 0..count as usize {
            let g = &*gcps.add(i);
            out.push(Gcp {
                pixel: g.dfGCPPixel,
                line: g.dfGCPLine,
                x: g.dfGCPX,
                y: g.dfGCPY,
            });
        }
    }
    out
}

/// Least-squares affine geotransform through GDAL's GCP fit.
///
/// Needs at least three points that are not collinear in pixel space.
pub fn gcps_to_geotransform(gcps: &[Gcp]) -> Option<[f64; 6]> {
    if gcps.len() < 3 {
        return None;
    }
    let raw: Vec<gdal_sys::GDAL_GCP> = gcps
        .iter()
        .map(|g| gdal_sys::GDAL_GCP {
            pszId: c"".as_ptr() as *mut _,
            pszInfo: c"".as_ptr() as *mut _,
            dfGCPPixel: g.pixel,
            dfGCPLine: g.line,
            dfGCPX: g.x,
            dfGCPY: g.y,
            dfGCPZ: 0.0,
        })
        .collect();
    let mut gt = [0.0; 6];
    let ok = unsafe {
        gdal_sys::GDALGCPsToGeoTransform(raw.len() as i32, raw.as_ptr(), gt.as_mut_ptr(), 1)
    };
    (ok != 0 && gt.iter().all(|v| v.is_finite())).then_some(gt)
}

fn subdatasets(dataset: &Dataset) -> Vec<(String, String)> {
    let entries = split_metadata(dataset.metadata_domain("SUBDATASETS"));
    let mut out = Vec::new();
    let mut i = 1;
    while let Some(name) = entries.get(&format!("SUBDATASET_{}_NAME", i)) {
        let desc = entries
            .get(&format!("SUBDATASET_{}_DESC", i))
            .cloned()
            .unwrap_or_default();
        out.push((name.clone(), desc));
        i += 1;
    }
    out
}

impl GdalRaster {
    /// Open any GDAL-supported dataset (GeoTIFF, NITF, HDF, VRT, /vsizip/ paths...)
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, GdalError> {
        let dataset = Dataset::open(path.as_ref())?;
        Self::from_dataset(dataset)
    }

    /// Open a virtual raster from its XML description
    pub fn open_vrt(xml: &str) -> Result<Self, GdalError> {
        let dataset = Dataset::open(Path::new(xml))?;
        Self::from_dataset(dataset)
    }

    fn from_dataset(dataset: Dataset) -> Result<Self, GdalError> {
        let (size_x, size_y) = dataset.raster_size();
        let bands = dataset.raster_count() as usize;
        let subdatasets = subdatasets(&dataset);
        if bands == 0 && subdatasets.is_empty() {
            return Err(GdalError::UnsupportedFormat("No raster bands found".into()));
        }

        let geotransform = dataset.geo_transform().ok();
        let projection = normalize_projection(dataset.projection());
        let gcp_projection = dataset
            .gcp_projection()
            .filter(|p| !p.is_empty())
            .map(normalize_projection);

        let mut band_types = Vec::with_capacity(bands);
        let mut nbits = None;
        let mut nodata = None;
        for idx in 1..=bands {
            let band = dataset.rasterband(idx)?;
            let dtype = band.band_type();
            band_types.push(dtype.name());
            if idx == 1 {
                nodata = band.no_data_value();
                nbits = band
                    .metadata_item("NBITS", "IMAGE_STRUCTURE")
                    .and_then(|v| v.parse().ok())
                    .or(Some(u32::from(dtype.bits())));
            }
        }

        let metadata = GdalMetadata {
            driver: dataset.driver().short_name(),
            size_x,
            size_y,
            bands,
            geotransform,
            projection,
            band_types,
            nbits,
            nodata,
            compression: dataset.metadata_item("COMPRESSION", "IMAGE_STRUCTURE"),
            gcps: read_gcps(&dataset),
            gcp_projection,
            subdatasets,
            metadata: split_metadata(dataset.metadata_domain("")),
            file_list: file_list(&dataset),
        };
        debug!(
            "Opened {} raster {}x{}x{}",
            metadata.driver, metadata.size_x, metadata.size_y, metadata.bands
        );
        Ok(GdalRaster { dataset, metadata })
    }

    /// Read a band (1-based index) resampled to `out_size` (cols, rows) as an
    /// f64 ndarray of shape (rows, cols). The raster engine does the resampling.
    pub fn read_band(
        &self,
        index: usize,
        out_size: (usize, usize),
        e_resample_alg: Option<ResampleAlg>,
    ) -> Result<Array2<f64>, GdalError> {
        if index == 0 || index > self.metadata.bands {
            return Err(GdalError::UnsupportedFormat(format!(
                "Band index {} out of range",
                index
            )));
        }
        let band = self.dataset.rasterband(index)?;
        let window = (self.metadata.size_x, self.metadata.size_y);
        let buf = band.read_as::<f64>((0, 0), window, out_size, e_resample_alg)?;
        let data_vec = buf.data().to_vec();
        let (cols, rows) = out_size;
        let array = Array2::from_shape_vec((rows, cols), data_vec).map_err(|_| {
            GdalError::DimensionMismatch(cols, rows, self.metadata.size_x, self.metadata.size_y)
        })?;
        Ok(array)
    }

    /// No-data value of a band, if any
    pub fn band_nodata(&self, index: usize) -> Option<f64> {
        self.dataset
            .rasterband(index)
            .ok()
            .and_then(|b| b.no_data_value())
    }
}

/// Scoped deregistration of GDAL drivers.
///
/// The driver table is process-wide, so every driver removed here is
/// registered again when the guard is dropped, on every exit path including
/// unwinding.
pub struct CodecGuard {
    removed: Vec<(String, gdal_sys::GDALDriverH)>,
}

impl CodecGuard {
    /// Deregister each named driver that is currently registered
    pub fn disable(names: &[&str]) -> Self {
        let mut removed = Vec::new();
        for name in names {
            let Ok(cname) = CString::new(*name) else {
                continue;
            };
            let handle = unsafe { gdal_sys::GDALGetDriverByName(cname.as_ptr()) };
            if handle.is_null() {
                continue;
            }
            unsafe {
                gdal_sys::GDALDeregisterDriver(handle);
            }
            debug!("Disabled GDAL driver {}", name);
            removed.push((name.to_string(), handle));
        }
        Self { removed }
    }

    /// Names of the drivers this guard deregistered
    pub fn disabled(&self) -> Vec<&str> {
        self.removed.iter().map(|(n, _)| n.as_str()).collect()
    }
}

impl Drop for CodecGuard {
    fn drop(&mut self) {
        for (name, handle) in self.removed.drain(..).rev() {
            unsafe {
                gdal_sys::GDALRegisterDriver(handle);
            }
            debug!("Restored GDAL driver {}", name);
        }
    }
}

/// Run `f` with the named drivers deregistered
pub fn with_codecs_disabled<T>(names: &[&str], f: impl FnOnce() -> T) -> T {
    let _guard = CodecGuard::disable(names);
    f()
}
