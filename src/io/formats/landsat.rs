//! Landsat Level-1 products described by a `*_MTL.txt` file.
//!
//! The reflective bands are stacked into one raster; panchromatic, thermal
//! and quality files belong to the product but are not part of the stack.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use tracing::debug;

use crate::core::dataset::{Dataset, Driver, FileCandidate, RasterSource};
use crate::core::geometry::{corner_gcps, utm_epsg};
use crate::core::mosaic::{DataType, band_stack, build_vrt};
use crate::core::overview::{OverviewOutput, OverviewRequest};
use crate::error::{Error, Result};
use crate::io::decode::{Group, GroupSyntax, GroupValue, parse_grouped};
use crate::io::formats::default;
use crate::io::gdal::gcps_to_geotransform;
use crate::io::vfs;

pub const PATTERNS: &[&str] = &[r"_mtl\.txt$"];

const BAND_KEY: &str = "FILE_NAME_BAND_";

/// Role of a band file in the product
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BandKind {
    Reflective,
    Panchromatic,
    Thermal,
    Quality,
}

/// Classify a band id (`1`, `8`, `6_VCID_1`, `QUALITY`) for a sensor
pub fn band_kind(sensor: &str, band: &str) -> BandKind {
    let sensor = sensor.to_ascii_uppercase();
    let Ok(number) = band.parse::<u32>() else {
        return if band.starts_with('6') {
            BandKind::Thermal
        } else {
            BandKind::Quality
        };
    };
    match sensor.as_str() {
        "OLI_TIRS" | "OLI" | "TIRS" => match number {
            8 => BandKind::Panchromatic,
            10 | 11 => BandKind::Thermal,
            _ => BandKind::Reflective,
        },
        "ETM" | "ETM+" => match number {
            6 => BandKind::Thermal,
            8 => BandKind::Panchromatic,
            _ => BandKind::Reflective,
        },
        "TM" => match number {
            6 => BandKind::Thermal,
            _ => BandKind::Reflective,
        },
        _ => BandKind::Reflective,
    }
}

/// Scalar fields of a group and all its descendants
fn all_fields(group: &Group) -> Vec<(&str, &str)> {
    let mut out: Vec<(&str, &str)> = group
        .fields
        .iter()
        .filter_map(|(k, v)| match v {
            GroupValue::Scalar(s) => Some((k.as_str(), s.as_str())),
            GroupValue::Array(_) => None,
        })
        .collect();
    for child in &group.groups {
        out.extend(all_fields(child));
    }
    out
}

#[derive(Debug, Clone)]
struct BandFile {
    id: String,
    kind: BandKind,
    path: PathBuf,
}

struct Mtl {
    root: Group,
    sensor: String,
    bands: Vec<BandFile>,
    /// Other files named by the MTL (quality, angle coefficients, ...)
    extras: Vec<PathBuf>,
}

impl Mtl {
    fn read(path: &Path) -> Result<Self> {
        let root = parse_grouped(&vfs::read_to_string(path)?, &GroupSyntax::ODL)?;
        let sensor = root.find("SENSOR_ID").unwrap_or_default().to_string();
        let mut bands = Vec::new();
        let mut extras = Vec::new();
        for (key, value) in all_fields(&root) {
            let Some(rest) = key.strip_prefix("FILE_NAME_") else {
                continue;
            };
            let file = vfs::sibling(path, value);
            match key.strip_prefix(BAND_KEY) {
                Some(id) => bands.push(BandFile {
                    id: id.to_string(),
                    kind: band_kind(&sensor, id),
                    path: file,
                }),
                None => {
                    debug!("MTL companion {} = {}", rest, value);
                    extras.push(file);
                }
            }
        }
        // Numeric band ids in numeric order
        bands.sort_by_key(|b| (b.id.parse::<u32>().unwrap_or(u32::MAX), b.id.clone()));
        Ok(Self {
            root,
            sensor,
            bands,
            extras,
        })
    }

    fn reflective(&self) -> Vec<&BandFile> {
        self.bands
            .iter()
            .filter(|b| b.kind == BandKind::Reflective)
            .collect()
    }

    fn int(&self, key: &str) -> Option<i64> {
        self.root.find_f64(key).map(|v| v as i64)
    }

    fn data_type(&self) -> DataType {
        match self.sensor.to_ascii_uppercase().as_str() {
            "OLI_TIRS" | "OLI" | "TIRS" => DataType::UInt16,
            _ => DataType::Byte,
        }
    }

    /// North-up UTM geotransform from the upper-left pixel centre
    fn utm_geotransform(&self) -> Option<([f64; 6], u32)> {
        if !self.root.find("MAP_PROJECTION")?.eq_ignore_ascii_case("UTM") {
            return None;
        }
        let zone = self.root.find_f64("UTM_ZONE")? as u32;
        let datum = self.root.find("DATUM").unwrap_or("WGS84");
        let epsg = utm_epsg(datum, zone, false)?;
        let cell = self.root.find_f64("GRID_CELL_SIZE_REFLECTIVE")?;
        let x = self.root.find_f64("CORNER_UL_PROJECTION_X_PRODUCT")?;
        let y = self.root.find_f64("CORNER_UL_PROJECTION_Y_PRODUCT")?;
        Some(([x - cell / 2.0, cell, 0.0, y + cell / 2.0, 0.0, -cell], epsg))
    }

    /// UL, UR, LR, LL as (lon, lat)
    fn corners(&self) -> Option<[(f64, f64); 4]> {
        let corner = |c: &str| {
            Some((
                self.root.find_f64(&format!("CORNER_{c}_LON_PRODUCT"))?,
                self.root.find_f64(&format!("CORNER_{c}_LAT_PRODUCT"))?,
            ))
        };
        Some([corner("UL")?, corner("UR")?, corner("LR")?, corner("LL")?])
    }
}

pub struct LandsatDriver;

impl Driver for LandsatDriver {
    fn name(&self) -> &'static str {
        "landsat_mtl"
    }

    fn construct(self: Arc<Self>, candidate: &FileCandidate) -> Result<Option<Dataset>> {
        let mtl = Mtl::read(&candidate.path)?;
        if mtl.bands.is_empty() {
            debug!("{:?} names no band files", candidate.path);
            return Ok(None);
        }
        let mut dataset = Dataset::new(self, &candidate.path)?;
        for band in &mtl.bands {
            dataset.add_file(band.path.clone());
        }
        for extra in mtl.extras {
            dataset.add_file(extra);
        }
        Ok(Some(dataset))
    }

    fn extract(&self, dataset: &mut Dataset) -> Result<()> {
        let path = dataset.path().to_path_buf();
        let mtl = Mtl::read(&path)?;
        let reflective = mtl.reflective();
        if let Some(missing) = reflective.iter().find(|b| !vfs::exists(&b.path)) {
            return Err(Error::MissingFile(missing.path.clone()));
        }
        let cols = mtl
            .int("REFLECTIVE_SAMPLES")
            .ok_or_else(|| Error::missing_field("REFLECTIVE_SAMPLES", &path))?;
        let rows = mtl
            .int("REFLECTIVE_LINES")
            .ok_or_else(|| Error::missing_field("REFLECTIVE_LINES", &path))?;

        let files: Vec<PathBuf> = reflective.iter().map(|b| b.path.clone()).collect();
        let data_type = mtl.data_type();
        let projected = mtl.utm_geotransform();
        let corners = mtl.corners();
        let (gt, srs) = match (projected, corners) {
            (Some((gt, epsg)), _) => (Some(gt), Some(format!("EPSG:{epsg}"))),
            (None, Some(corners)) => (
                gcps_to_geotransform(&corner_gcps(corners, cols as usize, rows as usize)),
                Some("EPSG:4326".to_string()),
            ),
            (None, None) => (None, None),
        };
        let plan = band_stack(&files, cols, rows, data_type)?
            .with_geotransform(gt)
            .with_srs(srs.clone());
        dataset.source = RasterSource::Vrt(build_vrt(&plan)?);

        let root = &mtl.root;
        let m = &mut dataset.metadata;
        m.set_opt("satellite", root.find("SPACECRAFT_ID"));
        m.set("sensor", &mtl.sensor);
        m.set_opt(
            "level",
            root.find("DATA_TYPE").or_else(|| root.find("PROCESSING_LEVEL")),
        );
        if let Some(date) = root
            .find("DATE_ACQUIRED")
            .or_else(|| root.find("ACQUISITION_DATE"))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        {
            m.set("imgdate", date.format("%Y-%m-%d"));
        }
        m.set_opt("cloudcover", root.find_f64("CLOUD_COVER"));
        m.set_opt("sunazimuth", root.find_f64("SUN_AZIMUTH"));
        m.set_opt("sunelevation", root.find_f64("SUN_ELEVATION"));

        let sizes = |kind: &str| (mtl.int(&format!("{kind}_SAMPLES")), mtl.int(&format!("{kind}_LINES")));
        let mut all_cols = Vec::new();
        let mut all_rows = Vec::new();
        for kind in ["REFLECTIVE", "PANCHROMATIC", "THERMAL"] {
            if let (Some(c), Some(r)) = sizes(kind) {
                all_cols.push(c);
                all_rows.push(r);
            }
        }
        m.set_joined("cols", &all_cols);
        m.set_joined("rows", &all_rows);
        m.set("nbands", reflective.len());
        m.set(
            "bands",
            reflective
                .iter()
                .map(|b| b.id.as_str())
                .collect::<Vec<_>>()
                .join(","),
        );
        m.set("datatype", data_type.name());
        m.set("nbits", if data_type == DataType::Byte { 8 } else { 16 });

        match (projected, corners) {
            (Some((gt, _)), _) => dataset.set_geotransform_extent(&gt, cols as usize, rows as usize),
            (None, Some(corners)) => {
                dataset.set_corner_extent(corners);
                if let Some(gt) = gt {
                    dataset.metadata.set("cellx", gt[1].abs());
                    dataset.metadata.set("celly", gt[5].abs());
                }
            }
            (None, None) => debug!("{:?} carries no georeferencing", path),
        }
        if let Some(srs) = &srs {
            default::set_srs(dataset, srs);
        }
        Ok(())
    }

    fn overview(&self, dataset: &Dataset, request: &OverviewRequest) -> Result<OverviewOutput> {
        default::overview(dataset, request)
    }
}
