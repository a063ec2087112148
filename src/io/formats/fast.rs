//! EOSAT / USGS FAST format: a `HEADER.DAT` (or `*_H??.FST`) header of three
//! 1536 byte records (administrative, radiometric, geometric) next to raw band
//! files. The raster engine reads the bands through the header itself.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::core::dataset::{Dataset, Driver, FileCandidate};
use crate::core::geometry::{corner_gcps, utm_epsg};
use crate::core::mosaic::DataType;
use crate::core::overview::{OverviewOutput, OverviewRequest};
use crate::error::{Error, Result};
use crate::io::decode::{FieldKind, FieldSpec, FieldValue, FixedRecords, decode_fields};
use crate::io::formats::default;
use crate::io::gdal::gcps_to_geotransform;
use crate::io::vfs;

pub const PATTERNS: &[&str] = &[r"^header\.dat$", r"_h(pn|rf|tm)\.fst$"];

const RECORD_LENGTHS: [usize; 3] = [1536, 1536, 1536];
const MAX_BAND_FILES: usize = 6;
const LON_TEMPLATE: &str = "DDDMMSSSSSSSH";
const LAT_TEMPLATE: &str = "DDMMSSSSSSSH";

const ADMIN_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("product_id", 1, 10, 29, FieldKind::Text),
    FieldSpec::optional("location", 1, 36, 52, FieldKind::Text),
    FieldSpec::optional("imgdate", 1, 71, 78, FieldKind::Date("%Y%m%d")),
    FieldSpec::mandatory("satellite", 1, 93, 102, FieldKind::Text),
    FieldSpec::optional("sensor", 1, 112, 121, FieldKind::Text),
    FieldSpec::optional("level", 1, 131, 140, FieldKind::Text),
    FieldSpec::mandatory("cols", 1, 201, 215, FieldKind::Integer),
    FieldSpec::mandatory("rows", 1, 216, 230, FieldKind::Integer),
    FieldSpec::optional("nbits", 1, 231, 232, FieldKind::Integer),
    FieldSpec::optional("bands_present", 1, 241, 246, FieldKind::Text),
    FieldSpec::optional("sunelevation", 2, 11, 14, FieldKind::Float),
    FieldSpec::optional("sunazimuth", 2, 21, 25, FieldKind::Float),
];

const GEOMETRY_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("projection", 3, 11, 14, FieldKind::Text),
    FieldSpec::optional("ellipsoid", 3, 30, 47, FieldKind::Text),
    FieldSpec::optional("datum", 3, 54, 59, FieldKind::Text),
    FieldSpec::optional("zone", 3, 61, 66, FieldKind::Integer),
    FieldSpec::optional("cellsize", 3, 361, 366, FieldKind::Float),
];

/// Window of the n-th (0-based) band file name in the administrative record
const fn filename_field(name: &'static str, n: usize) -> FieldSpec {
    FieldSpec::optional(name, 1, 301 + n * 30, 329 + n * 30, FieldKind::Text)
}

const FILENAME_FIELDS: [FieldSpec; MAX_BAND_FILES] = [
    filename_field("file1", 0),
    filename_field("file2", 1),
    filename_field("file3", 2),
    filename_field("file4", 3),
    filename_field("file5", 4),
    filename_field("file6", 5),
];

/// Geographic and projected coordinates of one corner in the geometric record
const fn corner_fields(
    lon: &'static str,
    lat: &'static str,
    x: &'static str,
    y: &'static str,
    n: usize,
) -> [FieldSpec; 4] {
    let base = 101 + n * 60;
    [
        FieldSpec::mandatory(lon, 3, base, base + 12, FieldKind::Sexagesimal(LON_TEMPLATE)),
        FieldSpec::mandatory(lat, 3, base + 14, base + 25, FieldKind::Sexagesimal(LAT_TEMPLATE)),
        FieldSpec::optional(x, 3, base + 27, base + 39, FieldKind::Float),
        FieldSpec::optional(y, 3, base + 41, base + 53, FieldKind::Float),
    ]
}

const CORNERS: [[FieldSpec; 4]; 4] = [
    corner_fields("ul_lon", "ul_lat", "ul_x", "ul_y", 0),
    corner_fields("ur_lon", "ur_lat", "ur_x", "ur_y", 1),
    corner_fields("lr_lon", "lr_lat", "lr_x", "lr_y", 2),
    corner_fields("ll_lon", "ll_lat", "ll_x", "ll_y", 3),
];

struct Header {
    fields: BTreeMap<&'static str, FieldValue>,
    band_files: Vec<String>,
}

impl Header {
    fn read(path: &Path) -> Result<Self> {
        let records = FixedRecords::new(vfs::read(path)?, &RECORD_LENGTHS)?;
        let mut fields = decode_fields(&records, ADMIN_FIELDS)?;
        fields.extend(decode_fields(&records, GEOMETRY_FIELDS)?);
        for corner in &CORNERS {
            fields.extend(decode_fields(&records, corner)?);
        }
        let band_files = decode_fields(&records, &FILENAME_FIELDS)?
            .into_values()
            .map(|v| v.to_string())
            .collect();
        Ok(Self { fields, band_files })
    }

    fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| v.to_string())
    }

    fn float(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_f64)
    }

    fn int(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_i64)
    }

    fn corners(&self, x: &str, y: &str) -> Option<[(f64, f64); 4]> {
        let corner = |c: &str| {
            Some((
                self.float(&format!("{c}_{x}"))?,
                self.float(&format!("{c}_{y}"))?,
            ))
        };
        Some([corner("ul")?, corner("ur")?, corner("lr")?, corner("ll")?])
    }

    fn geographic_corners(&self) -> Option<[(f64, f64); 4]> {
        self.corners("lon", "lat")
    }

    fn projected_corners(&self) -> Option<[(f64, f64); 4]> {
        self.corners("x", "y")
    }

    /// EPSG code of the UTM zone the projected corners are in
    fn utm_epsg(&self) -> Option<u32> {
        if !self.text("projection")?.eq_ignore_ascii_case("UTM") {
            return None;
        }
        let zone = self.int("zone")? as u32;
        let datum = self
            .text("datum")
            .or_else(|| self.text("ellipsoid"))
            .unwrap_or_else(|| "WGS84".to_string());
        let south = self.float("ul_lat")? < 0.0;
        utm_epsg(&datum, zone, south)
    }

    fn band_paths(&self, header: &Path) -> Vec<PathBuf> {
        self.band_files
            .iter()
            .map(|name| vfs::sibling(header, name))
            .collect()
    }
}

pub struct FastDriver;

impl Driver for FastDriver {
    fn name(&self) -> &'static str {
        "fast"
    }

    fn construct(self: Arc<Self>, candidate: &FileCandidate) -> Result<Option<Dataset>> {
        let header = Header::read(&candidate.path)?;
        let mut dataset = Dataset::new(self, &candidate.path)?;
        for band in header.band_paths(&candidate.path) {
            dataset.add_file(band);
        }
        Ok(Some(dataset))
    }

    fn extract(&self, dataset: &mut Dataset) -> Result<()> {
        let path = dataset.path().to_path_buf();
        let header = Header::read(&path)?;
        let bands = header.band_paths(&path);
        if bands.is_empty() {
            return Err(Error::missing_field("band file names", &path));
        }
        if let Some(missing) = bands.iter().find(|p| !vfs::exists(p)) {
            return Err(Error::MissingFile(missing.clone()));
        }

        let cols = header
            .int("cols")
            .ok_or_else(|| Error::missing_field("cols", &path))? as usize;
        let rows = header
            .int("rows")
            .ok_or_else(|| Error::missing_field("rows", &path))? as usize;
        let nbits = header.int("nbits").map(|b| b as u32).unwrap_or(8);

        let m = &mut dataset.metadata;
        for key in ["satellite", "sensor", "level", "imgdate", "sunelevation", "sunazimuth"] {
            m.set_opt(key, header.fields.get(key));
        }
        m.set("cols", cols);
        m.set("rows", rows);
        m.set("nbands", bands.len());
        match header.text("bands_present") {
            Some(present) => m.set(
                "bands",
                present
                    .chars()
                    .map(|c| c.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
            None => m.set(
                "bands",
                (1..=bands.len())
                    .map(|b| b.to_string())
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
        m.set("datatype", DataType::from_bits(nbits).name());
        m.set("nbits", nbits);

        match (header.utm_epsg(), header.projected_corners()) {
            (Some(epsg), Some(corners)) => {
                debug!("{:?} is in EPSG:{}", path, epsg);
                dataset.set_corner_extent(corners);
                if let Some(gt) = gcps_to_geotransform(&corner_gcps(corners, cols, rows)) {
                    dataset.metadata.set("cellx", gt[1].abs());
                    dataset.metadata.set("celly", gt[5].abs());
                }
                default::set_srs(dataset, &format!("EPSG:{epsg}"));
            }
            _ => {
                let corners = header
                    .geographic_corners()
                    .ok_or_else(|| Error::missing_field("corner coordinates", &path))?;
                dataset.set_corner_extent(corners);
                default::set_srs(dataset, "EPSG:4326");
            }
        }
        dataset.metadata.set_opt("cellx", header.float("cellsize"));
        dataset.metadata.set_opt("celly", header.float("cellsize"));
        Ok(())
    }

    fn overview(&self, dataset: &Dataset, request: &OverviewRequest) -> Result<OverviewOutput> {
        default::overview(dataset, request)
    }
}
