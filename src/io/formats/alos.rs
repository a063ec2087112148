//! ALOS AVNIR-2 and PRISM products described by a CEOS leader file.
//!
//! The leader (`LED-<scene>`) holds a 720 byte file descriptor followed by a
//! 4680 byte scene record. AVNIR-2 scenes have one image file per band
//! (`IMG-0n-<scene>`) which are stacked; PRISM scenes are split into
//! along-track strips with the same naming that are mosaicked side by side.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::core::dataset::{Dataset, Driver, FileCandidate, RasterSource};
use crate::core::geometry::corner_gcps;
use crate::core::mosaic::{DataType, band_stack, build_vrt, strips};
use crate::core::overview::{OverviewOutput, OverviewRequest};
use crate::error::{Error, Result};
use crate::io::decode::{FieldKind, FieldSpec, FieldValue, FixedRecords, decode_fields};
use crate::io::formats::default;
use crate::io::gdal::gcps_to_geotransform;
use crate::io::vfs;

pub const PATTERNS: &[&str] = &[r"^led-al(av2a|psm)"];

const RECORD_LENGTHS: [usize; 2] = [720, 4680];
/// Columns shared by neighbouring PRISM strips
pub const STRIP_OVERLAP: i64 = 32;
const AVNIR_BANDS: usize = 4;

const SATELLITE: [FieldSpec; 1] = [FieldSpec::mandatory("satellite", 2, 101, 116, FieldKind::Text)];

const SCENE_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("scene_id", 2, 21, 52, FieldKind::Text),
    FieldSpec::optional("imgdate", 2, 69, 76, FieldKind::Date("%Y%m%d")),
    FieldSpec::optional("sensor", 2, 117, 132, FieldKind::Text),
    FieldSpec::optional("level", 2, 133, 148, FieldKind::Text),
    FieldSpec::optional("viewangle", 2, 149, 164, FieldKind::Float),
    FieldSpec::mandatory("cols", 2, 165, 180, FieldKind::Integer),
    FieldSpec::mandatory("rows", 2, 181, 196, FieldKind::Integer),
    FieldSpec::optional("nbands", 2, 197, 212, FieldKind::Integer),
    FieldSpec::mandatory("ul_lat", 2, 213, 228, FieldKind::Float),
    FieldSpec::mandatory("ul_lon", 2, 229, 244, FieldKind::Float),
    FieldSpec::mandatory("ur_lat", 2, 245, 260, FieldKind::Float),
    FieldSpec::mandatory("ur_lon", 2, 261, 276, FieldKind::Float),
    FieldSpec::mandatory("lr_lat", 2, 277, 292, FieldKind::Float),
    FieldSpec::mandatory("lr_lon", 2, 293, 308, FieldKind::Float),
    FieldSpec::mandatory("ll_lat", 2, 309, 324, FieldKind::Float),
    FieldSpec::mandatory("ll_lon", 2, 325, 340, FieldKind::Float),
    FieldSpec::optional("sunelevation", 2, 341, 356, FieldKind::Float),
    FieldSpec::optional("sunazimuth", 2, 357, 372, FieldKind::Float),
    // Cloud cover is graded 0-10
    FieldSpec::optional("cloudcover", 2, 373, 388, FieldKind::Scaled(10.0)),
];

/// Column count of each PRISM strip, blank when the strip is absent
const STRIP_FIELDS: &[FieldSpec] = &[
    FieldSpec::optional("strip1", 2, 393, 408, FieldKind::Integer),
    FieldSpec::optional("strip2", 2, 409, 424, FieldKind::Integer),
    FieldSpec::optional("strip3", 2, 425, 440, FieldKind::Integer),
    FieldSpec::optional("strip4", 2, 441, 456, FieldKind::Integer),
    FieldSpec::optional("strip5", 2, 457, 472, FieldKind::Integer),
    FieldSpec::optional("strip6", 2, 473, 488, FieldKind::Integer),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Instrument {
    Avnir2,
    Prism,
}

struct Leader {
    instrument: Instrument,
    fields: BTreeMap<&'static str, FieldValue>,
    strip_cols: Vec<i64>,
}

impl Leader {
    /// `None` when the leader does not describe an ALOS scene
    fn read(path: &Path, basename: &str) -> Result<Option<Self>> {
        let records = FixedRecords::new(vfs::read(path)?, &RECORD_LENGTHS)?;
        let satellite = decode_fields(&records, &SATELLITE)?;
        if satellite.get("satellite").map(|v| v.to_string()).as_deref() != Some("ALOS") {
            debug!("{:?} is a CEOS leader of another mission", path);
            return Ok(None);
        }
        let fields = decode_fields(&records, SCENE_FIELDS)?;
        let strip_cols = decode_fields(&records, STRIP_FIELDS)?
            .values()
            .filter_map(FieldValue::as_i64)
            .collect();
        let instrument = if basename.starts_with("led-alpsm") {
            Instrument::Prism
        } else {
            Instrument::Avnir2
        };
        Ok(Some(Self {
            instrument,
            fields,
            strip_cols,
        }))
    }

    fn int(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(FieldValue::as_i64)
    }

    fn float(&self, name: &str) -> Option<f64> {
        self.fields.get(name).and_then(FieldValue::as_f64)
    }

    fn corner(&self, prefix: &str) -> Option<(f64, f64)> {
        Some((
            self.float(&format!("{prefix}_lon"))?,
            self.float(&format!("{prefix}_lat"))?,
        ))
    }

    fn image_count(&self) -> usize {
        match self.instrument {
            Instrument::Avnir2 => self
                .int("nbands")
                .filter(|&n| n > 0)
                .map(|n| n as usize)
                .unwrap_or(AVNIR_BANDS),
            Instrument::Prism => self.strip_cols.len().max(1),
        }
    }
}

/// `<scene>` part of `LED-<scene>`
fn scene_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.get(4..).unwrap_or_default().to_string()
}

fn image_paths(leader_path: &Path, scene: &str, count: usize) -> Vec<PathBuf> {
    (1..=count)
        .map(|i| vfs::sibling(leader_path, &format!("IMG-{i:02}-{scene}")))
        .collect()
}

/// Every file of the scene: `VOL-`, `TRL-`, `HDR-`, `SUP-<scene>` and the like
fn scene_files(leader_path: &Path, scene: &str) -> Result<Vec<PathBuf>> {
    let suffix = format!("-{}", scene.to_lowercase());
    let dotted = format!("{suffix}.");
    Ok(vfs::siblings(leader_path)?
        .into_iter()
        .filter(|p| {
            let name = vfs::basename_lower(p);
            name.ends_with(&suffix) || name.contains(&dotted)
        })
        .collect())
}

pub struct AlosDriver;

impl Driver for AlosDriver {
    fn name(&self) -> &'static str {
        "alos"
    }

    fn construct(self: Arc<Self>, candidate: &FileCandidate) -> Result<Option<Dataset>> {
        let Some(leader) = Leader::read(&candidate.path, &candidate.basename)? else {
            return Ok(None);
        };
        let scene = scene_name(&candidate.path);
        let mut dataset = Dataset::new(self, &candidate.path)?;
        for image in image_paths(&candidate.path, &scene, leader.image_count()) {
            dataset.add_file(image);
        }
        let browse = vfs::sibling(&candidate.path, &format!("BRS-{scene}.jpg"));
        if vfs::exists(&browse) {
            dataset.add_file(browse.clone());
            dataset.browse = Some(browse);
        }
        for file in scene_files(&candidate.path, &scene)? {
            dataset.add_file(file);
        }
        Ok(Some(dataset))
    }

    fn extract(&self, dataset: &mut Dataset) -> Result<()> {
        let path = dataset.path().to_path_buf();
        let basename = vfs::basename_lower(&path);
        let leader = Leader::read(&path, &basename)?
            .ok_or_else(|| Error::UnsupportedFormat(format!("{path:?} is not an ALOS leader")))?;
        let images = image_paths(&path, &scene_name(&path), leader.image_count());
        if let Some(missing) = images.iter().find(|p| !vfs::exists(p)) {
            return Err(Error::MissingFile(missing.clone()));
        }

        let cols = leader
            .int("cols")
            .ok_or_else(|| Error::missing_field("cols", &path))?;
        let rows = leader
            .int("rows")
            .ok_or_else(|| Error::missing_field("rows", &path))?;
        let plan = match leader.instrument {
            Instrument::Avnir2 => band_stack(&images, cols, rows, DataType::Byte)?,
            Instrument::Prism => {
                let widths = if leader.strip_cols.is_empty() {
                    vec![cols]
                } else {
                    leader.strip_cols.clone()
                };
                strips(&images, &widths, rows, STRIP_OVERLAP, 1, DataType::Byte)?
            }
        };

        let corners = ["ul", "ur", "lr", "ll"]
            .iter()
            .map(|c| {
                leader
                    .corner(c)
                    .ok_or_else(|| Error::missing_field(format!("{c} corner"), &path))
            })
            .collect::<Result<Vec<_>>>()?;
        let corners = [corners[0], corners[1], corners[2], corners[3]];
        let (width, height) = (plan.width as usize, plan.height as usize);
        let gt = gcps_to_geotransform(&corner_gcps(corners, width, height));
        let plan = plan
            .with_geotransform(gt)
            .with_srs(Some("EPSG:4326".to_string()));

        let m = &mut dataset.metadata;
        m.set("satellite", "ALOS");
        m.set(
            "sensor",
            leader
                .fields
                .get("sensor")
                .map(|v| v.to_string())
                .unwrap_or_else(|| match leader.instrument {
                    Instrument::Avnir2 => "AVNIR-2".to_string(),
                    Instrument::Prism => "PRISM".to_string(),
                }),
        );
        for key in ["level", "imgdate", "viewangle", "sunelevation", "sunazimuth", "cloudcover"] {
            m.set_opt(key, leader.fields.get(key));
        }
        m.set("cols", width);
        m.set("rows", height);
        m.set("nbands", plan.band_count);
        m.set(
            "bands",
            (1..=plan.band_count)
                .map(|b| b.to_string())
                .collect::<Vec<_>>()
                .join(","),
        );
        m.set("datatype", plan.data_type.name());
        m.set("nbits", 8);
        default::set_srs(dataset, "EPSG:4326");
        if let Some(gt) = gt {
            dataset.metadata.set("cellx", gt[1].abs());
            dataset.metadata.set("celly", gt[5].abs());
        }
        dataset.set_corner_extent(corners);
        dataset.source = RasterSource::Vrt(build_vrt(&plan)?);
        Ok(())
    }

    fn overview(&self, dataset: &Dataset, request: &OverviewRequest) -> Result<OverviewOutput> {
        default::overview(dataset, request)
    }
}
