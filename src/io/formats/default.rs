//! Generic driver for anything the raster engine opens by itself.
//!
//! Its building blocks are free functions so that specialized drivers can
//! reuse them explicitly: [`describe_raster`] for size/type fields,
//! [`apply_georeferencing`] for footprint and SRS, [`sidecar_files`] and
//! [`overview`].
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDateTime;
use tracing::debug;

use crate::core::dataset::{Dataset, Driver, FileCandidate, RasterSource};
use crate::core::overview::{OverviewOutput, OverviewRequest, render};
use crate::core::registry::SIDECAR_SUFFIXES;
use crate::error::Result;
use crate::io::gdal::{GdalMetadata, GdalRaster, gcps_to_geotransform};
use crate::io::vfs;

pub struct DefaultDriver;

/// EPSG code out of an `EPSG:xxxx` projection string
pub fn epsg_code(srs: &str) -> Option<u32> {
    srs.strip_prefix("EPSG:").and_then(|c| c.parse().ok())
}

/// Set `srs` and `epsg` from a projection string
pub fn set_srs(dataset: &mut Dataset, srs: &str) {
    if srs.is_empty() {
        return;
    }
    dataset.metadata.set("srs", srs);
    dataset.metadata.set_opt("epsg", epsg_code(srs));
}

/// Size, band and pixel type fields from the raster engine
pub fn describe_raster(dataset: &mut Dataset, md: &GdalMetadata) {
    let m = &mut dataset.metadata;
    m.set("cols", md.size_x);
    m.set("rows", md.size_y);
    m.set("nbands", md.bands);
    m.set(
        "bands",
        (1..=md.bands).map(|b| b.to_string()).collect::<Vec<_>>().join(","),
    );
    m.set_joined("datatype", &md.band_types);
    m.set_opt("nbits", md.nbits);
    m.set_opt("nodata", md.nodata);
    m.set_opt("compression", md.compression.as_deref());
    if !md.subdatasets.is_empty() {
        m.set(
            "subdatasets",
            md.subdatasets
                .iter()
                .map(|(name, _)| name.as_str())
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    if let Some(date) = md
        .metadata
        .get("TIFFTAG_DATETIME")
        .and_then(|v| NaiveDateTime::parse_from_str(v.trim(), "%Y:%m:%d %H:%M:%S").ok())
    {
        m.set("imgdate", date.format("%Y-%m-%d"));
    }
}

/// Footprint and SRS from the geotransform, or from GCPs when there is none
pub fn apply_georeferencing(dataset: &mut Dataset, md: &GdalMetadata) {
    if let Some(gt) = md.geotransform {
        dataset.set_geotransform_extent(&gt, md.size_x, md.size_y);
        set_srs(dataset, &md.projection);
        return;
    }
    if let Some(gt) = gcps_to_geotransform(&md.gcps) {
        debug!("Solved geotransform from {} GCPs", md.gcps.len());
        dataset.set_geotransform_extent(&gt, md.size_x, md.size_y);
        if let Some(srs) = &md.gcp_projection {
            set_srs(dataset, srs);
        }
    }
}

/// Existing `<name><suffix>` and `<stem><suffix>` sidecars of a raster
pub fn sidecar_files(path: &Path) -> Result<Vec<PathBuf>> {
    let name = vfs::basename_lower(path);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    let wanted: HashSet<String> = [name.as_str(), stem.as_str()]
        .iter()
        .flat_map(|base| SIDECAR_SUFFIXES.iter().map(move |s| format!("{base}{s}")))
        .filter(|n| *n != name)
        .collect();
    Ok(vfs::siblings(path)?
        .into_iter()
        .filter(|p| wanted.contains(&vfs::basename_lower(p)))
        .collect())
}

/// Preview through the generic pipeline
pub fn overview(dataset: &Dataset, request: &OverviewRequest) -> Result<OverviewOutput> {
    render(dataset, request)
}

fn open(path: &Path) -> Result<GdalRaster> {
    Ok(GdalRaster::open(path)?)
}

impl Driver for DefaultDriver {
    fn name(&self) -> &'static str {
        "default"
    }

    fn construct(self: Arc<Self>, candidate: &FileCandidate) -> Result<Option<Dataset>> {
        let raster = open(&candidate.path)?;
        let mut dataset = Dataset::new(self, &candidate.path)?;
        for file in &raster.metadata.file_list {
            dataset.add_file(file.clone());
        }
        for file in sidecar_files(&candidate.path)? {
            dataset.add_file(file);
        }
        Ok(Some(dataset))
    }

    fn extract(&self, dataset: &mut Dataset) -> Result<()> {
        let open = dataset.open_raster()?;
        let mut md = open.raster.metadata.clone();
        drop(open);

        if md.bands == 0 {
            if let Some((name, _)) = md.subdatasets.first().cloned() {
                debug!("Describing first subdataset {}", name);
                let subdatasets = md.subdatasets.clone();
                dataset.source = RasterSource::Subdataset(name);
                md = dataset.open_raster()?.raster.metadata.clone();
                md.subdatasets = subdatasets;
            }
        }

        dataset.metadata.set("filetype", &md.driver);
        describe_raster(dataset, &md);
        apply_georeferencing(dataset, &md);
        Ok(())
    }

    fn overview(&self, dataset: &Dataset, request: &OverviewRequest) -> Result<OverviewOutput> {
        overview(dataset, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::overview::OverviewTarget;
    use crate::testutil::{write_test_tiff, write_test_tiff_bands};
    use crate::types::OutputFormat;

    fn extracted(path: &Path) -> Dataset {
        let driver = Arc::new(DefaultDriver);
        let mut ds = driver
            .construct(&FileCandidate::new(path))
            .unwrap()
            .unwrap();
        ds.extract().unwrap();
        ds
    }

    #[test]
    fn extracts_size_type_and_footprint() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scene.tif");
        write_test_tiff(&path, 40, 20, [500000.0, 30.0, 0.0, 7000000.0, 0.0, -30.0]);
        let ds = extracted(&path);
        let m = &ds.metadata;
        assert_eq!(m.get("filetype"), Some("GTiff"));
        assert_eq!(m.get("cols"), Some("40"));
        assert_eq!(m.get("rows"), Some("20"));
        assert_eq!(m.get("nbands"), Some("1"));
        assert_eq!(m.get("datatype"), Some("Byte"));
        assert_eq!(m.get("epsg"), Some("32755"));
        assert_eq!(m.get("ul"), Some("500000,7000000"));
        assert_eq!(m.get("lr"), Some("501200,6999400"));
        assert_eq!(m.get("cellx"), Some("30"));
        assert_eq!(ds.extent.len(), 5);
        assert!(ds.filelist.contains(&path));
    }

    #[test]
    fn sidecars_join_the_file_list() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scene.tif");
        write_test_tiff(&path, 8, 8, [0.0, 1.0, 0.0, 8.0, 0.0, -1.0]);
        let aux = tmp.path().join("scene.tif.aux.xml");
        std::fs::write(&aux, "<PAMDataset></PAMDataset>").unwrap();
        let ds = extracted(&path);
        assert!(ds.filelist.contains(&aux), "{:?}", ds.filelist);
    }

    #[test]
    fn world_file_and_prj_are_claimed() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("scene.tif");
        write_test_tiff(&path, 8, 8, [0.0, 1.0, 0.0, 8.0, 0.0, -1.0]);
        std::fs::write(tmp.path().join("scene.tfw"), "1\n0\n0\n-1\n0.5\n7.5\n").unwrap();
        std::fs::write(tmp.path().join("SCENE.PRJ"), "EPSG:32755").unwrap();
        std::fs::write(tmp.path().join("scenery.tfw"), "1").unwrap();
        let found = sidecar_files(&path).unwrap();
        assert_eq!(
            found,
            vec![tmp.path().join("SCENE.PRJ"), tmp.path().join("scene.tfw")]
        );
    }

    #[test]
    fn unreadable_file_fails_construction() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("notes.txt");
        std::fs::write(&path, "not a raster").unwrap();
        let driver = Arc::new(DefaultDriver);
        assert!(driver.construct(&FileCandidate::new(&path)).is_err());
    }

    #[test]
    fn renders_rgb_preview_to_memory_and_disk() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("rgb.tif");
        write_test_tiff_bands(&path, 64, 32, 3, [0.0, 1.0, 0.0, 32.0, 0.0, -1.0], None);
        let ds = extracted(&path);

        let memory = ds
            .overview(&OverviewRequest {
                width: 16,
                format: OutputFormat::Jpeg,
                target: OverviewTarget::Memory,
            })
            .unwrap();
        match memory {
            OverviewOutput::Bytes { data, width, height, .. } => {
                assert_eq!((width, height), (16, 8));
                assert_eq!(&data[..2], &[0xFF, 0xD8]);
            }
            other => panic!("unexpected {other:?}"),
        }

        let out_dir = tmp.path().join("previews");
        let written = ds
            .overview(&OverviewRequest {
                width: 16,
                format: OutputFormat::Tiff,
                target: OverviewTarget::Directory(out_dir.clone()),
            })
            .unwrap();
        assert_eq!(
            written,
            OverviewOutput::Written {
                path: out_dir.join("rgb.tif.tif"),
                world_file: Some(out_dir.join("rgb.tif.tfw")),
            }
        );
        assert!(out_dir.join("rgb.tif.tif").is_file());
    }
}
