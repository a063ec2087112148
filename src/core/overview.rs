//! Preview generation.
//!
//! Source selection (vendor browse image or the raster itself), band choice,
//! reduced-resolution read through the raster engine, Lanczos resize, 2-98 %
//! percentile stretch and encoding. Images written to disk get a world file and
//! a `.prj` when the dataset footprint is known.
use std::path::{Path, PathBuf};

use fast_image_resize::{FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer, images::Image};
use gdal::raster::ResampleAlg;
use ndarray::Array2;
use tracing::{debug, info, warn};

use crate::core::dataset::Dataset;
use crate::error::{Error, Result};
use crate::io::gdal::GdalRaster;
use crate::io::vfs;
use crate::io::writers::jpeg::encode_jpeg;
use crate::io::writers::tiff::encode_tiff;
use crate::io::writers::worldfile::{write_prj_file, write_world_file};
use crate::types::OutputFormat;

const LOW_PERCENTILE: f64 = 0.02;
const HIGH_PERCENTILE: f64 = 0.98;

/// Where a preview goes
#[derive(Debug, Clone, PartialEq)]
pub enum OverviewTarget {
    /// Written as `<dataset file name>.<ext>` inside the directory
    Directory(PathBuf),
    Memory,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverviewRequest {
    pub width: usize,
    pub format: OutputFormat,
    pub target: OverviewTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OverviewOutput {
    Written {
        path: PathBuf,
        world_file: Option<PathBuf>,
    },
    Bytes {
        data: Vec<u8>,
        width: usize,
        height: usize,
        format: OutputFormat,
    },
}

/// Stretched 8-bit bands ready for encoding
#[derive(Debug, Clone)]
pub struct Preview {
    pub cols: usize,
    pub rows: usize,
    pub bands: Vec<Vec<u8>>,
}

/// Bands shown in a preview: 3-2-1 as RGB when available, else band 1
pub fn choose_bands(count: usize) -> Vec<usize> {
    if count >= 3 { vec![3, 2, 1] } else { vec![1] }
}

/// Preview size for a target width, keeping the aspect ratio.
/// Rasters narrower than the target keep their size.
pub fn calculate_resize_dimensions(
    original_cols: usize,
    original_rows: usize,
    target_width: usize,
) -> (usize, usize) {
    if target_width >= original_cols {
        debug!(
            "Target width {} is not smaller than raster width {}, keeping {}x{}",
            target_width, original_cols, original_cols, original_rows
        );
        return (original_cols, original_rows);
    }
    let scale = target_width as f64 / original_cols as f64;
    let rows = ((original_rows as f64 * scale).round() as usize).max(1);
    (target_width, rows)
}

/// Size the raster engine reads at: at most twice the preview size
pub fn read_dimensions(
    original: (usize, usize),
    target: (usize, usize),
) -> (usize, usize) {
    (
        original.0.min(target.0 * 2).max(1),
        original.1.min(target.1 * 2).max(1),
    )
}

pub fn resize_f32_image(
    data: &[f32],
    original_cols: usize,
    original_rows: usize,
    target_cols: usize,
    target_rows: usize,
) -> Result<Vec<f32>> {
    let resize_options =
        ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Lanczos3));
    let mut resizer = Resizer::new();

    let mut src_bytes = Vec::with_capacity(data.len() * 4);
    for &v in data {
        src_bytes.extend_from_slice(&v.to_le_bytes());
    }

    let src_image = Image::from_vec_u8(
        original_cols as u32,
        original_rows as u32,
        src_bytes,
        PixelType::F32,
    )
    .map_err(Error::external)?;
    let mut dst_image = Image::new(target_cols as u32, target_rows as u32, PixelType::F32);
    resizer
        .resize(&src_image, &mut dst_image, &resize_options)
        .map_err(Error::external)?;

    Ok(dst_image
        .into_vec()
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect())
}

/// Linear stretch between the 2nd and 98th percentiles of the valid pixels.
/// Non-finite and no-data pixels map to 0.
pub fn percentile_stretch(band: &Array2<f64>, nodata: Option<f64>) -> Vec<u8> {
    let is_valid = |v: f64| v.is_finite() && nodata.map(|nd| v != nd).unwrap_or(true);
    let mut valid: Vec<f64> = band.iter().copied().filter(|&v| is_valid(v)).collect();
    if valid.is_empty() {
        return vec![0; band.len()];
    }
    valid.sort_by(f64::total_cmp);
    let at = |p: f64| valid[((valid.len() - 1) as f64 * p).round() as usize];
    let (low, high) = (at(LOW_PERCENTILE), at(HIGH_PERCENTILE));
    let range = (high - low).max(f64::EPSILON);
    band.iter()
        .map(|&v| {
            if is_valid(v) {
                (((v - low) / range) * 255.0).round().clamp(0.0, 255.0) as u8
            } else {
                0
            }
        })
        .collect()
}

/// Read, resize and stretch the preview bands of an open raster
pub fn read_preview(raster: &GdalRaster, width: usize) -> Result<Preview> {
    let size = (raster.metadata.size_x, raster.metadata.size_y);
    if size.0 == 0 || size.1 == 0 {
        return Err(Error::Processing("Raster has no pixels".into()));
    }
    let (cols, rows) = calculate_resize_dimensions(size.0, size.1, width);
    let (read_cols, read_rows) = read_dimensions(size, (cols, rows));
    debug!(
        "Preview {}x{} from {}x{} read at {}x{}",
        cols, rows, size.0, size.1, read_cols, read_rows
    );

    let mut bands = Vec::new();
    for index in choose_bands(raster.metadata.bands) {
        let nodata = raster.band_nodata(index);
        let mut data = raster.read_band(
            index,
            (read_cols, read_rows),
            Some(ResampleAlg::Average),
        )?;
        if (read_cols, read_rows) != (cols, rows) {
            let samples: Vec<f32> = data
                .iter()
                .map(|&v| match nodata {
                    Some(nd) if v == nd => f32::NAN,
                    _ => v as f32,
                })
                .collect();
            let resized = resize_f32_image(&samples, read_cols, read_rows, cols, rows)?;
            data = Array2::from_shape_vec((rows, cols), resized.into_iter().map(f64::from).collect())
                .map_err(Error::external)?;
        }
        bands.push(percentile_stretch(&data, nodata));
    }
    Ok(Preview { cols, rows, bands })
}

/// Geotransform of a `cols` x `rows` image covering the footprint
pub fn preview_geotransform(extent: &[(f64, f64)], cols: usize, rows: usize) -> Option<[f64; 6]> {
    if extent.len() < 4 || cols == 0 || rows == 0 {
        return None;
    }
    let (ul, ur, ll) = (extent[0], extent[1], extent[3]);
    let (c, r) = (cols as f64, rows as f64);
    Some([
        ul.0,
        (ur.0 - ul.0) / c,
        (ll.0 - ul.0) / r,
        ul.1,
        (ur.1 - ul.1) / c,
        (ll.1 - ul.1) / r,
    ])
}

fn encode(preview: &Preview, format: OutputFormat) -> Result<Vec<u8>> {
    match format {
        OutputFormat::Jpeg => encode_jpeg(preview.cols, preview.rows, &preview.bands),
        OutputFormat::Tiff => encode_tiff(preview.cols, preview.rows, &preview.bands),
    }
}

fn browse_raster(dataset: &Dataset, width: usize) -> Option<GdalRaster> {
    let browse = dataset.browse.as_ref().filter(|p| vfs::exists(p))?;
    match GdalRaster::open(browse) {
        Ok(raster) if raster.metadata.size_x >= width => {
            debug!("Using browse image {:?}", browse);
            Some(raster)
        }
        Ok(raster) => {
            debug!(
                "Browse image {:?} is {} wide, {} requested",
                browse, raster.metadata.size_x, width
            );
            None
        }
        Err(e) => {
            warn!("Cannot open browse image {:?}: {}", browse, e);
            None
        }
    }
}

/// Generic preview: used directly by the default driver and by every
/// specialized driver after it has set the raster source and browse image.
pub fn render(dataset: &Dataset, request: &OverviewRequest) -> Result<OverviewOutput> {
    if request.width == 0 {
        return Err(Error::ZeroSize { size: 0 });
    }
    let preview = match browse_raster(dataset, request.width) {
        Some(raster) => read_preview(&raster, request.width)?,
        None => {
            let open = dataset.open_raster()?;
            read_preview(&open.raster, request.width)?
        }
    };
    let data = encode(&preview, request.format)?;

    match &request.target {
        OverviewTarget::Memory => Ok(OverviewOutput::Bytes {
            data,
            width: preview.cols,
            height: preview.rows,
            format: request.format,
        }),
        OverviewTarget::Directory(dir) => {
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!(
                "{}.{}",
                dataset.fileinfo.name,
                request.format.extension()
            ));
            std::fs::write(&path, &data)?;
            let world_file = write_sidecars(dataset, &path, &preview)?;
            info!("Wrote overview {:?}", path);
            Ok(OverviewOutput::Written { path, world_file })
        }
    }
}

fn write_sidecars(dataset: &Dataset, image: &Path, preview: &Preview) -> Result<Option<PathBuf>> {
    let Some(gt) = preview_geotransform(&dataset.extent, preview.cols, preview.rows) else {
        return Ok(None);
    };
    let world = write_world_file(image, gt)?;
    if let Some(srs) = dataset.metadata.get("srs") {
        write_prj_file(image, srs)?;
    }
    Ok(Some(world))
}
