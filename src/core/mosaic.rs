//! Virtual mosaic builder.
//!
//! A [`MosaicPlan`] describes how pixel rectangles of several files compose one
//! logical raster. [`build_vrt`] turns a plan into GDAL VRT XML without reading
//! any pixels, which the raster engine can then open like a single dataset.
//! The helpers [`band_stack`], [`tiled`] and [`strips`] cover the layouts vendor
//! products use.
use std::io::Cursor;
use std::path::{Path, PathBuf};

use quick_xml::Writer;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MosaicError {
    #[error("Mosaic size must be positive, got {width}x{height}")]
    ZeroSize { width: i64, height: i64 },
    #[error("Mosaic must have at least one band")]
    ZeroBands,
    #[error("Mosaic has no source files")]
    NoSources,
    #[error("Source {path:?} has a non-positive {which} rectangle {rect:?}")]
    EmptyRect {
        path: PathBuf,
        which: &'static str,
        rect: Rect,
    },
    #[error("Source {path:?} destination {rect:?} lies outside the {width}x{height} mosaic")]
    OutsideDestination {
        path: PathBuf,
        rect: Rect,
        width: i64,
        height: i64,
    },
    #[error("Source {path:?} maps band {src} to {dst}, mosaic has {count} bands")]
    BandOutOfRange {
        path: PathBuf,
        src: usize,
        dst: usize,
        count: usize,
    },
    #[error("Source {0:?} maps no bands")]
    NoBands(PathBuf),
    #[error("Got {actual} strip widths for {expected} strip files")]
    StripMismatch { expected: usize, actual: usize },
    #[error("XML writer error: {0}")]
    Xml(#[from] quick_xml::Error),
}

/// Pixel rectangle; signed so that under-sized computations are detectable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Rect {
    pub fn new(x: i64, y: i64, width: i64, height: i64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0 || self.x < 0 || self.y < 0
    }

    fn within(&self, width: i64, height: i64) -> bool {
        self.x >= 0 && self.y >= 0 && self.x + self.width <= width && self.y + self.height <= height
    }
}

/// Pixel data types understood by the VRT driver
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Byte,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    pub fn name(&self) -> &'static str {
        match self {
            DataType::Byte => "Byte",
            DataType::UInt16 => "UInt16",
            DataType::Int16 => "Int16",
            DataType::UInt32 => "UInt32",
            DataType::Int32 => "Int32",
            DataType::Float32 => "Float32",
            DataType::Float64 => "Float64",
        }
    }

    /// Smallest unsigned type holding `bits` bits per sample
    pub fn from_bits(bits: u32) -> Self {
        match bits {
            0..=8 => DataType::Byte,
            9..=16 => DataType::UInt16,
            17..=32 => DataType::UInt32,
            _ => DataType::Float64,
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        let dt = match name.to_ascii_lowercase().as_str() {
            "byte" | "uint8" => DataType::Byte,
            "uint16" => DataType::UInt16,
            "int16" => DataType::Int16,
            "uint32" => DataType::UInt32,
            "int32" => DataType::Int32,
            "float32" => DataType::Float32,
            "float64" => DataType::Float64,
            _ => return None,
        };
        Some(dt)
    }
}

/// One file's contribution to the mosaic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicSource {
    pub path: PathBuf,
    pub src: Rect,
    pub dst: Rect,
    /// (source band, destination band), both 1-based
    pub band_map: Vec<(usize, usize)>,
}

impl MosaicSource {
    pub fn new(path: impl Into<PathBuf>, src: Rect, dst: Rect, band_map: Vec<(usize, usize)>) -> Self {
        Self {
            path: path.into(),
            src,
            dst,
            band_map,
        }
    }
}

/// Band map copying bands 1..=n onto themselves
pub fn identity_bands(n: usize) -> Vec<(usize, usize)> {
    (1..=n).map(|b| (b, b)).collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MosaicPlan {
    pub width: i64,
    pub height: i64,
    pub band_count: usize,
    pub data_type: DataType,
    pub sources: Vec<MosaicSource>,
    pub geotransform: Option<[f64; 6]>,
    pub srs: Option<String>,
    pub nodata: Option<f64>,
}

impl MosaicPlan {
    pub fn new(width: i64, height: i64, band_count: usize, data_type: DataType) -> Self {
        Self {
            width,
            height,
            band_count,
            data_type,
            sources: Vec::new(),
            geotransform: None,
            srs: None,
            nodata: None,
        }
    }

    pub fn with_geotransform(mut self, gt: Option<[f64; 6]>) -> Self {
        self.geotransform = gt;
        self
    }

    pub fn with_srs(mut self, srs: Option<String>) -> Self {
        self.srs = srs;
        self
    }

    /// Every file the plan references, in plan order without repeats
    pub fn files(&self) -> Vec<PathBuf> {
        let mut out: Vec<PathBuf> = Vec::with_capacity(self.sources.len());
        for s in &self.sources {
            if !out.contains(&s.path) {
                out.push(s.path.clone());
            }
        }
        out
    }

    /// Check the plan for malformed sizes, rectangles and band indices
    pub fn validate(&self) -> Result<(), MosaicError> {
        if self.width <= 0 || self.height <= 0 {
            return Err(MosaicError::ZeroSize {
                width: self.width,
                height: self.height,
            });
        }
        if self.band_count == 0 {
            return Err(MosaicError::ZeroBands);
        }
        for s in &self.sources {
            if s.src.is_empty() {
                return Err(MosaicError::EmptyRect {
                    path: s.path.clone(),
                    which: "source",
                    rect: s.src,
                });
            }
            if s.dst.is_empty() {
                return Err(MosaicError::EmptyRect {
                    path: s.path.clone(),
                    which: "destination",
                    rect: s.dst,
                });
            }
            if !s.dst.within(self.width, self.height) {
                return Err(MosaicError::OutsideDestination {
                    path: s.path.clone(),
                    rect: s.dst,
                    width: self.width,
                    height: self.height,
                });
            }
            if s.band_map.is_empty() {
                return Err(MosaicError::NoBands(s.path.clone()));
            }
            for &(src, dst) in &s.band_map {
                if src == 0 || dst == 0 || dst > self.band_count {
                    return Err(MosaicError::BandOutOfRange {
                        path: s.path.clone(),
                        src,
                        dst,
                        count: self.band_count,
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every file contributes its band 1 as the next destination band, full size
pub fn band_stack(
    paths: &[PathBuf],
    width: i64,
    height: i64,
    data_type: DataType,
) -> Result<MosaicPlan, MosaicError> {
    if paths.is_empty() {
        return Err(MosaicError::NoSources);
    }
    let mut plan = MosaicPlan::new(width, height, paths.len(), data_type);
    let full = Rect::new(0, 0, width, height);
    for (i, p) in paths.iter().enumerate() {
        plan.sources
            .push(MosaicSource::new(p, full, full, vec![(1, i + 1)]));
    }
    plan.validate()?;
    Ok(plan)
}

/// A tile at grid cell (column, row)
#[derive(Debug, Clone, PartialEq)]
pub struct GridTile {
    pub path: PathBuf,
    pub column: i64,
    pub row: i64,
}

/// Tiles laid on a grid of nominal `tile_width` x `tile_height` cells; tiles in
/// the last row and column are clipped to the remainder of the mosaic size.
pub fn tiled(
    tiles: &[GridTile],
    tile_width: i64,
    tile_height: i64,
    width: i64,
    height: i64,
    band_count: usize,
    data_type: DataType,
) -> Result<MosaicPlan, MosaicError> {
    if tiles.is_empty() {
        return Err(MosaicError::NoSources);
    }
    let mut plan = MosaicPlan::new(width, height, band_count, data_type);
    for t in tiles {
        let x = t.column * tile_width;
        let y = t.row * tile_height;
        let w = tile_width.min(width - x);
        let h = tile_height.min(height - y);
        plan.sources.push(MosaicSource::new(
            &t.path,
            Rect::new(0, 0, w, h),
            Rect::new(x, y, w, h),
            identity_bands(band_count),
        ));
    }
    plan.validate()?;
    Ok(plan)
}

/// Along-track strips placed left to right. Neighbouring strips share
/// `overlap` pixels: the left strip gives up `overlap / 2` columns of its right
/// edge and the right strip the rest of its left edge.
pub fn strips(
    paths: &[PathBuf],
    widths: &[i64],
    height: i64,
    overlap: i64,
    band_count: usize,
    data_type: DataType,
) -> Result<MosaicPlan, MosaicError> {
    if paths.is_empty() {
        return Err(MosaicError::NoSources);
    }
    if paths.len() != widths.len() {
        return Err(MosaicError::StripMismatch {
            expected: paths.len(),
            actual: widths.len(),
        });
    }
    let n = paths.len();
    let right_trim = overlap / 2;
    let left_trim = overlap - right_trim;
    let mut sources = Vec::with_capacity(n);
    let mut x = 0;
    for (i, (p, &w)) in paths.iter().zip(widths).enumerate() {
        let lt = if i > 0 { left_trim } else { 0 };
        let rt = if i + 1 < n { right_trim } else { 0 };
        let kept = w - lt - rt;
        sources.push(MosaicSource::new(
            p,
            Rect::new(lt, 0, kept, height),
            Rect::new(x, 0, kept, height),
            identity_bands(band_count),
        ));
        x += kept;
    }
    let mut plan = MosaicPlan::new(x, height, band_count, data_type);
    plan.sources = sources;
    plan.validate()?;
    Ok(plan)
}

fn rect_element<'a>(name: &'a str, r: &Rect) -> BytesStart<'a> {
    let mut el = BytesStart::new(name);
    el.push_attribute(("xOff", r.x.to_string().as_str()));
    el.push_attribute(("yOff", r.y.to_string().as_str()));
    el.push_attribute(("xSize", r.width.to_string().as_str()));
    el.push_attribute(("ySize", r.height.to_string().as_str()));
    el
}

fn text_element<W: std::io::Write>(
    writer: &mut Writer<W>,
    start: BytesStart<'_>,
    text: &str,
) -> Result<(), MosaicError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

fn absolute(path: &Path) -> String {
    if path.is_absolute() || crate::io::vfs::is_virtual(path) {
        return path.display().to_string();
    }
    std::env::current_dir()
        .map(|cwd| cwd.join(path))
        .unwrap_or_else(|_| path.to_path_buf())
        .display()
        .to_string()
}

/// Serialize a plan to VRT XML. Same plan, same XML.
pub fn build_vrt(plan: &MosaicPlan) -> Result<String, MosaicError> {
    plan.validate()?;
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    let mut root = BytesStart::new("VRTDataset");
    root.push_attribute(("rasterXSize", plan.width.to_string().as_str()));
    root.push_attribute(("rasterYSize", plan.height.to_string().as_str()));
    writer.write_event(Event::Start(root))?;

    if let Some(srs) = plan.srs.as_deref().filter(|s| !s.is_empty()) {
        text_element(&mut writer, BytesStart::new("SRS"), srs)?;
    }
    if let Some(gt) = plan.geotransform {
        let text = gt
            .iter()
            .map(|v| format!("{:.16e}", v))
            .collect::<Vec<_>>()
            .join(", ");
        text_element(&mut writer, BytesStart::new("GeoTransform"), &text)?;
    }

    for band in 1..=plan.band_count {
        let mut el = BytesStart::new("VRTRasterBand");
        el.push_attribute(("dataType", plan.data_type.name()));
        el.push_attribute(("band", band.to_string().as_str()));
        writer.write_event(Event::Start(el))?;
        if let Some(nd) = plan.nodata {
            text_element(&mut writer, BytesStart::new("NoDataValue"), &nd.to_string())?;
        }
        for source in &plan.sources {
            for &(src_band, _) in source.band_map.iter().filter(|(_, d)| *d == band) {
                writer.write_event(Event::Start(BytesStart::new("SimpleSource")))?;
                let mut file = BytesStart::new("SourceFilename");
                file.push_attribute(("relativeToVRT", "0"));
                text_element(&mut writer, file, &absolute(&source.path))?;
                text_element(
                    &mut writer,
                    BytesStart::new("SourceBand"),
                    &src_band.to_string(),
                )?;
                writer.write_event(Event::Empty(rect_element("SrcRect", &source.src)))?;
                writer.write_event(Event::Empty(rect_element("DstRect", &source.dst)))?;
                writer.write_event(Event::End(BytesEnd::new("SimpleSource")))?;
            }
        }
        writer.write_event(Event::End(BytesEnd::new("VRTRasterBand")))?;
    }
    writer.write_event(Event::End(BytesEnd::new("VRTDataset")))?;

    let bytes = writer.into_inner().into_inner();
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
