//! DigitalGlobe products: an `.IMD` image description, an optional `.TIL`
//! tile index and the imagery as GeoTIFF or NITF tiles.
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::core::dataset::{Dataset, Driver, FileCandidate, RasterSource};
use crate::core::geometry::{corner_gcps, utm_epsg};
use crate::core::mosaic::{
    DataType, GridTile, MosaicPlan, MosaicSource, Rect, build_vrt, identity_bands, tiled,
};
use crate::core::overview::{OverviewOutput, OverviewRequest};
use crate::error::{Error, Result};
use crate::io::decode::{Group, GroupSyntax, parse_grouped};
use crate::io::formats::default;
use crate::io::gdal::{GdalRaster, gcps_to_geotransform};
use crate::io::vfs;

pub const PATTERNS: &[&str] = &[r"\.imd$"];

/// Codec that must not handle the JPEG 2000 stream inside NITF tiles
const NITF_DISABLED_CODECS: &[&str] = &["JP2ECW"];

fn parse(path: &Path) -> Result<Group> {
    Ok(parse_grouped(&vfs::read_to_string(path)?, &GroupSyntax::DIGITALGLOBE)?)
}

fn stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn is_nitf(path: &Path) -> bool {
    vfs::basename_lower(path).ends_with(".ntf")
}

static GRID_POSITION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)R(\d+)C(\d+)").expect("valid grid pattern"));

/// Zero-based (column, row) from an `R<row>C<col>` tile name
pub fn grid_position(name: &str) -> Result<Option<(i64, i64)>> {
    let Some(caps) = GRID_POSITION.captures_iter(name).last() else {
        return Ok(None);
    };
    let row: i64 = caps[1].parse().map_err(Error::external)?;
    let col: i64 = caps[2].parse().map_err(Error::external)?;
    if row < 1 || col < 1 {
        return Ok(None);
    }
    Ok(Some((col - 1, row - 1)))
}

/// One tile listed in a `.TIL`
#[derive(Debug, Clone, PartialEq)]
struct TileEntry {
    path: PathBuf,
    /// Explicit placement: upper-left and inclusive lower-right offsets
    offsets: Option<(i64, i64, i64, i64)>,
}

#[derive(Debug, Clone, PartialEq)]
struct TileIndex {
    tile_size: Option<(i64, i64)>,
    tiles: Vec<TileEntry>,
}

impl TileIndex {
    fn read(til: &Path) -> Result<Self> {
        let root = parse(til)?;
        let tile_size = match (root.get_f64("tileSizeX"), root.get_f64("tileSizeY")) {
            (Some(x), Some(y)) => Some((x as i64, y as i64)),
            _ => None,
        };
        let mut tiles = Vec::new();
        for group in root.groups_with_prefix("TILE_") {
            let Some(name) = group.get("filename") else {
                continue;
            };
            let offsets = match (
                group.get_f64("ULColOffset"),
                group.get_f64("ULRowOffset"),
                group.get_f64("LRColOffset"),
                group.get_f64("LRRowOffset"),
            ) {
                (Some(a), Some(b), Some(c), Some(d)) => {
                    Some((a as i64, b as i64, c as i64, d as i64))
                }
                _ => None,
            };
            tiles.push(TileEntry {
                path: vfs::sibling(til, name),
                offsets,
            });
        }
        if let Some(expected) = root.get_f64("numTiles") {
            if expected as usize != tiles.len() {
                debug!(
                    "{:?} declares {} tiles, lists {}",
                    til,
                    expected,
                    tiles.len()
                );
            }
        }
        Ok(Self { tile_size, tiles })
    }
}

/// The imagery layout of a product
enum Layout {
    Single(PathBuf),
    Tiled(TileIndex),
}

impl Layout {
    fn files(&self) -> Vec<PathBuf> {
        match self {
            Layout::Single(p) => vec![p.clone()],
            Layout::Tiled(index) => index.tiles.iter().map(|t| t.path.clone()).collect(),
        }
    }
}

fn til_path(imd: &Path) -> Option<PathBuf> {
    let til = vfs::sibling(imd, &format!("{}.TIL", stem(imd)));
    vfs::exists(&til).then_some(til)
}

/// Tiles found by name when there is no `.TIL`: `<stem>*R<r>C<c>*.TIF|.NTF`
fn globbed_tiles(imd: &Path) -> Result<Vec<PathBuf>> {
    let prefix = stem(imd).to_ascii_lowercase();
    let mut tiles = Vec::new();
    for sibling in vfs::siblings(imd)? {
        let name = vfs::basename_lower(&sibling);
        if name.starts_with(&prefix)
            && (name.ends_with(".tif") || name.ends_with(".ntf"))
            && grid_position(&name)?.is_some()
        {
            tiles.push(sibling);
        }
    }
    Ok(tiles)
}

fn layout(imd: &Path) -> Result<Layout> {
    if let Some(til) = til_path(imd) {
        return Ok(Layout::Tiled(TileIndex::read(&til)?));
    }
    let globbed = globbed_tiles(imd)?;
    if !globbed.is_empty() {
        return Ok(Layout::Tiled(TileIndex {
            tile_size: None,
            tiles: globbed
                .into_iter()
                .map(|path| TileEntry { path, offsets: None })
                .collect(),
        }));
    }
    let name = stem(imd);
    let tif = vfs::sibling(imd, &format!("{name}.TIF"));
    let ntf = vfs::sibling(imd, &format!("{name}.NTF"));
    Ok(Layout::Single(if !vfs::exists(&tif) && vfs::exists(&ntf) {
        ntf
    } else {
        tif
    }))
}

/// Same-stem companions delivered with the IMD (`.XML`, `.RPB`, `.ATT`,
/// `-BROWSE.TXT`, ...)
fn companion_files(imd: &Path) -> Result<Vec<PathBuf>> {
    let stem = stem(imd).to_lowercase();
    let (dotted, dashed) = (format!("{stem}."), format!("{stem}-"));
    Ok(vfs::siblings(imd)?
        .into_iter()
        .filter(|p| {
            let name = vfs::basename_lower(p);
            name.starts_with(&dotted) || name.starts_with(&dashed)
        })
        .collect())
}

fn browse_path(imd: &Path) -> PathBuf {
    vfs::sibling(imd, &format!("{}-BROWSE.JPG", stem(imd)))
}

/// Instrument name for a DigitalGlobe satellite id
fn sensor_name(sat_id: &str) -> &'static str {
    match sat_id.to_ascii_uppercase().as_str() {
        "QB02" => "QUICKBIRD",
        "IK02" => "IKONOS",
        "GE01" => "GEOEYE",
        "WV01" | "WV02" | "WV03" | "WV04" => "WORLDVIEW",
        _ => "UNKNOWN",
    }
}

struct Description {
    root: Group,
    cols: i64,
    rows: i64,
    band_names: Vec<String>,
    bits: u32,
}

impl Description {
    fn read(imd: &Path) -> Result<Self> {
        let root = parse(imd)?;
        let cols = root
            .get_f64("numColumns")
            .ok_or_else(|| Error::missing_field("numColumns", imd))? as i64;
        let rows = root
            .get_f64("numRows")
            .ok_or_else(|| Error::missing_field("numRows", imd))? as i64;
        let bits = root.get_f64("bitsPerPixel").map(|b| b as u32).unwrap_or(8);
        let band_names = root
            .groups_with_prefix("BAND_")
            .map(|g| g.name["BAND_".len()..].to_string())
            .collect();
        Ok(Self {
            root,
            cols,
            rows,
            band_names,
            bits,
        })
    }

    fn band_count(&self) -> usize {
        self.band_names.len().max(1)
    }

    /// UL, UR, LR, LL as (lon, lat) from the first band group
    fn corners(&self) -> Option<[(f64, f64); 4]> {
        let band = self.root.groups_with_prefix("BAND_").next()?;
        let corner = |c: &str| {
            Some((
                band.get_f64(&format!("{c}Lon"))?,
                band.get_f64(&format!("{c}Lat"))?,
            ))
        };
        Some([corner("UL")?, corner("UR")?, corner("LR")?, corner("LL")?])
    }

    /// UTM geotransform and EPSG code of a map-projected product
    fn map_projection(&self) -> Option<([f64; 6], u32)> {
        let map = self.root.group("MAP_PROJECTED_PRODUCT")?;
        if !map.get("mapProjName")?.eq_ignore_ascii_case("UTM") {
            return None;
        }
        let zone = map.get_f64("mapZone")? as u32;
        let south = map.get("mapHemi")?.eq_ignore_ascii_case("S");
        let epsg = utm_epsg(map.get("datumName")?, zone, south)?;
        let (x, y) = (map.get_f64("originX")?, map.get_f64("originY")?);
        let (dx, dy) = (map.get_f64("colSpacing")?, map.get_f64("rowSpacing")?);
        // Origin is the centre of the upper-left pixel
        Some(([x - dx / 2.0, dx, 0.0, y + dy / 2.0, 0.0, -dy], epsg))
    }
}

/// Nominal tile size from the index, or the size of the first grid tile
fn nominal_tile_size(index: &TileIndex, tiles: &[GridTile]) -> Result<(i64, i64)> {
    if let Some(size) = index.tile_size {
        return Ok(size);
    }
    let first = tiles
        .iter()
        .find(|t| t.column == 0 && t.row == 0)
        .or(tiles.first())
        .ok_or_else(|| Error::Processing("Product has no tiles".into()))?;
    let raster = GdalRaster::open(&first.path)?;
    Ok((raster.metadata.size_x as i64, raster.metadata.size_y as i64))
}

fn tile_plan(
    index: &TileIndex,
    width: i64,
    height: i64,
    bands: usize,
    data_type: DataType,
) -> Result<MosaicPlan> {
    if index.tiles.iter().all(|t| t.offsets.is_some()) {
        let mut plan = MosaicPlan::new(width, height, bands, data_type);
        for t in &index.tiles {
            if let Some((x0, y0, x1, y1)) = t.offsets {
                let (w, h) = (x1 - x0 + 1, y1 - y0 + 1);
                plan.sources.push(MosaicSource::new(
                    &t.path,
                    Rect::new(0, 0, w, h),
                    Rect::new(x0, y0, w, h),
                    identity_bands(bands),
                ));
            }
        }
        plan.validate()?;
        return Ok(plan);
    }

    let mut grid = Vec::with_capacity(index.tiles.len());
    for t in &index.tiles {
        let name = vfs::basename_lower(&t.path);
        let (column, row) = grid_position(&name)?.ok_or_else(|| {
            Error::Processing(format!("Tile {:?} has neither offsets nor a grid position", t.path))
        })?;
        grid.push(GridTile {
            path: t.path.clone(),
            column,
            row,
        });
    }
    let (tw, th) = nominal_tile_size(index, &grid)?;
    Ok(tiled(&grid, tw, th, width, height, bands, data_type)?)
}

pub struct DigitalGlobeDriver;

impl Driver for DigitalGlobeDriver {
    fn name(&self) -> &'static str {
        "digitalglobe"
    }

    fn construct(self: Arc<Self>, candidate: &FileCandidate) -> Result<Option<Dataset>> {
        let imd = &candidate.path;
        let layout = layout(imd)?;
        let mut dataset = Dataset::new(self, imd)?;
        if let Some(til) = til_path(imd) {
            dataset.add_file(til);
        }
        let files = layout.files();
        if files.iter().any(|f| is_nitf(f)) {
            dataset.disabled_codecs = NITF_DISABLED_CODECS.to_vec();
        }
        for file in files {
            dataset.add_file(file);
        }
        let browse = browse_path(imd);
        if vfs::exists(&browse) {
            dataset.add_file(browse.clone());
            dataset.browse = Some(browse);
        }
        for companion in companion_files(imd)? {
            dataset.add_file(companion);
        }
        Ok(Some(dataset))
    }

    fn extract(&self, dataset: &mut Dataset) -> Result<()> {
        let imd = dataset.path().to_path_buf();
        let description = Description::read(&imd)?;
        let layout = layout(&imd)?;
        if let Some(missing) = layout.files().into_iter().find(|p| !vfs::exists(p)) {
            return Err(Error::MissingFile(missing));
        }

        let data_type = DataType::from_bits(description.bits);
        let bands = description.band_count();
        let projected = description.map_projection();
        let corners = description.corners();
        let (gt, srs) = match (projected, corners) {
            (Some((gt, epsg)), _) => (Some(gt), Some(format!("EPSG:{epsg}"))),
            (None, Some(corners)) => (
                gcps_to_geotransform(&corner_gcps(
                    corners,
                    description.cols as usize,
                    description.rows as usize,
                )),
                Some("EPSG:4326".to_string()),
            ),
            (None, None) => (None, None),
        };

        dataset.source = match &layout {
            Layout::Single(image) => RasterSource::File(image.clone()),
            Layout::Tiled(index) => {
                info!("Mosaicking {} tiles of {:?}", index.tiles.len(), imd);
                let plan = tile_plan(index, description.cols, description.rows, bands, data_type)?
                    .with_geotransform(gt)
                    .with_srs(srs.clone());
                RasterSource::Vrt(build_vrt(&plan)?)
            }
        };

        let root = &description.root;
        let image = root.group("IMAGE_1");
        let m = &mut dataset.metadata;
        if let Some(sat) = image.and_then(|g| g.get("satId")) {
            m.set("satellite", sat);
            m.set("sensor", sensor_name(sat));
        }
        m.set_opt("level", root.get("productLevel"));
        if let Some(date) = image
            .and_then(|g| g.get("firstLineTime"))
            .and_then(|t| t.get(..10))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok())
        {
            m.set("imgdate", date.format("%Y-%m-%d"));
        }
        if let Some(image) = image {
            m.set_opt("cloudcover", image.get_f64("cloudCover").map(|c| c * 100.0));
            m.set_opt("viewangle", image.get_f64("meanOffNadirViewAngle"));
            m.set_opt("sunazimuth", image.get_f64("meanSunAz"));
            m.set_opt("sunelevation", image.get_f64("meanSunEl"));
        }
        m.set("cols", description.cols);
        m.set("rows", description.rows);
        m.set("nbands", bands);
        if description.band_names.is_empty() {
            m.set("bands", 1);
        } else {
            m.set("bands", description.band_names.join(","));
        }
        m.set("datatype", data_type.name());
        m.set("nbits", description.bits);
        if let Some(c) = root
            .get("compressionType")
            .filter(|c| !c.eq_ignore_ascii_case("none"))
        {
            m.set("compression", c);
        }

        match (projected, corners, gt) {
            (Some(_), _, Some(gt)) => dataset.set_geotransform_extent(
                &gt,
                description.cols as usize,
                description.rows as usize,
            ),
            (None, Some(corners), gt) => {
                dataset.set_corner_extent(corners);
                if let Some(gt) = gt {
                    dataset.metadata.set("cellx", gt[1].abs());
                    dataset.metadata.set("celly", gt[5].abs());
                }
            }
            _ => debug!("{:?} carries no georeferencing", imd),
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
