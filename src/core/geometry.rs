//! Geotransform arithmetic: footprints, corner GCPs, rotation and UTM EPSG
//! resolution for the regional datums vendor headers use. GCPs are fitted to a
//! geotransform by the raster engine (`io::gdal::gcps_to_geotransform`).
use serde::{Deserialize, Serialize};

/// A ground control point: (pixel, line) maps to (x, y)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gcp {
    pub pixel: f64,
    pub line: f64,
    pub x: f64,
    pub y: f64,
}

impl Gcp {
    pub fn new(pixel: f64, line: f64, x: f64, y: f64) -> Self {
        Self { pixel, line, x, y }
    }
}

/// Map a pixel/line position through a geotransform
pub fn pixel_to_geo(gt: &[f64; 6], pixel: f64, line: f64) -> (f64, f64) {
    (
        gt[0] + pixel * gt[1] + line * gt[2],
        gt[3] + pixel * gt[4] + line * gt[5],
    )
}

/// Closed footprint polygon UL, UR, LR, LL, UL of a raster
pub fn footprint(gt: &[f64; 6], cols: usize, rows: usize) -> Vec<(f64, f64)> {
    let (c, r) = (cols as f64, rows as f64);
    let ul = pixel_to_geo(gt, 0.0, 0.0);
    let ur = pixel_to_geo(gt, c, 0.0);
    let lr = pixel_to_geo(gt, c, r);
    let ll = pixel_to_geo(gt, 0.0, r);
    vec![ul, ur, lr, ll, ul]
}

/// Close a list of four corners (UL, UR, LR, LL) into a footprint
pub fn close_ring(corners: [(f64, f64); 4]) -> Vec<(f64, f64)> {
    let mut ring = corners.to_vec();
    ring.push(corners[0]);
    ring
}

/// Rotation of the pixel grid in degrees (0 for north-up rasters)
pub fn rotation(gt: &[f64; 6]) -> f64 {
    gt[4].atan2(gt[1]).to_degrees()
}

/// GCPs at the four corners of a `cols` x `rows` raster
pub fn corner_gcps(corners: [(f64, f64); 4], cols: usize, rows: usize) -> Vec<Gcp> {
    let (c, r) = (cols as f64, rows as f64);
    let [ul, ur, lr, ll] = corners;
    vec![
        Gcp::new(0.0, 0.0, ul.0, ul.1),
        Gcp::new(c, 0.0, ur.0, ur.1),
        Gcp::new(c, r, lr.0, lr.1),
        Gcp::new(0.0, r, ll.0, ll.1),
    ]
}

/// EPSG code of a UTM zone on the given datum.
///
/// Regional datums map to their national grid codes (MGA, AMG) which the raster
/// engine does not infer from a bare "UTM + datum" description.
pub fn utm_epsg(datum: &str, zone: u32, south: bool) -> Option<u32> {
    if !(1..=60).contains(&zone) {
        return None;
    }
    let datum = datum.trim().to_ascii_uppercase().replace([' ', '-', '_'], "");
    match datum.as_str() {
        "WGS84" | "WE" | "WGE" => Some(if south { 32700 + zone } else { 32600 + zone }),
        "GDA94" | "GDA" if south && (48..=58).contains(&zone) => Some(28300 + zone),
        "AGD66" if south && (48..=58).contains(&zone) => Some(20200 + zone),
        "AGD84" if south && (48..=58).contains(&zone) => Some(20300 + zone),
        "NAD83" if !south && (1..=23).contains(&zone) => Some(26900 + zone),
        "NAD27" if !south && (1..=22).contains(&zone) => Some(26700 + zone),
        _ => None,
    }
}

/// Format a coordinate pair the way metadata records carry it
pub fn format_point(p: (f64, f64)) -> String {
    format!("{},{}", p.0, p.1)
}
