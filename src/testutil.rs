//! Fixtures shared by unit and integration tests: small GeoTIFFs and
//! fixed-record headers.
use std::path::Path;

use gdal::DriverManager;
use gdal::raster::Buffer;
use gdal::spatial_ref::SpatialRef;

/// Write a single-band Byte GeoTIFF filled with a gradient
pub fn write_test_tiff(path: &Path, cols: usize, rows: usize, gt: [f64; 6]) {
    write_test_tiff_bands(path, cols, rows, 1, gt, Some(32755));
}

/// Write an `nbands` Byte GeoTIFF, optionally tagged with an EPSG code
pub fn write_test_tiff_bands(
    path: &Path,
    cols: usize,
    rows: usize,
    nbands: usize,
    gt: [f64; 6],
    epsg: Option<u32>,
) {
    let driver = DriverManager::get_driver_by_name("GTiff").unwrap();
    let mut ds = driver
        .create_with_band_type::<u8, _>(path, cols, rows, nbands)
        .unwrap();
    ds.set_geo_transform(&gt).unwrap();
    if let Some(code) = epsg {
        let srs = SpatialRef::from_epsg(code).unwrap();
        ds.set_spatial_ref(&srs).unwrap();
    }
    for b in 1..=nbands {
        let data: Vec<u8> = (0..cols * rows)
            .map(|i| ((i % cols) * 255 / cols.max(1)) as u8 ^ (b as u8 * 16))
            .collect();
        let mut buf = Buffer::new((cols, rows), data);
        let mut band = ds.rasterband(b).unwrap();
        band.write((0, 0), (cols, rows), &mut buf).unwrap();
    }
}

/// Fixed-length record filled with blanks
pub fn blank_record(len: usize) -> Vec<u8> {
    vec![b' '; len]
}

/// Write `text` left-aligned into the 1-based inclusive window `start..=end`
pub fn put(record: &mut [u8], start: usize, end: usize, text: &str) {
    let window = &mut record[start - 1..end];
    assert!(text.len() <= window.len(), "{text:?} does not fit {start}..{end}");
    window[..text.len()].copy_from_slice(text.as_bytes());
}

/// A leader with the given instrument fields and PRISM strip widths
pub fn alos_leader(satellite: &str, sensor: &str, nbands: usize, strips: &[i64]) -> Vec<u8> {
    let mut desc = blank_record(720);
    put(&mut desc, 1, 16, "CEOS LEADER");
    let mut rec = blank_record(4680);
    put(&mut rec, 21, 52, "ALAV2A000000001");
    put(&mut rec, 69, 76, "20070316");
    put(&mut rec, 101, 116, satellite);
    put(&mut rec, 117, 132, sensor);
    put(&mut rec, 133, 148, "1B2R");
    put(&mut rec, 149, 164, "-1.5");
    put(&mut rec, 165, 180, "400");
    put(&mut rec, 181, 196, "300");
    put(&mut rec, 197, 212, &nbands.to_string());
    for (i, v) in ["-35.0", "149.0", "-35.0", "149.4", "-35.3", "149.4", "-35.3", "149.0"]
        .iter()
        .enumerate()
    {
        let start = 213 + i * 16;
        put(&mut rec, start, start + 15, v);
    }
    put(&mut rec, 341, 356, "45.5");
    put(&mut rec, 357, 372, "30.25");
    put(&mut rec, 373, 388, "2");
    for (i, w) in strips.iter().enumerate() {
        let start = 393 + i * 16;
        put(&mut rec, start, start + 15, &w.to_string());
    }
    desc.extend(rec);
    desc
}
