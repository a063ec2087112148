use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// World file extension for an image path (`jgw`, `tfw`, ... or `wld`)
pub fn world_file_extension(output_image: &Path) -> String {
    let ext = output_image
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "jpg" | "jpeg" => "jgw".to_string(),
        "png" => "pgw".to_string(),
        "tif" | "tiff" => "tfw".to_string(),
        // Fallback: first letter + "w"
        other => match other.chars().next() {
            Some(first) => format!("{first}w"),
            None => "wld".to_string(),
        },
    }
}

/// Write a world file next to the raster image using the provided geotransform.
/// The world file stores the transform in pixel-center convention.
pub fn write_world_file(output_image: &Path, geotransform: [f64; 6]) -> Result<PathBuf> {
    let world_path = output_image.with_extension(world_file_extension(output_image));

    // A: pixel size in X, D: rotation about Y, B: rotation about X, E: pixel size Y
    // C, F: center of upper-left pixel
    let a = geotransform[1];
    let d = geotransform[4];
    let b = geotransform[2];
    let e = geotransform[5];
    let c = geotransform[0] + 0.5 * a + 0.5 * b;
    let f = geotransform[3] + 0.5 * d + 0.5 * e;

    let mut file = File::create(&world_path)?;
    for v in [a, d, b, e, c, f] {
        writeln!(file, "{:.12}", v)?;
    }
    Ok(world_path)
}

/// Write a .prj file with the provided projection (WKT or EPSG:XXXX)
pub fn write_prj_file(output_image: &Path, projection: &str) -> Result<PathBuf> {
    let prj_path = output_image.with_extension("prj");
    std::fs::write(&prj_path, projection.as_bytes())?;
    Ok(prj_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_file_uses_pixel_centres() {
        let tmp = tempfile::tempdir().unwrap();
        let img = tmp.path().join("scene.tif.jpg");
        let wf = write_world_file(&img, [100.0, 2.0, 0.0, 50.0, 0.0, -2.0]).unwrap();
        assert_eq!(wf, tmp.path().join("scene.tif.jgw"));
        let lines: Vec<f64> = std::fs::read_to_string(&wf)
            .unwrap()
            .lines()
            .map(|l| l.parse().unwrap())
            .collect();
        assert_eq!(lines, vec![2.0, 0.0, 0.0, -2.0, 101.0, 49.0]);
    }

    #[test]
    fn extension_fallbacks() {
        assert_eq!(world_file_extension(Path::new("a.TIFF")), "tfw");
        assert_eq!(world_file_extension(Path::new("a.bmp")), "bw");
        assert_eq!(world_file_extension(Path::new("a")), "wld");
    }
}
