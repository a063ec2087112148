//! Fixtures for the crawl scenarios. Rasters and fixed-record headers come
//! from the crate's own test fixtures; DigitalGlobe products are built here.
#![allow(dead_code)]

use std::path::{Path, PathBuf};

#[path = "../../src/testutil.rs"]
mod fixtures;

pub use fixtures::{alos_leader, write_test_tiff};

pub const IMD: &str = r#"version = "28.3";
bandId = "P";
numRows = 20;
numColumns = 24;
bitsPerPixel = 8;
BEGIN_GROUP = BAND_P
	ULLon = 149.00;
	ULLat = -35.00;
	URLon = 149.24;
	URLat = -35.00;
	LRLon = 149.24;
	LRLat = -35.20;
	LLLon = 149.00;
	LLLat = -35.20;
END_GROUP = BAND_P
BEGIN_GROUP = IMAGE_1
	satId = "QB02";
	firstLineTime = 2005-11-23T03:46:41.000000Z;
END_GROUP = IMAGE_1
END;
"#;

/// A DigitalGlobe product tiled on a 16 x 16 grid over 24 x 20 pixels
pub fn write_tiled_product(dir: &Path, stem: &str) -> Vec<PathBuf> {
    std::fs::write(dir.join(format!("{stem}.IMD")), IMD).unwrap();
    let tiles = ["R1C1", "R1C2", "R2C1"].map(|t| format!("{stem}_{t}.TIF"));
    let mut til = format!("numTiles = {};\ntileSizeX = 16;\ntileSizeY = 16;\n", tiles.len());
    for (i, t) in tiles.iter().enumerate() {
        til.push_str(&format!(
            "BEGIN_GROUP = TILE_{n}\n\tfilename = \"{t}\";\nEND_GROUP = TILE_{n}\n",
            n = i + 1
        ));
    }
    til.push_str("END;\n");
    std::fs::write(dir.join(format!("{stem}.TIL")), til).unwrap();
    tiles
        .iter()
        .map(|t| {
            let path = dir.join(t);
            std::fs::write(&path, b"tile").unwrap();
            path
        })
        .collect()
}
