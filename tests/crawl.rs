mod common;

use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};

use rastermeta::{CrawlParams, Dataset, RasterSource, crawl, crawl_directory, write_records_json};

const GT: [f64; 6] = [500000.0, 30.0, 0.0, 7000000.0, 0.0, -30.0];

fn crawl_all(root: &Path, params: &CrawlParams) -> (Vec<Dataset>, Vec<rastermeta::CrawlError>) {
    let mut crawler = crawl(root, params).unwrap();
    let datasets: Vec<Dataset> = crawler.by_ref().collect();
    (datasets, crawler.take_errors())
}

#[test]
fn tiled_product_and_unrelated_raster() {
    let tmp = tempfile::tempdir().unwrap();
    let tiles = common::write_tiled_product(tmp.path(), "P001");
    common::write_test_tiff(&tmp.path().join("other.tif"), 12, 10, GT);

    let (datasets, errors) = crawl_all(tmp.path(), &CrawlParams::default());
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(datasets.len(), 2);

    let dg = &datasets[0];
    assert_eq!(dg.metadata.get("filetype"), Some("digitalglobe"));
    for tile in &tiles {
        assert!(dg.filelist.contains(tile));
    }
    match &dg.source {
        RasterSource::Vrt(xml) => {
            assert!(xml.contains(r#"<DstRect xOff="16" yOff="0" xSize="8" ySize="16"/>"#));
            assert!(xml.contains(r#"<DstRect xOff="0" yOff="16" xSize="16" ySize="4"/>"#));
        }
        other => panic!("unexpected source {other:?}"),
    }

    let other = &datasets[1];
    assert_eq!(other.metadata.get("filetype"), Some("GTiff"));
    assert_eq!(other.metadata.get("cols"), Some("12"));
}

#[test]
fn vendor_companions_stay_with_their_product() {
    let tmp = tempfile::tempdir().unwrap();
    common::write_tiled_product(tmp.path(), "P001");
    for name in ["P001.XML", "P001.RPB", "P001-BROWSE.TXT"] {
        std::fs::write(tmp.path().join(name), b"companion").unwrap();
    }
    let scene = "ALAV2A000000001-O1B2R_U";
    std::fs::write(
        tmp.path().join(format!("LED-{scene}")),
        common::alos_leader("ALOS", "AVNIR-2", 4, &[]),
    )
    .unwrap();
    for name in ["IMG-01", "IMG-02", "IMG-03", "IMG-04", "VOL", "TRL", "SUP"] {
        std::fs::write(tmp.path().join(format!("{name}-{scene}")), b"ceos").unwrap();
    }

    let (datasets, errors) = crawl_all(tmp.path(), &CrawlParams::default());
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(datasets.len(), 2);
    let alos = &datasets[0];
    assert_eq!(alos.metadata.get("filetype"), Some("alos"));
    assert!(alos.filelist.contains(&tmp.path().join(format!("VOL-{scene}"))));
    let dg = &datasets[1];
    assert_eq!(dg.metadata.get("filetype"), Some("digitalglobe"));
    assert!(dg.filelist.contains(&tmp.path().join("P001.RPB")));
    assert!(dg.filelist.contains(&tmp.path().join("P001-BROWSE.TXT")));
}

#[test]
fn strip_product_with_missing_strip_fails_once() {
    let tmp = tempfile::tempdir().unwrap();
    let scene = "ALPSMN000000001-O1B2R_UN";
    std::fs::write(
        tmp.path().join(format!("LED-{scene}")),
        common::alos_leader("ALOS", "PRISM", 1, &[150, 150, 150, 150]),
    )
    .unwrap();
    for i in [1, 2, 4] {
        std::fs::write(tmp.path().join(format!("IMG-0{i}-{scene}")), b"strip").unwrap();
    }

    let (datasets, errors) = crawl_all(tmp.path(), &CrawlParams::default());
    assert!(datasets.is_empty(), "{datasets:?}");
    assert_eq!(errors.len(), 1, "{errors:?}");
    assert!(errors[0].path.ends_with(format!("LED-{scene}")));
    assert!(errors[0].message.contains(&format!("IMG-03-{scene}")));
}

#[test]
fn recrawl_is_identical() {
    let tmp = tempfile::tempdir().unwrap();
    common::write_tiled_product(tmp.path(), "P002");
    common::write_test_tiff(&tmp.path().join("a.tif"), 8, 8, GT);
    common::write_test_tiff(&tmp.path().join("b.tif"), 16, 4, GT);

    let first = crawl_directory(tmp.path(), None, &CrawlParams::default()).unwrap();
    let second = crawl_directory(tmp.path(), None, &CrawlParams::default()).unwrap();
    assert_eq!(first.records.len(), 3);
    assert_eq!(first.records, second.records);
    assert_eq!(first.errors, second.errors);
}

#[test]
fn no_file_is_claimed_twice() {
    let tmp = tempfile::tempdir().unwrap();
    common::write_tiled_product(tmp.path(), "P003");
    let tif = tmp.path().join("scene.tif");
    common::write_test_tiff(&tif, 8, 8, GT);
    std::fs::write(tmp.path().join("scene.tfw"), "30\n0\n0\n-30\n500015\n6999985\n").unwrap();
    std::fs::write(tmp.path().join("readme.txt"), "not imagery").unwrap();

    let (datasets, errors) = crawl_all(tmp.path(), &CrawlParams::default());
    let mut seen = HashSet::new();
    for ds in &datasets {
        for f in &ds.filelist {
            assert!(seen.insert(f.clone()), "{f:?} claimed twice");
        }
    }
    let failed: Vec<PathBuf> = errors.iter().map(|e| e.path.clone()).collect();
    assert_eq!(failed, vec![tmp.path().join("readme.txt")]);
}

#[test]
fn vendor_header_beats_default_driver() {
    let tmp = tempfile::tempdir().unwrap();
    let mtl = "GROUP = L1_METADATA_FILE\n  SPACECRAFT_ID = \"LANDSAT_5\"\n  SENSOR_ID = \"TM\"\n  REFLECTIVE_SAMPLES = 8\n  REFLECTIVE_LINES = 8\n  FILE_NAME_BAND_1 = \"LT05_B1.TIF\"\nEND_GROUP = L1_METADATA_FILE\nEND\n";
    std::fs::write(tmp.path().join("LT05_MTL.txt"), mtl).unwrap();
    common::write_test_tiff(&tmp.path().join("LT05_B1.TIF"), 8, 8, GT);

    let (datasets, errors) = crawl_all(tmp.path(), &CrawlParams::default());
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(datasets.len(), 1);
    assert_eq!(datasets[0].metadata.get("filetype"), Some("landsat_mtl"));
    assert_eq!(datasets[0].metadata.get("satellite"), Some("LANDSAT_5"));
}

#[test]
fn rasters_inside_zip_archives() {
    let tmp = tempfile::tempdir().unwrap();
    let staging = tempfile::tempdir().unwrap();
    let tif = staging.path().join("inner.tif");
    common::write_test_tiff(&tif, 8, 8, GT);

    let archive = tmp.path().join("bundle.zip");
    let mut zip = zip::ZipWriter::new(std::fs::File::create(&archive).unwrap());
    zip.start_file("inner.tif", zip::write::FileOptions::default())
        .unwrap();
    zip.write_all(&std::fs::read(&tif).unwrap()).unwrap();
    zip.finish().unwrap();

    let (without, _) = crawl_all(tmp.path(), &CrawlParams::default());
    assert!(without.iter().all(|d| !d.path().to_string_lossy().starts_with("/vsizip/")));

    let params = CrawlParams {
        archives: true,
        ..CrawlParams::default()
    };
    let (datasets, errors) = crawl_all(tmp.path(), &params);
    assert!(errors.is_empty(), "{errors:?}");
    assert_eq!(datasets.len(), 1);
    assert!(datasets[0].path().to_string_lossy().starts_with("/vsizip/"));
    assert_eq!(datasets[0].metadata.get("cols"), Some("8"));
}

#[test]
fn records_are_written_as_json() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    std::fs::create_dir(&data).unwrap();
    common::write_test_tiff(&data.join("scene.tif"), 8, 8, GT);

    let report = crawl_directory(&data, None, &CrawlParams::default()).unwrap();
    let out = tmp.path().join("records.json");
    write_records_json(&out, &report.records).unwrap();

    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
    let record = &json[0];
    assert_eq!(record["cols"], serde_json::json!(8));
    assert_eq!(record["epsg"], serde_json::json!(32755));
    assert_eq!(record["filename"], serde_json::json!("scene.tif"));
    assert_eq!(record["extent"].as_array().unwrap().len(), 5);
}

#[test]
fn overviews_are_written_next_to_world_files() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    std::fs::create_dir(&data).unwrap();
    common::write_test_tiff(&data.join("scene.tif"), 64, 32, GT);

    let out = tmp.path().join("previews");
    let report = crawl_directory(&data, Some(&out), &CrawlParams::default()).unwrap();
    assert_eq!(report.overviews, vec![out.join("scene.tif.jpg")]);
    assert!(out.join("scene.tif.jpg").is_file());
    assert!(out.join("scene.tif.jgw").is_file());
    assert!(out.join("scene.tif.prj").is_file());
}

#[test]
fn same_named_rasters_get_separate_overviews() {
    let tmp = tempfile::tempdir().unwrap();
    let data = tmp.path().join("data");
    for sub in ["a", "b"] {
        std::fs::create_dir_all(data.join(sub)).unwrap();
        common::write_test_tiff(&data.join(sub).join("scene.tif"), 32, 16, GT);
    }
    let out = tmp.path().join("previews");
    let params = CrawlParams {
        recurse: true,
        ..CrawlParams::default()
    };
    let report = crawl_directory(&data, Some(&out), &params).unwrap();
    assert!(report.errors.is_empty(), "{:?}", report.errors);
    assert_eq!(
        report.overviews,
        vec![out.join("a").join("scene.tif.jpg"), out.join("b").join("scene.tif.jpg")]
    );
    for path in &report.overviews {
        assert!(path.is_file());
        assert!(path.with_extension("jgw").is_file());
    }
}
