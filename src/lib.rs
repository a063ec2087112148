#![doc = r#"
rastermeta: a raster imagery crawler and metadata extractor.

This crate walks a directory tree, recognises vendor imagery products among the
files it finds (ALOS CEOS leaders, DigitalGlobe IMD/TIL, Landsat MTL, EOSAT
FAST, and anything else GDAL can open), groups each product's files into one
[`Dataset`], and extracts a normalised metadata record: footprint, acquisition
date, sensor, band layout. Multi-file products (band stacks, tiles, strips) are
exposed as a single virtual raster, so previews work the same for every format.

Stability
---------
The public library API is experimental in initial releases and may evolve.
Breaking changes can occur.

Requirements
------------
- GDAL development headers and runtime available on your system.
- Rust 2024 edition toolchain.

Add dependency
--------------
```toml
[dependencies]
rastermeta = "0.1"
```

Quick start: crawl a directory
------------------------------
```rust,no_run
use std::path::Path;
use rastermeta::{crawl_directory, write_records_json, CrawlParams};

fn main() -> rastermeta::Result<()> {
    let params = CrawlParams {
        recurse: true,
        archives: true,
        ..CrawlParams::default()
    };
    let report = crawl_directory(Path::new("/data/imagery"), None, &params)?;
    write_records_json(Path::new("/out/records.json"), &report.records)?;

    for error in &report.errors {
        eprintln!("{}: {}", error.path.display(), error.message);
    }
    Ok(())
}
```

Lazy iteration and previews
---------------------------
```rust,no_run
use std::path::Path;
use rastermeta::{crawl, generate_overview_to_buffer, CrawlParams, OverviewParams, OutputFormat};

fn main() -> rastermeta::Result<()> {
    let mut crawler = crawl(Path::new("/data/imagery"), &CrawlParams::default())?;
    let preview = OverviewParams { width: 512, format: OutputFormat::Jpeg };

    for dataset in crawler.by_ref() {
        println!("{:?} -> {:?}", dataset.path(), dataset.metadata.get("imgdate"));
        let _jpeg = generate_overview_to_buffer(&dataset, &preview)?;
    }
    println!("{} files failed", crawler.errors().len());
    Ok(())
}
```

Custom formats
--------------
Implement [`Driver`] and register a [`FormatDescriptor`] ahead of the built-in
ones; registration order is match priority.

```rust,no_run
use std::path::Path;
use std::sync::Arc;
use rastermeta::core::crawler::Crawler;
use rastermeta::io::formats::{new_builtin_registry, DefaultDriver};
use rastermeta::{CrawlParams, FormatDescriptor};

fn main() -> rastermeta::Result<()> {
    let mut registry = new_builtin_registry()?;
    registry.register(FormatDescriptor::new("ecw", &[r"\.ecw$"], Arc::new(DefaultDriver))?);
    let crawler = Crawler::new(&registry, Path::new("/data"), &CrawlParams::default())?;
    println!("{} datasets", crawler.count());
    Ok(())
}
```

Error handling
--------------
All public functions return `rastermeta::Result<T>`. During a crawl, failures
of individual files never abort the iteration: they are collected as
[`CrawlError`] records with a short message and a detailed cause chain.

```rust,no_run
use std::path::Path;
use rastermeta::{crawl, CrawlParams, Error};

fn main() {
    match crawl(Path::new("/not/a/dir"), &CrawlParams::default()) {
        Ok(_) => {}
        Err(Error::InvalidArgument { arg, value }) => eprintln!("bad {arg}: {value}"),
        Err(other) => eprintln!("Other error: {other}"),
    }
}
```

Useful modules
--------------
- [`api`]: high-level, ergonomic entry points.
- [`core`]: crawler, registry, dataset contract, mosaic builder, previews.
- [`io`]: decoders, virtual filesystem, GDAL adapters, format drivers and writers.
- [`error`]: crate-level `Error` and `Result`.
"#]

// Core modules (public)
pub mod api;
pub mod core;
pub mod error;
pub mod io;
pub mod types;

#[cfg(test)]
pub(crate) mod testutil;

// Curated public API surface
// Types
pub use core::crawler::{CrawlError, Crawler};
pub use core::dataset::{Dataset, Driver, FileCandidate, Metadata, MetadataRecord, RasterSource};
pub use core::mosaic::{MosaicPlan, build_vrt};
pub use core::overview::{OverviewOutput, OverviewRequest, OverviewTarget};
pub use core::params::{CrawlParams, OverviewParams};
pub use core::registry::{FormatDescriptor, FormatRegistry};
pub use error::{Error, Result};
pub use types::OutputFormat;

// Readers
pub use io::gdal::{GdalError, GdalMetadata, GdalRaster};

// High-level API re-exports
pub use api::{
    CrawlReport, builtin_registry, crawl, crawl_directory, generate_overview_to_buffer,
    generate_overview_to_path, write_records_json,
};
