//! Core building blocks: the crawler and format registry, the dataset/driver
//! contract, geometry helpers, the virtual mosaic builder, the preview
//! pipeline and crawl parameters. These are consumed by the high-level `api`
//! module.
pub mod crawler;
pub mod dataset;
pub mod geometry;
pub mod mosaic;
pub mod overview;
pub mod params;
pub mod registry;
