use clap::Parser;
use std::path::PathBuf;

use rastermeta::types::OutputFormat;

#[derive(Parser)]
#[command(name = "rastermeta", version, about = "Raster imagery metadata crawler")]
pub struct CliArgs {
    /// Root directory to crawl
    #[arg(short, long)]
    pub dir: PathBuf,

    /// Descend into subdirectories
    #[arg(short, long, default_value_t = false)]
    pub recurse: bool,

    /// Look inside zip archives
    #[arg(long, default_value_t = false)]
    pub archives: bool,

    /// Write the metadata records to this JSON file
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Write a preview of every dataset into this directory
    #[arg(long)]
    pub overview_dir: Option<PathBuf>,

    /// Preview width in pixels
    #[arg(long)]
    pub overview_width: Option<usize>,

    /// Preview format (jpeg or tiff)
    #[arg(long, value_enum)]
    pub overview_format: Option<OutputFormat>,

    /// JSON file with crawl parameters; flags override its values
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, default_value_t = false)]
    pub log: bool,
}
