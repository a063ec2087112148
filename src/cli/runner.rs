use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use rastermeta::api::{crawl_directory, write_records_json};
use rastermeta::core::params::{CrawlParams, OverviewParams};

use super::args::CliArgs;
use super::errors::AppError;

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Parameters from the optional config file with command line flags on top
pub fn resolve_params(args: &CliArgs) -> Result<CrawlParams, AppError> {
    let mut params = match &args.config {
        Some(path) => CrawlParams::from_json_file(path)?,
        None => CrawlParams::default(),
    };
    params.recurse |= args.recurse;
    params.archives |= args.archives;

    let wants_overview =
        args.overview_dir.is_some() || args.overview_width.is_some() || args.overview_format.is_some();
    if wants_overview || params.overview.is_some() {
        let mut overview = params.overview.take().unwrap_or_default();
        if let Some(width) = args.overview_width {
            overview.width = width;
        }
        if let Some(format) = args.overview_format {
            overview.format = format;
        }
        if overview.width == 0 {
            return Err(AppError::ZeroWidth { width: 0 });
        }
        params.overview = Some(overview);
    }
    Ok(params)
}

pub fn run(args: CliArgs) -> Result<(), Box<dyn std::error::Error>> {
    init_logging(args.log);

    if !args.dir.is_dir() {
        return Err(AppError::NotADirectory {
            path: args.dir.clone(),
        }
        .into());
    }
    let params = resolve_params(&args)?;
    info!("Crawling {:?} with {:?}", args.dir, params);

    let report = crawl_directory(&args.dir, args.overview_dir.as_deref(), &params)
        .map_err(AppError::from)?;

    if let Some(output) = &args.output {
        write_records_json(output, &report.records).map_err(AppError::from)?;
        info!("Wrote {} records to {:?}", report.records.len(), output);
    }

    for record in &report.records {
        println!(
            "{}\t{}",
            record.fields.get("filetype").unwrap_or("-"),
            record.fields.get("filepath").unwrap_or("-")
        );
    }
    for error in &report.errors {
        warn!("{:?}: {}", error.path, error.detail);
        eprintln!("error\t{}\t{}", error.path.display(), error.message);
    }
    println!(
        "datasets={} errors={} overviews={}",
        report.records.len(),
        report.errors.len(),
        report.overviews.len()
    );
    Ok(())
}
