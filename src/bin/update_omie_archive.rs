use std::{error::Error, path::Path, path::PathBuf, time::Duration};

use clap::Parser;
use log::info;
use omie_harvest::db::omie::{
    config::{Category, HarvestConfig, OMIE_URL_TEMPLATE},
    harvest::Harvester,
};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Environment name, e.g., test, prod.  Variables are read from .env/<env>.env
    #[arg(short, long, default_value = "prod")]
    env: String,

    /// Folder the files are saved into, one subfolder per category
    #[arg(long, env = "OMIE_ROOT", default_value = "omie_data")]
    root: PathBuf,

    /// Append-only log of the failed downloads
    #[arg(long, env = "OMIE_LOG_FILE", default_value = "download_errors.log")]
    log_file: PathBuf,

    #[arg(long, env = "OMIE_START_YEAR", default_value_t = 2019)]
    start_year: i16,

    /// Inclusive
    #[arg(long, env = "OMIE_END_YEAR", default_value_t = 2025)]
    end_year: i16,

    /// Pause after each download in milliseconds, doubled after a failure
    #[arg(long, env = "OMIE_DELAY_MS", default_value_t = 150)]
    delay_ms: u64,

    /// Seconds to wait for a response or for the next chunk of a file
    #[arg(long, env = "OMIE_TIMEOUT_SECS", default_value_t = 15)]
    timeout_secs: u64,

    /// Json file with the categories to download, defaults to the OMIE files
    #[arg(long, env = "OMIE_CATEGORIES")]
    categories: Option<PathBuf>,

    #[arg(long, env = "OMIE_URL_TEMPLATE", default_value = OMIE_URL_TEMPLATE)]
    url_template: String,
}

/// Download all the OMIE files for the configured years.  Rerun it to pick
/// up the files that failed, the ones already on disk are skipped.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    // the env file can set any of the flags, so load it before the final parse
    let env_file = format!(".env/{}.env", Args::parse().env);
    if Path::new(&env_file).exists() {
        dotenvy::from_path(Path::new(&env_file))?;
    }
    let args = Args::parse();

    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .init();

    let categories = match &args.categories {
        Some(path) => Category::from_json_file(path)?,
        None => Category::omie_defaults(),
    };
    let config = HarvestConfig {
        root_dir: args.root,
        log_file: args.log_file,
        url_template: args.url_template,
        start_year: args.start_year,
        end_year: args.end_year,
        categories,
        delay: Duration::from_millis(args.delay_ms),
        request_timeout: Duration::from_secs(args.timeout_secs),
        chunk_timeout: Duration::from_secs(args.timeout_secs),
        ..Default::default()
    };

    let harvester = Harvester::new(config)?;
    let summary = harvester.run().await?;
    info!("Task complete, {}", summary);
    info!(
        "Check {} for any issues",
        harvester.fetcher().error_log().path().display()
    );

    Ok(())
}
