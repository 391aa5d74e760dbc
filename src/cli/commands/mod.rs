//! Command implementations for the ungridded observation CLI
//!
//! Each command is implemented in its own module and works on container
//! files; the cache command manages the configured cache directory.

pub mod cache;
pub mod export;
pub mod filter;
pub mod info;
pub mod merge;
pub mod shared;
pub mod stations;

pub use shared::CommandStats;

use crate::cli::args::{Args, Commands};
use anyhow::{Result, bail};
use shared::{load_configuration, setup_logging};
use std::time::Instant;
use tracing::debug;

/// Main command runner
///
/// Loads the configuration, sets up logging and dispatches to the
/// subcommand handler.
pub fn run(args: Args) -> Result<CommandStats> {
    let start_time = Instant::now();

    args.validate()?;
    let config = load_configuration(&args)?;
    setup_logging(&args, &config)?;
    debug!("Command line arguments: {:?}", args);

    let Some(command) = args.command.clone() else {
        bail!("No command given, see --help");
    };

    let mut stats = match command {
        Commands::Info(info_args) => info::run_info(&info_args)?,
        Commands::Stations(stations_args) => {
            stations::run_stations(&stations_args, &config, args.show_progress())?
        }
        Commands::Filter(filter_args) => filter::run_filter(&filter_args, &config)?,
        Commands::Extract(extract_args) => filter::run_extract(&extract_args)?,
        Commands::Merge(merge_args) => merge::run_merge(&merge_args)?,
        Commands::Export(export_args) => export::run_export(&export_args)?,
        Commands::Cache(cache_args) => cache::run_cache(&cache_args, &config)?,
    };

    stats.processing_time = start_time.elapsed();
    debug!(
        "Command finished in {:.2}s",
        stats.processing_time.as_secs_f64()
    );
    Ok(stats)
}
