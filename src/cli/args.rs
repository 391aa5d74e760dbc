//! Command-line argument definitions for the ungridded observation tool
//!
//! This module defines the CLI interface using the clap derive API. Every
//! command works on container files written by the cache handler.

use crate::app::services::resample::ResampleHow;
use crate::{Error, Result, TsType};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

/// CLI arguments for the ungridded observation tool
#[derive(Debug, Clone, Parser)]
#[command(
    name = "ungridded",
    version,
    about = "Inspect, filter, merge and export cached ungridded observation containers",
    long_about = "Works on container files produced by the observation cache: shows \
                  summaries and station listings, applies metadata/region/outlier filters, \
                  extracts variables, merges containers and exports long-format tables \
                  to Parquet or CSV."
)]
pub struct Args {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Path to configuration file
    ///
    /// TOML configuration file. If not specified, looks for
    /// config.toml in the user config directory.
    #[arg(
        short = 'c',
        long = "config",
        value_name = "FILE",
        global = true,
        help = "Path to configuration file (TOML format)"
    )]
    pub config_file: Option<PathBuf>,

    /// Logging verbosity level
    #[arg(
        short = 'v',
        long = "verbose",
        action = clap::ArgAction::Count,
        global = true,
        help = "Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)"
    )]
    pub verbose: u8,

    /// Suppress output (quiet mode)
    #[arg(
        short = 'q',
        long = "quiet",
        global = true,
        conflicts_with = "verbose",
        help = "Suppress output except errors"
    )]
    pub quiet: bool,
}

/// Available subcommands
#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Summarize a container file
    Info(InfoArgs),
    /// List stations of a container with per-variable point counts
    Stations(StationsArgs),
    /// Filter a container by metadata, region, altitude, flags and outliers
    Filter(FilterArgs),
    /// Extract variables (and optionally one dataset) into a new container
    Extract(ExtractArgs),
    /// Merge container files into one
    Merge(MergeArgs),
    /// Export a container as a long-format table
    Export(ExportArgs),
    /// List or clear the observation cache
    Cache(CacheArgs),
}

/// Arguments for the info command
#[derive(Debug, Clone, Parser)]
pub struct InfoArgs {
    /// Container file to summarize
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Also print the filter history
    #[arg(long = "history", help = "Print the filter history")]
    pub history: bool,
}

/// Arguments for the stations command
#[derive(Debug, Clone, Parser)]
pub struct StationsArgs {
    /// Container file
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Variables to count (comma-separated, default: all)
    #[arg(
        long = "vars",
        value_name = "LIST",
        value_delimiter = ',',
        help = "Comma-separated variables to count"
    )]
    pub vars: Vec<String>,

    /// Resample to this frequency before counting (e.g. daily, monthly)
    #[arg(long = "freq", value_name = "TS_TYPE")]
    pub freq: Option<TsType>,

    /// Aggregation used when resampling
    #[arg(long = "how", value_name = "HOW", default_value = "mean")]
    pub how: ResampleHow,

    /// Output format for the station listing
    #[arg(long = "format", value_enum, default_value = "human")]
    pub output_format: OutputFormat,
}

/// Arguments for the filter command
#[derive(Debug, Clone, Parser)]
pub struct FilterArgs {
    /// Container file to filter
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Output container file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Metadata conditions as key=value or key!=value
    ///
    /// Values may be wildcard patterns (station_name=Leip*), comma-separated
    /// lists (country=Chad,Niger) or numeric ranges (latitude=[30,60]).
    #[arg(value_name = "CONDITION")]
    pub conditions: Vec<String>,

    /// Keep only stations inside a named region
    #[arg(long = "region", value_name = "NAME")]
    pub region: Option<String>,

    /// Keep only stations within an altitude range (low,high in m)
    #[arg(long = "altitude", value_name = "LOW,HIGH")]
    pub altitude: Option<String>,

    /// Set flagged values to NaN
    #[arg(long = "set-flags-nan")]
    pub set_flags_nan: bool,

    /// Remove values outside the configured valid range of each variable
    #[arg(long = "remove-outliers")]
    pub remove_outliers: bool,

    /// Force overwrite of an existing output file
    #[arg(long = "force")]
    pub force_overwrite: bool,
}

/// Arguments for the extract command
#[derive(Debug, Clone, Parser)]
pub struct ExtractArgs {
    /// Container file
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Output container file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Variables to extract (comma-separated)
    #[arg(long = "vars", value_name = "LIST", value_delimiter = ',', required = true)]
    pub vars: Vec<String>,

    /// Only keep this dataset
    #[arg(long = "dataset", value_name = "DATA_ID")]
    pub dataset: Option<String>,

    /// Force overwrite of an existing output file
    #[arg(long = "force")]
    pub force_overwrite: bool,
}

/// Arguments for the merge command
#[derive(Debug, Clone, Parser)]
pub struct MergeArgs {
    /// Container files to merge (in order)
    #[arg(value_name = "FILE", num_args = 2.., required = true)]
    pub inputs: Vec<PathBuf>,

    /// Output container file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Coalesce metadata blocks that only differ in these keys
    #[arg(long = "coalesce-ignoring", value_name = "KEYS", value_delimiter = ',')]
    pub coalesce_ignoring: Option<Vec<String>>,

    /// Force overwrite of an existing output file
    #[arg(long = "force")]
    pub force_overwrite: bool,
}

/// Arguments for the export command
#[derive(Debug, Clone, Parser)]
pub struct ExportArgs {
    /// Container file
    #[arg(value_name = "FILE")]
    pub input: PathBuf,

    /// Output table file
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output: PathBuf,

    /// Table format (default: derived from the output extension)
    #[arg(long = "format", value_enum)]
    pub format: Option<ExportFormat>,

    /// Force overwrite of an existing output file
    #[arg(long = "force")]
    pub force_overwrite: bool,
}

/// Arguments for the cache command
#[derive(Debug, Clone, Parser)]
pub struct CacheArgs {
    /// Delete all cache files
    #[arg(long = "clear")]
    pub clear: bool,
}

/// Output format options for listings
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// CSV format for data analysis
    Csv,
}

/// Table formats for export
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ExportFormat {
    Parquet,
    Csv,
}

impl Args {
    /// Determine the appropriate log level based on verbosity flags
    pub fn get_log_level(&self) -> &'static str {
        if self.quiet {
            "error"
        } else {
            match self.verbose {
                0 => "warn",
                1 => "info",
                2 => "debug",
                _ => "trace",
            }
        }
    }

    /// Check if we should show progress bars (not in quiet mode)
    pub fn show_progress(&self) -> bool {
        !self.quiet
    }

    /// Validate global arguments
    pub fn validate(&self) -> Result<()> {
        if let Some(config_file) = &self.config_file {
            if !config_file.exists() {
                return Err(Error::configuration(format!(
                    "Config file does not exist: {}",
                    config_file.display()
                )));
            }
        }
        Ok(())
    }
}

/// Fail unless `path` is an existing file
fn require_input(path: &Path) -> Result<()> {
    if !path.is_file() {
        return Err(Error::configuration(format!(
            "Input file does not exist: {}",
            path.display()
        )));
    }
    Ok(())
}

/// Fail if `path` exists and overwriting was not requested
fn check_output(path: &Path, force_overwrite: bool) -> Result<()> {
    if path.exists() && !force_overwrite {
        return Err(Error::configuration(format!(
            "Output file already exists (use --force to overwrite): {}",
            path.display()
        )));
    }
    Ok(())
}

impl FilterArgs {
    /// Validate the filter command arguments for consistency
    pub fn validate(&self) -> Result<()> {
        require_input(&self.input)?;
        check_output(&self.output, self.force_overwrite)?;
        if self.conditions.is_empty()
            && self.region.is_none()
            && self.altitude.is_none()
            && !self.set_flags_nan
            && !self.remove_outliers
        {
            return Err(Error::configuration("No filter given"));
        }
        if let Some(altitude) = &self.altitude {
            parse_range(altitude)?;
        }
        Ok(())
    }

    /// Parsed altitude range
    pub fn altitude_range(&self) -> Result<Option<(f64, f64)>> {
        self.altitude.as_deref().map(parse_range).transpose()
    }
}

impl ExtractArgs {
    pub fn validate(&self) -> Result<()> {
        require_input(&self.input)?;
        check_output(&self.output, self.force_overwrite)?;
        if self.vars.iter().all(|v| v.trim().is_empty()) {
            return Err(Error::configuration("Variable list cannot be empty"));
        }
        Ok(())
    }
}

impl MergeArgs {
    pub fn validate(&self) -> Result<()> {
        for input in &self.inputs {
            require_input(input)?;
        }
        check_output(&self.output, self.force_overwrite)
    }
}

impl ExportArgs {
    pub fn validate(&self) -> Result<()> {
        require_input(&self.input)?;
        check_output(&self.output, self.force_overwrite)?;
        self.resolve_format().map(|_| ())
    }

    /// Explicit format, else derived from the output file extension
    pub fn resolve_format(&self) -> Result<ExportFormat> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        match self
            .output
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("parquet") | Some("pq") => Ok(ExportFormat::Parquet),
            Some("csv") => Ok(ExportFormat::Csv),
            _ => Err(Error::configuration(format!(
                "Cannot derive export format from '{}', use --format",
                self.output.display()
            ))),
        }
    }
}

/// Parse "low,high" into a closed range
pub fn parse_range(text: &str) -> Result<(f64, f64)> {
    let parts: Vec<&str> = text.split(',').map(str::trim).collect();
    let parsed: Vec<f64> = parts.iter().filter_map(|p| p.parse().ok()).collect();
    match parsed[..] {
        [low, high] if parts.len() == 2 && low <= high => Ok((low, high)),
        _ => Err(Error::configuration(format!(
            "Invalid range '{}', expected LOW,HIGH with LOW <= HIGH",
            text
        ))),
    }
}
