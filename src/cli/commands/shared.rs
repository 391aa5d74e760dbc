//! Shared components for CLI commands
//!
//! Logging setup, layered configuration loading, container file access and
//! progress reporting used by all command implementations.

use crate::app::services::cache_handler::{CacheHandler, CacheHeader};
use crate::app::services::ungridded::UngriddedData;
use crate::cli::args::Args;
use crate::config::Config;
use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Command statistics for reporting
#[derive(Debug, Clone, Default)]
pub struct CommandStats {
    /// Number of container files read
    pub containers_read: usize,
    /// Rows of the input container(s)
    pub rows_in: usize,
    /// Rows written to the output
    pub rows_out: usize,
    /// Metadata blocks of the output
    pub blocks_out: usize,
    /// Written output file
    pub output: Option<PathBuf>,
    /// Total processing time
    pub processing_time: Duration,
}

/// Format a byte count in human-readable form
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.2} {}", size, UNITS[unit_index])
    }
}

/// Set up structured logging to stderr
///
/// `RUST_LOG` takes precedence; otherwise the verbosity flags decide, and
/// without flags the configured level is used.
pub fn setup_logging(args: &Args, config: &Config) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

    let log_level = if args.quiet || args.verbose > 0 {
        args.get_log_level()
    } else {
        config.logging.level.as_str()
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("ungridded_obs={}", log_level)));

    let layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr);

    if config.logging.structured && !args.quiet {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.with_timer(fmt::time::uptime()))
            .try_init()
            .context("Failed to initialize logging")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(layer.compact())
            .try_init()
            .context("Failed to initialize logging")?;
    }

    debug!("Logging initialized at level: {}", log_level);
    Ok(())
}

/// Load configuration using the layered approach (file -> env -> args)
pub fn load_configuration(args: &Args) -> Result<Config> {
    let default_config_path = if args.config_file.is_none() {
        Config::default_config_path().ok()
    } else {
        None
    };

    let config_file = match &args.config_file {
        Some(path) => Some(path.as_path()),
        None => default_config_path
            .as_ref()
            .filter(|path| path.exists())
            .map(|path| path.as_path()),
    };

    let mut config = Config::load_layered(config_file)?;
    if args.quiet || args.verbose > 0 {
        config.logging.level = args.get_log_level().to_string();
    }
    config.validate()?;
    Ok(config)
}

/// Read a container file
pub fn read_container(path: &Path) -> Result<(CacheHeader, UngriddedData)> {
    let (header, data) = CacheHandler::read_file(path)
        .with_context(|| format!("Failed to read container '{}'", path.display()))?;
    info!(
        "Loaded {}: {} rows, {} metadata blocks",
        path.display(),
        data.shape().0,
        data.num_meta_blocks()
    );
    Ok((header, data))
}

/// Write a container file, creating parent directories
pub fn write_container(path: &Path, header: &CacheHeader, data: &UngriddedData) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory '{}'", parent.display()))?;
    }
    CacheHandler::write_file(path, header, data)
        .with_context(|| format!("Failed to write container '{}'", path.display()))?;
    info!("Wrote {} rows to {}", data.shape().0, path.display());
    Ok(())
}

/// Create a progress bar with the standard style
pub fn create_progress_bar(total: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(total);
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::ungridded::tests::create_test_container;
    use tempfile::TempDir;

    #[test]
    fn test_format_size() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(1024), "1.00 KB");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(1024 * 1024), "1.00 MB");
    }

    #[test]
    fn test_container_file_roundtrip_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("out.bin");
        let data = create_test_container();
        let header = CacheHeader::new("test", None, None);

        write_container(&path, &header, &data).unwrap();
        let (read_header, read_data) = read_container(&path).unwrap();

        assert_eq!(read_header, header);
        assert!(read_data.same_content(&data));
    }

    #[test]
    fn test_read_missing_container_has_context() {
        let err = read_container(Path::new("/nonexistent/container.bin")).unwrap_err();
        assert!(format!("{:#}", err).contains("Failed to read container"));
    }
}
