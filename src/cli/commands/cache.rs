//! Cache command: list or clear the configured cache directory

use super::shared::{CommandStats, format_size};
use crate::app::services::cache_handler::CacheHandler;
use crate::cli::args::CacheArgs;
use crate::config::Config;
use anyhow::{Context, Result};
use colored::*;
use tracing::info;

pub fn run_cache(args: &CacheArgs, config: &Config) -> Result<CommandStats> {
    let handler = CacheHandler::new(&config.cache);
    let files = handler.list()?;

    println!(
        "{} {}{}",
        "Cache directory:".bright_green().bold(),
        handler.cache_dir().display().to_string().bright_cyan(),
        if config.cache.enabled { "" } else { " (disabled)" }
    );

    let mut total = 0u64;
    for path in &files {
        let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
        total += size;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        if args.clear {
            std::fs::remove_file(path)
                .with_context(|| format!("Failed to delete '{}'", path.display()))?;
            println!("  {} {}", "deleted".bright_red(), name);
        } else {
            println!("  {} {}", name, format!("({})", format_size(size)).bright_black());
        }
    }

    println!(
        "{} files, {}",
        files.len().to_string().bright_white().bold(),
        format_size(total)
    );
    if args.clear {
        info!("Cleared {} cache files", files.len());
    }

    Ok(CommandStats {
        containers_read: files.len(),
        ..Default::default()
    })
}
