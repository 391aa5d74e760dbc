//! Info command: container summary

use super::shared::{CommandStats, read_container};
use crate::app::services::cache_handler::CacheHeader;
use crate::app::services::ungridded::UngriddedData;
use crate::cli::args::InfoArgs;
use anyhow::Result;
use colored::*;

pub fn run_info(args: &InfoArgs) -> Result<CommandStats> {
    let (header, data) = read_container(&args.input)?;
    print_summary(&args.input.display().to_string(), &header, &data);

    if args.history {
        print_history(&data);
    }

    Ok(CommandStats {
        containers_read: 1,
        rows_in: data.shape().0,
        blocks_out: data.num_meta_blocks(),
        ..Default::default()
    })
}

fn print_summary(name: &str, header: &CacheHeader, data: &UngriddedData) {
    println!("\n{}", "Ungridded Container".bright_green().bold());
    println!("{}", "━".repeat(40));
    println!("File: {}", name.bright_cyan());
    println!(
        "Rows: {}  Metadata blocks: {}  Stations: {}",
        data.shape().0.to_string().bright_white().bold(),
        data.num_meta_blocks().to_string().bright_white().bold(),
        data.unique_station_names().len().to_string().bright_white().bold()
    );
    println!("Datasets: {}", data.contains_datasets().join(", "));

    let instruments = data.contains_instruments();
    if !instruments.is_empty() {
        println!("Instruments: {}", instruments.join(", "));
    }
    let countries = data.countries_available();
    if !countries.is_empty() {
        println!("Countries: {}", countries.join(", "));
    }

    match data.time_range() {
        Some((start, stop)) => println!(
            "Time range: {} to {}",
            start.format("%Y-%m-%d %H:%M"),
            stop.format("%Y-%m-%d %H:%M")
        ),
        None => println!("Time range: {}", "none".bright_black()),
    }

    println!("\n{}", "Variables".bright_green().bold());
    for var_name in data.contains_vars() {
        let valid = data.num_obs_var_valid(&var_name).unwrap_or(0);
        let ts_types: Vec<String> = data
            .ts_types_var(&var_name)
            .iter()
            .map(|t| t.to_string())
            .collect();
        println!(
            "  {} {} valid values {}",
            var_name.bright_cyan(),
            valid.to_string().bright_white().bold(),
            format!("[{}]", ts_types.join(", ")).bright_black()
        );
    }

    for (data_id, revision) in data.data_revision() {
        println!("Revision {}: {}", data_id, revision);
    }

    println!("\n{}", "Cache header".bright_green().bold());
    println!(
        "  library {}  container {}  writer {}  reader {}",
        header.library_version,
        header.ungridded_version,
        header.cacher_version,
        header.reader_version
    );
    if let Some(newest) = &header.newest_file {
        println!("  newest source file: {}", newest);
    }

    if data.is_filtered() {
        println!(
            "\n{} ({} operations, use --history to list)",
            "Filtered".bright_yellow().bold(),
            data.filter_history().len()
        );
    }
    println!();
}

fn print_history(data: &UngriddedData) {
    println!("{}", "Filter history".bright_green().bold());
    if data.filter_history().is_empty() {
        println!("  {}", "(empty)".bright_black());
    }
    for entry in data.filter_history() {
        println!(
            "  {} {}",
            entry.applied_at.format("%Y-%m-%d %H:%M:%S").to_string().bright_black(),
            entry.description
        );
    }
    println!();
}
