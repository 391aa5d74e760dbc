//! Stations command: per-station listing with valid point counts
//!
//! Every unique station name is queried through the time series API (with
//! blocks of the same name merged), so the counts reflect what a consumer
//! of the container would receive.

use super::shared::{CommandStats, create_progress_bar, read_container};
use crate::app::models::StationData;
use crate::app::services::ungridded::{QueryOptions, UngriddedData};
use crate::cli::args::{OutputFormat, StationsArgs};
use crate::config::Config;
use anyhow::Result;
use colored::*;
use tracing::{info, warn};

/// One line of the station listing
#[derive(Debug, Clone, PartialEq)]
pub struct StationRow {
    pub station_name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub blocks: usize,
    /// (variable, valid values) in variable order
    pub counts: Vec<(String, usize)>,
}

impl StationRow {
    fn from_station(station: &StationData) -> Self {
        Self {
            station_name: station.station_name().to_string(),
            latitude: station.meta.latitude,
            longitude: station.meta.longitude,
            altitude: station.meta.altitude,
            blocks: station.meta_indices.len(),
            counts: station
                .series
                .iter()
                .map(|(var, series)| (var.clone(), series.valid_count()))
                .collect(),
        }
    }
}

pub fn run_stations(args: &StationsArgs, config: &Config, show_progress: bool) -> Result<CommandStats> {
    let (_, data) = read_container(&args.input)?;

    let mut opts = QueryOptions::from_config(&config.query).with_resample_how(args.how);
    if let Some(freq) = args.freq {
        opts = opts.with_freq(freq);
    }

    let vars: Vec<&str> = args.vars.iter().map(String::as_str).collect();
    let (rows, failed) = collect_station_rows(&data, &vars, &opts, show_progress)?;

    match args.output_format {
        OutputFormat::Human => print_human(&rows, failed),
        OutputFormat::Csv => print_csv(&rows),
    }

    Ok(CommandStats {
        containers_read: 1,
        rows_in: data.shape().0,
        blocks_out: rows.len(),
        ..Default::default()
    })
}

/// Query every unique station name; returns the rows and the failure count
pub fn collect_station_rows(
    data: &UngriddedData,
    vars: &[&str],
    opts: &QueryOptions,
    show_progress: bool,
) -> Result<(Vec<StationRow>, usize)> {
    let mut opts = opts.clone();
    opts.allow_wildcards = false;
    opts.merge_if_multi = true;

    let names = data.unique_station_names();
    let progress = show_progress.then(|| create_progress_bar(names.len() as u64, "Querying stations"));

    let mut rows = Vec::with_capacity(names.len());
    let mut failed = 0;
    for name in &names {
        if let Some(pb) = &progress {
            pb.set_message(name.clone());
        }
        match data.to_station_data_by_name(name, vars, &opts) {
            Ok(station) => rows.push(StationRow::from_station(&station)),
            Err(e) if e.is_recoverable() => {
                warn!("Skipping station {}: {}", name, e);
                failed += 1;
            }
            Err(e) => return Err(e.into()),
        }
        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = &progress {
        pb.finish_and_clear();
    }
    info!("Listed {} of {} stations", rows.len(), names.len());
    Ok((rows, failed))
}

fn print_human(rows: &[StationRow], failed: usize) {
    println!(
        "\n{} ({} stations)",
        "Stations".bright_green().bold(),
        rows.len().to_string().bright_white().bold()
    );
    println!("{}", "━".repeat(60));
    for row in rows {
        let counts: Vec<String> = row
            .counts
            .iter()
            .map(|(var, n)| format!("{}={}", var, n))
            .collect();
        println!(
            "  {:<30} {:>8.3} {:>9.3} {:>7.0}m  {}",
            row.station_name.bright_cyan(),
            row.latitude,
            row.longitude,
            row.altitude,
            counts.join(" ")
        );
        if row.blocks > 1 {
            println!("  {}", format!("merged from {} blocks", row.blocks).bright_black());
        }
    }
    if failed > 0 {
        println!(
            "{} {} stations without data for the selection",
            "Skipped".bright_yellow().bold(),
            failed
        );
    }
    println!();
}

fn print_csv(rows: &[StationRow]) {
    println!("station_name,latitude,longitude,altitude,variable,valid_values");
    for row in rows {
        for (var, count) in &row.counts {
            println!(
                "{},{},{},{},{},{}",
                row.station_name, row.latitude, row.longitude, row.altitude, var, count
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::ungridded::tests::{
        create_multi_instrument_container, create_two_var_container,
    };

    #[test]
    fn test_collect_station_rows_counts_valid_values() {
        let data = create_two_var_container();
        let (rows, failed) =
            collect_station_rows(&data, &["od550aer"], &QueryOptions::default(), false).unwrap();

        assert_eq!(failed, 0);
        let names: Vec<_> = rows.iter().map(|r| r.station_name.as_str()).collect();
        assert_eq!(names, vec!["Leipzig", "Mace_Head"]);
        assert!(rows.iter().all(|r| r.counts.len() == 1 && r.counts[0].0 == "od550aer"));
    }

    #[test]
    fn test_collect_station_rows_merges_blocks_of_same_name() {
        let data = create_multi_instrument_container();
        let (rows, _) = collect_station_rows(&data, &[], &QueryOptions::default(), false).unwrap();

        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].station_name, "Zugspitze");
        assert_eq!(rows[0].blocks, 2);
    }
}
