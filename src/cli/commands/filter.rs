//! Filter and extract commands

use super::shared::{CommandStats, read_container, write_container};
use crate::app::services::ungridded::{FilterSpec, MetaFilter};
use crate::cli::args::{ExtractArgs, FilterArgs};
use crate::config::Config;
use anyhow::{Context, Result};
use colored::*;
use tracing::info;

/// Build the filter pipeline described by the command arguments
pub fn filter_spec(args: &FilterArgs) -> Result<FilterSpec> {
    Ok(FilterSpec {
        meta: MetaFilter::parse_args(&args.conditions).context("Invalid filter condition")?,
        set_flags_nan: args.set_flags_nan,
        remove_outliers: args.remove_outliers,
        region: args.region.clone(),
        altitude_range: args.altitude_range()?,
        ..Default::default()
    })
}

pub fn run_filter(args: &FilterArgs, config: &Config) -> Result<CommandStats> {
    args.validate()?;
    let (header, data) = read_container(&args.input)?;
    let spec = filter_spec(args)?;

    let filtered = data.apply_filters(&spec, &config.outliers)?;
    if !spec.meta.is_empty() {
        info!("Applied metadata filter: {}", spec.meta.describe());
    }
    write_container(&args.output, &header, &filtered)?;

    println!(
        "{} {} of {} metadata blocks ({} rows) -> {}",
        "Kept".bright_green().bold(),
        filtered.num_meta_blocks().to_string().bright_white().bold(),
        data.num_meta_blocks(),
        filtered.shape().0,
        args.output.display().to_string().bright_cyan()
    );

    Ok(CommandStats {
        containers_read: 1,
        rows_in: data.shape().0,
        rows_out: filtered.shape().0,
        blocks_out: filtered.num_meta_blocks(),
        output: Some(args.output.clone()),
        ..Default::default()
    })
}

pub fn run_extract(args: &ExtractArgs) -> Result<CommandStats> {
    args.validate()?;
    let (header, data) = read_container(&args.input)?;

    let subset = match &args.dataset {
        Some(data_id) => data.extract_dataset(data_id)?,
        None => data.clone(),
    };
    let vars: Vec<&str> = args
        .vars
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .collect();
    let extracted = subset.extract_vars(&vars)?;
    write_container(&args.output, &header, &extracted)?;

    println!(
        "{} {} ({} rows, {} metadata blocks) -> {}",
        "Extracted".bright_green().bold(),
        vars.join(", ").bright_cyan(),
        extracted.shape().0,
        extracted.num_meta_blocks(),
        args.output.display()
    );

    Ok(CommandStats {
        containers_read: 1,
        rows_in: data.shape().0,
        rows_out: extracted.shape().0,
        blocks_out: extracted.num_meta_blocks(),
        output: Some(args.output.clone()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::cache_handler::CacheHeader;
    use crate::app::services::ungridded::tests::create_two_var_container;
    use tempfile::TempDir;

    fn filter_args(input: std::path::PathBuf, output: std::path::PathBuf) -> FilterArgs {
        FilterArgs {
            input,
            output,
            conditions: vec![],
            region: None,
            altitude: None,
            set_flags_nan: false,
            remove_outliers: false,
            force_overwrite: false,
        }
    }

    #[test]
    fn test_run_filter_writes_matching_blocks() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.bin");
        let output = temp_dir.path().join("out.bin");
        write_container(&input, &CacheHeader::new("t", None, None), &create_two_var_container())
            .unwrap();

        let mut args = filter_args(input, output.clone());
        args.conditions = vec!["station_name=Leip*".to_string()];
        let stats = run_filter(&args, &Config::default()).unwrap();

        assert_eq!(stats.blocks_out, 1);
        let (_, filtered) = read_container(&output).unwrap();
        assert_eq!(filtered.station_names(), vec!["Leipzig"]);
        assert!(filtered.is_filtered());
    }

    #[test]
    fn test_filter_spec_rejects_malformed_condition() {
        let mut args = filter_args("in.bin".into(), "out.bin".into());
        args.conditions = vec!["no-separator".to_string()];
        assert!(filter_spec(&args).is_err());
    }

    #[test]
    fn test_run_extract_keeps_requested_variable() {
        let temp_dir = TempDir::new().unwrap();
        let input = temp_dir.path().join("in.bin");
        let output = temp_dir.path().join("out.bin");
        write_container(&input, &CacheHeader::new("t", None, None), &create_two_var_container())
            .unwrap();

        let args = ExtractArgs {
            input,
            output: output.clone(),
            vars: vec!["od550aer".to_string()],
            dataset: None,
            force_overwrite: false,
        };
        let stats = run_extract(&args).unwrap();

        assert_eq!(stats.rows_out, 4);
        let (_, extracted) = read_container(&output).unwrap();
        assert_eq!(extracted.contains_vars(), vec!["od550aer"]);
    }
}
