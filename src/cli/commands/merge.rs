//! Merge command

use super::shared::{CommandStats, read_container, write_container};
use crate::cli::args::MergeArgs;
use anyhow::{Context, Result};
use colored::*;
use tracing::debug;

pub fn run_merge(args: &MergeArgs) -> Result<CommandStats> {
    args.validate()?;

    let mut inputs = args.inputs.iter();
    let first = inputs.next().context("No input containers given")?;
    let (mut header, mut merged) = read_container(first)?;
    let mut rows_in = merged.shape().0;

    for path in inputs {
        let (other_header, other) = read_container(path)?;
        if other_header.reader_version != header.reader_version {
            debug!(
                "Reader versions differ ({} vs {}), keeping the first",
                header.reader_version, other_header.reader_version
            );
        }
        rows_in += other.shape().0;
        merged
            .append(other)
            .with_context(|| format!("Failed to merge '{}'", path.display()))?;
    }

    if let Some(ignore) = &args.coalesce_ignoring {
        let keys: Vec<&str> = ignore.iter().map(String::as_str).collect();
        merged = merged.merge_common_meta(&keys)?;
    }

    // The merged file no longer reflects a single source directory
    header.newest_file = None;
    header.newest_file_mtime = None;
    write_container(&args.output, &header, &merged)?;

    println!(
        "{} {} containers: {} rows, {} metadata blocks -> {}",
        "Merged".bright_green().bold(),
        args.inputs.len(),
        merged.shape().0.to_string().bright_white().bold(),
        merged.num_meta_blocks(),
        args.output.display().to_string().bright_cyan()
    );

    Ok(CommandStats {
        containers_read: args.inputs.len(),
        rows_in,
        rows_out: merged.shape().0,
        blocks_out: merged.num_meta_blocks(),
        output: Some(args.output.clone()),
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::services::cache_handler::CacheHeader;
    use crate::app::services::ungridded::tests::{
        create_multi_instrument_records, test_ingestion_config,
    };
    use crate::app::services::ungridded::UngriddedData;
    use tempfile::TempDir;

    #[test]
    fn test_run_merge_with_coalescing() {
        let temp_dir = TempDir::new().unwrap();
        let header = CacheHeader::new("t", None, None);
        let records = create_multi_instrument_records();

        let mut inputs = Vec::new();
        for (i, record) in records.iter().enumerate() {
            let path = temp_dir.path().join(format!("in{}.bin", i));
            let data =
                UngriddedData::from_station_data(std::slice::from_ref(record), &test_ingestion_config())
                    .unwrap();
            write_container(&path, &header, &data).unwrap();
            inputs.push(path);
        }

        let output = temp_dir.path().join("merged.bin");
        let args = MergeArgs {
            inputs,
            output: output.clone(),
            coalesce_ignoring: Some(vec!["instrument_name".to_string()]),
            force_overwrite: false,
        };
        let stats = run_merge(&args).unwrap();

        assert_eq!(stats.containers_read, 2);
        assert_eq!(stats.rows_in, 8);
        assert_eq!(stats.rows_out, 8);
        assert_eq!(stats.blocks_out, 1);

        let (_, merged) = read_container(&output).unwrap();
        assert_eq!(merged.num_meta_blocks(), 1);
    }
}
