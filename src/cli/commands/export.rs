//! Export command: long-format Parquet or CSV table

use super::shared::{CommandStats, format_size, read_container};
use crate::cli::args::{ExportArgs, ExportFormat};
use anyhow::Result;
use colored::*;

pub fn run_export(args: &ExportArgs) -> Result<CommandStats> {
    args.validate()?;
    let format = args.resolve_format()?;
    let (_, data) = read_container(&args.input)?;

    let rows = match format {
        ExportFormat::Parquet => data.write_parquet(&args.output)?,
        ExportFormat::Csv => data.write_csv(&args.output)?,
    };

    let size = std::fs::metadata(&args.output).map(|m| m.len()).unwrap_or(0);
    println!(
        "{} {} rows -> {} ({})",
        "Exported".bright_green().bold(),
        rows.to_string().bright_white().bold(),
        args.output.display().to_string().bright_cyan(),
        format_size(size)
    );

    Ok(CommandStats {
        containers_read: 1,
        rows_in: data.shape().0,
        rows_out: rows,
        blocks_out: data.num_meta_blocks(),
        output: Some(args.output.clone()),
        ..Default::default()
    })
}
