use clap::Parser;
use std::process;
use ungridded_obs::cli::{args::Args, commands};

fn main() {
    // Parse command line arguments
    let args = Args::parse();

    // If no subcommand was provided, show help and available commands
    if args.command.is_none() {
        show_help_and_commands();
        process::exit(0);
    }

    match commands::run(args) {
        Ok(_stats) => {
            // Success - results have already been reported by the command
            process::exit(0);
        }
        Err(error) => {
            eprintln!("Error: {:#}", error);
            process::exit(1);
        }
    }
}

/// Show help information and available commands when no subcommand is provided
fn show_help_and_commands() {
    println!("Ungridded - Station Observation Container Tool");
    println!("==============================================");
    println!();
    println!("Inspect, filter, merge and export cached ungridded observation");
    println!("containers (station time series of ground-based networks).");
    println!();
    println!("USAGE:");
    println!("    ungridded <COMMAND> [OPTIONS]");
    println!();
    println!("COMMANDS:");
    println!("    info        Summarize a container file");
    println!("    stations    List stations with valid point counts");
    println!("    filter      Filter by metadata, region, altitude, flags and outliers");
    println!("    extract     Extract variables into a new container");
    println!("    merge       Merge container files");
    println!("    export      Export a long-format Parquet or CSV table");
    println!("    cache       List or clear the observation cache");
    println!();
    println!("EXAMPLES:");
    println!("    # Stations of a container with monthly point counts:");
    println!("    ungridded stations aeronet_od550aer.bin --freq monthly");
    println!();
    println!("    # Keep European stations above 1000 m, excluding one country:");
    println!("    ungridded filter data.bin -o alpine.bin --region Europe \\");
    println!("                     --altitude 1000,5000 'country!=Italy'");
    println!();
    println!("    # Export to Parquet:");
    println!("    ungridded export alpine.bin -o alpine.parquet");
    println!();
    println!("For detailed help on any command, use:");
    println!("    ungridded <COMMAND> --help");
}
