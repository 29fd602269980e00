//! flowmetrics CLI - Eurostat extracts to per-country feature tables
//!
//! # Steps
//!
//! ```bash
//! flowmetrics flows                 # migr_asytpsm -> flows_ua_agg.csv
//! flowmetrics flows-json            # flows_ua_agg.csv -> flows_ua_agg.json (+ lat/lon)
//! flowmetrics gdp                   # sdg_08_10 -> gdp_pc_clean.csv
//! flowmetrics permits               # migr_resvalid + flows -> respermits_ua_{agg,metrics}
//! flowmetrics factors --with-permits
//! flowmetrics country-summary       # support tracker workbook -> country_summary_clean.csv
//! flowmetrics coverage              # map countries vs permit data
//! flowmetrics run-all
//! ```
//!
//! Logging goes through `env_logger`; set `RUST_LOG=debug` for more.

use clap::{Parser, Subcommand};
use flowmetrics::config::PipelineConfig;
use flowmetrics::transform::pipeline::{
    run_all, run_country_summary, run_coverage, run_factors, run_flows, run_flows_json, run_gdp,
    run_permits, StepReport,
};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "flowmetrics")]
#[command(about = "Build per-country refugee flow, permit and GDP tables from Eurostat extracts", long_about = None)]
struct Cli {
    /// JSON config file (defaults apply to missing keys)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding extracts and outputs
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate refugee flows per destination country
    Flows {
        /// Flow extract (migr_asytpsm)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Add map positions to the flows table and write JSON records
    FlowsJson {
        /// Flows CSV written by `flows`
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output JSON
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// GDP per capita in the latest year
    Gdp {
        /// GDP extract (sdg_08_10)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Residence permit totals and metrics against refugee flows
    Permits {
        /// Residence permit extract (migr_resvalid)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Per-country feature table
    Factors {
        /// Merge the permit metrics table (must exist)
        #[arg(long)]
        with_permits: bool,

        /// Output CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Clean the country summary sheet of the support tracker workbook
    CountrySummary {
        /// Workbook (.xlsx)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output CSV
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Compare map countries with the permit aggregate table
    Coverage {
        /// Permit aggregate CSV
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Run every step in dependency order
    RunAll,

    /// Print the effective configuration
    ShowConfig,
}

fn main() {
    // Load .env file (if present)
    dotenvy::dotenv().ok();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.paths.data_dir = dir;
    }

    let paths = &mut config.paths;
    match &cli.command {
        Commands::Flows { input, output } => {
            set(&mut paths.flows_source, input)?;
            set(&mut paths.flows_csv, output)?;
        }
        Commands::FlowsJson { input, output } => {
            set(&mut paths.flows_csv, input)?;
            set(&mut paths.flows_json, output)?;
        }
        Commands::Gdp { input, output } => {
            set(&mut paths.gdp_source, input)?;
            set(&mut paths.gdp_csv, output)?;
        }
        Commands::Permits { input } => set(&mut paths.permits_source, input)?,
        Commands::Factors { output, .. } => set(&mut paths.factors_csv, output)?,
        Commands::CountrySummary { input, output } => {
            set(&mut paths.support_workbook, input)?;
            set(&mut paths.country_summary_csv, output)?;
        }
        Commands::Coverage { input } => set(&mut paths.permits_agg_csv, input)?,
        Commands::RunAll | Commands::ShowConfig => {}
    }

    match cli.command {
        Commands::Flows { .. } => summarize(&run_flows(&config)?),
        Commands::FlowsJson { .. } => summarize(&run_flows_json(&config)?),
        Commands::Gdp { .. } => summarize(&run_gdp(&config)?),
        Commands::Permits { .. } => summarize(&run_permits(&config)?),
        Commands::Factors { with_permits, .. } => summarize(&run_factors(&config, with_permits)?),
        Commands::CountrySummary { .. } => summarize(&run_country_summary(&config)?),
        Commands::Coverage { .. } => {
            let (_, report) = run_coverage(&config)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::RunAll => {
            for report in run_all(&config)? {
                summarize(&report);
            }
        }
        Commands::ShowConfig => println!("{}", serde_json::to_string_pretty(&config)?),
    }

    Ok(())
}

/// Command-line paths are relative to the working directory, not the data dir.
fn set(slot: &mut PathBuf, value: &Option<PathBuf>) -> std::io::Result<()> {
    if let Some(path) = value {
        *slot = absolute(path)?;
    }
    Ok(())
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

fn summarize(report: &StepReport) {
    let outputs: Vec<String> = report.outputs.iter().map(|p| p.display().to_string()).collect();
    println!("{}: {} rows -> {}", report.step, report.rows, outputs.join(", "));
    for warning in &report.warnings {
        println!("  warning: {}", warning);
    }
}
