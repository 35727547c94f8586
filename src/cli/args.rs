//! Command-line arguments

use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand, ValueEnum};

use crate::cli::commands::combine::CombineArgs;
use crate::cli::commands::stats::StatsArgs;
use crate::cli::commands::yield_report::YieldArgs;
use crate::core::LayoutKind;

#[derive(Parser, Debug)]
#[command(name = "cpdt")]
#[command(author, version, about = "CP Data Toolkit - wafer-probe results to lot tables and yield")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOpts,

    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct GlobalOpts {
    /// Config file (default: ./cpdt.yaml, then the user config dir)
    #[arg(long, global = true, env = "CPDT_CONFIG")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Output format
    #[arg(short = 'f', long, global = true, value_enum, default_value_t = OutputFormat::Table)]
    pub format: OutputFormat,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Combine wafer files into one lot table
    Combine(CombineArgs),

    /// Per-wafer yield report with a lot summary row
    Yield(YieldArgs),

    /// Parametric statistics (mean, sigma, Cp, Cpk) per parameter
    Stats(StatsArgs),
}

/// How tables are printed
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Aligned table for terminals
    Table,
    /// Comma-separated values with a header row
    Csv,
    /// Array of row objects
    Json,
}

/// CLI-friendly layout enum
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum CliLayout {
    Dcp,
    Compact,
    Extended,
}

impl From<CliLayout> for LayoutKind {
    fn from(cli: CliLayout) -> Self {
        match cli {
            CliLayout::Dcp => LayoutKind::Dcp,
            CliLayout::Compact => LayoutKind::Compact,
            CliLayout::Extended => LayoutKind::Extended,
        }
    }
}

/// Input files and lot identity, shared by every command
#[derive(clap::Args, Debug, Clone)]
pub struct InputArgs {
    /// Wafer files or directories holding them
    #[arg(required = true)]
    pub inputs: Vec<PathBuf>,

    /// Lot id (default: source lot id of the first wafer)
    #[arg(long)]
    pub lot: Option<String>,

    /// Product name (default: read from the first file when the layout has it)
    #[arg(long)]
    pub product: Option<String>,

    /// Grid layout of the input files (default: from config)
    #[arg(long, value_enum)]
    pub layout: Option<CliLayout>,
}

/// Optional lot enrichment files
#[derive(clap::Args, Debug, Clone, Default)]
pub struct EnrichArgs {
    /// Calculated-parameter setup grid
    #[arg(long)]
    pub setup: Option<PathBuf>,

    /// Scope grid with per-product limit overrides
    #[arg(long)]
    pub scope: Option<PathBuf>,
}
