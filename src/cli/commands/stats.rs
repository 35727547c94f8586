//! `cpdt stats` command - parametric statistics per parameter

use miette::Result;

use crate::cli::helpers::{enrich_lot, load_lot};
use crate::cli::output::print_table;
use crate::cli::{EnrichArgs, GlobalOpts, InputArgs};
use crate::core::{stats_table, Config};

#[derive(clap::Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub enrich: EnrichArgs,

    /// One block of statistics per wafer instead of lot-wide figures
    #[arg(long)]
    pub by_wafer: bool,
}

pub fn run(args: StatsArgs, global: &GlobalOpts, config: &Config) -> Result<()> {
    let mut lot = load_lot(&args.input, config)?;
    enrich_lot(&mut lot, &args.enrich)?;
    print_table(&stats_table(&lot, args.by_wafer), global.format)
}
