//! `cpdt yield` command - per-wafer yield with a lot summary

use miette::{miette, Result};

use crate::cli::helpers::load_lot;
use crate::cli::output::print_table;
use crate::cli::{GlobalOpts, InputArgs};
use crate::core::{combine, Config, YieldAnalyzer};

#[derive(clap::Args, Debug)]
pub struct YieldArgs {
    #[command(flatten)]
    pub input: InputArgs,
}

pub fn run(args: YieldArgs, global: &GlobalOpts, config: &Config) -> Result<()> {
    let lot = load_lot(&args.input, config)?;
    let analyzer = YieldAnalyzer::new(config.pass_bin, config.tracked_bins.clone());
    let report = analyzer
        .analyze_table(&combine(&lot))
        .ok_or_else(|| miette!("Yield analysis failed for lot {}", lot.lot_id))?;
    print_table(&report.to_table(), global.format)
}
