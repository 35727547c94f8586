//! `cpdt combine` command - flatten a lot into one table

use std::path::PathBuf;

use console::style;
use miette::Result;

use crate::cli::helpers::{enrich_lot, load_lot};
use crate::cli::output::{print_table, save_csv};
use crate::cli::{EnrichArgs, GlobalOpts, InputArgs};
use crate::core::{combine_lot, Config};

#[derive(clap::Args, Debug)]
pub struct CombineArgs {
    #[command(flatten)]
    pub input: InputArgs,

    #[command(flatten)]
    pub enrich: EnrichArgs,

    /// Write the combined table to a CSV file instead of stdout
    #[arg(long, short = 'o')]
    pub output: Option<PathBuf>,
}

pub fn run(args: CombineArgs, global: &GlobalOpts, config: &Config) -> Result<()> {
    let mut lot = load_lot(&args.input, config)?;
    enrich_lot(&mut lot, &args.enrich)?;

    let wafers = lot.wafers().len();
    let lot_id = lot.lot_id.clone();
    let table = combine_lot(&mut lot);

    match &args.output {
        Some(path) => {
            save_csv(table, path)?;
            eprintln!(
                "{} Combined lot {} ({} wafers, {} chips, {} columns) into {}",
                style("✓").green(),
                style(&lot_id).cyan(),
                wafers,
                table.n_rows(),
                table.n_cols(),
                path.display()
            );
        }
        None => print_table(table, global.format)?,
    }
    Ok(())
}
