//! Core module - readers, normalization and analysis over the data model

pub mod analysis;
pub mod calculated;
pub mod combine;
pub mod config;
pub mod formula;
pub mod grid;
pub mod layout;
pub mod namer;
pub mod reader;
pub mod scope;
pub mod units;

pub use analysis::{
    apply_parameter_stats, bin_counts, compute_stats, parameter_stats, stats_table,
    wafer_parameter_stats, WaferStats, YieldAnalyzer, YieldReport, YieldRow,
};
pub use calculated::{CalcDefinition, CalcReport, CalcSetup, SkipReason};
pub use combine::{combine, combine_lot, IDENTITY_COLUMNS};
pub use config::{Config, ConfigError};
pub use formula::{EvalError, Formula, FormulaError};
pub use grid::{Cell, Grid, GridError};
pub use layout::{GridLayout, LayoutKind};
pub use namer::UniqueNamer;
pub use reader::{GridReader, ReadError};
pub use scope::{find_scope, load_scope, ScopeBound, ScopeLimits};
pub use units::{Quantity, UnitError};
