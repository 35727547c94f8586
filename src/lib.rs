//! CPDT: CP Data Toolkit
//!
//! Reads wafer-probe result grids into lots, combines wafers into one table,
//! derives calculated parameters and reports yield and parametric statistics.

pub mod cli;
pub mod core;
pub mod entities;
