//! Entity type definitions

pub mod lot;
pub mod parameter;
pub mod table;
pub mod wafer;

pub use lot::{Lot, LotError, DEFAULT_PASS_BIN};
pub use parameter::{Parameter, ParameterStats};
pub use table::{Column, DataTable, TableError, Value};
pub use wafer::{ChipData, Wafer, WaferError};
