//! Pivot query compiler and drill-down state machine
//!
//! [`compile`] turns a [`PivotConfig`](cubeql_model::PivotConfig) into one
//! aggregate statement over a cube's star schema. [`effective_config`] folds a
//! caller's [`DrillState`] into a pivot configuration; it is the only path
//! that adds levels the caller did not ask for.

mod compile;
mod drill;
mod error;

pub use compile::{compile, CompiledQuery, FilterOperator};
pub use drill::{effective_config, DrillKey, DrillState};
pub use error::{CompileError, FieldKind};
