//! SQL safety gate
//!
//! One validator shared by every path to the warehouse: compiled pivot
//! queries and model-generated SQL alike. A statement passes only if it is a
//! single read-only query over whitelisted tables and columns; the gate
//! injects or clamps the top-level LIMIT to [`cubeql_model::ROW_CAP`].

mod error;
mod gate;
mod scope;
mod whitelist;

pub use error::{SafetyRule, UnsafeQueryError};
pub use gate::{LimitAction, SafetyGate, ValidatedSql, MUTATING_KEYWORDS};
pub use whitelist::Whitelist;
