//! CubeQL metadata model
//!
//! Canonical in-memory description of cubes, dimensions, hierarchies and
//! measures, plus the caller-supplied pivot configuration. Every other crate
//! in the workspace reads these types; none of them mutate a `Cube` in place.

mod cube;
mod pivot;
pub mod sql;

pub use cube::*;
pub use pivot::*;

/// Hard cap on the number of rows any statement may return.
///
/// Appended by the query compiler and enforced by the safety gate. Not a
/// caller or configuration knob.
pub const ROW_CAP: u64 = 1000;
