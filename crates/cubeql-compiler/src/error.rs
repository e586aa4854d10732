use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Dimension,
    Level,
    Measure,
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldKind::Dimension => f.write_str("dimension"),
            FieldKind::Level => f.write_str("level"),
            FieldKind::Measure => f.write_str("measure"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("Unknown {kind} '{name}' in cube '{cube}'")]
    UnknownField {
        cube: String,
        kind: FieldKind,
        name: String,
    },

    #[error("Filter on {field} has no values")]
    EmptyFilter { field: String },

    #[error("Measure '{measure}': unsupported aggregator '{aggregator}'")]
    UnsupportedAggregator { measure: String, aggregator: String },

    #[error("Filter on {field}: unsupported operator '{operator}'")]
    UnsupportedOperator { field: String, operator: String },

    #[error("Filter on {field}: {reason}")]
    InvalidFilter { field: String, reason: String },

    #[error("Output column '{alias}' is selected more than once")]
    DuplicateColumn { alias: String },

    #[error("Pivot selects no levels and no measures")]
    EmptySelection,
}

impl CompileError {
    /// Stable machine-readable discriminant
    pub fn kind(&self) -> &'static str {
        match self {
            CompileError::UnknownField { .. } => "unknown_field",
            CompileError::EmptyFilter { .. } => "empty_filter",
            CompileError::UnsupportedAggregator { .. } => "unsupported_aggregator",
            CompileError::UnsupportedOperator { .. } => "unsupported_operator",
            CompileError::InvalidFilter { .. } => "invalid_filter",
            CompileError::DuplicateColumn { .. } => "duplicate_column",
            CompileError::EmptySelection => "empty_selection",
        }
    }
}
