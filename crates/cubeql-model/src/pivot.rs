//! Pivot configuration supplied by the caller per query

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::sql::quote_str;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Axis {
    Row,
    Column,
}

impl fmt::Display for Axis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Axis::Row => f.write_str("row"),
            Axis::Column => f.write_str("column"),
        }
    }
}

/// A (dimension, level) pair placed on an axis
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LevelRef {
    pub dimension: String,
    pub level: String,
}

impl LevelRef {
    pub fn new(dimension: impl Into<String>, level: impl Into<String>) -> Self {
        Self {
            dimension: dimension.into(),
            level: level.into(),
        }
    }

    pub fn matches(&self, dimension: &str, level: &str) -> bool {
        self.dimension == dimension && self.level == level
    }
}

impl fmt::Display for LevelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.dimension, self.level)
    }
}

/// A measure selected for display, optionally re-aggregated
///
/// Accepts either `"SalesAmount"` or `{"name": "SalesAmount", "aggregator": "avg"}`.
/// The override stays a raw string; the compiler validates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "MeasureInput")]
pub struct MeasureRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregator: Option<String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MeasureInput {
    Name(String),
    Detailed {
        name: String,
        #[serde(default)]
        aggregator: Option<String>,
    },
}

impl From<MeasureInput> for MeasureRef {
    fn from(input: MeasureInput) -> Self {
        match input {
            MeasureInput::Name(name) => MeasureRef {
                name,
                aggregator: None,
            },
            MeasureInput::Detailed { name, aggregator } => MeasureRef { name, aggregator },
        }
    }
}

impl MeasureRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aggregator: None,
        }
    }

    pub fn with_aggregator(name: impl Into<String>, aggregator: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            aggregator: Some(aggregator.into()),
        }
    }
}

impl From<&str> for MeasureRef {
    fn from(name: &str) -> Self {
        MeasureRef::new(name)
    }
}

/// A literal filter operand
///
/// Equality, ordering and hashing are total (floats compare by `total_cmp`)
/// so values can live in ordered sets such as the drill state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
}

impl FilterValue {
    fn rank(&self) -> u8 {
        match self {
            FilterValue::Bool(_) => 0,
            FilterValue::Int(_) => 1,
            FilterValue::Float(_) => 2,
            FilterValue::Text(_) => 3,
        }
    }

    /// SQL literal, or `None` for a non-finite float
    pub fn to_sql(&self) -> Option<String> {
        match self {
            FilterValue::Bool(true) => Some("TRUE".to_string()),
            FilterValue::Bool(false) => Some("FALSE".to_string()),
            FilterValue::Int(i) => Some(i.to_string()),
            FilterValue::Float(f) if f.is_finite() => Some(f.to_string()),
            FilterValue::Float(_) => None,
            FilterValue::Text(s) => Some(quote_str(s)),
        }
    }
}

impl PartialEq for FilterValue {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for FilterValue {}

impl PartialOrd for FilterValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FilterValue {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FilterValue::Bool(a), FilterValue::Bool(b)) => a.cmp(b),
            (FilterValue::Int(a), FilterValue::Int(b)) => a.cmp(b),
            (FilterValue::Float(a), FilterValue::Float(b)) => a.total_cmp(b),
            (FilterValue::Text(a), FilterValue::Text(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }
}

impl Hash for FilterValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            FilterValue::Bool(b) => b.hash(state),
            FilterValue::Int(i) => i.hash(state),
            FilterValue::Float(f) => f.to_bits().hash(state),
            FilterValue::Text(s) => s.hash(state),
        }
    }
}

impl fmt::Display for FilterValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterValue::Bool(b) => write!(f, "{b}"),
            FilterValue::Int(i) => write!(f, "{i}"),
            FilterValue::Float(x) => write!(f, "{x}"),
            FilterValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<bool> for FilterValue {
    fn from(v: bool) -> Self {
        FilterValue::Bool(v)
    }
}

impl From<i32> for FilterValue {
    fn from(v: i32) -> Self {
        FilterValue::Int(v.into())
    }
}

impl From<i64> for FilterValue {
    fn from(v: i64) -> Self {
        FilterValue::Int(v)
    }
}

impl From<f64> for FilterValue {
    fn from(v: f64) -> Self {
        FilterValue::Float(v)
    }
}

impl From<&str> for FilterValue {
    fn from(v: &str) -> Self {
        FilterValue::Text(v.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(v: String) -> Self {
        FilterValue::Text(v)
    }
}

/// `{dimension, level, operator, values}`; the operator is validated at compile time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterSpec {
    pub dimension: String,
    pub level: String,
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub values: Vec<FilterValue>,
}

fn default_operator() -> String {
    "=".to_string()
}

impl FilterSpec {
    pub fn new(
        dimension: impl Into<String>,
        level: impl Into<String>,
        operator: impl Into<String>,
        values: Vec<FilterValue>,
    ) -> Self {
        Self {
            dimension: dimension.into(),
            level: level.into(),
            operator: operator.into(),
            values,
        }
    }

    pub fn equals(dimension: impl Into<String>, level: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        Self::new(dimension, level, "=", vec![value.into()])
    }

    pub fn field(&self) -> LevelRef {
        LevelRef::new(self.dimension.clone(), self.level.clone())
    }
}

/// Rows, columns, measures and filters for one query against one cube
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PivotConfig {
    #[serde(default)]
    pub rows: Vec<LevelRef>,
    #[serde(default)]
    pub columns: Vec<LevelRef>,
    #[serde(default)]
    pub measures: Vec<MeasureRef>,
    #[serde(default)]
    pub filters: Vec<FilterSpec>,
}

impl PivotConfig {
    pub fn axis(&self, axis: Axis) -> &[LevelRef] {
        match axis {
            Axis::Row => &self.rows,
            Axis::Column => &self.columns,
        }
    }

    pub fn axis_mut(&mut self, axis: Axis) -> &mut Vec<LevelRef> {
        match axis {
            Axis::Row => &mut self.rows,
            Axis::Column => &mut self.columns,
        }
    }
}
