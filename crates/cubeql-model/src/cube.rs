//! Cube metadata: the result of parsing a schema document

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::sql::quote_ident;

/// Aggregation applied to a measure column. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Aggregator {
    Sum,
    Count,
    Avg,
    Min,
    Max,
    DistinctCount,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown aggregator '{0}' (expected one of sum, count, avg, min, max, distinct-count)")]
pub struct UnknownAggregator(pub String);

impl Aggregator {
    pub const ALL: [Aggregator; 6] = [
        Aggregator::Sum,
        Aggregator::Count,
        Aggregator::Avg,
        Aggregator::Min,
        Aggregator::Max,
        Aggregator::DistinctCount,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Aggregator::Sum => "sum",
            Aggregator::Count => "count",
            Aggregator::Avg => "avg",
            Aggregator::Min => "min",
            Aggregator::Max => "max",
            Aggregator::DistinctCount => "distinct-count",
        }
    }

    /// Render the aggregate over an already-rendered column expression
    pub fn apply(&self, column: &str) -> String {
        match self {
            Aggregator::Sum => format!("SUM({column})"),
            Aggregator::Count => format!("COUNT({column})"),
            Aggregator::Avg => format!("AVG({column})"),
            Aggregator::Min => format!("MIN({column})"),
            Aggregator::Max => format!("MAX({column})"),
            Aggregator::DistinctCount => format!("COUNT(DISTINCT {column})"),
        }
    }
}

impl FromStr for Aggregator {
    type Err = UnknownAggregator;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Aggregator::ALL
            .into_iter()
            .find(|agg| agg.as_str().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| UnknownAggregator(s.to_string()))
    }
}

impl fmt::Display for Aggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A physical table, optionally schema-qualified
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            schema: None,
            name: name.into(),
        }
    }

    pub fn with_schema(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: Some(schema.into()),
            name: name.into(),
        }
    }

    /// `schema.name` or just `name`, unquoted
    pub fn qualified_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }

    /// SQL rendering with each part quoted when needed
    pub fn to_sql(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", quote_ident(schema), quote_ident(&self.name)),
            None => quote_ident(&self.name).into_owned(),
        }
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.qualified_name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Level {
    pub name: String,
    pub column: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// A joined lookup table whose levels form a single hierarchy, coarsest first.
///
/// A dimension without a table is degenerate: its level columns live on the
/// fact table and it is never joined.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimension {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<TableRef>,
    pub primary_key: String,
    pub levels: Vec<Level>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Dimension {
    pub fn is_degenerate(&self) -> bool {
        self.table.is_none()
    }

    pub fn level(&self, name: &str) -> Option<&Level> {
        self.levels.iter().find(|l| l.name == name)
    }

    pub fn level_index(&self, name: &str) -> Option<usize> {
        self.levels.iter().position(|l| l.name == name)
    }

    /// The level a drill-down on `name` expands into, if any
    pub fn next_level(&self, name: &str) -> Option<&Level> {
        self.level_index(name).and_then(|i| self.levels.get(i + 1))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Measure {
    pub name: String,
    pub column: String,
    pub aggregator: Aggregator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format_string: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

/// A named analytical schema over one fact table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cube {
    pub name: String,
    pub fact_table: TableRef,
    pub dimensions: Vec<Dimension>,
    pub measures: Vec<Measure>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
}

impl Cube {
    pub fn dimension(&self, name: &str) -> Option<&Dimension> {
        self.dimensions.iter().find(|d| d.name == name)
    }

    pub fn measure(&self, name: &str) -> Option<&Measure> {
        self.measures.iter().find(|m| m.name == name)
    }

    /// Fact table followed by every distinct joined dimension table
    pub fn tables(&self) -> Vec<&TableRef> {
        let mut tables = vec![&self.fact_table];
        for table in self.dimensions.iter().filter_map(|d| d.table.as_ref()) {
            if !tables.contains(&table) {
                tables.push(table);
            }
        }
        tables
    }

    /// Every column the metadata declares, with the table it belongs to
    pub fn declared_columns(&self) -> Vec<(&TableRef, &str)> {
        let mut columns = Vec::new();
        for measure in &self.measures {
            columns.push((&self.fact_table, measure.column.as_str()));
        }
        for dim in &self.dimensions {
            let table = dim.table.as_ref().unwrap_or(&self.fact_table);
            if let Some(fk) = &dim.foreign_key {
                columns.push((&self.fact_table, fk.as_str()));
            }
            if !dim.is_degenerate() {
                columns.push((table, dim.primary_key.as_str()));
            }
            for level in &dim.levels {
                columns.push((table, level.column.as_str()));
                if let Some(ordinal) = &level.ordinal_column {
                    columns.push((table, ordinal.as_str()));
                }
            }
        }
        columns
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date_dimension() -> Dimension {
        Dimension {
            name: "Date".to_string(),
            foreign_key: Some("date_id".to_string()),
            table: Some(TableRef::new("dim_date")),
            primary_key: "id".to_string(),
            levels: ["Year", "Quarter", "Month"]
                .iter()
                .map(|name| Level {
                    name: name.to_string(),
                    column: name.to_lowercase(),
                    ordinal_column: None,
                    caption: None,
                })
                .collect(),
            caption: None,
        }
    }

    #[test]
    fn test_aggregator_parse_is_case_insensitive() {
        assert_eq!("SUM".parse::<Aggregator>().unwrap(), Aggregator::Sum);
        assert_eq!(" distinct-count ".parse::<Aggregator>().unwrap(), Aggregator::DistinctCount);
        assert!("median".parse::<Aggregator>().is_err());
    }

    #[test]
    fn test_aggregator_apply() {
        assert_eq!(Aggregator::Sum.apply("sales_amount"), "SUM(sales_amount)");
        assert_eq!(Aggregator::DistinctCount.apply("order_id"), "COUNT(DISTINCT order_id)");
    }

    #[test]
    fn test_next_level() {
        let dim = date_dimension();
        assert_eq!(dim.next_level("Year").map(|l| l.name.as_str()), Some("Quarter"));
        assert_eq!(dim.next_level("Month"), None);
        assert_eq!(dim.next_level("Week"), None);
    }

    #[test]
    fn test_table_ref_to_sql() {
        assert_eq!(TableRef::new("fact_sales").to_sql(), "fact_sales");
        assert_eq!(TableRef::with_schema("dw", "판매").to_sql(), "dw.\"판매\"");
    }

    #[test]
    fn test_aggregator_serde_names() {
        let json = serde_json::to_string(&Aggregator::DistinctCount).unwrap();
        assert_eq!(json, "\"distinct-count\"");
    }
}
