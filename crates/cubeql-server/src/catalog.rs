//! Read-only views over registered cube metadata

use std::fmt::Write;

use cubeql_model::{Cube, Dimension};
use serde::Serialize;

/// One line of the cube listing
#[derive(Debug, Clone, Serialize)]
pub struct CubeListing {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    pub fact_table: String,
    pub dimensions: Vec<String>,
    pub measures: Vec<String>,
}

impl CubeListing {
    pub fn from_cube(cube: &Cube) -> Self {
        Self {
            name: cube.name.clone(),
            caption: cube.caption.clone(),
            fact_table: cube.fact_table.qualified_name(),
            dimensions: cube.dimensions.iter().map(|d| d.name.clone()).collect(),
            measures: cube.measures.iter().map(|m| m.name.clone()).collect(),
        }
    }
}

/// Markdown rendering with captions and format strings
pub fn render_markdown(cube: &Cube) -> String {
    let mut out = String::new();
    let _ = write!(out, "# {}", cube.name);
    if let Some(caption) = &cube.caption {
        let _ = write!(out, " ({caption})");
    }
    let _ = writeln!(out, "\n\nFact table: `{}`\n", cube.fact_table.qualified_name());

    out.push_str("## Measures\n\n");
    out.push_str("| Measure | Aggregator | Column | Format | Caption |\n");
    out.push_str("|---|---|---|---|---|\n");
    for measure in &cube.measures {
        let _ = writeln!(
            out,
            "| {} | {} | `{}` | {} | {} |",
            measure.name,
            measure.aggregator,
            measure.column,
            cell(measure.format_string.as_deref()),
            cell(measure.caption.as_deref()),
        );
    }

    for dimension in &cube.dimensions {
        render_dimension(&mut out, cube, dimension);
    }
    out
}

fn render_dimension(out: &mut String, cube: &Cube, dimension: &Dimension) {
    let _ = write!(out, "\n## Dimension: {}", dimension.name);
    if let Some(caption) = &dimension.caption {
        let _ = write!(out, " ({caption})");
    }
    out.push_str("\n\n");
    match (&dimension.table, &dimension.foreign_key) {
        (Some(table), Some(fk)) => {
            let _ = writeln!(
                out,
                "Table `{}` joined on `{}.{fk}` = `{}.{}`\n",
                table.qualified_name(),
                cube.fact_table.qualified_name(),
                table.qualified_name(),
                dimension.primary_key,
            );
        }
        (Some(table), None) => {
            let _ = writeln!(out, "Table `{}`\n", table.qualified_name());
        }
        (None, _) => out.push_str("Degenerate: columns live on the fact table\n\n"),
    }

    out.push_str("| Level | Column | Ordinal | Caption |\n");
    out.push_str("|---|---|---|---|\n");
    for level in &dimension.levels {
        let _ = writeln!(
            out,
            "| {} | `{}` | {} | {} |",
            level.name,
            level.column,
            cell(level.ordinal_column.as_deref()),
            cell(level.caption.as_deref()),
        );
    }
}

fn cell(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

#[cfg(test)]
mod tests {
    use super::*;
    use cubeql_model::{Aggregator, Level, Measure, TableRef};

    fn cube() -> Cube {
        Cube {
            name: "Sales".to_string(),
            fact_table: TableRef::new("fact_sales"),
            dimensions: vec![Dimension {
                name: "Date".to_string(),
                foreign_key: Some("date_id".to_string()),
                table: Some(TableRef::new("dim_date")),
                primary_key: "id".to_string(),
                levels: vec![Level {
                    name: "Month".to_string(),
                    column: "month_name".to_string(),
                    ordinal_column: Some("month_num".to_string()),
                    caption: None,
                }],
                caption: Some("Calendar".to_string()),
            }],
            measures: vec![Measure {
                name: "SalesAmount".to_string(),
                column: "sales_amount".to_string(),
                aggregator: Aggregator::Sum,
                format_string: Some("#,##0.00".to_string()),
                caption: Some("Sales Amount".to_string()),
            }],
            caption: Some("Retail Sales".to_string()),
        }
    }

    #[test]
    fn test_listing() {
        let listing = CubeListing::from_cube(&cube());
        assert_eq!(listing.fact_table, "fact_sales");
        assert_eq!(listing.dimensions, vec!["Date"]);
        assert_eq!(listing.measures, vec!["SalesAmount"]);
    }

    #[test]
    fn test_markdown_carries_captions_and_formats() {
        let markdown = render_markdown(&cube());
        assert!(markdown.starts_with("# Sales (Retail Sales)\n\nFact table: `fact_sales`\n"));
        assert!(markdown.contains("| SalesAmount | sum | `sales_amount` | #,##0.00 | Sales Amount |"));
        assert!(markdown.contains("## Dimension: Date (Calendar)"));
        assert!(markdown.contains("joined on `fact_sales.date_id` = `dim_date.id`"));
        assert!(markdown.contains("| Month | `month_name` | month_num | - |"));
    }
}
