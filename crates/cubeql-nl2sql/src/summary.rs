//! Compact schema descriptions for prompts and metadata retrieval

use std::fmt::Write;

use cubeql_model::{Cube, Dimension};

/// Markdown description of one cube: tables, join keys, measures and levels
/// with the physical column each one reads.
pub fn describe_cube(cube: &Cube) -> String {
    let fact = cube.fact_table.qualified_name();
    let mut out = String::new();

    let _ = writeln!(out, "## Cube: {}", cube.name);
    if let Some(caption) = &cube.caption {
        let _ = writeln!(out, "Caption: {caption}");
    }
    let _ = writeln!(out, "Fact table: {fact}");

    out.push_str("\n### Measures\n");
    for measure in &cube.measures {
        let expr = measure.aggregator.apply(&format!("{fact}.{}", measure.column));
        let _ = write!(out, "- {}: {expr}", measure.name);
        if let Some(caption) = &measure.caption {
            let _ = write!(out, " \"{caption}\"");
        }
        out.push('\n');
    }

    out.push_str("\n### Dimensions\n");
    for dimension in &cube.dimensions {
        describe_dimension(&mut out, &fact, dimension);
    }
    out.trim_end().to_string()
}

fn describe_dimension(out: &mut String, fact: &str, dimension: &Dimension) {
    let table = match (&dimension.table, &dimension.foreign_key) {
        (Some(table), Some(fk)) => {
            let table = table.qualified_name();
            let _ = writeln!(
                out,
                "- {} (table: {table}, join: {fact}.{fk} = {table}.{})",
                dimension.name, dimension.primary_key
            );
            table
        }
        (Some(table), None) => {
            let table = table.qualified_name();
            let _ = writeln!(out, "- {} (table: {table})", dimension.name);
            table
        }
        (None, _) => {
            let _ = writeln!(out, "- {} (columns on the fact table)", dimension.name);
            fact.to_string()
        }
    };
    for level in &dimension.levels {
        let _ = write!(out, "  - Level {}: {table}.{}", level.name, level.column);
        if let Some(ordinal) = &level.ordinal_column {
            let _ = write!(out, " (sort by {table}.{ordinal})");
        }
        out.push('\n');
    }
}

/// Descriptions of several cubes separated by blank lines
pub fn describe_cubes<'a>(cubes: impl IntoIterator<Item = &'a Cube>) -> String {
    cubes
        .into_iter()
        .map(describe_cube)
        .collect::<Vec<_>>()
        .join("\n\n")
}
