use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use cubeql_model::{Aggregator, Cube, Dimension, Level, Measure, TableRef};
use tracing::debug;

use crate::dom::{self, Element};
use crate::SchemaError;

const DEFAULT_PRIMARY_KEY: &str = "id";

/// Every cube declared by one schema document, in document order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDocument {
    pub name: String,
    pub cubes: Vec<Cube>,
}

/// Parse a Mondrian-style XML schema document.
///
/// Either every cube in the document is returned or the whole document is
/// rejected.
pub fn parse_str(xml: &str) -> Result<SchemaDocument, SchemaError> {
    let root = dom::parse_document(xml)?;
    if root.name != "Schema" {
        return Err(SchemaError::UnexpectedRoot(root.name));
    }
    let schema_name = root.attr("name").unwrap_or("Default").to_string();
    let schema_scope = format!("schema '{schema_name}'");

    let mut shared = BTreeMap::new();
    for dim in root.children_named("Dimension") {
        let name = dim.required("name")?;
        if shared.insert(name, dim).is_some() {
            return Err(duplicate("shared dimension", name, &schema_scope));
        }
    }

    let mut cubes: Vec<Cube> = Vec::new();
    for element in root.children_named("Cube") {
        let cube = parse_cube(element, &shared)?;
        if cubes.iter().any(|c| c.name == cube.name) {
            return Err(duplicate("cube", &cube.name, &schema_scope));
        }
        cubes.push(cube);
    }
    if cubes.is_empty() {
        return Err(SchemaError::NoCubes(schema_name));
    }

    debug!(schema = %schema_name, cubes = cubes.len(), "Parsed schema document");
    Ok(SchemaDocument {
        name: schema_name,
        cubes,
    })
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<SchemaDocument, SchemaError> {
    let path = path.as_ref();
    let xml = std::fs::read_to_string(path).map_err(|source| SchemaError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    parse_str(&xml)
}

fn parse_cube(element: &Element, shared: &BTreeMap<&str, &Element>) -> Result<Cube, SchemaError> {
    let name = element.required("name")?.to_string();
    let scope = format!("cube '{name}'");

    let fact_table = match element.child("Table") {
        Some(table) => table_ref(table)?,
        None => element
            .attr("factTable")
            .or_else(|| element.attr("fact_table"))
            .map(TableRef::new)
            .ok_or_else(|| SchemaError::MissingFactTable(name.clone()))?,
    };

    let mut dimensions: Vec<Dimension> = Vec::new();
    for child in &element.children {
        let dimension = match child.name.as_str() {
            "Dimension" => {
                let source = DimensionSource {
                    name: child.required("name")?,
                    foreign_key: child.attr("foreignKey"),
                    caption: child.attr("caption"),
                };
                parse_dimension(&name, &fact_table, child, source)?
            }
            "DimensionUsage" => {
                let usage = child.required("name")?;
                let source_name = child.attr("source").unwrap_or(usage);
                let definition = shared.get(source_name).ok_or_else(|| {
                    SchemaError::UnknownSharedDimension {
                        cube: name.clone(),
                        usage: usage.to_string(),
                        shared: source_name.to_string(),
                    }
                })?;
                let source = DimensionSource {
                    name: usage,
                    foreign_key: child
                        .attr("foreignKey")
                        .or_else(|| definition.attr("foreignKey")),
                    caption: child.attr("caption").or_else(|| definition.attr("caption")),
                };
                parse_dimension(&name, &fact_table, definition, source)?
            }
            _ => continue,
        };
        if dimensions.iter().any(|d| d.name == dimension.name) {
            return Err(duplicate("dimension", &dimension.name, &scope));
        }
        dimensions.push(dimension);
    }

    let mut measures: Vec<Measure> = Vec::new();
    for child in element.children_named("Measure") {
        let measure = parse_measure(&name, child)?;
        if measures.iter().any(|m| m.name == measure.name) {
            return Err(duplicate("measure", &measure.name, &scope));
        }
        measures.push(measure);
    }

    debug!(
        cube = %name,
        fact_table = %fact_table,
        dimensions = dimensions.len(),
        measures = measures.len(),
        "Parsed cube"
    );
    Ok(Cube {
        name,
        fact_table,
        dimensions,
        measures,
        caption: element.attr("caption").map(str::to_string),
    })
}

/// Per-use overrides; a shared dimension takes name and key from its usage
struct DimensionSource<'a> {
    name: &'a str,
    foreign_key: Option<&'a str>,
    caption: Option<&'a str>,
}

fn parse_dimension(
    cube: &str,
    fact_table: &TableRef,
    element: &Element,
    source: DimensionSource<'_>,
) -> Result<Dimension, SchemaError> {
    let hierarchies: Vec<&Element> = element.children_named("Hierarchy").collect();
    if hierarchies.len() > 1 {
        return Err(SchemaError::MultipleHierarchies {
            cube: cube.to_string(),
            dimension: source.name.to_string(),
        });
    }
    // Levels may sit directly under the dimension when the hierarchy is implicit
    let holder = hierarchies.first().copied().unwrap_or(element);

    let table = match holder.child("Table").or_else(|| element.child("Table")) {
        Some(t) => Some(table_ref(t)?),
        None => None,
    }
    .filter(|t| t != fact_table);

    let primary_key = holder
        .attr("primaryKey")
        .unwrap_or(DEFAULT_PRIMARY_KEY)
        .to_string();

    if table.is_some() && source.foreign_key.is_none() {
        return Err(SchemaError::MissingForeignKey {
            cube: cube.to_string(),
            dimension: source.name.to_string(),
        });
    }

    let scope = format!("dimension '{}' of cube '{}'", source.name, cube);
    let mut levels: Vec<Level> = Vec::new();
    let mut seen = HashSet::new();
    for child in holder.children_named("Level") {
        let level = parse_level(child)?;
        if !seen.insert(level.name.clone()) {
            return Err(duplicate("level", &level.name, &scope));
        }
        levels.push(level);
    }
    if levels.is_empty() {
        return Err(SchemaError::EmptyHierarchy {
            cube: cube.to_string(),
            dimension: source.name.to_string(),
        });
    }

    Ok(Dimension {
        name: source.name.to_string(),
        foreign_key: source.foreign_key.map(str::to_string),
        table,
        primary_key,
        levels,
        caption: source.caption.map(str::to_string),
    })
}

fn parse_level(element: &Element) -> Result<Level, SchemaError> {
    let name = element.required("name")?;
    let column = match element.attr("column") {
        Some(column) => column.to_string(),
        None => name.to_lowercase().replace(' ', "_"),
    };
    Ok(Level {
        name: name.to_string(),
        column,
        ordinal_column: element.attr("ordinalColumn").map(str::to_string),
        caption: element.attr("caption").map(str::to_string),
    })
}

fn parse_measure(cube: &str, element: &Element) -> Result<Measure, SchemaError> {
    let name = element.required("name")?;
    let column = element.required("column")?;
    let raw = element.required("aggregator")?;
    let aggregator: Aggregator = raw.parse().map_err(|_| SchemaError::UnknownAggregator {
        cube: cube.to_string(),
        measure: name.to_string(),
        aggregator: raw.to_string(),
    })?;
    Ok(Measure {
        name: name.to_string(),
        column: column.to_string(),
        aggregator,
        format_string: element.attr("formatString").map(str::to_string),
        caption: element.attr("caption").map(str::to_string),
    })
}

fn table_ref(element: &Element) -> Result<TableRef, SchemaError> {
    let name = element.required("name")?;
    Ok(match element.attr("schema") {
        Some(schema) => TableRef::with_schema(schema, name),
        None => TableRef::new(name),
    })
}

fn duplicate(kind: &'static str, name: &str, scope: &str) -> SchemaError {
    SchemaError::Duplicate {
        kind,
        name: name.to_string(),
        scope: scope.to_string(),
    }
}
