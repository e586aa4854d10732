//! Pivot configuration to a single aggregate SQL statement

use std::collections::HashMap;

use cubeql_model::sql::quote_ident;
use cubeql_model::{
    Aggregator, Cube, Dimension, FilterValue, Level, Measure, PivotConfig, TableRef, ROW_CAP,
};
use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::error::{CompileError, FieldKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompiledQuery {
    pub sql: String,
    /// Output column names in SELECT order: row levels, column levels, measures
    pub columns: Vec<String>,
    pub measure_aliases: Vec<String>,
}

impl CompiledQuery {
    /// SHA-256 of the SQL text, for log correlation
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.sql.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterOperator {
    Eq,
    Ne,
    In,
    NotIn,
    Lt,
    Le,
    Gt,
    Ge,
    Between,
    Like,
}

impl FilterOperator {
    /// Case-insensitive; inner whitespace is collapsed so `NOT  IN` parses
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized = raw
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_ascii_lowercase();
        let op = match normalized.as_str() {
            "=" | "==" => FilterOperator::Eq,
            "!=" | "<>" => FilterOperator::Ne,
            "in" => FilterOperator::In,
            "not in" => FilterOperator::NotIn,
            "<" => FilterOperator::Lt,
            "<=" => FilterOperator::Le,
            ">" => FilterOperator::Gt,
            ">=" => FilterOperator::Ge,
            "between" => FilterOperator::Between,
            "like" => FilterOperator::Like,
            _ => return None,
        };
        Some(op)
    }

    fn symbol(&self) -> &'static str {
        match self {
            FilterOperator::Eq => "=",
            FilterOperator::Ne => "<>",
            FilterOperator::In => "IN",
            FilterOperator::NotIn => "NOT IN",
            FilterOperator::Lt => "<",
            FilterOperator::Le => "<=",
            FilterOperator::Gt => ">",
            FilterOperator::Ge => ">=",
            FilterOperator::Between => "BETWEEN",
            FilterOperator::Like => "LIKE",
        }
    }
}

struct GroupLevel<'a> {
    dimension: &'a Dimension,
    level: &'a Level,
    alias: String,
}

struct SelectedMeasure<'a> {
    measure: &'a Measure,
    aggregator: Aggregator,
    alias: String,
}

struct ResolvedFilter<'a> {
    dimension: &'a Dimension,
    level: &'a Level,
    field: String,
    operator: FilterOperator,
    values: &'a [FilterValue],
}

/// Compile `config` against `cube`.
///
/// The output is a pure function of its inputs: the same cube and config
/// always yield byte-identical SQL.
pub fn compile(cube: &Cube, config: &PivotConfig) -> Result<CompiledQuery, CompileError> {
    let groups = resolve_groups(cube, config)?;
    let measures = resolve_measures(cube, config)?;
    let filters = resolve_filters(cube, config)?;

    if groups.is_empty() && measures.is_empty() {
        return Err(CompileError::EmptySelection);
    }

    let mut columns: Vec<String> = Vec::with_capacity(groups.len() + measures.len());
    for alias in groups
        .iter()
        .map(|g| &g.alias)
        .chain(measures.iter().map(|m| &m.alias))
    {
        if columns.contains(alias) {
            return Err(CompileError::DuplicateColumn {
                alias: alias.clone(),
            });
        }
        columns.push(alias.clone());
    }

    let referenced = referenced_dimensions(&groups, &filters);
    let from = FromClause::build(cube, &referenced);

    let mut select = Vec::with_capacity(columns.len());
    for group in &groups {
        let column = from.column(group.dimension, &group.level.column);
        select.push(format!("{} AS {}", column, quote_ident(&group.alias)));
    }
    for selected in &measures {
        let column = from.fact_column(&selected.measure.column);
        select.push(format!(
            "{} AS {}",
            selected.aggregator.apply(&column),
            quote_ident(&selected.alias)
        ));
    }

    let mut lines = vec![format!("SELECT {}", select.join(", "))];
    lines.push(format!("FROM {}", cube.fact_table.to_sql()));
    lines.extend(from.joins());

    if !filters.is_empty() {
        let predicates = filters
            .iter()
            .map(|f| render_filter(&from.column(f.dimension, &f.level.column), f))
            .collect::<Result<Vec<_>, _>>()?;
        lines.push(format!("WHERE {}", predicates.join(" AND ")));
    }

    if !groups.is_empty() {
        let group_by: Vec<String> = groups
            .iter()
            .map(|g| from.column(g.dimension, &g.level.column))
            .collect();
        lines.push(format!("GROUP BY {}", group_by.join(", ")));

        let mut order_by = Vec::with_capacity(groups.len());
        for group in &groups {
            if let Some(ordinal) = &group.level.ordinal_column {
                order_by.push(format!("MIN({})", from.column(group.dimension, ordinal)));
            }
            order_by.push(from.column(group.dimension, &group.level.column));
        }
        lines.push(format!("ORDER BY {}", order_by.join(", ")));
    }

    lines.push(format!("LIMIT {}", ROW_CAP));

    let compiled = CompiledQuery {
        sql: lines.join("\n"),
        columns,
        measure_aliases: measures.into_iter().map(|m| m.alias).collect(),
    };
    debug!(
        cube = %cube.name,
        joins = referenced.iter().filter(|d| !d.is_degenerate()).count(),
        filters = filters.len(),
        fingerprint = %compiled.fingerprint(),
        "Compiled pivot query"
    );
    Ok(compiled)
}

fn unknown(cube: &Cube, kind: FieldKind, name: impl Into<String>) -> CompileError {
    CompileError::UnknownField {
        cube: cube.name.clone(),
        kind,
        name: name.into(),
    }
}

fn resolve_level<'a>(
    cube: &'a Cube,
    dimension: &str,
    level: &str,
) -> Result<(&'a Dimension, &'a Level), CompileError> {
    let dim = cube
        .dimension(dimension)
        .ok_or_else(|| unknown(cube, FieldKind::Dimension, dimension))?;
    let lvl = dim
        .level(level)
        .ok_or_else(|| unknown(cube, FieldKind::Level, format!("{dimension}/{level}")))?;
    Ok((dim, lvl))
}

fn resolve_groups<'a>(cube: &'a Cube, config: &PivotConfig) -> Result<Vec<GroupLevel<'a>>, CompileError> {
    config
        .rows
        .iter()
        .chain(config.columns.iter())
        .map(|r| {
            let (dimension, level) = resolve_level(cube, &r.dimension, &r.level)?;
            Ok(GroupLevel {
                dimension,
                level,
                alias: format!("{}_{}", dimension.name, level.name).to_lowercase(),
            })
        })
        .collect()
}

fn resolve_measures<'a>(
    cube: &'a Cube,
    config: &PivotConfig,
) -> Result<Vec<SelectedMeasure<'a>>, CompileError> {
    config
        .measures
        .iter()
        .map(|m| {
            let measure = cube
                .measure(&m.name)
                .ok_or_else(|| unknown(cube, FieldKind::Measure, m.name.as_str()))?;
            let aggregator = match &m.aggregator {
                Some(raw) => raw
                    .parse()
                    .map_err(|_| CompileError::UnsupportedAggregator {
                        measure: m.name.clone(),
                        aggregator: raw.clone(),
                    })?,
                None => measure.aggregator,
            };
            Ok(SelectedMeasure {
                measure,
                aggregator,
                alias: measure.name.to_lowercase(),
            })
        })
        .collect()
}

fn resolve_filters<'a>(
    cube: &'a Cube,
    config: &'a PivotConfig,
) -> Result<Vec<ResolvedFilter<'a>>, CompileError> {
    config
        .filters
        .iter()
        .map(|f| {
            let (dimension, level) = resolve_level(cube, &f.dimension, &f.level)?;
            let field = format!("{}/{}", f.dimension, f.level);
            let operator =
                FilterOperator::parse(&f.operator).ok_or_else(|| CompileError::UnsupportedOperator {
                    field: field.clone(),
                    operator: f.operator.clone(),
                })?;
            if f.values.is_empty() {
                return Err(CompileError::EmptyFilter { field });
            }
            Ok(ResolvedFilter {
                dimension,
                level,
                field,
                operator,
                values: &f.values,
            })
        })
        .collect()
}

/// Dimensions in first-appearance order across rows, columns and filters
fn referenced_dimensions<'a>(groups: &[GroupLevel<'a>], filters: &[ResolvedFilter<'a>]) -> Vec<&'a Dimension> {
    let mut dims: Vec<&'a Dimension> = Vec::new();
    let all = groups
        .iter()
        .map(|g| g.dimension)
        .chain(filters.iter().map(|f| f.dimension));
    for dim in all {
        if !dims.iter().any(|d| d.name == dim.name) {
            dims.push(dim);
        }
    }
    dims
}

fn render_filter(column: &str, filter: &ResolvedFilter<'_>) -> Result<String, CompileError> {
    let invalid = |reason: String| CompileError::InvalidFilter {
        field: filter.field.clone(),
        reason,
    };
    let literals = filter
        .values
        .iter()
        .map(|v| v.to_sql().ok_or_else(|| invalid(format!("value {v} is not a finite number"))))
        .collect::<Result<Vec<_>, _>>()?;

    let sql = match (filter.operator, literals.as_slice()) {
        (FilterOperator::Eq, [one]) => format!("{column} = {one}"),
        (FilterOperator::Eq | FilterOperator::In, many) => {
            format!("{column} IN ({})", many.join(", "))
        }
        (FilterOperator::Ne, [one]) => format!("{column} <> {one}"),
        (FilterOperator::Ne | FilterOperator::NotIn, many) => {
            format!("{column} NOT IN ({})", many.join(", "))
        }
        (FilterOperator::Between, [low, high]) => format!("{column} BETWEEN {low} AND {high}"),
        (FilterOperator::Between, values) => {
            return Err(invalid(format!(
                "between expects exactly two values, got {}",
                values.len()
            )))
        }
        (op, [one]) => format!("{column} {} {one}", op.symbol()),
        (op, values) => {
            return Err(invalid(format!(
                "operator '{}' expects exactly one value, got {}",
                op.symbol(),
                values.len()
            )))
        }
    };
    Ok(sql)
}

/// One relation in the FROM clause
struct Relation<'a> {
    table: &'a TableRef,
    alias: Option<String>,
    dimension: Option<&'a Dimension>,
}

impl Relation<'_> {
    fn qualifier(&self) -> String {
        match &self.alias {
            Some(alias) => quote_ident(alias).into_owned(),
            None => self.table.to_sql(),
        }
    }
}

/// Fact table plus the joined dimension tables for one query.
///
/// Column references stay bare unless the column name is declared by more
/// than one relation in the FROM clause.
struct FromClause<'a> {
    relations: Vec<Relation<'a>>,
    by_dimension: HashMap<&'a str, usize>,
    owners: HashMap<String, usize>,
}

impl<'a> FromClause<'a> {
    fn build(cube: &'a Cube, referenced: &[&'a Dimension]) -> Self {
        let joined: Vec<&'a Dimension> = referenced.iter().copied().filter(|d| !d.is_degenerate()).collect();

        let mut relations = vec![Relation {
            table: &cube.fact_table,
            alias: None,
            dimension: None,
        }];
        let mut by_dimension = HashMap::new();
        for dim in joined.iter().copied() {
            let Some(table) = dim.table.as_ref() else { continue };
            let shared = joined.iter().filter(|d| d.table.as_ref() == Some(table)).count() > 1;
            let alias = shared.then(|| format!("{}_{}", table.name, dim.name.to_lowercase()));
            by_dimension.insert(dim.name.as_str(), relations.len());
            relations.push(Relation {
                table,
                alias,
                dimension: Some(dim),
            });
        }

        // Count each declared column once per relation
        let mut owners: HashMap<String, usize> = HashMap::new();
        let mut fact_columns: Vec<&str> = cube.measures.iter().map(|m| m.column.as_str()).collect();
        for dim in &cube.dimensions {
            fact_columns.extend(dim.foreign_key.as_deref());
            if dim.is_degenerate() {
                fact_columns.extend(level_columns(dim));
            }
        }
        count_owners(&mut owners, fact_columns);
        for dim in joined.iter().copied() {
            let mut columns = vec![dim.primary_key.as_str()];
            columns.extend(level_columns(dim));
            count_owners(&mut owners, columns);
        }

        Self {
            relations,
            by_dimension,
            owners,
        }
    }

    fn relation_for(&self, dimension: &Dimension) -> &Relation<'a> {
        let index = self.by_dimension.get(dimension.name.as_str()).copied().unwrap_or(0);
        &self.relations[index]
    }

    fn column(&self, dimension: &Dimension, column: &str) -> String {
        self.render(self.relation_for(dimension), column)
    }

    fn fact_column(&self, column: &str) -> String {
        self.render(&self.relations[0], column)
    }

    fn render(&self, relation: &Relation<'a>, column: &str) -> String {
        let ambiguous = self
            .owners
            .get(&column.to_lowercase())
            .is_some_and(|n| *n > 1);
        if ambiguous {
            format!("{}.{}", relation.qualifier(), quote_ident(column))
        } else {
            quote_ident(column).into_owned()
        }
    }

    fn joins(&self) -> Vec<String> {
        let fact = &self.relations[0];
        self.relations[1..]
            .iter()
            .filter_map(|rel| {
                let dim = rel.dimension?;
                let foreign_key = dim.foreign_key.as_deref()?;
                let alias = match &rel.alias {
                    Some(alias) => format!(" AS {}", quote_ident(alias)),
                    None => String::new(),
                };
                Some(format!(
                    "INNER JOIN {}{} ON {}.{} = {}.{}",
                    rel.table.to_sql(),
                    alias,
                    fact.qualifier(),
                    quote_ident(foreign_key),
                    rel.qualifier(),
                    quote_ident(&dim.primary_key)
                ))
            })
            .collect()
    }
}

fn level_columns(dim: &Dimension) -> impl Iterator<Item = &str> {
    dim.levels.iter().flat_map(|l| {
        std::iter::once(l.column.as_str()).chain(l.ordinal_column.as_deref())
    })
}

fn count_owners<'c>(owners: &mut HashMap<String, usize>, columns: impl IntoIterator<Item = &'c str>) {
    let mut seen: Vec<String> = Vec::new();
    for column in columns {
        let key = column.to_lowercase();
        if !seen.contains(&key) {
            *owners.entry(key.clone()).or_insert(0) += 1;
            seen.push(key);
        }
    }
}
