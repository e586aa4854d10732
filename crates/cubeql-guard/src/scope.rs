//! Scoped name resolution for one parsed query.
//!
//! Every SELECT resolves its column references against the relations in its
//! own FROM clause, plus those of enclosing queries for correlated
//! subqueries. Physical tables expose only whitelisted columns. Derived
//! tables and CTEs expose their output names. Select aliases are visible
//! only in ORDER BY, HAVING and QUALIFY. A CTE name is visible only inside
//! the query that defines it.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::ControlFlow;

use sqlparser::ast::{
    Distinct, Expr, GroupByExpr, Ident, JoinConstraint, JoinOperator, ObjectName, Query, Select,
    SelectItem, SetExpr, TableFactor, TableWithJoins, Visit, Visitor,
};

use crate::{SafetyRule, Whitelist};

/// Columns a relation in FROM exposes
#[derive(Debug, Clone)]
enum Columns {
    /// A whitelisted table: only whitelisted columns
    Physical,
    /// A derived table or CTE: its output names
    Derived(BTreeSet<String>),
}

/// Relations visible to one SELECT, keyed by the name that qualifies them
#[derive(Debug, Clone, Default)]
struct Sources {
    relations: BTreeMap<String, Columns>,
}

impl Sources {
    fn add(&mut self, qualifier: String, columns: Columns) {
        self.relations.insert(qualifier, columns);
    }

    fn get(&self, qualifier: &str) -> Option<&Columns> {
        self.relations.get(qualifier)
    }

    fn exposes(&self, whitelist: &Whitelist, column: &str) -> bool {
        self.relations.values().any(|columns| match columns {
            Columns::Physical => whitelist.allows_column(column),
            Columns::Derived(names) => names.contains(column),
        })
    }

    /// `self` over `outer`, inner names shadowing outer ones
    fn over(&self, outer: &Sources) -> Sources {
        let mut merged = outer.clone();
        merged.relations.extend(self.relations.clone());
        merged
    }
}

/// Names an expression may use
struct Visible<'a> {
    own: &'a Sources,
    outer: &'a Sources,
    aliases: Option<&'a BTreeSet<String>>,
}

impl Visible<'_> {
    fn column(&self, whitelist: &Whitelist, name: &str) -> Result<(), SafetyRule> {
        let known = self.aliases.is_some_and(|a| a.contains(name))
            || self.own.exposes(whitelist, name)
            || self.outer.exposes(whitelist, name);
        if known {
            Ok(())
        } else {
            Err(SafetyRule::UnknownColumn(name.to_string()))
        }
    }

    fn qualified(&self, whitelist: &Whitelist, parts: &[String]) -> Result<(), SafetyRule> {
        let Some((column, qualifier)) = parts.split_last() else {
            return Ok(());
        };
        let qualifier = qualifier.join(".");
        let columns = self
            .own
            .get(&qualifier)
            .or_else(|| self.outer.get(&qualifier))
            .ok_or_else(|| SafetyRule::UnknownTable(qualifier.clone()))?;
        let known = match columns {
            Columns::Physical => whitelist.allows_column(column),
            Columns::Derived(names) => names.contains(column),
        };
        if known {
            Ok(())
        } else {
            Err(SafetyRule::UnknownColumn(parts.join(".")))
        }
    }
}

pub(crate) struct Resolver<'w> {
    whitelist: &'w Whitelist,
    /// CTE definitions per enclosing query, innermost last
    ctes: Vec<BTreeMap<String, BTreeSet<String>>>,
}

impl<'w> Resolver<'w> {
    pub(crate) fn new(whitelist: &'w Whitelist) -> Self {
        Self {
            whitelist,
            ctes: Vec::new(),
        }
    }

    pub(crate) fn check(&mut self, query: &Query) -> Result<(), SafetyRule> {
        self.query(query, &Sources::default()).map(|_| ())
    }

    /// Check a query and return its output column names
    fn query(&mut self, query: &Query, outer: &Sources) -> Result<BTreeSet<String>, SafetyRule> {
        self.ctes.push(BTreeMap::new());
        let result = self.query_in_scope(query, outer);
        self.ctes.pop();
        result
    }

    fn query_in_scope(
        &mut self,
        query: &Query,
        outer: &Sources,
    ) -> Result<BTreeSet<String>, SafetyRule> {
        if let Some(with) = &query.with {
            for cte in &with.cte_tables {
                let name = lower(&cte.alias.name);
                let declared: BTreeSet<String> = cte.alias.columns.iter().map(lower).collect();
                if with.recursive {
                    let provisional = if declared.is_empty() {
                        output_names(&cte.query.body)
                    } else {
                        declared.clone()
                    };
                    self.define_cte(name.clone(), provisional);
                }
                let outputs = self.query(&cte.query, outer)?;
                self.define_cte(name, if declared.is_empty() { outputs } else { declared });
            }
        }

        let (outputs, sources) = self.set_expr(&query.body, outer)?;

        if let Some(order_by) = &query.order_by {
            let visible = Visible {
                own: &sources,
                outer,
                aliases: Some(&outputs),
            };
            for item in &order_by.exprs {
                self.names(&item.expr, &visible)?;
            }
        }

        let none = Sources::default();
        let bare = Visible {
            own: &none,
            outer,
            aliases: None,
        };
        if let Some(limit) = &query.limit {
            self.names(limit, &bare)?;
        }
        if let Some(offset) = &query.offset {
            self.names(&offset.value, &bare)?;
        }
        for expr in &query.limit_by {
            self.names(expr, &bare)?;
        }
        Ok(outputs)
    }

    fn define_cte(&mut self, name: String, columns: BTreeSet<String>) {
        if let Some(scope) = self.ctes.last_mut() {
            scope.insert(name, columns);
        }
    }

    fn cte(&self, name: &str) -> Option<&BTreeSet<String>> {
        self.ctes.iter().rev().find_map(|scope| scope.get(name))
    }

    fn set_expr(
        &mut self,
        body: &SetExpr,
        outer: &Sources,
    ) -> Result<(BTreeSet<String>, Sources), SafetyRule> {
        match body {
            SetExpr::Select(select) => self.select(select, outer),
            SetExpr::Query(query) => Ok((self.query(query, outer)?, Sources::default())),
            SetExpr::SetOperation { left, right, .. } => {
                let left = self.set_expr(left, outer)?;
                self.set_expr(right, outer)?;
                // ORDER BY of a set operation sees only the output names
                Ok((left.0, Sources::default()))
            }
            SetExpr::Values(values) => {
                let none = Sources::default();
                let visible = Visible {
                    own: &none,
                    outer,
                    aliases: None,
                };
                for row in &values.rows {
                    for expr in row {
                        self.names(expr, &visible)?;
                    }
                }
                Ok((BTreeSet::new(), none))
            }
            SetExpr::Insert(_) | SetExpr::Update(_) | SetExpr::Table(_) => Err(SafetyRule::NotSelect),
        }
    }

    fn select(
        &mut self,
        select: &Select,
        outer: &Sources,
    ) -> Result<(BTreeSet<String>, Sources), SafetyRule> {
        let mut sources = Sources::default();
        let mut constraints = Vec::new();
        for table in &select.from {
            self.table_with_joins(table, outer, &mut sources, &mut constraints)?;
        }

        let visible = Visible {
            own: &sources,
            outer,
            aliases: None,
        };
        for constraint in constraints {
            match constraint {
                JoinConstraint::On(expr) => self.names(expr, &visible)?,
                JoinConstraint::Using(columns) => {
                    for column in columns {
                        visible.column(self.whitelist, &lower(column))?;
                    }
                }
                JoinConstraint::Natural | JoinConstraint::None => {}
            }
        }

        let mut outputs = BTreeSet::new();
        for item in &select.projection {
            match item {
                SelectItem::Wildcard(..) | SelectItem::QualifiedWildcard(..) => {
                    return Err(SafetyRule::Wildcard)
                }
                SelectItem::UnnamedExpr(expr) => {
                    self.names(expr, &visible)?;
                    outputs.extend(expr_name(expr));
                }
                SelectItem::ExprWithAlias { expr, alias } => {
                    self.names(expr, &visible)?;
                    outputs.insert(lower(alias));
                }
            }
        }

        if let Some(Distinct::On(exprs)) = &select.distinct {
            for expr in exprs {
                self.names(expr, &visible)?;
            }
        }
        for expr in select.prewhere.iter().chain(&select.selection) {
            self.names(expr, &visible)?;
        }
        if let GroupByExpr::Expressions(exprs, _) = &select.group_by {
            for expr in exprs {
                self.names(expr, &visible)?;
            }
        }
        for expr in select
            .cluster_by
            .iter()
            .chain(&select.distribute_by)
            .chain(&select.sort_by)
        {
            self.names(expr, &visible)?;
        }
        self.names(&select.named_window, &visible)?;
        self.names(&select.lateral_views, &visible)?;
        self.names(&select.connect_by, &visible)?;

        let with_aliases = Visible {
            own: &sources,
            outer,
            aliases: Some(&outputs),
        };
        for expr in select.having.iter().chain(&select.qualify) {
            self.names(expr, &with_aliases)?;
        }
        Ok((outputs, sources))
    }

    fn table_with_joins<'q>(
        &mut self,
        table: &'q TableWithJoins,
        outer: &Sources,
        sources: &mut Sources,
        constraints: &mut Vec<&'q JoinConstraint>,
    ) -> Result<(), SafetyRule> {
        self.table_factor(&table.relation, outer, sources, constraints)?;
        for join in &table.joins {
            self.table_factor(&join.relation, outer, sources, constraints)?;
            match &join.join_operator {
                JoinOperator::Inner(c)
                | JoinOperator::LeftOuter(c)
                | JoinOperator::RightOuter(c)
                | JoinOperator::FullOuter(c)
                | JoinOperator::LeftSemi(c)
                | JoinOperator::RightSemi(c)
                | JoinOperator::LeftAnti(c)
                | JoinOperator::RightAnti(c) => constraints.push(c),
                JoinOperator::AsOf {
                    match_condition,
                    constraint,
                } => {
                    let visible = Visible {
                        own: &*sources,
                        outer,
                        aliases: None,
                    };
                    self.names(match_condition, &visible)?;
                    constraints.push(constraint);
                }
                JoinOperator::CrossJoin | JoinOperator::CrossApply | JoinOperator::OuterApply => {}
            }
        }
        Ok(())
    }

    fn table_factor<'q>(
        &mut self,
        factor: &'q TableFactor,
        outer: &Sources,
        sources: &mut Sources,
        constraints: &mut Vec<&'q JoinConstraint>,
    ) -> Result<(), SafetyRule> {
        match factor {
            // Table functions pass only when their name is whitelisted
            TableFactor::Table { name, alias, .. } => {
                let table = object_name(name);
                let cte = (name.0.len() == 1).then(|| self.cte(&table)).flatten();
                let columns = match cte {
                    Some(outputs) => Columns::Derived(outputs.clone()),
                    None if self.whitelist.allows_table(&table) => Columns::Physical,
                    None => return Err(SafetyRule::UnknownTable(table)),
                };
                match alias {
                    Some(alias) => {
                        let columns = match columns {
                            Columns::Derived(_) if !alias.columns.is_empty() => {
                                Columns::Derived(alias.columns.iter().map(lower).collect())
                            }
                            other => other,
                        };
                        sources.add(lower(&alias.name), columns);
                    }
                    None => {
                        if let Some(last) = name.0.last() {
                            sources.add(lower(last), columns.clone());
                        }
                        sources.add(table, columns);
                    }
                }
            }
            TableFactor::Derived {
                lateral,
                subquery,
                alias,
            } => {
                let outputs = if *lateral {
                    self.query(subquery, &sources.over(outer))?
                } else {
                    self.query(subquery, outer)?
                };
                if let Some(alias) = alias {
                    let columns = if alias.columns.is_empty() {
                        outputs
                    } else {
                        alias.columns.iter().map(lower).collect()
                    };
                    sources.add(lower(&alias.name), Columns::Derived(columns));
                } else {
                    // Unaliased subqueries expose their names unqualified only
                    let key = format!("#{}", sources.relations.len());
                    sources.add(key, Columns::Derived(outputs));
                }
            }
            TableFactor::NestedJoin {
                table_with_joins, ..
            } => {
                self.table_with_joins(table_with_joins, outer, sources, constraints)?;
            }
            other => return Err(SafetyRule::UnknownTable(other.to_string())),
        }
        Ok(())
    }

    /// Check every column reference in `node`, descending into nested
    /// queries with `visible` as their outer scope
    fn names<V: Visit>(&mut self, node: &V, visible: &Visible<'_>) -> Result<(), SafetyRule> {
        let mut collector = References::default();
        let _ = node.visit(&mut collector);

        for name in &collector.identifiers {
            visible.column(self.whitelist, name)?;
        }
        for parts in &collector.compound {
            visible.qualified(self.whitelist, parts)?;
        }
        if !collector.subqueries.is_empty() {
            let outer = visible.own.over(visible.outer);
            for query in &collector.subqueries {
                self.query(query, &outer)?;
            }
        }
        Ok(())
    }
}

/// Column references of one expression, not counting nested queries
#[derive(Debug, Default)]
struct References {
    identifiers: Vec<String>,
    compound: Vec<Vec<String>>,
    subqueries: Vec<Query>,
    depth: usize,
}

impl Visitor for References {
    type Break = ();

    fn pre_visit_query(&mut self, query: &Query) -> ControlFlow<()> {
        if self.depth == 0 {
            self.subqueries.push(query.clone());
        }
        self.depth += 1;
        ControlFlow::Continue(())
    }

    fn post_visit_query(&mut self, _query: &Query) -> ControlFlow<()> {
        self.depth = self.depth.saturating_sub(1);
        ControlFlow::Continue(())
    }

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        if self.depth > 0 {
            return ControlFlow::Continue(());
        }
        match expr {
            Expr::Identifier(ident) => self.identifiers.push(lower(ident)),
            Expr::CompoundIdentifier(parts) => {
                self.compound.push(parts.iter().map(lower).collect())
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }
}

fn lower(ident: &Ident) -> String {
    ident.value.to_lowercase()
}

fn object_name(name: &ObjectName) -> String {
    name.0.iter().map(lower).collect::<Vec<_>>().join(".")
}

/// Name an unaliased projection item is known by
fn expr_name(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Identifier(ident) => Some(lower(ident)),
        Expr::CompoundIdentifier(parts) => parts.last().map(lower),
        _ => None,
    }
}

/// Output names of the leftmost SELECT, read without checking
fn output_names(body: &SetExpr) -> BTreeSet<String> {
    match body {
        SetExpr::Select(select) => select
            .projection
            .iter()
            .filter_map(|item| match item {
                SelectItem::UnnamedExpr(expr) => expr_name(expr),
                SelectItem::ExprWithAlias { alias, .. } => Some(lower(alias)),
                _ => None,
            })
            .collect(),
        SetExpr::Query(query) => output_names(&query.body),
        SetExpr::SetOperation { left, .. } => output_names(left),
        _ => BTreeSet::new(),
    }
}
