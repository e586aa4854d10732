use std::fmt;
use thiserror::Error;

/// The safety rule a rejected statement violated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyRule {
    Empty,
    Unparseable(String),
    Comment,
    MutatingKeyword(String),
    MultipleStatements,
    NotSelect,
    Wildcard,
    UnknownTable(String),
    UnknownColumn(String),
    RowLimit(String),
}

impl SafetyRule {
    /// Stable label, used for metrics and structured errors
    pub fn code(&self) -> &'static str {
        match self {
            SafetyRule::Empty => "empty",
            SafetyRule::Unparseable(_) => "unparseable",
            SafetyRule::Comment => "comment",
            SafetyRule::MutatingKeyword(_) => "mutating_keyword",
            SafetyRule::MultipleStatements => "multiple_statements",
            SafetyRule::NotSelect => "not_select",
            SafetyRule::Wildcard => "wildcard",
            SafetyRule::UnknownTable(_) => "unknown_table",
            SafetyRule::UnknownColumn(_) => "unknown_column",
            SafetyRule::RowLimit(_) => "row_limit",
        }
    }
}

impl fmt::Display for SafetyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SafetyRule::Empty => f.write_str("statement is empty"),
            SafetyRule::Unparseable(msg) => write!(f, "statement could not be parsed: {msg}"),
            SafetyRule::Comment => f.write_str("comments are not allowed"),
            SafetyRule::MutatingKeyword(word) => write!(f, "mutating keyword {word} is not allowed"),
            SafetyRule::MultipleStatements => f.write_str("only a single statement is allowed"),
            SafetyRule::NotSelect => f.write_str("only SELECT queries are allowed"),
            SafetyRule::Wildcard => f.write_str("wildcard projections are not allowed"),
            SafetyRule::UnknownTable(table) => write!(f, "table '{table}' is not in the whitelist"),
            SafetyRule::UnknownColumn(column) => write!(f, "column '{column}' is not in the whitelist"),
            SafetyRule::RowLimit(msg) => write!(f, "row limit: {msg}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unsafe query rejected ({}): {rule}", .rule.code())]
pub struct UnsafeQueryError {
    pub rule: SafetyRule,
}

impl From<SafetyRule> for UnsafeQueryError {
    fn from(rule: SafetyRule) -> Self {
        UnsafeQueryError { rule }
    }
}
