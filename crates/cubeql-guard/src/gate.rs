use std::fmt;

use cubeql_model::ROW_CAP;
use serde::Serialize;
use sqlparser::ast::{Expr, Query, Statement, Value};
use sqlparser::dialect::DuckDbDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use tracing::{debug, warn};

use crate::scope::Resolver;
use crate::{SafetyRule, UnsafeQueryError, Whitelist};

/// Rejected as whole words outside string literals and quoted identifiers
pub const MUTATING_KEYWORDS: &[&str] = &[
    "UPDATE", "DELETE", "INSERT", "DROP", "ALTER", "CREATE", "TRUNCATE", "GRANT", "REVOKE",
    "MERGE", "UPSERT", "EXEC", "EXECUTE", "CALL", "COPY", "ATTACH", "DETACH", "INSTALL", "LOAD",
    "PRAGMA", "SET", "VACUUM", "INTO", "EXPORT", "IMPORT",
];

/// What the gate did to the statement's top-level LIMIT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LimitAction {
    Kept,
    Injected,
    Clamped { requested: u64 },
}

/// A statement that passed the safety gate.
///
/// Only [`SafetyGate::validate`] constructs one, so anything holding a
/// `ValidatedSql` holds a single capped read-only query over whitelisted
/// names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidatedSql {
    sql: String,
    limit: u64,
    limit_action: LimitAction,
}

impl ValidatedSql {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn into_string(self) -> String {
        self.sql
    }

    /// Effective row limit, never above the cap
    pub fn limit(&self) -> u64 {
        self.limit
    }

    pub fn limit_action(&self) -> LimitAction {
        self.limit_action
    }
}

impl fmt::Display for ValidatedSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Shared validator for every statement bound for the warehouse
#[derive(Debug, Clone)]
pub struct SafetyGate {
    whitelist: Whitelist,
    cap: u64,
}

impl SafetyGate {
    pub fn new(whitelist: Whitelist) -> Self {
        Self {
            whitelist,
            cap: ROW_CAP,
        }
    }

    pub fn whitelist(&self) -> &Whitelist {
        &self.whitelist
    }

    pub fn cap(&self) -> u64 {
        self.cap
    }

    /// Validate and sanitize one statement
    pub fn validate(&self, sql: &str) -> Result<ValidatedSql, UnsafeQueryError> {
        match self.check(sql) {
            Ok(validated) => {
                debug!(limit = validated.limit, action = ?validated.limit_action, "Statement passed safety gate");
                Ok(validated)
            }
            Err(rule) => {
                warn!(rule = rule.code(), detail = %rule, "Rejected unsafe statement");
                Err(UnsafeQueryError { rule })
            }
        }
    }

    fn check(&self, sql: &str) -> Result<ValidatedSql, SafetyRule> {
        let sql = sql
            .trim()
            .trim_end_matches(|c: char| c == ';' || c.is_whitespace());
        if sql.is_empty() {
            return Err(SafetyRule::Empty);
        }

        let dialect = DuckDbDialect {};
        let tokens = Tokenizer::new(&dialect, sql)
            .tokenize()
            .map_err(|e| SafetyRule::Unparseable(e.to_string()))?;
        scan_tokens(&tokens)?;

        let mut statements =
            Parser::parse_sql(&dialect, sql).map_err(|e| SafetyRule::Unparseable(e.to_string()))?;
        let mut statement = match statements.len() {
            0 => return Err(SafetyRule::Empty),
            1 => statements.remove(0),
            _ => return Err(SafetyRule::MultipleStatements),
        };
        let Statement::Query(query) = &mut statement else {
            return Err(SafetyRule::NotSelect);
        };
        Resolver::new(&self.whitelist).check(query)?;
        let (limit, limit_action) = self.enforce_limit(query)?;

        // Untouched statements keep their original text
        let sql = match limit_action {
            LimitAction::Kept => sql.to_string(),
            _ => statement.to_string(),
        };
        Ok(ValidatedSql {
            sql,
            limit,
            limit_action,
        })
    }

    fn enforce_limit(&self, query: &mut Query) -> Result<(u64, LimitAction), SafetyRule> {
        if query.fetch.is_some() {
            return Err(SafetyRule::RowLimit("FETCH is not supported, use LIMIT".to_string()));
        }
        let action = match &query.limit {
            None => LimitAction::Injected,
            Some(Expr::Value(Value::Number(raw, _))) => {
                let requested: u64 = raw
                    .parse()
                    .map_err(|_| SafetyRule::RowLimit(format!("LIMIT {raw} is not a row count")))?;
                if requested <= self.cap {
                    return Ok((requested, LimitAction::Kept));
                }
                LimitAction::Clamped { requested }
            }
            Some(other) => {
                return Err(SafetyRule::RowLimit(format!(
                    "LIMIT {other} is not a literal row count"
                )))
            }
        };
        query.limit = Some(Expr::Value(Value::Number(self.cap.to_string(), false)));
        Ok((self.cap, action))
    }
}

fn scan_tokens(tokens: &[Token]) -> Result<(), SafetyRule> {
    for token in tokens {
        if let Token::Word(word) = token {
            let upper = word.value.to_ascii_uppercase();
            if word.quote_style.is_none() && MUTATING_KEYWORDS.contains(&upper.as_str()) {
                return Err(SafetyRule::MutatingKeyword(upper));
            }
        }
    }
    let comment = tokens.iter().any(|t| {
        matches!(
            t,
            Token::Whitespace(Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_))
        )
    });
    if comment {
        return Err(SafetyRule::Comment);
    }
    if tokens.iter().any(|t| matches!(t, Token::SemiColon)) {
        return Err(SafetyRule::MultipleStatements);
    }
    Ok(())
}
