//! SQL rendering helpers shared by the compiler and the summarizer

use std::borrow::Cow;

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_plain_ident(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Words that never appear bare as identifiers: SQL keywords plus every
/// statement word the safety gate blocks
pub const RESERVED_WORDS: &[&str] = &[
    "ALL", "ALTER", "AND", "ANY", "AS", "ASC", "ATTACH", "BETWEEN", "BY", "CALL", "CASE", "CAST",
    "COPY", "CREATE", "CROSS", "DELETE", "DESC", "DETACH", "DISTINCT", "DROP", "ELSE", "END",
    "EXCEPT", "EXEC", "EXECUTE", "EXISTS", "EXPORT", "FALSE", "FETCH", "FILTER", "FROM", "FULL",
    "GRANT", "GROUP", "HAVING", "ILIKE", "IMPORT", "IN", "INNER", "INSERT", "INSTALL",
    "INTERSECT", "INTO", "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "LOAD", "MERGE",
    "NATURAL", "NOT", "NULL", "OFFSET", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION",
    "PRAGMA", "QUALIFY", "RECURSIVE", "REVOKE", "RIGHT", "SELECT", "SET", "SOME", "TABLE",
    "THEN", "TRUE", "TRUNCATE", "UNION", "UPDATE", "UPSERT", "USING", "VACUUM", "WHEN",
    "WHERE", "WINDOW", "WITH",
];

pub fn is_reserved(name: &str) -> bool {
    RESERVED_WORDS.iter().any(|word| word.eq_ignore_ascii_case(name))
}

/// Double-quote an identifier unless it is plain ASCII and not reserved
pub fn quote_ident(name: &str) -> Cow<'_, str> {
    if is_plain_ident(name) && !is_reserved(name) {
        Cow::Borrowed(name)
    } else {
        Cow::Owned(format!("\"{}\"", name.replace('"', "\"\"")))
    }
}

/// Single-quoted string literal with `'` escaped as `''`
pub fn quote_str(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_identifiers_stay_bare() {
        assert_eq!(quote_ident("sales_amount"), "sales_amount");
        assert_eq!(quote_ident("_x1"), "_x1");
    }

    #[test]
    fn test_special_identifiers_are_quoted() {
        assert_eq!(quote_ident("product_product name"), "\"product_product name\"");
        assert_eq!(quote_ident("1st"), "\"1st\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
        assert_eq!(quote_ident("매출"), "\"매출\"");
    }

    #[test]
    fn test_reserved_words_are_quoted() {
        assert_eq!(quote_ident("load"), "\"load\"");
        assert_eq!(quote_ident("Set"), "\"Set\"");
        assert_eq!(quote_ident("order"), "\"order\"");
        assert_eq!(quote_ident("loaded"), "loaded");
    }

    #[test]
    fn test_quote_str_escapes() {
        assert_eq!(quote_str("O'Reilly"), "'O''Reilly'");
    }
}
