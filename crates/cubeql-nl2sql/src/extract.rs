//! Pull a SQL statement out of free-form completion text

const FENCE: &str = "```";

/// Fence info strings dropped from the opening line, compared case-insensitively
const LANGUAGE_TAGS: &[&str] = &[
    "sql", "duckdb", "postgresql", "postgres", "pgsql", "psql", "plpgsql", "sqlite", "mysql",
    "mariadb", "tsql", "mssql", "plsql", "ansi", "text", "plaintext",
];

/// Leading words that make a whole response count as SQL
const STATEMENT_WORDS: &[&str] = &[
    "SELECT", "WITH", "UPDATE", "DELETE", "INSERT", "DROP", "ALTER", "CREATE", "TRUNCATE",
    "GRANT", "REVOKE", "MERGE", "EXEC", "EXECUTE", "CALL", "COPY", "ATTACH", "PRAGMA", "SET",
];

/// Extract the statement a completion proposes.
///
/// The first fenced code block wins, whatever it contains, so that the
/// safety gate judges exactly what the model wrote. Without a fence the
/// whole response is taken if it opens with a statement keyword, otherwise
/// the first `SELECT` or `WITH` up to a `;` or blank line. Returns `None`
/// when nothing SQL-shaped remains.
pub fn extract_sql(response: &str) -> Option<String> {
    let text = match fenced_block(response) {
        Some(block) => block,
        None if starts_with_statement(response) => response.trim(),
        None => embedded_statement(response)?,
    };
    let text = text.trim();
    if text.is_empty() {
        None
    } else {
        Some(text.to_string())
    }
}

/// Body of the first ``` block, with any language tag dropped
fn fenced_block(response: &str) -> Option<&str> {
    let start = response.find(FENCE)? + FENCE.len();
    let rest = &response[start..];
    // A language tag is the whole opening line
    let body_start = rest.find('\n').map(|i| i + 1).unwrap_or(rest.len());
    let tag = rest[..body_start].trim();
    let tagged = tag.is_empty() || LANGUAGE_TAGS.iter().any(|t| t.eq_ignore_ascii_case(tag));
    let body = if tagged {
        &rest[body_start..]
    } else {
        rest
    };
    let end = body.find(FENCE).unwrap_or(body.len());
    Some(&body[..end])
}

fn first_word(text: &str) -> &str {
    let text = text.trim_start();
    let end = text
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(text.len());
    &text[..end]
}

fn starts_with_statement(response: &str) -> bool {
    let word = first_word(response);
    STATEMENT_WORDS.iter().any(|kw| kw.eq_ignore_ascii_case(word))
}

fn embedded_statement(response: &str) -> Option<&str> {
    let words: Vec<(usize, &str)> = word_positions(response).collect();
    // A prose "with" only counts when it reads like `WITH name AS`
    let start = words.iter().enumerate().find_map(|(i, &(offset, word))| {
        let cte = word.eq_ignore_ascii_case("WITH")
            && words.get(i + 2).is_some_and(|(_, w)| w.eq_ignore_ascii_case("AS"));
        (word.eq_ignore_ascii_case("SELECT") || cte).then_some(offset)
    })?;
    let rest = &response[start..];
    let end = [rest.find(';'), rest.find("\n\n")]
        .into_iter()
        .flatten()
        .min()
        .unwrap_or(rest.len());
    Some(&rest[..end])
}

/// Byte offset and text of every identifier-like word
fn word_positions(text: &str) -> impl Iterator<Item = (usize, &str)> {
    let is_word = |c: char| c.is_ascii_alphanumeric() || c == '_';
    let mut offset = 0;
    std::iter::from_fn(move || {
        let rest = &text[offset..];
        let start = offset + rest.find(is_word)?;
        let len = text[start..].find(|c: char| !is_word(c)).unwrap_or(text.len() - start);
        offset = start + len;
        Some((start, &text[start..start + len]))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fenced_sql_block() {
        let response = "Here you go:\n```sql\nSELECT year FROM dim_date\n```\nEnjoy.";
        assert_eq!(extract_sql(response).as_deref(), Some("SELECT year FROM dim_date"));
    }

    #[test]
    fn test_fenced_block_keeps_non_select_statements() {
        let response = "```sql\nDROP TABLE fact_sales;\n```";
        assert_eq!(extract_sql(response).as_deref(), Some("DROP TABLE fact_sales;"));
    }

    #[test]
    fn test_untagged_and_unterminated_fences() {
        assert_eq!(
            extract_sql("```\nSELECT 1 AS one\n```").as_deref(),
            Some("SELECT 1 AS one")
        );
        assert_eq!(
            extract_sql("```SQL\nSELECT 1 AS one").as_deref(),
            Some("SELECT 1 AS one")
        );
    }

    #[test]
    fn test_statement_on_fence_line_is_kept() {
        assert_eq!(
            extract_sql("```SELECT\nyear FROM dim_date```").as_deref(),
            Some("SELECT\nyear FROM dim_date")
        );
        assert_eq!(
            extract_sql("```select year FROM dim_date\n```").as_deref(),
            Some("select year FROM dim_date")
        );
        assert_eq!(
            extract_sql("```DuckDB\nSELECT year FROM dim_date\n```").as_deref(),
            Some("SELECT year FROM dim_date")
        );
    }

    #[test]
    fn test_bare_statement() {
        assert_eq!(
            extract_sql("  select channel from fact_sales;  ").as_deref(),
            Some("select channel from fact_sales;")
        );
        assert_eq!(extract_sql("DELETE FROM fact_sales").as_deref(), Some("DELETE FROM fact_sales"));
    }

    #[test]
    fn test_statement_inside_prose() {
        let response = "The query is SELECT channel FROM fact_sales; it lists channels.";
        assert_eq!(extract_sql(response).as_deref(), Some("SELECT channel FROM fact_sales"));

        let response = "Try this:\nWITH t AS (SELECT 1 AS x) SELECT x FROM t\n\nIt returns one row.";
        assert_eq!(
            extract_sql(response).as_deref(),
            Some("WITH t AS (SELECT 1 AS x) SELECT x FROM t")
        );
    }

    #[test]
    fn test_selection_inside_word_is_not_sql() {
        assert_eq!(extract_sql("No preselected answer exists."), None);
    }

    #[test]
    fn test_nothing_sql_shaped() {
        assert_eq!(extract_sql("I cannot answer that question."), None);
        assert_eq!(extract_sql("Sorry, I cannot help with that."), None);
        assert_eq!(extract_sql("```sql\n\n```"), None);
        assert_eq!(extract_sql(""), None);
    }
}
