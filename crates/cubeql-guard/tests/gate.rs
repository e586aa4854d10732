//! Safety gate behaviour against the retail fixture

mod common;

use common::{sales_cube, sales_gate};
use cubeql_compiler::{compile, effective_config, DrillKey, DrillState};
use cubeql_guard::{LimitAction, SafetyGate, SafetyRule, Whitelist, MUTATING_KEYWORDS};
use cubeql_model::sql::quote_ident;
use cubeql_model::{Axis, LevelRef, MeasureRef, PivotConfig, ROW_CAP};

fn year_pivot() -> PivotConfig {
    PivotConfig {
        rows: vec![LevelRef::new("Date", "Year")],
        measures: vec![MeasureRef::new("SalesAmount")],
        ..Default::default()
    }
}

#[test]
fn test_whitelist_covers_fixture() {
    let gate = sales_gate();
    let whitelist = gate.whitelist();
    for table in ["fact_sales", "dim_date", "dim_product", "dim_store"] {
        assert!(whitelist.allows_table(table), "{table}");
    }
    for column in ["sales_amount", "date_id", "year", "month_num", "product_name", "channel"] {
        assert!(whitelist.allows_column(column), "{column}");
    }
    assert!(!whitelist.allows_table("secret_table"));
}

#[test]
fn test_compiled_pivot_passes_unchanged() {
    let cube = sales_cube();
    let compiled = compile(&cube, &year_pivot()).unwrap();

    let validated = sales_gate().validate(&compiled.sql).unwrap();
    assert_eq!(validated.as_str(), compiled.sql);
    assert_eq!(validated.limit_action(), LimitAction::Kept);
    assert_eq!(validated.limit(), ROW_CAP);
}

#[test]
fn test_drilled_pivot_passes_unchanged() {
    let cube = sales_cube();
    let mut state = DrillState::new();
    state.toggle(DrillKey::new(Axis::Row, "Date", "Year", 2024));
    state.toggle(DrillKey::new(Axis::Row, "Date", "Quarter", "Q1"));

    let mut base = year_pivot();
    base.columns.push(LevelRef::new("Product", "Product Name"));
    base.columns.push(LevelRef::new("Store", "Region"));
    let compiled = compile(&cube, &effective_config(&cube, &base, &state)).unwrap();

    assert!(compiled.sql.contains("MIN(month_num)"));
    let validated = sales_gate().validate(&compiled.sql).unwrap();
    assert_eq!(validated.as_str(), compiled.sql);
}

#[test]
fn test_rejects_unknown_tables() {
    let gate = sales_gate();
    for sql in [
        "SELECT id FROM secret_table",
        "select year from dim_date join secret_table on dim_date.id = secret_table.id",
        "SELECT year FROM dim_date WHERE id IN (SELECT id FROM secret_table)",
        "WITH s AS (SELECT id FROM secret_table) SELECT id FROM s",
    ] {
        let err = gate.validate(sql).unwrap_err();
        assert_eq!(err.rule, SafetyRule::UnknownTable("secret_table".to_string()), "{sql}");
    }
}

#[test]
fn test_rejects_unknown_columns() {
    let err = sales_gate()
        .validate("SELECT customer_email FROM fact_sales")
        .unwrap_err();
    assert_eq!(err.rule, SafetyRule::UnknownColumn("customer_email".to_string()));
}

#[test]
fn test_self_alias_cannot_reach_undeclared_column() {
    let gate = sales_gate();
    for sql in [
        "SELECT customer_email AS customer_email FROM fact_sales",
        "SELECT sales_amount AS customer_email FROM fact_sales WHERE customer_email IS NOT NULL",
        "SELECT channel AS customer_email FROM fact_sales GROUP BY customer_email",
    ] {
        let err = gate.validate(sql).unwrap_err();
        assert_eq!(err.rule, SafetyRule::UnknownColumn("customer_email".to_string()), "{sql}");
    }

    let ordered = "SELECT channel, SUM(sales_amount) AS total FROM fact_sales GROUP BY channel ORDER BY total";
    assert!(gate.validate(ordered).is_ok());
}

#[test]
fn test_cte_inside_subquery_does_not_shadow_outer_tables() {
    let err = sales_gate()
        .validate(
            "SELECT s.year FROM (WITH secret_table AS (SELECT year FROM dim_date) \
             SELECT year FROM secret_table) t CROSS JOIN secret_table s",
        )
        .unwrap_err();
    assert_eq!(err.rule, SafetyRule::UnknownTable("secret_table".to_string()));

    let scoped = "SELECT t.year FROM (WITH y AS (SELECT year FROM dim_date) SELECT year FROM y) t";
    assert!(sales_gate().validate(scoped).is_ok());
}

#[test]
fn test_reserved_word_names_compile_through_gate() {
    let doc = cubeql_schema::parse_str(
        r#"<Schema name="Depot">
             <Cube name="Moves">
               <Table name="fact_moves"/>
               <Dimension name="Set">
                 <Hierarchy>
                   <Level name="Set" column="set"/>
                 </Hierarchy>
               </Dimension>
               <Measure name="Load" column="copy" aggregator="sum"/>
             </Cube>
           </Schema>"#,
    )
    .unwrap();
    let cube = &doc.cubes[0];
    let config = PivotConfig {
        rows: vec![LevelRef::new("Set", "Set")],
        measures: vec![MeasureRef::new("Load")],
        ..Default::default()
    };
    let compiled = compile(cube, &config).unwrap();
    assert!(compiled.sql.contains("SUM(\"copy\") AS \"load\""), "{}", compiled.sql);
    assert_eq!(compiled.columns, vec!["set_set", "load"]);

    let gate = SafetyGate::new(Whitelist::from_cube(cube));
    let validated = gate.validate(&compiled.sql).unwrap();
    assert_eq!(validated.as_str(), compiled.sql);
}

#[test]
fn test_blocked_words_are_always_quoted() {
    for word in MUTATING_KEYWORDS {
        let lower = word.to_lowercase();
        assert!(quote_ident(&lower).starts_with('"'), "{word}");
    }
}

#[test]
fn test_mutation_blocklist_in_any_shape() {
    let gate = sales_gate();
    let statements = ["UPDATE x", "DELETE FROM x", "DROP TABLE x", "ALTER TABLE x", "INSERT INTO x"];
    for statement in statements {
        for sql in [
            statement.to_string(),
            statement.to_lowercase(),
            format!("  \n\t{}  ;  ", statement.replace(' ', "   ")),
            statement
                .chars()
                .enumerate()
                .map(|(i, c)| if i % 2 == 0 { c.to_ascii_lowercase() } else { c })
                .collect(),
        ] {
            let err = gate.validate(&sql).unwrap_err();
            assert!(matches!(err.rule, SafetyRule::MutatingKeyword(_)), "{sql:?}");
        }
    }
}

#[test]
fn test_keyword_inside_identifier_is_not_a_match() {
    let mut whitelist = cubeql_guard::Whitelist::from_cube(&sales_cube());
    whitelist.allow_column("last_update");
    let gate = cubeql_guard::SafetyGate::new(whitelist);

    assert!(gate.validate("SELECT last_update FROM fact_sales").is_ok());
}

#[test]
fn test_limit_injected_when_absent() {
    let validated = sales_gate()
        .validate("SELECT channel, SUM(sales_amount) AS total FROM fact_sales GROUP BY channel")
        .unwrap();
    assert_eq!(validated.limit_action(), LimitAction::Injected);
    assert_eq!(validated.limit(), ROW_CAP);
    assert!(validated.as_str().ends_with("LIMIT 1000"));
}

#[test]
fn test_limit_clamped_when_above_cap() {
    let validated = sales_gate()
        .validate("SELECT channel FROM fact_sales LIMIT 1000000")
        .unwrap();
    assert_eq!(validated.limit_action(), LimitAction::Clamped { requested: 1_000_000 });
    assert!(validated.as_str().ends_with("LIMIT 1000"));
}

#[test]
fn test_limit_below_cap_passes_through() {
    let sql = "SELECT channel FROM fact_sales LIMIT 25";
    let validated = sales_gate().validate(sql).unwrap();
    assert_eq!(validated.limit_action(), LimitAction::Kept);
    assert_eq!(validated.limit(), 25);
    assert_eq!(validated.as_str(), sql);
}
