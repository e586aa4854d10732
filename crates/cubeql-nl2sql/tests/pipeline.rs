//! NL2SQL pipeline with scripted completion and warehouse fakes

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{pipeline, sales_registry, FakeWarehouse, Outcome, ScriptedProvider};
use cubeql_guard::{LimitAction, SafetyRule};
use cubeql_nl2sql::{Nl2SqlError, Stage};
use cubeql_registry::CubeRegistry;

const CHANNEL_SQL: &str =
    "SELECT channel, SUM(sales_amount) AS total FROM fact_sales GROUP BY channel ORDER BY total DESC";

#[tokio::test]
async fn test_answers_question_end_to_end() {
    let provider = ScriptedProvider::replying(&format!("```sql\n{CHANNEL_SQL};\n```"));
    let warehouse = FakeWarehouse::new(Outcome::Rows);
    let nl2sql = pipeline(sales_registry(), provider.clone(), warehouse.clone());

    let answer = nl2sql.ask("Sales by channel?", Some("Sales")).await.unwrap();

    assert_eq!(answer.sql, format!("{CHANNEL_SQL} LIMIT 1000"));
    assert_eq!(answer.columns, vec!["channel", "total"]);
    assert_eq!(answer.row_count, 2);
    assert_eq!(warehouse.executed(), vec![answer.sql.clone()]);
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_prompt_describes_requested_cube() {
    let provider = ScriptedProvider::replying(CHANNEL_SQL);
    let nl2sql = pipeline(sales_registry(), provider.clone(), FakeWarehouse::new(Outcome::Rows));

    nl2sql.ask("Sales by channel?", Some("Sales")).await.unwrap();

    let prompts = provider.prompts.lock().unwrap();
    let prompt = &prompts[0];
    assert!(prompt.system.contains("## Cube: Sales"));
    assert!(prompt.system.contains("fact_sales.date_id = dim_date.id"));
    assert!(prompt.system.contains("SUM(fact_sales.sales_amount)"));
    assert!(prompt.user.contains("Sales by channel?"));
}

#[tokio::test]
async fn test_drop_table_completion_is_never_executed() {
    let provider = ScriptedProvider::replying("```sql\nDROP TABLE fact_sales;\n```");
    let warehouse = FakeWarehouse::new(Outcome::Rows);
    let nl2sql = pipeline(sales_registry(), provider, warehouse.clone());

    let failure = nl2sql.ask("Clean up the data", Some("Sales")).await.unwrap_err();

    assert_eq!(failure.stage, Stage::Validate);
    assert_eq!(failure.kind(), "unsafe_query");
    assert_eq!(
        failure.artifact.extracted_sql.as_deref(),
        Some("DROP TABLE fact_sales;")
    );
    match &failure.error {
        Nl2SqlError::Unsafe(err) => {
            assert_eq!(err.rule, SafetyRule::MutatingKeyword("DROP".to_string()))
        }
        other => panic!("expected a safety rejection, got {other:?}"),
    }
    assert!(failure.to_string().contains("rejected for safety reasons"));
    assert!(warehouse.executed().is_empty());
}

#[tokio::test]
async fn test_secret_table_is_rejected() {
    let provider = ScriptedProvider::replying("SELECT id FROM secret_table");
    let warehouse = FakeWarehouse::new(Outcome::Rows);
    let nl2sql = pipeline(sales_registry(), provider, warehouse.clone());

    let failure = nl2sql.ask("Show secrets", None).await.unwrap_err();

    match &failure.error {
        Nl2SqlError::Unsafe(err) => {
            assert_eq!(err.rule, SafetyRule::UnknownTable("secret_table".to_string()))
        }
        other => panic!("expected a safety rejection, got {other:?}"),
    }
    assert!(warehouse.executed().is_empty());
}

#[tokio::test]
async fn test_large_limit_is_clamped_before_execution() {
    let provider = ScriptedProvider::replying("SELECT channel FROM fact_sales LIMIT 999999");
    let warehouse = FakeWarehouse::new(Outcome::Rows);
    let nl2sql = pipeline(sales_registry(), provider, warehouse.clone());

    nl2sql.ask("All channels", Some("Sales")).await.unwrap();
    assert_eq!(warehouse.executed(), vec!["SELECT channel FROM fact_sales LIMIT 1000"]);
}

#[tokio::test]
async fn test_preview_stops_after_validation() {
    let provider = ScriptedProvider::replying("SELECT channel FROM fact_sales LIMIT 5");
    let warehouse = FakeWarehouse::new(Outcome::Rows);
    let nl2sql = pipeline(sales_registry(), provider, warehouse.clone());

    let artifact = nl2sql.preview("Five channels", Some("Sales")).await.unwrap();

    let validated = artifact.validated.as_ref().unwrap();
    assert_eq!(validated.as_str(), "SELECT channel FROM fact_sales LIMIT 5");
    assert_eq!(validated.limit_action(), LimitAction::Kept);
    assert_eq!(artifact.completed.last(), Some(&Stage::Validate));
    assert!(artifact.result.is_none());
    assert!(warehouse.executed().is_empty());
}

#[tokio::test]
async fn test_prose_without_sql_is_an_extraction_error() {
    let provider = ScriptedProvider::replying("I am not sure which table holds that.");
    let nl2sql = pipeline(sales_registry(), provider, FakeWarehouse::new(Outcome::Rows));

    let failure = nl2sql.ask("Who are our best customers?", None).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Extract);
    assert_eq!(failure.kind(), "extraction");
    assert!(failure.artifact.completion.is_some());
}

#[tokio::test]
async fn test_provider_failure_is_not_retried() {
    let provider = ScriptedProvider::failing("connection refused");
    let nl2sql = pipeline(sales_registry(), provider.clone(), FakeWarehouse::new(Outcome::Rows));

    let failure = nl2sql.ask("Sales by year", None).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Complete);
    assert_eq!(failure.kind(), "llm");
    assert_eq!(provider.calls(), 1);
}

#[tokio::test]
async fn test_provider_timeout() {
    let provider = ScriptedProvider::stalled(Duration::from_secs(5));
    let nl2sql = pipeline(sales_registry(), provider, FakeWarehouse::new(Outcome::Rows));

    let failure = nl2sql.ask("Sales by year", None).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Complete);
    assert!(matches!(
        failure.error,
        Nl2SqlError::Llm(cubeql_nl2sql::LlmError::Timeout(_))
    ));
}

#[tokio::test]
async fn test_execution_errors_are_distinguished() {
    let nl2sql = pipeline(
        sales_registry(),
        ScriptedProvider::replying(CHANNEL_SQL),
        FakeWarehouse::new(Outcome::Timeout),
    );
    let failure = nl2sql.ask("Sales by channel", None).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Execute);
    assert_eq!(failure.kind(), "execution_timeout");

    let nl2sql = pipeline(
        sales_registry(),
        ScriptedProvider::replying(CHANNEL_SQL),
        FakeWarehouse::new(Outcome::Fail("Binder Error: column not found")),
    );
    let failure = nl2sql.ask("Sales by channel", None).await.unwrap_err();
    assert_eq!(failure.kind(), "execution");
    assert!(failure.error.to_string().contains("Binder Error"));
}

#[tokio::test]
async fn test_unknown_cube_and_empty_registry() {
    let provider = ScriptedProvider::replying(CHANNEL_SQL);
    let nl2sql = pipeline(sales_registry(), provider.clone(), FakeWarehouse::new(Outcome::Rows));
    let failure = nl2sql.ask("Anything", Some("sales")).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Summarize);
    assert_eq!(failure.kind(), "metadata");

    let nl2sql = pipeline(
        Arc::new(CubeRegistry::new()),
        provider.clone(),
        FakeWarehouse::new(Outcome::Rows),
    );
    let failure = nl2sql.ask("Anything", None).await.unwrap_err();
    assert!(matches!(failure.error, Nl2SqlError::NoMetadata));
    assert_eq!(provider.calls(), 0);
}

#[tokio::test]
async fn test_each_request_gets_its_own_id() {
    let provider = ScriptedProvider::replying(CHANNEL_SQL);
    let nl2sql = pipeline(sales_registry(), provider, FakeWarehouse::new(Outcome::Rows));

    let first = nl2sql.ask("Sales by channel", None).await.unwrap();
    let second = nl2sql.ask("Sales by channel", None).await.unwrap();
    assert_ne!(first.request_id, second.request_id);
    assert_eq!(first.sql, second.sql);
}
