//! Shared test utilities for integration tests

use cubeql_duck::DuckWarehouse;
use cubeql_guard::{SafetyGate, Whitelist};
use cubeql_model::Cube;
use duckdb::Connection;

pub const SALES_XML: &str = include_str!("../../../cubeql-schema/test_data/sales.xml");

/// Star schema matching the retail fixture
const SEED: &str = "
CREATE TABLE dim_date (id INTEGER, year INTEGER, quarter VARCHAR, month_name VARCHAR, month_num INTEGER);
CREATE TABLE dim_product (id INTEGER, category VARCHAR, product_name VARCHAR);
CREATE TABLE dim_store (id INTEGER, region VARCHAR, city VARCHAR);
CREATE TABLE fact_sales (
    date_id INTEGER, product_id INTEGER, store_id INTEGER, channel VARCHAR,
    sales_amount DOUBLE, quantity INTEGER, order_id INTEGER, unit_price DOUBLE
);
INSERT INTO dim_date VALUES
    (1, 2023, 'Q4', 'December', 12),
    (2, 2024, 'Q1', 'January', 1),
    (3, 2024, 'Q2', 'April', 4);
INSERT INTO dim_product VALUES (1, 'Books', 'Atlas'), (2, 'Games', 'Chess');
INSERT INTO dim_store VALUES (1, 'West', 'Portland'), (2, 'East', 'Boston');
INSERT INTO fact_sales VALUES
    (1, 1, 1, 'web', 100.0, 1, 1, 100.0),
    (2, 1, 2, 'store', 50.0, 2, 2, 25.0),
    (2, 2, 1, 'web', 25.0, 1, 2, 25.0),
    (3, 2, 2, 'web', 75.0, 3, 3, 25.0);
";

pub fn sales_cube() -> Cube {
    let doc = cubeql_schema::parse_str(SALES_XML)
        .unwrap_or_else(|e| panic!("Failed to parse fixture: {}", e));
    doc.cubes
        .into_iter()
        .find(|c| c.name == "Sales")
        .unwrap_or_else(|| panic!("Fixture has no Sales cube"))
}

pub fn sales_gate() -> SafetyGate {
    SafetyGate::new(Whitelist::from_cube(&sales_cube()))
}

/// In-memory warehouse seeded with the retail star schema
pub fn sales_warehouse() -> DuckWarehouse {
    let conn = Connection::open_in_memory()
        .unwrap_or_else(|e| panic!("Failed to open DuckDB: {}", e));
    conn.execute_batch(SEED)
        .unwrap_or_else(|e| panic!("Failed to seed warehouse: {}", e));
    DuckWarehouse::with_connection(conn)
}
