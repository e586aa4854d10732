//! Retail fixture shared by the server's unit tests

use std::sync::Arc;

use cubeql_duck::DuckWarehouse;
use cubeql_registry::CubeRegistry;

pub const SALES_XML: &str = include_str!("../../cubeql-schema/test_data/sales.xml");

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
INSERT INTO dim_product VALUES (1, 'Bikes', 'Road Bike');
INSERT INTO dim_store VALUES (1, 'West', 'Seattle');
INSERT INTO fact_sales VALUES
    (1, 1, 1, 'web', 100.0, 1, 1, 100.0),
    (2, 1, 1, 'web', 75.0, 1, 2, 75.0),
    (3, 1, 1, 'store', 75.0, 1, 3, 75.0);
";

pub fn sales_registry() -> Arc<CubeRegistry> {
    let registry = CubeRegistry::new();
    registry
        .ingest_str(SALES_XML)
        .unwrap_or_else(|e| panic!("Failed to ingest fixture: {}", e));
    Arc::new(registry)
}

pub fn sales_warehouse() -> Arc<DuckWarehouse> {
    let conn = duckdb::Connection::open_in_memory()
        .unwrap_or_else(|e| panic!("Failed to open DuckDB: {}", e));
    conn.execute_batch(SEED)
        .unwrap_or_else(|e| panic!("Failed to seed warehouse: {}", e));
    Arc::new(DuckWarehouse::with_connection(conn))
}
