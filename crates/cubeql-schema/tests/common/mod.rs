//! Shared test utilities for integration tests

use cubeql_schema::{parse_file, SchemaDocument};

/// Load a fixture from the crate's test_data directory
pub fn load_test_data(name: &str) -> SchemaDocument {
    let path = format!("test_data/{}", name);
    parse_file(&path).unwrap_or_else(|e| panic!("Failed to load test data {}: {}", name, e))
}
