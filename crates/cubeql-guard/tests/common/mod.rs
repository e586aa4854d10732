//! Shared test utilities for integration tests

use cubeql_guard::{SafetyGate, Whitelist};
use cubeql_model::Cube;

pub const SALES_XML: &str = include_str!("../../../cubeql-schema/test_data/sales.xml");

pub fn sales_cube() -> Cube {
    let doc = cubeql_schema::parse_str(SALES_XML)
        .unwrap_or_else(|e| panic!("Failed to parse fixture: {}", e));
    doc.cubes
        .into_iter()
        .find(|c| c.name == "Sales")
        .unwrap_or_else(|| panic!("Fixture has no Sales cube"))
}

/// Gate whitelisting exactly the `Sales` cube
pub fn sales_gate() -> SafetyGate {
    SafetyGate::new(Whitelist::from_cube(&sales_cube()))
}
