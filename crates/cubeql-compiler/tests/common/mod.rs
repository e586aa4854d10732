//! Shared test utilities for integration tests

use cubeql_model::{Cube, LevelRef, MeasureRef, PivotConfig};

pub const SALES_XML: &str = include_str!("../../../cubeql-schema/test_data/sales.xml");

/// The `Sales` cube from the retail fixture
pub fn sales_cube() -> Cube {
    let doc = cubeql_schema::parse_str(SALES_XML)
        .unwrap_or_else(|e| panic!("Failed to parse fixture: {}", e));
    doc.cubes
        .into_iter()
        .find(|c| c.name == "Sales")
        .unwrap_or_else(|| panic!("Fixture has no Sales cube"))
}

/// rows=[D/L, ...], measures=[M, ...]
pub fn pivot(rows: &[(&str, &str)], measures: &[&str]) -> PivotConfig {
    PivotConfig {
        rows: rows.iter().map(|(d, l)| LevelRef::new(*d, *l)).collect(),
        measures: measures.iter().map(|m| MeasureRef::new(*m)).collect(),
        ..Default::default()
    }
}
