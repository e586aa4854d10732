use std::collections::BTreeSet;

use cubeql_model::Cube;

/// Tables and columns a statement may reference. Names are compared lower-cased.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Whitelist {
    tables: BTreeSet<String>,
    columns: BTreeSet<String>,
}

impl Whitelist {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every table and declared column of one cube
    pub fn from_cube(cube: &Cube) -> Self {
        let mut whitelist = Self::new();
        whitelist.add_cube(cube);
        whitelist
    }

    pub fn from_cubes<'a>(cubes: impl IntoIterator<Item = &'a Cube>) -> Self {
        let mut whitelist = Self::new();
        for cube in cubes {
            whitelist.add_cube(cube);
        }
        whitelist
    }

    fn add_cube(&mut self, cube: &Cube) {
        for table in cube.tables() {
            self.allow_table(&table.qualified_name());
            self.allow_table(&table.name);
        }
        for (_, column) in cube.declared_columns() {
            self.allow_column(column);
        }
    }

    pub fn allow_table(&mut self, name: &str) {
        self.tables.insert(name.to_lowercase());
    }

    pub fn allow_column(&mut self, name: &str) {
        self.columns.insert(name.to_lowercase());
    }

    pub fn allows_table(&self, name: &str) -> bool {
        self.tables.contains(&name.to_lowercase())
    }

    pub fn allows_column(&self, name: &str) -> bool {
        self.columns.contains(&name.to_lowercase())
    }

    pub fn tables(&self) -> impl Iterator<Item = &str> {
        self.tables.iter().map(String::as_str)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}
