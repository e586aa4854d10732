//! Shared test utilities for integration tests

use std::path::PathBuf;

pub const SALES_XML: &str = include_str!("../../../cubeql-schema/test_data/sales.xml");

/// A unique path under the system temp dir; removed on drop
pub struct TempPath(pub PathBuf);

impl TempPath {
    pub fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!(
            "cubeql-registry-{}-{}.json",
            label,
            std::process::id()
        ));
        let _ = std::fs::remove_file(&path);
        TempPath(path)
    }
}

impl Drop for TempPath {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}
