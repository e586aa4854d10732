//! Cube metadata registry
//!
//! Holds every parsed cube keyed by name. Readers take an `Arc` snapshot of
//! the whole map; registration builds a new map and swaps it in, so a reader
//! never observes a half-applied schema upload.

use cubeql_model::Cube;
use cubeql_schema::{SchemaDocument, SchemaError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Cube not found: {0}")]
    CubeNotFound(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Snapshot I/O failed for {path}: {source}")]
    SnapshotIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot is not valid JSON: {0}")]
    SnapshotFormat(#[from] serde_json::Error),
}

pub type CubeMap = BTreeMap<String, Arc<Cube>>;

/// On-disk form of the registry
#[derive(Debug, Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    cubes: Vec<Cube>,
}

const SNAPSHOT_VERSION: u32 = 1;

#[derive(Default)]
pub struct CubeRegistry {
    cubes: RwLock<Arc<CubeMap>>,
}

impl CubeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every cube of a parsed document, replacing same-named cubes
    pub fn ingest(&self, document: SchemaDocument) -> Vec<String> {
        info!(schema = %document.name, cubes = document.cubes.len(), "Registering schema");
        self.register(document.cubes)
    }

    /// Parse an XML schema and register it; nothing is registered on error
    pub fn ingest_str(&self, xml: &str) -> Result<Vec<String>, RegistryError> {
        let document = cubeql_schema::parse_str(xml)?;
        Ok(self.ingest(document))
    }

    pub fn ingest_file(&self, path: impl AsRef<Path>) -> Result<Vec<String>, RegistryError> {
        let document = cubeql_schema::parse_file(path)?;
        Ok(self.ingest(document))
    }

    /// Swap in a new map containing `cubes`. Returns the registered names.
    pub fn register(&self, cubes: Vec<Cube>) -> Vec<String> {
        let mut guard = self.cubes.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = CubeMap::clone(&guard);
        let mut names = Vec::with_capacity(cubes.len());
        for cube in cubes {
            if next.contains_key(&cube.name) {
                debug!(cube = %cube.name, "Replacing existing cube");
            }
            names.push(cube.name.clone());
            next.insert(cube.name.clone(), Arc::new(cube));
        }
        *guard = Arc::new(next);
        names
    }

    /// Exact, case-sensitive lookup
    pub fn get(&self, name: &str) -> Result<Arc<Cube>, RegistryError> {
        self.snapshot()
            .get(name)
            .cloned()
            .ok_or_else(|| RegistryError::CubeNotFound(name.to_string()))
    }

    /// Cube names in sorted order
    pub fn list(&self) -> Vec<String> {
        self.snapshot().keys().cloned().collect()
    }

    /// Consistent view of every registered cube at one instant
    pub fn snapshot(&self) -> Arc<CubeMap> {
        let guard = self.cubes.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&*guard)
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    /// Write every cube to `path` as JSON
    pub fn save_snapshot(&self, path: impl AsRef<Path>) -> Result<(), RegistryError> {
        let path = path.as_ref();
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            cubes: self.snapshot().values().map(|c| c.as_ref().clone()).collect(),
        };
        let json = serde_json::to_string_pretty(&snapshot)?;

        // Write beside the target and rename so a crash never leaves half a file
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|source| snapshot_io(&tmp, source))?;
        std::fs::rename(&tmp, path).map_err(|source| snapshot_io(path, source))?;

        debug!(path = %path.display(), cubes = snapshot.cubes.len(), "Saved registry snapshot");
        Ok(())
    }

    /// Register every cube from a snapshot file written by [`save_snapshot`](Self::save_snapshot)
    pub fn load_snapshot(&self, path: impl AsRef<Path>) -> Result<Vec<String>, RegistryError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| snapshot_io(path, source))?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        info!(path = %path.display(), cubes = snapshot.cubes.len(), "Restoring registry snapshot");
        Ok(self.register(snapshot.cubes))
    }
}

fn snapshot_io(path: &Path, source: std::io::Error) -> RegistryError {
    RegistryError::SnapshotIo {
        path: path.to_path_buf(),
        source,
    }
}
