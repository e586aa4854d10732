//! Integration tests for schema ingestion and snapshot persistence

mod common;

use common::{TempPath, SALES_XML};
use cubeql_registry::{CubeRegistry, RegistryError};
use std::sync::Arc;
use std::thread;

#[test]
fn test_ingest_fixture() {
    let registry = CubeRegistry::new();
    let names = registry.ingest_str(SALES_XML).unwrap();

    assert_eq!(names, vec!["Sales"]);
    let cube = registry.get("Sales").unwrap();
    assert_eq!(cube.dimensions.len(), 4);
}

#[test]
fn test_failed_ingest_registers_nothing() {
    let registry = CubeRegistry::new();
    let xml = r#"<Schema><Cube name="A" factTable="a"/><Cube name="B"/></Schema>"#;

    let err = registry.ingest_str(xml).unwrap_err();
    assert!(matches!(err, RegistryError::Schema(_)));
    assert!(registry.is_empty());
}

#[test]
fn test_snapshot_round_trip_restores_cubes() {
    let path = TempPath::new("round-trip");
    let original = CubeRegistry::new();
    original.ingest_str(SALES_XML).unwrap();
    original.save_snapshot(&path.0).unwrap();

    let restored = CubeRegistry::new();
    let names = restored.load_snapshot(&path.0).unwrap();

    assert_eq!(names, vec!["Sales"]);
    assert_eq!(*restored.get("Sales").unwrap(), *original.get("Sales").unwrap());
}

#[test]
fn test_missing_snapshot_is_an_io_error() {
    let path = TempPath::new("missing");
    let err = CubeRegistry::new().load_snapshot(&path.0).unwrap_err();
    assert!(matches!(err, RegistryError::SnapshotIo { .. }));
}

#[test]
fn test_corrupt_snapshot_is_a_format_error() {
    let path = TempPath::new("corrupt");
    std::fs::write(&path.0, "{ not json").unwrap();

    let err = CubeRegistry::new().load_snapshot(&path.0).unwrap_err();
    assert!(matches!(err, RegistryError::SnapshotFormat(_)));
}

#[test]
fn test_concurrent_readers_see_whole_snapshots() {
    let registry = Arc::new(CubeRegistry::new());
    registry.ingest_str(SALES_XML).unwrap();

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..200 {
                    let cube = registry.get("Sales").unwrap();
                    assert_eq!(cube.measures.len(), 4);
                }
            })
        })
        .collect();

    for _ in 0..50 {
        registry.ingest_str(SALES_XML).unwrap();
    }
    for reader in readers {
        reader.join().unwrap();
    }
}
