#![allow(dead_code)]

use engine_core::state::sled_store::SledStateStore;
use std::sync::Arc;
use tempfile::TempDir;

pub mod utils;

/// Sled-backed state store in a fresh temp directory. The returned guard
/// keeps the directory alive for the duration of the test; dropping it
/// removes the store from disk.
fn temp_store() -> (Arc<SledStateStore>, TempDir) {
    let dir = tempfile::tempdir().expect("create temp state dir");
    let store = SledStateStore::open(dir.path().join("state")).expect("open sled state store");
    (Arc::new(store), dir)
}

/// Scratch directory for input and output files of a single test.
fn temp_data_dir() -> TempDir {
    tempfile::tempdir().expect("create temp data dir")
}
