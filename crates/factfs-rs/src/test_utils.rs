//! Shared helpers for storage-engine tests.

use std::path::PathBuf;

use tempfile::TempDir;

use crate::engine::Engine;

pub(crate) const TEST_BLOCK_SIZE: u64 = 64;
pub(crate) const TEST_BLOCK_COUNT: u64 = 256;

pub(crate) fn image_path(dir: &TempDir) -> PathBuf {
    dir.path().join("factfs.img")
}

/// Formats and opens a fresh engine on a temp image, returning the tempdir
/// guard alongside so the image outlives the test body.
pub(crate) fn create_engine() -> (TempDir, Engine) {
    create_engine_with(TEST_BLOCK_SIZE, TEST_BLOCK_COUNT)
}

pub(crate) fn create_engine_with(block_size: u64, block_count: u64) -> (TempDir, Engine) {
    let dir = TempDir::new().expect("temp dir");
    let path = image_path(&dir);
    Engine::format(&path, block_size, block_count).expect("format image");
    let engine = Engine::open(&path).expect("open engine");
    (dir, engine)
}

/// Reopens the engine from the same image, dropping all in-memory state.
pub(crate) fn reopen(dir: &TempDir, engine: Engine) -> Engine {
    drop(engine);
    Engine::open(&image_path(dir)).expect("reopen engine")
}
