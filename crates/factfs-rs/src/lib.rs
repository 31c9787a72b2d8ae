//! factfs storage engine: a user-space filesystem image whose metadata
//! catalog (the FACT, File Allocation Content Table) is a single JSON
//! document chained through fixed-size blocks inside the image itself.
//!
//! Layers, leaf first:
//! 1. [`image`]: whole-block I/O over a memory-mapped image file.
//! 2. [`alloc`]: smallest-free-index allocation over the used-block set.
//! 3. [`chain`]: the FACT chained-block codec.
//! 4. [`catalog`]: the typed directory tree and its JSON schema boundary.
//! 5. [`handle`]: buffered open-file sessions.
//! 6. [`engine`]: the context object wiring it all together; the only type
//!    most callers need.
//!
//! The engine is synchronous and single-mutator. Callers that
//! dispatch from multiple threads must add their own serialization around
//! the whole [`engine::Engine`].
#![allow(clippy::cargo_common_metadata)]

pub mod alloc;
pub mod catalog;
pub mod chain;
pub mod engine;
pub mod error;
pub mod handle;
pub mod image;

pub use engine::{Engine, FileAttributes};
pub use error::{FsError, Result};
pub use handle::{AccessMode, MAX_HANDLES, OpenFlags};

#[cfg(test)]
mod test_utils;

#[cfg(test)]
mod engine_tests;
