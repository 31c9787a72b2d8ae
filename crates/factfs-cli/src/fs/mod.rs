//! FUSE adapter building blocks over the factfs storage engine.

pub mod constants;
pub mod factfuse;
pub mod inodes;

pub use constants::*;
pub use factfuse::FactFuse;
