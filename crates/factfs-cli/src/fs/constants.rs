//! Constants for the FUSE adapter layer.

use std::time::Duration;

/// ROOT_INO is the inode ID for the filesystem root.
pub const ROOT_INO: u64 = 1;
/// FACT_INO is the inode ID for the synthetic catalog file.
pub const FACT_INO: u64 = 2;
/// FIRST_DYNAMIC_INO is the lowest inode ID assigned to catalog nodes.
pub const FIRST_DYNAMIC_INO: u64 = 3;
/// FACT_FILE_NAME is the catalog pseudo-file exposed in the root directory.
pub const FACT_FILE_NAME: &str = "fact.json";
/// FACT_FH is the sentinel handle for the catalog pseudo-file; the engine's
/// handle table never reaches it.
pub const FACT_FH: u64 = u64::MAX;
/// TTL controls kernel cache TTL for attribute entries.
pub const TTL: Duration = Duration::from_secs(1);
/// OPEN_DIRECT_IO toggles direct I/O for FUSE file handles.
pub const OPEN_DIRECT_IO: u32 = 1;
/// STATFS_NAME_LEN is the maximum filename length reported by statfs.
pub const STATFS_NAME_LEN: u32 = 255;
/// DEFAULT_BLOCK_SIZE is the mkfs default block size in bytes.
pub const DEFAULT_BLOCK_SIZE: u64 = 4096;
/// DEFAULT_BLOCK_COUNT is the mkfs default number of blocks.
pub const DEFAULT_BLOCK_COUNT: u64 = 1024;
