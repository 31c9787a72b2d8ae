//! Free-space allocation over the used-block set.
//!
//! The used set is the union of the FACT chain's own blocks and every block
//! referenced by a file allocation extent. It is rebuilt in full whenever the
//! catalog is decoded and is never persisted directly.

use std::collections::BTreeSet;

use crate::error::{FsError, Result};

/// Reserves and returns the smallest block index not present in `used`.
///
/// The set is ordered, so a single pass finds the first gap; the chosen index
/// is inserted before returning, which keeps repeated calls from handing out
/// the same block twice.
///
/// # Errors
/// Returns `OutOfSpace` when the smallest free index is `>= block_count`.
pub fn allocate_next(used: &mut BTreeSet<u64>, block_count: u64) -> Result<u64> {
    let mut candidate = 0u64;
    for &index in used.iter() {
        if index == candidate {
            candidate += 1;
        } else if index > candidate {
            break;
        }
    }

    if candidate >= block_count {
        return Err(FsError::OutOfSpace);
    }
    used.insert(candidate);
    Ok(candidate)
}
