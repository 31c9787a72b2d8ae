//! FACT chain codec.
//!
//! The catalog document is persisted as a singly-linked chain of blocks
//! starting at block 0. The final 8 bytes of every chain block hold the next
//! block index as a big-endian u64, with 0 marking the terminal block; the
//! terminal block's payload is zero-padded to fill the block and the padding
//! is trimmed on read.

use std::collections::BTreeSet;

use crate::alloc::allocate_next;
use crate::error::{FsError, Result};
use crate::image::{HEADER_SIZE, Image};

/// Byte size of the next-block pointer at the end of each chain block.
pub const CHAIN_PTR_SIZE: usize = HEADER_SIZE as usize;

/// Reads the whole catalog chain starting at block 0.
///
/// Returns the catalog bytes and the ordered list of visited block indices.
/// The index list is kept by the engine and reused positionally on rewrite.
///
/// # Errors
/// Fails on I/O errors and on corrupt chains (a pointer that leaves the
/// image or revisits a block).
pub fn read_chain(image: &Image) -> Result<(Vec<u8>, Vec<u64>)> {
    let block_size = usize::try_from(image.block_size())
        .map_err(|_| FsError::Schema("block size exceeds addressable memory".into()))?;
    let payload_size = block_size - CHAIN_PTR_SIZE;

    let mut bytes = Vec::new();
    let mut visited = Vec::new();
    let mut seen = BTreeSet::new();
    let mut block = vec![0u8; block_size];
    let mut current = 0u64;

    loop {
        if !seen.insert(current) {
            return Err(FsError::Schema(format!(
                "FACT chain revisits block {current}"
            )));
        }
        image.read_block(current, &mut block)?;
        visited.push(current);

        let next = u64::from_be_bytes(
            block[payload_size..]
                .try_into()
                .map_err(|_| FsError::Schema("unreadable chain pointer".into()))?,
        );

        if next == 0 {
            // Terminal block: drop the zero padding between the payload's
            // real end and the pointer field.
            let mut end = payload_size;
            while end > 0 && block[end - 1] == 0 {
                end -= 1;
            }
            bytes.extend_from_slice(&block[..end]);
            return Ok((bytes, visited));
        }

        if next >= image.block_count() {
            return Err(FsError::Schema(format!(
                "FACT chain pointer {next} is outside the image"
            )));
        }
        bytes.extend_from_slice(&block[..payload_size]);
        current = next;
    }
}

/// Writes `bytes` as a chain over `chain`, extending it via the allocator
/// when the catalog has grown.
///
/// Existing chain indices are reused positionally; any shortfall is
/// allocated up front, so an out-of-space failure leaves every previously
/// written chain block untouched. A shrinking catalog keeps its surplus
/// chain entries reserved for the next rewrite.
///
/// # Errors
/// Fails with `OutOfSpace` when the allocator cannot extend the chain, or
/// with the underlying I/O error.
pub fn write_chain(
    image: &mut Image,
    bytes: &[u8],
    chain: &mut Vec<u64>,
    used: &mut BTreeSet<u64>,
) -> Result<()> {
    let block_size = usize::try_from(image.block_size())
        .map_err(|_| FsError::Schema("block size exceeds addressable memory".into()))?;
    let payload_size = block_size - CHAIN_PTR_SIZE;

    // An empty catalog still owns its terminal block at the chain head.
    let blocks_needed = bytes.len().div_ceil(payload_size).max(1);
    while chain.len() < blocks_needed {
        chain.push(allocate_next(used, image.block_count())?);
    }

    let mut block = vec![0u8; block_size];
    for (i, &index) in chain.iter().take(blocks_needed).enumerate() {
        block.fill(0);
        let start = i * payload_size;
        let end = (start + payload_size).min(bytes.len());
        block[..end - start].copy_from_slice(&bytes[start..end]);

        let next = if i + 1 < blocks_needed { chain[i + 1] } else { 0 };
        block[payload_size..].copy_from_slice(&next.to_be_bytes());
        image.write_block(index, &block)?;
    }
    Ok(())
}
