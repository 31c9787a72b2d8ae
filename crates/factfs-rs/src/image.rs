//! Block store over a memory-mapped image file.
//!
//! Image layout: bytes `[0, 8)` hold the block size as a big-endian u64,
//! followed by `block_count` blocks of `block_size` bytes each. All I/O at
//! this layer is whole-block; higher layers buffer at block granularity.

use std::fs::File;
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{FsError, Result};

/// Byte size of the image header (and of a chain pointer).
pub const HEADER_SIZE: u64 = 8;

pub struct Image {
    path: PathBuf,
    file: File,
    map: MmapMut,
    block_size: u64,
    block_count: u64,
}

impl Image {
    /// Opens an existing image and reads its header.
    ///
    /// The block count is derived as `file_size / block_size`, decremented
    /// once when `block_count * block_size + HEADER_SIZE` overshoots the file
    /// length. Kept bit-for-bit compatible with images formatted by older
    /// tools; the decrement also guarantees every block lies inside the map.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened or mapped, or if the
    /// header declares a block size of `HEADER_SIZE` bytes or fewer.
    pub fn open(path: &Path) -> Result<Self> {
        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .open(path)?;
        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE {
            return Err(FsError::Schema(format!(
                "image {} is too short for a header",
                path.display()
            )));
        }

        let map = unsafe { MmapOptions::new().map_mut(&file)? };
        let block_size = u64::from_be_bytes(
            map[..HEADER_SIZE as usize]
                .try_into()
                .map_err(|_| FsError::Schema("unreadable image header".into()))?,
        );
        if block_size <= HEADER_SIZE {
            return Err(FsError::Schema(format!(
                "block size {block_size} must exceed the {HEADER_SIZE}-byte header"
            )));
        }

        let mut block_count = file_size / block_size;
        if block_count * block_size + HEADER_SIZE > file_size {
            block_count -= 1;
        }

        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            block_size,
            block_count,
        })
    }

    /// Creates a fresh, zero-filled image with the given geometry and writes
    /// its header. Block contents are all zero; the caller is expected to
    /// write an initial catalog chain before the image is mountable.
    ///
    /// # Errors
    /// Returns an error if the file cannot be created, sized, or mapped, or
    /// if `block_size <= HEADER_SIZE` or `block_count == 0`.
    pub fn create(path: &Path, block_size: u64, block_count: u64) -> Result<Self> {
        if block_size <= HEADER_SIZE {
            return Err(FsError::InvalidArgument(format!(
                "block size {block_size} must exceed {HEADER_SIZE} bytes"
            )));
        }
        if block_count == 0 {
            return Err(FsError::InvalidArgument(
                "image needs at least one block".into(),
            ));
        }

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        file.set_len(HEADER_SIZE + block_size * block_count)?;

        let mut map = unsafe { MmapOptions::new().map_mut(&file)? };
        map[..HEADER_SIZE as usize].copy_from_slice(&block_size.to_be_bytes());
        map.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            map,
            block_size,
            block_count,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.block_size
    }

    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.block_count
    }

    /// Reads one whole block into `buf`. `buf.len()` must equal the block
    /// size.
    ///
    /// # Errors
    /// Returns `OutOfRange` when `index >= block_count`.
    pub fn read_block(&self, index: u64, buf: &mut [u8]) -> Result<()> {
        let range = self.block_range(index, buf.len())?;
        buf.copy_from_slice(&self.map[range]);
        Ok(())
    }

    /// Writes one whole block from `buf`. `buf.len()` must equal the block
    /// size.
    ///
    /// # Errors
    /// Returns `OutOfRange` when `index >= block_count`.
    pub fn write_block(&mut self, index: u64, buf: &[u8]) -> Result<()> {
        let range = self.block_range(index, buf.len())?;
        self.map[range].copy_from_slice(buf);
        Ok(())
    }

    /// Flushes the map back to the image file.
    ///
    /// # Errors
    /// Propagates the underlying I/O error.
    pub fn flush(&self) -> Result<()> {
        self.map.flush()?;
        self.file.sync_data()?;
        Ok(())
    }

    fn block_range(&self, index: u64, buf_len: usize) -> Result<std::ops::Range<usize>> {
        if index >= self.block_count {
            return Err(FsError::OutOfRange {
                index,
                count: self.block_count,
            });
        }
        debug_assert_eq!(buf_len as u64, self.block_size, "whole-block I/O only");
        let start = usize::try_from(HEADER_SIZE + index * self.block_size).map_err(|_| {
            FsError::OutOfRange {
                index,
                count: self.block_count,
            }
        })?;
        Ok(start..start + buf_len)
    }
}
