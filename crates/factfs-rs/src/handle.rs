//! The open-file handle table.
//!
//! A handle is a buffered session on one file: the full contents are
//! materialized into memory on open and written back on flush. Handles hold
//! the file's path, not a pointer into the tree, so a catalog swap can never
//! leave a handle dangling; every operation re-resolves the node.

use crate::error::{FsError, Result};

/// Maximum number of concurrently open handles.
pub const MAX_HANDLES: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

/// Open-time options, mirroring the POSIX flag subset the engine honors.
#[derive(Clone, Copy, Debug)]
pub struct OpenFlags {
    pub mode: AccessMode,
    /// Create the file when missing.
    pub create: bool,
    /// Combined with `create`: fail when the file already exists.
    pub exclusive: bool,
}

impl OpenFlags {
    #[must_use]
    pub const fn read() -> Self {
        Self {
            mode: AccessMode::ReadOnly,
            create: false,
            exclusive: false,
        }
    }

    #[must_use]
    pub const fn write() -> Self {
        Self {
            mode: AccessMode::WriteOnly,
            create: false,
            exclusive: false,
        }
    }

    #[must_use]
    pub const fn read_write() -> Self {
        Self {
            mode: AccessMode::ReadWrite,
            create: false,
            exclusive: false,
        }
    }

    #[must_use]
    pub const fn with_create(mut self, exclusive: bool) -> Self {
        self.create = true;
        self.exclusive = exclusive;
        self
    }

    #[must_use]
    pub const fn readable(&self) -> bool {
        !matches!(self.mode, AccessMode::WriteOnly)
    }

    #[must_use]
    pub const fn writable(&self) -> bool {
        !matches!(self.mode, AccessMode::ReadOnly)
    }
}

pub struct FileHandle {
    pub path: String,
    pub buffer: Vec<u8>,
    pub flags: OpenFlags,
}

/// Fixed-capacity slot table for open handles. Handle ids are slot indices;
/// a released slot is reused by the next open.
pub struct HandleTable {
    slots: Vec<Option<FileHandle>>,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    #[must_use]
    pub fn new() -> Self {
        let mut slots = Vec::with_capacity(MAX_HANDLES);
        slots.resize_with(MAX_HANDLES, || None);
        Self { slots }
    }

    /// Places `handle` in the lowest free slot and returns its id.
    ///
    /// # Errors
    /// `TooManyOpenFiles` when every slot is occupied.
    pub fn acquire(&mut self, handle: FileHandle) -> Result<u64> {
        let Some(slot) = self.slots.iter().position(Option::is_none) else {
            return Err(FsError::TooManyOpenFiles);
        };
        self.slots[slot] = Some(handle);
        Ok(slot as u64)
    }

    /// # Errors
    /// `BadHandle` when `fh` is out of range or already released.
    pub fn get(&self, fh: u64) -> Result<&FileHandle> {
        usize::try_from(fh)
            .ok()
            .and_then(|slot| self.slots.get(slot))
            .and_then(Option::as_ref)
            .ok_or(FsError::BadHandle)
    }

    /// # Errors
    /// `BadHandle` when `fh` is out of range or already released.
    pub fn get_mut(&mut self, fh: u64) -> Result<&mut FileHandle> {
        usize::try_from(fh)
            .ok()
            .and_then(|slot| self.slots.get_mut(slot))
            .and_then(Option::as_mut)
            .ok_or(FsError::BadHandle)
    }

    /// Drops the handle's buffer and frees its slot.
    ///
    /// # Errors
    /// `BadHandle` when `fh` is out of range or already released.
    pub fn release(&mut self, fh: u64) -> Result<()> {
        let slot = usize::try_from(fh).map_err(|_| FsError::BadHandle)?;
        match self.slots.get_mut(slot) {
            Some(entry @ Some(_)) => {
                *entry = None;
                Ok(())
            }
            _ => Err(FsError::BadHandle),
        }
    }

    /// All live handles, for cross-handle patching (path-based truncate).
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut FileHandle> {
        self.slots.iter_mut().filter_map(Option::as_mut)
    }
}
