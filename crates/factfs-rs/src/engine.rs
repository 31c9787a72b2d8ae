//! The storage engine: one context object owning the image, the decoded
//! catalog, the FACT chain, the used-block set, and the open-handle table.
//!
//! Every operation takes `&mut self`; the engine has no internal locking and
//! expects a single caller thread (the FUSE session dispatches one operation
//! at a time). Catalog persistence is transactional: the chain is only
//! rewritten after the new content is validated, and a failed save restores
//! the tree from the last known-good bytes.

use std::collections::BTreeSet;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, warn};

use crate::alloc::allocate_next;
use crate::catalog::{Catalog, Extent, Node, components, split_parent};
use crate::chain::{read_chain, write_chain};
use crate::error::{FsError, Result};
use crate::handle::{FileHandle, HandleTable, OpenFlags};
use crate::image::Image;

/// Size reported for directories, matching what the original engine told
/// stat callers.
const DIRECTORY_SIZE: u64 = 4096;

/// Attribute view handed to the protocol adapter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    pub is_dir: bool,
    pub size: u64,
    /// Permission bits parsed from the node's octal string.
    pub mode: u32,
    pub date_created: i64,
    pub date_modified: i64,
    pub date_accessed: i64,
}

pub struct Engine {
    image: Image,
    catalog: Catalog,
    /// Ordered list of blocks holding the FACT chain, reused positionally on
    /// every rewrite.
    chain: Vec<u64>,
    /// Union of the chain and all file allocations. Rebuilt in full whenever
    /// the catalog is decoded; updated incrementally between decodes, so
    /// blocks of unlinked files stay reserved until the next full rebuild.
    used: BTreeSet<u64>,
    handles: HandleTable,
    /// Last known-good catalog bytes, mirroring what is on disk.
    snapshot: Vec<u8>,
    /// Pending edits to the raw catalog, exposed as the FACT pseudo-file.
    staging: Vec<u8>,
}

impl Engine {
    /// Opens an image and loads its catalog. Header read, chain read, and
    /// catalog validation must all succeed; any failure here is fatal to
    /// startup rather than a per-operation error.
    ///
    /// # Errors
    /// Propagates image, chain, and schema errors.
    pub fn open(path: &Path) -> Result<Self> {
        let image = Image::open(path)?;
        let (bytes, chain) = read_chain(&image)?;
        let catalog = Catalog::decode(&bytes)?;

        let mut used = catalog.used_blocks();
        used.extend(chain.iter().copied());
        debug!(
            image = %path.display(),
            block_size = image.block_size(),
            block_count = image.block_count(),
            chain_blocks = chain.len(),
            used_blocks = used.len(),
            "opened image"
        );

        Ok(Self {
            image,
            catalog,
            chain,
            used,
            handles: HandleTable::new(),
            snapshot: bytes.clone(),
            staging: bytes,
        })
    }

    /// Formats a fresh image: header plus an empty root-directory catalog
    /// chained from block 0.
    ///
    /// # Errors
    /// Propagates image creation and chain write errors.
    pub fn format(path: &Path, block_size: u64, block_count: u64) -> Result<()> {
        let mut image = Image::create(path, block_size, block_count)?;
        let catalog = Catalog::empty(block_size * block_count, now_timestamp());
        let bytes = catalog.encode();

        let mut chain = Vec::new();
        let mut used = BTreeSet::new();
        write_chain(&mut image, &bytes, &mut chain, &mut used)?;
        image.flush()?;
        debug!(image = %path.display(), block_size, block_count, "formatted image");
        Ok(())
    }

    #[must_use]
    pub const fn block_size(&self) -> u64 {
        self.image.block_size()
    }

    #[must_use]
    pub const fn block_count(&self) -> u64 {
        self.image.block_count()
    }

    /// Blocks currently reserved (FACT chain plus file allocations).
    #[must_use]
    pub fn used_block_count(&self) -> u64 {
        self.used.len() as u64
    }

    // --- path operations ------------------------------------------------

    /// # Errors
    /// `NotFound` when the path does not resolve.
    pub fn get_attributes(&self, path: &str) -> Result<FileAttributes> {
        let node = self.catalog.lookup(path).ok_or(FsError::NotFound)?;
        let attrs = node.attrs();
        Ok(FileAttributes {
            is_dir: node.is_dir(),
            size: match node {
                Node::Directory { .. } => DIRECTORY_SIZE,
                Node::File { size, .. } => *size,
            },
            mode: attrs.mode(node.is_dir()),
            date_created: attrs.date_created,
            date_modified: attrs.date_modified,
            date_accessed: attrs.date_accessed,
        })
    }

    /// Names of a directory's entries in catalog order.
    ///
    /// # Errors
    /// `NotFound` when the path does not resolve, `NotADirectory` when it
    /// names a file.
    pub fn list_directory(&self, path: &str) -> Result<Vec<String>> {
        match self.catalog.lookup(path) {
            None => Err(FsError::NotFound),
            Some(Node::File { .. }) => Err(FsError::NotADirectory),
            Some(Node::Directory { contents, .. }) => {
                Ok(contents.iter().map(|n| n.name().to_string()).collect())
            }
        }
    }

    /// Creates an empty file node.
    ///
    /// # Errors
    /// `AlreadyExists` when the path resolves, `NotFound`/`NotADirectory`
    /// for a bad parent, plus persistence errors.
    pub fn mknod(&mut self, path: &str) -> Result<()> {
        self.create_node(path, false)
    }

    /// Creates an empty directory node.
    ///
    /// # Errors
    /// Same conditions as `mknod`.
    pub fn mkdir(&mut self, path: &str) -> Result<()> {
        self.create_node(path, true)
    }

    fn create_node(&mut self, path: &str, is_dir: bool) -> Result<()> {
        if self.catalog.lookup(path).is_some() {
            return Err(FsError::AlreadyExists);
        }
        let (parent, name) = split_parent(path)?;
        let node = if is_dir {
            Node::new_directory(name, now_timestamp())
        } else {
            Node::new_file(name, now_timestamp())
        };
        self.catalog.dir_contents_mut(&parent)?.push(node);
        self.save()
    }

    /// Removes a file entry. The file's blocks stay in the used set until
    /// the next full catalog decode.
    ///
    /// # Errors
    /// `NotFound`, `IsADirectory`, plus persistence errors.
    pub fn unlink(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        let contents = self.catalog.dir_contents_mut(&parent)?;
        let index = contents
            .iter()
            .position(|n| n.name() == name)
            .ok_or(FsError::NotFound)?;
        if contents[index].is_dir() {
            return Err(FsError::IsADirectory);
        }
        contents.remove(index);
        self.save()
    }

    /// Removes an empty directory entry.
    ///
    /// # Errors
    /// `NotFound`, `NotADirectory`, `NotEmpty`, plus persistence errors.
    pub fn rmdir(&mut self, path: &str) -> Result<()> {
        let (parent, name) = split_parent(path)?;
        let contents = self.catalog.dir_contents_mut(&parent)?;
        let index = contents
            .iter()
            .position(|n| n.name() == name)
            .ok_or(FsError::NotFound)?;
        match &contents[index] {
            Node::File { .. } => return Err(FsError::NotADirectory),
            Node::Directory { contents: sub, .. } => {
                if !sub.is_empty() {
                    return Err(FsError::NotEmpty);
                }
            }
        }
        contents.remove(index);
        self.save()
    }

    /// Renames or moves a node. Metadata-only: data blocks never move.
    ///
    /// # Errors
    /// `NotFound` for a missing source, type-mismatch errors when one side
    /// is a directory and the other is not, `NotEmpty` for a non-empty
    /// destination directory, plus persistence errors.
    pub fn rename(&mut self, src: &str, dst: &str) -> Result<()> {
        let src_comps = components(src);
        let dst_comps = components(dst);

        let src_node = self
            .catalog
            .lookup_components(&src_comps)
            .ok_or(FsError::NotFound)?;
        let src_is_dir = src_node.is_dir();

        if src_comps == dst_comps {
            // Same node; nothing to do.
            return Ok(());
        }
        if dst_comps.is_empty() || dst_comps.starts_with(&src_comps) {
            // Overwriting the root or moving a directory into itself.
            return Err(FsError::InvalidArgument(format!(
                "cannot rename {src} to {dst}"
            )));
        }

        if let Some(dst_node) = self.catalog.lookup_components(&dst_comps) {
            match (src_is_dir, dst_node.is_dir()) {
                (false, true) => return Err(FsError::IsADirectory),
                (true, false) => return Err(FsError::NotADirectory),
                _ => {}
            }
            if let Node::Directory { contents, .. } = dst_node {
                if !contents.is_empty() {
                    return Err(FsError::NotEmpty);
                }
            }
        }

        let (src_parent, _) = split_parent(src)?;
        let (dst_parent, dst_name) = split_parent(dst)?;

        // Both parents must be resolvable directories before anything is
        // detached, so a failure cannot drop the node.
        self.catalog.dir_contents_mut(&dst_parent)?;

        let src_contents = self.catalog.dir_contents_mut(&src_parent)?;
        let src_index = src_contents
            .iter()
            .position(|n| n.name() == *src_comps.last().unwrap_or(&""))
            .ok_or(FsError::NotFound)?;
        let mut node = src_contents.remove(src_index);
        node.set_name(dst_name);
        node.attrs_mut().date_modified = now_timestamp();

        let dst_contents = self.catalog.dir_contents_mut(&dst_parent)?;
        if let Some(existing) = dst_contents.iter().position(|n| n.name() == dst_name) {
            dst_contents[existing] = node;
        } else {
            dst_contents.push(node);
        }
        self.save()
    }

    /// Sets access and modification timestamps.
    ///
    /// # Errors
    /// `NotFound`, plus persistence errors.
    pub fn utimens(&mut self, path: &str, accessed: i64, modified: i64) -> Result<()> {
        let node = self.catalog.lookup_mut(path).ok_or(FsError::NotFound)?;
        let attrs = node.attrs_mut();
        attrs.date_accessed = accessed;
        attrs.date_modified = modified;
        self.save()
    }

    // --- handle operations ----------------------------------------------

    /// Opens a file, creating it first when `flags.create` is set, and
    /// eagerly materializes its contents into the handle's buffer.
    ///
    /// # Errors
    /// `IsADirectory`, `AlreadyExists` (create + exclusive on an existing
    /// file), `NotFound`, `TooManyOpenFiles`, plus I/O errors.
    pub fn open_file(&mut self, path: &str, flags: OpenFlags) -> Result<u64> {
        match self.catalog.lookup(path) {
            Some(node) if node.is_dir() => return Err(FsError::IsADirectory),
            Some(_) if flags.create && flags.exclusive => return Err(FsError::AlreadyExists),
            Some(_) => {}
            None if flags.create => self.mknod(path)?,
            None => return Err(FsError::NotFound),
        }

        let normalized = normalize(path);
        let buffer = self.load_file(&normalized)?;
        if let Some(node) = self.catalog.lookup_mut(&normalized) {
            // Durable at the next catalog save; not worth a chain rewrite on
            // its own.
            node.attrs_mut().date_accessed = now_timestamp();
        }
        self.handles.acquire(FileHandle {
            path: normalized,
            buffer,
            flags,
        })
    }

    /// Copies `[offset, offset + size)` out of the handle's buffer, clipped
    /// to the buffer's length.
    ///
    /// # Errors
    /// `BadHandle`, or `AccessMode` for a write-only handle.
    pub fn read(&self, fh: u64, size: usize, offset: u64) -> Result<Vec<u8>> {
        let handle = self.handles.get(fh)?;
        if !handle.flags.readable() {
            return Err(FsError::AccessMode("reading"));
        }
        let Ok(start) = usize::try_from(offset) else {
            return Ok(Vec::new());
        };
        if start >= handle.buffer.len() {
            return Ok(Vec::new());
        }
        let end = start.saturating_add(size).min(handle.buffer.len());
        Ok(handle.buffer[start..end].to_vec())
    }

    /// Copies `data` into the handle's buffer at `offset`, growing it as
    /// needed, and touches the node's modification time.
    ///
    /// # Errors
    /// `BadHandle`, or `AccessMode` for a read-only handle.
    pub fn write(&mut self, fh: u64, data: &[u8], offset: u64) -> Result<usize> {
        let handle = self.handles.get_mut(fh)?;
        if !handle.flags.writable() {
            return Err(FsError::AccessMode("writing"));
        }
        let start = usize::try_from(offset)
            .map_err(|_| FsError::InvalidArgument(format!("offset {offset} too large")))?;
        let end = start.saturating_add(data.len());
        if handle.buffer.len() < end {
            handle.buffer.resize(end, 0);
        }
        handle.buffer[start..end].copy_from_slice(data);

        let path = handle.path.clone();
        if let Some(node) = self.catalog.lookup_mut(&path) {
            node.attrs_mut().date_modified = now_timestamp();
        }
        Ok(data.len())
    }

    /// Writes the handle's buffer back to the file's blocks, allocating
    /// single-block extents for any growth, and persists the catalog.
    ///
    /// # Errors
    /// `BadHandle`, `AccessMode` for a read-only handle, `OutOfSpace`, plus
    /// persistence errors. An out-of-space failure leaves the file's prior
    /// on-disk contents unchanged.
    pub fn flush_handle(&mut self, fh: u64) -> Result<()> {
        let handle = self.handles.get(fh)?;
        if !handle.flags.writable() {
            return Err(FsError::AccessMode("writing"));
        }
        let path = handle.path.clone();
        let buffer = handle.buffer.clone();
        self.store_file(&path, &buffer, false)
    }

    /// Resizes a file through an open handle and writes it back.
    ///
    /// # Errors
    /// `BadHandle`, `AccessMode` for a read-only handle, plus the
    /// write-back errors of `flush`.
    pub fn ftruncate(&mut self, fh: u64, length: u64) -> Result<()> {
        let handle = self.handles.get_mut(fh)?;
        if !handle.flags.writable() {
            return Err(FsError::AccessMode("writing"));
        }
        let len = usize::try_from(length)
            .map_err(|_| FsError::InvalidArgument(format!("length {length} too large")))?;
        handle.buffer.resize(len, 0);
        let path = handle.path.clone();
        let buffer = handle.buffer.clone();
        self.store_file(&path, &buffer, true)
    }

    /// Resizes a file by path, writes it back, and patches the buffers of
    /// any open handles on the same file so concurrently open sessions stay
    /// consistent.
    ///
    /// # Errors
    /// `NotFound`, `IsADirectory`, plus the write-back errors of `flush`.
    pub fn truncate(&mut self, path: &str, length: u64) -> Result<()> {
        let normalized = normalize(path);
        match self.catalog.lookup(&normalized) {
            None => return Err(FsError::NotFound),
            Some(Node::Directory { .. }) => return Err(FsError::IsADirectory),
            Some(Node::File { .. }) => {}
        }
        let len = usize::try_from(length)
            .map_err(|_| FsError::InvalidArgument(format!("length {length} too large")))?;

        // Reuse a live buffer when one exists; otherwise read from disk.
        let live = self
            .handles
            .iter_mut()
            .find(|handle| handle.path == normalized)
            .map(|handle| handle.buffer.clone());
        let mut buffer = match live {
            Some(buffer) => buffer,
            None => self.load_file(&normalized)?,
        };
        buffer.resize(len, 0);
        self.store_file(&normalized, &buffer, true)?;

        for handle in self.handles.iter_mut() {
            if handle.path == normalized {
                handle.buffer.resize(len, 0);
            }
        }
        Ok(())
    }

    /// Discards the handle's buffer and frees its slot.
    ///
    /// # Errors
    /// `BadHandle`.
    pub fn release(&mut self, fh: u64) -> Result<()> {
        self.handles.release(fh)
    }

    // --- FACT pseudo-file ------------------------------------------------

    /// Size of the catalog bytes as they exist on disk.
    #[must_use]
    pub fn fact_file_size(&self) -> u64 {
        self.snapshot.len() as u64
    }

    /// Reads from the on-disk catalog bytes (not the staged edits).
    #[must_use]
    pub fn fact_file_read(&self, size: usize, offset: u64) -> Vec<u8> {
        let Ok(start) = usize::try_from(offset) else {
            return Vec::new();
        };
        if start >= self.snapshot.len() {
            return Vec::new();
        }
        let end = start.saturating_add(size).min(self.snapshot.len());
        self.snapshot[start..end].to_vec()
    }

    /// Stages an edit to the raw catalog bytes. Nothing is validated or
    /// persisted until `fact_file_flush`.
    pub fn fact_file_write(&mut self, data: &[u8], offset: u64) -> Result<usize> {
        let start = usize::try_from(offset)
            .map_err(|_| FsError::InvalidArgument(format!("offset {offset} too large")))?;
        let end = start.saturating_add(data.len());
        if self.staging.len() < end {
            self.staging.resize(end, 0);
        }
        self.staging[start..end].copy_from_slice(data);
        Ok(data.len())
    }

    /// Resizes the staged catalog bytes.
    pub fn fact_file_truncate(&mut self, length: u64) -> Result<()> {
        let len = usize::try_from(length)
            .map_err(|_| FsError::InvalidArgument(format!("length {length} too large")))?;
        self.staging.resize(len, 0);
        Ok(())
    }

    /// Commits staged catalog edits: parse, validate, rewrite the chain,
    /// then atomically swap the live tree to the newly parsed one. On any
    /// failure the staging buffer is reset to the last known-good bytes and
    /// nothing on disk changes.
    ///
    /// # Errors
    /// `Schema` for invalid staged bytes, plus chain write errors.
    pub fn fact_file_flush(&mut self) -> Result<()> {
        let staged = self.staging.clone();
        let parsed = match Catalog::decode(&staged) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(%err, "staged catalog rejected; rolling back");
                self.staging = self.snapshot.clone();
                return Err(err);
            }
        };

        // Full revalidation rebuilds the used set from scratch; blocks of
        // files unlinked since the last decode are reclaimed here.
        let mut used = parsed.used_blocks();
        used.extend(self.chain.iter().copied());
        let mut chain = self.chain.clone();

        match write_chain(&mut self.image, &staged, &mut chain, &mut used)
            .and_then(|()| self.image.flush())
        {
            Ok(()) => {
                self.catalog = parsed;
                self.chain = chain;
                self.used = used;
                self.snapshot = staged;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "staged catalog write failed; rolling back");
                self.staging = self.snapshot.clone();
                Err(err)
            }
        }
    }

    // --- internals --------------------------------------------------------

    /// Serializes the live tree and rewrites the FACT chain. On failure the
    /// tree is restored from the last known-good bytes, so callers never
    /// observe a half-applied mutation.
    fn save(&mut self) -> Result<()> {
        let bytes = self.catalog.encode();
        let mut chain = self.chain.clone();
        let mut used = self.used.clone();

        match write_chain(&mut self.image, &bytes, &mut chain, &mut used)
            .and_then(|()| self.image.flush())
        {
            Ok(()) => {
                self.chain = chain;
                self.used = used;
                self.snapshot = bytes.clone();
                self.staging = bytes;
                Ok(())
            }
            Err(err) => {
                warn!(%err, "catalog save failed; restoring last known-good tree");
                self.catalog = Catalog::decode(&self.snapshot)?;
                Err(err)
            }
        }
    }

    /// Materializes a file's contents by walking its allocation extents,
    /// stopping once `file_size` bytes have been collected.
    fn load_file(&self, path: &str) -> Result<Vec<u8>> {
        let node = self.catalog.lookup(path).ok_or(FsError::NotFound)?;
        let Node::File { size, allocation, .. } = node else {
            return Err(FsError::IsADirectory);
        };
        let file_size = usize::try_from(*size)
            .map_err(|_| FsError::Schema(format!("file_size of {path} is not addressable")))?;
        let block_size = self.image.block_size() as usize;

        let mut buffer = Vec::with_capacity(file_size);
        let mut block = vec![0u8; block_size];
        'extents: for extent in allocation {
            for index in extent.blocks() {
                if buffer.len() >= file_size {
                    break 'extents;
                }
                self.image.read_block(index, &mut block)?;
                let take = block_size.min(file_size - buffer.len());
                buffer.extend_from_slice(&block[..take]);
            }
        }
        Ok(buffer)
    }

    /// Shared write-back path for flush and truncate: grows the allocation
    /// one block at a time, persists the catalog when it changed, writes the
    /// buffer out block-by-block with a zero-padded tail, updates
    /// `file_size`, and persists again.
    fn store_file(&mut self, path: &str, buffer: &[u8], trim_excess: bool) -> Result<()> {
        let block_size = self.image.block_size();
        let block_count = self.image.block_count();
        let blocks_needed = (buffer.len() as u64).div_ceil(block_size);

        let allocated: u64 = match self.catalog.lookup(path) {
            Some(Node::File { allocation, .. }) => allocation.iter().map(|e| e.length).sum(),
            Some(Node::Directory { .. }) => return Err(FsError::IsADirectory),
            None => return Err(FsError::NotFound),
        };

        // Reserve the whole shortfall in a scratch set first, so an
        // out-of-space failure leaves the live set untouched.
        let mut scratch = self.used.clone();
        let mut new_blocks = Vec::new();
        for _ in allocated..blocks_needed {
            new_blocks.push(allocate_next(&mut scratch, block_count)?);
        }

        if !new_blocks.is_empty() {
            let Some(Node::File { allocation, .. }) = self.catalog.lookup_mut(path) else {
                return Err(FsError::NotFound);
            };
            allocation.extend(new_blocks.iter().map(|&from| Extent { from, length: 1 }));
            // The chain rewrite inside `save` must see the reserved data
            // blocks, so swap the scratch set in and restore it on failure.
            let reserved = std::mem::replace(&mut self.used, scratch);
            if let Err(err) = self.save() {
                self.used = reserved;
                return Err(err);
            }
        }

        let extents = match self.catalog.lookup(path) {
            Some(Node::File { allocation, .. }) => allocation.clone(),
            _ => return Err(FsError::NotFound),
        };
        self.write_extents(&extents, buffer)?;

        let Some(Node::File {
            size,
            allocation,
            attrs,
            ..
        }) = self.catalog.lookup_mut(path)
        else {
            return Err(FsError::NotFound);
        };
        *size = buffer.len() as u64;
        attrs.date_modified = now_timestamp();
        if trim_excess {
            trim_allocation(allocation, blocks_needed);
        }
        self.save()
    }

    fn write_extents(&mut self, extents: &[Extent], buffer: &[u8]) -> Result<()> {
        let block_size = self.image.block_size() as usize;
        let mut block = vec![0u8; block_size];
        let mut written = 0usize;
        'extents: for extent in extents {
            for index in extent.blocks() {
                if written >= buffer.len() {
                    break 'extents;
                }
                let take = block_size.min(buffer.len() - written);
                block.fill(0);
                block[..take].copy_from_slice(&buffer[written..written + take]);
                self.image.write_block(index, &block)?;
                written += take;
            }
        }
        Ok(())
    }
}

/// Drops whole trailing extents no longer covered by `blocks_needed`. A
/// partially needed final extent keeps its stored length; allocation is
/// never split.
fn trim_allocation(allocation: &mut Vec<Extent>, blocks_needed: u64) {
    let mut covered = 0u64;
    let mut keep = 0usize;
    for extent in allocation.iter() {
        if covered >= blocks_needed {
            break;
        }
        covered += extent.length;
        keep += 1;
    }
    allocation.truncate(keep);
}

/// Canonical form of an absolute path: single slashes, no trailing slash.
fn normalize(path: &str) -> String {
    format!("/{}", components(path).join("/"))
}

fn now_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
