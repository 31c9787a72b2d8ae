use std::ffi::OsStr;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use factfs_rs::{AccessMode, FileAttributes, FsError, OpenFlags};
use fuser::{FileAttr, FileType, TimeOrNow};

use crate::fs::constants::FACT_INO;

use super::types::FactFuse;

/// Maps an engine error onto the errno the kernel expects.
pub(crate) fn errno(err: &FsError) -> i32 {
    match err {
        FsError::NotFound => libc::ENOENT,
        FsError::IsADirectory => libc::EISDIR,
        FsError::NotADirectory => libc::ENOTDIR,
        FsError::AlreadyExists => libc::EEXIST,
        FsError::NotEmpty => libc::ENOTEMPTY,
        FsError::BadHandle | FsError::AccessMode(_) => libc::EBADF,
        FsError::TooManyOpenFiles => libc::EMFILE,
        FsError::OutOfSpace => libc::ENOSPC,
        FsError::InvalidArgument(_) | FsError::Schema(_) => libc::EINVAL,
        FsError::OutOfRange { .. } => libc::EIO,
        FsError::Io(io) => io.raw_os_error().unwrap_or(libc::EIO),
    }
}

/// Translates the POSIX open flags into the engine's typed subset.
pub(crate) fn open_flags(flags: i32) -> Result<OpenFlags, i32> {
    let mode = match flags & libc::O_ACCMODE {
        libc::O_RDONLY => AccessMode::ReadOnly,
        libc::O_WRONLY => AccessMode::WriteOnly,
        libc::O_RDWR => AccessMode::ReadWrite,
        _ => return Err(libc::EINVAL),
    };
    Ok(OpenFlags {
        mode,
        create: flags & libc::O_CREAT != 0,
        exclusive: flags & libc::O_EXCL != 0,
    })
}

/// Rejects negative file offsets instead of clamping them; the kernel
/// never sends one for a well-behaved mount, so treat it as a bad request.
pub(crate) fn byte_offset(offset: i64) -> Result<u64, i32> {
    u64::try_from(offset).map_err(|_| libc::EINVAL)
}

pub(crate) fn is_valid_name(name: &OsStr) -> bool {
    if name.is_empty() || name == OsStr::new(".") || name == OsStr::new("..") {
        return false;
    }
    !name.to_string_lossy().contains('/')
}

/// Joins a directory path and a child name into the engine's path form.
pub(crate) fn child_path(parent: &str, name: &OsStr) -> Result<String, i32> {
    if !is_valid_name(name) {
        return Err(libc::EINVAL);
    }
    let name = name.to_string_lossy();
    if parent == "/" {
        Ok(format!("/{name}"))
    } else {
        Ok(format!("{parent}/{name}"))
    }
}

pub(crate) fn system_time(secs: i64) -> SystemTime {
    if secs >= 0 {
        UNIX_EPOCH + Duration::from_secs(secs.unsigned_abs())
    } else {
        UNIX_EPOCH - Duration::from_secs(secs.unsigned_abs())
    }
}

pub(crate) fn time_to_secs(time: TimeOrNow) -> i64 {
    let time = match time {
        TimeOrNow::SpecificTime(t) => t,
        TimeOrNow::Now => SystemTime::now(),
    };
    match time.duration_since(UNIX_EPOCH) {
        Ok(since) => i64::try_from(since.as_secs()).unwrap_or(i64::MAX),
        Err(before) => -i64::try_from(before.duration().as_secs()).unwrap_or(i64::MAX),
    }
}

impl FactFuse {
    pub(crate) fn node_attr(&self, ino: u64, attrs: &FileAttributes) -> FileAttr {
        let kind = if attrs.is_dir {
            FileType::Directory
        } else {
            FileType::RegularFile
        };
        let block_size = self.engine.block_size();
        FileAttr {
            ino,
            size: attrs.size,
            blocks: attrs.size.div_ceil(block_size),
            atime: system_time(attrs.date_accessed),
            mtime: system_time(attrs.date_modified),
            ctime: system_time(attrs.date_modified),
            crtime: system_time(attrs.date_created),
            kind,
            perm: (attrs.mode & 0o7777) as u16,
            nlink: if attrs.is_dir { 2 } else { 1 },
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: u32::try_from(block_size).unwrap_or(u32::MAX),
            flags: 0,
        }
    }

    /// Attributes of the synthetic catalog file: size tracks the on-disk
    /// catalog bytes, everything else is fixed.
    pub(crate) fn fact_attr(&self) -> FileAttr {
        FileAttr {
            ino: FACT_INO,
            size: self.engine.fact_file_size(),
            blocks: self
                .engine
                .fact_file_size()
                .div_ceil(self.engine.block_size()),
            atime: UNIX_EPOCH,
            mtime: UNIX_EPOCH,
            ctime: UNIX_EPOCH,
            crtime: UNIX_EPOCH,
            kind: FileType::RegularFile,
            perm: 0o644,
            nlink: 1,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
            rdev: 0,
            blksize: u32::try_from(self.engine.block_size()).unwrap_or(u32::MAX),
            flags: 0,
        }
    }

    pub(crate) fn path_for(&self, ino: u64) -> Result<String, i32> {
        self.inodes
            .path(ino)
            .map(String::from)
            .ok_or(libc::ENOENT)
    }
}
