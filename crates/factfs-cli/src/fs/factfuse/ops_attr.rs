use std::time::SystemTime;

use fuser::{FileAttr, ReplyAttr, ReplyEmpty, ReplyStatfs, ReplyXattr, Request, TimeOrNow};

use crate::fs::constants::{FACT_INO, STATFS_NAME_LEN, TTL};

use super::core::{errno, time_to_secs};
use super::types::FactFuse;

impl FactFuse {
    pub(crate) fn op_getattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: Option<u64>,
        reply: ReplyAttr,
    ) {
        match self.attr_for(ino) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_access(&mut self, _req: &Request<'_>, ino: u64, _mask: i32, reply: ReplyEmpty) {
        match self.attr_for(ino) {
            Ok(_) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_getxattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _name: &std::ffi::OsStr,
        size: u32,
        reply: ReplyXattr,
    ) {
        if self.attr_for(ino).is_err() {
            reply.error(libc::ENOENT);
            return;
        }
        if size == 0 {
            reply.size(0);
        } else {
            reply.data(&[]);
        }
    }

    #[allow(clippy::too_many_arguments, clippy::similar_names)]
    pub(crate) fn op_setattr(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _mode: Option<u32>,
        _uid: Option<u32>,
        _gid: Option<u32>,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        _ctime: Option<SystemTime>,
        fh: Option<u64>,
        _crtime: Option<SystemTime>,
        _chgtime: Option<SystemTime>,
        _bkuptime: Option<SystemTime>,
        _flags: Option<u32>,
        reply: ReplyAttr,
    ) {
        match self.apply_setattr(ino, size, atime, mtime, fh) {
            Ok(attr) => reply.attr(&TTL, &attr),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: ReplyStatfs) {
        let blocks = self.engine.block_count();
        let bfree = blocks.saturating_sub(self.engine.used_block_count());
        let block_size = u32::try_from(self.engine.block_size()).unwrap_or(u32::MAX);
        reply.statfs(
            blocks,
            bfree,
            bfree,
            0,
            0,
            block_size,
            STATFS_NAME_LEN,
            block_size,
        );
    }

    fn attr_for(&mut self, ino: u64) -> Result<FileAttr, i32> {
        if ino == FACT_INO {
            return Ok(self.fact_attr());
        }
        let path = self.path_for(ino)?;
        let attrs = self.engine.get_attributes(&path).map_err(|e| errno(&e))?;
        Ok(self.node_attr(ino, &attrs))
    }

    fn apply_setattr(
        &mut self,
        ino: u64,
        size: Option<u64>,
        atime: Option<TimeOrNow>,
        mtime: Option<TimeOrNow>,
        fh: Option<u64>,
    ) -> Result<FileAttr, i32> {
        if ino == FACT_INO {
            if let Some(new_size) = size {
                self.engine
                    .fact_file_truncate(new_size)
                    .map_err(|e| errno(&e))?;
            }
            return Ok(self.fact_attr());
        }

        let path = self.path_for(ino)?;
        if let Some(new_size) = size {
            match fh {
                Some(fh) => self.engine.ftruncate(fh, new_size),
                None => self.engine.truncate(&path, new_size),
            }
            .map_err(|e| errno(&e))?;
        }

        if atime.is_some() || mtime.is_some() {
            let current = self.engine.get_attributes(&path).map_err(|e| errno(&e))?;
            let accessed = atime.map_or(current.date_accessed, time_to_secs);
            let modified = mtime.map_or(current.date_modified, time_to_secs);
            self.engine
                .utimens(&path, accessed, modified)
                .map_err(|e| errno(&e))?;
        }

        self.attr_for(ino)
    }
}
