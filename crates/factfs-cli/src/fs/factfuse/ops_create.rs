use std::ffi::OsStr;

use fuser::{FileAttr, ReplyCreate, ReplyEmpty, ReplyEntry, Request};

use crate::fs::constants::{FACT_FILE_NAME, ROOT_INO, TTL};

use super::core::{child_path, errno, open_flags};
use super::types::FactFuse;

impl FactFuse {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn op_create(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        flags: i32,
        reply: ReplyCreate,
    ) {
        match self.create_entry(parent, name, flags) {
            Ok((attr, fh)) => reply.created(&TTL, &attr, 0, fh, 0),
            Err(code) => reply.error(code),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn op_mknod(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        _rdev: u32,
        reply: ReplyEntry,
    ) {
        match self.make_node(parent, name, false) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_mkdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        _mode: u32,
        _umask: u32,
        reply: ReplyEntry,
    ) {
        match self.make_node(parent, name, true) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_unlink(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: ReplyEmpty,
    ) {
        match self.remove_node(parent, name, false) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_rmdir(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: ReplyEmpty,
    ) {
        match self.remove_node(parent, name, true) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn op_rename(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
        _flags: u32,
        reply: ReplyEmpty,
    ) {
        match self.rename_node(parent, name, newparent, newname) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    fn child_of(&self, parent: u64, name: &OsStr) -> Result<String, i32> {
        let parent_path = self.path_for(parent)?;
        child_path(&parent_path, name)
    }

    /// The catalog pseudo-file shadows its name in the root directory; no
    /// catalog node may take or leave it.
    fn is_fact_name(parent: u64, name: &OsStr) -> bool {
        parent == ROOT_INO && name == OsStr::new(FACT_FILE_NAME)
    }

    fn make_node(&mut self, parent: u64, name: &OsStr, is_dir: bool) -> Result<FileAttr, i32> {
        if Self::is_fact_name(parent, name) {
            return Err(libc::EEXIST);
        }
        let path = self.child_of(parent, name)?;
        let result = if is_dir {
            self.engine.mkdir(&path)
        } else {
            self.engine.mknod(&path)
        };
        result.map_err(|e| errno(&e))?;

        let attrs = self.engine.get_attributes(&path).map_err(|e| errno(&e))?;
        let ino = self.inodes.get_or_assign(&path);
        Ok(self.node_attr(ino, &attrs))
    }

    fn create_entry(
        &mut self,
        parent: u64,
        name: &OsStr,
        flags: i32,
    ) -> Result<(FileAttr, u64), i32> {
        if Self::is_fact_name(parent, name) {
            return Err(libc::EEXIST);
        }
        let path = self.child_of(parent, name)?;
        let mut open = open_flags(flags)?;
        open.create = true;
        let fh = self
            .engine
            .open_file(&path, open)
            .map_err(|e| errno(&e))?;

        let attrs = self.engine.get_attributes(&path).map_err(|e| errno(&e))?;
        let ino = self.inodes.get_or_assign(&path);
        Ok((self.node_attr(ino, &attrs), fh))
    }

    fn remove_node(&mut self, parent: u64, name: &OsStr, is_dir: bool) -> Result<(), i32> {
        if Self::is_fact_name(parent, name) {
            return Err(libc::EPERM);
        }
        let path = self.child_of(parent, name)?;
        let result = if is_dir {
            self.engine.rmdir(&path)
        } else {
            self.engine.unlink(&path)
        };
        result.map_err(|e| errno(&e))
    }

    fn rename_node(
        &mut self,
        parent: u64,
        name: &OsStr,
        newparent: u64,
        newname: &OsStr,
    ) -> Result<(), i32> {
        if Self::is_fact_name(parent, name) || Self::is_fact_name(newparent, newname) {
            return Err(libc::EPERM);
        }
        let src = self.child_of(parent, name)?;
        let dst = self.child_of(newparent, newname)?;
        self.engine.rename(&src, &dst).map_err(|e| errno(&e))?;
        self.inodes.rename_prefix(&src, &dst);
        Ok(())
    }
}
