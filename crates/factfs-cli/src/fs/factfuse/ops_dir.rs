use std::ffi::OsStr;

use fuser::{FileAttr, FileType, ReplyDirectory, ReplyEntry, Request};

use crate::fs::constants::{FACT_FILE_NAME, FACT_INO, ROOT_INO, TTL};

use super::core::{child_path, errno};
use super::types::FactFuse;

impl FactFuse {
    pub(crate) fn op_lookup(
        &mut self,
        _req: &Request<'_>,
        parent: u64,
        name: &OsStr,
        reply: ReplyEntry,
    ) {
        match self.lookup_entry(parent, name) {
            Ok(attr) => reply.entry(&TTL, &attr, 0),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        match self.dir_entries(ino) {
            Ok(entries) => {
                let offset = usize::try_from(offset).unwrap_or(0);
                for (i, (inode, kind, name)) in entries.into_iter().enumerate().skip(offset) {
                    let next_offset = i64::try_from(i + 1).unwrap_or(i64::MAX);
                    if reply.add(inode, next_offset, kind, name.as_str()) {
                        break;
                    }
                }
                reply.ok();
            }
            Err(code) => reply.error(code),
        }
    }

    fn lookup_entry(&mut self, parent: u64, name: &OsStr) -> Result<FileAttr, i32> {
        if parent == ROOT_INO && name == OsStr::new(FACT_FILE_NAME) {
            return Ok(self.fact_attr());
        }
        let parent_path = self.path_for(parent)?;
        let path = child_path(&parent_path, name)?;
        let attrs = self.engine.get_attributes(&path).map_err(|e| errno(&e))?;
        let ino = self.inodes.get_or_assign(&path);
        Ok(self.node_attr(ino, &attrs))
    }

    fn dir_entries(&mut self, ino: u64) -> Result<Vec<(u64, FileType, String)>, i32> {
        let path = self.path_for(ino)?;
        let names = self.engine.list_directory(&path).map_err(|e| errno(&e))?;

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (ino, FileType::Directory, "..".to_string()),
        ];
        if ino == ROOT_INO {
            entries.push((FACT_INO, FileType::RegularFile, FACT_FILE_NAME.to_string()));
        }
        for name in names {
            let child = if path == "/" {
                format!("/{name}")
            } else {
                format!("{path}/{name}")
            };
            let is_dir = self
                .engine
                .get_attributes(&child)
                .map(|attrs| attrs.is_dir)
                .unwrap_or(false);
            let kind = if is_dir {
                FileType::Directory
            } else {
                FileType::RegularFile
            };
            entries.push((self.inodes.get_or_assign(&child), kind, name));
        }
        Ok(entries)
    }
}
