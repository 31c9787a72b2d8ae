use fuser::{ReplyEmpty, Request};

use factfs_rs::FsError;

use crate::fs::constants::FACT_FH;

use super::core::errno;
use super::types::FactFuse;

impl FactFuse {
    pub(crate) fn op_flush(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _lock_owner: u64,
        reply: ReplyEmpty,
    ) {
        match self.flush_fh(fh) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_fsync(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _datasync: bool,
        reply: ReplyEmpty,
    ) {
        match self.flush_fh(fh) {
            Ok(()) => reply.ok(),
            Err(code) => reply.error(code),
        }
    }

    pub(crate) fn op_release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if fh == FACT_FH {
            reply.ok();
            return;
        }
        match self.engine.release(fh) {
            Ok(()) => reply.ok(),
            Err(err) => reply.error(errno(&err)),
        }
    }

    /// A flush on the catalog pseudo-file is the commit point for staged
    /// edits; a rejected catalog must surface as an error so the writing
    /// tool sees its edit bounce. Closing a read-only handle is not an
    /// error.
    fn flush_fh(&mut self, fh: u64) -> Result<(), i32> {
        if fh == FACT_FH {
            return self.engine.fact_file_flush().map_err(|e| errno(&e));
        }
        match self.engine.flush_handle(fh) {
            Ok(()) | Err(FsError::AccessMode(_)) => Ok(()),
            Err(err) => Err(errno(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use factfs_rs::OpenFlags;

    use crate::fs::test_utils::create_fs;

    #[test]
    fn flush_ignores_read_only_handles() {
        let (_dir, mut fs) = create_fs();
        fs.engine.mknod("/f").expect("mknod");
        let fh = fs.engine.open_file("/f", OpenFlags::read()).expect("open");
        assert_eq!(fs.flush_fh(fh), Ok(()));
        assert_eq!(fs.flush_fh(999), Err(libc::EBADF));
    }

    #[test]
    fn fact_flush_commits_staged_catalog() {
        let (_dir, mut fs) = create_fs();
        let fs_size = fs.engine.block_size() * fs.engine.block_count();
        let doc = format!(
            r#"{{ "filesystem_info": {{ "size": {fs_size} }},
                 "contents": [ {{ "name": "adopted", "is_dir": true }} ] }}"#
        );
        fs.engine.fact_file_truncate(0).expect("truncate");
        fs.engine.fact_file_write(doc.as_bytes(), 0).expect("stage");

        assert_eq!(fs.flush_fh(FACT_FH), Ok(()));
        assert!(fs.engine.get_attributes("/adopted").expect("attrs").is_dir);
    }

    #[test]
    fn fact_flush_surfaces_rejected_edits() {
        let (_dir, mut fs) = create_fs();
        fs.engine.fact_file_truncate(0).expect("truncate");
        fs.engine
            .fact_file_write(b"garbage", 0)
            .expect("stage garbage");
        assert_eq!(fs.flush_fh(FACT_FH), Err(libc::EINVAL));
    }
}
