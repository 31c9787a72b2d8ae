use fuser::{ReplyData, ReplyOpen, ReplyWrite, Request};

use crate::fs::constants::{FACT_FH, FACT_INO, OPEN_DIRECT_IO};

use super::core::{byte_offset, errno, open_flags};
use super::types::FactFuse;

impl FactFuse {
    pub(crate) fn op_open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        // The catalog pseudo-file bypasses the handle table and the kernel
        // page cache; its size changes under the kernel's feet on commit.
        if ino == FACT_INO {
            reply.opened(FACT_FH, OPEN_DIRECT_IO);
            return;
        }
        match self.open_node(ino, flags) {
            Ok(fh) => reply.opened(fh, 0),
            Err(code) => reply.error(code),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn op_read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let offset = match byte_offset(offset) {
            Ok(offset) => offset,
            Err(code) => {
                reply.error(code);
                return;
            }
        };
        let size = size as usize;
        if fh == FACT_FH {
            reply.data(&self.engine.fact_file_read(size, offset));
            return;
        }
        match self.engine.read(fh, size, offset) {
            Ok(data) => reply.data(&data),
            Err(err) => reply.error(errno(&err)),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn op_write(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let offset = match byte_offset(offset) {
            Ok(offset) => offset,
            Err(code) => {
                reply.error(code);
                return;
            }
        };
        let result = if fh == FACT_FH {
            self.engine.fact_file_write(data, offset)
        } else {
            self.engine.write(fh, data, offset)
        };
        match result {
            Ok(written) => reply.written(u32::try_from(written).unwrap_or(u32::MAX)),
            Err(err) => reply.error(errno(&err)),
        }
    }

    fn open_node(&mut self, ino: u64, flags: i32) -> Result<u64, i32> {
        let path = self.path_for(ino)?;
        let open = open_flags(flags)?;
        self.engine.open_file(&path, open).map_err(|e| errno(&e))
    }
}
