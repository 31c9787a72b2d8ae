//! Error taxonomy for the storage engine.
//!
//! Path-resolution and capacity failures are recoverable and typed; schema
//! failures roll the catalog back to its last known-good bytes; I/O failures
//! abort the in-progress operation but not the engine.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("is a directory")]
    IsADirectory,

    #[error("not a directory")]
    NotADirectory,

    #[error("file exists")]
    AlreadyExists,

    #[error("directory not empty")]
    NotEmpty,

    #[error("bad file handle")]
    BadHandle,

    #[error("too many open files")]
    TooManyOpenFiles,

    #[error("no free blocks left in image")]
    OutOfSpace,

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("block index {index} out of range (image has {count} blocks)")]
    OutOfRange { index: u64, count: u64 },

    #[error("catalog schema violation: {0}")]
    Schema(String),

    #[error("handle not opened for {0}")]
    AccessMode(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_message_names_index_and_count() {
        let err = FsError::OutOfRange {
            index: 9,
            count: 4,
        };
        let msg = err.to_string();
        assert!(msg.contains('9') && msg.contains('4'));
    }

    #[test]
    fn io_errors_convert() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = FsError::from(io);
        assert!(matches!(err, FsError::Io(_)));
    }
}
