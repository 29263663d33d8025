#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("no such file: {0}")]
    NotFound(String),
    #[error("{len} bytes at offset {offset} do not fit inside a file of {size} bytes")]
    OutOfRange { offset: u64, len: usize, size: u64 },
    #[error("no free block left in the allocation table")]
    OutOfSpace,
    #[error("file would exceed the maximum size: {0}")]
    FileTooLarge(String),
    #[error("invalid file name: {0:?}")]
    InvalidFileName(String),
    #[error("invalid container capacity: {0} bytes")]
    InvalidCapacity(u64),
    #[error("corrupt container: {0}")]
    CorruptFormat(String),
    #[error("device i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, FsError>;
