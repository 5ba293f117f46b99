use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Offset {0:#x} out of bounds (file size: {1:#x})")]
    OffsetOutOfBounds(usize, usize),

    #[error("Invalid LEB128 encoding at offset {0:#x}")]
    InvalidLeb128(usize),

    #[error("Try block at offset {0:#x} lies outside the code")]
    InvalidTryBlock(usize),

    #[error("I/O error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, Error>;
