use thiserror::Error;

use crate::{PoolId, Range};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MemoryError {
    #[error("range {range} is out of bounds for data of size 0x{size:x}")]
    OutOfBounds { range: Range, size: u64 },
    #[error("range base 0x{base:x} + size 0x{size:x} overflows the address space")]
    AddressOverflow { base: u64, size: u64 },
    #[error("unknown memory pool {0}")]
    UnknownPool(PoolId),
    #[error("data of size 0x{size:x} is too large to compute a content id")]
    ContentTooLarge { size: u64 },
    #[error("lazy data of size 0x{expected:x} resolved to 0x{actual:x} bytes")]
    LazySizeMismatch { expected: u64, actual: u64 },
    #[error("failed to load data: {0}")]
    Load(String),
}

/// Errors recorded in a [`Decoder`](crate::Decoder)'s sticky error slot.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("end of data at offset 0x{offset:x}: need {needed} bytes, data size is 0x{size:x}")]
    EndOfData { offset: u64, needed: u64, size: u64 },
    #[error("unsupported {kind} width of {size} bytes")]
    InvalidWidth { kind: &'static str, size: u32 },
    #[error("invalid memory layout: {0}")]
    InvalidLayout(String),
    #[error(transparent)]
    Memory(#[from] MemoryError),
}
