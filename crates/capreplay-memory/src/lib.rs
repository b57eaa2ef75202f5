//! Captured address spaces and typed decoding.
//!
//! A capture records the bytes a command stream touched, not whole address spaces. [`Pool`]
//! stores those bytes as a sorted log of non-overlapping writes, where each write points at a
//! shared [`Data`] view instead of owning a copy. Reads that fall outside every recorded write
//! observe zeros.
//!
//! [`Decoder`] walks a [`Data`] view as a stream of typed values using a [`MemoryLayout`]
//! (sizes, alignment, byte order). [`Encoder`] is its inverse and is used to synthesize memory
//! for injected commands.

#![forbid(unsafe_code)]

mod data;
mod decoder;
mod encoder;
mod error;
mod layout;
mod pool;
mod range;

pub use data::{Bytes, ContentId, Data, DataRef, Lazy, Run, Zeros, MAX_CONTENT_ID_BYTES};
pub use decoder::{Decode, Decoder};
pub use encoder::Encoder;
pub use error::{DecodeError, MemoryError};
pub use layout::{DataTypeLayout, Endianness, MemoryLayout};
pub use pool::{Pool, PoolId, PoolSlice, Pools, Write};
pub use range::Range;
