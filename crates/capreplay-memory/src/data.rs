use core::fmt;
use std::sync::{Arc, OnceLock};

use sha2::{Digest, Sha256};

use crate::{MemoryError, Range};

/// Views larger than this report [`MemoryError::ContentTooLarge`] from
/// [`Data::content_id`] instead of hashing.
pub const MAX_CONTENT_ID_BYTES: u64 = 1 << 30;

const CHUNK: usize = 4096;

/// Shared handle to a [`Data`] view. Views are immutable, so sharing never needs copies.
pub type DataRef = Arc<dyn Data>;

/// An immutable, possibly lazily-resolved byte view.
///
/// Every implementation must reject accesses that reach past [`Data::size`]; a view never reads
/// outside the bytes it describes.
pub trait Data: fmt::Debug + Send + Sync {
    fn size(&self) -> u64;

    /// Returns the sub-view covering `range` (relative to the start of this view).
    fn slice(&self, range: Range) -> Result<DataRef, MemoryError>;

    /// Copies `dst.len()` bytes starting at `offset` into `dst`.
    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<(), MemoryError>;

    /// Enumerates the contiguous runs covering `[offset, size)`, in address order.
    ///
    /// The first run starts exactly at `offset` and consecutive runs are adjacent. An `offset`
    /// at or past the end yields nothing.
    fn runs(&self, offset: u64) -> Box<dyn Iterator<Item = Run<'_>> + '_>;

    /// Offset of the first zero byte, or `None` if the view contains no zero byte.
    fn strlen(&self) -> Result<Option<u64>, MemoryError> {
        let mut buf = [0u8; CHUNK];
        for run in self.runs(0) {
            match run {
                Run::Zeros { offset, .. } => return Ok(Some(offset)),
                Run::Bytes {
                    offset,
                    len,
                    src,
                    src_offset,
                } => {
                    let mut done = 0u64;
                    while done < len {
                        let n = (len - done).min(CHUNK as u64) as usize;
                        src.get(src_offset + done, &mut buf[..n])?;
                        if let Some(pos) = buf[..n].iter().position(|b| *b == 0) {
                            return Ok(Some(offset + done + pos as u64));
                        }
                        done += n as u64;
                    }
                }
            }
        }
        Ok(None)
    }

    /// SHA-256 of the bytes the view exposes. Equal bytes give equal ids regardless of how the
    /// view is represented.
    fn content_id(&self) -> Result<ContentId, MemoryError> {
        let size = self.size();
        if size > MAX_CONTENT_ID_BYTES {
            return Err(MemoryError::ContentTooLarge { size });
        }
        let mut hasher = Sha256::new();
        let mut buf = [0u8; CHUNK];
        for run in self.runs(0) {
            let mut done = 0u64;
            let len = run.len();
            while done < len {
                let n = (len - done).min(CHUNK as u64) as usize;
                match run {
                    Run::Zeros { .. } => buf[..n].fill(0),
                    Run::Bytes {
                        src, src_offset, ..
                    } => src.get(src_offset + done, &mut buf[..n])?,
                }
                hasher.update(&buf[..n]);
                done += n as u64;
            }
        }
        Ok(ContentId(hasher.finalize().into()))
    }
}

/// A contiguous stretch of a [`Data`] view.
#[derive(Clone, Copy, Debug)]
pub enum Run<'a> {
    /// Nothing was recorded here; the bytes read as zero.
    Zeros { offset: u64, len: u64 },
    /// `len` bytes backed by `src`, starting at `src_offset` within `src`.
    Bytes {
        offset: u64,
        len: u64,
        src: &'a dyn Data,
        src_offset: u64,
    },
}

impl Run<'_> {
    /// Offset of the run within the view that produced it.
    pub fn offset(&self) -> u64 {
        match *self {
            Run::Zeros { offset, .. } | Run::Bytes { offset, .. } => offset,
        }
    }

    pub fn len(&self) -> u64 {
        match *self {
            Run::Zeros { len, .. } | Run::Bytes { len, .. } => len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn end(&self) -> u64 {
        self.offset() + self.len()
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContentId(pub [u8; 32]);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentId({self})")
    }
}

fn check_access(size: u64, offset: u64, len: usize) -> Result<(), MemoryError> {
    let range = Range::new(offset, len as u64)?;
    if range.end() > size {
        return Err(MemoryError::OutOfBounds { range, size });
    }
    Ok(())
}

fn check_slice(size: u64, range: Range) -> Result<(), MemoryError> {
    let range = Range::new(range.base, range.size)?;
    if range.end() > size {
        return Err(MemoryError::OutOfBounds { range, size });
    }
    Ok(())
}

/// A window into a shared, fully-resident byte buffer.
#[derive(Clone)]
pub struct Bytes {
    buf: Arc<[u8]>,
    start: usize,
    len: usize,
}

impl Bytes {
    pub fn new(buf: impl Into<Arc<[u8]>>) -> Self {
        let buf = buf.into();
        let len = buf.len();
        Self { buf, start: 0, len }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buf[self.start..self.start + self.len]
    }

    pub fn into_ref(self) -> DataRef {
        Arc::new(self)
    }
}

impl From<Vec<u8>> for Bytes {
    fn from(value: Vec<u8>) -> Self {
        Self::new(value)
    }
}

impl From<&[u8]> for Bytes {
    fn from(value: &[u8]) -> Self {
        Self::new(value)
    }
}

impl fmt::Debug for Bytes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bytes").field("len", &self.len).finish()
    }
}

impl Data for Bytes {
    fn size(&self) -> u64 {
        self.len as u64
    }

    fn slice(&self, range: Range) -> Result<DataRef, MemoryError> {
        check_slice(self.size(), range)?;
        Ok(Arc::new(Bytes {
            buf: self.buf.clone(),
            start: self.start + range.base as usize,
            len: range.size as usize,
        }))
    }

    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<(), MemoryError> {
        check_access(self.size(), offset, dst.len())?;
        let start = offset as usize;
        dst.copy_from_slice(&self.as_slice()[start..start + dst.len()]);
        Ok(())
    }

    fn runs(&self, offset: u64) -> Box<dyn Iterator<Item = Run<'_>> + '_> {
        let size = self.size();
        Box::new(
            (offset < size)
                .then_some(Run::Bytes {
                    offset,
                    len: size - offset,
                    src: self,
                    src_offset: offset,
                })
                .into_iter(),
        )
    }

    fn strlen(&self) -> Result<Option<u64>, MemoryError> {
        Ok(self
            .as_slice()
            .iter()
            .position(|b| *b == 0)
            .map(|pos| pos as u64))
    }
}

/// `size` zero bytes with no backing storage.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Zeros {
    pub size: u64,
}

impl Data for Zeros {
    fn size(&self) -> u64 {
        self.size
    }

    fn slice(&self, range: Range) -> Result<DataRef, MemoryError> {
        check_slice(self.size, range)?;
        Ok(Arc::new(Zeros { size: range.size }))
    }

    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<(), MemoryError> {
        check_access(self.size, offset, dst.len())?;
        dst.fill(0);
        Ok(())
    }

    fn runs(&self, offset: u64) -> Box<dyn Iterator<Item = Run<'_>> + '_> {
        Box::new(
            (offset < self.size)
                .then_some(Run::Zeros {
                    offset,
                    len: self.size - offset,
                })
                .into_iter(),
        )
    }

    fn strlen(&self) -> Result<Option<u64>, MemoryError> {
        Ok((self.size > 0).then_some(0))
    }
}

type Loader = Box<dyn Fn() -> Result<Vec<u8>, MemoryError> + Send + Sync>;

struct LazyInner {
    size: u64,
    loader: Loader,
    resolved: OnceLock<Bytes>,
}

/// Bytes of a known size that are only fetched (for example from a capture's resource store)
/// the first time somebody reads them. Slices share the resolved buffer.
#[derive(Clone)]
pub struct Lazy {
    inner: Arc<LazyInner>,
    window: Range,
}

impl Lazy {
    pub fn new<F>(size: u64, loader: F) -> Self
    where
        F: Fn() -> Result<Vec<u8>, MemoryError> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(LazyInner {
                size,
                loader: Box::new(loader),
                resolved: OnceLock::new(),
            }),
            window: Range { base: 0, size },
        }
    }

    pub fn is_resolved(&self) -> bool {
        self.inner.resolved.get().is_some()
    }

    fn resolve(&self) -> Result<&Bytes, MemoryError> {
        if let Some(bytes) = self.inner.resolved.get() {
            return Ok(bytes);
        }
        let loaded = (self.inner.loader)()?;
        if loaded.len() as u64 != self.inner.size {
            return Err(MemoryError::LazySizeMismatch {
                expected: self.inner.size,
                actual: loaded.len() as u64,
            });
        }
        // A concurrent resolver may have won the race; either result holds the same bytes.
        let _ = self.inner.resolved.set(Bytes::from(loaded));
        self.inner
            .resolved
            .get()
            .ok_or_else(|| MemoryError::Load("lazy data failed to resolve".into()))
    }
}

impl fmt::Debug for Lazy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy")
            .field("window", &self.window)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

impl Data for Lazy {
    fn size(&self) -> u64 {
        self.window.size
    }

    fn slice(&self, range: Range) -> Result<DataRef, MemoryError> {
        let window = self.window.window(range)?;
        Ok(Arc::new(Lazy {
            inner: self.inner.clone(),
            window,
        }))
    }

    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<(), MemoryError> {
        check_access(self.size(), offset, dst.len())?;
        self.resolve()?.get(self.window.base + offset, dst)
    }

    fn runs(&self, offset: u64) -> Box<dyn Iterator<Item = Run<'_>> + '_> {
        let size = self.size();
        Box::new(
            (offset < size)
                .then_some(Run::Bytes {
                    offset,
                    len: size - offset,
                    src: self,
                    src_offset: offset,
                })
                .into_iter(),
        )
    }
}
