use core::fmt;
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::data::Run;
use crate::{Bytes, Data, DataRef, MemoryError, Range};

/// `src` is authoritative for the bytes in `dst`.
#[derive(Clone, Debug)]
pub struct Write {
    pub dst: Range,
    pub src: DataRef,
}

/// A sparse address space built from a log of writes.
///
/// Invariant: `writes` is sorted by `dst.base`, holds no empty entries and no two entries
/// overlap. Writing over existing entries clips or removes them so the invariant holds after
/// every call. Cloning a pool copies the write list; the [`Data`] sources stay shared.
#[derive(Clone, Debug, Default)]
pub struct Pool {
    writes: Vec<Write>,
}

impl Pool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }

    /// Records `src` as the content of `[dst, dst + src.size())`.
    pub fn write(&mut self, dst: u64, src: DataRef) -> Result<(), MemoryError> {
        let dst = Range::new(dst, src.size())?;
        if dst.is_empty() {
            return Ok(());
        }

        let (first, last) = overlapping(&self.writes, dst);
        let mut replacement = Vec::with_capacity(3);
        if first < last {
            let head = &self.writes[first];
            if head.dst.base < dst.base {
                let size = dst.base - head.dst.base;
                replacement.push(Write {
                    dst: Range {
                        base: head.dst.base,
                        size,
                    },
                    src: head.src.slice(Range { base: 0, size })?,
                });
            }
        }
        replacement.push(Write { dst, src });
        if first < last {
            let tail = &self.writes[last - 1];
            if tail.dst.end() > dst.end() {
                let size = tail.dst.end() - dst.end();
                replacement.push(Write {
                    dst: Range {
                        base: dst.end(),
                        size,
                    },
                    src: tail.src.slice(Range {
                        base: dst.end() - tail.dst.base,
                        size,
                    })?,
                });
            }
        }

        self.writes.splice(first..last, replacement);
        Ok(())
    }

    pub fn write_bytes(&mut self, dst: u64, bytes: impl Into<Bytes>) -> Result<(), MemoryError> {
        self.write(dst, bytes.into().into_ref())
    }

    /// A view of `range`. Bytes not covered by any write read as zero.
    pub fn slice(&self, range: Range) -> Result<DataRef, MemoryError> {
        Ok(Arc::new(self.slice_view(range)?))
    }

    /// Like [`Pool::slice`] but returns the concrete view.
    pub fn slice_view(&self, range: Range) -> Result<PoolSlice, MemoryError> {
        let range = Range::new(range.base, range.size)?;
        Ok(PoolSlice {
            range,
            writes: clip(&self.writes, range)?,
        })
    }

    /// An unbounded view from `addr` to the top of the address space, for reads whose length is
    /// only known once the data has been seen (strings, until-EOF blobs).
    pub fn at(&self, addr: u64) -> Result<DataRef, MemoryError> {
        self.slice(Range::until_end(addr))
    }

    /// Copies `range` out of the pool.
    pub fn read(&self, range: Range) -> Result<Vec<u8>, MemoryError> {
        let len = usize::try_from(range.size).map_err(|_| MemoryError::OutOfBounds {
            range,
            size: usize::MAX as u64,
        })?;
        let mut out = vec![0u8; len];
        self.slice_view(range)?.get(0, &mut out)?;
        Ok(out)
    }
}

/// Index range `[first, last)` of the writes overlapping `range`.
fn overlapping(writes: &[Write], range: Range) -> (usize, usize) {
    let first = writes.partition_point(|w| w.dst.end() <= range.base);
    let last = writes.partition_point(|w| w.dst.base < range.end());
    (first, last.max(first))
}

/// The writes overlapping `range`, each clipped to it. Destinations stay absolute.
fn clip(writes: &[Write], range: Range) -> Result<Vec<Write>, MemoryError> {
    let (first, last) = overlapping(writes, range);
    writes[first..last]
        .iter()
        .map(|w| {
            let dst = w.dst.intersect(&range);
            let src = if dst == w.dst {
                w.src.clone()
            } else {
                w.src.slice(Range {
                    base: dst.base - w.dst.base,
                    size: dst.size,
                })?
            };
            Ok(Write { dst, src })
        })
        .collect()
}

/// A [`Data`] view over part of a [`Pool`], holding only the writes that overlap it.
#[derive(Clone, Debug)]
pub struct PoolSlice {
    range: Range,
    writes: Vec<Write>,
}

impl PoolSlice {
    /// The absolute address range this view covers.
    pub fn range(&self) -> Range {
        self.range
    }

    pub fn writes(&self) -> &[Write] {
        &self.writes
    }
}

impl Data for PoolSlice {
    fn size(&self) -> u64 {
        self.range.size
    }

    fn slice(&self, range: Range) -> Result<DataRef, MemoryError> {
        let range = self.range.window(range)?;
        Ok(Arc::new(PoolSlice {
            range,
            writes: clip(&self.writes, range)?,
        }))
    }

    fn get(&self, offset: u64, dst: &mut [u8]) -> Result<(), MemoryError> {
        let want = self.range.window(Range::new(offset, dst.len() as u64)?)?;
        dst.fill(0);
        let (first, last) = overlapping(&self.writes, want);
        for w in &self.writes[first..last] {
            let part = w.dst.intersect(&want);
            let at = (part.base - want.base) as usize;
            w.src
                .get(part.base - w.dst.base, &mut dst[at..at + part.size as usize])?;
        }
        Ok(())
    }

    fn runs(&self, offset: u64) -> Box<dyn Iterator<Item = Run<'_>> + '_> {
        let pos = self.range.base.saturating_add(offset).min(self.range.end());
        let next = self.writes.partition_point(|w| w.dst.end() <= pos);
        Box::new(PoolRuns {
            slice: self,
            next,
            pos,
        })
    }
}

/// Walks a [`PoolSlice`] alternating between recorded writes and zero gaps.
struct PoolRuns<'a> {
    slice: &'a PoolSlice,
    next: usize,
    pos: u64,
}

impl<'a> Iterator for PoolRuns<'a> {
    type Item = Run<'a>;

    fn next(&mut self) -> Option<Run<'a>> {
        let end = self.slice.range.end();
        if self.pos >= end {
            return None;
        }
        let offset = self.pos - self.slice.range.base;
        match self.slice.writes.get(self.next) {
            Some(w) if w.dst.base <= self.pos => {
                let len = w.dst.end() - self.pos;
                let run = Run::Bytes {
                    offset,
                    len,
                    src: &*w.src,
                    src_offset: self.pos - w.dst.base,
                };
                self.pos += len;
                self.next += 1;
                Some(run)
            }
            next => {
                let gap_end = next.map_or(end, |w| w.dst.base);
                let len = gap_end - self.pos;
                self.pos = gap_end;
                Some(Run::Zeros { offset, len })
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PoolId(pub u32);

impl PoolId {
    /// The pool holding the captured application's address space.
    pub const APPLICATION: PoolId = PoolId(0);
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pool#{}", self.0)
    }
}

/// Registry of the pools belonging to one replay run. Always contains the application pool.
#[derive(Clone, Debug)]
pub struct Pools {
    pools: BTreeMap<PoolId, Pool>,
    next_id: u32,
}

impl Default for Pools {
    fn default() -> Self {
        let mut pools = BTreeMap::new();
        pools.insert(PoolId::APPLICATION, Pool::new());
        Self { pools, next_id: 1 }
    }
}

impl Pools {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty pool under a fresh id.
    pub fn new_pool(&mut self) -> PoolId {
        while self.pools.contains_key(&PoolId(self.next_id)) {
            self.next_id += 1;
        }
        let id = PoolId(self.next_id);
        self.next_id += 1;
        self.pools.insert(id, Pool::new());
        id
    }

    /// Returns the pool with `id`, creating an empty one if it does not exist yet.
    pub fn get_or_create(&mut self, id: PoolId) -> &mut Pool {
        self.pools.entry(id).or_default()
    }

    pub fn get(&self, id: PoolId) -> Result<&Pool, MemoryError> {
        self.pools.get(&id).ok_or(MemoryError::UnknownPool(id))
    }

    pub fn get_mut(&mut self, id: PoolId) -> Result<&mut Pool, MemoryError> {
        self.pools.get_mut(&id).ok_or(MemoryError::UnknownPool(id))
    }

    pub fn application(&self) -> &Pool {
        self.pools.get(&PoolId::APPLICATION).unwrap_or(&EMPTY_POOL)
    }

    pub fn application_mut(&mut self) -> &mut Pool {
        self.get_or_create(PoolId::APPLICATION)
    }

    /// Removes a pool. The application pool is reset to empty rather than removed.
    pub fn remove(&mut self, id: PoolId) -> Option<Pool> {
        if id == PoolId::APPLICATION {
            return self
                .pools
                .get_mut(&id)
                .map(std::mem::take);
        }
        self.pools.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PoolId, &Pool)> {
        self.pools.iter().map(|(id, pool)| (*id, pool))
    }
}

static EMPTY_POOL: Pool = Pool { writes: Vec::new() };
