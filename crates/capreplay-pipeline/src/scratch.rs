use capreplay_memory::{Bytes, DataRef, MemoryError, Pool, Range};

/// Bump-allocated memory owned by one transform, used to build the contents of commands it
/// injects. Everything is released at once by [`ScratchMemory::clear`], normally from
/// [`Transform::clear_resources`](crate::Transform::clear_resources).
///
/// Allocations hand back the written bytes as [`DataRef`]s, so commands built from them keep
/// their data alive after the scratch space is cleared.
#[derive(Clone, Debug)]
pub struct ScratchMemory {
    pool: Pool,
    base: u64,
    next: u64,
    allocations: usize,
}

impl ScratchMemory {
    /// Scratch space handing out addresses from `base` upwards.
    pub fn new(base: u64) -> Self {
        Self {
            pool: Pool::new(),
            base,
            next: base,
            allocations: 0,
        }
    }

    /// Copies `bytes` into a fresh `alignment`-aligned range and returns the range with a view
    /// of its contents.
    pub fn alloc(
        &mut self,
        bytes: impl Into<Bytes>,
        alignment: u64,
    ) -> Result<(Range, DataRef), MemoryError> {
        let bytes = bytes.into().into_ref();
        let alignment = alignment.max(1);
        let size = bytes.size();
        let start = self
            .next
            .checked_add(alignment - 1)
            .map(|addr| addr - addr % alignment)
            .ok_or(MemoryError::AddressOverflow {
                base: self.next,
                size,
            })?;
        let range = Range::new(start, size)?;

        self.pool.write(start, bytes)?;
        self.next = range.end();
        self.allocations += 1;
        Ok((range, self.pool.slice(range)?))
    }

    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    /// Bytes handed out since the last clear, alignment padding included.
    pub fn used(&self) -> u64 {
        self.next - self.base
    }

    pub fn allocations(&self) -> usize {
        self.allocations
    }

    pub fn clear(&mut self) {
        self.pool = Pool::new();
        self.next = self.base;
        self.allocations = 0;
    }
}
