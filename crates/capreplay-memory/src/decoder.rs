use half::f16;

use crate::data::Run;
use crate::{Data, DataTypeLayout, DecodeError, Endianness, MemoryLayout};

const STRING_CHUNK: u64 = 256;

/// A forward-only typed cursor over a [`Data`] view.
///
/// Values are produced on demand: the decoder walks the view's [`Run`]s, copying from a recorded
/// write or synthesizing zeros for a gap, and only moves to the next run when the cursor crosses
/// its end. Views over pools with many writes therefore cost one run step per boundary crossed,
/// never a rescan of the write list.
///
/// Errors are sticky. The first failure (end of data, a bad layout width, a failed load) is
/// kept; from then on every read returns the zero value of its kind. Use [`Decoder::check`] or
/// [`Decoder::finish`] to surface the error.
pub struct Decoder<'a> {
    layout: MemoryLayout,
    size: u64,
    offset: u64,
    runs: Box<dyn Iterator<Item = Run<'a>> + 'a>,
    current: Option<Run<'a>>,
    error: Option<DecodeError>,
}

impl<'a> Decoder<'a> {
    pub fn new(data: &'a dyn Data, layout: MemoryLayout) -> Self {
        Self {
            layout,
            size: data.size(),
            offset: 0,
            runs: data.runs(0),
            current: None,
            error: layout.validate().err(),
        }
    }

    pub fn layout(&self) -> &MemoryLayout {
        &self.layout
    }

    /// Cursor position, in bytes from the start of the view.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn remaining(&self) -> u64 {
        self.size.saturating_sub(self.offset)
    }

    pub fn error(&self) -> Option<&DecodeError> {
        self.error.as_ref()
    }

    pub fn check(&self) -> Result<(), DecodeError> {
        match &self.error {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Consumes the decoder, returning the final offset or the first error.
    pub fn finish(self) -> Result<u64, DecodeError> {
        self.check()?;
        Ok(self.offset)
    }

    pub fn read<T: Decode>(&mut self) -> T {
        T::decode(self)
    }

    /// Decodes up to `count` values, stopping early once an error is recorded.
    pub fn read_vec<T: Decode>(&mut self, count: usize) -> Vec<T> {
        let mut out = Vec::new();
        for _ in 0..count {
            if self.error.is_some() {
                break;
            }
            out.push(T::decode(self));
        }
        out
    }

    pub fn i8(&mut self) -> i8 {
        let r = self.read_signed("i8", self.layout.i8);
        self.settle(r) as i8
    }

    pub fn u8(&mut self) -> u8 {
        let r = self.read_raw("u8", self.layout.i8);
        self.settle(r) as u8
    }

    pub fn i16(&mut self) -> i16 {
        let r = self.read_signed("i16", self.layout.i16);
        self.settle(r) as i16
    }

    pub fn u16(&mut self) -> u16 {
        let r = self.read_raw("u16", self.layout.i16);
        self.settle(r) as u16
    }

    pub fn i32(&mut self) -> i32 {
        let r = self.read_signed("i32", self.layout.i32);
        self.settle(r) as i32
    }

    pub fn u32(&mut self) -> u32 {
        let r = self.read_raw("u32", self.layout.i32);
        self.settle(r) as u32
    }

    pub fn i64(&mut self) -> i64 {
        let r = self.read_signed("i64", self.layout.i64);
        self.settle(r)
    }

    pub fn u64(&mut self) -> u64 {
        let r = self.read_raw("u64", self.layout.i64);
        self.settle(r)
    }

    pub fn f16(&mut self) -> f16 {
        let r = self.read_raw("f16", self.layout.f16);
        f16::from_bits(self.settle(r) as u16)
    }

    pub fn f32(&mut self) -> f32 {
        let r = self.read_raw("f32", self.layout.f32);
        f32::from_bits(self.settle(r) as u32)
    }

    pub fn f64(&mut self) -> f64 {
        let r = self.read_raw("f64", self.layout.f64);
        f64::from_bits(self.settle(r))
    }

    pub fn bool(&mut self) -> bool {
        self.u8() != 0
    }

    pub fn pointer(&mut self) -> u64 {
        let r = self.read_raw("pointer", self.layout.pointer);
        self.settle(r)
    }

    pub fn platform_char(&mut self) -> u64 {
        let r = self.read_raw("char", self.layout.char);
        self.settle(r)
    }

    pub fn platform_int(&mut self) -> i64 {
        let r = self.read_signed("int", self.layout.integer);
        self.settle(r)
    }

    pub fn platform_uint(&mut self) -> u64 {
        let r = self.read_raw("uint", self.layout.integer);
        self.settle(r)
    }

    pub fn platform_size(&mut self) -> u64 {
        let r = self.read_raw("size", self.layout.size);
        self.settle(r)
    }

    /// Reads a zero-terminated string. The cursor moves past the terminator. Invalid UTF-8 is
    /// replaced rather than rejected.
    pub fn string(&mut self) -> String {
        let r = self.read_string();
        self.settle(r)
    }

    /// Fills `dst` with the next `dst.len()` bytes. On error `dst` is zeroed.
    pub fn data(&mut self, dst: &mut [u8]) {
        if let Err(err) = self.fill(dst) {
            dst.fill(0);
            self.fail(err);
        }
    }

    pub fn skip(&mut self, n: u64) {
        let r = self.skip_bytes(n);
        self.settle(r)
    }

    /// Advances the cursor to the next multiple of `to`. Alignments of 0 and 1 are no-ops.
    pub fn align(&mut self, to: u64) {
        let r = self.align_to(to);
        self.settle(r)
    }

    fn settle<T: Default>(&mut self, result: Result<T, DecodeError>) -> T {
        match result {
            Ok(value) => value,
            Err(err) => {
                self.fail(err);
                T::default()
            }
        }
    }

    fn fail(&mut self, err: DecodeError) {
        if self.error.is_none() {
            self.error = Some(err);
        }
    }

    fn end_of_data(&self, needed: u64) -> DecodeError {
        DecodeError::EndOfData {
            offset: self.offset,
            needed,
            size: self.size,
        }
    }

    /// The run containing the cursor, pulling further runs as boundaries are crossed.
    fn run_at_cursor(&mut self) -> Option<Run<'a>> {
        loop {
            match self.current {
                Some(run) if run.end() > self.offset => return Some(run),
                _ => self.current = Some(self.runs.next()?),
            }
        }
    }

    fn skip_bytes(&mut self, n: u64) -> Result<(), DecodeError> {
        self.check()?;
        if n > self.remaining() {
            return Err(self.end_of_data(n));
        }
        self.offset += n;
        Ok(())
    }

    fn align_to(&mut self, to: u64) -> Result<(), DecodeError> {
        if to <= 1 {
            return self.check();
        }
        let pad = (to - self.offset % to) % to;
        self.skip_bytes(pad)
    }

    fn fill(&mut self, dst: &mut [u8]) -> Result<(), DecodeError> {
        self.check()?;
        let needed = dst.len() as u64;
        if needed > self.remaining() {
            return Err(self.end_of_data(needed));
        }
        let mut done = 0usize;
        while done < dst.len() {
            let run = self
                .run_at_cursor()
                .ok_or_else(|| self.end_of_data(needed - done as u64))?;
            let n = (run.end() - self.offset).min((dst.len() - done) as u64) as usize;
            let out = &mut dst[done..done + n];
            match run {
                Run::Zeros { .. } => out.fill(0),
                Run::Bytes {
                    offset,
                    src,
                    src_offset,
                    ..
                } => src.get(src_offset + (self.offset - offset), out)?,
            }
            self.offset += n as u64;
            done += n;
        }
        Ok(())
    }

    fn read_raw(&mut self, kind: &'static str, layout: DataTypeLayout) -> Result<u64, DecodeError> {
        self.check()?;
        if !matches!(layout.size, 1 | 2 | 4 | 8) {
            return Err(DecodeError::InvalidWidth {
                kind,
                size: layout.size,
            });
        }
        self.align_to(u64::from(layout.alignment))?;

        let width = layout.size as usize;
        let mut buf = [0u8; 8];
        self.fill(&mut buf[..width])?;
        let bytes = &buf[..width];
        let value = match self.layout.endianness {
            Endianness::Little => bytes
                .iter()
                .rev()
                .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
            Endianness::Big => bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
        };
        Ok(value)
    }

    fn read_signed(&mut self, kind: &'static str, layout: DataTypeLayout) -> Result<i64, DecodeError> {
        let raw = self.read_raw(kind, layout)?;
        let shift = 64 - layout.size * 8;
        Ok(((raw << shift) as i64) >> shift)
    }

    fn read_string(&mut self) -> Result<String, DecodeError> {
        self.check()?;
        let mut bytes = Vec::new();
        loop {
            let run = self.run_at_cursor().ok_or_else(|| self.end_of_data(1))?;
            match run {
                Run::Zeros { .. } => {
                    self.offset += 1;
                    break;
                }
                Run::Bytes {
                    offset,
                    src,
                    src_offset,
                    ..
                } => {
                    let n = (run.end() - self.offset).min(STRING_CHUNK);
                    let start = bytes.len();
                    bytes.resize(start + n as usize, 0);
                    src.get(src_offset + (self.offset - offset), &mut bytes[start..])?;
                    if let Some(pos) = bytes[start..].iter().position(|b| *b == 0) {
                        bytes.truncate(start + pos);
                        self.offset += pos as u64 + 1;
                        break;
                    }
                    self.offset += n;
                }
            }
        }
        Ok(match String::from_utf8(bytes) {
            Ok(s) => s,
            Err(err) => String::from_utf8_lossy(err.as_bytes()).into_owned(),
        })
    }
}

/// Types that can be read from a [`Decoder`].
pub trait Decode: Sized {
    fn decode(d: &mut Decoder<'_>) -> Self;
}

macro_rules! impl_decode {
    ($($ty:ident),* $(,)?) => {
        $(
            impl Decode for $ty {
                fn decode(d: &mut Decoder<'_>) -> Self {
                    d.$ty()
                }
            }
        )*
    };
}

impl_decode!(u8, i8, u16, i16, u32, i32, u64, i64, f16, f32, f64, bool);

impl Decode for String {
    fn decode(d: &mut Decoder<'_>) -> Self {
        d.string()
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(d: &mut Decoder<'_>) -> Self {
        std::array::from_fn(|_| T::decode(d))
    }
}
