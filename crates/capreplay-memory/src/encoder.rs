use half::f16;

use crate::{Bytes, DataTypeLayout, DecodeError, Endianness, MemoryLayout};

/// Writes typed values into a growable buffer following a [`MemoryLayout`], padding with zeros
/// for alignment. Produces bytes a [`Decoder`](crate::Decoder) with the same layout reads back.
#[derive(Clone, Debug)]
pub struct Encoder {
    layout: MemoryLayout,
    buf: Vec<u8>,
}

impl Encoder {
    pub fn new(layout: MemoryLayout) -> Result<Self, DecodeError> {
        layout.validate()?;
        Ok(Self {
            layout,
            buf: Vec::new(),
        })
    }

    pub fn offset(&self) -> u64 {
        self.buf.len() as u64
    }

    pub fn align(&mut self, to: u64) {
        if to <= 1 {
            return;
        }
        let pad = (to - self.offset() % to) % to;
        self.buf.resize(self.buf.len() + pad as usize, 0);
    }

    fn put(&mut self, layout: DataTypeLayout, value: u64) {
        self.align(u64::from(layout.alignment));
        let width = layout.size as usize;
        match self.layout.endianness {
            Endianness::Little => self.buf.extend_from_slice(&value.to_le_bytes()[..width]),
            Endianness::Big => self.buf.extend_from_slice(&value.to_be_bytes()[8 - width..]),
        }
    }

    pub fn u8(&mut self, v: u8) {
        self.put(self.layout.i8, u64::from(v));
    }

    pub fn i8(&mut self, v: i8) {
        self.put(self.layout.i8, v as u64);
    }

    pub fn u16(&mut self, v: u16) {
        self.put(self.layout.i16, u64::from(v));
    }

    pub fn i16(&mut self, v: i16) {
        self.put(self.layout.i16, v as u64);
    }

    pub fn u32(&mut self, v: u32) {
        self.put(self.layout.i32, u64::from(v));
    }

    pub fn i32(&mut self, v: i32) {
        self.put(self.layout.i32, v as u64);
    }

    pub fn u64(&mut self, v: u64) {
        self.put(self.layout.i64, v);
    }

    pub fn i64(&mut self, v: i64) {
        self.put(self.layout.i64, v as u64);
    }

    pub fn f16(&mut self, v: f16) {
        self.put(self.layout.f16, u64::from(v.to_bits()));
    }

    pub fn f32(&mut self, v: f32) {
        self.put(self.layout.f32, u64::from(v.to_bits()));
    }

    pub fn f64(&mut self, v: f64) {
        self.put(self.layout.f64, v.to_bits());
    }

    pub fn bool(&mut self, v: bool) {
        self.u8(u8::from(v));
    }

    /// Values wider than the layout's pointer size are truncated.
    pub fn pointer(&mut self, v: u64) {
        self.put(self.layout.pointer, v);
    }

    pub fn platform_int(&mut self, v: i64) {
        self.put(self.layout.integer, v as u64);
    }

    pub fn platform_uint(&mut self, v: u64) {
        self.put(self.layout.integer, v);
    }

    pub fn platform_size(&mut self, v: u64) {
        self.put(self.layout.size, v);
    }

    pub fn platform_char(&mut self, v: u64) {
        self.put(self.layout.char, v);
    }

    /// Writes `s` followed by a zero terminator.
    pub fn string(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    pub fn data(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    pub fn into_data(self) -> Bytes {
        Bytes::from(self.buf)
    }
}
