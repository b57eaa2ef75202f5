//! Inspecting raw memory dumps with the capture memory model.
//!
//! A dump file is mapped into a [`Pool`] at a chosen base address and read lazily; fields are
//! then decoded with a [`Decoder`] under a named or JSON-supplied [`MemoryLayout`].

#![forbid(unsafe_code)]

use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use capreplay_memory::{
    Bytes, DataTypeLayout, Decoder, Lazy, MemoryError, MemoryLayout, Pool, Range,
};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

/// One entry of a `--fields` list.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Field {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F16,
    F32,
    F64,
    Bool,
    Pointer,
    Char,
    Int,
    Uint,
    Size,
    /// Zero-terminated string.
    String,
    /// `n` raw bytes, printed as hex.
    Bytes(u64),
    Skip(u64),
    Align(u64),
}

impl FromStr for Field {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if let Some((kind, count)) = s.split_once(':') {
            let n = parse_u64(count).with_context(|| format!("invalid count in field `{s}`"))?;
            return match kind {
                "bytes" => Ok(Field::Bytes(n)),
                "skip" => Ok(Field::Skip(n)),
                "align" => Ok(Field::Align(n)),
                _ => bail!("field `{kind}` does not take a count"),
            };
        }
        Ok(match s {
            "u8" => Field::U8,
            "i8" => Field::I8,
            "u16" => Field::U16,
            "i16" => Field::I16,
            "u32" => Field::U32,
            "i32" => Field::I32,
            "u64" => Field::U64,
            "i64" => Field::I64,
            "f16" => Field::F16,
            "f32" => Field::F32,
            "f64" => Field::F64,
            "bool" => Field::Bool,
            "ptr" | "pointer" => Field::Pointer,
            "char" => Field::Char,
            "int" => Field::Int,
            "uint" => Field::Uint,
            "size" => Field::Size,
            "string" | "str" => Field::String,
            _ => bail!("unknown field kind `{s}`"),
        })
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Field::U8 => "u8",
            Field::I8 => "i8",
            Field::U16 => "u16",
            Field::I16 => "i16",
            Field::U32 => "u32",
            Field::I32 => "i32",
            Field::U64 => "u64",
            Field::I64 => "i64",
            Field::F16 => "f16",
            Field::F32 => "f32",
            Field::F64 => "f64",
            Field::Bool => "bool",
            Field::Pointer => "pointer",
            Field::Char => "char",
            Field::Int => "int",
            Field::Uint => "uint",
            Field::Size => "size",
            Field::String => "string",
            Field::Bytes(n) => return write!(f, "bytes:{n}"),
            Field::Skip(n) => return write!(f, "skip:{n}"),
            Field::Align(n) => return write!(f, "align:{n}"),
        };
        f.write_str(name)
    }
}

impl Field {
    /// The primitive layout this field is read with, if it is a fixed-width value.
    fn layout(self, layout: &MemoryLayout) -> Option<DataTypeLayout> {
        Some(match self {
            Field::U8 | Field::I8 | Field::Bool => layout.i8,
            Field::U16 | Field::I16 => layout.i16,
            Field::U32 | Field::I32 => layout.i32,
            Field::U64 | Field::I64 => layout.i64,
            Field::F16 => layout.f16,
            Field::F32 => layout.f32,
            Field::F64 => layout.f64,
            Field::Pointer => layout.pointer,
            Field::Char => layout.char,
            Field::Int | Field::Uint => layout.integer,
            Field::Size => layout.size,
            Field::String | Field::Bytes(_) | Field::Skip(_) | Field::Align(_) => return None,
        })
    }
}

/// Parses a comma separated field list such as `u32,ptr,skip:4,string`.
pub fn parse_fields(list: &str) -> Result<Vec<Field>> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Field::from_str)
        .collect()
}

/// Accepts decimal or `0x`-prefixed hexadecimal.
pub fn parse_u64(s: &str) -> Result<u64> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(&hex.replace('_', ""), 16),
        None => s.replace('_', "").parse(),
    };
    parsed.with_context(|| format!("invalid number `{s}`"))
}

/// Picks the layout from a JSON file, a preset name, or the host, in that order.
pub fn resolve_layout(name: Option<&str>, file: Option<&Path>) -> Result<MemoryLayout> {
    let layout = match (file, name) {
        (Some(path), _) => {
            let file = File::open(path)
                .with_context(|| format!("failed to open layout file {}", path.display()))?;
            serde_json::from_reader(BufReader::new(file))
                .with_context(|| format!("failed to parse layout file {}", path.display()))?
        }
        (None, Some(name)) => MemoryLayout::preset(name).ok_or_else(|| {
            let known: Vec<_> = MemoryLayout::PRESETS.iter().map(|(n, _)| *n).collect();
            anyhow!("unknown layout `{name}` (known: {})", known.join(", "))
        })?,
        (None, None) => MemoryLayout::host(),
    };
    layout.validate().map_err(|e| anyhow!("{e}"))?;
    Ok(layout)
}

/// Maps `path` into a fresh pool at `base`. The file is read the first time its bytes are
/// needed.
pub fn load_dump(path: &Path, base: u64) -> Result<Pool> {
    let size = std::fs::metadata(path)
        .with_context(|| format!("failed to stat dump {}", path.display()))?
        .len();
    Range::new(base, size).map_err(|e| anyhow!("dump does not fit at {base:#x}: {e}"))?;

    let owned: PathBuf = path.to_owned();
    let data = Lazy::new(size, move || {
        debug!(path = %owned.display(), "loading dump");
        std::fs::read(&owned).map_err(|e| MemoryError::Load(format!("{}: {e}", owned.display())))
    });

    let mut pool = Pool::new();
    pool.write(base, Arc::new(data))
        .map_err(|e| anyhow!("{e}"))?;
    Ok(pool)
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodedField {
    pub field: String,
    pub address: u64,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeReport {
    pub address: u64,
    pub fields: Vec<DecodedField>,
    /// Bytes consumed, alignment padding included.
    pub consumed: u64,
    /// SHA-256 of the consumed bytes.
    pub content_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Largest `bytes:n` field printed in one report.
pub const MAX_BYTES_FIELD: u64 = 1 << 20;

/// Decodes `fields` in order starting at `at`. Decoding stops at the first error, which is
/// reported alongside the fields read before it.
pub fn decode_fields(
    pool: &Pool,
    at: u64,
    layout: MemoryLayout,
    fields: &[Field],
) -> Result<DecodeReport> {
    let view = pool.at(at).map_err(|e| anyhow!("{e}"))?;
    let mut d = Decoder::new(&*view, layout);
    let mut decoded = Vec::with_capacity(fields.len());

    for field in fields {
        if let Some(primitive) = field.layout(&layout) {
            d.align(u64::from(primitive.alignment));
        }
        let address = at + d.offset();
        let value = match *field {
            Field::U8 => Value::from(d.u8()),
            Field::I8 => Value::from(d.i8()),
            Field::U16 => Value::from(d.u16()),
            Field::I16 => Value::from(d.i16()),
            Field::U32 => Value::from(d.u32()),
            Field::I32 => Value::from(d.i32()),
            Field::U64 => Value::from(d.u64()),
            Field::I64 => Value::from(d.i64()),
            Field::F16 => Value::from(d.f16().to_f64()),
            Field::F32 => Value::from(f64::from(d.f32())),
            Field::F64 => Value::from(d.f64()),
            Field::Bool => Value::from(d.bool()),
            Field::Pointer => Value::from(format!("{:#x}", d.pointer())),
            Field::Char => Value::from(d.platform_char()),
            Field::Int => Value::from(d.platform_int()),
            Field::Uint => Value::from(d.platform_uint()),
            Field::Size => Value::from(d.platform_size()),
            Field::String => Value::from(d.string()),
            Field::Bytes(n) => {
                if n > MAX_BYTES_FIELD {
                    bail!("field `{field}` exceeds the {MAX_BYTES_FIELD} byte limit");
                }
                let len = usize::try_from(n).context("byte count too large")?;
                let mut buf = vec![0u8; len];
                d.data(&mut buf);
                Value::from(hex(&buf))
            }
            Field::Skip(n) => {
                d.skip(n);
                continue;
            }
            Field::Align(n) => {
                d.align(n);
                continue;
            }
        };
        if d.error().is_some() {
            break;
        }
        decoded.push(DecodedField {
            field: field.to_string(),
            address,
            value,
        });
    }

    let error = d.error().map(ToString::to_string);
    let consumed = d.offset();
    let content_id = view
        .slice(Range { base: 0, size: consumed })
        .and_then(|span| span.content_id())
        .map_err(|e| anyhow!("{e}"))?;

    Ok(DecodeReport {
        address: at,
        fields: decoded,
        consumed,
        content_id: content_id.to_string(),
        error,
    })
}

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// The named layout presets, as printed by `capreplay layouts`.
pub fn presets() -> Vec<(&'static str, MemoryLayout)> {
    MemoryLayout::PRESETS.to_vec()
}

/// Wraps raw bytes for callers that already hold a dump in memory.
pub fn pool_from_bytes(base: u64, bytes: Vec<u8>) -> Result<Pool> {
    let mut pool = Pool::new();
    pool.write(base, Bytes::from(bytes).into_ref())
        .map_err(|e| anyhow!("{e}"))?;
    Ok(pool)
}
