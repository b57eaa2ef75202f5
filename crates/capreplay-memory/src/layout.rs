use serde::{Deserialize, Serialize};

use crate::DecodeError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Endianness {
    Little,
    Big,
}

/// Size and alignment of one primitive kind, in bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataTypeLayout {
    pub size: u32,
    pub alignment: u32,
}

impl DataTypeLayout {
    pub const fn new(size: u32, alignment: u32) -> Self {
        Self { size, alignment }
    }

    /// Naturally aligned layout of `size` bytes.
    pub const fn natural(size: u32) -> Self {
        Self::new(size, size)
    }
}

/// How the captured process laid out primitives in memory.
///
/// Supplied once per replay run and never changed while decoding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MemoryLayout {
    pub endianness: Endianness,
    pub pointer: DataTypeLayout,
    /// Platform `int` / `unsigned int`.
    pub integer: DataTypeLayout,
    /// Platform `size_t`.
    pub size: DataTypeLayout,
    pub char: DataTypeLayout,
    pub i8: DataTypeLayout,
    pub i16: DataTypeLayout,
    pub i32: DataTypeLayout,
    pub i64: DataTypeLayout,
    pub f16: DataTypeLayout,
    pub f32: DataTypeLayout,
    pub f64: DataTypeLayout,
}

const fn lp64(endianness: Endianness) -> MemoryLayout {
    MemoryLayout {
        endianness,
        pointer: DataTypeLayout::natural(8),
        integer: DataTypeLayout::natural(4),
        size: DataTypeLayout::natural(8),
        char: DataTypeLayout::natural(1),
        i8: DataTypeLayout::natural(1),
        i16: DataTypeLayout::natural(2),
        i32: DataTypeLayout::natural(4),
        i64: DataTypeLayout::natural(8),
        f16: DataTypeLayout::natural(2),
        f32: DataTypeLayout::natural(4),
        f64: DataTypeLayout::natural(8),
    }
}

impl MemoryLayout {
    pub const X86_64: MemoryLayout = lp64(Endianness::Little);

    pub const ARM64: MemoryLayout = lp64(Endianness::Little);

    /// i386 System V: 64-bit scalars are only 4-byte aligned.
    pub const X86: MemoryLayout = MemoryLayout {
        pointer: DataTypeLayout::natural(4),
        size: DataTypeLayout::natural(4),
        i64: DataTypeLayout::new(8, 4),
        f64: DataTypeLayout::new(8, 4),
        ..lp64(Endianness::Little)
    };

    pub const ARMV7A: MemoryLayout = MemoryLayout {
        pointer: DataTypeLayout::natural(4),
        size: DataTypeLayout::natural(4),
        ..lp64(Endianness::Little)
    };

    pub const PRESETS: [(&'static str, MemoryLayout); 4] = [
        ("x86_64", Self::X86_64),
        ("x86", Self::X86),
        ("armv7a", Self::ARMV7A),
        ("arm64", Self::ARM64),
    ];

    /// Looks up a named preset (`x86_64`, `x86`, `armv7a`, `arm64`).
    pub fn preset(name: &str) -> Option<MemoryLayout> {
        Self::PRESETS
            .iter()
            .find(|(preset, _)| preset.eq_ignore_ascii_case(name))
            .map(|(_, layout)| *layout)
    }

    /// The layout of the process running this code.
    pub fn host() -> MemoryLayout {
        let endianness = if cfg!(target_endian = "big") {
            Endianness::Big
        } else {
            Endianness::Little
        };
        let word = core::mem::size_of::<usize>() as u32;
        MemoryLayout {
            pointer: DataTypeLayout::natural(word),
            size: DataTypeLayout::natural(word),
            i64: DataTypeLayout::new(8, core::mem::align_of::<u64>() as u32),
            f64: DataTypeLayout::new(8, core::mem::align_of::<f64>() as u32),
            ..lp64(endianness)
        }
    }

    /// Rejects layouts the decoder cannot honor: fixed-width kinds must keep their width,
    /// platform kinds must be 1, 2, 4 or 8 bytes wide, and every alignment must be a non-zero
    /// power of two.
    pub fn validate(&self) -> Result<(), DecodeError> {
        let fixed = [
            ("i8", self.i8, 1),
            ("i16", self.i16, 2),
            ("i32", self.i32, 4),
            ("i64", self.i64, 8),
            ("f16", self.f16, 2),
            ("f32", self.f32, 4),
            ("f64", self.f64, 8),
        ];
        for (kind, layout, width) in fixed {
            if layout.size != width {
                return Err(DecodeError::InvalidLayout(format!(
                    "{kind} must be {width} bytes, got {}",
                    layout.size
                )));
            }
        }
        let platform = [
            ("pointer", self.pointer),
            ("integer", self.integer),
            ("size", self.size),
            ("char", self.char),
        ];
        for (kind, layout) in platform {
            if !matches!(layout.size, 1 | 2 | 4 | 8) {
                return Err(DecodeError::InvalidWidth {
                    kind,
                    size: layout.size,
                });
            }
        }
        for (kind, layout) in fixed
            .iter()
            .map(|(kind, layout, _)| (*kind, *layout))
            .chain(platform)
        {
            if !layout.alignment.is_power_of_two() {
                return Err(DecodeError::InvalidLayout(format!(
                    "{kind} alignment {} is not a power of two",
                    layout.alignment
                )));
            }
        }
        Ok(())
    }
}

impl Default for MemoryLayout {
    fn default() -> Self {
        Self::host()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for (name, layout) in MemoryLayout::PRESETS {
            layout
                .validate()
                .unwrap_or_else(|err| panic!("{name}: {err}"));
        }
        MemoryLayout::host().validate().unwrap();
    }

    #[test]
    fn preset_lookup_is_case_insensitive() {
        assert_eq!(MemoryLayout::preset("X86"), Some(MemoryLayout::X86));
        assert_eq!(MemoryLayout::preset("mips"), None);
        assert_eq!(MemoryLayout::X86.i64.alignment, 4);
    }

    #[test]
    fn custom_layouts_load_from_json() {
        let json = serde_json::to_string(&MemoryLayout::ARM64).unwrap();
        assert!(json.contains(r#""endianness":"little""#), "{json}");

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["endianness"] = "big".into();
        value["pointer"] = serde_json::json!({ "size": 4, "alignment": 4 });
        let layout: MemoryLayout = serde_json::from_value(value).unwrap();

        assert_eq!(layout.endianness, Endianness::Big);
        assert_eq!(layout.pointer, DataTypeLayout::natural(4));
        assert_eq!(layout.f64, MemoryLayout::ARM64.f64);
        layout.validate().unwrap();

        assert!(serde_json::from_str::<MemoryLayout>(r#"{ "endianness": "little" }"#).is_err());
    }

    #[test]
    fn validate_rejects_bad_widths_and_alignments() {
        let mut layout = MemoryLayout::X86_64;
        layout.pointer.size = 3;
        assert_eq!(
            layout.validate(),
            Err(DecodeError::InvalidWidth {
                kind: "pointer",
                size: 3
            })
        );

        let mut layout = MemoryLayout::X86_64;
        layout.f32.alignment = 0;
        assert!(matches!(
            layout.validate(),
            Err(DecodeError::InvalidLayout(_))
        ));
    }
}
