//! Fixed-width little-endian primitive decoding.
//!
//! Every primitive on the wire has a width that is a pure function of its
//! kind. Nothing here measures anything at runtime.

use std::fmt;

use serde::Serialize;

use super::error::QueryError;

/// The primitive types a ULog field can have.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    U8,
    I8,
    U16,
    I16,
    U32,
    I32,
    U64,
    I64,
    F32,
    F64,
    Bool,
    Char,
}

impl PrimitiveKind {
    /// Width in bytes of one value of this kind.
    pub const fn width(self) -> usize {
        match self {
            PrimitiveKind::U8 | PrimitiveKind::I8 | PrimitiveKind::Bool | PrimitiveKind::Char => 1,
            PrimitiveKind::U16 | PrimitiveKind::I16 => 2,
            PrimitiveKind::U32 | PrimitiveKind::I32 | PrimitiveKind::F32 => 4,
            PrimitiveKind::U64 | PrimitiveKind::I64 | PrimitiveKind::F64 => 8,
        }
    }

    /// Look up a primitive by the type name used in format definitions.
    ///
    /// Both the C spellings (`uint8_t`) and the short ones (`uint8`) are
    /// accepted. Anything else is a composite type name.
    pub fn from_type_name(name: &str) -> Option<Self> {
        let kind = match name {
            "uint8_t" | "uint8" => PrimitiveKind::U8,
            "int8_t" | "int8" => PrimitiveKind::I8,
            "uint16_t" | "uint16" => PrimitiveKind::U16,
            "int16_t" | "int16" => PrimitiveKind::I16,
            "uint32_t" | "uint32" => PrimitiveKind::U32,
            "int32_t" | "int32" => PrimitiveKind::I32,
            "uint64_t" | "uint64" => PrimitiveKind::U64,
            "int64_t" | "int64" => PrimitiveKind::I64,
            "float" => PrimitiveKind::F32,
            "double" => PrimitiveKind::F64,
            "bool" => PrimitiveKind::Bool,
            "char" => PrimitiveKind::Char,
            _ => return None,
        };
        Some(kind)
    }

    /// Canonical type name, as written by the PX4 logger.
    pub const fn type_name(self) -> &'static str {
        match self {
            PrimitiveKind::U8 => "uint8_t",
            PrimitiveKind::I8 => "int8_t",
            PrimitiveKind::U16 => "uint16_t",
            PrimitiveKind::I16 => "int16_t",
            PrimitiveKind::U32 => "uint32_t",
            PrimitiveKind::I32 => "int32_t",
            PrimitiveKind::U64 => "uint64_t",
            PrimitiveKind::I64 => "int64_t",
            PrimitiveKind::F32 => "float",
            PrimitiveKind::F64 => "double",
            PrimitiveKind::Bool => "bool",
            PrimitiveKind::Char => "char",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// One decoded primitive value.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DecodedValue {
    U8(u8),
    I8(i8),
    U16(u16),
    I16(i16),
    U32(u32),
    I32(i32),
    U64(u64),
    I64(i64),
    F32(f32),
    F64(f64),
    Bool(bool),
    Char(char),
}

macro_rules! value_accessors {
    ($($fn_name:ident => $variant:ident: $ty:ty),* $(,)?) => {
        impl DecodedValue {
            $(
                pub fn $fn_name(&self) -> Option<$ty> {
                    match *self {
                        DecodedValue::$variant(v) => Some(v),
                        _ => None,
                    }
                }
            )*
        }
    };
}

value_accessors! {
    as_u8 => U8: u8,
    as_i8 => I8: i8,
    as_u16 => U16: u16,
    as_i16 => I16: i16,
    as_u32 => U32: u32,
    as_i32 => I32: i32,
    as_u64 => U64: u64,
    as_i64 => I64: i64,
    as_f32 => F32: f32,
    as_f64 => F64: f64,
    as_bool => Bool: bool,
    as_char => Char: char,
}

impl DecodedValue {
    pub fn kind(&self) -> PrimitiveKind {
        match self {
            DecodedValue::U8(_) => PrimitiveKind::U8,
            DecodedValue::I8(_) => PrimitiveKind::I8,
            DecodedValue::U16(_) => PrimitiveKind::U16,
            DecodedValue::I16(_) => PrimitiveKind::I16,
            DecodedValue::U32(_) => PrimitiveKind::U32,
            DecodedValue::I32(_) => PrimitiveKind::I32,
            DecodedValue::U64(_) => PrimitiveKind::U64,
            DecodedValue::I64(_) => PrimitiveKind::I64,
            DecodedValue::F32(_) => PrimitiveKind::F32,
            DecodedValue::F64(_) => PrimitiveKind::F64,
            DecodedValue::Bool(_) => PrimitiveKind::Bool,
            DecodedValue::Char(_) => PrimitiveKind::Char,
        }
    }

    /// Lossy numeric view, for plotting and summaries.
    pub fn to_f64(&self) -> f64 {
        match *self {
            DecodedValue::U8(v) => v as f64,
            DecodedValue::I8(v) => v as f64,
            DecodedValue::U16(v) => v as f64,
            DecodedValue::I16(v) => v as f64,
            DecodedValue::U32(v) => v as f64,
            DecodedValue::I32(v) => v as f64,
            DecodedValue::U64(v) => v as f64,
            DecodedValue::I64(v) => v as f64,
            DecodedValue::F32(v) => v as f64,
            DecodedValue::F64(v) => v,
            DecodedValue::Bool(v) => u8::from(v) as f64,
            DecodedValue::Char(v) => v as u32 as f64,
        }
    }
}

impl fmt::Display for DecodedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodedValue::U8(v) => write!(f, "{v}"),
            DecodedValue::I8(v) => write!(f, "{v}"),
            DecodedValue::U16(v) => write!(f, "{v}"),
            DecodedValue::I16(v) => write!(f, "{v}"),
            DecodedValue::U32(v) => write!(f, "{v}"),
            DecodedValue::I32(v) => write!(f, "{v}"),
            DecodedValue::U64(v) => write!(f, "{v}"),
            DecodedValue::I64(v) => write!(f, "{v}"),
            DecodedValue::F32(v) => write!(f, "{v}"),
            DecodedValue::F64(v) => write!(f, "{v}"),
            DecodedValue::Bool(v) => write!(f, "{v}"),
            DecodedValue::Char(v) => write!(f, "{v}"),
        }
    }
}

/// Rust types that a primitive field can be read into.
///
/// A typed read only succeeds when `KIND` matches the field's declared kind
/// exactly; there is no implicit widening.
pub trait Primitive: Sized {
    const KIND: PrimitiveKind;

    fn from_value(value: &DecodedValue) -> Option<Self>;
}

macro_rules! impl_primitive {
    ($($ty:ty => $kind:ident, $accessor:ident);* $(;)?) => {
        $(
            impl Primitive for $ty {
                const KIND: PrimitiveKind = PrimitiveKind::$kind;

                fn from_value(value: &DecodedValue) -> Option<Self> {
                    value.$accessor()
                }
            }
        )*
    };
}

impl_primitive! {
    u8 => U8, as_u8;
    i8 => I8, as_i8;
    u16 => U16, as_u16;
    i16 => I16, as_i16;
    u32 => U32, as_u32;
    i32 => I32, as_i32;
    u64 => U64, as_u64;
    i64 => I64, as_i64;
    f32 => F32, as_f32;
    f64 => F64, as_f64;
    bool => Bool, as_bool;
    char => Char, as_char;
}

fn field_bytes(bytes: &[u8], offset: usize, width: usize) -> Result<&[u8], QueryError> {
    offset
        .checked_add(width)
        .and_then(|end| bytes.get(offset..end))
        .ok_or(QueryError::OutOfBounds {
            offset,
            width,
            len: bytes.len(),
        })
}

fn le<const N: usize>(raw: &[u8]) -> [u8; N] {
    let mut out = [0u8; N];
    out.copy_from_slice(raw);
    out
}

/// Decode one primitive of `kind` at `offset`.
pub fn decode(kind: PrimitiveKind, bytes: &[u8], offset: usize) -> Result<DecodedValue, QueryError> {
    let raw = field_bytes(bytes, offset, kind.width())?;
    let value = match kind {
        PrimitiveKind::U8 => DecodedValue::U8(raw[0]),
        PrimitiveKind::I8 => DecodedValue::I8(raw[0] as i8),
        PrimitiveKind::U16 => DecodedValue::U16(u16::from_le_bytes(le(raw))),
        PrimitiveKind::I16 => DecodedValue::I16(i16::from_le_bytes(le(raw))),
        PrimitiveKind::U32 => DecodedValue::U32(u32::from_le_bytes(le(raw))),
        PrimitiveKind::I32 => DecodedValue::I32(i32::from_le_bytes(le(raw))),
        PrimitiveKind::U64 => DecodedValue::U64(u64::from_le_bytes(le(raw))),
        PrimitiveKind::I64 => DecodedValue::I64(i64::from_le_bytes(le(raw))),
        PrimitiveKind::F32 => DecodedValue::F32(f32::from_le_bytes(le(raw))),
        PrimitiveKind::F64 => DecodedValue::F64(f64::from_le_bytes(le(raw))),
        PrimitiveKind::Bool => DecodedValue::Bool(raw[0] != 0),
        PrimitiveKind::Char => DecodedValue::Char(raw[0] as char),
    };
    Ok(value)
}

/// Decode `count` consecutive primitives starting at `offset`.
pub fn decode_array(
    kind: PrimitiveKind,
    bytes: &[u8],
    offset: usize,
    count: usize,
) -> Result<Vec<DecodedValue>, QueryError> {
    // Check the whole span up front so a short buffer fails before any work.
    field_bytes(bytes, offset, kind.width().saturating_mul(count))?;
    (0..count)
        .map(|i| decode(kind, bytes, offset + i * kind.width()))
        .collect()
}

/// Decode a `char[len]` field as text.
///
/// Each byte maps to one character and all `len` bytes are kept, including
/// NUL padding. Use [`trim_text`] to drop the padding.
pub fn decode_text(bytes: &[u8], offset: usize, len: usize) -> Result<String, QueryError> {
    let raw = field_bytes(bytes, offset, len)?;
    Ok(raw.iter().map(|&b| b as char).collect())
}

/// Strip trailing NUL padding from decoded text.
pub fn trim_text(text: &str) -> &str {
    text.trim_end_matches('\0')
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    const ALL_KINDS: [PrimitiveKind; 12] = [
        PrimitiveKind::U8,
        PrimitiveKind::I8,
        PrimitiveKind::U16,
        PrimitiveKind::I16,
        PrimitiveKind::U32,
        PrimitiveKind::I32,
        PrimitiveKind::U64,
        PrimitiveKind::I64,
        PrimitiveKind::F32,
        PrimitiveKind::F64,
        PrimitiveKind::Bool,
        PrimitiveKind::Char,
    ];

    fn encode(value: DecodedValue) -> Vec<u8> {
        match value {
            DecodedValue::U8(v) => vec![v],
            DecodedValue::I8(v) => v.to_le_bytes().to_vec(),
            DecodedValue::U16(v) => v.to_le_bytes().to_vec(),
            DecodedValue::I16(v) => v.to_le_bytes().to_vec(),
            DecodedValue::U32(v) => v.to_le_bytes().to_vec(),
            DecodedValue::I32(v) => v.to_le_bytes().to_vec(),
            DecodedValue::U64(v) => v.to_le_bytes().to_vec(),
            DecodedValue::I64(v) => v.to_le_bytes().to_vec(),
            DecodedValue::F32(v) => v.to_le_bytes().to_vec(),
            DecodedValue::F64(v) => v.to_le_bytes().to_vec(),
            DecodedValue::Bool(v) => vec![u8::from(v)],
            DecodedValue::Char(v) => vec![v as u8],
        }
    }

    fn random_value(rng: &mut StdRng, kind: PrimitiveKind) -> DecodedValue {
        match kind {
            PrimitiveKind::U8 => DecodedValue::U8(rng.random()),
            PrimitiveKind::I8 => DecodedValue::I8(rng.random()),
            PrimitiveKind::U16 => DecodedValue::U16(rng.random()),
            PrimitiveKind::I16 => DecodedValue::I16(rng.random()),
            PrimitiveKind::U32 => DecodedValue::U32(rng.random()),
            PrimitiveKind::I32 => DecodedValue::I32(rng.random()),
            PrimitiveKind::U64 => DecodedValue::U64(rng.random()),
            PrimitiveKind::I64 => DecodedValue::I64(rng.random()),
            PrimitiveKind::F32 => DecodedValue::F32(rng.random_range(-1.0e6..1.0e6)),
            PrimitiveKind::F64 => DecodedValue::F64(rng.random_range(-1.0e12..1.0e12)),
            PrimitiveKind::Bool => DecodedValue::Bool(rng.random()),
            PrimitiveKind::Char => DecodedValue::Char(rng.random_range(0x20u8..0x7f) as char),
        }
    }

    #[test]
    fn test_widths() {
        let widths: Vec<usize> = ALL_KINDS.iter().map(|k| k.width()).collect();
        assert_eq!(widths, vec![1, 1, 2, 2, 4, 4, 8, 8, 4, 8, 1, 1]);
    }

    #[test]
    fn test_type_names() {
        assert_eq!(PrimitiveKind::from_type_name("uint8_t"), Some(PrimitiveKind::U8));
        assert_eq!(PrimitiveKind::from_type_name("uint8"), Some(PrimitiveKind::U8));
        assert_eq!(PrimitiveKind::from_type_name("float"), Some(PrimitiveKind::F32));
        assert_eq!(PrimitiveKind::from_type_name("vehicle_attitude"), None);
        for kind in ALL_KINDS {
            assert_eq!(PrimitiveKind::from_type_name(kind.type_name()), Some(kind));
        }
    }

    #[test]
    fn test_roundtrip_at_offset() {
        let mut rng = StdRng::seed_from_u64(0x554c_6f67);
        for kind in ALL_KINDS {
            for _ in 0..32 {
                let value = random_value(&mut rng, kind);
                let offset = rng.random_range(0..16usize);
                let mut buf = vec![0xAAu8; offset];
                buf.extend(encode(value));
                buf.extend([0xAAu8; 3]);
                assert_eq!(decode(kind, &buf, offset).unwrap(), value);
            }
        }
    }

    #[test]
    fn test_bool_is_any_nonzero() {
        assert_eq!(decode(PrimitiveKind::Bool, &[0], 0).unwrap(), DecodedValue::Bool(false));
        assert_eq!(decode(PrimitiveKind::Bool, &[1], 0).unwrap(), DecodedValue::Bool(true));
        assert_eq!(decode(PrimitiveKind::Bool, &[0x80], 0).unwrap(), DecodedValue::Bool(true));
    }

    #[test]
    fn test_out_of_bounds() {
        let buf = [0u8; 6];
        assert_eq!(
            decode(PrimitiveKind::U64, &buf, 0),
            Err(QueryError::OutOfBounds {
                offset: 0,
                width: 8,
                len: 6
            })
        );
        assert!(decode(PrimitiveKind::U16, &buf, 5).is_err());
        assert!(decode(PrimitiveKind::U16, &buf, 4).is_ok());
        assert!(decode(PrimitiveKind::U8, &buf, usize::MAX).is_err());
    }

    #[test]
    fn test_decode_array() {
        let mut buf = Vec::new();
        for v in [1.5f32, -2.0, 3.25] {
            buf.extend(v.to_le_bytes());
        }
        let values = decode_array(PrimitiveKind::F32, &buf, 4, 2).unwrap();
        assert_eq!(values, vec![DecodedValue::F32(-2.0), DecodedValue::F32(3.25)]);
        assert!(decode_array(PrimitiveKind::F32, &buf, 4, 3).is_err());
    }

    #[test]
    fn test_decode_text_keeps_padding() {
        let buf = b"xxPX4\0\0\0yy";
        let text = decode_text(buf, 2, 6).unwrap();
        assert_eq!(text.chars().count(), 6);
        assert_eq!(text, "PX4\0\0\0");
        assert_eq!(trim_text(&text), "PX4");
        assert!(decode_text(buf, 8, 6).is_err());
    }

    #[test]
    fn test_accessors_reject_other_kinds() {
        let value = DecodedValue::F32(1.0);
        assert_eq!(value.as_f32(), Some(1.0));
        assert_eq!(value.as_f64(), None);
        assert_eq!(value.as_u32(), None);
        assert_eq!(f32::from_value(&value), Some(1.0));
        assert_eq!(u32::from_value(&value), None);
        assert_eq!(value.kind(), PrimitiveKind::F32);
    }
}
