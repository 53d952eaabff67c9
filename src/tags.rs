//! Tag byte classification.
//!
//! Every encoded value starts with one tag byte. Small integers, short raw
//! strings, short arrays and short maps carry their value or length in the
//! tag itself; everything else names a payload that follows.

// Single-byte opcodes
pub const NIL: u8 = 0xC0;
pub const FALSE: u8 = 0xC2;
pub const TRUE: u8 = 0xC3;
pub const FLOAT32: u8 = 0xCA;
pub const FLOAT64: u8 = 0xCB;
pub const UINT8: u8 = 0xCC;
pub const UINT16: u8 = 0xCD;
pub const UINT32: u8 = 0xCE;
pub const UINT64: u8 = 0xCF;
pub const INT8: u8 = 0xD0;
pub const INT16: u8 = 0xD1;
pub const INT32: u8 = 0xD2;
pub const INT64: u8 = 0xD3;
pub const RAW16: u8 = 0xDA;
pub const RAW32: u8 = 0xDB;
pub const ARRAY16: u8 = 0xDC;
pub const ARRAY32: u8 = 0xDD;
pub const MAP16: u8 = 0xDE;
pub const MAP32: u8 = 0xDF;

// Inline ranges (inclusive)
pub const POSITIVE_FIXNUM_MAX: u8 = 0x7F;
pub const FIXMAP_MIN: u8 = 0x80;
pub const FIXARRAY_MIN: u8 = 0x90;
pub const FIXRAW_MIN: u8 = 0xA0;
pub const NEGATIVE_FIXNUM_MIN: u8 = 0xE0;

/// Payload width of a fixed-size integer opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Width {
    W8,
    W16,
    W32,
    W64,
}

impl Width {
    pub fn bytes(self) -> usize {
        match self {
            Width::W8 => 1,
            Width::W16 => 2,
            Width::W32 => 4,
            Width::W64 => 8,
        }
    }
}

/// Where the length of a raw string, array or map comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Length {
    /// Length packed into the low bits of the tag.
    Inline(u8),
    /// Two big-endian bytes follow the tag.
    Prefixed16,
    /// Four big-endian bytes follow the tag.
    Prefixed32,
}

/// The value family a tag byte introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    PositiveFixnum(u8),
    NegativeFixnum(i8),
    Nil,
    Bool(bool),
    Float32,
    Float64,
    Uint(Width),
    Int(Width),
    Raw(Length),
    Array(Length),
    Map(Length),
    /// Opcodes with no meaning in this format.
    Reserved(u8),
}

impl Family {
    /// Short human-readable family name, used in diagnostics.
    pub fn name(self) -> &'static str {
        match self {
            Family::PositiveFixnum(_) => "positive fixnum",
            Family::NegativeFixnum(_) => "negative fixnum",
            Family::Nil => "nil",
            Family::Bool(_) => "bool",
            Family::Float32 => "float32",
            Family::Float64 => "float64",
            Family::Uint(_) => "uint",
            Family::Int(_) => "int",
            Family::Raw(_) => "raw",
            Family::Array(_) => "array",
            Family::Map(_) => "map",
            Family::Reserved(_) => "reserved",
        }
    }

    /// True for every family a numeric (or bool) target accepts.
    pub fn is_numeric(self) -> bool {
        matches!(
            self,
            Family::PositiveFixnum(_)
                | Family::NegativeFixnum(_)
                | Family::Bool(_)
                | Family::Float32
                | Family::Float64
                | Family::Uint(_)
                | Family::Int(_)
        )
    }
}

/// Classifies a tag byte.
///
/// The match covers all 256 values without a catch-all arm, so a gap in the
/// table is a compile error rather than a silent runtime default.
pub fn classify(tag: u8) -> Family {
    match tag {
        0x00..=0x7F => Family::PositiveFixnum(tag),
        0x80..=0x8F => Family::Map(Length::Inline(tag & 0x0F)),
        0x90..=0x9F => Family::Array(Length::Inline(tag & 0x0F)),
        0xA0..=0xBF => Family::Raw(Length::Inline(tag & 0x1F)),
        NIL => Family::Nil,
        FALSE => Family::Bool(false),
        TRUE => Family::Bool(true),
        FLOAT32 => Family::Float32,
        FLOAT64 => Family::Float64,
        UINT8 => Family::Uint(Width::W8),
        UINT16 => Family::Uint(Width::W16),
        UINT32 => Family::Uint(Width::W32),
        UINT64 => Family::Uint(Width::W64),
        INT8 => Family::Int(Width::W8),
        INT16 => Family::Int(Width::W16),
        INT32 => Family::Int(Width::W32),
        INT64 => Family::Int(Width::W64),
        RAW16 => Family::Raw(Length::Prefixed16),
        RAW32 => Family::Raw(Length::Prefixed32),
        ARRAY16 => Family::Array(Length::Prefixed16),
        ARRAY32 => Family::Array(Length::Prefixed32),
        MAP16 => Family::Map(Length::Prefixed16),
        MAP32 => Family::Map(Length::Prefixed32),
        0xC1 | 0xC4..=0xC9 | 0xD4..=0xD9 => Family::Reserved(tag),
        0xE0..=0xFF => Family::NegativeFixnum(tag as i8),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixnum_boundaries() {
        assert_eq!(classify(0x00), Family::PositiveFixnum(0));
        assert_eq!(classify(POSITIVE_FIXNUM_MAX), Family::PositiveFixnum(127));
        assert_eq!(classify(NEGATIVE_FIXNUM_MIN), Family::NegativeFixnum(-32));
        assert_eq!(classify(0xFF), Family::NegativeFixnum(-1));
    }

    #[test]
    fn test_inline_lengths() {
        assert_eq!(classify(FIXMAP_MIN), Family::Map(Length::Inline(0)));
        assert_eq!(classify(0x8F), Family::Map(Length::Inline(15)));
        assert_eq!(classify(FIXARRAY_MIN), Family::Array(Length::Inline(0)));
        assert_eq!(classify(0x9F), Family::Array(Length::Inline(15)));
        assert_eq!(classify(FIXRAW_MIN), Family::Raw(Length::Inline(0)));
        assert_eq!(classify(0xBF), Family::Raw(Length::Inline(31)));
    }

    #[test]
    fn test_reserved_opcodes() {
        for tag in [0xC1u8, 0xC4, 0xC5, 0xC6, 0xC7, 0xC8, 0xC9] {
            assert_eq!(classify(tag), Family::Reserved(tag));
        }
        for tag in 0xD4u8..=0xD9 {
            assert_eq!(classify(tag), Family::Reserved(tag));
        }
    }

    #[test]
    fn test_numeric_families() {
        let numeric = (0u8..=255).filter(|&t| classify(t).is_numeric()).count();
        // 128 + 32 fixnums, 2 bools, 2 floats, 8 integer opcodes
        assert_eq!(numeric, 128 + 32 + 2 + 2 + 8);
        assert!(!classify(NIL).is_numeric());
        assert!(!classify(FIXMAP_MIN).is_numeric());
    }

    #[test]
    fn test_integer_widths() {
        assert_eq!(classify(UINT16), Family::Uint(Width::W16));
        assert_eq!(classify(INT64), Family::Int(Width::W64));
        assert_eq!(Width::W32.bytes(), 4);
    }
}
