//! # MessagePack stream decoder
//!
//! A pull-based decoder for the MessagePack wire format that reads from any
//! [`std::io::Read`]: files, sockets, pipes or in-memory buffers.
//!
//! ## Features
//! - One byte of lookahead, so callers can ask "is the next value nil?"
//!   before committing to a read
//! - Typed decoding through serde: `bool`, every integer width, `f32`/`f64`,
//!   `String`, raw byte strings (`serde_bytes::ByteBuf`), `Vec<T>`, tuples,
//!   `HashMap`/`BTreeMap`, `Option<T>`, structs and enums
//! - Dynamic decoding into [`Value`] when the shape is not known up front
//! - Permissive numeric narrowing by default (plain `as` casts), with an
//!   opt-in [`NumericMode::Strict`] that rejects lossy conversions
//! - Raw passthroughs ([`Decoder::read_exact`], [`Decoder::read_fixed`]) for
//!   callers layering their own types on top
//!
//! ## Wire format
//!
//! | Tag | Meaning |
//! |-----|---------|
//! | `0x00-0x7f` | positive fixnum |
//! | `0x80-0x8f` | fixmap, length in low 4 bits |
//! | `0x90-0x9f` | fixarray, length in low 4 bits |
//! | `0xa0-0xbf` | fixraw, length in low 5 bits |
//! | `0xc0` | nil |
//! | `0xc2` / `0xc3` | false / true |
//! | `0xca` / `0xcb` | float32 / float64 |
//! | `0xcc-0xcf` | uint8 / uint16 / uint32 / uint64 |
//! | `0xd0-0xd3` | int8 / int16 / int32 / int64 |
//! | `0xda` / `0xdb` | raw16 / raw32 |
//! | `0xdc` / `0xdd` | array16 / array32 |
//! | `0xde` / `0xdf` | map16 / map32 |
//! | `0xe0-0xff` | negative fixnum |
//!
//! All multi-byte payloads are big-endian. Every other tag is reserved and
//! fails to decode.
//!
//! ## Errors
//! Any error leaves the stream somewhere inside a value, with no way back to
//! a value boundary. The decoder remembers this: once a call has failed,
//! every later call returns [`MsgPackError::Poisoned`]. Use
//! [`Decoder::into_inner`] to take the reader back.
//!
//! ## Example
//! ```rust
//! use msgpack_stream::{Decoder, from_slice};
//! use std::collections::HashMap;
//!
//! // [1, 2]
//! let numbers: Vec<u32> = from_slice(&[0x92, 0x01, 0x02]).unwrap();
//! assert_eq!(numbers, vec![1, 2]);
//!
//! // nil, then {"k": 1}
//! let bytes = [0xc0, 0x81, 0xa1, b'k', 0x01];
//! let mut decoder = Decoder::new(&bytes[..]);
//! assert!(decoder.is_nil().unwrap());
//! decoder.consume_nil().unwrap();
//! let map: HashMap<String, i64> = decoder.decode().unwrap();
//! assert_eq!(map["k"], 1);
//! ```

use serde::Deserialize;
use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};
use std::io::{self, Read};
use tracing::debug;

pub mod number;
pub mod source;
pub mod tags;
pub mod value;

pub use number::NumericMode;
pub use source::{ByteSource, Fixed};
pub use value::Value;

use number::{FromNumber, Number};
use tags::{Family, Length, Width};

#[derive(Debug, thiserror::Error)]
pub enum MsgPackError {
    /// The tag byte does not belong to any family the requested type accepts.
    #[error("don't know how to convert MessagePack type {tag} to {expected}")]
    UnexpectedTag { tag: u8, expected: &'static str },

    /// The reader could not supply the requested bytes.
    #[error("read from stream failed: {0}")]
    Io(#[from] io::Error),

    /// Strict numeric mode refused a lossy conversion.
    #[error("value {value} does not fit in {target}")]
    OutOfRange { value: String, target: &'static str },

    #[error("raw string is not valid UTF-8")]
    InvalidUtf8,

    #[error("{0} trailing bytes after the decoded value")]
    TrailingBytes(usize),

    /// The decoder already reported an error and can no longer be trusted.
    #[error("decoder used after an earlier decode failure")]
    Poisoned,

    #[error("{0}")]
    Serde(String),
}

impl MsgPackError {
    /// True when the failure came from the reader rather than from the data.
    pub fn is_stream_failure(&self) -> bool {
        matches!(self, MsgPackError::Io(_))
    }
}

impl de::Error for MsgPackError {
    fn custom<T: std::fmt::Display>(msg: T) -> Self {
        MsgPackError::Serde(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MsgPackError>;

pub mod error {
    pub use super::MsgPackError as Error;
}

fn unexpected(tag: u8, expected: &'static str) -> MsgPackError {
    debug!(
        tag,
        family = tags::classify(tag).name(),
        expected,
        "unexpected MessagePack tag"
    );
    MsgPackError::UnexpectedTag { tag, expected }
}

// Decoder
pub struct Decoder<R: Read> {
    source: ByteSource<R>,
    mode: NumericMode,
    poisoned: bool,
}

impl<R: Read> Decoder<R> {
    pub fn new(reader: R) -> Self {
        Decoder {
            source: ByteSource::new(reader),
            mode: NumericMode::default(),
            poisoned: false,
        }
    }

    /// Selects how numbers are narrowed into the requested type.
    pub fn numeric_mode(mut self, mode: NumericMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn get_ref(&self) -> &R {
        self.source.get_ref()
    }

    /// Gives the reader back. A byte buffered by [`is_nil`](Self::is_nil) or
    /// [`peek`](Self::peek) is lost.
    pub fn into_inner(self) -> R {
        self.source.into_inner()
    }

    /// Checks whether the next value is nil without consuming it.
    pub fn is_nil(&mut self) -> Result<bool> {
        self.guarded(Self::peek_nil)
    }

    /// Reads a nil, failing if the next value is anything else.
    pub fn consume_nil(&mut self) -> Result<()> {
        self.guarded(Self::read_nil)
    }

    /// Decodes the next value as `T`.
    pub fn decode<'de, T: Deserialize<'de>>(&mut self) -> Result<T> {
        self.guarded(|this| T::deserialize(this))
    }

    /// Reads an array header and returns its element count.
    pub fn array_length(&mut self) -> Result<usize> {
        self.guarded(Self::read_array_length)
    }

    /// Reads a map header and returns its entry count.
    pub fn map_length(&mut self) -> Result<usize> {
        self.guarded(Self::read_map_length)
    }

    /// Reads one complete value, nested containers included, and drops it.
    pub fn skip_value(&mut self) -> Result<()> {
        self.guarded(|this| de::IgnoredAny::deserialize(this).map(|_| ()))
    }

    /// Returns the next raw byte without consuming it.
    pub fn peek(&mut self) -> Result<u8> {
        self.guarded(|this| this.source.peek())
    }

    /// Fills `buf` with raw bytes, no interpretation.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.guarded(|this| this.source.read_exact(buf))
    }

    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        self.guarded(|this| this.source.read_bytes(len))
    }

    /// Reads a fixed-width value in native byte order; see [`Fixed`].
    pub fn read_fixed<T: Fixed>(&mut self) -> Result<T> {
        self.guarded(|this| this.source.read_fixed())
    }

    fn guarded<T>(&mut self, f: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if self.poisoned {
            debug!("decoder used after an earlier failure");
            return Err(MsgPackError::Poisoned);
        }
        let result = f(self);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn peek_nil(&mut self) -> Result<bool> {
        Ok(self.source.peek()? == tags::NIL)
    }

    fn read_nil(&mut self) -> Result<()> {
        let tag = self.source.read_u8()?;
        if tag != tags::NIL {
            return Err(unexpected(tag, "nil"));
        }
        Ok(())
    }

    fn read_length(&mut self, length: Length) -> Result<usize> {
        Ok(match length {
            Length::Inline(len) => len as usize,
            Length::Prefixed16 => u16::from_be(self.source.read_fixed()?) as usize,
            Length::Prefixed32 => u32::from_be(self.source.read_fixed()?) as usize,
        })
    }

    fn read_array_length(&mut self) -> Result<usize> {
        let tag = self.source.read_u8()?;
        match tags::classify(tag) {
            Family::Array(length) => self.read_length(length),
            _ => Err(unexpected(tag, "array")),
        }
    }

    fn read_map_length(&mut self) -> Result<usize> {
        let tag = self.source.read_u8()?;
        match tags::classify(tag) {
            Family::Map(length) => self.read_length(length),
            _ => Err(unexpected(tag, "map")),
        }
    }

    fn read_uint(&mut self, width: Width) -> Result<u64> {
        Ok(match width {
            Width::W8 => u64::from(self.source.read_fixed::<u8>()?),
            Width::W16 => u64::from(u16::from_be(self.source.read_fixed()?)),
            Width::W32 => u64::from(u32::from_be(self.source.read_fixed()?)),
            Width::W64 => u64::from_be(self.source.read_fixed()?),
        })
    }

    fn read_int(&mut self, width: Width) -> Result<i64> {
        Ok(match width {
            Width::W8 => i64::from(self.source.read_fixed::<i8>()?),
            Width::W16 => i64::from(i16::from_be(self.source.read_fixed()?)),
            Width::W32 => i64::from(i32::from_be(self.source.read_fixed()?)),
            Width::W64 => i64::from_be(self.source.read_fixed()?),
        })
    }

    fn read_f32(&mut self) -> Result<f32> {
        Ok(f32::from_bits(u32::from_be(self.source.read_fixed()?)))
    }

    fn read_f64(&mut self) -> Result<f64> {
        Ok(f64::from_bits(u64::from_be(self.source.read_fixed()?)))
    }

    fn read_number(&mut self, expected: &'static str) -> Result<Number> {
        let tag = self.source.read_u8()?;
        Ok(match tags::classify(tag) {
            Family::PositiveFixnum(v) => Number::Unsigned(u64::from(v)),
            Family::NegativeFixnum(v) => Number::Signed(i64::from(v)),
            Family::Bool(b) => Number::Unsigned(u64::from(b)),
            Family::Float32 => Number::F32(self.read_f32()?),
            Family::Float64 => Number::F64(self.read_f64()?),
            Family::Uint(width) => Number::Unsigned(self.read_uint(width)?),
            Family::Int(width) => Number::Signed(self.read_int(width)?),
            Family::Nil
            | Family::Raw(_)
            | Family::Array(_)
            | Family::Map(_)
            | Family::Reserved(_) => return Err(unexpected(tag, expected)),
        })
    }

    fn read_numeric<T: FromNumber>(&mut self) -> Result<T> {
        let number = self.read_number(T::NAME)?;
        T::from_number(number, self.mode).ok_or_else(|| {
            debug!(%number, target = T::NAME, "numeric value out of range");
            MsgPackError::OutOfRange {
                value: number.to_string(),
                target: T::NAME,
            }
        })
    }

    fn read_raw(&mut self, expected: &'static str) -> Result<Vec<u8>> {
        let tag = self.source.read_u8()?;
        match tags::classify(tag) {
            Family::Raw(length) => {
                let len = self.read_length(length)?;
                self.source.read_bytes(len)
            }
            _ => Err(unexpected(tag, expected)),
        }
    }

    fn read_string(&mut self, expected: &'static str) -> Result<String> {
        String::from_utf8(self.read_raw(expected)?).map_err(|_| MsgPackError::InvalidUtf8)
    }

    fn visit_array<'de, V: Visitor<'de>>(&mut self, len: usize, visitor: V) -> Result<V::Value> {
        let mut access = SeqAccess {
            de: self,
            remaining: len,
        };
        let value = visitor.visit_seq(&mut access)?;
        if access.remaining != 0 {
            let consumed = format!("a length of {}", len - access.remaining);
            return Err(de::Error::invalid_length(len, &consumed.as_str()));
        }
        Ok(value)
    }

    fn visit_map<'de, V: Visitor<'de>>(&mut self, len: usize, visitor: V) -> Result<V::Value> {
        let mut access = MapAccess {
            de: self,
            remaining: len,
        };
        let value = visitor.visit_map(&mut access)?;
        if access.remaining != 0 {
            let consumed = format!("a length of {}", len - access.remaining);
            return Err(de::Error::invalid_length(len, &consumed.as_str()));
        }
        Ok(value)
    }
}

macro_rules! deserialize_numeric {
    ($($method:ident => $visit:ident),* $(,)?) => {
        $(
            fn $method<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
                visitor.$visit(self.read_numeric()?)
            }
        )*
    };
}

impl<'de, R: Read> serde::Deserializer<'de> for &mut Decoder<R> {
    type Error = MsgPackError;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let tag = self.source.read_u8()?;
        match tags::classify(tag) {
            Family::PositiveFixnum(v) => visitor.visit_u64(u64::from(v)),
            Family::NegativeFixnum(v) => visitor.visit_i64(i64::from(v)),
            Family::Nil => visitor.visit_unit(),
            Family::Bool(b) => visitor.visit_bool(b),
            Family::Float32 => visitor.visit_f32(self.read_f32()?),
            Family::Float64 => visitor.visit_f64(self.read_f64()?),
            Family::Uint(width) => visitor.visit_u64(self.read_uint(width)?),
            Family::Int(width) => visitor.visit_i64(self.read_int(width)?),
            Family::Raw(length) => {
                let len = self.read_length(length)?;
                let bytes = self.source.read_bytes(len)?;
                // raw carries both text and binary; text is the common case
                match String::from_utf8(bytes) {
                    Ok(text) => visitor.visit_string(text),
                    Err(e) => visitor.visit_byte_buf(e.into_bytes()),
                }
            }
            Family::Array(length) => {
                let len = self.read_length(length)?;
                self.visit_array(len, visitor)
            }
            Family::Map(length) => {
                let len = self.read_length(length)?;
                self.visit_map(len, visitor)
            }
            Family::Reserved(tag) => Err(unexpected(tag, "any value")),
        }
    }

    fn deserialize_bool<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_bool(self.read_numeric()?)
    }

    deserialize_numeric! {
        deserialize_i8 => visit_i8,
        deserialize_i16 => visit_i16,
        deserialize_i32 => visit_i32,
        deserialize_i64 => visit_i64,
        deserialize_u8 => visit_u8,
        deserialize_u16 => visit_u16,
        deserialize_u32 => visit_u32,
        deserialize_u64 => visit_u64,
        deserialize_f32 => visit_f32,
        deserialize_f64 => visit_f64,
    }

    fn deserialize_char<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_str<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_string(visitor)
    }

    fn deserialize_string<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_string(self.read_string("string")?)
    }

    fn deserialize_bytes<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_byte_buf(visitor)
    }

    fn deserialize_byte_buf<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        visitor.visit_byte_buf(self.read_raw("bytes")?)
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        if self.peek_nil()? {
            self.read_nil()?;
            visitor.visit_none()
        } else {
            visitor.visit_some(self)
        }
    }

    fn deserialize_unit<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.read_nil()?;
        visitor.visit_unit()
    }

    fn deserialize_unit_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_unit(visitor)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        visitor: V,
    ) -> Result<V::Value> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let len = self.read_array_length()?;
        self.visit_array(len, visitor)
    }

    fn deserialize_tuple<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _len: usize,
        visitor: V,
    ) -> Result<V::Value> {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        let len = self.read_map_length()?;
        self.visit_map(len, visitor)
    }

    // Structs come either as a name-keyed map or as an array of fields.
    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match tags::classify(self.source.peek()?) {
            Family::Array(_) => self.deserialize_seq(visitor),
            _ => self.deserialize_map(visitor),
        }
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        _name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        match tags::classify(self.source.peek()?) {
            Family::Raw(_) => {
                let variant = self.read_string("enum variant")?;
                visitor.visit_enum(variant.into_deserializer())
            }
            Family::Map(_) => {
                let len = self.read_map_length()?;
                if len != 1 {
                    return Err(de::Error::invalid_length(len, &"a map with one variant key"));
                }
                visitor.visit_enum(EnumAccess { de: self })
            }
            _ => {
                let tag = self.source.read_u8()?;
                Err(unexpected(tag, "enum"))
            }
        }
    }

    fn deserialize_identifier<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_any(visitor)
    }

    fn deserialize_ignored_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value> {
        self.deserialize_any(visitor)
    }

    fn is_human_readable(&self) -> bool {
        false
    }
}

struct SeqAccess<'a, R: Read> {
    de: &'a mut Decoder<R>,
    remaining: usize,
}

impl<'de, 'a, R: Read> de::SeqAccess<'de> for SeqAccess<'a, R> {
    type Error = MsgPackError;

    fn next_element_seed<T: DeserializeSeed<'de>>(
        &mut self,
        seed: T,
    ) -> Result<Option<T::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

struct MapAccess<'a, R: Read> {
    de: &'a mut Decoder<R>,
    remaining: usize,
}

impl<'de, 'a, R: Read> de::MapAccess<'de> for MapAccess<'a, R> {
    type Error = MsgPackError;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>> {
        if self.remaining == 0 {
            return Ok(None);
        }
        self.remaining -= 1;
        seed.deserialize(&mut *self.de).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value> {
        seed.deserialize(&mut *self.de)
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.remaining)
    }
}

// `{variant: payload}`, the map header already consumed
struct EnumAccess<'a, R: Read> {
    de: &'a mut Decoder<R>,
}

impl<'de, 'a, R: Read> de::EnumAccess<'de> for EnumAccess<'a, R> {
    type Error = MsgPackError;
    type Variant = Self;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self)> {
        let variant = seed.deserialize(&mut *self.de)?;
        Ok((variant, self))
    }
}

impl<'de, 'a, R: Read> de::VariantAccess<'de> for EnumAccess<'a, R> {
    type Error = MsgPackError;

    fn unit_variant(self) -> Result<()> {
        self.de.read_nil()
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value> {
        seed.deserialize(self.de)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, visitor: V) -> Result<V::Value> {
        de::Deserializer::deserialize_seq(self.de, visitor)
    }

    fn struct_variant<V: Visitor<'de>>(
        self,
        fields: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value> {
        de::Deserializer::deserialize_struct(self.de, "", fields, visitor)
    }
}

// Convenience functions
pub fn from_reader<T: de::DeserializeOwned, R: Read>(reader: R) -> Result<T> {
    Decoder::new(reader).decode()
}

/// Decodes exactly one value from `slice`; leftover bytes are an error.
pub fn from_slice<'de, T: Deserialize<'de>>(slice: &[u8]) -> Result<T> {
    let mut decoder = Decoder::new(slice);
    let value = decoder.decode()?;
    let trailing = decoder.source.buffered() + decoder.get_ref().len();
    if trailing > 0 {
        return Err(MsgPackError::TrailingBytes(trailing));
    }
    Ok(value)
}
