//! Raw byte retrieval with a single byte of lookahead.
//!
//! [`ByteSource`] is the leaf of the decoder. It knows nothing about tags or
//! byte order; it hands out exact byte counts and lets the caller look at the
//! next byte without consuming it.

use std::io::{self, Read};

use tracing::trace;

use crate::{MsgPackError, Result};

/// A fixed-width value that can be rebuilt from its in-memory bytes.
///
/// [`ByteSource::read_fixed`] uses the native layout, so multi-byte values
/// still need a `from_be` (or `from_bits(from_be(..))` for floats) to become
/// wire-order correct.
pub trait Fixed: Sized {
    /// Number of bytes occupied on the wire.
    const SIZE: usize;

    /// Rebuild the value from exactly `SIZE` bytes in native order.
    fn from_ne_slice(bytes: &[u8]) -> Self;
}

macro_rules! impl_fixed {
    ($($ty:ty),*) => {
        $(
            impl Fixed for $ty {
                const SIZE: usize = std::mem::size_of::<$ty>();

                fn from_ne_slice(bytes: &[u8]) -> Self {
                    let mut buf = [0u8; std::mem::size_of::<$ty>()];
                    buf.copy_from_slice(bytes);
                    <$ty>::from_ne_bytes(buf)
                }
            }
        )*
    };
}

impl_fixed!(u8, u16, u32, u64, i8, i16, i32, i64, f32, f64);

/// Owns the underlying reader and at most one byte read ahead of the
/// logical position.
///
/// The lookahead slot is filled only by [`peek`](Self::peek) and drained
/// by the first read that follows it, so the byte is never delivered twice
/// and never lost.
pub struct ByteSource<R> {
    reader: R,
    lookahead: Option<u8>,
}

impl<R: Read> ByteSource<R> {
    pub fn new(reader: R) -> Self {
        ByteSource {
            reader,
            lookahead: None,
        }
    }

    /// Returns the next unread byte without consuming it.
    ///
    /// Repeated calls return the same byte and never touch the reader again.
    pub fn peek(&mut self) -> Result<u8> {
        if let Some(byte) = self.lookahead {
            return Ok(byte);
        }
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        self.lookahead = Some(buf[0]);
        Ok(buf[0])
    }

    /// Fills `buf` completely, starting with the lookahead byte if one is
    /// buffered.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        match self.lookahead.take() {
            Some(byte) => {
                buf[0] = byte;
                self.fill(&mut buf[1..])
            }
            None => self.fill(buf),
        }
    }

    /// Reads exactly `len` bytes into a freshly allocated buffer.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; len];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// Reads `T::SIZE` bytes and reinterprets them in native byte order.
    pub fn read_fixed<T: Fixed>(&mut self) -> Result<T> {
        let mut buf = [0u8; 8];
        let bytes = &mut buf[..T::SIZE];
        self.read_exact(bytes)?;
        Ok(T::from_ne_slice(bytes))
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        self.read_fixed()
    }

    /// Number of bytes read from the reader but not yet handed out (0 or 1).
    pub fn buffered(&self) -> usize {
        usize::from(self.lookahead.is_some())
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    /// Returns the reader. A buffered lookahead byte is dropped with the
    /// source.
    pub fn into_inner(self) -> R {
        self.reader
    }

    // Loops over the reader directly; never looks at the lookahead slot.
    fn fill(&mut self, mut buf: &mut [u8]) -> Result<()> {
        while !buf.is_empty() {
            match self.reader.read(buf) {
                Ok(0) => {
                    return Err(MsgPackError::Io(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("stream ended with {} bytes still expected", buf.len()),
                    )));
                }
                Ok(n) => buf = &mut buf[n..],
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    trace!(remaining = buf.len(), "read interrupted, retrying");
                }
                Err(e) => return Err(MsgPackError::Io(e)),
            }
        }
        Ok(())
    }
}
