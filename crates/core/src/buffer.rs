//! Byte buffer used for card data, key material and APDU payloads
//!
//! [`Buffer`] wraps [`Bytes`] so clones are cheap and slices share storage.
//! Every operation returns a new buffer; the contents are never mutated in
//! place once built.

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};
use derive_more::{Deref, From};

use crate::{Error, Result};

/// Immutable byte sequence with slicing, concatenation and hex conversions
#[derive(Clone, Default, PartialEq, Eq, Hash, Deref, From)]
pub struct Buffer(Bytes);

impl Buffer {
    /// Create an empty buffer
    pub const fn new() -> Self {
        Self(Bytes::new())
    }

    /// Create a buffer from a static slice without copying
    pub const fn from_static(data: &'static [u8]) -> Self {
        Self(Bytes::from_static(data))
    }

    /// Create a buffer by copying a slice
    pub fn copy_from_slice(data: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(data))
    }

    /// Decode a hex string, ignoring whitespace and an optional `0x` prefix
    pub fn from_hex(text: &str) -> Result<Self> {
        let cleaned: String = text
            .trim()
            .trim_start_matches("0x")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        Ok(Self(hex::decode(cleaned)?.into()))
    }

    /// Return `len` bytes starting at `offset`
    ///
    /// Fails when the range extends past the end of the buffer.
    pub fn substr(&self, offset: usize, len: usize) -> Result<Self> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= self.0.len())
            .ok_or(Error::OutOfRange { offset, len, size: self.0.len() })?;
        Ok(Self(self.0.slice(offset..end)))
    }

    /// Byte at `index`, if present
    pub fn at(&self, index: usize) -> Option<u8> {
        self.0.get(index).copied()
    }

    /// Return a new buffer holding `self` followed by `other`
    pub fn concat(&self, other: &[u8]) -> Self {
        let mut buf = BytesMut::with_capacity(self.0.len() + other.len());
        buf.put_slice(&self.0);
        buf.put_slice(other);
        Self(buf.freeze())
    }

    /// Return a new buffer with `byte` appended
    pub fn push(&self, byte: u8) -> Self {
        self.concat(&[byte])
    }

    /// Concatenate several slices into a single buffer
    pub fn join<'a>(parts: impl IntoIterator<Item = &'a [u8]>) -> Self {
        let mut buf = BytesMut::new();
        for part in parts {
            buf.put_slice(part);
        }
        Self(buf.freeze())
    }

    /// Upper-case hex with every byte prefixed by `0x` and separated by spaces
    pub fn to_hex_string(&self) -> String {
        self.0
            .iter()
            .map(|b| format!("0x{b:02X}"))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Upper-case hex without separators
    pub fn to_hex_plain(&self) -> String {
        hex::encode_upper(&self.0)
    }

    /// Borrow the underlying bytes
    pub const fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    /// Consume the buffer and return the underlying bytes
    pub fn into_bytes(self) -> Bytes {
        self.0
    }
}

impl From<Vec<u8>> for Buffer {
    fn from(data: Vec<u8>) -> Self {
        Self(data.into())
    }
}

impl From<&[u8]> for Buffer {
    fn from(data: &[u8]) -> Self {
        Self::copy_from_slice(data)
    }
}

impl<const N: usize> From<[u8; N]> for Buffer {
    fn from(data: [u8; N]) -> Self {
        Self::copy_from_slice(&data)
    }
}

impl From<Buffer> for Bytes {
    fn from(buffer: Buffer) -> Self {
        buffer.0
    }
}

impl AsRef<[u8]> for Buffer {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Buffer({})", self.to_hex_plain())
    }
}

impl fmt::Display for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex_plain())
    }
}
