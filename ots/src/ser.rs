//! # Binary codec for OpenTimestamps proofs
//!
//! Proofs are made of three primitive encodings:
//!
//! - **bytes**: raw bytes whose length is known from context (digests,
//!   attestation tags, the header magic).
//! - **varuint**: an unsigned integer in little endian base 128, seven
//!   value bits per byte with the high bit as continuation flag.
//! - **varbytes**: a varuint length followed by that many bytes.
//!
//! The [`Deserializer`] reads from a borrowed byte slice and never panics:
//! every read is bounds checked and reports [`Error::UnexpectedEof`] with
//! the offset at which the input ran out.

use crate::error::Error;

/// Number of value bits stored in each varuint byte.
const BITS_PER_BYTE: u32 = 7;

/// Bit mask to extract the value bits from a varuint byte.
const LOWER_BITS_MASK: u8 = 0x7f;

/// Flag bit indicating that more varuint bytes follow.
const CONTINUATION_FLAG: u8 = 0x80;

/// Reads primitive values from a byte slice.
#[derive(Debug, Clone)]
pub struct Deserializer<'a> {
    bytes: &'a [u8],
    position: usize,
}

impl<'a> Deserializer<'a> {
    /// Create a new deserializer positioned at the start of `bytes`.
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, position: 0 }
    }

    /// The number of bytes consumed so far.
    pub fn position(&self) -> usize {
        self.position
    }

    /// The number of bytes left to read.
    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.position
    }

    /// Peek at the next byte without consuming it.
    pub fn peek_byte(&self) -> Option<u8> {
        self.bytes.get(self.position).copied()
    }

    /// Read a single byte.
    pub fn read_byte(&mut self) -> Result<u8, Error> {
        let byte = self.peek_byte().ok_or(Error::UnexpectedEof(self.position))?;
        self.position += 1;
        Ok(byte)
    }

    /// Read exactly `len` bytes.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self
            .position
            .checked_add(len)
            .filter(|end| *end <= self.bytes.len())
            .ok_or(Error::UnexpectedEof(self.bytes.len()))?;

        let slice = &self.bytes[self.position..end];
        self.position = end;
        Ok(slice)
    }

    /// Read a fixed size array.
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N], Error> {
        let mut array = [0u8; N];
        array.copy_from_slice(self.read_bytes(N)?);
        Ok(array)
    }

    /// Read a varuint.
    pub fn read_varuint(&mut self) -> Result<u64, Error> {
        let start = self.position;
        let mut value: u64 = 0;
        let mut shift: u32 = 0;

        loop {
            let byte = self.read_byte()?;
            let bits = (byte & LOWER_BITS_MASK) as u64;

            // The tenth byte may only carry the single remaining bit.
            if shift == 63 && bits > 1 {
                return Err(Error::VaruintOverflow(start));
            }
            value |= bits << shift;

            if byte & CONTINUATION_FLAG == 0 {
                return Ok(value);
            }

            shift += BITS_PER_BYTE;
            if shift > 63 {
                return Err(Error::VaruintOverflow(start));
            }
        }
    }

    /// Read a varbytes field whose length must fall within `min..=max`.
    pub fn read_varbytes(&mut self, min: usize, max: usize) -> Result<&'a [u8], Error> {
        let len = self.read_varuint()?;
        if len < min as u64 || len > max as u64 {
            return Err(Error::LengthOutOfRange { len, min, max });
        }
        // The cast is lossless since `len <= max`.
        self.read_bytes(len as usize)
    }

    /// Fail unless every byte has been consumed.
    pub fn finish(&self) -> Result<(), Error> {
        match self.remaining() {
            0 => Ok(()),
            n => Err(Error::TrailingBytes(n)),
        }
    }
}

/// Writes primitive values into a growable buffer.
#[derive(Debug, Default, Clone)]
pub struct Serializer {
    bytes: Vec<u8>,
}

impl Serializer {
    /// Create an empty serializer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a single byte.
    pub fn write_byte(&mut self, byte: u8) {
        self.bytes.push(byte);
    }

    /// Write raw bytes with no length prefix.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.bytes.extend_from_slice(bytes);
    }

    /// Write a varuint.
    pub fn write_varuint(&mut self, mut value: u64) {
        loop {
            let mut byte = (value & LOWER_BITS_MASK as u64) as u8;
            value >>= BITS_PER_BYTE;

            if value != 0 {
                byte |= CONTINUATION_FLAG;
            }
            self.bytes.push(byte);

            if value == 0 {
                break;
            }
        }
    }

    /// Write a varbytes field.
    pub fn write_varbytes(&mut self, bytes: &[u8]) {
        self.write_varuint(bytes.len() as u64);
        self.write_bytes(bytes);
    }

    /// Consume the serializer, returning the written bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}
