//! Varint-friendly byte buffer primitives.
//!
//! All integers on the wire use LEB128-style unsigned varints: 7 data bits
//! per byte, high bit set on every byte except the last. Strings and payload
//! blobs are length-prefixed (varint length, then the raw bytes). [`Writer`]
//! builds outgoing frames, [`Reader`] walks incoming ones.

use crate::error::WireError;

/// Longest legal encoding of a u64: nine full bytes plus one final byte
/// that may only carry a single data bit.
const MAX_VARINT_LEN: usize = 10;

/// An append-only buffer for encoding wire fields.
#[derive(Debug, Default)]
pub struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Create an empty writer.
    pub fn new() -> Self {
        Self { buf: Vec::new() }
    }

    /// Create a writer with preallocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Consume the writer, returning the encoded bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Number of bytes written so far.
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Append a single raw byte.
    pub fn put_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    /// Append an unsigned varint.
    pub fn put_uvarint(&mut self, mut value: u64) {
        while value >= 0x80 {
            self.buf.push((value as u8 & 0x7f) | 0x80);
            value >>= 7;
        }
        self.buf.push(value as u8);
    }

    /// Append a length-prefixed byte blob.
    pub fn put_bytes(&mut self, bytes: &[u8]) {
        self.put_uvarint(bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    /// Append a length-prefixed UTF-8 string.
    pub fn put_string(&mut self, s: &str) {
        self.put_bytes(s.as_bytes());
    }
}

/// A cursor over a received frame.
#[derive(Debug)]
pub struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    /// Create a reader over a byte slice.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Current read position, in bytes from the start of the frame.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    /// Whether the frame is exhausted.
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    /// Read a single raw byte.
    pub fn get_u8(&mut self) -> Result<u8, WireError> {
        let byte = *self.buf.get(self.pos).ok_or(WireError::UnexpectedEof {
            needed: 1,
            position: self.pos,
        })?;
        self.pos += 1;
        Ok(byte)
    }

    /// Read an unsigned varint.
    ///
    /// Rejects encodings that overflow 64 bits, including a tenth byte
    /// carrying more than the single bit a u64 has room for.
    pub fn get_uvarint(&mut self) -> Result<u64, WireError> {
        let start = self.pos;
        let mut value: u64 = 0;
        for i in 0..MAX_VARINT_LEN {
            let byte = self.get_u8()?;
            if i == MAX_VARINT_LEN - 1 && byte > 0x01 {
                return Err(WireError::VarintOverflow { position: start });
            }
            value |= u64::from(byte & 0x7f) << (7 * i);
            if byte & 0x80 == 0 {
                return Ok(value);
            }
        }
        Err(WireError::VarintOverflow { position: start })
    }

    /// Read a length-prefixed byte blob.
    ///
    /// The declared length is checked against the remaining frame before
    /// anything is copied, so a corrupt prefix cannot trigger an oversized
    /// allocation.
    pub fn get_bytes(&mut self) -> Result<Vec<u8>, WireError> {
        let declared = self.get_uvarint()?;
        let remaining = self.remaining();
        if declared > remaining as u64 {
            return Err(WireError::LengthTooLong {
                declared,
                remaining,
            });
        }
        let len = declared as usize;
        let bytes = self.buf[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(bytes)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn get_string(&mut self) -> Result<String, WireError> {
        let bytes = self.get_bytes()?;
        String::from_utf8(bytes).map_err(|_| WireError::InvalidRoomName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: u64) -> u64 {
        let mut w = Writer::new();
        w.put_uvarint(value);
        let bytes = w.into_bytes();
        let mut r = Reader::new(&bytes);
        let decoded = r.get_uvarint().unwrap();
        assert!(r.is_empty(), "no trailing bytes for {value}");
        decoded
    }

    #[test]
    fn uvarint_single_byte_values() {
        assert_eq!(roundtrip(0), 0);
        assert_eq!(roundtrip(1), 1);
        assert_eq!(roundtrip(127), 127);
    }

    #[test]
    fn uvarint_multi_byte_values() {
        assert_eq!(roundtrip(128), 128);
        assert_eq!(roundtrip(300), 300);
        assert_eq!(roundtrip(1 << 21), 1 << 21);
        assert_eq!(roundtrip(u64::MAX), u64::MAX);
    }

    #[test]
    fn uvarint_known_encodings() {
        let mut w = Writer::new();
        w.put_uvarint(300);
        // 300 = 0b10_0101100 -> [0xac, 0x02]
        assert_eq!(w.into_bytes(), vec![0xac, 0x02]);

        let mut w = Writer::new();
        w.put_uvarint(127);
        assert_eq!(w.into_bytes(), vec![0x7f]);
    }

    #[test]
    fn uvarint_truncated_fails() {
        // Continuation bit set but no following byte.
        let mut r = Reader::new(&[0x80]);
        assert!(matches!(
            r.get_uvarint(),
            Err(WireError::UnexpectedEof { .. })
        ));
    }

    #[test]
    fn uvarint_overflow_fails() {
        // Eleven continuation bytes can never terminate inside 64 bits.
        let bytes = [0x80u8; 11];
        let mut r = Reader::new(&bytes);
        assert_eq!(
            r.get_uvarint(),
            Err(WireError::VarintOverflow { position: 0 })
        );
    }

    #[test]
    fn uvarint_overlong_tenth_byte_fails() {
        // Ten bytes where the last carries more than one data bit.
        let mut bytes = [0x80u8; 10];
        bytes[9] = 0x02;
        let mut r = Reader::new(&bytes);
        assert_eq!(
            r.get_uvarint(),
            Err(WireError::VarintOverflow { position: 0 })
        );
    }

    #[test]
    fn bytes_roundtrip() {
        let mut w = Writer::new();
        w.put_bytes(b"hello");
        w.put_bytes(b"");
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_bytes().unwrap(), b"hello");
        assert_eq!(r.get_bytes().unwrap(), b"");
        assert!(r.is_empty());
    }

    #[test]
    fn string_roundtrip() {
        let mut w = Writer::new();
        w.put_string("doc1");
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_string().unwrap(), "doc1");
    }

    #[test]
    fn string_rejects_invalid_utf8() {
        let mut w = Writer::new();
        w.put_bytes(&[0xff, 0xfe]);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.get_string(), Err(WireError::InvalidRoomName));
    }

    #[test]
    fn length_longer_than_frame_fails_before_copy() {
        let mut w = Writer::new();
        w.put_uvarint(1_000_000);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(
            r.get_bytes(),
            Err(WireError::LengthTooLong {
                declared: 1_000_000,
                remaining: 0,
            })
        );
    }

    #[test]
    fn reader_tracks_position() {
        let mut w = Writer::new();
        w.put_u8(0x07);
        w.put_uvarint(300);
        let bytes = w.into_bytes();

        let mut r = Reader::new(&bytes);
        assert_eq!(r.position(), 0);
        r.get_u8().unwrap();
        assert_eq!(r.position(), 1);
        r.get_uvarint().unwrap();
        assert_eq!(r.position(), 3);
        assert_eq!(r.remaining(), 0);
    }
}
