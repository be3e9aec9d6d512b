use crate::error::{RecordError, Result};

// Field widths of the fixed record header. Every multi-byte integer is
// little-endian.
pub const CHECKSUM_LEN: usize = 4;
pub const TIMESTAMP_LEN: usize = 8;
pub const KEY_LEN_LEN: usize = 4;
pub const VALUE_LEN_LEN: usize = 4;

pub const CHECKSUM_OFFSET: usize = 0;
pub const TIMESTAMP_OFFSET: usize = CHECKSUM_OFFSET + CHECKSUM_LEN;
pub const KEY_LEN_OFFSET: usize = TIMESTAMP_OFFSET + TIMESTAMP_LEN;
pub const VALUE_LEN_OFFSET: usize = KEY_LEN_OFFSET + KEY_LEN_LEN;

/// Size of the fixed header, and the offset the key starts at.
pub const RECORD_BASE_SIZE: usize = VALUE_LEN_OFFSET + VALUE_LEN_LEN;

pub trait Encode: std::fmt::Debug {
    fn write_bytes(&self, out: &mut Vec<u8>);
}

pub trait Decode: Sized {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self>;
}

/// Cursor over a borrowed buffer that hands out fields in order and never
/// reads past the end.
#[derive(Debug)]
pub struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        FieldReader { buf, pos: 0 }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if n > self.remaining() {
            return Err(RecordError::TruncatedBuffer {
                needed: self.pos as u64 + n as u64,
                available: self.buf.len() as u64,
            });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn take_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0_u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }
}

impl Encode for u32 {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend(self.to_le_bytes())
    }
}

impl Decode for u32 {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self::from_le_bytes(r.take_array()?))
    }
}

impl Encode for u64 {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        out.extend(self.to_le_bytes())
    }
}

impl Decode for u64 {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        Ok(Self::from_le_bytes(r.take_array()?))
    }
}

/// The fixed-size prefix of every record.
///
/// A scanner can read this alone to learn how long the record is, and
/// decide whether to accept the body, before allocating anything for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub checksum: u32,
    pub timestamp: u64,
    pub key_len: u32,
    pub value_len: u32,
}

impl Header {
    /// Reads a header from the start of `buf`. Bytes past the header are
    /// ignored.
    pub fn read(buf: &[u8]) -> Result<Self> {
        if buf.len() < RECORD_BASE_SIZE {
            return Err(RecordError::TruncatedBuffer {
                needed: RECORD_BASE_SIZE as u64,
                available: buf.len() as u64,
            });
        }
        Self::decode(&mut FieldReader::new(buf))
    }

    /// Length of the key and value that follow the header.
    pub fn body_len(&self) -> u64 {
        u64::from(self.key_len) + u64::from(self.value_len)
    }

    /// Length of the whole record this header starts.
    pub fn record_len(&self) -> u64 {
        RECORD_BASE_SIZE as u64 + self.body_len()
    }
}

impl Encode for Header {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.checksum.write_bytes(out);
        self.timestamp.write_bytes(out);
        self.key_len.write_bytes(out);
        self.value_len.write_bytes(out);
    }
}

impl Decode for Header {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let checksum = u32::decode(r)?;
        let timestamp = u64::decode(r)?;
        let key_len = u32::decode(r)?;
        let value_len = u32::decode(r)?;
        Ok(Header {
            checksum,
            timestamp,
            key_len,
            value_len,
        })
    }
}

#[test]
fn test_layout_offsets() {
    assert_eq!(TIMESTAMP_OFFSET, 4);
    assert_eq!(KEY_LEN_OFFSET, 12);
    assert_eq!(VALUE_LEN_OFFSET, 16);
    assert_eq!(RECORD_BASE_SIZE, 20);
}
