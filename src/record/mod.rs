use std::time::{SystemTime, UNIX_EPOCH};

use crate::{
    encoding::{Decode, Encode, FieldReader, Header, RECORD_BASE_SIZE},
    error::{RecordError, Result},
};


/// The logical content of a record: the key, the value, and their lengths as
/// they appear in the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    key: Vec<u8>,
    value: Vec<u8>,
    key_len: u32,
    value_len: u32,
}

impl Meta {
    fn new(key: Vec<u8>, value: Vec<u8>) -> Result<Self> {
        if key.is_empty() {
            return Err(RecordError::InvalidRecord("key is empty"));
        }
        if value.is_empty() {
            return Err(RecordError::InvalidRecord("value is empty"));
        }
        let key_len = u32::try_from(key.len())
            .map_err(|_| RecordError::InvalidRecord("key longer than u32::MAX bytes"))?;
        let value_len = u32::try_from(value.len())
            .map_err(|_| RecordError::InvalidRecord("value longer than u32::MAX bytes"))?;
        Ok(Meta {
            key,
            value,
            key_len,
            value_len,
        })
    }

    pub fn key(&self) -> &[u8] {
        &self.key
    }

    pub fn value(&self) -> &[u8] {
        &self.value
    }

    pub fn key_len(&self) -> u32 {
        self.key_len
    }

    pub fn value_len(&self) -> u32 {
        self.value_len
    }
}

/// A single key/value entry as it is stored in a log: the payload plus a
/// CRC-32 of the value and the time it was created.
///
/// On disk a record is a 20 byte header followed by the key and then the
/// value:
///
/// ```text
/// | checksum u32 | timestamp u64 | key_len u32 | value_len u32 | key | value |
/// ```
///
/// The checksum covers the value only.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    meta: Meta,
    checksum: u32,
    timestamp: u64,
}

impl Record {
    /// Builds a record stamped with the current wall-clock time.
    pub fn new<K, V>(key: K, value: V) -> Result<Self>
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        Self::with_timestamp(key, value, now_nanos())
    }

    /// Builds a record with a caller-chosen timestamp, e.g. when compaction
    /// rewrites an entry and has to keep its original creation time.
    pub fn with_timestamp<K, V>(key: K, value: V, timestamp: u64) -> Result<Self>
    where
        K: Into<Vec<u8>>,
        V: Into<Vec<u8>>,
    {
        let meta = Meta::new(key.into(), value.into())?;
        let checksum = crc32fast::hash(&meta.value);
        Ok(Record {
            meta,
            checksum,
            timestamp,
        })
    }

    pub fn meta(&self) -> &Meta {
        &self.meta
    }

    pub fn key(&self) -> &[u8] {
        &self.meta.key
    }

    pub fn value(&self) -> &[u8] {
        &self.meta.value
    }

    pub fn key_len(&self) -> u32 {
        self.meta.key_len
    }

    pub fn value_len(&self) -> u32 {
        self.meta.value_len
    }

    pub fn checksum(&self) -> u32 {
        self.checksum
    }

    /// Nanoseconds since the Unix epoch.
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Gives up the record, returning the owned key and value.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.meta.key, self.meta.value)
    }

    pub fn header(&self) -> Header {
        Header {
            checksum: self.checksum,
            timestamp: self.timestamp,
            key_len: self.meta.key_len,
            value_len: self.meta.value_len,
        }
    }

    /// Exact length of [`Record::pack`]'s output.
    pub fn size(&self) -> usize {
        RECORD_BASE_SIZE + self.meta.key_len as usize + self.meta.value_len as usize
    }

    pub fn pack(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.size());
        self.write_bytes(&mut buf);
        debug_assert_eq!(buf.len(), self.size());
        buf
    }

    /// Appends the packed record to `buf`, leaving what is already there
    /// untouched.
    pub fn pack_into(&self, buf: &mut Vec<u8>) {
        buf.reserve(self.size());
        self.write_bytes(buf);
    }

    /// Decodes the record at the start of `buf`.
    ///
    /// The key and value are copied out, so the result does not borrow
    /// `buf`. Bytes past the end of the record are ignored. The checksum is
    /// not verified; see [`Record::check`] or [`Record::unpack_verified`].
    ///
    /// The lengths in the header decide how much gets allocated. Callers
    /// decoding untrusted bytes should bound them first, which
    /// [`crate::log::ReaderConfig::check_header`] does.
    pub fn unpack(buf: &[u8]) -> Result<Self> {
        let header = Header::read(buf)?;
        if (buf.len() as u64) < header.record_len() {
            return Err(RecordError::TruncatedBuffer {
                needed: header.record_len(),
                available: buf.len() as u64,
            });
        }
        Self::decode(&mut FieldReader::new(buf))
    }

    pub fn unpack_verified(buf: &[u8]) -> Result<Self> {
        let record = Self::unpack(buf)?;
        record.check()?;
        Ok(record)
    }

    /// Whether the stored checksum matches the value.
    pub fn verify(&self) -> bool {
        self.check().is_ok()
    }

    pub fn check(&self) -> Result<()> {
        let computed = crc32fast::hash(&self.meta.value);
        if computed != self.checksum {
            return Err(RecordError::ChecksumMismatch {
                stored: self.checksum,
                computed,
            });
        }
        Ok(())
    }
}

impl Encode for Record {
    fn write_bytes(&self, out: &mut Vec<u8>) {
        self.header().write_bytes(out);
        out.extend_from_slice(&self.meta.key);
        out.extend_from_slice(&self.meta.value);
    }
}

impl Decode for Record {
    fn decode(r: &mut FieldReader<'_>) -> Result<Self> {
        let header = Header::decode(r)?;
        let key = r.take(header.key_len as usize)?.to_vec();
        let value = r.take(header.value_len as usize)?.to_vec();
        debug_assert_eq!(key.len(), header.key_len as usize);
        debug_assert_eq!(value.len(), header.value_len as usize);

        // Lengths come from the header, not from the copies. A zero length
        // can't be produced by `Record::new`, but it still decodes.
        Ok(Record {
            meta: Meta {
                key,
                value,
                key_len: header.key_len,
                value_len: header.value_len,
            },
            checksum: header.checksum,
            timestamp: header.timestamp,
        })
    }
}

fn now_nanos() -> u64 {
    // A clock before 1970 stamps 0; one past 2554 saturates.
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| u64::try_from(d.as_nanos()).unwrap_or(u64::MAX))
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;
    use crate::encoding::{KEY_LEN_OFFSET, VALUE_LEN_OFFSET};

    #[test]
    fn rejects_empty_key_or_value() {
        assert_eq!(
            Record::new(b"".to_vec(), b"value".to_vec()),
            Err(RecordError::InvalidRecord("key is empty"))
        );
        assert_eq!(
            Record::new("k", ""),
            Err(RecordError::InvalidRecord("value is empty"))
        );
        assert!(matches!(
            Record::new("", ""),
            Err(RecordError::InvalidRecord(_))
        ));
    }

    #[test]
    fn new_fills_in_meta() -> anyhow::Result<()> {
        let r = Record::new("k", "value")?;
        assert_eq!(r.key(), b"k");
        assert_eq!(r.value(), b"value");
        assert_eq!(r.key_len(), 1);
        assert_eq!(r.value_len(), 5);
        assert_eq!(r.meta().key_len() as usize, r.meta().key().len());
        assert_eq!(r.meta().value_len() as usize, r.meta().value().len());
        assert_eq!(r.checksum(), 0x1d77_5834);
        assert!(r.timestamp() > 0);
        assert!(r.verify());
        Ok(())
    }

    #[test]
    fn timestamps_come_from_the_clock() -> anyhow::Result<()> {
        let before = now_nanos();
        let r = Record::new("k", "v")?;
        let after = now_nanos();
        assert!(before <= r.timestamp() && r.timestamp() <= after);
        Ok(())
    }

    #[test]
    fn round_trip() -> anyhow::Result<()> {
        let r = Record::new("k", "value")?;
        let buf = r.pack();
        assert_eq!(buf.len(), 26);

        let decoded = Record::unpack(&buf)?;
        assert_eq!(decoded, r);
        assert_eq!(decoded.key(), b"k");
        assert_eq!(decoded.value(), b"value");
        assert_eq!(decoded.checksum(), r.checksum());
        assert_eq!(decoded.timestamp(), r.timestamp());
        Ok(())
    }

    #[test]
    fn round_trip_binary_payloads() -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..100 {
            let key: Vec<u8> = (0..rng.gen_range(1..64)).map(|_| rng.gen()).collect();
            let value: Vec<u8> = (0..rng.gen_range(1..4096)).map(|_| rng.gen()).collect();
            let r = Record::with_timestamp(key.clone(), value.clone(), rng.gen())?;

            let buf = r.pack();
            assert_eq!(buf.len(), r.size());
            assert_eq!(r.size(), 20 + key.len() + value.len());

            let decoded = Record::unpack_verified(&buf)?;
            assert_eq!(decoded, r);
            assert_eq!(decoded.into_parts(), (key, value));
        }
        Ok(())
    }

    #[test]
    fn pack_is_deterministic() -> anyhow::Result<()> {
        let r = Record::with_timestamp("key", "value", 42)?;
        let same = Record::with_timestamp("key", "value", 42)?;
        assert_eq!(r.pack(), r.pack());
        assert_eq!(r.pack(), same.pack());
        Ok(())
    }

    #[test]
    fn pack_into_appends() -> anyhow::Result<()> {
        let a = Record::with_timestamp("a", "1", 1)?;
        let b = Record::with_timestamp("bb", "22", 2)?;
        let mut buf = Vec::new();
        a.pack_into(&mut buf);
        b.pack_into(&mut buf);
        assert_eq!(buf, [a.pack(), b.pack()].concat());

        assert_eq!(Record::unpack(&buf)?, a);
        assert_eq!(Record::unpack(&buf[a.size()..])?, b);
        Ok(())
    }

    #[test]
    fn unpack_ignores_trailing_bytes() -> anyhow::Result<()> {
        let r = Record::with_timestamp("k", "value", 7)?;
        let mut buf = r.pack();
        buf.extend(b"garbage");
        assert_eq!(Record::unpack(&buf)?, r);
        Ok(())
    }

    #[test]
    fn unpack_does_not_alias_input() -> anyhow::Result<()> {
        let r = Record::with_timestamp("k", "value", 7)?;
        let mut buf = r.pack();
        let decoded = Record::unpack(&buf)?;
        buf.iter_mut().for_each(|b| *b = 0);
        assert_eq!(decoded.key(), b"k");
        assert_eq!(decoded.value(), b"value");
        Ok(())
    }

    #[test]
    fn every_short_prefix_is_truncated() -> anyhow::Result<()> {
        let r = Record::with_timestamp("key", "value", 7)?;
        let buf = r.pack();
        for len in 0..buf.len() {
            let needed = if len < RECORD_BASE_SIZE {
                RECORD_BASE_SIZE
            } else {
                buf.len()
            };
            assert_eq!(
                Record::unpack(&buf[..len]),
                Err(RecordError::TruncatedBuffer {
                    needed: needed as u64,
                    available: len as u64,
                }),
                "prefix of length {}",
                len
            );
        }
        Ok(())
    }

    #[test]
    fn huge_declared_lengths_are_truncated() -> anyhow::Result<()> {
        let mut buf = Record::with_timestamp("k", "v", 0)?.pack();
        buf[KEY_LEN_OFFSET..VALUE_LEN_OFFSET].copy_from_slice(&u32::MAX.to_le_bytes());
        buf[VALUE_LEN_OFFSET..RECORD_BASE_SIZE].copy_from_slice(&u32::MAX.to_le_bytes());
        assert_eq!(
            Record::unpack(&buf),
            Err(RecordError::TruncatedBuffer {
                needed: 20 + 2 * u64::from(u32::MAX),
                available: 22,
            })
        );
        Ok(())
    }

    #[test]
    fn value_bit_flips_fail_verification() -> anyhow::Result<()> {
        let r = Record::with_timestamp("key", "some value bytes", 7)?;
        let buf = r.pack();
        let value_start = RECORD_BASE_SIZE + r.key().len();

        for bit in value_start * 8..buf.len() * 8 {
            let mut corrupt = buf.clone();
            corrupt[bit / 8] ^= 1 << (bit % 8);

            let decoded = Record::unpack(&corrupt)?;
            assert!(!decoded.verify(), "flip of bit {} went unnoticed", bit);
            assert_eq!(
                decoded.check(),
                Err(RecordError::ChecksumMismatch {
                    stored: r.checksum(),
                    computed: crc32fast::hash(decoded.value()),
                })
            );
            assert!(matches!(
                Record::unpack_verified(&corrupt),
                Err(RecordError::ChecksumMismatch { .. })
            ));
        }
        Ok(())
    }

    // The checksum covers the value only, so a damaged key decodes and
    // verifies cleanly.
    #[test]
    fn key_bit_flips_are_not_detected() -> anyhow::Result<()> {
        let r = Record::with_timestamp("key", "value", 7)?;
        let buf = r.pack();
        let key_range = RECORD_BASE_SIZE..RECORD_BASE_SIZE + r.key().len();

        for bit in key_range.start * 8..key_range.end * 8 {
            let mut corrupt = buf.clone();
            corrupt[bit / 8] ^= 1 << (bit % 8);

            let decoded = Record::unpack(&corrupt)?;
            assert_ne!(decoded.key(), r.key());
            assert!(decoded.verify());
        }
        Ok(())
    }

    #[test]
    fn random_value_corruption_is_detected() -> anyhow::Result<()> {
        let mut rng = rand::thread_rng();
        for _ in 0..200 {
            let value: Vec<u8> = (0..rng.gen_range(1..256)).map(|_| rng.gen()).collect();
            let r = Record::with_timestamp("k", value, 0)?;
            let mut buf = r.pack();
            let idx = rng.gen_range(RECORD_BASE_SIZE + 1..buf.len());
            buf[idx] ^= 1 << rng.gen_range(0..8_u32);

            assert!(!Record::unpack(&buf)?.verify());
        }
        Ok(())
    }
}
