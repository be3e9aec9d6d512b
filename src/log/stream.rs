use std::io::{self, Read, Write};

use anyhow::bail;
use tracing::{trace, warn};

use crate::{
    encoding::{Header, RECORD_BASE_SIZE},
    error::RecordError,
    record::Record,
};

use super::ReaderConfig;

/// Appends packed records back to back onto `W`.
///
/// The writer knows nothing about files or segments; it only tracks how many
/// bytes it has written so that it can hand back each record's offset.
#[derive(Debug)]
pub struct LogWriter<W>
where
    W: Write,
{
    w: W,
    offset: u64,
    scratch: Vec<u8>,
    // Set once a write fails partway; the stream no longer ends at `offset`.
    poisoned: bool,
}

impl<W> LogWriter<W>
where
    W: Write,
{
    pub fn new(w: W) -> Self {
        Self::with_offset(w, 0)
    }

    /// For a writer positioned at the end of an existing log of `offset`
    /// bytes.
    pub fn with_offset(w: W, offset: u64) -> Self {
        LogWriter {
            w,
            offset,
            scratch: Vec::new(),
            poisoned: false,
        }
    }

    /// Writes `record` and returns the offset it starts at.
    ///
    /// If the underlying write fails, part of the record may already be in
    /// `W` and the writer no longer knows where the stream ends. Every later
    /// `append` fails, so the partial record stays the last thing in the log
    /// and a reader sees it as a truncated tail.
    pub fn append(&mut self, record: &Record) -> anyhow::Result<u64> {
        if self.poisoned {
            bail!(
                "log writer unusable after a failed write at offset {}",
                self.offset
            );
        }
        self.scratch.clear();
        record.pack_into(&mut self.scratch);
        if let Err(e) = self.w.write_all(&self.scratch) {
            self.poisoned = true;
            warn!(offset = self.offset, error = %e, "failed to append record");
            return Err(e.into());
        }

        let at = self.offset;
        self.offset += self.scratch.len() as u64;
        trace!(offset = at, len = self.scratch.len(), "appended record");
        Ok(at)
    }

    /// Offset the next record will be written at.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.w.flush()?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.w
    }

    pub fn into_inner(self) -> W {
        self.w
    }
}

/// Reads records back out of a log, yielding each one with its offset.
///
/// Iteration ends cleanly when the stream ends on a record boundary. Any
/// other problem (a torn tail, a header over the configured limits, a bad
/// checksum) is yielded once as an error wrapping [`RecordError`], after
/// which the reader is exhausted; [`LogReader::offset`] is then the end of
/// the last good record. Whether to truncate there or give up is the
/// caller's call.
#[derive(Debug)]
pub struct LogReader<R>
where
    R: Read,
{
    r: R,
    config: ReaderConfig,
    offset: u64,
    buf: Vec<u8>,
    done: bool,
}

impl<R> LogReader<R>
where
    R: Read,
{
    pub fn new(r: R) -> Self {
        Self::with_config(r, ReaderConfig::default())
    }

    pub fn with_config(r: R, config: ReaderConfig) -> Self {
        LogReader {
            r,
            config,
            offset: 0,
            buf: Vec::new(),
            done: false,
        }
    }

    /// End of the last record read successfully.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    pub fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn read_record(&mut self) -> anyhow::Result<Option<(u64, Record)>> {
        let start = self.offset;

        self.buf.clear();
        self.buf.resize(RECORD_BASE_SIZE, 0);
        let n = read_full(&mut self.r, &mut self.buf)?;
        if n == 0 {
            return Ok(None);
        }
        if n < RECORD_BASE_SIZE {
            warn!(offset = start, len = n, "log ends inside a record header");
            return Err(RecordError::TruncatedBuffer {
                needed: RECORD_BASE_SIZE as u64,
                available: n as u64,
            }
            .into());
        }

        let header = Header::read(&self.buf)?;
        if let Err(e) = self.config.check_header(&header) {
            warn!(offset = start, error = %e, "record header over limit");
            return Err(e.into());
        }

        // The buffer grows only as body bytes arrive, so a header declaring
        // more than the stream holds costs no more than what is there.
        let body_len = header.body_len();
        let n = (&mut self.r).take(body_len).read_to_end(&mut self.buf)? as u64;
        if n < body_len {
            warn!(
                offset = start,
                needed = header.record_len(),
                len = RECORD_BASE_SIZE as u64 + n,
                "log ends inside a record"
            );
            return Err(RecordError::TruncatedBuffer {
                needed: header.record_len(),
                available: RECORD_BASE_SIZE as u64 + n,
            }
            .into());
        }

        let record = Record::unpack(&self.buf)?;
        if self.config.verify_checksums {
            if let Err(e) = record.check() {
                warn!(offset = start, error = %e, "corrupt record");
                return Err(e.into());
            }
        }

        self.offset += header.record_len();
        trace!(
            offset = start,
            key_len = header.key_len,
            value_len = header.value_len,
            "read record"
        );
        Ok(Some((start, record)))
    }
}

impl<R> Iterator for LogReader<R>
where
    R: Read,
{
    type Item = anyhow::Result<(u64, Record)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.read_record() {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

// Like read_exact, but reports how much was read when the stream runs out.
fn read_full<R>(r: &mut R, buf: &mut [u8]) -> io::Result<usize>
where
    R: Read,
{
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
