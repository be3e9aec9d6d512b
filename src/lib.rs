//! The record format of a log-structured key-value store.
//!
//! A [`Record`] is one key/value entry plus a CRC-32 of the value and a
//! creation timestamp. [`Record::pack`] and [`Record::unpack`] convert it to
//! and from the byte layout every log segment uses; [`log`] reads and writes
//! runs of them on a stream.

pub mod encoding;
pub mod error;
pub mod log;
pub mod record;

pub use encoding::{Header, RECORD_BASE_SIZE};
pub use error::{RecordError, Result};
pub use log::{LogReader, LogWriter, ReaderConfig};
pub use record::{Meta, Record};
