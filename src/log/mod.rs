//! Framing for a sequence of records on a byte stream.
//!
//! Records are written back to back with no extra framing: each header says
//! how long its record is. Where the stream lives, and what happens after a
//! bad record, is up to the caller.

mod config;
mod stream;

pub use config::ReaderConfig;
pub use stream::{LogReader, LogWriter};
