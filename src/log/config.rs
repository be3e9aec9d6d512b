use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    encoding::Header,
    error::{RecordError, Result},
};

/// Bounds applied by [`super::LogReader`] to every header before the body is
/// allocated.
///
/// A corrupt or hostile length field can declare up to 4 GiB each for the
/// key and the value; these limits are the guard against that.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    pub max_key_len: u32,
    pub max_value_len: u32,
    pub verify_checksums: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        ReaderConfig {
            max_key_len: 64 << 10,
            max_value_len: 64 << 20,
            verify_checksums: true,
        }
    }
}

impl ReaderConfig {
    /// Accepts any length the layout can carry.
    pub fn unbounded() -> Self {
        ReaderConfig {
            max_key_len: u32::MAX,
            max_value_len: u32::MAX,
            ..Self::default()
        }
    }

    pub fn from_json(s: &str) -> anyhow::Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn load<P>(path: P) -> anyhow::Result<Self>
    where
        P: AsRef<Path>,
    {
        let contents = fs::read_to_string(path)?;
        Self::from_json(contents.as_str())
    }

    pub fn check_header(&self, header: &Header) -> Result<()> {
        if header.key_len > self.max_key_len {
            return Err(RecordError::LengthLimitExceeded {
                field: "key",
                len: header.key_len,
                limit: self.max_key_len,
            });
        }
        if header.value_len > self.max_value_len {
            return Err(RecordError::LengthLimitExceeded {
                field: "value",
                len: header.value_len,
                limit: self.max_value_len,
            });
        }
        Ok(())
    }
}
