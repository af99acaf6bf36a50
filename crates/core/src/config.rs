//! Transport configuration.
//!
//! Loaded from a JSON file by front ends; every field has a default so an
//! empty object `{}` is a valid config.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Upper bound for a single HID input report buffer.
pub const MAX_READ_BUFFER_LEN: usize = 4096;

/// Settings for [`HidapiTransport`](crate::transport::HidapiTransport).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    /// How long the I/O thread blocks in one `read_timeout` call (ms).
    ///
    /// Writes are picked up between reads, so this bounds how long a queued
    /// write and `close()` wait for the I/O thread.
    pub read_timeout_ms: i32,
    /// Size of the buffer used for each input report read.
    pub read_buffer_len: usize,
    /// Whether the device prefixes input reports with a report ID.
    pub numbered_reports: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            read_timeout_ms: 50,
            read_buffer_len: 64,
            numbered_reports: true,
        }
    }
}

impl TransportConfig {
    /// Read and validate a config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the transport cannot work with.
    pub fn validate(&self) -> Result<()> {
        if self.read_timeout_ms <= 0 {
            return Err(Error::Config(format!(
                "read_timeout_ms must be positive, got {}",
                self.read_timeout_ms
            )));
        }
        if self.read_buffer_len < 2 || self.read_buffer_len > MAX_READ_BUFFER_LEN {
            return Err(Error::Config(format!(
                "read_buffer_len must be within 2..={MAX_READ_BUFFER_LEN}, got {}",
                self.read_buffer_len
            )));
        }
        Ok(())
    }
}
