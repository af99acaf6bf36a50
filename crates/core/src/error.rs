//! Error types for mousecfg-core.

use crate::configurator::Capability;
use thiserror::Error;

/// Core library error type.
#[derive(Debug, Error)]
pub enum Error {
    /// HID transport failure (open, close, or a rejected report).
    #[error("HID error: {0}")]
    Hid(String),

    /// Device not found or removed.
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Permission denied (udev rules, exclusive access on Windows).
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// A report was sent while the transport is closed.
    #[error("transport is not open")]
    NotOpen,

    /// Value out of the range the device advertises.
    #[error("value out of range: {field} = {value} (allowed {min}..={max})")]
    OutOfRange {
        field: &'static str,
        value: u32,
        min: u32,
        max: u32,
    },

    /// Argument rejected by validation before reaching the device.
    #[error("invalid {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The active device has no such capability family.
    #[error("capability not supported by this device: {0}")]
    Unsupported(Capability),

    /// No configurator is currently active.
    #[error("no active device")]
    NoActiveDevice,

    /// A correlated request was abandoned because the configurator closed.
    #[error("request cancelled before the device answered")]
    RequestCancelled,

    /// The device did not answer in time.
    #[error("timeout: {0}")]
    Timeout(String),

    /// Configuration file could not be read or is invalid.
    #[error("config error: {0}")]
    Config(String),
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, Error>;
