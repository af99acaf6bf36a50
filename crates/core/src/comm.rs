//! Classification of communication failures for the orchestrator and UI.
//!
//! The core never retries on its own. Errors are classified so the layer that
//! invoked the operation can decide between prompting a reconnect, surfacing a
//! permission hint, or simply showing the message.

use crate::error::Error;

/// Classification of communication errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Device is gone or the channel is closed, reconnect needed.
    Disconnected,
    /// Permission denied: likely missing udev rule or exclusive access.
    PermissionDenied,
    /// The transport rejected the report while the device stayed attached.
    Rejected,
    /// The request never reached the device (validation, missing capability).
    InvalidRequest,
}

impl ErrorClass {
    /// Classify an error for status display.
    pub fn classify(err: &Error) -> Self {
        match err {
            Error::DeviceNotFound(_) | Error::NotOpen | Error::RequestCancelled => {
                Self::Disconnected
            }
            Error::PermissionDenied(_) => Self::PermissionDenied,
            Error::Hid(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("disconnect")
                    || lower.contains("not found")
                    || lower.contains("no such device")
                    || lower.contains("removed")
                {
                    Self::Disconnected
                } else if lower.contains("permission")
                    || lower.contains("access denied")
                    || lower.contains("access is denied")
                {
                    Self::PermissionDenied
                } else {
                    Self::Rejected
                }
            }
            Error::Timeout(_) => Self::Rejected,
            Error::OutOfRange { .. }
            | Error::Invalid { .. }
            | Error::Unsupported(_)
            | Error::NoActiveDevice
            | Error::Config(_) => Self::InvalidRequest,
        }
    }

    /// Whether the device connection should be considered lost.
    pub fn is_connection_lost(&self) -> bool {
        matches!(self, Self::Disconnected)
    }
}

/// Device connection status for UI display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviceStatus {
    /// Device is connected and the last operation succeeded.
    Connected,
    /// No device is connected.
    #[default]
    Disconnected,
    /// Permission denied, needs driver or udev setup.
    PermissionError,
    /// Last transport operation failed but the device is still attached.
    Error,
}

impl DeviceStatus {
    /// Status to display after an operation failed with `err`.
    ///
    /// Validation failures never touched the device, so they leave `self` as is.
    pub fn after_error(self, err: &Error) -> Self {
        match ErrorClass::classify(err) {
            ErrorClass::Disconnected => Self::Disconnected,
            ErrorClass::PermissionDenied => Self::PermissionError,
            ErrorClass::Rejected => Self::Error,
            ErrorClass::InvalidRequest => self,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configurator::Capability;

    #[test]
    fn classify_permission_denied() {
        let err = Error::PermissionDenied("access denied".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::PermissionDenied);
        assert!(!ErrorClass::classify(&err).is_connection_lost());
    }

    #[test]
    fn classify_disconnect() {
        let err = Error::DeviceNotFound("Rival 310".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Disconnected);
        assert!(ErrorClass::classify(&err).is_connection_lost());
        assert_eq!(
            ErrorClass::classify(&Error::NotOpen),
            ErrorClass::Disconnected
        );
    }

    #[test]
    fn classify_hid_messages() {
        assert_eq!(
            ErrorClass::classify(&Error::Hid("device disconnect detected".into())),
            ErrorClass::Disconnected
        );
        assert_eq!(
            ErrorClass::classify(&Error::Hid("Access is denied".into())),
            ErrorClass::PermissionDenied
        );
        assert_eq!(
            ErrorClass::classify(&Error::Hid("write: broken pipe".into())),
            ErrorClass::Rejected
        );
    }

    #[test]
    fn timeout_leaves_device_attached() {
        let err = Error::Timeout("firmware version after 500 ms".into());
        assert_eq!(ErrorClass::classify(&err), ErrorClass::Rejected);
        assert_eq!(DeviceStatus::Connected.after_error(&err), DeviceStatus::Error);
    }

    #[test]
    fn classify_validation_failures() {
        let err = Error::OutOfRange {
            field: "dpi",
            value: 50,
            min: 100,
            max: 12000,
        };
        assert_eq!(ErrorClass::classify(&err), ErrorClass::InvalidRequest);
        assert_eq!(
            ErrorClass::classify(&Error::Unsupported(Capability::Dpi)),
            ErrorClass::InvalidRequest
        );
    }

    #[test]
    fn status_after_error() {
        let status = DeviceStatus::Connected;
        assert_eq!(
            status.after_error(&Error::Hid("report rejected".into())),
            DeviceStatus::Error
        );
        assert_eq!(
            status.after_error(&Error::DeviceNotFound("gone".into())),
            DeviceStatus::Disconnected
        );
        assert_eq!(
            status.after_error(&Error::PermissionDenied("udev".into())),
            DeviceStatus::PermissionError
        );
        assert_eq!(
            status.after_error(&Error::Invalid {
                field: "color",
                reason: "zone only supports red, green or blue".into()
            }),
            DeviceStatus::Connected
        );
    }
}
