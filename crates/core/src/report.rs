//! Numbered HID reports and the raw events a transport delivers.
//!
//! All device communication is an integer report ID plus an opaque byte
//! payload. The core never looks inside the payload; decoding belongs to the
//! device drivers.

/// HID report identifier.
pub type ReportId = u8;

/// A numbered report exchanged with the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    /// Report ID (0 for devices that do not number their reports).
    pub id: ReportId,
    /// Payload bytes, excluding the report ID.
    pub data: Vec<u8>,
}

impl Report {
    pub fn new(id: ReportId, data: impl Into<Vec<u8>>) -> Self {
        Self {
            id,
            data: data.into(),
        }
    }

    /// Split a raw buffer read from hidapi into ID and payload.
    ///
    /// hidapi prefixes the report ID only for devices with numbered reports.
    /// For unnumbered devices the whole buffer is payload and the ID is 0.
    pub fn from_raw(raw: &[u8], numbered: bool) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        if numbered {
            Some(Self::new(raw[0], &raw[1..]))
        } else {
            Some(Self::new(0, raw))
        }
    }

    /// Encode as the buffer hidapi expects for writes: `[id, data..]`.
    pub fn to_raw(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.data.len() + 1);
        buf.push(self.id);
        buf.extend_from_slice(&self.data);
        buf
    }
}

/// Raw event emitted by a transport's event source.
///
/// Only [`RawEvent::InputReport`] is dispatched to device drivers. Every other
/// kind, including ones added later, is dropped by the configurator.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RawEvent {
    /// An input report arrived from the device.
    InputReport(Report),
    /// The transport lost the device.
    Disconnect,
    /// A platform event the core has no meaning for.
    Unknown(String),
}
