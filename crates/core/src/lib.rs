//! mousecfg-core: device configurators for HID gaming mice.
//!
//! This crate provides the cross-platform core: a report-based transport
//! over hidapi, a configurator that dispatches input reports to device
//! drivers, capability traits for lighting, DPI, buttons and onboard
//! profiles, and the built-in SteelSeries drivers.

pub mod buttons;
pub mod comm;
pub mod config;
pub mod configurator;
pub mod device;
pub mod devices;
pub mod dpi;
pub mod error;
pub mod event;
pub mod led;
pub mod manager;
pub mod pending;
pub mod profile;
pub mod report;
pub mod rgb_profile;
pub mod safety;
pub mod transport;

/// SteelSeries USB Vendor ID.
pub const STEELSERIES_VID: u16 = 0x1038;

/// Product IDs of the built-in drivers.
pub mod pids {
    /// Rival 310.
    pub const RIVAL_310: u16 = 0x1720;
    /// Kana v2.
    pub const KANA_V2: u16 = 0x137A;
}
