//! SteelSeries-style report codec shared by the built-in drivers.
//!
//! Every command is a numbered output report with a short payload. Queries
//! are answered with an input report carrying the same ID.
//!
//! | ID            | Direction | Payload                         |
//! |---------------|-----------|---------------------------------|
//! | `0x03`        | out       | `[level, cpi_hi, cpi_lo]`       |
//! | `0x04`        | out       | `[count, (cpi_hi, cpi_lo)*]`    |
//! | `0x10`        | out / in  | `[]` / `[minor, major]`         |
//! | `0x13`        | out / in  | `[]` / `[count, (cpi_hi, cpi_lo)*]` |
//! | `0x20 + zone` | out       | `[mode, r, g, b]`               |
//! | `0x28`        | out / in  | `[zone]` / `[zone, mode, r, g, b]` |
//! | `0x31`        | out       | `[button, kind, value]`         |
//! | `0x32`        | out / in  | `[]` / `[button, kind, value]` per button |
//! | `0x40`        | feature / in | `[profile]`                  |

use crate::buttons::{BindTarget, MouseButtonPosition};
use crate::configurator::DeviceLink;
use crate::dpi::DpiLevels;
use crate::error::{Error, Result};
use crate::event::{ConfiguratorEvent, FirmwareVersion};
use crate::led::{
    Color, LedCapabilities, LedCapability, LedMode, LedState, LedStateCache, LedZone,
};
use crate::pending::RequestKey;
use crate::report::{Report, ReportId};
use crate::safety;
use async_trait::async_trait;
use tracing::{debug, trace};

/// Report IDs.
pub mod ids {
    use crate::report::ReportId;

    pub const DPI_SET_LEVEL: ReportId = 0x03;
    pub const DPI_SET_ALL: ReportId = 0x04;
    pub const FIRMWARE: ReportId = 0x10;
    pub const DPI_GET: ReportId = 0x13;
    /// First LED set report; the zone code is added to it.
    pub const LED_SET_BASE: ReportId = 0x20;
    pub const LED_GET: ReportId = 0x28;
    pub const BUTTON_SET: ReportId = 0x31;
    pub const BUTTON_GET: ReportId = 0x32;
    pub const PROFILE: ReportId = 0x40;
}

/* Button kinds */
const BUTTON_OFF: u8 = 0x00;
const BUTTON_MOUSE: u8 = 0x01;
const BUTTON_KEY: u8 = 0x10;
const BUTTON_MACRO: u8 = 0x20;
const BUTTON_RES_CYCLE: u8 = 0x30;

/* Resolution cycle directions */
const RES_CYCLE: u8 = 0x00;
const RES_UP: u8 = 0x01;
const RES_DOWN: u8 = 0x02;

pub const FIRMWARE_REQUEST: RequestKey = RequestKey::new(ids::FIRMWARE);

pub fn zone_code(zone: LedZone) -> u8 {
    match zone {
        LedZone::All => 0x00,
        LedZone::Logo => 0x01,
        LedZone::Wheel => 0x02,
        LedZone::Front => 0x03,
        LedZone::Side => 0x04,
        LedZone::Bottom => 0x05,
    }
}

pub fn zone_from_code(code: u8) -> Option<LedZone> {
    LedZone::ALL.iter().copied().find(|z| zone_code(*z) == code)
}

/// Report that sets the color of `zone`.
pub fn led_set_report(zone: LedZone) -> ReportId {
    ids::LED_SET_BASE + zone_code(zone)
}

pub fn mode_code(mode: LedMode) -> u8 {
    match mode {
        LedMode::Off => 0x00,
        LedMode::Static => 0x01,
        LedMode::Breathing => 0x02,
        LedMode::ColorShift => 0x03,
    }
}

pub fn mode_from_code(code: u8) -> Option<LedMode> {
    LedMode::ALL.iter().copied().find(|m| mode_code(*m) == code)
}

pub fn encode_led(mode: LedMode, color: Color) -> [u8; 4] {
    [mode_code(mode), color.red, color.green, color.blue]
}

/// `[zone, mode, r, g, b]`
pub fn decode_led_state(data: &[u8]) -> Option<(LedZone, LedState)> {
    let &[zone, mode, red, green, blue, ..] = data else {
        return None;
    };
    Some((
        zone_from_code(zone)?,
        LedState {
            color: Color::new(red, green, blue),
            mode: mode_from_code(mode)?,
        },
    ))
}

/// `[minor, major]`
pub fn decode_firmware(data: &[u8]) -> Option<FirmwareVersion> {
    let &[minor, major, ..] = data else {
        return None;
    };
    Some(FirmwareVersion { major, minor })
}

pub fn encode_dpi_level(level: u8, cpi: u16) -> [u8; 3] {
    let [hi, lo] = cpi.to_be_bytes();
    [level, hi, lo]
}

pub fn encode_dpi_levels(levels: &DpiLevels) -> Vec<u8> {
    let mut data = Vec::with_capacity(1 + levels.len() * 2);
    data.push(levels.len() as u8);
    for cpi in levels.as_slice() {
        data.extend_from_slice(&cpi.to_be_bytes());
    }
    data
}

/// `[count, (hi, lo)*]`
pub fn decode_dpi_levels(data: &[u8]) -> Option<DpiLevels> {
    let (&count, rest) = data.split_first()?;
    let count = count as usize;
    if rest.len() < count * 2 {
        return None;
    }
    let levels = rest[..count * 2]
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
        .collect::<Vec<_>>();
    Some(DpiLevels(levels))
}

pub fn encode_binding(position: MouseButtonPosition, target: BindTarget) -> [u8; 3] {
    let (kind, value) = match target {
        BindTarget::Disabled => (BUTTON_OFF, 0),
        BindTarget::Button(emulated) => (BUTTON_MOUSE, emulated.code()),
        BindTarget::Key(usage) => (BUTTON_KEY, usage),
        BindTarget::Macro(slot) => (BUTTON_MACRO, slot),
        BindTarget::DpiCycle => (BUTTON_RES_CYCLE, RES_CYCLE),
        BindTarget::DpiUp => (BUTTON_RES_CYCLE, RES_UP),
        BindTarget::DpiDown => (BUTTON_RES_CYCLE, RES_DOWN),
    };
    [position.code(), kind, value]
}

/// `[button, kind, value]`
pub fn decode_binding(data: &[u8]) -> Option<(MouseButtonPosition, BindTarget)> {
    let &[position, kind, value, ..] = data else {
        return None;
    };
    let position = MouseButtonPosition::from_code(position)?;
    let target = match (kind, value) {
        (BUTTON_OFF, _) => BindTarget::Disabled,
        (BUTTON_MOUSE, code) => BindTarget::Button(MouseButtonPosition::from_code(code)?),
        (BUTTON_KEY, usage) => BindTarget::Key(usage),
        (BUTTON_MACRO, slot) => BindTarget::Macro(slot),
        (BUTTON_RES_CYCLE, RES_CYCLE) => BindTarget::DpiCycle,
        (BUTTON_RES_CYCLE, RES_UP) => BindTarget::DpiUp,
        (BUTTON_RES_CYCLE, RES_DOWN) => BindTarget::DpiDown,
        _ => return None,
    };
    Some((position, target))
}

/// Firmware query handling shared by every driver.
///
/// A repeated request while one is outstanding is not resent, and a version
/// report that nobody asked for is dropped. A malformed answer still ends
/// the outstanding request.
pub(crate) async fn request_firmware(link: &DeviceLink) -> Result<()> {
    link.send_correlated(FIRMWARE_REQUEST, ids::FIRMWARE, &[])
        .await
        .map(|_| ())
}

pub(crate) async fn query_firmware(link: &DeviceLink) -> Result<FirmwareVersion> {
    let report = link.request(FIRMWARE_REQUEST, ids::FIRMWARE, &[]).await?;
    decode_firmware(&report.data).ok_or_else(|| {
        Error::Hid(format!("malformed firmware report {:02X?}", report.data))
    })
}

pub(crate) fn handle_firmware(link: &DeviceLink, report: &Report) {
    let Some(version) = decode_firmware(&report.data) else {
        debug!(
            data_hex = format_args!("{:02X?}", report.data),
            "Malformed firmware report"
        );
        link.resolve(FIRMWARE_REQUEST, report);
        return;
    };
    if !link.resolve(FIRMWARE_REQUEST, report) {
        debug!(%version, "Dropping unsolicited firmware report");
        return;
    }
    debug!(%version, "Firmware version received");
    link.emit(ConfiguratorEvent::FirmwareVersionReceived(version));
}

/// Lighting control for SteelSeries devices.
pub(crate) struct SteelSeriesLed {
    link: DeviceLink,
    zones: LedCapabilities,
    state: LedStateCache,
}

impl SteelSeriesLed {
    pub(crate) fn new(link: DeviceLink, zones: LedCapabilities) -> Self {
        Self {
            link,
            zones,
            state: LedStateCache::new(),
        }
    }

    /// Apply an `LED_GET` answer.
    pub(crate) fn handle_state(&self, report: &Report) {
        let Some((zone, state)) = decode_led_state(&report.data) else {
            debug!(data_hex = format_args!("{:02X?}", report.data), "Malformed LED report");
            return;
        };
        if self.zones.range(zone).is_none() {
            trace!(%zone, "LED report for undeclared zone");
            return;
        }
        self.state.update(zone, state);
        self.link.emit(ConfiguratorEvent::LedStateReceived { zone, state });
    }
}

#[async_trait]
impl LedCapability for SteelSeriesLed {
    fn led_capabilities(&self) -> LedCapabilities {
        self.zones.clone()
    }

    async fn led_for_zone(&self, zone: LedZone) -> Result<()> {
        if self.zones.range(zone).is_none() {
            return Err(Error::Invalid {
                field: "zone",
                reason: format!("{zone} is not a lighting zone on this device"),
            });
        }
        self.link.send_report(ids::LED_GET, &[zone_code(zone)]).await
    }

    async fn set_led(&self, color: Color, zone: LedZone, mode: LedMode) -> Result<()> {
        safety::validate_led(&self.zones, zone, color)?;
        self.state.update(zone, LedState { color, mode });
        self.link
            .send_report(led_set_report(zone), &encode_led(mode, color))
            .await
    }

    fn led_state(&self, zone: LedZone) -> Option<LedState> {
        self.state.get(zone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zone_codes_roundtrip() {
        for zone in LedZone::ALL {
            assert_eq!(zone_from_code(zone_code(*zone)), Some(*zone));
        }
        assert_eq!(zone_from_code(0x09), None);
        assert_eq!(led_set_report(LedZone::Logo), 0x21);
        assert_eq!(led_set_report(LedZone::Wheel), 0x22);
    }

    #[test]
    fn encode_led_payload() {
        assert_eq!(
            encode_led(LedMode::Static, Color::RED),
            [0x01, 0xFF, 0x00, 0x00]
        );
        assert_eq!(
            encode_led(LedMode::Breathing, Color::new(1, 2, 3)),
            [0x02, 1, 2, 3]
        );
    }

    #[test]
    fn decode_led_state_report() {
        let (zone, state) = decode_led_state(&[0x02, 0x03, 0x00, 0x00, 0xFF]).unwrap();
        assert_eq!(zone, LedZone::Wheel);
        assert_eq!(state.color, Color::BLUE);
        assert_eq!(state.mode, LedMode::ColorShift);
    }

    #[test]
    fn decode_led_state_rejects_malformed() {
        assert!(decode_led_state(&[0x01, 0x01, 0xFF]).is_none());
        assert!(decode_led_state(&[0x0F, 0x01, 0, 0, 0]).is_none());
        assert!(decode_led_state(&[0x01, 0x09, 0, 0, 0]).is_none());
    }

    #[test]
    fn decode_firmware_minor_major() {
        assert_eq!(
            decode_firmware(&[0x1B, 0x01]),
            Some(FirmwareVersion { major: 1, minor: 27 })
        );
        assert_eq!(decode_firmware(&[0x01]), None);
    }

    #[test]
    fn encode_dpi_payloads() {
        assert_eq!(encode_dpi_level(1, 1600), [0x01, 0x06, 0x40]);
        assert_eq!(
            encode_dpi_levels(&DpiLevels::new([800, 3200])),
            vec![0x02, 0x03, 0x20, 0x0C, 0x80]
        );
    }

    #[test]
    fn decode_dpi_levels_report() {
        assert_eq!(
            decode_dpi_levels(&[0x02, 0x03, 0x20, 0x0C, 0x80, 0x00]),
            Some(DpiLevels::new([800, 3200]))
        );
        assert_eq!(decode_dpi_levels(&[0x02, 0x03, 0x20]), None);
        assert_eq!(decode_dpi_levels(&[]), None);
    }

    #[test]
    fn binding_codec() {
        let back = MouseButtonPosition::Back;
        assert_eq!(encode_binding(back, BindTarget::Key(0x04)), [0x04, 0x10, 0x04]);
        assert_eq!(encode_binding(back, BindTarget::DpiDown), [0x04, 0x30, 0x02]);
        assert_eq!(encode_binding(back, BindTarget::Disabled), [0x04, 0x00, 0x00]);

        for target in [
            BindTarget::Button(MouseButtonPosition::Middle),
            BindTarget::Macro(3),
            BindTarget::DpiUp,
            BindTarget::DpiCycle,
        ] {
            assert_eq!(decode_binding(&encode_binding(back, target)), Some((back, target)));
        }
    }

    #[test]
    fn decode_binding_rejects_unknown() {
        assert_eq!(decode_binding(&[0x09, 0x00, 0x00]), None);
        assert_eq!(decode_binding(&[0x01, 0x77, 0x00]), None);
        assert_eq!(decode_binding(&[0x01, 0x30, 0x09]), None);
        assert_eq!(decode_binding(&[0x01]), None);
    }
}
