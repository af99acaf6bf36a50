//! RGB lighting: zones, colors, the LED capability, and the shared
//! multi-zone fan-out.

use crate::error::{Error, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

/// Independently addressable lighting regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum LedZone {
    All,
    Logo,
    Wheel,
    Front,
    Side,
    Bottom,
}

impl LedZone {
    pub const ALL: &'static [LedZone] = &[
        LedZone::All,
        LedZone::Logo,
        LedZone::Wheel,
        LedZone::Front,
        LedZone::Side,
        LedZone::Bottom,
    ];

    /// Human-readable label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::All => "All",
            Self::Logo => "Logo",
            Self::Wheel => "Wheel",
            Self::Front => "Front",
            Self::Side => "Side",
            Self::Bottom => "Bottom",
        }
    }

    /// Parse a zone name (case-insensitive).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "all" => Some(Self::All),
            "logo" => Some(Self::Logo),
            "wheel" | "scroll" | "scroll-wheel" => Some(Self::Wheel),
            "front" => Some(Self::Front),
            "side" | "sides" => Some(Self::Side),
            "bottom" | "underglow" => Some(Self::Bottom),
            _ => None,
        }
    }
}

impl std::fmt::Display for LedZone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which colors a zone can show.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LedColorRange {
    /// The zone has no configurable color.
    None,
    /// Only pure red, green, or blue (or off).
    SimpleRgb,
    /// Full 24-bit color space.
    AllColors,
}

impl LedColorRange {
    /// Whether a zone with this range can display `color`.
    pub fn accepts(&self, color: Color) -> bool {
        match self {
            Self::None => false,
            Self::SimpleRgb => [Color::OFF, Color::RED, Color::GREEN, Color::BLUE].contains(&color),
            Self::AllColors => true,
        }
    }
}

/// Lighting effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum LedMode {
    Off,
    #[default]
    Static,
    Breathing,
    ColorShift,
}

impl LedMode {
    pub const ALL: &'static [LedMode] = &[
        LedMode::Off,
        LedMode::Static,
        LedMode::Breathing,
        LedMode::ColorShift,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "off" | "none" => Some(Self::Off),
            "static" | "solid" | "fixed" => Some(Self::Static),
            "breathing" | "breathe" => Some(Self::Breathing),
            "color-shift" | "colorshift" | "cycle" => Some(Self::ColorShift),
            _ => None,
        }
    }
}

/// 24-bit RGB color.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Color {
    pub red: u8,
    pub green: u8,
    pub blue: u8,
}

impl Color {
    pub const OFF: Color = Color::new(0, 0, 0);
    pub const RED: Color = Color::new(255, 0, 0);
    pub const GREEN: Color = Color::new(0, 255, 0);
    pub const BLUE: Color = Color::new(0, 0, 255);

    pub const fn new(red: u8, green: u8, blue: u8) -> Self {
        Self { red, green, blue }
    }

    /// Parse `"r,g,b"` (decimal) or `"#rrggbb"` (hex).
    pub fn parse(s: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Invalid {
            field: "color",
            reason: format!("{reason}: {s:?}"),
        };
        let s = s.trim();

        if let Some(hex) = s.strip_prefix('#') {
            if hex.len() != 6 || !hex.is_ascii() {
                return Err(invalid("expected #rrggbb"));
            }
            let channel = |i: usize| {
                u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid("bad hex digit"))
            };
            return Ok(Self::new(channel(0)?, channel(2)?, channel(4)?));
        }

        let parts: Vec<&str> = s.split(',').map(str::trim).collect();
        if parts.len() != 3 {
            return Err(invalid("expected r,g,b"));
        }
        let mut channels = [0u8; 3];
        for (slot, part) in channels.iter_mut().zip(&parts) {
            *slot = part.parse().map_err(|_| invalid("channel must be 0-255"))?;
        }
        Ok(Self::new(channels[0], channels[1], channels[2]))
    }
}

impl std::fmt::Display for Color {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
    }
}

/// Color and effect of one zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedState {
    pub color: Color,
    pub mode: LedMode,
}

/// A zone as presented for selection: its range and current color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoneSelection {
    pub zone: LedZone,
    pub color_range: LedColorRange,
    pub color: Color,
}

/// Zones a device has and the color range of each.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LedCapabilities {
    zones: BTreeMap<LedZone, LedColorRange>,
}

impl LedCapabilities {
    pub fn new(zones: impl IntoIterator<Item = (LedZone, LedColorRange)>) -> Self {
        Self {
            zones: zones.into_iter().collect(),
        }
    }

    pub fn range(&self, zone: LedZone) -> Option<LedColorRange> {
        self.zones.get(&zone).copied()
    }

    /// Declared zones in enumeration order.
    pub fn zones(&self) -> impl Iterator<Item = LedZone> + '_ {
        self.zones.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (LedZone, LedColorRange)> + '_ {
        self.zones.iter().map(|(z, r)| (*z, *r))
    }

    pub fn len(&self) -> usize {
        self.zones.len()
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Per-zone lighting a driver tracks locally.
///
/// Drivers update it before sending a change so readers see the new value
/// while the report is still in flight.
#[derive(Debug, Default)]
pub struct LedStateCache {
    zones: Mutex<BTreeMap<LedZone, LedState>>,
}

impl LedStateCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, zone: LedZone, state: LedState) {
        self.zones
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(zone, state);
    }

    pub fn get(&self, zone: LedZone) -> Option<LedState> {
        self.zones
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&zone)
            .copied()
    }
}

/// RGB lighting control. A device implements all of it or none of it.
#[async_trait]
pub trait LedCapability: Send + Sync {
    /// Zones and color ranges this device supports.
    fn led_capabilities(&self) -> LedCapabilities;

    /// Ask the device for the current state of one zone.
    ///
    /// The answer arrives later as `ConfiguratorEvent::LedStateReceived`.
    async fn led_for_zone(&self, zone: LedZone) -> Result<()>;

    /// Change one zone. The tracked state updates before the report is sent.
    async fn set_led(&self, color: Color, zone: LedZone, mode: LedMode) -> Result<()>;

    /// Locally tracked state of a zone.
    fn led_state(&self, zone: LedZone) -> Option<LedState>;

    /// Request the state of every declared zone.
    async fn request_current_led_config(&self) -> Result<()> {
        let capabilities = self.led_capabilities();
        default_request_current_led_config(&capabilities, |zone| self.led_for_zone(zone)).await
    }
}

/// Fetch every declared zone concurrently and join on the result.
///
/// One `fetch` per zone is started before any is awaited. Completes once all
/// succeed; the first failure fails the whole operation. Completion order
/// across zones is unspecified.
pub async fn default_request_current_led_config<F, Fut>(
    capabilities: &LedCapabilities,
    fetch: F,
) -> Result<()>
where
    F: Fn(LedZone) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let zones: Vec<LedZone> = capabilities.zones().collect();
    debug!(zones = ?zones, "Requesting LED state for all zones");
    try_join_all(zones.into_iter().map(fetch)).await?;
    Ok(())
}
