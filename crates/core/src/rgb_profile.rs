//! View model of the RGB lighting pane.
//!
//! Lists the active device's zones, tracks which one is selected, offers
//! color presets suited to the zone, and turns a pick into an [`LedChange`]
//! for the manager to apply. Holds no rendering state.

use crate::led::{Color, LedCapabilities, LedColorRange, LedZone, ZoneSelection};
use tracing::debug;

/// A named color offered to the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColorPreset {
    pub name: &'static str,
    pub color: Color,
}

/// Presets offered for zones that accept color.
pub const PRESETS: [ColorPreset; 3] = [
    ColorPreset {
        name: "Red Hues",
        color: Color::RED,
    },
    ColorPreset {
        name: "Green Hues",
        color: Color::GREEN,
    },
    ColorPreset {
        name: "Blue Hues",
        color: Color::BLUE,
    },
];

/// A lighting change the user asked for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LedChange {
    pub zone: LedZone,
    pub color: Color,
}

#[derive(Debug, Clone, Default)]
pub struct RgbProfile {
    zones: Vec<ZoneSelection>,
    selected: Option<usize>,
    settings: Vec<ColorPreset>,
}

impl RgbProfile {
    /// Build the zone list from a device's LED descriptor.
    ///
    /// Zones start black. A device with exactly one zone has it selected.
    pub fn new(capabilities: Option<&LedCapabilities>) -> Self {
        let zones: Vec<ZoneSelection> = match capabilities {
            Some(caps) => caps
                .iter()
                .map(|(zone, color_range)| ZoneSelection {
                    zone,
                    color_range,
                    color: Color::OFF,
                })
                .collect(),
            None => {
                debug!("No lighting zones found");
                Vec::new()
            }
        };

        let mut profile = Self {
            zones,
            ..Self::default()
        };
        if profile.has_single_zone() {
            let zone = profile.zones[0].zone;
            profile.choose_zone(zone);
        }
        profile
    }

    pub fn zones(&self) -> &[ZoneSelection] {
        &self.zones
    }

    pub fn has_single_zone(&self) -> bool {
        self.zones.len() == 1
    }

    /// Select `zone` and refresh the presets. Returns false if it is not listed.
    pub fn choose_zone(&mut self, zone: LedZone) -> bool {
        let Some(index) = self.zones.iter().position(|z| z.zone == zone) else {
            return false;
        };
        self.selected = Some(index);
        self.settings = match self.zones[index].color_range {
            LedColorRange::None => Vec::new(),
            LedColorRange::SimpleRgb | LedColorRange::AllColors => PRESETS.to_vec(),
        };
        true
    }

    pub fn selected(&self) -> Option<&ZoneSelection> {
        self.selected.map(|i| &self.zones[i])
    }

    pub fn has_zone_selected(&self) -> bool {
        self.selected.is_some()
    }

    /// Presets for the selected zone.
    pub fn settings(&self) -> &[ColorPreset] {
        &self.settings
    }

    /// Set the selected zone's color and return the change to apply.
    ///
    /// The local color updates immediately, whether or not the device
    /// accepts it later.
    pub fn select_color(&mut self, color: Color) -> Option<LedChange> {
        let index = self.selected?;
        let zone = &mut self.zones[index];
        zone.color = color;
        Some(LedChange {
            zone: zone.zone,
            color,
        })
    }

    /// Pick one of the offered presets by name.
    pub fn select_preset(&mut self, name: &str) -> Option<LedChange> {
        let preset = self.settings.iter().find(|p| p.name == name).copied()?;
        self.select_color(preset.color)
    }
}
