//! Safety layer: validates all write parameters against what the device
//! advertises before anything is sent.
//!
//! Every setter in a driver calls into this module first, so an invalid
//! value never becomes a report.
//!
//! ## DPI
//! - CPI must lie within `DpiCapabilities::min..=max`
//! - Accepted values are rounded to the nearest `step` above `min`
//! - Level indices are `0..levels`; a full level list holds `1..=levels` entries
//!
//! ## LED
//! - The zone must be declared by the device
//! - `LedColorRange::None` zones accept no color at all
//! - `LedColorRange::SimpleRgb` zones accept only red, green, blue, or off
//!
//! ## Buttons
//! - The position must be programmable and accept the binding kind
//! - The target must belong to the binding kind
//! - Keystrokes must be a HID keyboard usage, macros an existing slot, and
//!   mouse targets a button the device can emulate
//!
//! ## Profiles
//! - Profile ids are `0..profile_count`

use crate::buttons::{
    BindTarget, ButtonBinding, ButtonsCapabilities, MouseButtonPosition, KEYSTROKE_USAGES,
};
use crate::dpi::{DpiCapabilities, DpiLevels};
use crate::error::{Error, Result};
use crate::led::{Color, LedColorRange, LedCapabilities, LedZone};

/// Disclaimer for user-facing output about device writes.
pub const WRITE_DISCLAIMER: &str = "\
WARNING: This software writes settings directly to your mouse's onboard memory. \
All writes are checked against the ranges the device advertises, but a firmware \
bug or an unexpected model revision could still leave the device misconfigured. \
Use at your own risk.";

/// Validate a CPI value and round it to the device's step.
pub fn validate_dpi(caps: &DpiCapabilities, cpi: u16) -> Result<u16> {
    if !caps.contains(cpi) {
        return Err(Error::OutOfRange {
            field: "dpi",
            value: cpi as u32,
            min: caps.min as u32,
            max: caps.max as u32,
        });
    }
    if caps.step <= 1 {
        return Ok(cpi);
    }
    // Round to nearest step, counted from the minimum
    let offset = (cpi - caps.min) as u32;
    let step = caps.step as u32;
    let rounded = caps.min as u32 + ((offset + step / 2) / step) * step;
    let clamped = rounded.clamp(caps.min as u32, caps.max as u32);
    Ok(clamped as u16)
}

/// Validate a 0-based DPI level index.
pub fn validate_dpi_level(caps: &DpiCapabilities, level: u8) -> Result<()> {
    if level >= caps.levels {
        return Err(Error::OutOfRange {
            field: "dpi_level",
            value: level as u32,
            min: 0,
            max: caps.levels.saturating_sub(1) as u32,
        });
    }
    Ok(())
}

/// Validate a full level list, returning it rounded to the step.
pub fn validate_dpi_levels(caps: &DpiCapabilities, levels: &DpiLevels) -> Result<DpiLevels> {
    if levels.is_empty() || levels.len() > caps.levels as usize {
        return Err(Error::OutOfRange {
            field: "dpi_level_count",
            value: levels.len() as u32,
            min: 1,
            max: caps.levels as u32,
        });
    }
    levels
        .as_slice()
        .iter()
        .map(|cpi| validate_dpi(caps, *cpi))
        .collect::<Result<Vec<u16>>>()
        .map(DpiLevels)
}

/// Validate that `zone` exists and can show `color`.
pub fn validate_led(caps: &LedCapabilities, zone: LedZone, color: Color) -> Result<LedColorRange> {
    let range = caps.range(zone).ok_or_else(|| Error::Invalid {
        field: "zone",
        reason: format!("{zone} is not a lighting zone on this device"),
    })?;
    if !range.accepts(color) {
        let reason = match range {
            LedColorRange::None => format!("{zone} has no configurable color"),
            _ => format!("{zone} only supports pure red, green, blue, or off (got {color})"),
        };
        return Err(Error::Invalid {
            field: "color",
            reason,
        });
    }
    Ok(range)
}

/// Validate a button binding against the device's button descriptor.
pub fn validate_button(
    caps: &ButtonsCapabilities,
    position: MouseButtonPosition,
    binding: ButtonBinding,
    target: BindTarget,
) -> Result<()> {
    let support = caps.support(position).ok_or_else(|| Error::Invalid {
        field: "button",
        reason: format!("{position} is not programmable on this device"),
    })?;
    if !support.accepts(binding) {
        return Err(Error::Invalid {
            field: "binding",
            reason: format!("{position} cannot be bound to {binding}"),
        });
    }
    if target.binding() != binding {
        return Err(Error::Invalid {
            field: "target",
            reason: format!("{target} is not a {binding} target"),
        });
    }

    match target {
        BindTarget::Key(usage) if !KEYSTROKE_USAGES.contains(&usage) => Err(Error::OutOfRange {
            field: "key_usage",
            value: usage as u32,
            min: *KEYSTROKE_USAGES.start() as u32,
            max: *KEYSTROKE_USAGES.end() as u32,
        }),
        BindTarget::Macro(slot) if slot >= caps.macro_slots => Err(Error::OutOfRange {
            field: "macro_slot",
            value: slot as u32,
            min: 0,
            max: caps.macro_slots.saturating_sub(1) as u32,
        }),
        BindTarget::Button(emulated) if !caps.mouse_targets.contains(&emulated) => {
            Err(Error::Invalid {
                field: "target",
                reason: format!("{emulated} cannot be emulated on this device"),
            })
        }
        _ => Ok(()),
    }
}

/// Validate an onboard profile id.
pub fn validate_profile(profile_count: u8, id: u8) -> Result<()> {
    if id >= profile_count {
        return Err(Error::OutOfRange {
            field: "profile",
            value: id as u32,
            min: 0,
            max: profile_count.saturating_sub(1) as u32,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buttons::ButtonSupport;

    const DPI: DpiCapabilities = DpiCapabilities {
        min: 100,
        max: 12000,
        step: 100,
        levels: 2,
    };

    #[test]
    fn validate_dpi_in_range() {
        assert_eq!(validate_dpi(&DPI, 800).unwrap(), 800);
        assert_eq!(validate_dpi(&DPI, 100).unwrap(), 100);
        assert_eq!(validate_dpi(&DPI, 12000).unwrap(), 12000);
    }

    #[test]
    fn validate_dpi_rounds_to_step() {
        assert_eq!(validate_dpi(&DPI, 810).unwrap(), 800);
        assert_eq!(validate_dpi(&DPI, 850).unwrap(), 900);
        assert_eq!(validate_dpi(&DPI, 11990).unwrap(), 12000);
    }

    #[test]
    fn validate_dpi_rounds_from_minimum() {
        let caps = DpiCapabilities {
            min: 50,
            max: 1000,
            step: 100,
            levels: 1,
        };
        assert_eq!(validate_dpi(&caps, 120).unwrap(), 150);
        assert_eq!(validate_dpi(&caps, 990).unwrap(), 950);
    }

    #[test]
    fn validate_dpi_rejects_out_of_range() {
        assert!(validate_dpi(&DPI, 50).is_err());
        assert!(validate_dpi(&DPI, 0).is_err());
        assert!(matches!(
            validate_dpi(&DPI, 12050),
            Err(Error::OutOfRange { field: "dpi", .. })
        ));
    }

    #[test]
    fn validate_dpi_level_bounds() {
        assert!(validate_dpi_level(&DPI, 0).is_ok());
        assert!(validate_dpi_level(&DPI, 1).is_ok());
        assert!(validate_dpi_level(&DPI, 2).is_err());
    }

    #[test]
    fn validate_dpi_levels_rounds_each() {
        let levels = validate_dpi_levels(&DPI, &DpiLevels::new([410, 1590])).unwrap();
        assert_eq!(levels, DpiLevels::new([400, 1600]));
    }

    #[test]
    fn validate_dpi_levels_rejects_bad_lists() {
        assert!(validate_dpi_levels(&DPI, &DpiLevels::default()).is_err());
        assert!(validate_dpi_levels(&DPI, &DpiLevels::new([400, 800, 1600])).is_err());
        assert!(validate_dpi_levels(&DPI, &DpiLevels::new([400, 20000])).is_err());
    }

    fn leds() -> LedCapabilities {
        LedCapabilities::new([
            (LedZone::Logo, LedColorRange::AllColors),
            (LedZone::Wheel, LedColorRange::SimpleRgb),
            (LedZone::Bottom, LedColorRange::None),
        ])
    }

    #[test]
    fn validate_led_checks_zone_and_range() {
        let caps = leds();
        assert_eq!(
            validate_led(&caps, LedZone::Logo, Color::new(1, 2, 3)).unwrap(),
            LedColorRange::AllColors
        );
        assert!(validate_led(&caps, LedZone::Wheel, Color::BLUE).is_ok());
        assert!(validate_led(&caps, LedZone::Wheel, Color::new(255, 255, 0)).is_err());
        assert!(validate_led(&caps, LedZone::Bottom, Color::RED).is_err());
        assert!(matches!(
            validate_led(&caps, LedZone::Side, Color::RED),
            Err(Error::Invalid { field: "zone", .. })
        ));
    }

    fn buttons() -> ButtonsCapabilities {
        let mut caps = ButtonsCapabilities {
            macro_slots: 2,
            mouse_targets: [MouseButtonPosition::Left, MouseButtonPosition::Back]
                .into_iter()
                .collect(),
            ..ButtonsCapabilities::default()
        };
        caps.buttons.insert(
            MouseButtonPosition::Back,
            ButtonSupport::new(ButtonBinding::ALL.iter().copied()),
        );
        caps.buttons.insert(
            MouseButtonPosition::Left,
            ButtonSupport::new([ButtonBinding::MouseButton]),
        );
        caps
    }

    #[test]
    fn validate_button_accepts_valid() {
        let caps = buttons();
        let back = MouseButtonPosition::Back;
        let ok = |binding, target| validate_button(&caps, back, binding, target).is_ok();
        assert!(ok(ButtonBinding::Keystroke, BindTarget::Key(0x04)));
        assert!(ok(ButtonBinding::Macro, BindTarget::Macro(1)));
        assert!(ok(ButtonBinding::DpiCycle, BindTarget::DpiUp));
        assert!(validate_button(
            &caps,
            back,
            ButtonBinding::MouseButton,
            BindTarget::Button(MouseButtonPosition::Left)
        )
        .is_ok());
    }

    #[test]
    fn validate_button_rejects_invalid() {
        let caps = buttons();
        let back = MouseButtonPosition::Back;
        let rejected = |position, binding, target| {
            validate_button(&caps, position, binding, target).is_err()
        };
        // Not programmable
        assert!(rejected(MouseButtonPosition::Dpi, ButtonBinding::Disabled, BindTarget::Disabled));
        // Kind not accepted by this button
        assert!(rejected(MouseButtonPosition::Left, ButtonBinding::Disabled, BindTarget::Disabled));
        // Target of another kind
        assert!(rejected(back, ButtonBinding::Keystroke, BindTarget::Macro(0)));
        // Usage outside the keyboard page
        assert!(rejected(back, ButtonBinding::Keystroke, BindTarget::Key(0x01)));
        assert!(rejected(back, ButtonBinding::Macro, BindTarget::Macro(2)));
        assert!(validate_button(
            &caps,
            back,
            ButtonBinding::MouseButton,
            BindTarget::Button(MouseButtonPosition::Forward)
        )
        .is_err());
    }

    #[test]
    fn validate_profile_bounds() {
        assert!(validate_profile(5, 0).is_ok());
        assert!(validate_profile(5, 4).is_ok());
        assert!(validate_profile(5, 5).is_err());
        assert!(validate_profile(0, 0).is_err());
    }

    #[test]
    fn write_disclaimer_not_empty() {
        assert!(WRITE_DISCLAIMER.contains("WARNING"));
    }
}
