//! Programmable buttons: physical positions, binding kinds, and targets.
//!
//! A binding kind says what sort of action a button performs; the target
//! says which one. A button declares the kinds it accepts, and the device
//! declares which targets exist for each kind.

use crate::error::{Error, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

/// HID keyboard usages a keystroke binding may send (`a` through `Right GUI`).
pub const KEYSTROKE_USAGES: RangeInclusive<u8> = 0x04..=0xE7;

/// Physical button on the mouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MouseButtonPosition {
    Left,
    Right,
    Middle,
    Back,
    Forward,
    Dpi,
}

impl MouseButtonPosition {
    pub const ALL: &'static [MouseButtonPosition] = &[
        MouseButtonPosition::Left,
        MouseButtonPosition::Right,
        MouseButtonPosition::Middle,
        MouseButtonPosition::Back,
        MouseButtonPosition::Forward,
        MouseButtonPosition::Dpi,
    ];

    /// Wire index of this button (1-based, as devices number them).
    pub fn code(&self) -> u8 {
        match self {
            Self::Left => 0x01,
            Self::Right => 0x02,
            Self::Middle => 0x03,
            Self::Back => 0x04,
            Self::Forward => 0x05,
            Self::Dpi => 0x06,
        }
    }

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.code() == code)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Left => "Left",
            Self::Right => "Right",
            Self::Middle => "Middle",
            Self::Back => "Back",
            Self::Forward => "Forward",
            Self::Dpi => "DPI",
        }
    }

    /// Parse a button name (case-insensitive).
    ///
    /// Accepts "left", "right", "middle" (or "wheel"), "back" (or "mouse4"),
    /// "forward" (or "mouse5"), and "dpi".
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "left" | "left-click" => Some(Self::Left),
            "right" | "right-click" => Some(Self::Right),
            "middle" | "middle-click" | "wheel" => Some(Self::Middle),
            "back" | "mouse4" => Some(Self::Back),
            "forward" | "mouse5" => Some(Self::Forward),
            "dpi" => Some(Self::Dpi),
            _ => None,
        }
    }
}

impl std::fmt::Display for MouseButtonPosition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Kind of action a button can be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ButtonBinding {
    /// Emulate another mouse button.
    MouseButton,
    /// Send one keyboard usage.
    Keystroke,
    /// Play a stored macro.
    Macro,
    /// Change the active DPI level.
    DpiCycle,
    /// Do nothing.
    Disabled,
}

impl ButtonBinding {
    pub const ALL: &'static [ButtonBinding] = &[
        ButtonBinding::MouseButton,
        ButtonBinding::Keystroke,
        ButtonBinding::Macro,
        ButtonBinding::DpiCycle,
        ButtonBinding::Disabled,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::MouseButton => "Mouse Button",
            Self::Keystroke => "Keystroke",
            Self::Macro => "Macro",
            Self::DpiCycle => "DPI Cycle",
            Self::Disabled => "Disabled",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "mouse" | "mouse-button" | "button" => Some(Self::MouseButton),
            "key" | "keystroke" | "keyboard" => Some(Self::Keystroke),
            "macro" => Some(Self::Macro),
            "dpi" | "dpi-cycle" => Some(Self::DpiCycle),
            "disabled" | "none" | "off" => Some(Self::Disabled),
            _ => None,
        }
    }
}

impl std::fmt::Display for ButtonBinding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// The concrete action a button performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BindTarget {
    Button(MouseButtonPosition),
    /// HID keyboard usage ID.
    Key(u8),
    /// Macro slot.
    Macro(u8),
    DpiUp,
    DpiDown,
    DpiCycle,
    Disabled,
}

impl BindTarget {
    /// The binding kind this target belongs to.
    pub fn binding(&self) -> ButtonBinding {
        match self {
            Self::Button(_) => ButtonBinding::MouseButton,
            Self::Key(_) => ButtonBinding::Keystroke,
            Self::Macro(_) => ButtonBinding::Macro,
            Self::DpiUp | Self::DpiDown | Self::DpiCycle => ButtonBinding::DpiCycle,
            Self::Disabled => ButtonBinding::Disabled,
        }
    }

    /// Parse a target argument for `binding`.
    ///
    /// - mouse button: a button name ("back")
    /// - keystroke: a usage ID, decimal or `0x` hex ("0x04")
    /// - macro: a slot number
    /// - DPI cycle: "up", "down", or "cycle"
    /// - disabled: anything
    pub fn parse(binding: ButtonBinding, target: &str) -> Result<Self> {
        let invalid = |reason: &str| Error::Invalid {
            field: "target",
            reason: format!("{reason}: {target:?}"),
        };
        let target = target.trim();
        match binding {
            ButtonBinding::MouseButton => MouseButtonPosition::from_name(target)
                .map(Self::Button)
                .ok_or_else(|| invalid("unknown mouse button")),
            ButtonBinding::Keystroke => parse_u8(target)
                .map(Self::Key)
                .ok_or_else(|| invalid("expected a HID usage ID")),
            ButtonBinding::Macro => parse_u8(target)
                .map(Self::Macro)
                .ok_or_else(|| invalid("expected a macro slot number")),
            ButtonBinding::DpiCycle => match target.to_lowercase().as_str() {
                "up" => Ok(Self::DpiUp),
                "down" => Ok(Self::DpiDown),
                "cycle" | "" => Ok(Self::DpiCycle),
                _ => Err(invalid("expected up, down, or cycle")),
            },
            ButtonBinding::Disabled => Ok(Self::Disabled),
        }
    }
}

fn parse_u8(s: &str) -> Option<u8> {
    match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16).ok(),
        None => s.parse().ok(),
    }
}

impl std::fmt::Display for BindTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Button(position) => write!(f, "{position} button"),
            Self::Key(usage) => write!(f, "key 0x{usage:02X}"),
            Self::Macro(slot) => write!(f, "macro {slot}"),
            Self::DpiUp => write!(f, "DPI up"),
            Self::DpiDown => write!(f, "DPI down"),
            Self::DpiCycle => write!(f, "DPI cycle"),
            Self::Disabled => write!(f, "disabled"),
        }
    }
}

/// Binding kinds one button accepts.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ButtonSupport {
    pub bindings: BTreeSet<ButtonBinding>,
}

impl ButtonSupport {
    pub fn new(bindings: impl IntoIterator<Item = ButtonBinding>) -> Self {
        Self {
            bindings: bindings.into_iter().collect(),
        }
    }

    pub fn accepts(&self, binding: ButtonBinding) -> bool {
        self.bindings.contains(&binding)
    }
}

/// Programmable buttons and the targets they can be bound to.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ButtonsCapabilities {
    pub buttons: BTreeMap<MouseButtonPosition, ButtonSupport>,
    /// Buttons a mouse-button binding may emulate.
    pub mouse_targets: BTreeSet<MouseButtonPosition>,
    /// Number of macro slots; valid slots are `0..macro_slots`.
    pub macro_slots: u8,
}

impl ButtonsCapabilities {
    pub fn support(&self, position: MouseButtonPosition) -> Option<&ButtonSupport> {
        self.buttons.get(&position)
    }

    /// Programmable buttons in position order.
    pub fn positions(&self) -> impl Iterator<Item = MouseButtonPosition> + '_ {
        self.buttons.keys().copied()
    }
}

/// Button remapping. A device implements all of it or none of it.
#[async_trait]
pub trait ButtonsCapability: Send + Sync {
    fn buttons_capabilities(&self) -> ButtonsCapabilities;

    /// Ask for every binding; each arrives as `ButtonBindingReceived`.
    async fn request_buttons(&self) -> Result<()>;

    /// Bind `position` to `target`. `binding` must be the target's kind.
    async fn set_button(
        &self,
        position: MouseButtonPosition,
        binding: ButtonBinding,
        target: BindTarget,
    ) -> Result<()>;
}
