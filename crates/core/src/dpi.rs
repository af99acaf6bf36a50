//! DPI levels: sensor resolution presets the mouse cycles through.
//!
//! A device advertises a CPI range, a step, and how many levels it stores.
//! Setters round to the step and reject anything outside the range before a
//! report is built (see [`safety`](crate::safety)).

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// CPI range and level count supported by a sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DpiCapabilities {
    /// Lowest accepted CPI.
    pub min: u16,
    /// Highest accepted CPI.
    pub max: u16,
    /// CPI increment between valid values.
    pub step: u16,
    /// Number of DPI levels stored on the device.
    pub levels: u8,
}

impl DpiCapabilities {
    /// Whether `cpi` is inside the advertised range (ignoring the step).
    pub fn contains(&self, cpi: u16) -> bool {
        (self.min..=self.max).contains(&cpi)
    }
}

/// Current CPI of every level, in level order.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DpiLevels(pub Vec<u16>);

impl DpiLevels {
    pub fn new(levels: impl Into<Vec<u16>>) -> Self {
        Self(levels.into())
    }

    pub fn get(&self, level: u8) -> Option<u16> {
        self.0.get(level as usize).copied()
    }

    pub fn as_slice(&self) -> &[u16] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl std::fmt::Display for DpiLevels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, cpi) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{cpi}")?;
        }
        Ok(())
    }
}

/// DPI level control. A device implements all of it or none of it.
#[async_trait]
pub trait DpiCapability: Send + Sync {
    fn dpi_capabilities(&self) -> DpiCapabilities;

    /// Ask for the current levels; they arrive as `DpiLevelsReceived`.
    async fn request_dpi_levels(&self) -> Result<()>;

    /// Set one level (0-based) to `cpi`, rounded to the step.
    async fn set_dpi_level(&self, level: u8, cpi: u16) -> Result<()>;

    /// Replace every level at once.
    async fn set_dpi_levels(&self, levels: &DpiLevels) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    const RIVAL: DpiCapabilities = DpiCapabilities {
        min: 100,
        max: 12000,
        step: 100,
        levels: 2,
    };

    #[test]
    fn contains_checks_bounds() {
        assert!(RIVAL.contains(100));
        assert!(RIVAL.contains(12000));
        assert!(!RIVAL.contains(50));
        assert!(!RIVAL.contains(12100));
    }

    #[test]
    fn levels_accessors() {
        let levels = DpiLevels::new([800, 1600]);
        assert_eq!(levels.get(0), Some(800));
        assert_eq!(levels.get(1), Some(1600));
        assert_eq!(levels.get(2), None);
        assert_eq!(levels.len(), 2);
        assert!(DpiLevels::default().is_empty());
    }

    #[test]
    fn levels_display() {
        assert_eq!(DpiLevels::new([400, 800, 3200]).to_string(), "400, 800, 3200");
        assert_eq!(DpiLevels::default().to_string(), "");
    }
}
