//! SteelSeries Rival 310: two lighting zones, two DPI levels, six buttons,
//! five onboard profiles.

use super::steelseries::{self, ids, SteelSeriesLed};
use crate::buttons::{
    BindTarget, ButtonBinding, ButtonSupport, ButtonsCapabilities, ButtonsCapability,
    MouseButtonPosition,
};
use crate::configurator::{Configurator, DeviceLink, DeviceProtocol};
use crate::device::{select_transport, ConfiguratorFactory, DeviceFilter};
use crate::dpi::{DpiCapabilities, DpiCapability, DpiLevels};
use crate::error::Result;
use crate::event::{ConfiguratorEvent, EventBus, FirmwareVersion};
use crate::led::{LedCapabilities, LedCapability, LedColorRange, LedZone};
use crate::profile::ProfilesCapability;
use crate::report::Report;
use crate::safety;
use crate::transport::HidTransport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, trace};

/// Rival 310 driver.
pub struct Rival310 {
    link: DeviceLink,
    led: SteelSeriesLed,
}

impl Rival310 {
    pub const DPI: DpiCapabilities = DpiCapabilities {
        min: 100,
        max: 12000,
        step: 100,
        levels: 2,
    };

    pub const PROFILE_COUNT: u8 = 5;

    const MACRO_SLOTS: u8 = 4;

    pub fn new(link: DeviceLink) -> Self {
        let led = SteelSeriesLed::new(link.clone(), Self::led_zones());
        Self { link, led }
    }

    pub fn led_zones() -> LedCapabilities {
        LedCapabilities::new([
            (LedZone::Logo, LedColorRange::AllColors),
            (LedZone::Wheel, LedColorRange::SimpleRgb),
        ])
    }

    pub fn button_layout() -> ButtonsCapabilities {
        use MouseButtonPosition::*;

        let mut caps = ButtonsCapabilities {
            mouse_targets: [Left, Right, Middle, Back, Forward].into_iter().collect(),
            macro_slots: Self::MACRO_SLOTS,
            ..ButtonsCapabilities::default()
        };
        // Left click stays a mouse button so the device cannot be locked out
        caps.buttons
            .insert(Left, ButtonSupport::new([ButtonBinding::MouseButton]));
        for position in [Right, Middle, Back, Forward] {
            caps.buttons
                .insert(position, ButtonSupport::new(ButtonBinding::ALL.iter().copied()));
        }
        caps.buttons.insert(
            Dpi,
            ButtonSupport::new([
                ButtonBinding::DpiCycle,
                ButtonBinding::MouseButton,
                ButtonBinding::Keystroke,
                ButtonBinding::Disabled,
            ]),
        );
        caps
    }

    fn handle_dpi_levels(&self, report: &Report) {
        match steelseries::decode_dpi_levels(&report.data) {
            Some(levels) => self.link.emit(ConfiguratorEvent::DpiLevelsReceived(levels)),
            None => debug!(data_hex = format_args!("{:02X?}", report.data), "Malformed DPI report"),
        }
    }

    fn handle_binding(&self, report: &Report) {
        match steelseries::decode_binding(&report.data) {
            Some((position, target)) => self
                .link
                .emit(ConfiguratorEvent::ButtonBindingReceived { position, target }),
            None => debug!(
                data_hex = format_args!("{:02X?}", report.data),
                "Malformed button report"
            ),
        }
    }

    fn handle_profile(&self, report: &Report) {
        match report.data.first() {
            Some(&id) if id < Self::PROFILE_COUNT => {
                self.link.emit(ConfiguratorEvent::ProfileReceived { id })
            }
            _ => debug!(
                data_hex = format_args!("{:02X?}", report.data),
                "Malformed profile report"
            ),
        }
    }
}

impl ConfiguratorFactory for Rival310 {
    const NAME: &'static str = "SteelSeries Rival 310";
    const FILTER: DeviceFilter = DeviceFilter::new(crate::STEELSERIES_VID, crate::pids::RIVAL_310);

    fn construct(events: EventBus, transports: Vec<Arc<dyn HidTransport>>) -> Result<Configurator> {
        let transport = select_transport(transports, 0)?;
        let link = DeviceLink::new(transport, events);
        Ok(Configurator::new(link.clone(), Self::FILTER, Self::new(link)))
    }
}

#[async_trait]
impl DeviceProtocol for Rival310 {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle_input_report(&self, report: &Report) {
        match report.id {
            ids::FIRMWARE => steelseries::handle_firmware(&self.link, report),
            ids::LED_GET => self.led.handle_state(report),
            ids::DPI_GET => self.handle_dpi_levels(report),
            ids::BUTTON_GET => self.handle_binding(report),
            ids::PROFILE => self.handle_profile(report),
            other => trace!(report_id = format_args!("0x{:02X}", other), "Ignoring report"),
        }
    }

    async fn request_firmware_version(&self) -> Result<()> {
        steelseries::request_firmware(&self.link).await
    }

    async fn query_firmware_version(&self) -> Result<FirmwareVersion> {
        steelseries::query_firmware(&self.link).await
    }

    fn led(&self) -> Option<&dyn LedCapability> {
        Some(&self.led)
    }

    fn dpi(&self) -> Option<&dyn DpiCapability> {
        Some(self)
    }

    fn buttons(&self) -> Option<&dyn ButtonsCapability> {
        Some(self)
    }

    fn profiles(&self) -> Option<&dyn ProfilesCapability> {
        Some(self)
    }
}

#[async_trait]
impl DpiCapability for Rival310 {
    fn dpi_capabilities(&self) -> DpiCapabilities {
        Self::DPI
    }

    async fn request_dpi_levels(&self) -> Result<()> {
        self.link.send_report(ids::DPI_GET, &[]).await
    }

    async fn set_dpi_level(&self, level: u8, cpi: u16) -> Result<()> {
        safety::validate_dpi_level(&Self::DPI, level)?;
        let cpi = safety::validate_dpi(&Self::DPI, cpi)?;
        self.link
            .send_report(ids::DPI_SET_LEVEL, &steelseries::encode_dpi_level(level, cpi))
            .await
    }

    async fn set_dpi_levels(&self, levels: &DpiLevels) -> Result<()> {
        let levels = safety::validate_dpi_levels(&Self::DPI, levels)?;
        self.link
            .send_report(ids::DPI_SET_ALL, &steelseries::encode_dpi_levels(&levels))
            .await
    }
}

#[async_trait]
impl ButtonsCapability for Rival310 {
    fn buttons_capabilities(&self) -> ButtonsCapabilities {
        Self::button_layout()
    }

    async fn request_buttons(&self) -> Result<()> {
        self.link.send_report(ids::BUTTON_GET, &[]).await
    }

    async fn set_button(
        &self,
        position: MouseButtonPosition,
        binding: ButtonBinding,
        target: BindTarget,
    ) -> Result<()> {
        safety::validate_button(&Self::button_layout(), position, binding, target)?;
        self.link
            .send_report(ids::BUTTON_SET, &steelseries::encode_binding(position, target))
            .await
    }
}

#[async_trait]
impl ProfilesCapability for Rival310 {
    fn profile_count(&self) -> u8 {
        Self::PROFILE_COUNT
    }

    async fn request_profile(&self, id: u8) -> Result<()> {
        safety::validate_profile(Self::PROFILE_COUNT, id)?;
        self.link.send_feature_report(ids::PROFILE, &[id]).await
    }
}
