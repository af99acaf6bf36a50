//! SteelSeries Kana v2: a single logo LED with three fixed colors.

use super::steelseries::{self, ids, SteelSeriesLed};
use crate::configurator::{Configurator, DeviceLink, DeviceProtocol};
use crate::device::{select_transport, ConfiguratorFactory, DeviceFilter};
use crate::error::Result;
use crate::event::{EventBus, FirmwareVersion};
use crate::led::{LedCapabilities, LedCapability, LedColorRange, LedZone};
use crate::report::Report;
use crate::transport::HidTransport;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::trace;

/// Kana v2 driver.
pub struct KanaV2 {
    link: DeviceLink,
    led: SteelSeriesLed,
}

impl KanaV2 {
    pub fn new(link: DeviceLink) -> Self {
        let led = SteelSeriesLed::new(
            link.clone(),
            LedCapabilities::new([(LedZone::Logo, LedColorRange::SimpleRgb)]),
        );
        Self { link, led }
    }
}

impl ConfiguratorFactory for KanaV2 {
    const NAME: &'static str = "SteelSeries Kana v2";
    const FILTER: DeviceFilter = DeviceFilter::new(crate::STEELSERIES_VID, crate::pids::KANA_V2);

    fn construct(events: EventBus, transports: Vec<Arc<dyn HidTransport>>) -> Result<Configurator> {
        let transport = select_transport(transports, 0)?;
        let link = DeviceLink::new(transport, events);
        Ok(Configurator::new(link.clone(), Self::FILTER, Self::new(link)))
    }
}

#[async_trait]
impl DeviceProtocol for KanaV2 {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn handle_input_report(&self, report: &Report) {
        match report.id {
            ids::FIRMWARE => steelseries::handle_firmware(&self.link, report),
            ids::LED_GET => self.led.handle_state(report),
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
}
