//! Orchestrator for the active device.
//!
//! The manager picks a driver from the registry, owns the configurator it
//! builds, and offers capability operations that fail with a typed error
//! instead of returning `None` when the active device lacks a family.

use crate::buttons::{
    BindTarget, ButtonBinding, ButtonsCapabilities, ButtonsCapability, MouseButtonPosition,
};
use crate::comm::DeviceStatus;
use crate::configurator::{Capability, Configurator};
use crate::device::Registry;
use crate::dpi::{DpiCapabilities, DpiCapability, DpiLevels};
use crate::error::{Error, Result};
use crate::event::{ConfiguratorEvent, EventBus, FirmwareVersion};
use crate::led::{Color, LedCapabilities, LedCapability, LedMode, LedZone};
use crate::profile::ProfilesCapability;
use crate::rgb_profile::LedChange;
use crate::transport::HidTransport;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Owns at most one open configurator.
pub struct DeviceManager {
    registry: Registry,
    events: EventBus,
    active: Option<Configurator>,
    status: Mutex<DeviceStatus>,
    firmware: Arc<Mutex<Option<FirmwareVersion>>>,
}

impl DeviceManager {
    pub fn new(registry: Registry) -> Self {
        let events = EventBus::new();
        let firmware = Arc::new(Mutex::new(None));
        {
            let firmware = Arc::clone(&firmware);
            events.subscribe(move |event: &ConfiguratorEvent| {
                if let ConfiguratorEvent::FirmwareVersionReceived(version) = event {
                    *firmware.lock().unwrap_or_else(PoisonError::into_inner) = Some(*version);
                }
            });
        }
        Self {
            registry,
            events,
            active: None,
            status: Mutex::new(DeviceStatus::Disconnected),
            firmware,
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Every event of every configurator this manager opens.
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn status(&self) -> DeviceStatus {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, status: DeviceStatus) {
        *self.status.lock().unwrap_or_else(PoisonError::into_inner) = status;
    }

    /// Last firmware version reported by the active device.
    pub fn firmware_version(&self) -> Option<FirmwareVersion> {
        *self.firmware.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn active(&self) -> Option<&Configurator> {
        self.active.as_ref()
    }

    fn require(&self) -> Result<&Configurator> {
        self.active.as_ref().ok_or(Error::NoActiveDevice)
    }

    /// Record the outcome of a device operation in the status.
    fn track<T>(&self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.set_status(DeviceStatus::Connected),
            Err(e) => {
                let status = self.status().after_error(e);
                warn!(error = %e, ?status, "Device operation failed");
                self.set_status(status);
            }
        }
        result
    }

    /// Build and open a configurator for the interfaces of one device.
    ///
    /// Any previously active device is closed first.
    pub async fn connect(
        &mut self,
        transports: Vec<Arc<dyn HidTransport>>,
    ) -> Result<&Configurator> {
        let info = transports
            .first()
            .map(|t| t.info().clone())
            .ok_or_else(|| Error::DeviceNotFound("no HID interfaces to connect".into()))?;
        let entry = *self.registry.find(&info).ok_or_else(|| {
            Error::DeviceNotFound(format!(
                "no driver for {:04X}:{:04X}",
                info.vid, info.pid
            ))
        })?;

        if self.active.is_some() {
            if let Err(e) = self.disconnect().await {
                debug!(error = %e, "Ignoring close failure of previous device");
            }
        }

        let configurator = (entry.construct)(self.events.clone(), transports)?;
        if let Err(e) = configurator.open().await {
            self.set_status(self.status().after_error(&e));
            return Err(e);
        }

        info!(model = entry.name, capabilities = %configurator.capabilities(), "Active device");
        *self.firmware.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.set_status(DeviceStatus::Connected);
        Ok(self.active.insert(configurator))
    }

    /// Close the active device, if any.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(configurator) = self.active.take() else {
            return Ok(());
        };
        let result = configurator.close().await;
        self.set_status(DeviceStatus::Disconnected);
        result
    }

    fn led(&self) -> Result<&dyn LedCapability> {
        self.require()?.led().ok_or(Error::Unsupported(Capability::Led))
    }

    fn dpi(&self) -> Result<&dyn DpiCapability> {
        self.require()?.dpi().ok_or(Error::Unsupported(Capability::Dpi))
    }

    fn buttons(&self) -> Result<&dyn ButtonsCapability> {
        self.require()?
            .buttons()
            .ok_or(Error::Unsupported(Capability::Buttons))
    }

    fn profiles(&self) -> Result<&dyn ProfilesCapability> {
        self.require()?
            .profiles()
            .ok_or(Error::Unsupported(Capability::Profiles))
    }

    pub fn led_capabilities(&self) -> Result<LedCapabilities> {
        Ok(self.led()?.led_capabilities())
    }

    pub fn dpi_capabilities(&self) -> Result<DpiCapabilities> {
        Ok(self.dpi()?.dpi_capabilities())
    }

    pub fn buttons_capabilities(&self) -> Result<ButtonsCapabilities> {
        Ok(self.buttons()?.buttons_capabilities())
    }

    pub fn profile_count(&self) -> Result<u8> {
        Ok(self.profiles()?.profile_count())
    }

    pub async fn request_firmware_version(&self) -> Result<()> {
        let configurator = self.require()?;
        self.track(configurator.request_firmware_version().await)
    }

    /// Ask for the firmware version and wait for it, dispatching meanwhile.
    pub async fn query_firmware_version(&self, timeout: Duration) -> Result<FirmwareVersion> {
        let configurator = self.require()?;
        self.track(configurator.query_firmware_version(timeout).await)
    }

    pub async fn request_current_config(&self) -> Result<()> {
        let configurator = self.require()?;
        self.track(configurator.request_current_config().await)
    }

    /// Change a zone's color, keeping whatever effect it currently shows.
    pub async fn set_led(&self, color: Color, zone: LedZone) -> Result<()> {
        let led = self.led()?;
        let mode = led.led_state(zone).map(|s| s.mode).unwrap_or_default();
        self.track(led.set_led(color, zone, mode).await)
    }

    pub async fn set_led_mode(&self, color: Color, zone: LedZone, mode: LedMode) -> Result<()> {
        let led = self.led()?;
        self.track(led.set_led(color, zone, mode).await)
    }

    /// Apply a change picked in the RGB view model.
    pub async fn apply_led_change(&self, change: &LedChange) -> Result<()> {
        self.set_led(change.color, change.zone).await
    }

    pub async fn set_dpi_level(&self, level: u8, cpi: u16) -> Result<()> {
        let dpi = self.dpi()?;
        self.track(dpi.set_dpi_level(level, cpi).await)
    }

    pub async fn set_dpi_levels(&self, levels: &DpiLevels) -> Result<()> {
        let dpi = self.dpi()?;
        self.track(dpi.set_dpi_levels(levels).await)
    }

    pub async fn set_button(
        &self,
        position: MouseButtonPosition,
        binding: ButtonBinding,
        target: BindTarget,
    ) -> Result<()> {
        let buttons = self.buttons()?;
        self.track(buttons.set_button(position, binding, target).await)
    }

    pub async fn request_profile(&self, id: u8) -> Result<()> {
        let profiles = self.profiles()?;
        self.track(profiles.request_profile(id).await)
    }
}

impl std::fmt::Debug for DeviceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceManager")
            .field("drivers", &self.registry.entries().len())
            .field("active", &self.active)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::{KanaV2, Rival310};
    use crate::device::ConfiguratorFactory;
    use crate::report::Report;
    use crate::transport::mock::{MockTransport, ReportKind};

    fn mock(
        filter: crate::device::DeviceFilter,
    ) -> (Arc<MockTransport>, Vec<Arc<dyn HidTransport>>) {
        let mock = Arc::new(MockTransport::new(filter));
        let handles: Vec<Arc<dyn HidTransport>> = vec![mock.clone()];
        (mock, handles)
    }

    #[tokio::test]
    async fn operations_need_an_active_device() {
        let manager = DeviceManager::new(Registry::builtin());
        assert!(manager.active().is_none());
        assert!(matches!(manager.led_capabilities(), Err(Error::NoActiveDevice)));
        assert!(matches!(
            manager.set_led(Color::RED, LedZone::Logo).await,
            Err(Error::NoActiveDevice)
        ));
        assert_eq!(manager.status(), DeviceStatus::Disconnected);
    }

    #[tokio::test]
    async fn connect_picks_the_matching_driver() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (mock, handles) = mock(KanaV2::FILTER);

        let configurator = manager.connect(handles).await.unwrap();

        assert_eq!(configurator.name(), KanaV2::NAME);
        assert!(mock.is_open());
        assert_eq!(manager.status(), DeviceStatus::Connected);
    }

    #[tokio::test]
    async fn connect_rejects_unknown_devices() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (_mock, handles) = mock(crate::device::DeviceFilter::new(0x046D, 0xC08B));
        assert!(matches!(
            manager.connect(handles).await,
            Err(Error::DeviceNotFound(_))
        ));
        assert!(matches!(
            manager.connect(Vec::new()).await,
            Err(Error::DeviceNotFound(_))
        ));
    }

    #[tokio::test]
    async fn missing_family_is_unsupported() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (mock, handles) = mock(KanaV2::FILTER);
        manager.connect(handles).await.unwrap();

        assert!(matches!(
            manager.dpi_capabilities(),
            Err(Error::Unsupported(Capability::Dpi))
        ));
        assert!(matches!(
            manager.set_button(
                MouseButtonPosition::Back,
                ButtonBinding::Disabled,
                BindTarget::Disabled
            )
            .await,
            Err(Error::Unsupported(Capability::Buttons))
        ));
        assert!(matches!(
            manager.request_profile(0).await,
            Err(Error::Unsupported(Capability::Profiles))
        ));
        assert!(mock.sent().is_empty());
        // Validation failures leave the status alone
        assert_eq!(manager.status(), DeviceStatus::Connected);
    }

    #[tokio::test]
    async fn set_led_keeps_current_mode() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (mock, handles) = mock(Rival310::FILTER);
        manager.connect(handles).await.unwrap();

        manager
            .set_led_mode(Color::BLUE, LedZone::Logo, LedMode::Breathing)
            .await
            .unwrap();
        manager.set_led(Color::RED, LedZone::Logo).await.unwrap();
        manager.set_led(Color::GREEN, LedZone::Wheel).await.unwrap();

        let sent = mock.sent();
        assert_eq!(sent[1].data, vec![0x02, 0xFF, 0x00, 0x00]);
        // Untouched zones use the default effect
        assert_eq!(sent[2].id, 0x22);
        assert_eq!(sent[2].data, vec![0x01, 0x00, 0xFF, 0x00]);
    }

    #[tokio::test]
    async fn transport_failures_update_status() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (mock, handles) = mock(Rival310::FILTER);
        manager.connect(handles).await.unwrap();

        mock.fail_sends(true);
        assert!(manager.set_dpi_level(0, 800).await.is_err());
        assert_eq!(manager.status(), DeviceStatus::Error);

        mock.fail_sends(false);
        manager.set_dpi_level(0, 800).await.unwrap();
        assert_eq!(manager.status(), DeviceStatus::Connected);
    }

    #[tokio::test]
    async fn unanswered_firmware_query_times_out_and_can_be_retried() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (mock, handles) = mock(Rival310::FILTER);
        manager.connect(handles).await.unwrap();

        let result = manager
            .query_firmware_version(Duration::from_millis(20))
            .await;
        assert!(matches!(result, Err(Error::Timeout(_))));
        assert_eq!(manager.status(), DeviceStatus::Error);

        mock.on_send(
            ReportKind::Output,
            0x10,
            vec![Report::new(0x10, vec![0x02, 0x01])],
        );
        let version = manager
            .query_firmware_version(Duration::from_secs(5))
            .await
            .unwrap();

        let expected = FirmwareVersion { major: 1, minor: 2 };
        assert_eq!(version, expected);
        assert_eq!(manager.firmware_version(), Some(expected));
        assert_eq!(manager.status(), DeviceStatus::Connected);
        assert_eq!(mock.sent().len(), 2);
    }

    #[tokio::test]
    async fn failed_open_leaves_no_active_device() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (mock, handles) = mock(Rival310::FILTER);
        mock.fail_open();

        assert!(manager.connect(handles).await.is_err());
        assert!(manager.active().is_none());
        assert_eq!(manager.status(), DeviceStatus::Disconnected);
    }

    #[tokio::test]
    async fn disconnect_closes_and_is_idempotent() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (mock, handles) = mock(KanaV2::FILTER);
        manager.connect(handles).await.unwrap();

        manager.disconnect().await.unwrap();
        manager.disconnect().await.unwrap();

        assert!(!mock.is_open());
        assert!(manager.active().is_none());
        assert_eq!(manager.status(), DeviceStatus::Disconnected);
    }

    #[tokio::test]
    async fn connecting_again_replaces_the_active_device() {
        let mut manager = DeviceManager::new(Registry::builtin());
        let (first, handles) = mock(KanaV2::FILTER);
        manager.connect(handles).await.unwrap();
        let (second, handles) = mock(Rival310::FILTER);
        manager.connect(handles).await.unwrap();

        assert!(!first.is_open());
        assert!(second.is_open());
        assert_eq!(manager.active().unwrap().name(), Rival310::NAME);
    }
}
