//! The device configurator: lifecycle, input dispatch, and capability probing.
//!
//! A [`Configurator`] owns one transport. While open it receives raw events
//! from the transport through a channel and hands every input report to the
//! device driver ([`DeviceProtocol`]) in arrival order. Dispatch is pulled by
//! the caller (`dispatch_next`, `run`, or `dispatch_pending`) so the host
//! decides which task drives it. Any task or thread may drive it; `close()`
//! waits for a report that is being handed to the driver.
//!
//! Capability families are separate traits. A driver exposes the ones it
//! implements through the `led()`/`dpi()`/`buttons()`/`profiles()` accessors
//! and generic code checks them before use.

use crate::buttons::{ButtonsCapabilities, ButtonsCapability};
use crate::device::{DeviceFilter, DeviceInfo};
use crate::dpi::{DpiCapabilities, DpiCapability};
use crate::error::{Error, Result};
use crate::event::{ConfiguratorEvent, EventBus, FirmwareVersion};
use crate::led::{LedCapabilities, LedCapability};
use crate::pending::{PendingRequests, RequestKey};
use crate::profile::ProfilesCapability;
use crate::report::{RawEvent, Report, ReportId};
use crate::transport::HidTransport;
use async_trait::async_trait;
use futures::future::{try_join_all, BoxFuture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, trace, warn};

/// Optional capability families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Led,
    Dpi,
    Buttons,
    Profiles,
}

impl Capability {
    pub const ALL: &'static [Capability] = &[
        Capability::Led,
        Capability::Dpi,
        Capability::Buttons,
        Capability::Profiles,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Led => "LED",
            Self::Dpi => "DPI",
            Self::Buttons => "buttons",
            Self::Profiles => "profiles",
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Which capability families a configurator has.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    pub led: bool,
    pub dpi: bool,
    pub buttons: bool,
    pub profiles: bool,
}

impl CapabilitySet {
    pub fn contains(&self, capability: Capability) -> bool {
        match capability {
            Capability::Led => self.led,
            Capability::Dpi => self.dpi,
            Capability::Buttons => self.buttons,
            Capability::Profiles => self.profiles,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL.iter().copied().filter(|c| self.contains(*c))
    }

    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

impl std::fmt::Display for CapabilitySet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "none");
        }
        for (i, capability) in self.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{capability}")?;
        }
        Ok(())
    }
}

/// Handle a driver uses to talk to its device and publish events.
///
/// Cheap to clone; all clones share the transport, the bus, and the
/// outstanding-request map.
#[derive(Clone)]
pub struct DeviceLink {
    transport: Arc<dyn HidTransport>,
    events: EventBus,
    pending: PendingRequests,
}

impl DeviceLink {
    pub fn new(transport: Arc<dyn HidTransport>, events: EventBus) -> Self {
        Self {
            transport,
            events,
            pending: PendingRequests::new(),
        }
    }

    pub fn info(&self) -> &DeviceInfo {
        self.transport.info()
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn pending(&self) -> &PendingRequests {
        &self.pending
    }

    /// Send an output report.
    pub async fn send_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
        trace!(
            report_id = format_args!("0x{:02X}", report_id),
            data_hex = format_args!("{:02X?}", data),
            "HID TX"
        );
        self.transport
            .send_report(report_id, data)
            .await
            .inspect_err(|e| warn!(report_id, error = %e, "Output report failed"))
    }

    /// Send a feature report.
    pub async fn send_feature_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
        trace!(
            report_id = format_args!("0x{:02X}", report_id),
            data_hex = format_args!("{:02X?}", data),
            "HID TX feature"
        );
        self.transport
            .send_feature_report(report_id, data)
            .await
            .inspect_err(|e| warn!(report_id, error = %e, "Feature report failed"))
    }

    pub fn emit(&self, event: ConfiguratorEvent) {
        self.events.emit(&event);
    }

    /// Send a request unless an identical one is already outstanding.
    ///
    /// Returns whether a report was sent. A failed send leaves nothing pending.
    pub async fn send_correlated(
        &self,
        key: RequestKey,
        report_id: ReportId,
        data: &[u8],
    ) -> Result<bool> {
        if !self.pending.begin(key) {
            debug!(?key, "Request already outstanding, not resending");
            return Ok(false);
        }
        if let Err(e) = self.send_report(report_id, data).await {
            self.pending.cancel(key);
            return Err(e);
        }
        Ok(true)
    }

    /// Send a request and wait for the report that resolves `key`.
    ///
    /// Waits until the driver resolves the key during dispatch, so someone
    /// must be driving the configurator. Closing the configurator fails the
    /// wait with [`Error::RequestCancelled`]. Dropping the future before the
    /// answer arrives forgets the request, so the next call sends again.
    pub async fn request(
        &self,
        key: RequestKey,
        report_id: ReportId,
        data: &[u8],
    ) -> Result<Report> {
        let first = self.pending.begin(key);
        let answer = self.pending.wait(key);
        let mut guard = AbandonGuard {
            pending: &self.pending,
            key,
            armed: true,
        };
        if first {
            self.send_report(report_id, data).await?;
        }
        let result = answer.await.map_err(|_| Error::RequestCancelled);
        guard.armed = false;
        result
    }

    /// Mark `key` answered. Returns false if nobody asked.
    pub fn resolve(&self, key: RequestKey, report: &Report) -> bool {
        self.pending.resolve(key, report)
    }
}

/// Cancels a request whose waiter went away before it was answered.
struct AbandonGuard<'a> {
    pending: &'a PendingRequests,
    key: RequestKey,
    armed: bool,
}

impl Drop for AbandonGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.pending.cancel(self.key) {
            debug!(key = ?self.key, "Unanswered request dropped");
        }
    }
}

impl std::fmt::Debug for DeviceLink {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceLink")
            .field("path", &self.transport.info().path)
            .field("events", &self.events)
            .field("pending", &self.pending.len())
            .finish()
    }
}

/// Device-specific behavior every driver provides.
#[async_trait]
pub trait DeviceProtocol: Send + Sync {
    /// Model name.
    fn name(&self) -> &str;

    /// Decode one input report. Called once per report, in arrival order.
    ///
    /// Reports the driver does not recognize are ignored.
    fn handle_input_report(&self, report: &Report);

    /// Ask for the firmware version. Returns once the request is sent; the
    /// answer arrives as `FirmwareVersionReceived`.
    async fn request_firmware_version(&self) -> Result<()>;

    /// Ask for the firmware version and wait for the decoded answer.
    ///
    /// Resolves only while someone dispatches input reports.
    async fn query_firmware_version(&self) -> Result<FirmwareVersion>;

    fn led(&self) -> Option<&dyn LedCapability> {
        None
    }

    fn dpi(&self) -> Option<&dyn DpiCapability> {
        None
    }

    fn buttons(&self) -> Option<&dyn ButtonsCapability> {
        None
    }

    fn profiles(&self) -> Option<&dyn ProfilesCapability> {
        None
    }
}

/// One open-able device and the driver that speaks its protocol.
pub struct Configurator {
    link: DeviceLink,
    filter: DeviceFilter,
    protocol: Box<dyn DeviceProtocol>,
    inbound: Mutex<Option<mpsc::UnboundedReceiver<RawEvent>>>,
    listening: AtomicBool,
    /// Held while an event is handed to the driver and while closing.
    dispatching: StdMutex<()>,
}

impl Configurator {
    pub fn new(
        link: DeviceLink,
        filter: DeviceFilter,
        protocol: impl DeviceProtocol + 'static,
    ) -> Self {
        Self {
            link,
            filter,
            protocol: Box::new(protocol),
            inbound: Mutex::new(None),
            listening: AtomicBool::new(false),
            dispatching: StdMutex::new(()),
        }
    }

    pub fn name(&self) -> &str {
        self.protocol.name()
    }

    pub fn filter(&self) -> DeviceFilter {
        self.filter
    }

    pub fn info(&self) -> &DeviceInfo {
        self.link.info()
    }

    pub fn events(&self) -> &EventBus {
        self.link.events()
    }

    /// Whether input reports are currently being dispatched.
    pub fn is_open(&self) -> bool {
        self.listening.load(Ordering::Acquire)
    }

    /// Start listening, then open the transport.
    ///
    /// The listener is installed before the transport opens so no early input
    /// report is lost. On failure everything is undone and no event is
    /// emitted. Calling this on an open configurator is a caller error.
    pub async fn open(&self) -> Result<()> {
        let mut inbound = self.inbound.lock().await;
        let (tx, rx) = mpsc::unbounded_channel();
        *inbound = Some(rx);
        self.link.transport.set_listener(Some(tx));
        self.listening.store(true, Ordering::Release);

        if let Err(e) = self.link.transport.open().await {
            warn!(model = self.name(), error = %e, "Failed to open device");
            self.listening.store(false, Ordering::Release);
            self.link.transport.set_listener(None);
            *inbound = None;
            return Err(e);
        }
        drop(inbound);

        info!(
            model = self.name(),
            filter = %self.filter,
            path = %self.info().path,
            "Device connected"
        );
        self.link.emit(ConfiguratorEvent::Connected {
            name: self.name().to_string(),
            filter: self.filter,
        });
        Ok(())
    }

    /// Stop dispatch, then close the transport.
    ///
    /// Nothing is dispatched once this returns, including reports that were
    /// already buffered. A report being dispatched on another thread finishes
    /// first. Outstanding requests are cancelled.
    pub async fn close(&self) -> Result<()> {
        {
            let _gate = self.dispatching.lock().unwrap_or_else(PoisonError::into_inner);
            self.listening.store(false, Ordering::Release);
        }
        self.link.transport.set_listener(None);
        self.link.pending.clear();

        let result = self.link.transport.close().await;
        match &result {
            Ok(()) => debug!(model = self.name(), "Device closed"),
            Err(e) => warn!(model = self.name(), error = %e, "Closing device failed"),
        }
        result
    }

    /// Wait for the next raw event and dispatch it.
    ///
    /// Returns false once the session has ended (closed or never opened).
    pub async fn dispatch_next(&self) -> bool {
        let mut inbound = self.inbound.lock().await;
        let Some(rx) = inbound.as_mut() else {
            return false;
        };
        let next = rx.recv().await;
        match next {
            Some(event) => {
                self.dispatch(event);
                true
            }
            None => {
                *inbound = None;
                false
            }
        }
    }

    /// Dispatch until the configurator is closed.
    pub async fn run(&self) {
        while self.dispatch_next().await {}
    }

    /// Dispatch everything already buffered without waiting.
    ///
    /// Returns the number of events handled. Does nothing while closed or
    /// while another task is inside `dispatch_next`.
    pub fn dispatch_pending(&self) -> usize {
        let Ok(mut inbound) = self.inbound.try_lock() else {
            return 0;
        };
        let Some(rx) = inbound.as_mut() else {
            return 0;
        };
        let mut handled = 0;
        while self.is_open() {
            let Ok(event) = rx.try_recv() else { break };
            if self.dispatch(event) {
                handled += 1;
            }
        }
        handled
    }

    /// Hand `event` to the driver unless the configurator has been closed.
    fn dispatch(&self, event: RawEvent) -> bool {
        let _gate = self.dispatching.lock().unwrap_or_else(PoisonError::into_inner);
        if !self.is_open() {
            return false;
        }
        self.handle_event(event);
        true
    }

    /// Route one raw event. Only input reports reach the driver.
    pub fn handle_event(&self, event: RawEvent) {
        match event {
            RawEvent::InputReport(report) => {
                trace!(
                    report_id = format_args!("0x{:02X}", report.id),
                    len = report.data.len(),
                    "Dispatching input report"
                );
                self.protocol.handle_input_report(&report);
            }
            RawEvent::Disconnect => debug!(model = self.name(), "Transport reported disconnect"),
            other => trace!(event = ?other, "Ignoring raw event"),
        }
    }

    pub async fn send_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
        self.link.send_report(report_id, data).await
    }

    pub async fn send_feature_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
        self.link.send_feature_report(report_id, data).await
    }

    pub async fn request_firmware_version(&self) -> Result<()> {
        self.protocol.request_firmware_version().await
    }

    /// Ask for the firmware version and dispatch input reports until it
    /// arrives.
    ///
    /// After `timeout` the request is forgotten, so a later call sends a
    /// fresh one.
    pub async fn query_firmware_version(&self, timeout: Duration) -> Result<FirmwareVersion> {
        let answer = async {
            tokio::select! {
                version = self.protocol.query_firmware_version() => version,
                _ = self.run() => Err(Error::NotOpen),
            }
        };
        tokio::time::timeout(timeout, answer).await.map_err(|_| {
            Error::Timeout(format!(
                "no firmware version from {} within {} ms",
                self.name(),
                timeout.as_millis()
            ))
        })?
    }

    /// Forget an outstanding request so the next one is sent again.
    ///
    /// Its waiters fail with [`Error::RequestCancelled`]. Returns false if
    /// nothing was pending.
    pub fn cancel_request(&self, key: RequestKey) -> bool {
        let cancelled = self.link.pending.cancel(key);
        if cancelled {
            debug!(model = self.name(), ?key, "Request cancelled");
        }
        cancelled
    }

    pub fn led(&self) -> Option<&dyn LedCapability> {
        self.protocol.led()
    }

    pub fn dpi(&self) -> Option<&dyn DpiCapability> {
        self.protocol.dpi()
    }

    pub fn buttons(&self) -> Option<&dyn ButtonsCapability> {
        self.protocol.buttons()
    }

    pub fn profiles(&self) -> Option<&dyn ProfilesCapability> {
        self.protocol.profiles()
    }

    pub fn capabilities(&self) -> CapabilitySet {
        CapabilitySet {
            led: self.led().is_some(),
            dpi: self.dpi().is_some(),
            buttons: self.buttons().is_some(),
            profiles: self.profiles().is_some(),
        }
    }

    pub fn led_capabilities(&self) -> Option<LedCapabilities> {
        self.led().map(|led| led.led_capabilities())
    }

    pub fn dpi_capabilities(&self) -> Option<DpiCapabilities> {
        self.dpi().map(|dpi| dpi.dpi_capabilities())
    }

    pub fn buttons_capabilities(&self) -> Option<ButtonsCapabilities> {
        self.buttons().map(|buttons| buttons.buttons_capabilities())
    }

    /// Request the current state of every present family concurrently.
    pub async fn request_current_config(&self) -> Result<()> {
        let mut requests: Vec<BoxFuture<'_, Result<()>>> = Vec::new();
        if let Some(led) = self.led() {
            requests.push(led.request_current_led_config());
        }
        if let Some(dpi) = self.dpi() {
            requests.push(dpi.request_dpi_levels());
        }
        if let Some(buttons) = self.buttons() {
            requests.push(buttons.request_buttons());
        }
        debug!(
            model = self.name(),
            families = requests.len(),
            "Requesting current config"
        );
        try_join_all(requests).await?;
        Ok(())
    }
}

impl std::fmt::Debug for Configurator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Configurator")
            .field("name", &self.name())
            .field("filter", &self.filter)
            .field("open", &self.is_open())
            .field("capabilities", &self.capabilities())
            .finish()
    }
}
