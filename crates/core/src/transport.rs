//! HID transport abstraction for device communication.
//!
//! Provides a trait-based transport layer so that real HID devices and
//! mock devices share the same interface. A transport is created during
//! enumeration, handed to exactly one configurator, and delivers input
//! reports through a single listener sink while open.

use crate::config::TransportConfig;
use crate::device::DeviceInfo;
use crate::error::{Error, Result};
use crate::report::{RawEvent, Report, ReportId};
use async_trait::async_trait;
use std::ffi::CString;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

/// Where a transport pushes its raw events.
pub type EventSink = mpsc::UnboundedSender<RawEvent>;

/// Abstraction over one bidirectional report channel to one physical device.
#[async_trait]
pub trait HidTransport: Send + Sync {
    /// Enumeration data for the device behind this handle.
    fn info(&self) -> &DeviceInfo;

    /// Install (`Some`) or remove (`None`) the raw event listener.
    ///
    /// There is at most one listener; installing replaces the previous one.
    fn set_listener(&self, sink: Option<EventSink>);

    /// Open the channel. Input reports flow to the listener afterwards.
    async fn open(&self) -> Result<()>;

    /// Close the channel.
    async fn close(&self) -> Result<()>;

    /// Send an output report.
    async fn send_report(&self, report_id: ReportId, data: &[u8]) -> Result<()>;

    /// Send a feature report.
    async fn send_feature_report(&self, report_id: ReportId, data: &[u8]) -> Result<()>;
}

type SharedSink = Arc<Mutex<Option<EventSink>>>;

/// Blocking report I/O on one opened device. Only the I/O thread calls it.
trait RawDevice: Send + 'static {
    /// Read one report, returning 0 when nothing arrived within `timeout_ms`.
    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize>;
    fn write_output(&self, raw: &[u8]) -> Result<()>;
    fn write_feature(&self, raw: &[u8]) -> Result<()>;
}

impl RawDevice for hidapi::HidDevice {
    fn read_report(&self, buf: &mut [u8], timeout_ms: i32) -> Result<usize> {
        self.read_timeout(buf, timeout_ms)
            .map_err(|e| hid_error("read", e))
    }

    fn write_output(&self, raw: &[u8]) -> Result<()> {
        self.write(raw).map(|_| ()).map_err(|e| hid_error("write", e))
    }

    fn write_feature(&self, raw: &[u8]) -> Result<()> {
        self.send_feature_report(raw)
            .map_err(|e| hid_error("send_feature_report", e))
    }
}

enum Write {
    Output(Vec<u8>),
    Feature(Vec<u8>),
}

struct WriteRequest {
    write: Write,
    done: oneshot::Sender<Result<()>>,
}

type WriteQueue = mpsc::UnboundedSender<WriteRequest>;

/// An open device: the I/O thread owns the handle, writes reach it by queue.
struct Session {
    writes: WriteQueue,
    io_thread: thread::JoinHandle<()>,
}

impl Session {
    fn start(device: impl RawDevice, sink: SharedSink, config: TransportConfig) -> Result<Self> {
        let (writes, queue) = mpsc::unbounded_channel();
        let io_thread = thread::Builder::new()
            .name("mousecfg-hid-io".into())
            .spawn(move || io_loop(device, queue, sink, config))
            .map_err(|e| Error::Hid(format!("spawn I/O thread: {e}")))?;
        Ok(Self { writes, io_thread })
    }

    /// Stop the I/O thread and wait until it has released the device.
    async fn stop(self) -> Result<()> {
        let Session { writes, io_thread } = self;
        // An empty, closed queue is the thread's signal to exit.
        drop(writes);
        tokio::task::spawn_blocking(move || io_thread.join())
            .await
            .map_err(|e| Error::Hid(format!("join HID I/O thread: {e}")))?
            .map_err(|_| Error::Hid("HID I/O thread panicked".into()))
    }
}

fn device_gone() -> Error {
    Error::Hid("HID device disconnected".into())
}

async fn submit(writes: &WriteQueue, write: Write) -> Result<()> {
    let (done, result) = oneshot::channel();
    writes
        .send(WriteRequest { write, done })
        .map_err(|_| device_gone())?;
    result.await.map_err(|_| device_gone())?
}

/// Transport backed by a hidapi device path.
///
/// While open, one thread owns the `HidDevice`. It alternates between
/// draining queued writes and a bounded read, so no lock is held across
/// blocking hidapi calls and the async side never blocks.
pub struct HidapiTransport {
    info: DeviceInfo,
    config: TransportConfig,
    sink: SharedSink,
    session: Mutex<Option<Session>>,
}

impl HidapiTransport {
    pub fn new(info: DeviceInfo, config: TransportConfig) -> Self {
        Self {
            info,
            config,
            sink: Arc::new(Mutex::new(None)),
            session: Mutex::new(None),
        }
    }

    fn writes(&self) -> Result<WriteQueue> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|s| s.writes.clone())
            .ok_or(Error::NotOpen)
    }
}

fn hid_error(context: &str, err: hidapi::HidError) -> Error {
    let msg = format!("{context}: {err}");
    let lower = msg.to_lowercase();
    if lower.contains("permission") || lower.contains("access denied") {
        Error::PermissionDenied(msg)
    } else {
        Error::Hid(msg)
    }
}

fn deliver(sink: &SharedSink, event: RawEvent) {
    if let Some(tx) = sink.lock().unwrap_or_else(PoisonError::into_inner).as_ref() {
        // A closed receiver just means nobody is listening any more.
        let _ = tx.send(event);
    }
}

fn io_loop(
    device: impl RawDevice,
    mut writes: mpsc::UnboundedReceiver<WriteRequest>,
    sink: SharedSink,
    config: TransportConfig,
) {
    let mut buf = vec![0u8; config.read_buffer_len];
    loop {
        loop {
            match writes.try_recv() {
                Ok(request) => {
                    let result = match &request.write {
                        Write::Output(raw) => device.write_output(raw),
                        Write::Feature(raw) => device.write_feature(raw),
                    };
                    // The caller may have given up waiting.
                    let _ = request.done.send(result);
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("HID I/O thread stopped");
                    return;
                }
            }
        }

        match device.read_report(&mut buf, config.read_timeout_ms) {
            Ok(0) => {}
            Ok(n) => {
                if let Some(report) = Report::from_raw(&buf[..n], config.numbered_reports) {
                    trace!(
                        report_id = format_args!("0x{:02X}", report.id),
                        data_hex = format_args!("{:02X?}", report.data),
                        "HID RX"
                    );
                    deliver(&sink, RawEvent::InputReport(report));
                }
            }
            Err(e) => {
                warn!(error = %e, "HID read failed, stopping I/O thread");
                deliver(&sink, RawEvent::Disconnect);
                return;
            }
        }
    }
}

#[async_trait]
impl HidTransport for HidapiTransport {
    fn info(&self) -> &DeviceInfo {
        &self.info
    }

    fn set_listener(&self, sink: Option<EventSink>) {
        *self.sink.lock().unwrap_or_else(PoisonError::into_inner) = sink;
    }

    async fn open(&self) -> Result<()> {
        let mut session = self.session.lock().unwrap_or_else(PoisonError::into_inner);
        if session.is_some() {
            return Err(Error::Hid(format!("{} is already open", self.info.path)));
        }

        let path = CString::new(self.info.path.clone())
            .map_err(|e| Error::Hid(format!("invalid device path: {e}")))?;
        let api = hidapi::HidApi::new().map_err(|e| hid_error("hidapi init", e))?;
        let device = api.open_path(&path).map_err(|e| {
            hid_error(
                &format!(
                    "open HID device (VID=0x{:04X} PID=0x{:04X})",
                    self.info.vid, self.info.pid
                ),
                e,
            )
        })?;

        *session = Some(Session::start(
            device,
            Arc::clone(&self.sink),
            self.config.clone(),
        )?);
        debug!(path = %self.info.path, "HID device opened");
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let session = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let session = session.ok_or(Error::NotOpen)?;
        session.stop().await?;
        debug!(path = %self.info.path, "HID device closed");
        Ok(())
    }

    async fn send_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
        let writes = self.writes()?;
        let raw = Report::new(report_id, data).to_raw();
        submit(&writes, Write::Output(raw)).await
    }

    async fn send_feature_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
        let writes = self.writes()?;
        let raw = Report::new(report_id, data).to_raw();
        submit(&writes, Write::Feature(raw)).await
    }
}

/// A mock HID transport for testing.
///
/// Records every call, replies to registered reports by pushing input
/// reports into the listener, and can fail or hold operations on demand.
#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::device::{DeviceFilter, DeviceInfo};
    use std::collections::HashMap;
    use tokio::sync::Semaphore;

    /// Which HID channel a report went out on.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub enum ReportKind {
        Output,
        Feature,
    }

    /// A report the configurator sent.
    #[derive(Debug, Clone, PartialEq, Eq)]
    pub struct SentReport {
        pub kind: ReportKind,
        pub id: ReportId,
        pub data: Vec<u8>,
    }

    #[derive(Default)]
    struct MockState {
        open: bool,
        sink: Option<EventSink>,
        calls: Vec<&'static str>,
        sent: Vec<SentReport>,
        replies: HashMap<(ReportKind, ReportId), Vec<Report>>,
        fail_open: bool,
        fail_sends: bool,
    }

    /// Mock transport with scripted replies.
    pub struct MockTransport {
        info: DeviceInfo,
        state: Mutex<MockState>,
        gate: Mutex<Option<Arc<Semaphore>>>,
    }

    impl MockTransport {
        pub fn new(filter: DeviceFilter) -> Self {
            Self {
                info: DeviceInfo {
                    vid: filter.vendor_id,
                    pid: filter.product_id,
                    path: format!("mock:{:04x}:{:04x}", filter.vendor_id, filter.product_id),
                    serial: None,
                    product: Some("Mock Mouse".into()),
                    interface_number: 0,
                    usage_page: 0xFFC0,
                },
                state: Mutex::new(MockState::default()),
                gate: Mutex::new(None),
            }
        }

        pub fn with_interface(mut self, interface_number: i32) -> Self {
            self.info.interface_number = interface_number;
            self
        }

        /// Push `replies` into the listener each time report `id` is sent.
        pub fn on_send(&self, kind: ReportKind, id: ReportId, replies: Vec<Report>) {
            self.state.lock().unwrap().replies.insert((kind, id), replies);
        }

        /// Simulate the device emitting a raw event. Returns false if no listener.
        pub fn inject(&self, event: RawEvent) -> bool {
            let state = self.state.lock().unwrap();
            match state.sink.as_ref() {
                Some(tx) => tx.send(event).is_ok(),
                None => false,
            }
        }

        pub fn inject_report(&self, id: ReportId, data: &[u8]) -> bool {
            self.inject(RawEvent::InputReport(Report::new(id, data)))
        }

        pub fn fail_open(&self) {
            self.state.lock().unwrap().fail_open = true;
        }

        pub fn fail_sends(&self, fail: bool) {
            self.state.lock().unwrap().fail_sends = fail;
        }

        /// Make every following send wait until [`release_sends`](Self::release_sends).
        pub fn hold_sends(&self) {
            *self.gate.lock().unwrap() = Some(Arc::new(Semaphore::new(0)));
        }

        pub fn release_sends(&self) {
            if let Some(gate) = self.gate.lock().unwrap().take() {
                gate.add_permits(Semaphore::MAX_PERMITS / 2);
            }
        }

        pub fn sent(&self) -> Vec<SentReport> {
            self.state.lock().unwrap().sent.clone()
        }

        pub fn calls(&self) -> Vec<&'static str> {
            self.state.lock().unwrap().calls.clone()
        }

        pub fn is_open(&self) -> bool {
            self.state.lock().unwrap().open
        }

        pub fn has_listener(&self) -> bool {
            self.state.lock().unwrap().sink.is_some()
        }

        async fn send(&self, kind: ReportKind, id: ReportId, data: &[u8]) -> Result<()> {
            let gate = self.gate.lock().unwrap().clone();
            if let Some(gate) = gate {
                gate.acquire()
                    .await
                    .map_err(|_| Error::Hid("mock: gate closed".into()))?
                    .forget();
            }

            let mut state = self.state.lock().unwrap();
            if !state.open {
                return Err(Error::NotOpen);
            }
            if state.fail_sends {
                return Err(Error::Hid("mock: report rejected".into()));
            }
            state.sent.push(SentReport {
                kind,
                id,
                data: data.to_vec(),
            });
            let replies = state.replies.get(&(kind, id)).cloned().unwrap_or_default();
            if let Some(tx) = state.sink.as_ref() {
                for reply in replies {
                    let _ = tx.send(RawEvent::InputReport(reply));
                }
            }
            Ok(())
        }
    }

    #[async_trait]
    impl HidTransport for MockTransport {
        fn info(&self) -> &DeviceInfo {
            &self.info
        }

        fn set_listener(&self, sink: Option<EventSink>) {
            let mut state = self.state.lock().unwrap();
            state
                .calls
                .push(if sink.is_some() { "listen" } else { "unlisten" });
            state.sink = sink;
        }

        async fn open(&self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("open");
            if state.fail_open {
                return Err(Error::DeviceNotFound("mock: device removed".into()));
            }
            state.open = true;
            Ok(())
        }

        async fn close(&self) -> Result<()> {
            let mut state = self.state.lock().unwrap();
            state.calls.push("close");
            state.open = false;
            Ok(())
        }

        async fn send_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
            self.send(ReportKind::Output, report_id, data).await
        }

        async fn send_feature_report(&self, report_id: ReportId, data: &[u8]) -> Result<()> {
            self.send(ReportKind::Feature, report_id, data).await
        }
    }
}
