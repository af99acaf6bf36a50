//! Configurator events and the publish/subscribe bus that carries them.
//!
//! A configurator does not own its listeners. It is handed an [`EventBus`]
//! at construction and publishes into it; the manager, diagnostics, or tests
//! subscribe independently.
//!
//! Delivery is synchronous and follows registration order. The bus lock is
//! released before listeners run, so a listener may subscribe or emit from
//! inside its callback. A panicking listener is logged and skipped for that
//! event only.

use crate::buttons::{BindTarget, MouseButtonPosition};
use crate::device::DeviceFilter;
use crate::dpi::DpiLevels;
use crate::led::{LedState, LedZone};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::warn;

/// Firmware version reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FirmwareVersion {
    pub major: u8,
    pub minor: u8,
}

impl std::fmt::Display for FirmwareVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// Everything a configurator can tell its listeners.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfiguratorEvent {
    /// The transport opened and input reports are flowing.
    Connected { name: String, filter: DeviceFilter },
    /// Answer to a firmware version request.
    FirmwareVersionReceived(FirmwareVersion),
    /// Current lighting of one zone.
    LedStateReceived { zone: LedZone, state: LedState },
    /// Current CPI of every DPI level.
    DpiLevelsReceived(DpiLevels),
    /// Current binding of one button.
    ButtonBindingReceived {
        position: MouseButtonPosition,
        target: BindTarget,
    },
    /// The device switched to (or reported) an onboard profile.
    ProfileReceived { id: u8 },
}

/// What a listener wants after handling an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Keep receiving events.
    Delivered,
    /// Remove this listener from the bus.
    Detach,
}

/// Receives configurator events.
pub trait EventListener: Send + Sync {
    fn on_event(&self, event: &ConfiguratorEvent) -> Delivery;
}

impl<F> EventListener for F
where
    F: Fn(&ConfiguratorEvent) + Send + Sync,
{
    fn on_event(&self, event: &ConfiguratorEvent) -> Delivery {
        self(event);
        Delivery::Delivered
    }
}

/// Forwards events into an unbounded channel; detaches once the receiver is gone.
struct ChannelListener {
    tx: mpsc::UnboundedSender<ConfiguratorEvent>,
}

impl EventListener for ChannelListener {
    fn on_event(&self, event: &ConfiguratorEvent) -> Delivery {
        match self.tx.send(event.clone()) {
            Ok(()) => Delivery::Delivered,
            Err(_) => Delivery::Detach,
        }
    }
}

/// Handle returned by [`EventBus::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Default)]
struct BusInner {
    next_id: u64,
    listeners: Vec<(ListenerId, Arc<dyn EventListener>)>,
}

/// Cloneable publish/subscribe channel for [`ConfiguratorEvent`]s.
#[derive(Clone, Default)]
pub struct EventBus {
    inner: Arc<Mutex<BusInner>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener; it receives events after all earlier listeners.
    pub fn subscribe(&self, listener: impl EventListener + 'static) -> ListenerId {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let id = ListenerId(inner.next_id);
        inner.next_id += 1;
        inner.listeners.push((id, Arc::new(listener)));
        id
    }

    /// Unregisters a listener. Returns false if it was already gone.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let before = inner.listeners.len();
        inner.listeners.retain(|(lid, _)| *lid != id);
        inner.listeners.len() != before
    }

    /// Subscribe through a channel, for consumers that await events.
    pub fn channel(&self) -> mpsc::UnboundedReceiver<ConfiguratorEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribe(ChannelListener { tx });
        rx
    }

    pub fn listener_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .len()
    }

    /// Deliver one event to every listener, in registration order.
    pub fn emit(&self, event: &ConfiguratorEvent) {
        let snapshot: Vec<(ListenerId, Arc<dyn EventListener>)> = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .listeners
            .clone();

        let mut detached = Vec::new();
        for (id, listener) in snapshot {
            match panic::catch_unwind(AssertUnwindSafe(|| listener.on_event(event))) {
                Ok(Delivery::Delivered) => {}
                Ok(Delivery::Detach) => detached.push(id),
                Err(_) => warn!(listener = id.0, ?event, "event listener panicked"),
            }
        }

        if !detached.is_empty() {
            let mut inner = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
            inner.listeners.retain(|(id, _)| !detached.contains(id));
        }
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
