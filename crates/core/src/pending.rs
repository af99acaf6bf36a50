//! Outstanding request/response pairs.
//!
//! A driver marks a request pending before sending it. When the answer comes
//! back through input-report dispatch it resolves the key, which wakes any
//! waiter and tells the driver the report was expected. Answers nobody asked
//! for resolve nothing and can be dropped.

use crate::report::{Report, ReportId};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// Identifies one kind of outstanding request.
///
/// `tag` separates requests that share a report ID, such as the LED query
/// for different zones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestKey {
    pub report_id: ReportId,
    pub tag: u8,
}

impl RequestKey {
    pub const fn new(report_id: ReportId) -> Self {
        Self { report_id, tag: 0 }
    }

    pub const fn tagged(report_id: ReportId, tag: u8) -> Self {
        Self { report_id, tag }
    }
}

type Waiters = Vec<oneshot::Sender<Report>>;

/// Shared map of outstanding requests. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct PendingRequests {
    inner: Arc<Mutex<HashMap<RequestKey, Waiters>>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<RequestKey, Waiters>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mark `key` pending. Returns false if it already was.
    pub fn begin(&self, key: RequestKey) -> bool {
        let mut map = self.lock();
        if map.contains_key(&key) {
            return false;
        }
        map.insert(key, Vec::new());
        true
    }

    /// Receive the report that resolves `key`.
    ///
    /// The receiver errors if the request is cancelled instead.
    pub fn wait(&self, key: RequestKey) -> oneshot::Receiver<Report> {
        let (tx, rx) = oneshot::channel();
        self.lock().entry(key).or_default().push(tx);
        rx
    }

    /// Complete `key` with `report`. Returns false if nothing was pending.
    pub fn resolve(&self, key: RequestKey, report: &Report) -> bool {
        let Some(waiters) = self.lock().remove(&key) else {
            return false;
        };
        for tx in waiters {
            // A waiter that gave up is not an error.
            let _ = tx.send(report.clone());
        }
        true
    }

    /// Drop `key`; its waiters see a closed channel. Returns false if
    /// nothing was pending.
    pub fn cancel(&self, key: RequestKey) -> bool {
        self.lock().remove(&key).is_some()
    }

    pub fn is_pending(&self, key: RequestKey) -> bool {
        self.lock().contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Cancel everything.
    pub fn clear(&self) {
        self.lock().clear();
    }
}
