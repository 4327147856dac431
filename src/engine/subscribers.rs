//! Metrics listeners.
//!
//! Listeners are notified in the order they subscribed.  Each one is owned
//! by the [`Subscription`] handle returned from `subscribe`; dropping the
//! handle removes the listener.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

use crate::analysis::VocalMetrics;

/// A metrics listener.
pub type MetricsCallback = Arc<dyn Fn(&VocalMetrics) + Send + Sync>;

// ---------------------------------------------------------------------------
// SubscriberList
// ---------------------------------------------------------------------------

#[derive(Default)]
pub(crate) struct SubscriberList {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, MetricsCallback)>>,
}

impl SubscriberList {
    pub(crate) fn add(&self, callback: MetricsCallback) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.entries().push((id, callback));
        id
    }

    pub(crate) fn remove(&self, id: u64) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }

    pub(crate) fn len(&self) -> usize {
        self.entries().len()
    }

    /// Invoke every listener with `metrics`.
    ///
    /// The listeners are copied out and the list lock is released before any
    /// callback runs, so listeners may subscribe or unsubscribe from inside a
    /// notification.  Changes made while a notification is in progress take
    /// effect from the next one.
    pub(crate) fn notify(&self, metrics: &VocalMetrics) {
        let callbacks: Vec<MetricsCallback> =
            self.entries().iter().map(|(_, cb)| Arc::clone(cb)).collect();
        for callback in callbacks {
            callback(metrics);
        }
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(u64, MetricsCallback)>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }
}

// ---------------------------------------------------------------------------
// Subscription
// ---------------------------------------------------------------------------

/// Handle to one registered listener.
///
/// Dropping it (or calling [`unsubscribe`](Self::unsubscribe)) removes the
/// listener; [`detach`](Self::detach) keeps it for the engine's lifetime.
#[must_use = "dropping a Subscription immediately removes the listener"]
pub struct Subscription {
    id: u64,
    list: Weak<SubscriberList>,
}

impl Subscription {
    pub(crate) fn new(id: u64, list: &Arc<SubscriberList>) -> Self {
        Self {
            id,
            list: Arc::downgrade(list),
        }
    }

    /// Remove the listener.
    ///
    /// No later notification reaches it.  If a notification is already in
    /// progress on another thread (or this call comes from inside one), the
    /// listener may still be invoked once for that snapshot.
    pub fn unsubscribe(self) {}

    /// Keep the listener registered until the engine is dropped.
    pub fn detach(mut self) {
        self.list = Weak::new();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(list) = self.list.upgrade() {
            list.remove(self.id);
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
