//! [`ViewerHub`] – per-viewer fan-out.
//!
//! Each connected viewer owns a bounded queue. The hub only ever uses
//! `try_send`, so a viewer that stops reading can never stall a mutation:
//! once its queue is full it is evicted, and its session sees the end of the
//! stream after draining whatever was already queued.
//!
//! The hub is not synchronised on its own. The bridge core keeps it under the
//! same lock as the device state so that registration, the initial snapshot
//! and every later broadcast are totally ordered.

use std::collections::HashMap;
use std::sync::Arc;

use hearth_types::ViewerEvent;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};
use uuid::Uuid;

/// Default number of frames a viewer may fall behind before it is evicted.
pub const DEFAULT_VIEWER_CAPACITY: usize = 256;

/// Opaque identifier of one connected viewer.
pub type ViewerId = Uuid;

// ────────────────────────────────────────────────────────────────────────────
// Subscription
// ────────────────────────────────────────────────────────────────────────────

/// The receiving half handed to a viewer session.
#[derive(Debug)]
pub struct ViewerSubscription {
    id: ViewerId,
    receiver: mpsc::Receiver<Arc<ViewerEvent>>,
}

impl ViewerSubscription {
    pub fn id(&self) -> ViewerId {
        self.id
    }

    /// Next frame for this viewer; `None` once the viewer was evicted or
    /// removed and the queue is drained.
    pub async fn recv(&mut self) -> Option<Arc<ViewerEvent>> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Option<Arc<ViewerEvent>> {
        self.receiver.try_recv().ok()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Hub
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ViewerHub {
    viewers: HashMap<ViewerId, mpsc::Sender<Arc<ViewerEvent>>>,
    capacity: usize,
}

impl ViewerHub {
    /// `capacity` is clamped to at least 1.
    pub fn new(capacity: usize) -> Self {
        Self {
            viewers: HashMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Register a viewer and queue `initial` as its first frame.
    pub fn register(&mut self, initial: ViewerEvent) -> ViewerSubscription {
        let id = Uuid::new_v4();
        let (sender, receiver) = mpsc::channel(self.capacity);
        // Capacity is at least 1 and nothing else holds the sender yet.
        let queued = sender.try_send(Arc::new(initial)).is_ok();
        debug_assert!(queued, "fresh viewer queue rejected its first frame");
        self.viewers.insert(id, sender);
        debug!(viewer = %id, viewers = self.viewers.len(), "viewer registered");
        ViewerSubscription { id, receiver }
    }

    /// Forget `id`. Returns whether it was still registered.
    pub fn remove(&mut self, id: ViewerId) -> bool {
        let removed = self.viewers.remove(&id).is_some();
        if removed {
            debug!(viewer = %id, viewers = self.viewers.len(), "viewer removed");
        }
        removed
    }

    pub fn len(&self) -> usize {
        self.viewers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty()
    }

    /// Queue `events`, in order, for every registered viewer.
    pub fn broadcast(&mut self, events: &[ViewerEvent]) {
        if events.is_empty() || self.viewers.is_empty() {
            return;
        }
        let frames: Vec<Arc<ViewerEvent>> = events.iter().cloned().map(Arc::new).collect();
        self.viewers
            .retain(|id, sender| frames.iter().all(|frame| deliver(*id, sender, frame)));
    }

    /// Queue `event` for a single viewer.
    pub fn send_to(&mut self, id: ViewerId, event: ViewerEvent) -> bool {
        let Some(sender) = self.viewers.get(&id) else {
            return false;
        };
        let delivered = deliver(id, sender, &Arc::new(event));
        if !delivered {
            self.viewers.remove(&id);
        }
        delivered
    }
}

impl Default for ViewerHub {
    fn default() -> Self {
        Self::new(DEFAULT_VIEWER_CAPACITY)
    }
}

/// Returns `false` when the viewer must be dropped.
fn deliver(id: ViewerId, sender: &mpsc::Sender<Arc<ViewerEvent>>, frame: &Arc<ViewerEvent>) -> bool {
    match sender.try_send(Arc::clone(frame)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            warn!(viewer = %id, "viewer queue full; evicting slow viewer");
            false
        }
        Err(TrySendError::Closed(_)) => {
            debug!(viewer = %id, "viewer went away");
            false
        }
    }
}
