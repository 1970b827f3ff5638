//! Per-consumer inbound frame queues.
//!
//! Every listener owns a bounded FIFO. The connector pushes into all attached
//! listeners; a full listener loses its oldest frame rather than stalling the
//! read loop or its siblings.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use parking_lot::Mutex;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::frame::Frame;

/// Result of pushing one frame into one listener.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum PushOutcome {
    Delivered,
    /// Delivered, but the oldest buffered frame was discarded to make room.
    DroppedOldest,
    /// The listener is closed and should be detached.
    Closed,
}

pub(crate) struct ListenerShared {
    id: Uuid,
    created_at: Instant,
    capacity: usize,
    queue: Mutex<VecDeque<Frame>>,
    notify: Notify,
    closed: AtomicBool,
}

impl ListenerShared {
    pub(crate) fn new(capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            id: Uuid::new_v4(),
            created_at: Instant::now(),
            capacity,
            queue: Mutex::new(VecDeque::with_capacity(capacity)),
            notify: Notify::new(),
            closed: AtomicBool::new(false),
        })
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    pub(crate) fn created_at(&self) -> Instant {
        self.created_at
    }

    pub(crate) fn push(&self, frame: Frame) -> PushOutcome {
        if self.closed.load(Ordering::Acquire) {
            return PushOutcome::Closed;
        }
        let mut queue = self.queue.lock();
        let dropped = if queue.len() >= self.capacity {
            queue.pop_front();
            true
        } else {
            false
        };
        queue.push_back(frame);
        drop(queue);

        self.notify.notify_one();
        if dropped {
            PushOutcome::DroppedOldest
        } else {
            PushOutcome::Delivered
        }
    }

    /// Closes the listener and discards anything still buffered.
    pub(crate) fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.queue.lock().clear();
        self.notify.notify_waiters();
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

/// Handle to a bounded inbound frame queue attached to a connector.
///
/// Created by [`WsConnector::create_listener`](crate::WsConnector::create_listener).
pub struct Listener {
    shared: Arc<ListenerShared>,
}

impl Listener {
    pub(crate) fn new(shared: Arc<ListenerShared>) -> Self {
        Self { shared }
    }

    /// Unique id of this listener, used for removal.
    pub fn id(&self) -> Uuid {
        self.shared.id
    }

    /// Awaits the next frame in FIFO order.
    ///
    /// Returns `None` once the listener is closed; closing drops any frames
    /// still buffered.
    pub async fn recv(&self) -> Option<Frame> {
        loop {
            let notified = self.shared.notify.notified();
            if let Some(frame) = self.shared.queue.lock().pop_front() {
                return Some(frame);
            }
            if self.shared.is_closed() {
                return None;
            }
            notified.await;
        }
    }

    /// Takes the next frame without waiting.
    pub fn try_recv(&self) -> Option<Frame> {
        self.shared.queue.lock().pop_front()
    }

    /// Closes the listener, waking any pending `recv`.
    pub fn close(&self) {
        self.shared.close();
    }

    /// Whether [`close`](Self::close) has been called (locally or by the
    /// connector).
    pub fn is_closed(&self) -> bool {
        self.shared.is_closed()
    }
}

impl std::fmt::Debug for Listener {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.shared.id)
            .field("closed", &self.shared.is_closed())
            .finish()
    }
}
