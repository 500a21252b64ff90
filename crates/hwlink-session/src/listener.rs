use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::event::DeviceEvent;
use crate::queue::{ListenerQueue, RecvError};

static NEXT_LISTENER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique listener identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

impl ListenerId {
    /// Raw numeric id.
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct ListenerInner {
    id: ListenerId,
    slot: Mutex<Option<Arc<ListenerQueue>>>,
}

/// A consumer of device events.
///
/// `Listener` is a cheap handle: clones refer to the same listener. Add it to
/// a session to attach a queue, then pull events with [`recv`](Self::recv),
/// [`recv_timeout`](Self::recv_timeout) or [`try_recv`](Self::try_recv).
#[derive(Clone)]
pub struct Listener {
    inner: Arc<ListenerInner>,
}

impl Listener {
    /// Create a detached listener.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ListenerInner {
                id: ListenerId(NEXT_LISTENER_ID.fetch_add(1, Ordering::Relaxed)),
                slot: Mutex::new(None),
            }),
        }
    }

    /// Listener identity.
    pub fn id(&self) -> ListenerId {
        self.inner.id
    }

    /// Attach (`Some`) or detach (`None`) the queue this listener reads from.
    ///
    /// Called by the dispatcher on add and remove.
    pub fn set_queue(&self, queue: Option<Arc<ListenerQueue>>) {
        *self.slot() = queue;
    }

    /// The currently attached queue, if any.
    pub fn queue(&self) -> Option<Arc<ListenerQueue>> {
        self.slot().clone()
    }

    /// Whether a queue is attached.
    pub fn is_registered(&self) -> bool {
        self.slot().is_some()
    }

    /// Number of events waiting in the attached queue.
    pub fn pending(&self) -> usize {
        self.queue().map_or(0, |queue| queue.len())
    }

    /// Wait for the next event.
    pub fn recv(&self) -> Result<DeviceEvent, RecvError> {
        self.attached()?.recv()
    }

    /// Wait at most `timeout` for the next event.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<DeviceEvent, RecvError> {
        self.attached()?.recv_timeout(timeout)
    }

    /// Take the next event if one is queued.
    pub fn try_recv(&self) -> Result<DeviceEvent, RecvError> {
        self.attached()?.try_recv()
    }

    fn attached(&self) -> Result<Arc<ListenerQueue>, RecvError> {
        self.queue().ok_or(RecvError::Detached)
    }

    fn slot(&self) -> MutexGuard<'_, Option<Arc<ListenerQueue>>> {
        self.inner
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Listener {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Listener {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Listener {}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("id", &self.id())
            .field("registered", &self.is_registered())
            .finish()
    }
}
