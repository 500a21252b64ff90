use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use hwlink_frame::{FrameError, MessageReader};
use hwlink_registry::{Message, RegistryError};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use crate::error::{Result, SessionError};
use crate::event::DeviceEvent;
use crate::listener::{Listener, ListenerId};
use crate::queue::{ListenerQueue, OverflowPolicy, PushOutcome, DEFAULT_QUEUE_CAPACITY};

/// Name of the per-session reader thread.
pub const READER_THREAD_NAME: &str = "hwlink-reader";

/// Shared, cooperative cancellation flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
}

impl CancelToken {
    /// Create a token that has not fired.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been requested.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Why a reader job stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "kebab-case")]
pub enum StopReason {
    /// The session was closed.
    Cancelled,
    /// The device closed the stream (possibly mid-frame).
    EndOfStream,
    /// The stream failed or lost frame synchronization.
    Fatal(String),
}

/// Lifecycle of a session's dispatch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchState {
    /// Never connected.
    Idle,
    /// A reader job is decoding and fanning out.
    Running,
    /// The last reader job has finished.
    Stopped(StopReason),
}

/// Monotonic dispatch counters.
#[derive(Debug, Default)]
pub struct DispatchStats {
    frames_decoded: AtomicU64,
    events_delivered: AtomicU64,
    unknown_header_codes: AtomicU64,
    malformed_payloads: AtomicU64,
    truncated_frames: AtomicU64,
    events_dropped: AtomicU64,
}

/// Point-in-time copy of [`DispatchStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub frames_decoded: u64,
    pub events_delivered: u64,
    pub unknown_header_codes: u64,
    pub malformed_payloads: u64,
    pub truncated_frames: u64,
    pub events_dropped: u64,
}

impl DispatchStats {
    /// Copy the current counter values.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            events_delivered: self.events_delivered.load(Ordering::Relaxed),
            unknown_header_codes: self.unknown_header_codes.load(Ordering::Relaxed),
            malformed_payloads: self.malformed_payloads.load(Ordering::Relaxed),
            truncated_frames: self.truncated_frames.load(Ordering::Relaxed),
            events_dropped: self.events_dropped.load(Ordering::Relaxed),
        }
    }
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Whether a fan-out pass reached every listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublishOutcome {
    /// Every listener in the snapshot was offered the event.
    Completed,
    /// Cancellation fired while waiting on a full queue.
    Cancelled,
}

struct Registration {
    listener: Listener,
    queue: Arc<ListenerQueue>,
}

/// Listener set plus fan-out for one session.
///
/// Registration and the start of each fan-out pass are serialized by the
/// listener-set mutex. Events are pushed outside that lock; a listener removed
/// mid-pass has its queue closed first, so the push is refused.
pub struct Dispatcher {
    listeners: Mutex<Vec<Registration>>,
    queue_capacity: usize,
    overflow_policy: OverflowPolicy,
    next_sequence: AtomicU64,
    stats: DispatchStats,
    state: Mutex<DispatchState>,
    state_changed: Condvar,
}

impl Dispatcher {
    /// Create a dispatcher whose listener queues hold `queue_capacity` events.
    pub fn new(queue_capacity: usize, overflow_policy: OverflowPolicy) -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            queue_capacity,
            overflow_policy,
            next_sequence: AtomicU64::new(0),
            stats: DispatchStats::default(),
            state: Mutex::new(DispatchState::Idle),
            state_changed: Condvar::new(),
        }
    }

    /// Register a listener and attach a fresh queue to it.
    ///
    /// A listener can belong to one listener set at a time.
    pub fn add_listener(&self, listener: &Listener) -> Result<()> {
        let mut listeners = self.lock_listeners();
        if listener.is_registered() || listeners.iter().any(|r| r.listener == *listener) {
            return Err(SessionError::AlreadyRegistered(listener.id()));
        }

        let queue = Arc::new(ListenerQueue::new(self.queue_capacity));
        listener.set_queue(Some(Arc::clone(&queue)));
        listeners.push(Registration {
            listener: listener.clone(),
            queue,
        });
        debug!(listener = %listener.id(), total = listeners.len(), "listener added");
        Ok(())
    }

    /// Unregister a listener, closing and detaching its queue.
    pub fn remove_listener(&self, listener: &Listener) -> Result<()> {
        let mut listeners = self.lock_listeners();
        let index = listeners
            .iter()
            .position(|r| r.listener == *listener)
            .ok_or(SessionError::NotRegistered(listener.id()))?;

        let registration = listeners.remove(index);
        registration.queue.close();
        registration.listener.set_queue(None);
        debug!(listener = %listener.id(), total = listeners.len(), "listener removed");
        Ok(())
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.lock_listeners().len()
    }

    /// Ids of registered listeners, in registration order.
    pub fn listener_ids(&self) -> Vec<ListenerId> {
        self.lock_listeners()
            .iter()
            .map(|r| r.listener.id())
            .collect()
    }

    /// Wrap a decoded message in an event and offer it to every listener
    /// registered right now, in registration order.
    pub fn publish(
        &self,
        header_code: u16,
        message: Arc<dyn Message>,
        cancel: &CancelToken,
    ) -> PublishOutcome {
        let sequence = self.next_sequence.fetch_add(1, Ordering::Relaxed);
        let event = DeviceEvent::new(header_code, sequence, message);

        let targets: Vec<(ListenerId, Arc<ListenerQueue>)> = self
            .lock_listeners()
            .iter()
            .map(|r| (r.listener.id(), Arc::clone(&r.queue)))
            .collect();

        for (id, queue) in targets {
            match queue.push(event.clone(), self.overflow_policy, cancel) {
                PushOutcome::Delivered => bump(&self.stats.events_delivered),
                PushOutcome::DroppedOldest => {
                    bump(&self.stats.events_delivered);
                    bump(&self.stats.events_dropped);
                    warn!(listener = %id, sequence, "listener queue full, dropped oldest event");
                }
                PushOutcome::Skipped => {
                    bump(&self.stats.events_dropped);
                    warn!(listener = %id, sequence, "listener queue full, event skipped");
                }
                PushOutcome::Closed => {
                    trace!(listener = %id, sequence, "listener removed during fan-out");
                }
                PushOutcome::Cancelled => return PublishOutcome::Cancelled,
            }
        }
        PublishOutcome::Completed
    }

    /// Current dispatch state.
    pub fn state(&self) -> DispatchState {
        self.lock_state().clone()
    }

    /// Why the last reader job stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        match &*self.lock_state() {
            DispatchState::Stopped(reason) => Some(reason.clone()),
            _ => None,
        }
    }

    /// Wait up to `timeout` for the dispatch loop to stop.
    pub fn wait_stopped(&self, timeout: Duration) -> Option<StopReason> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock_state();
        loop {
            if let DispatchState::Stopped(reason) = &*state {
                return Some(reason.clone());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return None;
            }
            state = self
                .state_changed
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Counter snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Live counters.
    pub fn counters(&self) -> &DispatchStats {
        &self.stats
    }

    /// Queue capacity given to new listeners.
    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity
    }

    /// Policy applied when a listener queue is full.
    pub fn overflow_policy(&self) -> OverflowPolicy {
        self.overflow_policy
    }

    fn set_state(&self, next: DispatchState) {
        *self.lock_state() = next;
        self.state_changed.notify_all();
    }

    fn lock_listeners(&self) -> MutexGuard<'_, Vec<Registration>> {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_state(&self) -> MutexGuard<'_, DispatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY, OverflowPolicy::default())
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("listeners", &self.listener_count())
            .field("queue_capacity", &self.queue_capacity)
            .field("overflow_policy", &self.overflow_policy)
            .field("state", &self.state())
            .finish()
    }
}

/// The single reader thread of a connected session.
///
/// Decodes frames in stream order and fans each message out through the
/// [`Dispatcher`] until cancelled, the stream ends, or a fatal error occurs.
#[derive(Debug)]
pub struct ReaderJob {
    cancel: CancelToken,
    handle: JoinHandle<StopReason>,
}

impl ReaderJob {
    /// Mark the dispatcher running and start the reader thread.
    pub fn spawn<R>(reader: MessageReader<R>, dispatcher: Arc<Dispatcher>) -> Result<Self>
    where
        R: Read + Send + 'static,
    {
        let cancel = CancelToken::new();
        dispatcher.set_state(DispatchState::Running);

        let spawned = std::thread::Builder::new()
            .name(READER_THREAD_NAME.to_string())
            .spawn({
                let cancel = cancel.clone();
                let dispatcher = Arc::clone(&dispatcher);
                move || run(reader, &dispatcher, &cancel)
            });

        match spawned {
            Ok(handle) => Ok(Self { cancel, handle }),
            Err(err) => {
                dispatcher.set_state(DispatchState::Stopped(StopReason::Fatal(err.to_string())));
                Err(SessionError::Spawn(err))
            }
        }
    }

    /// Token that stops this job.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Request the job to stop. A read blocked on the stream is only released
    /// once the transport is closed.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether the thread has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the thread to exit.
    pub fn join(self) -> StopReason {
        self.handle
            .join()
            .unwrap_or_else(|_| StopReason::Fatal("reader thread panicked".to_string()))
    }
}

fn run<R: Read>(
    mut reader: MessageReader<R>,
    dispatcher: &Dispatcher,
    cancel: &CancelToken,
) -> StopReason {
    debug!("reader job started");
    let reason = read_loop(&mut reader, dispatcher, cancel);
    match &reason {
        StopReason::Cancelled => debug!("reader job cancelled"),
        StopReason::EndOfStream => info!("device closed the stream"),
        StopReason::Fatal(message) => error!(error = %message, "reader job failed"),
    }
    dispatcher.set_state(DispatchState::Stopped(reason.clone()));
    reason
}

fn read_loop<R: Read>(
    reader: &mut MessageReader<R>,
    dispatcher: &Dispatcher,
    cancel: &CancelToken,
) -> StopReason {
    let stats = &dispatcher.stats;
    loop {
        if cancel.is_cancelled() {
            return StopReason::Cancelled;
        }

        match reader.read_message() {
            Ok(decoded) => {
                bump(&stats.frames_decoded);
                if dispatcher.publish(decoded.header_code, decoded.message, cancel)
                    == PublishOutcome::Cancelled
                {
                    return StopReason::Cancelled;
                }
            }
            // Closing the transport surfaces here as EOF or an I/O error.
            Err(_) if cancel.is_cancelled() => return StopReason::Cancelled,
            Err(FrameError::ConnectionClosed) => return StopReason::EndOfStream,
            Err(FrameError::Truncated { expected, received }) => {
                bump(&stats.truncated_frames);
                warn!(expected, received, "stream ended inside a frame");
                return StopReason::EndOfStream;
            }
            Err(FrameError::Registry(RegistryError::UnknownHeaderCode(code))) => {
                bump(&stats.unknown_header_codes);
                warn!(header_code = code, "skipping frame with unknown header code");
            }
            Err(FrameError::Registry(err)) => {
                bump(&stats.malformed_payloads);
                warn!(error = %err, "dropping malformed message");
            }
            // Read timeout elapsed with no data; poll cancellation again.
            Err(FrameError::Io(err))
                if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => {}
            Err(err) => return StopReason::Fatal(err.to_string()),
        }
    }
}
