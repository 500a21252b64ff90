use std::collections::VecDeque;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::dispatch::CancelToken;
use crate::event::DeviceEvent;

/// Default listener queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 32;

/// How often a producer blocked on a full queue re-checks cancellation.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// What the reader does when a listener queue is full.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OverflowPolicy {
    /// Wait for the consumer to drain. A slow listener stalls every listener.
    #[default]
    Block,
    /// Evict the oldest queued event to make room.
    DropOldest,
    /// Skip this listener for the event and report the gap to its consumer.
    Error,
}

/// Result of offering an event to a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// The event was queued.
    Delivered,
    /// The event was queued after evicting the oldest one.
    DroppedOldest,
    /// The queue was full and the event was not queued.
    Skipped,
    /// The queue was closed; its listener has been removed.
    Closed,
    /// Cancellation was requested while waiting for room.
    Cancelled,
}

/// Why a listener could not receive an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum RecvError {
    /// The listener has no queue: it was never added or has been removed.
    #[error("listener is not registered")]
    Detached,
    /// Events were skipped because the queue was full.
    #[error("listener queue overflowed, {missed} event(s) missed")]
    Overflowed { missed: u64 },
    /// No event arrived before the deadline.
    #[error("timed out waiting for an event")]
    Timeout,
    /// No event is queued right now.
    #[error("no event queued")]
    Empty,
}

/// A run of events skipped under [`OverflowPolicy::Error`], not yet reported.
#[derive(Debug, Clone, Copy)]
struct Gap {
    /// Queued events ahead of the gap.
    after: usize,
    missed: u64,
}

#[derive(Debug, Default)]
struct QueueState {
    events: VecDeque<DeviceEvent>,
    /// Ordered front to back; `after` never decreases along the deque.
    gaps: VecDeque<Gap>,
    closed: bool,
}

impl QueueState {
    /// Record one skipped event behind everything queued so far.
    fn skip(&mut self) {
        let position = self.events.len();
        match self.gaps.back_mut() {
            Some(gap) if gap.after == position => gap.missed += 1,
            _ => self.gaps.push_back(Gap {
                after: position,
                missed: 1,
            }),
        }
    }

    /// Remove the head event and shift every gap one place forward.
    fn pop_event(&mut self) -> Option<DeviceEvent> {
        let event = self.events.pop_front()?;
        for gap in &mut self.gaps {
            gap.after = gap.after.saturating_sub(1);
        }
        Some(event)
    }
}

/// Bounded FIFO between the reader thread and one listener.
///
/// Single producer (the reader thread), single consumer (the listener's
/// owner). Closing the queue wakes both sides; nothing can be pushed after.
#[derive(Debug)]
pub struct ListenerQueue {
    capacity: usize,
    state: Mutex<QueueState>,
    not_empty: Condvar,
    not_full: Condvar,
}

impl ListenerQueue {
    /// Create a queue holding at most `capacity` events (minimum 1).
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            state: Mutex::new(QueueState::default()),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    /// Maximum number of queued events.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of events currently queued.
    pub fn len(&self) -> usize {
        self.lock().events.len()
    }

    /// Whether no event is queued.
    pub fn is_empty(&self) -> bool {
        self.lock().events.is_empty()
    }

    /// Whether the queue has been closed.
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Offer an event, applying `policy` when the queue is full.
    ///
    /// Under [`OverflowPolicy::Block`] this waits until the consumer makes
    /// room, the queue is closed, or `cancel` fires.
    pub fn push(
        &self,
        event: DeviceEvent,
        policy: OverflowPolicy,
        cancel: &CancelToken,
    ) -> PushOutcome {
        let mut state = self.lock();
        loop {
            if state.closed {
                return PushOutcome::Closed;
            }

            if state.events.len() < self.capacity {
                state.events.push_back(event);
                self.not_empty.notify_one();
                return PushOutcome::Delivered;
            }

            match policy {
                OverflowPolicy::Block => {
                    if cancel.is_cancelled() {
                        return PushOutcome::Cancelled;
                    }
                    state = self
                        .not_full
                        .wait_timeout(state, CANCEL_POLL_INTERVAL)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                OverflowPolicy::DropOldest => {
                    state.pop_event();
                    state.events.push_back(event);
                    self.not_empty.notify_one();
                    return PushOutcome::DroppedOldest;
                }
                OverflowPolicy::Error => {
                    state.skip();
                    return PushOutcome::Skipped;
                }
            }
        }
    }

    /// Close the queue, discard queued events and wake any waiter.
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.events.clear();
        state.gaps.clear();
        drop(state);
        self.not_empty.notify_all();
        self.not_full.notify_all();
    }

    /// Receive the next event, waiting as long as necessary.
    pub fn recv(&self) -> Result<DeviceEvent, RecvError> {
        let mut state = self.lock();
        loop {
            if let Some(result) = self.take(&mut state) {
                return result;
            }
            state = self
                .not_empty
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Receive the next event, waiting at most `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<DeviceEvent, RecvError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(result) = self.take(&mut state) {
                return result;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(RecvError::Timeout);
            }
            state = self
                .not_empty
                .wait_timeout(state, remaining)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Receive the next event without waiting.
    pub fn try_recv(&self) -> Result<DeviceEvent, RecvError> {
        let mut state = self.lock();
        self.take(&mut state).unwrap_or(Err(RecvError::Empty))
    }

    fn take(&self, state: &mut QueueState) -> Option<Result<DeviceEvent, RecvError>> {
        if state.closed {
            return Some(Err(RecvError::Detached));
        }

        if let Some(gap) = state.gaps.front().copied() {
            if gap.after == 0 {
                state.gaps.pop_front();
                return Some(Err(RecvError::Overflowed { missed: gap.missed }));
            }
        }

        let event = state.pop_event()?;
        self.not_full.notify_one();
        Some(Ok(event))
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for ListenerQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::thread;

    use hwlink_registry::catalog::Ping;

    use super::*;

    fn event(sequence: u64) -> DeviceEvent {
        DeviceEvent::new(1, sequence, Arc::new(Ping::default()))
    }

    fn sequences(queue: &ListenerQueue) -> Vec<u64> {
        std::iter::from_fn(|| queue.try_recv().ok())
            .map(|event| event.sequence())
            .collect()
    }

    #[test]
    fn fifo_order() {
        let queue = ListenerQueue::default();
        let cancel = CancelToken::new();
        for seq in 0..5 {
            assert_eq!(
                queue.push(event(seq), OverflowPolicy::Block, &cancel),
                PushOutcome::Delivered
            );
        }
        assert_eq!(sequences(&queue), vec![0, 1, 2, 3, 4]);
        assert_eq!(queue.try_recv().unwrap_err(), RecvError::Empty);
    }

    #[test]
    fn capacity_events_accepted_without_blocking() {
        let queue = ListenerQueue::default();
        let cancel = CancelToken::new();
        for seq in 0..DEFAULT_QUEUE_CAPACITY as u64 {
            assert_eq!(
                queue.push(event(seq), OverflowPolicy::Block, &cancel),
                PushOutcome::Delivered
            );
        }
        assert_eq!(queue.len(), 32);
    }

    #[test]
    fn push_past_capacity_blocks_until_drained() {
        let queue = Arc::new(ListenerQueue::default());
        let cancel = CancelToken::new();
        for seq in 0..32 {
            queue.push(event(seq), OverflowPolicy::Block, &cancel);
        }

        let (done_tx, done_rx) = mpsc::channel();
        let producer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            thread::spawn(move || {
                let outcome = queue.push(event(32), OverflowPolicy::Block, &cancel);
                done_tx.send(outcome).unwrap();
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());

        assert_eq!(queue.recv().unwrap().sequence(), 0);
        assert_eq!(
            done_rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            PushOutcome::Delivered
        );
        producer.join().unwrap();
        assert_eq!(queue.len(), 32);
    }

    #[test]
    fn blocked_push_honours_cancellation() {
        let queue = Arc::new(ListenerQueue::new(1));
        let cancel = CancelToken::new();
        queue.push(event(0), OverflowPolicy::Block, &cancel);

        let producer = {
            let queue = Arc::clone(&queue);
            let cancel = cancel.clone();
            thread::spawn(move || queue.push(event(1), OverflowPolicy::Block, &cancel))
        };

        thread::sleep(Duration::from_millis(100));
        cancel.cancel();
        assert_eq!(producer.join().unwrap(), PushOutcome::Cancelled);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn blocked_push_released_by_close() {
        let queue = Arc::new(ListenerQueue::new(1));
        let cancel = CancelToken::new();
        queue.push(event(0), OverflowPolicy::Block, &cancel);

        let producer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.push(event(1), OverflowPolicy::Block, &cancel))
        };

        thread::sleep(Duration::from_millis(100));
        queue.close();
        assert_eq!(producer.join().unwrap(), PushOutcome::Closed);
        assert_eq!(queue.recv().unwrap_err(), RecvError::Detached);
    }

    #[test]
    fn drop_oldest_evicts_head() {
        let queue = ListenerQueue::new(3);
        let cancel = CancelToken::new();
        for seq in 0..3 {
            queue.push(event(seq), OverflowPolicy::DropOldest, &cancel);
        }
        assert_eq!(
            queue.push(event(3), OverflowPolicy::DropOldest, &cancel),
            PushOutcome::DroppedOldest
        );
        assert_eq!(sequences(&queue), vec![1, 2, 3]);
    }

    #[test]
    fn error_policy_reports_gap_in_position() {
        let queue = ListenerQueue::new(2);
        let cancel = CancelToken::new();
        queue.push(event(0), OverflowPolicy::Error, &cancel);
        queue.push(event(1), OverflowPolicy::Error, &cancel);
        assert_eq!(
            queue.push(event(2), OverflowPolicy::Error, &cancel),
            PushOutcome::Skipped
        );
        assert_eq!(
            queue.push(event(3), OverflowPolicy::Error, &cancel),
            PushOutcome::Skipped
        );

        assert_eq!(queue.try_recv().unwrap().sequence(), 0);
        assert_eq!(queue.try_recv().unwrap().sequence(), 1);
        assert_eq!(
            queue.try_recv().unwrap_err(),
            RecvError::Overflowed { missed: 2 }
        );

        queue.push(event(4), OverflowPolicy::Error, &cancel);
        assert_eq!(queue.try_recv().unwrap().sequence(), 4);
        assert_eq!(queue.try_recv().unwrap_err(), RecvError::Empty);
    }

    #[test]
    fn error_policy_keeps_separate_gaps_apart() {
        let queue = ListenerQueue::new(2);
        let cancel = CancelToken::new();
        queue.push(event(0), OverflowPolicy::Error, &cancel);
        queue.push(event(1), OverflowPolicy::Error, &cancel);
        assert_eq!(
            queue.push(event(2), OverflowPolicy::Error, &cancel),
            PushOutcome::Skipped
        );

        assert_eq!(queue.try_recv().unwrap().sequence(), 0);
        assert_eq!(
            queue.push(event(3), OverflowPolicy::Error, &cancel),
            PushOutcome::Delivered
        );
        assert_eq!(
            queue.push(event(4), OverflowPolicy::Error, &cancel),
            PushOutcome::Skipped
        );

        assert_eq!(queue.try_recv().unwrap().sequence(), 1);
        assert_eq!(
            queue.try_recv().unwrap_err(),
            RecvError::Overflowed { missed: 1 }
        );
        assert_eq!(queue.try_recv().unwrap().sequence(), 3);
        assert_eq!(
            queue.try_recv().unwrap_err(),
            RecvError::Overflowed { missed: 1 }
        );
        assert_eq!(queue.try_recv().unwrap_err(), RecvError::Empty);
    }

    #[test]
    fn drop_oldest_after_gap_keeps_gap_position() {
        let queue = ListenerQueue::new(2);
        let cancel = CancelToken::new();
        queue.push(event(0), OverflowPolicy::Error, &cancel);
        queue.push(event(1), OverflowPolicy::Error, &cancel);
        queue.push(event(2), OverflowPolicy::Error, &cancel);
        assert_eq!(
            queue.push(event(3), OverflowPolicy::DropOldest, &cancel),
            PushOutcome::DroppedOldest
        );

        assert_eq!(queue.try_recv().unwrap().sequence(), 1);
        assert_eq!(
            queue.try_recv().unwrap_err(),
            RecvError::Overflowed { missed: 1 }
        );
        assert_eq!(queue.try_recv().unwrap().sequence(), 3);
    }

    #[test]
    fn recv_timeout_expires() {
        let queue = ListenerQueue::default();
        let started = Instant::now();
        assert_eq!(
            queue.recv_timeout(Duration::from_millis(50)).unwrap_err(),
            RecvError::Timeout
        );
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn recv_wakes_on_push() {
        let queue = Arc::new(ListenerQueue::default());
        let consumer = {
            let queue = Arc::clone(&queue);
            thread::spawn(move || queue.recv_timeout(Duration::from_secs(5)))
        };

        thread::sleep(Duration::from_millis(50));
        queue.push(event(9), OverflowPolicy::Block, &CancelToken::new());
        assert_eq!(consumer.join().unwrap().unwrap().sequence(), 9);
    }

    #[test]
    fn zero_capacity_is_raised_to_one() {
        assert_eq!(ListenerQueue::new(0).capacity(), 1);
    }
}
