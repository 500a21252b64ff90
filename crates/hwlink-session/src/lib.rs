//! Device sessions and event dispatch.
//!
//! A [`Session`] connects a [`Transport`](hwlink_transport::Transport), starts
//! one reader thread, and fans every decoded message out to the registered
//! [`Listener`]s through bounded per-listener queues.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod listener;
pub mod queue;
pub mod session;

pub use config::SessionConfig;
pub use dispatch::{
    CancelToken, DispatchState, DispatchStats, Dispatcher, PublishOutcome, ReaderJob,
    StatsSnapshot, StopReason, READER_THREAD_NAME,
};
pub use error::{Result, SessionError};
pub use event::DeviceEvent;
pub use listener::{Listener, ListenerId};
pub use queue::{ListenerQueue, OverflowPolicy, PushOutcome, RecvError, DEFAULT_QUEUE_CAPACITY};
pub use session::Session;
