use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hwlink_frame::{FrameReader, FrameWriter, MessageReader, MessageWriter};
use hwlink_registry::{Message, MessageRegistry};
use hwlink_transport::{DeviceStream, StreamPair, Transport};
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::dispatch::{DispatchState, Dispatcher, ReaderJob, StatsSnapshot, StopReason};
use crate::error::{Result, SessionError};
use crate::listener::Listener;

struct Link<T> {
    transport: T,
    job: Option<ReaderJob>,
}

/// A connection to one device.
///
/// Owns the transport, the message registry and the listener set. While
/// connected, one reader thread decodes inbound frames and fans them out to
/// every registered [`Listener`]. All methods take `&self`; wrap the session
/// in an `Arc` to share it between threads.
///
/// Nothing reconnects automatically: after the reader stops (see
/// [`stop_reason`](Self::stop_reason)) the owner calls [`close`](Self::close)
/// and then [`connect`](Self::connect) again.
pub struct Session<T: Transport> {
    registry: Arc<MessageRegistry>,
    config: SessionConfig,
    dispatcher: Arc<Dispatcher>,
    link: Mutex<Link<T>>,
    writer: Mutex<Option<MessageWriter<DeviceStream>>>,
}

impl<T: Transport> Session<T> {
    /// Create a disconnected session with default configuration.
    pub fn new(transport: T, registry: Arc<MessageRegistry>) -> Self {
        Self::build(transport, registry, SessionConfig::default())
    }

    /// Create a disconnected session with explicit configuration.
    pub fn with_config(
        transport: T,
        registry: Arc<MessageRegistry>,
        config: SessionConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, registry, config))
    }

    fn build(transport: T, registry: Arc<MessageRegistry>, config: SessionConfig) -> Self {
        let dispatcher = Arc::new(Dispatcher::new(
            config.queue_capacity,
            config.overflow_policy,
        ));
        Self {
            registry,
            config,
            dispatcher,
            link: Mutex::new(Link {
                transport,
                job: None,
            }),
            writer: Mutex::new(None),
        }
    }

    /// Open the transport and start the reader thread.
    pub fn connect(&self) -> Result<()> {
        let mut link = self.lock_link();
        if link.job.is_some() {
            return Err(SessionError::AlreadyConnected);
        }

        let StreamPair { reader, writer } = link.transport.open_stream()?;
        match self.start(reader, writer) {
            Ok(job) => {
                link.job = Some(job);
                info!(endpoint = %link.transport.describe(), "session connected");
                Ok(())
            }
            Err(err) => {
                if let Err(close_err) = link.transport.close() {
                    warn!(error = %close_err, "failed to close transport after connect error");
                }
                Err(err)
            }
        }
    }

    fn start(&self, reader: DeviceStream, writer: DeviceStream) -> Result<ReaderJob> {
        let frame_config = self.config.frame_config();
        let frames_in = FrameReader::with_config_device(reader, frame_config.clone())?;
        let frames_out = FrameWriter::with_config_device(writer, frame_config)?;

        // The writer goes in first so listeners can reply to the first event.
        *self.lock_writer() = Some(MessageWriter::from_frames(
            frames_out,
            Arc::clone(&self.registry),
        ));

        let reader = MessageReader::from_frames(frames_in, Arc::clone(&self.registry));
        ReaderJob::spawn(reader, Arc::clone(&self.dispatcher)).inspect_err(|_| {
            self.lock_writer().take();
        })
    }

    /// Stop the reader thread and close the transport.
    ///
    /// Registered listeners stay registered and keep any queued events.
    pub fn close(&self) -> Result<()> {
        let mut link = self.lock_link();
        let job = link.job.take().ok_or(SessionError::NotConnected)?;

        job.cancel();
        // A send blocked in write holds the writer lock until the stream is
        // shut down.
        let closed = link.transport.close();
        self.lock_writer().take();
        let reason = job.join();
        debug!(?reason, "reader job joined");
        info!(endpoint = %link.transport.describe(), "session closed");

        closed.map_err(Into::into)
    }

    /// Encode `message`, write it as one frame and flush.
    ///
    /// Returns the header code the message was sent under.
    pub fn send(&self, message: &dyn Message) -> Result<u16> {
        let mut writer = self.lock_writer();
        let writer = writer.as_mut().ok_or(SessionError::NotConnected)?;
        Ok(writer.send(message)?)
    }

    /// Register a listener. Events decoded from now on are queued for it.
    pub fn add_listener(&self, listener: &Listener) -> Result<()> {
        self.dispatcher.add_listener(listener)
    }

    /// Unregister a listener and detach its queue.
    pub fn remove_listener(&self, listener: &Listener) -> Result<()> {
        self.dispatcher.remove_listener(listener)
    }

    /// Number of registered listeners.
    pub fn listener_count(&self) -> usize {
        self.dispatcher.listener_count()
    }

    /// Whether `connect` succeeded and `close` has not been called since.
    pub fn is_connected(&self) -> bool {
        self.lock_link().job.is_some()
    }

    /// Current dispatch state.
    pub fn state(&self) -> DispatchState {
        self.dispatcher.state()
    }

    /// Why the reader thread stopped, once it has.
    pub fn stop_reason(&self) -> Option<StopReason> {
        self.dispatcher.stop_reason()
    }

    /// Wait up to `timeout` for the reader thread to stop.
    pub fn wait_stopped(&self, timeout: Duration) -> Option<StopReason> {
        self.dispatcher.wait_stopped(timeout)
    }

    /// Dispatch counters.
    pub fn stats(&self) -> StatsSnapshot {
        self.dispatcher.stats()
    }

    /// The message registry shared with the codec.
    pub fn registry(&self) -> &Arc<MessageRegistry> {
        &self.registry
    }

    /// Session configuration.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Transport endpoint description.
    pub fn describe(&self) -> String {
        self.lock_link().transport.describe()
    }

    fn lock_link(&self) -> MutexGuard<'_, Link<T>> {
        self.link.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_writer(&self) -> MutexGuard<'_, Option<MessageWriter<DeviceStream>>> {
        self.writer.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        if self.is_connected() {
            if let Err(err) = self.close() {
                warn!(error = %err, "failed to close session on drop");
            }
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("endpoint", &self.describe())
            .field("connected", &self.is_connected())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}
