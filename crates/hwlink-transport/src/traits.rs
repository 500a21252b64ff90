use std::io::{Read, Write};
use std::net::Shutdown;

use crate::error::Result;

/// An opened transport: one stream, split into a read half and a write half.
///
/// Both halves refer to the same underlying socket, so closing either one
/// (or the transport) unblocks a reader parked on the other.
#[derive(Debug)]
pub struct StreamPair {
    /// Read side, handed to the session reader job.
    pub reader: DeviceStream,
    /// Write side, used for outbound frames.
    pub writer: DeviceStream,
}

/// A source of device byte streams.
///
/// Implementations assume blocking semantics. `open_stream` is called once per
/// session connect; `close` tears the stream down and must release any thread
/// blocked reading from it.
pub trait Transport: Send {
    /// Open the underlying byte stream and return its read/write halves.
    fn open_stream(&mut self) -> Result<StreamPair>;

    /// Close the currently open stream.
    fn close(&mut self) -> Result<()>;

    /// Human-readable endpoint description for diagnostics.
    fn describe(&self) -> String;
}

/// A connected device stream. Implements Read + Write.
///
/// This is the fundamental I/O type returned by transports.
pub struct DeviceStream {
    inner: DeviceStreamInner,
}

enum DeviceStreamInner {
    Tcp(std::net::TcpStream),
    #[cfg(unix)]
    Unix(std::os::unix::net::UnixStream),
}

impl Read for DeviceStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DeviceStreamInner::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for DeviceStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.inner {
            DeviceStreamInner::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.inner {
            DeviceStreamInner::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.flush(),
        }
    }
}

impl DeviceStream {
    /// Wrap a connected TCP stream.
    pub fn from_tcp(stream: std::net::TcpStream) -> Self {
        Self {
            inner: DeviceStreamInner::Tcp(stream),
        }
    }

    /// Wrap a connected Unix domain socket stream.
    #[cfg(unix)]
    pub fn from_unix(stream: std::os::unix::net::UnixStream) -> Self {
        Self {
            inner: DeviceStreamInner::Unix(stream),
        }
    }

    /// Split into independent read and write halves (clones the descriptor).
    pub fn into_pair(self) -> Result<StreamPair> {
        let reader = self.try_clone()?;
        Ok(StreamPair {
            reader,
            writer: self,
        })
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            DeviceStreamInner::Tcp(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.set_read_timeout(timeout).map_err(Into::into),
        }
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        match &self.inner {
            DeviceStreamInner::Tcp(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => {
                stream.set_write_timeout(timeout).map_err(Into::into)
            }
        }
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        match &self.inner {
            DeviceStreamInner::Tcp(stream) => Ok(Self::from_tcp(stream.try_clone()?)),
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => Ok(Self::from_unix(stream.try_clone()?)),
        }
    }

    /// Shut down both directions of the stream.
    ///
    /// A peer that already went away is not an error here.
    pub fn shutdown(&self) -> Result<()> {
        let result = match &self.inner {
            DeviceStreamInner::Tcp(stream) => stream.shutdown(Shutdown::Both),
            #[cfg(unix)]
            DeviceStreamInner::Unix(stream) => stream.shutdown(Shutdown::Both),
        };
        match result {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(err.into()),
        }
    }
}

impl std::fmt::Debug for DeviceStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.inner {
            DeviceStreamInner::Tcp(stream) => f
                .debug_struct("DeviceStream")
                .field("type", &"tcp")
                .field("peer", &stream.peer_addr().ok())
                .finish(),
            #[cfg(unix)]
            DeviceStreamInner::Unix(_) => {
                f.debug_struct("DeviceStream").field("type", &"unix").finish()
            }
        }
    }
}
