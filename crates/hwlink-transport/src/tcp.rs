use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{DeviceStream, StreamPair, Transport};

/// TCP socket transport.
///
/// Connects to a device (or device emulator) listening on `host:port`.
pub struct TcpTransport {
    host: String,
    port: u16,
    connect_timeout: Option<Duration>,
    nodelay: bool,
    /// Handle kept for `close`; the stream halves live in the session.
    control: Option<DeviceStream>,
}

impl TcpTransport {
    /// Create a transport for `host:port`.
    ///
    /// The host must be non-empty and the port within `1..65535`.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.trim().is_empty() {
            return Err(TransportError::InvalidAddress(
                "host must be present".to_string(),
            ));
        }
        if port == 0 || port == u16::MAX {
            return Err(TransportError::InvalidAddress(format!(
                "port {port} must be within range"
            )));
        }

        Ok(Self {
            host,
            port,
            connect_timeout: None,
            nodelay: true,
            control: None,
        })
    }

    /// Parse a `host:port` string.
    pub fn parse(addr: &str) -> Result<Self> {
        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| TransportError::InvalidAddress(format!("expected host:port: {addr}")))?;
        let port = port
            .parse::<u16>()
            .map_err(|_| TransportError::InvalidAddress(format!("invalid port: {addr}")))?;
        let host = host.trim_start_matches('[').trim_end_matches(']');
        Self::new(host, port)
    }

    /// Bound the time spent establishing the connection.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = Some(timeout);
        self
    }

    /// Toggle `TCP_NODELAY` (enabled by default; frames are small and latency-bound).
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Device host name or address.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Device port.
    pub fn port(&self) -> u16 {
        self.port
    }

    fn connect(&self) -> Result<TcpStream> {
        let addr = format!("{}:{}", self.host, self.port);
        let connect_err = |source: std::io::Error| TransportError::Connect {
            addr: addr.clone(),
            source,
        };

        match self.connect_timeout {
            None => TcpStream::connect((self.host.as_str(), self.port)).map_err(connect_err),
            Some(timeout) => {
                let mut last_err = None;
                for candidate in (self.host.as_str(), self.port)
                    .to_socket_addrs()
                    .map_err(connect_err)?
                {
                    match TcpStream::connect_timeout(&candidate, timeout) {
                        Ok(stream) => return Ok(stream),
                        Err(err) => {
                            debug!(%candidate, error = %err, "connect attempt failed");
                            last_err = Some(err);
                        }
                    }
                }
                Err(connect_err(last_err.unwrap_or_else(|| {
                    std::io::Error::new(
                        std::io::ErrorKind::AddrNotAvailable,
                        "host resolved to no addresses",
                    )
                })))
            }
        }
    }
}

impl Transport for TcpTransport {
    fn open_stream(&mut self) -> Result<StreamPair> {
        if self.control.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let stream = self.connect()?;
        stream.set_nodelay(self.nodelay)?;
        let stream = DeviceStream::from_tcp(stream);
        self.control = Some(stream.try_clone()?);

        info!(host = %self.host, port = self.port, "connected to device");
        stream.into_pair()
    }

    fn close(&mut self) -> Result<()> {
        let control = self.control.take().ok_or(TransportError::NotOpen)?;
        control.shutdown()?;
        debug!(host = %self.host, port = self.port, "closed device stream");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl std::fmt::Debug for TcpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TcpTransport")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("open", &self.control.is_some())
            .finish()
    }
}
