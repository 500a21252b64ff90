use std::time::Duration;

use crate::error::{Result, TransportError};
use crate::tcp::TcpTransport;
use crate::traits::{StreamPair, Transport};

#[cfg(unix)]
use crate::uds::UnixTransport;

/// Prefix that selects a Unix domain socket address.
pub const UNIX_PREFIX: &str = "unix:";

/// A transport chosen from an address string.
///
/// `host:port` selects TCP and `unix:/path` selects a Unix domain socket.
pub enum Endpoint {
    Tcp(TcpTransport),
    #[cfg(unix)]
    Unix(UnixTransport),
}

impl Endpoint {
    /// Parse a device address.
    pub fn parse(addr: &str) -> Result<Self> {
        let addr = addr.trim();
        if let Some(path) = addr.strip_prefix(UNIX_PREFIX) {
            #[cfg(unix)]
            return Ok(Self::Unix(UnixTransport::new(path)?));
            #[cfg(not(unix))]
            return Err(TransportError::InvalidAddress(format!(
                "unix sockets are not supported on this platform: {path}"
            )));
        }
        if addr.is_empty() {
            return Err(TransportError::InvalidAddress(
                "address must be present".to_string(),
            ));
        }
        Ok(Self::Tcp(TcpTransport::parse(addr)?))
    }

    /// Bound the connect time. Only TCP connects honour it.
    pub fn with_connect_timeout(self, timeout: Duration) -> Self {
        match self {
            Self::Tcp(tcp) => Self::Tcp(tcp.with_connect_timeout(timeout)),
            #[cfg(unix)]
            other => other,
        }
    }

    fn inner(&mut self) -> &mut dyn Transport {
        match self {
            Self::Tcp(tcp) => tcp,
            #[cfg(unix)]
            Self::Unix(unix) => unix,
        }
    }
}

impl Transport for Endpoint {
    fn open_stream(&mut self) -> Result<StreamPair> {
        self.inner().open_stream()
    }

    fn close(&mut self) -> Result<()> {
        self.inner().close()
    }

    fn describe(&self) -> String {
        match self {
            Self::Tcp(tcp) => tcp.describe(),
            #[cfg(unix)]
            Self::Unix(unix) => unix.describe(),
        }
    }
}

impl std::str::FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Endpoint").field(&self.describe()).finish()
    }
}

#[cfg(test)]
mod tests {
    use std::net::TcpListener;

    use super::*;

    #[test]
    fn host_port_selects_tcp() {
        let endpoint = Endpoint::parse("127.0.0.1:21324").unwrap();
        assert!(matches!(endpoint, Endpoint::Tcp(_)));
        assert_eq!(endpoint.describe(), "tcp://127.0.0.1:21324");
    }

    #[test]
    #[cfg(unix)]
    fn unix_prefix_selects_socket() {
        let endpoint: Endpoint = "unix:/tmp/device.sock".parse().unwrap();
        assert!(matches!(endpoint, Endpoint::Unix(_)));
        assert_eq!(endpoint.describe(), "unix:/tmp/device.sock");
    }

    #[test]
    fn rejects_malformed_addresses() {
        for addr in ["", "localhost", "localhost:0", "localhost:65535", "host:port"] {
            assert!(
                matches!(
                    Endpoint::parse(addr),
                    Err(TransportError::InvalidAddress(_))
                ),
                "{addr} should be rejected"
            );
        }
    }

    #[test]
    fn opens_and_closes_through_inner_transport() {
        let server = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("127.0.0.1:{}", server.local_addr().unwrap().port());

        let mut endpoint = Endpoint::parse(&addr)
            .unwrap()
            .with_connect_timeout(Duration::from_secs(2));
        let pair = endpoint.open_stream().unwrap();
        let _accepted = server.accept().unwrap();

        assert!(matches!(
            endpoint.open_stream(),
            Err(TransportError::AlreadyOpen)
        ));
        endpoint.close().unwrap();
        drop(pair);
        assert!(matches!(endpoint.close(), Err(TransportError::NotOpen)));
    }
}
