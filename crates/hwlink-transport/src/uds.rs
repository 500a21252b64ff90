use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::traits::{DeviceStream, StreamPair, Transport};

/// Unix domain socket transport.
///
/// Connects to a filesystem-path socket exposed by a local device bridge.
pub struct UnixTransport {
    path: PathBuf,
    control: Option<DeviceStream>,
}

impl UnixTransport {
    /// Maximum socket path length.
    /// Unix `sockaddr_un.sun_path` is typically 108 bytes on Linux, 104 on macOS.
    #[cfg(target_os = "linux")]
    const MAX_PATH_LEN: usize = 108;
    #[cfg(not(target_os = "linux"))]
    const MAX_PATH_LEN: usize = 104;

    /// Create a transport for the socket at `path`.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let path_bytes = path.as_os_str().len();
        if path_bytes == 0 {
            return Err(TransportError::InvalidAddress(
                "socket path must be present".to_string(),
            ));
        }
        if path_bytes >= Self::MAX_PATH_LEN {
            return Err(TransportError::PathTooLong {
                path,
                len: path_bytes,
                max: Self::MAX_PATH_LEN,
            });
        }

        Ok(Self {
            path,
            control: None,
        })
    }

    /// The socket path this transport connects to.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Transport for UnixTransport {
    fn open_stream(&mut self) -> Result<StreamPair> {
        if self.control.is_some() {
            return Err(TransportError::AlreadyOpen);
        }

        let stream = UnixStream::connect(&self.path).map_err(|e| TransportError::ConnectPath {
            path: self.path.clone(),
            source: e,
        })?;
        let stream = DeviceStream::from_unix(stream);
        self.control = Some(stream.try_clone()?);

        info!(path = ?self.path, "connected to device socket");
        stream.into_pair()
    }

    fn close(&mut self) -> Result<()> {
        let control = self.control.take().ok_or(TransportError::NotOpen)?;
        control.shutdown()?;
        debug!(path = ?self.path, "closed device socket");
        Ok(())
    }

    fn describe(&self) -> String {
        format!("unix:{}", self.path.display())
    }
}

impl std::fmt::Debug for UnixTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnixTransport")
            .field("path", &self.path)
            .field("open", &self.control.is_some())
            .finish()
    }
}
