//! Device configuration for a vhost-user control channel.

use crate::error::{Error, Result};
use std::path::{Path, PathBuf};

/// Longest socket path accepted (`sizeof(sun_path)` minus the terminator).
pub const MAX_SOCKET_PATH_LEN: usize = 107;

/// Default number of queue pairs.
pub const DEFAULT_QUEUE_PAIRS: u16 = 1;

/// Which side of the socket this client takes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Mode {
    /// Connect to a backend listening on the path.
    #[default]
    Client,
    /// Listen on the path and wait for the backend to connect.
    Server,
}

/// Configuration supplied by the owning device.
///
/// # Example
///
/// ```rust,ignore
/// use virtio_user::config::DeviceConfig;
///
/// let config = DeviceConfig::client("/tmp/vhost-user.sock").with_queue_pairs(2);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    /// Filesystem path of the unix socket.
    pub path: PathBuf,
    /// Client or server socket role.
    pub mode: Mode,
    /// Number of queue pairs the device drives.
    ///
    /// Not sent to the backend. The owning device reads it to decide which
    /// pairs to pass to [`enable_queue_pair`](crate::backend::enable_queue_pair).
    pub queue_pairs: u16,
}

impl DeviceConfig {
    /// Configuration for connecting to a listening backend.
    pub fn client<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            mode: Mode::Client,
            queue_pairs: DEFAULT_QUEUE_PAIRS,
        }
    }

    /// Configuration for listening on `path`.
    pub fn server<P: AsRef<Path>>(path: P) -> Self {
        Self {
            mode: Mode::Server,
            ..Self::client(path)
        }
    }

    /// Set the number of queue pairs. Zero is rejected by [`validate`](Self::validate).
    pub fn with_queue_pairs(mut self, queue_pairs: u16) -> Self {
        self.queue_pairs = queue_pairs;
        self
    }

    /// Whether this configuration listens instead of connecting.
    pub fn is_server(&self) -> bool {
        self.mode == Mode::Server
    }

    /// Check the configuration before any socket is created.
    pub fn validate(&self) -> Result<()> {
        let len = self.path.as_os_str().len();
        if len == 0 {
            return Err(Error::InvalidConfig("socket path is empty".into()));
        }
        if len > MAX_SOCKET_PATH_LEN {
            return Err(Error::InvalidConfig(format!(
                "socket path {} is {} bytes, limit is {}",
                self.path.display(),
                len,
                MAX_SOCKET_PATH_LEN
            )));
        }
        if self.queue_pairs == 0 {
            return Err(Error::InvalidConfig("queue_pairs must be at least 1".into()));
        }
        Ok(())
    }
}
