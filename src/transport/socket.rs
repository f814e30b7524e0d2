//! Unix socket setup for the control channel.

use super::MessageChannel;
use crate::config::{DeviceConfig, Mode};
use crate::error::{Error, Result};
use crate::protocol::ControlMessage;
use rustix::fd::{BorrowedFd, OwnedFd};
use rustix::net::{AddressFamily, SocketAddrUnix, SocketFlags, SocketType};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

/// Pending-connection backlog for server mode.
pub const MAX_VIRTIO_USER_BACKLOG: i32 = 1;

/// A control channel in client or server mode.
///
/// Client mode holds a connected stream from the moment [`Channel::setup`]
/// returns. Server mode only holds a non-blocking listener; accepting the
/// backend happens elsewhere and the result is handed over with
/// [`Channel::attach`].
#[derive(Debug)]
pub struct Channel {
    path: PathBuf,
    mode: Mode,
    stream: Option<UnixStream>,
    listener: Option<UnixListener>,
}

impl Channel {
    /// Create the socket described by `config`.
    ///
    /// # Errors
    ///
    /// Fails if the configuration is invalid, or if socket creation, connect
    /// (client) or bind/listen (server) fails. The socket is closed on every
    /// failure path.
    pub fn setup(config: &DeviceConfig) -> Result<Self> {
        config.validate()?;

        let mut channel = Self {
            path: config.path.clone(),
            mode: config.mode,
            stream: None,
            listener: None,
        };

        match config.mode {
            Mode::Client => {
                let stream = connect(&config.path).inspect_err(|e| {
                    tracing::error!(path = %config.path.display(), error = %e, "connect error");
                })?;
                channel.stream = Some(stream);
            }
            Mode::Server => {
                let listener = listen(&config.path).inspect_err(|e| {
                    tracing::error!(
                        path = %config.path.display(),
                        error = %e,
                        "failed to start server; remove the path and try again"
                    );
                })?;
                channel.listener = Some(listener);
            }
        }

        tracing::debug!(path = %channel.path.display(), mode = ?channel.mode, "control channel ready");
        Ok(channel)
    }

    /// Socket path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Socket role.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// The listening socket, in server mode.
    pub fn listener(&self) -> Option<&UnixListener> {
        self.listener.as_ref()
    }

    /// The connected stream, once there is one.
    pub fn stream(&self) -> Option<&UnixStream> {
        self.stream.as_ref()
    }

    /// Hand over a backend connection accepted from [`Channel::listener`].
    pub fn attach(&mut self, stream: UnixStream) {
        self.stream = Some(stream);
    }

    fn connected(&mut self) -> Result<&mut UnixStream> {
        self.stream.as_mut().ok_or(Error::NotConnected)
    }
}

impl MessageChannel for Channel {
    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn send_with_descriptors(
        &mut self,
        message: &ControlMessage,
        fds: &[BorrowedFd<'_>],
    ) -> Result<()> {
        self.connected()?.send_with_descriptors(message, fds)
    }

    fn receive(&mut self) -> Result<ControlMessage> {
        self.connected()?.receive()
    }
}

fn stream_socket() -> Result<OwnedFd> {
    Ok(rustix::net::socket_with(
        AddressFamily::UNIX,
        SocketType::STREAM,
        SocketFlags::CLOEXEC,
        None,
    )?)
}

fn connect(path: &Path) -> Result<UnixStream> {
    let fd = stream_socket()?;
    let addr = SocketAddrUnix::new(path)?;
    rustix::net::connect(&fd, &addr)?;
    Ok(UnixStream::from(fd))
}

fn listen(path: &Path) -> Result<UnixListener> {
    let fd = stream_socket()?;
    let addr = SocketAddrUnix::new(path)?;
    rustix::net::bind(&fd, &addr)?;
    rustix::net::listen(&fd, MAX_VIRTIO_USER_BACKLOG)?;

    let listener = UnixListener::from(fd);
    listener.set_nonblocking(true)?;
    Ok(listener)
}
