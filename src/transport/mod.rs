//! Control-channel transport.
//!
//! - [`MessageChannel`]: the narrow interface the dispatcher talks through
//! - [`Channel`]: a unix socket set up in client or server mode
//! - [`codec`]: `sendmsg`/`recvmsg` framing with descriptor passing

pub mod codec;
mod socket;

pub use socket::{Channel, MAX_VIRTIO_USER_BACKLOG};

use crate::error::Result;
use crate::protocol::{ControlMessage, VHOST_USER_REPLY_MASK, VHOST_USER_VERSION};
use rustix::fd::BorrowedFd;
use std::os::unix::net::UnixStream;

/// Flags every reply must carry.
pub const REPLY_FLAGS: u32 = VHOST_USER_VERSION | VHOST_USER_REPLY_MASK;

/// A connected, message-oriented view of the control socket.
///
/// At most one request may be outstanding; callers sharing a channel across
/// threads must serialize access themselves.
pub trait MessageChannel {
    /// Whether a peer is connected.
    fn is_connected(&self) -> bool;

    /// Send one message with `fds` attached as ancillary data.
    fn send_with_descriptors(
        &mut self,
        message: &ControlMessage,
        fds: &[BorrowedFd<'_>],
    ) -> Result<()>;

    /// Block until one complete reply arrives.
    ///
    /// There is no timeout: an unresponsive peer blocks the caller.
    fn receive(&mut self) -> Result<ControlMessage>;
}

impl MessageChannel for UnixStream {
    fn is_connected(&self) -> bool {
        true
    }

    fn send_with_descriptors(
        &mut self,
        message: &ControlMessage,
        fds: &[BorrowedFd<'_>],
    ) -> Result<()> {
        let sent = codec::send_message(&*self, message, fds)?;
        crate::observability::record_bytes_sent(sent);
        Ok(())
    }

    fn receive(&mut self) -> Result<ControlMessage> {
        // Descriptors in replies are not part of this protocol subset; drop closes them.
        let (message, _fds) = codec::recv_message(&*self, REPLY_FLAGS)?;
        Ok(message)
    }
}
