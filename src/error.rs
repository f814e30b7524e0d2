//! Error types for the vhost-user client.

use crate::protocol::RequestCode;
use thiserror::Error;

/// Result type alias using the crate's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for control-channel operations.
#[derive(Error, Debug)]
pub enum Error {
    /// I/O failure on the control socket, including short reads and writes.
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),

    /// The peer (or the caller) broke the wire contract.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// More backing files were discovered than a memory table can carry.
    #[error("resource limit exceeded: more than {limit} memory regions")]
    ResourceLimit {
        /// The transport-level region cap.
        limit: usize,
    },

    /// The memory-mapping listing could not be read, or a region file could not be opened.
    #[error("region discovery failed: {0}")]
    Discovery(String),

    /// The channel has no connected peer yet.
    #[error("control channel is not connected")]
    NotConnected,

    /// The device configuration was rejected before any socket was created.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<rustix::io::Errno> for Error {
    fn from(errno: rustix::io::Errno) -> Self {
        Error::Transport(errno.into())
    }
}

/// Ways a control message can break the protocol.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// Received flags differ from the expected version/reply combination.
    #[error("flags {found:#x} instead of {expected:#x}")]
    BadFlags {
        /// Flags found on the wire.
        found: u32,
        /// Flags that were required.
        expected: u32,
    },

    /// Declared payload length exceeds the largest payload variant.
    #[error("payload size {size} exceeds maximum {max}")]
    PayloadTooLarge {
        /// Declared payload size.
        size: u32,
        /// Largest payload the protocol allows.
        max: usize,
    },

    /// The reply names a different request than the one sent.
    #[error("expected reply to {expected}, got {found}")]
    UnexpectedReply {
        /// Request that was sent.
        expected: RequestCode,
        /// Request named in the reply.
        found: RequestCode,
    },

    /// The reply payload has the wrong size for its request.
    #[error("reply to {request} has size {found}, expected {expected}")]
    BadReplySize {
        /// Request the reply belongs to.
        request: RequestCode,
        /// Exact size required.
        expected: u32,
        /// Size found on the wire.
        found: u32,
    },

    /// The request is known but this client does not send it.
    #[error("unsupported request {0}")]
    UnsupportedRequest(RequestCode),

    /// The header carries a request code outside the protocol enumeration.
    #[error("unknown request code {0}")]
    UnknownRequestCode(u32),

    /// The argument passed with a request does not fit its payload shape.
    #[error("argument does not match payload of {0}")]
    ArgumentMismatch(RequestCode),
}
