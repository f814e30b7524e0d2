//! vhost-user control protocol: request codes, payloads and message framing.
//!
//! Every message is a 12-byte header followed by `size` payload bytes:
//!
//! | Field     | Type  | Notes                                   |
//! |-----------|-------|-----------------------------------------|
//! | `request` | `u32` | [`RequestCode`]                         |
//! | `flags`   | `u32` | bits 0-1 version, bit 2 reply           |
//! | `size`    | `u32` | payload length, at most [`MAX_PAYLOAD_SIZE`] |
//!
//! Descriptors travel as `SCM_RIGHTS` ancillary data on the same `sendmsg`;
//! see [`crate::transport`].

mod message;
mod payload;
mod request;

pub use message::{ControlMessage, FrameHeader, MessageHeader, VHOST_USER_HDR_SIZE};
pub use payload::{
    MAX_PAYLOAD_SIZE, MEMORY_REGION_SIZE, MEMORY_TABLE_HEADER_SIZE, MemoryRegion, MemoryTable,
    Payload, U64_PAYLOAD_SIZE, VHOST_MEMORY_MAX_NREGIONS, VHOST_VRING_F_LOG, VRING_ADDR_SIZE,
    VRING_STATE_SIZE, VringAddr, VringState,
};
pub use request::{
    RequestCode, VHOST_USER_REPLY_MASK, VHOST_USER_VERSION, VHOST_USER_VERSION_MASK,
    VHOST_USER_VRING_IDX_MASK, VHOST_USER_VRING_NOFD_MASK,
};
