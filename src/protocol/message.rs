//! Control message header and framing.

use super::payload::{MAX_PAYLOAD_SIZE, Payload};
use super::request::{RequestCode, VHOST_USER_REPLY_MASK, VHOST_USER_VERSION};
use crate::error::{ProtocolViolation, Result};

/// Size of the fixed header: request code, flags, payload size (`u32` each).
pub const VHOST_USER_HDR_SIZE: usize = 12;

/// Decoded fixed header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    /// Request the message belongs to.
    pub request: RequestCode,
    /// Version bits plus the reply bit.
    pub flags: u32,
    /// Number of payload bytes following the header.
    pub size: u32,
}

impl MessageHeader {
    /// Encode into the fixed wire layout.
    pub fn to_bytes(&self) -> [u8; VHOST_USER_HDR_SIZE] {
        let mut raw = [0u8; VHOST_USER_HDR_SIZE];
        raw[0..4].copy_from_slice(&self.request.as_u32().to_ne_bytes());
        raw[4..8].copy_from_slice(&self.flags.to_ne_bytes());
        raw[8..12].copy_from_slice(&self.size.to_ne_bytes());
        raw
    }

    /// Decode and validate a received header.
    ///
    /// Equivalent to [`FrameHeader::parse`] followed by [`FrameHeader::resolve`].
    pub fn parse(raw: &[u8; VHOST_USER_HDR_SIZE], expected_flags: u32) -> Result<Self> {
        FrameHeader::parse(raw, expected_flags)?.resolve()
    }
}

/// A header whose framing fields are validated but whose request code is not.
///
/// Receivers read the declared payload before resolving the code, so an
/// unknown code does not leave payload bytes behind in the stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    /// Raw request code.
    pub code: u32,
    /// Version bits plus the reply bit.
    pub flags: u32,
    /// Number of payload bytes following the header.
    pub size: u32,
}

impl FrameHeader {
    /// Check flags and payload size.
    ///
    /// `expected_flags` must match exactly. The payload size is bounded by
    /// [`MAX_PAYLOAD_SIZE`] so the caller never reads past a full memory table.
    pub fn parse(raw: &[u8; VHOST_USER_HDR_SIZE], expected_flags: u32) -> Result<Self> {
        let word =
            |at: usize| u32::from_ne_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]]);

        let flags = word(4);
        if flags != expected_flags {
            return Err(ProtocolViolation::BadFlags {
                found: flags,
                expected: expected_flags,
            }
            .into());
        }

        let size = word(8);
        if size as usize > MAX_PAYLOAD_SIZE {
            return Err(ProtocolViolation::PayloadTooLarge {
                size,
                max: MAX_PAYLOAD_SIZE,
            }
            .into());
        }

        Ok(Self {
            code: word(0),
            flags,
            size,
        })
    }

    /// Map the raw code onto a [`RequestCode`].
    pub fn resolve(self) -> Result<MessageHeader> {
        Ok(MessageHeader {
            request: RequestCode::try_from(self.code)?,
            flags: self.flags,
            size: self.size,
        })
    }
}

/// A control message: header fields plus a tagged payload.
///
/// Each dispatcher call builds and owns its own message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlMessage {
    request: RequestCode,
    flags: u32,
    payload: Payload,
}

impl ControlMessage {
    /// A request message. The reply bit is never set on requests.
    pub fn request(request: RequestCode, payload: Payload) -> Self {
        Self {
            request,
            flags: VHOST_USER_VERSION,
            payload,
        }
    }

    /// A reply message, as a backend would send it.
    pub fn reply(request: RequestCode, payload: Payload) -> Self {
        Self {
            request,
            flags: VHOST_USER_VERSION | VHOST_USER_REPLY_MASK,
            payload,
        }
    }

    /// Rebuild a message from a validated header and its payload bytes.
    pub fn from_parts(header: MessageHeader, body: &[u8]) -> Self {
        Self {
            request: header.request,
            flags: header.flags,
            payload: Payload::decode(header.request, body),
        }
    }

    /// Request code.
    pub fn request_code(&self) -> RequestCode {
        self.request
    }

    /// Header flags.
    pub fn flags(&self) -> u32 {
        self.flags
    }

    /// Whether the reply bit is set.
    pub fn is_reply(&self) -> bool {
        self.flags & VHOST_USER_REPLY_MASK != 0
    }

    /// Declared payload length.
    pub fn size(&self) -> u32 {
        self.payload.wire_len() as u32
    }

    /// The payload.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Consume the message, returning its payload.
    pub fn into_payload(self) -> Payload {
        self.payload
    }

    /// Header for this message.
    pub fn header(&self) -> MessageHeader {
        MessageHeader {
            request: self.request,
            flags: self.flags,
            size: self.size(),
        }
    }

    /// Serialize header and declared-length payload into one buffer.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(VHOST_USER_HDR_SIZE + self.payload.wire_len());
        buf.extend_from_slice(&self.header().to_bytes());
        self.payload.encode(&mut buf);
        buf
    }
}
