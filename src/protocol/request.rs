//! Request codes and header flag constants.

use crate::error::ProtocolViolation;
use std::fmt;

/// The protocol version this client speaks.
pub const VHOST_USER_VERSION: u32 = 0x1;

/// Mask selecting the version bits of the header flags.
pub const VHOST_USER_VERSION_MASK: u32 = 0x3;

/// Header flag set on replies only.
pub const VHOST_USER_REPLY_MASK: u32 = 0x1 << 2;

/// Mask applied to a vring index carried in a vring-file payload.
pub const VHOST_USER_VRING_IDX_MASK: u64 = 0xff;

/// Set in a vring-file payload when no descriptor accompanies the message.
pub const VHOST_USER_VRING_NOFD_MASK: u64 = 0x1 << 8;

/// Control-protocol request codes.
///
/// Numeric values follow the standard vhost-user enumeration and must match
/// real backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum RequestCode {
    /// Placeholder code 0, never sent.
    None = 0,
    /// Query the backend's virtio feature bits.
    GetFeatures = 1,
    /// Set the negotiated virtio feature bits.
    SetFeatures = 2,
    /// Claim the backend for this session.
    SetOwner = 3,
    /// Release ownership.
    ResetOwner = 4,
    /// Describe shared memory regions.
    SetMemTable = 5,
    /// Set the dirty log base.
    SetLogBase = 6,
    /// Pass the dirty log descriptor.
    SetLogFd = 7,
    /// Set the ring size.
    SetVringNum = 8,
    /// Set ring addresses.
    SetVringAddr = 9,
    /// Set the next available index.
    SetVringBase = 10,
    /// Stop a ring and fetch its base index.
    GetVringBase = 11,
    /// Pass the kick eventfd.
    SetVringKick = 12,
    /// Pass the call eventfd.
    SetVringCall = 13,
    /// Pass the error eventfd.
    SetVringErr = 14,
    /// Query protocol feature bits.
    GetProtocolFeatures = 15,
    /// Set protocol feature bits.
    SetProtocolFeatures = 16,
    /// Query the number of queues.
    GetQueueNum = 17,
    /// Enable or disable a ring.
    SetVringEnable = 18,
    /// Ask the backend to broadcast a RARP.
    SendRarp = 19,
}

impl RequestCode {
    /// Canonical name used in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::None => "VHOST_USER_NONE",
            Self::GetFeatures => "VHOST_GET_FEATURES",
            Self::SetFeatures => "VHOST_SET_FEATURES",
            Self::SetOwner => "VHOST_SET_OWNER",
            Self::ResetOwner => "VHOST_RESET_OWNER",
            Self::SetMemTable => "VHOST_SET_MEM_TABLE",
            Self::SetLogBase => "VHOST_SET_LOG_BASE",
            Self::SetLogFd => "VHOST_SET_LOG_FD",
            Self::SetVringNum => "VHOST_SET_VRING_NUM",
            Self::SetVringAddr => "VHOST_SET_VRING_ADDR",
            Self::SetVringBase => "VHOST_SET_VRING_BASE",
            Self::GetVringBase => "VHOST_GET_VRING_BASE",
            Self::SetVringKick => "VHOST_SET_VRING_KICK",
            Self::SetVringCall => "VHOST_SET_VRING_CALL",
            Self::SetVringErr => "VHOST_SET_VRING_ERR",
            Self::GetProtocolFeatures => "VHOST_GET_PROTOCOL_FEATURES",
            Self::SetProtocolFeatures => "VHOST_SET_PROTOCOL_FEATURES",
            Self::GetQueueNum => "VHOST_GET_QUEUE_NUM",
            Self::SetVringEnable => "VHOST_SET_VRING_ENABLE",
            Self::SendRarp => "VHOST_SEND_RARP",
        }
    }

    /// Raw wire value.
    pub fn as_u32(self) -> u32 {
        self as u32
    }
}

impl TryFrom<u32> for RequestCode {
    type Error = ProtocolViolation;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::None,
            1 => Self::GetFeatures,
            2 => Self::SetFeatures,
            3 => Self::SetOwner,
            4 => Self::ResetOwner,
            5 => Self::SetMemTable,
            6 => Self::SetLogBase,
            7 => Self::SetLogFd,
            8 => Self::SetVringNum,
            9 => Self::SetVringAddr,
            10 => Self::SetVringBase,
            11 => Self::GetVringBase,
            12 => Self::SetVringKick,
            13 => Self::SetVringCall,
            14 => Self::SetVringErr,
            15 => Self::GetProtocolFeatures,
            16 => Self::SetProtocolFeatures,
            17 => Self::GetQueueNum,
            18 => Self::SetVringEnable,
            19 => Self::SendRarp,
            other => return Err(ProtocolViolation::UnknownRequestCode(other)),
        })
    }
}

impl fmt::Display for RequestCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_match_standard_numbering() {
        assert_eq!(RequestCode::GetFeatures.as_u32(), 1);
        assert_eq!(RequestCode::SetOwner.as_u32(), 3);
        assert_eq!(RequestCode::SetMemTable.as_u32(), 5);
        assert_eq!(RequestCode::SetLogFd.as_u32(), 7);
        assert_eq!(RequestCode::GetVringBase.as_u32(), 11);
        assert_eq!(RequestCode::SetVringErr.as_u32(), 14);
        assert_eq!(RequestCode::SetVringEnable.as_u32(), 18);
    }

    #[test]
    fn test_try_from_covers_enumeration() {
        for code in 0..=19u32 {
            let request = RequestCode::try_from(code).unwrap();
            assert_eq!(request.as_u32(), code);
        }
        assert_eq!(
            RequestCode::try_from(20),
            Err(ProtocolViolation::UnknownRequestCode(20))
        );
    }

    #[test]
    fn test_display_uses_canonical_name() {
        assert_eq!(RequestCode::SetVringKick.to_string(), "VHOST_SET_VRING_KICK");
    }

    #[test]
    fn test_flag_constants() {
        assert_eq!(VHOST_USER_VERSION & !VHOST_USER_VERSION_MASK, 0);
        assert_eq!(VHOST_USER_REPLY_MASK, 0x4);
        assert_eq!(VHOST_USER_VRING_NOFD_MASK, 0x100);
    }
}
