//! Backend operations: request dispatch and queue-pair control.
//!
//! [`VhostBackend`] is the operation table the owning device drives. Every
//! typed helper funnels into [`VhostBackend::send_request`], which for the
//! vhost-user backend is [`VhostUser`].
//!
//! # Example
//!
//! ```rust,ignore
//! use virtio_user::backend::{VhostBackend, VhostUser};
//! use virtio_user::config::DeviceConfig;
//!
//! let mut backend = VhostUser::setup(&DeviceConfig::client("/tmp/vhost-user.sock"))?;
//! backend.set_owner()?;
//! let features = backend.get_features()?;
//! backend.set_features(features & wanted)?;
//! backend.set_mem_table()?;
//! backend.enable_queue_pair(0, true)?;
//! ```

mod dispatch;
mod queue_pair;

pub use dispatch::VhostUser;
pub use queue_pair::enable_queue_pair;

use crate::error::{ProtocolViolation, Result};
use crate::protocol::{RequestCode, VringAddr, VringState};
use rustix::fd::BorrowedFd;

/// A vring paired with an optional eventfd, for kick/call/err requests.
#[derive(Debug, Clone, Copy)]
pub struct VringFile<'a> {
    /// Global vring index.
    pub index: u32,
    /// The eventfd. `None` (or a non-positive descriptor) masks the ring.
    pub fd: Option<BorrowedFd<'a>>,
}

impl<'a> VringFile<'a> {
    /// A vring with an eventfd attached.
    pub fn new(index: u32, fd: BorrowedFd<'a>) -> Self {
        Self {
            index,
            fd: Some(fd),
        }
    }

    /// A vring with no eventfd: the backend treats it as masked.
    pub fn masked(index: u32) -> Self {
        Self { index, fd: None }
    }
}

/// Argument of one request.
///
/// Requests that expect a reply overwrite the argument with the reply value.
#[derive(Debug, Clone, Copy)]
pub enum RequestArg<'a> {
    /// No argument.
    None,
    /// 64-bit value (features, log base).
    U64(u64),
    /// Vring index and count.
    VringState(VringState),
    /// Vring addresses.
    VringAddr(VringAddr),
    /// Vring eventfd.
    VringFile(VringFile<'a>),
    /// A plain descriptor (log fd).
    Fd(BorrowedFd<'a>),
}

/// Operations a virtio-user device needs from its backend.
pub trait VhostBackend {
    /// Send `request` with `arg`, waiting for the reply if the request has one.
    fn send_request(&mut self, request: RequestCode, arg: &mut RequestArg<'_>) -> Result<()>;

    /// Enable or disable both vrings of queue pair `pair`.
    fn enable_queue_pair(&mut self, pair: u16, enable: bool) -> Result<()> {
        enable_queue_pair(self, pair, enable)
    }

    /// Claim the backend.
    fn set_owner(&mut self) -> Result<()> {
        self.send_request(RequestCode::SetOwner, &mut RequestArg::None)
    }

    /// Release the backend.
    fn reset_owner(&mut self) -> Result<()> {
        self.send_request(RequestCode::ResetOwner, &mut RequestArg::None)
    }

    /// Query the backend's feature bits.
    fn get_features(&mut self) -> Result<u64> {
        let mut arg = RequestArg::None;
        self.send_request(RequestCode::GetFeatures, &mut arg)?;
        match arg {
            RequestArg::U64(features) => Ok(features),
            _ => Err(ProtocolViolation::ArgumentMismatch(RequestCode::GetFeatures).into()),
        }
    }

    /// Set the negotiated feature bits.
    fn set_features(&mut self, features: u64) -> Result<()> {
        self.send_request(RequestCode::SetFeatures, &mut RequestArg::U64(features))
    }

    /// Describe this process's huge-page memory to the backend.
    fn set_mem_table(&mut self) -> Result<()> {
        self.send_request(RequestCode::SetMemTable, &mut RequestArg::None)
    }

    /// Set the dirty log base.
    fn set_log_base(&mut self, base: u64) -> Result<()> {
        self.send_request(RequestCode::SetLogBase, &mut RequestArg::U64(base))
    }

    /// Pass the dirty log descriptor.
    fn set_log_fd(&mut self, fd: BorrowedFd<'_>) -> Result<()> {
        self.send_request(RequestCode::SetLogFd, &mut RequestArg::Fd(fd))
    }

    /// Set a ring's size.
    fn set_vring_num(&mut self, state: VringState) -> Result<()> {
        self.send_request(RequestCode::SetVringNum, &mut RequestArg::VringState(state))
    }

    /// Set a ring's next available index.
    fn set_vring_base(&mut self, state: VringState) -> Result<()> {
        self.send_request(RequestCode::SetVringBase, &mut RequestArg::VringState(state))
    }

    /// Stop ring `index` and return its state.
    fn get_vring_base(&mut self, index: u32) -> Result<VringState> {
        let mut arg = RequestArg::VringState(VringState::new(index, 0));
        self.send_request(RequestCode::GetVringBase, &mut arg)?;
        match arg {
            RequestArg::VringState(state) => Ok(state),
            _ => Err(ProtocolViolation::ArgumentMismatch(RequestCode::GetVringBase).into()),
        }
    }

    /// Set a ring's addresses.
    fn set_vring_addr(&mut self, addr: VringAddr) -> Result<()> {
        self.send_request(RequestCode::SetVringAddr, &mut RequestArg::VringAddr(addr))
    }

    /// Pass a ring's kick eventfd.
    fn set_vring_kick(&mut self, file: VringFile<'_>) -> Result<()> {
        self.send_request(RequestCode::SetVringKick, &mut RequestArg::VringFile(file))
    }

    /// Pass a ring's call eventfd.
    fn set_vring_call(&mut self, file: VringFile<'_>) -> Result<()> {
        self.send_request(RequestCode::SetVringCall, &mut RequestArg::VringFile(file))
    }

    /// Pass a ring's error eventfd.
    fn set_vring_err(&mut self, file: VringFile<'_>) -> Result<()> {
        self.send_request(RequestCode::SetVringErr, &mut RequestArg::VringFile(file))
    }
}
