//! vhost-user request dispatcher.
//!
//! One call runs: build -> send -> (await reply -> validate -> extract).
//!
//! | Request | Payload | Descriptors | Reply |
//! |---------|---------|-------------|-------|
//! | `SET_OWNER`, `RESET_OWNER` | none | none | no |
//! | `SET_FEATURES`, `SET_LOG_BASE` | `u64` | none | no |
//! | `GET_FEATURES` | none | none | `u64` |
//! | `SET_LOG_FD` | none | the log fd | no |
//! | `SET_MEM_TABLE` | memory table | one per region | no |
//! | `SET_VRING_NUM`, `SET_VRING_BASE`, `SET_VRING_ENABLE` | vring state | none | no |
//! | `GET_VRING_BASE` | vring state | none | vring state |
//! | `SET_VRING_ADDR` | vring addresses | none | no |
//! | `SET_VRING_KICK`, `SET_VRING_CALL`, `SET_VRING_ERR` | index word | eventfd if any | no |

use super::{RequestArg, VhostBackend};
use crate::config::DeviceConfig;
use crate::error::{Error, ProtocolViolation, Result};
use crate::memory::{ProcMaps, RegionSource, prepare_memory_table};
use crate::observability::{
    RequestTimer, instrument_request, record_reply_received, record_request_error,
    record_request_sent, trace_request, trace_request_error,
};
use crate::protocol::{
    ControlMessage, Payload, RequestCode, U64_PAYLOAD_SIZE, VHOST_USER_VRING_IDX_MASK,
    VHOST_USER_VRING_NOFD_MASK, VRING_STATE_SIZE,
};
use crate::transport::{Channel, MessageChannel};
use rustix::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd};

/// Client side of a vhost-user control connection.
///
/// Generic over the channel (so the dispatcher never touches raw socket
/// buffers) and over the region source used for `SET_MEM_TABLE`.
#[derive(Debug)]
pub struct VhostUser<C = Channel, R = ProcMaps> {
    channel: C,
    regions: R,
}

impl VhostUser<Channel, ProcMaps> {
    /// Set up the control socket described by `config`.
    ///
    /// In server mode the returned backend has no peer yet; requests fail
    /// with [`Error::NotConnected`] until one is attached to the channel.
    pub fn setup(config: &DeviceConfig) -> Result<Self> {
        Ok(Self::new(Channel::setup(config)?, ProcMaps::new()))
    }
}

impl<C: MessageChannel, R: RegionSource> VhostUser<C, R> {
    /// Dispatch over `channel`, describing memory from `regions`.
    pub fn new(channel: C, regions: R) -> Self {
        Self { channel, regions }
    }

    /// The underlying channel.
    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// The underlying channel, mutably (e.g. to attach an accepted peer).
    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    /// Split into channel and region source.
    pub fn into_parts(self) -> (C, R) {
        (self.channel, self.regions)
    }

    fn dispatch(&mut self, request: RequestCode, arg: &mut RequestArg<'_>) -> Result<()> {
        if !self.channel.is_connected() {
            return Err(Error::NotConnected);
        }

        let Outgoing {
            message,
            owned_fds,
            fd,
            reply,
        } = self.build(request, arg)?;

        trace_request(request, message.size(), owned_fds.len() + usize::from(fd.is_some()));

        let sent = {
            let mut fds: Vec<BorrowedFd<'_>> = owned_fds.iter().map(|fd| fd.as_fd()).collect();
            fds.extend(fd);
            self.channel.send_with_descriptors(&message, &fds)
        };
        // Region descriptors are closed whether or not the send went through.
        drop(owned_fds);
        sent?;
        record_request_sent(request);

        match reply {
            Some(kind) => self.await_reply(request, kind, arg),
            None => Ok(()),
        }
    }

    fn build<'a>(&self, request: RequestCode, arg: &RequestArg<'a>) -> Result<Outgoing<'a>> {
        use RequestCode::*;

        let mismatch = || Error::from(ProtocolViolation::ArgumentMismatch(request));
        let mut out = Outgoing::default();

        let payload = match request {
            SetOwner | ResetOwner => Payload::Empty,

            GetFeatures => {
                out.reply = Some(ReplyKind::U64);
                Payload::Empty
            }

            SetFeatures | SetLogBase => match *arg {
                RequestArg::U64(value) => Payload::U64(value),
                _ => return Err(mismatch()),
            },

            SetMemTable => {
                let files = self.regions.hugepage_files().inspect_err(|e| {
                    tracing::error!(error = %e, "failed to prepare memory for vhost-user");
                })?;
                let prepared = prepare_memory_table(&files)?;
                out.owned_fds = prepared.fds;
                Payload::MemoryTable(prepared.table)
            }

            SetLogFd => match *arg {
                RequestArg::Fd(fd) => {
                    out.fd = Some(fd);
                    Payload::Empty
                }
                _ => return Err(mismatch()),
            },

            SetVringNum | SetVringBase | SetVringEnable => match *arg {
                RequestArg::VringState(state) => Payload::VringState(state),
                _ => return Err(mismatch()),
            },

            GetVringBase => match *arg {
                RequestArg::VringState(state) => {
                    out.reply = Some(ReplyKind::VringState);
                    Payload::VringState(state)
                }
                _ => return Err(mismatch()),
            },

            SetVringAddr => match *arg {
                RequestArg::VringAddr(addr) => Payload::VringAddr(addr),
                _ => return Err(mismatch()),
            },

            SetVringKick | SetVringCall | SetVringErr => match *arg {
                RequestArg::VringFile(file) => {
                    let mut value = u64::from(file.index) & VHOST_USER_VRING_IDX_MASK;
                    // `RequestCode::None` shadows `Option::None` in this scope.
                    if let Some(fd) = file.fd.filter(|fd| fd.as_raw_fd() > 0) {
                        out.fd = Some(fd);
                    } else {
                        value |= VHOST_USER_VRING_NOFD_MASK;
                    }
                    Payload::U64(value)
                }
                _ => return Err(mismatch()),
            },

            None | GetProtocolFeatures | SetProtocolFeatures | GetQueueNum | SendRarp => {
                tracing::error!(request = %request, "trying to send unhandled msg type");
                return Err(ProtocolViolation::UnsupportedRequest(request).into());
            }
        };

        out.message = ControlMessage::request(request, payload);
        Ok(out)
    }

    fn await_reply(
        &mut self,
        request: RequestCode,
        kind: ReplyKind,
        arg: &mut RequestArg<'_>,
    ) -> Result<()> {
        let reply = self.channel.receive()?;

        if reply.request_code() != request {
            tracing::error!(
                expected = %request,
                found = %reply.request_code(),
                "received unexpected msg type"
            );
            return Err(ProtocolViolation::UnexpectedReply {
                expected: request,
                found: reply.request_code(),
            }
            .into());
        }

        let bad_size = ProtocolViolation::BadReplySize {
            request,
            expected: kind.size() as u32,
            found: reply.size(),
        };
        if reply.size() as usize != kind.size() {
            tracing::error!(request = %request, size = reply.size(), "received bad msg size");
            return Err(bad_size.into());
        }

        *arg = match (kind, reply.into_payload()) {
            (ReplyKind::U64, Payload::U64(value)) => RequestArg::U64(value),
            (ReplyKind::VringState, Payload::VringState(state)) => RequestArg::VringState(state),
            _ => return Err(bad_size.into()),
        };
        record_reply_received(request);
        Ok(())
    }
}

impl<C: MessageChannel, R: RegionSource> VhostBackend for VhostUser<C, R> {
    fn send_request(&mut self, request: RequestCode, arg: &mut RequestArg<'_>) -> Result<()> {
        let _span = instrument_request(request);
        let _timer = RequestTimer::start(request);

        self.dispatch(request, arg).inspect_err(|e| {
            trace_request_error(request, e);
            record_request_error(request);
        })
    }
}

/// Shape of the reply a request waits for.
#[derive(Debug, Clone, Copy)]
enum ReplyKind {
    U64,
    VringState,
}

impl ReplyKind {
    fn size(self) -> usize {
        match self {
            ReplyKind::U64 => U64_PAYLOAD_SIZE,
            ReplyKind::VringState => VRING_STATE_SIZE,
        }
    }
}

/// A message ready to send, with the descriptors that travel with it.
struct Outgoing<'a> {
    message: ControlMessage,
    /// Region descriptors opened for this message; closed after the send.
    owned_fds: Vec<OwnedFd>,
    /// A caller-owned descriptor (log fd or eventfd).
    fd: Option<BorrowedFd<'a>>,
    reply: Option<ReplyKind>,
}

impl Default for Outgoing<'_> {
    fn default() -> Self {
        Self {
            message: ControlMessage::request(RequestCode::None, Payload::Empty),
            owned_fds: Vec::new(),
            fd: None,
            reply: None,
        }
    }
}
