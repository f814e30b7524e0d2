//! # virtio-user
//!
//! Client side of the vhost-user control protocol, as used by a virtio-user
//! network device to hand its rings and memory to a backend process.
//!
//! The device talks to the backend over a unix socket. Messages are a fixed
//! 12-byte header plus a small payload; eventfds and huge-page file
//! descriptors ride along as `SCM_RIGHTS` ancillary data.
//!
//! ## Layers
//!
//! - [`protocol`]: request codes, payload shapes, message framing
//! - [`transport`]: socket setup and descriptor-passing codec
//! - [`memory`]: huge-page region discovery for `SET_MEM_TABLE`
//! - [`backend`]: request dispatcher and queue-pair control
//! - [`observability`]: metrics and tracing helpers
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use virtio_user::prelude::*;
//!
//! let config = DeviceConfig::client("/tmp/vhost-user.sock").with_queue_pairs(2);
//! let mut backend = VhostUser::setup(&config)?;
//!
//! backend.set_owner()?;
//! let features = backend.get_features()?;
//! backend.set_features(features)?;
//! backend.set_mem_table()?;
//! for pair in 0..config.queue_pairs {
//!     backend.enable_queue_pair(pair, true)?;
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod backend;
pub mod config;
pub mod error;
pub mod memory;
pub mod observability;
pub mod protocol;
pub mod transport;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::backend::{RequestArg, VhostBackend, VhostUser, VringFile};
    pub use crate::config::{DeviceConfig, Mode};
    pub use crate::error::{Error, Result};
    pub use crate::memory::{HugepageFileInfo, ProcMaps, RegionSource, StaticRegions};
    pub use crate::protocol::{RequestCode, VringAddr, VringState};
    pub use crate::transport::{Channel, MessageChannel};
}

pub use error::{Error, Result};
