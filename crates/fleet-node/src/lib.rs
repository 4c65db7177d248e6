//! Fleet node runtime
//!
//! Everything a machine needs to join a fleet and talk to its peers:
//!
//! - [`System`]: composes the trust identity, storage plan and transport
//! - [`transport`]: mutual-TLS listener and dialer over HTTP/2
//! - [`slice`]: scratch disk slicing planner
//! - [`config`]: node configuration and its command-line surface
//!
//! Trust material itself lives in [`fleet_infra`].

#![deny(missing_docs)]

pub mod config;
pub mod error;
pub mod slice;
pub mod system;
pub mod transport;

pub use config::SystemConfig;
pub use error::Error;
pub use slice::{plan_slices, SliceError, SlicePlan, DEFAULT_SLICE_CAPACITY_GIB};
pub use system::System;
pub use transport::{DialOptions, HandshakeError, ListenerError, ListenerHandle, SecureConnection};

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;
