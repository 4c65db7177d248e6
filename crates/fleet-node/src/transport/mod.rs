//! Mutual-TLS transport between fleet machines
//!
//! - [`server`]: listener serving an axum router, client certificates mandatory
//! - [`client`]: dialer opening HTTP/2 sessions to peers

pub mod client;
pub mod server;

pub use client::{dial, DialOptions, HandshakeError, SecureConnection};
pub use server::{listen_and_serve, ListenerError, ListenerHandle};
