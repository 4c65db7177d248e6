//! Trust infrastructure for fleet machines
//!
//! This crate owns everything that decides whether two machines belong to the
//! same fleet:
//!
//! - **PKI**: the fleet [`Authority`] (root key pair, self-signed root,
//!   on-demand leaf issuance)
//! - **Store**: create / load / create-or-load of the authority file
//! - **mTLS**: rustls server and client configurations pinned to the root
//!
//! # Public API
//!
//! ## PKI
//! - [`pki::Authority`]: root of a trust domain
//! - [`pki::ServerIdentity`]: hostname plus optional instance suffix
//! - [`pki::LeafCredentials`]: an issued, non-persisted leaf
//! - [`pki::AuthorityError`]: error type for authority operations
//!
//! ## mTLS
//! - [`mtls::ServerMtlsConfig`], [`mtls::ClientMtlsConfig`]: rustls configuration
//! - [`mtls::RootPinnedServerVerifier`]: server verification by provenance only
//! - [`mtls::LeafResolver`]: presents leaves and renews them before they expire

#![deny(missing_docs)]

pub mod mtls;
pub mod pki;
pub mod store;

pub use mtls::{
    ClientMtlsConfig, LeafResolver, LeafRole, LeafSource, RootPinnedServerVerifier,
    ServerMtlsConfig,
};
pub use pki::{Authority, AuthorityError, CertificateInfo, LeafCredentials, ServerIdentity};
