//! Node composition
//!
//! A [`System`] is what a machine runs to take part in the fleet: its trust
//! identity, its storage plan, and TLS configurations for serving and dialing
//! peers. Both configurations are built once, so every connection sees the
//! same server identity.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use fleet_infra::{Authority, ServerIdentity};
use rustls::{ClientConfig, ServerConfig};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::SystemConfig;
use crate::error::Error;
use crate::slice::{plan_slices, SlicePlan};
use crate::transport::{self, DialOptions, ListenerHandle, SecureConnection};
use crate::Result;

/// A fleet machine's runtime
#[derive(Debug)]
pub struct System {
    config: SystemConfig,
    authority: Arc<Authority>,
    identity: ServerIdentity,
    slice_plan: SlicePlan,
    server_tls: Arc<ServerConfig>,
    client_tls: Arc<ClientConfig>,
}

impl System {
    /// Build a system, loading the authority from `config.authority_path` or
    /// creating it there
    pub fn new(config: SystemConfig) -> Result<Self> {
        let authority = Authority::create_or_load(&config.authority_path)?;
        Self::with_authority(config, Arc::new(authority))
    }

    /// Build a system around an already resolved authority
    pub fn with_authority(config: SystemConfig, authority: Arc<Authority>) -> Result<Self> {
        let slice_plan = plan_slices(config.dataspace, config.slice_capacity)?;
        let identity = config.server_identity();
        let server_tls = authority.server_tls_config(&identity)?;
        let client_tls = authority.client_tls_config()?;

        info!(
            fingerprint = %authority.fingerprint(),
            identity = %identity.name(),
            dataspace_gib = config.dataspace,
            slices = slice_plan.slice_count,
            slice_gib = slice_plan.capacity_per_slice,
            "Fleet system ready"
        );

        Ok(Self {
            config,
            authority,
            identity,
            slice_plan,
            server_tls,
            client_tls,
        })
    }

    /// Serve `router` on `addr` until `shutdown` fires
    pub async fn listen_and_serve(
        &self,
        addr: SocketAddr,
        router: Router,
        shutdown: CancellationToken,
    ) -> Result<()> {
        transport::listen_and_serve(
            addr,
            router,
            self.server_tls.clone(),
            shutdown,
            self.config.shutdown_grace,
        )
        .await
        .map_err(Error::from)
    }

    /// Start serving `router` on `addr` in the background
    pub fn spawn_listener(&self, addr: SocketAddr, router: Router) -> Result<ListenerHandle> {
        ListenerHandle::spawn(
            addr,
            router,
            self.server_tls.clone(),
            self.config.shutdown_grace,
        )
        .map_err(Error::from)
    }

    /// Dial a peer with the configured timeout
    pub async fn dial(&self, addr: &str) -> Result<SecureConnection> {
        self.dial_with(addr, DialOptions::with_timeout(self.config.dial_timeout))
            .await
    }

    /// Dial a peer with explicit options
    pub async fn dial_with(&self, addr: &str, opts: DialOptions) -> Result<SecureConnection> {
        transport::dial(addr, self.client_tls.clone(), opts)
            .await
            .map_err(Error::from)
    }

    /// The fleet authority
    pub fn authority(&self) -> &Arc<Authority> {
        &self.authority
    }

    /// The storage plan derived from the configured dataspace
    pub fn slice_plan(&self) -> SlicePlan {
        self.slice_plan
    }

    /// The identity presented by this system's listener
    pub fn identity(&self) -> &ServerIdentity {
        &self.identity
    }

    /// The configuration the system was built from
    pub fn config(&self) -> &SystemConfig {
        &self.config
    }
}
