//! Node configuration
//!
//! [`SystemConfig`] is what a [`crate::System`] is built from. [`NodeArgs`] is
//! the command-line / environment surface that produces it.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;
use fleet_infra::ServerIdentity;

use crate::slice::DEFAULT_SLICE_CAPACITY_GIB;

/// Default port for the node's mutual-TLS listener
pub const DEFAULT_LISTEN_PORT: u16 = 2000;

/// Default location of the authority file
pub const DEFAULT_AUTHORITY_PATH: &str = "/var/lib/fleet/authority";

/// How long in-flight connections may run after the listener is closed
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Default limit on connecting to a peer, handshake included
pub const DEFAULT_DIAL_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration consumed by [`crate::System`]
#[derive(Debug, Clone)]
pub struct SystemConfig {
    /// Where the authority is loaded from, or created if absent
    pub authority_path: PathBuf,
    /// Declared scratch storage budget in GiB
    pub dataspace: u64,
    /// Capacity of one storage slice in GiB
    pub slice_capacity: u64,
    /// Hostname placed in server certificates
    pub hostname: String,
    /// Whether server certificates carry an instance-disambiguating suffix
    pub instance_suffix: bool,
    /// Suffix to use; a random one is minted when unset and suffixing is on
    pub instance_id: Option<String>,
    /// Grace period for in-flight connections on listener shutdown
    pub shutdown_grace: Duration,
    /// Limit on a single dial, handshake included
    pub dial_timeout: Duration,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            authority_path: PathBuf::from(DEFAULT_AUTHORITY_PATH),
            dataspace: 0,
            slice_capacity: DEFAULT_SLICE_CAPACITY_GIB,
            hostname: "localhost".to_string(),
            instance_suffix: true,
            instance_id: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            dial_timeout: DEFAULT_DIAL_TIMEOUT,
        }
    }
}

impl SystemConfig {
    /// Resolve the server identity this configuration describes
    ///
    /// Called once per [`crate::System`]; a minted suffix therefore stays the
    /// same for every connection the system serves.
    pub fn server_identity(&self) -> ServerIdentity {
        let identity = ServerIdentity::new(self.hostname.clone());
        if !self.instance_suffix {
            return identity;
        }
        let suffix = self
            .instance_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string()[..12].to_string());
        identity.with_instance_suffix(suffix)
    }
}

/// Node arguments shared by every subcommand
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Path of the authority file (created if absent)
    #[arg(long, env = "FLEET_AUTHORITY_PATH", default_value = DEFAULT_AUTHORITY_PATH)]
    pub authority_path: PathBuf,

    /// Scratch storage budget in GiB
    #[arg(long, env = "FLEET_DATASPACE", default_value_t = 0)]
    pub dataspace: u64,

    /// Capacity of one storage slice in GiB
    #[arg(long, env = "FLEET_SLICE_CAPACITY", default_value_t = DEFAULT_SLICE_CAPACITY_GIB)]
    pub slice_capacity: u64,

    /// Hostname placed in server certificates
    #[arg(long, env = "FLEET_HOSTNAME", default_value = "localhost")]
    pub hostname: String,

    /// Instance identifier appended to the certificate name
    #[arg(long, env = "FLEET_INSTANCE_ID")]
    pub instance_id: Option<String>,

    /// Use the bare hostname in server certificates
    #[arg(long, env = "FLEET_NO_INSTANCE_SUFFIX")]
    pub no_instance_suffix: bool,

    /// Grace period for in-flight connections on shutdown, in seconds
    #[arg(long, default_value_t = DEFAULT_SHUTDOWN_GRACE.as_secs())]
    pub shutdown_grace_secs: u64,

    /// Timeout for dialing a peer, in seconds
    #[arg(long, default_value_t = DEFAULT_DIAL_TIMEOUT.as_secs())]
    pub dial_timeout_secs: u64,
}

impl From<NodeArgs> for SystemConfig {
    fn from(args: NodeArgs) -> Self {
        Self {
            authority_path: args.authority_path,
            dataspace: args.dataspace,
            slice_capacity: args.slice_capacity,
            hostname: args.hostname,
            instance_suffix: !args.no_instance_suffix,
            instance_id: args.instance_id,
            shutdown_grace: Duration::from_secs(args.shutdown_grace_secs),
            dial_timeout: Duration::from_secs(args.dial_timeout_secs),
        }
    }
}

/// Default listen address for the node listener
pub fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], DEFAULT_LISTEN_PORT))
}
