//! Fleet node - per-machine trust identity and mutual-TLS transport

use std::net::SocketAddr;
use std::path::PathBuf;

use axum::routing::get;
use axum::Router;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use fleet_infra::Authority;
use fleet_node::config::{default_listen_addr, NodeArgs, DEFAULT_AUTHORITY_PATH};
use fleet_node::{plan_slices, System, SystemConfig};

/// Fleet node - joins a machine to its fleet's private trust domain
#[derive(Parser, Debug)]
#[command(name = "fleet-node", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the node listener until interrupted
    ///
    /// Loads (or creates) the authority, then serves `/healthz` over mutual
    /// TLS. Only peers holding certificates from the same authority get a
    /// response.
    Serve(ServeArgs),

    /// Create or load the authority and print its root certificate
    Authority {
        /// Path of the authority file
        #[arg(long, env = "FLEET_AUTHORITY_PATH", default_value = DEFAULT_AUTHORITY_PATH)]
        authority_path: PathBuf,
    },

    /// Print the scratch disk slice plan as JSON
    Plan {
        /// Scratch storage budget in GiB
        #[arg(long, env = "FLEET_DATASPACE", default_value_t = 0)]
        dataspace: u64,

        /// Capacity of one storage slice in GiB
        #[arg(long, env = "FLEET_SLICE_CAPACITY", default_value_t = fleet_node::DEFAULT_SLICE_CAPACITY_GIB)]
        slice_capacity: u64,
    },

    /// Dial a peer and check its health endpoint
    Check(CheckArgs),
}

/// Serve mode arguments
#[derive(Parser, Debug)]
struct ServeArgs {
    #[command(flatten)]
    node: NodeArgs,

    /// Address the mutual-TLS listener binds
    #[arg(long, env = "FLEET_LISTEN_ADDR", default_value_t = default_listen_addr())]
    listen_addr: SocketAddr,
}

/// Check mode arguments
#[derive(Parser, Debug)]
struct CheckArgs {
    #[command(flatten)]
    node: NodeArgs,

    /// Peer address as host:port
    addr: String,

    /// Path to request
    #[arg(long, default_value = "/healthz")]
    path: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Serve(args) => run_serve(args).await,
        Commands::Authority { authority_path } => run_authority(authority_path),
        Commands::Plan {
            dataspace,
            slice_capacity,
        } => run_plan(dataspace, slice_capacity),
        Commands::Check(args) => run_check(args).await,
    };

    if let Err(e) = &result {
        error!(error = %e, "fleet-node failed");
    }
    result
}

/// Run the listener until Ctrl-C
async fn run_serve(args: ServeArgs) -> anyhow::Result<()> {
    let system = System::new(SystemConfig::from(args.node))?;

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Received interrupt, shutting down");
            }
            shutdown.cancel();
        });
    }

    let router = Router::new().route("/healthz", get(|| async { "ok" }));
    system
        .listen_and_serve(args.listen_addr, router, shutdown)
        .await?;
    Ok(())
}

/// Print the authority's fingerprint and root certificate
fn run_authority(path: PathBuf) -> anyhow::Result<()> {
    let authority = Authority::create_or_load(&path)?;
    let info = authority.root_info()?;

    println!("common name: {}", authority.common_name());
    println!("fingerprint: {}", authority.fingerprint());
    println!("expires in:  {} days", info.remaining_secs() / 86_400);
    print!("{}", authority.root_cert_pem());
    Ok(())
}

/// Print the slice plan for a storage budget
fn run_plan(dataspace: u64, slice_capacity: u64) -> anyhow::Result<()> {
    let plan = plan_slices(dataspace, slice_capacity)?;
    let json = serde_json::to_string_pretty(&plan)
        .map_err(|e| anyhow::anyhow!("Failed to serialize slice plan: {}", e))?;
    println!("{json}");
    Ok(())
}

/// Dial a peer and print the response to a single GET
async fn run_check(args: CheckArgs) -> anyhow::Result<()> {
    let system = System::new(SystemConfig::from(args.node))?;
    let connection = system.dial(&args.addr).await?;
    let response = connection.get(&args.path).await?;

    println!("{}", response.status());
    println!("{}", String::from_utf8_lossy(response.body()));
    if !response.status().is_success() {
        anyhow::bail!("peer {} answered {}", args.addr, response.status());
    }
    Ok(())
}
