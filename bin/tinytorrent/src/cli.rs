//! TinyTorrent command line.

use std::{io, net::SocketAddr, path::PathBuf, sync::Arc};

use clap::{Args, Parser, Subcommand};
use eyre::{Result, WrapErr};
use tinytorrent_api::Tracker;
use tinytorrent_peer::Peer;
use tinytorrent_primitives::{HashValue, PeerEndpoint};
use tinytorrent_tracker::SwarmRegistry;
use tinytorrent_transport::{TcpConnector, TcpTrackerClient, serve_peer, serve_tracker};
use tokio::{net::TcpListener, task::JoinHandle};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::{config::PeerArgs, logging::LogArgs};

/// TinyTorrent - share files through a tracker-coordinated swarm
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct Cli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Commands {
    /// Run a tracker.
    Tracker(TrackerArgs),
    /// Publish a file and seed it until interrupted.
    Share(ShareArgs),
    /// Download the resource described by a descriptor file.
    Download(DownloadArgs),
    /// List resources known to a tracker.
    Resources(ResourcesArgs),
    /// List the peers sharing a resource.
    Peers(PeersArgs),
}

#[derive(Debug, Args)]
pub(crate) struct TrackerArgs {
    /// Address to accept tracker connections on.
    #[arg(long, default_value = "0.0.0.0:6969")]
    pub(crate) listen: SocketAddr,
}

/// Settings shared by every command that runs a peer.
#[derive(Debug, Args)]
pub(crate) struct NodeArgs {
    /// Address to accept peer connections on.
    #[arg(long, default_value = "0.0.0.0:0")]
    pub(crate) listen: SocketAddr,

    /// Address other peers should use to reach this one. Defaults to the bound address.
    #[arg(long)]
    pub(crate) advertise: Option<String>,

    /// Identifier announced to the tracker. Random if omitted.
    #[arg(long)]
    pub(crate) identifier: Option<String>,

    /// Directory holding chunks, descriptors and assembled resources.
    #[arg(long, default_value = "shared")]
    pub(crate) shared_dir: PathBuf,

    /// TOML configuration file, created with defaults if missing.
    #[arg(long)]
    pub(crate) config: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) peer: PeerArgs,
}

#[derive(Debug, Args)]
pub(crate) struct ShareArgs {
    /// File to publish.
    pub(crate) file: PathBuf,

    /// Tracker endpoint (host:port) recorded in the descriptor.
    #[arg(long)]
    pub(crate) tracker: String,

    #[command(flatten)]
    pub(crate) node: NodeArgs,
}

#[derive(Debug, Args)]
pub(crate) struct DownloadArgs {
    /// Descriptor file of the resource.
    pub(crate) descriptor: PathBuf,

    /// Keep seeding after the download completes, until interrupted.
    #[arg(long)]
    pub(crate) seed: bool,

    #[command(flatten)]
    pub(crate) node: NodeArgs,
}

#[derive(Debug, Args)]
pub(crate) struct ResourcesArgs {
    /// Tracker endpoint (host:port).
    #[arg(long)]
    pub(crate) tracker: String,

    /// Only list resources shared by this peer (identifier@address).
    #[arg(long)]
    pub(crate) peer: Option<PeerEndpoint>,
}

#[derive(Debug, Args)]
pub(crate) struct PeersArgs {
    /// Tracker endpoint (host:port).
    #[arg(long)]
    pub(crate) tracker: String,

    /// Resource hash value.
    pub(crate) resource: HashValue,
}

impl Cli {
    pub(crate) async fn run(self) -> Result<()> {
        match self.command {
            Commands::Tracker(args) => run_tracker(args).await,
            Commands::Share(args) => run_share(args).await,
            Commands::Download(args) => run_download(args).await,
            Commands::Resources(args) => {
                let tracker = TcpTrackerClient::new(args.tracker);
                let resources = match &args.peer {
                    Some(peer) => tracker.find_resource_hash_values_for(peer).await?,
                    None => tracker.find_resource_hash_values().await?,
                };
                for resource in resources {
                    println!("{resource}");
                }
                Ok(())
            }
            Commands::Peers(args) => {
                let tracker = TcpTrackerClient::new(args.tracker);
                for peer in tracker.find_clients(&args.resource).await? {
                    println!("{peer}");
                }
                Ok(())
            }
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for ctrl-c");
    }
}

async fn run_tracker(args: TrackerArgs) -> Result<()> {
    let listener = TcpListener::bind(args.listen)
        .await
        .wrap_err_with(|| format!("failed to bind {}", args.listen))?;
    let registry = Arc::new(SwarmRegistry::new());

    serve_tracker(listener, registry.clone(), shutdown_signal()).await?;

    let stats = registry.stats();
    info!(
        resources = stats.resources,
        registrations = stats.registrations,
        "tracker stopped"
    );
    Ok(())
}

async fn run_share(args: ShareArgs) -> Result<()> {
    let node = RunningPeer::start(&args.node).await?;
    match node.peer.publish(&args.file, &args.tracker).await {
        Ok(descriptor) => println!("{}", descriptor.display()),
        Err(e) => {
            node.stop().await?;
            return Err(e).wrap_err_with(|| format!("failed to publish {}", args.file.display()));
        }
    }

    info!("seeding, press ctrl-c to stop");
    shutdown_signal().await;
    node.stop().await
}

async fn run_download(args: DownloadArgs) -> Result<()> {
    let node = RunningPeer::start(&args.node).await?;
    let path = match node.peer.acquire_from_path(&args.descriptor).await {
        Ok(path) => path,
        Err(e) => {
            node.stop().await?;
            return Err(e).wrap_err_with(|| {
                format!("failed to download {}", args.descriptor.display())
            });
        }
    };
    println!("{}", path.display());

    if args.seed {
        info!("seeding, press ctrl-c to stop");
        shutdown_signal().await;
    }
    node.stop().await
}

/// A peer and the server answering remote requests for it.
struct RunningPeer {
    peer: Peer,
    cancel: CancellationToken,
    server: JoinHandle<io::Result<()>>,
}

impl RunningPeer {
    async fn start(args: &NodeArgs) -> Result<Self> {
        let config = crate::config::resolve(args.config.as_deref(), &args.peer)?;
        let listener = TcpListener::bind(args.listen)
            .await
            .wrap_err_with(|| format!("failed to bind {}", args.listen))?;
        let address = match &args.advertise {
            Some(address) => address.clone(),
            None => listener.local_addr()?.to_string(),
        };
        let identifier = args.identifier.clone().unwrap_or_else(random_identifier);
        let endpoint = PeerEndpoint::new(address, identifier);

        let peer = Peer::new(
            endpoint,
            args.shared_dir.clone(),
            config,
            Arc::new(TcpConnector),
            Arc::new(TcpConnector),
        )
        .wrap_err_with(|| format!("failed to open {}", args.shared_dir.display()))?;
        info!(endpoint = %peer.endpoint(), shared_dir = %args.shared_dir.display(), "peer started");

        let cancel = CancellationToken::new();
        let server = tokio::spawn(serve_peer(
            listener,
            Arc::new(peer.clone()),
            cancel.clone().cancelled_owned(),
        ));
        Ok(Self {
            peer,
            cancel,
            server,
        })
    }

    /// Leave every swarm, then stop serving.
    async fn stop(self) -> Result<()> {
        if let Err(e) = self.peer.shutdown().await {
            warn!(error = %e, "failed to leave every swarm");
        }
        self.cancel.cancel();
        self.server.await??;
        Ok(())
    }
}

fn random_identifier() -> String {
    format!("peer-{:08x}", rand::random::<u32>())
}
