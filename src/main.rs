use archive_cluster::accounting::SpaceLedger;
use archive_cluster::config::ClusterConfig;
use archive_cluster::context::CoordinatorContext;
use archive_cluster::correlator::ReplyCorrelator;
use archive_cluster::gateway::StorageGateway;
use archive_cluster::gateway::handlers::router;
use archive_cluster::node::MemoryNode;
use archive_cluster::node::service::{serve_memory, serve_tcp};
use archive_cluster::placement::probe::run_recovery_probe;
use archive_cluster::placement::ring::NodeRing;
use archive_cluster::placement::types::NodeId;
use archive_cluster::segment::checksum::DigestAlgorithm;
use archive_cluster::transport::{Dispatcher, MemoryDispatcher, TcpDispatcher};

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "archive-cluster", about = "Segmented archive cluster")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP gateway against the storage nodes in a config file.
    Gateway {
        #[arg(long)]
        config: PathBuf,
    },
    /// Run one in-memory storage node.
    Node {
        #[arg(long)]
        name: String,
        #[arg(long)]
        listen: SocketAddr,
        /// Number of nodes in the ring the gateway uses.
        #[arg(long)]
        segment_count: u32,
        #[arg(long, default_value_t = 1024 * 1024)]
        slice_size: usize,
        #[arg(long, default_value = "md5", value_parser = parse_digest)]
        digest: DigestAlgorithm,
    },
    /// Run the gateway and `nodes` in-process storage nodes.
    Local {
        #[arg(long, default_value_t = 10)]
        nodes: usize,
        #[arg(long, default_value = "127.0.0.1:8088")]
        listen: SocketAddr,
    },
}

fn parse_digest(value: &str) -> Result<DigestAlgorithm, String> {
    match value {
        "md5" => Ok(DigestAlgorithm::Md5),
        "sha256-truncated" => Ok(DigestAlgorithm::Sha256Truncated),
        other => Err(format!(
            "unknown digest {} (expected md5 or sha256-truncated)",
            other
        )),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match Cli::parse().command {
        Command::Gateway { config } => {
            let config = ClusterConfig::from_file(&config)?;
            let correlator = Arc::new(ReplyCorrelator::new());
            let dispatcher = Arc::new(TcpDispatcher::new(&config, Arc::clone(&correlator)));
            run_gateway(config, correlator, dispatcher).await
        }
        Command::Node {
            name,
            listen,
            segment_count,
            slice_size,
            digest,
        } => {
            let node = Arc::new(MemoryNode::new(
                NodeId::new(name),
                segment_count,
                slice_size,
                digest,
            ));
            let listener = tokio::net::TcpListener::bind(listen).await?;
            serve_tcp(node, listener).await?;
            Ok(())
        }
        Command::Local { nodes, listen } => {
            let mut config = ClusterConfig::local(nodes, 0);
            config.listen_addr = listen;
            config.validate()?;

            let correlator = Arc::new(ReplyCorrelator::new());
            let dispatcher = Arc::new(MemoryDispatcher::new());
            for id in config.node_ids() {
                let node = Arc::new(MemoryNode::new(
                    id.clone(),
                    config.nodes.len() as u32,
                    config.slice_size,
                    config.digest,
                ));
                let requests = dispatcher.connect(id);
                tokio::spawn(serve_memory(node, requests, Arc::clone(&correlator)));
            }
            tracing::info!("Started {} in-process storage nodes", nodes);

            run_gateway(config, correlator, dispatcher).await
        }
    }
}

async fn run_gateway(
    config: ClusterConfig,
    correlator: Arc<ReplyCorrelator>,
    dispatcher: Arc<dyn Dispatcher>,
) -> anyhow::Result<()> {
    let ring = Arc::new(NodeRing::from_config(&config));
    let ctx = Arc::new(CoordinatorContext::new(&config, ring, correlator, dispatcher));

    tokio::spawn(run_recovery_probe(Arc::clone(&ctx), config.probe_interval()));

    let gateway = Arc::new(StorageGateway::new(ctx, Arc::new(SpaceLedger::new())));
    let app = router(gateway);

    tracing::info!(
        "Gateway for {} storage nodes listening on {}",
        config.nodes.len(),
        config.listen_addr
    );
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(config.listen_addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
