use anyhow::Context;
use chrono::Utc;
use shard_serve::config::NodeConfig;
use shard_serve::membership::{MembershipService, Node, NodeId};
use shard_serve::proxy::{HttpPeerTransport, PeerSelector, ProxyCoordinator};
use shard_serve::server::{AppState, router};
use shard_serve::storage::{HashLocator, MemoryBlockStore};
use shard_serve::version::Version;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();

    let mut config_path: Option<PathBuf> = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" => {
                config_path = args.get(i + 1).map(PathBuf::from);
                i += 2;
            }
            _ => {
                i += 1;
            }
        }
    }

    let config = match config_path {
        Some(path) => NodeConfig::load(&path)?,
        None => {
            eprintln!("Usage: {} --config <path>", args[0]);
            eprintln!("Example: {} --config node-a.json", args[0]);
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(config.max_level())
        .init();

    let node_id = config
        .node_id
        .clone()
        .map(NodeId)
        .unwrap_or_else(NodeId::new);
    tracing::info!("Starting node {} on {}", node_id, config.bind);

    let http_client = reqwest::Client::new();

    // 1. Membership:
    let membership = MembershipService::with_client(
        node_id.clone(),
        config.database.local_partitions.iter().copied(),
        http_client.clone(),
    );
    for peer in &config.peers {
        membership.add_member(Node {
            id: NodeId(peer.id.clone()),
            addr: peer.addr.clone(),
            partitions: peer.partitions.clone(),
        });
    }
    tracing::info!(
        "Owning partitions {:?}, {} peers known",
        membership.local_partitions(),
        membership.member_count()
    );

    // 2. Storage:
    let db = &config.database;
    let locator = Arc::new(HashLocator::new());
    let store = match &db.data_file {
        Some(path) => MemoryBlockStore::load_json_file(
            path,
            locator.as_ref(),
            db.partition_count,
            |partition| db.local_partitions.contains(&partition),
        )
        .context("loading local partitions")?,
        None => {
            tracing::warn!("No data file configured, local partitions are empty");
            MemoryBlockStore::new()
        }
    };

    // 3. Version:
    let version = Arc::new(Version {
        name: db.version.clone(),
        created: db.created.unwrap_or_else(Utc::now),
        partition_count: db.partition_count,
        db_name: db.name.clone(),
        oracle: membership.clone(),
        store: Arc::new(store),
        locator,
    });

    // 4. Proxying:
    let selector = match config.selector_seed {
        Some(seed) => PeerSelector::seeded(seed),
        None => PeerSelector::from_entropy(),
    };
    let coordinator = Arc::new(ProxyCoordinator::new(
        Arc::new(HttpPeerTransport::new(http_client)),
        selector,
        config.proxy_timeout(),
    ));

    let state = AppState::new(coordinator, config.request_timeout());
    state.install(version);

    // 5. Start HTTP server:
    let listener = tokio::net::TcpListener::bind(&config.bind)
        .await
        .with_context(|| format!("binding {}", config.bind))?;
    tracing::info!("HTTP server listening on {}", config.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, router(state)).await?;

    Ok(())
}
