use rustystore::cluster::Cluster;
use rustystore::config::{Cli, Config};
use rustystore::router::NodeRef;
use rustystore::server::Server;
use rustystore::store::{MemoryStore, Store};
use rustystore::{Result, VERSION};
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    print_banner();

    let cli = Cli::parse();
    let config = Config::load(&cli)?;

    info!("starting rustystore {}", VERSION);
    info!(addr = %config.listen_addr(), "client-facing listen address");
    info!(addr = %config.gossip_addr(), "gossip listen address");

    let local = NodeRef::new(config.host.clone(), config.port);
    let local_seed: u64 = rand::random();

    let cluster = Cluster::start(local, local_seed).await?;

    if let Some(seed_addr) = &config.cluster {
        info!(seed_addr = %seed_addr, "joining existing cluster");
        if let Err(e) = cluster.join(seed_addr).await {
            warn!(error = %e, "initial join failed, continuing as a standalone node");
        }
    }

    let store = MemoryStore::new();
    let evictor = store.spawn_evictor(config.eviction_interval, config.eviction_batch_percent);

    let store_dyn: Arc<dyn Store> = store.clone();
    let server = Server::new(store_dyn, Arc::clone(&cluster), config.clone());
    let stabilizer = server.spawn_stabilizer();

    println!();
    println!("rustystore is ready to accept connections on {}", config.listen_addr());
    println!("connect with: rustystore-cli --host {} --port {}", config.host, config.port);
    println!();

    let result = server.run().await;

    if let Err(ref e) = result {
        error!(error = %e, "server stopped with an error");
    } else {
        info!("server stopped gracefully");
    }

    cluster.shutdown().await;
    store.shutdown();
    evictor.abort();
    stabilizer.abort();

    result
}

fn print_banner() {
    println!("================================================================");
    println!(" rustystore - distributed in-memory key-value store");
    println!(" version {}", VERSION);
    println!("================================================================");
    println!();
}
