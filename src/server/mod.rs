//! Accepts client connections, dispatches commands locally or relays them
//! to the owning peer, and runs the stabilization loop that migrates keys
//! after membership changes.

mod stabilize;

use crate::cluster::Cluster;
use crate::command::{self, Command, CommandResult};
use crate::config::Config;
use crate::error::{DbError, Result};
use crate::protocol;
use crate::store::Store;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{error, info, warn};

pub struct Server {
    store: Arc<dyn Store>,
    cluster: Arc<Cluster>,
    config: Config,
    stopped: Arc<AtomicBool>,
}

impl Server {
    pub fn new(store: Arc<dyn Store>, cluster: Arc<Cluster>, config: Config) -> Self {
        Self {
            store,
            cluster,
            config,
            stopped: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Binds the client-facing listener and serves connections until
    /// `shutdown` is called.
    pub async fn run(&self) -> Result<()> {
        let addr = self.config.listen_addr();
        let listener = TcpListener::bind(&addr).await.map_err(DbError::Io)?;
        info!(addr = %addr, "listening for client connections");

        loop {
            if self.stopped.load(Ordering::Relaxed) {
                return Ok(());
            }

            let (socket, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!(error = %e, "accept failed");
                    continue;
                }
            };

            let store = Arc::clone(&self.store);
            let cluster = Arc::clone(&self.cluster);
            let read_timeout = self.config.read_timeout;
            let write_timeout = self.config.write_timeout;

            tokio::spawn(async move {
                if let Err(e) = handle_connection(socket, store, cluster, read_timeout, write_timeout).await {
                    warn!(peer = %peer, error = %e, "connection ended with an error");
                }
            });
        }
    }

    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Relaxed);
    }

    /// Spawns the periodic stabilization task.
    pub fn spawn_stabilizer(&self) -> tokio::task::JoinHandle<()> {
        stabilize::spawn(
            Arc::clone(&self.store),
            Arc::clone(&self.cluster),
            self.config.stabilize_interval,
            self.config.stabilize_batch_percent,
            Arc::clone(&self.stopped),
        )
    }
}

async fn handle_connection(
    socket: TcpStream,
    store: Arc<dyn Store>,
    cluster: Arc<Cluster>,
    read_timeout: Duration,
    write_timeout: Duration,
) -> Result<()> {
    let (read_half, mut write_half) = socket.into_split();
    let mut reader = BufReader::new(read_half);

    let command = match timeout(read_timeout, protocol::read_command(&mut reader)).await {
        Ok(Ok(Some(command))) => command,
        Ok(Ok(None)) => return Ok(()),
        Ok(Err(e)) => {
            let bytes = protocol::encode_error(&e);
            let _ = timeout(write_timeout, protocol::write_reply(&mut write_half, &bytes)).await;
            return Ok(());
        }
        Err(_) => return Err(DbError::Protocol("read deadline exceeded".to_string())),
    };

    let reply_bytes = match dispatch(&command, &store, &cluster).await {
        Ok(result) => protocol::encode_success(&result),
        Err(e) => protocol::encode_error(&e),
    };

    timeout(write_timeout, protocol::write_reply(&mut write_half, &reply_bytes))
        .await
        .map_err(|_| DbError::Protocol("write deadline exceeded".to_string()))??;

    Ok(())
}

/// Local-vs-relay decision: local commands and commands this node owns
/// execute in place; everything else is relayed one hop to the owner.
async fn dispatch(command: &Command, store: &Arc<dyn Store>, cluster: &Arc<Cluster>) -> Result<CommandResult> {
    if let Command::ClusterJoin { address } = command {
        cluster.join(address).await?;
        return Ok(CommandResult::Void);
    }

    if !command.distributed() {
        return command.execute(store.as_ref(), cluster);
    }

    let key = command.hashing_key().expect("distributed commands carry a hashing key");
    let owner = cluster
        .responsible(key)
        .ok_or_else(|| DbError::Routing("no responsible node (empty membership)".to_string()))?;

    if &owner == cluster.local() {
        command.execute(store.as_ref(), cluster)
    } else {
        relay(command, &owner).await
    }
}

/// One hop: hand the command's textual form to the owner and return
/// whatever it replies.
async fn relay(command: &Command, owner: &crate::router::NodeRef) -> Result<CommandResult> {
    protocol::relay_to(command, owner).await.inspect_err(|e| {
        error!(owner = %owner, error = %e, "relay failed");
    })
}
