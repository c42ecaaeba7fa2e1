//! Adapts Quickwit's `chitchat` SWIM-style gossip/failure-detection library
//! to the `Router`: diffs its live-node snapshots into `add_node`/`remove_node`
//! calls and exposes the handful of operations the server and stabilization
//! loop need.
//!
//! `chitchat` is used here instead of a hand-rolled gossip engine because
//! both this corpus (`miwidot-miwidothttp`'s cluster module wraps the same
//! crate) and the system this crate was modeled on (which wraps
//! `hashicorp/memberlist`) reach for a real third-party gossip library
//! rather than reimplementing SWIM from scratch.

use crate::error::{DbError, Result};
use crate::router::{encode_uvarint, NodeRef, Router};
use chitchat::transport::UdpTransport;
use chitchat::{spawn_chitchat, Chitchat, ChitchatConfig, ChitchatHandle, ChitchatId, FailureDetectorConfig};
use std::collections::BTreeSet;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{info, warn};

/// Key under which a node publishes its rendezvous-hashing seed in its
/// chitchat `NodeState` CRDT, so peers can route to it without a separate
/// handshake.
const SEED_KEY: &str = "rustystore_seed";

fn gossip_socket_addr(node: &NodeRef) -> Result<SocketAddr> {
    format!("{}:{}", node.host, node.gossip_port())
        .parse()
        .map_err(|e| DbError::Cluster(format!("invalid gossip address for {node}: {e}")))
}

/// Thin wrapper around a running gossip engine plus the `Router` it feeds.
pub struct Cluster {
    router: Arc<Router>,
    local: NodeRef,
    chitchat: Arc<Mutex<Chitchat>>,
    handle: Mutex<Option<ChitchatHandle>>,
}

impl Cluster {
    /// Starts the gossip engine bound to `local`'s gossip port and registers
    /// the local node in the router under `local_seed`.
    pub async fn start(local: NodeRef, local_seed: u64) -> Result<Arc<Self>> {
        let gossip_addr = gossip_socket_addr(&local)?;

        let chitchat_id = ChitchatId {
            node_id: local.client_addr(),
            generation_id: 0,
            gossip_advertise_addr: gossip_addr,
        };

        let config = ChitchatConfig {
            chitchat_id,
            cluster_id: "rustystore".to_string(),
            gossip_interval: Duration::from_millis(500),
            listen_addr: gossip_addr,
            seed_nodes: Vec::new(),
            failure_detector_config: FailureDetectorConfig {
                phi_threshold: 8.0,
                sampling_window_size: 30,
                ..Default::default()
            },
            marked_for_deletion_grace_period: Duration::from_secs(60),
            catchup_callback: None,
            extra_liveness_predicate: None,
        };

        let handle = spawn_chitchat(config, Vec::new(), &UdpTransport)
            .await
            .map_err(|e| DbError::Cluster(format!("could not start gossip engine: {e}")))?;

        let chitchat = handle.chitchat();
        {
            let mut guard = chitchat.lock().await;
            guard.self_node_state().set(SEED_KEY, local_seed.to_string());
        }

        let router = Arc::new(Router::new(local_seed));
        router.add_node(local.clone(), &encode_uvarint(local_seed));

        let cluster = Arc::new(Self {
            router: Arc::clone(&router),
            local: local.clone(),
            chitchat: Arc::clone(&chitchat),
            handle: Mutex::new(Some(handle)),
        });

        tokio::spawn(watch_membership(chitchat, router, local));

        Ok(cluster)
    }

    pub fn local(&self) -> &NodeRef {
        &self.local
    }

    pub fn router(&self) -> &Arc<Router> {
        &self.router
    }

    /// Current view of live peers, as seen through the router (includes the
    /// local node, added at `start`).
    pub fn members(&self) -> Vec<NodeRef> {
        self.router.nodes()
    }

    pub fn responsible(&self, key: &str) -> Option<NodeRef> {
        self.router.responsible(key)
    }

    /// Adds `seed_addr`'s gossip endpoint to the engine's seed set so the
    /// next gossip round pulls it into the cluster view. Mirrors the
    /// dynamic, post-construction join call the original system made
    /// against `hashicorp/memberlist`.
    pub async fn join(&self, seed_addr: &str) -> Result<()> {
        let peer = NodeRef::parse(seed_addr)
            .ok_or_else(|| DbError::Cluster(format!("invalid peer address: {seed_addr}")))?;
        let gossip_addr = gossip_socket_addr(&peer)?.to_string();

        self.chitchat
            .lock()
            .await
            .update_seed_addrs(&[gossip_addr.clone()]);
        info!(peer = %peer, gossip_addr = %gossip_addr, "added gossip seed address");
        Ok(())
    }

    /// Shuts the gossip engine down. Idempotent: a second call is a no-op.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.handle.lock().await.take() {
            if let Err(e) = handle.shutdown().await {
                warn!(error = %e, "error shutting down gossip engine");
            }
        }
    }
}

/// Background task translating chitchat's live-node snapshots into router
/// `add_node`/`remove_node` calls for as long as the cluster runs.
async fn watch_membership(chitchat: Arc<Mutex<Chitchat>>, router: Arc<Router>, local: NodeRef) {
    let mut live_nodes = chitchat.lock().await.live_nodes_watcher();
    let mut known: BTreeSet<NodeRef> = BTreeSet::new();

    while live_nodes.changed().await.is_ok() {
        let live_ids: BTreeSet<ChitchatId> = live_nodes.borrow().clone();
        let mut live: BTreeSet<NodeRef> = BTreeSet::new();

        {
            let guard = chitchat.lock().await;
            for id in &live_ids {
                let node = NodeRef::from_gossip_addr(id.gossip_advertise_addr);
                if node == local {
                    continue;
                }

                let seed = guard
                    .node_state(id)
                    .and_then(|state| state.get(SEED_KEY))
                    .and_then(|value| value.parse::<u64>().ok())
                    .unwrap_or(0);

                router.add_node(node.clone(), &encode_uvarint(seed));
                live.insert(node);
            }
        }

        for gone in known.difference(&live) {
            info!(node = %gone, "node left the cluster");
            router.remove_node(gone);
        }
        for fresh in live.difference(&known) {
            info!(node = %fresh, "node joined the cluster");
        }

        known = live;
    }
}
