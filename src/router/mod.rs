//! Rendezvous (highest-random-weight) hashing over the live cluster
//! membership.
//!
//! Adding a node takes only its fair share of keys; removing one
//! redistributes only that node's keys. The hash function and the
//! tie-break rule are both part of the wire contract: every peer must
//! compute the same owner for the same key, or requests will ping-pong
//! between nodes that disagree.

mod varint;

pub use varint::{decode_uvarint, encode_uvarint, MAX_VARINT_LEN};

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// A peer's `(host, service_port)` identity. Its stringified address is
/// used for equality, routing, and as the tie-break key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeRef {
    pub host: String,
    pub service_port: u16,
}

impl NodeRef {
    pub fn new(host: impl Into<String>, service_port: u16) -> Self {
        Self {
            host: host.into(),
            service_port,
        }
    }

    /// The gossip substrate listens on `service_port + 1`.
    pub fn gossip_port(&self) -> u16 {
        self.service_port + 1
    }

    pub fn client_addr(&self) -> String {
        format!("{}:{}", self.host, self.service_port)
    }

    /// Parse a `host:port` string into a `NodeRef`.
    pub fn parse(addr: &str) -> Option<Self> {
        let (host, port) = addr.rsplit_once(':')?;
        let port: u16 = port.parse().ok()?;
        Some(Self::new(host, port))
    }

    /// Build a `NodeRef` from a gossip-advertised socket address, whose
    /// port is `service_port + 1` by convention.
    pub fn from_gossip_addr(addr: SocketAddr) -> Self {
        Self::new(addr.ip().to_string(), addr.port() - 1)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.client_addr())
    }
}

/// Mapping of live nodes to their advertised routing seeds, plus the
/// rendezvous-hashing `responsible` query.
pub struct Router {
    seeds: RwLock<HashMap<NodeRef, u64>>,
    local_seed: u64,
}

impl Router {
    /// Create a router whose local seed is drawn once, at process start,
    /// from a non-cryptographic PRNG. The seed is used only for routing
    /// fairness, never for anything trust-bearing.
    pub fn new(local_seed: u64) -> Self {
        Self {
            seeds: RwLock::new(HashMap::new()),
            local_seed,
        }
    }

    pub fn local_seed(&self) -> u64 {
        self.local_seed
    }

    /// Variable-length encoding of the local seed, advertised as gossip
    /// metadata (upper bound 10 bytes).
    pub fn seed_bytes(&self) -> Vec<u8> {
        encode_uvarint(self.local_seed)
    }

    /// Decode a varint-encoded seed and associate it with `node`.
    /// Idempotent: replaces any existing seed for the same node.
    pub fn add_node(&self, node: NodeRef, seed_bytes: &[u8]) {
        let (seed, _) = decode_uvarint(seed_bytes);
        self.seeds.write().insert(node, seed);
    }

    /// No-op if `node` is not present.
    pub fn remove_node(&self, node: &NodeRef) {
        self.seeds.write().remove(node);
    }

    pub fn contains(&self, node: &NodeRef) -> bool {
        self.seeds.read().contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.seeds.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of all currently known nodes, in no particular order.
    pub fn nodes(&self) -> Vec<NodeRef> {
        self.seeds.read().keys().cloned().collect()
    }

    /// The node maximizing `H(key, seed(n))`, or `None` if membership is
    /// empty. Ties are broken deterministically by lexicographic address
    /// comparison, so every peer computing `responsible` over the same
    /// membership set agrees on the owner (see module docs).
    pub fn responsible(&self, key: &str) -> Option<NodeRef> {
        let seeds = self.seeds.read();

        let mut best: Option<(&NodeRef, u64)> = None;
        for (node, seed) in seeds.iter() {
            let score = score(key, *seed);
            best = Some(match best {
                None => (node, score),
                Some((best_node, best_score)) => {
                    if score > best_score || (score == best_score && node.client_addr() < best_node.client_addr())
                    {
                        (node, score)
                    } else {
                        (best_node, best_score)
                    }
                }
            });
        }

        best.map(|(node, _)| node.clone())
    }
}

/// Score a key against a node's seed using a keyed 64-bit hash. Must stay
/// stable across processes and versions: it's part of the wire contract.
fn score(key: &str, seed: u64) -> u64 {
    xxh3_64_with_seed(key.as_bytes(), seed)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(addr: &str) -> NodeRef {
        NodeRef::parse(addr).unwrap()
    }

    #[test]
    fn empty_router_has_no_responsible_node() {
        let router = Router::new(1);
        assert_eq!(router.responsible("any-key"), None);
    }

    #[test]
    fn responsible_is_deterministic_across_routers_with_identical_membership() {
        let r1 = Router::new(0);
        let r2 = Router::new(0);

        for (addr, seed) in [("10.0.0.1:4224", 7u64), ("10.0.0.2:4224", 42), ("10.0.0.3:4224", 99)] {
            r1.add_node(node(addr), &encode_uvarint(seed));
            r2.add_node(node(addr), &encode_uvarint(seed));
        }

        for i in 0..200 {
            let key = format!("key-{i}");
            assert_eq!(r1.responsible(&key), r2.responsible(&key));
        }
    }

    #[test]
    fn add_node_is_idempotent_on_repeated_add() {
        let router = Router::new(0);
        let n = node("10.0.0.1:4224");

        router.add_node(n.clone(), &encode_uvarint(1));
        router.add_node(n.clone(), &encode_uvarint(2));

        assert_eq!(router.len(), 1);
    }

    #[test]
    fn remove_node_is_a_no_op_when_absent() {
        let router = Router::new(0);
        router.remove_node(&node("10.0.0.1:4224"));
        assert_eq!(router.len(), 0);
    }

    #[test]
    fn tie_break_favors_lexicographically_smallest_address() {
        // Construct two nodes and brute-force a key whose scores collide,
        // then confirm the deterministic tie-break picks the lexically
        // smaller address rather than whichever happened to iterate last.
        let a = node("a.example:4224");
        let b = node("b.example:4224");

        let seed_a = 11u64;
        let seed_b = 11u64;

        let mut collision_key = None;
        for i in 0..100_000u64 {
            let key = format!("probe-{i}");
            if score(&key, seed_a) == score(&key, seed_b) {
                collision_key = Some(key);
                break;
            }
        }

        let router = Router::new(0);
        router.add_node(a.clone(), &encode_uvarint(seed_a));
        router.add_node(b.clone(), &encode_uvarint(seed_b));

        if let Some(key) = collision_key {
            assert_eq!(router.responsible(&key), Some(a));
        } else {
            // No collision found in the probe space; the property still
            // holds by construction of `responsible`'s tie-break branch,
            // exercised directly here instead.
            assert!(a.client_addr() < b.client_addr());
        }
    }

    #[test]
    fn seed_bytes_round_trips_through_add_node() {
        for seed in [0u64, 1, 255, 65535, u64::MAX] {
            let router = Router::new(seed);
            let bytes = router.seed_bytes();
            assert!(bytes.len() <= MAX_VARINT_LEN);

            let other = Router::new(0);
            other.add_node(node("10.0.0.1:4224"), &bytes);
            let (decoded, _) = decode_uvarint(&bytes);
            assert_eq!(decoded, seed);
        }
    }

    #[test]
    fn node_ref_gossip_port_is_client_port_plus_one() {
        let n = node("10.0.0.1:4224");
        assert_eq!(n.gossip_port(), 4225);
    }
}
