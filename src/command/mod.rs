//! The closed set of client commands: parsing, textual round-trip (used
//! when relaying to the owning peer), and execution.

mod duration;

use crate::cluster::Cluster;
use crate::error::{DbError, Result};
use crate::router::NodeRef;
use crate::store::Store;
use duration::{format_lifetime_secs, parse_lifetime_secs};

/// Either side of the wire-level status byte: `Void` serializes as a
/// zero-length success payload, `Payload` carries bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandResult {
    Void,
    Payload(String),
}

/// The closed set of verbs. Distributed commands carry a `hashing_key`;
/// local commands are always executed on the node that received them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Store { key: String, value: String },
    StoreExpiring { key: String, value: String, lifetime_secs: u64 },
    Fetch { key: String },
    Del { key: String },
    NodeStats,
    ClusterStats,
    ClusterListNodes,
    ClusterJoin { address: String },
}

impl Command {
    pub fn distributed(&self) -> bool {
        matches!(
            self,
            Command::Store { .. } | Command::StoreExpiring { .. } | Command::Fetch { .. } | Command::Del { .. }
        )
    }

    /// The key this command routes on. `None` for local commands.
    pub fn hashing_key(&self) -> Option<&str> {
        match self {
            Command::Store { key, .. } => Some(key),
            Command::StoreExpiring { key, .. } => Some(key),
            Command::Fetch { key } => Some(key),
            Command::Del { key } => Some(key),
            _ => None,
        }
    }

    /// Textual form used when relaying to the owning peer. Must re-parse
    /// to an equivalent command.
    pub fn text(&self) -> String {
        match self {
            Command::Store { key, value } => format!("store {key} {value}"),
            Command::StoreExpiring { key, value, lifetime_secs } => {
                format!("storex {key} {} {value}", format_lifetime_secs(*lifetime_secs))
            }
            Command::Fetch { key } => format!("fetch {key}"),
            Command::Del { key } => format!("del {key}"),
            Command::NodeStats => "node stats".to_string(),
            Command::ClusterStats => "cluster stats".to_string(),
            Command::ClusterListNodes => "cluster nodes".to_string(),
            Command::ClusterJoin { address } => format!("cluster join {address}"),
        }
    }

    pub fn execute(&self, store: &dyn Store, cluster: &Cluster) -> Result<CommandResult> {
        match self {
            Command::Store { key, value } => {
                store.set(key, value);
                Ok(CommandResult::Void)
            }
            Command::StoreExpiring { key, value, lifetime_secs } => {
                store.set_expiring(key, value, *lifetime_secs);
                Ok(CommandResult::Void)
            }
            Command::Fetch { key } => match store.get(key) {
                Ok((value, _)) => Ok(CommandResult::Payload(value)),
                Err(DbError::KeyNotFound) | Err(DbError::KeyExpired) => Ok(CommandResult::Payload(String::new())),
                Err(e) => Err(e),
            },
            Command::Del { key } => {
                store.delete(key);
                Ok(CommandResult::Void)
            }
            Command::NodeStats => Ok(CommandResult::Payload(format!("Keys: {}", store.len()))),
            Command::ClusterStats => Ok(CommandResult::Payload(format!("Nodes: {}", cluster.members().len()))),
            Command::ClusterListNodes => {
                let nodes: Vec<String> = cluster.members().iter().map(NodeRef::to_string).collect();
                Ok(CommandResult::Payload(nodes.join(",")))
            }
            Command::ClusterJoin { .. } => {
                unreachable!("ClusterJoin is handled by Server::dispatch before execute is called")
            }
        }
    }
}

/// Parses one newline-terminated request line (the trailing `\n` must
/// already be stripped by the caller).
pub fn parse(line: &str) -> Result<Command> {
    let mut parts = line.splitn(2, ' ');
    let verb = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("").trim_start();

    match verb {
        "store" => {
            let mut parts = rest.splitn(2, ' ');
            let key = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            if key.is_empty() {
                return Err(DbError::Protocol("No key given".to_string()));
            }
            if value.is_empty() {
                return Err(DbError::Protocol("No value given".to_string()));
            }
            Ok(Command::Store { key: key.to_string(), value: value.to_string() })
        }
        "storex" => {
            let mut parts = rest.splitn(3, ' ');
            let key = parts.next().unwrap_or("");
            let lifetime = parts.next().unwrap_or("");
            let value = parts.next().unwrap_or("");
            if key.is_empty() {
                return Err(DbError::Protocol("No key given".to_string()));
            }
            if lifetime.is_empty() {
                return Err(DbError::Protocol("No lifetime given".to_string()));
            }
            if value.is_empty() {
                return Err(DbError::Protocol("No value given".to_string()));
            }
            let lifetime_secs = parse_lifetime_secs(lifetime)?;
            Ok(Command::StoreExpiring { key: key.to_string(), value: value.to_string(), lifetime_secs })
        }
        "fetch" => {
            if rest.is_empty() {
                return Err(DbError::Protocol("No key given".to_string()));
            }
            Ok(Command::Fetch { key: rest.to_string() })
        }
        "del" => {
            if rest.is_empty() {
                return Err(DbError::Protocol("No key given".to_string()));
            }
            Ok(Command::Del { key: rest.to_string() })
        }
        "node" => match rest {
            "stats" => Ok(Command::NodeStats),
            other => Err(DbError::Protocol(format!("Unknown node subcommand: {other}"))),
        },
        "cluster" => {
            let mut parts = rest.splitn(2, ' ');
            let sub = parts.next().unwrap_or("");
            let arg = parts.next().unwrap_or("");
            match sub {
                "stats" => Ok(Command::ClusterStats),
                "nodes" => Ok(Command::ClusterListNodes),
                "join" => {
                    if arg.is_empty() {
                        return Err(DbError::Protocol("No address given".to_string()));
                    }
                    Ok(Command::ClusterJoin { address: arg.to_string() })
                }
                other => Err(DbError::Protocol(format!("Unknown cluster subcommand: {other}"))),
            }
        }
        "" => Err(DbError::Protocol("Empty command".to_string())),
        other => Err(DbError::Protocol(format!("Unknown verb: {other}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_store() {
        let cmd = parse("store key some-value").unwrap();
        assert_eq!(cmd, Command::Store { key: "key".to_string(), value: "some-value".to_string() });
    }

    #[test]
    fn store_requires_a_value() {
        let err = parse("store key ").unwrap_err();
        assert_eq!(err.to_string(), "protocol error: No value given");
    }

    #[test]
    fn store_value_may_contain_spaces() {
        let cmd = parse("store key some value with spaces").unwrap();
        assert_eq!(cmd, Command::Store { key: "key".to_string(), value: "some value with spaces".to_string() });
    }

    #[test]
    fn parses_storex() {
        let cmd = parse("storex k 1s v").unwrap();
        assert_eq!(cmd, Command::StoreExpiring { key: "k".to_string(), value: "v".to_string(), lifetime_secs: 1 });
    }

    #[test]
    fn parses_fetch_and_del() {
        assert_eq!(parse("fetch k").unwrap(), Command::Fetch { key: "k".to_string() });
        assert_eq!(parse("del k").unwrap(), Command::Del { key: "k".to_string() });
    }

    #[test]
    fn parses_node_stats() {
        assert_eq!(parse("node stats").unwrap(), Command::NodeStats);
    }

    #[test]
    fn parses_cluster_subcommands() {
        assert_eq!(parse("cluster nodes").unwrap(), Command::ClusterListNodes);
        assert_eq!(parse("cluster stats").unwrap(), Command::ClusterStats);
        assert_eq!(
            parse("cluster join 10.0.0.2:4224").unwrap(),
            Command::ClusterJoin { address: "10.0.0.2:4224".to_string() }
        );
    }

    #[test]
    fn unknown_verb_is_an_error() {
        assert!(parse("frobnicate key").is_err());
    }

    #[test]
    fn empty_line_is_an_error() {
        assert!(parse("").is_err());
    }

    #[test]
    fn every_distributed_command_round_trips_through_its_text_form() {
        let commands = vec![
            Command::Store { key: "k".to_string(), value: "v".to_string() },
            Command::StoreExpiring { key: "k".to_string(), value: "v".to_string(), lifetime_secs: 30 },
            Command::Fetch { key: "k".to_string() },
            Command::Del { key: "k".to_string() },
        ];

        for command in commands {
            assert!(command.distributed());
            let reparsed = parse(&command.text()).unwrap();
            assert_eq!(reparsed, command);
        }
    }

    #[test]
    fn local_commands_round_trip_too() {
        let commands = vec![
            Command::NodeStats,
            Command::ClusterStats,
            Command::ClusterListNodes,
            Command::ClusterJoin { address: "10.0.0.2:4224".to_string() },
        ];

        for command in commands {
            assert!(!command.distributed());
            assert_eq!(command.hashing_key(), None);
            let reparsed = parse(&command.text()).unwrap();
            assert_eq!(reparsed, command);
        }
    }
}
