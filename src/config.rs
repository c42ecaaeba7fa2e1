//! Process configuration: CLI flags with an optional TOML override file.

use crate::error::{DbError, Result};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Command-line arguments for `rustystore-server`.
#[derive(Debug, Parser)]
#[command(name = "rustystore-server", about = "Distributed in-memory key-value store")]
pub struct Cli {
    /// Host to listen on for client connections
    #[arg(long)]
    pub host: Option<String>,

    /// Client-facing TCP port (the gossip port is this plus one)
    #[arg(long)]
    pub port: Option<u16>,

    /// Address of an existing cluster member to join, e.g. 10.0.0.2:4224
    #[arg(long = "cluster")]
    pub cluster: Option<String>,

    /// Optional path to a TOML config file overriding the defaults below
    #[arg(long, default_value = "rustystore.toml")]
    pub config_file: String,
}

/// Runtime configuration for a single node.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub cluster: Option<String>,

    pub read_timeout: Duration,
    pub write_timeout: Duration,

    pub eviction_interval: Duration,
    pub eviction_batch_percent: u32,

    pub stabilize_interval: Duration,
    pub stabilize_batch_percent: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 4224,
            cluster: None,

            read_timeout: Duration::from_secs(5),
            write_timeout: Duration::from_secs(5),

            eviction_interval: Duration::from_secs(10),
            eviction_batch_percent: 20,

            stabilize_interval: Duration::from_secs(120),
            stabilize_batch_percent: 20,
        }
    }
}

impl Config {
    /// Load the on-disk TOML file if present, then apply CLI overrides.
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = if Path::new(&cli.config_file).exists() {
            let contents = std::fs::read_to_string(&cli.config_file).map_err(DbError::Io)?;
            toml::from_str(&contents)
                .map_err(|e| DbError::Configuration(format!("invalid config file: {e}")))?
        } else {
            Config::default()
        };

        if let Some(host) = &cli.host {
            config.host = host.clone();
        }
        if let Some(port) = cli.port {
            config.port = port;
        }
        if cli.cluster.is_some() {
            config.cluster = cli.cluster.clone();
        }

        Ok(config)
    }

    /// Client-facing listen address.
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Gossip listen address, one port above the client-facing port.
    pub fn gossip_addr(&self) -> String {
        format!("{}:{}", self.host, self.port + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_matches_documented_defaults() {
        let config = Config::default();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 4224);
        assert_eq!(config.read_timeout, Duration::from_secs(5));
        assert_eq!(config.write_timeout, Duration::from_secs(5));
        assert_eq!(config.eviction_batch_percent, 20);
    }

    #[test]
    fn listen_and_gossip_addr_are_one_port_apart() {
        let config = Config {
            host: "127.0.0.1".to_string(),
            port: 4224,
            ..Config::default()
        };
        assert_eq!(config.listen_addr(), "127.0.0.1:4224");
        assert_eq!(config.gossip_addr(), "127.0.0.1:4225");
    }

    #[test]
    fn load_reads_a_toml_file_and_applies_cli_overrides_on_top() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rustystore.toml");
        std::fs::write(&path, "host = \"10.0.0.5\"\nport = 9000\neviction_batch_percent = 50\n").unwrap();

        let cli = Cli {
            host: None,
            port: Some(4224), // CLI override beats the file's port
            cluster: None,
            config_file: path.to_string_lossy().into_owned(),
        };

        let config = Config::load(&cli).unwrap();
        assert_eq!(config.host, "10.0.0.5"); // from the file, no CLI override
        assert_eq!(config.port, 4224); // CLI override wins
        assert_eq!(config.eviction_batch_percent, 50);
    }

    #[test]
    fn load_falls_back_to_defaults_when_no_file_is_present() {
        let cli = Cli {
            host: None,
            port: None,
            cluster: None,
            config_file: "does-not-exist.toml".to_string(),
        };

        let config = Config::load(&cli).unwrap();
        assert_eq!(config.host, Config::default().host);
        assert_eq!(config.port, Config::default().port);
    }
}
