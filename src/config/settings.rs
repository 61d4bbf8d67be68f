use crate::error::{BlockchainError, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

static DEFAULT_NODE_ADDR: &str = "127.0.0.1:2001";

const NODE_ADDRESS_KEY: &str = "NODE_ADDRESS";
const NODE_ID_KEY: &str = "NODE_ID";
const MINING_DIFFICULTY_KEY: &str = "MINING_DIFFICULTY";
const SEED_PEERS_KEY: &str = "SEED_PEERS";

/// Highest difficulty a SHA-256 hex digest can express
pub const MAX_DIFFICULTY: u32 = 64;

/// Node settings
///
/// Resolved from defaults, then an optional TOML file, then environment
/// variables, then command-line flags (applied by the caller).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub node_addr: String,
    pub node_id: String,
    pub difficulty: u32,
    pub max_mining_attempts: u64,
    /// 0 disables the periodic miner
    pub mining_interval_secs: u64,
    pub mempool_max_age_secs: u64,
    pub seeds: Vec<String>,
    pub discovery_interval_secs: u64,
    pub connect_timeout_ms: u64,
    pub connect_retries: u32,
    pub max_peers: usize,
    pub idle_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            node_addr: DEFAULT_NODE_ADDR.to_string(),
            node_id: uuid::Uuid::new_v4().to_string(),
            difficulty: 2,
            max_mining_attempts: crate::core::proof_of_work::MAX_MINING_ATTEMPTS,
            mining_interval_secs: 0,
            mempool_max_age_secs: 3600,
            seeds: vec![],
            discovery_interval_secs: 300,
            connect_timeout_ms: 5000,
            connect_retries: 3,
            max_peers: 8,
            idle_timeout_secs: 300,
        }
    }
}

impl Settings {
    /// Defaults, overlaid with `path` when given, then with the process environment
    pub fn load(path: Option<&Path>) -> Result<Settings> {
        let mut settings = match path {
            Some(path) => Self::from_file(path)?,
            None => Settings::default(),
        };
        settings.apply_env(|key| std::env::var(key).ok())?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: &Path) -> Result<Settings> {
        let text = fs::read_to_string(path).map_err(|e| {
            BlockchainError::Config(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Settings> {
        Ok(toml::from_str(text)?)
    }

    /// Overlay values found through `lookup`, normally `std::env::var`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(NODE_ADDRESS_KEY) {
            self.node_addr = addr;
        }
        if let Some(node_id) = lookup(NODE_ID_KEY) {
            self.node_id = node_id;
        }
        if let Some(difficulty) = lookup(MINING_DIFFICULTY_KEY) {
            self.difficulty = difficulty.trim().parse().map_err(|e| {
                BlockchainError::Config(format!("{MINING_DIFFICULTY_KEY}={difficulty}: {e}"))
            })?;
        }
        if let Some(seeds) = lookup(SEED_PEERS_KEY) {
            self.seeds = seeds
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect();
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.difficulty > MAX_DIFFICULTY {
            return Err(BlockchainError::Config(format!(
                "difficulty {} exceeds {MAX_DIFFICULTY}",
                self.difficulty
            )));
        }
        if self.max_mining_attempts == 0 {
            return Err(BlockchainError::Config(
                "max_mining_attempts must be positive".to_string(),
            ));
        }
        if self.connect_retries == 0 {
            return Err(BlockchainError::Config(
                "connect_retries must be positive".to_string(),
            ));
        }
        if self.max_peers == 0 {
            return Err(BlockchainError::Config(
                "max_peers must be positive".to_string(),
            ));
        }
        self.socket_addr()?;
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.node_addr.parse().map_err(|e| {
            BlockchainError::Config(format!("Invalid node address {}: {e}", self.node_addr))
        })
    }

    pub fn default_port(&self) -> u16 {
        self.socket_addr()
            .map(|addr| addr.port())
            .unwrap_or(2001)
    }

    pub fn mining_interval(&self) -> Option<Duration> {
        match self.mining_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    pub fn mempool_max_age(&self) -> Duration {
        Duration::from_secs(self.mempool_max_age_secs)
    }

    pub fn discovery_interval(&self) -> Duration {
        Duration::from_secs(self.discovery_interval_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}
