//! Configuration loaded from YAML.
//!
//! ```yaml
//! type: cache
//! queue_prefix: tether/ha/
//! cache:
//!   type: redis
//!   addresses: ["127.0.0.1:6379"]
//!   database: 0
//!   credential:
//!     username: ""
//!     password: ""
//!   pool:
//!     max_retries: 3
//!     connect_timeout_ms: 5000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{TetherError, TetherResult};

/// Default queue key prefix; a Kind's retry queue lives at `prefix + kind`.
pub const DEFAULT_QUEUE_PREFIX: &str = "tether/ha/";

/// Executor backends. Only the cache-backed executor exists.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutorType {
    #[default]
    Cache,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

/// Connection settings carried over from the pool section.
///
/// The Redis binding multiplexes one connection per node, so only retry and
/// timeout settings apply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolProperties {
    /// Extra attempts after a failed connect; cluster clients also retry commands.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

impl Default for PoolProperties {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

impl PoolProperties {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

/// One `host:port` entry of `cache.addresses`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddress {
    pub host: String,
    pub port: u16,
}

pub const DEFAULT_REDIS_PORT: u16 = 6379;

impl NodeAddress {
    /// Parse `host`, `host:port` or `[v6]:port`.
    pub fn parse(address: &str) -> TetherResult<Self> {
        let address = address.trim();
        let invalid = || TetherError::Config(format!("invalid cache address '{address}'"));
        let (host, port) = match address.rsplit_once(':') {
            // Bare IPv6 without brackets has no port.
            Some((host, _)) if host.contains(':') && !host.starts_with('[') => (address, None),
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (address, None),
        };
        let host = host.trim_start_matches('[').trim_end_matches(']');
        if host.is_empty() {
            return Err(invalid());
        }
        Ok(Self {
            host: host.to_string(),
            port: port.unwrap_or(DEFAULT_REDIS_PORT),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheProperties {
    #[serde(rename = "type", default)]
    pub cache_type: CacheType,

    /// `host:port` entries. One address is a single node, several are a cluster.
    #[serde(default)]
    pub addresses: Vec<String>,

    #[serde(default)]
    pub database: u32,

    #[serde(default)]
    pub credential: Credential,

    #[serde(default)]
    pub pool: PoolProperties,
}

impl CacheProperties {
    pub fn memory() -> Self {
        Self {
            cache_type: CacheType::Memory,
            addresses: Vec::new(),
            database: 0,
            credential: Credential::default(),
            pool: PoolProperties::default(),
        }
    }

    pub fn redis(address: impl Into<String>) -> Self {
        Self {
            cache_type: CacheType::Redis,
            addresses: vec![address.into()],
            ..Self::memory()
        }
    }

    pub fn redis_cluster<S: Into<String>>(addresses: impl IntoIterator<Item = S>) -> Self {
        Self {
            cache_type: CacheType::Redis,
            addresses: addresses.into_iter().map(Into::into).collect(),
            ..Self::memory()
        }
    }

    pub fn is_cluster(&self) -> bool {
        self.addresses.len() > 1
    }

    pub fn validate(&self) -> TetherResult<()> {
        match self.cache_type {
            CacheType::Memory => Ok(()),
            CacheType::Redis => {
                self.nodes()?;
                if self.is_cluster() && self.database != 0 {
                    return Err(TetherError::Unsupported {
                        what: "redis cluster database",
                        value: self.database.to_string(),
                    });
                }
                if self.pool.connect_timeout_ms == 0 {
                    return Err(TetherError::InvalidDuration("pool.connect_timeout_ms"));
                }
                Ok(())
            }
        }
    }

    /// Parsed `addresses`; at least one.
    pub fn nodes(&self) -> TetherResult<Vec<NodeAddress>> {
        if self.addresses.is_empty() {
            return Err(TetherError::Config(
                "cache.addresses must name at least one redis node".to_string(),
            ));
        }
        self.addresses.iter().map(|a| NodeAddress::parse(a)).collect()
    }
}

impl Default for CacheProperties {
    fn default() -> Self {
        Self::memory()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Properties {
    #[serde(rename = "type", default)]
    pub executor_type: ExecutorType,

    #[serde(default = "default_queue_prefix")]
    pub queue_prefix: String,

    #[serde(default)]
    pub cache: CacheProperties,
}

fn default_queue_prefix() -> String {
    DEFAULT_QUEUE_PREFIX.to_string()
}

impl Default for Properties {
    fn default() -> Self {
        Self {
            executor_type: ExecutorType::Cache,
            queue_prefix: default_queue_prefix(),
            cache: CacheProperties::default(),
        }
    }
}

impl Properties {
    pub fn from_yaml_str(yaml: &str) -> TetherResult<Self> {
        let props: Self =
            serde_yaml::from_str(yaml).map_err(|e| TetherError::Config(e.to_string()))?;
        props.validate()?;
        Ok(props)
    }

    pub fn load(path: impl AsRef<Path>) -> TetherResult<Self> {
        let path = path.as_ref();
        let yaml = std::fs::read_to_string(path)
            .map_err(|e| TetherError::Config(format!("{}: {e}", path.display())))?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> TetherResult<()> {
        if self.queue_prefix.is_empty() {
            return Err(TetherError::Config("queue_prefix must not be empty".to_string()));
        }
        self.cache.validate()
    }
}
