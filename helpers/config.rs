//! Client and confirmation settings

use std::{fmt, path::PathBuf, str::FromStr, time::Duration};

use miden_client::rpc::Endpoint;

use crate::error::{DeployError, Result};

/// Public Miden networks a script can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Network {
    #[default]
    Testnet,
    Devnet,
    Localhost,
}

impl Network {
    pub fn endpoint(self) -> Endpoint {
        match self {
            Network::Testnet => Endpoint::testnet(),
            Network::Devnet => Endpoint::devnet(),
            Network::Localhost => Endpoint::localhost(),
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "testnet" => Ok(Network::Testnet),
            "devnet" => Ok(Network::Devnet),
            "localhost" | "local" => Ok(Network::Localhost),
            other => Err(format!(
                "unknown network `{other}`, expected testnet, devnet or localhost"
            )),
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Network::Testnet => "Miden testnet",
            Network::Devnet => "Miden devnet",
            Network::Localhost => "local Miden node",
        };
        f.write_str(name)
    }
}

/// Settings for [`crate::setup_client`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub rpc_timeout_ms: u64,
    pub keystore_path: PathBuf,
    pub store_path: PathBuf,
    pub debug_mode: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: Network::default().endpoint(),
            rpc_timeout_ms: 10_000,
            keystore_path: PathBuf::from("./keystore"),
            store_path: PathBuf::from("./store.sqlite3"),
            debug_mode: true,
        }
    }
}

impl ClientConfig {
    pub fn for_network(network: Network) -> Self {
        Self {
            endpoint: network.endpoint(),
            ..Default::default()
        }
    }

    /// Replaces the network endpoint with an explicit RPC url.
    pub fn with_rpc_url(mut self, rpc_url: &str) -> Result<Self> {
        self.endpoint = Endpoint::try_from(rpc_url)
            .map_err(|e| DeployError::Config(format!("invalid rpc url {rpc_url}: {e:?}")))?;
        Ok(self)
    }

    pub fn store_path_str(&self) -> Result<&str> {
        self.store_path.to_str().ok_or_else(|| {
            DeployError::Config(format!(
                "store path {} is not valid UTF-8",
                self.store_path.display()
            ))
        })
    }
}

/// How long to wait for a submitted transaction to be committed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitPolicy {
    pub poll_interval: Duration,
    pub max_attempts: u32,
}

impl Default for CommitPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            max_attempts: 60,
        }
    }
}
