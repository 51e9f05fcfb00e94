//! Network configuration.
//!
//! An explicit, immutable value handed to constructors — there is no global
//! singleton. The embedding service builds one from its environment layer and
//! passes it down.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainNetwork {
    Mainnet,
    Sepolia,
    Custom,
}

impl std::fmt::Display for ChainNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChainNetwork::Mainnet => write!(f, "mainnet"),
            ChainNetwork::Sepolia => write!(f, "sepolia"),
            ChainNetwork::Custom => write!(f, "custom"),
        }
    }
}

/// Gas limits per transfer shape. Native sends are plain value transfers;
/// token sends pay for the ERC-20 `transfer` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GasLimits {
    pub native_transfer: u64,
    pub token_transfer: u64,
}

impl Default for GasLimits {
    fn default() -> Self {
        GasLimits {
            native_transfer: 21_000,
            token_transfer: 65_000,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferOperation {
    Native,
    Token,
}

impl GasLimits {
    pub fn limit_for(&self, operation: TransferOperation) -> u64 {
        match operation {
            TransferOperation::Native => self.native_transfer,
            TransferOperation::Token => self.token_transfer,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: ChainNetwork,
    /// Override for the RPC endpoint; required for [`ChainNetwork::Custom`].
    pub custom_url: Option<String>,
    pub chain_id: u64,
    /// Blocks mined after a transaction's block before it counts as final.
    pub confirmation_depth: u64,
    /// Status polling interval used by transfer monitoring.
    pub poll_interval_ms: u64,
    pub gas_limits: GasLimits,
    /// Whether the blockchain rail is enabled at all for this deployment.
    pub enabled: bool,
}

impl NetworkConfig {
    pub fn mainnet() -> Self {
        NetworkConfig {
            network: ChainNetwork::Mainnet,
            custom_url: None,
            chain_id: 5000,
            confirmation_depth: 3,
            poll_interval_ms: 3000,
            gas_limits: GasLimits::default(),
            enabled: true,
        }
    }

    pub fn sepolia() -> Self {
        NetworkConfig {
            network: ChainNetwork::Sepolia,
            custom_url: None,
            chain_id: 5003,
            confirmation_depth: 1,
            poll_interval_ms: 3000,
            gas_limits: GasLimits::default(),
            enabled: true,
        }
    }

    pub fn custom(url: impl Into<String>, chain_id: u64) -> Self {
        NetworkConfig {
            network: ChainNetwork::Custom,
            custom_url: Some(url.into()),
            chain_id,
            confirmation_depth: 1,
            poll_interval_ms: 3000,
            gas_limits: GasLimits::default(),
            enabled: true,
        }
    }

    /// RPC endpoint for this network.
    pub fn rpc_url(&self) -> Option<&str> {
        match self.network {
            ChainNetwork::Mainnet => Some("https://rpc.mantle.xyz"),
            ChainNetwork::Sepolia => Some("https://rpc.sepolia.mantle.xyz"),
            ChainNetwork::Custom => self.custom_url.as_deref(),
        }
    }

    pub fn network_name(&self) -> String {
        self.network.to_string()
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig::sepolia()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_networks_have_endpoints() {
        assert_eq!(NetworkConfig::mainnet().rpc_url(), Some("https://rpc.mantle.xyz"));
        assert_eq!(
            NetworkConfig::sepolia().rpc_url(),
            Some("https://rpc.sepolia.mantle.xyz")
        );
    }

    #[test]
    fn custom_network_requires_a_url() {
        let config = NetworkConfig {
            custom_url: None,
            ..NetworkConfig::custom("http://localhost:8545", 31337)
        };
        assert_eq!(config.rpc_url(), None);
    }

    #[test]
    fn gas_limit_table_resolves_per_operation() {
        let limits = GasLimits::default();
        assert_eq!(limits.limit_for(TransferOperation::Native), 21_000);
        assert_eq!(limits.limit_for(TransferOperation::Token), 65_000);
    }

    #[test]
    fn config_round_trips_through_serde() {
        let config = NetworkConfig::mainnet();
        let json = serde_json::to_string(&config).unwrap();
        let back: NetworkConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
