//! Network health probe and congestion-aware gas estimation.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::warn;

use crate::chain::ChainClient;
use crate::config::{NetworkConfig, TransferOperation};
use crate::display::WEI_PER_MNT;
use crate::error::{ClassifiedError, ErrorKind, Result};
use crate::rates::RateOracle;

const GWEI: u128 = 1_000_000_000;

/// Snapshot of chain reachability and fee conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkStatus {
    pub connected: bool,
    pub block_number: u64,
    /// Current gas price in wei; 0 while disconnected.
    pub gas_price: u128,
    pub chain_id: u64,
    pub latency_ms: u64,
}

impl NetworkStatus {
    fn disconnected(latency_ms: u64) -> Self {
        NetworkStatus {
            connected: false,
            block_number: 0,
            gas_price: 0,
            chain_id: 0,
            latency_ms,
        }
    }
}

/// Fee-market pressure band, derived from the current gas price.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CongestionLevel {
    Low,
    Moderate,
    High,
    Severe,
}

impl CongestionLevel {
    /// Band thresholds in gwei. The mapping is a placeholder scale — real
    /// congestion would come from base-fee trends, hence the policy seam.
    pub fn from_gas_price(gas_price_wei: u128) -> Self {
        match gas_price_wei {
            p if p < GWEI => CongestionLevel::Low,
            p if p < 10 * GWEI => CongestionLevel::Moderate,
            p if p < 50 * GWEI => CongestionLevel::High,
            _ => CongestionLevel::Severe,
        }
    }
}

/// Congestion → gas price adjustment. Injectable so deployments can swap the
/// placeholder linear scale for a smarter model without touching the engine.
pub trait GasPricePolicy: Send + Sync {
    fn adjust(&self, base_gas_price: u128, congestion: CongestionLevel) -> u128;
}

/// Default policy: step the gas price up by a fixed percentage per band.
#[derive(Debug, Clone, Default)]
pub struct LinearGasPolicy;

impl GasPricePolicy for LinearGasPolicy {
    fn adjust(&self, base_gas_price: u128, congestion: CongestionLevel) -> u128 {
        let percent: u128 = match congestion {
            CongestionLevel::Low => 100,
            CongestionLevel::Moderate => 110,
            CongestionLevel::High => 125,
            CongestionLevel::Severe => 150,
        };
        base_gas_price.saturating_mul(percent) / 100
    }
}

/// Fee estimate for one transfer, priced in wei and in the payout currency.
#[derive(Debug, Clone, Serialize)]
pub struct GasEstimate {
    pub operation: TransferOperation,
    pub gas_limit: u64,
    /// Congestion-adjusted gas price in wei.
    pub gas_price: u128,
    pub total_fee_wei: u128,
    pub congestion: CongestionLevel,
    pub fiat_fee: f64,
    pub fiat_currency: String,
}

/// Result of a health probe: the status snapshot plus deployment-level checks.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub healthy: bool,
    pub status: NetworkStatus,
    pub warnings: Vec<String>,
}

/// Lightweight probe over the chain client: connectivity, latency, and
/// fee sampling. Shared by health checks and gas estimation.
pub struct NetworkMonitor {
    client: Arc<dyn ChainClient>,
    config: NetworkConfig,
    rates: Arc<dyn RateOracle>,
    gas_policy: Arc<dyn GasPricePolicy>,
}

impl NetworkMonitor {
    pub fn new(
        client: Arc<dyn ChainClient>,
        config: NetworkConfig,
        rates: Arc<dyn RateOracle>,
    ) -> Self {
        NetworkMonitor {
            client,
            config,
            rates,
            gas_policy: Arc::new(LinearGasPolicy),
        }
    }

    pub fn with_gas_policy(mut self, policy: Arc<dyn GasPricePolicy>) -> Self {
        self.gas_policy = policy;
        self
    }

    /// Sample block height, fee data, and chain id concurrently, measuring
    /// round-trip latency. Never fails: any probe error yields a
    /// disconnected, zeroed status.
    pub async fn status(&self) -> NetworkStatus {
        let started = Instant::now();
        let (block, fee, chain) = futures::join!(
            self.client.block_number(),
            self.client.fee_data(),
            self.client.chain_id(),
        );
        let latency_ms = started.elapsed().as_millis() as u64;

        match (block, fee, chain) {
            (Ok(block_number), Ok(fee), Ok(chain_id)) => NetworkStatus {
                connected: true,
                block_number,
                gas_price: fee.gas_price,
                chain_id,
                latency_ms,
            },
            (block, fee, chain) => {
                let cause = block.err().or(fee.err()).or(chain.err());
                warn!(error = ?cause, "network status probe failed");
                NetworkStatus::disconnected(latency_ms)
            }
        }
    }

    /// Estimate the network fee for a transfer and convert it to
    /// `currency`.
    ///
    /// Unlike [`NetworkMonitor::status`], this fails loudly: callers are
    /// about to commit funds and need to know when estimation is unreliable.
    pub async fn estimate_gas_cost(
        &self,
        _amount: u128,
        currency: &str,
        operation: TransferOperation,
    ) -> Result<GasEstimate> {
        let fee = self.client.fee_data().await.map_err(|e| {
            ClassifiedError::new(
                ErrorKind::FeeDataUnavailable,
                format!("failed to fetch fee data: {e:#}"),
            )
        })?;

        let congestion = CongestionLevel::from_gas_price(fee.gas_price);
        let gas_price = self.gas_policy.adjust(fee.gas_price, congestion);
        let gas_limit = self.config.gas_limits.limit_for(operation);
        let total_fee_wei = gas_price.saturating_mul(gas_limit as u128);

        let rate = self.rates.rate("MNT", currency).ok_or_else(|| {
            ClassifiedError::new(
                ErrorKind::ConfigurationError,
                format!("no conversion rate configured for MNT/{currency}"),
            )
        })?;
        let fiat_fee = total_fee_wei as f64 / WEI_PER_MNT as f64 * rate;

        Ok(GasEstimate {
            operation,
            gas_limit,
            gas_price,
            total_fee_wei,
            congestion,
            fiat_fee,
            fiat_currency: currency.to_uppercase(),
        })
    }

    /// Probe the network and check it against the configured deployment.
    pub async fn health_check(&self) -> HealthReport {
        let status = self.status().await;
        let mut warnings = Vec::new();

        if !self.config.enabled {
            warnings.push("blockchain rail is disabled in configuration".to_string());
        }
        if !status.connected {
            warnings.push("RPC endpoint is unreachable".to_string());
        } else if status.chain_id != self.config.chain_id {
            warnings.push(format!(
                "connected to chain {} but configured for {}",
                status.chain_id, self.config.chain_id
            ));
        }
        if status.connected && status.latency_ms > 2000 {
            warnings.push(format!("high RPC latency: {}ms", status.latency_ms));
        }

        let healthy = self.config.enabled
            && status.connected
            && status.chain_id == self.config.chain_id;
        HealthReport {
            healthy,
            status,
            warnings,
        }
    }
}
