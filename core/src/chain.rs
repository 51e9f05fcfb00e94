//! Chain access seam.
//!
//! The transfer engine never talks to an RPC endpoint directly; whatever SDK
//! the embedding service wires in implements [`ChainClient`] and is injected
//! as `Arc<dyn ChainClient>`. Tests use scripted in-memory implementations.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Current fee market sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeeData {
    /// Legacy gas price in wei.
    pub gas_price: u128,
    /// EIP-1559 max fee, when the endpoint reports one.
    pub max_fee_per_gas: Option<u128>,
    pub max_priority_fee_per_gas: Option<u128>,
}

/// Mined-transaction receipt, as much of it as the engine consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TxReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    /// Execution status flag: `false` means the transaction reverted.
    pub succeeded: bool,
    pub gas_used: u64,
}

/// A transfer ready for submission. Optional fields fall back to
/// node-side defaults when unset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitTransfer {
    pub from: String,
    pub to: String,
    /// Amount in wei (native) or token base units.
    pub amount: u128,
    /// ERC-20 contract address; `None` for native transfers.
    pub token: Option<String>,
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
    pub nonce: Option<u64>,
}

/// Capabilities the engine needs from the chain. Errors are `anyhow` values;
/// the classification boundary turns them into taxonomy entries.
#[async_trait]
pub trait ChainClient: Send + Sync {
    async fn chain_id(&self) -> Result<u64>;

    async fn block_number(&self) -> Result<u64>;

    async fn fee_data(&self) -> Result<FeeData>;

    /// Native balance of `address` in wei.
    async fn native_balance(&self, address: &str) -> Result<u128>;

    /// ERC-20 balance of `address` in token base units.
    async fn token_balance(&self, token: &str, address: &str) -> Result<u128>;

    /// Next nonce for `address` (the pending transaction count).
    async fn transaction_count(&self, address: &str) -> Result<u64>;

    /// Sign and broadcast, returning the transaction hash.
    async fn submit_transfer(&self, transfer: &SubmitTransfer) -> Result<String>;

    /// Receipt for a hash; `None` while the transaction is unmined/unknown.
    async fn transaction_receipt(&self, tx_hash: &str) -> Result<Option<TxReceipt>>;
}
