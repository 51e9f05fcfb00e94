//! Blockchain transfer engine for the Remit cross-border payments service.
//!
//! The API layer hands this crate a transfer request; it classifies every
//! chain failure into a fixed taxonomy, retries under per-kind policies,
//! tracks confirmation, and reports whether a failed payment should reroute
//! to the traditional card rail.

pub mod chain;
pub mod classify;
pub mod config;
pub mod display;
pub mod error;
pub mod network;
pub mod rates;
pub mod retry;
pub mod service;
pub mod store;
pub mod taxonomy;

pub use chain::{ChainClient, FeeData, SubmitTransfer, TxReceipt};
pub use classify::{classify, classify_with_context, ErrorInput, RawFailure};
pub use config::{ChainNetwork, GasLimits, NetworkConfig, TransferOperation};
pub use error::{ClassifiedError, ErrorCategory, ErrorKind, RecommendedRoute};
pub use network::{
    CongestionLevel, GasEstimate, GasPricePolicy, HealthReport, LinearGasPolicy, NetworkMonitor,
    NetworkStatus,
};
pub use rates::{FixedRateOracle, RateOracle};
pub use retry::{
    backoff_delay, execute_with_adaptive_retry, execute_with_gas_retry, execute_with_nonce_retry,
    execute_with_retry, RetryOutcome, GAS_MULTIPLIERS,
};
pub use service::{
    StatusReport, TransferOutcome, TransferRecord, TransferRequest, TransferService,
    TransferStatus,
};
pub use store::{TransferPage, TransferStore};
pub use taxonomy::{FallbackPolicy, FallbackStrategy, LogLevel, RetryConfig};

/// Check an EVM address: `0x` prefix followed by exactly 40 hex digits.
/// Checksum casing is not enforced; mixed-case addresses pass.
pub fn validate_address(address: &str) -> bool {
    let Some(hex) = address.strip_prefix("0x") else {
        return false;
    };
    hex.len() == 40 && hex.bytes().all(|b| b.is_ascii_hexdigit())
}
