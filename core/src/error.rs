//! Error taxonomy for the blockchain transfer rail.
//!
//! Every failure that crosses the classification boundary becomes a
//! [`ClassifiedError`]: one [`ErrorKind`] plus the metadata and recovery
//! policy the taxonomy table assigns to that kind. Callers match on the kind
//! (or just read the derived flags) instead of inspecting raw provider
//! messages.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::taxonomy::{self, FallbackPolicy};

/// Failure kinds, grouped by the subsystem they originate from.
///
/// The taxonomy is closed: the policy and message tables in [`crate::taxonomy`]
/// match exhaustively, so adding a variant without a policy fails to compile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    // Network
    NetworkCongestion,
    NetworkUnavailable,
    NetworkTimeout,
    ChainMismatch,

    // Gas
    InsufficientGas,
    GasPriceTooLow,
    GasEstimationFailed,
    FeeDataUnavailable,

    // Transaction
    TransactionReverted,
    TransactionUnderpriced,
    TransactionDropped,
    TransactionNotFound,
    NonceTooLow,
    NonceTooHigh,

    // Wallet
    InsufficientBalance,
    InsufficientTokenBalance,
    InvalidAddress,
    InvalidAmount,
    WalletNotConnected,
    UserRejected,

    // Contract / bridge
    ContractCallFailed,
    BridgeUnavailable,
    TokenNotSupported,
    AllowanceTooLow,

    // Service
    ServiceUnavailable,
    RateLimited,
    ConfigurationError,
    Unknown,
}

/// Subsystem grouping for an [`ErrorKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Network,
    Gas,
    Transaction,
    Wallet,
    Contract,
    Service,
}

impl ErrorKind {
    /// Every variant, in declaration order. Used by table-coverage tests.
    pub const ALL: [ErrorKind; 28] = [
        ErrorKind::NetworkCongestion,
        ErrorKind::NetworkUnavailable,
        ErrorKind::NetworkTimeout,
        ErrorKind::ChainMismatch,
        ErrorKind::InsufficientGas,
        ErrorKind::GasPriceTooLow,
        ErrorKind::GasEstimationFailed,
        ErrorKind::FeeDataUnavailable,
        ErrorKind::TransactionReverted,
        ErrorKind::TransactionUnderpriced,
        ErrorKind::TransactionDropped,
        ErrorKind::TransactionNotFound,
        ErrorKind::NonceTooLow,
        ErrorKind::NonceTooHigh,
        ErrorKind::InsufficientBalance,
        ErrorKind::InsufficientTokenBalance,
        ErrorKind::InvalidAddress,
        ErrorKind::InvalidAmount,
        ErrorKind::WalletNotConnected,
        ErrorKind::UserRejected,
        ErrorKind::ContractCallFailed,
        ErrorKind::BridgeUnavailable,
        ErrorKind::TokenNotSupported,
        ErrorKind::AllowanceTooLow,
        ErrorKind::ServiceUnavailable,
        ErrorKind::RateLimited,
        ErrorKind::ConfigurationError,
        ErrorKind::Unknown,
    ];

    pub fn category(self) -> ErrorCategory {
        match self {
            ErrorKind::NetworkCongestion
            | ErrorKind::NetworkUnavailable
            | ErrorKind::NetworkTimeout
            | ErrorKind::ChainMismatch => ErrorCategory::Network,

            ErrorKind::InsufficientGas
            | ErrorKind::GasPriceTooLow
            | ErrorKind::GasEstimationFailed
            | ErrorKind::FeeDataUnavailable => ErrorCategory::Gas,

            ErrorKind::TransactionReverted
            | ErrorKind::TransactionUnderpriced
            | ErrorKind::TransactionDropped
            | ErrorKind::TransactionNotFound
            | ErrorKind::NonceTooLow
            | ErrorKind::NonceTooHigh => ErrorCategory::Transaction,

            ErrorKind::InsufficientBalance
            | ErrorKind::InsufficientTokenBalance
            | ErrorKind::InvalidAddress
            | ErrorKind::InvalidAmount
            | ErrorKind::WalletNotConnected
            | ErrorKind::UserRejected => ErrorCategory::Wallet,

            ErrorKind::ContractCallFailed
            | ErrorKind::BridgeUnavailable
            | ErrorKind::TokenNotSupported
            | ErrorKind::AllowanceTooLow => ErrorCategory::Contract,

            ErrorKind::ServiceUnavailable
            | ErrorKind::RateLimited
            | ErrorKind::ConfigurationError
            | ErrorKind::Unknown => ErrorCategory::Service,
        }
    }

    /// Kinds the gas-escalation retry strategy is allowed to keep retrying.
    pub fn is_gas_related(self) -> bool {
        matches!(
            self,
            ErrorKind::InsufficientGas
                | ErrorKind::GasPriceTooLow
                | ErrorKind::GasEstimationFailed
                | ErrorKind::FeeDataUnavailable
                | ErrorKind::TransactionUnderpriced
        )
    }

    /// Kinds the nonce-renegotiation retry strategy is allowed to keep retrying.
    pub fn is_nonce_related(self) -> bool {
        matches!(self, ErrorKind::NonceTooLow | ErrorKind::NonceTooHigh)
    }

    /// Stable identifier, matching the serialized form.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NetworkCongestion => "network-congestion",
            ErrorKind::NetworkUnavailable => "network-unavailable",
            ErrorKind::NetworkTimeout => "network-timeout",
            ErrorKind::ChainMismatch => "chain-mismatch",
            ErrorKind::InsufficientGas => "insufficient-gas",
            ErrorKind::GasPriceTooLow => "gas-price-too-low",
            ErrorKind::GasEstimationFailed => "gas-estimation-failed",
            ErrorKind::FeeDataUnavailable => "fee-data-unavailable",
            ErrorKind::TransactionReverted => "transaction-reverted",
            ErrorKind::TransactionUnderpriced => "transaction-underpriced",
            ErrorKind::TransactionDropped => "transaction-dropped",
            ErrorKind::TransactionNotFound => "transaction-not-found",
            ErrorKind::NonceTooLow => "nonce-too-low",
            ErrorKind::NonceTooHigh => "nonce-too-high",
            ErrorKind::InsufficientBalance => "insufficient-balance",
            ErrorKind::InsufficientTokenBalance => "insufficient-token-balance",
            ErrorKind::InvalidAddress => "invalid-address",
            ErrorKind::InvalidAmount => "invalid-amount",
            ErrorKind::WalletNotConnected => "wallet-not-connected",
            ErrorKind::UserRejected => "user-rejected",
            ErrorKind::ContractCallFailed => "contract-call-failed",
            ErrorKind::BridgeUnavailable => "bridge-unavailable",
            ErrorKind::TokenNotSupported => "token-not-supported",
            ErrorKind::AllowanceTooLow => "allowance-too-low",
            ErrorKind::ServiceUnavailable => "service-unavailable",
            ErrorKind::RateLimited => "rate-limited",
            ErrorKind::ConfigurationError => "configuration-error",
            ErrorKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ErrorKind {
    type Err = String;

    /// Inverse of [`ErrorKind::as_str`], used when rehydrating stored records.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        ErrorKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("unknown error kind: '{s}'"))
    }
}

/// Which payment rail the caller should route to after a failure.
///
/// Returned explicitly instead of a boolean flag so the rail chooser in the
/// API layer has a single field to match on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecommendedRoute {
    /// Keep using the blockchain rail (a later retry may succeed).
    Blockchain,
    /// Reroute this payment to the traditional card/bank rail.
    AlternateRail,
    /// Do not reroute; the request itself is bad or the user declined.
    Abort,
}

/// A raw failure after classification: one taxonomy kind plus the metadata
/// the taxonomy derives from it.
///
/// Immutable once built. `retryable` and `fallback_to_alternate_rail` come
/// from the kind's table entry unless overridden at construction; `policy` is
/// always the kind's table entry.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{kind}: {technical_details}")]
pub struct ClassifiedError {
    pub kind: ErrorKind,
    /// Technical one-line message, suitable for logs.
    pub message: String,
    pub retryable: bool,
    pub fallback_to_alternate_rail: bool,
    /// Pre-composed, non-technical text for end users.
    pub user_message: String,
    /// Raw failure text as received, for logging only.
    pub technical_details: String,
    pub suggested_action: String,
    pub policy: FallbackPolicy,
    /// Optional key-value context (transfer id, addresses, attempt numbers).
    pub context: Option<BTreeMap<String, String>>,
}

impl ClassifiedError {
    /// Build a classified error for `kind`, deriving flags, messages, and the
    /// recovery policy from the taxonomy tables.
    pub fn new(kind: ErrorKind, technical_details: impl Into<String>) -> Self {
        let technical_details = technical_details.into();
        let defaults = taxonomy::defaults_for(kind);
        ClassifiedError {
            kind,
            message: format!("{}: {technical_details}", kind.as_str()),
            retryable: defaults.retryable,
            fallback_to_alternate_rail: defaults.fallback_to_alternate_rail,
            user_message: defaults.user_message.to_string(),
            technical_details,
            suggested_action: defaults.suggested_action.to_string(),
            policy: taxonomy::policy_for(kind),
            context: None,
        }
    }

    /// Override the derived retryable flag. Rarely needed; the taxonomy
    /// default is correct for all known failure shapes.
    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Override the derived fallback flag.
    pub fn with_fallback(mut self, fallback: bool) -> Self {
        self.fallback_to_alternate_rail = fallback;
        self
    }

    pub fn with_context(mut self, context: BTreeMap<String, String>) -> Self {
        self.context = Some(context);
        self
    }

    /// Attach a single context entry, creating the map if absent.
    pub fn with_context_entry(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.context
            .get_or_insert_with(BTreeMap::new)
            .insert(key.into(), value.into());
        self
    }

    /// Route recommendation for the rail chooser: reroute when the taxonomy
    /// says so, stay on chain when a later retry could work, abort otherwise.
    pub fn recommended_route(&self) -> RecommendedRoute {
        if self.fallback_to_alternate_rail {
            RecommendedRoute::AlternateRail
        } else if self.retryable {
            RecommendedRoute::Blockchain
        } else {
            RecommendedRoute::Abort
        }
    }
}

/// Alias for `std::result::Result<T, ClassifiedError>`.
pub type Result<T> = std::result::Result<T, ClassifiedError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_follows_flags() {
        let reroute = ClassifiedError::new(ErrorKind::InsufficientBalance, "short 5 MNT");
        assert_eq!(reroute.recommended_route(), RecommendedRoute::AlternateRail);

        let stay = ClassifiedError::new(ErrorKind::NonceTooLow, "nonce too low");
        assert_eq!(stay.recommended_route(), RecommendedRoute::Blockchain);

        let abort = ClassifiedError::new(ErrorKind::InvalidAddress, "bad address");
        assert_eq!(abort.recommended_route(), RecommendedRoute::Abort);
    }

    #[test]
    fn overrides_beat_derived_flags() {
        let err = ClassifiedError::new(ErrorKind::NetworkTimeout, "timed out")
            .with_retryable(false)
            .with_fallback(false);
        assert!(!err.retryable);
        assert_eq!(err.recommended_route(), RecommendedRoute::Abort);
    }

    #[test]
    fn context_entries_accumulate() {
        let err = ClassifiedError::new(ErrorKind::Unknown, "boom")
            .with_context_entry("transfer_id", "tr-1")
            .with_context_entry("attempt", "2");
        let ctx = err.context.as_ref().unwrap();
        assert_eq!(ctx.get("transfer_id").map(String::as_str), Some("tr-1"));
        assert_eq!(ctx.get("attempt").map(String::as_str), Some("2"));
    }

    #[test]
    fn every_category_is_populated() {
        for category in [
            ErrorCategory::Network,
            ErrorCategory::Gas,
            ErrorCategory::Transaction,
            ErrorCategory::Wallet,
            ErrorCategory::Contract,
            ErrorCategory::Service,
        ] {
            assert!(
                ErrorKind::ALL.iter().any(|k| k.category() == category),
                "{category:?} has no members"
            );
        }
    }

    #[test]
    fn gas_and_nonce_groups_are_disjoint() {
        for kind in ErrorKind::ALL {
            assert!(
                !(kind.is_gas_related() && kind.is_nonce_related()),
                "{kind} is both gas- and nonce-related"
            );
        }
        assert!(ErrorKind::TransactionUnderpriced.is_gas_related());
        assert!(ErrorKind::NonceTooHigh.is_nonce_related());
    }

    #[test]
    fn display_carries_kind_and_details() {
        let err = ClassifiedError::new(ErrorKind::NetworkTimeout, "request timed out after 30s");
        let text = err.to_string();
        assert!(text.contains("network-timeout"));
        assert!(text.contains("timed out"));
    }
}
