//! Static recovery metadata for every [`ErrorKind`].
//!
//! Two lookup tables, both exhaustive over the kind enum: [`defaults_for`]
//! (flags and user-facing text) and [`policy_for`] (recovery strategy plus
//! retry schedule). The values here are a contract with the retry engine and
//! the rail chooser; changing an entry changes observable recovery behavior.

use serde::{Deserialize, Serialize};

use crate::error::ErrorKind;

/// What to do after a failure of a given kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackStrategy {
    /// Retry the same operation after a backoff delay.
    RetryWithDelay,
    /// Retry with an escalated gas price.
    RetryWithHigherGas,
    /// Stop and reroute the payment to the card/bank rail.
    FallbackToAlternateRail,
    /// Park the transfer and resubmit when the outage clears.
    QueueForLater,
    /// A human has to act (approve an allowance, switch networks).
    ManualIntervention,
    /// Unrecoverable; surface to the user and stop.
    Abort,
}

/// Severity at which a failure of this kind is logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

/// Backoff schedule for retryable kinds.
///
/// The computed delay for attempt `n` is
/// `base_delay_ms * backoff_multiplier^(n-1)`, clamped to `[0, max_delay_ms]`,
/// optionally perturbed by ±10% jitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub backoff_multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter: bool,
}

impl RetryConfig {
    pub fn new(max_attempts: u32, base_delay_ms: u64, max_delay_ms: u64, jitter: bool) -> Self {
        RetryConfig {
            max_attempts,
            base_delay_ms,
            backoff_multiplier: 2.0,
            max_delay_ms,
            jitter,
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        RetryConfig::new(3, 1000, 10_000, true)
    }
}

/// Recovery policy: strategy, optional retry schedule, and surfacing hints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FallbackPolicy {
    pub strategy: FallbackStrategy,
    pub retry: Option<RetryConfig>,
    pub fallback_to_alternate_rail: bool,
    pub user_notification: bool,
    pub log_level: LogLevel,
}

/// Per-kind default flags and user-facing text.
#[derive(Debug, Clone, Copy)]
pub struct KindDefaults {
    pub retryable: bool,
    pub fallback_to_alternate_rail: bool,
    pub user_message: &'static str,
    pub suggested_action: &'static str,
}

/// Flags and message defaults for `kind`. Exhaustive; `Unknown` is the
/// catch-all entry and is a real table row, never a silent skip.
pub fn defaults_for(kind: ErrorKind) -> KindDefaults {
    use ErrorKind::*;
    match kind {
        NetworkCongestion => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "The network is busy right now. We'll retry your transfer automatically.",
            suggested_action: "Wait a moment; no action needed.",
        },
        NetworkUnavailable => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: true,
            user_message: "We can't reach the blockchain network at the moment.",
            suggested_action: "Your transfer can be sent through our standard payment network instead.",
        },
        NetworkTimeout => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "The network is responding slowly. We'll retry your transfer automatically.",
            suggested_action: "Wait a moment; no action needed.",
        },
        ChainMismatch => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "Your wallet is connected to the wrong network.",
            suggested_action: "Switch your wallet to the Mantle network and try again.",
        },
        InsufficientGas => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "The transfer needs a slightly higher network fee.",
            suggested_action: "We'll retry with an adjusted fee automatically.",
        },
        GasPriceTooLow => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "The network fee was too low for current conditions.",
            suggested_action: "We'll retry with an adjusted fee automatically.",
        },
        GasEstimationFailed => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "We couldn't estimate the network fee for this transfer.",
            suggested_action: "Try again in a moment.",
        },
        FeeDataUnavailable => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "Current network fee information is unavailable.",
            suggested_action: "Try again in a moment.",
        },
        TransactionReverted => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: true,
            user_message: "The blockchain rejected this transfer.",
            suggested_action: "Your transfer can be sent through our standard payment network instead.",
        },
        TransactionUnderpriced => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: false,
            user_message: "The transfer was priced below the network minimum.",
            suggested_action: "We'll retry with an adjusted fee automatically.",
        },
        TransactionDropped => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "The transfer was dropped by the network before confirming.",
            suggested_action: "We'll resubmit it automatically.",
        },
        TransactionNotFound => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: false,
            user_message: "We're still waiting for the network to register your transfer.",
            suggested_action: "Check back shortly.",
        },
        NonceTooLow => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: false,
            user_message: "A previous transfer from this wallet is still settling.",
            suggested_action: "We'll retry in order automatically.",
        },
        NonceTooHigh => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: false,
            user_message: "A previous transfer from this wallet is still settling.",
            suggested_action: "We'll retry in order automatically.",
        },
        InsufficientBalance => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: true,
            user_message: "Your wallet balance doesn't cover this transfer and its network fee.",
            suggested_action: "Add funds, or pay with your card instead.",
        },
        InsufficientTokenBalance => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: true,
            user_message: "Your wallet doesn't hold enough of this token for the transfer.",
            suggested_action: "Add funds, or pay with your card instead.",
        },
        InvalidAddress => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "That wallet address doesn't look right.",
            suggested_action: "Double-check the address and try again.",
        },
        InvalidAmount => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "That amount can't be sent.",
            suggested_action: "Enter an amount greater than zero.",
        },
        WalletNotConnected => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "No wallet is connected.",
            suggested_action: "Connect your wallet and try again.",
        },
        UserRejected => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "The transfer was cancelled in your wallet.",
            suggested_action: "Start the transfer again if this wasn't intended.",
        },
        ContractCallFailed => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: true,
            user_message: "The transfer contract rejected this operation.",
            suggested_action: "Your transfer can be sent through our standard payment network instead.",
        },
        BridgeUnavailable => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "The transfer bridge is temporarily offline.",
            suggested_action: "We've queued your transfer and will send it when the bridge is back.",
        },
        TokenNotSupported => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: true,
            user_message: "This token isn't supported for blockchain transfers.",
            suggested_action: "Your transfer can be sent through our standard payment network instead.",
        },
        AllowanceTooLow => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "Your wallet hasn't approved spending this token.",
            suggested_action: "Approve the token in your wallet and try again.",
        },
        ServiceUnavailable => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: true,
            user_message: "The blockchain service is temporarily unavailable.",
            suggested_action: "We'll retry automatically.",
        },
        RateLimited => KindDefaults {
            retryable: true,
            fallback_to_alternate_rail: false,
            user_message: "We're sending requests faster than the network allows.",
            suggested_action: "We'll slow down and retry automatically.",
        },
        ConfigurationError => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: false,
            user_message: "Blockchain transfers are misconfigured on our side.",
            suggested_action: "Contact support if this keeps happening.",
        },
        Unknown => KindDefaults {
            retryable: false,
            fallback_to_alternate_rail: true,
            user_message: "Something went wrong with the blockchain transfer.",
            suggested_action: "Your transfer can be sent through our standard payment network instead.",
        },
    }
}

/// Recovery policy for `kind`. Exhaustive, like [`defaults_for`].
pub fn policy_for(kind: ErrorKind) -> FallbackPolicy {
    use ErrorKind::*;
    use FallbackStrategy::*;
    match kind {
        NetworkCongestion => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(3, 5000, 30_000, true)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        NetworkUnavailable => FallbackPolicy {
            strategy: FallbackToAlternateRail,
            retry: None,
            fallback_to_alternate_rail: true,
            user_notification: true,
            log_level: LogLevel::Error,
        },
        NetworkTimeout => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(2, 3000, 15_000, true)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        ChainMismatch => FallbackPolicy {
            strategy: ManualIntervention,
            retry: None,
            fallback_to_alternate_rail: false,
            user_notification: true,
            log_level: LogLevel::Error,
        },
        InsufficientGas => FallbackPolicy {
            strategy: RetryWithHigherGas,
            retry: Some(RetryConfig::new(2, 1000, 5000, false)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        GasPriceTooLow => FallbackPolicy {
            strategy: RetryWithHigherGas,
            retry: Some(RetryConfig::new(2, 1000, 5000, false)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        GasEstimationFailed => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(2, 2000, 10_000, true)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        FeeDataUnavailable => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(2, 2000, 10_000, true)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        TransactionReverted => FallbackPolicy {
            strategy: FallbackToAlternateRail,
            retry: None,
            fallback_to_alternate_rail: true,
            user_notification: true,
            log_level: LogLevel::Error,
        },
        TransactionUnderpriced => FallbackPolicy {
            strategy: RetryWithHigherGas,
            retry: Some(RetryConfig::new(2, 1000, 5000, false)),
            fallback_to_alternate_rail: false,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        TransactionDropped => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(2, 3000, 15_000, true)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        TransactionNotFound => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(3, 2000, 10_000, true)),
            fallback_to_alternate_rail: false,
            user_notification: false,
            log_level: LogLevel::Info,
        },
        NonceTooLow | NonceTooHigh => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(2, 1000, 5000, false)),
            fallback_to_alternate_rail: false,
            user_notification: false,
            log_level: LogLevel::Info,
        },
        InsufficientBalance | InsufficientTokenBalance => FallbackPolicy {
            strategy: FallbackToAlternateRail,
            retry: None,
            fallback_to_alternate_rail: true,
            user_notification: true,
            log_level: LogLevel::Warn,
        },
        InvalidAddress | InvalidAmount => FallbackPolicy {
            strategy: Abort,
            retry: None,
            fallback_to_alternate_rail: false,
            user_notification: true,
            log_level: LogLevel::Error,
        },
        WalletNotConnected => FallbackPolicy {
            strategy: ManualIntervention,
            retry: None,
            fallback_to_alternate_rail: false,
            user_notification: true,
            log_level: LogLevel::Warn,
        },
        UserRejected => FallbackPolicy {
            strategy: Abort,
            retry: None,
            fallback_to_alternate_rail: false,
            user_notification: false,
            log_level: LogLevel::Info,
        },
        ContractCallFailed => FallbackPolicy {
            strategy: FallbackToAlternateRail,
            retry: None,
            fallback_to_alternate_rail: true,
            user_notification: true,
            log_level: LogLevel::Error,
        },
        BridgeUnavailable => FallbackPolicy {
            strategy: QueueForLater,
            retry: None,
            fallback_to_alternate_rail: false,
            user_notification: true,
            log_level: LogLevel::Warn,
        },
        TokenNotSupported => FallbackPolicy {
            strategy: FallbackToAlternateRail,
            retry: None,
            fallback_to_alternate_rail: true,
            user_notification: true,
            log_level: LogLevel::Info,
        },
        AllowanceTooLow => FallbackPolicy {
            strategy: ManualIntervention,
            retry: None,
            fallback_to_alternate_rail: false,
            user_notification: true,
            log_level: LogLevel::Warn,
        },
        ServiceUnavailable => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(2, 5000, 20_000, true)),
            fallback_to_alternate_rail: true,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        RateLimited => FallbackPolicy {
            strategy: RetryWithDelay,
            retry: Some(RetryConfig::new(2, 10_000, 30_000, true)),
            fallback_to_alternate_rail: false,
            user_notification: false,
            log_level: LogLevel::Warn,
        },
        ConfigurationError => FallbackPolicy {
            strategy: Abort,
            retry: None,
            fallback_to_alternate_rail: false,
            user_notification: false,
            log_level: LogLevel::Error,
        },
        Unknown => FallbackPolicy {
            strategy: FallbackToAlternateRail,
            retry: None,
            fallback_to_alternate_rail: true,
            user_notification: true,
            log_level: LogLevel::Error,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_kind_has_an_entry() {
        for kind in ErrorKind::ALL {
            // Both tables must resolve without panicking, for every variant.
            let defaults = defaults_for(kind);
            let policy = policy_for(kind);
            assert!(
                !defaults.user_message.is_empty(),
                "{kind} has an empty user message"
            );
            assert!(
                !defaults.suggested_action.is_empty(),
                "{kind} has an empty suggested action"
            );
            // The policy-level fallback flag and the defaults flag agree.
            assert_eq!(
                policy.fallback_to_alternate_rail, defaults.fallback_to_alternate_rail,
                "{kind}: fallback flag mismatch between tables"
            );
        }
    }

    #[test]
    fn retryable_kinds_carry_a_schedule() {
        for kind in ErrorKind::ALL {
            let defaults = defaults_for(kind);
            let policy = policy_for(kind);
            if defaults.retryable {
                let retry = policy
                    .retry
                    .as_ref()
                    .unwrap_or_else(|| panic!("{kind} is retryable but has no RetryConfig"));
                assert!(retry.max_attempts >= 1, "{kind}: max_attempts must be >= 1");
                assert!(
                    retry.max_delay_ms >= retry.base_delay_ms,
                    "{kind}: max delay below base delay"
                );
                assert!(
                    retry.backoff_multiplier >= 1.0,
                    "{kind}: backoff multiplier below 1"
                );
            } else {
                assert!(
                    policy.retry.is_none(),
                    "{kind} is not retryable but carries a RetryConfig"
                );
            }
        }
    }

    #[test]
    fn contract_values_from_the_policy_table() {
        let congestion = policy_for(ErrorKind::NetworkCongestion);
        assert_eq!(congestion.strategy, FallbackStrategy::RetryWithDelay);
        let retry = congestion.retry.unwrap();
        assert_eq!(retry.max_attempts, 3);
        assert_eq!(retry.base_delay_ms, 5000);
        assert!(retry.jitter);

        let gas = policy_for(ErrorKind::InsufficientGas);
        assert_eq!(gas.strategy, FallbackStrategy::RetryWithHigherGas);
        let retry = gas.retry.unwrap();
        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.base_delay_ms, 1000);
        assert!(!retry.jitter);

        let timeout = policy_for(ErrorKind::NetworkTimeout);
        let retry = timeout.retry.unwrap();
        assert_eq!(retry.max_attempts, 2);
        assert_eq!(retry.base_delay_ms, 3000);

        assert_eq!(
            policy_for(ErrorKind::NetworkUnavailable).strategy,
            FallbackStrategy::FallbackToAlternateRail
        );
        assert_eq!(
            policy_for(ErrorKind::TransactionReverted).strategy,
            FallbackStrategy::FallbackToAlternateRail
        );
        assert_eq!(
            policy_for(ErrorKind::InvalidAddress).strategy,
            FallbackStrategy::Abort
        );
        assert_eq!(
            policy_for(ErrorKind::NonceTooLow).strategy,
            FallbackStrategy::RetryWithDelay
        );
    }

    #[test]
    fn unknown_reroutes_to_the_alternate_rail() {
        let defaults = defaults_for(ErrorKind::Unknown);
        assert!(!defaults.retryable);
        assert!(defaults.fallback_to_alternate_rail);
        assert_eq!(
            policy_for(ErrorKind::Unknown).strategy,
            FallbackStrategy::FallbackToAlternateRail
        );
    }
}
