//! Conversion of raw failures into [`ClassifiedError`] values.
//!
//! Classification is total: every input maps to some [`ErrorKind`], with
//! [`ErrorKind::Unknown`] as the catch-all. It is also idempotent — feeding a
//! [`ClassifiedError`] back in returns it unchanged, so callers can classify
//! defensively at every boundary without double-wrapping.
//!
//! Matching is ordered: wallet/provider numeric codes that are unambiguous on
//! their own are checked first, then case-insensitive substring matchers from
//! most to least specific, then generic JSON-RPC server-error codes. First
//! match wins.

use std::collections::BTreeMap;

use tracing::{debug, error, info, warn};

use crate::error::{ClassifiedError, ErrorKind};
use crate::taxonomy::LogLevel;

/// A failure in the shape RPC/SDK errors arrive in: free text plus an
/// optional numeric code and an optional underlying reason.
#[derive(Debug, Clone)]
pub struct RawFailure {
    pub message: String,
    pub code: Option<i64>,
    pub reason: Option<String>,
}

impl RawFailure {
    pub fn new(message: impl Into<String>) -> Self {
        RawFailure {
            message: message.into(),
            code: None,
            reason: None,
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

/// Anything the classifier accepts.
pub enum ErrorInput {
    Classified(Box<ClassifiedError>),
    Raw(RawFailure),
}

impl From<ClassifiedError> for ErrorInput {
    fn from(err: ClassifiedError) -> Self {
        ErrorInput::Classified(Box::new(err))
    }
}

impl From<RawFailure> for ErrorInput {
    fn from(raw: RawFailure) -> Self {
        ErrorInput::Raw(raw)
    }
}

impl From<anyhow::Error> for ErrorInput {
    fn from(err: anyhow::Error) -> Self {
        // An already classified error travelling inside anyhow passes through.
        match err.downcast::<ClassifiedError>() {
            Ok(classified) => ErrorInput::Classified(Box::new(classified)),
            Err(err) => {
                let message = format!("{err:#}");
                let root = err.root_cause().to_string();
                let reason = if message.contains(&root) { None } else { Some(root) };
                ErrorInput::Raw(RawFailure {
                    message,
                    code: None,
                    reason,
                })
            }
        }
    }
}

impl From<&str> for ErrorInput {
    fn from(message: &str) -> Self {
        ErrorInput::Raw(RawFailure::new(message))
    }
}

impl From<String> for ErrorInput {
    fn from(message: String) -> Self {
        ErrorInput::Raw(RawFailure::new(message))
    }
}

/// Provider errors that arrive as bare JSON objects, typically with
/// `message`/`code`/`reason` fields. Anything else is stringified whole.
impl From<serde_json::Value> for ErrorInput {
    fn from(value: serde_json::Value) -> Self {
        let message = value
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| value.to_string());
        let code = value.get("code").and_then(|c| c.as_i64());
        let reason = value
            .get("reason")
            .and_then(|r| r.as_str())
            .map(str::to_string);
        ErrorInput::Raw(RawFailure {
            message,
            code,
            reason,
        })
    }
}

/// Ordered substring matchers, most specific first. Matched case-insensitively
/// against the combined message + reason text; the first hit decides the kind.
const TEXT_MATCHERS: &[(ErrorKind, &[&str])] = &[
    (
        ErrorKind::NetworkCongestion,
        &["congest", "txpool is full", "too many pending", "network is busy"],
    ),
    (
        ErrorKind::NetworkTimeout,
        &["timeout", "timed out", "etimedout", "deadline exceeded"],
    ),
    (
        ErrorKind::NetworkUnavailable,
        &[
            "econnrefused",
            "connection refused",
            "connection reset",
            "econnreset",
            "enetunreach",
            "getaddrinfo",
            "could not connect",
            "failed to fetch",
            "network unavailable",
            "network error",
            "disconnected",
        ],
    ),
    (
        ErrorKind::InsufficientGas,
        &[
            "insufficient gas",
            "out of gas",
            "intrinsic gas too low",
            "gas required exceeds allowance",
        ],
    ),
    (
        ErrorKind::GasPriceTooLow,
        &[
            "gas price too low",
            "max fee per gas less than block base fee",
            "fee cap less than block base fee",
        ],
    ),
    (ErrorKind::TransactionUnderpriced, &["underpriced"]),
    (
        ErrorKind::TransactionReverted,
        &["execution reverted", "revert"],
    ),
    (ErrorKind::NonceTooHigh, &["nonce too high"]),
    (ErrorKind::NonceTooLow, &["nonce too low", "nonce"]),
    (
        ErrorKind::InsufficientBalance,
        &["insufficient funds", "insufficient balance", "exceeds balance"],
    ),
    (
        ErrorKind::InvalidAddress,
        &[
            "invalid address",
            "bad address",
            "invalid recipient",
            "not a valid address",
            "invalid checksum",
            "ens name",
        ],
    ),
    (
        ErrorKind::GasEstimationFailed,
        &["cannot estimate gas", "gas estimation failed", "estimategas"],
    ),
    (
        ErrorKind::FeeDataUnavailable,
        &["fee data", "feehistory", "fee history"],
    ),
    (
        ErrorKind::AllowanceTooLow,
        &["allowance"],
    ),
    (
        ErrorKind::TransactionNotFound,
        &["transaction not found", "tx not found", "not mined"],
    ),
    (
        ErrorKind::TransactionDropped,
        &["transaction dropped", "dropped", "replaced"],
    ),
    (
        ErrorKind::UserRejected,
        &["user rejected", "user denied", "rejected by user"],
    ),
    (
        ErrorKind::WalletNotConnected,
        &["wallet not connected", "no signer", "signer is required"],
    ),
    (
        ErrorKind::ChainMismatch,
        &["wrong network", "chain id mismatch", "unsupported chain"],
    ),
    (
        ErrorKind::RateLimited,
        &["rate limit", "too many requests", "429"],
    ),
    (
        ErrorKind::ServiceUnavailable,
        &[
            "service unavailable",
            "bad gateway",
            "internal server error",
            "503",
            "502",
        ],
    ),
    (
        ErrorKind::TokenNotSupported,
        &["token not supported", "unsupported token"],
    ),
    (ErrorKind::BridgeUnavailable, &["bridge"]),
    (
        ErrorKind::ContractCallFailed,
        &["call exception", "call_exception", "contract"],
    ),
    (
        ErrorKind::InvalidAmount,
        &["invalid amount", "amount must be greater"],
    ),
];

/// EIP-1193 provider codes that decide the kind on their own.
fn kind_from_provider_code(code: i64) -> Option<ErrorKind> {
    match code {
        4001 => Some(ErrorKind::UserRejected),
        4100 => Some(ErrorKind::WalletNotConnected),
        4900 => Some(ErrorKind::NetworkUnavailable),
        4901 => Some(ErrorKind::ChainMismatch),
        _ => None,
    }
}

/// Generic JSON-RPC server-error codes, consulted only when no text matched.
fn is_rpc_server_error(code: i64) -> bool {
    (-32099..=-32000).contains(&code) || code == -32603
}

fn detect_kind(raw: &RawFailure) -> ErrorKind {
    if let Some(kind) = raw.code.and_then(kind_from_provider_code) {
        return kind;
    }

    let mut haystack = raw.message.to_lowercase();
    if let Some(reason) = &raw.reason {
        haystack.push(' ');
        haystack.push_str(&reason.to_lowercase());
    }

    for (kind, patterns) in TEXT_MATCHERS {
        if patterns.iter().any(|p| haystack.contains(p)) {
            return *kind;
        }
    }

    if raw.code.is_some_and(is_rpc_server_error) {
        return ErrorKind::ServiceUnavailable;
    }

    ErrorKind::Unknown
}

/// Classify a failure. Total over its input; idempotent for already
/// classified errors.
pub fn classify(input: impl Into<ErrorInput>) -> ClassifiedError {
    match input.into() {
        ErrorInput::Classified(err) => *err,
        ErrorInput::Raw(raw) => {
            let kind = detect_kind(&raw);
            let details = match &raw.reason {
                Some(reason) => format!("{} ({reason})", raw.message),
                None => raw.message.clone(),
            };
            debug!(kind = %kind, code = ?raw.code, "classified failure");
            ClassifiedError::new(kind, details)
        }
    }
}

/// Classify and attach caller context in one step.
pub fn classify_with_context(
    input: impl Into<ErrorInput>,
    context: BTreeMap<String, String>,
) -> ClassifiedError {
    let err = classify(input);
    // Merge instead of replace so pass-through classification keeps earlier context.
    context
        .into_iter()
        .fold(err, |err, (k, v)| err.with_context_entry(k, v))
}

/// Emit a tracing event for `err` at the severity its policy asks for.
pub fn log_classified(err: &ClassifiedError) {
    match err.policy.log_level {
        LogLevel::Error => error!(kind = %err.kind, details = %err.technical_details, "transfer error"),
        LogLevel::Warn => warn!(kind = %err.kind, details = %err.technical_details, "transfer error"),
        LogLevel::Info => info!(kind = %err.kind, details = %err.technical_details, "transfer error"),
        LogLevel::Debug => debug!(kind = %err.kind, details = %err.technical_details, "transfer error"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecommendedRoute;

    #[test]
    fn classify_is_total_over_plain_strings() {
        let err = classify("something nobody has seen before");
        assert_eq!(err.kind, ErrorKind::Unknown);
        assert!(err.fallback_to_alternate_rail);
        assert!(!err.retryable);
    }

    #[test]
    fn classify_is_idempotent() {
        let once = classify("nonce too low");
        let twice = classify(once.clone());
        assert_eq!(once.kind, twice.kind);
        assert_eq!(once.technical_details, twice.technical_details);
        assert_eq!(once.retryable, twice.retryable);
    }

    #[test]
    fn nonce_too_low_scenario() {
        let err = classify("nonce too low");
        assert_eq!(err.kind, ErrorKind::NonceTooLow);
        assert!(err.retryable);
        assert!(!err.fallback_to_alternate_rail);
    }

    #[test]
    fn nonce_too_high_wins_over_generic_nonce() {
        assert_eq!(classify("nonce too high").kind, ErrorKind::NonceTooHigh);
        assert_eq!(classify("invalid nonce").kind, ErrorKind::NonceTooLow);
    }

    #[test]
    fn execution_reverted_scenario() {
        let err = classify("execution reverted");
        assert_eq!(err.kind, ErrorKind::TransactionReverted);
        assert!(!err.retryable);
        assert!(err.fallback_to_alternate_rail);
        assert_eq!(err.recommended_route(), RecommendedRoute::AlternateRail);
    }

    #[test]
    fn reverted_beats_later_balance_matcher() {
        // Revert reasons often embed balance text; order says reverted wins.
        let err = classify("execution reverted: ERC20: transfer amount exceeds balance");
        assert_eq!(err.kind, ErrorKind::TransactionReverted);
    }

    #[test]
    fn connection_errors_map_to_network_unavailable() {
        for msg in ["connect ECONNREFUSED 127.0.0.1:8545", "connection refused", "network error"] {
            assert_eq!(classify(msg).kind, ErrorKind::NetworkUnavailable, "{msg}");
        }
    }

    #[test]
    fn timeout_beats_connection() {
        let err = classify("network timeout while connecting");
        assert_eq!(err.kind, ErrorKind::NetworkTimeout);
    }

    #[test]
    fn congestion_is_checked_first() {
        let err = classify("network is congested, request timed out");
        assert_eq!(err.kind, ErrorKind::NetworkCongestion);
    }

    #[test]
    fn gas_matchers_in_order() {
        assert_eq!(classify("intrinsic gas too low").kind, ErrorKind::InsufficientGas);
        assert_eq!(classify("gas price too low").kind, ErrorKind::GasPriceTooLow);
        assert_eq!(
            classify("replacement transaction underpriced").kind,
            ErrorKind::TransactionUnderpriced
        );
        assert_eq!(
            classify("gas required exceeds allowance").kind,
            ErrorKind::InsufficientGas
        );
    }

    #[test]
    fn provider_codes_decide_before_text() {
        let err = classify(RawFailure::new("request failed").with_code(4001));
        assert_eq!(err.kind, ErrorKind::UserRejected);
    }

    #[test]
    fn specific_text_beats_generic_server_code() {
        let err = classify(RawFailure::new("nonce too low").with_code(-32000));
        assert_eq!(err.kind, ErrorKind::NonceTooLow);
    }

    #[test]
    fn bare_server_code_maps_to_service_unavailable() {
        let err = classify(RawFailure::new("unexpected condition").with_code(-32000));
        assert_eq!(err.kind, ErrorKind::ServiceUnavailable);
    }

    #[test]
    fn anyhow_context_chain_is_searched() {
        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "connection refused");
        let err = classify(anyhow::Error::new(io).context("failed to submit transfer"));
        assert_eq!(err.kind, ErrorKind::NetworkUnavailable);
    }

    #[test]
    fn classified_error_survives_anyhow_round_trip() {
        let original = classify("nonce too low");
        let wrapped = anyhow::Error::new(original.clone());
        let back = classify(wrapped);
        assert_eq!(back.kind, original.kind);
        assert_eq!(back.technical_details, original.technical_details);
    }

    #[test]
    fn json_objects_classify_by_their_fields() {
        let err = classify(serde_json::json!({
            "code": -32000,
            "message": "nonce too low",
        }));
        assert_eq!(err.kind, ErrorKind::NonceTooLow);

        let err = classify(serde_json::json!({
            "code": 4001,
            "message": "MetaMask Tx Signature: User denied transaction signature.",
        }));
        assert_eq!(err.kind, ErrorKind::UserRejected);

        let err = classify(serde_json::json!({
            "message": "transaction failed",
            "reason": "execution reverted",
        }));
        assert_eq!(err.kind, ErrorKind::TransactionReverted);

        // Objects with none of the known fields still classify.
        let err = classify(serde_json::json!({"status": 500}));
        assert_eq!(err.kind, ErrorKind::Unknown);
    }

    #[test]
    fn context_is_attached_and_merged() {
        let mut ctx = BTreeMap::new();
        ctx.insert("transfer_id".to_string(), "tr-9".to_string());
        let err = classify_with_context("timeout", ctx);
        assert_eq!(err.kind, ErrorKind::NetworkTimeout);
        assert_eq!(
            err.context.unwrap().get("transfer_id").map(String::as_str),
            Some("tr-9")
        );
    }

    #[test]
    fn reason_field_participates_in_matching() {
        let err = classify(RawFailure::new("transaction failed").with_reason("execution reverted"));
        assert_eq!(err.kind, ErrorKind::TransactionReverted);
    }
}
