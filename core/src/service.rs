//! Transfer lifecycle orchestration.
//!
//! [`TransferService`] is the façade the API layer talks to: it validates a
//! transfer request, estimates its cost, submits it through the retry engine,
//! and tracks on-chain confirmation. Per transfer the state machine is
//! `PENDING → {CONFIRMED | FAILED}`; terminal states are absorbing and
//! repeated status reads are idempotent.
//!
//! Nothing here throws at the caller: every entry point resolves to a value
//! describing success or a classified failure.

use std::sync::Arc;

use rand::RngExt;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::{sleep, Duration, Instant};
use tracing::{info, warn};

use crate::chain::{ChainClient, SubmitTransfer};
use crate::classify::{classify, classify_with_context, log_classified};
use crate::config::{ChainNetwork, NetworkConfig, TransferOperation};
use crate::display::format_mnt;
use crate::error::{ClassifiedError, ErrorKind, RecommendedRoute};
use crate::network::{GasEstimate, HealthReport, NetworkMonitor, NetworkStatus};
use crate::rates::RateOracle;
use crate::retry::{
    execute_with_gas_retry, execute_with_nonce_retry, execute_with_retry, RetryOutcome,
};
use crate::store::{TransferPage, TransferStore};
use crate::taxonomy::FallbackStrategy;
use crate::validate_address;

/// Upper bound on [`TransferService::wait_for_confirmations`].
const CONFIRMATION_WAIT_CEILING: Duration = Duration::from_secs(300);
/// Poll interval while the transaction is not yet known to the chain.
const RECEIPT_POLL: Duration = Duration::from_secs(2);
/// Poll interval while the transaction is mined but under-confirmed.
const CONFIRMATION_POLL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Pending,
    Confirmed,
    Failed,
}

impl TransferStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, TransferStatus::Confirmed | TransferStatus::Failed)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransferStatus::Pending => write!(f, "pending"),
            TransferStatus::Confirmed => write!(f, "confirmed"),
            TransferStatus::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(TransferStatus::Pending),
            "confirmed" => Ok(TransferStatus::Confirmed),
            "failed" => Ok(TransferStatus::Failed),
            other => Err(format!("unknown transfer status: '{other}'")),
        }
    }
}

/// A transfer as the API layer requests it. Amounts are wei (native) or token
/// base units.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferRequest {
    pub from_address: String,
    pub to_address: String,
    pub amount: u128,
    /// ERC-20 contract address; `None` sends the native token.
    pub token_address: Option<String>,
    /// Caller override for the gas price; estimated when unset.
    pub gas_price: Option<u128>,
    pub gas_limit: Option<u64>,
    pub user_id: Option<String>,
}

/// A transfer's stored lifecycle record. Mutated only by the service handling
/// that transfer id; terminal states never change again.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferRecord {
    pub transfer_id: String,
    pub network: String,
    pub from_address: String,
    pub to_address: String,
    pub amount: u128,
    pub token_address: Option<String>,
    pub status: TransferStatus,
    pub transaction_hash: Option<String>,
    pub gas_fee_wei: Option<u128>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// What `initiate_transfer` resolves to. On failure, `recommended_route`
/// tells the rail chooser whether to reroute to the card rail.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub transfer_id: String,
    pub status: TransferStatus,
    pub transaction_hash: Option<String>,
    pub gas_estimate: Option<GasEstimate>,
    /// Submission calls made, 0 when validation failed before any submission.
    pub attempts: u32,
    pub error: Option<ClassifiedError>,
    pub recommended_route: RecommendedRoute,
}

/// A point-in-time view of a transfer's confirmation state.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub transfer_id: String,
    pub status: TransferStatus,
    pub confirmations: u64,
    pub transaction_hash: Option<String>,
    pub error: Option<ClassifiedError>,
}

/// Façade over the chain client, the transfer store, and the network monitor.
pub struct TransferService {
    client: Arc<dyn ChainClient>,
    config: NetworkConfig,
    monitor: NetworkMonitor,
    store: Mutex<TransferStore>,
}

fn now_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

fn new_transfer_id() -> String {
    format!("tr-{:016x}", rand::rng().random::<u64>())
}

fn scale_gas(base: u128, multiplier: f64) -> u128 {
    (base as f64 * multiplier).round() as u128
}

impl TransferService {
    pub fn new(
        client: Arc<dyn ChainClient>,
        config: NetworkConfig,
        rates: Arc<dyn RateOracle>,
        store: TransferStore,
    ) -> crate::error::Result<Self> {
        if !config.enabled {
            return Err(ClassifiedError::new(
                ErrorKind::ConfigurationError,
                "blockchain transfers are disabled for this deployment",
            ));
        }
        if config.network == ChainNetwork::Custom && config.custom_url.is_none() {
            return Err(ClassifiedError::new(
                ErrorKind::ConfigurationError,
                "custom network requires an RPC URL",
            ));
        }
        let monitor = NetworkMonitor::new(client.clone(), config.clone(), rates);
        Ok(TransferService {
            client,
            config,
            monitor,
            store: Mutex::new(store),
        })
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    /// Fee estimate for a native transfer, priced in `currency`.
    pub async fn estimate_gas_cost(
        &self,
        amount: u128,
        currency: &str,
    ) -> crate::error::Result<GasEstimate> {
        self.monitor
            .estimate_gas_cost(amount, currency, TransferOperation::Native)
            .await
    }

    pub async fn network_status(&self) -> NetworkStatus {
        self.monitor.status().await
    }

    pub async fn health_check(&self) -> HealthReport {
        self.monitor.health_check().await
    }

    /// Validate, price, and submit a transfer. Never returns an error and
    /// never panics: the outcome describes success or a classified failure,
    /// with a route recommendation for the rail chooser.
    pub async fn initiate_transfer(&self, request: &TransferRequest) -> TransferOutcome {
        let transfer_id = new_transfer_id();
        info!(
            transfer_id = %transfer_id,
            from = %request.from_address,
            to = %request.to_address,
            amount = %request.amount,
            "initiating transfer"
        );

        if !validate_address(&request.from_address) {
            let err = ClassifiedError::new(
                ErrorKind::InvalidAddress,
                format!("Invalid sender address: {}", request.from_address),
            )
            .with_context_entry("transfer_id", &transfer_id);
            return self.fail_transfer(transfer_id, request, None, err, 0).await;
        }
        if !validate_address(&request.to_address) {
            let err = ClassifiedError::new(
                ErrorKind::InvalidAddress,
                format!("Invalid recipient address: {}", request.to_address),
            )
            .with_context_entry("transfer_id", &transfer_id);
            return self.fail_transfer(transfer_id, request, None, err, 0).await;
        }
        if request.amount == 0 {
            let err = ClassifiedError::new(
                ErrorKind::InvalidAmount,
                "transfer amount must be greater than zero",
            )
            .with_context_entry("transfer_id", &transfer_id);
            return self.fail_transfer(transfer_id, request, None, err, 0).await;
        }

        let operation = if request.token_address.is_some() {
            TransferOperation::Token
        } else {
            TransferOperation::Native
        };
        let estimate = match self
            .monitor
            .estimate_gas_cost(request.amount, "USD", operation)
            .await
        {
            Ok(estimate) => estimate,
            Err(err) => {
                let err = err.with_context_entry("transfer_id", &transfer_id);
                return self.fail_transfer(transfer_id, request, None, err, 0).await;
            }
        };

        if let Err(err) = self.check_balance(request, &estimate).await {
            let err = err.with_context_entry("transfer_id", &transfer_id);
            return self
                .fail_transfer(transfer_id, request, Some(estimate), err, 0)
                .await;
        }

        let record = self.build_record(&transfer_id, request, Some(estimate.total_fee_wei));
        if let Err(e) = self.store.lock().await.insert(&record) {
            let err = classify_with_context(
                e,
                [("transfer_id".to_string(), transfer_id.clone())].into(),
            );
            return self
                .fail_transfer(transfer_id, request, Some(estimate), err, 0)
                .await;
        }

        let submit = SubmitTransfer {
            from: request.from_address.clone(),
            to: request.to_address.clone(),
            amount: request.amount,
            token: request.token_address.clone(),
            gas_price: request.gas_price.or(Some(estimate.gas_price)),
            gas_limit: request.gas_limit.or(Some(estimate.gas_limit)),
            nonce: None,
        };
        let result = self
            .submit_with_recovery(&transfer_id, submit, estimate.gas_price)
            .await;
        let attempts = result.attempts;

        match result.outcome {
            Ok(tx_hash) => {
                if let Err(e) = self.store.lock().await.set_submitted(&transfer_id, &tx_hash) {
                    warn!(transfer_id = %transfer_id, error = %e, "failed to persist transaction hash");
                }
                info!(transfer_id = %transfer_id, tx_hash = %tx_hash, attempts, "transfer submitted");
                TransferOutcome {
                    transfer_id,
                    status: TransferStatus::Pending,
                    transaction_hash: Some(tx_hash),
                    gas_estimate: Some(estimate),
                    attempts,
                    error: None,
                    recommended_route: RecommendedRoute::Blockchain,
                }
            }
            Err(err) => {
                log_classified(&err);
                if let Err(e) = self.store.lock().await.mark_terminal(
                    &transfer_id,
                    TransferStatus::Failed,
                    Some(err.kind.as_str()),
                    Some(&err.technical_details),
                ) {
                    warn!(transfer_id = %transfer_id, error = %e, "failed to persist transfer failure");
                }
                TransferOutcome {
                    transfer_id,
                    status: TransferStatus::Failed,
                    transaction_hash: None,
                    gas_estimate: Some(estimate),
                    attempts,
                    recommended_route: err.recommended_route(),
                    error: Some(err),
                }
            }
        }
    }

    /// Confirmation state for a previously initiated transfer. Lookup errors
    /// come back as a FAILED-shaped report, not an `Err` — and transient
    /// lookup failures do not poison the stored record.
    pub async fn get_transfer_status(&self, transfer_id: &str) -> StatusReport {
        let record = match self.store.lock().await.get(transfer_id) {
            Ok(Some(record)) => record,
            Ok(None) => {
                return StatusReport {
                    transfer_id: transfer_id.to_string(),
                    status: TransferStatus::Failed,
                    confirmations: 0,
                    transaction_hash: None,
                    error: Some(ClassifiedError::new(
                        ErrorKind::Unknown,
                        format!("no transfer with id {transfer_id}"),
                    )),
                }
            }
            Err(e) => {
                let err = classify_with_context(
                    e,
                    [("transfer_id".to_string(), transfer_id.to_string())].into(),
                );
                return StatusReport {
                    transfer_id: transfer_id.to_string(),
                    status: TransferStatus::Failed,
                    confirmations: 0,
                    transaction_hash: None,
                    error: Some(err),
                };
            }
        };

        match record.status {
            TransferStatus::Confirmed => StatusReport {
                transfer_id: record.transfer_id,
                status: TransferStatus::Confirmed,
                confirmations: self.config.confirmation_depth,
                transaction_hash: record.transaction_hash,
                error: None,
            },
            TransferStatus::Failed => {
                let kind = record
                    .error_kind
                    .as_deref()
                    .and_then(|k| k.parse().ok())
                    .unwrap_or(ErrorKind::Unknown);
                let details = record
                    .error
                    .unwrap_or_else(|| "transfer failed".to_string());
                StatusReport {
                    transfer_id: record.transfer_id,
                    status: TransferStatus::Failed,
                    confirmations: 0,
                    transaction_hash: record.transaction_hash,
                    error: Some(ClassifiedError::new(kind, details)),
                }
            }
            TransferStatus::Pending => self.poll_pending(record).await,
        }
    }

    async fn poll_pending(&self, record: TransferRecord) -> StatusReport {
        let transfer_id = record.transfer_id.clone();
        let Some(tx_hash) = record.transaction_hash.clone() else {
            // Not yet broadcast; nothing to ask the chain about.
            return StatusReport {
                transfer_id,
                status: TransferStatus::Pending,
                confirmations: 0,
                transaction_hash: None,
                error: None,
            };
        };

        let receipt = match self.client.transaction_receipt(&tx_hash).await {
            Ok(receipt) => receipt,
            Err(e) => {
                let err = classify_with_context(
                    e,
                    [("transfer_id".to_string(), transfer_id.clone())].into(),
                );
                log_classified(&err);
                return StatusReport {
                    transfer_id,
                    status: TransferStatus::Failed,
                    confirmations: 0,
                    transaction_hash: Some(tx_hash),
                    error: Some(err),
                };
            }
        };

        let Some(receipt) = receipt else {
            return StatusReport {
                transfer_id,
                status: TransferStatus::Pending,
                confirmations: 0,
                transaction_hash: Some(tx_hash),
                error: None,
            };
        };

        if !receipt.succeeded {
            let err = ClassifiedError::new(
                ErrorKind::TransactionReverted,
                format!("transaction {tx_hash} reverted on-chain"),
            );
            self.persist_terminal(&transfer_id, TransferStatus::Failed, Some(&err))
                .await;
            return StatusReport {
                transfer_id,
                status: TransferStatus::Failed,
                confirmations: 0,
                transaction_hash: Some(tx_hash),
                error: Some(err),
            };
        }

        let current_block = match self.client.block_number().await {
            Ok(block) => block,
            Err(e) => {
                let err = classify_with_context(
                    e,
                    [("transfer_id".to_string(), transfer_id.clone())].into(),
                );
                return StatusReport {
                    transfer_id,
                    status: TransferStatus::Failed,
                    confirmations: 0,
                    transaction_hash: Some(tx_hash),
                    error: Some(err),
                };
            }
        };

        let confirmations = current_block.saturating_sub(receipt.block_number);
        if confirmations >= self.config.confirmation_depth {
            self.persist_terminal(&transfer_id, TransferStatus::Confirmed, None)
                .await;
            info!(transfer_id = %transfer_id, tx_hash = %tx_hash, confirmations, "transfer confirmed");
            StatusReport {
                transfer_id,
                status: TransferStatus::Confirmed,
                confirmations,
                transaction_hash: Some(tx_hash),
                error: None,
            }
        } else {
            StatusReport {
                transfer_id,
                status: TransferStatus::Pending,
                confirmations,
                transaction_hash: Some(tx_hash),
                error: None,
            }
        }
    }

    /// Poll a transfer until it reaches a terminal status or `timeout`
    /// elapses, pushing every observation — duplicates included — to
    /// `on_update`. On timeout the report is FAILED-shaped with "timeout" in
    /// the error text; the stored record is left untouched.
    pub async fn monitor_transfer(
        &self,
        transfer_id: &str,
        mut on_update: Option<&mut (dyn FnMut(&StatusReport) + Send)>,
        timeout: Duration,
    ) -> StatusReport {
        let started = Instant::now();
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));

        loop {
            let report = self.get_transfer_status(transfer_id).await;
            if let Some(cb) = on_update.as_mut() {
                cb(&report);
            }
            if report.status.is_terminal() {
                return report;
            }

            let elapsed = started.elapsed();
            if elapsed >= timeout {
                let err = ClassifiedError::new(
                    ErrorKind::NetworkTimeout,
                    format!(
                        "transfer monitoring timeout after {}ms",
                        timeout.as_millis()
                    ),
                )
                .with_context_entry("transfer_id", transfer_id);
                return StatusReport {
                    transfer_id: transfer_id.to_string(),
                    status: TransferStatus::Failed,
                    confirmations: report.confirmations,
                    transaction_hash: report.transaction_hash,
                    error: Some(err),
                };
            }
            sleep(poll.min(timeout - elapsed)).await;
        }
    }

    /// Poll until `tx_hash` has `required` confirmations. Cooperative, with a
    /// 5-minute ceiling; any internal error degrades to `false`.
    pub async fn wait_for_confirmations(&self, tx_hash: &str, required: u64) -> bool {
        let started = Instant::now();
        while started.elapsed() < CONFIRMATION_WAIT_CEILING {
            let receipt = match self.client.transaction_receipt(tx_hash).await {
                Ok(receipt) => receipt,
                Err(e) => {
                    warn!(tx_hash, error = %e, "receipt lookup failed during confirmation wait");
                    return false;
                }
            };
            match receipt {
                None => sleep(RECEIPT_POLL).await,
                Some(receipt) if !receipt.succeeded => return false,
                Some(receipt) => {
                    let current = match self.client.block_number().await {
                        Ok(block) => block,
                        Err(e) => {
                            warn!(tx_hash, error = %e, "block lookup failed during confirmation wait");
                            return false;
                        }
                    };
                    if current.saturating_sub(receipt.block_number) >= required {
                        return true;
                    }
                    sleep(CONFIRMATION_POLL).await;
                }
            }
        }
        warn!(tx_hash, "confirmation wait ceiling reached");
        false
    }

    /// A sender's transfer history, newest first.
    pub async fn list_transfers(
        &self,
        from_address: &str,
        status: Option<TransferStatus>,
        limit: u32,
        offset: u32,
    ) -> crate::error::Result<TransferPage> {
        self.store
            .lock()
            .await
            .list_for_sender(
                &self.config.network_name(),
                from_address,
                status,
                limit,
                offset,
            )
            .map_err(classify)
    }

    async fn check_balance(
        &self,
        request: &TransferRequest,
        estimate: &GasEstimate,
    ) -> crate::error::Result<()> {
        match &request.token_address {
            None => {
                let balance = self
                    .client
                    .native_balance(&request.from_address)
                    .await
                    .map_err(classify)?;
                let required = request.amount.saturating_add(estimate.total_fee_wei);
                if balance < required {
                    return Err(ClassifiedError::new(
                        ErrorKind::InsufficientBalance,
                        format!(
                            "balance {} is below the required {} (amount + network fee)",
                            format_mnt(balance),
                            format_mnt(required)
                        ),
                    ));
                }
            }
            Some(token) => {
                let token_balance = self
                    .client
                    .token_balance(token, &request.from_address)
                    .await
                    .map_err(classify)?;
                if token_balance < request.amount {
                    return Err(ClassifiedError::new(
                        ErrorKind::InsufficientTokenBalance,
                        format!(
                            "token balance {token_balance} is below the transfer amount {}",
                            request.amount
                        ),
                    ));
                }
                let native = self
                    .client
                    .native_balance(&request.from_address)
                    .await
                    .map_err(classify)?;
                if native < estimate.total_fee_wei {
                    return Err(ClassifiedError::new(
                        ErrorKind::InsufficientBalance,
                        format!(
                            "balance {} cannot cover the network fee {}",
                            format_mnt(native),
                            format_mnt(estimate.total_fee_wei)
                        ),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Submit with recovery driven by the first failure's classification:
    /// gas-escalation for underpriced submissions, nonce renegotiation for
    /// nonce conflicts, the error's own backoff schedule otherwise.
    async fn submit_with_recovery(
        &self,
        transfer_id: &str,
        transfer: SubmitTransfer,
        base_gas_price: u128,
    ) -> RetryOutcome<String> {
        let started = Instant::now();

        let err = match self.client.submit_transfer(&transfer).await {
            Ok(tx_hash) => {
                return RetryOutcome {
                    outcome: Ok(tx_hash),
                    attempts: 1,
                    total_duration: started.elapsed(),
                    fallback_triggered: false,
                }
            }
            Err(raw) => classify_with_context(
                raw,
                [("transfer_id".to_string(), transfer_id.to_string())].into(),
            ),
        };
        log_classified(&err);

        if !err.retryable {
            let fallback_triggered = err.fallback_to_alternate_rail;
            return RetryOutcome {
                outcome: Err(err),
                attempts: 1,
                total_duration: started.elapsed(),
                fallback_triggered,
            };
        }

        let nested = if err.policy.strategy == FallbackStrategy::RetryWithHigherGas {
            let client = self.client.clone();
            let base = transfer.clone();
            execute_with_gas_retry(move |multiplier| {
                let client = client.clone();
                let mut attempt = base.clone();
                attempt.gas_price = Some(scale_gas(base_gas_price, multiplier));
                async move { client.submit_transfer(&attempt).await }
            })
            .await
        } else if err.kind.is_nonce_related() {
            let client = self.client.clone();
            let base = transfer.clone();
            let nonce_client = self.client.clone();
            let from = transfer.from.clone();
            execute_with_nonce_retry(
                move |nonce| {
                    let client = client.clone();
                    let mut attempt = base.clone();
                    attempt.nonce = Some(nonce);
                    async move { client.submit_transfer(&attempt).await }
                },
                move || {
                    let client = nonce_client.clone();
                    let from = from.clone();
                    async move { client.transaction_count(&from).await }
                },
            )
            .await
        } else {
            let config = err.policy.retry.clone().unwrap_or_default();
            let client = self.client.clone();
            let attempt = transfer.clone();
            execute_with_retry(
                move || {
                    let client = client.clone();
                    let attempt = attempt.clone();
                    async move { client.submit_transfer(&attempt).await }
                },
                &config,
            )
            .await
        };

        RetryOutcome {
            outcome: nested.outcome,
            attempts: 1 + nested.attempts,
            total_duration: started.elapsed(),
            fallback_triggered: nested.fallback_triggered,
        }
    }

    fn build_record(
        &self,
        transfer_id: &str,
        request: &TransferRequest,
        gas_fee_wei: Option<u128>,
    ) -> TransferRecord {
        let now = now_millis();
        TransferRecord {
            transfer_id: transfer_id.to_string(),
            network: self.config.network_name(),
            from_address: request.from_address.clone(),
            to_address: request.to_address.clone(),
            amount: request.amount,
            token_address: request.token_address.clone(),
            status: TransferStatus::Pending,
            transaction_hash: None,
            gas_fee_wei,
            error_kind: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn persist_terminal(
        &self,
        transfer_id: &str,
        status: TransferStatus,
        error: Option<&ClassifiedError>,
    ) {
        let result = self.store.lock().await.mark_terminal(
            transfer_id,
            status,
            error.map(|e| e.kind.as_str()),
            error.map(|e| e.technical_details.as_str()),
        );
        if let Err(e) = result {
            warn!(transfer_id = %transfer_id, error = %e, "failed to persist terminal status");
        }
    }

    /// Record a pre-submission failure and shape it into an outcome.
    async fn fail_transfer(
        &self,
        transfer_id: String,
        request: &TransferRequest,
        gas_estimate: Option<GasEstimate>,
        err: ClassifiedError,
        attempts: u32,
    ) -> TransferOutcome {
        log_classified(&err);
        let mut record = self.build_record(
            &transfer_id,
            request,
            gas_estimate.as_ref().map(|e| e.total_fee_wei),
        );
        record.status = TransferStatus::Failed;
        record.error_kind = Some(err.kind.as_str().to_string());
        record.error = Some(err.technical_details.clone());
        if let Err(e) = self.store.lock().await.insert(&record) {
            warn!(transfer_id = %record.transfer_id, error = %e, "failed to persist transfer failure");
        }
        TransferOutcome {
            transfer_id,
            status: TransferStatus::Failed,
            transaction_hash: None,
            gas_estimate,
            attempts,
            recommended_route: err.recommended_route(),
            error: Some(err),
        }
    }
}
