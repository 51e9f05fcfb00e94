//! Retry execution under taxonomy-driven policies.
//!
//! Four modes: a fixed schedule ([`execute_with_retry`]), a schedule chosen by
//! the classified error itself ([`execute_with_adaptive_retry`]), gas-price
//! escalation ([`execute_with_gas_retry`]), and nonce renegotiation
//! ([`execute_with_nonce_retry`]).
//!
//! Each failed attempt is classified exactly once; the resulting
//! [`ClassifiedError`] is what every retry-eligibility decision consults.
//! All waiting is cooperative (`tokio::time::sleep`), so concurrent transfer
//! flows back off independently without blocking each other.

use std::future::Future;

use rand::RngExt;
use tokio::time::{sleep, Duration, Instant};
use tracing::{debug, warn};

use crate::classify::{classify, log_classified, ErrorInput};
use crate::error::ClassifiedError;
use crate::taxonomy::RetryConfig;

/// Gas-price escalation ladder tried by [`execute_with_gas_retry`], in order.
pub const GAS_MULTIPLIERS: [f64; 3] = [1.0, 1.2, 1.5];

/// Fixed pause between gas-escalation and nonce-renegotiation attempts.
const STRATEGY_PAUSE: Duration = Duration::from_secs(1);

/// What a retry run produced: the final result or classified error, plus
/// accounting for the caller.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    /// `Ok` on the first successful attempt, `Err` with the last classified
    /// failure otherwise.
    pub outcome: Result<T, ClassifiedError>,
    /// Number of operation calls made, >= 1.
    pub attempts: u32,
    /// Wall-clock time from the first attempt to the final resolution.
    pub total_duration: Duration,
    /// Whether the final error recommends the alternate payment rail.
    pub fallback_triggered: bool,
}

impl<T> RetryOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn into_result(self) -> Result<T, ClassifiedError> {
        self.outcome
    }

    fn success(value: T, attempts: u32, started: Instant) -> Self {
        RetryOutcome {
            outcome: Ok(value),
            attempts,
            total_duration: started.elapsed(),
            fallback_triggered: false,
        }
    }

    fn failure(err: ClassifiedError, attempts: u32, started: Instant) -> Self {
        let fallback_triggered = err.fallback_to_alternate_rail;
        RetryOutcome {
            outcome: Err(err),
            attempts,
            total_duration: started.elapsed(),
            fallback_triggered,
        }
    }
}

/// Backoff delay before the retry that follows attempt number `attempt`
/// (1-based): `base * multiplier^(attempt-1)`, clamped to `[0, max_delay_ms]`
/// after the optional ±10% jitter.
pub fn backoff_delay(config: &RetryConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1) as i32;
    let raw = config.base_delay_ms as f64 * config.backoff_multiplier.powi(exponent);
    let mut delay = raw.min(config.max_delay_ms as f64);
    if config.jitter {
        let factor: f64 = rand::rng().random_range(0.9..=1.1);
        delay = (delay * factor).min(config.max_delay_ms as f64);
    }
    Duration::from_millis(delay.max(0.0) as u64)
}

/// Run `op` under a fixed retry schedule.
///
/// Stops immediately on success, on a non-retryable classified error, or when
/// `config.max_attempts` is exhausted. Sleeps the computed backoff delay
/// between attempts.
pub async fn execute_with_retry<T, E, F, Fut>(mut op: F, config: &RetryConfig) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<ErrorInput>,
{
    let started = Instant::now();
    let max_attempts = config.max_attempts.max(1);

    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return RetryOutcome::success(value, attempt, started),
            Err(raw) => {
                let err = classify(raw);
                log_classified(&err);
                if !err.retryable || attempt >= max_attempts {
                    return RetryOutcome::failure(err, attempt, started);
                }
                let delay = backoff_delay(config, attempt);
                warn!(
                    attempt,
                    max_attempts,
                    kind = %err.kind,
                    delay_ms = delay.as_millis() as u64,
                    "attempt failed, backing off"
                );
                sleep(delay).await;
            }
        }
        attempt += 1;
    }
}

/// Run `op` once, and on a retryable failure re-enter [`execute_with_retry`]
/// with the schedule embedded in that failure's own policy.
///
/// The retry schedule is therefore error-kind-specific rather than
/// caller-supplied. Attempt accounting: the reported count is the 1 bare
/// attempt plus every call made by the nested sequence (the nested sequence's
/// first call is a real operation call, so it counts).
pub async fn execute_with_adaptive_retry<T, E, F, Fut>(mut op: F) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<ErrorInput>,
{
    let started = Instant::now();

    let err = match op().await {
        Ok(value) => return RetryOutcome::success(value, 1, started),
        Err(raw) => classify(raw),
    };
    log_classified(&err);

    let config = match (err.retryable, err.policy.retry.clone()) {
        (true, Some(config)) => config,
        _ => return RetryOutcome::failure(err, 1, started),
    };

    debug!(kind = %err.kind, max_attempts = config.max_attempts, "adaptive retry engaged");
    let nested = execute_with_retry(op, &config).await;
    RetryOutcome {
        outcome: nested.outcome,
        attempts: 1 + nested.attempts,
        total_duration: started.elapsed(),
        fallback_triggered: nested.fallback_triggered,
    }
}

/// Run `op` with escalating gas-price multipliers `[1.0, 1.2, 1.5]`.
///
/// Stops at the first success, or immediately when a failure is not
/// gas-related — remaining multipliers are not tried for errors more gas
/// money cannot fix. Fixed 1s pause between attempts.
pub async fn execute_with_gas_retry<T, E, F, Fut>(mut op: F) -> RetryOutcome<T>
where
    F: FnMut(f64) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<ErrorInput>,
{
    let started = Instant::now();

    let mut attempt = 0;
    for multiplier in GAS_MULTIPLIERS {
        attempt += 1;
        match op(multiplier).await {
            Ok(value) => return RetryOutcome::success(value, attempt, started),
            Err(raw) => {
                let err = classify(raw);
                log_classified(&err);
                if !err.kind.is_gas_related() || attempt as usize >= GAS_MULTIPLIERS.len() {
                    return RetryOutcome::failure(err, attempt, started);
                }
                warn!(
                    attempt,
                    multiplier,
                    kind = %err.kind,
                    "gas escalation attempt failed"
                );
                sleep(STRATEGY_PAUSE).await;
            }
        }
    }
    unreachable!("gas retry loop always returns from its final attempt");
}

/// Run `op` with a nonce freshly fetched via `get_nonce` before every attempt.
///
/// Nonces are never reused across attempts. Up to 3 attempts, stopping
/// immediately on success or on any failure that is not nonce-related. Fixed
/// 1s pause between attempts.
pub async fn execute_with_nonce_retry<T, E, F, Fut, G, GFut, GE>(
    mut op: F,
    mut get_nonce: G,
) -> RetryOutcome<T>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Into<ErrorInput>,
    G: FnMut() -> GFut,
    GFut: Future<Output = Result<u64, GE>>,
    GE: Into<ErrorInput>,
{
    const MAX_ATTEMPTS: u32 = 3;
    let started = Instant::now();

    let mut attempt = 1;
    loop {
        let nonce = match get_nonce().await {
            Ok(nonce) => nonce,
            Err(raw) => {
                let err = classify(raw);
                log_classified(&err);
                return RetryOutcome::failure(err, attempt, started);
            }
        };

        match op(nonce).await {
            Ok(value) => return RetryOutcome::success(value, attempt, started),
            Err(raw) => {
                let err = classify(raw);
                log_classified(&err);
                if !err.kind.is_nonce_related() || attempt >= MAX_ATTEMPTS {
                    return RetryOutcome::failure(err, attempt, started);
                }
                warn!(attempt, nonce, kind = %err.kind, "nonce attempt failed");
                sleep(STRATEGY_PAUSE).await;
            }
        }
        attempt += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
    use std::sync::Mutex;

    use crate::error::ErrorKind;

    fn fixed_config(max_attempts: u32, base_delay_ms: u64) -> RetryConfig {
        RetryConfig {
            max_attempts,
            base_delay_ms,
            backoff_multiplier: 2.0,
            max_delay_ms: 60_000,
            jitter: false,
        }
    }

    #[test]
    fn backoff_is_monotonic_and_clamped() {
        let config = RetryConfig {
            max_attempts: 10,
            base_delay_ms: 100,
            backoff_multiplier: 2.0,
            max_delay_ms: 1000,
            jitter: false,
        };
        let mut previous = Duration::ZERO;
        for attempt in 1..=10 {
            let delay = backoff_delay(&config, attempt);
            assert!(delay >= previous, "delay shrank at attempt {attempt}");
            assert!(delay <= Duration::from_millis(1000), "delay over cap");
            previous = delay;
        }
        assert_eq!(backoff_delay(&config, 1), Duration::from_millis(100));
        assert_eq!(backoff_delay(&config, 2), Duration::from_millis(200));
        assert_eq!(backoff_delay(&config, 8), Duration::from_millis(1000));
    }

    #[test]
    fn jitter_stays_within_ten_percent_and_cap() {
        let config = RetryConfig {
            max_attempts: 3,
            base_delay_ms: 1000,
            backoff_multiplier: 1.0,
            max_delay_ms: 1050,
            jitter: true,
        };
        for _ in 0..200 {
            let delay = backoff_delay(&config, 1).as_millis() as u64;
            assert!((900..=1050).contains(&delay), "jittered delay {delay} out of range");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_error_stops_after_one_attempt() {
        let calls = AtomicU32::new(0);
        let result: RetryOutcome<()> = execute_with_retry(
            || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("invalid address") }
            },
            &fixed_config(5, 100),
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts, 1);
        let err = result.outcome.unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidAddress);
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_on_nth_attempt_with_correct_accounting() {
        let calls = AtomicU32::new(0);
        let result = execute_with_retry(
            || {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("request timed out")
                    } else {
                        Ok(n)
                    }
                }
            },
            &fixed_config(3, 1000),
        )
        .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(result.outcome.unwrap(), 3);
        // Two backoffs: 1000ms + 2000ms under the paused clock.
        assert!(result.total_duration >= Duration::from_millis(3000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_reports_last_error_and_fallback() {
        let result: RetryOutcome<()> =
            execute_with_retry(|| async { Err("request timed out") }, &fixed_config(2, 100)).await;

        assert_eq!(result.attempts, 2);
        assert!(result.fallback_triggered, "timeout policy reroutes on exhaustion");
        assert_eq!(result.outcome.unwrap_err().kind, ErrorKind::NetworkTimeout);
    }

    #[tokio::test(start_paused = true)]
    async fn adaptive_uses_the_errors_own_schedule() {
        // Nonce policy allows 2 attempts; fail the bare attempt and the first
        // nested attempt, then succeed: 1 bare + 2 nested = 3 reported.
        let calls = AtomicU32::new(0);
        let result = execute_with_adaptive_retry(|| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n < 3 {
                    Err("nonce too low")
                } else {
                    Ok("submitted")
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn adaptive_stops_at_one_for_non_retryable() {
        let calls = AtomicU32::new(0);
        let result: RetryOutcome<()> = execute_with_adaptive_retry(|| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err("execution reverted") }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts, 1);
        assert!(result.fallback_triggered);
    }

    #[tokio::test(start_paused = true)]
    async fn gas_retry_walks_the_multiplier_ladder() {
        let seen = Mutex::new(Vec::new());
        let result: RetryOutcome<()> = execute_with_gas_retry(|multiplier| {
            seen.lock().unwrap().push(multiplier);
            async { Err("gas price too low") }
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![1.0, 1.2, 1.5]);
        assert_eq!(result.attempts, 3);
        assert_eq!(result.outcome.unwrap_err().kind, ErrorKind::GasPriceTooLow);
    }

    #[tokio::test(start_paused = true)]
    async fn gas_retry_stops_on_non_gas_error() {
        let seen = Mutex::new(Vec::new());
        let result: RetryOutcome<()> = execute_with_gas_retry(|multiplier| {
            seen.lock().unwrap().push(multiplier);
            async { Err("execution reverted") }
        })
        .await;

        assert_eq!(*seen.lock().unwrap(), vec![1.0]);
        assert_eq!(result.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn gas_retry_succeeds_mid_ladder() {
        let calls = AtomicU32::new(0);
        let result = execute_with_gas_retry(|multiplier| {
            let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                if n == 1 {
                    Err("transaction underpriced")
                } else {
                    Ok(multiplier)
                }
            }
        })
        .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 2);
        assert_eq!(result.outcome.unwrap(), 1.2);
    }

    #[tokio::test(start_paused = true)]
    async fn nonce_retry_fetches_a_fresh_nonce_every_attempt() {
        let fetches = AtomicU64::new(5);
        let seen = Mutex::new(Vec::new());
        let calls = AtomicU32::new(0);

        let result = execute_with_nonce_retry(
            |nonce| {
                seen.lock().unwrap().push(nonce);
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 3 {
                        Err("nonce too low")
                    } else {
                        Ok(nonce)
                    }
                }
            },
            || {
                let next = fetches.fetch_add(1, Ordering::SeqCst);
                async move { Ok::<u64, &str>(next) }
            },
        )
        .await;

        assert!(result.is_success());
        assert_eq!(result.attempts, 3);
        assert_eq!(*seen.lock().unwrap(), vec![5, 6, 7]);
        assert_eq!(result.outcome.unwrap(), 7);
    }

    #[tokio::test(start_paused = true)]
    async fn nonce_retry_stops_on_non_nonce_error() {
        let calls = AtomicU32::new(0);
        let result: RetryOutcome<()> = execute_with_nonce_retry(
            |_nonce| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err("insufficient funds") }
            },
            || async { Ok::<u64, &str>(1) },
        )
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(result.attempts, 1);
        assert_eq!(result.outcome.unwrap_err().kind, ErrorKind::InsufficientBalance);
    }

    #[tokio::test(start_paused = true)]
    async fn nonce_retry_surfaces_nonce_fetch_failures() {
        let result: RetryOutcome<()> = execute_with_nonce_retry(
            |_nonce| async { Ok::<(), &str>(()) },
            || async { Err::<u64, _>("connection refused") },
        )
        .await;

        assert!(!result.is_success());
        assert_eq!(result.outcome.unwrap_err().kind, ErrorKind::NetworkUnavailable);
    }
}
