use std::time::Duration;

/// Backoff policy for committing a gateway outcome to local storage.
///
/// Losing such a commit would leave money moved without a ledger entry, so the default never
/// gives up: it raises an alert after `alert_after` failed attempts and keeps going.
#[derive(Debug, Clone)]
pub struct StorageRetryPolicy {
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub alert_after: u32,
    /// `None` retries until the commit succeeds.
    pub max_attempts: Option<u32>,
}

impl Default for StorageRetryPolicy {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(5),
            alert_after: 5,
            max_attempts: None,
        }
    }
}

/// Construction-time settings of a
/// [`PaymentOrchestrator`](super::orchestrator::PaymentOrchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Extra attempts after a transport failure that never reached the provider.
    pub max_transport_retries: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    /// Bound on a single gateway call; exceeding it makes the outcome Ambiguous.
    pub gateway_timeout: Duration,
    pub in_flight_poll_interval: Duration,
    /// How long a duplicate request waits for the in-flight one before answering Pending.
    pub in_flight_wait: Duration,
    pub storage_retry: StorageRetryPolicy,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_transport_retries: 3,
            retry_base_delay: Duration::from_millis(100),
            retry_max_delay: Duration::from_secs(2),
            gateway_timeout: Duration::from_secs(10),
            in_flight_poll_interval: Duration::from_millis(50),
            in_flight_wait: Duration::from_secs(5),
            storage_retry: StorageRetryPolicy::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Longest a charge can stay between its reservation and the gateway's final answer.
    ///
    /// Every attempt may run into the timeout, with a backoff sleep between attempts. A Reserved
    /// key younger than this may still get an answer from its gateway call.
    pub fn in_flight_bound(&self) -> Duration {
        let attempts = self.max_transport_retries.saturating_add(1);
        let backoff: Duration = (0..self.max_transport_retries)
            .map(|attempt| backoff_delay(self.retry_base_delay, self.retry_max_delay, attempt))
            .sum();
        self.gateway_timeout.saturating_mul(attempts) + backoff
    }
}

/// Exponential backoff: `base * 2^attempt`, capped at `max`.
pub fn backoff_delay(base: Duration, max: Duration, attempt: u32) -> Duration {
    let factor = 2u32.saturating_pow(attempt.min(16));
    base.saturating_mul(factor).min(max)
}
