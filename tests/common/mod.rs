#![allow(dead_code)]

use async_trait::async_trait;
use chargeflow::application::config::{OrchestratorConfig, StorageRetryPolicy};
use chargeflow::application::orchestrator::PaymentOrchestrator;
use chargeflow::application::resolver::GatewayResolver;
use chargeflow::domain::gateway::{GatewayOutcome, GatewayStrategy, StatusQuery, TransportError};
use chargeflow::domain::idempotency::IdempotencyRecord;
use chargeflow::domain::payment::{ChargeCommand, PaymentId, PaymentRecord};
use chargeflow::domain::ports::{LedgerStore, LedgerStoreRef, TransactionWork};
use chargeflow::error::{PaymentError, Result};
use chargeflow::infrastructure::in_memory::InMemoryLedgerStore;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const PROVIDER: &str = "stripe-like";

/// A gateway that replays a script of answers and counts every call.
#[derive(Clone)]
pub struct ScriptedGateway {
    script: Arc<Mutex<VecDeque<std::result::Result<GatewayOutcome, TransportError>>>>,
    fallback: std::result::Result<GatewayOutcome, TransportError>,
    status: Arc<Mutex<GatewayOutcome>>,
    delay: Duration,
    calls: Arc<AtomicUsize>,
    status_queries: Arc<AtomicUsize>,
}

impl ScriptedGateway {
    /// Answers `outcome` to every charge.
    pub fn always(outcome: GatewayOutcome) -> Self {
        Self {
            script: Arc::default(),
            fallback: Ok(outcome),
            status: Arc::new(Mutex::new(GatewayOutcome::Ambiguous(
                "unknown".to_string(),
            ))),
            delay: Duration::ZERO,
            calls: Arc::default(),
            status_queries: Arc::default(),
        }
    }

    pub fn failing(err: TransportError) -> Self {
        let mut gateway = Self::always(GatewayOutcome::Ambiguous("unused".to_string()));
        gateway.fallback = Err(err);
        gateway
    }

    /// Answers from `script` first, then falls back to the default answer.
    pub fn then(self, answer: std::result::Result<GatewayOutcome, TransportError>) -> Self {
        self.script.lock().unwrap().push_back(answer);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn set_status(&self, outcome: GatewayOutcome) {
        *self.status.lock().unwrap() = outcome;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GatewayStrategy for ScriptedGateway {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn charge(
        &self,
        _command: &ChargeCommand,
    ) -> std::result::Result<GatewayOutcome, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let scripted = self.script.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| self.fallback.clone())
    }

    async fn query_status(
        &self,
        _query: &StatusQuery,
    ) -> std::result::Result<GatewayOutcome, TransportError> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.status.lock().unwrap().clone())
    }
}

/// An in-memory store where transactions number `after` up to `after + failures` (zero-based)
/// fail as if the database were down.
#[derive(Clone)]
pub struct FlakyStore {
    inner: InMemoryLedgerStore,
    after: u32,
    failures: u32,
    transactions: Arc<AtomicU32>,
}

impl FlakyStore {
    pub fn new(inner: InMemoryLedgerStore, after: u32, failures: u32) -> Self {
        Self {
            inner,
            after,
            failures,
            transactions: Arc::default(),
        }
    }

    /// Transactions attempted so far, failed ones included.
    pub fn transactions(&self) -> u32 {
        self.transactions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LedgerStore for FlakyStore {
    async fn transact(&self, work: &mut TransactionWork<'_>) -> Result<()> {
        let index = self.transactions.fetch_add(1, Ordering::SeqCst);
        if index >= self.after && index < self.after + self.failures {
            return Err(PaymentError::StorageUnavailable(
                "connection pool exhausted".to_string(),
            ));
        }
        self.inner.transact(work).await
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        self.inner.get(payment_id).await
    }

    async fn find_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        self.inner.find_idempotency_record(key).await
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentRecord>> {
        self.inner.find_by_idempotency_key(key).await
    }

    async fn pending(&self) -> Result<Vec<PaymentRecord>> {
        self.inner.pending().await
    }

    async fn all(&self) -> Result<Vec<PaymentRecord>> {
        self.inner.all().await
    }
}

/// Production defaults with every wait shrunk so tests stay fast.
pub fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        max_transport_retries: 3,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        gateway_timeout: Duration::from_millis(500),
        in_flight_poll_interval: Duration::from_millis(5),
        in_flight_wait: Duration::from_secs(2),
        storage_retry: StorageRetryPolicy {
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            alert_after: 3,
            max_attempts: None,
        },
    }
}

pub fn orchestrator_with(
    gateway: impl GatewayStrategy + 'static,
    store: LedgerStoreRef,
    config: OrchestratorConfig,
) -> PaymentOrchestrator {
    PaymentOrchestrator::new(GatewayResolver::new().register(PROVIDER, gateway), store, config)
}

pub fn command(key: &str, amount: i64) -> ChargeCommand {
    ChargeCommand::new(key, PROVIDER, amount, "USD", "payer-1")
}

/// Writes a charges CSV with the standard header followed by `rows`.
pub fn write_charges(rows: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        "idempotency_key, provider, amount, currency, payer_reference, metadata"
    )
    .unwrap();
    for row in rows {
        writeln!(file, "{row}").unwrap();
    }
    file
}
