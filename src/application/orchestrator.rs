use super::config::{OrchestratorConfig, backoff_delay};
use super::reconciler::{Reconciler, ReconcilerConfig};
use super::resolver::GatewayResolver;
use super::transaction::TransactionManager;
use crate::domain::gateway::{GatewayOutcome, GatewayStrategy, GatewayStrategyRef};
use crate::domain::idempotency::ReservationOutcome;
use crate::domain::payment::{ChargeCommand, ChargeResult, PaymentId, PaymentRecord, StatusUpdate};
use crate::domain::ports::LedgerStoreRef;
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

/// The entry point for charging a payer.
///
/// A charge runs in three steps: a short transaction reserves the idempotency key and writes a
/// Pending record, the gateway is called with no transaction open, and a second transaction
/// records whatever the gateway said. Steps two and three run on their own task, so a caller
/// that goes away mid-charge never leaves a provider response unrecorded.
///
/// Cloning is cheap; clones share the resolver, the store and the config.
#[derive(Clone)]
pub struct PaymentOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    resolver: GatewayResolver,
    transactions: TransactionManager,
    config: OrchestratorConfig,
}

impl PaymentOrchestrator {
    pub fn new(
        resolver: GatewayResolver,
        store: LedgerStoreRef,
        config: OrchestratorConfig,
    ) -> Self {
        let transactions = TransactionManager::new(store, config.storage_retry.clone());
        Self {
            inner: Arc::new(Inner {
                resolver,
                transactions,
                config,
            }),
        }
    }

    pub fn store(&self) -> &LedgerStoreRef {
        self.inner.transactions.store()
    }

    /// A reconciler sharing this orchestrator's providers, store and gateway timeouts.
    pub fn reconciler(&self, config: ReconcilerConfig) -> Reconciler {
        Reconciler::new(
            self.inner.resolver.clone(),
            self.inner.transactions.clone(),
            self.inner.config.gateway_timeout,
            self.inner.config.in_flight_bound(),
            config,
        )
    }

    /// Charges the payer described by `command`, at most once per idempotency key.
    ///
    /// Declined and unknown gateway outcomes come back as `Failed` and `Pending` results, not
    /// errors. Errors mean the command was rejected up front or the ledger could not be used.
    pub async fn charge(&self, command: ChargeCommand) -> Result<ChargeResult> {
        command.validate()?;
        let strategy = self.inner.resolver.resolve(&command.provider)?;
        let key = command.idempotency_key.clone();

        if let Some(result) = self.replay(&key).await? {
            return Ok(result);
        }

        let payment_id = PaymentId::new();
        let now = Utc::now();
        let reservation = self
            .inner
            .transactions
            .run_in_transaction(|scope| {
                let outcome = scope.reserve(&key, payment_id, now)?;
                if outcome == ReservationOutcome::New {
                    scope.insert(PaymentRecord::pending(&command, payment_id, now))?;
                }
                Ok(outcome)
            })
            .await?;

        match reservation {
            ReservationOutcome::New => {
                debug!(%payment_id, key = %key, "idempotency key reserved");
            }
            ReservationOutcome::InFlight(existing) => {
                debug!(payment_id = %existing, key = %key, "lost reservation race, waiting");
                return self.await_settlement(&key, existing).await;
            }
            ReservationOutcome::AlreadyCompleted(existing) => {
                return self.stored_result(existing).await;
            }
        }

        let inner = self.inner.clone();
        tokio::spawn(async move { inner.settle(strategy, command, payment_id).await })
            .await
            .map_err(|e| PaymentError::Internal(format!("settlement task failed: {e}")))?
    }

    /// The stored result for `key`, waiting for an in-flight request to settle first.
    async fn replay(&self, key: &str) -> Result<Option<ChargeResult>> {
        let store = self.inner.transactions.store();
        match store.find_idempotency_record(key).await? {
            None => Ok(None),
            Some(entry) if entry.is_completed() => {
                debug!(payment_id = %entry.payment_id, key, "replaying stored result");
                self.stored_result(entry.payment_id).await.map(Some)
            }
            Some(entry) => self.await_settlement(key, entry.payment_id).await.map(Some),
        }
    }

    async fn await_settlement(&self, key: &str, payment_id: PaymentId) -> Result<ChargeResult> {
        let store = self.inner.transactions.store();
        let config = &self.inner.config;
        let deadline = Instant::now() + config.in_flight_wait;
        loop {
            if let Some(entry) = store.find_idempotency_record(key).await?
                && entry.is_completed()
            {
                return self.stored_result(entry.payment_id).await;
            }
            if Instant::now() >= deadline {
                debug!(%payment_id, key, "in-flight charge has not settled, answering pending");
                return self.stored_result(payment_id).await;
            }
            tokio::time::sleep(config.in_flight_poll_interval).await;
        }
    }

    async fn stored_result(&self, payment_id: PaymentId) -> Result<ChargeResult> {
        let record = self
            .inner
            .transactions
            .store()
            .get(&payment_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound(payment_id))?;
        Ok(ChargeResult::from(&record))
    }
}

impl Inner {
    async fn settle(
        self: Arc<Self>,
        strategy: GatewayStrategyRef,
        command: ChargeCommand,
        payment_id: PaymentId,
    ) -> Result<ChargeResult> {
        let outcome = self.invoke_gateway(strategy.as_ref(), &command).await;
        self.record_outcome(&command.idempotency_key, payment_id, outcome)
            .await
    }

    /// Calls the gateway, retrying only failures that never reached the provider.
    async fn invoke_gateway(
        &self,
        strategy: &dyn GatewayStrategy,
        command: &ChargeCommand,
    ) -> GatewayOutcome {
        let config = &self.config;
        let key = command.idempotency_key.as_str();
        let mut attempt: u32 = 0;
        loop {
            let call = tokio::time::timeout(config.gateway_timeout, strategy.charge(command)).await;
            match call {
                Ok(Ok(outcome)) => return outcome,
                Ok(Err(err)) if err.is_retry_safe() => {
                    if attempt >= config.max_transport_retries {
                        warn!(
                            key,
                            gateway = strategy.name(),
                            error = %err,
                            "provider unreachable, giving up"
                        );
                        return GatewayOutcome::Ambiguous(format!(
                            "provider unreachable after {} attempts: {err}",
                            attempt + 1
                        ));
                    }
                    let delay =
                        backoff_delay(config.retry_base_delay, config.retry_max_delay, attempt);
                    warn!(
                        key,
                        gateway = strategy.name(),
                        error = %err,
                        ?delay,
                        "charge never left the process, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Ok(Err(err)) => return GatewayOutcome::Ambiguous(err.to_string()),
                Err(_) => {
                    return GatewayOutcome::Ambiguous(format!(
                        "no answer within {:?}",
                        config.gateway_timeout
                    ));
                }
            }
        }
    }

    async fn record_outcome(
        &self,
        key: &str,
        payment_id: PaymentId,
        outcome: GatewayOutcome,
    ) -> Result<ChargeResult> {
        let update = match &outcome {
            GatewayOutcome::Confirmed(reference) => StatusUpdate::succeeded(reference.clone()),
            GatewayOutcome::Declined(reason) => StatusUpdate::failed(reason.clone()),
            GatewayOutcome::Ambiguous(reason) => StatusUpdate::pending(reason.clone()),
        };

        let (record, resolved_earlier) = self
            .transactions
            .commit_with_retry(|scope| {
                let current = scope
                    .get(&payment_id)?
                    .ok_or(PaymentError::PaymentNotFound(payment_id))?;
                // A reconciler may have resolved a stale reservation first.
                let resolved_earlier = current.status.is_terminal();
                let record = if resolved_earlier {
                    current
                } else {
                    scope.update_status(&payment_id, update.clone())?
                };
                scope.finalize(key, payment_id)?;
                Ok((record, resolved_earlier))
            })
            .await?;

        if resolved_earlier {
            if update.status.is_terminal() && update.status != record.status {
                error!(
                    %payment_id,
                    key,
                    stored = %record.status,
                    gateway = %update.status,
                    "gateway outcome contradicts reconciled status, operator attention required"
                );
            }
            return Ok(ChargeResult::from(&record));
        }

        match outcome {
            GatewayOutcome::Ambiguous(reason) => {
                warn!(
                    %payment_id,
                    key,
                    reason = %reason,
                    "charge outcome unknown, left pending for reconciliation"
                );
            }
            _ => info!(%payment_id, key, status = %record.status, "charge recorded"),
        }
        Ok(ChargeResult::from(&record))
    }
}
