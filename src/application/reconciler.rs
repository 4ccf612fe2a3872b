use super::resolver::GatewayResolver;
use super::transaction::TransactionManager;
use crate::domain::gateway::{GatewayOutcome, StatusQuery};
use crate::domain::payment::{PaymentId, PaymentRecord, StatusUpdate};
use crate::error::{PaymentError, Result};
use chrono::Utc;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Pending records younger than this are left alone; they may still be in flight.
    pub min_age: Duration,
    pub batch_size: usize,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            min_age: Duration::from_secs(60),
            batch_size: 100,
        }
    }
}

/// What happened to one Pending payment during reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Succeeded,
    Failed,
    StillPending,
    /// The charge that reserved the key is still waiting on its own gateway call.
    InFlight,
    /// Someone else resolved it between the scan and the commit.
    AlreadyResolved,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReconciliationReport {
    pub examined: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub still_pending: usize,
    /// Records whose own charge may still hear back from its gateway.
    pub in_flight: usize,
    /// Records whose provider is no longer registered, or which were resolved concurrently.
    pub skipped: usize,
}

/// Resolves Pending payments by asking their provider what happened.
///
/// Only `query_status` is ever called here; a charge is never re-submitted.
pub struct Reconciler {
    resolver: GatewayResolver,
    transactions: TransactionManager,
    gateway_timeout: Duration,
    in_flight_bound: Duration,
    config: ReconcilerConfig,
}

impl Reconciler {
    pub fn new(
        resolver: GatewayResolver,
        transactions: TransactionManager,
        gateway_timeout: Duration,
        in_flight_bound: Duration,
        config: ReconcilerConfig,
    ) -> Self {
        Self {
            resolver,
            transactions,
            gateway_timeout,
            in_flight_bound,
            config,
        }
    }

    /// One pass over the oldest Pending payments.
    pub async fn sweep(&self) -> Result<ReconciliationReport> {
        let min_age = chrono::Duration::from_std(self.config.min_age)
            .map_err(|e| PaymentError::Internal(format!("reconciler min_age out of range: {e}")))?;
        let cutoff = Utc::now() - min_age;
        let due: Vec<PaymentRecord> = self
            .transactions
            .store()
            .pending()
            .await?
            .into_iter()
            .filter(|p| p.updated_at <= cutoff)
            .take(self.config.batch_size)
            .collect();

        let mut report = ReconciliationReport::default();
        for record in due {
            report.examined += 1;
            match self.resolve_record(&record).await {
                Ok(Resolution::Succeeded) => report.succeeded += 1,
                Ok(Resolution::Failed) => report.failed += 1,
                Ok(Resolution::StillPending) => report.still_pending += 1,
                Ok(Resolution::InFlight) => report.in_flight += 1,
                Ok(Resolution::AlreadyResolved) => report.skipped += 1,
                Err(PaymentError::UnknownProvider(provider)) => {
                    warn!(
                        payment_id = %record.payment_id,
                        provider = %provider,
                        "provider no longer registered, skipping"
                    );
                    report.skipped += 1;
                }
                Err(err) => return Err(err),
            }
        }

        info!(
            examined = report.examined,
            succeeded = report.succeeded,
            failed = report.failed,
            still_pending = report.still_pending,
            in_flight = report.in_flight,
            "reconciliation sweep finished"
        );
        Ok(report)
    }

    /// Resolves a single payment regardless of `min_age`.
    ///
    /// A payment whose charge may still hear back from its gateway is left to that charge.
    pub async fn reconcile(&self, payment_id: PaymentId) -> Result<Resolution> {
        let record = self
            .transactions
            .store()
            .get(&payment_id)
            .await?
            .ok_or(PaymentError::PaymentNotFound(payment_id))?;
        if record.status.is_terminal() {
            return Ok(Resolution::AlreadyResolved);
        }
        self.resolve_record(&record).await
    }

    async fn resolve_record(&self, record: &PaymentRecord) -> Result<Resolution> {
        if self.still_in_flight(record).await? {
            debug!(payment_id = %record.payment_id, "charge still in flight, skipping");
            return Ok(Resolution::InFlight);
        }
        let strategy = self.resolver.resolve(&record.provider)?;
        let query = StatusQuery {
            idempotency_key: record.idempotency_key.clone(),
            provider_reference: record.provider_reference.clone(),
        };

        let (update, resolution) =
            match tokio::time::timeout(self.gateway_timeout, strategy.query_status(&query)).await {
                Ok(Ok(GatewayOutcome::Confirmed(reference))) => {
                    (StatusUpdate::succeeded(reference), Resolution::Succeeded)
                }
                Ok(Ok(GatewayOutcome::Declined(reason))) => {
                    (StatusUpdate::failed(reason), Resolution::Failed)
                }
                Ok(Ok(GatewayOutcome::Ambiguous(_))) | Ok(Err(_)) | Err(_) => {
                    return Ok(Resolution::StillPending);
                }
            };

        let payment_id = record.payment_id;
        let key = record.idempotency_key.as_str();
        let resolved = self
            .transactions
            .commit_with_retry(|scope| {
                let current = scope
                    .get(&payment_id)?
                    .ok_or(PaymentError::PaymentNotFound(payment_id))?;
                if current.status.is_terminal() {
                    return Ok(false);
                }
                scope.update_status(&payment_id, update.clone())?;
                scope.finalize(key, payment_id)?;
                Ok(true)
            })
            .await?;

        if !resolved {
            return Ok(Resolution::AlreadyResolved);
        }
        info!(%payment_id, key, ?resolution, "pending payment reconciled");
        Ok(resolution)
    }

    /// A Reserved key younger than the in-flight bound belongs to a charge whose gateway call
    /// may still answer. Its outcome must come from that answer.
    async fn still_in_flight(&self, record: &PaymentRecord) -> Result<bool> {
        let store = self.transactions.store();
        let Some(entry) = store.find_idempotency_record(&record.idempotency_key).await? else {
            return Ok(false);
        };
        if entry.is_completed() || entry.payment_id != record.payment_id {
            return Ok(false);
        }
        let bound = chrono::Duration::from_std(self.in_flight_bound)
            .map_err(|e| PaymentError::Internal(format!("in-flight bound out of range: {e}")))?;
        Ok(entry.first_seen_at > Utc::now() - bound)
    }
}
