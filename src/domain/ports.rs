use super::idempotency::{IdempotencyRecord, ReservationOutcome};
use super::payment::{PaymentId, PaymentRecord, StatusUpdate};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Consistent point reads against committed ledger state.
pub trait LedgerSnapshot {
    fn payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>>;
    fn idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>>;
}

/// Payment records, writable only through a transaction scope.
pub trait PaymentLedgerRepository {
    fn insert(&mut self, record: PaymentRecord) -> Result<()>;
    fn update_status(&mut self, payment_id: &PaymentId, update: StatusUpdate)
    -> Result<PaymentRecord>;
    fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>>;
    fn get_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentRecord>>;
}

/// Idempotency keys, writable only through a transaction scope.
pub trait IdempotencyTracker {
    /// Claims `key` for `candidate` unless some payment already holds it.
    fn reserve(
        &mut self,
        key: &str,
        candidate: PaymentId,
        now: DateTime<Utc>,
    ) -> Result<ReservationOutcome>;
    fn finalize(&mut self, key: &str, payment_id: PaymentId) -> Result<()>;
    fn lookup(&self, key: &str) -> Result<Option<IdempotencyRecord>>;
}

/// Exclusive, consistent access to both repositories for one unit of work.
pub trait TransactionScope: PaymentLedgerRepository + IdempotencyTracker {}

impl<T: PaymentLedgerRepository + IdempotencyTracker> TransactionScope for T {}

pub type TransactionWork<'a> = dyn FnMut(&mut dyn TransactionScope) -> Result<()> + Send + 'a;

/// Durable storage for the ledger and idempotency records.
///
/// `transact` runs `work` against a scope and commits every write it made atomically, or none of
/// them if `work` fails. Adapters serialize transactions, which makes `reserve` a
/// compare-and-set at the storage layer.
#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn transact(&self, work: &mut TransactionWork<'_>) -> Result<()>;

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>>;
    async fn find_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>>;
    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentRecord>>;
    /// Pending payments, oldest `updated_at` first.
    async fn pending(&self) -> Result<Vec<PaymentRecord>>;
    async fn all(&self) -> Result<Vec<PaymentRecord>>;
}

pub type LedgerStoreRef = Arc<dyn LedgerStore>;
