use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::payment::{PaymentId, PaymentRecord, PaymentStatus};
use crate::domain::ports::{LedgerSnapshot, LedgerStore, TransactionWork};
use crate::domain::unit_of_work::{StagedScope, WriteSet};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Ledger {
    payments: HashMap<PaymentId, PaymentRecord>,
    idempotency: HashMap<String, IdempotencyRecord>,
}

impl Ledger {
    fn apply(&mut self, writes: WriteSet) {
        self.payments.extend(writes.payments);
        self.idempotency.extend(writes.idempotency);
    }
}

impl LedgerSnapshot for Ledger {
    fn payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.get(payment_id).cloned())
    }

    fn idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        Ok(self.idempotency.get(key).cloned())
    }
}

/// A thread-safe in-memory ledger.
///
/// Transactions take the write half of an `Arc<RwLock<..>>`, so they are serialized and a
/// reservation can never be observed half-written. Clones share the same ledger.
#[derive(Default, Clone)]
pub struct InMemoryLedgerStore {
    ledger: Arc<RwLock<Ledger>>,
}

impl InMemoryLedgerStore {
    /// Creates a new, empty in-memory ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LedgerStore for InMemoryLedgerStore {
    async fn transact(&self, work: &mut TransactionWork<'_>) -> Result<()> {
        let mut ledger = self.ledger.write().await;
        let writes = {
            let mut scope = StagedScope::new(&*ledger);
            work(&mut scope)?;
            scope.into_writes()
        };
        ledger.apply(writes);
        Ok(())
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        self.ledger.read().await.payment(payment_id)
    }

    async fn find_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        self.ledger.read().await.idempotency_record(key)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentRecord>> {
        let ledger = self.ledger.read().await;
        match ledger.idempotency.get(key) {
            Some(entry) => ledger.payment(&entry.payment_id),
            None => Ok(None),
        }
    }

    async fn pending(&self) -> Result<Vec<PaymentRecord>> {
        let ledger = self.ledger.read().await;
        let mut pending: Vec<_> = ledger
            .payments
            .values()
            .filter(|p| p.status == PaymentStatus::Pending)
            .cloned()
            .collect();
        pending.sort_by_key(|p| p.updated_at);
        Ok(pending)
    }

    async fn all(&self) -> Result<Vec<PaymentRecord>> {
        let ledger = self.ledger.read().await;
        Ok(ledger.payments.values().cloned().collect())
    }
}
