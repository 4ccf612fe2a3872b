use super::idempotency::{IdempotencyRecord, ReservationOutcome, ReservationState};
use super::payment::{PaymentId, PaymentRecord, StatusUpdate};
use super::ports::{IdempotencyTracker, LedgerSnapshot, PaymentLedgerRepository};
use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Writes buffered by a [`StagedScope`], applied by the store on commit.
#[derive(Debug, Default)]
pub struct WriteSet {
    pub payments: HashMap<PaymentId, PaymentRecord>,
    pub idempotency: HashMap<String, IdempotencyRecord>,
}

impl WriteSet {
    pub fn is_empty(&self) -> bool {
        self.payments.is_empty() && self.idempotency.is_empty()
    }
}

/// A transaction scope over committed state plus this transaction's own writes.
///
/// Reads see the scope's writes first. Nothing reaches the snapshot's store until the owner
/// takes the [`WriteSet`] with [`StagedScope::into_writes`] and applies it.
pub struct StagedScope<'a> {
    base: &'a dyn LedgerSnapshot,
    writes: WriteSet,
}

impl<'a> StagedScope<'a> {
    pub fn new(base: &'a dyn LedgerSnapshot) -> Self {
        Self {
            base,
            writes: WriteSet::default(),
        }
    }

    pub fn into_writes(self) -> WriteSet {
        self.writes
    }
}

impl PaymentLedgerRepository for StagedScope<'_> {
    fn insert(&mut self, record: PaymentRecord) -> Result<()> {
        if self.get(&record.payment_id)?.is_some() {
            return Err(PaymentError::Internal(format!(
                "payment {} already exists",
                record.payment_id
            )));
        }
        self.writes.payments.insert(record.payment_id, record);
        Ok(())
    }

    fn update_status(
        &mut self,
        payment_id: &PaymentId,
        update: StatusUpdate,
    ) -> Result<PaymentRecord> {
        let mut record = self
            .get(payment_id)?
            .ok_or(PaymentError::PaymentNotFound(*payment_id))?;
        record.apply(update, Utc::now())?;
        self.writes.payments.insert(*payment_id, record.clone());
        Ok(record)
    }

    fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        match self.writes.payments.get(payment_id) {
            Some(record) => Ok(Some(record.clone())),
            None => self.base.payment(payment_id),
        }
    }

    fn get_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentRecord>> {
        match self.lookup(key)? {
            Some(entry) => self.get(&entry.payment_id),
            None => Ok(None),
        }
    }
}

impl IdempotencyTracker for StagedScope<'_> {
    fn reserve(
        &mut self,
        key: &str,
        candidate: PaymentId,
        now: DateTime<Utc>,
    ) -> Result<ReservationOutcome> {
        if let Some(existing) = self.lookup(key)? {
            return Ok(match existing.state {
                ReservationState::Reserved => ReservationOutcome::InFlight(existing.payment_id),
                ReservationState::Completed => {
                    ReservationOutcome::AlreadyCompleted(existing.payment_id)
                }
            });
        }
        self.writes.idempotency.insert(
            key.to_string(),
            IdempotencyRecord::reserved(key, candidate, now),
        );
        Ok(ReservationOutcome::New)
    }

    fn finalize(&mut self, key: &str, payment_id: PaymentId) -> Result<()> {
        let mut entry = self.lookup(key)?.ok_or_else(|| {
            PaymentError::Internal(format!("idempotency key '{key}' was never reserved"))
        })?;
        if entry.payment_id != payment_id {
            return Err(PaymentError::IdempotencyConflict {
                key: key.to_string(),
                existing: entry.payment_id,
                requested: payment_id,
            });
        }
        if entry.is_completed() {
            return Ok(());
        }
        entry.state = ReservationState::Completed;
        self.writes.idempotency.insert(key.to_string(), entry);
        Ok(())
    }

    fn lookup(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        match self.writes.idempotency.get(key) {
            Some(entry) => Ok(Some(entry.clone())),
            None => self.base.idempotency_record(key),
        }
    }
}
