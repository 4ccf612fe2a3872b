use crate::domain::idempotency::IdempotencyRecord;
use crate::domain::payment::{PaymentId, PaymentRecord, PaymentStatus};
use crate::domain::ports::{LedgerSnapshot, LedgerStore, TransactionWork};
use crate::domain::unit_of_work::StagedScope;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use rocksdb::{
    ColumnFamily, ColumnFamilyDescriptor, ErrorKind, IteratorMode, OptimisticTransactionDB,
    Options, Transaction,
};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Column Family for payment records, keyed by payment id.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for idempotency records, keyed by idempotency key.
pub const CF_IDEMPOTENCY: &str = "idempotency";

/// Times a conflicting transaction is re-run before the conflict is reported.
const MAX_CONFLICT_RETRIES: u32 = 8;

/// A persistent ledger backed by RocksDB.
///
/// Each unit of work runs in an optimistic RocksDB transaction. Every key the work reads is
/// tracked with `get_for_update`, so if another writer commits one of those keys first, this
/// commit fails with a conflict and the work is re-run against the new state. Reserving an
/// idempotency key is therefore a compare-and-set inside the database.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<OptimisticTransactionDB>`).
#[derive(Clone)]
pub struct RocksDBLedgerStore {
    db: Arc<OptimisticTransactionDB>,
}

impl RocksDBLedgerStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that the required column families ("payments" and "idempotency") exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_payments = ColumnFamilyDescriptor::new(CF_PAYMENTS, Options::default());
        let cf_idempotency = ColumnFamilyDescriptor::new(CF_IDEMPOTENCY, Options::default());

        let db: OptimisticTransactionDB = OptimisticTransactionDB::open_cf_descriptors(
            &opts,
            path,
            vec![cf_payments, cf_idempotency],
        )?;

        Ok(Self { db: Arc::new(db) })
    }

    fn cf(&self, name: &str) -> Result<&ColumnFamily> {
        self.db.cf_handle(name).ok_or_else(|| {
            PaymentError::StorageUnavailable(format!("column family '{name}' not found"))
        })
    }

    fn scan_payments(&self) -> Result<Vec<PaymentRecord>> {
        let cf = self.cf(CF_PAYMENTS)?;
        let mut payments = Vec::new();
        for item in self.db.iterator_cf(cf, IteratorMode::Start) {
            let (_key, value) = item?;
            payments.push(serde_json::from_slice(&value)?);
        }
        Ok(payments)
    }

    /// Runs `work` once in its own optimistic transaction.
    fn try_commit(&self, work: &mut TransactionWork<'_>) -> Result<()> {
        let txn = self.db.transaction();
        let writes = {
            let snapshot = TransactionSnapshot {
                store: self,
                txn: &txn,
            };
            let mut scope = StagedScope::new(&snapshot);
            work(&mut scope)?;
            scope.into_writes()
        };
        if writes.is_empty() {
            return Ok(());
        }

        let cf_payments = self.cf(CF_PAYMENTS)?;
        let cf_idempotency = self.cf(CF_IDEMPOTENCY)?;
        for (payment_id, record) in &writes.payments {
            txn.put_cf(cf_payments, payment_id.as_bytes(), serde_json::to_vec(record)?)?;
        }
        for (key, entry) in &writes.idempotency {
            txn.put_cf(cf_idempotency, key.as_bytes(), serde_json::to_vec(entry)?)?;
        }
        txn.commit()?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(bytes: Option<Vec<u8>>) -> Result<Option<T>> {
    match bytes {
        Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
        None => Ok(None),
    }
}

fn is_conflict(err: &PaymentError) -> bool {
    match err {
        PaymentError::RocksDb(e) => matches!(e.kind(), ErrorKind::Busy | ErrorKind::TryAgain),
        _ => false,
    }
}

/// Reads made inside an open transaction, tracked for conflict detection.
struct TransactionSnapshot<'s, 'db> {
    store: &'s RocksDBLedgerStore,
    txn: &'s Transaction<'db, OptimisticTransactionDB>,
}

impl LedgerSnapshot for TransactionSnapshot<'_, '_> {
    fn payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        let cf = self.store.cf(CF_PAYMENTS)?;
        decode(self.txn.get_for_update_cf(cf, payment_id.as_bytes(), true)?)
    }

    fn idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let cf = self.store.cf(CF_IDEMPOTENCY)?;
        decode(self.txn.get_for_update_cf(cf, key.as_bytes(), true)?)
    }
}

impl LedgerSnapshot for RocksDBLedgerStore {
    fn payment(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        let cf = self.cf(CF_PAYMENTS)?;
        decode(self.db.get_cf(cf, payment_id.as_bytes())?)
    }

    fn idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        let cf = self.cf(CF_IDEMPOTENCY)?;
        decode(self.db.get_cf(cf, key.as_bytes())?)
    }
}

#[async_trait]
impl LedgerStore for RocksDBLedgerStore {
    async fn transact(&self, work: &mut TransactionWork<'_>) -> Result<()> {
        let mut conflicts: u32 = 0;
        loop {
            match self.try_commit(work) {
                Err(err) if is_conflict(&err) && conflicts < MAX_CONFLICT_RETRIES => {
                    conflicts += 1;
                    debug!(conflicts, error = %err, "ledger transaction conflicted, re-running");
                }
                result => return result,
            }
        }
    }

    async fn get(&self, payment_id: &PaymentId) -> Result<Option<PaymentRecord>> {
        self.payment(payment_id)
    }

    async fn find_idempotency_record(&self, key: &str) -> Result<Option<IdempotencyRecord>> {
        self.idempotency_record(key)
    }

    async fn find_by_idempotency_key(&self, key: &str) -> Result<Option<PaymentRecord>> {
        match self.idempotency_record(key)? {
            Some(entry) => self.payment(&entry.payment_id),
            None => Ok(None),
        }
    }

    async fn pending(&self) -> Result<Vec<PaymentRecord>> {
        let mut pending: Vec<_> = self
            .scan_payments()?
            .into_iter()
            .filter(|p| p.status == PaymentStatus::Pending)
            .collect();
        pending.sort_by_key(|p| p.updated_at);
        Ok(pending)
    }

    async fn all(&self) -> Result<Vec<PaymentRecord>> {
        self.scan_payments()
    }
}
