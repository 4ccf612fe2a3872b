use super::config::{StorageRetryPolicy, backoff_delay};
use crate::domain::ports::{LedgerStoreRef, TransactionScope};
use crate::error::{PaymentError, Result};
use tracing::{error, warn};

/// Runs units of work against the ledger.
///
/// Work closures are synchronous on purpose: nothing inside a scope can `.await`, so no network
/// call can ever hold a transaction open.
#[derive(Clone)]
pub struct TransactionManager {
    store: LedgerStoreRef,
    retry: StorageRetryPolicy,
}

impl TransactionManager {
    pub fn new(store: LedgerStoreRef, retry: StorageRetryPolicy) -> Self {
        Self { store, retry }
    }

    /// The underlying store, for reads that do not need a scope.
    pub fn store(&self) -> &LedgerStoreRef {
        &self.store
    }

    /// Runs `work` once. All of its writes commit together, or none do if it fails.
    pub async fn run_in_transaction<T, F>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(&mut dyn TransactionScope) -> Result<T> + Send,
        T: Send,
    {
        let mut output = None;
        self.store
            .transact(&mut |scope: &mut dyn TransactionScope| {
                output = Some(work(scope)?);
                Ok(())
            })
            .await?;
        output.ok_or_else(|| PaymentError::Internal("transaction committed without output".into()))
    }

    /// Like [`run_in_transaction`](Self::run_in_transaction), but retries transient storage
    /// failures with exponential backoff. `work` is re-run from scratch on every attempt.
    pub async fn commit_with_retry<T, F>(&self, mut work: F) -> Result<T>
    where
        F: FnMut(&mut dyn TransactionScope) -> Result<T> + Send,
        T: Send,
    {
        let mut attempt: u32 = 0;
        loop {
            let err = match self.run_in_transaction(&mut work).await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() => err,
                Err(err) => return Err(err),
            };
            attempt += 1;

            if let Some(max) = self.retry.max_attempts
                && attempt >= max
            {
                error!(attempts = attempt, error = %err, "giving up on ledger commit");
                return Err(PaymentError::StorageUnavailable(format!(
                    "commit failed after {attempt} attempts: {err}"
                )));
            }
            if attempt >= self.retry.alert_after {
                error!(
                    attempts = attempt,
                    error = %err,
                    "ledger commit still failing, operator attention required"
                );
            } else {
                warn!(attempts = attempt, error = %err, "ledger commit failed, retrying");
            }

            let delay = backoff_delay(self.retry.base_delay, self.retry.max_delay, attempt - 1);
            tokio::time::sleep(delay).await;
        }
    }
}
