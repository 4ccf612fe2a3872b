use crate::domain::payment::{PaymentId, PaymentStatus};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("invalid charge command: {0}")]
    InvalidCommand(String),
    #[error("unknown payment provider '{0}'")]
    UnknownProvider(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("payment {0} not found")]
    PaymentNotFound(PaymentId),
    #[error("payment {payment_id} cannot move from {from} to {to}")]
    InvalidTransition {
        payment_id: PaymentId,
        from: PaymentStatus,
        to: PaymentStatus,
    },
    #[error("idempotency key '{key}' is bound to payment {existing}, not {requested}")]
    IdempotencyConflict {
        key: String,
        existing: PaymentId,
        requested: PaymentId,
    },
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[cfg(feature = "storage-rocksdb")]
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),
    #[error("internal error: {0}")]
    Internal(String),
}

impl PaymentError {
    /// Whether a failed commit may succeed if attempted again unchanged.
    ///
    /// Corruption, permission and similar faults are not; retrying them would never end.
    pub fn is_transient(&self) -> bool {
        match self {
            PaymentError::StorageUnavailable(_) => true,
            PaymentError::Io(err) => matches!(
                err.kind(),
                std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::WouldBlock
            ),
            #[cfg(feature = "storage-rocksdb")]
            PaymentError::RocksDb(err) => matches!(
                err.kind(),
                rocksdb::ErrorKind::Busy
                    | rocksdb::ErrorKind::TryAgain
                    | rocksdb::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, PaymentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_recoverable_storage_errors_are_transient() {
        assert!(PaymentError::StorageUnavailable("disk full".into()).is_transient());
        assert!(PaymentError::Io(std::io::ErrorKind::TimedOut.into()).is_transient());
        assert!(!PaymentError::Io(std::io::ErrorKind::PermissionDenied.into()).is_transient());
        assert!(!PaymentError::Io(std::io::Error::other("bad sector")).is_transient());
        assert!(!PaymentError::InvalidCommand("amount".into()).is_transient());
        assert!(!PaymentError::UnknownProvider("nope".into()).is_transient());
        assert!(
            !PaymentError::InvalidTransition {
                payment_id: PaymentId::new(),
                from: PaymentStatus::Succeeded,
                to: PaymentStatus::Failed,
            }
            .is_transient()
        );
    }
}
