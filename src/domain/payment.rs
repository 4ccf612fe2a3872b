use crate::error::{PaymentError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// System-generated identifier of a payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentId(Uuid);

impl PaymentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        self.0.as_bytes()
    }
}

impl Default for PaymentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for PaymentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    Pending,
    Succeeded,
    Failed,
}

impl PaymentStatus {
    /// Succeeded and Failed are final; only Pending may still change.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentStatus::Pending)
    }
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Succeeded => "succeeded",
            PaymentStatus::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// A caller's request to move money, identified by its idempotency key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeCommand {
    pub idempotency_key: String,
    pub provider: String,
    /// Amount in minor currency units (cents for USD).
    pub amount: i64,
    pub currency: String,
    pub payer_reference: String,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl ChargeCommand {
    pub fn new(
        idempotency_key: impl Into<String>,
        provider: impl Into<String>,
        amount: i64,
        currency: impl Into<String>,
        payer_reference: impl Into<String>,
    ) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            provider: provider.into(),
            amount,
            currency: currency.into(),
            payer_reference: payer_reference.into(),
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Checks the field-level invariants. Provider registration is checked separately.
    pub fn validate(&self) -> Result<()> {
        if self.idempotency_key.trim().is_empty() {
            return Err(PaymentError::InvalidCommand(
                "idempotency key must not be empty".to_string(),
            ));
        }
        if self.amount <= 0 {
            return Err(PaymentError::InvalidCommand(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        if self.currency.len() != 3 || !self.currency.bytes().all(|b| b.is_ascii_uppercase()) {
            return Err(PaymentError::InvalidCommand(format!(
                "currency must be a three-letter ISO code, got '{}'",
                self.currency
            )));
        }
        if self.provider.trim().is_empty() {
            return Err(PaymentError::InvalidCommand(
                "provider must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// One entry of a payment's audit trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusChange {
    pub status: PaymentStatus,
    pub at: DateTime<Utc>,
    pub detail: Option<String>,
}

/// Durable ledger entry for one logical charge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub payment_id: PaymentId,
    pub idempotency_key: String,
    pub provider: String,
    pub amount: i64,
    pub currency: String,
    pub payer_reference: String,
    pub metadata: BTreeMap<String, String>,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Append-only; the last entry always matches `status`.
    pub history: Vec<StatusChange>,
}

impl PaymentRecord {
    /// A fresh record in the Pending state, written before the gateway is contacted.
    pub fn pending(command: &ChargeCommand, payment_id: PaymentId, now: DateTime<Utc>) -> Self {
        Self {
            payment_id,
            idempotency_key: command.idempotency_key.clone(),
            provider: command.provider.clone(),
            amount: command.amount,
            currency: command.currency.clone(),
            payer_reference: command.payer_reference.clone(),
            metadata: command.metadata.clone(),
            status: PaymentStatus::Pending,
            provider_reference: None,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            history: vec![StatusChange {
                status: PaymentStatus::Pending,
                at: now,
                detail: Some("reserved".to_string()),
            }],
        }
    }

    /// Applies a status update, enforcing that terminal records never change.
    pub fn apply(&mut self, update: StatusUpdate, now: DateTime<Utc>) -> Result<()> {
        if self.status.is_terminal() {
            return Err(PaymentError::InvalidTransition {
                payment_id: self.payment_id,
                from: self.status,
                to: update.status,
            });
        }

        let detail = match update.status {
            PaymentStatus::Failed => {
                let reason = update.failure_reason.ok_or_else(|| {
                    PaymentError::Internal(format!(
                        "payment {} marked failed without a reason",
                        self.payment_id
                    ))
                })?;
                self.failure_reason = Some(reason.clone());
                Some(reason)
            }
            PaymentStatus::Succeeded => {
                self.failure_reason = None;
                None
            }
            PaymentStatus::Pending => update.note,
        };

        if update.provider_reference.is_some() {
            self.provider_reference = update.provider_reference;
        }
        self.status = update.status;
        self.updated_at = now;
        self.history.push(StatusChange {
            status: update.status,
            at: now,
            detail,
        });
        Ok(())
    }
}

/// Arguments of a ledger status update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    pub failure_reason: Option<String>,
    pub note: Option<String>,
}

impl StatusUpdate {
    pub fn succeeded(provider_reference: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Succeeded,
            provider_reference: Some(provider_reference.into()),
            failure_reason: None,
            note: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Failed,
            provider_reference: None,
            failure_reason: Some(reason.into()),
            note: None,
        }
    }

    /// Keeps the record Pending but notes why the outcome is unknown.
    pub fn pending(note: impl Into<String>) -> Self {
        Self {
            status: PaymentStatus::Pending,
            provider_reference: None,
            failure_reason: None,
            note: Some(note.into()),
        }
    }
}

/// What the caller of `charge` gets back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeResult {
    pub payment_id: PaymentId,
    pub status: PaymentStatus,
    pub provider_reference: Option<String>,
    /// Present iff `status` is Failed.
    pub failure_reason: Option<String>,
}

impl From<&PaymentRecord> for ChargeResult {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            payment_id: record.payment_id,
            status: record.status,
            provider_reference: record.provider_reference.clone(),
            failure_reason: match record.status {
                PaymentStatus::Failed => record.failure_reason.clone(),
                _ => None,
            },
        }
    }
}
