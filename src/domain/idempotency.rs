use super::payment::PaymentId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReservationState {
    /// A request holds the key and has not recorded a gateway outcome yet.
    Reserved,
    /// The gateway outcome (possibly Pending) is durably recorded.
    Completed,
}

/// Permanent mapping of an idempotency key to the payment it produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub idempotency_key: String,
    pub payment_id: PaymentId,
    pub first_seen_at: DateTime<Utc>,
    pub state: ReservationState,
}

impl IdempotencyRecord {
    pub fn reserved(key: &str, payment_id: PaymentId, now: DateTime<Utc>) -> Self {
        Self {
            idempotency_key: key.to_string(),
            payment_id,
            first_seen_at: now,
            state: ReservationState::Reserved,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.state == ReservationState::Completed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReservationOutcome {
    /// The caller now owns the key and must finalize it.
    New,
    /// Another request owns the key and is still talking to the gateway.
    InFlight(PaymentId),
    AlreadyCompleted(PaymentId),
}
