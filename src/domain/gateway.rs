use super::payment::ChargeCommand;
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result of one external charge attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    /// The provider moved the money.
    Confirmed(String),
    /// The provider refused the charge; no money moved.
    Declined(String),
    /// It is unknown whether money moved (timeout, 5xx, lost response).
    Ambiguous(String),
}

/// Failures of the transport underneath a strategy.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("DNS resolution failed: {0}")]
    DnsFailure(String),
    #[error("connection reset: {0}")]
    ConnectionReset(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

impl TransportError {
    /// True when the request provably never left the process.
    pub fn is_retry_safe(&self) -> bool {
        matches!(
            self,
            TransportError::ConnectionRefused(_) | TransportError::DnsFailure(_)
        )
    }
}

/// Lookup used by reconciliation to ask a provider what happened to a charge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusQuery {
    pub idempotency_key: String,
    pub provider_reference: Option<String>,
}

/// A payment provider integration.
///
/// Implementations must pass the command's idempotency key through to the provider so that a
/// repeated `charge` for the same key never moves money twice.
#[async_trait]
pub trait GatewayStrategy: Send + Sync {
    fn name(&self) -> &str;

    async fn charge(&self, command: &ChargeCommand) -> Result<GatewayOutcome, TransportError>;

    async fn query_status(&self, _query: &StatusQuery) -> Result<GatewayOutcome, TransportError> {
        Ok(GatewayOutcome::Ambiguous(
            "status query unsupported".to_string(),
        ))
    }
}

pub type GatewayStrategyRef = Arc<dyn GatewayStrategy>;
