use super::orchestrator::PaymentOrchestrator;
use crate::domain::payment::{ChargeCommand, ChargeResult};
use crate::error::Result;
use async_trait::async_trait;
use std::time::Instant;
use tracing::{Instrument, info, info_span, warn};

/// Anything that can take a charge command. Wrappers compose around it.
#[async_trait]
pub trait ChargeHandler: Send + Sync {
    async fn charge(&self, command: ChargeCommand) -> Result<ChargeResult>;
}

#[async_trait]
impl ChargeHandler for PaymentOrchestrator {
    async fn charge(&self, command: ChargeCommand) -> Result<ChargeResult> {
        PaymentOrchestrator::charge(self, command).await
    }
}

/// Runs the wrapped handler inside a `charge` span and logs how each call ended.
pub struct Traced<H> {
    inner: H,
}

impl<H: ChargeHandler> Traced<H> {
    pub fn new(inner: H) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<H: ChargeHandler> ChargeHandler for Traced<H> {
    async fn charge(&self, command: ChargeCommand) -> Result<ChargeResult> {
        let span = info_span!(
            "charge",
            key = %command.idempotency_key,
            provider = %command.provider,
            amount = command.amount,
            currency = %command.currency,
        );
        let started = Instant::now();
        let result = self.inner.charge(command).instrument(span.clone()).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        span.in_scope(|| match &result {
            Ok(charge) => info!(
                payment_id = %charge.payment_id,
                status = %charge.status,
                elapsed_ms,
                "charge finished"
            ),
            Err(err) => warn!(error = %err, elapsed_ms, "charge rejected"),
        });
        result
    }
}
