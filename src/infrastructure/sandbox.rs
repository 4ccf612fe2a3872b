use crate::domain::gateway::{GatewayOutcome, GatewayStrategy, StatusQuery, TransportError};
use crate::domain::payment::ChargeCommand;
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// Payer reference that is always declined.
pub const TOKEN_DECLINE: &str = "tok_decline";
/// Payer reference whose charge goes through but whose response never arrives.
pub const TOKEN_TIMEOUT: &str = "tok_timeout";
/// Payer reference that cannot reach the provider at all.
pub const TOKEN_UNREACHABLE: &str = "tok_unreachable";
/// Payer reference that is refused once before the provider can be reached.
pub const TOKEN_FLAKY: &str = "tok_flaky";

/// A simulated payment provider.
///
/// Outcomes are driven by the payer reference, in the spirit of test card tokens. The sandbox
/// remembers every charge that reached it by idempotency key, so repeating a charge or querying
/// its status gives a consistent answer.
#[derive(Clone)]
pub struct SandboxGateway {
    name: String,
    hang_for: Duration,
    charges: Arc<Mutex<HashMap<String, GatewayOutcome>>>,
    refused_once: Arc<Mutex<HashSet<String>>>,
    calls: Arc<AtomicU64>,
}

impl SandboxGateway {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            hang_for: Duration::from_secs(30),
            charges: Arc::default(),
            refused_once: Arc::default(),
            calls: Arc::default(),
        }
    }

    /// How long a `tok_timeout` charge stalls before answering.
    pub fn with_hang(mut self, hang_for: Duration) -> Self {
        self.hang_for = hang_for;
        self
    }

    /// Number of `charge` calls received, including refused ones.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn reference_for(&self, key: &str) -> String {
        format!("{}_{}", self.name, key)
    }
}

#[async_trait]
impl GatewayStrategy for SandboxGateway {
    fn name(&self) -> &str {
        &self.name
    }

    async fn charge(&self, command: &ChargeCommand) -> Result<GatewayOutcome, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let key = &command.idempotency_key;

        match command.payer_reference.as_str() {
            TOKEN_UNREACHABLE => {
                return Err(TransportError::ConnectionRefused(format!(
                    "{} is not accepting connections",
                    self.name
                )));
            }
            TOKEN_FLAKY => {
                if self.refused_once.lock().await.insert(key.clone()) {
                    return Err(TransportError::ConnectionRefused(format!(
                        "{} refused the first connection",
                        self.name
                    )));
                }
            }
            _ => {}
        }

        let outcome = {
            let mut charges = self.charges.lock().await;
            if let Some(previous) = charges.get(key) {
                return Ok(previous.clone());
            }
            let outcome = match command.payer_reference.as_str() {
                TOKEN_DECLINE => GatewayOutcome::Declined("card_declined".to_string()),
                _ => GatewayOutcome::Confirmed(self.reference_for(key)),
            };
            charges.insert(key.clone(), outcome.clone());
            outcome
        };

        if command.payer_reference == TOKEN_TIMEOUT {
            tokio::time::sleep(self.hang_for).await;
            return Err(TransportError::ConnectionReset(
                "response lost after the charge was accepted".to_string(),
            ));
        }
        Ok(outcome)
    }

    async fn query_status(&self, query: &StatusQuery) -> Result<GatewayOutcome, TransportError> {
        let charges = self.charges.lock().await;
        Ok(charges
            .get(&query.idempotency_key)
            .cloned()
            .unwrap_or_else(|| GatewayOutcome::Declined("no such charge".to_string())))
    }
}
