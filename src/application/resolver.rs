use crate::domain::gateway::{GatewayStrategy, GatewayStrategyRef};
use crate::error::{PaymentError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Maps provider identifiers to gateway strategies.
///
/// Registration happens while building; afterwards the resolver is only read, so it can be
/// shared between tasks without locking.
#[derive(Clone, Default)]
pub struct GatewayResolver {
    strategies: HashMap<String, GatewayStrategyRef>,
}

impl GatewayResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `strategy` under `provider_id`, replacing any previous registration.
    pub fn register(
        mut self,
        provider_id: impl Into<String>,
        strategy: impl GatewayStrategy + 'static,
    ) -> Self {
        self.strategies.insert(provider_id.into(), Arc::new(strategy));
        self
    }

    pub fn register_shared(
        mut self,
        provider_id: impl Into<String>,
        strategy: GatewayStrategyRef,
    ) -> Self {
        self.strategies.insert(provider_id.into(), strategy);
        self
    }

    pub fn resolve(&self, provider_id: &str) -> Result<GatewayStrategyRef> {
        self.strategies
            .get(provider_id)
            .cloned()
            .ok_or_else(|| PaymentError::UnknownProvider(provider_id.to_string()))
    }

    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }
}
