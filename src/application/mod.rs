//! Application layer containing the charge orchestration.
//!
//! `PaymentOrchestrator` is the entry point. It drives a charge through the gateway and records
//! the outcome through `TransactionManager`; `Reconciler` later settles whatever was left
//! Pending.

pub mod config;
pub mod middleware;
pub mod orchestrator;
pub mod reconciler;
pub mod resolver;
pub mod transaction;
