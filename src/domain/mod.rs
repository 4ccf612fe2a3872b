//! Domain types and the ports the application layer talks through.

pub mod gateway;
pub mod idempotency;
pub mod payment;
pub mod ports;
pub mod unit_of_work;
