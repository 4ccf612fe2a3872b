//! Adapters for the domain ports: ledger storage and the sandbox payment provider.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
pub mod sandbox;
