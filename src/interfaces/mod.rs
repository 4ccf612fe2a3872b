//! Batch interfaces used by the command-line driver.

pub mod csv;
