//! Concurrency isolation.
//!
//! A bulkhead caps the number of operations of one class that run at once,
//! so a slow dependency cannot absorb every task in the process.

#[allow(clippy::module_inception)]
mod bulkhead;

pub use bulkhead::{Bulkhead, BulkheadConfig, BulkheadMetrics, BulkheadPermit};
