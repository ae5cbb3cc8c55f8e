//! Storage backends implementing the domain's `PaymentRepository` port.

pub mod in_memory;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
