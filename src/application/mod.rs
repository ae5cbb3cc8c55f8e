//! Application layer orchestrating payment writes and billing queries.
//!
//! This module defines the `PaymentStore`, the single entry point the
//! attendance flow, the payment forms and the CLI go through.

pub mod store;
