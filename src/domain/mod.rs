//! Domain layer: billing rules, the payment aggregate and the persistence port.

pub mod billing;
pub mod payment;
pub mod ports;
pub mod search;
