//! Suppression and unsubscribe compliance module

pub mod gate;
pub mod types;

pub use gate::{normalize_email, ComplianceGate};
pub use types::*;
