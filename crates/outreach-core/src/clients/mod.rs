//! Client modules for external services

pub mod resend;

// Re-export all client types
pub use resend::{EmailGateway, ResendClient};
