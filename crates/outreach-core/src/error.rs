//! Error types for the outreach system

use thiserror::Error;

/// Main error type for all outreach operations
#[derive(Error, Debug)]
pub enum OutreachError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("File system error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Workflow error: {0}")]
    Workflow(String),

    #[error("Recipient suppressed: {0}")]
    Suppressed(String),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),
}

/// Result type for outreach operations
pub type Result<T> = std::result::Result<T, OutreachError>;
