//! Suppression and unsubscribe record types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use chrono::{DateTime, Utc};

/// Why an address may no longer be emailed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuppressionReason {
    Unsubscribed,
    Bounced,
    Complained,
    Invalid,
    Manual,
    Imported,
}

impl SuppressionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsubscribed => "unsubscribed",
            Self::Bounced => "bounced",
            Self::Complained => "complained",
            Self::Invalid => "invalid",
            Self::Manual => "manual",
            Self::Imported => "imported",
        }
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        match s {
            "unsubscribed" => Ok(Self::Unsubscribed),
            "bounced" => Ok(Self::Bounced),
            "complained" => Ok(Self::Complained),
            "invalid" => Ok(Self::Invalid),
            "manual" => Ok(Self::Manual),
            "imported" => Ok(Self::Imported),
            other => Err(format!("Unknown suppression reason: {}", other)),
        }
    }
}

impl fmt::Display for SuppressionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One suppressed address; the normalized email is the natural key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuppressionEntry {
    pub email: String,
    pub reason: SuppressionReason,
    pub source: String,
    pub added_at: DateTime<Utc>,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl SuppressionEntry {
    pub fn new(
        email: String,
        reason: SuppressionReason,
        source: String,
        details: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            email,
            reason,
            source,
            added_at: Utc::now(),
            details,
        }
    }
}

/// Audit trail entry; one per unsubscribe event, never deduplicated
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnsubscribeRecord {
    pub email: String,
    pub unsubscribed_at: DateTime<Utc>,
    #[serde(default)]
    pub reason: Option<String>,
    pub source: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub ip_address: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
}

/// Verified contents of an unsubscribe token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub email: String,
    pub timestamp: i64,
}

/// Aggregate compliance counters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ComplianceStats {
    pub total_suppressed: usize,
    pub total_unsubscribed: usize,
    pub total_bounced: usize,
    pub total_complained: usize,
    pub suppression_reasons: HashMap<String, usize>,
    pub recent_unsubscribes: usize,
    pub unsubscribe_rate: f64,
}

/// Result of a bulk suppression import
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkImportOutcome {
    pub added: usize,
    pub skipped: usize,
    pub total: usize,
}
