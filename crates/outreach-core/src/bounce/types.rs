//! Bounce ledger and delivery failure types

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use chrono::{DateTime, Utc};

/// How badly a delivery went wrong
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BounceType {
    Hard,
    Soft,
    Complaint,
    Invalid,
}

impl BounceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hard => "hard",
            Self::Soft => "soft",
            Self::Complaint => "complaint",
            Self::Invalid => "invalid",
        }
    }

    pub fn from_string(s: &str) -> Result<Self, String> {
        match s {
            "hard" => Ok(Self::Hard),
            "soft" => Ok(Self::Soft),
            "complaint" => Ok(Self::Complaint),
            "invalid" => Ok(Self::Invalid),
            other => Err(format!("Unknown bounce type: {}", other)),
        }
    }
}

impl fmt::Display for BounceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Accumulated bounce history for one address; the email is the natural key
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BounceRecord {
    pub email: String,
    pub bounce_type: BounceType,
    pub bounce_reason: String,
    /// First bounce ever seen for this address
    pub bounced_at: DateTime<Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub bounce_count: u32,
    pub last_bounce_at: DateTime<Utc>,
    pub delivery_attempts: u32,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl BounceRecord {
    pub fn new(
        email: String,
        bounce_type: BounceType,
        bounce_reason: String,
        message_id: Option<String>,
        template_id: Option<String>,
        workflow_id: Option<String>,
        details: HashMap<String, serde_json::Value>,
    ) -> Self {
        let now = Utc::now();
        Self {
            email,
            bounce_type,
            bounce_reason,
            bounced_at: now,
            message_id,
            template_id,
            workflow_id,
            bounce_count: 1,
            last_bounce_at: now,
            delivery_attempts: 1,
            details,
        }
    }

    /// Fold a repeat bounce into the record; the count only ever grows
    pub fn record_bounce(
        &mut self,
        bounce_type: BounceType,
        bounce_reason: String,
        details: Option<HashMap<String, serde_json::Value>>,
    ) {
        self.bounce_count += 1;
        self.delivery_attempts += 1;
        self.last_bounce_at = Utc::now();
        self.bounce_type = bounce_type;
        self.bounce_reason = bounce_reason;
        if let Some(details) = details {
            self.details = details;
        }
    }
}

/// One failed send attempt; keyed by (email, message id)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryFailure {
    pub email: String,
    pub failure_reason: String,
    pub failed_at: DateTime<Utc>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub retry_count: u32,
    /// None means no further retry is scheduled
    pub next_retry_at: Option<DateTime<Utc>>,
    pub max_retries: u32,
    #[serde(default)]
    pub details: HashMap<String, serde_json::Value>,
}

impl DeliveryFailure {
    pub fn new(
        email: String,
        failure_reason: String,
        message_id: Option<String>,
        template_id: Option<String>,
        workflow_id: Option<String>,
        max_retries: u32,
        first_retry_at: DateTime<Utc>,
        details: HashMap<String, serde_json::Value>,
    ) -> Self {
        Self {
            email,
            failure_reason,
            failed_at: Utc::now(),
            message_id,
            template_id,
            workflow_id,
            retry_count: 0,
            next_retry_at: Some(first_retry_at),
            max_retries,
            details,
        }
    }

    /// Whether this failure is waiting in the retry queue right now
    pub fn is_retry_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_count < self.max_retries
            && self.next_retry_at.map_or(false, |due| due <= now)
    }

    /// Whether every allowed retry has been spent
    pub fn retries_exhausted(&self) -> bool {
        self.retry_count >= self.max_retries
    }
}

/// Count of one distinct bounce reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BounceReasonCount {
    pub reason: String,
    pub count: usize,
}

/// Aggregate bounce and retry statistics
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BounceStats {
    pub total_bounces: usize,
    pub hard_bounces: usize,
    pub soft_bounces: usize,
    pub complaints: usize,
    pub recent_bounces: usize,
    pub total_failures: usize,
    pub pending_retries: usize,
    pub failed_retries: usize,
    pub bounce_rate: f64,
    pub top_bounce_reasons: Vec<BounceReasonCount>,
}

/// Outcome of a retention sweep over both ledgers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CleanupOutcome {
    pub cleaned_bounces: usize,
    pub cleaned_failures: usize,
    pub remaining_bounces: usize,
    pub remaining_failures: usize,
}

/// Delivery event pushed by the email provider
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: WebhookData,
}

/// Payload section of a provider event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookData {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub to: Vec<WebhookRecipient>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub bounce: Option<WebhookBounce>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookRecipient {
    pub email: String,
}

/// Structured bounce classification, authoritative over reason text
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookBounce {
    #[serde(rename = "type")]
    pub classification: String,
    #[serde(default, rename = "subType")]
    pub sub_type: Option<String>,
}
