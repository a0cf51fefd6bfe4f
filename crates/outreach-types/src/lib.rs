//! Shared types for the outreach automation system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Lead lifecycle status as tracked by the call system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    New,
    Called,
    Booked,
    Callback,
    NotAnswered,
    Failed,
}

impl Default for LeadStatus {
    fn default() -> Self {
        LeadStatus::New
    }
}

/// Where a lead entered the system
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LeadSource {
    LandingPage,
    CallSystem,
    Import,
    Manual,
}

impl LeadSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeadSource::LandingPage => "landing_page",
            LeadSource::CallSystem => "call_system",
            LeadSource::Import => "import",
            LeadSource::Manual => "manual",
        }
    }
}

impl Default for LeadSource {
    fn default() -> Self {
        LeadSource::Manual
    }
}

/// Progressive form completion state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Incomplete,
    Partial,
    Complete,
}

impl CompletionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CompletionStatus::Incomplete => "incomplete",
            CompletionStatus::Partial => "partial",
            CompletionStatus::Complete => "complete",
        }
    }
}

impl Default for CompletionStatus {
    fn default() -> Self {
        CompletionStatus::Incomplete
    }
}

/// Validation failures for lead records
#[derive(Error, Debug, PartialEq)]
pub enum LeadValidationError {
    #[error("Lead name is required")]
    MissingName,

    #[error("Phone number must contain 10-15 digits: {0}")]
    InvalidPhone(String),

    #[error("Invalid email address: {0}")]
    InvalidEmail(String),
}

/// Unified lead record covering landing-page and call-system leads
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    pub id: String,
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub email: Option<String>,

    #[serde(default)]
    pub status: LeadStatus,
    #[serde(default)]
    pub source: LeadSource,
    #[serde(default)]
    pub completion_status: CompletionStatus,

    // Landing page qualification fields
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub monthly_revenue: Option<String>,
    #[serde(default)]
    pub marketing_budget: Option<String>,
    #[serde(default)]
    pub pain_point: Option<String>,
    #[serde(default)]
    pub qualified: Option<bool>,
    #[serde(default)]
    pub niche: Option<String>,

    // Call system fields
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub last_call_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub notes: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Create a new lead with a generated id and current timestamps
    pub fn new(name: String, phone_number: String, email: Option<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4().to_string(),
            name,
            phone_number,
            email,
            status: LeadStatus::default(),
            source: LeadSource::default(),
            completion_status: CompletionStatus::default(),
            first_name: None,
            last_name: None,
            monthly_revenue: None,
            marketing_budget: None,
            pain_point: None,
            qualified: None,
            niche: None,
            timezone: None,
            last_call_time: None,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check core field constraints before persisting
    pub fn validate(&self) -> std::result::Result<(), LeadValidationError> {
        if self.name.trim().is_empty() {
            return Err(LeadValidationError::MissingName);
        }

        let digit_count = self.phone_number.chars().filter(|c| c.is_ascii_digit()).count();
        if !(10..=15).contains(&digit_count) {
            return Err(LeadValidationError::InvalidPhone(self.phone_number.clone()));
        }

        if let Some(email) = &self.email {
            let mut parts = email.splitn(2, '@');
            let local = parts.next().unwrap_or("");
            let domain = parts.next().unwrap_or("");
            if local.is_empty() || domain.is_empty() || !domain.contains('.') {
                return Err(LeadValidationError::InvalidEmail(email.clone()));
            }
        }

        Ok(())
    }

    /// Name used in email greetings: first name when present, full name otherwise
    pub fn greeting_name(&self) -> &str {
        self.first_name.as_deref().unwrap_or(&self.name)
    }
}

/// Email template with `{{variable}}` placeholders in subject and content
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailTemplate {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Delivery status of a sent email, updated by webhook events
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmailStatus {
    Sent,
    Delivered,
    Opened,
    Clicked,
    Bounced,
    Failed,
}

/// One entry in the email history ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailHistoryRecord {
    pub id: String,
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
    /// Provider-assigned message id, present when the send was accepted
    #[serde(default)]
    pub message_id: Option<String>,
    pub status: EmailStatus,
    pub sent_at: DateTime<Utc>,
    #[serde(default)]
    pub delivered_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub opened_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub clicked_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub bounced_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Request to send one email through the email service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSendRequest {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub template_id: Option<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub lead_id: Option<String>,
    #[serde(default)]
    pub variables: std::collections::HashMap<String, String>,
}

/// Outcome of an email service send
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EmailSendResult {
    pub success: bool,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub message_id: Option<String>,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// A rendered message handed to the dispatch gateway
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundEmail {
    pub to_email: String,
    pub to_name: String,
    pub subject: String,
    pub content: String,
}

/// Trigger request dropped into the triggers directory or issued manually
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerRequest {
    pub trigger_id: String,
    pub lead_id: String,
    /// Trigger a specific workflow directly
    #[serde(default)]
    pub workflow_id: Option<String>,
    /// Or fan out to every active workflow with this trigger type
    #[serde(default)]
    pub trigger_type: Option<String>,
    pub requested_at: DateTime<Utc>,
}

impl TriggerRequest {
    pub fn for_workflow(workflow_id: String, lead_id: String) -> Self {
        Self {
            trigger_id: Uuid::new_v4().to_string(),
            lead_id,
            workflow_id: Some(workflow_id),
            trigger_type: None,
            requested_at: Utc::now(),
        }
    }

    pub fn for_trigger_type(trigger_type: String, lead_id: String) -> Self {
        Self {
            trigger_id: Uuid::new_v4().to_string(),
            lead_id,
            workflow_id: None,
            trigger_type: Some(trigger_type),
            requested_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lead_validation() {
        let mut lead = Lead::new("Jane Smith".to_string(), "+1 555 123 4567".to_string(), None);
        assert!(lead.validate().is_ok());

        lead.email = Some("jane@example.com".to_string());
        assert!(lead.validate().is_ok());

        lead.email = Some("not-an-email".to_string());
        assert_eq!(
            lead.validate(),
            Err(LeadValidationError::InvalidEmail("not-an-email".to_string()))
        );

        lead.email = None;
        lead.phone_number = "12345".to_string();
        assert!(matches!(lead.validate(), Err(LeadValidationError::InvalidPhone(_))));
    }

    #[test]
    fn test_trigger_request_construction() {
        let trigger = TriggerRequest::for_trigger_type("new_lead".to_string(), "lead-1".to_string());
        assert_eq!(trigger.trigger_type.as_deref(), Some("new_lead"));
        assert!(trigger.workflow_id.is_none());
        assert!(!trigger.trigger_id.is_empty());
    }
}
