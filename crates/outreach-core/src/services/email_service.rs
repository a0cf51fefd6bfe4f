//! Email dispatch service
//! Renders templates, applies the unsubscribe footer and keeps the history ledger

use crate::clients::EmailGateway;
use crate::compliance::gate::ComplianceGate;
use crate::error::Result;
use crate::services::history::EmailHistoryStore;
use chrono::Utc;
use outreach_types::{
    EmailHistoryRecord, EmailSendRequest, EmailSendResult, EmailStatus, OutboundEmail,
};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Substitute `{{key}}` placeholders with their values
pub fn render_variables(text: &str, variables: &HashMap<String, String>) -> String {
    let mut rendered = text.to_string();
    for (key, value) in variables {
        rendered = rendered.replace(&format!("{{{{{}}}}}", key), value);
    }
    rendered
}

/// Outbound email pipeline: render, footer, dispatch, record
pub struct EmailService {
    gateway: Arc<dyn EmailGateway>,
    history: Arc<EmailHistoryStore>,
    gate: Arc<ComplianceGate>,
}

impl EmailService {
    pub fn new(
        gateway: Arc<dyn EmailGateway>,
        history: Arc<EmailHistoryStore>,
        gate: Arc<ComplianceGate>,
    ) -> Self {
        Self {
            gateway,
            history,
            gate,
        }
    }

    /// Render and send one email, recording the outcome in the history ledger
    ///
    /// A rejected or failed send is recorded with status "failed" and reported
    /// in the result; only ledger I/O problems surface as errors.
    pub async fn send_email(&self, request: &EmailSendRequest) -> Result<EmailSendResult> {
        let subject = render_variables(&request.subject, &request.variables);
        let content = render_variables(&request.content, &request.variables);

        let unsubscribe_link = self.gate.generate_unsubscribe_link(
            &request.to_email,
            request.workflow_id.as_deref(),
            request.template_id.as_deref(),
        );
        let content = self.gate.add_unsubscribe_footer(&content, &unsubscribe_link);

        let message = OutboundEmail {
            to_email: request.to_email.clone(),
            to_name: request.to_name.clone(),
            subject: subject.clone(),
            content: content.clone(),
        };

        match self.gateway.send(&message).await {
            Ok(message_id) => {
                let record = self.build_record(request, subject, content);
                let record = EmailHistoryRecord {
                    message_id: Some(message_id.clone()),
                    ..record
                };
                let record_id = record.id.clone();
                self.history.append(record)?;

                log::info!("Email sent successfully to {}", request.to_email);
                Ok(EmailSendResult {
                    success: true,
                    record_id: Some(record_id),
                    message_id: Some(message_id),
                    error_message: None,
                })
            }
            Err(e) => {
                log::error!("Error sending email to {}: {}", request.to_email, e);

                // The failed record keeps the raw subject and content
                let record = self.build_record(
                    request,
                    request.subject.clone(),
                    request.content.clone(),
                );
                let record = EmailHistoryRecord {
                    status: EmailStatus::Failed,
                    failed_at: Some(Utc::now()),
                    error_message: Some(e.to_string()),
                    ..record
                };
                let record_id = record.id.clone();
                self.history.append(record)?;

                Ok(EmailSendResult {
                    success: false,
                    record_id: Some(record_id),
                    message_id: None,
                    error_message: Some(e.to_string()),
                })
            }
        }
    }

    /// Re-dispatch a previously recorded email as it was rendered
    ///
    /// Used by the retry path; the stored content already carries the footer,
    /// so nothing is rendered again. On success the record's status and
    /// message id are refreshed.
    pub async fn resend_recorded(&self, record: &EmailHistoryRecord) -> Result<EmailSendResult> {
        let message = OutboundEmail {
            to_email: record.to_email.clone(),
            to_name: record.to_name.clone(),
            subject: record.subject.clone(),
            content: record.content.clone(),
        };

        match self.gateway.send(&message).await {
            Ok(message_id) => {
                self.history.record_resend(&record.id, &message_id)?;
                log::info!("Resent email {} to {}", record.id, record.to_email);
                Ok(EmailSendResult {
                    success: true,
                    record_id: Some(record.id.clone()),
                    message_id: Some(message_id),
                    error_message: None,
                })
            }
            Err(e) => {
                log::warn!("Resend failed for {} ({}): {}", record.id, record.to_email, e);
                Ok(EmailSendResult {
                    success: false,
                    record_id: Some(record.id.clone()),
                    message_id: None,
                    error_message: Some(e.to_string()),
                })
            }
        }
    }

    /// History bookkeeping hook used by webhook and bounce processing
    pub fn update_email_status(
        &self,
        email_id: &str,
        status: EmailStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        self.history.update_status(email_id, status, error_message)
    }

    fn build_record(
        &self,
        request: &EmailSendRequest,
        subject: String,
        content: String,
    ) -> EmailHistoryRecord {
        EmailHistoryRecord {
            id: format!("email_{}", Uuid::new_v4()),
            to_email: request.to_email.clone(),
            to_name: request.to_name.clone(),
            subject,
            content,
            template_id: request.template_id.clone(),
            workflow_id: request.workflow_id.clone(),
            lead_id: request.lead_id.clone(),
            message_id: None,
            status: EmailStatus::Sent,
            sent_at: Utc::now(),
            delivered_at: None,
            opened_at: None,
            clicked_at: None,
            bounced_at: None,
            failed_at: None,
            error_message: None,
        }
    }
}
