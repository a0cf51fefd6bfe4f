//! Persistent ledger of every email the system has sent or tried to send

use crate::error::{OutreachError, Result};
use crate::paths;
use outreach_types::{EmailHistoryRecord, EmailStatus};
use std::fs;
use std::path::{Path, PathBuf};
use chrono::Utc;

/// File-backed append-mostly store for email history records
pub struct EmailHistoryStore {
    history_path: PathBuf,
}

impl EmailHistoryStore {
    /// Create new EmailHistoryStore rooted at the given data directory
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let history_dir = root_path.as_ref().join(paths::HISTORY_DIR_NAME);
        fs::create_dir_all(&history_dir)?;

        Ok(Self {
            history_path: history_dir.join(paths::EMAIL_HISTORY_FILE_NAME),
        })
    }

    fn load(&self) -> Result<Vec<EmailHistoryRecord>> {
        if !self.history_path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.history_path)?;
        serde_json::from_str(&json).map_err(|e| {
            OutreachError::Deserialization(format!("Failed to deserialize email history: {}", e))
        })
    }

    fn save(&self, records: &[EmailHistoryRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records).map_err(|e| {
            OutreachError::Serialization(format!("Failed to serialize email history: {}", e))
        })?;

        fs::write(&self.history_path, json)?;
        Ok(())
    }

    /// Append one record to the ledger
    pub fn append(&self, record: EmailHistoryRecord) -> Result<()> {
        let mut records = self.load()?;
        records.push(record);
        self.save(&records)
    }

    /// Update a record matched by its own id or the provider message id
    ///
    /// Stamps the timestamp column matching the new status. Returns false
    /// when no record matches.
    pub fn update_status(
        &self,
        email_id: &str,
        status: EmailStatus,
        error_message: Option<&str>,
    ) -> Result<bool> {
        let mut records = self.load()?;

        let record = records.iter_mut().find(|record| {
            record.id == email_id || record.message_id.as_deref() == Some(email_id)
        });

        if let Some(record) = record {
            record.status = status;
            let now = Utc::now();
            match status {
                EmailStatus::Delivered => record.delivered_at = Some(now),
                EmailStatus::Opened => record.opened_at = Some(now),
                EmailStatus::Clicked => record.clicked_at = Some(now),
                EmailStatus::Bounced => record.bounced_at = Some(now),
                EmailStatus::Failed => record.failed_at = Some(now),
                EmailStatus::Sent => {}
            }
            if let Some(error_message) = error_message {
                record.error_message = Some(error_message.to_string());
            }
        } else {
            log::debug!("No email history record matches {}", email_id);
            return Ok(false);
        }

        self.save(&records)?;
        log::info!("Updated email status: {} -> {:?}", email_id, status);
        Ok(true)
    }

    /// Point a record at a new provider message id after a successful resend
    ///
    /// Resets the record to "sent" and clears the previous failure marks so
    /// later webhook events key off the fresh message id.
    pub fn record_resend(&self, record_id: &str, message_id: &str) -> Result<bool> {
        let mut records = self.load()?;

        let record = records.iter_mut().find(|record| record.id == record_id);
        let record = match record {
            Some(record) => record,
            None => {
                log::debug!("No email history record matches {}", record_id);
                return Ok(false);
            }
        };

        record.message_id = Some(message_id.to_string());
        record.status = EmailStatus::Sent;
        record.sent_at = Utc::now();
        record.failed_at = None;
        record.error_message = None;

        self.save(&records)?;
        log::info!("Recorded resend for {} (message id {})", record_id, message_id);
        Ok(true)
    }

    /// Look up the record for a provider message id
    pub fn find_by_message_id(&self, message_id: &str) -> Result<Option<EmailHistoryRecord>> {
        let records = self.load()?;

        Ok(records
            .into_iter()
            .find(|record| record.message_id.as_deref() == Some(message_id)))
    }

    /// History page, newest first
    pub fn get_history(&self, limit: usize, offset: usize) -> Result<Vec<EmailHistoryRecord>> {
        let mut records = self.load()?;
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    /// Every email sent to one lead, newest first
    pub fn for_lead(&self, lead_id: &str) -> Result<Vec<EmailHistoryRecord>> {
        let mut records: Vec<EmailHistoryRecord> = self
            .load()?
            .into_iter()
            .filter(|record| record.lead_id.as_deref() == Some(lead_id))
            .collect();
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

        Ok(records)
    }

    /// Every email a workflow has produced, newest first
    pub fn for_workflow(&self, workflow_id: &str) -> Result<Vec<EmailHistoryRecord>> {
        let mut records: Vec<EmailHistoryRecord> = self
            .load()?
            .into_iter()
            .filter(|record| record.workflow_id.as_deref() == Some(workflow_id))
            .collect();
        records.sort_by(|a, b| b.sent_at.cmp(&a.sent_at));

        Ok(records)
    }
}
