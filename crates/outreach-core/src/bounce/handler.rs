//! Bounce and delivery failure handling
//! Classifies asynchronous delivery outcomes and decides retry vs. suppression

use crate::compliance::gate::{normalize_email, ComplianceGate};
use crate::compliance::types::SuppressionReason;
use crate::error::{OutreachError, Result};
use crate::paths;
use crate::services::history::EmailHistoryStore;
use super::types::*;
use outreach_types::EmailStatus;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use chrono::{Duration, Utc};

/// Soft bounces tolerated before the address is suppressed
pub const SOFT_BOUNCE_THRESHOLD: u32 = 5;

/// Retry budget for a failed send
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Delay before the first retry of a fresh failure
pub const FIRST_RETRY_DELAY_MINUTES: i64 = 5;

/// Ledger entries older than this are dropped by the retention sweep
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

/// Backoff before retry number `retry_count`; strictly grows with the count
pub fn retry_backoff(retry_count: u32) -> Duration {
    // Exponent is capped so the shift stays in range
    Duration::minutes(2_i64.pow(retry_count.min(20)))
}

/// Map free-text bounce reasons onto a bounce type; last-resort heuristic
fn classify_bounce_reason(reason: &str) -> BounceType {
    let lowered = reason.to_lowercase();
    if lowered.contains("soft") || lowered.contains("temporary") {
        BounceType::Soft
    } else if lowered.contains("complaint") || lowered.contains("spam") {
        BounceType::Complaint
    } else {
        BounceType::Hard
    }
}

/// Prefer the provider's structured classification over reason text
fn classify_bounce(data: &WebhookData, reason: &str) -> BounceType {
    if let Some(bounce) = &data.bounce {
        match bounce.classification.as_str() {
            "Permanent" => return BounceType::Hard,
            "Transient" => return BounceType::Soft,
            other => log::debug!("Unrecognized bounce classification: {}", other),
        }
    }

    classify_bounce_reason(reason)
}

fn webhook_details(event: &WebhookEvent) -> HashMap<String, serde_json::Value> {
    match serde_json::to_value(event) {
        Ok(serde_json::Value::Object(map)) => map.into_iter().collect(),
        _ => HashMap::new(),
    }
}

/// Handler over the bounce ledger and the delivery failure retry queue
pub struct BounceHandler {
    records_path: PathBuf,
    failures_path: PathBuf,
    gate: Arc<ComplianceGate>,
    history: Arc<EmailHistoryStore>,
}

impl BounceHandler {
    /// Create new BounceHandler rooted at the given data directory
    pub fn new<P: AsRef<Path>>(
        root_path: P,
        gate: Arc<ComplianceGate>,
        history: Arc<EmailHistoryStore>,
    ) -> Result<Self> {
        let bounces_dir = root_path.as_ref().join(paths::BOUNCES_DIR_NAME);
        fs::create_dir_all(&bounces_dir)?;

        Ok(Self {
            records_path: bounces_dir.join(paths::BOUNCE_RECORDS_FILE_NAME),
            failures_path: bounces_dir.join(paths::DELIVERY_FAILURES_FILE_NAME),
            gate,
            history,
        })
    }

    fn load_bounce_records(&self) -> Result<Vec<BounceRecord>> {
        if !self.records_path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.records_path)?;
        serde_json::from_str(&json).map_err(|e| {
            OutreachError::Deserialization(format!("Failed to deserialize bounce records: {}", e))
        })
    }

    fn save_bounce_records(&self, records: &[BounceRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records).map_err(|e| {
            OutreachError::Serialization(format!("Failed to serialize bounce records: {}", e))
        })?;

        fs::write(&self.records_path, json)?;
        Ok(())
    }

    fn load_delivery_failures(&self) -> Result<Vec<DeliveryFailure>> {
        if !self.failures_path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.failures_path)?;
        serde_json::from_str(&json).map_err(|e| {
            OutreachError::Deserialization(format!("Failed to deserialize delivery failures: {}", e))
        })
    }

    fn save_delivery_failures(&self, failures: &[DeliveryFailure]) -> Result<()> {
        let json = serde_json::to_string_pretty(failures).map_err(|e| {
            OutreachError::Serialization(format!("Failed to serialize delivery failures: {}", e))
        })?;

        fs::write(&self.failures_path, json)?;
        Ok(())
    }

    /// Record a bounce and suppress the address when the type warrants it
    ///
    /// Hard bounces and complaints suppress immediately. Soft bounces only
    /// suppress once the accumulated count reaches the threshold.
    pub fn handle_bounce(
        &self,
        email: &str,
        bounce_type: BounceType,
        bounce_reason: &str,
        message_id: Option<&str>,
        template_id: Option<&str>,
        workflow_id: Option<&str>,
        details: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<()> {
        let normalized = normalize_email(email);
        let mut records = self.load_bounce_records()?;

        let position = records.iter().position(|record| record.email == normalized);
        let bounce_count = if let Some(index) = position {
            let record = &mut records[index];
            record.record_bounce(bounce_type, bounce_reason.to_string(), details.clone());
            record.bounce_count
        } else {
            records.push(BounceRecord::new(
                normalized.clone(),
                bounce_type,
                bounce_reason.to_string(),
                message_id.map(String::from),
                template_id.map(String::from),
                workflow_id.map(String::from),
                details.clone().unwrap_or_default(),
            ));
            1
        };

        self.save_bounce_records(&records)?;

        let mut suppression_details = HashMap::new();
        suppression_details.insert("bounce_reason".to_string(), serde_json::json!(bounce_reason));
        suppression_details.insert(
            "bounce_type".to_string(),
            serde_json::json!(bounce_type.as_str()),
        );

        match bounce_type {
            BounceType::Hard => {
                self.gate.add_to_suppression_list(
                    &normalized,
                    SuppressionReason::Bounced,
                    "bounce_handler",
                    Some(suppression_details),
                )?;
                log::info!("Hard bounce handled - email suppressed: {}", normalized);
            }
            BounceType::Soft => {
                if bounce_count >= SOFT_BOUNCE_THRESHOLD {
                    self.gate.add_to_suppression_list(
                        &normalized,
                        SuppressionReason::Bounced,
                        "bounce_handler",
                        Some(suppression_details),
                    )?;
                    log::info!("Soft bounce limit reached - email suppressed: {}", normalized);
                }
            }
            BounceType::Complaint => {
                self.gate.add_to_suppression_list(
                    &normalized,
                    SuppressionReason::Complained,
                    "bounce_handler",
                    Some(suppression_details),
                )?;
                log::info!("Complaint handled - email suppressed: {}", normalized);
            }
            BounceType::Invalid => {
                log::debug!("Invalid address bounce recorded for {}", normalized);
            }
        }

        if let Some(message_id) = message_id {
            self.history
                .update_status(message_id, EmailStatus::Bounced, Some(bounce_reason))?;
        }

        log::info!("Bounce handled: {} ({})", normalized, bounce_type);
        Ok(())
    }

    /// Increment the retry counter, then reschedule or escalate to a hard bounce
    fn reschedule_or_escalate(&self, failure: &mut DeliveryFailure) -> Result<()> {
        failure.retry_count += 1;
        failure.failed_at = Utc::now();

        if failure.retries_exhausted() {
            failure.next_retry_at = None;
            self.handle_bounce(
                &failure.email,
                BounceType::Hard,
                &format!("Max retry attempts reached: {}", failure.failure_reason),
                failure.message_id.as_deref(),
                failure.template_id.as_deref(),
                failure.workflow_id.as_deref(),
                None,
            )?;
            log::info!(
                "Max retries reached - treating as hard bounce: {}",
                failure.email
            );
        } else {
            failure.next_retry_at = Some(Utc::now() + retry_backoff(failure.retry_count));
            log::info!(
                "Delivery failure - scheduled retry {}/{} for {}",
                failure.retry_count,
                failure.max_retries,
                failure.email
            );
        }

        Ok(())
    }

    /// Record a failed send attempt and schedule its retry
    ///
    /// The first failure for a (email, message) pair gets a fixed short delay;
    /// repeats back off exponentially until the retry budget runs out.
    pub fn handle_delivery_failure(
        &self,
        email: &str,
        failure_reason: &str,
        message_id: Option<&str>,
        template_id: Option<&str>,
        workflow_id: Option<&str>,
        details: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<()> {
        let normalized = normalize_email(email);
        let mut failures = self.load_delivery_failures()?;

        let position = failures.iter().position(|failure| {
            failure.email == normalized && failure.message_id.as_deref() == message_id
        });

        if let Some(index) = position {
            let failure = &mut failures[index];
            failure.failure_reason = failure_reason.to_string();
            if let Some(details) = details {
                failure.details = details;
            }
            self.reschedule_or_escalate(failure)?;
        } else {
            failures.push(DeliveryFailure::new(
                normalized.clone(),
                failure_reason.to_string(),
                message_id.map(String::from),
                template_id.map(String::from),
                workflow_id.map(String::from),
                DEFAULT_MAX_RETRIES,
                Utc::now() + Duration::minutes(FIRST_RETRY_DELAY_MINUTES),
                details.unwrap_or_default(),
            ));
            log::info!("New delivery failure recorded for {}", normalized);
        }

        self.save_delivery_failures(&failures)?;

        if let Some(message_id) = message_id {
            self.history
                .update_status(message_id, EmailStatus::Failed, Some(failure_reason))?;
        }

        Ok(())
    }

    /// The retry work queue: failures whose scheduled retry time has arrived
    pub fn get_emails_for_retry(&self) -> Result<Vec<DeliveryFailure>> {
        let now = Utc::now();
        let mut due: Vec<DeliveryFailure> = self
            .load_delivery_failures()?
            .into_iter()
            .filter(|failure| failure.is_retry_due(now))
            .collect();

        due.sort_by_key(|failure| failure.next_retry_at);
        Ok(due)
    }

    /// Record the outcome of one retry attempt
    ///
    /// Success removes the failure record. Failure applies the same
    /// backoff-or-escalate logic as a fresh delivery failure. Returns false
    /// when no record matches the (email, message) pair.
    pub fn mark_retry_completed(
        &self,
        email: &str,
        message_id: Option<&str>,
        success: bool,
    ) -> Result<bool> {
        let normalized = normalize_email(email);
        let mut failures = self.load_delivery_failures()?;

        let position = failures.iter().position(|failure| {
            failure.email == normalized && failure.message_id.as_deref() == message_id
        });

        let index = match position {
            Some(index) => index,
            None => {
                log::debug!("No delivery failure on record for {}", normalized);
                return Ok(false);
            }
        };

        if success {
            failures.remove(index);
            log::info!("Retry successful - removed from failures: {}", normalized);
        } else {
            self.reschedule_or_escalate(&mut failures[index])?;
        }

        self.save_delivery_failures(&failures)?;
        Ok(true)
    }

    /// Route a provider webhook event onto the bounce/failure handlers
    ///
    /// Returns false for events with no usable recipient and for event types
    /// this handler does not consume.
    pub fn process_webhook_event(&self, event: &WebhookEvent) -> Result<bool> {
        let email = match event.data.to.first() {
            Some(recipient) => recipient.email.clone(),
            None => {
                log::warn!("No email found in webhook data ({})", event.event_type);
                return Ok(false);
            }
        };

        let message_id = event.data.id.as_deref();
        let details = webhook_details(event);

        match event.event_type.as_str() {
            "email.bounced" => {
                let reason = event
                    .data
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Unknown bounce reason".to_string());
                let bounce_type = classify_bounce(&event.data, &reason);

                self.handle_bounce(
                    &email,
                    bounce_type,
                    &reason,
                    message_id,
                    None,
                    None,
                    Some(details),
                )?;
            }
            "email.delivery_delayed" => {
                let reason = event
                    .data
                    .reason
                    .clone()
                    .unwrap_or_else(|| "Delivery delayed".to_string());

                self.handle_delivery_failure(
                    &email,
                    &reason,
                    message_id,
                    None,
                    None,
                    Some(details),
                )?;
            }
            "email.complained" => {
                self.handle_bounce(
                    &email,
                    BounceType::Complaint,
                    "Spam complaint",
                    message_id,
                    None,
                    None,
                    Some(details),
                )?;
            }
            other => {
                log::debug!("Ignoring webhook event type: {}", other);
                return Ok(false);
            }
        }

        Ok(true)
    }

    /// Retention sweep: drop ledger entries older than the cutoff
    ///
    /// Suppression entries are untouched; an address stays blocked even after
    /// its bounce history ages out.
    pub fn cleanup_old_records(&self, days_old: i64) -> Result<CleanupOutcome> {
        let cutoff = Utc::now() - Duration::days(days_old);

        let mut records = self.load_bounce_records()?;
        let original_bounce_count = records.len();
        records.retain(|record| record.last_bounce_at > cutoff);
        self.save_bounce_records(&records)?;

        let mut failures = self.load_delivery_failures()?;
        let original_failure_count = failures.len();
        failures.retain(|failure| failure.failed_at > cutoff);
        self.save_delivery_failures(&failures)?;

        let outcome = CleanupOutcome {
            cleaned_bounces: original_bounce_count - records.len(),
            cleaned_failures: original_failure_count - failures.len(),
            remaining_bounces: records.len(),
            remaining_failures: failures.len(),
        };

        log::info!(
            "Cleaned up {} bounce records and {} failure records",
            outcome.cleaned_bounces,
            outcome.cleaned_failures
        );
        Ok(outcome)
    }

    /// Bounce records, most recently bounced first
    pub fn get_bounce_records(&self, limit: usize, offset: usize) -> Result<Vec<BounceRecord>> {
        let mut records = self.load_bounce_records()?;
        records.sort_by(|a, b| b.last_bounce_at.cmp(&a.last_bounce_at));

        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    /// Delivery failures, most recently failed first
    pub fn get_delivery_failures(&self, limit: usize, offset: usize) -> Result<Vec<DeliveryFailure>> {
        let mut failures = self.load_delivery_failures()?;
        failures.sort_by(|a, b| b.failed_at.cmp(&a.failed_at));

        Ok(failures.into_iter().skip(offset).take(limit).collect())
    }

    /// Aggregate counters; storage problems degrade to zeroes
    pub fn get_bounce_stats(&self) -> BounceStats {
        let records = self.load_bounce_records().unwrap_or_else(|e| {
            log::warn!("Failed to load bounce records for stats: {}", e);
            Vec::new()
        });
        let failures = self.load_delivery_failures().unwrap_or_else(|e| {
            log::warn!("Failed to load delivery failures for stats: {}", e);
            Vec::new()
        });

        let now = Utc::now();
        let count_type = |bounce_type: BounceType| {
            records
                .iter()
                .filter(|record| record.bounce_type == bounce_type)
                .count()
        };

        BounceStats {
            total_bounces: records.len(),
            hard_bounces: count_type(BounceType::Hard),
            soft_bounces: count_type(BounceType::Soft),
            complaints: count_type(BounceType::Complaint),
            recent_bounces: records
                .iter()
                .filter(|record| now - record.last_bounce_at < Duration::hours(24))
                .count(),
            total_failures: failures.len(),
            pending_retries: failures
                .iter()
                .filter(|failure| failure.next_retry_at.map_or(false, |due| due > now))
                .count(),
            failed_retries: failures
                .iter()
                .filter(|failure| failure.retries_exhausted())
                .count(),
            // Fixed estimate until send volume is tracked alongside bounces
            bounce_rate: 0.03,
            top_bounce_reasons: Self::top_bounce_reasons(&records),
        }
    }

    fn top_bounce_reasons(records: &[BounceRecord]) -> Vec<BounceReasonCount> {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for record in records {
            *counts.entry(record.bounce_reason.as_str()).or_insert(0) += 1;
        }

        let mut reasons: Vec<BounceReasonCount> = counts
            .into_iter()
            .map(|(reason, count)| BounceReasonCount {
                reason: reason.to_string(),
                count,
            })
            .collect();

        reasons.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.reason.cmp(&b.reason)));
        reasons.truncate(10);
        reasons
    }
}
