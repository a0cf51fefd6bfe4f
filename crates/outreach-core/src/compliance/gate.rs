//! Suppression gate and unsubscribe handling
//! Single source of truth for whether an address may be emailed

use crate::config::ComplianceConfig;
use crate::error::{OutreachError, Result};
use crate::paths;
use super::types::*;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use base64::{engine::general_purpose, Engine as _};
use chrono::{Duration, Utc};
use sha2::{Digest, Sha256};

/// Tokens older than this are rejected regardless of signature
pub const TOKEN_MAX_AGE_SECS: i64 = 30 * 24 * 60 * 60;

/// Canonical form used for all suppression comparisons
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Truncated digest binding an email and issue time to the secret
fn sign_token(email: &str, timestamp: i64, secret: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(format!("{}:{}:{}", email, timestamp, secret).as_bytes());
    let digest = hasher.finalize();

    let mut hex = String::with_capacity(16);
    for byte in digest.iter().take(8) {
        hex.push_str(&format!("{:02x}", byte));
    }
    hex
}

/// Gate over the suppression list plus the unsubscribe audit trail
pub struct ComplianceGate {
    suppression_path: PathBuf,
    unsubscribe_path: PathBuf,
    unsubscribe_secret: String,
    frontend_url: String,
}

impl ComplianceGate {
    /// Create new ComplianceGate rooted at the given data directory
    pub fn new<P: AsRef<Path>>(root_path: P, config: &ComplianceConfig) -> Result<Self> {
        let compliance_dir = root_path.as_ref().join(paths::COMPLIANCE_DIR_NAME);
        fs::create_dir_all(&compliance_dir)?;

        Ok(Self {
            suppression_path: compliance_dir.join(paths::SUPPRESSION_FILE_NAME),
            unsubscribe_path: compliance_dir.join(paths::UNSUBSCRIBE_FILE_NAME),
            unsubscribe_secret: config.unsubscribe_secret.clone(),
            frontend_url: config.frontend_url.clone(),
        })
    }

    fn load_suppression_list(&self) -> Result<Vec<SuppressionEntry>> {
        if !self.suppression_path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.suppression_path)?;
        serde_json::from_str(&json).map_err(|e| {
            OutreachError::Deserialization(format!("Failed to deserialize suppression list: {}", e))
        })
    }

    fn save_suppression_list(&self, entries: &[SuppressionEntry]) -> Result<()> {
        let json = serde_json::to_string_pretty(entries).map_err(|e| {
            OutreachError::Serialization(format!("Failed to serialize suppression list: {}", e))
        })?;

        fs::write(&self.suppression_path, json)?;
        Ok(())
    }

    fn load_unsubscribe_records(&self) -> Result<Vec<UnsubscribeRecord>> {
        if !self.unsubscribe_path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.unsubscribe_path)?;
        serde_json::from_str(&json).map_err(|e| {
            OutreachError::Deserialization(format!(
                "Failed to deserialize unsubscribe records: {}",
                e
            ))
        })
    }

    fn save_unsubscribe_records(&self, records: &[UnsubscribeRecord]) -> Result<()> {
        let json = serde_json::to_string_pretty(records).map_err(|e| {
            OutreachError::Serialization(format!("Failed to serialize unsubscribe records: {}", e))
        })?;

        fs::write(&self.unsubscribe_path, json)?;
        Ok(())
    }

    /// Whether the address is blocked from receiving email
    pub fn is_suppressed(&self, email: &str) -> Result<bool> {
        let normalized = normalize_email(email);
        let entries = self.load_suppression_list()?;

        Ok(entries.iter().any(|entry| entry.email == normalized))
    }

    /// Why the address is blocked, if it is
    pub fn get_suppression_reason(&self, email: &str) -> Result<Option<SuppressionReason>> {
        let normalized = normalize_email(email);
        let entries = self.load_suppression_list()?;

        Ok(entries
            .iter()
            .find(|entry| entry.email == normalized)
            .map(|entry| entry.reason))
    }

    /// Add an address to the suppression list; a repeat add is a no-op
    pub fn add_to_suppression_list(
        &self,
        email: &str,
        reason: SuppressionReason,
        source: &str,
        details: Option<HashMap<String, serde_json::Value>>,
    ) -> Result<bool> {
        let normalized = normalize_email(email);
        let mut entries = self.load_suppression_list()?;

        if entries.iter().any(|entry| entry.email == normalized) {
            log::debug!("Email already suppressed: {}", normalized);
            return Ok(true);
        }

        entries.push(SuppressionEntry::new(
            normalized.clone(),
            reason,
            source.to_string(),
            details.unwrap_or_default(),
        ));
        self.save_suppression_list(&entries)?;

        log::info!("Suppressed {} (reason: {})", normalized, reason);
        Ok(true)
    }

    /// Resubscribe: true only if an entry existed and was removed
    pub fn remove_from_suppression_list(&self, email: &str) -> Result<bool> {
        let normalized = normalize_email(email);
        let mut entries = self.load_suppression_list()?;
        let original_count = entries.len();

        entries.retain(|entry| entry.email != normalized);

        if entries.len() < original_count {
            self.save_suppression_list(&entries)?;
            log::info!("Resubscribed {}", normalized);
            return Ok(true);
        }

        Ok(false)
    }

    /// Record an unsubscribe event and make sure the address is suppressed
    ///
    /// Every call appends an audit record; only the suppression entry is
    /// deduplicated. Repeat unsubscribes therefore still return true.
    pub fn unsubscribe_email(
        &self,
        email: &str,
        reason: Option<&str>,
        source: &str,
        workflow_id: Option<&str>,
        template_id: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> Result<bool> {
        let normalized = normalize_email(email);

        let mut records = self.load_unsubscribe_records()?;
        records.push(UnsubscribeRecord {
            email: normalized.clone(),
            unsubscribed_at: Utc::now(),
            reason: reason.map(String::from),
            source: source.to_string(),
            workflow_id: workflow_id.map(String::from),
            template_id: template_id.map(String::from),
            ip_address: ip_address.map(String::from),
            user_agent: user_agent.map(String::from),
        });
        self.save_unsubscribe_records(&records)?;

        let mut details = HashMap::new();
        if let Some(workflow_id) = workflow_id {
            details.insert("workflow_id".to_string(), serde_json::json!(workflow_id));
        }
        if let Some(template_id) = template_id {
            details.insert("template_id".to_string(), serde_json::json!(template_id));
        }
        if let Some(reason) = reason {
            details.insert("user_reason".to_string(), serde_json::json!(reason));
        }

        self.add_to_suppression_list(
            &normalized,
            SuppressionReason::Unsubscribed,
            source,
            Some(details),
        )?;

        log::info!("Unsubscribed {} (source: {})", normalized, source);
        Ok(true)
    }

    /// Drop every suppressed address, preserving order of the rest
    pub fn filter_suppressed_emails(&self, emails: &[String]) -> Result<Vec<String>> {
        let suppressed: HashSet<String> = self
            .load_suppression_list()?
            .into_iter()
            .map(|entry| entry.email)
            .collect();

        Ok(emails
            .iter()
            .filter(|email| !suppressed.contains(&normalize_email(email)))
            .cloned()
            .collect())
    }

    /// Import a list of addresses, skipping ones already suppressed
    pub fn bulk_import(
        &self,
        emails: &[String],
        reason: SuppressionReason,
    ) -> Result<BulkImportOutcome> {
        let mut entries = self.load_suppression_list()?;
        let mut known: HashSet<String> = entries.iter().map(|entry| entry.email.clone()).collect();

        let mut added = 0;
        let mut skipped = 0;

        for email in emails {
            let normalized = normalize_email(email);
            if known.contains(&normalized) {
                skipped += 1;
                continue;
            }

            known.insert(normalized.clone());
            entries.push(SuppressionEntry::new(
                normalized,
                reason,
                "bulk_import".to_string(),
                HashMap::new(),
            ));
            added += 1;
        }

        if added > 0 {
            self.save_suppression_list(&entries)?;
        }

        log::info!("Bulk import: {} added, {} skipped", added, skipped);
        Ok(BulkImportOutcome {
            added,
            skipped,
            total: emails.len(),
        })
    }

    /// Suppression entries, newest first
    pub fn get_suppression_list(&self, limit: usize, offset: usize) -> Result<Vec<SuppressionEntry>> {
        let mut entries = self.load_suppression_list()?;
        entries.sort_by(|a, b| b.added_at.cmp(&a.added_at));

        Ok(entries.into_iter().skip(offset).take(limit).collect())
    }

    /// Unsubscribe audit records, newest first
    pub fn get_unsubscribe_records(
        &self,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<UnsubscribeRecord>> {
        let mut records = self.load_unsubscribe_records()?;
        records.sort_by(|a, b| b.unsubscribed_at.cmp(&a.unsubscribed_at));

        Ok(records.into_iter().skip(offset).take(limit).collect())
    }

    /// Aggregate counters; storage problems degrade to zeroes
    pub fn get_compliance_stats(&self) -> ComplianceStats {
        let entries = self.load_suppression_list().unwrap_or_else(|e| {
            log::warn!("Failed to load suppression list for stats: {}", e);
            Vec::new()
        });
        let records = self.load_unsubscribe_records().unwrap_or_else(|e| {
            log::warn!("Failed to load unsubscribe records for stats: {}", e);
            Vec::new()
        });

        let mut suppression_reasons: HashMap<String, usize> = HashMap::new();
        for entry in &entries {
            *suppression_reasons
                .entry(entry.reason.as_str().to_string())
                .or_insert(0) += 1;
        }

        let count_reason = |reason: SuppressionReason| {
            entries.iter().filter(|entry| entry.reason == reason).count()
        };

        let recent_cutoff = Utc::now() - Duration::days(30);
        let recent_unsubscribes = records
            .iter()
            .filter(|record| record.unsubscribed_at >= recent_cutoff)
            .count();

        ComplianceStats {
            total_suppressed: entries.len(),
            total_unsubscribed: count_reason(SuppressionReason::Unsubscribed),
            total_bounced: count_reason(SuppressionReason::Bounced),
            total_complained: count_reason(SuppressionReason::Complained),
            suppression_reasons,
            recent_unsubscribes,
            // Fixed estimate until send volume is tracked alongside unsubscribes
            unsubscribe_rate: 0.02,
        }
    }

    /// Build a signed unsubscribe URL for an address
    pub fn generate_unsubscribe_link(
        &self,
        email: &str,
        workflow_id: Option<&str>,
        template_id: Option<&str>,
    ) -> String {
        let timestamp = Utc::now().timestamp();
        let digest = sign_token(email, timestamp, &self.unsubscribe_secret);
        let token =
            general_purpose::URL_SAFE_NO_PAD.encode(format!("{}:{}:{}", email, timestamp, digest));

        let mut params = format!("token={}", token);
        if let Some(workflow_id) = workflow_id {
            params.push_str(&format!("&workflow_id={}", workflow_id));
        }
        if let Some(template_id) = template_id {
            params.push_str(&format!("&template_id={}", template_id));
        }

        format!("{}/unsubscribe?{}", self.frontend_url, params)
    }

    /// Check a token's signature and age; None means reject
    pub fn verify_unsubscribe_token(&self, token: &str) -> Option<TokenClaims> {
        let decoded = general_purpose::URL_SAFE_NO_PAD.decode(token).ok()?;
        let decoded = String::from_utf8(decoded).ok()?;

        let parts: Vec<&str> = decoded.split(':').collect();
        if parts.len() != 3 {
            return None;
        }

        let email = parts[0];
        let timestamp: i64 = parts[1].parse().ok()?;
        let digest = parts[2];

        if digest != sign_token(email, timestamp, &self.unsubscribe_secret) {
            return None;
        }

        let age = Utc::now().timestamp() - timestamp;
        if age > TOKEN_MAX_AGE_SECS {
            return None;
        }

        Some(TokenClaims {
            email: email.to_string(),
            timestamp,
        })
    }

    /// Append the standard unsubscribe footer to outgoing content
    pub fn add_unsubscribe_footer(&self, email_content: &str, unsubscribe_link: &str) -> String {
        format!(
            "{}\n\n---\n\nYou received this email because you signed up for AI Lead Gen updates.\n\nIf you no longer wish to receive these emails, you can unsubscribe here: {}\n\nAI Lead Gen\nsupport@aileadgen.dev\n",
            email_content, unsubscribe_link
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> ComplianceConfig {
        ComplianceConfig {
            unsubscribe_secret: "test_secret".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }

    fn gate(temp_dir: &TempDir) -> ComplianceGate {
        ComplianceGate::new(temp_dir.path(), &test_config()).unwrap()
    }

    #[test]
    fn test_add_is_idempotent_and_normalized() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        assert!(gate
            .add_to_suppression_list("  USER@Example.COM ", SuppressionReason::Manual, "test", None)
            .unwrap());
        assert!(gate
            .add_to_suppression_list("user@example.com", SuppressionReason::Manual, "test", None)
            .unwrap());

        assert!(gate.is_suppressed("User@example.com").unwrap());
        assert_eq!(
            gate.get_suppression_reason("user@example.com").unwrap(),
            Some(SuppressionReason::Manual)
        );
        assert_eq!(gate.get_suppression_list(100, 0).unwrap().len(), 1);
    }

    #[test]
    fn test_remove_reports_presence() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        gate.add_to_suppression_list("a@b.com", SuppressionReason::Manual, "test", None)
            .unwrap();

        assert!(gate.remove_from_suppression_list("A@B.com").unwrap());
        assert!(!gate.is_suppressed("a@b.com").unwrap());
        assert!(!gate.remove_from_suppression_list("a@b.com").unwrap());
    }

    #[test]
    fn test_unsubscribe_appends_audit_but_deduplicates_suppression() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        assert!(gate
            .unsubscribe_email(
                "User@example.com",
                Some("too many emails"),
                "email_link",
                Some("wf-1"),
                Some("welcome"),
                None,
                None,
            )
            .unwrap());
        assert!(gate
            .unsubscribe_email("user@example.com", None, "email_link", None, None, None, None)
            .unwrap());

        let records = gate.get_unsubscribe_records(100, 0).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].email, "user@example.com");

        assert_eq!(gate.get_suppression_list(100, 0).unwrap().len(), 1);
        assert_eq!(
            gate.get_suppression_reason("user@example.com").unwrap(),
            Some(SuppressionReason::Unsubscribed)
        );
    }

    #[test]
    fn test_token_round_trip() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        let link = gate.generate_unsubscribe_link("a@b.com", Some("wf-1"), Some("welcome"));
        assert!(link.starts_with("http://localhost:3000/unsubscribe?token="));
        assert!(link.contains("&workflow_id=wf-1"));
        assert!(link.contains("&template_id=welcome"));

        let token = link
            .split("token=")
            .nth(1)
            .unwrap()
            .split('&')
            .next()
            .unwrap();
        let claims = gate.verify_unsubscribe_token(token).unwrap();
        assert_eq!(claims.email, "a@b.com");
    }

    #[test]
    fn test_token_rejects_tampering_and_age() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        // Claimed email differs from the signed one
        let timestamp = Utc::now().timestamp();
        let digest = sign_token("a@b.com", timestamp, "test_secret");
        let forged = general_purpose::URL_SAFE_NO_PAD
            .encode(format!("other@b.com:{}:{}", timestamp, digest));
        assert!(gate.verify_unsubscribe_token(&forged).is_none());

        // Correctly signed but past the 30 day window
        let stale_timestamp = (Utc::now() - Duration::days(31)).timestamp();
        let stale_digest = sign_token("a@b.com", stale_timestamp, "test_secret");
        let stale = general_purpose::URL_SAFE_NO_PAD
            .encode(format!("a@b.com:{}:{}", stale_timestamp, stale_digest));
        assert!(gate.verify_unsubscribe_token(&stale).is_none());

        // Signed under a different secret
        let other_digest = sign_token("a@b.com", timestamp, "other_secret");
        let other = general_purpose::URL_SAFE_NO_PAD
            .encode(format!("a@b.com:{}:{}", timestamp, other_digest));
        assert!(gate.verify_unsubscribe_token(&other).is_none());

        assert!(gate.verify_unsubscribe_token("not base64 at all").is_none());
    }

    #[test]
    fn test_filter_preserves_order_and_case() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        gate.add_to_suppression_list("blocked@example.com", SuppressionReason::Bounced, "test", None)
            .unwrap();

        let input = vec![
            "First@example.com".to_string(),
            "Blocked@Example.com".to_string(),
            "second@example.com".to_string(),
        ];
        let filtered = gate.filter_suppressed_emails(&input).unwrap();

        assert_eq!(
            filtered,
            vec!["First@example.com".to_string(), "second@example.com".to_string()]
        );
    }

    #[test]
    fn test_bulk_import_counts() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        gate.add_to_suppression_list("old@example.com", SuppressionReason::Manual, "test", None)
            .unwrap();

        let outcome = gate
            .bulk_import(
                &[
                    "new1@example.com".to_string(),
                    "OLD@example.com".to_string(),
                    "new2@example.com".to_string(),
                    "new1@example.com".to_string(),
                ],
                SuppressionReason::Imported,
            )
            .unwrap();

        assert_eq!(
            outcome,
            BulkImportOutcome {
                added: 2,
                skipped: 2,
                total: 4
            }
        );
        assert!(gate.is_suppressed("new2@example.com").unwrap());
    }

    #[test]
    fn test_compliance_stats() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        gate.unsubscribe_email("a@b.com", None, "email_link", None, None, None, None)
            .unwrap();
        gate.add_to_suppression_list("c@d.com", SuppressionReason::Bounced, "bounce", None)
            .unwrap();
        gate.add_to_suppression_list("e@f.com", SuppressionReason::Complained, "webhook", None)
            .unwrap();

        let stats = gate.get_compliance_stats();
        assert_eq!(stats.total_suppressed, 3);
        assert_eq!(stats.total_unsubscribed, 1);
        assert_eq!(stats.total_bounced, 1);
        assert_eq!(stats.total_complained, 1);
        assert_eq!(stats.recent_unsubscribes, 1);
        assert_eq!(stats.suppression_reasons.get("bounced"), Some(&1));
    }

    #[test]
    fn test_footer_contains_link() {
        let temp_dir = TempDir::new().unwrap();
        let gate = gate(&temp_dir);

        let link = "http://localhost:3000/unsubscribe?token=abc";
        let body = gate.add_unsubscribe_footer("Hello Jane,\n\nWelcome aboard.", link);

        assert!(body.starts_with("Hello Jane,"));
        assert!(body.contains("unsubscribe here: http://localhost:3000/unsubscribe?token=abc"));
        assert!(body.contains("AI Lead Gen\nsupport@aileadgen.dev"));
    }

    #[test]
    fn test_gate_survives_restart() {
        let temp_dir = TempDir::new().unwrap();

        {
            let gate = gate(&temp_dir);
            gate.add_to_suppression_list("a@b.com", SuppressionReason::Manual, "test", None)
                .unwrap();
        }

        let reopened = gate(&temp_dir);
        assert!(reopened.is_suppressed("a@b.com").unwrap());
    }
}
