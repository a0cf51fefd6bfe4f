//! File-based lead storage
//! One JSON file per lead under the leads/ data directory

use crate::error::{OutreachError, Result};
use crate::paths;
use async_trait::async_trait;
use outreach_types::{Lead, LeadStatus};
use std::fs;
use std::path::{Path, PathBuf};

/// Read access to the lead population, mockable for tests
#[async_trait]
pub trait LeadDirectory: Send + Sync {
    /// Look up a single lead by id
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>>;

    /// All stored leads
    async fn list_leads(&self) -> Result<Vec<Lead>>;
}

/// Lead store over per-lead JSON files
pub struct FileLeadStore {
    leads_dir: PathBuf,
}

impl FileLeadStore {
    /// Create new FileLeadStore rooted at the given data directory
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let leads_dir = root_path.as_ref().join(paths::LEADS_DIR_NAME);
        fs::create_dir_all(&leads_dir)?;

        Ok(Self { leads_dir })
    }

    fn lead_path(&self, lead_id: &str) -> PathBuf {
        self.leads_dir.join(format!("lead_{}.json", lead_id))
    }

    fn read_lead(&self, path: &Path) -> Result<Lead> {
        let json = fs::read_to_string(path)?;
        serde_json::from_str(&json).map_err(|e| {
            OutreachError::Deserialization(format!("Failed to deserialize lead: {}", e))
        })
    }

    /// Persist a lead, rejecting records that fail validation
    pub fn save_lead(&self, lead: &Lead) -> Result<()> {
        lead.validate()
            .map_err(|e| OutreachError::Validation(e.to_string()))?;

        let json = serde_json::to_string_pretty(lead).map_err(|e| {
            OutreachError::Serialization(format!("Failed to serialize lead: {}", e))
        })?;

        fs::write(self.lead_path(&lead.id), json)?;
        log::debug!("Saved lead {} ({})", lead.id, lead.name);
        Ok(())
    }

    /// Load a lead by id
    pub fn load_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        let path = self.lead_path(lead_id);
        if !path.exists() {
            return Ok(None);
        }

        Ok(Some(self.read_lead(&path)?))
    }

    /// All leads, newest first; unreadable files are skipped
    pub fn load_all_leads(&self) -> Result<Vec<Lead>> {
        let mut leads = Vec::new();

        for entry in fs::read_dir(&self.leads_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }

            if let Ok(lead) = self.read_lead(&path) {
                leads.push(lead);
            } else {
                log::warn!("Skipping unreadable lead file: {}", path.display());
            }
        }

        leads.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(leads)
    }

    /// Update the call status of a lead; returns false when the lead is unknown
    pub fn update_lead_status(&self, lead_id: &str, status: LeadStatus) -> Result<bool> {
        let lead = self.load_lead(lead_id)?;

        let mut lead = match lead {
            Some(lead) => lead,
            None => return Ok(false),
        };

        lead.status = status;
        lead.updated_at = chrono::Utc::now();
        self.save_lead(&lead)?;

        log::info!("Updated lead {} status to {:?}", lead_id, status);
        Ok(true)
    }

    /// Remove a lead; returns false when no file existed
    pub fn delete_lead(&self, lead_id: &str) -> Result<bool> {
        let path = self.lead_path(lead_id);
        if !path.exists() {
            return Ok(false);
        }

        fs::remove_file(&path)?;
        log::info!("Deleted lead {}", lead_id);
        Ok(true)
    }
}

#[async_trait]
impl LeadDirectory for FileLeadStore {
    async fn get_lead(&self, lead_id: &str) -> Result<Option<Lead>> {
        self.load_lead(lead_id)
    }

    async fn list_leads(&self) -> Result<Vec<Lead>> {
        self.load_all_leads()
    }
}
