//! Configuration management for the outreach system

use crate::error::{OutreachError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Raw configuration structure matching the config file exactly
#[derive(Debug, Deserialize)]
struct RawConfig {
    pub resend: ResendConfig,

    pub compliance: ComplianceConfig,

    #[serde(default = "default_scheduler")]
    pub scheduler: SchedulerConfig,

    #[serde(default = "default_links")]
    pub links: LinksConfig,
}

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutreachConfig {
    pub resend: ResendConfig,
    pub compliance: ComplianceConfig,
    pub scheduler: SchedulerConfig,
    pub links: LinksConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResendConfig {
    #[serde(alias = "token")] // Accept both 'api_key' and 'token'
    pub api_key: String,

    #[serde(alias = "url", default = "default_resend_base_url")]
    pub base_url: String,

    #[serde(alias = "from", default = "default_from_address")]
    pub from_address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplianceConfig {
    #[serde(alias = "secret")]
    pub unsubscribe_secret: String,

    #[serde(alias = "base_url", default = "default_frontend_url")]
    pub frontend_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

/// Links substituted into email templates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinksConfig {
    #[serde(default = "default_calendar_link")]
    pub calendar_link: String,

    #[serde(default = "default_profile_link")]
    pub profile_link: String,
}

// Default functions
fn default_scheduler() -> SchedulerConfig {
    SchedulerConfig {
        poll_interval_secs: default_poll_interval_secs(),
    }
}

fn default_links() -> LinksConfig {
    LinksConfig {
        calendar_link: default_calendar_link(),
        profile_link: default_profile_link(),
    }
}

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_calendar_link() -> String {
    "https://calendly.com/aileadgen/demo".to_string()
}

fn default_profile_link() -> String {
    "https://app.aileadgen.dev/profile".to_string()
}

fn default_resend_base_url() -> String {
    "https://api.resend.com".to_string()
}

fn default_from_address() -> String {
    "AI Lead Gen <noreply@aileadgen.dev>".to_string()
}

fn default_frontend_url() -> String {
    "http://localhost:3000".to_string()
}

impl OutreachConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| OutreachError::Config(format!("Failed to read config file: {}", e)))?;

        Self::from_json_str(&content)
    }

    /// Load configuration from a JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let raw_config: RawConfig = serde_json::from_str(json)
            .map_err(|e| OutreachError::Config(format!("Failed to parse config: {}", e)))?;

        let config = Self {
            resend: raw_config.resend,
            compliance: raw_config.compliance,
            scheduler: raw_config.scheduler,
            links: raw_config.links,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.resend.api_key.is_empty() {
            return Err(OutreachError::Config("Resend API key is required".to_string()));
        }

        if self.compliance.unsubscribe_secret.is_empty() {
            return Err(OutreachError::Config(
                "Unsubscribe secret is required".to_string(),
            ));
        }

        if self.scheduler.poll_interval_secs == 0 {
            return Err(OutreachError::Config(
                "Scheduler poll interval must be at least one second".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            "resend": {"api_key": "re_test_123", "from_address": "Test <test@example.com>"},
            "compliance": {"unsubscribe_secret": "secret-1", "frontend_url": "https://app.example.com"},
            "scheduler": {"poll_interval_secs": 30},
            "links": {"calendar_link": "https://calendly.com/example/demo"}
        }"#;

        let config = OutreachConfig::from_json_str(json).unwrap();
        assert_eq!(config.resend.api_key, "re_test_123");
        assert_eq!(config.resend.base_url, "https://api.resend.com");
        assert_eq!(config.compliance.frontend_url, "https://app.example.com");
        assert_eq!(config.scheduler.poll_interval_secs, 30);
        assert_eq!(config.links.calendar_link, "https://calendly.com/example/demo");
        assert_eq!(config.links.profile_link, "https://app.aileadgen.dev/profile");
    }

    #[test]
    fn test_aliases_and_defaults() {
        let json = r#"{
            "resend": {"token": "re_alias"},
            "compliance": {"secret": "s1"}
        }"#;

        let config = OutreachConfig::from_json_str(json).unwrap();
        assert_eq!(config.resend.api_key, "re_alias");
        assert_eq!(config.resend.from_address, "AI Lead Gen <noreply@aileadgen.dev>");
        assert_eq!(config.compliance.unsubscribe_secret, "s1");
        assert_eq!(config.compliance.frontend_url, "http://localhost:3000");
        assert_eq!(config.scheduler.poll_interval_secs, 60);
        assert_eq!(config.links.calendar_link, "https://calendly.com/aileadgen/demo");
    }

    #[test]
    fn test_empty_api_key_rejected() {
        let json = r#"{
            "resend": {"api_key": ""},
            "compliance": {"secret": "s1"}
        }"#;

        let err = OutreachConfig::from_json_str(json).unwrap_err();
        assert!(err.to_string().contains("API key"));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let json = r#"{
            "resend": {"api_key": "re_1"},
            "compliance": {"secret": "s1"},
            "scheduler": {"poll_interval_secs": 0}
        }"#;

        assert!(OutreachConfig::from_json_str(json).is_err());
    }
}
