//! Email template storage
//! Single-file JSON ledger of templates plus the seeded defaults

use crate::error::{OutreachError, Result};
use crate::paths;
use async_trait::async_trait;
use chrono::Utc;
use outreach_types::EmailTemplate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Template lookup used during step execution, mockable for tests
#[async_trait]
pub trait TemplateSource: Send + Sync {
    /// Look up a template by id
    async fn get_template(&self, template_id: &str) -> Result<Option<EmailTemplate>>;
}

/// Input for creating a template
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TemplateDraft {
    pub name: String,
    pub subject: String,
    pub content: String,
    #[serde(default)]
    pub variables: Vec<String>,
    #[serde(default)]
    pub workflow_id: Option<String>,
}

/// Partial template update; unset fields keep their current value
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TemplateUpdate {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub variables: Option<Vec<String>>,
}

/// Template store over one JSON list file
pub struct FileTemplateStore {
    templates_path: PathBuf,
}

impl FileTemplateStore {
    /// Create new FileTemplateStore rooted at the given data directory
    pub fn new<P: AsRef<Path>>(root_path: P) -> Result<Self> {
        let templates_dir = root_path.as_ref().join(paths::TEMPLATES_DIR_NAME);
        fs::create_dir_all(&templates_dir)?;

        Ok(Self {
            templates_path: templates_dir.join(paths::TEMPLATES_FILE_NAME),
        })
    }

    fn load_templates(&self) -> Result<Vec<EmailTemplate>> {
        if !self.templates_path.exists() {
            return Ok(Vec::new());
        }

        let json = fs::read_to_string(&self.templates_path)?;
        serde_json::from_str(&json).map_err(|e| {
            OutreachError::Deserialization(format!("Failed to deserialize templates: {}", e))
        })
    }

    fn save_templates(&self, templates: &[EmailTemplate]) -> Result<()> {
        let json = serde_json::to_string_pretty(templates).map_err(|e| {
            OutreachError::Serialization(format!("Failed to serialize templates: {}", e))
        })?;

        fs::write(&self.templates_path, json)?;
        Ok(())
    }

    /// Create a new template
    pub fn create_template(&self, draft: TemplateDraft) -> Result<EmailTemplate> {
        if draft.name.trim().is_empty() {
            return Err(OutreachError::Validation(
                "Template name must not be empty".to_string(),
            ));
        }

        let now = Utc::now();
        let template = EmailTemplate {
            id: format!("template_{}", Uuid::new_v4()),
            name: draft.name,
            subject: draft.subject,
            content: draft.content,
            variables: draft.variables,
            workflow_id: draft.workflow_id,
            created_at: now,
            updated_at: now,
        };

        let mut templates = self.load_templates()?;
        templates.push(template.clone());
        self.save_templates(&templates)?;

        log::info!("Created email template: {} ({})", template.id, template.name);
        Ok(template)
    }

    /// Look up a template by id
    pub fn load_template(&self, template_id: &str) -> Result<Option<EmailTemplate>> {
        let templates = self.load_templates()?;
        Ok(templates
            .into_iter()
            .find(|template| template.id == template_id))
    }

    /// First template whose name contains the fragment, case-insensitively
    pub fn find_by_name_fragment(&self, fragment: &str) -> Result<Option<EmailTemplate>> {
        let needle = fragment.to_lowercase();
        let templates = self.load_templates()?;
        Ok(templates
            .into_iter()
            .find(|template| template.name.to_lowercase().contains(&needle)))
    }

    /// All templates, in creation order
    pub fn list_templates(&self) -> Result<Vec<EmailTemplate>> {
        self.load_templates()
    }

    /// Templates linked to a specific workflow
    pub fn templates_for_workflow(&self, workflow_id: &str) -> Result<Vec<EmailTemplate>> {
        let templates = self.load_templates()?;
        Ok(templates
            .into_iter()
            .filter(|template| template.workflow_id.as_deref() == Some(workflow_id))
            .collect())
    }

    /// Apply a partial update; returns the updated template
    pub fn update_template(
        &self,
        template_id: &str,
        update: TemplateUpdate,
    ) -> Result<EmailTemplate> {
        let mut templates = self.load_templates()?;

        let template = templates
            .iter_mut()
            .find(|template| template.id == template_id);

        let template = match template {
            Some(template) => template,
            None => {
                return Err(OutreachError::NotFound(format!(
                    "Template not found: {}",
                    template_id
                )))
            }
        };

        if let Some(name) = update.name {
            template.name = name;
        }
        if let Some(subject) = update.subject {
            template.subject = subject;
        }
        if let Some(content) = update.content {
            template.content = content;
        }
        if let Some(variables) = update.variables {
            template.variables = variables;
        }
        template.updated_at = Utc::now();

        let updated = template.clone();
        self.save_templates(&templates)?;

        log::info!("Updated email template: {}", template_id);
        Ok(updated)
    }

    /// Remove a template; returns false when the id is unknown
    pub fn delete_template(&self, template_id: &str) -> Result<bool> {
        let mut templates = self.load_templates()?;
        let original_count = templates.len();

        templates.retain(|template| template.id != template_id);
        if templates.len() == original_count {
            return Ok(false);
        }

        self.save_templates(&templates)?;
        log::info!("Deleted email template: {}", template_id);
        Ok(true)
    }

    /// Seed the default welcome, qualification and follow-up templates
    ///
    /// Existing templates with matching names are kept as they are, so this
    /// is safe to run on every startup.
    pub fn ensure_default_templates(&self) -> Result<usize> {
        let mut created = 0;

        for (fragment, draft) in default_templates() {
            if self.find_by_name_fragment(fragment)?.is_none() {
                self.create_template(draft)?;
                created += 1;
            }
        }

        if created > 0 {
            log::info!("Seeded {} default email templates", created);
        }
        Ok(created)
    }
}

#[async_trait]
impl TemplateSource for FileTemplateStore {
    async fn get_template(&self, template_id: &str) -> Result<Option<EmailTemplate>> {
        self.load_template(template_id)
    }
}

fn default_templates() -> [(&'static str, TemplateDraft); 3] {
    let variables: Vec<String> = ["name", "niche", "revenue", "pain_point", "calendar_link", "profile_link"]
        .iter()
        .map(|v| v.to_string())
        .collect();

    let welcome = TemplateDraft {
        name: "Welcome Email Template".to_string(),
        subject: "Welcome to AI Lead Gen, {{name}}!".to_string(),
        content: "Hi {{name}},

Welcome to AI Lead Gen! We're excited to help you scale your {{niche}} business.

Based on your profile, we understand you're currently generating {{revenue}} monthly and looking to solve: {{pain_point}}.

Here's what we can help you with:
\u{2022} Generate 100+ qualified leads per month
\u{2022} Automated AI calling system
\u{2022} Complete lead management dashboard
\u{2022} Real-time analytics and reporting

Ready to get started? Book your demo call here: {{calendar_link}}

Best regards,
AI Lead Gen Team

---
Manage your preferences: {{profile_link}}
"
        .to_string(),
        variables: variables.clone(),
        workflow_id: None,
    };

    let qualification = TemplateDraft {
        name: "Qualification Email Template".to_string(),
        subject: "Perfect! You're qualified for our {{niche}} program".to_string(),
        content: "Hi {{name}},

Great news! Based on your responses, you're a perfect fit for our AI Lead Gen program.

Here's what makes you qualified:
\u{2022} Monthly Revenue: {{revenue}} \u{2713}
\u{2022} Pain Point: {{pain_point}} \u{2713}
\u{2022} Industry: {{niche}} \u{2713}

Next steps:
1. Book your priority demo call: {{calendar_link}}
2. We'll show you exactly how to 3x your leads
3. Get started within 24 hours

This priority booking is only available for qualified leads like yourself.

Book now: {{calendar_link}}

Best regards,
AI Lead Gen Team

---
Manage your preferences: {{profile_link}}
"
        .to_string(),
        variables: variables.clone(),
        workflow_id: None,
    };

    let follow_up = TemplateDraft {
        name: "Follow-up Email Template".to_string(),
        subject: "Don't miss out on 3x more {{niche}} leads, {{name}}".to_string(),
        content: "Hi {{name}},

I wanted to follow up on our AI Lead Gen solution for your {{niche}} business.

You mentioned struggling with: {{pain_point}}

Here's what other {{niche}} businesses are saying:
\u{2022} \"Increased leads by 300% in 30 days\"
\u{2022} \"AI calling system saved us 20 hours/week\"
\u{2022} \"Best ROI we've ever seen\"

With your {{revenue}} monthly revenue, you're missing out on significant growth opportunities.

Ready to see how it works?
Book your demo: {{calendar_link}}

Best regards,
AI Lead Gen Team

P.S. We have limited spots available this month. Don't wait!

---
Manage your preferences: {{profile_link}}
"
        .to_string(),
        variables,
        workflow_id: None,
    };

    [
        ("welcome", welcome),
        ("qualification", qualification),
        ("follow", follow_up),
    ]
}
