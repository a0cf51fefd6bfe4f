//! Service modules for outreach business logic

pub mod automation;
pub mod email_service;
pub mod history;
pub mod lead_store;
pub mod processor;
pub mod template_store;

// Re-export service types
pub use automation::LeadAutomationService;
pub use email_service::EmailService;
pub use history::EmailHistoryStore;
pub use lead_store::{FileLeadStore, LeadDirectory};
pub use processor::OutreachProcessor;
pub use template_store::{FileTemplateStore, TemplateSource};
