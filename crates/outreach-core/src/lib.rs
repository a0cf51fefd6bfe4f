//! Outreach Core Library
//!
//! Consolidated business logic for the lead outreach automation system.
//! Contains the workflow engine, the suppression gate, bounce handling,
//! segmentation and the email dispatch services.

pub mod bounce;
pub mod clients;
pub mod compliance;
pub mod config;
pub mod error;
pub mod paths;
pub mod segments;
pub mod services;
pub mod workflow;

// Re-export main types for easy access
pub use config::OutreachConfig;
pub use error::{OutreachError, Result};

// Re-export client types
pub use clients::{EmailGateway, ResendClient};

// Re-export compliance types
pub use compliance::{ComplianceGate, SuppressionEntry, SuppressionReason};

// Re-export bounce types
pub use bounce::{BounceHandler, BounceRecord, BounceType, DeliveryFailure, WebhookEvent};

// Re-export service types
pub use services::{
    EmailHistoryStore,
    EmailService,
    FileLeadStore,
    FileTemplateStore,
    LeadAutomationService,
    LeadDirectory,
    OutreachProcessor,
    TemplateSource,
};

// Re-export segmentation types
pub use segments::{SegmentResolver, SegmentationService};

// Re-export workflow types
pub use workflow::{
    AutomationRunner,
    AutomationSteps,
    ExecutionId,
    ExecutionStatus,
    LeadId,
    RunSummary,
    StepOutcome,
    TriggerType,
    WorkflowDefinition,
    WorkflowEngine,
    WorkflowExecution,
    WorkflowId,
    WorkflowStatus,
    WorkflowStore,
};
