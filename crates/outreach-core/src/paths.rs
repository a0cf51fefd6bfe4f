/// Path constants and utilities for the outreach data layout
use once_cell::sync::OnceCell;
use std::path::PathBuf;

// Static storage for configurable data root
static DATA_ROOT: OnceCell<String> = OnceCell::new();

// Default root constant
const DEFAULT_DATA_ROOT: &str = "/data/outreach";

/// Initialize the data root directory. Can only be called once.
/// If not called, the default `/data/outreach` will be used.
pub fn init_data_root(path: String) -> Result<(), String> {
    DATA_ROOT.set(path).map_err(|_| "Data root already initialized".to_string())
}

/// Get the configured data root or the default
fn get_data_root() -> &'static str {
    DATA_ROOT.get().map(|s| s.as_str()).unwrap_or(DEFAULT_DATA_ROOT)
}

pub fn data_root_str() -> &'static str {
    get_data_root()
}

// Directory names (relative to the data root)
pub const WORKFLOWS_DIR_NAME: &str = "workflows";
pub const EXECUTIONS_DIR_NAME: &str = "executions";
pub const LEADS_DIR_NAME: &str = "leads";
pub const TEMPLATES_DIR_NAME: &str = "templates";
pub const COMPLIANCE_DIR_NAME: &str = "compliance";
pub const BOUNCES_DIR_NAME: &str = "bounces";
pub const HISTORY_DIR_NAME: &str = "history";
pub const TRIGGERS_DIR_NAME: &str = "triggers";
pub const PROCESSED_DIR_NAME: &str = "processed";
pub const FAILED_DIR_NAME: &str = "failed";

// Execution state directories
pub const ACTIVE_STATE_DIR_NAME: &str = "active";
pub const COMPLETED_STATE_DIR_NAME: &str = "completed";
pub const PAUSED_STATE_DIR_NAME: &str = "paused";
pub const FAILED_STATE_DIR_NAME: &str = "failed";

// Ledger file names
pub const TEMPLATES_FILE_NAME: &str = "email_templates.json";
pub const SUPPRESSION_FILE_NAME: &str = "suppression_list.json";
pub const UNSUBSCRIBE_FILE_NAME: &str = "unsubscribe_records.json";
pub const BOUNCE_RECORDS_FILE_NAME: &str = "bounce_records.json";
pub const DELIVERY_FAILURES_FILE_NAME: &str = "delivery_failures.json";
pub const EMAIL_HISTORY_FILE_NAME: &str = "email_history.json";

// Path builder functions
pub fn data_root() -> PathBuf {
    PathBuf::from(get_data_root())
}

pub fn workflows_dir() -> PathBuf {
    data_root().join(WORKFLOWS_DIR_NAME)
}

pub fn executions_dir() -> PathBuf {
    data_root().join(EXECUTIONS_DIR_NAME)
}

pub fn execution_state_dir(state_name: &str) -> PathBuf {
    executions_dir().join(state_name)
}

pub fn leads_dir() -> PathBuf {
    data_root().join(LEADS_DIR_NAME)
}

pub fn templates_dir() -> PathBuf {
    data_root().join(TEMPLATES_DIR_NAME)
}

pub fn templates_file() -> PathBuf {
    templates_dir().join(TEMPLATES_FILE_NAME)
}

pub fn compliance_dir() -> PathBuf {
    data_root().join(COMPLIANCE_DIR_NAME)
}

pub fn suppression_file() -> PathBuf {
    compliance_dir().join(SUPPRESSION_FILE_NAME)
}

pub fn unsubscribe_file() -> PathBuf {
    compliance_dir().join(UNSUBSCRIBE_FILE_NAME)
}

pub fn bounces_dir() -> PathBuf {
    data_root().join(BOUNCES_DIR_NAME)
}

pub fn bounce_records_file() -> PathBuf {
    bounces_dir().join(BOUNCE_RECORDS_FILE_NAME)
}

pub fn delivery_failures_file() -> PathBuf {
    bounces_dir().join(DELIVERY_FAILURES_FILE_NAME)
}

pub fn history_dir() -> PathBuf {
    data_root().join(HISTORY_DIR_NAME)
}

pub fn email_history_file() -> PathBuf {
    history_dir().join(EMAIL_HISTORY_FILE_NAME)
}

pub fn triggers_dir() -> PathBuf {
    data_root().join(TRIGGERS_DIR_NAME)
}

pub fn triggers_processed_dir() -> PathBuf {
    triggers_dir().join(PROCESSED_DIR_NAME)
}

pub fn triggers_failed_dir() -> PathBuf {
    triggers_dir().join(FAILED_DIR_NAME)
}

/// Get all directories that should be created for the outreach system
pub fn all_data_directories() -> Vec<PathBuf> {
    vec![
        data_root(),
        workflows_dir(),
        executions_dir(),
        execution_state_dir(ACTIVE_STATE_DIR_NAME),
        execution_state_dir(COMPLETED_STATE_DIR_NAME),
        execution_state_dir(PAUSED_STATE_DIR_NAME),
        execution_state_dir(FAILED_STATE_DIR_NAME),
        leads_dir(),
        templates_dir(),
        compliance_dir(),
        bounces_dir(),
        history_dir(),
        triggers_dir(),
        triggers_processed_dir(),
        triggers_failed_dir(),
    ]
}
