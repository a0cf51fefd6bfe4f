//! Outreach scheduler and trigger monitor executable

use clap::{Arg, Command};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use outreach_core::{
    bounce::WebhookEvent,
    paths,
    segments::SegmentationService,
    services::{
        EmailHistoryStore, EmailService, FileLeadStore, FileTemplateStore, LeadAutomationService,
        LeadDirectory, OutreachProcessor,
    },
    workflow::{AutomationRunner, WorkflowEngine, WorkflowStore},
    BounceHandler, ComplianceGate, OutreachConfig, ResendClient,
};
use outreach_types::TriggerRequest;
use std::path::Path;
use std::sync::mpsc::channel;
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging with INFO as default if RUST_LOG not set
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let matches = Command::new("outreach-server")
        .version("1.0.0")
        .about("Lead outreach scheduler and trigger monitor")
        .arg(
            Arg::new("config")
                .long("config")
                .short('c')
                .value_name("FILE")
                .help("Configuration file path")
                .default_value("/app/config/outreach.json"),
        )
        .arg(
            Arg::new("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Data directory for outreach files")
                .default_value("/data/outreach"),
        )
        .arg(
            Arg::new("interval")
                .long("interval")
                .value_name("SECONDS")
                .help("Scheduler poll interval, overrides the config value"),
        )
        .arg(
            Arg::new("run-once")
                .long("run-once")
                .help("Run a single scheduler pass and exit")
                .action(clap::ArgAction::SetTrue),
        )
        .arg(
            Arg::new("monitor-triggers")
                .long("monitor-triggers")
                .help("Only watch the trigger directory, without the scheduler loop")
                .action(clap::ArgAction::SetTrue),
        )
        .get_matches();

    // Initialize data directory
    let data_dir = matches.get_one::<String>("data-dir").unwrap();
    if let Err(e) = paths::init_data_root(data_dir.clone()) {
        log::warn!("Data root initialization warning: {}", e);
    }
    log::info!("Using data directory: {}", data_dir);

    for dir in paths::all_data_directories() {
        std::fs::create_dir_all(&dir)?;
    }

    // Load configuration
    let config_path = matches.get_one::<String>("config").unwrap();
    let config = OutreachConfig::from_file(config_path)?;
    log::info!("Loaded configuration from {}", config_path);

    let poll_interval_secs = match matches.get_one::<String>("interval") {
        Some(value) => value
            .parse::<u64>()
            .map_err(|e| format!("Invalid interval: {}", e))?,
        None => config.scheduler.poll_interval_secs,
    };
    if poll_interval_secs == 0 {
        return Err("Scheduler interval must be at least one second".into());
    }

    // Build the store and service graph
    let engine = Arc::new(WorkflowEngine::new(Arc::new(WorkflowStore::new(
        paths::data_root(),
    )?)));
    let gate = Arc::new(ComplianceGate::new(paths::data_root(), &config.compliance)?);
    let history = Arc::new(EmailHistoryStore::new(paths::data_root())?);
    let bounces = Arc::new(BounceHandler::new(
        paths::data_root(),
        gate.clone(),
        history.clone(),
    )?);
    let resend_client = Arc::new(ResendClient::new(config.resend.clone()));
    let email_service = Arc::new(EmailService::new(
        resend_client,
        history.clone(),
        gate.clone(),
    ));
    let leads: Arc<dyn LeadDirectory> = Arc::new(FileLeadStore::new(paths::data_root())?);
    let templates = Arc::new(FileTemplateStore::new(paths::data_root())?);

    let seeded = templates.ensure_default_templates()?;
    if seeded > 0 {
        log::info!("Seeded {} default email templates", seeded);
    }

    let segments = Arc::new(SegmentationService::new(leads.clone()));
    let automation = Arc::new(LeadAutomationService::new(
        engine.clone(),
        segments,
        leads.clone(),
    ));

    let processor = Arc::new(OutreachProcessor::new(
        engine,
        gate,
        bounces.clone(),
        email_service,
        history,
        leads,
        templates,
        config.links.clone(),
    ));

    let runner = Arc::new(AutomationRunner::new(
        processor,
        Duration::from_secs(poll_interval_secs),
    ));

    log::info!("Initialized all services");

    if matches.get_flag("run-once") {
        let summary = runner.run_once().await;
        log::info!(
            "Scheduler pass complete: {} executions ({} sent, {} suppressed, {} failed), {} retries ({} succeeded)",
            summary.executions_processed,
            summary.emails_sent,
            summary.suppressed,
            summary.failed,
            summary.retries_attempted,
            summary.retries_succeeded
        );
        return Ok(());
    }

    if matches.get_flag("monitor-triggers") {
        log::info!("Starting trigger monitor mode");
        monitor_triggers(automation, bounces).await?;
        return Ok(());
    }

    // Default mode: scheduler loop plus trigger monitor
    let runner_handle = tokio::spawn(async move {
        runner.start().await;
    });

    let monitor_handle = tokio::spawn(async move { monitor_triggers(automation, bounces).await });

    tokio::select! {
        result = runner_handle => {
            match result {
                Ok(()) => log::info!("Scheduler loop exited"),
                Err(e) => {
                    log::error!("Scheduler task panicked: {}", e);
                    std::process::exit(1);
                }
            }
        }
        result = monitor_handle => {
            match result {
                Ok(Ok(())) => log::info!("Trigger monitor exited normally"),
                Ok(Err(e)) => {
                    log::error!("Trigger monitor failed: {}", e);
                    std::process::exit(1);
                }
                Err(e) => {
                    log::error!("Trigger monitor task panicked: {}", e);
                    std::process::exit(1);
                }
            }
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Received shutdown signal");
        }
    }

    Ok(())
}

async fn monitor_triggers(
    automation: Arc<LeadAutomationService>,
    bounces: Arc<BounceHandler>,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let triggers_path = paths::triggers_dir();

    log::info!("Monitoring trigger files in {}/", triggers_path.display());

    std::fs::create_dir_all(&triggers_path)?;
    std::fs::create_dir_all(paths::triggers_processed_dir())?;
    std::fs::create_dir_all(paths::triggers_failed_dir())?;

    // Set up file system watcher
    let (tx, rx) = channel();
    let mut watcher = RecommendedWatcher::new(
        move |result: Result<Event, notify::Error>| {
            if let Ok(event) = result {
                tx.send(event).unwrap();
            }
        },
        notify::Config::default(),
    )?;
    watcher.watch(&triggers_path, RecursiveMode::NonRecursive)?;

    log::info!("Started monitoring trigger files");

    // Process files that were already waiting
    if let Ok(entries) = std::fs::read_dir(&triggers_path) {
        for entry in entries.flatten() {
            if entry.path().is_file() {
                process_trigger_file(&automation, &bounces, &entry.path()).await;
            }
        }
    }

    // Monitor for new files
    loop {
        match rx.recv() {
            Ok(event) => {
                log::debug!("File system event: {:?}", event);

                match event.kind {
                    EventKind::Create(_) | EventKind::Modify(_) => {
                        for path in event.paths {
                            if path.is_file() {
                                process_trigger_file(&automation, &bounces, &path).await;
                            }
                        }
                    }
                    _ => {}
                }
            }
            Err(e) => {
                log::error!("Watcher error: {}", e);
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
        }
    }
}

/// Route one dropped file: webhook_*.json feeds the bounce handler, any other
/// JSON file is a trigger request. The file lands in processed/ or failed/.
async fn process_trigger_file(
    automation: &Arc<LeadAutomationService>,
    bounces: &Arc<BounceHandler>,
    path: &Path,
) {
    let file_name = match path.file_name().and_then(|n| n.to_str()) {
        Some(name) => name.to_string(),
        None => return,
    };

    if !file_name.ends_with(".json") {
        log::debug!("Ignoring non-JSON file: {}", file_name);
        return;
    }

    log::info!("Processing trigger file: {}", file_name);

    // Mark file as being processed by renaming it
    let processing_path = path.with_extension("json.processing");
    if let Err(e) = std::fs::rename(path, &processing_path) {
        log::error!("Failed to mark file as processing: {}", e);
        return;
    }

    let outcome = dispatch_trigger_file(automation, bounces, &processing_path, &file_name).await;

    let (destination_dir, label) = match &outcome {
        Ok(()) => (paths::triggers_processed_dir(), "processed"),
        Err(e) => {
            log::error!("Failed to process {}: {}", file_name, e);
            (paths::triggers_failed_dir(), "failed")
        }
    };

    if let Err(e) = std::fs::create_dir_all(&destination_dir) {
        log::error!("Failed to create {} directory: {}", label, e);
        return;
    }

    let destination = destination_dir.join(format!(
        "{}_{}_{}.json",
        file_name.trim_end_matches(".json"),
        label,
        chrono::Utc::now().format("%Y%m%d_%H%M%S")
    ));

    if let Err(e) = std::fs::rename(&processing_path, &destination) {
        log::error!("Failed to move file to {}: {}", label, e);
    }
}

async fn dispatch_trigger_file(
    automation: &Arc<LeadAutomationService>,
    bounces: &Arc<BounceHandler>,
    path: &Path,
    file_name: &str,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let content = std::fs::read_to_string(path)?;

    if file_name.starts_with("webhook_") {
        let event: WebhookEvent = serde_json::from_str(&content)
            .map_err(|e| format!("Failed to parse webhook event JSON: {}", e))?;

        let consumed = bounces.process_webhook_event(&event)?;
        if consumed {
            log::info!("Webhook event {} consumed", event.event_type);
        } else {
            log::info!("Webhook event {} ignored", event.event_type);
        }
        return Ok(());
    }

    let request: TriggerRequest = serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse trigger request JSON: {}", e))?;

    let outcome = automation.handle_trigger_request(&request).await?;
    log::info!(
        "Trigger {} for lead {}: {} workflows triggered, {} skipped",
        request.trigger_id,
        outcome.lead_id,
        outcome.triggered.len(),
        outcome.skipped.len()
    );

    Ok(())
}
