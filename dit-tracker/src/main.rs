//! dit-tracker - Document Ingestion Tracker
//!
//! Runs the tracker core in-process. `demo` drives one bundle through the
//! full lifecycle on the configured timers and prints every event as a JSON
//! line; `config` prints the resolved configuration.

use std::path::PathBuf;

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use dit_common::config::{resolve_config, ConfigSource};
use dit_common::events::{BundleStatus, DitEvent, FileCategory, FileStatus};
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use dit_tracker::models::{BlobRef, FileSpec};
use dit_tracker::BundleTracker;

#[derive(Debug, Parser)]
#[command(name = "dit-tracker", version, about = "Document ingestion tracker")]
struct Cli {
    /// Path to a TOML config file (overrides DIT_CONFIG)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create, parse, import and select one bundle
    Demo {
        /// Number of files in the demo bundle
        #[arg(long, default_value_t = 2)]
        files: usize,
    },
    /// Print the resolved configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, source) = resolve_config(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting dit-tracker (Document Ingestion Tracker)");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));
    match &source {
        ConfigSource::Defaults => info!("Configuration: compiled defaults"),
        ConfigSource::CommandLine(path)
        | ConfigSource::Environment(path)
        | ConfigSource::ConfigFile(path) => info!("Configuration: {}", path.display()),
    }

    match cli.command.unwrap_or(Command::Demo { files: 2 }) {
        Command::Config => {
            print!("{}", config.to_toml_string()?);
            Ok(())
        }
        Command::Demo { files } => {
            let tracker = BundleTracker::new(config)?;
            run_demo(tracker, files).await
        }
    }
}

async fn run_demo(tracker: BundleTracker, files: usize) -> Result<()> {
    let mut rx = tracker.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => {
                    match serde_json::to_string(&event) {
                        Ok(line) => println!("{}", line),
                        Err(e) => warn!(event_type = %event.event_type(), error = %e, "Event not serializable"),
                    }
                    // Selection is the last step of the demo
                    if matches!(
                        event,
                        DitEvent::SelectionChanged { .. } | DitEvent::SelectionRejected { .. }
                    ) {
                        break;
                    }
                }
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event printer lagged"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    let bundle_id = tracker.create_bundle("Demo bundle", files, "cli-demo").await?;

    for index in 1..=files {
        let category = if index == 1 {
            FileCategory::Main
        } else {
            FileCategory::Supporting
        };
        let spec = FileSpec::new(
            format!("document-{}.pdf", index),
            category,
            BlobRef::new(format!("memory://document-{}", index)),
        )
        .with_break_by("page");

        let bundle = tracker.add_file(bundle_id, spec).await?;

        // Without the parse simulator the demo plays the parsing service
        if !tracker.config().simulate_parsing {
            let file_id = bundle
                .files
                .last()
                .map(|f| f.id)
                .ok_or_else(|| anyhow!("file missing after add"))?;
            tracker
                .resolve_file(bundle_id, file_id, FileStatus::Completed)
                .await?;
        }
    }

    tracker.wait_for_status(bundle_id, BundleStatus::Completed).await?;
    info!(bundle_id = %bundle_id, "All files parsed, importing");

    tracker.import_bundle(bundle_id).await?;
    let bundle = tracker.wait_for_status(bundle_id, BundleStatus::Imported).await?;

    let outcome = tracker.select_bundle(Some(bundle_id)).await;
    info!(bundle_id = %bundle_id, outcome = ?outcome, "Demo selection");

    printer.await?;
    println!("{}", serde_json::to_string_pretty(&bundle)?);

    tracker.shutdown();
    Ok(())
}
