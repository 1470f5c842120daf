//! docdedup - Periodic Key-Based Duplicate Document Remover
//!
//! Scans configured MongoDB collections on a fixed interval, finds documents
//! sharing the same value of a configured key, and deletes all but the most
//! recently created one. Sending `SIGUSR1` to the process logs how long ago the
//! last pass finished and when the next one is due.

pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod logging;
pub mod schedule;
pub mod signal;
pub mod store;

use std::sync::Arc;

use anyhow::Context;

use crate::cli::Cli;
use crate::config::Config;
use crate::dedup::{DedupEngine, EngineConfig};
use crate::error::ExitCode;
#[cfg(unix)]
use crate::schedule::status::StatusReporter;
use crate::schedule::{ScheduleState, Scheduler, SchedulerConfig, StopReason};
use crate::store::MongoStore;

/// Run the application for the parsed command line.
///
/// # Errors
///
/// Returns an error for invalid configuration and for connectivity problems
/// detected before the scheduling loop starts. Nothing inside the loop is
/// fatal.
pub fn run_app(cli: Cli) -> anyhow::Result<ExitCode> {
    logging::init_logging(cli.verbose, cli.quiet);
    log::info!("docdedup {}: init", env!("CARGO_PKG_VERSION"));

    let config = Config::load(&cli)?;
    if cli.print_config {
        print!("{}", config.to_toml().context("rendering configuration")?);
        return Ok(ExitCode::Success);
    }
    let settings = config.validate()?;
    if settings.dry_run {
        log::warn!("Dry run: duplicates will be reported but not deleted");
    }

    let shutdown = signal::install_handler()?;

    // Status signals are answered from here on, including while connecting.
    let state = Arc::new(ScheduleState::new(settings.interval));
    #[cfg(unix)]
    let listener = {
        if let Err(e) = signal::ignore_status_signals() {
            log::warn!("{}", e);
        }
        match signal::StatusListener::spawn(StatusReporter::new(Arc::clone(&state))) {
            Ok(listener) => Some(listener),
            Err(e) => {
                log::warn!("Status reports unavailable: {}", e);
                None
            }
        }
    };

    log::info!("Connecting to {}", settings.redacted_connection());
    let store = MongoStore::connect(&settings.connection, &settings.database)?;

    let engine = DedupEngine::with_config(
        store,
        settings.pairs.clone(),
        EngineConfig::default()
            .with_dry_run(settings.dry_run)
            .with_shutdown_flag(shutdown.get_flag()),
    );
    engine
        .check_collections()
        .with_context(|| format!("cannot use database '{}'", settings.database))?;
    log::info!("Connected to MongoDB successfully");

    let mut scheduler_config = SchedulerConfig::default().with_shutdown_flag(shutdown.get_flag());
    if cli.once {
        scheduler_config = scheduler_config.with_max_passes(1);
    }
    let outcome = Scheduler::new(state, scheduler_config).run(&engine);

    #[cfg(unix)]
    if let Some(listener) = listener {
        listener.stop();
    }

    Ok(match outcome.reason {
        StopReason::PassLimit => ExitCode::Success,
        StopReason::Shutdown => ExitCode::Interrupted,
    })
}
