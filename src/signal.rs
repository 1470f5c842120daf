//! Signal handling: graceful shutdown and status triggers.
//!
//! Two independent mechanisms live here:
//!
//! - [`ShutdownHandler`] wraps an `AtomicBool` set by Ctrl+C / SIGTERM (via
//!   `ctrlc`). The scheduler and engine poll it between units of work.
//! - [`StatusListener`] (Unix only) owns a thread blocked on `SIGUSR1` /
//!   `SIGUSR2` and forwards each one to a [`StatusReporter`]. Closing it
//!   unblocks the thread. [`ignore_status_signals`] keeps both signals from
//!   terminating the process while no listener is running.
//!
//! # Usage
//!
//! ```rust,no_run
//! use docdedup::signal::install_handler;
//!
//! let handler = install_handler().expect("Failed to install signal handler");
//! let shutdown_flag = handler.get_flag();
//! // Pass shutdown_flag to SchedulerConfig / EngineConfig
//! ```

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};

use crate::schedule::status::Trigger;
#[cfg(unix)]
use crate::schedule::status::StatusReporter;

/// Exit code for SIGINT (Ctrl+C) interruption.
/// This follows Unix convention: 128 + signal number (SIGINT = 2).
pub const EXIT_CODE_INTERRUPTED: i32 = 130;

/// Centralized shutdown handler for graceful termination.
///
/// `ShutdownHandler` is `Send` and `Sync`; clones share the same flag.
#[derive(Debug, Clone)]
pub struct ShutdownHandler {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandler {
    /// Create a new shutdown handler with no shutdown requested.
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Check if shutdown has been requested.
    #[must_use]
    pub fn is_shutdown_requested(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Manually request a shutdown.
    pub fn request_shutdown(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    /// Get a clone of the shutdown flag for the scheduler and engine.
    #[must_use]
    pub fn get_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.flag)
    }

    /// Reset the shutdown flag to `false`.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::SeqCst);
    }
}

impl Default for ShutdownHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for signal handler installation.
#[derive(Debug, thiserror::Error)]
pub enum SignalError {
    /// Failed to install the Ctrl+C handler.
    #[error("Failed to install signal handler: {0}")]
    InstallFailed(#[from] ctrlc::Error),

    /// Failed to register the status signals or start their thread.
    #[error("Failed to start status listener: {0}")]
    Listener(#[from] std::io::Error),

    /// Failed to replace the default action of the status signals.
    #[error("Failed to neutralize status signals: {0}")]
    Neutralize(#[source] std::io::Error),
}

static GLOBAL_HANDLER: OnceLock<ShutdownHandler> = OnceLock::new();

/// Install a Ctrl+C / SIGTERM handler that sets the shutdown flag.
///
/// Calling this more than once in a process returns the already installed
/// handler with its flag reset, so tests calling it repeatedly do not fail.
///
/// # Errors
///
/// Returns [`SignalError::InstallFailed`] if another handler was registered
/// outside this function.
pub fn install_handler() -> Result<ShutdownHandler, SignalError> {
    if let Some(handler) = GLOBAL_HANDLER.get() {
        handler.reset();
        return Ok(handler.clone());
    }

    let handler = ShutdownHandler::new();
    let flag = handler.get_flag();

    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);

        let _ = writeln!(
            std::io::stderr(),
            "\nInterrupted. Finishing current pass..."
        );
        let _ = std::io::stderr().flush();

        log::info!("Shutdown signal received");
    })?;

    let _ = GLOBAL_HANDLER.set(handler.clone());
    Ok(handler)
}

/// Map a raw signal number to a status trigger.
#[cfg(unix)]
#[must_use]
pub fn trigger_for(signal: i32) -> Option<Trigger> {
    use signal_hook::consts::{SIGUSR1, SIGUSR2};
    match signal {
        SIGUSR1 => Some(Trigger::Report),
        SIGUSR2 => Some(Trigger::Reserved),
        _ => None,
    }
}

/// Map a raw signal number to a status trigger.
#[cfg(not(unix))]
#[must_use]
pub fn trigger_for(_signal: i32) -> Option<Trigger> {
    None
}

/// Make `SIGUSR1` / `SIGUSR2` harmless for the rest of the process.
///
/// Their default action terminates the process. After this call they only
/// set an unused flag, so they are safe before [`StatusListener::spawn`],
/// after [`StatusListener::stop`] and if the listener never starts.
///
/// # Errors
///
/// Returns [`SignalError::Neutralize`] if a handler cannot be registered.
#[cfg(unix)]
pub fn ignore_status_signals() -> Result<(), SignalError> {
    use signal_hook::consts::{SIGUSR1, SIGUSR2};

    let received = Arc::new(AtomicBool::new(false));
    for signal in [SIGUSR1, SIGUSR2] {
        signal_hook::flag::register(signal, Arc::clone(&received))
            .map_err(SignalError::Neutralize)?;
    }
    Ok(())
}

/// Background thread answering status signals.
#[cfg(unix)]
pub struct StatusListener {
    handle: signal_hook::iterator::Handle,
    thread: Option<std::thread::JoinHandle<()>>,
}

#[cfg(unix)]
impl StatusListener {
    /// Register `SIGUSR1` / `SIGUSR2` and start the listener thread.
    ///
    /// # Errors
    ///
    /// Returns [`SignalError::Listener`] if the signals cannot be registered
    /// or the thread cannot be spawned.
    pub fn spawn(reporter: StatusReporter) -> Result<Self, SignalError> {
        use signal_hook::consts::{SIGUSR1, SIGUSR2};
        use signal_hook::iterator::Signals;

        let mut signals = Signals::new([SIGUSR1, SIGUSR2])?;
        let handle = signals.handle();

        let thread = std::thread::Builder::new()
            .name("status-listener".to_string())
            .spawn(move || {
                for signal in signals.forever() {
                    match trigger_for(signal) {
                        Some(trigger) => {
                            reporter.handle(trigger);
                        }
                        None => log::trace!("Ignoring signal {}", signal),
                    }
                }
                log::debug!("Status listener stopped");
            })?;

        log::debug!("Status listener started (SIGUSR1: report, SIGUSR2: reserved)");
        Ok(Self {
            handle,
            thread: Some(thread),
        })
    }

    /// Stop listening and wait for the thread to exit.
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.handle.close();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::warn!("Status listener thread panicked");
            }
        }
    }
}

#[cfg(unix)]
impl Drop for StatusListener {
    fn drop(&mut self) {
        self.shutdown();
    }
}
