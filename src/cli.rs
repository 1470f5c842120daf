//! Command-line interface definitions for docdedup.
//!
//! Every option that also exists in the configuration file is an `Option`
//! here, so that only flags the operator actually passed override the file
//! and environment layers (see [`crate::config`]).
//!
//! # Example
//!
//! ```bash
//! # Deduplicate `bots` by `botID` every 10 minutes (the defaults)
//! docdedup --conn mongodb://db:27017 --dbname infinity
//!
//! # Two collections, each with its own key, every 5 minutes
//! docdedup --col bots,users --key botID,email --interval 5
//!
//! # Single dry-run pass with debug output
//! docdedup -v --once --dry-run
//! ```

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;

/// Periodically removes documents that share a key value, keeping the newest.
///
/// Send SIGUSR1 to a running process to log the time since the last pass and
/// the estimated time until the next one.
#[derive(Debug, Parser)]
#[command(name = "docdedup")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Increase verbosity level (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// MongoDB connection string
    #[arg(long = "conn", value_name = "URI")]
    pub connection: Option<String>,

    /// Database name to connect to
    #[arg(long = "dbname", value_name = "NAME")]
    pub database: Option<String>,

    /// Minutes to wait between the end of one pass and the start of the next
    #[arg(long = "interval", value_name = "MINUTES")]
    pub interval_minutes: Option<u64>,

    /// Collections to check for duplicates (comma separated)
    #[arg(long = "col", value_name = "COLLECTIONS")]
    pub collections: Option<String>,

    /// Key to detect duplicates by, one per collection (comma separated)
    #[arg(long = "key", value_name = "KEYS")]
    pub keys: Option<String>,

    /// Path to a TOML configuration file
    ///
    /// If not specified, a default platform-specific path is used when it exists.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Log the documents that would be deleted without deleting them
    #[arg(long)]
    pub dry_run: bool,

    /// Run a single pass and exit instead of scheduling passes forever
    #[arg(long)]
    pub once: bool,

    /// Print the effective configuration as TOML and exit
    #[arg(long)]
    pub print_config: bool,

    /// Report fatal errors as JSON on stderr
    #[arg(long)]
    pub json_errors: bool,
}

/// The subset of CLI flags that overrides configuration values.
///
/// `None` fields are skipped during serialization so they do not mask values
/// from lower layers.
#[derive(Debug, Default, Serialize)]
pub struct CliOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub connection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_minutes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub collections: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keys: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub dry_run: bool,
}

impl Cli {
    /// Flags to merge over the file and environment configuration.
    #[must_use]
    pub fn overrides(&self) -> CliOverrides {
        CliOverrides {
            connection: self.connection.clone(),
            database: self.database.clone(),
            interval_minutes: self.interval_minutes,
            collections: self.collections.clone(),
            keys: self.keys.clone(),
            dry_run: self.dry_run,
        }
    }
}
