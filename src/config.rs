//! Application configuration management.
//!
//! Settings are layered with figment, later layers overriding earlier ones:
//!
//! 1. Built-in defaults ([`Config::default`])
//! 2. TOML configuration file (`--config`, or the platform config directory)
//! 3. `DOCDEDUP_`-prefixed environment variables
//! 4. Command-line flags
//!
//! The merged [`Config`] is then validated into [`Settings`], which is what the
//! scheduler and engine consume.

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cli::{Cli, CliOverrides};

/// Prefix of the environment variables read by [`Config::load`].
pub const ENV_PREFIX: &str = "DOCDEDUP_";

/// Longest accepted interval: one year.
pub const MAX_INTERVAL_MINUTES: u64 = 365 * 24 * 60;

/// Error type for configuration problems. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration sources could not be read or merged.
    #[error("failed to load configuration: {0}")]
    Load(#[from] Box<figment::Error>),

    /// Different number of collections and keys.
    #[error("number of collections ({collections}) and keys ({keys}) must be the same")]
    MismatchedPairs { collections: usize, keys: usize },

    /// A list option was empty.
    #[error("no {0} configured")]
    EmptyList(&'static str),

    /// A list option contained an empty entry, e.g. `bots,,users`.
    #[error("{kind} entry {index} is empty")]
    EmptyEntry { kind: &'static str, index: usize },

    /// An explicitly requested configuration file does not exist.
    #[error("configuration file not found: {0}")]
    MissingFile(PathBuf),

    /// The interval must be at least one minute.
    #[error("interval must be a positive number of minutes, got {0}")]
    InvalidInterval(u64),

    /// The interval is longer than [`MAX_INTERVAL_MINUTES`].
    #[error("interval of {minutes} minutes exceeds the maximum of {max} minutes")]
    IntervalTooLong { minutes: u64, max: u64 },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Load(Box::new(err))
    }
}

/// A collection and the key its duplicates are detected by.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScanPair {
    pub collection: String,
    pub key: String,
}

impl ScanPair {
    #[must_use]
    pub fn new(collection: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            key: key.into(),
        }
    }
}

impl fmt::Display for ScanPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.collection, self.key)
    }
}

/// Split a comma separated list, ignoring all spaces.
fn split_list(raw: &str) -> Vec<String> {
    raw.replace(' ', "").split(',').map(str::to_string).collect()
}

fn check_entries(kind: &'static str, entries: &[String]) -> Result<(), ConfigError> {
    if entries.iter().all(String::is_empty) {
        return Err(ConfigError::EmptyList(kind));
    }
    match entries.iter().position(String::is_empty) {
        Some(index) => Err(ConfigError::EmptyEntry { kind, index }),
        None => Ok(()),
    }
}

/// Build index-aligned scan pairs from comma separated collection and key lists.
///
/// # Errors
///
/// Returns an error if either list is empty, contains an empty entry, or the
/// lists have different lengths.
///
/// # Example
///
/// ```
/// use docdedup::config::{parse_pairs, ScanPair};
///
/// let pairs = parse_pairs("bots, users", "botID,email").unwrap();
/// assert_eq!(pairs, vec![ScanPair::new("bots", "botID"), ScanPair::new("users", "email")]);
/// ```
pub fn parse_pairs(collections: &str, keys: &str) -> Result<Vec<ScanPair>, ConfigError> {
    let collections = split_list(collections);
    let keys = split_list(keys);

    check_entries("collections", &collections)?;
    check_entries("keys", &keys)?;

    if collections.len() != keys.len() {
        return Err(ConfigError::MismatchedPairs {
            collections: collections.len(),
            keys: keys.len(),
        });
    }

    Ok(collections
        .into_iter()
        .zip(keys)
        .map(|(collection, key)| ScanPair { collection, key })
        .collect())
}

/// Replace the password of a connection string with `***`.
#[must_use]
pub fn redact_uri(uri: &str) -> String {
    let Some(scheme_end) = uri.find("://") else {
        return uri.to_string();
    };
    let rest = &uri[scheme_end + 3..];
    let authority_end = rest.find('/').unwrap_or(rest.len());
    let Some(at) = rest[..authority_end].rfind('@') else {
        return uri.to_string();
    };
    let credentials = &rest[..at];
    match credentials.find(':') {
        Some(colon) => format!(
            "{}{}:***{}",
            &uri[..scheme_end + 3],
            &credentials[..colon],
            &rest[at..]
        ),
        None => uri.to_string(),
    }
}

/// Raw, unvalidated configuration as merged from all layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// MongoDB connection string.
    pub connection: String,
    /// Database name.
    pub database: String,
    /// Minutes between the end of one pass and the start of the next.
    pub interval_minutes: u64,
    /// Comma separated collection names.
    pub collections: String,
    /// Comma separated key names, index-aligned with `collections`.
    pub keys: String,
    /// Report deletions without performing them.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            connection: "mongodb://127.0.0.1:27017/infinity".to_string(),
            database: "infinity".to_string(),
            interval_minutes: 10,
            collections: "bots".to_string(),
            keys: "botID".to_string(),
            dry_run: false,
        }
    }
}

impl Config {
    /// Load the layered configuration for this invocation.
    ///
    /// An explicitly passed `--config` file must exist; the default
    /// platform-specific file is only read when present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingFile`] if `--config` names a missing file
    /// and [`ConfigError::Load`] if a source cannot be parsed or a value has
    /// the wrong type.
    pub fn load(cli: &Cli) -> Result<Self, ConfigError> {
        if let Some(path) = &cli.config {
            if !path.exists() {
                return Err(ConfigError::MissingFile(path.clone()));
            }
        }
        let file = cli.config.clone().or_else(Self::default_path);
        Self::figment(file.as_deref(), &cli.overrides())
            .extract()
            .map_err(ConfigError::from)
    }

    /// Compose the figment for the given file and CLI overrides.
    ///
    /// A missing file contributes nothing.
    #[must_use]
    pub fn figment(file: Option<&Path>, overrides: &CliOverrides) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = file.filter(|p| p.exists()) {
            log::debug!("Reading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        figment
            .merge(Env::prefixed(ENV_PREFIX))
            .merge(Serialized::globals(overrides))
    }

    /// Default platform-specific configuration file path.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "docdedup", "docdedup")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate into the settings the scheduler runs with.
    ///
    /// # Errors
    ///
    /// Returns an error for a zero or overlong interval or invalid
    /// collection/key lists.
    pub fn validate(&self) -> Result<Settings, ConfigError> {
        if self.interval_minutes == 0 {
            return Err(ConfigError::InvalidInterval(self.interval_minutes));
        }
        if self.interval_minutes > MAX_INTERVAL_MINUTES {
            return Err(ConfigError::IntervalTooLong {
                minutes: self.interval_minutes,
                max: MAX_INTERVAL_MINUTES,
            });
        }
        let pairs = parse_pairs(&self.collections, &self.keys)?;

        Ok(Settings {
            connection: self.connection.clone(),
            database: self.database.clone(),
            interval: Duration::from_secs(self.interval_minutes * 60),
            pairs,
            dry_run: self.dry_run,
        })
    }
}

/// Validated runtime settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub connection: String,
    pub database: String,
    pub interval: Duration,
    pub pairs: Vec<ScanPair>,
    pub dry_run: bool,
}

impl Settings {
    /// Connection string safe to log.
    #[must_use]
    pub fn redacted_connection(&self) -> String {
        redact_uri(&self.connection)
    }
}
