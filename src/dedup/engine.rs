//! Pass orchestration across all scan pairs.
//!
//! One call to [`DedupEngine::run_pass`] is one pass: every scan pair is
//! processed in configuration order, one after another. Failures are
//! contained at the smallest scope that makes sense:
//!
//! | failure                       | effect                          |
//! |-------------------------------|---------------------------------|
//! | unreadable / undeletable doc  | document skipped                |
//! | canonical lookup fails/vanish | group skipped                   |
//! | grouping query fails          | pair skipped, next pair runs    |

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::finder::find_duplicates;
use super::reconciler::{reconcile_group, ReconcileConfig};
use super::selector::{select_canonical, Selection};
use super::DedupError;
use crate::config::ScanPair;
use crate::store::{DocumentStore, StoreError};

/// Configuration for the deduplication engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    /// Report deletions without performing them.
    pub dry_run: bool,
    /// Optional shutdown flag, checked between pairs and between groups.
    pub shutdown_flag: Option<Arc<AtomicBool>>,
}

impl EngineConfig {
    /// Enable/disable dry run.
    #[must_use]
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Set the shutdown flag for graceful termination.
    #[must_use]
    pub fn with_shutdown_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown_flag = Some(flag);
        self
    }

    fn is_shutdown_requested(&self) -> bool {
        self.shutdown_flag
            .as_ref()
            .is_some_and(|f| f.load(Ordering::SeqCst))
    }
}

/// Outcome of processing one scan pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PairSummary {
    pub pair: ScanPair,
    /// Duplicate groups reported by the grouping query.
    pub groups: usize,
    /// Groups skipped (vanished canonical, lookup or listing failure, bad row).
    pub skipped_groups: usize,
    /// Documents removed across all groups.
    pub removed: usize,
    /// Documents already gone when their delete ran.
    pub missing: usize,
    /// Per-document failures across all groups.
    pub document_errors: usize,
    /// Whether shutdown cut the pair short.
    pub interrupted: bool,
}

impl PairSummary {
    fn new(pair: &ScanPair) -> Self {
        Self {
            pair: pair.clone(),
            groups: 0,
            skipped_groups: 0,
            removed: 0,
            missing: 0,
            document_errors: 0,
            interrupted: false,
        }
    }
}

/// A pair whose grouping query could not run during a pass.
#[derive(Debug)]
pub struct PairFailure {
    pub pair: ScanPair,
    pub error: DedupError,
}

/// Outcome of one pass.
#[derive(Debug, Default)]
pub struct PassSummary {
    /// Pairs that were processed, in configuration order.
    pub pairs: Vec<PairSummary>,
    /// Pairs skipped because their grouping query failed.
    pub failed_pairs: Vec<PairFailure>,
    /// Wall-clock duration of the pass.
    pub duration: Duration,
    /// Whether the pass stopped early because shutdown was requested.
    pub interrupted: bool,
}

impl PassSummary {
    /// Total duplicate groups found.
    #[must_use]
    pub fn groups(&self) -> usize {
        self.pairs.iter().map(|p| p.groups).sum()
    }

    /// Total documents removed.
    #[must_use]
    pub fn removed(&self) -> usize {
        self.pairs.iter().map(|p| p.removed).sum()
    }

    /// Total per-document failures.
    #[must_use]
    pub fn document_errors(&self) -> usize {
        self.pairs.iter().map(|p| p.document_errors).sum()
    }

    /// Human-readable summary of the pass.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Pass finished in {:.2?}: {} pair(s), {} group(s), {} removed, {} document error(s), {} failed pair(s)",
            self.duration,
            self.pairs.len(),
            self.groups(),
            self.removed(),
            self.document_errors(),
            self.failed_pairs.len()
        )
    }
}

/// Runs deduplication passes over a fixed list of scan pairs.
pub struct DedupEngine<S> {
    store: S,
    pairs: Vec<ScanPair>,
    config: EngineConfig,
}

impl<S: DocumentStore> DedupEngine<S> {
    /// Create an engine with default configuration.
    #[must_use]
    pub fn new(store: S, pairs: Vec<ScanPair>) -> Self {
        Self::with_config(store, pairs, EngineConfig::default())
    }

    #[must_use]
    pub fn with_config(store: S, pairs: Vec<ScanPair>, config: EngineConfig) -> Self {
        Self {
            store,
            pairs,
            config,
        }
    }

    /// The configured scan pairs.
    #[must_use]
    pub fn pairs(&self) -> &[ScanPair] {
        &self.pairs
    }

    /// The underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// List the database's collections and warn about configured ones that
    /// do not exist yet.
    ///
    /// # Errors
    ///
    /// Returns the store error if the collections cannot be listed, which at
    /// startup means the database is unreachable or access is denied.
    pub fn check_collections(&self) -> Result<Vec<String>, StoreError> {
        let names = self.store.collection_names()?;
        log::info!("Collections in DB: {:?}", names);
        for pair in &self.pairs {
            if !names.contains(&pair.collection) {
                log::warn!(
                    "Collection '{}' does not exist yet, it will be scanned once it does",
                    pair.collection
                );
            }
        }
        Ok(names)
    }

    /// Run one pass over every scan pair.
    pub fn run_pass(&self) -> PassSummary {
        let started = Instant::now();
        let mut summary = PassSummary::default();

        for pair in &self.pairs {
            if self.config.is_shutdown_requested() {
                log::info!("Shutdown requested, stopping pass before {}", pair);
                summary.interrupted = true;
                break;
            }

            match self.process_pair(pair) {
                Ok(pair_summary) => {
                    let interrupted = pair_summary.interrupted;
                    summary.pairs.push(pair_summary);
                    if interrupted {
                        summary.interrupted = true;
                        break;
                    }
                }
                Err(error) => {
                    log::error!("Skipping {} for this pass: {}", pair, error);
                    summary.failed_pairs.push(PairFailure {
                        pair: pair.clone(),
                        error,
                    });
                }
            }
        }

        summary.duration = started.elapsed();
        log::info!("{}", summary.summary());
        summary
    }

    /// Find and reconcile every duplicate group of one scan pair.
    ///
    /// # Errors
    ///
    /// Returns an error only when the grouping query cannot be executed.
    pub fn process_pair(&self, pair: &ScanPair) -> Result<PairSummary, DedupError> {
        let mut summary = PairSummary::new(pair);
        let reconcile_config = ReconcileConfig::default().with_dry_run(self.config.dry_run);

        for group in find_duplicates(&self.store, pair)? {
            if self.config.is_shutdown_requested() {
                log::info!("Shutdown requested, leaving {} early", pair);
                summary.interrupted = true;
                break;
            }
            summary.groups += 1;

            let group = match group {
                Ok(group) => group,
                Err(e) => {
                    log::error!("Skipping unreadable group in {}: {}", pair, e);
                    summary.skipped_groups += 1;
                    continue;
                }
            };
            log::debug!(
                "{} documents in {} share {} = {}",
                group.count,
                pair.collection,
                pair.key,
                group.value
            );

            let canonical =
                match select_canonical(&self.store, &pair.collection, &pair.key, &group.value) {
                    Ok(Selection::Canonical(id)) => id,
                    Ok(Selection::Vanished) => {
                        log::warn!(
                            "No document left for {} = {} in {}, skipping group",
                            pair.key,
                            group.value,
                            pair.collection
                        );
                        summary.skipped_groups += 1;
                        continue;
                    }
                    Err(e) => {
                        log::error!("Skipping group in {}: {}", pair.collection, e);
                        summary.skipped_groups += 1;
                        continue;
                    }
                };

            match reconcile_group(
                &self.store,
                &pair.collection,
                &pair.key,
                &group.value,
                &canonical,
                &reconcile_config,
            ) {
                Ok(report) => {
                    summary.removed += report.removed;
                    summary.missing += report.missing;
                    summary.document_errors += report.errors.len();
                }
                Err(e) => {
                    log::error!("Skipping group in {}: {}", pair.collection, e);
                    summary.skipped_groups += 1;
                }
            }
        }

        log::info!(
            "Finished {}: {} group(s), {} removed, {} skipped",
            pair,
            summary.groups,
            summary.removed,
            summary.skipped_groups
        );
        Ok(summary)
    }
}
