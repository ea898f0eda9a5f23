use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::app::ports::{SourceStore, TargetStore};
use crate::config::RunSettings;
use crate::domain::{NormalizedService, SourceRecord};
use crate::error::MigrationError;
use crate::observability::metrics;
use crate::pipeline::load::ChunkedLoader;
use crate::pipeline::processing::dedupe::{Deduplicator, SkipReason};
use crate::pipeline::processing::identity::{load_existing_identities, IdentityIndex};
use crate::pipeline::processing::normalize::Normalizer;

/// Pipeline states, in the only order they can be visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineState {
    Configuring,
    Extracting,
    Normalizing,
    Deduplicating,
    Loading,
    Reporting,
    Completed,
    Aborted,
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineState::Configuring => "configuring",
            PipelineState::Extracting => "extracting",
            PipelineState::Normalizing => "normalizing",
            PipelineState::Deduplicating => "deduplicating",
            PipelineState::Loading => "loading",
            PipelineState::Reporting => "reporting",
            PipelineState::Completed => "completed",
            PipelineState::Aborted => "aborted",
        };
        f.write_str(s)
    }
}

/// Counters reported at the end of a run, or up to the point of an abort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Source records read
    pub total_seen: usize,
    /// Identity already in the target
    pub skipped_existing: usize,
    /// Identity repeated earlier in the same run
    pub skipped_in_run: usize,
    /// Name had no stable identity
    pub skipped_unidentifiable: usize,
    /// Rows acknowledged by the target
    pub inserted: usize,
    /// Rows that passed dedupe; equals `inserted` on a completed non-dry run
    pub to_insert: usize,
    pub dry_run: bool,
}

impl RunSummary {
    pub fn skipped_duplicates(&self) -> usize {
        self.skipped_existing + self.skipped_in_run
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inserted = if self.dry_run {
            format!("would insert {}", self.to_insert)
        } else {
            format!("inserted {}", self.inserted)
        };
        write!(
            f,
            "seen {}, skipped as duplicate {} ({} already migrated, {} repeated in run), skipped without identity {}, {}",
            self.total_seen,
            self.skipped_duplicates(),
            self.skipped_existing,
            self.skipped_in_run,
            self.skipped_unidentifiable,
            inserted
        )
    }
}

/// A run that ended in `Aborted`.
#[derive(Debug, Error)]
#[error("run aborted while {state} ({partial}): {source}")]
pub struct RunAborted {
    /// State the failure happened in
    pub state: PipelineState,
    /// Progress up to the abort; `inserted` rows stay committed
    pub partial: RunSummary,
    #[source]
    pub source: MigrationError,
}

impl RunAborted {
    /// Abort in `Configuring` for a failure found before the pipeline could be built,
    /// such as settings that do not validate or a target that cannot be opened.
    pub fn before_start(source: MigrationError) -> Self {
        let state = PipelineState::Configuring;
        error!(%state, error = %source, "Pipeline aborted before start");
        metrics::run::aborted(&state.to_string());
        RunAborted {
            state,
            partial: RunSummary::default(),
            source,
        }
    }
}

/// Sequences Extract → Normalize → Dedupe → Load and reports the result.
///
/// Adapters are passed in; there is no process-wide store handle.
pub struct MigrateUseCase<'a> {
    source: &'a dyn SourceStore,
    target: &'a dyn TargetStore,
    normalizer: Normalizer,
    settings: RunSettings,
    state: PipelineState,
    trail: Vec<PipelineState>,
}

impl<'a> MigrateUseCase<'a> {
    pub fn new(
        source: &'a dyn SourceStore,
        target: &'a dyn TargetStore,
        normalizer: Normalizer,
        settings: RunSettings,
    ) -> Self {
        Self {
            source,
            target,
            normalizer,
            settings,
            state: PipelineState::Configuring,
            trail: vec![PipelineState::Configuring],
        }
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Every state visited so far, in order.
    pub fn trail(&self) -> &[PipelineState] {
        &self.trail
    }

    fn enter(&mut self, next: PipelineState) {
        info!(from = %self.state, to = %next, "Pipeline transition");
        self.state = next;
        self.trail.push(next);
    }

    fn abort(&mut self, partial: RunSummary, source: MigrationError) -> RunAborted {
        let state = self.state;
        error!(%state, error = %source, "Pipeline aborted");
        metrics::run::aborted(&state.to_string());
        self.enter(PipelineState::Aborted);
        RunAborted {
            state,
            partial,
            source,
        }
    }

    #[instrument(skip(self), fields(
        collection = %self.settings.collection,
        table = %self.settings.target_table,
        country = %self.settings.country,
        dry_run = self.settings.dry_run,
    ))]
    pub async fn run(&mut self) -> Result<RunSummary, RunAborted> {
        let mut summary = RunSummary {
            dry_run: self.settings.dry_run,
            ..RunSummary::default()
        };

        // Configuring: settings are already validated; the target schema is checked by
        // the identity read, which must succeed before anything is extracted.
        let existing = match self.configure().await {
            Ok(index) => index,
            Err(e) => return Err(self.abort(summary, e)),
        };

        self.enter(PipelineState::Extracting);
        let records = match self.source.read_all(&self.settings.collection).await {
            Ok(records) => records,
            Err(e) => {
                metrics::source::read_error();
                let err = MigrationError::SourceRead(format!(
                    "collection '{}': {}",
                    self.settings.collection, e
                ));
                return Err(self.abort(summary, err));
            }
        };
        summary.total_seen = records.len();
        metrics::source::records_read(records.len());
        info!(records = records.len(), "Extracted source records");

        self.enter(PipelineState::Normalizing);
        let candidates = self.normalize_all(records);

        self.enter(PipelineState::Deduplicating);
        let outcome = Deduplicator::new(self.settings.skip_unidentifiable).dedupe(candidates, &existing);
        summary.skipped_existing = outcome.count(SkipReason::AlreadyMigrated);
        summary.skipped_in_run = outcome.count(SkipReason::DuplicateInRun);
        summary.skipped_unidentifiable = outcome.count(SkipReason::NoIdentity);
        summary.to_insert = outcome.kept.len();
        metrics::dedupe::records_kept(outcome.kept.len());
        metrics::dedupe::records_skipped("already_migrated", summary.skipped_existing);
        metrics::dedupe::records_skipped("duplicate_in_run", summary.skipped_in_run);
        metrics::dedupe::records_skipped("no_identity", summary.skipped_unidentifiable);
        info!(
            kept = outcome.kept.len(),
            skipped = outcome.skipped.len(),
            "Deduplicated candidates"
        );

        if self.settings.dry_run {
            info!(would_insert = outcome.kept.len(), "Dry run, skipping load");
        } else {
            self.enter(PipelineState::Loading);
            match self.load(&outcome.kept).await {
                Ok(inserted) => summary.inserted = inserted,
                Err(e) => {
                    if let MigrationError::LoadChunk { committed, .. } = &e {
                        summary.inserted = *committed;
                    }
                    return Err(self.abort(summary, e));
                }
            }
        }

        self.enter(PipelineState::Reporting);
        info!(
            total_seen = summary.total_seen,
            skipped_duplicates = summary.skipped_duplicates(),
            skipped_unidentifiable = summary.skipped_unidentifiable,
            inserted = summary.inserted,
            "Run summary"
        );
        metrics::run::completed();
        self.enter(PipelineState::Completed);
        Ok(summary)
    }

    async fn configure(&self) -> Result<IdentityIndex, MigrationError> {
        let index = load_existing_identities(self.target, &self.settings.target_table).await?;
        if index.is_empty() {
            warn!(table = %self.settings.target_table, "Target table holds no identities yet");
        }
        Ok(index)
    }

    fn normalize_all(&self, records: Vec<SourceRecord>) -> Vec<(SourceRecord, NormalizedService)> {
        let candidates: Vec<_> = records
            .into_iter()
            .map(|record| {
                let service = self.normalizer.normalize(&record, &self.settings.country);
                (record, service)
            })
            .collect();
        metrics::normalize::records_processed(candidates.len());
        candidates
    }

    async fn load(&self, services: &[NormalizedService]) -> Result<usize, MigrationError> {
        let loader = ChunkedLoader::new(self.settings.chunk_size).with_timeout(self.settings.chunk_timeout);
        let report = loader
            .load(self.target, &self.settings.target_table, services)
            .await?;
        Ok(report.inserted)
    }
}
