use crate::data::FriendStore;
use crate::output;
use crate::session::{SessionError, restore_session};
use crate::snapshot::{SnapshotError, SnapshotWriter};
use amity_scanner::{
    CandidateRecord, FriendListExtractor, ListingSelectors, PageDriver, RecordExtractor, ScanError,
    ScrollController, ScrollOptions,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid listing selectors: {0}")]
    Selectors(ScanError),

    #[error("session load failed: {0}")]
    Session(#[from] SessionError),

    #[error("snapshot failed: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] rusqlite::Error),
}

/// Steps of a pipeline run, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    LoadSession,
    Extract,
    Snapshot,
    UpsertSubject,
    UpsertRelations,
    UpdateCounts,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Init => "init",
            Stage::LoadSession => "load_session",
            Stage::Extract => "extract",
            Stage::Snapshot => "snapshot",
            Stage::UpsertSubject => "upsert_subject",
            Stage::UpsertRelations => "upsert_relations",
            Stage::UpdateCounts => "update_counts",
        }
    }
}

/// What a successful run wrote
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestSummary {
    pub subject_id: i64,
    pub extracted: usize,
    pub new_relations: usize,
    pub queued: usize,
    pub friend_count: i64,
    pub snapshot_path: PathBuf,
}

#[derive(Debug)]
pub enum RunOutcome {
    Succeeded(IngestSummary),
    /// Extraction finished without a single record; nothing was written
    NoData,
    Failed { stage: Stage, error: PipelineError },
}

/// Result of one pipeline invocation
#[derive(Debug)]
pub struct PipelineRunState {
    pub subject: String,
    pub outcome: RunOutcome,
}

impl PipelineRunState {
    pub fn success(&self) -> bool {
        matches!(self.outcome, RunOutcome::Succeeded(_))
    }

    pub fn summary(&self) -> Option<&IngestSummary> {
        match self.outcome {
            RunOutcome::Succeeded(ref summary) => Some(summary),
            _ => None,
        }
    }
}

/// Options for a friend list ingestion
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub subject: String,
    /// Queue every discovered profile for its own crawl
    pub crawl: bool,
    pub scroll: ScrollOptions,
    pub selectors: ListingSelectors,
    pub cookie_file: Option<PathBuf>,
    pub show_progress: bool,
}

impl PipelineOptions {
    /// `target_count` of 0 collects until the listing stops growing
    pub fn new(subject: impl Into<String>, crawl: bool, target_count: usize) -> Self {
        Self {
            subject: subject.into(),
            crawl,
            scroll: ScrollOptions {
                target_count,
                ..ScrollOptions::default()
            },
            selectors: ListingSelectors::default(),
            cookie_file: None,
            show_progress: false,
        }
    }
}

/// Collects one subject's friend list and ingests it into the store.
///
/// ```text
/// LOAD_SESSION -> EXTRACT -> (empty) -> no data
///                         -> SNAPSHOT -> UPSERT_SUBJECT -> UPSERT_RELATIONS -> UPDATE_COUNTS
/// ```
///
/// Every write re-checks existence first, so a run that failed halfway can
/// simply be repeated.
pub struct IngestionPipeline {
    options: PipelineOptions,
    succeeded: bool,
}

impl IngestionPipeline {
    pub fn new(options: PipelineOptions) -> Self {
        Self {
            options,
            succeeded: false,
        }
    }

    /// Whether the most recent run succeeded
    pub fn is_pipeline_successful(&self) -> bool {
        self.succeeded
    }

    /// Runs the pipeline with the default friend list extractor.
    ///
    /// The driver is released before returning, whatever the outcome.
    pub async fn run<D, S>(
        &mut self,
        driver: D,
        store: &S,
        snapshots: &SnapshotWriter,
    ) -> PipelineRunState
    where
        D: PageDriver,
        S: FriendStore,
    {
        match FriendListExtractor::new(&self.options.selectors) {
            Ok(extractor) => self.run_with(driver, &extractor, store, snapshots).await,
            Err(e) => {
                let mut driver = driver;
                release_driver(&mut driver).await;
                error!("Invalid listing selectors: {}", e);
                self.finish(RunOutcome::Failed {
                    stage: Stage::Init,
                    error: PipelineError::Selectors(e),
                })
            }
        }
    }

    pub async fn run_with<D, E, S>(
        &mut self,
        mut driver: D,
        extractor: &E,
        store: &S,
        snapshots: &SnapshotWriter,
    ) -> PipelineRunState
    where
        D: PageDriver,
        E: RecordExtractor + ?Sized,
        S: FriendStore,
    {
        let mut stage = Stage::Init;
        let result = self
            .execute(&mut driver, extractor, store, snapshots, &mut stage)
            .await;
        release_driver(&mut driver).await;

        let outcome = match result {
            Ok(Some(summary)) => RunOutcome::Succeeded(summary),
            Ok(None) => RunOutcome::NoData,
            Err(error) => {
                error!(
                    "Run for {} failed during {}: {}",
                    self.options.subject,
                    stage.as_str(),
                    error
                );
                if self.options.show_progress {
                    eprintln!("An error occurred: {}", error);
                }
                RunOutcome::Failed { stage, error }
            }
        };

        self.finish(outcome)
    }

    fn finish(&mut self, outcome: RunOutcome) -> PipelineRunState {
        let state = PipelineRunState {
            subject: self.options.subject.clone(),
            outcome,
        };
        self.succeeded = state.success();
        state
    }

    async fn execute<D, E, S>(
        &self,
        driver: &mut D,
        extractor: &E,
        store: &S,
        snapshots: &SnapshotWriter,
        stage: &mut Stage,
    ) -> Result<Option<IngestSummary>, PipelineError>
    where
        D: PageDriver,
        E: RecordExtractor + ?Sized,
        S: FriendStore,
    {
        let show = self.options.show_progress;
        let subject = self.options.subject.as_str();

        *stage = Stage::LoadSession;
        if show {
            output::print_step(1, 2, "Load cookies");
        }
        restore_session(driver, self.options.cookie_file.as_deref()).await?;

        *stage = Stage::Extract;
        if show {
            output::print_step(2, 2, "Extracting friends data");
        }
        let records = self.extract(driver, extractor).await;
        if records.is_empty() {
            info!("No friends extracted for {}", subject);
            if show {
                output::print_no_data_info();
            }
            return Ok(None);
        }
        if show {
            output::print_records_table(&records);
            output::print_saving_notice();
        }

        *stage = Stage::Snapshot;
        let snapshot_path = snapshots.save(subject, &records)?;

        *stage = Stage::UpsertSubject;
        let subject_id = upsert_subject(store, subject)?;

        *stage = Stage::UpsertRelations;
        let (new_relations, queued) =
            upsert_relations(store, subject_id, &records, self.options.crawl)?;

        *stage = Stage::UpdateCounts;
        let friend_count = update_friend_count(store, subject_id)?;
        if show {
            output::print_person_updated();
        }

        info!(
            "Ingested {} friends for {} ({} new, {} queued, {} total)",
            records.len(),
            subject,
            new_relations,
            queued,
            friend_count
        );

        Ok(Some(IngestSummary {
            subject_id,
            extracted: records.len(),
            new_relations,
            queued,
            friend_count,
            snapshot_path,
        }))
    }

    async fn extract<D, E>(&self, driver: &mut D, extractor: &E) -> Vec<CandidateRecord>
    where
        D: PageDriver,
        E: RecordExtractor + ?Sized,
    {
        let mut controller = ScrollController::new(self.options.scroll.clone());

        let spinner = if self.options.show_progress {
            let pb = ProgressBar::new_spinner();
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{spinner:.cyan} {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.enable_steady_tick(Duration::from_millis(100));
            pb.set_message("Scrolling...");

            let record_pb = pb.clone();
            let cycle_pb = pb.clone();
            controller = controller
                .with_record_callback(Arc::new(move |record: &CandidateRecord| {
                    record_pb.println(output::extracted_friend_line(record));
                }))
                .with_cycle_callback(Arc::new(move |cycle: usize, total: usize| {
                    cycle_pb.set_message(format!("Scroll {}: {} friends found", cycle, total));
                }));
            Some(pb)
        } else {
            None
        };

        let collection = controller.collect(driver, extractor).await;

        if let Some(pb) = spinner {
            pb.finish_with_message(format!(
                "Extraction finished: {} friends ({})",
                collection.records.len(),
                collection.stop_reason.as_str()
            ));
        }
        if collection.failed_cycles > 0 {
            warn!(
                "{} of {} extraction cycles failed",
                collection.failed_cycles, collection.iterations
            );
        }

        collection.records.into_vec()
    }
}

async fn release_driver<D: PageDriver>(driver: &mut D) {
    if let Err(e) = driver.quit().await {
        warn!("Failed to release page driver: {}", e);
    }
}

/// Returns the subject's id, creating the subject on first sight
pub fn upsert_subject<S: FriendStore>(store: &S, identifier: &str) -> rusqlite::Result<i64> {
    if !store.subject_exists(identifier)? {
        store.create_subject(identifier)?;
    }
    store
        .get_subject(identifier)?
        .map(|subject| subject.id)
        .ok_or(rusqlite::Error::QueryReturnedNoRows)
}

/// Inserts missing relations and, when crawling, queues every locator that is
/// not queued yet. Returns (new relations, new queue entries).
pub fn upsert_relations<S: FriendStore>(
    store: &S,
    subject_id: i64,
    records: &[CandidateRecord],
    crawl: bool,
) -> rusqlite::Result<(usize, usize)> {
    let mut new_relations = 0;
    let mut queued = 0;

    for record in records {
        // Queued regardless of whether the relation is new
        if crawl && !store.queue_entry_exists(&record.locator)? {
            store.create_queue_entry(&record.locator)?;
            queued += 1;
        }

        if !store.relation_exists(subject_id, &record.label, &record.locator)? {
            store.create_relation(subject_id, &record.label, &record.locator)?;
            new_relations += 1;
        }
    }

    Ok((new_relations, queued))
}

/// Recounts the subject's relations and stores the total
pub fn update_friend_count<S: FriendStore>(store: &S, subject_id: i64) -> rusqlite::Result<i64> {
    let friend_count = store.count_relations(subject_id)?;
    store.update_friend_count(subject_id, friend_count)?;
    Ok(friend_count)
}
