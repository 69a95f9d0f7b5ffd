// Tests for the ingestion pipeline

use amity_core::data::{CrawlQueueEntry, Database, FriendRelation, FriendStore, Subject};
use amity_core::pipeline::{IngestionPipeline, PipelineError, PipelineOptions, RunOutcome, Stage};
use amity_core::snapshot::SnapshotWriter;
use amity_scanner::error::Result as ScanResult;
use amity_scanner::{ListingSelectors, PageDriver, RenderedPage, ScanError, SessionCookie};
use std::cell::Cell;
use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

/// Serves one scripted listing per scroll position; the last one repeats.
struct ScriptedDriver {
    pages: Vec<Vec<(&'static str, &'static str)>>,
    position: usize,
    fail_refresh: bool,
    cookies_loaded: Arc<AtomicUsize>,
    quit_calls: Arc<AtomicUsize>,
}

impl ScriptedDriver {
    fn new(pages: Vec<Vec<(&'static str, &'static str)>>) -> Self {
        Self {
            pages,
            position: 0,
            fail_refresh: false,
            cookies_loaded: Arc::new(AtomicUsize::new(0)),
            quit_calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    fn failing_refresh() -> Self {
        Self {
            fail_refresh: true,
            ..Self::new(vec![vec![("A", "/a")]])
        }
    }
}

impl PageDriver for ScriptedDriver {
    async fn load_cookies(&mut self, cookies: &[SessionCookie]) -> ScanResult<()> {
        self.cookies_loaded.store(cookies.len(), Ordering::SeqCst);
        Ok(())
    }

    async fn refresh(&mut self) -> ScanResult<()> {
        if self.fail_refresh {
            return Err(ScanError::Other("connection reset".to_string()));
        }
        self.position = 0;
        Ok(())
    }

    async fn scroll_to_end(&mut self) -> ScanResult<()> {
        self.position = (self.position + 1).min(self.pages.len() - 1);
        Ok(())
    }

    async fn rendered_page(&mut self) -> ScanResult<RenderedPage> {
        let mut html = String::from(r#"<html><body><div class="friends">"#);
        for (label, href) in &self.pages[self.position] {
            html.push_str(&format!(
                r#"<a class="friend" href="{}"><span>{}</span></a>"#,
                href, label
            ));
        }
        html.push_str("</div></body></html>");
        Ok(RenderedPage::new("https://social.example/alice/friends", html))
    }

    async fn quit(&mut self) -> ScanResult<()> {
        self.quit_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Delegates to a database but fails relation inserts after `allowed` succeed
struct FailingStore<'a> {
    db: &'a Database,
    allowed: Cell<usize>,
}

impl FriendStore for FailingStore<'_> {
    fn subject_exists(&self, identifier: &str) -> rusqlite::Result<bool> {
        self.db.subject_exists(identifier)
    }

    fn create_subject(&self, identifier: &str) -> rusqlite::Result<i64> {
        self.db.create_subject(identifier)
    }

    fn get_subject(&self, identifier: &str) -> rusqlite::Result<Option<Subject>> {
        self.db.get_subject(identifier)
    }

    fn update_friend_count(&self, subject_id: i64, friend_count: i64) -> rusqlite::Result<()> {
        self.db.update_friend_count(subject_id, friend_count)
    }

    fn relation_exists(&self, subject_id: i64, label: &str, locator: &str) -> rusqlite::Result<bool> {
        self.db.relation_exists(subject_id, label, locator)
    }

    fn create_relation(&self, subject_id: i64, label: &str, locator: &str) -> rusqlite::Result<i64> {
        if self.allowed.get() == 0 {
            return Err(rusqlite::Error::InvalidQuery);
        }
        self.allowed.set(self.allowed.get() - 1);
        self.db.create_relation(subject_id, label, locator)
    }

    fn count_relations(&self, subject_id: i64) -> rusqlite::Result<i64> {
        self.db.count_relations(subject_id)
    }

    fn queue_entry_exists(&self, locator: &str) -> rusqlite::Result<bool> {
        self.db.queue_entry_exists(locator)
    }

    fn create_queue_entry(&self, locator: &str) -> rusqlite::Result<i64> {
        self.db.create_queue_entry(locator)
    }
}

struct Fixture {
    dir: TempDir,
    db: Database,
    snapshots: SnapshotWriter,
}

fn fixture() -> Fixture {
    let dir = TempDir::new().unwrap();
    let db = Database::new(&dir.path().join("amity.db")).unwrap();
    let snapshots = SnapshotWriter::new(dir.path().join("snapshots"));
    Fixture { dir, db, snapshots }
}

fn options(subject: &str, crawl: bool, target_count: usize) -> PipelineOptions {
    let mut options = PipelineOptions::new(subject, crawl, target_count);
    options.scroll.idle_wait = Duration::ZERO;
    options.scroll.stable_rounds = 1;
    options.selectors = ListingSelectors {
        container: "div.friends".to_string(),
        item: "a.friend span".to_string(),
    };
    options
}

fn friends_page() -> ScriptedDriver {
    ScriptedDriver::new(vec![
        vec![("A", "/url1"), ("B", "/url2")],
        vec![("A", "/url1"), ("B", "/url2"), ("A", "/url1")],
    ])
}

fn relations(db: &Database, subject: &str) -> Vec<FriendRelation> {
    let subject = db.get_subject(subject).unwrap().unwrap();
    db.list_relations(subject.id).unwrap()
}

fn queue(db: &Database) -> Vec<String> {
    db.list_crawl_queue()
        .unwrap()
        .into_iter()
        .map(|entry: CrawlQueueEntry| entry.locator)
        .collect()
}

// ============================================================================
// Successful Runs
// ============================================================================

#[tokio::test]
async fn test_duplicate_cycles_ingest_once() {
    let fx = fixture();
    let mut pipeline = IngestionPipeline::new(options("alice", false, 0));

    let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;

    assert!(state.success());
    assert!(pipeline.is_pipeline_successful());
    let summary = state.summary().unwrap();
    assert_eq!(summary.extracted, 2);
    assert_eq!(summary.new_relations, 2);
    assert_eq!(summary.friend_count, 2);

    let stored: Vec<(String, String)> = relations(&fx.db, "alice")
        .into_iter()
        .map(|r| (r.label, r.locator))
        .collect();
    assert_eq!(
        stored,
        vec![
            ("A".to_string(), "https://social.example/url1".to_string()),
            ("B".to_string(), "https://social.example/url2".to_string()),
        ]
    );
    assert_eq!(
        fx.db.get_subject("alice").unwrap().unwrap().friend_count,
        2
    );
}

#[tokio::test]
async fn test_second_run_is_idempotent() {
    let fx = fixture();

    for _ in 0..2 {
        let mut pipeline = IngestionPipeline::new(options("alice", true, 0));
        let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;
        assert!(state.success());
    }

    assert_eq!(fx.db.list_subjects().unwrap().len(), 1);
    assert_eq!(relations(&fx.db, "alice").len(), 2);
    assert_eq!(
        fx.db.get_subject("alice").unwrap().unwrap().friend_count,
        2
    );
    assert_eq!(queue(&fx.db).len(), 2);
}

#[tokio::test]
async fn test_second_run_reports_nothing_new() {
    let fx = fixture();
    let mut pipeline = IngestionPipeline::new(options("alice", true, 0));

    pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;
    let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;

    let summary = state.summary().unwrap();
    assert_eq!(summary.new_relations, 0);
    assert_eq!(summary.queued, 0);
    assert_eq!(summary.friend_count, 2);
}

#[tokio::test]
async fn test_snapshot_written_with_extraction() {
    let fx = fixture();
    let mut pipeline = IngestionPipeline::new(options("alice", false, 0));

    let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;

    let summary = state.summary().unwrap();
    assert_eq!(
        summary.snapshot_path,
        fx.dir.path().join("snapshots").join("alice.json")
    );
    let saved = fx.snapshots.load("alice").unwrap();
    let labels: Vec<&str> = saved.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["A", "B"]);
}

#[tokio::test]
async fn test_target_count_limits_ingestion() {
    let fx = fixture();
    let mut pipeline = IngestionPipeline::new(options("alice", false, 1));

    let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;

    assert!(state.success());
    assert_eq!(relations(&fx.db, "alice").len(), 1);
    assert_eq!(state.summary().unwrap().friend_count, 1);
}

#[tokio::test]
async fn test_driver_released_after_success() {
    let fx = fixture();
    let driver = friends_page();
    let quit_calls = driver.quit_calls.clone();

    let mut pipeline = IngestionPipeline::new(options("alice", false, 0));
    pipeline.run(driver, &fx.db, &fx.snapshots).await;

    assert_eq!(quit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_cookie_file_is_loaded_into_driver() {
    let fx = fixture();
    let cookie_path = fx.dir.path().join("cookies.json");
    let mut file = std::fs::File::create(&cookie_path).unwrap();
    write!(
        file,
        r#"[{{"name": "c_user", "value": "42"}}, {{"name": "xs", "value": "s"}}]"#
    )
    .unwrap();

    let driver = friends_page();
    let cookies_loaded = driver.cookies_loaded.clone();

    let mut opts = options("alice", false, 0);
    opts.cookie_file = Some(cookie_path);
    let state = IngestionPipeline::new(opts)
        .run(driver, &fx.db, &fx.snapshots)
        .await;

    assert!(state.success());
    assert_eq!(cookies_loaded.load(Ordering::SeqCst), 2);
}

// ============================================================================
// Counts and Queue
// ============================================================================

#[tokio::test]
async fn test_stale_friend_count_is_recomputed() {
    let fx = fixture();
    let subject_id = fx.db.create_subject("alice").unwrap();
    fx.db
        .create_relation(subject_id, "Old Friend", "https://social.example/old")
        .unwrap();
    fx.db.update_friend_count(subject_id, 99).unwrap();

    let mut pipeline = IngestionPipeline::new(options("alice", false, 0));
    let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;

    assert!(state.success());
    let subject = fx.db.get_subject("alice").unwrap().unwrap();
    assert_eq!(subject.id, subject_id);
    assert_eq!(subject.friend_count, 3);
}

#[tokio::test]
async fn test_crawl_disabled_leaves_queue_empty() {
    let fx = fixture();
    let mut pipeline = IngestionPipeline::new(options("alice", false, 0));

    let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;

    assert_eq!(state.summary().unwrap().queued, 0);
    assert!(queue(&fx.db).is_empty());
}

#[tokio::test]
async fn test_crawl_enabled_queues_each_locator_once() {
    let fx = fixture();
    let mut pipeline = IngestionPipeline::new(options("alice", true, 0));

    let state = pipeline.run(friends_page(), &fx.db, &fx.snapshots).await;

    assert_eq!(state.summary().unwrap().queued, 2);
    assert_eq!(
        queue(&fx.db),
        vec![
            "https://social.example/url1".to_string(),
            "https://social.example/url2".to_string(),
        ]
    );
}

#[tokio::test]
async fn test_existing_relations_still_get_queued() {
    let fx = fixture();

    IngestionPipeline::new(options("alice", false, 0))
        .run(friends_page(), &fx.db, &fx.snapshots)
        .await;
    assert!(queue(&fx.db).is_empty());

    let state = IngestionPipeline::new(options("alice", true, 0))
        .run(friends_page(), &fx.db, &fx.snapshots)
        .await;

    let summary = state.summary().unwrap();
    assert_eq!(summary.new_relations, 0);
    assert_eq!(summary.queued, 2);
}

#[tokio::test]
async fn test_shared_locator_queued_once_across_subjects() {
    let fx = fixture();

    IngestionPipeline::new(options("alice", true, 0))
        .run(friends_page(), &fx.db, &fx.snapshots)
        .await;
    IngestionPipeline::new(options("carol", true, 0))
        .run(friends_page(), &fx.db, &fx.snapshots)
        .await;

    assert_eq!(fx.db.list_subjects().unwrap().len(), 2);
    assert_eq!(queue(&fx.db).len(), 2);
    assert_eq!(relations(&fx.db, "carol").len(), 2);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_empty_extraction_writes_nothing() {
    let fx = fixture();
    let driver = ScriptedDriver::new(vec![vec![]]);
    let quit_calls = driver.quit_calls.clone();

    let mut pipeline = IngestionPipeline::new(options("alice", true, 0));
    let state = pipeline.run(driver, &fx.db, &fx.snapshots).await;

    assert!(!state.success());
    assert!(!pipeline.is_pipeline_successful());
    assert!(matches!(state.outcome, RunOutcome::NoData));
    assert!(fx.db.list_subjects().unwrap().is_empty());
    assert!(queue(&fx.db).is_empty());
    assert!(fx.snapshots.load("alice").is_err());
    assert_eq!(quit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_refresh_failure_fails_run() {
    let fx = fixture();
    let driver = ScriptedDriver::failing_refresh();
    let quit_calls = driver.quit_calls.clone();

    let mut pipeline = IngestionPipeline::new(options("alice", false, 0));
    let state = pipeline.run(driver, &fx.db, &fx.snapshots).await;

    assert!(!state.success());
    assert!(matches!(
        state.outcome,
        RunOutcome::Failed {
            stage: Stage::LoadSession,
            error: PipelineError::Session(_)
        }
    ));
    assert!(fx.db.list_subjects().unwrap().is_empty());
    assert_eq!(quit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_cookie_file_fails_run() {
    let fx = fixture();
    let driver = friends_page();
    let quit_calls = driver.quit_calls.clone();

    let mut opts = options("alice", false, 0);
    opts.cookie_file = Some(fx.dir.path().join("missing.json"));
    let state = IngestionPipeline::new(opts)
        .run(driver, &fx.db, &fx.snapshots)
        .await;

    assert!(matches!(
        state.outcome,
        RunOutcome::Failed {
            stage: Stage::LoadSession,
            ..
        }
    ));
    assert_eq!(quit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_invalid_selectors_fail_run() {
    let fx = fixture();
    let driver = friends_page();
    let quit_calls = driver.quit_calls.clone();

    let mut opts = options("alice", false, 0);
    opts.selectors.container = "div[".to_string();
    let state = IngestionPipeline::new(opts)
        .run(driver, &fx.db, &fx.snapshots)
        .await;

    assert!(matches!(
        state.outcome,
        RunOutcome::Failed {
            stage: Stage::Init,
            error: PipelineError::Selectors(_)
        }
    ));
    assert_eq!(quit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_snapshot_failure_fails_run_before_persistence() {
    let fx = fixture();
    let blocker = fx.dir.path().join("blocker");
    std::fs::write(&blocker, "not a directory").unwrap();
    let snapshots = SnapshotWriter::new(blocker.join("snapshots"));

    let driver = friends_page();
    let quit_calls = driver.quit_calls.clone();

    let mut pipeline = IngestionPipeline::new(options("alice", true, 0));
    let state = pipeline.run(driver, &fx.db, &snapshots).await;

    assert!(!state.success());
    assert!(!pipeline.is_pipeline_successful());
    assert!(matches!(
        state.outcome,
        RunOutcome::Failed {
            stage: Stage::Snapshot,
            error: PipelineError::Snapshot(_)
        }
    ));
    assert!(fx.db.list_subjects().unwrap().is_empty());
    assert!(queue(&fx.db).is_empty());
    assert_eq!(quit_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_persistence_failure_keeps_committed_rows_and_retry_heals() {
    let fx = fixture();
    let driver = ScriptedDriver::new(vec![vec![("A", "/a"), ("B", "/b"), ("C", "/c")]]);
    let quit_calls = driver.quit_calls.clone();
    let failing = FailingStore {
        db: &fx.db,
        allowed: Cell::new(1),
    };

    let mut pipeline = IngestionPipeline::new(options("alice", false, 0));
    let state = pipeline.run(driver, &failing, &fx.snapshots).await;

    assert!(!state.success());
    assert!(matches!(
        state.outcome,
        RunOutcome::Failed {
            stage: Stage::UpsertRelations,
            error: PipelineError::Persistence(_)
        }
    ));
    assert_eq!(quit_calls.load(Ordering::SeqCst), 1);

    // The snapshot precedes the database writes
    assert_eq!(fx.snapshots.load("alice").unwrap().len(), 3);
    // No rollback: the first relation stays, the count was never updated
    assert_eq!(relations(&fx.db, "alice").len(), 1);
    assert_eq!(
        fx.db.get_subject("alice").unwrap().unwrap().friend_count,
        0
    );

    let retry = ScriptedDriver::new(vec![vec![("A", "/a"), ("B", "/b"), ("C", "/c")]]);
    let state = pipeline.run(retry, &fx.db, &fx.snapshots).await;

    assert!(state.success());
    assert!(pipeline.is_pipeline_successful());
    assert_eq!(state.summary().unwrap().new_relations, 2);
    assert_eq!(relations(&fx.db, "alice").len(), 3);
    assert_eq!(
        fx.db.get_subject("alice").unwrap().unwrap().friend_count,
        3
    );
}
