//! Test harness for isolated workflow runs.
//!
//! The `TestHarness` owns a temporary directory tree, a job registry and a
//! progress channel. Every event the workflow reports is also recorded so
//! tests can assert on the full sequence regardless of subscribers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use vidsynth::pipeline::{PipelineConfig, ProgressReporter, RecordingProgress, StageProviders};
use vidsynth::{Database, Job, JobStore, ProgressChannel, ProgressEvent, VideoRequest, Workflow, WorkerPool};

/// Reports every event to both the channel and the recorder.
struct Tee {
    channel: Arc<ProgressChannel>,
    recorder: Arc<RecordingProgress>,
}

impl ProgressReporter for Tee {
    fn report(&self, event: ProgressEvent) {
        self.recorder.report(event.clone());
        self.channel.report(event);
    }
}

pub struct TestHarness {
    temp_dir: TempDir,
    pub config: PipelineConfig,
    pub registry: Arc<JobStore>,
    pub database: Option<Database>,
    pub channel: Arc<ProgressChannel>,
    pub recorder: Arc<RecordingProgress>,
}

impl TestHarness {
    /// In-memory registry, 5 second provider timeouts.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let registry = Arc::new(JobStore::new());
        Self::assemble(temp_dir, registry, None)
    }

    /// Registry backed by a SQLite file inside the temp directory.
    pub fn with_database() -> Self {
        Self::open_database(None)
    }

    /// Like [`TestHarness::with_database`], but job leases last only `lease`.
    pub fn with_lease(lease: Duration) -> Self {
        Self::open_database(Some(lease))
    }

    fn open_database(lease: Option<Duration>) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(&temp_dir.path().join("jobs.db")).expect("Failed to open database");
        let mut store = JobStore::with_database(db.clone());
        if let Some(lease) = lease {
            store = store.with_lease(lease);
        }
        Self::assemble(temp_dir, Arc::new(store), Some(db))
    }

    fn assemble(temp_dir: TempDir, registry: Arc<JobStore>, database: Option<Database>) -> Self {
        let config =
            PipelineConfig::rooted_at(temp_dir.path()).with_timeouts(Duration::from_secs(5));
        Self {
            temp_dir,
            config,
            registry,
            database,
            channel: Arc::new(ProgressChannel::default()),
            recorder: Arc::new(RecordingProgress::new()),
        }
    }

    /// Makes every later registry write fail while reads keep working.
    pub fn make_database_read_only(&self) {
        self.database
            .as_ref()
            .expect("harness has no database")
            .with_conn(|conn| {
                conn.execute_batch("PRAGMA query_only = ON;")?;
                Ok(())
            })
            .expect("Failed to make database read-only");
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn output_dir(&self) -> PathBuf {
        self.config.output_directory.clone()
    }

    pub fn database_path(&self) -> PathBuf {
        self.temp_dir.path().join("jobs.db")
    }

    fn reporter(&self) -> Arc<dyn ProgressReporter> {
        Arc::new(Tee {
            channel: self.channel.clone(),
            recorder: self.recorder.clone(),
        })
    }

    pub fn workflow(&self, providers: StageProviders) -> Workflow {
        Workflow::new(
            self.config.clone(),
            providers,
            self.registry.clone(),
            self.reporter(),
        )
    }

    pub fn pool(&self, providers: StageProviders, max_concurrent_jobs: usize) -> WorkerPool {
        WorkerPool::new(
            Arc::new(self.workflow(providers)),
            self.channel.clone(),
            max_concurrent_jobs,
        )
    }

    /// Records a PENDING job for `request`.
    pub fn create_job(&self, request: &VideoRequest) -> Job {
        self.registry
            .create(Job::new(request))
            .expect("Failed to create job")
    }

    /// Progress values reported for `job_id`, in order.
    pub fn progress_of(&self, job_id: &str) -> Vec<u8> {
        self.recorder
            .events_for(job_id)
            .iter()
            .map(|e| e.progress)
            .collect()
    }

    pub fn events_of(&self, job_id: &str) -> Vec<ProgressEvent> {
        self.recorder.events_for(job_id)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
