//! Job registry with optional durable storage.
//!
//! Without a database the in-memory cache holds every job. With one, the
//! database row is authoritative: several processes may share the file, so
//! reads and updates go to the row and the cache only mirrors it.
//!
//! Non-terminal rows carry a lease. The process running a job keeps renewing
//! it; [`JobStore::fail_interrupted`] only touches jobs whose lease ran out.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use crate::db::job_repo::{self, JobFilter, JobRow};
use crate::db::{Database, DatabaseError};
use crate::error::RegistryError;
use crate::worker::job::{Job, JobStatus};

/// Message recorded on jobs that were still running when the process stopped.
pub const INTERRUPTED_ERROR: &str = "Interrupted by process restart";

/// How long a job stays owned by its runner without a renewal.
pub const DEFAULT_LEASE: Duration = Duration::from_secs(60);

// ─── Helpers ────────────────────────────────────────────────────────────────

fn parse_status(s: &str, job_id: &str) -> JobStatus {
    JobStatus::parse(s).unwrap_or_else(|| {
        log::warn!(
            "Unknown job status '{}' for job {}, defaulting to Failed",
            s,
            job_id
        );
        JobStatus::Failed
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|e| {
            log::warn!("parse_timestamp: failed to parse '{}': {}", s, e);
            Utc::now()
        })
}

fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

fn lease_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

fn encode<T: Serialize>(value: &Option<T>) -> Result<Option<String>, serde_json::Error> {
    value.as_ref().map(serde_json::to_string).transpose()
}

fn decode<T: for<'de> Deserialize<'de>>(
    job_id: &str,
    column: &'static str,
    raw: &Option<String>,
) -> Result<Option<T>, DatabaseError> {
    raw.as_deref()
        .map(|s| {
            serde_json::from_str(s).map_err(|e| DatabaseError::Decode {
                job_id: job_id.to_string(),
                column,
                reason: e.to_string(),
            })
        })
        .transpose()
}

fn job_to_row(job: &Job) -> Result<JobRow, serde_json::Error> {
    Ok(JobRow {
        id: job.id.clone(),
        topic: job.topic.clone(),
        style_data: serde_json::to_string(&job.style)?,
        llm_provider: job.llm_provider.clone(),
        duration_secs: job.duration_secs,
        include_voiceover: job.include_voiceover,
        status: job.status.as_str().to_string(),
        progress: job.progress,
        message: Some(job.message.clone()),
        script_data: encode(&job.script)?,
        blueprint_data: encode(&job.blueprint)?,
        audio_data: encode(&job.audio)?,
        video_path: job.video_path.as_ref().map(|p| p.display().to_string()),
        report_url: job.report_url.clone(),
        error: job.error.clone(),
        warnings: if job.warnings.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&job.warnings)?)
        },
        created_at: format_timestamp(job.created_at),
        updated_at: format_timestamp(job.updated_at),
        completed_at: job.completed_at.map(format_timestamp),
        lease_expires_at: None,
    })
}

fn job_from_row(row: &JobRow) -> Result<Job, DatabaseError> {
    let style = serde_json::from_str(&row.style_data).map_err(|e| DatabaseError::Decode {
        job_id: row.id.clone(),
        column: "style_data",
        reason: e.to_string(),
    })?;

    Ok(Job {
        id: row.id.clone(),
        topic: row.topic.clone(),
        style,
        llm_provider: row.llm_provider.clone(),
        duration_secs: row.duration_secs,
        include_voiceover: row.include_voiceover,
        status: parse_status(&row.status, &row.id),
        progress: row.progress,
        message: row.message.clone().unwrap_or_default(),
        script: decode(&row.id, "script_data", &row.script_data)?,
        blueprint: decode(&row.id, "blueprint_data", &row.blueprint_data)?,
        audio: decode(&row.id, "audio_data", &row.audio_data)?,
        video_path: row.video_path.as_ref().map(PathBuf::from),
        report_url: row.report_url.clone(),
        error: row.error.clone(),
        warnings: decode(&row.id, "warnings", &row.warnings)?.unwrap_or_default(),
        created_at: parse_timestamp(&row.created_at),
        updated_at: parse_timestamp(&row.updated_at),
        completed_at: row.completed_at.as_deref().map(parse_timestamp),
    })
}

// ─── Query types ────────────────────────────────────────────────────────────

/// Filter and pagination for job listing.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct JobQuery {
    pub status: Option<JobStatus>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

/// One page of jobs, newest first.
#[derive(Debug, Serialize)]
pub struct JobList {
    pub jobs: Vec<Job>,
    pub total: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

/// Number of jobs per status.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct JobCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
}

// ─── JobStore ───────────────────────────────────────────────────────────────

/// Registry of job records, safe for concurrent use by many job runs.
///
/// Every mutation goes through [`JobStore::update`], which holds the cache
/// write lock across mutate, persist and publish-to-cache. Readers see the
/// previous or the next version of a job, never a partial one.
pub struct JobStore {
    db: Option<Database>,
    cache: RwLock<HashMap<String, Job>>,
    lease: Duration,
}

impl JobStore {
    /// Creates a memory-only registry.
    pub fn new() -> Self {
        Self {
            db: None,
            cache: RwLock::new(HashMap::new()),
            lease: DEFAULT_LEASE,
        }
    }

    /// Creates a registry that writes through to `db`.
    pub fn with_database(db: Database) -> Self {
        Self {
            db: Some(db),
            cache: RwLock::new(HashMap::new()),
            lease: DEFAULT_LEASE,
        }
    }

    /// Overrides how long a job's lease lasts between renewals.
    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    pub fn has_database(&self) -> bool {
        self.db.is_some()
    }

    pub fn lease(&self) -> Duration {
        self.lease
    }

    fn lease_expiry(&self) -> String {
        let lease = chrono::Duration::from_std(self.lease).unwrap_or(chrono::Duration::MAX);
        let expires = Utc::now()
            .checked_add_signed(lease)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        lease_timestamp(expires)
    }

    fn row_for(&self, job: &Job) -> Result<JobRow, serde_json::Error> {
        let mut row = job_to_row(job)?;
        if !job.is_terminal() {
            row.lease_expires_at = Some(self.lease_expiry());
        }
        Ok(row)
    }

    fn cache_read(&self) -> RwLockReadGuard<'_, HashMap<String, Job>> {
        match self.cache.read() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn cache_write(&self) -> RwLockWriteGuard<'_, HashMap<String, Job>> {
        match self.cache.write() {
            Ok(guard) => guard,
            Err(poisoned) => {
                log::warn!("Job store cache lock was poisoned, recovering");
                poisoned.into_inner()
            }
        }
    }

    fn load_row(&self, job_id: &str) -> Result<Option<Job>, RegistryError> {
        match &self.db {
            Some(db) => match job_repo::find_by_id(db, job_id)? {
                Some(row) => Ok(Some(job_from_row(&row)?)),
                None => Ok(None),
            },
            None => Ok(None),
        }
    }

    /// Registers a new job.
    pub fn create(&self, job: Job) -> Result<Job, RegistryError> {
        let mut cache = self.cache_write();
        if cache.contains_key(&job.id) || self.load_row(&job.id)?.is_some() {
            return Err(RegistryError::DuplicateJob(job.id));
        }

        if let Some(db) = &self.db {
            job_repo::insert(db, &self.row_for(&job)?)?;
        }

        log::info!("Created job {} for topic '{}'", job.id, job.topic);
        cache.insert(job.id.clone(), job.clone());
        Ok(job)
    }

    /// Returns a job by id from the database when attached, else the cache.
    pub fn get(&self, job_id: &str) -> Result<Job, RegistryError> {
        let found = if self.db.is_some() {
            self.load_row(job_id)?
        } else {
            self.cache_read().get(job_id).cloned()
        };
        found.ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))
    }

    /// Applies `mutator` to a job atomically and returns the new version.
    ///
    /// The id cannot be changed, progress never decreases, and terminal
    /// jobs are rejected with [`RegistryError::AlreadyTerminal`].
    pub fn update<F>(&self, job_id: &str, mutator: F) -> Result<Job, RegistryError>
    where
        F: FnOnce(&mut Job),
    {
        let mut cache = self.cache_write();
        let current = if self.db.is_some() {
            self.load_row(job_id)?
        } else {
            cache.get(job_id).cloned()
        }
        .ok_or_else(|| RegistryError::JobNotFound(job_id.to_string()))?;

        if current.is_terminal() {
            cache.insert(job_id.to_string(), current.clone());
            return Err(already_terminal(&current));
        }

        let mut next = current.clone();
        mutator(&mut next);
        next.id = current.id.clone();
        next.created_at = current.created_at;
        next.progress = next.progress.max(current.progress).min(100);
        next.updated_at = Utc::now();

        if let Some(db) = &self.db {
            if job_repo::update(db, &self.row_for(&next)?)? == 0 {
                // Another connection finished or removed the job meanwhile.
                return match self.load_row(job_id)? {
                    Some(latest) => {
                        cache.insert(job_id.to_string(), latest.clone());
                        Err(already_terminal(&latest))
                    }
                    None => {
                        cache.remove(job_id);
                        Err(RegistryError::JobNotFound(job_id.to_string()))
                    }
                };
            }
        }

        cache.insert(job_id.to_string(), next.clone());
        Ok(next)
    }

    /// Extends the lease of a running job. Returns `false` once the job is
    /// terminal or gone, and always `false` without a database.
    pub fn renew_lease(&self, job_id: &str) -> Result<bool, RegistryError> {
        match &self.db {
            Some(db) => Ok(job_repo::renew_lease(db, job_id, &self.lease_expiry())?),
            None => Ok(false),
        }
    }

    /// Lists jobs newest first.
    pub fn list(&self, query: &JobQuery) -> Result<JobList, RegistryError> {
        if let Some(db) = &self.db {
            let filter = JobFilter {
                status: query.status.map(|s| s.as_str().to_string()),
                limit: query.limit,
                offset: query.offset,
            };
            let (rows, total) = job_repo::query(db, &filter)?;
            let jobs = rows
                .iter()
                .map(job_from_row)
                .collect::<Result<Vec<_>, _>>()?;
            return Ok(JobList {
                jobs,
                total,
                limit: query.limit,
                offset: query.offset,
            });
        }

        let cache = self.cache_read();
        let mut jobs: Vec<Job> = cache
            .values()
            .filter(|j| query.status.map_or(true, |s| j.status == s))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));

        let total = jobs.len() as u64;
        let offset = query.offset.unwrap_or(0) as usize;
        let limit = query.limit.unwrap_or(100) as usize;
        let jobs = jobs.into_iter().skip(offset).take(limit).collect();

        Ok(JobList {
            jobs,
            total,
            limit: query.limit,
            offset: query.offset,
        })
    }

    /// Returns per-status job totals.
    pub fn counts(&self) -> Result<JobCounts, RegistryError> {
        if let Some(db) = &self.db {
            return Ok(JobCounts {
                pending: job_repo::count_by_status(db, JobStatus::Pending.as_str())?,
                processing: job_repo::count_by_status(db, JobStatus::Processing.as_str())?,
                completed: job_repo::count_by_status(db, JobStatus::Completed.as_str())?,
                failed: job_repo::count_by_status(db, JobStatus::Failed.as_str())?,
            });
        }

        let mut counts = JobCounts::default();
        for job in self.cache_read().values() {
            match job.status {
                JobStatus::Pending => counts.pending += 1,
                JobStatus::Processing => counts.processing += 1,
                JobStatus::Completed => counts.completed += 1,
                JobStatus::Failed => counts.failed += 1,
            }
        }
        Ok(counts)
    }

    /// Marks non-terminal jobs whose lease has expired as FAILED.
    ///
    /// Jobs still renewed by a live process, this one or another sharing
    /// the database, are left alone.
    pub fn fail_interrupted(&self) -> Result<usize, RegistryError> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let rows = job_repo::list_expired(db, &lease_timestamp(Utc::now()))?;

        let mut failed = 0;
        for row in rows {
            let result = self.update(&row.id, |job| {
                job.message = INTERRUPTED_ERROR.to_string();
                job.mark_failed(INTERRUPTED_ERROR);
            });
            match result {
                Ok(_) => failed += 1,
                Err(RegistryError::AlreadyTerminal { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        if failed > 0 {
            log::warn!("Marked {} interrupted jobs as failed", failed);
        }
        Ok(failed)
    }

    /// Loads the most recent jobs from the database into the cache.
    pub fn load_from_database(&self, limit: u64) -> Result<usize, RegistryError> {
        let Some(db) = &self.db else {
            return Ok(0);
        };

        let (rows, _) = job_repo::query(
            db,
            &JobFilter {
                limit: Some(limit),
                ..Default::default()
            },
        )?;

        let mut cache = self.cache_write();
        let mut loaded = 0;
        for row in &rows {
            match job_from_row(row) {
                Ok(job) => {
                    cache.entry(job.id.clone()).or_insert(job);
                    loaded += 1;
                }
                Err(e) => log::error!("Skipping unreadable job {}: {}", row.id, e),
            }
        }

        log::info!("Loaded {} jobs from database into cache", loaded);
        Ok(loaded)
    }
}

fn already_terminal(job: &Job) -> RegistryError {
    RegistryError::AlreadyTerminal {
        job_id: job.id.clone(),
        status: job.status.to_string(),
    }
}

impl Default for JobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::{Scene, Script};
    use crate::worker::job::{StyleProfile, StyleType, VideoRequest};
    use std::sync::Arc;

    fn request(topic: &str) -> VideoRequest {
        VideoRequest::new(topic, StyleProfile::new(StyleType::Explainer2d, "blue,white"))
    }

    fn job(id: &str) -> Job {
        Job::with_id(id, &request("Photosynthesis"))
    }

    fn db_store() -> (JobStore, Database) {
        let db = Database::open_in_memory().expect("open in-memory DB");
        (JobStore::with_database(db.clone()), db)
    }

    #[test]
    fn test_create_and_get() {
        let store = JobStore::new();
        store.create(job("job-1")).unwrap();

        let found = store.get("job-1").unwrap();
        assert_eq!(found.status, JobStatus::Pending);
        assert_eq!(found.topic, "Photosynthesis");
    }

    #[test]
    fn test_get_unknown_is_not_found() {
        let store = JobStore::new();
        assert!(matches!(
            store.get("missing"),
            Err(RegistryError::JobNotFound(id)) if id == "missing"
        ));
    }

    #[test]
    fn test_create_duplicate_rejected() {
        let store = JobStore::new();
        store.create(job("job-1")).unwrap();
        assert!(matches!(
            store.create(job("job-1")),
            Err(RegistryError::DuplicateJob(_))
        ));
    }

    #[test]
    fn test_update_unknown_is_not_found() {
        let store = JobStore::new();
        let result = store.update("missing", |j| j.record_progress(10));
        assert!(matches!(result, Err(RegistryError::JobNotFound(_))));
    }

    #[test]
    fn test_update_applies_mutation() {
        let store = JobStore::new();
        store.create(job("job-1")).unwrap();

        let updated = store
            .update("job-1", |j| {
                j.mark_processing("Generating script");
                j.record_progress(25);
            })
            .unwrap();

        assert_eq!(updated.status, JobStatus::Processing);
        assert_eq!(store.get("job-1").unwrap().progress, 25);
    }

    #[test]
    fn test_update_cannot_lower_progress_or_change_id() {
        let store = JobStore::new();
        store.create(job("job-1")).unwrap();
        store.update("job-1", |j| j.progress = 50).unwrap();

        let updated = store
            .update("job-1", |j| {
                j.progress = 10;
                j.id = "other".to_string();
            })
            .unwrap();

        assert_eq!(updated.progress, 50);
        assert_eq!(updated.id, "job-1");
        assert!(store.get("other").is_err());
    }

    #[test]
    fn test_terminal_job_rejects_updates() {
        let store = JobStore::new();
        store.create(job("job-1")).unwrap();
        store.update("job-1", |j| j.mark_failed("boom")).unwrap();

        let result = store.update("job-1", |j| j.report_url = Some("late".to_string()));
        assert!(matches!(result, Err(RegistryError::AlreadyTerminal { .. })));
        assert!(store.get("job-1").unwrap().report_url.is_none());
    }

    #[test]
    fn test_list_newest_first_with_filter() {
        let store = JobStore::new();
        for (i, id) in ["a", "b", "c"].iter().enumerate() {
            let mut j = job(id);
            j.created_at = parse_timestamp(&format!("2026-01-0{}T00:00:00+00:00", i + 1));
            store.create(j).unwrap();
        }
        store.update("b", |j| j.mark_completed("done")).unwrap();

        let all = store.list(&JobQuery::default()).unwrap();
        let ids: Vec<_> = all.jobs.iter().map(|j| j.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "b", "a"]);
        assert_eq!(all.total, 3);

        let completed = store
            .list(&JobQuery {
                status: Some(JobStatus::Completed),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(completed.total, 1);
        assert_eq!(completed.jobs[0].id, "b");

        let page = store
            .list(&JobQuery {
                limit: Some(1),
                offset: Some(1),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(page.jobs.len(), 1);
        assert_eq!(page.jobs[0].id, "b");
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_write_through_to_database() {
        let (store, db) = db_store();
        store.create(job("db-1")).unwrap();

        let script = Script::from_scenes(
            "Photosynthesis",
            "2D explainer",
            vec![Scene {
                scene_number: 1,
                duration: 30.0,
                narration_text: "Light in, sugar out.".to_string(),
                ..Default::default()
            }],
        )
        .with_provider("mistral");

        store
            .update("db-1", |j| {
                j.script = Some(script.clone());
                j.record_progress(25);
                j.warnings.push("audio degraded".to_string());
            })
            .unwrap();

        let row = job_repo::find_by_id(&db, "db-1").unwrap().unwrap();
        assert_eq!(row.progress, 25);
        assert!(row.script_data.unwrap().contains("Light in, sugar out."));

        // A fresh store over the same database sees the same job.
        let reopened = JobStore::with_database(db);
        let job = reopened.get("db-1").unwrap();
        assert_eq!(job.script, Some(script));
        assert_eq!(job.warnings, vec!["audio degraded".to_string()]);
        assert_eq!(job.style.colors, vec!["blue", "white"]);
    }

    #[test]
    fn test_list_from_database() {
        let (store, _db) = db_store();
        store.create(job("x")).unwrap();
        store.create(job("y")).unwrap();
        store.update("y", |j| j.mark_failed("nope")).unwrap();

        let failed = store
            .list(&JobQuery {
                status: Some(JobStatus::Failed),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(failed.total, 1);
        assert_eq!(failed.jobs[0].error.as_deref(), Some("nope"));

        let counts = store.counts().unwrap();
        assert_eq!(counts.pending, 1);
        assert_eq!(counts.failed, 1);
    }

    #[test]
    fn test_fail_interrupted_and_reload() {
        let db = Database::open_in_memory().unwrap();
        let store = JobStore::with_database(db.clone()).with_lease(Duration::ZERO);
        store.create(job("pending")).unwrap();
        store.create(job("running")).unwrap();
        store.create(job("done")).unwrap();
        store.update("running", |j| j.mark_processing("busy")).unwrap();
        store.update("done", |j| j.mark_completed("ok")).unwrap();
        std::thread::sleep(Duration::from_millis(5));

        let restarted = JobStore::with_database(db);
        assert_eq!(restarted.fail_interrupted().unwrap(), 2);

        let pending = restarted.get("pending").unwrap();
        assert_eq!(pending.status, JobStatus::Failed);
        assert_eq!(pending.error.as_deref(), Some(INTERRUPTED_ERROR));
        assert!(pending.completed_at.is_some());
        assert_eq!(restarted.get("done").unwrap().status, JobStatus::Completed);

        assert_eq!(restarted.load_from_database(100).unwrap(), 3);
    }

    #[test]
    fn test_fail_interrupted_skips_leased_jobs() {
        let (store, db) = db_store();
        store.create(job("live")).unwrap();
        store.update("live", |j| j.mark_processing("busy")).unwrap();

        let other = JobStore::with_database(db);
        assert_eq!(other.fail_interrupted().unwrap(), 0);
        assert_eq!(store.get("live").unwrap().status, JobStatus::Processing);
        assert!(store.renew_lease("live").unwrap());
    }

    #[test]
    fn test_stores_sharing_a_file_respect_terminal_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.db");
        let first = JobStore::with_database(Database::open(&path).unwrap());
        let second = JobStore::with_database(Database::open(&path).unwrap());

        first.create(job("shared")).unwrap();
        first.update("shared", |j| j.mark_processing("busy")).unwrap();
        assert_eq!(first.get("shared").unwrap().status, JobStatus::Processing);

        second
            .update("shared", |j| j.mark_failed(INTERRUPTED_ERROR))
            .unwrap();

        let result = first.update("shared", |j| j.mark_completed("done"));
        assert!(matches!(result, Err(RegistryError::AlreadyTerminal { .. })));

        for store in [&first, &second] {
            let job = store.get("shared").unwrap();
            assert_eq!(job.status, JobStatus::Failed);
            assert_eq!(job.error.as_deref(), Some(INTERRUPTED_ERROR));
        }
        assert!(!first.renew_lease("shared").unwrap());
    }

    #[test]
    fn test_renew_lease_without_database() {
        let store = JobStore::new();
        store.create(job("mem")).unwrap();
        assert!(!store.renew_lease("mem").unwrap());
    }

    #[test]
    fn test_counts_memory_only() {
        let store = JobStore::new();
        store.create(job("p")).unwrap();
        store.create(job("c")).unwrap();
        store.update("c", |j| j.mark_completed("ok")).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(
            counts,
            JobCounts {
                pending: 1,
                processing: 0,
                completed: 1,
                failed: 0
            }
        );
    }

    #[test]
    fn test_concurrent_updates_are_serialized() {
        let store = Arc::new(JobStore::new());
        store.create(job("shared")).unwrap();

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        store
                            .update("shared", |j| j.warnings.push("tick".to_string()))
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.get("shared").unwrap().warnings.len(), 400);
    }
}
