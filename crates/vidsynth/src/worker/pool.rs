use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;

use crate::artifacts::Script;
use crate::broadcast::job_store::{JobCounts, JobList, JobQuery, JobStore};
use crate::broadcast::progress_channel::{ProgressChannel, ProgressEvent};
use crate::config::Config;
use crate::error::{RegistryError, WorkerError};
use crate::pipeline::Workflow;
use crate::providers::ProviderError;
use crate::worker::job::{Job, JobStatus, StyleProfile, VideoRequest};

/// Service health snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub version: String,
    pub started_at: DateTime<Utc>,
    /// Configured providers per service, in fallback order.
    pub services: BTreeMap<String, Vec<String>>,
    pub jobs: JobCounts,
    pub active_runs: usize,
}

/// Accepts video requests and runs each job's workflow on the tokio runtime.
///
/// At most `max_concurrent_jobs` workflows execute at once; the rest wait for
/// a permit. A job id never has more than one active run.
pub struct WorkerPool {
    workflow: Arc<Workflow>,
    registry: Arc<JobStore>,
    channel: Arc<ProgressChannel>,
    permits: Arc<Semaphore>,
    active: Arc<Mutex<HashSet<String>>>,
    handles: Mutex<HashMap<String, JoinHandle<()>>>,
    shutdown: AtomicBool,
    started_at: DateTime<Utc>,
}

impl WorkerPool {
    /// `workflow` should report progress to `channel`.
    pub fn new(
        workflow: Arc<Workflow>,
        channel: Arc<ProgressChannel>,
        max_concurrent_jobs: usize,
    ) -> Self {
        let max_concurrent_jobs = max_concurrent_jobs.max(1);
        info!(
            "Worker pool ready ({} concurrent job(s), LLM providers: {})",
            max_concurrent_jobs,
            workflow.llm_providers().join(", ")
        );
        Self {
            registry: Arc::clone(workflow.registry()),
            workflow,
            channel,
            permits: Arc::new(Semaphore::new(max_concurrent_jobs)),
            active: Arc::new(Mutex::new(HashSet::new())),
            handles: Mutex::new(HashMap::new()),
            shutdown: AtomicBool::new(false),
            started_at: Utc::now(),
        }
    }

    /// Production constructor: real providers, progress published on a new channel.
    pub fn from_config(config: &Config, registry: Arc<JobStore>) -> Result<Self, ProviderError> {
        let channel = Arc::new(ProgressChannel::default());
        let workflow = Workflow::from_config(config, registry, channel.clone())?;
        Ok(Self::new(
            Arc::new(workflow),
            channel,
            config.max_concurrent_jobs,
        ))
    }

    pub fn registry(&self) -> &Arc<JobStore> {
        &self.registry
    }

    pub fn channel(&self) -> &Arc<ProgressChannel> {
        &self.channel
    }

    /// Validates `request`, records a PENDING job and starts its workflow.
    pub fn submit(&self, request: VideoRequest) -> Result<Job, WorkerError> {
        self.ensure_running()?;
        request.validate()?;
        self.ensure_provider(&request.llm_provider)?;

        let job = self.registry.create(Job::new(&request))?;
        info!("Accepted job {} for topic '{}'", job.id, job.topic);
        self.spawn_run(&job.id, request)?;
        Ok(job)
    }

    /// Starts a workflow run for a job that already exists, such as a
    /// PENDING job reloaded from the database.
    pub fn start_job(&self, job_id: &str) -> Result<(), WorkerError> {
        self.ensure_running()?;
        let job = self.registry.get(job_id)?;
        if job.is_terminal() {
            return Err(RegistryError::AlreadyTerminal {
                job_id: job.id,
                status: job.status.as_str().to_string(),
            }
            .into());
        }
        self.spawn_run(&job.id, job.request())
    }

    fn spawn_run(&self, job_id: &str, request: VideoRequest) -> Result<(), WorkerError> {
        let guard = ActiveRun::claim(&self.active, job_id)?;

        let workflow = Arc::clone(&self.workflow);
        let permits = Arc::clone(&self.permits);
        let id = job_id.to_string();
        let heartbeat = self
            .registry
            .has_database()
            .then(|| LeaseHeartbeat::start(Arc::clone(&self.registry), job_id));

        let handle = tokio::spawn(async move {
            let _guard = guard;
            let _heartbeat = heartbeat;
            let _permit = match permits.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => {
                    warn!("Worker pool closed before job {} could start", id);
                    return;
                }
            };

            match workflow.run(&id, &request).await {
                Ok(output) => info!(
                    "Job {} produced {}",
                    id,
                    output.video_path.display()
                ),
                Err(e) => warn!("Job {} did not complete: {}", id, e),
            }
        });

        let mut handles = lock(&self.handles);
        handles.retain(|_, h| !h.is_finished());
        handles.insert(job_id.to_string(), handle);
        Ok(())
    }

    pub fn status(&self, job_id: &str) -> Result<Job, WorkerError> {
        Ok(self.registry.get(job_id)?)
    }

    pub fn list(&self, query: &JobQuery) -> Result<JobList, WorkerError> {
        Ok(self.registry.list(query)?)
    }

    /// Whether `job_id` currently has a run in flight.
    pub fn is_active(&self, job_id: &str) -> bool {
        lock(&self.active).contains(job_id)
    }

    pub fn active_runs(&self) -> usize {
        lock(&self.active).len()
    }

    /// Waits for the job's current run, if any, and returns the job record.
    pub async fn wait(&self, job_id: &str) -> Result<Job, WorkerError> {
        let handle = lock(&self.handles).remove(job_id);
        if let Some(handle) = handle {
            handle
                .await
                .map_err(|e| WorkerError::TaskFailed(e.to_string()))?;
        }
        self.status(job_id)
    }

    /// Opens a new connection subscribed to `job_id`.
    ///
    /// Events already published are not replayed; query [`WorkerPool::status`]
    /// after subscribing to catch up.
    pub fn watch(&self, job_id: &str) -> (String, mpsc::Receiver<ProgressEvent>) {
        let connection_id = uuid::Uuid::new_v4().to_string();
        let rx = self.channel.connect(&connection_id);
        self.channel.subscribe(&connection_id, job_id);
        (connection_id, rx)
    }

    pub fn subscribe(&self, connection_id: &str, job_id: &str) {
        self.channel.subscribe(connection_id, job_id);
    }

    pub fn unsubscribe(&self, connection_id: &str, job_id: &str) -> bool {
        self.channel.unsubscribe(connection_id, job_id)
    }

    pub fn disconnect(&self, connection_id: &str) {
        self.channel.disconnect(connection_id);
    }

    /// Generates a script without creating a job.
    pub async fn generate_script(
        &self,
        topic: &str,
        style: StyleProfile,
        duration_secs: u32,
        provider: &str,
    ) -> Result<Script, WorkerError> {
        let request = VideoRequest::new(topic, style)
            .with_duration(duration_secs)
            .with_provider(provider);
        request.validate()?;
        self.ensure_provider(provider)?;

        Ok(self
            .workflow
            .generate_script(
                request.topic.trim(),
                &request.style,
                request.duration_secs,
                provider,
            )
            .await?)
    }

    /// Location of a completed job's video.
    pub fn video_path(&self, job_id: &str) -> Result<PathBuf, WorkerError> {
        let job = self.registry.get(job_id)?;
        let not_ready = || WorkerError::NotReady {
            job_id: job.id.clone(),
            status: job.status.as_str().to_string(),
        };

        if job.status != JobStatus::Completed {
            return Err(not_ready());
        }
        let path = job.video_path.clone().ok_or_else(not_ready)?;
        if !path.is_file() {
            return Err(WorkerError::FileMissing {
                job_id: job.id.clone(),
                path,
            });
        }
        Ok(path)
    }

    pub fn health(&self) -> Result<HealthReport, WorkerError> {
        let status = if self.shutdown.load(Ordering::SeqCst) {
            "shutting_down"
        } else {
            "healthy"
        };
        let mut services = self.workflow.services();
        let storage = if self.registry.has_database() {
            "sqlite"
        } else {
            "memory"
        };
        services.insert("database".to_string(), vec![storage.to_string()]);

        Ok(HealthReport {
            status: status.to_string(),
            timestamp: Utc::now(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            started_at: self.started_at,
            services,
            jobs: self.registry.counts()?,
            active_runs: self.active_runs(),
        })
    }

    /// Stops accepting work and waits for every in-flight run to finish.
    pub async fn shutdown(&self) {
        info!("Shutting down worker pool...");
        self.shutdown.store(true, Ordering::SeqCst);

        let handles: Vec<(String, JoinHandle<()>)> = lock(&self.handles).drain().collect();
        for (job_id, handle) in handles {
            if let Err(e) = handle.await {
                error!("Run for job {} ended abnormally: {}", job_id, e);
            } else {
                debug!("Run for job {} finished", job_id);
            }
        }

        info!("All job runs have stopped");
    }

    pub fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn ensure_running(&self) -> Result<(), WorkerError> {
        if self.is_shutdown() {
            Err(WorkerError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn ensure_provider(&self, provider: &str) -> Result<(), WorkerError> {
        if self.workflow.supports_llm_provider(provider) {
            return Ok(());
        }
        Err(WorkerError::UnknownProvider {
            name: provider.to_string(),
            available: self.workflow.llm_providers().join(", "),
        })
    }
}

/// Membership in the active-run set, released on drop.
struct ActiveRun {
    active: Arc<Mutex<HashSet<String>>>,
    job_id: String,
}

impl ActiveRun {
    fn claim(active: &Arc<Mutex<HashSet<String>>>, job_id: &str) -> Result<Self, WorkerError> {
        if !lock(active).insert(job_id.to_string()) {
            return Err(WorkerError::AlreadyRunning(job_id.to_string()));
        }
        Ok(Self {
            active: Arc::clone(active),
            job_id: job_id.to_string(),
        })
    }
}

impl Drop for ActiveRun {
    fn drop(&mut self) {
        lock(&self.active).remove(&self.job_id);
    }
}

/// Keeps a job's lease alive while its run is queued or executing.
/// Stops on drop.
struct LeaseHeartbeat(JoinHandle<()>);

impl LeaseHeartbeat {
    fn start(registry: Arc<JobStore>, job_id: &str) -> Self {
        let job_id = job_id.to_string();
        let period = (registry.lease() / 3).max(Duration::from_millis(10));
        Self(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match registry.renew_lease(&job_id) {
                    Ok(true) => {}
                    Ok(false) => break,
                    Err(e) => warn!("Could not renew lease of job {}: {}", job_id, e),
                }
            }
        }))
    }
}

impl Drop for LeaseHeartbeat {
    fn drop(&mut self) {
        self.0.abort();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!("Worker pool lock was poisoned, recovering");
            poisoned.into_inner()
        }
    }
}
