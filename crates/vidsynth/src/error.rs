use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VidsynthError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),

    #[error("Workflow error: {0}")]
    Workflow(#[from] crate::pipeline::WorkflowError),

    #[error("Provider error: {0}")]
    Provider(#[from] crate::providers::ProviderError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Invalid secret for '{name}': {source}")]
    Secret {
        name: String,
        #[source]
        source: crate::secrets::SecretError,
    },
}

/// Errors from the job registry.
#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Job already exists: {0}")]
    DuplicateJob(String),

    #[error("Job {job_id} is already {status} and cannot be modified")]
    AlreadyTerminal { job_id: String, status: String },

    #[error("Failed to persist job: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Failed to encode job payload: {0}")]
    Encode(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Unknown LLM provider '{name}' (available: {available})")]
    UnknownProvider { name: String, available: String },

    #[error("Job {0} already has an active run")]
    AlreadyRunning(String),

    #[error("Worker pool is shut down")]
    ShutDown,

    #[error("Job {job_id} is not ready (status: {status})")]
    NotReady { job_id: String, status: String },

    #[error("Video file for job {job_id} is missing: {path}")]
    FileMissing { job_id: String, path: PathBuf },

    #[error("Job task failed: {0}")]
    TaskFailed(String),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Stage(#[from] crate::pipeline::StageError),
}

pub type Result<T> = std::result::Result<T, VidsynthError>;
