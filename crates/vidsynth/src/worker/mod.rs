pub mod job;
pub mod pool;

pub use job::{Job, JobStatus, StyleProfile, StyleType, VideoRequest};
pub use pool::{HealthReport, WorkerPool};
