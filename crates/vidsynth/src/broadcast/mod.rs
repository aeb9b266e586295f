//! Shared job state and real-time progress delivery.
//!
//! [`JobStore`] holds the durable job records; [`ProgressChannel`] fans
//! progress events out to whichever connections subscribed to a job.

pub mod job_store;
pub mod progress_channel;

pub use job_store::{JobCounts, JobList, JobQuery, JobStore};
pub use progress_channel::{EventKind, ProgressChannel, ProgressEvent};
