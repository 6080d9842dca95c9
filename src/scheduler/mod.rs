//! Delayed and recurring notification delivery.

pub mod engine;
pub mod types;

pub use engine::{JobSink, NotificationScheduler, SYSTEM_USER};
pub use types::{
    next_trigger, JobId, JobStatus, Recurrence, RecurrenceInterval, ScheduledJob, SchedulerConfig,
    SchedulerError, SchedulerStats,
};
