use chrono::{DateTime, Duration, Months, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::ports::kv::StorageError;
use crate::rules::types::TriggerEvent;

pub type JobId = Uuid;

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Scheduled job '{0}' not found")]
    JobNotFound(JobId),

    #[error("Scheduler persistence error: {0}")]
    Persistence(#[from] StorageError),

    #[error("Scheduler internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum JobStatus {
    Pending,
    Executed,
    Cancelled,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RecurrenceInterval {
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recurrence {
    pub interval: RecurrenceInterval,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_occurrences: Option<u32>,
    /// Occurrences executed so far.
    #[serde(default)]
    pub count: u32,
}

impl Recurrence {
    pub fn every(interval: RecurrenceInterval) -> Self {
        Self {
            interval,
            end_date: None,
            max_occurrences: None,
            count: 0,
        }
    }
}

/// The next trigger is exactly one interval after the previous trigger, not
/// after the execution instant, so recurring jobs do not drift.
pub fn next_trigger(
    previous: DateTime<Utc>,
    interval: RecurrenceInterval,
) -> DateTime<Utc> {
    match interval {
        RecurrenceInterval::Daily => previous + Duration::days(1),
        RecurrenceInterval::Weekly => previous + Duration::weeks(1),
        RecurrenceInterval::Monthly => previous
            .checked_add_months(Months::new(1))
            .unwrap_or(previous + Duration::days(30)),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: JobId,
    pub rule_id: String,
    pub user_id: String,
    pub trigger_time: DateTime<Utc>,
    pub event: TriggerEvent,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recurring: Option<Recurrence>,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub executed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Failed execution attempts for the current trigger.
    #[serde(default)]
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Reconciliation pass interval.
    pub check_interval: std::time::Duration,
    /// Retries per trigger after a failed execution.
    pub retry_attempts: u32,
    /// Fixed delay before each retry.
    pub retry_delay: std::time::Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            check_interval: std::time::Duration::from_secs(60),
            retry_attempts: 3,
            retry_delay: std::time::Duration::from_secs(5 * 60),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct SchedulerStats {
    pub total: usize,
    pub pending: usize,
    pub executed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub recurring: usize,
    pub running: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn successor_is_previous_trigger_plus_interval() {
        let previous = Utc.with_ymd_and_hms(2026, 8, 20, 18, 0, 0).unwrap();
        assert_eq!(
            next_trigger(previous, RecurrenceInterval::Daily),
            Utc.with_ymd_and_hms(2026, 8, 21, 18, 0, 0).unwrap()
        );
        assert_eq!(
            next_trigger(previous, RecurrenceInterval::Weekly),
            Utc.with_ymd_and_hms(2026, 8, 27, 18, 0, 0).unwrap()
        );
    }

    #[test]
    fn monthly_successor_uses_calendar_months() {
        let previous = Utc.with_ymd_and_hms(2026, 1, 31, 9, 0, 0).unwrap();
        // January 31st plus one month clamps to February's last day.
        assert_eq!(
            next_trigger(previous, RecurrenceInterval::Monthly),
            Utc.with_ymd_and_hms(2026, 2, 28, 9, 0, 0).unwrap()
        );
    }
}
