//! Time-based notification scheduling.
//!
//! Jobs are armed as tokio timers; a periodic reconciliation pass catches
//! jobs whose timer was lost (e.g. after a restart mid-sleep) and purges
//! terminal jobs past their retention window. Recurring jobs spawn a fresh
//! pending job per occurrence instead of mutating the executed one.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Datelike, Days, Duration, Local, TimeZone, Utc, Weekday};
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, error, info, warn};
use serde_json::json;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use super::types::{
    next_trigger, JobId, JobStatus, Recurrence, RecurrenceInterval, ScheduledJob, SchedulerConfig,
    SchedulerError, SchedulerStats,
};
use crate::generator::NotificationGenerator;
use crate::ports::kv::{self, KeyValueStore};
use crate::rules::types::TriggerEvent;

const JOBS_KEY: &str = "scheduler:jobs";

/// User id carried by jobs the scheduler creates for itself.
pub const SYSTEM_USER: &str = "system";

/// Retention for executed and cancelled jobs. Executed recurring records
/// only persist once their recurrence has terminated; active occurrences are
/// superseded by their successor.
const TERMINAL_RETENTION: Duration = Duration::hours(1);
/// Retention for jobs that exhausted their retries.
const FAILED_RETENTION: Duration = Duration::hours(24);

/// Where fired jobs are delivered. The generator is the production sink;
/// tests substitute their own.
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn fire(&self, event: &TriggerEvent) -> Result<(), String>;
}

#[async_trait]
impl JobSink for NotificationGenerator {
    async fn fire(&self, event: &TriggerEvent) -> Result<(), String> {
        self.process_event(event).await;
        Ok(())
    }
}

pub struct NotificationScheduler {
    sink: Arc<dyn JobSink>,
    kv: Arc<dyn KeyValueStore>,
    config: SchedulerConfig,
    jobs: RwLock<HashMap<JobId, ScheduledJob>>,
    timers: Mutex<HashMap<JobId, JoinHandle<()>>>,
    reconciler: Mutex<Option<JoinHandle<()>>>,
    running: AtomicBool,
}

impl NotificationScheduler {
    pub fn new(sink: Arc<dyn JobSink>, kv: Arc<dyn KeyValueStore>) -> Self {
        Self::with_config(sink, kv, SchedulerConfig::default())
    }

    pub fn with_config(
        sink: Arc<dyn JobSink>,
        kv: Arc<dyn KeyValueStore>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            sink,
            kv,
            config,
            jobs: RwLock::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            reconciler: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Loads persisted jobs, registers the built-in system jobs, re-arms
    /// every pending job and starts the reconciliation loop.
    pub async fn start(self: &Arc<Self>) -> Result<(), SchedulerError> {
        if self.running.swap(true, Ordering::SeqCst) {
            debug!("Scheduler already running");
            return Ok(());
        }

        let persisted: Vec<ScheduledJob> = kv::get_typed(&self.kv, JOBS_KEY).await?.unwrap_or_default();
        {
            let mut jobs = self.jobs.write().await;
            for job in persisted {
                jobs.insert(job.id, job);
            }
        }

        self.schedule_system_jobs().await?;

        let pending: Vec<(JobId, DateTime<Utc>)> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .map(|j| (j.id, j.trigger_time))
            .collect();
        let pending_count = pending.len();
        for (id, trigger_time) in pending {
            self.arm(id, trigger_time).await;
        }

        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(this.config.check_interval);
            // The first tick fires immediately; skip it so start() returns
            // before the first reconciliation.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                this.reconcile().await;
            }
        });
        *self.reconciler.lock().await = Some(handle);

        info!("Scheduler started with {} pending job(s)", pending_count);
        Ok(())
    }

    /// Aborts all timers and the reconciliation loop, persisting the current
    /// job table. Pending jobs are re-armed on the next start.
    pub async fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.reconciler.lock().await.take() {
            handle.abort();
        }
        for (_, handle) in self.timers.lock().await.drain() {
            handle.abort();
        }
        if let Err(e) = self.persist().await {
            error!("Failed to persist jobs on shutdown: {}", e);
        }
        info!("Scheduler stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Schedules `event` for delivery at `trigger_time`. A trigger in the
    /// past fires immediately.
    pub async fn schedule(
        self: &Arc<Self>,
        rule_id: impl Into<String>,
        trigger_time: DateTime<Utc>,
        event: TriggerEvent,
        recurring: Option<Recurrence>,
    ) -> Result<JobId, SchedulerError> {
        let job = ScheduledJob {
            id: JobId::new_v4(),
            rule_id: rule_id.into(),
            user_id: event.user_id.clone(),
            trigger_time,
            event,
            recurring,
            status: JobStatus::Pending,
            created_at: Utc::now(),
            executed_at: None,
            last_error: None,
            attempts: 0,
        };
        let id = job.id;
        debug!(
            "Scheduling job {} (rule '{}') for {}",
            id, job.rule_id, trigger_time
        );

        self.jobs.write().await.insert(id, job);
        self.persist().await?;
        self.arm(id, trigger_time).await;
        Ok(id)
    }

    /// Cancels a pending job. Returns `false` when the job is unknown or no
    /// longer pending; the cancelled record stays visible until the
    /// retention purge removes it.
    pub async fn cancel(&self, id: JobId) -> Result<bool, SchedulerError> {
        {
            let mut jobs = self.jobs.write().await;
            match jobs.get_mut(&id) {
                Some(job) if job.status == JobStatus::Pending => {
                    job.status = JobStatus::Cancelled;
                }
                _ => return Ok(false),
            }
        }
        if let Some(handle) = self.timers.lock().await.remove(&id) {
            handle.abort();
        }
        self.persist().await?;
        debug!("Cancelled job {}", id);
        Ok(true)
    }

    pub async fn get_job(&self, id: JobId) -> Option<ScheduledJob> {
        self.jobs.read().await.get(&id).cloned()
    }

    /// All jobs, soonest trigger first.
    pub async fn jobs(&self) -> Vec<ScheduledJob> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by_key(|j| j.trigger_time);
        jobs
    }

    pub async fn user_jobs(&self, user_id: &str) -> Vec<ScheduledJob> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.trigger_time);
        jobs
    }

    pub async fn stats(&self) -> SchedulerStats {
        let jobs = self.jobs.read().await;
        let mut stats = SchedulerStats {
            total: jobs.len(),
            running: self.is_running(),
            ..Default::default()
        };
        for job in jobs.values() {
            match job.status {
                JobStatus::Pending => stats.pending += 1,
                JobStatus::Executed => stats.executed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
            }
            if job.recurring.is_some() {
                stats.recurring += 1;
            }
        }
        stats
    }

    /// Arms (or re-arms) the timer for a pending job.
    async fn arm(self: &Arc<Self>, id: JobId, trigger_time: DateTime<Utc>) {
        let delay = (trigger_time - Utc::now())
            .to_std()
            .unwrap_or(std::time::Duration::ZERO);
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            this.execute(id).await;
        });
        if let Some(previous) = self.timers.lock().await.insert(id, handle) {
            previous.abort();
        }
    }

    /// Fires one job: delivers its event, then either records the execution
    /// (spawning the next occurrence for recurring jobs) or marks it failed
    /// and arms a bounded retry. Boxed because the timer and retry tasks
    /// re-enter it.
    fn execute(self: &Arc<Self>, id: JobId) -> BoxFuture<'static, ()> {
        let this = Arc::clone(self);
        async move {
            this.timers.lock().await.remove(&id);

            let job = match this.jobs.read().await.get(&id) {
                Some(job) if job.status == JobStatus::Pending => job.clone(),
                Some(job) => {
                    debug!("Skipping job {} in status {:?}", id, job.status);
                    return;
                }
                None => return,
            };

            match this.sink.fire(&job.event).await {
                Ok(()) => {
                    let successor = {
                        let mut jobs = this.jobs.write().await;
                        let Some(stored) = jobs.get_mut(&id) else { return };
                        stored.status = JobStatus::Executed;
                        stored.executed_at = Some(Utc::now());
                        stored.last_error = None;

                        match successor_for(stored) {
                            Some(next) => {
                                // The executed occurrence is superseded by its
                                // successor, not retained.
                                jobs.remove(&id);
                                let armed = (next.id, next.trigger_time);
                                jobs.insert(next.id, next);
                                Some(armed)
                            }
                            None => None,
                        }
                    };
                    debug!("Executed job {} (rule '{}')", id, job.rule_id);
                    if let Err(e) = this.persist().await {
                        error!("Failed to persist jobs after execution: {}", e);
                    }
                    if let Some((next_id, next_trigger)) = successor {
                        this.arm(next_id, next_trigger).await;
                    }
                }
                Err(reason) => {
                    let attempts = {
                        let mut jobs = this.jobs.write().await;
                        let Some(stored) = jobs.get_mut(&id) else { return };
                        stored.attempts += 1;
                        stored.status = JobStatus::Failed;
                        stored.last_error = Some(reason.clone());
                        stored.attempts
                    };
                    warn!(
                        "Job {} (rule '{}') failed on attempt {}: {}",
                        id, job.rule_id, attempts, reason
                    );
                    if let Err(e) = this.persist().await {
                        error!("Failed to persist jobs after failure: {}", e);
                    }

                    if attempts <= this.config.retry_attempts {
                        let delay = this.config.retry_delay;
                        let retry = Arc::clone(&this);
                        let handle = tokio::spawn(async move {
                            tokio::time::sleep(delay).await;
                            {
                                let mut jobs = retry.jobs.write().await;
                                match jobs.get_mut(&id) {
                                    Some(job) if job.status == JobStatus::Failed => {
                                        job.status = JobStatus::Pending;
                                    }
                                    _ => return,
                                }
                            }
                            retry.execute(id).await;
                        });
                        if let Some(previous) = this.timers.lock().await.insert(id, handle) {
                            previous.abort();
                        }
                    } else {
                        error!(
                            "Job {} (rule '{}') exhausted its {} retries",
                            id, job.rule_id, this.config.retry_attempts
                        );
                    }
                }
            }
        }
        .boxed()
    }

    /// Fires overdue pending jobs that lost their timer and purges terminal
    /// jobs past their retention window.
    async fn reconcile(self: &Arc<Self>) {
        let now = Utc::now();

        let overdue: Vec<JobId> = {
            let timers = self.timers.lock().await;
            self.jobs
                .read()
                .await
                .values()
                .filter(|j| {
                    j.status == JobStatus::Pending
                        && j.trigger_time <= now
                        && !timers.contains_key(&j.id)
                })
                .map(|j| j.id)
                .collect()
        };
        for id in overdue {
            warn!("Reconciliation firing overdue job {}", id);
            self.execute(id).await;
        }

        let removed = {
            let mut jobs = self.jobs.write().await;
            let before = jobs.len();
            jobs.retain(|_, job| match job.status {
                JobStatus::Pending => true,
                JobStatus::Executed => {
                    now - job.executed_at.unwrap_or(job.created_at) <= TERMINAL_RETENTION
                }
                JobStatus::Cancelled => now - job.created_at <= TERMINAL_RETENTION,
                JobStatus::Failed => {
                    job.attempts <= self.config.retry_attempts
                        || now - job.trigger_time <= FAILED_RETENTION
                }
            });
            before - jobs.len()
        };
        if removed > 0 {
            debug!("Reconciliation purged {} stale job(s)", removed);
            if let Err(e) = self.persist().await {
                error!("Failed to persist jobs after purge: {}", e);
            }
        }
    }

    /// Registers the recurring system jobs, unless a pending instance of the
    /// same rule already survived from a previous run.
    async fn schedule_system_jobs(self: &Arc<Self>) -> Result<(), SchedulerError> {
        let existing: Vec<String> = self
            .jobs
            .read()
            .await
            .values()
            .filter(|j| j.status == JobStatus::Pending && j.user_id == SYSTEM_USER)
            .map(|j| j.rule_id.clone())
            .collect();

        let definitions = [
            (
                "inactivity_reminder_progressive",
                next_local_occurrence(18, 0, None),
                RecurrenceInterval::Daily,
                system_event("time_based_check", "check_type", json!("inactivity")),
            ),
            (
                "deadline_approaching",
                next_local_occurrence(9, 0, None),
                RecurrenceInterval::Daily,
                system_event("deadline_check", "check_type", json!("deadlines")),
            ),
            (
                "weekend_reminder",
                next_local_occurrence(10, 0, Some(Weekday::Sat)),
                RecurrenceInterval::Weekly,
                system_event("time_based_check", "day_of_week", json!("saturday")),
            ),
        ];

        for (rule_id, trigger, interval, event) in definitions {
            if existing.iter().any(|r| r == rule_id) {
                continue;
            }
            let Some(trigger_time) = trigger else {
                warn!("No local occurrence computable for system job '{}'", rule_id);
                continue;
            };
            self.schedule(rule_id, trigger_time, event, Some(Recurrence::every(interval)))
                .await?;
        }
        Ok(())
    }

    async fn persist(&self) -> Result<(), SchedulerError> {
        let jobs: Vec<ScheduledJob> = self.jobs.read().await.values().cloned().collect();
        kv::set_typed(&self.kv, JOBS_KEY, &jobs).await?;
        Ok(())
    }

    #[cfg(test)]
    async fn inject_job(&self, job: ScheduledJob) {
        self.jobs.write().await.insert(job.id, job);
    }
}

/// Next occurrence of a recurring job, or `None` once its end date or
/// occurrence cap is reached.
fn successor_for(executed: &ScheduledJob) -> Option<ScheduledJob> {
    let recurrence = executed.recurring.as_ref()?;
    let count = recurrence.count + 1;
    if let Some(max) = recurrence.max_occurrences {
        if count >= max {
            return None;
        }
    }
    let trigger_time = next_trigger(executed.trigger_time, recurrence.interval);
    if let Some(end) = recurrence.end_date {
        if trigger_time > end {
            return None;
        }
    }
    Some(ScheduledJob {
        id: JobId::new_v4(),
        rule_id: executed.rule_id.clone(),
        user_id: executed.user_id.clone(),
        trigger_time,
        event: executed.event.clone(),
        recurring: Some(Recurrence {
            count,
            ..recurrence.clone()
        }),
        status: JobStatus::Pending,
        created_at: Utc::now(),
        executed_at: None,
        last_error: None,
        attempts: 0,
    })
}

fn system_event(event_type: &str, data_key: &str, data_value: serde_json::Value) -> TriggerEvent {
    let mut event = TriggerEvent::new(event_type, SYSTEM_USER).with_data(data_key, data_value);
    event.source = "scheduler".to_string();
    event
}

/// Next future wall-clock occurrence of `hour:minute` local time, optionally
/// pinned to a weekday. `None` only when the instant does not exist locally
/// (daylight saving gap).
fn next_local_occurrence(
    hour: u32,
    minute: u32,
    weekday: Option<Weekday>,
) -> Option<DateTime<Utc>> {
    let now = Local::now();
    let mut date = now.date_naive();
    if let Some(target) = weekday {
        while date.weekday() != target {
            date = date.succ_opt()?;
        }
    }

    let at = |d: chrono::NaiveDate| -> Option<DateTime<Utc>> {
        Local
            .from_local_datetime(&d.and_hms_opt(hour, minute, 0)?)
            .earliest()
            .map(|dt| dt.with_timezone(&Utc))
    };

    let candidate = at(date)?;
    if candidate > Utc::now() {
        return Some(candidate);
    }
    let step = if weekday.is_some() { 7 } else { 1 };
    at(date.checked_add_days(Days::new(step))?)
}
