//! Polling loop that evaluates in-progress tasks and fires due alerts.
//!
//! Each tick reads the in-progress set, evaluates every task concurrently and
//! dispatches at most one alert per (task, level). Ticks never overlap: a
//! slow tick pushes the next one back.

use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde::Serialize;
use std::{collections::HashSet, sync::Arc, time::Duration as StdDuration};
use tokio::{
    sync::watch,
    time::{interval, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

use crate::{
    alerts::{AlertCalculator, AlertDispatcher, AlertLedger},
    metrics::{SCHEDULER_TICKS_TOTAL, SCHEDULER_TICK_FAILURES_TOTAL},
    store::{AlertEventRepository, AlertLevel, Task, TaskRepository, TaskStatus},
    Result,
};

#[derive(Debug, Clone, Copy)]
pub struct SchedulerSettings {
    pub poll_interval: StdDuration,
    /// How long a fired (task, level) stays in the in-memory dedup cache.
    pub dedup_ttl: Duration,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            poll_interval: StdDuration::from_secs(60),
            dedup_ttl: Duration::seconds(120),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "level", rename_all = "snake_case")]
pub enum TaskOutcome {
    NotDue,
    Dispatched(AlertLevel),
    AlreadySent(AlertLevel),
    Failed,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub evaluated: usize,
    pub dispatched: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl TickReport {
    fn add(&mut self, outcome: TaskOutcome) {
        self.evaluated += 1;
        match outcome {
            TaskOutcome::NotDue => {}
            TaskOutcome::Dispatched(_) => self.dispatched += 1,
            TaskOutcome::AlreadySent(_) => self.skipped += 1,
            TaskOutcome::Failed => self.failed += 1,
        }
    }
}

pub struct AlertScheduler {
    tasks: Arc<dyn TaskRepository>,
    events: Arc<dyn AlertEventRepository>,
    calculator: AlertCalculator,
    dispatcher: Arc<AlertDispatcher>,
    ledger: AlertLedger,
    poll_interval: StdDuration,
}

impl AlertScheduler {
    pub fn new(
        tasks: Arc<dyn TaskRepository>,
        events: Arc<dyn AlertEventRepository>,
        calculator: AlertCalculator,
        dispatcher: Arc<AlertDispatcher>,
        settings: SchedulerSettings,
    ) -> Self {
        Self {
            tasks,
            events,
            calculator,
            dispatcher,
            ledger: AlertLedger::new(settings.dedup_ttl),
            poll_interval: settings.poll_interval,
        }
    }

    pub fn ledger(&self) -> &AlertLedger {
        &self.ledger
    }

    /// Runs ticks until `shutdown` turns true or its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            "Alert scheduler started, evaluating in-progress tasks every {}s",
            self.poll_interval.as_secs()
        );

        let mut ticker = interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.tick(Utc::now()).await {
                        error!(error = %e, "Alert tick skipped");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Alert scheduler stopped");
    }

    /// One poll tick. A failure to read the in-progress set skips the whole
    /// tick; per-task failures are counted in the report.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport> {
        debug!("Alert tick at {}", now);

        let tasks = match self.tasks.list_in_progress().await {
            Ok(tasks) => tasks,
            Err(e) => {
                SCHEDULER_TICK_FAILURES_TOTAL.inc();
                return Err(e);
            }
        };

        let active: HashSet<_> = tasks.iter().map(|t| t.id).collect();
        self.ledger.retain_active(&active).await;

        let outcomes = join_all(tasks.iter().map(|task| self.process(task, now))).await;

        let mut report = TickReport::default();
        for outcome in outcomes {
            report.add(outcome);
        }

        SCHEDULER_TICKS_TOTAL.inc();
        debug!(
            evaluated = report.evaluated,
            dispatched = report.dispatched,
            skipped = report.skipped,
            failed = report.failed,
            "Alert tick finished"
        );
        Ok(report)
    }

    /// Immediate evaluation for a task whose status just changed.
    pub async fn on_status_change(&self, task: &Task, now: DateTime<Utc>) -> TaskOutcome {
        if task.status != TaskStatus::InProgress {
            self.ledger.reset(task.id).await;
            return TaskOutcome::NotDue;
        }
        self.process(task, now).await
    }

    async fn process(&self, task: &Task, now: DateTime<Utc>) -> TaskOutcome {
        let level = match self.calculator.evaluate(task.start_date, task.end_date, now) {
            Ok(Some(level)) => level,
            Ok(None) => return TaskOutcome::NotDue,
            Err(e) => {
                warn!(task_id = task.id, error = %e, "Skipping task with invalid window");
                return TaskOutcome::Failed;
            }
        };

        if !self.ledger.try_claim(task.id, level, now).await {
            return TaskOutcome::AlreadySent(level);
        }

        match self.events.alert_exists(task.id, level).await {
            Ok(true) => {
                self.ledger.mark_fired(task.id, level, now).await;
                return TaskOutcome::AlreadySent(level);
            }
            Ok(false) => {}
            Err(e) => {
                warn!(task_id = task.id, level = %level, error = %e, "Alert lookup failed");
                self.ledger.release(task.id, level).await;
                return TaskOutcome::Failed;
            }
        }

        match self.dispatcher.dispatch(task, level, now).await {
            Ok(_) => {
                self.ledger.mark_fired(task.id, level, now).await;
                TaskOutcome::Dispatched(level)
            }
            Err(e) => {
                error!(task_id = task.id, level = %level, error = %e, "Alert dispatch failed");
                self.ledger.release(task.id, level).await;
                TaskOutcome::Failed
            }
        }
    }
}
