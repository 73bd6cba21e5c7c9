use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use tokio::sync::Mutex;

use crate::store::{AlertLevel, TaskId};

/// Per-task alert state between poll ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlertState {
    #[default]
    Idle,
    /// Claimed by a tick, dispatch in flight.
    Pending(AlertLevel),
    Fired(AlertLevel),
}

#[derive(Debug, Default)]
struct LedgerInner {
    states: HashMap<TaskId, AlertState>,
    fired: HashMap<(TaskId, AlertLevel), DateTime<Utc>>,
}

/// In-memory dedup of (task, level) dispatches across ticks.
#[derive(Debug)]
pub struct AlertLedger {
    ttl: Duration,
    inner: Mutex<LedgerInner>,
}

impl AlertLedger {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Moves the task to `Pending(level)` unless that level is already in
    /// flight or fired within the TTL.
    pub async fn try_claim(&self, task_id: TaskId, level: AlertLevel, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().await;
        let ttl = self.ttl;
        inner.fired.retain(|_, at| now - *at < ttl);

        if inner.fired.contains_key(&(task_id, level)) {
            return false;
        }
        if inner.states.get(&task_id) == Some(&AlertState::Pending(level)) {
            return false;
        }

        inner.states.insert(task_id, AlertState::Pending(level));
        true
    }

    pub async fn mark_fired(&self, task_id: TaskId, level: AlertLevel, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().await;
        inner.states.insert(task_id, AlertState::Fired(level));
        inner.fired.insert((task_id, level), now);
    }

    /// Drops a claim whose dispatch did not complete so a later tick retries.
    pub async fn release(&self, task_id: TaskId, level: AlertLevel) {
        let mut inner = self.inner.lock().await;
        if inner.states.get(&task_id) == Some(&AlertState::Pending(level)) {
            inner.states.remove(&task_id);
        }
    }

    /// Resets every task not in `active` to `Idle`.
    pub async fn retain_active(&self, active: &HashSet<TaskId>) {
        let mut inner = self.inner.lock().await;
        inner.states.retain(|task_id, _| active.contains(task_id));
        inner.fired.retain(|(task_id, _), _| active.contains(task_id));
    }

    pub async fn reset(&self, task_id: TaskId) {
        let mut inner = self.inner.lock().await;
        inner.states.remove(&task_id);
        inner.fired.retain(|(id, _), _| *id != task_id);
    }

    pub async fn state(&self, task_id: TaskId) -> AlertState {
        self.inner
            .lock()
            .await
            .states
            .get(&task_id)
            .copied()
            .unwrap_or_default()
    }
}
