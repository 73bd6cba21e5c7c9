use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;

use crate::{
    recurrence::{RecurrenceInput, RecurrenceResolver, ResolveMode, ScheduleSpec},
    store::{ScheduleRepository, Task, TaskId},
    Result,
};

/// Resolves recurrence form input and keeps the stored schedule of a task in
/// step with it.
pub struct ScheduleService {
    repository: Arc<dyn ScheduleRepository>,
    resolver: RecurrenceResolver,
    mode: ResolveMode,
}

impl ScheduleService {
    pub fn new(
        repository: Arc<dyn ScheduleRepository>,
        resolver: RecurrenceResolver,
        mode: ResolveMode,
    ) -> Self {
        Self {
            repository,
            resolver,
            mode,
        }
    }

    /// Resolves `input` against the task's start and replaces its schedule.
    /// A non-recurring result removes any stored schedule.
    pub async fn apply(
        &self,
        task_id: TaskId,
        input: &RecurrenceInput,
        reference_start: DateTime<Utc>,
    ) -> Result<ScheduleSpec> {
        let spec = self.resolver.resolve_with(self.mode, input, reference_start)?;

        if spec.is_recurring() {
            self.repository.upsert_schedule(task_id, &spec).await?;
            info!(
                task_id,
                repeat_kind = %spec.repeat_kind(),
                pattern_variant = %spec.pattern_variant(),
                "Saved recurrence schedule"
            );
        } else if self.repository.delete_schedule(task_id).await? {
            info!(task_id, "Removed recurrence schedule");
        }

        Ok(spec)
    }

    pub async fn get(&self, task_id: TaskId) -> Result<Option<ScheduleSpec>> {
        self.repository.get_schedule(task_id).await
    }

    pub async fn remove(&self, task_id: TaskId) -> Result<bool> {
        self.repository.delete_schedule(task_id).await
    }

    /// Next time the task comes due after `after`. Tasks without a stored
    /// schedule occur once, at their start.
    pub async fn next_occurrence(
        &self,
        task: &Task,
        after: DateTime<Utc>,
    ) -> Result<Option<DateTime<Utc>>> {
        let spec = self
            .repository
            .get_schedule(task.id)
            .await?
            .unwrap_or_else(ScheduleSpec::none);

        Ok(spec.next_occurrence(task.start_date, after, self.resolver.offset()))
    }
}
