//! Recurrence schedules: the canonical model, the form-input resolver,
//! occurrence expansion and the service persisting resolved schedules.

mod model;
mod occurrence;
mod resolver;
mod service;

pub use model::{
    weekday_from_index, weekday_index, MonthlyPattern, PatternVariant, Repeat, RepeatKind,
    ScheduleRow, ScheduleSpec, WeekOfMonth,
};
pub use resolver::{RecurrenceInput, RecurrenceResolver, ResolveMode};
pub use service::ScheduleService;
