//! Deadline alerting: level calculation, dispatch and the polling scheduler.

mod calculator;
mod dispatcher;
mod ledger;
mod scheduler;

pub use calculator::{AlertCalculator, AlertWindows};
pub use dispatcher::{days_remaining, AlertDispatcher, AlertMessage, DispatchError, ALERT_RAISED_EVENT};
pub use ledger::{AlertLedger, AlertState};
pub use scheduler::{AlertScheduler, SchedulerSettings, TaskOutcome, TickReport};
