//! Recurring and deferred message scheduling.
//!
//! Tasks are registered per session with one of three trigger kinds
//! (interval, once, fixed wall-clock time) and dispatched through a
//! pluggable adapter when due. The task table is persisted as JSON and
//! survives restarts.

pub mod config;
mod scheduler;

pub use config::SchedulerConfig;
pub use scheduler::{
    start_scheduler_thread, DispatchAdapter, Scheduler, SchedulerControl, SchedulerError, Task,
    TaskStatus, Trigger, TriggerKind, WebhookDispatcher,
};
