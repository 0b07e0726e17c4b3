mod core;
mod dispatch;
mod registry;
mod store;
mod trigger;
mod types;

pub use core::{start_scheduler_thread, Scheduler, SchedulerControl};
pub use dispatch::{DispatchAdapter, WebhookDispatcher};
pub use types::{SchedulerError, Task, TaskStatus, Trigger, TriggerKind};
