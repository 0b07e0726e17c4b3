use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;

use crate::scheduler::SchedulerError;

const DEFAULT_TICK_SECS: u64 = 10;

/// Daemon configuration read from the environment.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Where the task table is persisted.
    pub state_path: PathBuf,
    /// How often the loop evaluates triggers.
    pub tick_period: Duration,
    /// Wall-clock offset used by fixed-time triggers.
    pub wall_offset: FixedOffset,
    /// Optional JSON routes file for the delivery table.
    pub routes_path: Option<PathBuf>,
}

impl SchedulerConfig {
    pub fn from_env() -> Result<Self, SchedulerError> {
        dotenvy::dotenv().ok();

        let state_path = std::env::var("SCHEDULER_STATE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("state/tasks.json"));

        let tick_secs = std::env::var("SCHEDULER_TICK_SECS")
            .ok()
            .and_then(|value| value.trim().parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_TICK_SECS);

        let offset_minutes = std::env::var("SCHEDULER_UTC_OFFSET_MINUTES")
            .ok()
            .map(|value| {
                value.trim().parse::<i32>().map_err(|_| {
                    SchedulerError::Config(format!(
                        "SCHEDULER_UTC_OFFSET_MINUTES is not an integer: {value}"
                    ))
                })
            })
            .transpose()?
            .unwrap_or(0);
        let wall_offset = FixedOffset::east_opt(offset_minutes * 60).ok_or_else(|| {
            SchedulerError::Config(format!(
                "SCHEDULER_UTC_OFFSET_MINUTES out of range: {offset_minutes}"
            ))
        })?;

        let routes_path = std::env::var("MESSAGE_ROUTES_PATH")
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);

        Ok(Self {
            state_path,
            tick_period: Duration::from_secs(tick_secs),
            wall_offset,
            routes_path,
        })
    }
}
