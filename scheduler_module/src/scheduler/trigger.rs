use std::collections::HashSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Timelike, Utc};

use super::types::{FireMarker, SchedulerError, Task, TaskStatus, Trigger, TriggerKind};

/// Parse a textual time parameter into a trigger.
///
/// Interval and once parameters are positive minute counts (fractions
/// allowed); fixed parameters are `HH:MM` on a 24-hour clock.
pub(super) fn parse_time_param(kind: TriggerKind, raw: &str) -> Result<Trigger, SchedulerError> {
    let raw = raw.trim();
    let invalid = || SchedulerError::InvalidTimeParam {
        kind: kind.label(),
        value: raw.to_string(),
    };

    match kind {
        TriggerKind::Interval | TriggerKind::Once => {
            let minutes: f64 = raw.parse().map_err(|_| invalid())?;
            if !minutes.is_finite() || minutes <= 0.0 {
                return Err(invalid());
            }
            Ok(match kind {
                TriggerKind::Interval => Trigger::Interval { minutes },
                _ => Trigger::Once {
                    delay_minutes: minutes,
                },
            })
        }
        TriggerKind::Fixed => {
            let (hour_raw, minute_raw) = raw.split_once(':').ok_or_else(invalid)?;
            let hour: u32 = hour_raw.trim().parse().map_err(|_| invalid())?;
            let minute: u32 = minute_raw.trim().parse().map_err(|_| invalid())?;
            if hour > 23 || minute > 59 {
                return Err(invalid());
            }
            Ok(Trigger::Fixed { hour, minute })
        }
    }
}

/// Check a stored trigger against the same bounds `parse_time_param` enforces.
/// Persisted tables are edited by hand often enough that this cannot be assumed.
pub(super) fn validate_trigger(trigger: &Trigger) -> bool {
    match trigger {
        Trigger::Interval { minutes }
        | Trigger::Once {
            delay_minutes: minutes,
        } => minutes.is_finite() && *minutes > 0.0,
        Trigger::Fixed { hour, minute } => *hour <= 23 && *minute <= 59,
    }
}

fn elapsed_seconds(from: DateTime<Utc>, to: DateTime<Utc>) -> f64 {
    (to - from).num_milliseconds() as f64 / 1000.0
}

/// Decide whether a task should fire at this instant.
///
/// Paused and empty-content tasks never fire. Fixed tasks compare against
/// the wall clock and are suppressed once per day by the marker set.
pub(super) fn is_due(
    task: &Task,
    now: DateTime<Utc>,
    wall_now: DateTime<FixedOffset>,
    fired_today: &HashSet<FireMarker>,
) -> bool {
    if task.status != TaskStatus::Active || task.content.is_empty() {
        return false;
    }

    match &task.trigger {
        Trigger::Interval { minutes } => {
            let anchor = task.last_fired_at.unwrap_or(task.created_at);
            elapsed_seconds(anchor, now) >= minutes * 60.0
        }
        Trigger::Once { delay_minutes } => {
            elapsed_seconds(task.created_at, now) >= delay_minutes * 60.0
        }
        Trigger::Fixed { hour, minute } => {
            if wall_now.hour() != *hour || wall_now.minute() != *minute {
                return false;
            }
            let marker = FireMarker {
                session_id: task.session_id.clone(),
                task_id: task.id,
                day: wall_now.date_naive(),
                hour: *hour,
                minute: *minute,
            };
            !fired_today.contains(&marker)
        }
    }
}

/// What to do with a task after a successful dispatch.
#[derive(Debug)]
pub(super) enum FireDisposition {
    Retain,
    RetainWithMarker(FireMarker),
    Remove,
}

/// Record a firing on the task and report its disposition.
pub(super) fn on_fire(task: &mut Task, now: DateTime<Utc>, wall_day: NaiveDate) -> FireDisposition {
    match &task.trigger {
        Trigger::Interval { .. } => {
            task.last_fired_at = Some(now);
            FireDisposition::Retain
        }
        Trigger::Once { .. } => FireDisposition::Remove,
        Trigger::Fixed { hour, minute } => {
            task.last_fired_at = Some(now);
            FireDisposition::RetainWithMarker(FireMarker {
                session_id: task.session_id.clone(),
                task_id: task.id,
                day: wall_day,
                hour: *hour,
                minute: *minute,
            })
        }
    }
}
