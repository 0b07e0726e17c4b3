use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use super::trigger::parse_time_param;
use super::types::{SchedulerError, Task, TaskStatus, TriggerKind};

/// Persisted shape: session id to task id to task. BTreeMaps keep the
/// serialized table and the evaluation order stable.
pub(crate) type TaskTable = BTreeMap<String, BTreeMap<u64, Task>>;

/// In-memory task registry with a single id counter across all sessions.
#[derive(Debug, Default)]
pub(super) struct TaskRegistry {
    table: TaskTable,
    next_id: u64,
}

impl TaskRegistry {
    pub(super) fn from_table(table: TaskTable) -> Self {
        let next_id = table
            .values()
            .flat_map(|tasks| tasks.keys())
            .max()
            .map_or(1, |max| max + 1);
        Self { table, next_id }
    }

    pub(super) fn table(&self) -> &TaskTable {
        &self.table
    }

    pub(super) fn register(
        &mut self,
        session_id: &str,
        kind: TriggerKind,
        time_param: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, SchedulerError> {
        let trigger = parse_time_param(kind, time_param)?;
        let id = self.next_id;
        self.next_id += 1;

        let task = Task {
            id,
            session_id: session_id.to_string(),
            trigger,
            content: content.to_string(),
            status: TaskStatus::Active,
            created_at: now,
            last_fired_at: None,
            target: session_id.to_string(),
        };
        self.table
            .entry(session_id.to_string())
            .or_default()
            .insert(id, task);
        Ok(id)
    }

    pub(super) fn get(&self, session_id: &str, id: u64) -> Result<&Task, SchedulerError> {
        self.table
            .get(session_id)
            .and_then(|tasks| tasks.get(&id))
            .ok_or_else(|| SchedulerError::NotFound {
                session: session_id.to_string(),
                id,
            })
    }

    pub(super) fn get_mut(&mut self, session_id: &str, id: u64) -> Option<&mut Task> {
        self.table
            .get_mut(session_id)
            .and_then(|tasks| tasks.get_mut(&id))
    }

    pub(super) fn list(&self, session_id: &str) -> Vec<Task> {
        self.table
            .get(session_id)
            .map(|tasks| tasks.values().cloned().collect())
            .unwrap_or_default()
    }

    pub(super) fn update_content(
        &mut self,
        session_id: &str,
        id: u64,
        content: &str,
    ) -> Result<(), SchedulerError> {
        let task = self.require_mut(session_id, id)?;
        task.content = content.to_string();
        Ok(())
    }

    pub(super) fn clear_content(&mut self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        let task = self.require_mut(session_id, id)?;
        task.content.clear();
        Ok(())
    }

    pub(super) fn pause(&mut self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        let task = self.require_mut(session_id, id)?;
        task.status = TaskStatus::Paused;
        Ok(())
    }

    pub(super) fn enable(&mut self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        let task = self.require_mut(session_id, id)?;
        task.status = TaskStatus::Active;
        Ok(())
    }

    pub(super) fn cancel(&mut self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        let tasks = self
            .table
            .get_mut(session_id)
            .ok_or_else(|| SchedulerError::NotFound {
                session: session_id.to_string(),
                id,
            })?;
        if tasks.remove(&id).is_none() {
            return Err(SchedulerError::NotFound {
                session: session_id.to_string(),
                id,
            });
        }
        if tasks.is_empty() {
            self.table.remove(session_id);
        }
        Ok(())
    }

    /// Remove a task if it still exists. Used for terminal one-shot tasks,
    /// which may have been cancelled while their dispatch was in flight.
    pub(super) fn remove_if_present(&mut self, session_id: &str, id: u64) {
        if let Some(tasks) = self.table.get_mut(session_id) {
            tasks.remove(&id);
            if tasks.is_empty() {
                self.table.remove(session_id);
            }
        }
    }

    /// All tasks in session order, then id order within each session.
    pub(super) fn iter_ordered(&self) -> impl Iterator<Item = &Task> {
        self.table.values().flat_map(|tasks| tasks.values())
    }

    fn require_mut(&mut self, session_id: &str, id: u64) -> Result<&mut Task, SchedulerError> {
        self.table
            .get_mut(session_id)
            .and_then(|tasks| tasks.get_mut(&id))
            .ok_or_else(|| SchedulerError::NotFound {
                session: session_id.to_string(),
                id,
            })
    }
}
