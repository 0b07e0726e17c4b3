use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::JoinHandle;
use std::time::Duration;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use tracing::{error, info, warn};

use super::dispatch::DispatchAdapter;
use super::registry::{TaskRegistry, TaskTable};
use super::store::JsonTaskStore;
use super::trigger::{is_due, on_fire, validate_trigger, FireDisposition};
use super::types::{FireMarker, SchedulerError, Task, TaskStatus, Trigger, TriggerKind};

struct SchedulerState {
    registry: TaskRegistry,
    fired_today: HashSet<FireMarker>,
    observed_day: NaiveDate,
    // Monotonic edit counter; the table is persisted when it runs ahead
    // of flushed_generation, so a failed save is retried next tick.
    generation: u64,
    flushed_generation: u64,
}

/// Snapshot of a due task, taken so dispatch can run without the state lock.
struct DueTask {
    session_id: String,
    id: u64,
    target: String,
    content: String,
}

pub struct Scheduler<D: DispatchAdapter> {
    state: Mutex<SchedulerState>,
    dispatcher: D,
    store: JsonTaskStore,
    wall_offset: FixedOffset,
}

impl<D: DispatchAdapter> Scheduler<D> {
    /// Load the persisted task table and build a ready scheduler.
    ///
    /// Loading never fails: missing or corrupt storage starts empty, and
    /// fixed tasks that already fired today (by `last_fired_at`) are
    /// re-marked so a restart inside the fired minute cannot double-fire.
    pub fn load(storage_path: impl Into<PathBuf>, wall_offset: FixedOffset, dispatcher: D) -> Self {
        let store = JsonTaskStore::new(storage_path);
        let table = store.load();
        let today = Utc::now().with_timezone(&wall_offset).date_naive();
        let fired_today = seed_fire_markers(&table, wall_offset, today);
        let registry = TaskRegistry::from_table(table);
        Self {
            state: Mutex::new(SchedulerState {
                registry,
                fired_today,
                observed_day: today,
                generation: 0,
                flushed_generation: 0,
            }),
            dispatcher,
            store,
            wall_offset,
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.state
            .lock()
            .unwrap_or_else(|poison| poison.into_inner())
    }

    pub fn register_task(
        &self,
        session_id: &str,
        kind: TriggerKind,
        time_param: &str,
        content: &str,
    ) -> Result<u64, SchedulerError> {
        self.register_task_at(session_id, kind, time_param, content, Utc::now())
    }

    pub fn register_task_at(
        &self,
        session_id: &str,
        kind: TriggerKind,
        time_param: &str,
        content: &str,
        now: DateTime<Utc>,
    ) -> Result<u64, SchedulerError> {
        let (id, snapshot) = {
            let mut state = self.lock_state();
            let id = state
                .registry
                .register(session_id, kind, time_param, content, now)?;
            state.generation += 1;
            (id, (state.registry.table().clone(), state.generation))
        };
        self.flush_snapshot(&snapshot.0, snapshot.1);
        Ok(id)
    }

    pub fn update_content(
        &self,
        session_id: &str,
        id: u64,
        content: &str,
    ) -> Result<(), SchedulerError> {
        self.mutate(|registry| registry.update_content(session_id, id, content))
    }

    pub fn clear_content(&self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        self.mutate(|registry| registry.clear_content(session_id, id))
    }

    pub fn pause_task(&self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        self.mutate(|registry| registry.pause(session_id, id))
    }

    pub fn enable_task(&self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        self.mutate(|registry| registry.enable(session_id, id))
    }

    pub fn cancel_task(&self, session_id: &str, id: u64) -> Result<(), SchedulerError> {
        self.mutate(|registry| registry.cancel(session_id, id))
    }

    fn mutate<F>(&self, op: F) -> Result<(), SchedulerError>
    where
        F: FnOnce(&mut TaskRegistry) -> Result<(), SchedulerError>,
    {
        let snapshot = {
            let mut state = self.lock_state();
            op(&mut state.registry)?;
            state.generation += 1;
            (state.registry.table().clone(), state.generation)
        };
        self.flush_snapshot(&snapshot.0, snapshot.1);
        Ok(())
    }

    pub fn get_task(&self, session_id: &str, id: u64) -> Result<Task, SchedulerError> {
        let state = self.lock_state();
        state.registry.get(session_id, id).cloned()
    }

    pub fn list_tasks(&self, session_id: &str) -> Vec<Task> {
        self.lock_state().registry.list(session_id)
    }

    pub fn task_count(&self) -> usize {
        self.lock_state().registry.iter_ordered().count()
    }

    /// Run one evaluation pass against the current time.
    pub fn tick(&self) {
        self.tick_at(Utc::now());
    }

    /// Run one evaluation pass against an explicit instant.
    ///
    /// Dispatch runs on snapshots outside the state lock; a task cancelled
    /// or paused while its message is in flight is left untouched afterward.
    pub fn tick_at(&self, now: DateTime<Utc>) {
        let wall_now = now.with_timezone(&self.wall_offset);

        let due = {
            let mut state = self.lock_state();
            let today = wall_now.date_naive();
            if state.observed_day != today {
                state.fired_today.clear();
                state.observed_day = today;
            }
            collect_due(&state, now, wall_now)
        };

        let mut fired = Vec::new();
        for task in due {
            match self.dispatcher.send(&task.target, &task.content) {
                Ok(()) => fired.push(task),
                Err(err) => {
                    warn!(
                        "dispatch failed for task {} in session {}: {} (will retry next tick)",
                        task.id, task.session_id, err
                    );
                }
            }
        }

        if fired.is_empty() {
            return;
        }

        let snapshot = {
            let mut state = self.lock_state();
            for task in &fired {
                apply_fire(&mut state, task, now, wall_now.date_naive());
            }
            state.generation += 1;
            (state.registry.table().clone(), state.generation)
        };
        self.flush_snapshot(&snapshot.0, snapshot.1);
    }

    fn flush_snapshot(&self, table: &TaskTable, generation: u64) {
        match self.store.save(table) {
            Ok(()) => {
                let mut state = self.lock_state();
                if state.flushed_generation < generation {
                    state.flushed_generation = generation;
                }
            }
            Err(err) => {
                warn!("task table flush failed (will retry next tick): {}", err);
            }
        }
    }

    /// Persist the table if any edit is still unflushed. Called on shutdown.
    pub fn flush(&self) -> Result<(), SchedulerError> {
        let snapshot = {
            let state = self.lock_state();
            if state.generation == state.flushed_generation {
                return Ok(());
            }
            (state.registry.table().clone(), state.generation)
        };
        self.store.save(&snapshot.0)?;
        let mut state = self.lock_state();
        if state.flushed_generation < snapshot.1 {
            state.flushed_generation = snapshot.1;
        }
        Ok(())
    }

    /// Tick until the stop flag is raised, then flush pending edits.
    pub fn run_loop(&self, tick_period: Duration, stop_flag: &AtomicBool) {
        while !stop_flag.load(Ordering::Relaxed) {
            self.tick();
            std::thread::sleep(tick_period);
        }
        if let Err(err) = self.flush() {
            error!("final task table flush failed: {}", err);
        }
    }
}

fn seed_fire_markers(
    table: &TaskTable,
    wall_offset: FixedOffset,
    today: NaiveDate,
) -> HashSet<FireMarker> {
    let mut markers = HashSet::new();
    for tasks in table.values() {
        for task in tasks.values() {
            let Trigger::Fixed { hour, minute } = task.trigger else {
                continue;
            };
            let Some(last_fired_at) = task.last_fired_at else {
                continue;
            };
            if last_fired_at.with_timezone(&wall_offset).date_naive() == today {
                markers.insert(FireMarker {
                    session_id: task.session_id.clone(),
                    task_id: task.id,
                    day: today,
                    hour,
                    minute,
                });
            }
        }
    }
    markers
}

fn collect_due(
    state: &SchedulerState,
    now: DateTime<Utc>,
    wall_now: DateTime<FixedOffset>,
) -> Vec<DueTask> {
    let mut due = Vec::new();
    for task in state.registry.iter_ordered() {
        if !validate_trigger(&task.trigger) {
            warn!(
                "task {} in session {} has an out-of-range trigger; skipping",
                task.id, task.session_id
            );
            continue;
        }
        if is_due(task, now, wall_now, &state.fired_today) {
            due.push(DueTask {
                session_id: task.session_id.clone(),
                id: task.id,
                target: task.target.clone(),
                content: task.content.clone(),
            });
        }
    }
    due
}

fn apply_fire(state: &mut SchedulerState, fired: &DueTask, now: DateTime<Utc>, wall_day: NaiveDate) {
    let disposition = match state.registry.get_mut(&fired.session_id, fired.id) {
        Some(task) if task.status == TaskStatus::Active => on_fire(task, now, wall_day),
        // Cancelled or paused while the dispatch was in flight.
        _ => return,
    };
    match disposition {
        FireDisposition::Retain => {}
        FireDisposition::RetainWithMarker(marker) => {
            state.fired_today.insert(marker);
        }
        FireDisposition::Remove => {
            state.registry.remove_if_present(&fired.session_id, fired.id);
        }
    }
}

/// Handle to a scheduler thread started with [`start_scheduler_thread`].
pub struct SchedulerControl {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl SchedulerControl {
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    pub fn stop_and_join(mut self) {
        self.stop();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("scheduler thread panicked");
            }
        }
    }
}

/// Spawn the scheduler loop on a dedicated thread.
pub fn start_scheduler_thread<D>(
    scheduler: Arc<Scheduler<D>>,
    tick_period: Duration,
) -> SchedulerControl
where
    D: DispatchAdapter + Send + Sync + 'static,
{
    let stop = Arc::new(AtomicBool::new(false));
    let stop_for_thread = Arc::clone(&stop);
    let handle = std::thread::spawn(move || {
        info!("scheduler loop started");
        scheduler.run_loop(tick_period, &stop_for_thread);
        info!("scheduler loop stopped");
    });
    SchedulerControl {
        stop,
        handle: Some(handle),
    }
}
