use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::FixedOffset;
use tempfile::TempDir;

use scheduler_module::{
    start_scheduler_thread, DispatchAdapter, Scheduler, SchedulerError, TriggerKind,
};

#[derive(Clone, Default)]
struct CountingDispatcher {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl CountingDispatcher {
    fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().expect("sent lock").clone()
    }
}

impl DispatchAdapter for CountingDispatcher {
    fn send(&self, target: &str, content: &str) -> Result<(), SchedulerError> {
        self.sent
            .lock()
            .expect("sent lock")
            .push((target.to_string(), content.to_string()));
        Ok(())
    }
}

fn no_offset() -> FixedOffset {
    FixedOffset::east_opt(0).expect("zero offset")
}

#[test]
fn loop_fires_interval_and_once_tasks_against_real_time() {
    let temp = TempDir::new().expect("tempdir");
    let path = temp.path().join("tasks.json");
    let dispatcher = CountingDispatcher::default();
    let scheduler = Arc::new(Scheduler::load(&path, no_offset(), dispatcher.clone()));

    // 0.003 minutes is 180ms; 0.001 minutes is 60ms.
    scheduler
        .register_task("s1", TriggerKind::Interval, "0.003", "tick-tock")
        .expect("register interval");
    let once_id = scheduler
        .register_task("s1", TriggerKind::Once, "0.001", "just once")
        .expect("register once");

    let control = start_scheduler_thread(Arc::clone(&scheduler), Duration::from_millis(25));
    std::thread::sleep(Duration::from_millis(700));
    control.stop_and_join();

    let sent = dispatcher.sent();
    let interval_fires = sent.iter().filter(|(_, text)| text == "tick-tock").count();
    let once_fires = sent.iter().filter(|(_, text)| text == "just once").count();
    assert!(
        interval_fires >= 2,
        "expected at least two interval firings, got {interval_fires}"
    );
    assert_eq!(once_fires, 1);

    // The fired one-shot must be gone from the persisted table too.
    assert!(path.exists());
    let reloaded = Scheduler::load(&path, no_offset(), CountingDispatcher::default());
    assert!(matches!(
        reloaded.get_task("s1", once_id),
        Err(SchedulerError::NotFound { .. })
    ));
    assert_eq!(reloaded.list_tasks("s1").len(), 1);
}

#[test]
fn stop_and_join_returns_quickly_even_mid_sleep() {
    let temp = TempDir::new().expect("tempdir");
    let scheduler = Arc::new(Scheduler::load(
        temp.path().join("tasks.json"),
        no_offset(),
        CountingDispatcher::default(),
    ));

    let control = start_scheduler_thread(Arc::clone(&scheduler), Duration::from_millis(10));
    std::thread::sleep(Duration::from_millis(50));

    let started = Instant::now();
    control.stop_and_join();
    assert!(started.elapsed() < Duration::from_secs(1));
}

#[test]
fn run_loop_exits_when_stop_flag_is_preset() {
    let temp = TempDir::new().expect("tempdir");
    let scheduler = Scheduler::load(
        temp.path().join("tasks.json"),
        no_offset(),
        CountingDispatcher::default(),
    );

    let stop = AtomicBool::new(true);
    scheduler.run_loop(Duration::from_millis(10), &stop);
}
