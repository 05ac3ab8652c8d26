//! Integration test: the background physics thread, scene locks, and
//! result read-back.

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use rivet_core::ThreadingMode;
use rivet_engine::{BackgroundTaskState, DispatchConfig, Dispatcher, SceneLock, SolverRegistry};
use rivet_test_utils::{MockSimulation, SimTracker};

fn background(tick_rate_hz: f64) -> SolverRegistry {
    SolverRegistry::new(DispatchConfig {
        threading_mode: ThreadingMode::BackgroundThread,
        tick_rate_hz,
        ..DispatchConfig::default()
    })
    .unwrap()
}

fn wait_until(what: &str, done: impl Fn() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !done() {
        assert!(Instant::now() < deadline, "{what} not reached within 5s");
        thread::sleep(Duration::from_millis(1));
    }
}

#[test]
fn solvers_step_on_the_physics_thread() {
    let registry = background(200.0);
    let sim = MockSimulation::new();
    let tracker = sim.tracker();
    let solver = registry.create_solver(Box::new(sim));

    wait_until("three steps", || tracker.steps() >= 3);
    assert!(tracker
        .threads()
        .iter()
        .all(|name| name.as_deref() == Some("rivet-physics")));

    let task = registry.background_task().unwrap();
    wait_until("published results", || !solver.results().is_empty());
    assert!(task.frame() >= 3);
    assert_eq!(task.state(), BackgroundTaskState::Running);
    assert_eq!(task.solver_ids(), vec![solver.id()]);
}

#[test]
fn destroyed_solver_is_released_on_the_physics_thread() {
    let registry = background(200.0);
    let tracker = SimTracker::new();
    let id = registry
        .create_solver(Box::new(MockSimulation::new().with_tracker(tracker.clone())))
        .id();
    wait_until("first step", || tracker.steps() >= 1);

    assert!(registry.destroy_solver(id));
    assert!(!registry.destroy_solver(id));
    wait_until("release", || tracker.is_dropped());
    assert_eq!(tracker.dropped_on().as_deref(), Some("rivet-physics"));
}

#[test]
fn scene_lock_stalls_stepping_until_dropped() {
    let registry = background(200.0);
    let sim = MockSimulation::new();
    let tracker = sim.tracker();
    registry.create_solver(Box::new(sim));
    wait_until("first step", || tracker.steps() >= 1);

    let lock = registry.scene_lock(Some(Duration::from_secs(5)));
    assert!(lock.did_get_lock());
    let frozen = tracker.steps();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(tracker.steps(), frozen);

    drop(lock);
    wait_until("stepping resumes", || tracker.steps() > frozen);
}

#[test]
fn zero_timeout_fails_while_stalled_and_stepping_recovers() {
    let registry = Arc::new(background(200.0));
    let sim = MockSimulation::new();
    let tracker = sim.tracker();
    registry.create_solver(Box::new(sim));
    wait_until("first step", || tracker.steps() >= 1);

    // Another thread stalls the task and holds it.
    let (locked_tx, locked_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let holder = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            let lock = registry.scene_lock(None);
            locked_tx.send(lock.did_get_lock()).unwrap();
            release_rx.recv().unwrap();
            drop(lock);
        })
    };
    assert!(locked_rx.recv().unwrap());

    // The task cannot reach this thread's handshake while stalled.
    let dispatcher = registry.dispatcher();
    let lock = SceneLock::new(dispatcher.as_ref(), Some(Duration::ZERO));
    assert!(!lock.did_get_lock());
    drop(lock);

    release_tx.send(()).unwrap();
    holder.join().unwrap();

    // The abandoned handshake must not park the task.
    let resumed_at = tracker.steps();
    wait_until("stepping after timeout", || tracker.steps() > resumed_at + 2);
    wait_until("queue drained", || dispatcher.pending_commands() == 0);
}

#[test]
fn full_sync_reads_every_solver_under_the_lock() {
    let registry = background(200.0);
    let a = registry.create_solver(Box::new(MockSimulation::new()));
    let b = registry.create_solver(Box::new(MockSimulation::active_for(1)));
    wait_until("both published", || {
        !a.results().is_empty() && !b.results().is_empty()
    });

    let sync = registry.sync_proxies_from_cache(true);
    assert!(sync.locked);
    assert_eq!(sync.results.len(), 2);
    assert_eq!(sync.results[0].0, a.id());
    assert_eq!(sync.results[1].1.step, 1);
    assert!(sync.statistics.frame >= 1);

    let partial = registry.sync_proxies_from_cache(false);
    assert!(!partial.locked);
    assert_eq!(partial.results.len(), 2);
}

#[test]
fn disabled_solver_is_not_advanced() {
    let registry = background(200.0);
    let sim = MockSimulation::new();
    let tracker = sim.tracker();
    let solver = registry.create_solver(Box::new(sim));
    wait_until("first step", || tracker.steps() >= 1);

    assert!(registry.set_solver_enabled(solver.id(), false));
    wait_until("disabled", || !solver.is_enabled());
    let frozen = tracker.steps();
    thread::sleep(Duration::from_millis(30));
    assert_eq!(tracker.steps(), frozen);

    registry.set_solver_enabled(solver.id(), true);
    wait_until("re-enabled stepping", || tracker.steps() > frozen);
}

#[test]
fn shutdown_terminates_the_task() {
    let registry = background(200.0);
    let task = registry.background_task().unwrap();
    registry.shutdown();
    assert_eq!(task.state(), BackgroundTaskState::Terminated);
    assert!(registry.dispatcher().is_shut_down());
}
