//! The background physics task and its shared handle.
//!
//! The background thread owns a [`BackgroundTask`] exclusively (moved in
//! at spawn, handed back through the join handle at shutdown). Everything
//! the producer may look at while the thread runs lives in the
//! [`BackgroundTaskHandle`]: the command queue, the lifecycle state, the
//! published statistics, and a weak roster of the solvers being stepped.
//!
//! Each tick:
//!
//! 1. drain the dispatcher queue, passing the task to Task commands;
//! 2. for every owned solver, drain its commands, advance it if enabled
//!    with active work, and publish its results;
//! 3. publish [`TaskStatistics`] through a double buffer;
//! 4. park for the rest of the tick budget.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, Thread};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use rivet_core::{SolverId, SolverResults};

use crate::buffer::DoubleBuffer;
use crate::command::Command;
use crate::config::DispatchConfig;
use crate::metrics::{SolverCounters, TaskStatistics};
use crate::queue::CommandQueue;
use crate::reentrant::ReentrancyMap;
use crate::scene_lock::SceneLock;
use crate::solver::Solver;
use crate::sync::Event;

/// Lifecycle of the background task.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BackgroundTaskState {
    /// Ticking.
    Running,
    /// Shutdown was requested; the current tick is finishing.
    ShutdownRequested,
    /// The loop has exited.
    Terminated,
}

/// Results gathered by [`BackgroundTaskHandle::sync_proxies_from_cache`].
#[derive(Clone, Debug, Default)]
pub struct ProxySync {
    /// Whether the task was stalled while results were read, making them
    /// consistent across solvers.
    pub locked: bool,
    /// Statistics of the last completed tick.
    pub statistics: TaskStatistics,
    /// Latest published results of every solver on the roster.
    pub results: Vec<(SolverId, SolverResults)>,
}

// ── BackgroundTaskHandle ────────────────────────────────────────

/// State shared between the background thread and the producer.
#[derive(Debug)]
pub struct BackgroundTaskHandle {
    queue: CommandQueue,
    state: Mutex<BackgroundTaskState>,
    shutdown_requested: AtomicBool,
    shutdown_event: Event,
    statistics: DoubleBuffer<TaskStatistics>,
    roster: RwLock<IndexMap<SolverId, Weak<Solver>>>,
    scene_locks: Arc<ReentrancyMap>,
    thread: Mutex<Option<Thread>>,
    scene_lock_timeout: Option<Duration>,
}

// Compile-time assertion: the handle is shared across threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<BackgroundTaskHandle>();
};

impl BackgroundTaskHandle {
    pub(crate) fn new(config: &DispatchConfig) -> Self {
        Self {
            queue: CommandQueue::new("background", config.queue_high_water_mark),
            state: Mutex::new(BackgroundTaskState::Running),
            shutdown_requested: AtomicBool::new(false),
            shutdown_event: Event::new(),
            statistics: DoubleBuffer::default(),
            roster: RwLock::new(IndexMap::new()),
            scene_locks: Arc::new(ReentrancyMap::new()),
            thread: Mutex::new(None),
            scene_lock_timeout: config.scene_lock_timeout(),
        }
    }

    pub(crate) fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub(crate) fn enqueue(&self, command: Command) {
        self.queue.push_command(command);
    }

    pub(crate) fn scene_locks(&self) -> &Arc<ReentrancyMap> {
        &self.scene_locks
    }

    pub(crate) fn attach_thread(&self, thread: Thread) {
        *self.thread.lock() = Some(thread);
    }

    /// Whether the calling thread is the background thread.
    pub fn is_task_thread(&self) -> bool {
        self.thread
            .lock()
            .as_ref()
            .is_some_and(|t| t.id() == thread::current().id())
    }

    /// Current lifecycle state.
    pub fn state(&self) -> BackgroundTaskState {
        *self.state.lock()
    }

    /// Ask the loop to exit after the current tick and wake it if parked.
    pub fn request_shutdown(&self) {
        self.shutdown_requested.store(true, Ordering::Release);
        {
            let mut state = self.state.lock();
            if *state == BackgroundTaskState::Running {
                *state = BackgroundTaskState::ShutdownRequested;
            }
        }
        if let Some(t) = self.thread.lock().as_ref() {
            t.unpark();
        }
    }

    /// Whether shutdown has been requested.
    pub fn shutdown_requested(&self) -> bool {
        self.shutdown_requested.load(Ordering::Acquire)
    }

    /// Signalled once the loop has exited.
    pub fn shutdown_event(&self) -> &Event {
        &self.shutdown_event
    }

    /// Block until the loop has exited or `timeout` elapses.
    pub fn wait_terminated(&self, timeout: Option<Duration>) -> bool {
        self.shutdown_event.wait_for(timeout)
    }

    /// Statistics of the last completed tick.
    pub fn statistics(&self) -> TaskStatistics {
        self.statistics.snapshot()
    }

    /// Ticks completed so far.
    pub fn frame(&self) -> u64 {
        self.statistics.read(|s| s.frame)
    }

    /// Ids of the solvers the task currently steps, in stepping order.
    pub fn solver_ids(&self) -> Vec<SolverId> {
        self.roster.read().keys().copied().collect()
    }

    /// Batches waiting in the task's queue.
    pub fn pending_commands(&self) -> usize {
        self.queue.len()
    }

    /// How many times the task's queue crossed its high water mark.
    pub fn high_water_events(&self) -> u64 {
        self.queue.high_water_events()
    }

    /// Read back published results.
    ///
    /// A full sync stalls the task with a [`SceneLock`] (using the
    /// configured timeout) so the results of every solver come from the
    /// same tick. A partial sync reads whatever each solver last
    /// published.
    pub fn sync_proxies_from_cache(&self, full_sync: bool) -> ProxySync {
        let lock = full_sync.then(|| SceneLock::for_task(self, self.scene_lock_timeout));
        let locked = lock.as_ref().is_some_and(SceneLock::did_get_lock);
        if full_sync && !locked {
            tracing::debug!("full proxy sync fell back to unlocked read");
        }
        let results = self
            .roster
            .read()
            .iter()
            .filter_map(|(id, weak)| weak.upgrade().map(|s| (*id, s.results())))
            .collect();
        ProxySync {
            locked,
            statistics: self.statistics(),
            results,
        }
    }

    fn terminate(&self) {
        *self.state.lock() = BackgroundTaskState::Terminated;
        self.shutdown_event.signal();
    }
}

/// Marks the task terminated when the loop exits, including by panic.
struct TerminateOnExit(Arc<BackgroundTaskHandle>);

impl Drop for TerminateOnExit {
    fn drop(&mut self) {
        self.0.terminate();
    }
}

// ── BackgroundTask ──────────────────────────────────────────────

/// The loop state owned by the background thread.
pub struct BackgroundTask {
    handle: Arc<BackgroundTaskHandle>,
    solvers: IndexMap<SolverId, Arc<Solver>>,
    tick_budget: Duration,
    step_dt: f64,
    frame: u64,
    sim_time: f64,
    overruns: u64,
}

impl BackgroundTask {
    pub(crate) fn new(handle: Arc<BackgroundTaskHandle>, config: &DispatchConfig) -> Self {
        Self {
            handle,
            solvers: IndexMap::new(),
            tick_budget: config.tick_budget(),
            step_dt: config.step_dt(),
            frame: 0,
            sim_time: 0.0,
            overruns: 0,
        }
    }

    /// The shared handle.
    pub fn handle(&self) -> &Arc<BackgroundTaskHandle> {
        &self.handle
    }

    /// Take ownership of stepping `solver`. Returns `false` if it was
    /// already owned.
    pub fn add_solver(&mut self, solver: Arc<Solver>) -> bool {
        let id = solver.id();
        if self.solvers.contains_key(&id) {
            return false;
        }
        self.solvers.insert(id, solver);
        self.publish_roster();
        tracing::debug!(solver = %id, "solver added to background task");
        true
    }

    /// Stop stepping `id` and hand back the task's reference.
    pub fn remove_solver(&mut self, id: SolverId) -> Option<Arc<Solver>> {
        let removed = self.solvers.shift_remove(&id);
        if removed.is_some() {
            self.publish_roster();
            tracing::debug!(solver = %id, "solver removed from background task");
        }
        removed
    }

    /// A solver owned by the task.
    pub fn solver(&self, id: SolverId) -> Option<&Arc<Solver>> {
        self.solvers.get(&id)
    }

    /// Number of solvers owned by the task.
    pub fn solver_count(&self) -> usize {
        self.solvers.len()
    }

    /// Ticks completed so far.
    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Run ticks until shutdown is requested. Returns the task so the
    /// joining thread can drain what is left.
    pub(crate) fn run(mut self) -> Self {
        let _exit = TerminateOnExit(Arc::clone(&self.handle));
        tracing::info!(
            budget_us = self.tick_budget.as_micros() as u64,
            step_dt = self.step_dt,
            "background task started"
        );
        while !self.handle.shutdown_requested() {
            let elapsed = self.tick();
            if let Some(remaining) = self.tick_budget.checked_sub(elapsed) {
                if !remaining.is_zero() {
                    // park_timeout rather than sleep so request_shutdown
                    // can wake the thread immediately.
                    thread::park_timeout(remaining);
                }
            }
        }
        tracing::info!(frames = self.frame, overruns = self.overruns, "background task stopped");
        self
    }

    /// One tick: drain, step, publish. Returns its wall-clock duration.
    pub(crate) fn tick(&mut self) -> Duration {
        let start = Instant::now();

        let handle = Arc::clone(&self.handle);
        let commands_processed = handle.queue().drain(Some(&mut *self));

        let mut counters = Vec::with_capacity(self.solvers.len());
        for solver in self.solvers.values() {
            let outcome = solver.step(self.step_dt);
            counters.push(SolverCounters {
                id: solver.id(),
                steps: solver.steps(),
                commands: outcome.commands,
                advanced: outcome.advanced,
            });
        }

        self.frame += 1;
        self.sim_time += self.step_dt;
        let elapsed = start.elapsed();
        if elapsed > self.tick_budget {
            self.overruns += 1;
            if self.overruns == 1 {
                tracing::warn!(
                    elapsed_us = elapsed.as_micros() as u64,
                    budget_us = self.tick_budget.as_micros() as u64,
                    "background tick exceeded its budget"
                );
            } else {
                tracing::debug!(overruns = self.overruns, "background tick overran");
            }
        }

        let stats = TaskStatistics {
            frame: self.frame,
            sim_time: self.sim_time,
            last_tick_us: elapsed.as_micros() as u64,
            commands_processed,
            overruns: self.overruns,
            high_water_events: handle.high_water_events(),
            solvers: counters,
        };
        self.handle.statistics.write_back(|s| *s = stats);
        self.handle.statistics.flip();
        elapsed
    }

    /// Run everything still queued. Called on the joining thread after the
    /// loop has exited. Returns the number of commands run.
    pub(crate) fn drain_remaining(&mut self) -> usize {
        let handle = Arc::clone(&self.handle);
        let mut total = 0;
        // Commands may enqueue further commands; bound the rounds.
        for _ in 0..16 {
            if handle.queue().is_empty() {
                break;
            }
            total += handle.queue().drain(Some(&mut *self));
        }
        if !handle.queue().is_empty() {
            tracing::warn!(
                left = handle.queue().len(),
                "commands still queued after final background drain"
            );
        }
        total
    }

    /// Release every owned solver. Returns them in stepping order.
    pub(crate) fn release_solvers(&mut self) -> Vec<Arc<Solver>> {
        let released = self.solvers.drain(..).map(|(_, s)| s).collect();
        self.publish_roster();
        released
    }

    fn publish_roster(&self) {
        let roster = self
            .solvers
            .iter()
            .map(|(id, s)| (*id, Arc::downgrade(s)))
            .collect();
        *self.handle.roster.write() = roster;
    }
}

impl std::fmt::Debug for BackgroundTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundTask")
            .field("frame", &self.frame)
            .field("solvers", &self.solvers.len())
            .field("overruns", &self.overruns)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rivet_core::{BufferMode, Simulation};

    struct Busy;

    impl Simulation for Busy {
        fn advance_by(&mut self, _dt: f64) {}
        fn has_active_work(&self) -> bool {
            true
        }
        fn buffer_results(&self, out: &mut SolverResults) {
            out.bodies.clear();
        }
    }

    fn task() -> BackgroundTask {
        let config = DispatchConfig::default();
        BackgroundTask::new(Arc::new(BackgroundTaskHandle::new(&config)), &config)
    }

    fn busy(id: u64) -> Arc<Solver> {
        Arc::new(Solver::new(SolverId(id), Box::new(Busy), BufferMode::Double))
    }

    #[test]
    fn tick_steps_owned_solvers_and_publishes_statistics() {
        let mut t = task();
        let s = busy(1);
        assert!(t.add_solver(Arc::clone(&s)));
        assert!(!t.add_solver(Arc::clone(&s)));

        t.tick();
        t.tick();
        assert_eq!(s.steps(), 2);

        let stats = t.handle().statistics();
        assert_eq!(stats.frame, 2);
        assert_eq!(stats.solver(SolverId(1)).map(|c| c.steps), Some(2));
        assert_eq!(t.handle().frame(), 2);
    }

    #[test]
    fn task_commands_receive_the_task() {
        let mut t = task();
        let s = busy(7);
        t.handle().enqueue(Command::task(move |task| {
            if let Some(task) = task {
                task.add_solver(s);
            }
        }));
        t.tick();
        assert_eq!(t.solver_count(), 1);
        assert_eq!(t.handle().solver_ids(), vec![SolverId(7)]);
        assert_eq!(t.handle().statistics().commands_processed, 1);
    }

    #[test]
    fn removed_solver_is_no_longer_stepped() {
        let mut t = task();
        let s = busy(2);
        t.add_solver(Arc::clone(&s));
        t.tick();
        assert!(t.remove_solver(SolverId(2)).is_some());
        assert!(t.remove_solver(SolverId(2)).is_none());
        t.tick();
        assert_eq!(s.steps(), 1);
        assert!(t.handle().solver_ids().is_empty());
    }

    #[test]
    fn drain_remaining_passes_the_task() {
        let mut t = task();
        let s = busy(3);
        t.handle().enqueue(Command::task(move |task| {
            task.expect("final drain passes the task").add_solver(s);
        }));
        assert_eq!(t.drain_remaining(), 1);
        assert_eq!(t.solver_count(), 1);
        assert_eq!(t.release_solvers().len(), 1);
    }

    #[test]
    fn partial_sync_reads_the_roster() {
        let mut t = task();
        t.add_solver(busy(4));
        t.tick();
        let sync = t.handle().sync_proxies_from_cache(false);
        assert!(!sync.locked);
        assert_eq!(sync.results.len(), 1);
        assert_eq!(sync.results[0].1.step, 1);
        assert_eq!(sync.statistics.frame, 1);
    }

    #[test]
    fn request_shutdown_moves_state() {
        let t = task();
        assert_eq!(t.handle().state(), BackgroundTaskState::Running);
        t.handle().request_shutdown();
        assert!(t.handle().shutdown_requested());
        assert_eq!(t.handle().state(), BackgroundTaskState::ShutdownRequested);
    }

    #[test]
    fn run_exits_when_shutdown_already_requested() {
        let t = task();
        let handle = Arc::clone(t.handle());
        handle.request_shutdown();
        let t = t.run();
        assert_eq!(t.frame(), 0);
        assert_eq!(handle.state(), BackgroundTaskState::Terminated);
        assert!(handle.wait_terminated(Some(Duration::ZERO)));
    }
}
