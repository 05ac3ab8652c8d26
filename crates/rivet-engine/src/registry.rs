//! The solver registry: owns every solver and the active dispatcher.
//!
//! [`SolverRegistry`] is the entry point of the engine. It creates and
//! destroys solvers, starts frames, and switches between threading modes.
//! It also implements [`Dispatcher`] by forwarding to whichever dispatcher
//! is active, so producers can submit through the registry and never hold
//! a dispatcher across a mode change.
//!
//! # Lock order
//!
//! `switch` → `active` → `solvers`, and `in_flight` → `solvers`. `active`
//! is never held together with `in_flight`, and only ever for short
//! sections in which no command runs and no thread is waited on. A mode
//! change swaps a [`SwitchingDispatcher`] in, releases the lock, shuts the
//! old dispatcher down, and only re-takes the lock to install the new one.
//! Commands that call back into the registry while the old dispatcher
//! drains are buffered and replayed into the new dispatcher.

use std::mem;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};

use rivet_core::{Simulation, SolverId, ThreadingMode};

use crate::background::BackgroundThreadDispatcher;
use crate::background_task::{BackgroundTaskHandle, ProxySync};
use crate::command::{Command, CommandBatchData};
use crate::config::{ConfigError, DispatchConfig};
use crate::dispatcher::Dispatcher;
use crate::metrics::FrameReport;
use crate::orchestration::{FrameHandle, TickOrchestration};
use crate::scene_lock::SceneLock;
use crate::solver::Solver;
use crate::switching::SwitchingDispatcher;
use crate::sync::Event;
use crate::synchronous::SynchronousDispatcher;
use crate::task_graph::TaskGraphDispatcher;

// ── Active dispatcher ───────────────────────────────────────────

enum Active {
    Synchronous(Arc<SynchronousDispatcher>),
    TaskGraph {
        dispatcher: Arc<TaskGraphDispatcher>,
        orchestration: Arc<TickOrchestration>,
    },
    Background(Arc<BackgroundThreadDispatcher>),
    Switching(Arc<SwitchingDispatcher>),
}

impl Active {
    fn build(
        mode: ThreadingMode,
        config: &DispatchConfig,
        solvers: &[Arc<Solver>],
    ) -> Result<Self, ConfigError> {
        match mode {
            ThreadingMode::Synchronous => Ok(Self::synchronous()),
            ThreadingMode::TaskGraph => Ok(Self::TaskGraph {
                dispatcher: Arc::new(TaskGraphDispatcher::new(config.queue_high_water_mark)),
                orchestration: Arc::new(TickOrchestration::new(config.resolved_worker_count())?),
            }),
            ThreadingMode::BackgroundThread => Ok(Self::Background(Arc::new(
                BackgroundThreadDispatcher::new(config, solvers)?,
            ))),
            ThreadingMode::Invalid => Err(ConfigError::InvalidMode { mode }),
        }
    }

    fn synchronous() -> Self {
        Self::Synchronous(Arc::new(SynchronousDispatcher::new()))
    }

    fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        match self {
            Self::Synchronous(d) => Arc::clone(d) as Arc<dyn Dispatcher>,
            Self::TaskGraph { dispatcher, .. } => Arc::clone(dispatcher) as Arc<dyn Dispatcher>,
            Self::Background(d) => Arc::clone(d) as Arc<dyn Dispatcher>,
            Self::Switching(d) => Arc::clone(d) as Arc<dyn Dispatcher>,
        }
    }

    fn mode(&self) -> ThreadingMode {
        match self {
            Self::Synchronous(_) => ThreadingMode::Synchronous,
            Self::TaskGraph { .. } => ThreadingMode::TaskGraph,
            Self::Background(_) => ThreadingMode::BackgroundThread,
            Self::Switching(d) => d.target(),
        }
    }
}

// ── SolverRegistry ──────────────────────────────────────────────

/// Owns all solvers and the single active dispatcher.
pub struct SolverRegistry {
    config: DispatchConfig,
    active: RwLock<Active>,
    in_flight: Mutex<Option<FrameHandle>>,
    solvers: Mutex<IndexMap<SolverId, Arc<Solver>>>,
    switch: Mutex<()>,
    next_id: AtomicU64,
    shut_down: AtomicBool,
}

// Compile-time assertion: the registry is shared with producer threads.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<SolverRegistry>();
};

impl SolverRegistry {
    /// Validate `config` and start in `config.threading_mode`.
    pub fn new(config: DispatchConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let active = Active::build(config.threading_mode, &config, &[])?;
        tracing::info!(mode = %config.threading_mode, "solver registry created");
        Ok(Self {
            config,
            active: RwLock::new(active),
            in_flight: Mutex::new(None),
            solvers: Mutex::new(IndexMap::new()),
            switch: Mutex::new(()),
            next_id: AtomicU64::new(1),
            shut_down: AtomicBool::new(false),
        })
    }

    /// The configuration the registry was built with.
    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// The active threading mode; during a mode change, the mode being
    /// switched to.
    pub fn mode(&self) -> ThreadingMode {
        self.active.read().mode()
    }

    /// The active dispatcher.
    ///
    /// The returned handle goes stale on the next mode change; commands
    /// sent through a stale handle run inline on the caller.
    pub fn dispatcher(&self) -> Arc<dyn Dispatcher> {
        self.active.read().dispatcher()
    }

    /// The background task, in BackgroundThread mode.
    pub fn background_task(&self) -> Option<Arc<BackgroundTaskHandle>> {
        match &*self.active.read() {
            Active::Background(d) => Some(Arc::clone(d.handle())),
            _ => None,
        }
    }

    // ── Solvers ─────────────────────────────────────────────────

    /// Register a new solver around `simulation`.
    ///
    /// In BackgroundThread mode the background task is told about the
    /// solver by a Task command, so it is first stepped on the next tick.
    pub fn create_solver(&self, simulation: Box<dyn Simulation>) -> Arc<Solver> {
        // Held across insert and delivery so a concurrent mode change
        // either sees the solver in its snapshot or receives the command.
        let active = self.active.read();
        let id = SolverId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let solver = Arc::new(Solver::new(id, simulation, self.config.buffer_mode));
        self.solvers.lock().insert(id, Arc::clone(&solver));

        if active.mode() == ThreadingMode::BackgroundThread {
            let owned = Arc::clone(&solver);
            active.dispatcher().enqueue_command_immediate(Command::task(move |task| {
                if let Some(task) = task {
                    task.add_solver(owned);
                }
            }));
        }
        tracing::debug!(solver = %id, mode = %active.mode(), "solver created");
        solver
    }

    /// Unregister a solver. Returns `false` for an unknown id.
    ///
    /// In BackgroundThread mode the registry's reference is moved into a
    /// Task command, so the solver is removed from the task, and released
    /// if nothing else holds it, on the background thread.
    pub fn destroy_solver(&self, id: SolverId) -> bool {
        let active = self.active.read();
        let Some(solver) = self.solvers.lock().shift_remove(&id) else {
            tracing::warn!(solver = %id, "destroy_solver: unknown solver");
            return false;
        };

        if active.mode() == ThreadingMode::BackgroundThread {
            active.dispatcher().enqueue_command_immediate(Command::task(move |task| {
                if let Some(task) = task {
                    task.remove_solver(id);
                }
                drop(solver);
            }));
        }
        tracing::debug!(solver = %id, "solver destroyed");
        true
    }

    /// Look up a solver.
    pub fn solver(&self, id: SolverId) -> Option<Arc<Solver>> {
        self.solvers.lock().get(&id).cloned()
    }

    /// Every registered solver, in creation order.
    pub fn solvers(&self) -> Vec<Arc<Solver>> {
        self.solvers.lock().values().cloned().collect()
    }

    /// Number of registered solvers.
    pub fn solver_count(&self) -> usize {
        self.solvers.lock().len()
    }

    /// Enable or disable stepping of a solver, ordered with its other
    /// commands. Returns `false` for an unknown id.
    pub fn set_solver_enabled(&self, id: SolverId, enabled: bool) -> bool {
        let Some(solver) = self.solver(id) else {
            return false;
        };
        self.enqueue_command_immediate(Command::solver(&solver, move |s| s.set_enabled(enabled)));
        true
    }

    // ── Frames ──────────────────────────────────────────────────

    /// Step every solver once by `dt`.
    ///
    /// - Synchronous: steps on the calling thread; the handle is complete
    ///   on return.
    /// - TaskGraph: waits for the previous frame, then dispatches a task
    ///   graph and returns at once.
    /// - BackgroundThread: the background task paces itself; returns a
    ///   completed, empty handle. The same holds during a mode change.
    pub fn start_frame(&self, dt: f64) -> FrameHandle {
        let graph = match &*self.active.read() {
            Active::Synchronous(_) => None,
            Active::TaskGraph {
                dispatcher,
                orchestration,
            } => Some((Arc::clone(dispatcher), Arc::clone(orchestration))),
            Active::Background(_) | Active::Switching(_) => {
                return FrameHandle::completed(FrameReport::default())
            }
        };
        let Some((dispatcher, orchestration)) = graph else {
            return self.step_inline(dt);
        };

        let mut in_flight = self.in_flight.lock();
        if let Some(previous) = in_flight.take() {
            previous.wait();
        }
        let handle = orchestration.dispatch(
            dispatcher as Arc<dyn Dispatcher>,
            self.solvers(),
            dt,
            Arc::new(Event::new()),
        );
        *in_flight = Some(handle.clone());
        handle
    }

    fn step_inline(&self, dt: f64) -> FrameHandle {
        let start = Instant::now();
        let mut report = FrameReport::default();
        for solver in self.solvers() {
            if solver.has_pending_commands() || (solver.is_enabled() && solver.has_active_work()) {
                solver.step(dt);
                report.dispatched += 1;
            } else {
                report.skipped += 1;
            }
        }
        report.total_us = start.elapsed().as_micros() as u64;
        FrameHandle::completed(report)
    }

    /// Block until the in-flight task-graph frame, if any, has finished.
    pub fn wait_for_frame(&self) -> Option<FrameReport> {
        let previous = self.in_flight.lock().take();
        previous.and_then(|frame| frame.wait())
    }

    /// Read back the latest results of every solver.
    ///
    /// In BackgroundThread mode this forwards to
    /// [`BackgroundTaskHandle::sync_proxies_from_cache`]. Otherwise a full
    /// sync first waits for the in-flight frame, and the result is always
    /// reported as locked.
    pub fn sync_proxies_from_cache(&self, full_sync: bool) -> ProxySync {
        if let Some(task) = self.background_task() {
            return task.sync_proxies_from_cache(full_sync);
        }
        if full_sync {
            self.wait_for_frame();
        }
        ProxySync {
            locked: true,
            statistics: Default::default(),
            results: self
                .solvers()
                .into_iter()
                .map(|s| (s.id(), s.results()))
                .collect(),
        }
    }

    /// Stall the background task (if any) for the guard's lifetime.
    pub fn scene_lock(&self, timeout: Option<std::time::Duration>) -> SceneLock {
        let dispatcher = self.dispatcher();
        SceneLock::new(dispatcher.as_ref(), timeout)
    }

    // ── Mode changes ────────────────────────────────────────────

    /// Replace the active dispatcher with one for `mode`.
    ///
    /// The old dispatcher is shut down first: an in-flight frame is waited
    /// for, queued commands run, and a background thread is joined. No
    /// registry lock is held meanwhile; commands delivered through the
    /// registry during the change are buffered and replayed into the new
    /// dispatcher in arrival order. Commands already delivered to a
    /// solver's own queue stay there.
    ///
    /// If the new dispatcher cannot be built the registry falls back to
    /// Synchronous mode and returns the error. A second change started
    /// while one is running (including from a command the first one is
    /// draining) returns [`ConfigError::ModeChangeInProgress`].
    ///
    /// # Panics
    ///
    /// If `mode` is [`ThreadingMode::Invalid`] or equal to the current
    /// mode.
    pub fn change_threading_mode(&self, mode: ThreadingMode) -> Result<(), ConfigError> {
        assert!(mode.is_valid(), "cannot switch to threading mode {mode}");
        let Some(_switch) = self.switch.try_lock() else {
            return Err(ConfigError::ModeChangeInProgress);
        };
        if self.shut_down.load(Ordering::SeqCst) {
            return Err(ConfigError::RegistryShutDown);
        }

        let interim = Arc::new(SwitchingDispatcher::new(mode));
        let previous = {
            let mut active = self.active.write();
            let from = active.mode();
            assert_ne!(from, mode, "registry is already in {mode} mode");
            mem::replace(&mut *active, Active::Switching(Arc::clone(&interim)))
        };
        let from = previous.mode();

        // Taken after the swap: a frame started against the old
        // dispatcher just before it is still waited for here.
        let frame = self.in_flight.lock().take();
        if let Some(frame) = frame {
            frame.wait();
        }
        previous.dispatcher().shutdown();
        drop(previous);

        let solvers = self.solvers();
        let (next, result) = match Active::build(mode, &self.config, &solvers) {
            Ok(next) => (next, Ok(())),
            Err(e) => {
                tracing::error!(%from, to = %mode, error = %e, "mode change failed, fell back to synchronous");
                (Active::synchronous(), Err(e))
            }
        };
        let replayed = interim.hand_off(next.dispatcher());
        let to = next.mode();
        *self.active.write() = next;

        // A shutdown that raced the change only saw the interim dispatcher.
        if self.shut_down.load(Ordering::SeqCst) {
            self.dispatcher().shutdown();
        }
        tracing::info!(%from, %to, solvers = solvers.len(), replayed, "threading mode changed");
        result
    }

    // ── Shutdown ────────────────────────────────────────────────

    /// Wait for the in-flight frame and shut the active dispatcher down.
    /// Idempotent; also run on drop.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return;
        }
        let dispatcher = self.dispatcher();
        let frame = self.in_flight.lock().take();
        if let Some(frame) = frame {
            frame.wait();
        }
        dispatcher.shutdown();
        tracing::info!(mode = %dispatcher.mode(), solvers = self.solver_count(), "solver registry shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) has run.
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl Dispatcher for SolverRegistry {
    fn enqueue_command_immediate(&self, command: Command) {
        let dispatcher = self.dispatcher();
        dispatcher.enqueue_command_immediate(command);
    }

    fn submit_command_list(&self, batch: CommandBatchData) {
        let dispatcher = self.dispatcher();
        dispatcher.submit_command_list(batch);
    }

    fn execute(&self) -> usize {
        self.dispatcher().execute()
    }

    fn mode(&self) -> ThreadingMode {
        SolverRegistry::mode(self)
    }

    fn shutdown(&self) {
        SolverRegistry::shutdown(self);
    }

    fn is_shut_down(&self) -> bool {
        SolverRegistry::is_shut_down(self)
    }

    fn pending_commands(&self) -> usize {
        self.dispatcher().pending_commands()
    }

    fn background_task(&self) -> Option<Arc<BackgroundTaskHandle>> {
        SolverRegistry::background_task(self)
    }
}

impl Drop for SolverRegistry {
    fn drop(&mut self) {
        SolverRegistry::shutdown(self);
    }
}

impl std::fmt::Debug for SolverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SolverRegistry")
            .field("mode", &SolverRegistry::mode(self))
            .field("solvers", &self.solver_count())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}
