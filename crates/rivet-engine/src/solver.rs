//! A registered physics solver: simulation, command queue, and results.
//!
//! A [`Solver`] is shared (`Arc`) between the producer, the registry, and
//! whichever thread currently steps it. Only the stepping thread touches
//! the simulation; the producer reads published results through the
//! double buffer and talks to the solver by enqueuing commands.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::Mutex;

use rivet_core::{BufferMode, Simulation, SolverId, SolverResults};

use crate::buffer::DoubleBuffer;
use crate::command::SolverCommand;

struct Core {
    simulation: Box<dyn Simulation>,
    sim_time: f64,
}

/// What one call to [`Solver::step`] did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StepOutcome {
    /// Solver commands drained before stepping.
    pub commands: usize,
    /// Whether the simulation was advanced.
    pub advanced: bool,
}

/// One independently stepped simulation.
pub struct Solver {
    id: SolverId,
    enabled: AtomicBool,
    cmd_tx: Sender<SolverCommand>,
    cmd_rx: Receiver<SolverCommand>,
    core: Mutex<Core>,
    results: DoubleBuffer<SolverResults>,
    buffer_mode: BufferMode,
    steps: AtomicU64,
    commands_processed: AtomicU64,
}

// Compile-time assertion: Solver must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Solver>();
};

impl Solver {
    pub(crate) fn new(
        id: SolverId,
        simulation: Box<dyn Simulation>,
        buffer_mode: BufferMode,
    ) -> Self {
        let (cmd_tx, cmd_rx) = crossbeam_channel::unbounded();
        Self {
            id,
            enabled: AtomicBool::new(true),
            cmd_tx,
            cmd_rx,
            core: Mutex::new(Core {
                simulation,
                sim_time: 0.0,
            }),
            results: DoubleBuffer::default(),
            buffer_mode,
            steps: AtomicU64::new(0),
            commands_processed: AtomicU64::new(0),
        }
    }

    /// Registry-assigned identifier.
    pub fn id(&self) -> SolverId {
        self.id
    }

    /// Result buffering used by this solver.
    pub fn buffer_mode(&self) -> BufferMode {
        self.buffer_mode
    }

    /// Whether the solver is stepped when it has active work.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Enable or disable stepping. Commands are still drained while
    /// disabled.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Release);
    }

    // ── Commands ────────────────────────────────────────────────

    /// Queue a command for the next time this solver is stepped.
    pub fn enqueue(&self, command: impl FnOnce(&Solver) + Send + 'static) {
        self.enqueue_boxed(Box::new(command));
    }

    pub(crate) fn enqueue_boxed(&self, command: SolverCommand) {
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.cmd_tx.send(command);
    }

    /// The sending half of this solver's command queue.
    pub fn command_queue(&self) -> &Sender<SolverCommand> {
        &self.cmd_tx
    }

    /// Whether commands are waiting to be drained.
    pub fn has_pending_commands(&self) -> bool {
        !self.cmd_rx.is_empty()
    }

    /// Number of commands waiting to be drained.
    pub fn pending_commands(&self) -> usize {
        self.cmd_rx.len()
    }

    /// Run every command queued right now. Stepping thread only.
    ///
    /// Returns the number of commands run.
    pub fn drain_commands(&self) -> usize {
        let pending = self.cmd_rx.len();
        let mut ran = 0;
        while ran < pending {
            match self.cmd_rx.try_recv() {
                Ok(command) => {
                    command(self);
                    ran += 1;
                }
                Err(_) => break,
            }
        }
        if ran > 0 {
            self.commands_processed
                .fetch_add(ran as u64, Ordering::Relaxed);
        }
        ran
    }

    pub(crate) fn run_command(&self, command: SolverCommand) {
        command(self);
        self.commands_processed.fetch_add(1, Ordering::Relaxed);
    }

    /// Run `command` now, after everything already queued for this solver.
    pub(crate) fn run_in_order(&self, command: SolverCommand) {
        self.drain_commands();
        self.run_command(command);
    }

    // ── Stepping ────────────────────────────────────────────────

    /// Whether the simulation reports work to do.
    pub fn has_active_work(&self) -> bool {
        self.core.lock().simulation.has_active_work()
    }

    /// Advance the simulation by `dt` unconditionally. Stepping thread only.
    pub fn advance(&self, dt: f64) {
        let mut core = self.core.lock();
        core.simulation.advance_by(dt);
        core.sim_time += dt;
        self.steps.fetch_add(1, Ordering::Relaxed);
    }

    /// One scheduled step: drain commands, advance if enabled with active
    /// work, then publish if anything changed.
    pub fn step(&self, dt: f64) -> StepOutcome {
        let commands = self.drain_commands();
        let advanced = self.is_enabled() && self.has_active_work();
        if advanced {
            self.advance(dt);
        }
        if advanced || commands > 0 {
            self.publish_results();
        }
        StepOutcome { commands, advanced }
    }

    /// Copy the simulation state into the results buffer and make it
    /// visible to readers.
    pub fn publish_results(&self) {
        let core = self.core.lock();
        let step = self.steps.load(Ordering::Relaxed);
        let fill = |out: &mut SolverResults| {
            core.simulation.buffer_results(out);
            out.step = step;
            out.sim_time = core.sim_time;
        };
        match self.buffer_mode {
            BufferMode::Double => {
                self.results.write_back(fill);
                self.results.flip();
            }
            BufferMode::Single => {
                self.results.write_front(fill);
            }
        }
    }

    // ── Reading ─────────────────────────────────────────────────

    /// Clone the most recently published results.
    pub fn results(&self) -> SolverResults {
        self.results.snapshot()
    }

    /// Borrow the most recently published results.
    pub fn read_results<R>(&self, f: impl FnOnce(&SolverResults) -> R) -> R {
        self.results.read(f)
    }

    /// Number of publishes so far.
    pub fn results_generation(&self) -> u64 {
        self.results.generation()
    }

    /// Run `f` with exclusive access to the simulation.
    ///
    /// Intended for solver commands and for callers holding a
    /// [`SceneLock`](crate::scene_lock::SceneLock); from any other thread
    /// this blocks until the current step finishes.
    pub fn with_simulation<R>(&self, f: impl FnOnce(&mut dyn Simulation) -> R) -> R {
        let mut core = self.core.lock();
        f(core.simulation.as_mut())
    }

    /// Number of completed advances.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Relaxed)
    }

    /// Total solver commands run against this solver.
    pub fn commands_processed(&self) -> u64 {
        self.commands_processed.load(Ordering::Relaxed)
    }

    /// Accumulated simulated time in seconds.
    pub fn sim_time(&self) -> f64 {
        self.core.lock().sim_time
    }
}

impl fmt::Debug for Solver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Solver")
            .field("id", &self.id)
            .field("enabled", &self.is_enabled())
            .field("buffer_mode", &self.buffer_mode)
            .field("steps", &self.steps())
            .field("pending_commands", &self.pending_commands())
            .finish_non_exhaustive()
    }
}

impl Drop for Solver {
    fn drop(&mut self) {
        tracing::trace!(
            solver = %self.id,
            thread = ?std::thread::current().name(),
            "solver released"
        );
    }
}
