//! Per-tick and per-frame statistics.
//!
//! [`TaskStatistics`] is published by the background task once per tick
//! through a double buffer; [`FrameReport`] describes one task-graph
//! frame. All durations are in microseconds.

use rivet_core::SolverId;

/// Counters for one solver during one background tick.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SolverCounters {
    /// The solver these counters describe.
    pub id: SolverId,
    /// Total completed advances.
    pub steps: u64,
    /// Solver commands drained this tick.
    pub commands: usize,
    /// Whether the solver was advanced this tick.
    pub advanced: bool,
}

/// Statistics published by the background task after every tick.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct TaskStatistics {
    /// Ticks completed since the task started.
    pub frame: u64,
    /// Simulated time accumulated by the task, in seconds.
    pub sim_time: f64,
    /// Wall-clock time of the last tick, in microseconds.
    pub last_tick_us: u64,
    /// Dispatcher-queue commands run during the last tick.
    pub commands_processed: usize,
    /// Cumulative number of ticks that exceeded their budget.
    pub overruns: u64,
    /// Cumulative number of times the command queue crossed its high
    /// water mark.
    pub high_water_events: u64,
    /// Per-solver counters for the last tick, in stepping order.
    pub solvers: Vec<SolverCounters>,
}

impl TaskStatistics {
    /// Counters for `id`, if it was stepped in the last tick.
    pub fn solver(&self, id: SolverId) -> Option<&SolverCounters> {
        self.solvers.iter().find(|c| c.id == id)
    }
}

/// Outcome of one task-graph frame.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Solvers that received an advance task.
    pub dispatched: usize,
    /// Solvers skipped for having neither active work nor pending
    /// commands.
    pub skipped: usize,
    /// Dispatcher-queue commands run by the drain task.
    pub commands: usize,
    /// Wall-clock time from drain start to completion, in microseconds.
    pub total_us: u64,
}
