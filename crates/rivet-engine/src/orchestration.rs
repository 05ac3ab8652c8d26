//! Per-frame task graph for TaskGraph mode.
//!
//! One frame is a small dependency graph run on a rayon pool:
//!
//! ```text
//! drain dispatcher queue ──► advance solver A ──┐
//!                        ├─► advance solver B ──┼─► signal completion
//!                        └─► ...              ──┘
//! ```
//!
//! Only solvers with pending commands, or enabled with active work, get
//! an advance task. The completion event is signalled even if a command
//! or a solver panics; the frame then reports no result.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use rayon::ThreadPool;

use crate::config::ConfigError;
use crate::dispatcher::Dispatcher;
use crate::metrics::FrameReport;
use crate::solver::Solver;
use crate::sync::Event;

// ── FrameHandle ─────────────────────────────────────────────────

/// Producer-side handle on a dispatched frame.
#[derive(Clone, Debug)]
pub struct FrameHandle {
    completion: Arc<Event>,
    report: Arc<Mutex<Option<FrameReport>>>,
}

impl FrameHandle {
    fn pending(completion: Arc<Event>) -> Self {
        Self {
            completion,
            report: Arc::new(Mutex::new(None)),
        }
    }

    /// A handle for a frame that already finished.
    pub fn completed(report: FrameReport) -> Self {
        let handle = Self::pending(Arc::new(Event::new()));
        *handle.report.lock() = Some(report);
        handle.completion.signal();
        handle
    }

    /// Whether the frame has finished.
    pub fn is_complete(&self) -> bool {
        self.completion.is_signalled()
    }

    /// The completion event the frame signals.
    pub fn completion(&self) -> &Arc<Event> {
        &self.completion
    }

    /// Block until the frame finishes.
    ///
    /// Returns `None` if a command or solver panicked during the frame.
    pub fn wait(&self) -> Option<FrameReport> {
        self.completion.wait();
        self.report.lock().clone()
    }
}

/// Signals the completion event when dropped, so a panicking frame
/// cannot leave the producer waiting forever.
struct CompleteOnDrop(Arc<Event>);

impl Drop for CompleteOnDrop {
    fn drop(&mut self) {
        self.0.signal();
    }
}

// ── TickOrchestration ───────────────────────────────────────────

/// Builds and runs frame task graphs on a dedicated worker pool.
#[derive(Debug)]
pub struct TickOrchestration {
    pool: ThreadPool,
}

impl TickOrchestration {
    /// Build a pool of `workers` threads named `rivet-worker-{i}`.
    pub fn new(workers: usize) -> Result<Self, ConfigError> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(workers.max(1))
            .thread_name(|i| format!("rivet-worker-{i}"))
            .panic_handler(|_| tracing::error!("task-graph frame panicked"))
            .build()
            .map_err(|e| ConfigError::WorkerPoolFailed {
                reason: e.to_string(),
            })?;
        tracing::debug!(workers = pool.current_num_threads(), "task-graph pool built");
        Ok(Self { pool })
    }

    /// Number of worker threads.
    pub fn worker_count(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Dispatch one frame and return immediately.
    ///
    /// The drain task runs `dispatcher.execute()`; only then is the set of
    /// solvers needing an advance task decided, so commands that wake a
    /// solver take effect in the same frame. `completion` is signalled
    /// once every advance task has finished.
    pub fn dispatch(
        &self,
        dispatcher: Arc<dyn Dispatcher>,
        solvers: Vec<Arc<Solver>>,
        dt: f64,
        completion: Arc<Event>,
    ) -> FrameHandle {
        let handle = FrameHandle::pending(completion);
        let completion = CompleteOnDrop(Arc::clone(&handle.completion));
        let report = Arc::clone(&handle.report);

        self.pool.spawn(move || {
            let _completion = completion;
            let start = Instant::now();

            let commands = dispatcher.execute();

            let (active, idle): (Vec<_>, Vec<_>) = solvers
                .into_iter()
                .partition(|s| s.has_pending_commands() || (s.is_enabled() && s.has_active_work()));

            rayon::scope(|scope| {
                for solver in &active {
                    scope.spawn(move |_| {
                        solver.step(dt);
                    });
                }
            });

            let frame = FrameReport {
                dispatched: active.len(),
                skipped: idle.len(),
                commands,
                total_us: start.elapsed().as_micros() as u64,
            };
            tracing::trace!(?frame, "task-graph frame complete");
            *report.lock() = Some(frame);
        });
        handle
    }
}
