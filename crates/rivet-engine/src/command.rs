//! Commands and the batch payload handed to dispatchers.
//!
//! A [`Command`] is a boxed closure tagged with the context it needs:
//! nothing ([`Command::Global`]), the background task if one is running
//! ([`Command::Task`]), or a target solver ([`Command::Solver`]). Commands
//! are moved into queues and run exactly once.
//!
//! # Ordering
//!
//! [`CommandBatchData`] keeps the three categories in separate ordered
//! sequences. Executing a batch runs every Global command, then every Task
//! command, then every Solver command, each in enqueue order.
//! [`execute_batches`] extends this across several batches drained
//! together: all Globals of all batches (in batch order), then all Tasks,
//! then all Solver commands.
//!
//! A drain on a concurrent dispatcher does not run Solver commands itself.
//! It appends them, in order, to their target's own queue, where they run
//! at the start of that solver's next step. Run inline, a Solver command
//! first drains whatever is already waiting for its target. Either way
//! each solver sees its commands in submission order.

use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::background_task::BackgroundTask;
use crate::solver::Solver;

/// A command with no arguments.
pub type GlobalCommand = Box<dyn FnOnce() + Send>;

/// A command that receives the background task when run inside its loop,
/// and `None` in every other mode.
pub type TaskCommand = Box<dyn FnOnce(Option<&mut BackgroundTask>) + Send>;

/// A command run against one solver, on the thread entitled to step it.
pub type SolverCommand = Box<dyn FnOnce(&Solver) + Send>;

// ── Command ─────────────────────────────────────────────────────

/// The category a command belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CommandKind {
    /// No arguments.
    Global,
    /// Receives the background task (or `None`).
    Task,
    /// Targets one solver.
    Solver,
}

/// A single deferred unit of work.
pub enum Command {
    /// Runs with no arguments.
    Global(GlobalCommand),
    /// Runs with access to the background task, if one is live.
    Task(TaskCommand),
    /// Runs against `target`.
    Solver {
        /// The solver the command is delivered to.
        target: Arc<Solver>,
        /// The command body.
        command: SolverCommand,
    },
}

impl Command {
    /// Build a Global command.
    pub fn global(f: impl FnOnce() + Send + 'static) -> Self {
        Self::Global(Box::new(f))
    }

    /// Build a Task command.
    pub fn task(f: impl FnOnce(Option<&mut BackgroundTask>) + Send + 'static) -> Self {
        Self::Task(Box::new(f))
    }

    /// Build a Solver command targeting `target`.
    pub fn solver(target: &Arc<Solver>, f: impl FnOnce(&Solver) + Send + 'static) -> Self {
        Self::Solver {
            target: Arc::clone(target),
            command: Box::new(f),
        }
    }

    /// The category of this command.
    pub fn kind(&self) -> CommandKind {
        match self {
            Self::Global(_) => CommandKind::Global,
            Self::Task(_) => CommandKind::Task,
            Self::Solver { .. } => CommandKind::Solver,
        }
    }

    /// Run the command on the current thread.
    pub(crate) fn run(self, task: Option<&mut BackgroundTask>) {
        match self {
            Self::Global(f) => f(),
            Self::Task(f) => f(task),
            Self::Solver { target, command } => target.run_in_order(command),
        }
    }
}

impl fmt::Debug for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Solver { target, .. } => f
                .debug_struct("Command::Solver")
                .field("target", &target.id())
                .finish_non_exhaustive(),
            other => write!(f, "Command::{:?}", other.kind()),
        }
    }
}

// ── CommandBatchData ────────────────────────────────────────────

/// Three ordered command sequences submitted to a dispatcher as one unit.
#[derive(Default)]
pub struct CommandBatchData {
    global: SmallVec<[GlobalCommand; 4]>,
    task: SmallVec<[TaskCommand; 4]>,
    solver: SmallVec<[(Arc<Solver>, SolverCommand); 4]>,
}

impl CommandBatchData {
    /// An empty batch. Does not allocate.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a command to the sequence for its category.
    pub fn push(&mut self, command: Command) {
        match command {
            Command::Global(f) => self.global.push(f),
            Command::Task(f) => self.task.push(f),
            Command::Solver { target, command } => self.solver.push((target, command)),
        }
    }

    /// Total number of commands across all categories.
    pub fn len(&self) -> usize {
        self.global.len() + self.task.len() + self.solver.len()
    }

    /// Whether the batch holds no commands.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of commands of one category.
    pub fn count(&self, kind: CommandKind) -> usize {
        match kind {
            CommandKind::Global => self.global.len(),
            CommandKind::Task => self.task.len(),
            CommandKind::Solver => self.solver.len(),
        }
    }

    /// Run the batch on the calling thread: Globals, then Tasks, then
    /// Solver commands.
    ///
    /// Returns the number of commands executed.
    pub fn execute(self, task: Option<&mut BackgroundTask>) -> usize {
        execute_batches(vec![self], task, SolverDelivery::Inline)
    }
}

impl From<Command> for CommandBatchData {
    fn from(command: Command) -> Self {
        let mut batch = Self::new();
        batch.push(command);
        batch
    }
}

impl fmt::Debug for CommandBatchData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandBatchData")
            .field("global", &self.global.len())
            .field("task", &self.task.len())
            .field("solver", &self.solver.len())
            .finish()
    }
}

/// How [`execute_batches`] hands Solver commands to their target.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SolverDelivery {
    /// Run on the calling thread, after anything already queued for the
    /// target.
    Inline,
    /// Append to the target's own queue for its next step.
    Forward,
}

/// Run several batches category by category, preserving batch order
/// within each category. Returns the number of commands executed or
/// forwarded.
pub fn execute_batches(
    mut batches: Vec<CommandBatchData>,
    mut task: Option<&mut BackgroundTask>,
    delivery: SolverDelivery,
) -> usize {
    let mut executed = 0;
    for batch in &mut batches {
        for f in batch.global.drain(..) {
            f();
            executed += 1;
        }
    }
    for batch in &mut batches {
        for f in batch.task.drain(..) {
            f(task.as_deref_mut());
            executed += 1;
        }
    }
    for batch in &mut batches {
        for (target, command) in batch.solver.drain(..) {
            match delivery {
                SolverDelivery::Inline => target.run_in_order(command),
                SolverDelivery::Forward => target.enqueue_boxed(command),
            }
            executed += 1;
        }
    }
    executed
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    fn recorder() -> (Arc<Mutex<Vec<&'static str>>>, impl Fn(&'static str) -> Command) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let log2 = Arc::clone(&log);
        let make = move |tag: &'static str| {
            let log = Arc::clone(&log2);
            Command::global(move || log.lock().push(tag))
        };
        (log, make)
    }

    #[test]
    fn empty_batch_is_empty() {
        let batch = CommandBatchData::new();
        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
        assert_eq!(batch.execute(None), 0);
    }

    #[test]
    fn categories_are_counted_separately() {
        let mut batch = CommandBatchData::new();
        batch.push(Command::global(|| {}));
        batch.push(Command::task(|_| {}));
        batch.push(Command::task(|_| {}));
        assert_eq!(batch.count(CommandKind::Global), 1);
        assert_eq!(batch.count(CommandKind::Task), 2);
        assert_eq!(batch.count(CommandKind::Solver), 0);
        assert_eq!(batch.len(), 3);
    }

    #[test]
    fn globals_run_before_tasks_regardless_of_push_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut batch = CommandBatchData::new();
        let l = Arc::clone(&log);
        batch.push(Command::task(move |task| {
            assert!(task.is_none());
            l.lock().push("task");
        }));
        let l = Arc::clone(&log);
        batch.push(Command::global(move || l.lock().push("global")));
        assert_eq!(batch.execute(None), 2);
        assert_eq!(*log.lock(), vec!["global", "task"]);
    }

    #[test]
    fn batches_keep_fifo_order_within_a_category() {
        let (log, make) = recorder();
        let first: CommandBatchData = make("a").into();
        let mut second = CommandBatchData::new();
        second.push(make("b"));
        second.push(make("c"));
        assert_eq!(execute_batches(vec![first, second], None, SolverDelivery::Inline), 3);
        assert_eq!(*log.lock(), vec!["a", "b", "c"]);
    }

    struct Still;

    impl rivet_core::Simulation for Still {
        fn advance_by(&mut self, _dt: f64) {}
        fn has_active_work(&self) -> bool {
            false
        }
        fn buffer_results(&self, _out: &mut rivet_core::SolverResults) {}
    }

    fn still() -> Arc<Solver> {
        Arc::new(Solver::new(
            rivet_core::SolverId(1),
            Box::new(Still),
            rivet_core::BufferMode::Double,
        ))
    }

    #[test]
    fn forwarded_solver_commands_wait_for_the_target_step() {
        let target = still();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        let mut batch = CommandBatchData::new();
        batch.push(Command::solver(&target, move |_| l.lock().push("solver")));
        let l = Arc::clone(&log);
        batch.push(Command::global(move || l.lock().push("global")));

        assert_eq!(execute_batches(vec![batch], None, SolverDelivery::Forward), 2);
        assert_eq!(*log.lock(), vec!["global"]);
        assert_eq!(target.pending_commands(), 1);

        target.step(0.1);
        assert_eq!(*log.lock(), vec!["global", "solver"]);
    }

    #[test]
    fn inline_solver_command_runs_after_queued_ones() {
        let target = still();
        let log = Arc::new(Mutex::new(Vec::new()));
        let l = Arc::clone(&log);
        target.enqueue(move |_| l.lock().push("queued"));
        let l = Arc::clone(&log);
        let batch: CommandBatchData =
            Command::solver(&target, move |_| l.lock().push("inline")).into();

        assert_eq!(batch.execute(None), 1);
        assert_eq!(*log.lock(), vec!["queued", "inline"]);
        assert!(!target.has_pending_commands());
    }

    #[test]
    fn kind_reports_category() {
        assert_eq!(Command::global(|| {}).kind(), CommandKind::Global);
        assert_eq!(Command::task(|_| {}).kind(), CommandKind::Task);
        assert_eq!(format!("{:?}", Command::global(|| {})), "Command::Global");
    }
}
