//! Producer-side command accumulation.
//!
//! A [`CommandBatch`] collects commands without running or delivering any
//! of them. [`flush`](CommandBatch::flush) hands the whole batch to a
//! dispatcher in one call and leaves an empty batch behind.

use std::mem;
use std::sync::Arc;

use crate::background_task::BackgroundTask;
use crate::command::{Command, CommandBatchData, CommandKind};
use crate::dispatcher::Dispatcher;
use crate::solver::Solver;

/// An ordered, not yet submitted set of commands.
///
/// Dropping a batch with unflushed commands discards them.
///
/// # Examples
///
/// ```
/// use std::sync::{Arc, Mutex};
/// use rivet_engine::{CommandBatch, SynchronousDispatcher};
///
/// let counter = Arc::new(Mutex::new(5i64));
/// let ops: [fn(&mut i64); 3] = [|v| *v *= 2, |v| *v -= 2, |v| *v *= 2];
/// let mut batch = CommandBatch::new();
/// for op in ops {
///     let c = Arc::clone(&counter);
///     batch.enqueue_global(move || op(&mut c.lock().unwrap()));
/// }
/// assert_eq!(*counter.lock().unwrap(), 5);
///
/// assert!(batch.flush(&SynchronousDispatcher::new()));
/// assert_eq!(*counter.lock().unwrap(), 16);
/// assert!(batch.is_empty());
/// ```
#[derive(Debug, Default)]
pub struct CommandBatch {
    data: CommandBatchData,
    flushes: u64,
}

impl CommandBatch {
    /// An empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a prebuilt command.
    pub fn enqueue(&mut self, command: Command) {
        self.data.push(command);
    }

    /// Append a Global command.
    pub fn enqueue_global(&mut self, f: impl FnOnce() + Send + 'static) {
        self.enqueue(Command::global(f));
    }

    /// Append a Task command.
    pub fn enqueue_task(&mut self, f: impl FnOnce(Option<&mut BackgroundTask>) + Send + 'static) {
        self.enqueue(Command::task(f));
    }

    /// Append a Solver command targeting `target`.
    pub fn enqueue_solver(
        &mut self,
        target: &Arc<Solver>,
        f: impl FnOnce(&Solver) + Send + 'static,
    ) {
        self.enqueue(Command::solver(target, f));
    }

    /// Submit everything accumulated so far as one unit.
    ///
    /// Returns `false` (and contacts nothing) if the batch is empty.
    /// Afterwards the batch is empty and ready to reuse.
    pub fn flush(&mut self, dispatcher: &dyn Dispatcher) -> bool {
        if self.data.is_empty() {
            return false;
        }
        let data = mem::take(&mut self.data);
        tracing::trace!(commands = data.len(), mode = %dispatcher.mode(), "flushing command batch");
        dispatcher.submit_command_list(data);
        self.flushes += 1;
        true
    }

    /// Commands accumulated since the last flush.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether nothing has been accumulated since the last flush.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Commands of one category accumulated since the last flush.
    pub fn count(&self, kind: CommandKind) -> usize {
        self.data.count(kind)
    }

    /// Number of successful flushes.
    pub fn flushes(&self) -> u64 {
        self.flushes
    }
}

impl Drop for CommandBatch {
    fn drop(&mut self) {
        if !self.data.is_empty() {
            tracing::debug!(discarded = self.data.len(), "command batch dropped without flush");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task_graph::TaskGraphDispatcher;

    use parking_lot::Mutex;

    #[test]
    fn empty_flush_is_a_no_op() {
        let d = TaskGraphDispatcher::new(16);
        let mut batch = CommandBatch::new();
        assert!(!batch.flush(&d));
        assert_eq!(d.pending_commands(), 0);
        assert_eq!(batch.flushes(), 0);
    }

    #[test]
    fn flush_delivers_one_unit_and_resets() {
        let d = TaskGraphDispatcher::new(16);
        let mut batch = CommandBatch::new();
        batch.enqueue_global(|| {});
        batch.enqueue_task(|_| {});
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.count(CommandKind::Task), 1);

        assert!(batch.flush(&d));
        assert!(batch.is_empty());
        assert_eq!(d.pending_commands(), 1);
        assert!(!batch.flush(&d));
        assert_eq!(batch.flushes(), 1);
    }

    #[test]
    fn nothing_runs_before_flush() {
        let ran = std::sync::Arc::new(Mutex::new(false));
        let r = std::sync::Arc::clone(&ran);
        let mut batch = CommandBatch::new();
        batch.enqueue_global(move || *r.lock() = true);
        assert!(!*ran.lock());
        drop(batch);
        assert!(!*ran.lock());
    }
}
