//! Task-graph dispatch: commands are queued and drained at the start of
//! each frame by the frame's first task.

use std::sync::atomic::{AtomicBool, Ordering};

use rivet_core::ThreadingMode;

use crate::command::{Command, CommandBatchData};
use crate::dispatcher::{run_late, run_late_batch, Dispatcher};
use crate::queue::CommandQueue;

/// Queues commands until [`execute`](Dispatcher::execute) drains them.
#[derive(Debug)]
pub struct TaskGraphDispatcher {
    queue: CommandQueue,
    shut_down: AtomicBool,
}

impl TaskGraphDispatcher {
    /// Create a dispatcher whose queue warns at `high_water_mark` batches.
    pub fn new(high_water_mark: usize) -> Self {
        Self {
            queue: CommandQueue::new("task-graph", high_water_mark),
            shut_down: AtomicBool::new(false),
        }
    }

    /// How many times the queue has crossed its high water mark.
    pub fn high_water_events(&self) -> u64 {
        self.queue.high_water_events()
    }
}

impl Dispatcher for TaskGraphDispatcher {
    fn enqueue_command_immediate(&self, command: Command) {
        if self.is_shut_down() {
            return run_late(self.mode(), command);
        }
        self.queue.push_command(command);
    }

    fn submit_command_list(&self, batch: CommandBatchData) {
        if self.is_shut_down() {
            return run_late_batch(self.mode(), batch);
        }
        self.queue.push_batch(batch);
    }

    fn execute(&self) -> usize {
        self.queue.drain(None)
    }

    fn mode(&self) -> ThreadingMode {
        ThreadingMode::TaskGraph
    }

    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let drained = self.queue.drain(None);
        tracing::debug!(drained, "task-graph dispatcher shut down");
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn pending_commands(&self) -> usize {
        self.queue.len()
    }
}
