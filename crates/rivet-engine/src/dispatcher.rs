//! The mode-polymorphic command dispatcher.
//!
//! A [`Dispatcher`] decides when and on which thread commands run. The
//! registry owns exactly one at a time and replaces it on every threading
//! mode change.
//!
//! | Mode             | Global / Task commands       | Solver commands                      |
//! |------------------|------------------------------|--------------------------------------|
//! | Synchronous      | run inline                   | run inline                           |
//! | TaskGraph        | queued, drained per frame    | queued, forwarded to the target's queue by the drain |
//! | BackgroundThread | queued, drained per tick     | queued, forwarded to the target's queue by the drain |
//!
//! Immediate and batched commands share one queue, so every solver sees
//! its commands in submission order in all three modes.

use std::sync::Arc;

use rivet_core::ThreadingMode;

use crate::background_task::BackgroundTaskHandle;
use crate::command::{Command, CommandBatchData};

/// Routes commands to the thread entitled to run them.
pub trait Dispatcher: Send + Sync {
    /// Deliver one command according to the mode's rules.
    fn enqueue_command_immediate(&self, command: Command);

    /// Deliver a whole batch. Its Globals run before its Tasks, which run
    /// before its Solver commands.
    fn submit_command_list(&self, batch: CommandBatchData);

    /// Drain queued Global and Task commands on the calling thread.
    ///
    /// Returns the number of commands run. A no-op in Synchronous mode
    /// (nothing is ever queued) and in BackgroundThread mode (the task
    /// drains its own queue).
    fn execute(&self) -> usize;

    /// The mode this dispatcher implements.
    fn mode(&self) -> ThreadingMode;

    /// Stop accepting deferred work and run what is still queued.
    ///
    /// Called by the registry before the dispatcher is replaced or
    /// dropped. Idempotent. Commands delivered afterwards run inline.
    fn shutdown(&self);

    /// Whether [`shutdown`](Dispatcher::shutdown) has completed.
    fn is_shut_down(&self) -> bool;

    /// Batches waiting in the dispatcher's own queue.
    fn pending_commands(&self) -> usize {
        0
    }

    /// The background task, in BackgroundThread mode.
    fn background_task(&self) -> Option<Arc<BackgroundTaskHandle>> {
        None
    }
}

/// Run a command that arrived after shutdown on the calling thread.
pub(crate) fn run_late(mode: ThreadingMode, command: Command) {
    tracing::warn!(%mode, kind = ?command.kind(), "dispatcher shut down, running command inline");
    command.run(None);
}

/// Run a batch that arrived after shutdown on the calling thread.
pub(crate) fn run_late_batch(mode: ThreadingMode, batch: CommandBatchData) {
    tracing::warn!(%mode, commands = batch.len(), "dispatcher shut down, running batch inline");
    batch.execute(None);
}
