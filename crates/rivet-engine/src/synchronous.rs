//! Synchronous dispatch: every command runs on the calling thread.

use std::sync::atomic::{AtomicBool, Ordering};

use rivet_core::ThreadingMode;

use crate::command::{Command, CommandBatchData};
use crate::dispatcher::Dispatcher;

/// Runs commands inline at the moment they are delivered.
#[derive(Debug, Default)]
pub struct SynchronousDispatcher {
    shut_down: AtomicBool,
}

impl SynchronousDispatcher {
    /// Create a dispatcher.
    pub fn new() -> Self {
        Self::default()
    }
}

impl Dispatcher for SynchronousDispatcher {
    fn enqueue_command_immediate(&self, command: Command) {
        command.run(None);
    }

    fn submit_command_list(&self, batch: CommandBatchData) {
        batch.execute(None);
    }

    fn execute(&self) -> usize {
        0
    }

    fn mode(&self) -> ThreadingMode {
        ThreadingMode::Synchronous
    }

    fn shutdown(&self) {
        if !self.shut_down.swap(true, Ordering::AcqRel) {
            tracing::debug!("synchronous dispatcher shut down");
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[test]
    fn commands_run_inline() {
        let d = SynchronousDispatcher::new();
        let hits = Arc::new(Mutex::new(0));
        let h = Arc::clone(&hits);
        d.enqueue_command_immediate(Command::global(move || *h.lock() += 1));
        assert_eq!(*hits.lock(), 1);
        assert_eq!(d.pending_commands(), 0);
        assert_eq!(d.execute(), 0);
    }

    #[test]
    fn task_commands_receive_none() {
        let d = SynchronousDispatcher::new();
        let saw = Arc::new(Mutex::new(None));
        let s = Arc::clone(&saw);
        d.enqueue_command_immediate(Command::task(move |task| {
            *s.lock() = Some(task.is_some());
        }));
        assert_eq!(*saw.lock(), Some(false));
    }

    #[test]
    fn shutdown_is_idempotent() {
        let d = SynchronousDispatcher::new();
        assert!(!d.is_shut_down());
        d.shutdown();
        d.shutdown();
        assert!(d.is_shut_down());
        assert!(d.background_task().is_none());
    }
}
