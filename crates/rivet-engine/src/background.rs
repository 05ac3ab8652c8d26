//! Background-thread dispatch: a dedicated thread owns all stepping and
//! drains its own command queue once per tick.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;

use parking_lot::Mutex;

use rivet_core::ThreadingMode;

use crate::background_task::{BackgroundTask, BackgroundTaskHandle};
use crate::command::{Command, CommandBatchData};
use crate::config::{ConfigError, DispatchConfig};
use crate::dispatcher::{run_late, run_late_batch, Dispatcher};
use crate::solver::Solver;

/// Runs a [`BackgroundTask`] on a thread named `rivet-physics`.
#[derive(Debug)]
pub struct BackgroundThreadDispatcher {
    handle: Arc<BackgroundTaskHandle>,
    thread: Mutex<Option<JoinHandle<BackgroundTask>>>,
    shut_down: AtomicBool,
}

impl BackgroundThreadDispatcher {
    /// Spawn the background thread. `solvers` are handed to the task via
    /// Task commands that run at the start of its first tick.
    pub fn new(config: &DispatchConfig, solvers: &[Arc<Solver>]) -> Result<Self, ConfigError> {
        let handle = Arc::new(BackgroundTaskHandle::new(config));
        for solver in solvers {
            let solver = Arc::clone(solver);
            handle.enqueue(Command::task(move |task| {
                if let Some(task) = task {
                    task.add_solver(solver);
                }
            }));
        }

        let task = BackgroundTask::new(Arc::clone(&handle), config);
        let join = thread::Builder::new()
            .name("rivet-physics".into())
            .spawn(move || task.run())
            .map_err(|e| ConfigError::ThreadSpawnFailed {
                reason: e.to_string(),
            })?;
        handle.attach_thread(join.thread().clone());

        tracing::debug!(solvers = solvers.len(), "background dispatcher started");
        Ok(Self {
            handle,
            thread: Mutex::new(Some(join)),
            shut_down: AtomicBool::new(false),
        })
    }

    /// The shared task handle.
    pub fn handle(&self) -> &Arc<BackgroundTaskHandle> {
        &self.handle
    }
}

impl Dispatcher for BackgroundThreadDispatcher {
    fn enqueue_command_immediate(&self, command: Command) {
        if self.is_shut_down() {
            return run_late(self.mode(), command);
        }
        self.handle.enqueue(command);
    }

    fn submit_command_list(&self, batch: CommandBatchData) {
        if self.is_shut_down() {
            return run_late_batch(self.mode(), batch);
        }
        self.handle.queue().push_batch(batch);
    }

    fn execute(&self) -> usize {
        0
    }

    fn mode(&self) -> ThreadingMode {
        ThreadingMode::BackgroundThread
    }

    /// Stop the loop, join the thread, then run everything still queued
    /// on the calling thread with the recovered task.
    fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let start = Instant::now();

        self.handle.request_shutdown();
        self.handle.wait_terminated(None);

        let joined = self.thread.lock().take().map(JoinHandle::join);
        match joined {
            Some(Ok(mut task)) => {
                let drained = task.drain_remaining();
                let released = task.release_solvers().len();
                tracing::info!(
                    drained,
                    released,
                    frames = task.frame(),
                    elapsed_us = start.elapsed().as_micros() as u64,
                    "background dispatcher shut down"
                );
            }
            Some(Err(_)) => {
                let drained = self.handle.queue().drain(None);
                tracing::error!(drained, "background thread panicked");
            }
            None => {}
        }
    }

    fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }

    fn pending_commands(&self) -> usize {
        self.handle.pending_commands()
    }

    fn background_task(&self) -> Option<Arc<BackgroundTaskHandle>> {
        Some(Arc::clone(&self.handle))
    }
}

impl Drop for BackgroundThreadDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
