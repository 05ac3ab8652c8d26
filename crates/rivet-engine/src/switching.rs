//! Interim dispatcher installed while the registry changes threading mode.
//!
//! The registry swaps this in before it shuts the old dispatcher down, so
//! no registry lock is held while old commands drain and commands that
//! call back into the registry never block. Everything delivered here is
//! buffered in arrival order until the new dispatcher exists, replayed
//! into it, and from then on forwarded.

use std::mem;
use std::sync::Arc;

use parking_lot::Mutex;

use rivet_core::ThreadingMode;

use crate::background_task::BackgroundTaskHandle;
use crate::command::{Command, CommandBatchData};
use crate::dispatcher::Dispatcher;

enum Route {
    Buffer(Vec<CommandBatchData>),
    Forward(Arc<dyn Dispatcher>),
}

/// Buffers commands during a mode change, then forwards them.
pub struct SwitchingDispatcher {
    target: ThreadingMode,
    route: Mutex<Route>,
}

impl SwitchingDispatcher {
    pub(crate) fn new(target: ThreadingMode) -> Self {
        Self {
            target,
            route: Mutex::new(Route::Buffer(Vec::new())),
        }
    }

    /// The mode being switched to.
    pub fn target(&self) -> ThreadingMode {
        self.target
    }

    /// Replay everything buffered into `next`, then forward to it.
    ///
    /// Replay happens without holding the buffer lock, so replayed
    /// commands may deliver more commands here; those are replayed in a
    /// later round, after the ones that produced them. Returns the number
    /// of commands replayed.
    pub(crate) fn hand_off(&self, next: Arc<dyn Dispatcher>) -> usize {
        let mut replayed = 0;
        loop {
            let pending = {
                let mut route = self.route.lock();
                let pending = match &mut *route {
                    Route::Buffer(pending) => mem::take(pending),
                    Route::Forward(_) => Vec::new(),
                };
                if pending.is_empty() {
                    *route = Route::Forward(Arc::clone(&next));
                    break;
                }
                pending
            };
            for batch in pending {
                replayed += batch.len();
                next.submit_command_list(batch);
            }
        }
        replayed
    }

    fn forward_target(&self) -> Option<Arc<dyn Dispatcher>> {
        match &*self.route.lock() {
            Route::Buffer(_) => None,
            Route::Forward(next) => Some(Arc::clone(next)),
        }
    }
}

impl Dispatcher for SwitchingDispatcher {
    fn enqueue_command_immediate(&self, command: Command) {
        self.submit_command_list(command.into());
    }

    fn submit_command_list(&self, batch: CommandBatchData) {
        if batch.is_empty() {
            return;
        }
        let next = {
            let mut route = self.route.lock();
            match &mut *route {
                Route::Buffer(pending) => {
                    pending.push(batch);
                    return;
                }
                Route::Forward(next) => Arc::clone(next),
            }
        };
        next.submit_command_list(batch);
    }

    fn execute(&self) -> usize {
        0
    }

    fn mode(&self) -> ThreadingMode {
        self.target
    }

    /// Shuts down the dispatcher being forwarded to, if any. While still
    /// buffering this does nothing; the registry checks for a pending
    /// shutdown once the new dispatcher is installed.
    fn shutdown(&self) {
        if let Some(next) = self.forward_target() {
            next.shutdown();
        }
    }

    fn is_shut_down(&self) -> bool {
        self.forward_target().is_some_and(|next| next.is_shut_down())
    }

    fn pending_commands(&self) -> usize {
        match &*self.route.lock() {
            Route::Buffer(pending) => pending.len(),
            Route::Forward(next) => next.pending_commands(),
        }
    }

    fn background_task(&self) -> Option<Arc<BackgroundTaskHandle>> {
        self.forward_target().and_then(|next| next.background_task())
    }
}

impl std::fmt::Debug for SwitchingDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let forwarding = matches!(&*self.route.lock(), Route::Forward(_));
        f.debug_struct("SwitchingDispatcher")
            .field("target", &self.target)
            .field("forwarding", &forwarding)
            .finish()
    }
}
