//! Scoped exclusive access to scene state while the background task runs.
//!
//! Constructing a [`SceneLock`] in BackgroundThread mode enqueues a Task
//! command that, when the background task reaches it, signals *stalled*
//! and blocks until *resume*. The constructor waits for *stalled* (up to
//! the timeout). Dropping the guard signals *resume*.
//!
//! If the wait times out the constructor signals *resume* itself, so when
//! the task eventually reaches the handshake command it passes straight
//! through and the loop is never parked by an abandoned lock.
//!
//! In Synchronous and TaskGraph modes there is no concurrent stepping
//! thread between frames, so the lock is acquired trivially.
//!
//! Locks are reentrant per thread: a nested guard on a thread that already
//! holds one reports the outer guard's outcome without a second handshake.
//! Holding a lock with no timeout while shutting the registry down on the
//! same thread deadlocks.

use std::sync::Arc;
use std::thread::{self, ThreadId};
use std::time::Duration;

use crate::background_task::BackgroundTaskHandle;
use crate::command::Command;
use crate::dispatcher::Dispatcher;
use crate::reentrant::ReentrancyMap;
use crate::sync::Event;

/// Guard holding the background task stalled at a tick boundary.
#[derive(Debug)]
#[must_use = "the background task resumes as soon as the lock is dropped"]
pub struct SceneLock {
    acquired: bool,
    held: Option<Held>,
}

#[derive(Debug)]
struct Held {
    owner: ThreadId,
    locks: Arc<ReentrancyMap>,
}

impl SceneLock {
    /// Acquire against whatever `dispatcher` is active.
    ///
    /// `timeout` of `None` waits indefinitely.
    pub fn new(dispatcher: &dyn Dispatcher, timeout: Option<Duration>) -> Self {
        match dispatcher.background_task() {
            Some(task) => Self::for_task(&task, timeout),
            None => Self::trivial(),
        }
    }

    /// Acquire against a specific background task.
    pub fn for_task(task: &BackgroundTaskHandle, timeout: Option<Duration>) -> Self {
        // Commands running on the task's own thread already exclude it.
        if task.is_task_thread() {
            return Self::trivial();
        }

        let owner = thread::current().id();
        let locks = Arc::clone(task.scene_locks());
        if let Some(acquired) = locks.reenter(owner) {
            return Self {
                acquired,
                held: Some(Held { owner, locks }),
            };
        }

        let stalled = Arc::new(Event::new());
        let resume = Arc::new(Event::new());
        {
            let stalled = Arc::clone(&stalled);
            let resume = Arc::clone(&resume);
            task.enqueue(Command::task(move |_| {
                stalled.signal();
                resume.wait();
            }));
        }

        let acquired = stalled.wait_for(timeout);
        if !acquired {
            resume.signal();
            tracing::debug!(?timeout, "scene lock timed out");
        }
        locks.register(owner, acquired, resume);
        Self {
            acquired,
            held: Some(Held { owner, locks }),
        }
    }

    fn trivial() -> Self {
        Self {
            acquired: true,
            held: None,
        }
    }

    /// Whether the background task is stalled for as long as this guard
    /// lives.
    pub fn did_get_lock(&self) -> bool {
        self.acquired
    }
}

impl Drop for SceneLock {
    fn drop(&mut self) {
        if let Some(held) = self.held.take() {
            if let Some(resume) = held.locks.exit(held.owner) {
                resume.signal();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::background_task::BackgroundTask;
    use crate::config::DispatchConfig;
    use crate::synchronous::SynchronousDispatcher;

    fn handle() -> Arc<BackgroundTaskHandle> {
        Arc::new(BackgroundTaskHandle::new(&DispatchConfig::default()))
    }

    #[test]
    fn trivially_acquired_without_background_task() {
        let d = SynchronousDispatcher::new();
        let lock = SceneLock::new(&d, Some(Duration::ZERO));
        assert!(lock.did_get_lock());
    }

    #[test]
    fn times_out_when_task_never_drains() {
        let h = handle();
        let lock = SceneLock::for_task(&h, Some(Duration::from_millis(5)));
        assert!(!lock.did_get_lock());
        // The handshake command is still queued but already released.
        assert_eq!(h.pending_commands(), 1);
        drop(lock);
        assert_eq!(h.scene_locks().holders(), 0);

        let config = DispatchConfig::default();
        let mut task = BackgroundTask::new(Arc::clone(&h), &config);
        // Must not block.
        task.tick();
        assert_eq!(h.pending_commands(), 0);
    }

    #[test]
    fn acquires_when_task_reaches_handshake() {
        let h = handle();
        let config = DispatchConfig::default();
        let mut task = BackgroundTask::new(Arc::clone(&h), &config);

        let worker = thread::spawn(move || {
            // Keep ticking until the handshake has been served.
            while task.handle().pending_commands() == 0 {
                thread::yield_now();
            }
            task.tick();
            task.frame()
        });

        let lock = SceneLock::for_task(&h, None);
        assert!(lock.did_get_lock());
        let nested = SceneLock::for_task(&h, Some(Duration::ZERO));
        assert!(nested.did_get_lock());
        assert_eq!(h.scene_locks().depth(thread::current().id()), 2);
        drop(nested);
        drop(lock);

        assert_eq!(worker.join().unwrap(), 1);
        assert_eq!(h.scene_locks().holders(), 0);
    }

    #[test]
    fn nested_guard_inherits_failed_outer() {
        let h = handle();
        let outer = SceneLock::for_task(&h, Some(Duration::ZERO));
        let inner = SceneLock::for_task(&h, None);
        assert!(!outer.did_get_lock());
        assert!(!inner.did_get_lock());
        assert_eq!(h.pending_commands(), 1);
    }
}
