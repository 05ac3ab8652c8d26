//! Manual-reset event used for thread handshakes.
//!
//! [`Event`] is the OS-event analogue the dispatch layer is built on:
//! shutdown notification, frame completion, and both halves of the
//! scene-lock handshake.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A manual-reset event: once signalled, every current and future waiter
/// passes until [`reset`](Event::reset) is called.
#[derive(Debug, Default)]
pub struct Event {
    signalled: Mutex<bool>,
    cond: Condvar,
}

// Compile-time assertion: Event must be Send + Sync.
const _: fn() = || {
    fn assert<T: Send + Sync>() {}
    assert::<Event>();
};

impl Event {
    /// Create an event in the unsignalled state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Signal the event, releasing all waiters.
    pub fn signal(&self) {
        let mut signalled = self.signalled.lock();
        *signalled = true;
        self.cond.notify_all();
    }

    /// Return the event to the unsignalled state.
    pub fn reset(&self) {
        *self.signalled.lock() = false;
    }

    /// Whether the event is currently signalled.
    pub fn is_signalled(&self) -> bool {
        *self.signalled.lock()
    }

    /// Block until the event is signalled.
    pub fn wait(&self) {
        let mut signalled = self.signalled.lock();
        while !*signalled {
            self.cond.wait(&mut signalled);
        }
    }

    /// Block until the event is signalled or `timeout` elapses.
    ///
    /// Returns `true` if the event was signalled. A zero timeout polls; a
    /// timeout too large to express as a deadline waits indefinitely.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut signalled = self.signalled.lock();
        while !*signalled {
            if self.cond.wait_until(&mut signalled, deadline).timed_out() {
                return *signalled;
            }
        }
        true
    }

    /// Wait with an optional timeout; `None` waits indefinitely.
    pub fn wait_for(&self, timeout: Option<Duration>) -> bool {
        match timeout {
            Some(t) => self.wait_timeout(t),
            None => {
                self.wait();
                true
            }
        }
    }
}
