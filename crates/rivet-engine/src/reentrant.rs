//! Per-thread nesting depth for scene locks.
//!
//! A thread that already holds a scene lock may take it again without a
//! second handshake. The map remembers, per thread, how deep the nesting
//! is, whether the outermost acquisition succeeded, and the event that
//! releases the stalled background task once the last guard drops.

use std::sync::Arc;
use std::thread::ThreadId;

use parking_lot::Mutex;
use smallvec::SmallVec;

use crate::sync::Event;

#[derive(Debug)]
struct Entry {
    owner: ThreadId,
    depth: usize,
    acquired: bool,
    resume: Arc<Event>,
}

/// Nesting state of scene locks, keyed by thread.
///
/// Only a handful of threads ever hold scene locks at once, so entries
/// live inline in a small vector.
#[derive(Debug, Default)]
pub struct ReentrancyMap {
    entries: Mutex<SmallVec<[Entry; 4]>>,
}

impl ReentrancyMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Nest one level deeper if `owner` already holds a lock.
    ///
    /// Returns whether the outermost acquisition succeeded, or `None` if
    /// `owner` holds nothing and must perform the handshake.
    pub fn reenter(&self, owner: ThreadId) -> Option<bool> {
        let mut entries = self.entries.lock();
        let entry = entries.iter_mut().find(|e| e.owner == owner)?;
        entry.depth += 1;
        Some(entry.acquired)
    }

    /// Record the outermost acquisition by `owner`.
    pub fn register(&self, owner: ThreadId, acquired: bool, resume: Arc<Event>) {
        self.entries.lock().push(Entry {
            owner,
            depth: 1,
            acquired,
            resume,
        });
    }

    /// Leave one nesting level.
    ///
    /// Returns the resume event when the outermost level was left.
    pub fn exit(&self, owner: ThreadId) -> Option<Arc<Event>> {
        let mut entries = self.entries.lock();
        let pos = entries.iter().position(|e| e.owner == owner)?;
        entries[pos].depth -= 1;
        if entries[pos].depth == 0 {
            Some(entries.swap_remove(pos).resume)
        } else {
            None
        }
    }

    /// Current nesting depth for `owner`.
    pub fn depth(&self, owner: ThreadId) -> usize {
        self.entries
            .lock()
            .iter()
            .find(|e| e.owner == owner)
            .map_or(0, |e| e.depth)
    }

    /// Number of threads holding a lock.
    pub fn holders(&self) -> usize {
        self.entries.lock().len()
    }
}
