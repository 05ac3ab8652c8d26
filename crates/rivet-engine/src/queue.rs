//! Multi-producer command queue shared by the concurrent dispatchers.
//!
//! Producers push whole batches (immediate commands are wrapped as
//! one-element batches). The single consumer drains every batch queued at
//! the moment the drain starts; commands enqueued while a drain runs wait
//! for the next one.
//!
//! The queue is unbounded. Crossing the high water mark logs one warning
//! and bumps [`CommandQueue::high_water_events`]; the warning re-arms once
//! the backlog is back down to half the mark.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crossbeam_channel::{Receiver, Sender};

use crate::background_task::BackgroundTask;
use crate::command::{execute_batches, Command, CommandBatchData, SolverDelivery};

/// Unbounded MPSC queue of command batches.
#[derive(Debug)]
pub struct CommandQueue {
    label: &'static str,
    tx: Sender<CommandBatchData>,
    rx: Receiver<CommandBatchData>,
    high_water_mark: usize,
    above_mark: AtomicBool,
    high_water_events: AtomicU64,
}

impl CommandQueue {
    /// Create an empty queue. `label` names the owner in log output.
    pub fn new(label: &'static str, high_water_mark: usize) -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            label,
            tx,
            rx,
            high_water_mark: high_water_mark.max(1),
            above_mark: AtomicBool::new(false),
            high_water_events: AtomicU64::new(0),
        }
    }

    /// Queue a single command.
    pub fn push_command(&self, command: Command) {
        self.push_batch(command.into());
    }

    /// Queue a batch. Empty batches are ignored.
    pub fn push_batch(&self, batch: CommandBatchData) {
        if batch.is_empty() {
            return;
        }
        // Both ends live in `self`, so the channel cannot be disconnected.
        let _ = self.tx.send(batch);
        self.check_high_water();
    }

    /// Run every batch queued right now, forwarding Solver commands to
    /// their targets. Returns commands executed or forwarded.
    pub fn drain(&self, task: Option<&mut BackgroundTask>) -> usize {
        let batches: Vec<CommandBatchData> = self.rx.try_iter().collect();
        if self.rx.len() <= self.high_water_mark / 2 {
            self.above_mark.store(false, Ordering::Relaxed);
        }
        if batches.is_empty() {
            return 0;
        }
        execute_batches(batches, task, SolverDelivery::Forward)
    }

    /// Number of batches waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    /// Whether nothing is waiting.
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// How many times the backlog has crossed the high water mark.
    pub fn high_water_events(&self) -> u64 {
        self.high_water_events.load(Ordering::Relaxed)
    }

    fn check_high_water(&self) {
        let depth = self.rx.len();
        if depth >= self.high_water_mark && !self.above_mark.swap(true, Ordering::Relaxed) {
            self.high_water_events.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                queue = self.label,
                depth,
                high_water_mark = self.high_water_mark,
                "command queue backlog crossed high water mark"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[test]
    fn drain_runs_everything_queued() {
        let q = CommandQueue::new("test", 16);
        let hits = Arc::new(Mutex::new(0));
        for _ in 0..3 {
            let hits = Arc::clone(&hits);
            q.push_command(Command::global(move || *hits.lock() += 1));
        }
        assert_eq!(q.len(), 3);
        assert_eq!(q.drain(None), 3);
        assert_eq!(*hits.lock(), 3);
        assert!(q.is_empty());
    }

    #[test]
    fn empty_batches_are_not_queued() {
        let q = CommandQueue::new("test", 16);
        q.push_batch(CommandBatchData::new());
        assert!(q.is_empty());
        assert_eq!(q.drain(None), 0);
    }

    #[test]
    fn commands_enqueued_during_drain_wait_for_next_drain() {
        let q = Arc::new(CommandQueue::new("test", 16));
        let inner = Arc::clone(&q);
        q.push_command(Command::global(move || {
            inner.push_command(Command::global(|| {}));
        }));
        assert_eq!(q.drain(None), 1);
        assert_eq!(q.len(), 1);
        assert_eq!(q.drain(None), 1);
    }

    #[test]
    fn high_water_warns_once_per_crossing() {
        let q = CommandQueue::new("test", 4);
        for _ in 0..10 {
            q.push_command(Command::global(|| {}));
        }
        assert_eq!(q.high_water_events(), 1);

        q.drain(None);
        for _ in 0..4 {
            q.push_command(Command::global(|| {}));
        }
        assert_eq!(q.high_water_events(), 2);
    }
}
