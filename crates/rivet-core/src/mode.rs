//! Threading and result-buffering modes.

use std::fmt;

/// How solver work is scheduled relative to the producer thread.
///
/// Exactly one mode is active per registry at a time. Switching modes
/// tears down the old dispatcher completely before the new one exists.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ThreadingMode {
    /// Every command runs inline on the calling thread and solvers are
    /// stepped by the producer itself. No concurrency.
    #[default]
    Synchronous,
    /// Commands are queued and drained once per frame by a task graph
    /// that advances solvers in parallel on a worker pool.
    TaskGraph,
    /// A dedicated background thread drains commands and steps solvers
    /// at a paced rate, independent of the producer.
    BackgroundThread,
    /// Placeholder for "no dispatcher". Never a valid construction target.
    Invalid,
}

impl ThreadingMode {
    /// Whether a dispatcher can be constructed for this mode.
    pub fn is_valid(self) -> bool {
        !matches!(self, Self::Invalid)
    }

    /// Whether solver state may be mutated by a thread other than the
    /// producer while the producer is running.
    pub fn is_concurrent(self) -> bool {
        matches!(self, Self::TaskGraph | Self::BackgroundThread)
    }
}

impl fmt::Display for ThreadingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Synchronous => "synchronous",
            Self::TaskGraph => "task-graph",
            Self::BackgroundThread => "background-thread",
            Self::Invalid => "invalid",
        };
        f.write_str(name)
    }
}

/// How a solver publishes its results to readers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum BufferMode {
    /// Results are written straight into the readable half under a write
    /// lock. Cheaper, but readers contend with every publish.
    Single,
    /// Results are staged in a private back half and swapped in with a
    /// short write-locked flip.
    #[default]
    Double,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_is_the_only_unconstructible_mode() {
        assert!(ThreadingMode::Synchronous.is_valid());
        assert!(ThreadingMode::TaskGraph.is_valid());
        assert!(ThreadingMode::BackgroundThread.is_valid());
        assert!(!ThreadingMode::Invalid.is_valid());
    }

    #[test]
    fn only_threaded_modes_are_concurrent() {
        assert!(!ThreadingMode::Synchronous.is_concurrent());
        assert!(ThreadingMode::TaskGraph.is_concurrent());
        assert!(ThreadingMode::BackgroundThread.is_concurrent());
    }

    #[test]
    fn defaults() {
        assert_eq!(ThreadingMode::default(), ThreadingMode::Synchronous);
        assert_eq!(BufferMode::default(), BufferMode::Double);
        assert_eq!(ThreadingMode::BackgroundThread.to_string(), "background-thread");
    }
}
