//! Dispatch configuration, validation, and error types.
//!
//! [`DispatchConfig`] is the constructor input for a
//! [`SolverRegistry`](crate::registry::SolverRegistry). It is validated
//! once up front; every later mode change reuses the validated values.

use std::time::Duration;

use rivet_core::{BufferMode, ThreadingMode};

// ── DispatchConfig ─────────────────────────────────────────────────

/// Complete configuration for a solver registry and its dispatchers.
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Threading mode the registry starts in. Default: `Synchronous`.
    pub threading_mode: ThreadingMode,
    /// Paced rate of the background task, in ticks per second. Default: 60.
    pub tick_rate_hz: f64,
    /// Step handed to solvers by the background task, in seconds.
    /// `None` = one tick period (`1 / tick_rate_hz`).
    pub fixed_dt: Option<f64>,
    /// Worker threads for the task-graph pool. `None` = auto-detect
    /// (`available_parallelism - 1`, clamped to `[1, 16]`).
    pub worker_count: Option<usize>,
    /// Timeout used by full proxy syncs when stalling the background
    /// task. `None` waits indefinitely. Default: 100 ms.
    pub scene_lock_timeout_ms: Option<u64>,
    /// Queued batch count at which a dispatcher queue logs a
    /// backpressure warning. Default: 4096.
    pub queue_high_water_mark: usize,
    /// Result buffering used for newly created solvers. Default: `Double`.
    pub buffer_mode: BufferMode,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            threading_mode: ThreadingMode::Synchronous,
            tick_rate_hz: 60.0,
            fixed_dt: None,
            worker_count: None,
            scene_lock_timeout_ms: Some(100),
            queue_high_water_mark: 4096,
            buffer_mode: BufferMode::Double,
        }
    }
}

impl DispatchConfig {
    /// Validate all structural invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // 1. The starting mode must be constructible.
        if !self.threading_mode.is_valid() {
            return Err(ConfigError::InvalidMode {
                mode: self.threading_mode,
            });
        }
        // 2. tick_rate_hz must be finite and positive, and its reciprocal
        //    must also be finite (subnormals would make 1/hz infinite and
        //    panic in Duration::from_secs_f64).
        let hz = self.tick_rate_hz;
        if !hz.is_finite() || hz <= 0.0 || !(1.0 / hz).is_finite() {
            return Err(ConfigError::InvalidTickRate { value: hz });
        }
        // 3. fixed_dt, if present, must be finite and positive.
        if let Some(dt) = self.fixed_dt {
            if !dt.is_finite() || dt <= 0.0 {
                return Err(ConfigError::InvalidStep { value: dt });
            }
        }
        // 4. Explicit zero workers would leave the task graph nowhere to run.
        if self.worker_count == Some(0) {
            return Err(ConfigError::NoWorkers);
        }
        // 5. A zero high water mark would warn on every enqueue.
        if self.queue_high_water_mark == 0 {
            return Err(ConfigError::HighWaterMarkZero);
        }
        Ok(())
    }

    /// Target wall-clock duration of one background tick.
    pub fn tick_budget(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.tick_rate_hz)
    }

    /// Step handed to solvers by the background task.
    pub fn step_dt(&self) -> f64 {
        self.fixed_dt.unwrap_or(1.0 / self.tick_rate_hz)
    }

    /// Timeout for full proxy syncs.
    pub fn scene_lock_timeout(&self) -> Option<Duration> {
        self.scene_lock_timeout_ms.map(Duration::from_millis)
    }

    /// Resolve the actual worker count, applying auto-detection if `None`.
    ///
    /// Explicit values are clamped to `[1, 64]`. Auto-detection leaves one
    /// core for the producer thread.
    pub fn resolved_worker_count(&self) -> usize {
        match self.worker_count {
            Some(n) => n.clamp(1, 64),
            None => {
                let cpus = std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(4);
                cpus.saturating_sub(1).clamp(1, 16)
            }
        }
    }
}

// ── ConfigError ────────────────────────────────────────────────────

/// Errors detected while validating configuration or bringing up a
/// dispatcher.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigError {
    /// The requested threading mode cannot host a dispatcher.
    #[error("threading mode {mode} cannot host a dispatcher")]
    InvalidMode {
        /// The rejected mode.
        mode: ThreadingMode,
    },
    /// tick_rate_hz is NaN, infinite, zero, or negative.
    #[error("tick_rate_hz must be finite and positive, got {value}")]
    InvalidTickRate {
        /// The invalid value.
        value: f64,
    },
    /// fixed_dt is NaN, infinite, zero, or negative.
    #[error("fixed_dt must be finite and positive, got {value}")]
    InvalidStep {
        /// The invalid value.
        value: f64,
    },
    /// worker_count was explicitly set to zero.
    #[error("worker_count must be at least 1")]
    NoWorkers,
    /// queue_high_water_mark is zero.
    #[error("queue_high_water_mark must be at least 1")]
    HighWaterMarkZero,
    /// The background thread could not be spawned.
    #[error("thread spawn failed: {reason}")]
    ThreadSpawnFailed {
        /// Description of the failure.
        reason: String,
    },
    /// The task-graph worker pool could not be built.
    #[error("worker pool build failed: {reason}")]
    WorkerPoolFailed {
        /// Description of the failure.
        reason: String,
    },
    /// The registry has already been shut down.
    #[error("solver registry has been shut down")]
    RegistryShutDown,
    /// Another threading mode change is still in progress.
    #[error("a threading mode change is already in progress")]
    ModeChangeInProgress,
}
