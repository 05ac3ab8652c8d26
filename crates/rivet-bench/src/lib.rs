//! Benchmark profiles for the Rivet dispatch framework.
//!
//! - [`profile_config`]: a registry configuration for one threading mode
//! - [`populate`]: register `n` always-active [`Spinner`] solvers

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;

use rivet_core::{BodyState, Simulation, SolverResults, ThreadingMode};
use rivet_engine::{DispatchConfig, Solver, SolverRegistry};

/// A body spinning in a circle. Always has active work and never
/// allocates while stepping.
#[derive(Debug, Default)]
pub struct Spinner {
    angle: f32,
}

impl Simulation for Spinner {
    fn advance_by(&mut self, dt: f64) {
        self.angle = (self.angle + dt as f32) % std::f32::consts::TAU;
    }

    fn has_active_work(&self) -> bool {
        true
    }

    fn buffer_results(&self, out: &mut SolverResults) {
        let (s, c) = self.angle.sin_cos();
        out.bodies.clear();
        out.bodies.push(BodyState {
            position: [c, s, 0.0],
            velocity: [-s, c, 0.0],
        });
    }
}

/// Configuration used by every benchmark: fixed worker count, fast
/// background tick, large high water mark so warnings stay out of the
/// measurements.
pub fn profile_config(mode: ThreadingMode) -> DispatchConfig {
    DispatchConfig {
        threading_mode: mode,
        tick_rate_hz: 240.0,
        worker_count: Some(4),
        queue_high_water_mark: 1 << 20,
        ..DispatchConfig::default()
    }
}

/// Register `n` spinner solvers.
pub fn populate(registry: &SolverRegistry, n: usize) -> Vec<Arc<Solver>> {
    (0..n)
        .map(|_| registry.create_solver(Box::new(Spinner::default())))
        .collect()
}
