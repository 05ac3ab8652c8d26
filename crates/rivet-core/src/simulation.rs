//! The contract a physics backend implements to be driven by a solver.
//!
//! Integration, constraint solving and collision detection live behind
//! [`Simulation`]; the dispatch engine only ever calls these three
//! methods, and only from the thread currently entitled to step.

use smallvec::SmallVec;

/// A steppable physics backend.
///
/// Implementations must be [`Send`] because the stepping thread changes
/// with the threading mode. They need not be [`Sync`]: the owning solver
/// serializes all access.
///
/// # Examples
///
/// ```
/// use rivet_core::{BodyState, Simulation, SolverResults};
///
/// struct Falling {
///     height: f32,
///     speed: f32,
/// }
///
/// impl Simulation for Falling {
///     fn advance_by(&mut self, dt: f64) {
///         self.speed -= 9.81 * dt as f32;
///         self.height = (self.height + self.speed * dt as f32).max(0.0);
///     }
///
///     fn has_active_work(&self) -> bool {
///         self.height > 0.0
///     }
///
///     fn buffer_results(&self, out: &mut SolverResults) {
///         out.bodies.clear();
///         out.bodies.push(BodyState {
///             position: [0.0, self.height, 0.0],
///             velocity: [0.0, self.speed, 0.0],
///         });
///     }
/// }
///
/// let mut sim = Falling { height: 1.0, speed: 0.0 };
/// sim.advance_by(0.1);
/// assert!(sim.has_active_work());
/// ```
pub trait Simulation: Send {
    /// Advance the simulation by `dt` seconds.
    fn advance_by(&mut self, dt: f64);

    /// Whether advancing would change anything (awake bodies, pending
    /// constraints). Solvers without active work are not stepped.
    fn has_active_work(&self) -> bool;

    /// Write the externally visible state into `out`.
    ///
    /// `out` holds whatever was written two publishes ago (the halves of
    /// the double buffer alternate), so implementations should overwrite
    /// rather than append. `step` and `sim_time` are filled in by the
    /// solver afterwards.
    fn buffer_results(&self, out: &mut SolverResults);
}

/// Position and velocity of one simulated body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct BodyState {
    /// World-space position.
    pub position: [f32; 3],
    /// World-space linear velocity.
    pub velocity: [f32; 3],
}

/// A discrete event raised during a step (contact began, body slept...).
///
/// The code space belongs to the backend; the dispatch layer only moves
/// events across threads.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SolverEvent {
    /// Backend-defined event code.
    pub code: u32,
    /// Index of the body the event concerns.
    pub body: u32,
}

/// Externally visible state of one solver after a step.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SolverResults {
    /// Number of completed advances when these results were captured.
    pub step: u64,
    /// Accumulated simulated time in seconds.
    pub sim_time: f64,
    /// Per-body kinematic state.
    pub bodies: Vec<BodyState>,
    /// Events raised since the previous publish.
    pub events: SmallVec<[SolverEvent; 4]>,
}

impl SolverResults {
    /// Whether nothing has been published yet.
    pub fn is_empty(&self) -> bool {
        self.step == 0 && self.bodies.is_empty() && self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_results_are_empty() {
        let r = SolverResults::default();
        assert!(r.is_empty());
        assert_eq!(r.sim_time, 0.0);
    }

    #[test]
    fn results_with_a_step_are_not_empty() {
        let r = SolverResults {
            step: 1,
            ..SolverResults::default()
        };
        assert!(!r.is_empty());
    }
}
