//! Rivet: physics solver dispatch across synchronous, task-graph and
//! background-thread execution.
//!
//! This is the facade crate that re-exports the public API of the Rivet
//! sub-crates. Most users only need this one dependency.
//!
//! # Quick start
//!
//! ```rust
//! use rivet::prelude::*;
//!
//! // A body that slides along x until it has moved one unit.
//! struct Slide {
//!     x: f32,
//! }
//!
//! impl Simulation for Slide {
//!     fn advance_by(&mut self, dt: f64) {
//!         self.x = (self.x + dt as f32).min(1.0);
//!     }
//!     fn has_active_work(&self) -> bool {
//!         self.x < 1.0
//!     }
//!     fn buffer_results(&self, out: &mut SolverResults) {
//!         out.bodies.clear();
//!         out.bodies.push(BodyState {
//!             position: [self.x, 0.0, 0.0],
//!             velocity: [1.0, 0.0, 0.0],
//!         });
//!     }
//! }
//!
//! let registry = SolverRegistry::new(DispatchConfig::default()).unwrap();
//! let solver = registry.create_solver(Box::new(Slide { x: 0.0 }));
//!
//! // Commands accumulate and run only when the batch is flushed.
//! let mut batch = CommandBatch::new();
//! batch.enqueue_solver(&solver, |s| s.with_simulation(|sim| sim.advance_by(0.5)));
//! batch.flush(&registry);
//!
//! let report = registry.start_frame(0.25).wait().unwrap();
//! assert_eq!(report.dispatched, 1);
//! assert_eq!(solver.results().bodies[0].position[0], 0.75);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `rivet-core` | Solver ids, modes, the `Simulation` trait, result records |
//! | [`engine`] | `rivet-engine` | Registry, dispatchers, commands, scene locks |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`rivet-core`).
///
/// Contains [`types::SolverId`], [`types::ThreadingMode`], and the
/// [`types::Simulation`] contract a physics backend implements.
pub use rivet_core as types;

/// Dispatch engine (`rivet-engine`).
///
/// [`engine::SolverRegistry`] is the entry point; [`engine::CommandBatch`]
/// accumulates commands and [`engine::SceneLock`] stalls the background
/// thread.
pub use rivet_engine as engine;

/// Common imports for typical Rivet usage.
///
/// ```rust
/// use rivet::prelude::*;
/// ```
pub mod prelude {
    // Core types and traits
    pub use rivet_core::{
        BodyState, BufferMode, Simulation, SolverEvent, SolverId, SolverResults, ThreadingMode,
    };

    // Commands
    pub use rivet_engine::{Command, CommandBatch, CommandKind};

    // Registry and dispatch
    pub use rivet_engine::{
        BackgroundTaskHandle, ConfigError, DispatchConfig, Dispatcher, FrameHandle, FrameReport,
        ProxySync, SceneLock, Solver, SolverRegistry, TaskStatistics,
    };
}
