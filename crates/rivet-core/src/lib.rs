//! Core types and traits for the Rivet dispatch framework.
//!
//! This is the leaf crate with zero internal dependencies. It defines
//! the vocabulary shared by the dispatch engine and by simulation
//! backends: solver identifiers, threading and buffering modes, the
//! [`Simulation`] contract a physics backend implements, and the
//! result records that solvers publish to the producer thread.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod id;
pub mod mode;
pub mod simulation;

pub use id::SolverId;
pub use mode::{BufferMode, ThreadingMode};
pub use simulation::{BodyState, Simulation, SolverEvent, SolverResults};
