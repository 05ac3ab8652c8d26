//! Command dispatch and solver scheduling for Rivet.
//!
//! The [`SolverRegistry`] owns every [`Solver`] and exactly one
//! [`Dispatcher`], chosen by the active [`ThreadingMode`]:
//!
//! - **Synchronous**: commands and stepping run on the calling thread.
//! - **TaskGraph**: commands are queued and drained by the first task of
//!   each frame; solvers advance in parallel on a worker pool
//!   ([`TickOrchestration`]).
//! - **BackgroundThread**: a dedicated thread ([`BackgroundTask`]) drains
//!   commands and steps solvers at a fixed rate; the producer reads
//!   double-buffered results and can stall the thread with a
//!   [`SceneLock`].
//!
//! Producers accumulate commands in a [`CommandBatch`] and submit them in
//! one call. Within a batch, Global commands run before Task commands,
//! which run before Solver commands.
//!
//! [`ThreadingMode`]: rivet_core::ThreadingMode

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod background;
pub mod background_task;
pub mod batch;
pub mod buffer;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod metrics;
pub mod orchestration;
pub mod queue;
pub mod reentrant;
pub mod registry;
pub mod scene_lock;
pub mod solver;
pub mod switching;
pub mod sync;
pub mod synchronous;
pub mod task_graph;

pub use background::BackgroundThreadDispatcher;
pub use background_task::{BackgroundTask, BackgroundTaskHandle, BackgroundTaskState, ProxySync};
pub use batch::CommandBatch;
pub use buffer::DoubleBuffer;
pub use command::{
    Command, CommandBatchData, CommandKind, GlobalCommand, SolverCommand, SolverDelivery, TaskCommand,
};
pub use config::{ConfigError, DispatchConfig};
pub use dispatcher::Dispatcher;
pub use metrics::{FrameReport, SolverCounters, TaskStatistics};
pub use orchestration::{FrameHandle, TickOrchestration};
pub use registry::SolverRegistry;
pub use scene_lock::SceneLock;
pub use solver::{Solver, StepOutcome};
pub use switching::SwitchingDispatcher;
pub use sync::Event;
pub use synchronous::SynchronousDispatcher;
pub use task_graph::TaskGraphDispatcher;
