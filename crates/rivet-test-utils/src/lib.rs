//! Test utilities and mock simulations for Rivet development.
//!
//! Provides [`MockSimulation`], a [`Simulation`] whose every call is
//! observable through a shared [`SimTracker`], and [`Recorder`], a shared
//! log for asserting the order in which commands ran.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::sync::Arc;
use std::thread;

use parking_lot::Mutex;

use rivet_core::{BodyState, Simulation, SolverEvent, SolverResults};

// ── SimTracker ──────────────────────────────────────────────────

#[derive(Debug, Default)]
struct TrackerState {
    dts: Vec<f64>,
    threads: Vec<Option<String>>,
    dropped_on: Option<Option<String>>,
}

/// Shared view of what a [`MockSimulation`] has been asked to do.
#[derive(Clone, Debug, Default)]
pub struct SimTracker {
    state: Arc<Mutex<TrackerState>>,
}

impl SimTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `advance_by` calls.
    pub fn steps(&self) -> usize {
        self.state.lock().dts.len()
    }

    /// Every `dt` passed to `advance_by`, in order.
    pub fn dts(&self) -> Vec<f64> {
        self.state.lock().dts.clone()
    }

    /// Names of the threads that called `advance_by`, in order.
    pub fn threads(&self) -> Vec<Option<String>> {
        self.state.lock().threads.clone()
    }

    /// Whether the simulation has been dropped.
    pub fn is_dropped(&self) -> bool {
        self.state.lock().dropped_on.is_some()
    }

    /// Name of the thread that dropped the simulation, if it was dropped
    /// on a named thread.
    pub fn dropped_on(&self) -> Option<String> {
        self.state.lock().dropped_on.clone().flatten()
    }
}

fn current_thread_name() -> Option<String> {
    thread::current().name().map(str::to_owned)
}

// ── MockSimulation ──────────────────────────────────────────────

/// A simulation with one body moving at constant velocity.
///
/// It reports active work for a configurable number of steps (or
/// forever), and raises a [`SolverEvent`] with code `1` on every step.
#[derive(Debug)]
pub struct MockSimulation {
    tracker: SimTracker,
    remaining: Option<u64>,
    body: BodyState,
    last_step_events: u32,
}

impl MockSimulation {
    /// Active forever.
    pub fn new() -> Self {
        Self {
            tracker: SimTracker::new(),
            remaining: None,
            body: BodyState {
                position: [0.0; 3],
                velocity: [1.0, 0.0, 0.0],
            },
            last_step_events: 0,
        }
    }

    /// Active for exactly `steps` advances.
    pub fn active_for(steps: u64) -> Self {
        let mut sim = Self::new();
        sim.remaining = Some(steps);
        sim
    }

    /// Never active.
    pub fn idle() -> Self {
        Self::active_for(0)
    }

    /// Report through `tracker` instead of a fresh one.
    pub fn with_tracker(mut self, tracker: SimTracker) -> Self {
        self.tracker = tracker;
        self
    }

    /// The tracker observing this simulation.
    pub fn tracker(&self) -> SimTracker {
        self.tracker.clone()
    }

    /// Grant `steps` more advances of active work.
    pub fn wake_for(&mut self, steps: u64) {
        self.remaining = Some(self.remaining.unwrap_or(0) + steps);
    }

    /// Current position of the body.
    pub fn position(&self) -> [f32; 3] {
        self.body.position
    }
}

impl Default for MockSimulation {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation for MockSimulation {
    fn advance_by(&mut self, dt: f64) {
        for (p, v) in self.body.position.iter_mut().zip(self.body.velocity) {
            *p += v * dt as f32;
        }
        if let Some(r) = self.remaining.as_mut() {
            *r = r.saturating_sub(1);
        }
        self.last_step_events = 1;
        let mut state = self.tracker.state.lock();
        state.dts.push(dt);
        state.threads.push(current_thread_name());
    }

    fn has_active_work(&self) -> bool {
        self.remaining.map_or(true, |r| r > 0)
    }

    fn buffer_results(&self, out: &mut SolverResults) {
        out.bodies.clear();
        out.bodies.push(self.body);
        out.events.clear();
        for _ in 0..self.last_step_events {
            out.events.push(SolverEvent { code: 1, body: 0 });
        }
    }
}

impl Drop for MockSimulation {
    fn drop(&mut self) {
        self.tracker.state.lock().dropped_on = Some(current_thread_name());
    }
}

// ── Recorder ────────────────────────────────────────────────────

/// A shared, ordered log of tags.
///
/// Clone it into command closures and assert on
/// [`entries`](Recorder::entries) afterwards.
#[derive(Clone, Debug, Default)]
pub struct Recorder {
    entries: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `tag`.
    pub fn record(&self, tag: impl Into<String>) {
        self.entries.lock().push(tag.into());
    }

    /// A closure that appends `tag` when called.
    pub fn tagger(&self, tag: impl Into<String>) -> impl FnOnce() + Send + 'static {
        let this = self.clone();
        let tag = tag.into();
        move || this.record(tag)
    }

    /// Everything recorded so far.
    pub fn entries(&self) -> Vec<String> {
        self.entries.lock().clone()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether nothing has been recorded.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bounded_activity_runs_out() {
        let mut sim = MockSimulation::active_for(2);
        let tracker = sim.tracker();
        assert!(sim.has_active_work());
        sim.advance_by(0.5);
        sim.advance_by(0.5);
        assert!(!sim.has_active_work());
        assert_eq!(tracker.steps(), 2);
        assert_eq!(sim.position()[0], 1.0);

        sim.wake_for(1);
        assert!(sim.has_active_work());
    }

    #[test]
    fn results_reflect_the_body() {
        let mut sim = MockSimulation::new();
        sim.advance_by(2.0);
        let mut out = SolverResults::default();
        sim.buffer_results(&mut out);
        assert_eq!(out.bodies[0].position, [2.0, 0.0, 0.0]);
        assert_eq!(out.events.len(), 1);
    }

    #[test]
    fn tracker_sees_the_drop() {
        let sim = MockSimulation::idle();
        let tracker = sim.tracker();
        assert!(!tracker.is_dropped());
        thread::Builder::new()
            .name("dropper".into())
            .spawn(move || drop(sim))
            .unwrap()
            .join()
            .unwrap();
        assert!(tracker.is_dropped());
        assert_eq!(tracker.dropped_on().as_deref(), Some("dropper"));
    }

    #[test]
    fn recorder_keeps_order() {
        let r = Recorder::new();
        let a = r.tagger("a");
        r.record("b");
        a();
        assert_eq!(r.entries(), vec!["b", "a"]);
        assert_eq!(r.len(), 2);
    }
}
