//! [`Sequence`] – staged launch sequence with a mutually exclusive abort
//! script.
//!
//! ```text
//!            start()                 last step done
//!   Idle ──────────────▶ Running(i) ────────────────▶ Completed
//!     │                     │
//!     │ abort()             │ abort()
//!     ▼                     ▼
//!   Aborting(0) ──▶ … ──▶ Aborting(n) ──▶ Aborted
//! ```
//!
//! Each [`Sequence::advance`] call does at most one thing: it either runs
//! the current step (if its precondition holds) or does nothing.  Steps never
//! run out of order, never run twice, and never run concurrently.  Once the
//! abort script has started no normal step runs again.
//!
//! Abort steps ignore preconditions; they run one per advance, in order.
//!
//! # Example
//!
//! ```rust
//! use std::time::Instant;
//! use ascent_kernel::sequence::{Comparison, Precondition, Sequence, SequenceState};
//! use ascent_types::TelemetryView;
//!
//! struct Altitude(f64);
//! impl TelemetryView for Altitude {
//!     fn scalar(&self, _: &str) -> Option<f64> { Some(self.0) }
//! }
//!
//! let mut log: Vec<&'static str> = Vec::new();
//! let mut seq = Sequence::new("ascent")
//!     .step("ignite", Precondition::None, |log: &mut Vec<&'static str>| {
//!         log.push("ignite");
//!         true
//!     })
//!     .step(
//!         "stage",
//!         Precondition::threshold("flight.mean_altitude", Comparison::Above, 10_000.0),
//!         |log: &mut Vec<&'static str>| { log.push("stage"); true },
//!     );
//!
//! seq.start();
//! let now = Instant::now();
//! seq.advance(&mut log, &Altitude(0.0), now);
//! seq.advance(&mut log, &Altitude(5_000.0), now);
//! assert_eq!(log, ["ignite"]);
//!
//! seq.advance(&mut log, &Altitude(12_000.0), now);
//! assert_eq!(log, ["ignite", "stage"]);
//! assert_eq!(seq.state(), SequenceState::Completed);
//! ```

use std::fmt;
use std::time::{Duration, Instant};

use ascent_types::{EventPayload, ScriptKind, TelemetryView};
use tracing::{debug, info, warn};

// ─────────────────────────────────────────────────────────────────────────────
// Preconditions
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    /// Strictly greater than the bound.
    Above,
    /// Strictly less than the bound.
    Below,
}

/// Gate evaluated once per advance against the current step.
#[derive(Debug, Clone, PartialEq)]
pub enum Precondition {
    None,
    /// Elapsed since the step became current, on the monotonic clock.
    After(Duration),
    /// Telemetry comparison.  An unavailable value never satisfies it.
    Threshold {
        path: String,
        comparison: Comparison,
        bound: f64,
    },
}

impl Precondition {
    pub fn threshold(path: impl Into<String>, comparison: Comparison, bound: f64) -> Self {
        Precondition::Threshold {
            path: path.into(),
            comparison,
            bound,
        }
    }

    pub fn is_satisfied(
        &self,
        telemetry: &dyn TelemetryView,
        current_since: Instant,
        now: Instant,
    ) -> bool {
        match self {
            Precondition::None => true,
            Precondition::After(wait) => now.saturating_duration_since(current_since) >= *wait,
            Precondition::Threshold {
                path,
                comparison,
                bound,
            } => match (telemetry.scalar(path), comparison) {
                (Some(value), Comparison::Above) => value > *bound,
                (Some(value), Comparison::Below) => value < *bound,
                (None, _) => false,
            },
        }
    }
}

impl fmt::Display for Precondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Precondition::None => write!(f, "immediately"),
            Precondition::After(d) => write!(f, "after {:.1}s", d.as_secs_f64()),
            Precondition::Threshold {
                path,
                comparison: Comparison::Above,
                bound,
            } => write!(f, "{path} > {bound}"),
            Precondition::Threshold {
                path,
                comparison: Comparison::Below,
                bound,
            } => write!(f, "{path} < {bound}"),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Steps
// ─────────────────────────────────────────────────────────────────────────────

/// Step action: runs against the runtime context and reports success.
pub type StepAction<C> = Box<dyn FnMut(&mut C) -> bool + Send>;

pub struct SequenceStep<C> {
    label: String,
    precondition: Precondition,
    action: StepAction<C>,
}

impl<C> SequenceStep<C> {
    pub fn new(
        label: impl Into<String>,
        precondition: Precondition,
        action: impl FnMut(&mut C) -> bool + Send + 'static,
    ) -> Self {
        Self {
            label: label.into(),
            precondition,
            action: Box::new(action),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn precondition(&self) -> &Precondition {
        &self.precondition
    }
}

impl<C> fmt::Debug for SequenceStep<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequenceStep")
            .field("label", &self.label)
            .field("precondition", &self.precondition)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Sequence
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceState {
    Idle,
    /// Index of the next normal step.
    Running(usize),
    Completed,
    /// Index of the next abort step.
    Aborting(usize),
    Aborted,
}

impl SequenceState {
    /// `true` once no further step of either script will run.
    pub fn is_terminal(self) -> bool {
        matches!(self, SequenceState::Completed | SequenceState::Aborted)
    }
}

pub struct Sequence<C> {
    name: String,
    steps: Vec<SequenceStep<C>>,
    abort_steps: Vec<SequenceStep<C>>,
    state: SequenceState,
    current_since: Option<Instant>,
}

impl<C> fmt::Debug for Sequence<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sequence")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("steps", &self.steps.len())
            .field("abort_steps", &self.abort_steps.len())
            .finish()
    }
}

impl<C> Sequence<C> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            abort_steps: Vec::new(),
            state: SequenceState::Idle,
            current_since: None,
        }
    }

    /// Append a normal step.
    pub fn step(
        mut self,
        label: impl Into<String>,
        precondition: Precondition,
        action: impl FnMut(&mut C) -> bool + Send + 'static,
    ) -> Self {
        self.steps.push(SequenceStep::new(label, precondition, action));
        self
    }

    /// Append an abort step.
    pub fn abort_step(
        mut self,
        label: impl Into<String>,
        action: impl FnMut(&mut C) -> bool + Send + 'static,
    ) -> Self {
        self.abort_steps
            .push(SequenceStep::new(label, Precondition::None, action));
        self
    }

    pub fn push_step(&mut self, step: SequenceStep<C>) {
        self.steps.push(step);
    }

    pub fn push_abort_step(&mut self, step: SequenceStep<C>) {
        self.abort_steps.push(step);
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> SequenceState {
        self.state
    }

    pub fn steps(&self) -> &[SequenceStep<C>] {
        &self.steps
    }

    pub fn abort_steps(&self) -> &[SequenceStep<C>] {
        &self.abort_steps
    }

    /// Label of the step that will run next, if any.
    pub fn current_label(&self) -> Option<&str> {
        match self.state {
            SequenceState::Running(i) => self.steps.get(i).map(SequenceStep::label),
            SequenceState::Aborting(i) => self.abort_steps.get(i).map(SequenceStep::label),
            _ => None,
        }
    }

    /// Every telemetry path a normal step gates on, without duplicates.
    pub fn telemetry_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = Vec::new();
        for step in &self.steps {
            if let Precondition::Threshold { path, .. } = &step.precondition {
                if !paths.contains(path) {
                    paths.push(path.clone());
                }
            }
        }
        paths
    }

    /// `Idle → Running(0)`.  No-op in any other state.
    pub fn start(&mut self) -> bool {
        self.start_at(Instant::now())
    }

    /// [`start`][Self::start] with an explicit clock reading for the first
    /// step's elapsed-time gate.
    pub fn start_at(&mut self, now: Instant) -> bool {
        if self.state != SequenceState::Idle {
            debug!(sequence = %self.name, state = ?self.state, "start ignored");
            return false;
        }
        self.state = SequenceState::Running(0);
        self.current_since = Some(now);
        info!(sequence = %self.name, steps = self.steps.len(), "sequence started");
        true
    }

    /// Cancel the remaining normal steps and switch to the abort script.
    ///
    /// Accepted from `Idle` and `Running`; returns the `AbortStarted` event
    /// when accepted, `None` otherwise.
    pub fn abort(&mut self, reason: impl Into<String>) -> Option<EventPayload> {
        let reason = reason.into();
        match self.state {
            SequenceState::Idle | SequenceState::Running(_) => {
                let skipped = match self.state {
                    SequenceState::Running(i) => self.steps.len().saturating_sub(i),
                    _ => self.steps.len(),
                };
                warn!(
                    sequence = %self.name,
                    reason = %reason,
                    skipped_steps = skipped,
                    "ABORT"
                );
                self.state = SequenceState::Aborting(0);
                self.current_since = None;
                Some(EventPayload::AbortStarted { reason })
            }
            state => {
                debug!(sequence = %self.name, ?state, reason = %reason, "abort ignored");
                None
            }
        }
    }

    /// Evaluate the current step once and run it if its gate is open.
    ///
    /// Returns the events produced by this advance (possibly none).
    pub fn advance(
        &mut self,
        ctx: &mut C,
        telemetry: &dyn TelemetryView,
        now: Instant,
    ) -> Vec<EventPayload> {
        let mut events = Vec::new();
        match self.state {
            SequenceState::Running(index) => {
                let Some(step) = self.steps.get_mut(index) else {
                    self.finish_normal(&mut events);
                    return events;
                };
                let since = *self.current_since.get_or_insert(now);
                if !step.precondition.is_satisfied(telemetry, since, now) {
                    return events;
                }
                let succeeded = (step.action)(ctx);
                log_step(&self.name, ScriptKind::Normal, index, &step.label, succeeded);
                events.push(EventPayload::StepExecuted {
                    script: ScriptKind::Normal,
                    index,
                    label: step.label.clone(),
                    succeeded,
                });

                if index + 1 >= self.steps.len() {
                    self.finish_normal(&mut events);
                } else {
                    self.state = SequenceState::Running(index + 1);
                    self.current_since = Some(now);
                }
            }
            SequenceState::Aborting(index) => {
                if let Some(step) = self.abort_steps.get_mut(index) {
                    let succeeded = (step.action)(ctx);
                    log_step(&self.name, ScriptKind::Abort, index, &step.label, succeeded);
                    events.push(EventPayload::StepExecuted {
                        script: ScriptKind::Abort,
                        index,
                        label: step.label.clone(),
                        succeeded,
                    });
                }
                if index + 1 >= self.abort_steps.len() {
                    self.state = SequenceState::Aborted;
                    info!(sequence = %self.name, "abort sequence complete");
                    events.push(EventPayload::AbortCompleted);
                } else {
                    self.state = SequenceState::Aborting(index + 1);
                }
            }
            SequenceState::Idle | SequenceState::Completed | SequenceState::Aborted => {}
        }
        events
    }

    fn finish_normal(&mut self, events: &mut Vec<EventPayload>) {
        self.state = SequenceState::Completed;
        self.current_since = None;
        info!(sequence = %self.name, "sequence complete");
        events.push(EventPayload::SequenceCompleted);
    }
}

fn log_step(sequence: &str, script: ScriptKind, index: usize, label: &str, succeeded: bool) {
    if succeeded {
        info!(sequence, ?script, index, step = label, "step executed");
    } else {
        warn!(sequence, ?script, index, step = label, "step executed, action failed");
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    const ALT: &str = "flight.mean_altitude";

    #[derive(Default)]
    struct Telemetry(HashMap<String, f64>);

    impl Telemetry {
        fn with(path: &str, v: f64) -> Self {
            Self(HashMap::from([(path.to_string(), v)]))
        }
    }

    impl TelemetryView for Telemetry {
        fn scalar(&self, path: &str) -> Option<f64> {
            self.0.get(path).copied()
        }
    }

    /// Context that records which step labels ran.
    type Spy = Vec<String>;

    fn record(label: &'static str) -> impl FnMut(&mut Spy) -> bool + Send + 'static {
        move |spy: &mut Spy| {
            spy.push(label.to_string());
            true
        }
    }

    fn six_step() -> Sequence<Spy> {
        let mut seq = Sequence::new("six");
        for label in ["s1", "s2", "s3", "s4", "s5", "s6"] {
            seq = seq.step(label, Precondition::None, record(label));
        }
        seq.abort_step("cut", record("cut"))
            .abort_step("safe", record("safe"))
    }

    #[test]
    fn start_only_from_idle() {
        let mut seq = six_step();
        assert!(seq.start());
        assert_eq!(seq.state(), SequenceState::Running(0));
        assert!(!seq.start());
    }

    #[test]
    fn advance_runs_one_step_at_a_time() {
        let mut seq = six_step();
        let mut spy = Spy::new();
        let t = Telemetry::default();
        let now = Instant::now();

        // Idle: nothing runs.
        assert!(seq.advance(&mut spy, &t, now).is_empty());
        assert!(spy.is_empty());

        seq.start();
        for expected in 1..=6 {
            seq.advance(&mut spy, &t, now);
            assert_eq!(spy.len(), expected);
        }
        assert_eq!(spy, ["s1", "s2", "s3", "s4", "s5", "s6"]);
        assert_eq!(seq.state(), SequenceState::Completed);

        seq.advance(&mut spy, &t, now);
        assert_eq!(spy.len(), 6);
    }

    #[test]
    fn abort_after_step_two_skips_the_rest() {
        let mut seq = six_step();
        let mut spy = Spy::new();
        let t = Telemetry::default();
        let now = Instant::now();

        seq.start();
        seq.advance(&mut spy, &t, now);
        seq.advance(&mut spy, &t, now);
        assert_eq!(spy, ["s1", "s2"]);

        let event = seq.abort("engine out");
        assert_eq!(
            event,
            Some(EventPayload::AbortStarted {
                reason: "engine out".into()
            })
        );
        assert_eq!(seq.state(), SequenceState::Aborting(0));

        for _ in 0..10 {
            seq.advance(&mut spy, &t, now);
        }
        assert_eq!(spy, ["s1", "s2", "cut", "safe"]);
        assert_eq!(seq.state(), SequenceState::Aborted);
    }

    #[test]
    fn abort_steps_run_one_per_advance() {
        let mut seq = six_step();
        let mut spy = Spy::new();
        let t = Telemetry::default();
        let now = Instant::now();

        seq.abort("scrub");
        let first = seq.advance(&mut spy, &t, now);
        assert_eq!(spy, ["cut"]);
        assert_eq!(first.len(), 1);
        assert_eq!(seq.state(), SequenceState::Aborting(1));

        let second = seq.advance(&mut spy, &t, now);
        assert_eq!(spy, ["cut", "safe"]);
        assert_eq!(second.last(), Some(&EventPayload::AbortCompleted));
    }

    #[test]
    fn abort_is_refused_once_terminal_or_already_aborting() {
        let mut seq: Sequence<Spy> = Sequence::new("empty");
        let mut spy = Spy::new();
        seq.start();
        seq.advance(&mut spy, &Telemetry::default(), Instant::now());
        assert_eq!(seq.state(), SequenceState::Completed);
        assert!(seq.abort("late").is_none());

        let mut seq = six_step();
        assert!(seq.abort("first").is_some());
        assert!(seq.abort("second").is_none());
    }

    #[test]
    fn empty_abort_script_terminates_on_next_advance() {
        let mut seq: Sequence<Spy> =
            Sequence::new("bare").step("s1", Precondition::None, record("s1"));
        let mut spy = Spy::new();
        seq.start();
        seq.abort("test");
        let events = seq.advance(&mut spy, &Telemetry::default(), Instant::now());
        assert_eq!(events, vec![EventPayload::AbortCompleted]);
        assert!(spy.is_empty());
        assert!(seq.state().is_terminal());
    }

    #[test]
    fn altitude_gates_fire_in_order_once_each() {
        let mut seq = Sequence::new("ascent")
            .step(
                "stage 1 sep",
                Precondition::threshold(ALT, Comparison::Above, 10_000.0),
                record("sep1"),
            )
            .step(
                "fairing",
                Precondition::threshold(ALT, Comparison::Above, 35_000.0),
                record("fairing"),
            )
            .step(
                "stage 2 sep",
                Precondition::threshold(ALT, Comparison::Above, 70_000.0),
                record("sep2"),
            )
            .step(
                "antenna",
                Precondition::threshold(ALT, Comparison::Above, 100_000.0),
                record("antenna"),
            );
        let mut spy = Spy::new();
        let now = Instant::now();
        seq.start();

        let profile = [
            (0.0, 0),
            (12_000.0, 1),
            (36_000.0, 2),
            (71_000.0, 3),
            (101_000.0, 4),
        ];
        for (altitude, fired) in profile {
            let t = Telemetry::with(ALT, altitude);
            for _ in 0..5 {
                seq.advance(&mut spy, &t, now);
            }
            assert_eq!(spy.len(), fired, "at altitude {altitude}");
        }
        assert_eq!(spy, ["sep1", "fairing", "sep2", "antenna"]);
        assert_eq!(seq.state(), SequenceState::Completed);
    }

    #[test]
    fn missing_telemetry_never_satisfies_a_threshold() {
        let below = Precondition::threshold(ALT, Comparison::Below, 1.0e9);
        let now = Instant::now();
        assert!(!below.is_satisfied(&Telemetry::default(), now, now));
        assert!(below.is_satisfied(&Telemetry::with(ALT, 0.0), now, now));
    }

    #[test]
    fn after_is_measured_from_when_the_step_became_current() {
        let t0 = Instant::now();
        let mut seq = Sequence::new("timed")
            .step("ignite", Precondition::None, record("ignite"))
            .step("release", Precondition::After(Duration::from_secs(3)), record("release"));
        let mut spy = Spy::new();
        let t = Telemetry::default();

        seq.start_at(t0);
        // "ignite" runs at t0 + 10s; the release timer starts then.
        seq.advance(&mut spy, &t, t0 + Duration::from_secs(10));
        seq.advance(&mut spy, &t, t0 + Duration::from_secs(12));
        assert_eq!(spy, ["ignite"]);

        seq.advance(&mut spy, &t, t0 + Duration::from_secs(13));
        assert_eq!(spy, ["ignite", "release"]);
    }

    #[test]
    fn failed_action_still_advances_and_is_reported() {
        let mut seq: Sequence<Spy> = Sequence::new("flaky")
            .step("bad", Precondition::None, |_: &mut Spy| false)
            .step("next", Precondition::None, record("next"));
        let mut spy = Spy::new();
        seq.start();
        let events = seq.advance(&mut spy, &Telemetry::default(), Instant::now());
        assert_eq!(
            events,
            vec![EventPayload::StepExecuted {
                script: ScriptKind::Normal,
                index: 0,
                label: "bad".into(),
                succeeded: false
            }]
        );
        assert_eq!(seq.state(), SequenceState::Running(1));
    }

    #[test]
    fn telemetry_paths_are_deduplicated() {
        let seq: Sequence<Spy> = Sequence::new("paths")
            .step("a", Precondition::threshold(ALT, Comparison::Above, 1.0), record("a"))
            .step("b", Precondition::threshold(ALT, Comparison::Above, 2.0), record("b"))
            .step(
                "c",
                Precondition::threshold("flight.vertical_speed", Comparison::Below, 0.0),
                record("c"),
            )
            .step("d", Precondition::After(Duration::from_secs(1)), record("d"));
        assert_eq!(
            seq.telemetry_paths(),
            vec![ALT.to_string(), "flight.vertical_speed".to_string()]
        );
    }

    #[test]
    fn precondition_display() {
        assert_eq!(
            Precondition::threshold(ALT, Comparison::Above, 10000.0).to_string(),
            "flight.mean_altitude > 10000"
        );
        assert_eq!(Precondition::After(Duration::from_millis(2500)).to_string(), "after 2.5s");
    }
}
