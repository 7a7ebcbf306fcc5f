//! [`FlightComputer`] – the fixed-cadence control cycle.
//!
//! Each [`tick`][FlightComputer::tick]:
//!
//! 1. **Telemetry** – drain pushed values into the channel cache and publish
//!    channel health changes on [`Topic::Alerts`].
//! 2. **Intents** – apply every queued operator request.  An abort in the
//!    batch wins over a start in the same batch.
//! 3. **Registry** – refresh the component set and re-pull component state,
//!    at most once per `refresh_interval`.
//! 4. **Hold loops** – reload tuning, step every loop whose measurement is
//!    available and apply the resulting actuator command, with manual
//!    overrides taking precedence.
//! 5. **Sequence** – advance the launch or abort script once and publish its
//!    events on [`Topic::Sequence`].
//!
//! Nothing in the cycle returns early on a remote failure.  Actions are fire
//! and forget; failures are logged by the control surfaces and surface as
//! `succeeded: false` on the step events.
//!
//! Hold loops stand down for good once the abort script starts, so they
//! cannot fight the abort steps for the throttle.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use ascent_hal::SimVessel;
//! use ascent_runtime::{AscentProfile, FlightComputer, FlightComputerConfig};
//!
//! let sim = Arc::new(SimVessel::two_stage_rocket());
//! let profile = AscentProfile::two_stage().unwrap().compile().unwrap();
//! let mut computer = FlightComputer::from_profile(sim, profile, FlightComputerConfig::default());
//!
//! let operator = computer.operator();
//! operator.start_sequence();
//! computer.poller().poll_once();
//! computer.tick();
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ascent_hal::ComponentRegistry;
use ascent_kernel::{Preflight, Sequence, SequenceState};
use ascent_link::{ChannelHandle, EventBus, TelemetryManager, TelemetryPoller, Topic, VesselLink};
use ascent_types::{AscentError, Event, EventPayload, Intent, OverrideChannel};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::hold::{ActuatorCommand, HoldLoop};
use crate::operator::OperatorHandle;
use crate::profile::CompiledProfile;
use crate::tuning::{self, MemoryTuningStore, TuningStore};

const EVENT_SOURCE: &str = "ascent-runtime::flight_computer";

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct FlightComputerConfig {
    /// Period of one control cycle.
    pub cycle_period: Duration,
    /// Minimum spacing of registry refreshes.
    pub refresh_interval: Duration,
    /// Period of the background telemetry poller.
    pub poll_period: Duration,
    /// Mark channels unhealthy after this long without a good value.
    pub stale_after: Option<Duration>,
    /// Leave [`FlightComputer::run`] once the sequence is completed or
    /// aborted.
    pub stop_when_finished: bool,
}

impl Default for FlightComputerConfig {
    fn default() -> Self {
        Self {
            cycle_period: Duration::from_millis(50),
            refresh_interval: Duration::from_millis(100),
            poll_period: Duration::from_millis(50),
            stale_after: None,
            stop_when_finished: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// FlightComputer
// ─────────────────────────────────────────────────────────────────────────────

struct LoopSlot {
    hold: Box<dyn HoldLoop>,
    channel: ChannelHandle,
    /// When this loop last stepped; a skipped cycle does not count.
    last_step: Option<Instant>,
}

pub struct FlightComputer {
    config: FlightComputerConfig,
    telemetry: TelemetryManager,
    registry: ComponentRegistry,
    sequence: Sequence<ComponentRegistry>,
    /// Keeps the channels the sequence and preflight read open.
    _gate_channels: Vec<ChannelHandle>,
    preflight: Preflight,
    loops: Vec<LoopSlot>,
    tuning: Arc<dyn TuningStore>,
    bus: EventBus,
    intents_tx: mpsc::UnboundedSender<Intent>,
    intents_rx: mpsc::UnboundedReceiver<Intent>,
    overrides: HashMap<OverrideChannel, f64>,
    loop_command: Option<ActuatorCommand>,
    applied_throttle: Option<f64>,
    applied_brakes: Option<bool>,
    last_refresh: Option<Instant>,
}

impl FlightComputer {
    pub fn new(
        link: Arc<dyn VesselLink>,
        sequence: Sequence<ComponentRegistry>,
        config: FlightComputerConfig,
    ) -> Self {
        let mut telemetry = TelemetryManager::new();
        if let Some(window) = config.stale_after {
            telemetry = telemetry.with_stale_after(window);
        }
        let gate_channels: Vec<ChannelHandle> = sequence
            .telemetry_paths()
            .iter()
            .map(|path| telemetry.subscribe(path))
            .collect();
        let (intents_tx, intents_rx) = mpsc::unbounded_channel();

        Self {
            config,
            telemetry,
            registry: ComponentRegistry::new(link),
            sequence,
            _gate_channels: gate_channels,
            preflight: Preflight::new(),
            loops: Vec::new(),
            tuning: Arc::new(MemoryTuningStore::new()),
            bus: EventBus::default(),
            intents_tx,
            intents_rx,
            overrides: HashMap::new(),
            loop_command: None,
            applied_throttle: None,
            applied_brakes: None,
            last_refresh: None,
        }
    }

    /// Build from a compiled profile, including its preflight rules.
    pub fn from_profile(
        link: Arc<dyn VesselLink>,
        profile: CompiledProfile,
        config: FlightComputerConfig,
    ) -> Self {
        let preflight = profile.preflight();
        let mut computer = Self::new(link, profile.sequence, config).with_preflight(preflight);
        for path in &profile.required_telemetry {
            let handle = computer.telemetry.subscribe(path);
            computer._gate_channels.push(handle);
        }
        computer
    }

    pub fn with_preflight(mut self, preflight: Preflight) -> Self {
        self.preflight = preflight;
        self
    }

    /// Replace the tuning store.  Call before adding loops so their defaults
    /// are seeded into the new store.
    pub fn with_tuning(mut self, store: Arc<dyn TuningStore>) -> Self {
        self.tuning = store;
        self
    }

    pub fn with_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    /// Register a hold loop and subscribe to its measurement.
    pub fn with_loop(mut self, hold: impl HoldLoop + 'static) -> Self {
        tuning::seed_defaults(self.tuning.as_ref(), hold.name(), hold.controller().config());
        let channel = self.telemetry.subscribe(hold.measurement_path());
        info!(
            loop_name = hold.name(),
            measurement = hold.measurement_path(),
            "hold loop registered"
        );
        self.loops.push(LoopSlot {
            hold: Box::new(hold),
            channel,
            last_step: None,
        });
        self
    }

    // ── Accessors ─────────────────────────────────────────────────────────

    pub fn operator(&self) -> OperatorHandle {
        OperatorHandle::new(self.intents_tx.clone())
    }

    pub fn bus(&self) -> EventBus {
        self.bus.clone()
    }

    pub fn config(&self) -> &FlightComputerConfig {
        &self.config
    }

    pub fn telemetry(&self) -> &TelemetryManager {
        &self.telemetry
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    pub fn sequence(&self) -> &Sequence<ComponentRegistry> {
        &self.sequence
    }

    pub fn sequence_state(&self) -> SequenceState {
        self.sequence.state()
    }

    pub fn tuning(&self) -> &Arc<dyn TuningStore> {
        &self.tuning
    }

    pub fn manual_override(&self, channel: OverrideChannel) -> Option<f64> {
        self.overrides.get(&channel).copied()
    }

    /// Poller feeding this computer's telemetry channels.
    pub fn poller(&self) -> TelemetryPoller {
        TelemetryPoller::new(Arc::clone(self.registry.link()), &self.telemetry)
    }

    // ── Operator actions ──────────────────────────────────────────────────

    /// Run preflight and start the sequence.
    ///
    /// Returns `Ok(false)` when the sequence is not idle.  A failed preflight
    /// is published as [`EventPayload::PreflightFailed`] and returned.
    pub fn try_start_sequence(&mut self) -> Result<bool, AscentError> {
        self.try_start_sequence_at(Instant::now())
    }

    pub fn try_start_sequence_at(&mut self, now: Instant) -> Result<bool, AscentError> {
        if self.sequence.state() != SequenceState::Idle {
            debug!(state = ?self.sequence.state(), "start request ignored");
            return Ok(false);
        }

        // Check the wiring against the vessel as it is now.
        self.refresh_registry(now);

        if let Err(error) = self.preflight.verify(&self.registry, &self.telemetry) {
            let missing = match &error {
                AscentError::DiscoveryMismatch { missing } => missing.clone(),
                AscentError::TransientTelemetry { path } => vec![path.clone()],
                other => vec![other.to_string()],
            };
            self.publish(Topic::Alerts, EventPayload::PreflightFailed { missing });
            return Err(error);
        }
        Ok(self.sequence.start_at(now))
    }

    /// Switch to the abort script.  Ignored once the sequence is finished or
    /// already aborting.
    pub fn abort(&mut self, reason: impl Into<String>) -> bool {
        match self.sequence.abort(reason) {
            Some(payload) => {
                self.loop_command = None;
                self.publish(Topic::Alerts, payload.clone());
                self.publish(Topic::Sequence, payload);
                true
            }
            None => false,
        }
    }

    pub fn set_manual_override(&mut self, channel: OverrideChannel, value: Option<f64>) {
        let value = value.filter(|v| v.is_finite()).map(|v| match channel {
            OverrideChannel::Throttle => v.clamp(0.0, 1.0),
            OverrideChannel::Brakes => v,
        });
        let previous = match value {
            Some(v) => self.overrides.insert(channel, v),
            None => self.overrides.remove(&channel),
        };
        if previous == value {
            return;
        }
        match value {
            Some(v) => info!(?channel, value = v, "manual override engaged"),
            None => {
                info!(?channel, "manual override released");
                // Let the loops re-assert the channel on the next cycle.
                match channel {
                    OverrideChannel::Throttle => self.applied_throttle = None,
                    OverrideChannel::Brakes => self.applied_brakes = None,
                }
            }
        }
        self.publish(Topic::Alerts, EventPayload::OverrideChanged { channel, value });
    }

    // ── Cycle ─────────────────────────────────────────────────────────────

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    /// One control cycle against an explicit clock reading.
    pub fn tick_at(&mut self, now: Instant) {
        for transition in self.telemetry.drain_at(now) {
            self.publish(
                Topic::Alerts,
                EventPayload::ChannelHealth {
                    path: transition.path,
                    healthy: transition.healthy,
                },
            );
        }

        self.apply_intents(now);

        let refresh_due = self
            .last_refresh
            .is_none_or(|last| now.saturating_duration_since(last) >= self.config.refresh_interval);
        if refresh_due {
            self.refresh_registry(now);
        }

        self.step_loops(now);
        self.apply_actuators();

        let events = self.sequence.advance(&mut self.registry, &self.telemetry, now);
        for payload in events {
            self.publish(Topic::Sequence, payload);
        }
    }

    /// Drive [`tick`][Self::tick] every `cycle_period` until `shutdown`
    /// flips to `true` (or its sender is dropped).  Telemetry is polled on a
    /// separate task for the duration of the run.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) -> Self {
        let poller = self.poller().spawn(self.config.poll_period);
        let mut interval = tokio::time::interval(self.config.cycle_period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            sequence = %self.sequence.name(),
            cycle_ms = self.config.cycle_period.as_millis() as u64,
            "flight computer running"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    self.tick();
                    if self.config.stop_when_finished && self.sequence.state().is_terminal() {
                        break;
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        poller.abort();
        info!(state = ?self.sequence.state(), "flight computer stopped");
        self
    }

    /// Close every telemetry channel.
    pub fn shutdown(&mut self) {
        self.telemetry.shutdown();
    }

    // ── Internals ─────────────────────────────────────────────────────────

    fn apply_intents(&mut self, now: Instant) {
        let mut batch = Vec::new();
        while let Ok(intent) = self.intents_rx.try_recv() {
            batch.push(intent);
        }
        if batch.is_empty() {
            return;
        }

        let abort_reason = batch.iter().find_map(|intent| match intent {
            Intent::Abort { reason } => Some(reason.clone()),
            _ => None,
        });

        for intent in batch {
            match intent {
                Intent::SetManualOverride { channel, value } => {
                    self.set_manual_override(channel, value);
                }
                Intent::StartSequence if abort_reason.is_some() => {
                    warn!("start request dropped, abort requested in the same cycle");
                }
                Intent::StartSequence => {
                    if let Err(error) = self.try_start_sequence_at(now) {
                        warn!(%error, "sequence start refused");
                    }
                }
                Intent::Abort { .. } => {}
            }
        }

        if let Some(reason) = abort_reason {
            self.abort(reason);
        }
    }

    fn refresh_registry(&mut self, now: Instant) {
        self.registry.refresh();
        self.registry.update_all_states();
        self.last_refresh = Some(now);
    }

    fn step_loops(&mut self, now: Instant) {
        if self.loops.is_empty() {
            return;
        }
        if matches!(
            self.sequence.state(),
            SequenceState::Aborting(_) | SequenceState::Aborted
        ) {
            return;
        }

        if let Err(error) = self.tuning.reload() {
            warn!(%error, "tuning reload failed, keeping last gains");
        }

        let mut command = self.loop_command;
        for slot in &mut self.loops {
            let name = slot.hold.name().to_string();
            let config = tuning::loop_config(
                self.tuning.as_ref(),
                &name,
                slot.hold.controller().config(),
            );
            slot.hold.controller_mut().set_config(config);

            let Some(measurement) = self.telemetry.read_scalar(&slot.channel) else {
                debug!(
                    loop_name = %name,
                    path = slot.channel.path(),
                    "measurement unavailable, loop skipped"
                );
                continue;
            };

            let dt = slot
                .last_step
                .map_or(self.config.cycle_period, |last| {
                    now.saturating_duration_since(last)
                })
                .as_secs_f64();
            slot.last_step = Some(now);

            let next = slot.hold.step(measurement, dt);
            let error = slot.hold.controller().error();
            let output = slot.hold.controller().last_output();
            tuning::publish_output(self.tuning.as_ref(), &name, error, output);
            debug!(loop_name = %name, measurement, error, output, "loop stepped");

            command = Some(match command {
                Some(previous) => ActuatorCommand {
                    throttle: next.throttle,
                    brakes: next.brakes.or(previous.brakes),
                },
                None => next,
            });
            publish_on(
                &self.bus,
                Topic::Telemetry,
                EventPayload::LoopOutput {
                    name,
                    error,
                    output,
                },
            );
        }
        self.loop_command = command;
    }

    /// Send the desired throttle and brakes when they differ from what was
    /// last applied.  A failed send is retried next cycle.
    fn apply_actuators(&mut self) {
        let throttle = self
            .overrides
            .get(&OverrideChannel::Throttle)
            .copied()
            .or(self.loop_command.map(|c| c.throttle));
        let brakes = self
            .overrides
            .get(&OverrideChannel::Brakes)
            .map(|v| *v >= 0.5)
            .or(self.loop_command.and_then(|c| c.brakes));

        if let Some(throttle) = throttle {
            if self.applied_throttle != Some(throttle)
                && self.registry.vessel().set_throttle(throttle)
            {
                self.applied_throttle = Some(throttle);
            }
        }
        if let Some(brakes) = brakes {
            if self.applied_brakes != Some(brakes) && self.registry.vessel().set_brakes(brakes) {
                self.applied_brakes = Some(brakes);
            }
        }
    }

    fn publish(&self, topic: Topic, payload: EventPayload) {
        publish_on(&self.bus, topic, payload);
    }
}

fn publish_on(bus: &EventBus, topic: Topic, payload: EventPayload) {
    bus.publish_to(topic, Event::new(EVENT_SOURCE, payload));
}
