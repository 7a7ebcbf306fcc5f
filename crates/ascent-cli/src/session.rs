//! Wiring of one flight: simulator, physics, flight computer and the event
//! printer, all on the tokio runtime.

use std::sync::Arc;
use std::time::Duration;

use ascent_hal::{PidConfig, SimVessel};
use ascent_link::{EventBus, Topic, TopicReceiver};
use ascent_runtime::{
    AltitudeHold, AscentProfile, FlightComputer, MemoryTuningStore, OperatorHandle, TomlTuningStore,
    TuningStore, VelocityHold,
};
use ascent_types::{AscentError, Event, EventPayload, ScriptKind};
use colored::Colorize;
use tokio::runtime::Handle;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::info;

use crate::config::{Config, HoldMode};
use crate::demo;

/// Build the flight computer described by `cfg` against `sim`.
pub fn build_computer(
    cfg: &Config,
    sim: Arc<SimVessel>,
    stop_when_finished: bool,
) -> Result<FlightComputer, AscentError> {
    let profile = match &cfg.profile_file {
        Some(path) => AscentProfile::load(path)?,
        None => AscentProfile::two_stage()?,
    };
    info!(profile = %profile.name, steps = profile.steps.len(), "profile loaded");

    let tuning: Arc<dyn TuningStore> = match &cfg.tuning_file {
        Some(path) => Arc::new(TomlTuningStore::open(path)),
        None => Arc::new(MemoryTuningStore::new()),
    };

    let mut fc_config = cfg.flight_computer();
    fc_config.stop_when_finished = stop_when_finished;

    let computer =
        FlightComputer::from_profile(sim, profile.compile()?, fc_config).with_tuning(tuning);
    Ok(match cfg.hold {
        HoldMode::None => computer,
        HoldMode::Velocity => computer.with_loop(VelocityHold::default()),
        HoldMode::Altitude => computer.with_loop(AltitudeHold::new(PidConfig {
            setpoint: 1000.0,
            ..PidConfig::default()
        })),
    })
}

pub struct Session {
    pub sim: Arc<SimVessel>,
    pub operator: OperatorHandle,
    shutdown_tx: Arc<watch::Sender<bool>>,
    flight: JoinHandle<FlightComputer>,
    physics: JoinHandle<()>,
    printer: JoinHandle<()>,
}

impl Session {
    /// Spawn the flight onto `runtime`.
    pub fn launch(cfg: &Config, runtime: &Handle, headless: bool) -> Result<Self, AscentError> {
        let sim = Arc::new(SimVessel::two_stage_rocket());
        let computer = build_computer(cfg, Arc::clone(&sim), headless)?;
        let operator = computer.operator();
        let bus = computer.bus();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let _guard = runtime.enter();
        let physics = demo::spawn(Arc::clone(&sim), Duration::from_millis(20), shutdown_rx.clone());
        let printer = spawn_printer(&bus, shutdown_rx.clone());
        let flight = runtime.spawn(computer.run(shutdown_rx));

        Ok(Self {
            sim,
            operator,
            shutdown_tx: Arc::new(shutdown_tx),
            flight,
            physics,
            printer,
        })
    }

    /// A handle that stops the whole session.
    pub fn shutdown_handle(&self) -> Arc<watch::Sender<bool>> {
        Arc::clone(&self.shutdown_tx)
    }

    pub fn is_finished(&self) -> bool {
        self.flight.is_finished()
    }

    /// Stop every task and hand back the flight computer.
    pub async fn finish(self) -> Option<FlightComputer> {
        self.shutdown_tx.send_replace(true);
        let computer = self.flight.await.ok();
        let _ = self.physics.await;
        let _ = self.printer.await;
        computer.map(|mut computer| {
            computer.shutdown();
            computer
        })
    }
}

fn spawn_printer(bus: &EventBus, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    let mut sequence = bus.subscribe_to(Topic::Sequence);
    let mut alerts = bus.subscribe_to(Topic::Alerts);
    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = next(&mut sequence) => match event {
                    Some(event) => print_event(&event),
                    None => break,
                },
                event = next(&mut alerts) => match event {
                    Some(event) => print_event(&event),
                    None => break,
                },
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
    })
}

/// Next event, skipping over lag.  `None` once the bus is gone.
async fn next(rx: &mut TopicReceiver) -> Option<Event> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(broadcast::error::RecvError::Lagged(_)) => continue,
            Err(broadcast::error::RecvError::Closed) => return None,
        }
    }
}

fn print_event(event: &Event) {
    if let Some(line) = format_event(&event.payload) {
        println!("{line}");
    }
}

/// One console line per operator-relevant event.
pub fn format_event(payload: &EventPayload) -> Option<String> {
    let line = match payload {
        EventPayload::StepExecuted {
            script,
            index,
            label,
            succeeded,
        } => {
            let prefix = match script {
                ScriptKind::Normal => "step".cyan(),
                ScriptKind::Abort => "abort step".yellow(),
            };
            let status = if *succeeded { "ok".green() } else { "failed".red() };
            format!("  {prefix} {}: {label} [{status}]", index + 1)
        }
        EventPayload::SequenceCompleted => format!("  {}", "Sequence completed.".green().bold()),
        EventPayload::AbortStarted { reason } => {
            format!("  {} {reason}", "ABORT:".red().bold())
        }
        EventPayload::AbortCompleted => format!("  {}", "Abort script completed.".yellow().bold()),
        EventPayload::PreflightFailed { missing } => format!(
            "  {} missing {}",
            "Preflight failed:".red(),
            missing.join(", ")
        ),
        EventPayload::ChannelHealth { path, healthy } => {
            let status = if *healthy { "healthy".green() } else { "unhealthy".red() };
            format!("  telemetry {path} {status}")
        }
        EventPayload::OverrideChanged { channel, value } => match value {
            Some(v) => format!("  override {channel:?} = {v}"),
            None => format!("  override {channel:?} released"),
        },
        EventPayload::LoopOutput { .. } => return None,
    };
    Some(line)
}
