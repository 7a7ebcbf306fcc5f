//! `ascent-runtime` – The Flight Computer
//!
//! Wires telemetry, the component registry, the hold loops and the launch
//! sequence into one fixed-cadence control cycle.
//!
//! # Modules
//!
//! - [`flight_computer`] – [`FlightComputer`][flight_computer::FlightComputer]:
//!   the cycle orchestrator.  Each tick applies queued operator intents,
//!   drains telemetry, refreshes the registry, steps every hold loop and
//!   advances the sequence once.
//! - [`operator`] – [`OperatorHandle`][operator::OperatorHandle]: the only
//!   way other threads reach the cycle.  It enqueues intents; it never
//!   touches the vessel.
//! - [`hold`] – [`HoldLoop`][hold::HoldLoop] with the altitude-hold and
//!   vertical-velocity-hold instantiations of the PID controller.
//! - [`tuning`] – [`TuningStore`][tuning::TuningStore]: live gains and
//!   set-points, kept in memory or in a TOML file reloaded on change.
//! - [`profile`] – [`AscentProfile`][profile::AscentProfile]: TOML ascent
//!   scripts compiled into a [`Sequence`][ascent_kernel::Sequence] and its
//!   preflight rules.
//! - [`observability`] – [`init_tracing`][observability::init_tracing]:
//!   global `tracing` subscriber with an optional OTLP span exporter.

pub mod flight_computer;
pub mod hold;
pub mod observability;
pub mod operator;
pub mod profile;
pub mod tuning;

pub use flight_computer::{FlightComputer, FlightComputerConfig};
pub use hold::{ActuatorCommand, AltitudeHold, HoldLoop, VelocityHold};
pub use observability::{init_tracing, TracerProviderGuard};
pub use operator::OperatorHandle;
pub use profile::{AscentProfile, CompiledProfile};
pub use tuning::{MemoryTuningStore, TomlTuningStore, TuningStore};
