//! `ascent-hal` – Vessel Hardware Abstraction Layer
//!
//! Turns the flat, string-typed remote part tree into typed components the
//! flight computer can reason about.
//!
//! # Modules
//!
//! - [`parse`] – lenient numeric/boolean parsing of remote field strings.
//! - [`component`] – [`Component`]: capability inference and per-kind state.
//! - [`control`] – typed action surfaces (engines, decouplers, fairings,
//!   probe cores, antennas, solar panels, launch clamps).
//! - [`vessel`] – [`VesselControl`]: vessel-wide throttle, staging, brakes
//!   and SAS.
//! - [`registry`] – [`ComponentRegistry`]: discovery, refresh and lookup by
//!   tag or capability.
//! - [`pid`] – [`PidController`]: bounded PID with saturation-gated integral
//!   and bumpless set-point changes.
//! - [`sim`] – [`SimVessel`]: in-process [`VesselLink`][ascent_link::VesselLink]
//!   for tests and headless demos.

pub mod component;
pub mod control;
pub mod parse;
pub mod pid;
pub mod registry;
pub mod sim;
pub mod vessel;

pub use component::{Component, ComponentState, Latch};
pub use pid::{PidConfig, PidController, PidGains};
pub use registry::{ComponentHandle, ComponentRegistry};
pub use sim::SimVessel;
pub use vessel::VesselControl;
