//! `ascent-kernel` – Sequencing & Interlocks
//!
//! Decides *when* irreversible things happen.  Nothing in here talks to the
//! vessel directly: step actions are closures over whatever context the
//! runtime hands in, and gating reads go through
//! [`TelemetryView`][ascent_types::TelemetryView].
//!
//! # Modules
//!
//! - [`sequence`] – [`Sequence`][sequence::Sequence]: the staged
//!   launch/abort state machine.  One step per advance, strictly in order,
//!   abort always wins.
//! - [`preflight`] – [`Preflight`][preflight::Preflight]: a rule engine run
//!   before a sequence may start (expected tags discovered, gating telemetry
//!   flowing).

pub mod preflight;
pub mod sequence;

pub use preflight::{Preflight, PreflightRule, RequiredTags, TelemetryAvailable};
pub use sequence::{Comparison, Precondition, Sequence, SequenceState, SequenceStep};
