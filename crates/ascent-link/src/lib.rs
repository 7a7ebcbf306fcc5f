//! `ascent-link` – The Vessel Link
//!
//! Everything that touches the remote vessel passes through this crate.  The
//! transport itself is an external collaborator; the core only depends on the
//! [`VesselLink`] trait.
//!
//! # Modules
//!
//! - [`link`] – [`VesselLink`]: the three capability surfaces the core
//!   consumes (property reads, action invocation, component enumeration).
//! - [`telemetry`] – [`TelemetryManager`]: reference-counted channels that
//!   cache the latest pushed value per property path and track channel
//!   health.  Reads never block and never reach the transport.
//! - [`poller`] – [`TelemetryPoller`]: the background push path for
//!   transports without native streams.
//! - [`bus`] – topic-based broadcast bus carrying flight events to
//!   dashboards and loggers.

pub mod bus;
pub mod link;
pub mod poller;
pub mod telemetry;

pub use bus::{EventBus, Topic, TopicReceiver};
pub use link::VesselLink;
pub use poller::TelemetryPoller;
pub use telemetry::{
    ChannelHandle, ChannelUpdate, HealthTransition, SubscriptionSet, TelemetryManager, UpdateSink,
};
