use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Well-known telemetry property paths served by the vessel link.
pub mod paths {
    /// Mean altitude above sea level, metres.
    pub const MEAN_ALTITUDE: &str = "flight.mean_altitude";
    /// Vertical speed relative to the surface, m/s (positive = climbing).
    pub const VERTICAL_SPEED: &str = "flight.vertical_speed";
    /// Surface-relative speed, m/s.
    pub const SURFACE_SPEED: &str = "flight.surface_speed";
    /// Orbital speed, m/s.
    pub const ORBITAL_SPEED: &str = "flight.orbital_speed";
    /// Surface-frame velocity vector, m/s.
    pub const VELOCITY: &str = "flight.velocity";
    /// Current main throttle setting in `[0, 1]`.
    pub const THROTTLE: &str = "control.throttle";
}

/// Category of control/telemetry surface a discovered component exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum CapabilityKind {
    Engine,
    Decoupler,
    Fairing,
    ProbeCore,
    Antenna,
    SolarPanel,
    Winglet,
    Battery,
    FuelTank,
    LaunchClamp,
}

impl fmt::Display for CapabilityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Identifier of a remote component as reported by the vessel enumeration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComponentId(pub u64);

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "part#{}", self.0)
    }
}

/// One entry of the remote component enumeration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteComponent {
    pub id: ComponentId,
    /// Part title as reported by the remote side (e.g. "LV-T45 Engine").
    pub name: String,
    /// Operator-assigned name tag, if any.
    pub tag: Option<String>,
    /// Names of the modules attached to the part.
    pub modules: Vec<String>,
}

/// Receiver of a remote action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionTarget {
    /// Vessel-wide control surface (throttle, staging, SAS, brakes).
    Vessel,
    /// A single discovered component.
    Component(ComponentId),
}

impl fmt::Display for ActionTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTarget::Vessel => write!(f, "vessel"),
            ActionTarget::Component(id) => id.fmt(f),
        }
    }
}

/// Argument passed along with a remote action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActionArg {
    Bool(bool),
    Float(f64),
    Text(String),
}

/// A telemetry sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TelemetryValue {
    Scalar(f64),
    Vector([f64; 3]),
}

impl TelemetryValue {
    /// The scalar payload, or `None` for vector samples.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            TelemetryValue::Scalar(v) => Some(*v),
            TelemetryValue::Vector(_) => None,
        }
    }

    /// The vector payload, or `None` for scalar samples.
    pub fn as_vector(&self) -> Option<[f64; 3]> {
        match self {
            TelemetryValue::Vector(v) => Some(*v),
            TelemetryValue::Scalar(_) => None,
        }
    }
}

/// Attitude-hold modes understood by the probe core autopilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SasMode {
    StabilityAssist,
    Maneuver,
    Prograde,
    Retrograde,
    Normal,
    AntiNormal,
    Radial,
    AntiRadial,
    Target,
    AntiTarget,
    Node,
}

impl SasMode {
    /// Name of the mode on the wire.
    pub fn wire_name(&self) -> &'static str {
        match self {
            SasMode::StabilityAssist => "STABILITY_ASSIST",
            SasMode::Maneuver => "MANEUVER",
            SasMode::Prograde => "PROGRADE",
            SasMode::Retrograde => "RETROGRADE",
            SasMode::Normal => "NORMAL",
            SasMode::AntiNormal => "ANTI_NORMAL",
            SasMode::Radial => "RADIAL",
            SasMode::AntiRadial => "ANTI_RADIAL",
            SasMode::Target => "TARGET",
            SasMode::AntiTarget => "ANTI_TARGET",
            SasMode::Node => "NODE",
        }
    }
}

/// Actuator channels an operator may pin to a manual value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OverrideChannel {
    /// Main throttle, `[0, 1]`.
    Throttle,
    /// Vessel brakes; values `>= 0.5` engage them.
    Brakes,
}

/// Operator request queued for the next control cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Intent {
    StartSequence,
    Abort { reason: String },
    /// `value: None` releases the override and hands the channel back to
    /// the control loops.
    SetManualOverride {
        channel: OverrideChannel,
        value: Option<f64>,
    },
}

/// Unified event wrapper for the flight event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "ascent-runtime::sequence"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    /// Stamp `payload` with a fresh id and the current wall-clock time.
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Which script a sequence event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScriptKind {
    Normal,
    Abort,
}

/// Variants of data routed over the flight event bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum EventPayload {
    StepExecuted {
        script: ScriptKind,
        index: usize,
        label: String,
        succeeded: bool,
    },
    SequenceCompleted,
    AbortStarted {
        reason: String,
    },
    AbortCompleted,
    PreflightFailed {
        missing: Vec<String>,
    },
    ChannelHealth {
        path: String,
        healthy: bool,
    },
    LoopOutput {
        name: String,
        error: f64,
        output: f64,
    },
    OverrideChanged {
        channel: OverrideChannel,
        value: Option<f64>,
    },
}

/// Read access to cached telemetry by property path.
///
/// Implementations must never block or touch the remote transport.
pub trait TelemetryView {
    /// Latest healthy scalar value at `path`, if any.
    fn scalar(&self, path: &str) -> Option<f64>;
}

/// Lookup of discovered components by tag, used by preflight wiring checks.
pub trait TagDirectory {
    fn has_tag(&self, tag: &str) -> bool;
}

/// Global error type spanning transport failures, action failures, wiring
/// mismatches and configuration problems.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum AscentError {
    #[error("Link Error: {0}")]
    Link(String),

    #[error("Telemetry unavailable on {path}")]
    TransientTelemetry { path: String },

    #[error("Action '{action}' failed on {component}: {details}")]
    ActionFailed {
        component: String,
        action: String,
        details: String,
    },

    #[error("Discovery mismatch, missing tags: {}", missing.join(", "))]
    DiscoveryMismatch { missing: Vec<String> },

    #[error("Configuration Error: {0}")]
    Configuration(String),

    #[error("Profile Error: {0}")]
    Profile(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intent_override_roundtrip() {
        let intent = Intent::SetManualOverride {
            channel: OverrideChannel::Throttle,
            value: Some(0.25),
        };
        let json = serde_json::to_string(&intent).unwrap();
        let back: Intent = serde_json::from_str(&json).unwrap();
        assert_eq!(intent, back);
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "ascent-runtime::sequence",
            EventPayload::StepExecuted {
                script: ScriptKind::Normal,
                index: 2,
                label: "stage separation".to_string(),
                succeeded: true,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.payload, back.payload);
    }

    #[test]
    fn telemetry_value_accessors() {
        assert_eq!(TelemetryValue::Scalar(3.0).as_scalar(), Some(3.0));
        assert_eq!(TelemetryValue::Scalar(3.0).as_vector(), None);
        assert_eq!(
            TelemetryValue::Vector([1.0, 2.0, 3.0]).as_vector(),
            Some([1.0, 2.0, 3.0])
        );
        assert_eq!(TelemetryValue::Vector([0.0; 3]).as_scalar(), None);
    }

    #[test]
    fn discovery_mismatch_lists_missing_tags() {
        let err = AscentError::DiscoveryMismatch {
            missing: vec!["ENGINE_1".into(), "DECOUPLER_1".into()],
        };
        assert_eq!(
            err.to_string(),
            "Discovery mismatch, missing tags: ENGINE_1, DECOUPLER_1"
        );
    }

    #[test]
    fn sas_mode_wire_names() {
        assert_eq!(SasMode::StabilityAssist.wire_name(), "STABILITY_ASSIST");
        assert_eq!(SasMode::AntiRadial.wire_name(), "ANTI_RADIAL");
    }

    #[test]
    fn action_target_display() {
        assert_eq!(ActionTarget::Vessel.to_string(), "vessel");
        assert_eq!(ActionTarget::Component(ComponentId(7)).to_string(), "part#7");
    }
}
