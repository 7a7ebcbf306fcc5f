//! [`AscentProfile`] – ascent scripts as data.
//!
//! A profile lists the normal steps and the abort steps of a flight in TOML
//! and compiles into a [`Sequence`] over the [`ComponentRegistry`], plus the
//! wiring the sequence expects to find on the vessel.
//!
//! ```toml
//! name = "suborbital hop"
//!
//! [[step]]
//! label = "Ignite"
//! action = { kind = "ignite", tag = "ENGINE_1" }
//!
//! [[step]]
//! label = "Release clamps"
//! when = { after_secs = 2 }
//! action = { kind = "release_clamp", tag = "CLAMP_1" }
//!
//! [[step]]
//! label = "Separate"
//! when = { altitude_above = 10000 }
//! action = { kind = "decouple", tag = "DECOUPLER_1" }
//!
//! [[abort_step]]
//! label = "Cut throttle"
//! action = { kind = "throttle", value = 0.0 }
//! ```
//!
//! Component actions resolve their tag every time they run, so a part that
//! has left the vessel makes the step fail instead of panicking.

use std::path::Path;
use std::time::Duration;

use ascent_hal::{ComponentHandle, ComponentRegistry};
use ascent_kernel::{
    Comparison, Precondition, Preflight, RequiredTags, Sequence, SequenceStep,
    TelemetryAvailable,
};
use ascent_types::{AscentError, SasMode, paths};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Built-in profile for the two-stage test vehicle.
pub const TWO_STAGE_PROFILE: &str = r#"
name = "two-stage ascent"
required_telemetry = ["flight.mean_altitude"]

[[step]]
label = "Attitude hold"
action = { kind = "sas", enabled = true }

[[step]]
label = "Ignite first stage"
action = { kind = "ignite", tag = "ENGINE_1" }

[[step]]
label = "Full throttle"
action = { kind = "throttle", value = 1.0 }

[[step]]
label = "Release launch clamps"
when = { after_secs = 2 }
action = { kind = "release_clamp", tag = "CLAMP_1" }

[[step]]
label = "Stage 1 separation"
when = { altitude_above = 10000 }
action = { kind = "decouple", tag = "DECOUPLER_1" }

[[step]]
label = "Ignite second stage"
action = { kind = "ignite", tag = "ENGINE_2" }

[[step]]
label = "Jettison fairing"
when = { altitude_above = 35000 }
action = { kind = "deploy_fairing", tag = "FAIRING_1" }

[[step]]
label = "Extend solar panel"
when = { altitude_above = 70000 }
action = { kind = "extend_solar", tag = "SOLAR_1" }

[[step]]
label = "Extend antenna"
when = { altitude_above = 100000 }
action = { kind = "extend_antenna", tag = "ANTENNA_1" }

[[abort_step]]
label = "Cut throttle"
action = { kind = "throttle", value = 0.0 }

[[abort_step]]
label = "Shut down first stage"
action = { kind = "shutdown", tag = "ENGINE_1" }

[[abort_step]]
label = "Shut down second stage"
action = { kind = "shutdown", tag = "ENGINE_2" }

[[abort_step]]
label = "Stabilize"
action = { kind = "stabilize", tag = "BPROBE_1" }
"#;

// ─────────────────────────────────────────────────────────────────────────────
// Schema
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AscentProfile {
    pub name: String,
    /// Telemetry paths that must be healthy before the sequence may start.
    #[serde(default)]
    pub required_telemetry: Vec<String>,
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
    #[serde(default, rename = "abort_step")]
    pub abort_steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepSpec {
    pub label: String,
    /// Ignored on abort steps.
    #[serde(default)]
    pub when: Option<Gate>,
    pub action: ActionSpec,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gate {
    AltitudeAbove(f64),
    AltitudeBelow(f64),
    AfterSecs(f64),
    Above { path: String, bound: f64 },
    Below { path: String, bound: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionSpec {
    Ignite { tag: String },
    Shutdown { tag: String },
    /// `percent` in `[0, 100]`.
    ThrustLimiter { tag: String, percent: f64 },
    Decouple { tag: String },
    DeployFairing { tag: String },
    ReleaseClamp { tag: String },
    ExtendAntenna { tag: String },
    RetractAntenna { tag: String },
    ExtendSolar { tag: String },
    RetractSolar { tag: String },
    Stabilize { tag: String },
    Hibernate { tag: String, enabled: bool },
    Throttle { value: f64 },
    Stage,
    Brakes { engaged: bool },
    Sas { enabled: bool },
    SasMode { mode: SasMode },
}

impl ActionSpec {
    /// Component tag this action addresses, if any.
    pub fn tag(&self) -> Option<&str> {
        match self {
            ActionSpec::Ignite { tag }
            | ActionSpec::Shutdown { tag }
            | ActionSpec::ThrustLimiter { tag, .. }
            | ActionSpec::Decouple { tag }
            | ActionSpec::DeployFairing { tag }
            | ActionSpec::ReleaseClamp { tag }
            | ActionSpec::ExtendAntenna { tag }
            | ActionSpec::RetractAntenna { tag }
            | ActionSpec::ExtendSolar { tag }
            | ActionSpec::RetractSolar { tag }
            | ActionSpec::Stabilize { tag }
            | ActionSpec::Hibernate { tag, .. } => Some(tag),
            ActionSpec::Throttle { .. }
            | ActionSpec::Stage
            | ActionSpec::Brakes { .. }
            | ActionSpec::Sas { .. }
            | ActionSpec::SasMode { .. } => None,
        }
    }

    /// Run the action against whatever currently carries the tag.
    pub fn execute(&self, registry: &mut ComponentRegistry) -> bool {
        match self {
            ActionSpec::Ignite { tag } => on_tag(registry, tag, |r, h| {
                r.engine(h).map(|mut c| c.activate())
            }),
            ActionSpec::Shutdown { tag } => on_tag(registry, tag, |r, h| {
                r.engine(h).map(|mut c| c.shutdown())
            }),
            ActionSpec::ThrustLimiter { tag, percent } => on_tag(registry, tag, |r, h| {
                r.engine(h).map(|mut c| c.set_thrust_limiter(*percent / 100.0))
            }),
            ActionSpec::Decouple { tag } => on_tag(registry, tag, |r, h| {
                r.decoupler(h).map(|mut c| c.decouple())
            }),
            ActionSpec::DeployFairing { tag } => on_tag(registry, tag, |r, h| {
                r.fairing(h).map(|mut c| c.deploy())
            }),
            ActionSpec::ReleaseClamp { tag } => on_tag(registry, tag, |r, h| {
                r.launch_clamp(h).map(|mut c| c.release())
            }),
            ActionSpec::ExtendAntenna { tag } => on_tag(registry, tag, |r, h| {
                r.antenna(h).map(|mut c| c.deploy())
            }),
            ActionSpec::RetractAntenna { tag } => on_tag(registry, tag, |r, h| {
                r.antenna(h).map(|mut c| c.retract())
            }),
            ActionSpec::ExtendSolar { tag } => on_tag(registry, tag, |r, h| {
                r.solar_panel(h).map(|mut c| c.deploy())
            }),
            ActionSpec::RetractSolar { tag } => on_tag(registry, tag, |r, h| {
                r.solar_panel(h).map(|mut c| c.retract())
            }),
            ActionSpec::Stabilize { tag } => on_tag(registry, tag, |r, h| {
                r.probe_core(h).map(|mut c| c.emergency_stabilize())
            }),
            ActionSpec::Hibernate { tag, enabled } => on_tag(registry, tag, |r, h| {
                r.probe_core(h).map(|mut c| c.set_hibernation(*enabled))
            }),
            ActionSpec::Throttle { value } => registry.vessel().set_throttle(*value),
            ActionSpec::Stage => registry.vessel().activate_next_stage(),
            ActionSpec::Brakes { engaged } => registry.vessel().set_brakes(*engaged),
            ActionSpec::Sas { enabled } => registry.vessel().set_sas(*enabled),
            ActionSpec::SasMode { mode } => registry.vessel().set_sas_mode(*mode),
        }
    }

    fn validate(&self) -> Result<(), String> {
        match self {
            ActionSpec::Throttle { value } if !(0.0..=1.0).contains(value) => {
                Err(format!("throttle {value} outside [0, 1]"))
            }
            ActionSpec::ThrustLimiter { percent, .. } if !(0.0..=100.0).contains(percent) => {
                Err(format!("thrust limiter {percent} outside [0, 100]"))
            }
            _ => match self.tag() {
                Some("") => Err("empty tag".to_string()),
                _ => Ok(()),
            },
        }
    }
}

/// Resolve `tag` and run `f` on the matching control surface.  `f` returns
/// `None` when the part lacks the capability.
fn on_tag(
    registry: &mut ComponentRegistry,
    tag: &str,
    f: impl FnOnce(&mut ComponentRegistry, ComponentHandle) -> Option<bool>,
) -> bool {
    let Some(handle) = registry.get_by_tag(tag) else {
        warn!(tag, "no component carries this tag");
        return false;
    };
    match f(registry, handle) {
        Some(ok) => ok,
        None => {
            warn!(tag, component = %handle.0, "component lacks the capability for this action");
            false
        }
    }
}

impl Gate {
    fn to_precondition(&self) -> Result<Precondition, String> {
        let finite = |v: f64| {
            if v.is_finite() {
                Ok(v)
            } else {
                Err(format!("non-finite bound {v}"))
            }
        };
        Ok(match self {
            Gate::AltitudeAbove(bound) => {
                Precondition::threshold(paths::MEAN_ALTITUDE, Comparison::Above, finite(*bound)?)
            }
            Gate::AltitudeBelow(bound) => {
                Precondition::threshold(paths::MEAN_ALTITUDE, Comparison::Below, finite(*bound)?)
            }
            Gate::Above { path, bound } => {
                Precondition::threshold(path.as_str(), Comparison::Above, finite(*bound)?)
            }
            Gate::Below { path, bound } => {
                Precondition::threshold(path.as_str(), Comparison::Below, finite(*bound)?)
            }
            Gate::AfterSecs(secs) => Precondition::After(
                Duration::try_from_secs_f64(*secs).map_err(|e| format!("after_secs {secs}: {e}"))?,
            ),
        })
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Loading and compilation
// ─────────────────────────────────────────────────────────────────────────────

/// A profile ready to fly.
pub struct CompiledProfile {
    pub sequence: Sequence<ComponentRegistry>,
    /// Every tag referenced by either script, in first-use order.
    pub required_tags: Vec<String>,
    pub required_telemetry: Vec<String>,
}

impl CompiledProfile {
    /// Wiring and telemetry checks guarding the start of this sequence.
    pub fn preflight(&self) -> Preflight {
        let mut preflight = Preflight::new();
        preflight.add_rule(Box::new(RequiredTags::new(self.required_tags.iter().cloned())));
        if !self.required_telemetry.is_empty() {
            preflight.add_rule(Box::new(TelemetryAvailable::new(
                self.required_telemetry.iter().cloned(),
            )));
        }
        preflight
    }
}

impl AscentProfile {
    pub fn from_toml_str(text: &str) -> Result<Self, AscentError> {
        toml::from_str(text).map_err(|e| AscentError::Profile(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self, AscentError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| AscentError::Profile(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn two_stage() -> Result<Self, AscentError> {
        Self::from_toml_str(TWO_STAGE_PROFILE)
    }

    /// Validate every step and build the sequence.
    pub fn compile(&self) -> Result<CompiledProfile, AscentError> {
        if self.steps.is_empty() {
            return Err(AscentError::Profile(format!(
                "profile '{}' has no steps",
                self.name
            )));
        }

        let mut sequence = Sequence::new(self.name.clone());
        let mut required_tags: Vec<String> = Vec::new();

        let scripts = [("step", &self.steps), ("abort_step", &self.abort_steps)];
        for (script, specs) in scripts {
            for (index, spec) in specs.iter().enumerate() {
                let context = |msg: String| {
                    AscentError::Profile(format!("{script} {index} ('{}'): {msg}", spec.label))
                };
                if spec.label.trim().is_empty() {
                    return Err(context("empty label".to_string()));
                }
                spec.action.validate().map_err(context)?;

                if let Some(tag) = spec.action.tag() {
                    if !required_tags.iter().any(|t| t == tag) {
                        required_tags.push(tag.to_string());
                    }
                }

                let action = spec.action.clone();
                let run = move |registry: &mut ComponentRegistry| action.execute(registry);

                if script == "step" {
                    let precondition = match &spec.when {
                        Some(gate) => gate.to_precondition().map_err(context)?,
                        None => Precondition::None,
                    };
                    sequence.push_step(SequenceStep::new(spec.label.clone(), precondition, run));
                } else {
                    if spec.when.is_some() {
                        debug!(label = %spec.label, "gate on abort step ignored");
                    }
                    sequence.push_abort_step(SequenceStep::new(
                        spec.label.clone(),
                        Precondition::None,
                        run,
                    ));
                }
            }
        }

        Ok(CompiledProfile {
            sequence,
            required_tags,
            required_telemetry: self.required_telemetry.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Instant;

    use ascent_hal::SimVessel;
    use ascent_kernel::SequenceState;
    use ascent_link::VesselLink;
    use ascent_types::{ActionTarget, TelemetryView};

    use super::*;

    struct Altitude(f64);

    impl TelemetryView for Altitude {
        fn scalar(&self, path: &str) -> Option<f64> {
            (path == paths::MEAN_ALTITUDE).then_some(self.0)
        }
    }

    #[test]
    fn builtin_profile_compiles() {
        let compiled = AscentProfile::two_stage().unwrap().compile().unwrap();
        assert_eq!(compiled.sequence.steps().len(), 9);
        assert_eq!(compiled.sequence.abort_steps().len(), 4);
        assert_eq!(
            compiled.required_tags,
            vec![
                "ENGINE_1",
                "CLAMP_1",
                "DECOUPLER_1",
                "ENGINE_2",
                "FAIRING_1",
                "SOLAR_1",
                "ANTENNA_1",
                "BPROBE_1"
            ]
        );
        assert_eq!(compiled.preflight().len(), 2);
        assert_eq!(
            compiled.sequence.telemetry_paths(),
            vec![paths::MEAN_ALTITUDE.to_string()]
        );
    }

    #[test]
    fn gates_parse_into_preconditions() {
        let profile = AscentProfile::from_toml_str(
            r#"
            name = "gates"
            [[step]]
            label = "a"
            when = { above = { path = "flight.vertical_speed", bound = 50 } }
            action = { kind = "stage" }
            [[step]]
            label = "b"
            when = { after_secs = 1.5 }
            action = { kind = "sas_mode", mode = "prograde" }
            "#,
        )
        .unwrap();
        let compiled = profile.compile().unwrap();
        let steps = compiled.sequence.steps();
        assert_eq!(
            steps[0].precondition(),
            &Precondition::threshold(paths::VERTICAL_SPEED, Comparison::Above, 50.0)
        );
        assert_eq!(
            steps[1].precondition(),
            &Precondition::After(Duration::from_millis(1500))
        );
        assert!(compiled.required_tags.is_empty());
    }

    #[test]
    fn invalid_profiles_are_rejected() {
        let cases = [
            "name = \"empty\"\n",
            "name = \"x\"\n[[step]]\nlabel = \"\"\naction = { kind = \"stage\" }\n",
            "name = \"x\"\n[[step]]\nlabel = \"t\"\n\
             action = { kind = \"throttle\", value = 1.5 }\n",
            "name = \"x\"\n[[step]]\nlabel = \"t\"\n\
             when = { after_secs = -1 }\naction = { kind = \"stage\" }\n",
            "name = \"x\"\n[[step]]\nlabel = \"t\"\naction = { kind = \"ignite\", tag = \"\" }\n",
        ];
        for text in cases {
            let result = AscentProfile::from_toml_str(text).and_then(|p| p.compile());
            assert!(
                matches!(result, Err(AscentError::Profile(_))),
                "accepted: {text}"
            );
        }
        let unknown_action =
            "name = \"x\"\n[[step]]\nlabel = \"t\"\naction = { kind = \"warp\" }\n";
        assert!(AscentProfile::from_toml_str(unknown_action).is_err());
    }

    #[test]
    fn compiled_profile_flies_the_sim_vessel() {
        let sim = Arc::new(SimVessel::two_stage_rocket());
        let mut registry = ComponentRegistry::new(sim.clone());
        registry.refresh();

        let CompiledProfile { mut sequence, .. } =
            AscentProfile::two_stage().unwrap().compile().unwrap();
        let t0 = Instant::now();
        sequence.start_at(t0);

        // Three immediate steps, then the clamp timer.
        for _ in 0..5 {
            sequence.advance(&mut registry, &Altitude(0.0), t0);
        }
        assert_eq!(sequence.state(), SequenceState::Running(3));
        assert!(sim.sas());
        assert_eq!(sim.throttle(), 1.0);

        sequence.advance(&mut registry, &Altitude(0.0), t0 + Duration::from_secs(3));
        assert_eq!(sequence.state(), SequenceState::Running(4));

        for altitude in [12_000.0, 12_000.0, 36_000.0, 71_000.0, 101_000.0] {
            sequence.advance(&mut registry, &Altitude(altitude), t0 + Duration::from_secs(60));
        }
        assert_eq!(sequence.state(), SequenceState::Completed);

        let clamp = sim.find_tag("CLAMP_1").unwrap();
        assert!(sim.invoked().iter().any(|a| {
            a.target == ActionTarget::Component(clamp) && a.action.ends_with("Release Clamp")
        }));
    }

    #[test]
    fn missing_part_fails_the_step_without_panicking() {
        let sim = Arc::new(SimVessel::new());
        let mut registry = ComponentRegistry::new(sim.clone());
        registry.refresh();
        let action = ActionSpec::Decouple {
            tag: "DECOUPLER_9".into(),
        };
        assert!(!action.execute(&mut registry));
        assert!(sim.enumerate_components().unwrap().is_empty());
    }
}
