//! In-process simulated vessel for CI and headless runs.
//!
//! [`SimVessel`] implements [`VesselLink`] against an in-memory part tree.
//! It records every action it receives, applies the obvious field effects
//! (an engine that was activated reports `Nominal`, a fired decoupler
//! reports `staged`), and can be told to fail reads or actions so the
//! failure paths of the flight stack can be exercised without a simulator.
//!
//! Physics is out of scope: telemetry properties only change when a test or
//! a demo driver sets them.
//!
//! # Example
//!
//! ```rust
//! use ascent_hal::SimVessel;
//! use ascent_link::VesselLink;
//! use ascent_types::TelemetryValue;
//!
//! let sim = SimVessel::new();
//! sim.set_property("flight.mean_altitude", 1200.0);
//! assert_eq!(
//!     sim.read_property("flight.mean_altitude").ok(),
//!     Some(TelemetryValue::Scalar(1200.0))
//! );
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use ascent_link::VesselLink;
use ascent_types::{
    paths, ActionArg, ActionTarget, AscentError, ComponentId, RemoteComponent, TelemetryValue,
};
use tracing::trace;

use crate::component::modules;
use crate::vessel::actions;

/// One action received by the simulator.
#[derive(Debug, Clone, PartialEq)]
pub struct InvokedAction {
    pub target: ActionTarget,
    pub action: String,
    pub args: Vec<ActionArg>,
}

#[derive(Default)]
struct SimState {
    next_id: u64,
    parts: BTreeMap<ComponentId, RemoteComponent>,
    fields: HashMap<(ComponentId, String), HashMap<String, String>>,
    properties: HashMap<String, TelemetryValue>,
    failing_properties: HashSet<String>,
    failing_actions: HashSet<String>,
    link_down: bool,
    invoked: Vec<InvokedAction>,
    throttle: f64,
    brakes: bool,
    sas: bool,
    sas_mode: Option<String>,
    stages_activated: u32,
}

/// Simulated [`VesselLink`].  Share it behind an `Arc`; every method takes
/// `&self`.
#[derive(Default)]
pub struct SimVessel {
    state: Mutex<SimState>,
}

impl SimVessel {
    pub fn new() -> Self {
        Self::default()
    }

    /// A small two-stage rocket with one part of every tagged kind.
    pub fn two_stage_rocket() -> Self {
        let sim = Self::new();
        sim.add_part("TT18-A Launch Stability Enhancer", Some("CLAMP_1"), &[
            modules::LAUNCH_CLAMP,
            modules::GENERATOR,
        ]);
        let e1 = sim.add_part("LV-T45 \"Swivel\"", Some("ENGINE_1"), &[
            modules::ENGINES,
            modules::GIMBAL,
        ]);
        sim.add_part("FL-T400 Fuel Tank", Some("TANK_1"), &[modules::RESOURCE]);
        sim.add_part("TD-12 Decoupler", Some("DECOUPLER_1"), &[modules::DECOUPLE]);
        let e2 = sim.add_part("LV-909 \"Terrier\"", Some("ENGINE_2"), &[
            modules::ENGINES,
            modules::GIMBAL,
        ]);
        sim.add_part("AV-R8 Winglet", Some("WINGLET_1"), &[modules::CONTROL_SURFACE]);
        sim.add_part("Z-100 Battery", Some("BATTERY_1"), &[modules::RESOURCE]);
        let probe = sim.add_part("Probodobodyne OKTO", Some("BPROBE_1"), &[
            modules::COMMAND,
            modules::DATA_TRANSMITTER,
        ]);
        sim.add_part("Communotron 16", Some("ANTENNA_1"), &[
            modules::DEPLOYABLE_ANTENNA,
            modules::DATA_TRANSMITTER,
        ]);
        sim.add_part("OX-STAT Photovoltaic", Some("SOLAR_1"), &[
            modules::DEPLOYABLE_SOLAR_PANEL,
        ]);
        sim.add_part("AE-FF1 Fairing", Some("FAIRING_1"), &[modules::PROCEDURAL_FAIRING]);

        for engine in [e1, e2] {
            sim.set_fields(engine, modules::ENGINES, &[
                ("Status", "Off"),
                ("Thrust Limiter", "100"),
            ]);
        }
        sim.set_fields(probe, modules::COMMAND, &[
            ("Command State", "Operational"),
            ("Hibernation", "False"),
            ("Comm Signal", "NA"),
        ]);
        sim.set_fields(probe, modules::DATA_TRANSMITTER, &[("Antenna Rating", "5k")]);
        if let Some(clamp) = sim.find_tag("CLAMP_1") {
            sim.set_fields(clamp, modules::GENERATOR, &[
                ("Generator", "True"),
                ("Efficiency", "1"),
            ]);
        }
        sim.set_property(paths::MEAN_ALTITUDE, 0.0);
        sim.set_property(paths::VERTICAL_SPEED, 0.0);
        sim.set_property(paths::SURFACE_SPEED, 0.0);
        sim
    }

    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Part tree ─────────────────────────────────────────────────────────

    /// Add a part and return its id.
    pub fn add_part(&self, name: &str, tag: Option<&str>, part_modules: &[&str]) -> ComponentId {
        let mut state = self.lock();
        state.next_id += 1;
        let id = ComponentId(state.next_id);
        state.parts.insert(id, RemoteComponent {
            id,
            name: name.to_string(),
            tag: tag.map(str::to_string),
            modules: part_modules.iter().map(|m| m.to_string()).collect(),
        });
        id
    }

    pub fn remove_part(&self, id: ComponentId) {
        let mut state = self.lock();
        state.parts.remove(&id);
        state.fields.retain(|(part, _), _| *part != id);
    }

    pub fn find_tag(&self, tag: &str) -> Option<ComponentId> {
        self.lock()
            .parts
            .values()
            .find(|p| p.tag.as_deref() == Some(tag))
            .map(|p| p.id)
    }

    pub fn snapshot_part(&self, id: ComponentId) -> Option<RemoteComponent> {
        self.lock().parts.get(&id).cloned()
    }

    /// Merge `fields` into the field map of `module` on part `id`.
    pub fn set_fields(&self, id: ComponentId, module: &str, fields: &[(&str, &str)]) {
        let mut state = self.lock();
        let map = state.fields.entry((id, module.to_string())).or_default();
        for (key, value) in fields {
            map.insert(key.to_string(), value.to_string());
        }
    }

    pub fn field(&self, id: ComponentId, module: &str, key: &str) -> Option<String> {
        self.lock()
            .fields
            .get(&(id, module.to_string()))
            .and_then(|m| m.get(key).cloned())
    }

    // ── Telemetry ─────────────────────────────────────────────────────────

    pub fn set_property(&self, path: &str, value: f64) {
        self.lock()
            .properties
            .insert(path.to_string(), TelemetryValue::Scalar(value));
    }

    pub fn set_vector_property(&self, path: &str, value: [f64; 3]) {
        self.lock()
            .properties
            .insert(path.to_string(), TelemetryValue::Vector(value));
    }

    pub fn scalar_property(&self, path: &str) -> Option<f64> {
        self.lock().properties.get(path).and_then(|v| v.as_scalar())
    }

    // ── Failure injection ─────────────────────────────────────────────────

    pub fn fail_property(&self, path: &str) {
        self.lock().failing_properties.insert(path.to_string());
    }

    pub fn heal_property(&self, path: &str) {
        self.lock().failing_properties.remove(path);
    }

    /// Make every invocation of `action` fail.
    pub fn fail_action(&self, action: &str) {
        self.lock().failing_actions.insert(action.to_string());
    }

    /// Fail every call until cleared.
    pub fn set_link_down(&self, down: bool) {
        self.lock().link_down = down;
    }

    // ── Inspection ────────────────────────────────────────────────────────

    pub fn invoked(&self) -> Vec<InvokedAction> {
        self.lock().invoked.clone()
    }

    pub fn throttle(&self) -> f64 {
        self.lock().throttle
    }

    pub fn brakes(&self) -> bool {
        self.lock().brakes
    }

    pub fn sas(&self) -> bool {
        self.lock().sas
    }

    pub fn sas_mode(&self) -> Option<String> {
        self.lock().sas_mode.clone()
    }

    pub fn stages_activated(&self) -> u32 {
        self.lock().stages_activated
    }
}

impl SimState {
    fn apply_vessel_action(&mut self, action: &str, args: &[ActionArg]) -> Result<(), String> {
        match (action, args) {
            (actions::THROTTLE, [ActionArg::Float(v)]) => {
                self.throttle = *v;
                self.properties
                    .insert(paths::THROTTLE.to_string(), TelemetryValue::Scalar(*v));
            }
            (actions::BRAKES, [ActionArg::Bool(b)]) => self.brakes = *b,
            (actions::SAS, [ActionArg::Bool(b)]) => self.sas = *b,
            (actions::SAS_MODE, [ActionArg::Text(mode)]) => self.sas_mode = Some(mode.clone()),
            (actions::ACTIVATE_NEXT_STAGE, []) => self.stages_activated += 1,
            _ => return Err(format!("unsupported vessel action {action} {args:?}")),
        }
        Ok(())
    }

    fn apply_component_action(
        &mut self,
        id: ComponentId,
        action: &str,
        args: &[ActionArg],
    ) -> Result<(), String> {
        let part = self.parts.get(&id).ok_or_else(|| "no such part".to_string())?;
        let (module, name) = action
            .split_once('/')
            .ok_or_else(|| format!("malformed action name {action}"))?;
        if !part.modules.iter().any(|m| m == module) {
            return Err(format!("part has no module {module}"));
        }

        let on_module =
            |key: &str, value: &str| (module.to_string(), key.to_string(), value.to_string());
        let writes = match args {
            [] => match name {
                "Activate Engine" => vec![on_module("Status", "Nominal")],
                "Shutdown Engine" => vec![on_module("Status", "Off")],
                "Decouple" => vec![on_module("staged", "True")],
                "Deploy" => vec![on_module("deployed", "True")],
                "Hibernate" => vec![on_module("Hibernation", "True")],
                "Activate" => vec![on_module("Hibernation", "False")],
                "Toggle Control" => Vec::new(),
                "Extend Antenna" | "Extend Panel" => vec![on_module("Status", "Extended")],
                "Retract Antenna" | "Retract Panel" => vec![on_module("Status", "Retracted")],
                "Release Clamp" => vec![(
                    modules::GENERATOR.to_string(),
                    "Generator".to_string(),
                    "False".to_string(),
                )],
                other => return Err(format!("unknown event {other}")),
            },
            [ActionArg::Float(v)] => vec![on_module(name, &v.to_string())],
            [ActionArg::Bool(b)] => vec![on_module(name, if *b { "True" } else { "False" })],
            [ActionArg::Text(t)] => vec![on_module(name, t)],
            _ => return Err(format!("unsupported arguments {args:?}")),
        };

        for (module, key, value) in writes {
            self.fields.entry((id, module)).or_default().insert(key, value);
        }
        Ok(())
    }
}

impl VesselLink for SimVessel {
    fn read_property(&self, path: &str) -> Result<TelemetryValue, AscentError> {
        let state = self.lock();
        if state.link_down {
            return Err(AscentError::Link("simulated link down".to_string()));
        }
        if state.failing_properties.contains(path) {
            return Err(AscentError::TransientTelemetry {
                path: path.to_string(),
            });
        }
        state
            .properties
            .get(path)
            .copied()
            .ok_or_else(|| AscentError::TransientTelemetry {
                path: path.to_string(),
            })
    }

    fn invoke_action(
        &self,
        target: ActionTarget,
        action: &str,
        args: &[ActionArg],
    ) -> Result<(), AscentError> {
        let mut state = self.lock();
        if state.link_down {
            return Err(AscentError::Link("simulated link down".to_string()));
        }
        let failed = |details: String| AscentError::ActionFailed {
            component: target.to_string(),
            action: action.to_string(),
            details,
        };
        if state.failing_actions.contains(action) {
            return Err(failed("simulated failure".to_string()));
        }

        let applied = match target {
            ActionTarget::Vessel => state.apply_vessel_action(action, args),
            ActionTarget::Component(id) => state.apply_component_action(id, action, args),
        };
        applied.map_err(failed)?;

        trace!(%target, action, ?args, "sim action");
        state.invoked.push(InvokedAction {
            target,
            action: action.to_string(),
            args: args.to_vec(),
        });
        Ok(())
    }

    fn enumerate_components(&self) -> Result<Vec<RemoteComponent>, AscentError> {
        let state = self.lock();
        if state.link_down {
            return Err(AscentError::Link("simulated link down".to_string()));
        }
        Ok(state.parts.values().cloned().collect())
    }

    fn module_fields(
        &self,
        id: ComponentId,
        module: &str,
    ) -> Result<HashMap<String, String>, AscentError> {
        let state = self.lock();
        if state.link_down {
            return Err(AscentError::Link("simulated link down".to_string()));
        }
        let part = state.parts.get(&id).ok_or_else(|| {
            AscentError::Link(format!("{id} is not on the vessel"))
        })?;
        if !part.modules.iter().any(|m| m == module) {
            return Err(AscentError::Link(format!("{id} has no module {module}")));
        }
        Ok(state
            .fields
            .get(&(id, module.to_string()))
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_events_update_status_field() {
        let sim = SimVessel::two_stage_rocket();
        let engine = sim.find_tag("ENGINE_1").unwrap();
        sim.invoke_action(
            ActionTarget::Component(engine),
            "ModuleEngines/Activate Engine",
            &[],
        )
        .unwrap();
        assert_eq!(
            sim.field(engine, modules::ENGINES, "Status").as_deref(),
            Some("Nominal")
        );
    }

    #[test]
    fn field_write_with_argument() {
        let sim = SimVessel::two_stage_rocket();
        let engine = sim.find_tag("ENGINE_2").unwrap();
        sim.invoke_action(
            ActionTarget::Component(engine),
            "ModuleEngines/Thrust Limiter",
            &[ActionArg::Float(50.0)],
        )
        .unwrap();
        assert_eq!(
            sim.field(engine, modules::ENGINES, "Thrust Limiter").as_deref(),
            Some("50")
        );
    }

    #[test]
    fn unknown_module_is_rejected() {
        let sim = SimVessel::two_stage_rocket();
        let tank = sim.find_tag("TANK_1").unwrap();
        let err = sim
            .invoke_action(ActionTarget::Component(tank), "ModuleDecouple/Decouple", &[])
            .unwrap_err();
        assert!(matches!(err, AscentError::ActionFailed { .. }));
        assert!(sim.invoked().is_empty());
    }

    #[test]
    fn link_down_fails_everything() {
        let sim = SimVessel::two_stage_rocket();
        sim.set_link_down(true);
        assert!(sim.enumerate_components().is_err());
        assert!(sim.read_property(paths::MEAN_ALTITUDE).is_err());
        assert!(sim
            .invoke_action(ActionTarget::Vessel, actions::THROTTLE, &[ActionArg::Float(1.0)])
            .is_err());
    }

    #[test]
    fn throttle_action_updates_property() {
        let sim = SimVessel::new();
        sim.invoke_action(ActionTarget::Vessel, actions::THROTTLE, &[ActionArg::Float(0.5)])
            .unwrap();
        assert_eq!(sim.scalar_property(paths::THROTTLE), Some(0.5));
    }
}
