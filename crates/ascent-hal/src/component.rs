//! [`Component`] – a discovered part with a fixed capability set.
//!
//! The primary capability comes from the operator-assigned tag prefix; the
//! secondary ones from the modules attached to the part.  Both are decided
//! once at discovery and never change afterwards.  What does change every
//! refresh is `active` and the capability-specific state pulled from the
//! part's module fields.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use ascent_link::VesselLink;
use ascent_types::{CapabilityKind, ComponentId, RemoteComponent, SasMode};
use tracing::debug;

use crate::parse::{parse_bool, parse_f64_or_zero, text_or_unknown};

// ─────────────────────────────────────────────────────────────────────────────
// Module names
// ─────────────────────────────────────────────────────────────────────────────

pub mod modules {
    pub const ENGINES: &str = "ModuleEngines";
    pub const ENGINES_FX: &str = "ModuleEnginesFX";
    pub const GIMBAL: &str = "ModuleGimbal";
    pub const DECOUPLE: &str = "ModuleDecouple";
    pub const ANCHORED_DECOUPLER: &str = "ModuleAnchoredDecoupler";
    pub const PROCEDURAL_FAIRING: &str = "ModuleProceduralFairing";
    pub const COMMAND: &str = "ModuleCommand";
    pub const DEPLOYABLE_ANTENNA: &str = "ModuleDeployableAntenna";
    pub const DATA_TRANSMITTER: &str = "ModuleDataTransmitter";
    pub const DEPLOYABLE_SOLAR_PANEL: &str = "ModuleDeployableSolarPanel";
    pub const CONTROL_SURFACE: &str = "ModuleControlSurface";
    pub const LAUNCH_CLAMP: &str = "LaunchClamp";
    pub const GENERATOR: &str = "ModuleGenerator";
    pub const RESOURCE: &str = "ModuleResource";
}

/// Tag prefix → primary capability.  Parts whose tag matches none of these
/// are not tracked.
const TAG_PREFIXES: &[(&str, CapabilityKind)] = &[
    ("ENGINE_", CapabilityKind::Engine),
    ("DECOUPLER_", CapabilityKind::Decoupler),
    ("FAIRING_", CapabilityKind::Fairing),
    ("BPROBE_", CapabilityKind::ProbeCore),
    ("ANTENNA_", CapabilityKind::Antenna),
    ("SOLAR_", CapabilityKind::SolarPanel),
    ("WINGLET_", CapabilityKind::Winglet),
    ("BATTERY_", CapabilityKind::Battery),
    ("TANK_", CapabilityKind::FuelTank),
    ("CLAMP_", CapabilityKind::LaunchClamp),
];

/// Module presence → secondary capability.
const MODULE_CAPABILITIES: &[(&str, CapabilityKind)] = &[
    (modules::ENGINES, CapabilityKind::Engine),
    (modules::ENGINES_FX, CapabilityKind::Engine),
    (modules::DECOUPLE, CapabilityKind::Decoupler),
    (modules::ANCHORED_DECOUPLER, CapabilityKind::Decoupler),
    (modules::PROCEDURAL_FAIRING, CapabilityKind::Fairing),
    (modules::COMMAND, CapabilityKind::ProbeCore),
    (modules::DEPLOYABLE_ANTENNA, CapabilityKind::Antenna),
    (modules::DATA_TRANSMITTER, CapabilityKind::Antenna),
    (modules::DEPLOYABLE_SOLAR_PANEL, CapabilityKind::SolarPanel),
    (modules::CONTROL_SURFACE, CapabilityKind::Winglet),
    (modules::LAUNCH_CLAMP, CapabilityKind::LaunchClamp),
];

/// Primary capability for `tag`, if it carries a known prefix.
pub fn kind_for_tag(tag: &str) -> Option<CapabilityKind> {
    TAG_PREFIXES
        .iter()
        .find(|(prefix, _)| tag.starts_with(prefix))
        .map(|(_, kind)| *kind)
}

// ─────────────────────────────────────────────────────────────────────────────
// Per-capability state
// ─────────────────────────────────────────────────────────────────────────────

/// State of a one-shot actuator (separation, fairing jettison, clamp
/// release).  Once fired it never re-arms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Latch {
    #[default]
    Armed,
    Fired,
}

impl Latch {
    pub fn is_fired(self) -> bool {
        self == Latch::Fired
    }

    /// Fire the latch.  Returns `true` the first time only.
    pub fn fire(&mut self) -> bool {
        let first = *self == Latch::Armed;
        *self = Latch::Fired;
        first
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct EngineState {
    pub status: String,
    pub thrust: f64,
    pub fuel_flow: f64,
    pub specific_impulse: f64,
    pub throttle_locked: bool,
    /// Thrust limiter as a fraction in `[0, 1]`.
    pub thrust_limiter: f64,
    pub gimbal_enabled: bool,
    pub gimbal_limit: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecouplerState {
    pub separation: Latch,
    pub anchored: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FairingState {
    pub jettison: Latch,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProbeCoreState {
    pub command_state: String,
    pub hibernating: bool,
    pub hibernate_in_warp: bool,
    pub comm_signal: f64,
    pub antenna_state: String,
    pub antenna_rating: f64,
    pub sas_enabled: bool,
    pub sas_mode: Option<SasMode>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AntennaState {
    pub status: String,
    pub rating: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct SolarPanelState {
    pub status: String,
    pub energy_flow: f64,
    pub sun_exposure: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct WingletState {
    pub authority: f64,
    pub deploy_angle: f64,
    pub deployed: bool,
    pub pitch: f64,
    pub roll: f64,
    pub yaw: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct LaunchClampState {
    pub release: Latch,
    pub efficiency: f64,
    pub generator_active: bool,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BatteryState {
    pub charge: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FuelTankState {
    pub liquid_fuel: f64,
    pub oxidizer: f64,
}

/// Derived state, one slot per capability the component carries.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComponentState {
    pub engine: Option<EngineState>,
    pub decoupler: Option<DecouplerState>,
    pub fairing: Option<FairingState>,
    pub probe_core: Option<ProbeCoreState>,
    pub antenna: Option<AntennaState>,
    pub solar_panel: Option<SolarPanelState>,
    pub winglet: Option<WingletState>,
    pub launch_clamp: Option<LaunchClampState>,
    pub battery: Option<BatteryState>,
    pub fuel_tank: Option<FuelTankState>,
}

impl ComponentState {
    fn for_capabilities(capabilities: &BTreeSet<CapabilityKind>) -> Self {
        let mut state = Self::default();
        for kind in capabilities {
            match kind {
                CapabilityKind::Engine => state.engine = Some(EngineState::default()),
                CapabilityKind::Decoupler => state.decoupler = Some(DecouplerState::default()),
                CapabilityKind::Fairing => state.fairing = Some(FairingState::default()),
                CapabilityKind::ProbeCore => state.probe_core = Some(ProbeCoreState::default()),
                CapabilityKind::Antenna => state.antenna = Some(AntennaState::default()),
                CapabilityKind::SolarPanel => state.solar_panel = Some(SolarPanelState::default()),
                CapabilityKind::Winglet => state.winglet = Some(WingletState::default()),
                CapabilityKind::LaunchClamp => {
                    state.launch_clamp = Some(LaunchClampState::default())
                }
                CapabilityKind::Battery => state.battery = Some(BatteryState::default()),
                CapabilityKind::FuelTank => state.fuel_tank = Some(FuelTankState::default()),
            }
        }
        state
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Component
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    id: ComponentId,
    name: String,
    tag: String,
    kind: CapabilityKind,
    capabilities: BTreeSet<CapabilityKind>,
    modules: BTreeSet<String>,
    pub(crate) active: bool,
    pub(crate) state: ComponentState,
}

impl Component {
    /// Build a component from an enumeration entry.
    ///
    /// Returns `None` for untagged parts and for tags without a known
    /// prefix.
    pub fn discover(remote: &RemoteComponent) -> Option<Self> {
        let tag = remote.tag.as_deref()?;
        let kind = kind_for_tag(tag)?;

        let modules: BTreeSet<String> = remote.modules.iter().cloned().collect();
        let mut capabilities = BTreeSet::from([kind]);
        for (module, secondary) in MODULE_CAPABILITIES {
            if modules.contains(*module) {
                capabilities.insert(*secondary);
            }
        }

        Some(Self {
            id: remote.id,
            name: remote.name.clone(),
            tag: tag.to_string(),
            kind,
            state: ComponentState::for_capabilities(&capabilities),
            capabilities,
            modules,
            active: false,
        })
    }

    pub fn id(&self) -> ComponentId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Primary capability, from the tag prefix.
    pub fn kind(&self) -> CapabilityKind {
        self.kind
    }

    pub fn capabilities(&self) -> &BTreeSet<CapabilityKind> {
        &self.capabilities
    }

    pub fn has(&self, kind: CapabilityKind) -> bool {
        self.capabilities.contains(&kind)
    }

    pub fn has_module(&self, module: &str) -> bool {
        self.modules.contains(module)
    }

    /// First of `candidates` that is attached to this part.
    pub fn first_module<'a>(&self, candidates: &[&'a str]) -> Option<&'a str> {
        candidates.iter().copied().find(|m| self.has_module(m))
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn state(&self) -> &ComponentState {
        &self.state
    }

    /// Re-pull every capability's fields from the link.
    ///
    /// Best effort: a module that is absent or whose fields cannot be read
    /// leaves that capability's previous state in place.
    pub fn update_state(&mut self, link: &dyn VesselLink) {
        let mut fetch = FieldCache::new(self, link);

        if let Some(engine) = self.state.engine.as_mut() {
            if let Some(f) = fetch.first(&[modules::ENGINES, modules::ENGINES_FX]) {
                engine.status = text_or_unknown(f.get("Status").map(String::as_str));
                engine.specific_impulse = num(f, "Specific Impulse");
                engine.fuel_flow = num(f, "Fuel Flow");
                engine.thrust = num(f, "Thrust");
                engine.throttle_locked = flag(f, "Throttle");
                engine.thrust_limiter = (num(f, "Thrust Limiter") / 100.0).clamp(0.0, 1.0);
            }
            if let Some(f) = fetch.get(modules::GIMBAL) {
                engine.gimbal_enabled = flag(f, "Gimbal");
                engine.gimbal_limit = num(f, "Gimbal Limit");
            }
        }

        if let Some(decoupler) = self.state.decoupler.as_mut() {
            decoupler.anchored = !self.modules.contains(modules::DECOUPLE)
                && self.modules.contains(modules::ANCHORED_DECOUPLER);
            if let Some(f) = fetch.first(&[modules::DECOUPLE, modules::ANCHORED_DECOUPLER]) {
                if flag(f, "staged") {
                    decoupler.separation.fire();
                }
            }
        }

        if let Some(fairing) = self.state.fairing.as_mut() {
            if let Some(f) = fetch.get(modules::PROCEDURAL_FAIRING) {
                if flag(f, "deployed") {
                    fairing.jettison.fire();
                }
            }
        }

        if let Some(probe) = self.state.probe_core.as_mut() {
            if let Some(f) = fetch.get(modules::COMMAND) {
                probe.command_state = text_or_unknown(f.get("Command State").map(String::as_str));
                probe.hibernating = flag(f, "Hibernation");
                probe.comm_signal = num(f, "Comm Signal");
                probe.hibernate_in_warp = flag(f, "Hibernate in Warp");
            }
            if let Some(f) = fetch.get(modules::DATA_TRANSMITTER) {
                probe.antenna_state = text_or_unknown(f.get("Antenna State").map(String::as_str));
                probe.antenna_rating = num(f, "Antenna Rating");
            }
        }

        if let Some(antenna) = self.state.antenna.as_mut() {
            if let Some(f) = fetch.get(modules::DEPLOYABLE_ANTENNA) {
                antenna.status = text_or_unknown(f.get("Status").map(String::as_str));
            }
            if let Some(f) = fetch.get(modules::DATA_TRANSMITTER) {
                antenna.rating = num(f, "Antenna Rating");
            }
        }

        if let Some(panel) = self.state.solar_panel.as_mut() {
            if let Some(f) = fetch.get(modules::DEPLOYABLE_SOLAR_PANEL) {
                panel.energy_flow = num(f, "Energy Flow");
                panel.status = text_or_unknown(f.get("Status").map(String::as_str));
                panel.sun_exposure = num(f, "Sun Exposure");
            }
        }

        if let Some(winglet) = self.state.winglet.as_mut() {
            if let Some(f) = fetch.get(modules::CONTROL_SURFACE) {
                winglet.authority = num(f, "Authority Limiter");
                winglet.deploy_angle = num(f, "Deploy Angle");
                winglet.deployed = flag(f, "Deploy");
                winglet.pitch = num(f, "Pitch");
                winglet.roll = num(f, "Roll");
                winglet.yaw = num(f, "Yaw");
            }
        }

        if let Some(clamp) = self.state.launch_clamp.as_mut() {
            if let Some(f) = fetch.get(modules::GENERATOR) {
                clamp.efficiency = num(f, "Efficiency");
                clamp.generator_active = flag(f, "Generator");
            }
        }

        if let Some(battery) = self.state.battery.as_mut() {
            if let Some(f) = fetch.get(modules::RESOURCE) {
                battery.charge = num(f, "ElectricCharge");
            }
        }

        if let Some(tank) = self.state.fuel_tank.as_mut() {
            if let Some(f) = fetch.get(modules::RESOURCE) {
                tank.liquid_fuel = num(f, "LiquidFuel");
                tank.oxidizer = num(f, "Oxidizer");
            }
        }

        self.active = self.derive_active();
    }

    /// `active` according to the primary capability.
    fn derive_active(&self) -> bool {
        let s = &self.state;
        match self.kind {
            CapabilityKind::Engine => s
                .engine
                .as_ref()
                .is_some_and(|e| e.status == "Nominal" || e.status == "Running"),
            CapabilityKind::Decoupler => s
                .decoupler
                .as_ref()
                .is_some_and(|d| !d.separation.is_fired()),
            CapabilityKind::Fairing => s.fairing.as_ref().is_some_and(|f| !f.jettison.is_fired()),
            CapabilityKind::ProbeCore => s
                .probe_core
                .as_ref()
                .is_some_and(|p| p.command_state == "Operational" && !p.hibernating),
            CapabilityKind::Antenna => s.antenna.as_ref().is_some_and(|a| a.status == "Extended"),
            CapabilityKind::SolarPanel => s
                .solar_panel
                .as_ref()
                .is_some_and(|p| p.status == "Extended"),
            CapabilityKind::Winglet => s.winglet.as_ref().is_some_and(|w| w.deployed),
            CapabilityKind::LaunchClamp => s
                .launch_clamp
                .as_ref()
                .is_some_and(|c| !c.release.is_fired() && c.generator_active),
            CapabilityKind::Battery | CapabilityKind::FuelTank => true,
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}, {})", self.tag, self.kind, self.id)
    }
}

fn num(fields: &HashMap<String, String>, key: &str) -> f64 {
    parse_f64_or_zero(fields.get(key).map(String::as_str))
}

fn flag(fields: &HashMap<String, String>, key: &str) -> bool {
    parse_bool(fields.get(key).map(String::as_str))
}

/// Reads each module's field map at most once per refresh.
struct FieldCache<'a> {
    id: ComponentId,
    modules: BTreeSet<String>,
    link: &'a dyn VesselLink,
    cache: HashMap<&'static str, Option<HashMap<String, String>>>,
}

impl<'a> FieldCache<'a> {
    fn new(component: &Component, link: &'a dyn VesselLink) -> Self {
        Self {
            id: component.id,
            modules: component.modules.clone(),
            link,
            cache: HashMap::new(),
        }
    }

    fn get(&mut self, module: &'static str) -> Option<&HashMap<String, String>> {
        if !self.modules.contains(module) {
            return None;
        }
        let (id, link) = (self.id, self.link);
        self.cache
            .entry(module)
            .or_insert_with(|| match link.module_fields(id, module) {
                Ok(fields) => Some(fields),
                Err(error) => {
                    debug!(component = %id, module, %error, "module fields unavailable");
                    None
                }
            })
            .as_ref()
    }

    fn first(&mut self, candidates: &[&'static str]) -> Option<&HashMap<String, String>> {
        let module = candidates.iter().copied().find(|m| self.modules.contains(*m))?;
        self.get(module)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimVessel;

    fn remote(id: u64, tag: Option<&str>, modules: &[&str]) -> RemoteComponent {
        RemoteComponent {
            id: ComponentId(id),
            name: "test part".to_string(),
            tag: tag.map(str::to_string),
            modules: modules.iter().map(|m| m.to_string()).collect(),
        }
    }

    #[test]
    fn tag_prefix_selects_primary_kind() {
        assert_eq!(kind_for_tag("ENGINE_1"), Some(CapabilityKind::Engine));
        assert_eq!(kind_for_tag("BPROBE_CORE"), Some(CapabilityKind::ProbeCore));
        assert_eq!(kind_for_tag("CLAMP_A"), Some(CapabilityKind::LaunchClamp));
        assert_eq!(kind_for_tag("engine_1"), None);
        assert_eq!(kind_for_tag("STRUT_1"), None);
    }

    #[test]
    fn untagged_or_unknown_parts_are_filtered() {
        assert!(Component::discover(&remote(1, None, &[modules::ENGINES])).is_none());
        assert!(Component::discover(&remote(2, Some("LADDER_1"), &[])).is_none());
    }

    #[test]
    fn modules_add_secondary_capabilities() {
        let c = Component::discover(&remote(
            3,
            Some("BPROBE_1"),
            &[modules::COMMAND, modules::DATA_TRANSMITTER, modules::RESOURCE],
        ))
        .unwrap();
        assert_eq!(c.kind(), CapabilityKind::ProbeCore);
        assert!(c.has(CapabilityKind::ProbeCore));
        assert!(c.has(CapabilityKind::Antenna));
        assert!(!c.has(CapabilityKind::Engine));
        assert!(c.state().antenna.is_some());
    }

    #[test]
    fn engine_state_parses_fields_and_status() {
        let sim = SimVessel::new();
        let id = sim.add_part(
            "LV-T45",
            Some("ENGINE_1"),
            &[modules::ENGINES_FX, modules::GIMBAL],
        );
        sim.set_fields(
            id,
            modules::ENGINES_FX,
            &[
                ("Status", "Nominal"),
                ("Thrust", "1.2k"),
                ("Fuel Flow", "garbage"),
                ("Thrust Limiter", "50"),
            ],
        );
        sim.set_fields(id, modules::GIMBAL, &[("Gimbal", "True"), ("Gimbal Limit", "80")]);

        let remote = sim.snapshot_part(id).unwrap();
        let mut c = Component::discover(&remote).unwrap();
        c.update_state(&sim);

        let engine = c.state().engine.as_ref().unwrap();
        assert_eq!(engine.thrust, 1200.0);
        assert_eq!(engine.fuel_flow, 0.0);
        assert_eq!(engine.thrust_limiter, 0.5);
        assert!(engine.gimbal_enabled);
        assert_eq!(engine.gimbal_limit, 80.0);
        assert!(c.is_active());
    }

    #[test]
    fn missing_fields_default_to_neutral_values() {
        let sim = SimVessel::new();
        let id = sim.add_part("Probodobodyne", Some("BPROBE_1"), &[modules::COMMAND]);
        let remote = sim.snapshot_part(id).unwrap();
        let mut c = Component::discover(&remote).unwrap();
        c.update_state(&sim);

        let probe = c.state().probe_core.as_ref().unwrap();
        assert_eq!(probe.command_state, "Unknown");
        assert_eq!(probe.comm_signal, 0.0);
        assert!(!c.is_active());
    }

    #[test]
    fn staged_field_fires_decoupler_latch() {
        let sim = SimVessel::new();
        let id = sim.add_part("TD-12", Some("DECOUPLER_1"), &[modules::DECOUPLE]);
        let mut c = Component::discover(&sim.snapshot_part(id).unwrap()).unwrap();
        c.update_state(&sim);
        assert!(c.is_active());

        sim.set_fields(id, modules::DECOUPLE, &[("staged", "True")]);
        c.update_state(&sim);
        assert!(!c.is_active());

        // Field flipping back never re-arms.
        sim.set_fields(id, modules::DECOUPLE, &[("staged", "False")]);
        c.update_state(&sim);
        assert!(c.state().decoupler.as_ref().unwrap().separation.is_fired());
    }

    #[test]
    fn batteries_and_tanks_are_always_active() {
        let sim = SimVessel::new();
        let id = sim.add_part("Z-100", Some("BATTERY_1"), &[]);
        let mut c = Component::discover(&sim.snapshot_part(id).unwrap()).unwrap();
        c.update_state(&sim);
        assert!(c.is_active());
    }

    #[test]
    fn latch_fires_once() {
        let mut latch = Latch::default();
        assert!(latch.fire());
        assert!(!latch.fire());
        assert!(latch.is_fired());
    }
}
