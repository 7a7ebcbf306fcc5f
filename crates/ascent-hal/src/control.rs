//! Typed action surfaces over discovered components.
//!
//! A surface borrows one [`Component`] mutably together with the link, so
//! the action can update local state (latches, hibernation) in the same call
//! that fires the remote event.  Surfaces are obtained from
//! [`ComponentRegistry`][crate::registry::ComponentRegistry] and only exist
//! for components that carry the matching capability.
//!
//! Every action returns `true` when the remote side accepted it.  A failure
//! is logged with the component id and the action name and goes no further.

use ascent_link::VesselLink;
use ascent_types::{ActionArg, ActionTarget, SasMode};
use tracing::{debug, info, warn};

use crate::component::{modules, Component};
use crate::vessel::VesselControl;

/// Fire `"<module>/<name>"` on `component`.
fn invoke(
    link: &dyn VesselLink,
    component: &Component,
    module: Option<&str>,
    name: &str,
    args: &[ActionArg],
) -> bool {
    let Some(module) = module else {
        warn!(
            component = %component.id(),
            tag = component.tag(),
            action = name,
            "component action failed: module not present"
        );
        return false;
    };
    let action = format!("{module}/{name}");
    match link.invoke_action(ActionTarget::Component(component.id()), &action, args) {
        Ok(()) => {
            debug!(
                component = %component.id(),
                tag = component.tag(),
                action = %action,
                "component action sent"
            );
            true
        }
        Err(error) => {
            warn!(
                component = %component.id(),
                tag = component.tag(),
                action = %action,
                %error,
                "component action failed"
            );
            false
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Engine
// ─────────────────────────────────────────────────────────────────────────────

pub struct EngineControl<'a> {
    pub(crate) component: &'a mut Component,
    pub(crate) link: &'a dyn VesselLink,
}

impl EngineControl<'_> {
    fn module(&self) -> Option<&'static str> {
        self.component
            .first_module(&[modules::ENGINES, modules::ENGINES_FX])
    }

    pub fn activate(&mut self) -> bool {
        let ok = invoke(self.link, self.component, self.module(), "Activate Engine", &[]);
        if ok {
            self.component.active = true;
            info!(component = %self.component.id(), tag = self.component.tag(), "engine ignition");
        }
        ok
    }

    pub fn shutdown(&mut self) -> bool {
        let ok = invoke(self.link, self.component, self.module(), "Shutdown Engine", &[]);
        if ok {
            self.component.active = false;
        }
        ok
    }

    /// Main throttle.  Engines share the vessel throttle, so this is the
    /// vessel-level command.
    pub fn set_throttle(&mut self, value: f64) -> bool {
        VesselControl::new(self.link).set_throttle(value)
    }

    /// Limit this engine's thrust.  `limit` is clamped to `[0, 1]` and sent
    /// as a percentage.
    pub fn set_thrust_limiter(&mut self, limit: f64) -> bool {
        let clamped = if limit.is_nan() { 0.0 } else { limit.clamp(0.0, 1.0) };
        let ok = invoke(
            self.link,
            self.component,
            self.module(),
            "Thrust Limiter",
            &[ActionArg::Float(clamped * 100.0)],
        );
        if ok {
            if let Some(engine) = self.component.state.engine.as_mut() {
                engine.thrust_limiter = clamped;
            }
        }
        ok
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// One-shot separators
// ─────────────────────────────────────────────────────────────────────────────

pub struct DecouplerControl<'a> {
    pub(crate) component: &'a mut Component,
    pub(crate) link: &'a dyn VesselLink,
}

impl DecouplerControl<'_> {
    /// Separate.  A decoupler that already fired is left alone.
    pub fn decouple(&mut self) -> bool {
        if self
            .component
            .state
            .decoupler
            .as_ref()
            .is_some_and(|d| d.separation.is_fired())
        {
            debug!(component = %self.component.id(), "decoupler already fired");
            return true;
        }
        let module = self
            .component
            .first_module(&[modules::DECOUPLE, modules::ANCHORED_DECOUPLER]);
        let ok = invoke(self.link, self.component, module, "Decouple", &[]);
        if ok {
            if let Some(d) = self.component.state.decoupler.as_mut() {
                d.separation.fire();
            }
            self.component.active = false;
            info!(component = %self.component.id(), tag = self.component.tag(), "stage separation");
        }
        ok
    }
}

pub struct FairingControl<'a> {
    pub(crate) component: &'a mut Component,
    pub(crate) link: &'a dyn VesselLink,
}

impl FairingControl<'_> {
    /// Jettison the fairing.  Repeated calls are no-ops.
    pub fn deploy(&mut self) -> bool {
        if self
            .component
            .state
            .fairing
            .as_ref()
            .is_some_and(|f| f.jettison.is_fired())
        {
            return true;
        }
        let module = self.component.first_module(&[modules::PROCEDURAL_FAIRING]);
        let ok = invoke(self.link, self.component, module, "Deploy", &[]);
        if ok {
            if let Some(f) = self.component.state.fairing.as_mut() {
                f.jettison.fire();
            }
            self.component.active = false;
            info!(
                component = %self.component.id(),
                tag = self.component.tag(),
                "fairing jettisoned"
            );
        }
        ok
    }
}

pub struct LaunchClampControl<'a> {
    pub(crate) component: &'a mut Component,
    pub(crate) link: &'a dyn VesselLink,
}

impl LaunchClampControl<'_> {
    /// Release the clamp.  Repeated calls are no-ops.
    pub fn release(&mut self) -> bool {
        if self
            .component
            .state
            .launch_clamp
            .as_ref()
            .is_some_and(|c| c.release.is_fired())
        {
            return true;
        }
        let module = self.component.first_module(&[modules::LAUNCH_CLAMP]);
        let ok = invoke(self.link, self.component, module, "Release Clamp", &[]);
        if ok {
            if let Some(c) = self.component.state.launch_clamp.as_mut() {
                c.release.fire();
            }
            self.component.active = false;
        }
        ok
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Probe core
// ─────────────────────────────────────────────────────────────────────────────

pub struct ProbeCoreControl<'a> {
    pub(crate) component: &'a mut Component,
    pub(crate) link: &'a dyn VesselLink,
}

impl ProbeCoreControl<'_> {
    fn command_module(&self) -> Option<&'static str> {
        self.component.first_module(&[modules::COMMAND])
    }

    fn is_hibernating(&self) -> bool {
        self.component
            .state
            .probe_core
            .as_ref()
            .is_some_and(|p| p.hibernating)
    }

    /// Point the autopilot at `mode` (SAS is switched on as well).
    pub fn set_attitude_hold(&mut self, mode: SasMode) -> bool {
        let vessel = VesselControl::new(self.link);
        let ok = vessel.set_sas(true) && vessel.set_sas_mode(mode);
        if let Some(p) = self.component.state.probe_core.as_mut() {
            p.sas_enabled = ok || p.sas_enabled;
            if ok {
                p.sas_mode = Some(mode);
            }
        }
        ok
    }

    /// Stability assist on, or SAS off.
    pub fn set_stability_assist(&mut self, enabled: bool) -> bool {
        if enabled {
            return self.set_attitude_hold(SasMode::StabilityAssist);
        }
        let ok = VesselControl::new(self.link).set_sas(false);
        if ok {
            if let Some(p) = self.component.state.probe_core.as_mut() {
                p.sas_enabled = false;
            }
        }
        ok
    }

    pub fn set_hibernation(&mut self, hibernate: bool) -> bool {
        let event = if hibernate { "Hibernate" } else { "Activate" };
        let ok = invoke(self.link, self.component, self.command_module(), event, &[]);
        if ok {
            if let Some(p) = self.component.state.probe_core.as_mut() {
                p.hibernating = hibernate;
            }
        }
        ok
    }

    pub fn toggle_control(&mut self) -> bool {
        invoke(self.link, self.component, self.command_module(), "Toggle Control", &[])
    }

    /// Wake the core if needed, then hold stability assist.
    pub fn emergency_stabilize(&mut self) -> bool {
        let awake = !self.is_hibernating() || self.set_hibernation(false);
        let held = self.set_stability_assist(true);
        if !(awake && held) {
            warn!(component = %self.component.id(), awake, held, "emergency stabilize incomplete");
        }
        awake && held
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Deployables
// ─────────────────────────────────────────────────────────────────────────────

pub struct AntennaControl<'a> {
    pub(crate) component: &'a mut Component,
    pub(crate) link: &'a dyn VesselLink,
}

impl AntennaControl<'_> {
    pub fn deploy(&mut self) -> bool {
        self.fire("Extend Antenna", true)
    }

    pub fn retract(&mut self) -> bool {
        self.fire("Retract Antenna", false)
    }

    fn fire(&mut self, event: &str, extended: bool) -> bool {
        let module = self.component.first_module(&[modules::DEPLOYABLE_ANTENNA]);
        let ok = invoke(self.link, self.component, module, event, &[]);
        if ok {
            self.component.active = extended;
        }
        ok
    }
}

pub struct SolarPanelControl<'a> {
    pub(crate) component: &'a mut Component,
    pub(crate) link: &'a dyn VesselLink,
}

impl SolarPanelControl<'_> {
    pub fn deploy(&mut self) -> bool {
        self.fire("Extend Panel", true)
    }

    pub fn retract(&mut self) -> bool {
        self.fire("Retract Panel", false)
    }

    fn fire(&mut self, event: &str, extended: bool) -> bool {
        let module = self
            .component
            .first_module(&[modules::DEPLOYABLE_SOLAR_PANEL]);
        let ok = invoke(self.link, self.component, module, event, &[]);
        if ok {
            self.component.active = extended;
        }
        ok
    }
}
