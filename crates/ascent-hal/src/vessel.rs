//! Vessel-wide control surface: main throttle, staging, brakes and SAS.

use ascent_link::VesselLink;
use ascent_types::{ActionArg, ActionTarget, SasMode};
use tracing::{debug, warn};

pub mod actions {
    pub const THROTTLE: &str = "throttle";
    pub const ACTIVATE_NEXT_STAGE: &str = "activate_next_stage";
    pub const BRAKES: &str = "brakes";
    pub const SAS: &str = "sas";
    pub const SAS_MODE: &str = "sas_mode";
}

/// Borrowed handle over the vessel's control surface.
///
/// Every action returns `true` on success.  Failures are logged and
/// swallowed.
#[derive(Clone, Copy)]
pub struct VesselControl<'a> {
    link: &'a dyn VesselLink,
}

impl<'a> VesselControl<'a> {
    pub fn new(link: &'a dyn VesselLink) -> Self {
        Self { link }
    }

    /// Set the main throttle, clamped to `[0, 1]`.
    pub fn set_throttle(&self, value: f64) -> bool {
        let clamped = if value.is_nan() { 0.0 } else { value.clamp(0.0, 1.0) };
        self.invoke(actions::THROTTLE, &[ActionArg::Float(clamped)])
    }

    pub fn activate_next_stage(&self) -> bool {
        self.invoke(actions::ACTIVATE_NEXT_STAGE, &[])
    }

    pub fn set_brakes(&self, engaged: bool) -> bool {
        self.invoke(actions::BRAKES, &[ActionArg::Bool(engaged)])
    }

    pub fn set_sas(&self, enabled: bool) -> bool {
        self.invoke(actions::SAS, &[ActionArg::Bool(enabled)])
    }

    pub fn set_sas_mode(&self, mode: SasMode) -> bool {
        self.invoke(
            actions::SAS_MODE,
            &[ActionArg::Text(mode.wire_name().to_string())],
        )
    }

    fn invoke(&self, action: &str, args: &[ActionArg]) -> bool {
        match self.link.invoke_action(ActionTarget::Vessel, action, args) {
            Ok(()) => {
                debug!(target_surface = "vessel", action, ?args, "vessel action sent");
                true
            }
            Err(error) => {
                warn!(component = "vessel", action, %error, "vessel action failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimVessel;

    #[test]
    fn throttle_is_clamped_before_sending() {
        let sim = SimVessel::new();
        let vessel = VesselControl::new(&sim);
        assert!(vessel.set_throttle(1.7));
        assert_eq!(sim.throttle(), 1.0);
        assert!(vessel.set_throttle(-0.3));
        assert_eq!(sim.throttle(), 0.0);
        assert!(vessel.set_throttle(0.42));
        assert_eq!(sim.throttle(), 0.42);
    }

    #[test]
    fn sas_mode_goes_out_by_wire_name() {
        let sim = SimVessel::new();
        let vessel = VesselControl::new(&sim);
        assert!(vessel.set_sas_mode(SasMode::Prograde));
        let last = sim.invoked().pop().unwrap();
        assert_eq!(last.action, actions::SAS_MODE);
        assert_eq!(last.args, vec![ActionArg::Text("PROGRADE".into())]);
    }

    #[test]
    fn failures_are_reported_not_raised() {
        let sim = SimVessel::new();
        sim.fail_action(actions::ACTIVATE_NEXT_STAGE);
        let vessel = VesselControl::new(&sim);
        assert!(!vessel.activate_next_stage());
        assert!(vessel.set_brakes(true));
        assert!(sim.brakes());
    }
}
