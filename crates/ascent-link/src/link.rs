//! The remote-control collaborator contract.
//!
//! The transport is whatever RPC protocol reaches the vessel.  The core never
//! speaks that protocol directly.  It calls a [`VesselLink`] and treats every
//! failure as a value.

use std::collections::HashMap;

use ascent_types::{
    ActionArg, ActionTarget, AscentError, ComponentId, RemoteComponent, TelemetryValue,
};

/// Every vessel transport must implement this trait.
///
/// # Contract
///
/// * `read_property` – cheap, repeatable read of a named property.  Called
///   from the telemetry push path only, never from the control cycle.
/// * `invoke_action` – fire a named action/event on a component or on the
///   vessel-wide control surface.
/// * `enumerate_components` – list every part currently on the vessel.
/// * `module_fields` – the field map of one module on one part, used by
///   the registry's state refresh.
///
/// Implementations should serve enumeration and field reads from their own
/// cache; the control cycle calls them once per refresh interval.
///
/// # Action names
///
/// Component actions are addressed as `"<module>/<name>"`.  With no
/// arguments the name is a module event (`"ModuleDecouple/Decouple"`); with
/// one argument it is a field write (`"ModuleEngines/Thrust Limiter"`,
/// `[Float(75.0)]`).  Vessel actions use bare names: `throttle`,
/// `activate_next_stage`, `brakes`, `sas`, `sas_mode`.
pub trait VesselLink: Send + Sync {
    fn read_property(&self, path: &str) -> Result<TelemetryValue, AscentError>;

    fn invoke_action(
        &self,
        target: ActionTarget,
        action: &str,
        args: &[ActionArg],
    ) -> Result<(), AscentError>;

    fn enumerate_components(&self) -> Result<Vec<RemoteComponent>, AscentError>;

    fn module_fields(
        &self,
        id: ComponentId,
        module: &str,
    ) -> Result<HashMap<String, String>, AscentError>;
}
