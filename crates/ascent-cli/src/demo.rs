//! Point-mass physics for the simulated two-stage rocket.
//!
//! The [`SimVessel`] only records what the flight computer commands.  This
//! module closes the loop: it reads the throttle, engine status, clamp and
//! brakes back out of the simulator, integrates a one-dimensional climb and
//! writes altitude and speeds back as telemetry properties.

use std::sync::Arc;
use std::time::Duration;

use ascent_hal::SimVessel;
use ascent_hal::component::modules;
use ascent_types::paths;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

const GRAVITY: f64 = 9.81;
/// Acceleration at full throttle, m/s².
const MAX_THRUST_ACCEL: f64 = 30.0;
const DRAG: f64 = 2.0e-5;
const BRAKE_DRAG_FACTOR: f64 = 5.0;
/// Simulated seconds per wall-clock second.
pub const TIME_WARP: f64 = 5.0;

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FlightState {
    pub altitude: f64,
    pub vertical_speed: f64,
}

/// What the vessel is doing, as far as the physics cares.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inputs {
    pub throttle: f64,
    pub engine_lit: bool,
    pub clamped: bool,
    pub brakes: bool,
}

impl Inputs {
    /// Read the inputs back out of the simulator's part fields.
    pub fn read(sim: &SimVessel) -> Self {
        let field_is = |tag: &str, module: &str, key: &str, value: &str| {
            sim.find_tag(tag)
                .and_then(|id| sim.field(id, module, key))
                .is_some_and(|v| v == value)
        };
        // After separation only the upper stage pushes.
        let engine = if field_is("DECOUPLER_1", modules::DECOUPLE, "staged", "True") {
            "ENGINE_2"
        } else {
            "ENGINE_1"
        };
        Self {
            throttle: sim.throttle(),
            engine_lit: field_is(engine, modules::ENGINES, "Status", "Nominal"),
            clamped: field_is("CLAMP_1", modules::GENERATOR, "Generator", "True"),
            brakes: sim.brakes(),
        }
    }
}

/// Advance `state` by `dt` simulated seconds.
pub fn step(state: FlightState, inputs: Inputs, dt: f64) -> FlightState {
    if inputs.clamped || dt <= 0.0 {
        return FlightState {
            altitude: state.altitude,
            vertical_speed: if inputs.clamped { 0.0 } else { state.vertical_speed },
        };
    }

    let thrust = if inputs.engine_lit {
        inputs.throttle.clamp(0.0, 1.0) * MAX_THRUST_ACCEL
    } else {
        0.0
    };
    let drag_factor = if inputs.brakes { BRAKE_DRAG_FACTOR } else { 1.0 };
    let v = state.vertical_speed;
    let drag = DRAG * drag_factor * v * v.abs();
    let accel = thrust - GRAVITY - drag;

    let vertical_speed = v + accel * dt;
    let altitude = state.altitude + vertical_speed * dt;
    if altitude <= 0.0 {
        FlightState::default()
    } else {
        FlightState {
            altitude,
            vertical_speed,
        }
    }
}

/// Integrate every `period` until `shutdown` flips.
pub fn spawn(
    sim: Arc<SimVessel>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        let dt = period.as_secs_f64() * TIME_WARP;
        let mut state = FlightState {
            altitude: sim.scalar_property(paths::MEAN_ALTITUDE).unwrap_or(0.0),
            vertical_speed: 0.0,
        };
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    state = step(state, Inputs::read(&sim), dt);
                    sim.set_property(paths::MEAN_ALTITUDE, state.altitude);
                    sim.set_property(paths::VERTICAL_SPEED, state.vertical_speed);
                    sim.set_property(paths::SURFACE_SPEED, state.vertical_speed.abs());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(altitude = state.altitude, "physics stopped");
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use ascent_link::VesselLink;
    use ascent_types::ActionTarget;

    fn burning() -> Inputs {
        Inputs {
            throttle: 1.0,
            engine_lit: true,
            clamped: false,
            brakes: false,
        }
    }

    #[test]
    fn clamped_vessel_stays_on_the_pad() {
        let inputs = Inputs {
            clamped: true,
            ..burning()
        };
        assert_eq!(step(FlightState::default(), inputs, 1.0), FlightState::default());
    }

    #[test]
    fn full_throttle_climbs() {
        let mut state = FlightState::default();
        for _ in 0..10 {
            state = step(state, burning(), 0.5);
        }
        assert!(state.altitude > 0.0);
        assert!(state.vertical_speed > 0.0);
    }

    #[test]
    fn unpowered_vessel_falls_back_to_the_ground() {
        let unlit = Inputs {
            engine_lit: false,
            ..burning()
        };
        let mut state = FlightState {
            altitude: 10.0,
            vertical_speed: 0.0,
        };
        for _ in 0..20 {
            state = step(state, unlit, 0.5);
        }
        assert_eq!(state, FlightState::default());
    }

    #[test]
    fn brakes_bleed_more_speed() {
        let coasting = Inputs {
            engine_lit: false,
            ..burning()
        };
        let braking = Inputs {
            brakes: true,
            ..coasting
        };
        let fast = FlightState {
            altitude: 5000.0,
            vertical_speed: 400.0,
        };
        assert!(step(fast, braking, 0.1).vertical_speed < step(fast, coasting, 0.1).vertical_speed);
    }

    #[test]
    fn inputs_follow_the_simulator() {
        let sim = SimVessel::two_stage_rocket();
        let initial = Inputs::read(&sim);
        assert!(initial.clamped);
        assert!(!initial.engine_lit);

        let engine = sim.find_tag("ENGINE_1").unwrap();
        let clamp = sim.find_tag("CLAMP_1").unwrap();
        sim.invoke_action(ActionTarget::Component(engine), "ModuleEngines/Activate Engine", &[])
            .unwrap();
        sim.invoke_action(ActionTarget::Component(clamp), "LaunchClamp/Release Clamp", &[])
            .unwrap();

        let released = Inputs::read(&sim);
        assert!(released.engine_lit);
        assert!(!released.clamped);

        let decoupler = sim.find_tag("DECOUPLER_1").unwrap();
        sim.invoke_action(ActionTarget::Component(decoupler), "ModuleDecouple/Decouple", &[])
            .unwrap();
        // ENGINE_2 has not been lit yet.
        assert!(!Inputs::read(&sim).engine_lit);
    }
}
