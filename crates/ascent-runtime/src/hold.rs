//! Hold loops: the PID controller bound to a measurement and an actuator.
//!
//! A [`HoldLoop`] turns one telemetry scalar into an [`ActuatorCommand`].
//! Two instantiations ship with the flight computer:
//!
//! * [`AltitudeHold`] – measurement is the mean altitude, output is the
//!   throttle.
//! * [`VelocityHold`] – measurement is the vertical speed.  When the vessel
//!   climbs faster than the set-point the throttle is cut and the brakes are
//!   engaged; otherwise the output drives the throttle and the brakes are
//!   released.

use ascent_hal::{PidConfig, PidController, PidGains};
use ascent_types::paths;

/// What a loop wants from the vessel-wide control surface this cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActuatorCommand {
    /// `[0, 1]`.
    pub throttle: f64,
    /// `None` leaves the brakes alone.
    pub brakes: Option<bool>,
}

impl ActuatorCommand {
    pub fn throttle(throttle: f64) -> Self {
        Self {
            throttle,
            brakes: None,
        }
    }
}

pub trait HoldLoop: Send {
    /// Tuning-store prefix, e.g. `"Velocity Control"`.
    fn name(&self) -> &str;

    /// Telemetry path of the measurement.
    fn measurement_path(&self) -> &str;

    fn controller(&self) -> &PidController;

    fn controller_mut(&mut self) -> &mut PidController;

    /// Map the controller output and error onto the actuators.
    fn command(&self, output: f64, error: f64) -> ActuatorCommand;

    fn step(&mut self, measurement: f64, dt: f64) -> ActuatorCommand {
        let output = self.controller_mut().step(measurement, dt);
        let error = self.controller().error();
        self.command(output, error)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Altitude hold
// ─────────────────────────────────────────────────────────────────────────────

pub struct AltitudeHold {
    name: String,
    pid: PidController,
}

impl AltitudeHold {
    pub const DEFAULT_NAME: &'static str = "Altitude Control";

    pub fn new(config: PidConfig) -> Self {
        Self::named(Self::DEFAULT_NAME, config)
    }

    pub fn named(name: impl Into<String>, config: PidConfig) -> Self {
        Self {
            name: name.into(),
            pid: PidController::new(config),
        }
    }

    /// Hold `target` metres with the given gains and a `[0, 1]` throttle.
    pub fn with_target(target: f64, gains: PidGains) -> Self {
        Self::new(PidConfig {
            gains,
            setpoint: target,
            ..PidConfig::default()
        })
    }
}

impl HoldLoop for AltitudeHold {
    fn name(&self) -> &str {
        &self.name
    }

    fn measurement_path(&self) -> &str {
        paths::MEAN_ALTITUDE
    }

    fn controller(&self) -> &PidController {
        &self.pid
    }

    fn controller_mut(&mut self) -> &mut PidController {
        &mut self.pid
    }

    fn command(&self, output: f64, _error: f64) -> ActuatorCommand {
        ActuatorCommand::throttle(output.clamp(0.0, 1.0))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Vertical velocity hold
// ─────────────────────────────────────────────────────────────────────────────

pub struct VelocityHold {
    name: String,
    pid: PidController,
}

impl VelocityHold {
    pub const DEFAULT_NAME: &'static str = "Velocity Control";

    pub fn new(config: PidConfig) -> Self {
        Self::named(Self::DEFAULT_NAME, config)
    }

    pub fn named(name: impl Into<String>, config: PidConfig) -> Self {
        Self {
            name: name.into(),
            pid: PidController::new(config),
        }
    }
}

impl Default for VelocityHold {
    /// kP 0.05, kI 0.001, kD 0.01, 10 m/s, tolerances 1.0 and 0.1,
    /// integrating only within 1 m/s of the set-point.
    fn default() -> Self {
        Self::new(PidConfig::default())
    }
}

impl HoldLoop for VelocityHold {
    fn name(&self) -> &str {
        &self.name
    }

    fn measurement_path(&self) -> &str {
        paths::VERTICAL_SPEED
    }

    fn controller(&self) -> &PidController {
        &self.pid
    }

    fn controller_mut(&mut self) -> &mut PidController {
        &mut self.pid
    }

    fn command(&self, output: f64, error: f64) -> ActuatorCommand {
        if error < 0.0 {
            ActuatorCommand {
                throttle: 0.0,
                brakes: Some(true),
            }
        } else {
            ActuatorCommand {
                throttle: output.clamp(0.0, 1.0),
                brakes: Some(false),
            }
        }
    }
}
