//! Bounded PID (Proportional–Integral–Derivative) controller.
//!
//! The controller drives a measured value toward a set-point and clamps its
//! output to an actuator range.  It is hardware-agnostic: the caller feeds the
//! measurement and the elapsed time and applies the output wherever it likes.
//!
//! Two behaviours matter for flight:
//!
//! * **Saturation-gated integral** – the error is only integrated while
//!   `|error|` is below `integrator_saturation_bound`, so a large excursion
//!   (say, on the pad with the set-point 10 km up) does not wind the
//!   integrator up.
//! * **Bumpless set-point changes** – when the set-point moves by more than
//!   `setpoint_deadband` the integral is cleared and the derivative memory is
//!   seeded with the new error, so the jump produces no derivative kick.
//!
//! # Example
//!
//! ```rust
//! use ascent_hal::pid::{PidConfig, PidController, PidGains};
//!
//! let mut pid = PidController::new(PidConfig {
//!     gains: PidGains { kp: 0.05, ki: 0.0, kd: 0.0 },
//!     setpoint: 1000.0,
//!     ..PidConfig::default()
//! });
//!
//! // 1000 m of error saturates the [0, 1] throttle range.
//! assert_eq!(pid.step(0.0, 0.05), 1.0);
//! ```

use tracing::debug;

/// Proportional, integral and derivative gains.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl Default for PidGains {
    fn default() -> Self {
        Self {
            kp: 0.05,
            ki: 0.001,
            kd: 0.01,
        }
    }
}

/// Everything a tuning source can change between cycles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidConfig {
    pub gains: PidGains,
    pub setpoint: f64,
    /// Largest `|error|` still considered on target.
    pub position_tolerance: f64,
    /// Largest `|d(measurement)/dt|` still considered settled.
    pub velocity_tolerance: f64,
    pub output_min: f64,
    pub output_max: f64,
    /// Integrate only while `|error|` is strictly below this.  Defaults to
    /// 1.0; `f64::INFINITY` turns the gate off.
    pub integrator_saturation_bound: f64,
    /// Set-point moves larger than this reset the integrator.
    pub setpoint_deadband: f64,
}

impl Default for PidConfig {
    fn default() -> Self {
        Self {
            gains: PidGains::default(),
            setpoint: 10.0,
            position_tolerance: 1.0,
            velocity_tolerance: 0.1,
            output_min: 0.0,
            output_max: 1.0,
            integrator_saturation_bound: 1.0,
            setpoint_deadband: 0.1,
        }
    }
}

/// `true` iff both the position and the velocity criteria hold.
pub fn at_setpoint(
    error: f64,
    measurement_rate: f64,
    position_tolerance: f64,
    velocity_tolerance: f64,
) -> bool {
    error.abs() <= position_tolerance && measurement_rate.abs() <= velocity_tolerance
}

#[derive(Debug, Clone)]
pub struct PidController {
    config: PidConfig,
    integral: f64,
    error: f64,
    last_error: Option<f64>,
    last_setpoint: f64,
    last_measurement: Option<f64>,
    measurement_rate: f64,
    last_output: f64,
}

impl PidController {
    pub fn new(config: PidConfig) -> Self {
        Self {
            last_setpoint: config.setpoint,
            config,
            integral: 0.0,
            error: 0.0,
            last_error: None,
            last_measurement: None,
            measurement_rate: 0.0,
            last_output: 0.0,
        }
    }

    pub fn config(&self) -> &PidConfig {
        &self.config
    }

    /// Replace gains, set-point and limits.  Takes effect on the next
    /// [`step`][Self::step]; a moved set-point is detected there.
    pub fn set_config(&mut self, config: PidConfig) {
        self.config = config;
    }

    pub fn set_setpoint(&mut self, setpoint: f64) {
        self.config.setpoint = setpoint;
    }

    /// Advance the controller by `dt` seconds.
    ///
    /// A non-positive (or NaN) `dt` leaves every piece of state untouched and
    /// returns the previous output.
    pub fn step(&mut self, measurement: f64, dt: f64) -> f64 {
        if !(dt > 0.0) {
            return self.last_output;
        }

        let PidConfig {
            gains,
            setpoint,
            output_min,
            output_max,
            integrator_saturation_bound,
            setpoint_deadband,
            ..
        } = self.config;

        let error = setpoint - measurement;

        if (setpoint - self.last_setpoint).abs() > setpoint_deadband {
            debug!(
                from = self.last_setpoint,
                to = setpoint,
                "set-point moved, resetting integrator"
            );
            self.integral = 0.0;
            self.last_error = Some(error);
        }
        self.last_setpoint = setpoint;

        if error.abs() < integrator_saturation_bound {
            self.integral += error * dt;
        }

        let derivative = match self.last_error {
            Some(prev) => (error - prev) / dt,
            None => 0.0,
        };
        self.measurement_rate = match self.last_measurement {
            Some(prev) => (measurement - prev) / dt,
            None => 0.0,
        };

        let raw = gains.kp * error + gains.ki * self.integral + gains.kd * derivative;
        // max/min rather than clamp: a hot-reloaded range may be inverted.
        let output = raw.max(output_min).min(output_max);

        self.error = error;
        self.last_error = Some(error);
        self.last_measurement = Some(measurement);
        self.last_output = output;
        output
    }

    /// Both tolerance criteria hold for the most recent step.  `false` before
    /// the first step.
    pub fn is_at_setpoint(&self) -> bool {
        self.last_measurement.is_some()
            && at_setpoint(
                self.error,
                self.measurement_rate,
                self.config.position_tolerance,
                self.config.velocity_tolerance,
            )
    }

    /// Clear the integrator and derivative memory.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_error = None;
        self.last_measurement = None;
        self.measurement_rate = 0.0;
    }

    pub fn error(&self) -> f64 {
        self.error
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn measurement_rate(&self) -> f64 {
        self.measurement_rate
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn config(kp: f64, ki: f64, kd: f64, setpoint: f64) -> PidConfig {
        PidConfig {
            gains: PidGains { kp, ki, kd },
            setpoint,
            output_min: f64::NEG_INFINITY,
            output_max: f64::INFINITY,
            integrator_saturation_bound: f64::INFINITY,
            ..PidConfig::default()
        }
    }

    #[test]
    fn proportional_only_drives_toward_setpoint() {
        let mut pid = PidController::new(config(2.0, 0.0, 0.0, 10.0));
        let output = pid.step(0.0, 0.1);
        assert!((output - 20.0).abs() < 1e-9);
    }

    #[test]
    fn output_clamped_to_unit_range() {
        let mut pid = PidController::new(PidConfig {
            gains: PidGains { kp: 0.05, ki: 0.0, kd: 0.0 },
            setpoint: 1000.0,
            ..PidConfig::default()
        });
        assert_eq!(pid.step(0.0, 0.05), 1.0);

        pid.set_setpoint(-1000.0);
        assert_eq!(pid.step(0.0, 0.05), 0.0);
    }

    #[test]
    fn integral_is_gated_by_saturation_bound() {
        let mut pid = PidController::new(PidConfig {
            integrator_saturation_bound: 5.0,
            ..config(0.0, 1.0, 0.0, 100.0)
        });
        // |error| = 100: outside the bound, nothing accumulates.
        pid.step(0.0, 1.0);
        pid.step(0.0, 1.0);
        assert_eq!(pid.integral(), 0.0);

        // |error| = 2: inside the bound.
        pid.step(98.0, 0.5);
        assert!((pid.integral() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn default_config_gates_the_integral() {
        let mut pid = PidController::new(PidConfig {
            setpoint: 1000.0,
            ..PidConfig::default()
        });
        assert!(pid.config().integrator_saturation_bound.is_finite());
        for _ in 0..200 {
            pid.step(0.0, 0.05);
        }
        assert_eq!(pid.integral(), 0.0);

        // Close to the set-point the integral builds again.
        pid.step(999.5, 0.05);
        assert!((pid.integral() - 0.025).abs() < 1e-9);
    }

    #[test]
    fn setpoint_jump_resets_integral_without_derivative_kick() {
        let mut pid = PidController::new(config(0.0, 1.0, 1.0, 10.0));
        for _ in 0..5 {
            pid.step(9.0, 0.1);
        }
        assert!(pid.integral() > 0.0);

        pid.set_setpoint(200.0);
        let output = pid.step(9.0, 0.1);
        // Integral restarted from zero with one step of the new error, and
        // the derivative saw no change.
        let expected_integral = 191.0 * 0.1;
        assert!((pid.integral() - expected_integral).abs() < 1e-9);
        assert!((output - expected_integral).abs() < 1e-9);
    }

    #[test]
    fn small_setpoint_moves_inside_deadband_keep_integral() {
        let mut pid = PidController::new(config(0.0, 1.0, 0.0, 10.0));
        pid.step(9.0, 1.0);
        pid.set_setpoint(10.05);
        pid.step(9.0, 1.0);
        assert!((pid.integral() - (1.0 + 1.05)).abs() < 1e-9);
    }

    #[test]
    fn non_positive_dt_returns_previous_output_untouched() {
        let mut pid = PidController::new(config(1.0, 1.0, 1.0, 5.0));
        let first = pid.step(0.0, 0.1);
        let integral = pid.integral();

        assert_eq!(pid.step(3.0, 0.0), first);
        assert_eq!(pid.step(3.0, -0.1), first);
        assert_eq!(pid.step(3.0, f64::NAN), first);
        assert_eq!(pid.integral(), integral);
    }

    #[test]
    fn at_setpoint_requires_both_criteria() {
        let mut pid = PidController::new(PidConfig {
            position_tolerance: 1.0,
            velocity_tolerance: 0.1,
            ..config(1.0, 0.0, 0.0, 10.0)
        });
        assert!(!pid.is_at_setpoint());

        pid.step(9.5, 1.0);
        assert!(pid.is_at_setpoint());

        // Within position tolerance but moving fast.
        pid.step(10.5, 1.0);
        assert!(!pid.is_at_setpoint());

        // Settled but off target.
        pid.step(10.5, 1.0);
        pid.step(12.0, 100.0);
        assert!(!pid.is_at_setpoint());
    }

    #[test]
    fn inverted_output_range_does_not_panic() {
        let mut pid = PidController::new(PidConfig {
            output_min: 1.0,
            output_max: 0.0,
            ..PidConfig::default()
        });
        let out = pid.step(0.0, 0.1);
        assert!(out.is_finite());
    }

    proptest! {
        /// `at_setpoint` is exactly the conjunction of the two tolerance tests.
        #[test]
        fn prop_at_setpoint_is_conjunction(
            error in -100.0f64..100.0,
            rate in -10.0f64..10.0,
            pos_tol in 0.0f64..50.0,
            vel_tol in 0.0f64..5.0,
        ) {
            let expected = error.abs() <= pos_tol && rate.abs() <= vel_tol;
            prop_assert_eq!(at_setpoint(error, rate, pos_tol, vel_tol), expected);
        }

        /// Through the controller: after every step `is_at_setpoint` holds
        /// exactly when the error and the measurement rate are both inside
        /// their tolerances.
        #[test]
        fn prop_controller_at_setpoint_matches_tolerances(
            measurements in proptest::collection::vec(-20.0f64..20.0, 1..40),
            setpoint in -10.0f64..10.0,
            pos_tol in 0.0f64..5.0,
            vel_tol in 0.0f64..50.0,
            dt in 0.01f64..1.0,
        ) {
            let mut pid = PidController::new(PidConfig {
                setpoint,
                position_tolerance: pos_tol,
                velocity_tolerance: vel_tol,
                ..PidConfig::default()
            });
            let mut previous: Option<f64> = None;
            for m in measurements {
                pid.step(m, dt);
                let rate = previous.map_or(0.0, |p| (m - p) / dt);
                let expected = (setpoint - m).abs() <= pos_tol && rate.abs() <= vel_tol;
                prop_assert_eq!(pid.is_at_setpoint(), expected);
                previous = Some(m);
            }
        }

        /// The output never leaves the configured range.
        #[test]
        fn prop_output_stays_in_range(
            measurements in proptest::collection::vec(-1.0e4f64..1.0e4, 1..40),
            setpoint in -1.0e4f64..1.0e4,
            dt in 0.001f64..1.0,
        ) {
            let mut pid = PidController::new(PidConfig {
                setpoint,
                ..PidConfig::default()
            });
            for m in measurements {
                let out = pid.step(m, dt);
                prop_assert!((0.0..=1.0).contains(&out));
            }
        }
    }
}
