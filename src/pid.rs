// Tracker Core — closed-loop telescope pointing control
// Copyright (C) 2026 Tracker Core contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License version 3
// as published by the Free Software Foundation.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.
//

//! Per-axis PID controller with adaptive gains.
//!
//! Gains are recomputed each call from the *actual* measured inter-sample
//! period rather than an assumed fixed loop rate, so loop dynamics stay
//! correct under jitter in the calling cycle.

use crate::filter::MovingAverageFilter;
use std::time::{Duration, Instant};

/// Source of "now" for the controller. Abstracted so tests can drive the
/// controller with a virtual clock instead of real sleeps.
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The real wall clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Gains for [`PIDController`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PIDGains {
    pub proportional: f64,
    pub integral: f64,
    pub derivative: f64,
    /// Max depth, in seconds, of the derivative term's moving-average filter.
    pub derivative_filter_depth: f64,
}

impl PIDGains {
    /// Build gains from a target closed-loop bandwidth (Hz) and damping
    /// factor, per the ideal continuous-time P+I coefficients:
    /// `P = 4*zeta*B / (zeta + 1/(4*zeta))`, `I = 4*B^2 / (zeta + 1/(4*zeta))^2`.
    pub fn from_bandwidth(bandwidth_hz: f64, damping_factor: f64) -> PIDGains {
        let denom = damping_factor + 1.0 / (4.0 * damping_factor);
        let proportional = 4.0 * damping_factor / denom * bandwidth_hz;
        let integral = 4.0 / denom.powi(2) * bandwidth_hz.powi(2);
        PIDGains {
            proportional,
            integral,
            derivative: 0.0,
            derivative_filter_depth: 0.1,
        }
    }

    /// Derive the proportional gain from an integral gain and damping
    /// factor: `P = 2*zeta*sqrt(I)`. Useful when the integral gain was
    /// chosen directly to hit a target steady-state error against a known
    /// target acceleration (steady-state error = `2*accel/I`).
    pub fn from_integral_gain(integral_gain: f64, damping_factor: f64) -> PIDGains {
        PIDGains {
            proportional: 2.0 * damping_factor * integral_gain.sqrt(),
            integral: integral_gain,
            derivative: 0.0,
            derivative_filter_depth: 0.1,
        }
    }

    #[must_use]
    pub fn with_derivative(mut self, derivative: f64, filter_depth: f64) -> PIDGains {
        self.derivative = derivative;
        self.derivative_filter_depth = filter_depth;
        self
    }
}

/// A single-axis PID controller whose coefficients adapt to the measured
/// inter-sample period on every call to [`PIDController::update`].
pub struct PIDController<C: Clock = SystemClock> {
    gains: PIDGains,
    max_update_period: f64,
    derivative_filter: MovingAverageFilter,
    integrator: f64,
    error_prev: Option<f64>,
    last_iteration_time: Option<Instant>,
    clock: C,
}

impl PIDController<SystemClock> {
    /// `max_update_period` is in seconds; calls spaced further apart than
    /// this are treated as a pathological pause (see [`PIDController::update`]).
    pub fn new(gains: PIDGains, max_update_period: f64) -> PIDController<SystemClock> {
        PIDController::with_clock(gains, max_update_period, SystemClock)
    }
}

impl<C: Clock> PIDController<C> {
    pub fn with_clock(gains: PIDGains, max_update_period: f64, clock: C) -> PIDController<C> {
        PIDController {
            derivative_filter: MovingAverageFilter::new(gains.derivative_filter_depth),
            gains,
            max_update_period,
            integrator: 0.0,
            error_prev: None,
            last_iteration_time: None,
            clock,
        }
    }

    /// Reset to initial state: zero integrator, no memory of previous error
    /// or sample time, empty derivative filter.
    pub fn reset(&mut self) {
        self.integrator = 0.0;
        self.error_prev = None;
        self.last_iteration_time = None;
        self.derivative_filter.reset();
    }

    /// Current integrator value, in the controller's output units (deg/s).
    pub fn integrator(&self) -> f64 {
        self.integrator
    }

    /// Clamp the integrator's magnitude to `rate`. Call this after the mount
    /// reports that a commanded rate was clipped, to prevent windup.
    pub fn clamp_integrator(&mut self, rate: f64) {
        self.integrator = crate::angle::clamp_magnitude(self.integrator, rate.abs());
    }

    /// Feed a new error measurement (in degrees) and get back a commanded
    /// rate (deg/s).
    ///
    /// On the first call after construction or `reset()`, the inter-sample
    /// period is unknown: the integrator is left untouched and the return
    /// value is the proportional term plus the (zero) integrator.
    ///
    /// If the measured period exceeds `max_update_period`, neither the
    /// integrator nor the derivative term are updated, and the previous
    /// integrator value is returned unchanged — this rejects pathological
    /// pauses in the calling cycle rather than applying a huge, stale
    /// derivative or integral kick.
    pub fn update(&mut self, error: f64) -> f64 {
        let now = self.clock.now();

        let update_period = match self.last_iteration_time {
            None => {
                self.last_iteration_time = Some(now);
                self.error_prev = Some(error);
                return self.gains.proportional * error + self.integrator;
            }
            Some(last) => now.duration_since(last).as_secs_f64(),
        };
        self.last_iteration_time = Some(now);

        if update_period > self.max_update_period {
            log::warn!(
                "{:.0} ms since last PID update, limit is {:.0} ms; integrator not updated",
                1e3 * update_period,
                1e3 * self.max_update_period
            );
            return self.integrator;
        }

        let prop_term = self.gains.proportional * error;
        self.integrator += self.gains.integral * error * update_period;

        let derivative_term = match self.error_prev {
            Some(prev) => {
                let diff = (error - prev) / update_period;
                let filtered = self.derivative_filter.advance(diff, update_period);
                self.gains.derivative * filtered
            }
            None => 0.0,
        };
        self.error_prev = Some(error);

        prop_term + self.integrator + derivative_term
    }

    /// Elapsed time since the last call to `update`, or `None` before the
    /// first call / immediately after `reset()`.
    pub fn time_since_last_update(&self) -> Option<Duration> {
        self.last_iteration_time.map(|t| self.clock.now().duration_since(t))
    }
}

/// Sketch of a model-predictive controller using [`crate::mount::Mount::predict`]
/// to look ahead over a command horizon, rather than reacting to the
/// instantaneous error alone.
///
/// Unimplemented: the original Python carries the same class as an
/// incomplete stub (its `update` body is `raise NotImplementedError`). The
/// PID path above is the one actually used by `Tracker`; this type exists
/// so the intended extension point is visible rather than silently absent.
pub struct MpcController {
    pub horizon: Vec<f64>,
}

impl MpcController {
    pub fn new(horizon: Vec<f64>) -> MpcController {
        MpcController { horizon }
    }

    pub fn update(&mut self, _mount: &dyn crate::mount::Mount, _error: f64) -> Result<f64, crate::error::MountError> {
        Err(crate::error::MountError::Unsupported)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    /// A manually-advanced clock for deterministic control-loop tests.
    #[derive(Clone)]
    struct VirtualClock(Rc<Cell<Instant>>);

    impl VirtualClock {
        fn new() -> VirtualClock {
            VirtualClock(Rc::new(Cell::new(Instant::now())))
        }

        fn advance(&self, d: Duration) {
            self.0.set(self.0.get() + d);
        }
    }

    impl Clock for VirtualClock {
        fn now(&self) -> Instant {
            self.0.get()
        }
    }

    #[test]
    fn first_update_does_not_touch_integrator() {
        let gains = PIDGains {
            proportional: 2.0,
            integral: 40.0,
            derivative: 0.0,
            derivative_filter_depth: 0.1,
        };
        let mut pid = PIDController::new(gains, 0.1);
        let out = pid.update(1.0);
        assert!((out - 2.0).abs() < 1e-9);
        assert_eq!(pid.integrator(), 0.0);
    }

    #[test]
    fn clamp_integrator_bounds_magnitude() {
        let gains = PIDGains {
            proportional: 2.0,
            integral: 40.0,
            derivative: 0.0,
            derivative_filter_depth: 0.1,
        };
        let clock = VirtualClock::new();
        let mut pid = PIDController::with_clock(gains, 0.1, clock.clone());
        pid.update(5.0);
        clock.advance(Duration::from_millis(50));
        let r = pid.update(5.0);
        pid.clamp_integrator(r.abs());
        assert!(pid.integrator().abs() <= r.abs() + 1e-9);
    }

    #[test]
    fn exceeding_max_update_period_holds_integrator_and_skips_derivative() {
        let gains = PIDGains {
            proportional: 1.0,
            integral: 10.0,
            derivative: 0.0,
            derivative_filter_depth: 0.1,
        };
        let clock = VirtualClock::new();
        let mut pid = PIDController::with_clock(gains, 0.1, clock.clone());

        let first = pid.update(0.1);
        assert!((first - 0.1).abs() < 1e-9);
        let integrator_before = pid.integrator();

        clock.advance(Duration::from_millis(500)); // 5x max_update_period
        let second = pid.update(0.1);

        assert_eq!(second, integrator_before);
        assert_eq!(pid.integrator(), integrator_before);
    }

    #[test]
    fn gains_from_bandwidth_match_closed_form() {
        let bandwidth = 1.0;
        let damping = std::f64::consts::SQRT_2 / 2.0;
        let gains = PIDGains::from_bandwidth(bandwidth, damping);
        let denom = damping + 1.0 / (4.0 * damping);
        assert!((gains.proportional - 4.0 * damping / denom * bandwidth).abs() < 1e-12);
        assert!((gains.integral - 4.0 / denom.powi(2) * bandwidth.powi(2)).abs() < 1e-12);
    }

    #[test]
    fn constant_acceleration_converges_near_two_accel_over_integral_gain() {
        // Scenario 2 from the spec: constant 0.2 deg/s^2 target acceleration,
        // I = 40 => steady state error should approach 2*0.2/40 = 0.01 deg.
        let integral_gain = 40.0;
        let damping = std::f64::consts::SQRT_2 / 2.0;
        let gains = PIDGains::from_integral_gain(integral_gain, damping);
        let clock = VirtualClock::new();
        let mut pid = PIDController::with_clock(gains, 0.1, clock.clone());

        let dt = 0.05;
        let accel = 0.2_f64;
        let mut target_pos = 0.0;
        let mut target_vel = 0.0;
        let mut mount_pos = 0.0;
        let mut last_error = 0.0;

        pid.update(target_pos - mount_pos);
        for _ in 0..(10.0 / dt) as usize {
            clock.advance(Duration::from_secs_f64(dt));
            target_vel += accel * dt;
            target_pos += target_vel * dt;
            let error = target_pos - mount_pos;
            let rate = pid.update(error);
            mount_pos += rate * dt;
            last_error = error;
        }

        let expected_steady_state = 2.0 * accel / integral_gain;
        assert!(
            last_error.abs() < 1.2 * expected_steady_state,
            "error {last_error} not within 20% of {expected_steady_state}"
        );
    }
}
