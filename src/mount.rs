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

//! Abstract interface to a two-axis, rate-controlled mount.
//!
//! Concrete implementations (serial/USB wire protocols to specific hardware)
//! are external collaborators and out of scope for this crate; only the
//! trait and a small in-memory test double live here.

use crate::axis::{AxisName, PerAxis};
use crate::error::MountError;

/// Operations the control core consumes from a mount.
///
/// Implementations enforce their own rate, acceleration, and per-step
/// limits; `slew` reports back what was actually accepted so the caller
/// (the PID controller, via the `Tracker`) can avoid integrator windup.
pub trait Mount {
    /// The two axes, in canonical order.
    fn axis_names(&self) -> (AxisName, AxisName) {
        (AxisName::Axis0, AxisName::Axis1)
    }

    /// Read encoder positions. Implementations may return a cached reading
    /// when it is younger than `max_cache_age_seconds`.
    fn get_position(&mut self, max_cache_age_seconds: f64) -> Result<PerAxis<f64>, MountError>;

    /// Command a signed slew rate (deg/s) on one axis.
    ///
    /// Returns the accepted rate (which may differ in magnitude from
    /// `rate_deg_per_sec` if a limit clipped it) and whether any limit did
    /// so.
    fn slew(&mut self, axis: AxisName, rate_deg_per_sec: f64) -> Result<(f64, bool), MountError>;

    /// Static slew rate limits, in deg/s, per axis.
    fn max_slew_rates(&self) -> PerAxis<f64>;

    /// Static slew acceleration limits, in deg/s^2, per axis.
    fn max_slew_accels(&self) -> PerAxis<f64>;

    /// Static per-cycle rate-step limits, in deg/s per cycle, per axis.
    fn max_slew_steps(&self) -> PerAxis<f64>;

    /// Whether this mount supports backlash compensation via
    /// [`Mount::remove_backlash`]. Defaults to unsupported; a
    /// `BlindErrorSource` configured for backlash compensation against a
    /// mount that returns `false` here should fail fast at construction.
    fn backlash_supported(&self) -> bool {
        false
    }

    /// Direction (+1 or -1) each axis was slewing during alignment. Used by
    /// backlash compensation to detect when the target is moving against
    /// the slew direction the drive train was aligned against.
    fn aligned_slew_dir(&self) -> PerAxis<i8> {
        PerAxis::new(1, 1)
    }

    /// Correct `pos` for known backlash deadband on the axes flagged in
    /// `axes_to_adjust`. Mounts that don't track backlash return `pos`
    /// unchanged.
    fn remove_backlash(&self, pos: PerAxis<f64>, _axes_to_adjust: PerAxis<bool>) -> PerAxis<f64> {
        pos
    }

    /// Forward-simulate the mount's response to a sequence of rate commands
    /// over a horizon of `t_deltas` (seconds from now). Returns predicted
    /// positions and rates at each horizon point.
    ///
    /// Optional: only required by the model-predictive controller sketch
    /// (`crate::pid::mpc`). The default implementation reports it as
    /// unsupported.
    fn predict(
        &self,
        _t_deltas: &[f64],
        _rate_commands: &[PerAxis<f64>],
    ) -> Result<(Vec<PerAxis<f64>>, Vec<PerAxis<f64>>), MountError> {
        Err(MountError::Unsupported)
    }
}

/// An in-memory test double that records commanded rates and returns an
/// identity response subject to configured limits.
///
/// Grounded in the spec's testable-properties section: "a stubbed Mount
/// that records commanded rates and returns an identity response with
/// configured limits."
pub struct StubMount {
    position: PerAxis<f64>,
    max_rates: PerAxis<f64>,
    max_accels: PerAxis<f64>,
    max_steps: PerAxis<f64>,
    last_commanded_rate: PerAxis<f64>,
    commanded_rate_log: PerAxis<Vec<f64>>,
    axis_limit: PerAxis<Option<(f64, f64)>>,
    aligned_slew_dir: PerAxis<i8>,
    backlash: PerAxis<f64>,
}

impl StubMount {
    pub fn new(max_rates: PerAxis<f64>) -> StubMount {
        StubMount {
            position: PerAxis::new(0.0, 0.0),
            max_rates,
            max_accels: PerAxis::new(f64::INFINITY, f64::INFINITY),
            max_steps: PerAxis::new(f64::INFINITY, f64::INFINITY),
            last_commanded_rate: PerAxis::new(0.0, 0.0),
            commanded_rate_log: PerAxis::new(Vec::new(), Vec::new()),
            axis_limit: PerAxis::new(None, None),
            aligned_slew_dir: PerAxis::new(1, 1),
            backlash: PerAxis::new(0.0, 0.0),
        }
    }

    #[must_use]
    pub fn with_position(mut self, position: PerAxis<f64>) -> StubMount {
        self.position = position;
        self
    }

    /// Configure a hard-stop for `axis` at `[min, max]`, in degrees.
    #[must_use]
    pub fn with_axis_limit(mut self, axis: AxisName, min: f64, max: f64) -> StubMount {
        self.axis_limit[axis] = Some((min, max));
        self
    }

    /// Configure the direction each axis was slewing during alignment, and
    /// a fixed backlash deadband (degrees) per axis, enabling
    /// [`Mount::remove_backlash`] for tests exercising backlash
    /// compensation.
    #[must_use]
    pub fn with_backlash(mut self, aligned_slew_dir: PerAxis<i8>, backlash_deg: PerAxis<f64>) -> StubMount {
        self.aligned_slew_dir = aligned_slew_dir;
        self.backlash = backlash_deg;
        self
    }

    pub fn commanded_rates(&self, axis: AxisName) -> &[f64] {
        &self.commanded_rate_log[axis]
    }

    pub fn set_position(&mut self, position: PerAxis<f64>) {
        self.position = position;
    }
}

impl Mount for StubMount {
    fn get_position(&mut self, _max_cache_age_seconds: f64) -> Result<PerAxis<f64>, MountError> {
        Ok(self.position)
    }

    fn slew(&mut self, axis: AxisName, rate_deg_per_sec: f64) -> Result<(f64, bool), MountError> {
        if let Some((min, max)) = self.axis_limit[axis] {
            let pos = self.position[axis];
            if (pos <= min && rate_deg_per_sec < 0.0) || (pos >= max && rate_deg_per_sec > 0.0) {
                return Err(MountError::AxisLimit { axis });
            }
        }

        let max_rate = self.max_rates[axis];
        let accepted = crate::angle::clamp_magnitude(rate_deg_per_sec, max_rate);
        let limit_exceeded = (accepted - rate_deg_per_sec).abs() > 1e-12;

        self.last_commanded_rate[axis] = accepted;
        self.commanded_rate_log[axis].push(accepted);

        Ok((accepted, limit_exceeded))
    }

    fn max_slew_rates(&self) -> PerAxis<f64> {
        self.max_rates
    }

    fn max_slew_accels(&self) -> PerAxis<f64> {
        self.max_accels
    }

    fn max_slew_steps(&self) -> PerAxis<f64> {
        self.max_steps
    }

    fn backlash_supported(&self) -> bool {
        true
    }

    fn aligned_slew_dir(&self) -> PerAxis<i8> {
        self.aligned_slew_dir
    }

    fn remove_backlash(&self, pos: PerAxis<f64>, axes_to_adjust: PerAxis<bool>) -> PerAxis<f64> {
        PerAxis::from_fn(|axis| {
            if axes_to_adjust[axis] {
                pos[axis] - self.backlash[axis] * self.aligned_slew_dir[axis] as f64
            } else {
                pos[axis]
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_saturates_and_reports_limit_exceeded() {
        let mut mount = StubMount::new(PerAxis::new(1.0, 1.0));
        let (accepted, limit_exceeded) = mount.slew(AxisName::Axis0, 5.0).unwrap();
        assert_eq!(accepted, 1.0);
        assert!(limit_exceeded);
    }

    #[test]
    fn axis_limit_is_reported_as_error() {
        let mut mount = StubMount::new(PerAxis::new(1.0, 1.0))
            .with_position(PerAxis::new(10.0, 0.0))
            .with_axis_limit(AxisName::Axis0, 0.0, 10.0);
        let result = mount.slew(AxisName::Axis0, 0.5);
        assert!(matches!(result, Err(MountError::AxisLimit { .. })));
    }
}
