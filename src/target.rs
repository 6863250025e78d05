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

//! Polymorphic target-position providers.
//!
//! A concrete ephemeris engine (TLE propagation, named-body catalogs) is an
//! external collaborator — this is not a planetarium. This module provides
//! the `Target` interface, a handful of concrete targets useful for testing
//! and for simple fixed/simulated cases, and a generic adapter
//! (`FunctionTarget`) for plugging in an externally-computed ephemeris.

use crate::angle::{deg, Angle};
use crate::axis::{MeridianSide, PerAxis};
use crate::error::TrackError;
use crate::model::{Location, MountModel, SkyCoord};
use chrono::{DateTime, Utc};

/// A target's position at a point in time, consistent via the mount model.
#[derive(Debug, Clone, Copy)]
pub struct TargetPosition {
    pub time: DateTime<Utc>,
    pub world: SkyCoord,
    pub encoder: PerAxis<Angle>,
}

/// A provider of target positions.
///
/// `get_position` failing with `IndeterminatePosition` is a normal,
/// recoverable outcome (e.g., a computer-vision target briefly losing the
/// object), not a programming error.
pub trait Target {
    fn get_position(&mut self, t: DateTime<Utc>) -> Result<TargetPosition, TrackError>;

    /// Read and process sensor data associated with this target type. Called
    /// once near the start of a control cycle, before `get_position`. No-op
    /// for targets with no associated sensor (ephemeris, fixed).
    fn process_sensor_data(&mut self) {}
}

/// A target at a fixed position in the sky (e.g. a landmark, a star for
/// alignment testing). Does not move with time.
pub struct FixedTarget {
    world: SkyCoord,
    encoder: PerAxis<Angle>,
}

impl FixedTarget {
    pub fn new(world: SkyCoord, mount_model: &MountModel, meridian_side: MeridianSide, location: &Location) -> FixedTarget {
        // Any fixed reference epoch works since the position does not change;
        // `t` only affects sidereal-time-dependent encoder math, which is
        // captured once here rather than recomputed on every `get_position`.
        let t = Utc::now();
        let encoder = mount_model.world_to_mount(world, meridian_side, t, location);
        FixedTarget { world, encoder }
    }
}

impl Target for FixedTarget {
    fn get_position(&mut self, t: DateTime<Utc>) -> Result<TargetPosition, TrackError> {
        Ok(TargetPosition {
            time: t,
            world: self.world,
            encoder: self.encoder,
        })
    }
}

/// A target whose mount-encoder position accelerates at a constant rate in
/// each axis, starting from zero velocity at the moment of the first call to
/// `get_position`. Useful for exercising the PID's steady-state error under
/// constant acceleration (see the control-loop test scenarios).
pub struct AcceleratingEncoderTarget {
    mount_model: MountModel,
    location: Location,
    initial: PerAxis<Angle>,
    /// deg/s^2, per axis.
    accel: PerAxis<f64>,
    time_start: Option<DateTime<Utc>>,
}

impl AcceleratingEncoderTarget {
    pub fn new(
        mount_model: MountModel,
        location: Location,
        initial: PerAxis<Angle>,
        accel: PerAxis<f64>,
    ) -> AcceleratingEncoderTarget {
        AcceleratingEncoderTarget {
            mount_model,
            location,
            initial,
            accel,
            time_start: None,
        }
    }
}

impl Target for AcceleratingEncoderTarget {
    fn get_position(&mut self, t: DateTime<Utc>) -> Result<TargetPosition, TrackError> {
        let time_start = *self.time_start.get_or_insert(t);
        let elapsed = (t - time_start).num_milliseconds() as f64 / 1000.0;

        let encoder = PerAxis::new(
            Angle::longitude(self.initial.axis0.as_deg() + self.accel.axis0 * elapsed * elapsed),
            Angle::longitude(self.initial.axis1.as_deg() + self.accel.axis1 * elapsed * elapsed),
        );
        let world = self.mount_model.mount_to_world(encoder, t, &self.location);

        Ok(TargetPosition { time: t, world, encoder })
    }
}

/// A target moving at a steady angular rate along a great-circle path in
/// the world (RA/Dec) frame, crossing the starting point at `t0`. Modeled
/// after a satellite or aircraft pass overhead at a constant rate.
pub struct ConstantRateTarget {
    mount_model: MountModel,
    location: Location,
    meridian_side: MeridianSide,
    start: SkyCoord,
    /// Direction of motion, as (d(ra)/dt, d(dec)/dt) in deg/s.
    rate: (f64, f64),
    time_start: DateTime<Utc>,
}

impl ConstantRateTarget {
    pub fn new(
        mount_model: MountModel,
        location: Location,
        meridian_side: MeridianSide,
        start: SkyCoord,
        rate_deg_per_s: (f64, f64),
        time_start: DateTime<Utc>,
    ) -> ConstantRateTarget {
        ConstantRateTarget {
            mount_model,
            location,
            meridian_side,
            start,
            rate: rate_deg_per_s,
            time_start,
        }
    }
}

impl Target for ConstantRateTarget {
    fn get_position(&mut self, t: DateTime<Utc>) -> Result<TargetPosition, TrackError> {
        let elapsed = (t - self.time_start).num_milliseconds() as f64 / 1000.0;
        let world = SkyCoord {
            ra: Angle::longitude(self.start.ra.as_deg() + self.rate.0 * elapsed),
            dec: deg(self.start.dec.as_deg() + self.rate.1 * elapsed),
        };
        let encoder = self.mount_model.world_to_mount(world, self.meridian_side, t, &self.location);
        Ok(TargetPosition { time: t, world, encoder })
    }
}

/// Adapts an externally-computed ephemeris (TLE propagation, a named-body
/// catalog lookup, a planetarium library, ...) into a `Target`. The core
/// never computes orbital or stellar ephemerides itself; it only consumes
/// whatever function produces a sky coordinate for a given time.
pub struct FunctionTarget<F>
where
    F: FnMut(DateTime<Utc>) -> Result<SkyCoord, TrackError>,
{
    compute: F,
    mount_model: MountModel,
    location: Location,
    meridian_side: MeridianSide,
}

impl<F> FunctionTarget<F>
where
    F: FnMut(DateTime<Utc>) -> Result<SkyCoord, TrackError>,
{
    pub fn new(compute: F, mount_model: MountModel, location: Location, meridian_side: MeridianSide) -> FunctionTarget<F> {
        FunctionTarget {
            compute,
            mount_model,
            location,
            meridian_side,
        }
    }
}

impl<F> Target for FunctionTarget<F>
where
    F: FnMut(DateTime<Utc>) -> Result<SkyCoord, TrackError>,
{
    fn get_position(&mut self, t: DateTime<Utc>) -> Result<TargetPosition, TrackError> {
        let world = (self.compute)(t)?;
        let encoder = self.mount_model.world_to_mount(world, self.meridian_side, t, &self.location);
        Ok(TargetPosition { time: t, world, encoder })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelParameters;
    use chrono::Duration as ChronoDuration;

    fn location() -> Location {
        Location {
            latitude_deg: 40.0,
            longitude_deg: -105.0,
            elevation_m: 1600.0,
        }
    }

    #[test]
    fn accelerating_target_starts_at_rest_and_matches_quadratic_law() {
        let mut target = AcceleratingEncoderTarget::new(
            MountModel::new(ModelParameters::IDENTITY),
            location(),
            PerAxis::new(Angle::longitude(10.0), Angle::longitude(20.0)),
            PerAxis::new(0.1, -0.2),
        );

        let t0 = Utc::now();
        let p0 = target.get_position(t0).unwrap();
        assert!((p0.encoder.axis0.as_deg() - 10.0).abs() < 1e-9);

        let p1 = target.get_position(t0 + ChronoDuration::seconds(10)).unwrap();
        let expected_axis0 = 10.0 + 0.1 * 10.0_f64 * 10.0_f64;
        assert!((p1.encoder.axis0.as_deg() - expected_axis0).abs() < 1e-6);
    }

    #[test]
    fn constant_rate_target_advances_linearly() {
        let t0 = Utc::now();
        let mut target = ConstantRateTarget::new(
            MountModel::new(ModelParameters::IDENTITY),
            location(),
            MeridianSide::West,
            SkyCoord {
                ra: Angle::longitude(100.0),
                dec: deg(10.0),
            },
            (1.0, 0.0),
            t0,
        );

        let p = target.get_position(t0 + ChronoDuration::seconds(5)).unwrap();
        assert!((p.world.ra.as_deg() - 105.0).abs() < 1e-9);
    }
}
