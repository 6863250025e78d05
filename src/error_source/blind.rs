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

//! Error source driven purely by a target's predicted ephemeris and the
//! mount model — no sensor feedback.

use super::{ErrorSource, PointingError};
use crate::angle::{deg, wrap_error, Angle};
use crate::axis::{AxisName, MeridianSide, PerAxis};
use crate::error::TrackError;
use crate::model::{Location, MountModel};
use crate::mount::Mount;
use crate::target::Target;
use chrono::{Duration, Utc};

/// How far in the past to sample the target's position, purely to derive a
/// local motion-direction vector. Far enough apart that the two samples'
/// separation is not swamped by ephemeris/encoder noise.
const MOTION_SAMPLE_INTERVAL_S: i64 = 10;

/// Computes pointing error from a [`Target`]'s predicted position and a
/// [`Mount`]'s reported encoder position, with no camera or other sensor in
/// the loop.
///
/// Tracks which side of the meridian the mount currently favors; an
/// equatorial mount approaching its hour-angle cable-wrap limit calls
/// [`BlindErrorSource::flip_meridian_side`] to have subsequent error
/// computations target the other (equivalent) encoder solution.
pub struct BlindErrorSource<T, M> {
    target: T,
    mount: M,
    mount_model: MountModel,
    location: Location,
    meridian_side: MeridianSide,
    backlash_compensation: bool,
    mount_position_max_age_s: f64,
    offset_callback: Option<Box<dyn FnMut() -> (f64, f64)>>,
}

impl<T, M> BlindErrorSource<T, M>
where
    T: Target,
    M: Mount,
{
    pub fn new(
        target: T,
        mount: M,
        mount_model: MountModel,
        location: Location,
        meridian_side: MeridianSide,
    ) -> BlindErrorSource<T, M> {
        BlindErrorSource {
            target,
            mount,
            mount_model,
            location,
            meridian_side,
            backlash_compensation: false,
            mount_position_max_age_s: 0.25,
            offset_callback: None,
        }
    }

    /// Enable backlash compensation. Returns an error if `mount` doesn't
    /// support it (mirrors the original's constructor-time check).
    pub fn with_backlash_compensation(mut self) -> Result<BlindErrorSource<T, M>, TrackError> {
        if !self.mount.backlash_supported() {
            return Err(TrackError::Fatal("mount does not support backlash compensation".into()));
        }
        self.backlash_compensation = true;
        Ok(self)
    }

    pub fn meridian_side(&self) -> MeridianSide {
        self.meridian_side
    }

    /// Switch which side of the meridian subsequent error computations
    /// target. Called by the tracker when an equatorial mount's hour angle
    /// approaches its cable-wrap limit.
    pub fn flip_meridian_side(&mut self) {
        self.meridian_side = self.meridian_side.flipped();
        log::info!("blind error source: flipped meridian side to {}", self.meridian_side);
    }

    /// Register a callback producing a manual offset, in degrees, to be
    /// applied to every subsequent computed target position: the first
    /// component is along the target's current motion direction, the
    /// second is perpendicular to it (e.g. a hand-paddle nudge). Pass
    /// `None` to un-register.
    pub fn register_offset_callback(&mut self, callback: impl FnMut() -> (f64, f64) + 'static) {
        self.offset_callback = Some(Box::new(callback));
    }

    pub fn clear_offset_callback(&mut self) {
        self.offset_callback = None;
    }

    pub fn target_mut(&mut self) -> &mut T {
        &mut self.target
    }

    pub fn mount_mut(&mut self) -> &mut M {
        &mut self.mount
    }
}

impl<T, M> ErrorSource for BlindErrorSource<T, M>
where
    T: Target,
    M: Mount,
{
    fn axis_names(&self) -> (AxisName, AxisName) {
        self.mount.axis_names()
    }

    fn compute_error(&mut self, _retries: u32) -> Result<PointingError, TrackError> {
        self.target.process_sensor_data();

        let now = Utc::now();
        let a_while_ago = now - Duration::seconds(MOTION_SAMPLE_INTERVAL_S);

        let target_now = match self.target.get_position(now) {
            Ok(p) => p,
            Err(TrackError::IndeterminatePosition(msg)) => {
                log::debug!("blind error source: target position indeterminate: {msg}");
                return Ok(PointingError::NoSignal);
            }
            Err(e) => return Err(e),
        };
        let target_prev = match self.target.get_position(a_while_ago) {
            Ok(p) => p,
            Err(TrackError::IndeterminatePosition(_)) => target_now,
            Err(e) => return Err(e),
        };

        let target_enc_now = self
            .mount_model
            .world_to_mount(target_now.world, self.meridian_side, now, &self.location);
        let mut target_enc = PerAxis::new(target_enc_now.axis0.as_deg(), target_enc_now.axis1.as_deg());
        let target_enc_prev = self
            .mount_model
            .world_to_mount(target_prev.world, self.meridian_side, a_while_ago, &self.location);

        // Motion direction over the sampling interval, in the encoder frame:
        // used both for the offset callback's along/cross decomposition and
        // for deciding which axes need backlash compensation.
        let motion = PerAxis::new(
            wrap_error(target_enc.axis0 - target_enc_prev.axis0.as_deg()),
            wrap_error(target_enc.axis1 - target_enc_prev.axis1.as_deg()),
        );
        let motion_norm = (motion.axis0 * motion.axis0 + motion.axis1 * motion.axis1).sqrt();

        if let Some(callback) = self.offset_callback.as_mut() {
            let (offset_along, offset_cross) = callback();
            if motion_norm > 1e-9 {
                let (u0, u1) = (motion.axis0 / motion_norm, motion.axis1 / motion_norm);
                target_enc.axis0 += offset_along * u0 - offset_cross * u1;
                target_enc.axis1 += offset_along * u1 + offset_cross * u0;
            } else {
                // No well-defined motion direction (e.g. a stationary
                // target): apply the along-motion component on axis0 only.
                target_enc.axis0 += offset_along;
                target_enc.axis1 += offset_cross;
            }
        }

        let mut mount_enc = self.mount.get_position(self.mount_position_max_age_s)?;

        if self.backlash_compensation {
            let motion_dir = PerAxis::new(
                motion.axis0.signum() as i8,
                motion.axis1.signum() as i8,
            );
            let aligned_dir = self.mount.aligned_slew_dir();
            let axes_to_adjust = PerAxis::new(
                motion.axis0.abs() > 1e-9 && aligned_dir.axis0 != motion_dir.axis0,
                motion.axis1.abs() > 1e-9 && aligned_dir.axis1 != motion_dir.axis1,
            );
            mount_enc = self.mount.remove_backlash(mount_enc, axes_to_adjust);
        }

        let mount_enc_angle = PerAxis::new(Angle::longitude(mount_enc.axis0), Angle::longitude(mount_enc.axis1));
        let mount_side = self.mount_model.encoder_side(mount_enc_angle);

        // axis1 (declination-like): which physical side of the meridian the
        // mount is actually on, versus the *preferred* side, changes which
        // of two equivalent formulas applies.
        let axis1_err = match (self.meridian_side, mount_side) {
            (MeridianSide::East, MeridianSide::East) => mount_enc.axis1 - target_enc.axis1,
            (MeridianSide::East, MeridianSide::West) => 180.0 - mount_enc.axis1 - target_enc.axis1,
            (MeridianSide::West, MeridianSide::East) => target_enc.axis1 + mount_enc.axis1 - 180.0,
            (MeridianSide::West, MeridianSide::West) => target_enc.axis1 - mount_enc.axis1,
        };

        // axis0 (right-ascension-like): same east/west split, plus a check
        // that the implied target position doesn't require crossing the
        // counterweight-up limit region.
        let mut axis0_err = if self.meridian_side == mount_side {
            wrap_error(mount_enc.axis0 - target_enc.axis0)
        } else {
            wrap_error(mount_enc.axis0 - target_enc.axis0 + 180.0)
        };
        let implied_target = mount_enc.axis0 - axis0_err;
        if implied_target > 360.0 {
            log::debug!("blind error source: axis0 would have crossed through limits");
            axis0_err += 360.0;
        } else if implied_target < 0.0 {
            log::debug!("blind error source: axis0 would have crossed through limits");
            axis0_err -= 360.0;
        }

        Ok(PointingError::value(PerAxis::new(
            deg(axis0_err).wrap_error(),
            deg(axis1_err).wrap_error(),
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::deg;
    use crate::model::{ModelParameters, SkyCoord};
    use crate::mount::StubMount;
    use crate::target::TargetPosition;
    use chrono::DateTime;

    struct FixedWorldTarget(SkyCoord);

    impl Target for FixedWorldTarget {
        fn get_position(&mut self, t: DateTime<Utc>) -> Result<TargetPosition, TrackError> {
            Ok(TargetPosition {
                time: t,
                world: self.0,
                encoder: PerAxis::new(Angle::ZERO, Angle::ZERO),
            })
        }
    }

    fn location() -> Location {
        Location {
            latitude_deg: 40.0,
            longitude_deg: -105.0,
            elevation_m: 1600.0,
        }
    }

    #[test]
    fn no_signal_when_target_position_is_indeterminate() {
        struct FlakyTarget;
        impl Target for FlakyTarget {
            fn get_position(&mut self, _t: DateTime<Utc>) -> Result<TargetPosition, TrackError> {
                Err(TrackError::IndeterminatePosition("no ephemeris loaded".into()))
            }
        }

        let mount = StubMount::new(PerAxis::new(5.0, 5.0));
        let mut source = BlindErrorSource::new(
            FlakyTarget,
            mount,
            MountModel::new(ModelParameters::IDENTITY),
            location(),
            MeridianSide::West,
        );

        let result = source.compute_error(0).unwrap();
        assert!(result.is_no_signal());
    }

    #[test]
    fn flip_meridian_side_toggles() {
        let mount = StubMount::new(PerAxis::new(5.0, 5.0));
        let mut source = BlindErrorSource::new(
            FixedWorldTarget(SkyCoord { ra: Angle::longitude(10.0), dec: deg(5.0) }),
            mount,
            MountModel::new(ModelParameters::IDENTITY),
            location(),
            MeridianSide::East,
        );
        assert_eq!(source.meridian_side(), MeridianSide::East);
        source.flip_meridian_side();
        assert_eq!(source.meridian_side(), MeridianSide::West);
    }

    #[test]
    fn mount_on_preferred_side_reports_small_error_near_target() {
        // Put the mount exactly at the target's preferred-side encoder
        // solution; the resulting error should be ~zero on both axes.
        let model = MountModel::new(ModelParameters::IDENTITY);
        let target_world = SkyCoord { ra: Angle::longitude(120.0), dec: deg(-10.0) };
        let now = Utc::now();
        let target_enc = model.world_to_mount(target_world, MeridianSide::West, now, &location());

        let mount = StubMount::new(PerAxis::new(5.0, 5.0)).with_position(PerAxis::new(
            target_enc.axis0.as_deg(),
            target_enc.axis1.as_deg(),
        ));
        let mut source = BlindErrorSource::new(
            FixedWorldTarget(target_world),
            mount,
            model,
            location(),
            MeridianSide::West,
        );

        match source.compute_error(0).unwrap() {
            PointingError::Value { error, magnitude } => {
                assert!(magnitude < 1.0, "error magnitude {magnitude} too large");
                let _ = error;
            }
            PointingError::NoSignal => panic!("expected a value"),
        }
    }

    #[test]
    fn offset_callback_shifts_the_error() {
        let model = MountModel::new(ModelParameters::IDENTITY);
        let target_world = SkyCoord { ra: Angle::longitude(120.0), dec: deg(-10.0) };
        let mount = StubMount::new(PerAxis::new(5.0, 5.0));

        let baseline = {
            let mut unoffset = BlindErrorSource::new(
                FixedWorldTarget(target_world),
                StubMount::new(PerAxis::new(5.0, 5.0)),
                MountModel::new(ModelParameters::IDENTITY),
                location(),
                MeridianSide::West,
            );
            match unoffset.compute_error(0).unwrap() {
                PointingError::Value { magnitude, .. } => magnitude,
                PointingError::NoSignal => panic!("expected a value"),
            }
        };

        let mut source = BlindErrorSource::new(FixedWorldTarget(target_world), mount, model, location(), MeridianSide::West);
        source.register_offset_callback(|| (5.0, 0.0));

        match source.compute_error(0).unwrap() {
            PointingError::Value { magnitude, .. } => {
                assert!((magnitude - baseline).abs() > 1e-6, "offset callback had no effect");
            }
            PointingError::NoSignal => panic!("expected a value"),
        }
    }

    #[test]
    fn backlash_compensation_requires_mount_support() {
        let mount = StubMount::new(PerAxis::new(5.0, 5.0));
        // default StubMount::new supports backlash; build one that doesn't
        // by wrapping a mount whose backlash_supported() is false.
        struct NoBacklashMount(StubMount);
        impl Mount for NoBacklashMount {
            fn get_position(&mut self, max_age: f64) -> Result<PerAxis<f64>, crate::error::MountError> {
                self.0.get_position(max_age)
            }
            fn slew(&mut self, axis: AxisName, rate: f64) -> Result<(f64, bool), crate::error::MountError> {
                self.0.slew(axis, rate)
            }
            fn max_slew_rates(&self) -> PerAxis<f64> {
                self.0.max_slew_rates()
            }
            fn max_slew_accels(&self) -> PerAxis<f64> {
                self.0.max_slew_accels()
            }
            fn max_slew_steps(&self) -> PerAxis<f64> {
                self.0.max_slew_steps()
            }
        }

        let source = BlindErrorSource::new(
            FixedWorldTarget(SkyCoord { ra: Angle::longitude(10.0), dec: deg(5.0) }),
            NoBacklashMount(mount),
            MountModel::new(ModelParameters::IDENTITY),
            location(),
            MeridianSide::West,
        );
        assert!(source.with_backlash_compensation().is_err());
    }
}
