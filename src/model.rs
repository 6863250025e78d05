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

//! Coordinate transforms between the mount's encoder frame and the
//! celestial equatorial frame.
//!
//! The piecewise encoder<->spherical conversion and the single-axis pole
//! rotation follow the Losmandy-style "physical encoder" convention: the
//! default counterweight-down startup position sets the encoder zero
//! points, and which side of `axis1 = 180 deg` the mount is on selects one
//! of two equivalent spherical-coordinate branches.

use crate::angle::{deg, wrap_longitude, Angle};
use crate::axis::{MeridianSide, PerAxis};
use crate::error::TrackError;
use cgmath::{Basis3, Deg, InnerSpace, Rad, Rotation, Rotation3, Vector3};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Observer location.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Location {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub elevation_m: f64,
}

/// A coordinate in the celestial equatorial frame.
#[derive(Debug, Clone, Copy)]
pub struct SkyCoord {
    pub ra: Angle,
    pub dec: Angle,
}

/// The four angles defining the mount-to-sky transform.
///
/// Invariant: all four values lie in `(-180, 180]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ModelParameters {
    pub axis0_offset: Angle,
    pub axis1_offset: Angle,
    pub pole_rot_axis_lon: Angle,
    pub pole_rot_angle: Angle,
}

impl ModelParameters {
    pub const IDENTITY: ModelParameters = ModelParameters {
        axis0_offset: Angle::ZERO,
        axis1_offset: Angle::ZERO,
        pole_rot_axis_lon: Angle::ZERO,
        pole_rot_angle: Angle::ZERO,
    };

    fn from_vec(v: &[f64]) -> ModelParameters {
        ModelParameters {
            axis0_offset: deg(v[0]).wrap_error(),
            axis1_offset: deg(v[1]).wrap_error(),
            pole_rot_axis_lon: deg(v[2]).wrap_error(),
            pole_rot_angle: deg(v[3]).wrap_error(),
        }
    }

    fn to_vec(self) -> Vec<f64> {
        vec![
            self.axis0_offset.as_deg(),
            self.axis1_offset.as_deg(),
            self.pole_rot_axis_lon.as_deg(),
            self.pole_rot_angle.as_deg(),
        ]
    }
}

/// [`ModelParameters`] paired with the location and approximate generation
/// time they are valid for, suitable for persisting to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelParamSet {
    pub model_params: ModelParameters,
    pub location: Location,
    /// Seconds since the Unix epoch.
    pub generated_at_unix: f64,
}

impl ModelParamSet {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(s: &str) -> Result<ModelParamSet, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// One (timestamp, encoder reading, observed sky position) sample used by
/// [`ModelParameters::fit`].
#[derive(Debug, Clone, Copy)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub encoder: PerAxis<Angle>,
    pub observed: SkyCoord,
}

/// Math model of a two-axis equatorial mount: transforms between encoder
/// positions and celestial (RA/Dec) coordinates.
pub struct MountModel {
    params: ModelParameters,
}

impl MountModel {
    pub fn new(params: ModelParameters) -> MountModel {
        MountModel { params }
    }

    pub fn params(&self) -> ModelParameters {
        self.params
    }

    /// Convert encoder positions to a celestial coordinate at time `t` and
    /// `location`.
    pub fn mount_to_world(
        &self,
        encoder_positions: PerAxis<Angle>,
        t: DateTime<Utc>,
        location: &Location,
    ) -> SkyCoord {
        let enc0 = wrap_longitude(encoder_positions.axis0.as_deg() - self.params.axis0_offset.as_deg());
        let enc1 = wrap_longitude(encoder_positions.axis1.as_deg() - self.params.axis1_offset.as_deg());

        let (mnt_lon, mnt_lat) = encoder_to_spherical(enc0, enc1);
        let v_mnt = spherical_to_unit(mnt_lon, mnt_lat);
        let v_local = tip_axis(
            v_mnt,
            self.params.pole_rot_axis_lon.as_deg(),
            -self.params.pole_rot_angle.as_deg(),
        );
        let (local_lon, local_lat) = unit_to_spherical(v_local);

        let lst = local_sidereal_time_degrees(location, t);
        let ra = wrap_longitude(lst - local_lon);

        SkyCoord {
            ra: Angle::longitude(ra),
            dec: deg(local_lat),
        }
    }

    /// Which physical side of the mount meridian `encoder_positions`
    /// currently sits on, per the same `axis1 < 180 deg` branch
    /// [`MountModel::mount_to_world`] and [`MountModel::world_to_mount`] use
    /// to pick an encoder-frame/spherical-frame branch.
    pub fn encoder_side(&self, encoder_positions: PerAxis<Angle>) -> MeridianSide {
        let enc1 = wrap_longitude(encoder_positions.axis1.as_deg() - self.params.axis1_offset.as_deg());
        if enc1 < 180.0 {
            MeridianSide::East
        } else {
            MeridianSide::West
        }
    }

    /// Convert a celestial coordinate to encoder positions favoring
    /// `meridian_side`, at time `t` and `location`.
    pub fn world_to_mount(
        &self,
        sky_coord: SkyCoord,
        meridian_side: MeridianSide,
        t: DateTime<Utc>,
        location: &Location,
    ) -> PerAxis<Angle> {
        let lst = local_sidereal_time_degrees(location, t);
        let ha = lst - sky_coord.ra.as_deg();

        let v_local = spherical_to_unit(ha, sky_coord.dec.as_deg());
        let v_mnt = tip_axis(
            v_local,
            self.params.pole_rot_axis_lon.as_deg(),
            self.params.pole_rot_angle.as_deg(),
        );
        let (mnt_lon, mnt_lat) = unit_to_spherical(v_mnt);

        let (enc0, enc1) = spherical_to_encoder(mnt_lon, mnt_lat, meridian_side);

        PerAxis::new(
            Angle::longitude(enc0 + self.params.axis0_offset.as_deg()),
            Angle::longitude(enc1 + self.params.axis1_offset.as_deg()),
        )
    }
}

impl ModelParameters {
    /// Solve for mount model parameters by nonlinear least-squares over a
    /// set of (timestamp, encoder reading, observed sky position) samples,
    /// minimizing the sum of squared angular separations between predicted
    /// and observed coordinates.
    pub fn fit(observations: &[Observation], location: &Location) -> Result<ModelParameters, TrackError> {
        use argmin::core::{CostFunction, Executor};
        use argmin::solver::neldermead::NelderMead;

        if observations.len() < 4 {
            return Err(TrackError::NoSolution(
                "at least 4 observations are required to fit the 4 model parameters".into(),
            ));
        }

        struct FitCost<'a> {
            observations: &'a [Observation],
            location: Location,
        }

        impl CostFunction for FitCost<'_> {
            type Param = Vec<f64>;
            type Output = f64;

            fn cost(&self, param: &Vec<f64>) -> Result<f64, argmin::core::Error> {
                let model = MountModel::new(ModelParameters::from_vec(param));
                let mut sum_sq = 0.0;
                for obs in self.observations {
                    let predicted = model.mount_to_world(obs.encoder, obs.timestamp, &self.location);
                    let sep = angular_separation_deg(predicted, obs.observed);
                    sum_sq += sep * sep;
                }
                Ok(sum_sq)
            }
        }

        let cost = FitCost {
            observations,
            location: *location,
        };

        // Nelder-Mead needs n+1 vertices for an n-dimensional simplex;
        // angle wrapping in `cost` keeps the search well-behaved without
        // needing explicit box constraints.
        let initial = ModelParameters::IDENTITY.to_vec();
        let step = 5.0;
        let mut simplex = vec![initial.clone()];
        for i in 0..initial.len() {
            let mut vertex = initial.clone();
            vertex[i] += step;
            simplex.push(vertex);
        }

        let solver = NelderMead::new(simplex);
        let result = Executor::new(cost, solver)
            .configure(|state| state.max_iters(500))
            .run()
            .map_err(|e| TrackError::NoSolution(e.to_string()))?;

        let best = result
            .state()
            .best_param
            .clone()
            .ok_or_else(|| TrackError::NoSolution("optimizer produced no result".into()))?;

        Ok(ModelParameters::from_vec(&best))
    }
}

fn angular_separation_deg(a: SkyCoord, b: SkyCoord) -> f64 {
    let va = spherical_to_unit(a.ra.as_deg(), a.dec.as_deg());
    let vb = spherical_to_unit(b.ra.as_deg(), b.dec.as_deg());
    let cos_sep = (va.dot(vb)).clamp(-1.0, 1.0);
    Deg::from(Rad(cos_sep.acos())).0
}

fn spherical_to_unit(lon_deg: f64, lat_deg: f64) -> Vector3<f64> {
    let lon: Rad<f64> = Deg(lon_deg).into();
    let lat: Rad<f64> = Deg(lat_deg).into();
    Vector3::new(
        lat.0.cos() * lon.0.cos(),
        lat.0.cos() * lon.0.sin(),
        lat.0.sin(),
    )
}

fn unit_to_spherical(v: Vector3<f64>) -> (f64, f64) {
    let lat = v.z.clamp(-1.0, 1.0).asin();
    let lon = v.y.atan2(v.x);
    (Deg::from(Rad(lon)).0, Deg::from(Rad(lat)).0)
}

/// Rotate `v` about the axis in the equatorial plane at longitude `axis_lon_deg`
/// by `rot_angle_deg`. Moves a coordinate system's pole from one place to
/// another (e.g., from the mount's physical pole to the celestial pole).
fn tip_axis(v: Vector3<f64>, axis_lon_deg: f64, rot_angle_deg: f64) -> Vector3<f64> {
    let axis = spherical_to_unit(axis_lon_deg, 0.0).normalize();
    let rotation = Basis3::from_axis_angle(axis, Deg(rot_angle_deg));
    rotation.rotate_vector(v)
}

fn spherical_to_encoder(mount_lon_deg: f64, mount_lat_deg: f64, meridian_side: MeridianSide) -> (f64, f64) {
    match meridian_side {
        MeridianSide::East => (90.0 - mount_lon_deg, 90.0 + mount_lat_deg),
        MeridianSide::West => (270.0 - mount_lon_deg, 270.0 - mount_lat_deg),
    }
}

fn encoder_to_spherical(enc0_deg: f64, enc1_deg: f64) -> (f64, f64) {
    if enc1_deg < 180.0 {
        // east of mount meridian
        (90.0 - enc0_deg, enc1_deg - 90.0)
    } else {
        // west of mount meridian
        (270.0 - enc0_deg, 270.0 - enc1_deg)
    }
}

/// Greenwich Mean Sidereal Time, in degrees, via the standard IAU 1982
/// closed-form polynomial. Deliberately avoids any network-fetched Earth
/// orientation data: this core only needs arcsecond-level pointing
/// accuracy, not the sub-arcsecond polar-motion corrections that data
/// would buy.
fn gmst_degrees(t: DateTime<Utc>) -> f64 {
    let jd = julian_date(t);
    let d = jd - 2451545.0;
    let centuries = d / 36525.0;
    let gmst = 280.460_618_37
        + 360.985_647_366_29 * d
        + 0.000_387_933 * centuries * centuries
        - centuries * centuries * centuries / 38_710_000.0;
    wrap_longitude(gmst)
}

fn local_sidereal_time_degrees(location: &Location, t: DateTime<Utc>) -> f64 {
    wrap_longitude(gmst_degrees(t) + location.longitude_deg)
}

fn julian_date(t: DateTime<Utc>) -> f64 {
    let j2000 = Utc.with_ymd_and_hms(2000, 1, 1, 12, 0, 0).unwrap();
    let elapsed_ms = (t - j2000).num_milliseconds() as f64;
    2_451_545.0 + elapsed_ms / 86_400_000.0
}
