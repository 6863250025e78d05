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

//! Angle wrapper with explicit wrap semantics.
//!
//! The control loop mixes two distinct notions of "angle": encoder/celestial
//! longitudes that live in `[0, 360)`, and pointing errors that live in
//! `(-180, 180]` and must be compared by shortest arc. Both are backed by the
//! same scalar (degrees), so a single newtype is used and the wrap policy is
//! applied explicitly at the call site via `wrap_longitude`/`wrap_error`
//! rather than being baked into two incompatible types.

use std::fmt;
use std::ops::{Add, Neg, Sub};

/// An angle in degrees. Carries no implicit wrap; call `wrap_longitude()` or
/// `wrap_error()` to normalize into one of the two conventions used
/// throughout this crate.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, serde::Serialize, serde::Deserialize)]
pub struct Angle(f64);

/// Construct an `Angle` from a value in degrees.
pub fn deg(value: f64) -> Angle {
    Angle(value)
}

/// Wrap a raw degree value into `[0, 360)`.
pub fn wrap_longitude(value: f64) -> f64 {
    let mut v = value % 360.0;
    if v < 0.0 {
        v += 360.0;
    }
    v
}

/// Wrap a raw degree value into `(-180, 180]`.
pub fn wrap_error(value: f64) -> f64 {
    let mut v = (value + 180.0) % 360.0;
    if v <= 0.0 {
        v += 360.0;
    }
    v - 180.0
}

impl Angle {
    pub const ZERO: Angle = Angle(0.0);

    /// Construct an `Angle` already known to be in `[0, 360)`; for
    /// unnormalized values use [`deg`] followed by [`Angle::wrap_longitude`].
    pub fn longitude(value: f64) -> Angle {
        Angle(wrap_longitude(value))
    }

    /// Construct an `Angle` already known to be in `(-180, 180]`; for
    /// unnormalized values use [`deg`] followed by [`Angle::wrap_error`].
    pub fn wrapped_error(value: f64) -> Angle {
        Angle(wrap_error(value))
    }

    /// Raw value, in degrees, with no wrap applied.
    pub fn as_deg(self) -> f64 {
        self.0
    }

    /// Return this angle wrapped into `[0, 360)`.
    #[must_use]
    pub fn wrap_longitude(self) -> Angle {
        Angle(wrap_longitude(self.0))
    }

    /// Return this angle wrapped into `(-180, 180]`.
    #[must_use]
    pub fn wrap_error(self) -> Angle {
        Angle(wrap_error(self.0))
    }

    /// Absolute value, in degrees.
    pub fn abs(self) -> f64 {
        self.0.abs()
    }

    /// Clamp the magnitude of this angle to at most `max_deg`, preserving sign.
    #[must_use]
    pub fn clamp_magnitude(self, max_deg: f64) -> Angle {
        let max_deg = max_deg.abs();
        Angle(self.0.clamp(-max_deg, max_deg))
    }
}

impl Add for Angle {
    type Output = Angle;
    fn add(self, rhs: Angle) -> Angle {
        Angle(self.0 + rhs.0)
    }
}

impl Sub for Angle {
    type Output = Angle;
    fn sub(self, rhs: Angle) -> Angle {
        Angle(self.0 - rhs.0)
    }
}

impl Neg for Angle {
    type Output = Angle;
    fn neg(self) -> Angle {
        Angle(-self.0)
    }
}

impl fmt::Display for Angle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}\u{00B0}", self.0)
    }
}

/// Magnitude of the shortest-arc difference between two longitudes, in degrees.
///
/// Mirrors `angle_diff` from the teacher's coordinate utilities, generalized
/// to the `Angle` type and the `(-180, 180]` wrap convention used here.
pub fn angle_diff(a: Angle, b: Angle) -> Angle {
    (a - b).wrap_error()
}

/// Clamp a rate-like scalar to a maximum magnitude. Used by the PID
/// controller and the mount limit enforcement paths alike.
pub fn clamp_magnitude(value: f64, max_abs: f64) -> f64 {
    let max_abs = max_abs.abs();
    value.clamp(-max_abs, max_abs)
}
