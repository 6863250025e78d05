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

//! Two-axis indexing.
//!
//! The mount's two rotational degrees of freedom (azimuth/altitude or
//! right-ascension/declination) are treated symmetrically by the control
//! core, so they are named generically here and kept in a fixed-size
//! container rather than a string-keyed map — this removes a whole class of
//! stringly-typed bugs and avoids allocation on the control loop's hot path.

use std::fmt;
use std::ops::{Index, IndexMut};

/// Identifies one of the mount's two rotational axes.
///
/// `Axis0` is the mount's longitude-like axis (azimuth for alt-az mounts,
/// right ascension/hour angle for equatorial mounts); `Axis1` is the
/// latitude-like axis (altitude or declination).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxisName {
    Axis0,
    Axis1,
}

impl AxisName {
    pub const ALL: [AxisName; 2] = [AxisName::Axis0, AxisName::Axis1];
}

impl fmt::Display for AxisName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                AxisName::Axis0 => "axis0",
                AxisName::Axis1 => "axis1",
            }
        )
    }
}

/// A fixed two-element container keyed by [`AxisName`].
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PerAxis<T> {
    pub axis0: T,
    pub axis1: T,
}

impl<T> PerAxis<T> {
    pub fn new(axis0: T, axis1: T) -> PerAxis<T> {
        PerAxis { axis0, axis1 }
    }

    pub fn from_fn(mut f: impl FnMut(AxisName) -> T) -> PerAxis<T> {
        PerAxis {
            axis0: f(AxisName::Axis0),
            axis1: f(AxisName::Axis1),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> PerAxis<U> {
        PerAxis {
            axis0: f(&self.axis0),
            axis1: f(&self.axis1),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (AxisName, &T)> {
        [
            (AxisName::Axis0, &self.axis0),
            (AxisName::Axis1, &self.axis1),
        ]
        .into_iter()
    }
}

impl<T> Index<AxisName> for PerAxis<T> {
    type Output = T;
    fn index(&self, axis: AxisName) -> &T {
        match axis {
            AxisName::Axis0 => &self.axis0,
            AxisName::Axis1 => &self.axis1,
        }
    }
}

impl<T> IndexMut<AxisName> for PerAxis<T> {
    fn index_mut(&mut self, axis: AxisName) -> &mut T {
        match axis {
            AxisName::Axis0 => &mut self.axis0,
            AxisName::Axis1 => &mut self.axis1,
        }
    }
}

/// Which side of the meridian an equatorial mount is pointed to. Irrelevant
/// for alt-az mounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeridianSide {
    East,
    West,
}

impl MeridianSide {
    #[must_use]
    pub fn flipped(self) -> MeridianSide {
        match self {
            MeridianSide::East => MeridianSide::West,
            MeridianSide::West => MeridianSide::East,
        }
    }
}

impl fmt::Display for MeridianSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                MeridianSide::East => "east",
                MeridianSide::West => "west",
            }
        )
    }
}
