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

//! Sources of pointing error: the measured offset between where the mount
//! is pointed and where the target actually is.

pub mod blind;
pub mod hybrid;
pub mod optical;

use crate::angle::Angle;
use crate::axis::{AxisName, PerAxis};
use crate::error::TrackError;

pub use blind::BlindErrorSource;
pub use hybrid::HybridErrorSource;
pub use optical::OpticalErrorSource;

/// A per-axis pointing error, or an explicit indication that none is
/// available this cycle.
///
/// Modeled as an enum rather than a struct of `Option`s: a source either has
/// a usable measurement for both axes, or it doesn't, and callers should
/// never observe one axis populated and the other not.
#[derive(Debug, Clone, Copy)]
pub enum PointingError {
    NoSignal,
    Value {
        error: PerAxis<Angle>,
        /// Magnitude of the combined (great-circle) error, in degrees.
        magnitude: f64,
    },
}

impl PointingError {
    pub fn value(error: PerAxis<Angle>) -> PointingError {
        let magnitude = (error.axis0.as_deg().powi(2) + error.axis1.as_deg().powi(2)).sqrt();
        PointingError::Value { error, magnitude }
    }

    pub fn is_no_signal(&self) -> bool {
        matches!(self, PointingError::NoSignal)
    }
}

/// A measurement of the pointing error between the mount and its target.
///
/// `compute_error` failing or returning [`PointingError::NoSignal`] is a
/// normal, expected outcome (an optical source briefly losing its target,
/// a blind source's target reporting `IndeterminatePosition`); only
/// [`TrackError::Fatal`] should end a `Tracker::run()` loop.
pub trait ErrorSource {
    /// The axes this source reports error on, in the order returned by
    /// `compute_error`.
    fn axis_names(&self) -> (AxisName, AxisName) {
        (AxisName::Axis0, AxisName::Axis1)
    }

    /// Compute the current pointing error. `retries` is the number of
    /// additional attempts the source may make internally (e.g. re-reading
    /// a sensor) before giving up and returning `NoSignal`.
    fn compute_error(&mut self, retries: u32) -> Result<PointingError, TrackError>;
}

/// An [`ErrorSource`] that tracks how many consecutive cycles it has failed
/// to find a signal. [`HybridErrorSource`] uses this to decide when it has
/// waited long enough on a flickering optical source before falling back to
/// blind tracking.
pub trait SignalDropoutTracking: ErrorSource {
    fn consecutive_no_signal_frames(&self) -> u32;
}
