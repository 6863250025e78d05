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

//! Error kinds for the control core.
//!
//! Propagation policy: anything recoverable within a single control cycle
//! (`NoSignal`, `AxisLimit`, rate/step saturation, an exceeded max update
//! period) is handled locally by the `Tracker` and never unwinds `run()`.
//! Anything else (`NoSolution`, `Fatal`) is surfaced to the caller.

use crate::axis::AxisName;
use thiserror::Error;

/// Errors raised by a [`crate::mount::Mount`] implementation.
#[derive(Debug, Error)]
pub enum MountError {
    /// The mount refused a command because it would cross a physical hard-stop.
    #[error("axis {axis} hit a hard limit")]
    AxisLimit { axis: AxisName },

    /// Communication with the mount failed (serial/USB I/O, timeouts, ...).
    #[error("mount I/O error: {0}")]
    Io(String),

    /// The mount does not implement this (optional) operation.
    #[error("operation not supported by this mount")]
    Unsupported,

    /// Unrecoverable failure; the caller should stop using this mount.
    #[error("fatal mount failure: {0}")]
    Fatal(String),
}

/// Errors raised anywhere in the control loop.
#[derive(Debug, Error)]
pub enum TrackError {
    /// An error source could not produce a measurement this cycle.
    #[error("no signal available")]
    NoSignal,

    /// The mount rejected a command at a physical hard-stop.
    #[error("axis {axis} hit a hard limit")]
    AxisLimit { axis: AxisName },

    /// The mount clipped a commanded rate to `accepted` degrees/second.
    #[error("axis {axis} rate/step limit saturated at {accepted} deg/s")]
    RateLimitSaturation { axis: AxisName, accepted: f64 },

    /// Too much time elapsed between successive `PIDController::update` calls.
    #[error("{elapsed_s:.3}s since last PID update, exceeding the configured maximum")]
    MaxUpdatePeriodExceeded { elapsed_s: f64 },

    /// Mount model fitting failed to converge.
    #[error("mount model fit did not converge: {0}")]
    NoSolution(String),

    /// The target's position could not be determined this cycle.
    #[error("target position is indeterminate: {0}")]
    IndeterminatePosition(String),

    /// Unrecoverable error; the control loop must stop.
    #[error("fatal tracking failure: {0}")]
    Fatal(String),
}

impl From<MountError> for TrackError {
    fn from(err: MountError) -> TrackError {
        match err {
            MountError::AxisLimit { axis } => TrackError::AxisLimit { axis },
            MountError::Io(msg) => TrackError::Fatal(msg),
            MountError::Unsupported => TrackError::Fatal("unsupported mount operation".into()),
            MountError::Fatal(msg) => TrackError::Fatal(msg),
        }
    }
}
