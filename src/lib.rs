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

//! Closed-loop control core for pointing and tracking a two-axis telescope
//! mount: PID control, a mount math model, pluggable pointing-error
//! sources, and the control loop that ties them together.
//!
//! This crate has no hardware driver, no ephemeris engine, and no UI of its
//! own — those are external collaborators consumed through the traits in
//! [`mount`], [`target`], and [`error_source`].

pub mod angle;
pub mod axis;
pub mod error;
pub mod error_source;
pub mod filter;
pub mod model;
pub mod mount;
pub mod pid;
pub mod target;
pub mod telemetry;
pub mod tracker;

pub use axis::{AxisName, MeridianSide, PerAxis};
pub use error::{MountError, TrackError};
pub use error_source::{BlindErrorSource, ErrorSource, HybridErrorSource, OpticalErrorSource, PointingError, SignalDropoutTracking};
pub use mount::Mount;
pub use pid::{PIDController, PIDGains};
pub use target::Target;
pub use tracker::{StopReason, Tracker};

/// Test-only logging setup, so a control-loop test run with `--nocapture`
/// shows the same `log::debug!`/`log::warn!` diagnostics a real run would
/// produce (PID saturation, hybrid state transitions, meridian flips, ...).
#[cfg(test)]
pub(crate) mod test_support {
    use simplelog::{Config, LevelFilter, TermLogger, TerminalMode, ColorChoice};
    use std::sync::Once;

    static INIT: Once = Once::new();

    pub fn init_logging() {
        INIT.call_once(|| {
            let _ = TermLogger::init(
                LevelFilter::Debug,
                Config::default(),
                TerminalMode::Mixed,
                ColorChoice::Auto,
            );
        });
    }
}
