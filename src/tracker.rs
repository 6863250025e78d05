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

//! The main control loop: reads a pointing error, drives a per-axis PID
//! controller, and commands the mount, cycle after cycle, until told to
//! stop.

use crate::axis::{AxisName, PerAxis};
use crate::error::{MountError, TrackError};
use crate::error_source::{ErrorSource, PointingError};
use crate::mount::Mount;
use crate::pid::{PIDController, PIDGains};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Why [`Tracker::run`] returned.
#[derive(Debug)]
pub enum StopReason {
    /// The `stop` flag was set, from inside a callback or from another
    /// thread via [`Tracker::stop_handle`].
    StopFlagSet,
    /// The pointing error stayed below the convergence threshold for
    /// `convergence_window` consecutive cycles.
    Converged,
    /// `max_run_time` elapsed since the loop started.
    TimerExpired,
    /// The error source reported `NoSignal` for too many consecutive
    /// cycles. Only possible if [`Tracker::with_max_consecutive_no_signal`]
    /// was configured; otherwise the loop tolerates `NoSignal`
    /// indefinitely, as a missing measurement is not itself a stop
    /// condition.
    MaxNoSignalRetriesExceeded,
    /// An unrecoverable error ended the loop.
    Fatal(TrackError),
}

/// What the per-cycle callback returns. `true` skips the rest of this
/// cycle (error computation, PID update, mount command) but still publishes
/// telemetry and counts the cycle; it does not by itself stop the loop. To
/// stop the loop from inside the callback, call [`Tracker::request_stop`].
pub type CycleCallback<E, M> = dyn FnMut(&mut Tracker<E, M>) -> bool;

/// A snapshot of the tracker's most recent control cycle, safe to read from
/// another thread (e.g. a telemetry poller or a UI) while `run()` is
/// executing on its own.
#[derive(Debug, Clone, Default)]
pub struct TelemSnapshot {
    pub time: Option<DateTime<Utc>>,
    pub num_iterations: u64,
    pub error: PerAxis<f64>,
    pub error_magnitude: f64,
    pub rate: PerAxis<f64>,
    pub controller_integrator: PerAxis<f64>,
    pub controller_output: PerAxis<f64>,
    pub converged: bool,
}

/// Drives a [`Mount`] toward zero pointing error as reported by an
/// [`ErrorSource`], using one [`PIDController`] per axis.
pub struct Tracker<E, M> {
    error_source: E,
    mount: M,
    pid: PerAxis<PIDController>,
    max_pointing_error_deg: Option<f64>,
    convergence_window: u32,
    converge_gate: Option<Box<dyn Fn(&E) -> bool>>,
    max_run_time_s: Option<f64>,
    max_consecutive_no_signal: Option<u32>,
    stop: Arc<AtomicBool>,
    telem: Arc<Mutex<TelemSnapshot>>,
    /// This cycle's computed error, cached so the per-cycle callback can
    /// inspect or overwrite it (see [`Tracker::error`]/[`Tracker::set_error`]).
    /// `None` only before the first cycle's error has been computed.
    error: Option<PointingError>,
}

impl<E, M> Tracker<E, M>
where
    E: ErrorSource,
    M: Mount,
{
    pub fn new(error_source: E, mount: M, gains: PerAxis<PIDGains>, max_update_period_s: f64) -> Tracker<E, M> {
        Tracker {
            error_source,
            mount,
            pid: PerAxis::new(
                PIDController::new(gains.axis0, max_update_period_s),
                PIDController::new(gains.axis1, max_update_period_s),
            ),
            max_pointing_error_deg: None,
            convergence_window: 1,
            converge_gate: None,
            max_run_time_s: None,
            max_consecutive_no_signal: None,
            stop: Arc::new(AtomicBool::new(false)),
            telem: Arc::new(Mutex::new(TelemSnapshot::default())),
            error: None,
        }
    }

    /// Stop with [`StopReason::Converged`] once the combined pointing error
    /// stays below `max_pointing_error_deg` for `window` consecutive cycles.
    #[must_use]
    pub fn with_convergence(mut self, max_pointing_error_deg: f64, window: u32) -> Tracker<E, M> {
        self.max_pointing_error_deg = Some(max_pointing_error_deg);
        self.convergence_window = window.max(1);
        self
    }

    /// Only count a cycle toward convergence when `gate` returns true for
    /// the current error source — e.g. a `HybridErrorSource` in `Optical`
    /// state, so convergence isn't declared while still blind-tracking.
    #[must_use]
    pub fn with_converge_gate(mut self, gate: impl Fn(&E) -> bool + 'static) -> Tracker<E, M> {
        self.converge_gate = Some(Box::new(gate));
        self
    }

    /// Stop with [`StopReason::TimerExpired`] once `max_run_time_s` seconds
    /// have elapsed since `run()` was called.
    #[must_use]
    pub fn with_timer(mut self, max_run_time_s: f64) -> Tracker<E, M> {
        self.max_run_time_s = Some(max_run_time_s);
        self
    }

    #[must_use]
    pub fn with_max_consecutive_no_signal(mut self, n: u32) -> Tracker<E, M> {
        self.max_consecutive_no_signal = Some(n);
        self
    }

    /// A handle that can set the `stop` flag from any thread; `run()` exits
    /// at the top of the next cycle once it is set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        self.stop.clone()
    }

    /// Request the loop stop, from inside the per-cycle callback.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::Relaxed);
    }

    /// A thread-safe handle onto the tracker's latest telemetry, independent
    /// of whatever thread is currently inside `run()`.
    pub fn telemetry(&self) -> Arc<Mutex<TelemSnapshot>> {
        self.telem.clone()
    }

    pub fn mount(&mut self) -> &mut M {
        &mut self.mount
    }

    pub fn error_source(&mut self) -> &mut E {
        &mut self.error_source
    }

    /// This cycle's computed pointing error, available to the per-cycle
    /// callback. `None` before the first cycle of a `run()` has computed one.
    pub fn error(&self) -> Option<PointingError> {
        self.error
    }

    /// Overwrite this cycle's computed pointing error. Intended for the
    /// per-cycle callback to use, per the spec's "the callback may
    /// inspect/modify `error`" — e.g. to substitute a manually-steered
    /// offset or to force a cycle to be treated as `NoSignal`.
    pub fn set_error(&mut self, error: PointingError) {
        self.error = Some(error);
    }

    /// Run the control loop until convergence, a timer or stop-flag
    /// condition, or a fatal error.
    ///
    /// Each cycle computes the pointing error first and caches it (readable
    /// via [`Tracker::error`], overwritable via [`Tracker::set_error`]), then
    /// invokes `callback` with `&mut self` rather than a closure that closes
    /// over external state — this keeps all loop state (PID integrators,
    /// mount, error source, and the just-computed error) reachable and
    /// inspectable from the callback without aliasing concerns. Returning
    /// `true` skips the rest of the cycle (PID update and mount actuation);
    /// telemetry still publishes and the iteration count still advances.
    pub fn run(&mut self, mut callback: impl FnMut(&mut Tracker<E, M>) -> bool) -> StopReason {
        self.stop.store(false, Ordering::Relaxed);
        for pid in [&mut self.pid.axis0, &mut self.pid.axis1] {
            pid.reset();
        }
        self.error = None;

        let start_time = Instant::now();
        let mut num_iterations = 0u64;
        let mut consecutive_no_signal = 0u32;
        let mut consecutive_converged = 0u32;

        loop {
            if self.stop.load(Ordering::Relaxed) {
                return StopReason::StopFlagSet;
            }

            if let Some(max_run_time_s) = self.max_run_time_s {
                if start_time.elapsed().as_secs_f64() > max_run_time_s {
                    return StopReason::TimerExpired;
                }
            }

            if self.max_pointing_error_deg.is_some() && consecutive_converged >= self.convergence_window {
                return StopReason::Converged;
            }

            let computed = match self.error_source.compute_error(0) {
                Ok(e) => e,
                Err(TrackError::Fatal(msg)) => return StopReason::Fatal(TrackError::Fatal(msg)),
                Err(e) => {
                    log::warn!("error source failed this cycle: {e}");
                    PointingError::NoSignal
                }
            };
            self.error = Some(computed);

            if callback(self) {
                self.publish_telemetry(num_iterations, None, PerAxis::new(0.0, 0.0), false);
                num_iterations += 1;
                continue;
            }

            // The callback may have inspected or overwritten `self.error`
            // (e.g. to force a `NoSignal` cycle or substitute a manual
            // offset); re-read it rather than `computed` so its decision
            // sticks.
            let pointing_error = self.error.unwrap_or(PointingError::NoSignal);

            let (error, magnitude) = match pointing_error {
                PointingError::NoSignal => {
                    consecutive_no_signal += 1;
                    consecutive_converged = 0;
                    log::debug!("no signal this cycle ({consecutive_no_signal} consecutive)");
                    if let Some(limit) = self.max_consecutive_no_signal {
                        if consecutive_no_signal >= limit {
                            return StopReason::MaxNoSignalRetriesExceeded;
                        }
                    }
                    self.publish_telemetry(num_iterations, None, PerAxis::new(0.0, 0.0), false);
                    num_iterations += 1;
                    continue;
                }
                PointingError::Value { error, magnitude } => {
                    consecutive_no_signal = 0;
                    (error, magnitude)
                }
            };

            let mut commanded_rate = PerAxis::new(0.0, 0.0);
            let mut controller_output = PerAxis::new(0.0, 0.0);
            for axis in AxisName::ALL {
                let rate = self.pid[axis].update(error[axis].as_deg());
                controller_output[axis] = rate;
                match self.mount.slew(axis, rate) {
                    Ok((accepted, limited)) => {
                        commanded_rate[axis] = accepted;
                        if limited {
                            log::debug!("axis {axis}: commanded rate {rate:.4} deg/s clipped to {accepted:.4}");
                            self.pid[axis].clamp_integrator(accepted);
                        }
                    }
                    Err(MountError::AxisLimit { axis }) => {
                        log::warn!("axis {axis}: hit hard limit, holding integrator");
                        self.pid[axis].clamp_integrator(0.0);
                    }
                    Err(e) => return StopReason::Fatal(e.into()),
                }
            }

            let gate_satisfied = match &self.converge_gate {
                Some(gate) => gate(&self.error_source),
                None => true,
            };
            if self.max_pointing_error_deg.is_some_and(|t| magnitude < t) && gate_satisfied {
                consecutive_converged += 1;
            } else {
                consecutive_converged = 0;
            }

            self.publish_telemetry(
                num_iterations,
                Some((error, magnitude, commanded_rate, controller_output)),
                commanded_rate,
                consecutive_converged >= self.convergence_window && self.max_pointing_error_deg.is_some(),
            );
            num_iterations += 1;
        }
    }

    fn publish_telemetry(
        &self,
        num_iterations: u64,
        values: Option<(PerAxis<crate::angle::Angle>, f64, PerAxis<f64>, PerAxis<f64>)>,
        rate: PerAxis<f64>,
        converged: bool,
    ) {
        let mut snapshot = self.telem.lock().expect("telemetry mutex poisoned");
        snapshot.time = Some(Utc::now());
        snapshot.num_iterations = num_iterations;
        snapshot.rate = rate;
        snapshot.converged = converged;
        if let Some((error, magnitude, commanded_rate, controller_output)) = values {
            snapshot.error = PerAxis::new(error.axis0.as_deg(), error.axis1.as_deg());
            snapshot.error_magnitude = magnitude;
            snapshot.rate = commanded_rate;
            snapshot.controller_integrator = PerAxis::new(self.pid.axis0.integrator(), self.pid.axis1.integrator());
            snapshot.controller_output = controller_output;
        }
    }
}
