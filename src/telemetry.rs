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

//! Background polling and fan-out of named telemetry channels.
//!
//! A concrete time-series sink (InfluxDB, a CSV file, stdout) is an
//! external collaborator, abstracted as [`TelemSink`] so this crate does
//! not pull in a database client of its own.

use crate::error::TrackError;
use crate::tracker::TelemSnapshot;
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

/// Something that can report a flat list of named numeric telemetry
/// channels at any moment, without blocking on I/O.
pub trait TelemSource {
    fn get_telem_channels(&self) -> Vec<(String, f64)>;
}

/// A destination for polled telemetry.
pub trait TelemSink: Send {
    fn post(&mut self, timestamp: DateTime<Utc>, channels: &[(String, f64)]) -> Result<(), TrackError>;
}

/// Adapts a [`Tracker`](crate::tracker::Tracker)'s telemetry snapshot into a
/// [`TelemSource`], so it can be registered with a [`TelemLogger`] alongside
/// any other sources (error source diagnostics, mount status, ...).
pub struct TrackerTelemSource(Arc<Mutex<TelemSnapshot>>);

impl TrackerTelemSource {
    pub fn new(snapshot: Arc<Mutex<TelemSnapshot>>) -> TrackerTelemSource {
        TrackerTelemSource(snapshot)
    }
}

impl TelemSource for TrackerTelemSource {
    fn get_telem_channels(&self) -> Vec<(String, f64)> {
        let snapshot = self.0.lock().expect("telemetry mutex poisoned");
        vec![
            ("num_iterations".to_string(), snapshot.num_iterations as f64),
            ("rate_axis0".to_string(), snapshot.rate.axis0),
            ("rate_axis1".to_string(), snapshot.rate.axis1),
            ("error_axis0".to_string(), snapshot.error.axis0),
            ("error_axis1".to_string(), snapshot.error.axis1),
            ("error_magnitude".to_string(), snapshot.error_magnitude),
            ("controller_int_axis0".to_string(), snapshot.controller_integrator.axis0),
            ("controller_int_axis1".to_string(), snapshot.controller_integrator.axis1),
            ("controller_out_axis0".to_string(), snapshot.controller_output.axis0),
            ("controller_out_axis1".to_string(), snapshot.controller_output.axis1),
            ("converged".to_string(), if snapshot.converged { 1.0 } else { 0.0 }),
        ]
    }
}

/// Polls a set of named [`TelemSource`]s at a fixed period on a background
/// thread and forwards the merged, namespaced channel set to a
/// [`TelemSink`].
///
/// Dropping the logger stops the polling thread and joins it, so telemetry
/// never outlives the object that owns it.
pub struct TelemLogger {
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl TelemLogger {
    pub fn spawn(
        sources: Vec<(String, Box<dyn TelemSource + Send>)>,
        mut sink: Box<dyn TelemSink>,
        period: Duration,
    ) -> TelemLogger {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_worker = stop.clone();

        let handle = thread::spawn(move || {
            while !stop_worker.load(Ordering::Relaxed) {
                let now = Utc::now();
                let mut channels = Vec::new();
                for (name, source) in &sources {
                    for (chan, value) in source.get_telem_channels() {
                        channels.push((format!("{name}.{chan}"), value));
                    }
                }

                if let Err(e) = sink.post(now, &channels) {
                    log::error!("telemetry sink rejected a post: {e}");
                }

                thread::sleep(period);
            }
        });

        TelemLogger {
            stop,
            handle: Some(handle),
        }
    }

    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for TelemLogger {
    fn drop(&mut self) {
        self.stop();
    }
}
