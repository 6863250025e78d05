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

//! Combines a blind (ephemeris-driven) error source with an optical
//! (camera-driven) one, preferring optical feedback whenever it is
//! trustworthy and falling back to blind pointing otherwise.

use super::{ErrorSource, PointingError, SignalDropoutTracking};
use crate::angle::angle_diff;
use crate::axis::AxisName;
use crate::error::TrackError;

/// Which source [`HybridErrorSource`] is currently trusting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HybridState {
    Blind,
    Optical,
}

/// State machine over a blind and an optical error source.
///
/// Starts in [`HybridState::Blind`]. Switches to `Optical` once the optical
/// source reports a measurement that agrees with the blind prediction to
/// within `max_divergence_deg` — this is the point at which an operator
/// would trust the camera has centroided on the real target rather than
/// noise or a different bright object. Switches back to `Blind` either when
/// the two sources diverge past the same threshold (the camera may have
/// locked onto a false target) or when optical has reported no signal for
/// `max_optical_no_signal_frames` consecutive cycles.
pub struct HybridErrorSource<Bl, Op> {
    blind: Bl,
    optical: Op,
    max_divergence_deg: f64,
    max_optical_no_signal_frames: u32,
    state: HybridState,
}

impl<Bl, Op> HybridErrorSource<Bl, Op>
where
    Bl: ErrorSource,
    Op: ErrorSource + SignalDropoutTracking,
{
    pub fn new(blind: Bl, optical: Op, max_divergence_deg: f64, max_optical_no_signal_frames: u32) -> HybridErrorSource<Bl, Op> {
        HybridErrorSource {
            blind,
            optical,
            max_divergence_deg,
            max_optical_no_signal_frames,
            state: HybridState::Blind,
        }
    }

    pub fn state(&self) -> HybridState {
        self.state
    }

    pub fn blind(&self) -> &Bl {
        &self.blind
    }

    pub fn optical(&self) -> &Op {
        &self.optical
    }
}

impl<Bl, Op> ErrorSource for HybridErrorSource<Bl, Op>
where
    Bl: ErrorSource,
    Op: ErrorSource + SignalDropoutTracking,
{
    fn axis_names(&self) -> (AxisName, AxisName) {
        self.blind.axis_names()
    }

    fn compute_error(&mut self, retries: u32) -> Result<PointingError, TrackError> {
        let blind_error = self.blind.compute_error(retries)?;
        let optical_error = self.optical.compute_error(retries)?;

        if optical_error.is_no_signal() {
            return match self.state {
                HybridState::Blind => Ok(blind_error),
                HybridState::Optical => {
                    if self.optical.consecutive_no_signal_frames() >= self.max_optical_no_signal_frames {
                        log::warn!("hybrid error source: lost target in camera, switching to blind tracking");
                        self.state = HybridState::Blind;
                        Ok(blind_error)
                    } else {
                        Err(TrackError::NoSignal)
                    }
                }
            };
        }

        let (PointingError::Value { error: optical_value, .. }, PointingError::Value { error: blind_value, .. }) =
            (optical_error, blind_error)
        else {
            // Blind never returns NoSignal per spec, but guard anyway: with
            // no blind measurement to compare against, trust whichever
            // state we're already in.
            return Ok(if self.state == HybridState::Optical { optical_error } else { blind_error });
        };

        let diff0 = angle_diff(optical_value.axis0, blind_value.axis0).as_deg();
        let diff1 = angle_diff(optical_value.axis1, blind_value.axis1).as_deg();
        let divergence = (diff0 * diff0 + diff1 * diff1).sqrt();

        match self.state {
            HybridState::Blind if divergence < self.max_divergence_deg => {
                log::info!("hybrid error source: optical converged (divergence {divergence:.4} deg), switching to optical");
                self.state = HybridState::Optical;
            }
            HybridState::Optical if divergence > self.max_divergence_deg => {
                log::warn!("hybrid error source: solutions diverged ({divergence:.4} deg), switching to blind tracking");
                self.state = HybridState::Blind;
            }
            _ => {}
        }

        Ok(if self.state == HybridState::Optical { optical_error } else { blind_error })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::angle::Angle;
    use crate::axis::PerAxis;

    struct ScriptedSource(Vec<PointingError>, usize);
    impl ScriptedSource {
        fn new(values: Vec<PointingError>) -> ScriptedSource {
            ScriptedSource(values, 0)
        }
    }
    impl ErrorSource for ScriptedSource {
        fn compute_error(&mut self, _retries: u32) -> Result<PointingError, TrackError> {
            let v = self.0[self.1.min(self.0.len() - 1)];
            self.1 += 1;
            Ok(v)
        }
    }

    /// A scripted optical-like source that also tracks a no-signal streak,
    /// the way `OpticalErrorSource` does.
    struct ScriptedOptical {
        values: Vec<PointingError>,
        idx: usize,
        consec_no_signal: u32,
    }
    impl ScriptedOptical {
        fn new(values: Vec<PointingError>) -> ScriptedOptical {
            ScriptedOptical { values, idx: 0, consec_no_signal: 0 }
        }
    }
    impl ErrorSource for ScriptedOptical {
        fn compute_error(&mut self, _retries: u32) -> Result<PointingError, TrackError> {
            let v = self.values[self.idx.min(self.values.len() - 1)];
            self.idx += 1;
            if v.is_no_signal() {
                self.consec_no_signal += 1;
            } else {
                self.consec_no_signal = 0;
            }
            Ok(v)
        }
    }
    impl SignalDropoutTracking for ScriptedOptical {
        fn consecutive_no_signal_frames(&self) -> u32 {
            self.consec_no_signal
        }
    }

    fn value(a0: f64, a1: f64) -> PointingError {
        PointingError::value(PerAxis::new(Angle::wrapped_error(a0), Angle::wrapped_error(a1)))
    }

    #[test]
    fn stays_blind_while_optical_diverges() {
        let blind = ScriptedSource::new(vec![value(1.0, 1.0)]);
        let optical = ScriptedOptical::new(vec![value(5.0, 5.0)]);
        let mut hybrid = HybridErrorSource::new(blind, optical, 0.5, 4);

        let result = hybrid.compute_error(0).unwrap();
        assert_eq!(hybrid.state(), HybridState::Blind);
        match result {
            PointingError::Value { error, .. } => assert!((error.axis0.as_deg() - 1.0).abs() < 1e-9),
            PointingError::NoSignal => panic!("expected value"),
        }
    }

    #[test]
    fn switches_to_optical_once_converged() {
        let blind = ScriptedSource::new(vec![value(1.0, 1.0)]);
        let optical = ScriptedOptical::new(vec![value(1.01, 1.01)]);
        let mut hybrid = HybridErrorSource::new(blind, optical, 0.5, 4);

        let result = hybrid.compute_error(0).unwrap();
        assert_eq!(hybrid.state(), HybridState::Optical);
        match result {
            PointingError::Value { error, .. } => assert!((error.axis0.as_deg() - 1.01).abs() < 1e-9),
            PointingError::NoSignal => panic!("expected value"),
        }
    }

    #[test]
    fn diverging_while_optical_falls_back_to_blind_without_waiting_for_no_signal() {
        // Scenario 4 from the spec: once in OPTICAL, a large divergence
        // alone (no NoSignal involved) must trip the fallback.
        let blind = ScriptedSource::new(vec![value(1.0, 1.0), value(1.0, 1.0)]);
        let optical = ScriptedOptical::new(vec![value(1.01, 1.01), value(6.0, 6.0)]);
        let mut hybrid = HybridErrorSource::new(blind, optical, 2.0, 4);

        hybrid.compute_error(0).unwrap();
        assert_eq!(hybrid.state(), HybridState::Optical);

        let second = hybrid.compute_error(0).unwrap();
        assert_eq!(hybrid.state(), HybridState::Blind);
        match second {
            PointingError::Value { error, .. } => assert!((error.axis0.as_deg() - 1.0).abs() < 1e-9),
            PointingError::NoSignal => panic!("expected value"),
        }
    }

    #[test]
    fn brief_no_signal_in_optical_state_re_raises_instead_of_falling_back() {
        let blind = ScriptedSource::new(vec![value(1.0, 1.0); 5]);
        let optical = ScriptedOptical::new(vec![value(1.0, 1.0), PointingError::NoSignal, PointingError::NoSignal]);
        let mut hybrid = HybridErrorSource::new(blind, optical, 0.5, 4);

        hybrid.compute_error(0).unwrap();
        assert_eq!(hybrid.state(), HybridState::Optical);

        let result = hybrid.compute_error(0);
        assert!(matches!(result, Err(TrackError::NoSignal)));
        assert_eq!(hybrid.state(), HybridState::Optical);
    }

    #[test]
    fn falls_back_to_blind_once_no_signal_frames_exceed_the_limit() {
        let blind = ScriptedSource::new(vec![value(1.0, 1.0); 5]);
        let optical = ScriptedOptical::new(vec![
            value(1.0, 1.0),
            PointingError::NoSignal,
            PointingError::NoSignal,
        ]);
        let mut hybrid = HybridErrorSource::new(blind, optical, 0.5, 2);

        hybrid.compute_error(0).unwrap();
        assert_eq!(hybrid.state(), HybridState::Optical);

        let _ = hybrid.compute_error(0); // 1st no-signal frame, below limit
        assert_eq!(hybrid.state(), HybridState::Optical);

        let second = hybrid.compute_error(0).unwrap(); // 2nd no-signal frame, hits limit
        assert_eq!(hybrid.state(), HybridState::Blind);
        match second {
            PointingError::Value { error, .. } => assert!((error.axis0.as_deg() - 1.0).abs() < 1e-9),
            PointingError::NoSignal => panic!("expected value"),
        }
    }
}
