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

//! Error source driven by a camera frame and a blob detector.
//!
//! Neither frame capture (V4L2, a USB camera SDK, ...) nor blob detection
//! (OpenCV's `SimpleBlobDetector` in the original) are implemented here —
//! both are external collaborators, abstracted as [`FrameSource`] and
//! [`BlobDetector`] traits so this module stays free of a hard dependency
//! on any particular camera or computer-vision library.

use super::{ErrorSource, PointingError, SignalDropoutTracking};
use crate::angle::deg;
use crate::axis::{AxisName, PerAxis};
use crate::error::TrackError;

/// A captured camera frame. Pixel contents are irrelevant to this module;
/// only the dimensions are used, to locate the frame center.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
}

/// Produces camera frames for blob detection.
pub trait FrameSource {
    fn get_frame(&mut self) -> Result<Frame, TrackError>;
}

/// A detected blob's centroid and apparent size, in pixels.
#[derive(Debug, Clone, Copy)]
pub struct Keypoint {
    pub x: f64,
    pub y: f64,
    pub size: f64,
}

/// Parameters controlling blob detection, carried over from the parameters
/// used to configure a `cv2.SimpleBlobDetector` in the original
/// implementation: tuned for a single compact, bright target against a
/// dark sky background.
#[derive(Debug, Clone, Copy)]
pub struct BlobDetectorParams {
    pub min_threshold: f64,
    pub max_threshold: f64,
    pub max_area: f64,
    pub min_dist_between_blobs: f64,
}

impl Default for BlobDetectorParams {
    fn default() -> BlobDetectorParams {
        BlobDetectorParams {
            min_threshold: 100.0,
            max_threshold: 200.0,
            max_area: 50_000.0,
            min_dist_between_blobs: 200.0,
        }
    }
}

/// Locates blobs (candidate targets) in a frame.
pub trait BlobDetector {
    fn detect(&self, frame: &Frame) -> Vec<Keypoint>;
}

/// Which pixel coordinate feeds a given mount axis's error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelAxis {
    X,
    Y,
}

/// Converts a pixel offset from frame center into a per-axis angular error.
/// Lets the camera be mounted at an arbitrary rotation relative to the
/// mount's own axes: each mount axis reads from whichever pixel axis (and
/// with whatever sign, folded into the scale) corresponds to it.
#[derive(Debug, Clone, Copy)]
pub struct PixelMapping {
    pub axis0_from: PixelAxis,
    pub axis1_from: PixelAxis,
    /// Signed; negative to flip direction.
    pub deg_per_pixel_axis0: f64,
    pub deg_per_pixel_axis1: f64,
}

/// Computes pointing error from the blob nearest frame center in each
/// camera frame.
///
/// Requires `min_consec_detect_frames` consecutive detections before
/// trusting a measurement, and resets that streak on any frame with no
/// detection — debouncing single-frame false negatives/positives rather
/// than reacting to every flicker.
pub struct OpticalErrorSource<F, B> {
    frame_source: F,
    detector: B,
    mapping: PixelMapping,
    min_consec_detect_frames: u32,
    consec_detect_frames: u32,
    consec_no_detect_frames: u32,
}

impl<F, B> OpticalErrorSource<F, B>
where
    F: FrameSource,
    B: BlobDetector,
{
    pub fn new(frame_source: F, detector: B, mapping: PixelMapping) -> OpticalErrorSource<F, B> {
        OpticalErrorSource {
            frame_source,
            detector,
            mapping,
            min_consec_detect_frames: 1,
            consec_detect_frames: 0,
            consec_no_detect_frames: 0,
        }
    }

    #[must_use]
    pub fn with_min_consec_detect_frames(mut self, n: u32) -> OpticalErrorSource<F, B> {
        self.min_consec_detect_frames = n;
        self
    }

    pub fn consec_detect_frames(&self) -> u32 {
        self.consec_detect_frames
    }

    pub fn consec_no_detect_frames(&self) -> u32 {
        self.consec_no_detect_frames
    }
}

impl<F, B> SignalDropoutTracking for OpticalErrorSource<F, B>
where
    F: FrameSource,
    B: BlobDetector,
{
    fn consecutive_no_signal_frames(&self) -> u32 {
        self.consec_no_detect_frames
    }
}

impl<F, B> ErrorSource for OpticalErrorSource<F, B>
where
    F: FrameSource,
    B: BlobDetector,
{
    fn axis_names(&self) -> (AxisName, AxisName) {
        (AxisName::Axis0, AxisName::Axis1)
    }

    fn compute_error(&mut self, retries: u32) -> Result<PointingError, TrackError> {
        // Only the zero-keypoint case retries internally; a keypoint, once
        // found, is used (or rejected as not-yet-trusted) immediately rather
        // than re-polling the frame source. The debounce counters below are
        // updated exactly once per call, after this loop settles on a final
        // outcome, so a multi-retry call never inflates them by more than 1.
        let mut attempt = 0;
        let found = loop {
            let frame = self.frame_source.get_frame()?;
            let keypoints = self.detector.detect(&frame);

            let (cx, cy) = (frame.width as f64 / 2.0, frame.height as f64 / 2.0);
            let nearest_to_center = keypoints.into_iter().min_by(|a, b| {
                let da = (a.x - cx).powi(2) + (a.y - cy).powi(2);
                let db = (b.x - cx).powi(2) + (b.y - cy).powi(2);
                da.total_cmp(&db)
            });

            if let Some(kp) = nearest_to_center {
                break Some((kp, frame));
            }
            if attempt >= retries {
                break None;
            }
            attempt += 1;
        };

        let Some((kp, frame)) = found else {
            self.consec_detect_frames = 0;
            self.consec_no_detect_frames += 1;
            return Ok(PointingError::NoSignal);
        };

        self.consec_detect_frames += 1;
        if self.consec_detect_frames < self.min_consec_detect_frames {
            // A genuine detection, but not yet trusted: this cycle still
            // produces no usable measurement, so — like a frame with no
            // blob at all — it counts toward the dropout streak rather than
            // resetting it.
            self.consec_no_detect_frames += 1;
            return Ok(PointingError::NoSignal);
        }
        self.consec_no_detect_frames = 0;

        let dx = kp.x - frame.width as f64 / 2.0;
        let dy = kp.y - frame.height as f64 / 2.0;

        let px = |axis: PixelAxis| match axis {
            PixelAxis::X => dx,
            PixelAxis::Y => dy,
        };

        let error = PerAxis::new(
            deg(px(self.mapping.axis0_from) * self.mapping.deg_per_pixel_axis0).wrap_error(),
            deg(px(self.mapping.axis1_from) * self.mapping.deg_per_pixel_axis1).wrap_error(),
        );
        Ok(PointingError::value(error))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedFrameSource;
    impl FrameSource for FixedFrameSource {
        fn get_frame(&mut self) -> Result<Frame, TrackError> {
            Ok(Frame { width: 640, height: 480 })
        }
    }

    struct ScriptedDetector(Vec<Keypoint>);
    impl BlobDetector for ScriptedDetector {
        fn detect(&self, _frame: &Frame) -> Vec<Keypoint> {
            self.0.clone()
        }
    }

    fn mapping() -> PixelMapping {
        PixelMapping {
            axis0_from: PixelAxis::X,
            axis1_from: PixelAxis::Y,
            deg_per_pixel_axis0: 0.01,
            deg_per_pixel_axis1: -0.01,
        }
    }

    #[test]
    fn no_detection_returns_no_signal() {
        let mut source = OpticalErrorSource::new(FixedFrameSource, ScriptedDetector(vec![]), mapping());
        let result = source.compute_error(0).unwrap();
        assert!(result.is_no_signal());
        assert_eq!(source.consec_no_detect_frames(), 1);
    }

    #[test]
    fn single_blob_offset_converts_to_degrees() {
        let mut source = OpticalErrorSource::new(
            FixedFrameSource,
            ScriptedDetector(vec![Keypoint { x: 340.0, y: 200.0, size: 20.0 }]),
            mapping(),
        );
        match source.compute_error(0).unwrap() {
            PointingError::Value { error, .. } => {
                // dx = 340 - 320 = 20px -> 0.2 deg; dy = 200 - 240 = -40px -> 0.4 deg (sign flipped)
                assert!((error.axis0.as_deg() - 0.2).abs() < 1e-9);
                assert!((error.axis1.as_deg() - 0.4).abs() < 1e-9);
            }
            PointingError::NoSignal => panic!("expected a value"),
        }
    }

    #[test]
    fn keypoint_nearest_center_is_chosen_over_a_brighter_distant_one() {
        let mut source = OpticalErrorSource::new(
            FixedFrameSource,
            ScriptedDetector(vec![
                Keypoint { x: 330.0, y: 240.0, size: 5.0 },
                Keypoint { x: 420.0, y: 240.0, size: 50.0 },
            ]),
            mapping(),
        );
        match source.compute_error(0).unwrap() {
            PointingError::Value { error, .. } => {
                // The dimmer blob at x=330 (10px from center) wins over the
                // brighter one at x=420 (100px from center).
                assert!((error.axis0.as_deg() - 0.1).abs() < 1e-9);
            }
            PointingError::NoSignal => panic!("expected a value"),
        }
    }

    #[test]
    fn requires_consecutive_detections_before_trusting_a_measurement() {
        let mut source = OpticalErrorSource::new(
            FixedFrameSource,
            ScriptedDetector(vec![Keypoint { x: 330.0, y: 240.0, size: 10.0 }]),
            mapping(),
        )
        .with_min_consec_detect_frames(2);

        let first = source.compute_error(0).unwrap();
        assert!(first.is_no_signal());
        let second = source.compute_error(0).unwrap();
        assert!(!second.is_no_signal());
    }

    #[test]
    fn exhausted_retries_bump_the_no_detect_streak_by_exactly_one() {
        let mut source = OpticalErrorSource::new(FixedFrameSource, ScriptedDetector(vec![]), mapping());
        let result = source.compute_error(5).unwrap();
        assert!(result.is_no_signal());
        assert_eq!(source.consec_no_detect_frames(), 1);
    }

    #[test]
    fn untrusted_detection_counts_toward_the_no_detect_streak_instead_of_resetting_it() {
        let mut source = OpticalErrorSource::new(
            FixedFrameSource,
            ScriptedDetector(vec![Keypoint { x: 330.0, y: 240.0, size: 10.0 }]),
            mapping(),
        )
        .with_min_consec_detect_frames(2);

        let result = source.compute_error(0).unwrap();
        assert!(result.is_no_signal());
        assert_eq!(source.consec_no_detect_frames(), 1);
    }
}
