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

//! Time-windowed moving-average filter with variable sample period.
//!
//! Used to smooth the PID controller's derivative term. Unlike a simple
//! fixed-length ring buffer, the window is defined in seconds rather than
//! sample count, so it stays well-behaved under a jittery control loop rate.

use std::collections::VecDeque;

/// A moving-average filter over a fixed time depth, tolerant of a varying
/// sample period.
pub struct MovingAverageFilter {
    max_depth: f64,
    values: VecDeque<f64>,
    periods: VecDeque<f64>,
}

impl MovingAverageFilter {
    /// `max_depth` is the window depth in seconds.
    pub fn new(max_depth: f64) -> MovingAverageFilter {
        MovingAverageFilter {
            max_depth,
            values: VecDeque::new(),
            periods: VecDeque::new(),
        }
    }

    /// Clear all retained samples.
    pub fn reset(&mut self) {
        self.values.clear();
        self.periods.clear();
    }

    /// The filter's current output without pushing a new sample: the mean
    /// of all retained values, or 0 when nothing has been retained yet.
    pub fn output(&self) -> f64 {
        if self.values.is_empty() {
            0.0
        } else {
            self.values.iter().sum::<f64>() / self.values.len() as f64
        }
    }

    /// Push a new sample and return the filter's new output.
    ///
    /// Samples are retained front-to-back (newest at the front); once the
    /// cumulative period of the retained samples exceeds `max_depth`, the
    /// oldest entries are discarded.
    pub fn advance(&mut self, value: f64, sample_period: f64) -> f64 {
        self.values.push_front(value);
        self.periods.push_front(sample_period);

        let mut cumulative: f64 = self.periods.iter().sum();
        while cumulative > self.max_depth && self.values.len() > 1 {
            // Safe: len() > 1 guarantees pop_back() targets the extra (older)
            // entry, never the one just pushed.
            let oldest = self.periods.pop_back().unwrap();
            self.values.pop_back();
            cumulative -= oldest;
        }

        self.output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_then_single_sample_within_depth_returns_exact_value() {
        let mut filter = MovingAverageFilter::new(0.2);
        filter.reset();
        let out = filter.advance(3.5, 0.05);
        assert!((out - 3.5).abs() < 1e-12);
    }

    #[test]
    fn empty_filter_outputs_zero() {
        let filter = MovingAverageFilter::new(0.2);
        assert_eq!(filter.output(), 0.0);
    }

    #[test]
    fn retained_period_sum_never_exceeds_depth_plus_newest() {
        let max_depth = 0.2;
        let mut filter = MovingAverageFilter::new(max_depth);
        for _ in 0..50 {
            filter.advance(1.0, 0.03);
        }
        let sum: f64 = filter.periods.iter().sum();
        let newest = *filter.periods.front().unwrap();
        assert!(sum <= max_depth + newest + 1e-9, "sum={sum}");
    }

    #[test]
    fn averages_equal_weighted_samples() {
        let mut filter = MovingAverageFilter::new(1.0);
        filter.advance(1.0, 0.1);
        filter.advance(2.0, 0.1);
        let out = filter.advance(3.0, 0.1);
        assert!((out - 2.0).abs() < 1e-9);
    }

    #[test]
    fn drops_samples_older_than_window() {
        let mut filter = MovingAverageFilter::new(0.1);
        filter.advance(100.0, 0.05);
        filter.advance(100.0, 0.05);
        // This single new sample already exceeds max_depth on its own, so only it survives.
        let out = filter.advance(5.0, 0.2);
        assert!((out - 5.0).abs() < 1e-9);
    }
}
