use crate::signal::{PeakSet, RRSeries};
use serde::{Deserialize, Serialize};

/// Mean heart rate of a segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HeartRate {
    /// Rate clamped into the configured clinical range (bpm).
    pub bpm: f64,
    /// Rate before clamping; 0 when fewer than two peaks were found.
    pub raw_bpm: f64,
}

impl HeartRate {
    pub fn was_clamped(&self) -> bool {
        self.bpm != self.raw_bpm
    }
}

/// Converts peak timing into RR intervals and a clamped mean rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateEstimator {
    pub min_hr: f64,
    pub max_hr: f64,
}

impl RateEstimator {
    pub fn new(min_hr: f64, max_hr: f64) -> Self {
        Self { min_hr, max_hr }
    }

    /// Fewer than two peaks is not an error: the raw rate is 0 (then clamped)
    /// and the RR series is empty.
    pub fn estimate(&self, peaks: &PeakSet, sample_rate: f64) -> (HeartRate, RRSeries) {
        if peaks.len() < 2 {
            return (self.clamp(0.0), RRSeries::default());
        }
        let rr = RRSeries::from_peaks(peaks, sample_rate);
        let mean_rr = rr.mean();
        let raw = if mean_rr > 0.0 { 60.0 / mean_rr } else { 0.0 };
        (self.clamp(raw), rr)
    }

    fn clamp(&self, raw_bpm: f64) -> HeartRate {
        let bpm = if raw_bpm.is_finite() {
            raw_bpm.clamp(self.min_hr, self.max_hr)
        } else {
            self.min_hr
        };
        HeartRate { bpm, raw_bpm }
    }
}

impl Default for RateEstimator {
    fn default() -> Self {
        Self::new(40.0, 200.0)
    }
}
