use crate::{
    config::{PanTompkinsConfig, PeakMethod},
    metrics::stats,
    signal::{ConditionedSegment, Peak, PeakSet},
};
use log::debug;

/// Fraction of the segment standard deviation a local maximum must exceed.
pub const LOCAL_MAXIMUM_THRESHOLD: f64 = 0.5;

/// Locates R-peaks in conditioned segments.
#[derive(Debug, Clone, Copy, Default)]
pub struct PeakDetector {
    pub method: PeakMethod,
    pub pan_tompkins: PanTompkinsConfig,
}

impl PeakDetector {
    pub fn new(method: PeakMethod, pan_tompkins: PanTompkinsConfig) -> Self {
        Self {
            method,
            pan_tompkins,
        }
    }

    /// Never fails; an empty set means no candidate crossed the threshold.
    pub fn detect(&self, segment: &ConditionedSegment) -> PeakSet {
        let peaks = match self.method {
            PeakMethod::LocalMaximum => detect_local_maxima(&segment.samples),
            PeakMethod::PanTompkins => {
                detect_adaptive(&segment.samples, segment.sample_rate, &self.pan_tompkins)
            }
        };
        debug!("{:?} detector found {} peaks", self.method, peaks.len());
        peaks
    }
}

/// Baseline detector: strict local maxima above half a standard deviation.
///
/// Not refractory-aware, so noisy segments can produce double counts.
pub fn detect_local_maxima(data: &[f64]) -> PeakSet {
    if data.len() < 3 {
        return PeakSet::default();
    }
    let threshold = LOCAL_MAXIMUM_THRESHOLD * stats::std_dev(data);
    let mut peaks = Vec::new();
    for i in 1..data.len() - 1 {
        let y = data[i];
        if y > data[i - 1] && y > data[i + 1] && y > threshold {
            peaks.push(Peak {
                index: i,
                amplitude: y,
            });
        }
    }
    PeakSet { peaks }
}

/// Pan–Tompkins-inspired detector with adaptive signal/noise levels and a
/// refractory period.
pub fn detect_adaptive(data: &[f64], fs: f64, cfg: &PanTompkinsConfig) -> PeakSet {
    if data.is_empty() {
        return PeakSet::default();
    }
    let fs = fs.max(1.0);
    let energy = QrsEnergy::compute(data, fs, cfg);
    let indices = energy.locate_beats(fs, cfg);
    PeakSet::from_indices(&indices, data)
}

/// The QRS band of a segment and its moving-window slope energy.
struct QrsEnergy {
    band: Vec<f64>,
    envelope: Vec<f64>,
}

impl QrsEnergy {
    fn compute(data: &[f64], fs: f64, cfg: &PanTompkinsConfig) -> Self {
        let band = qrs_band(data, fs, cfg.lowcut_hz, cfg.highcut_hz);
        let window = ((cfg.integration_window_s * fs).round() as usize).max(1);

        // running sum of the squared first difference
        let mut cumulative = Vec::with_capacity(band.len() + 1);
        cumulative.push(0.0);
        let mut total = 0.0;
        let mut previous = band[0];
        for &y in &band {
            let slope = y - previous;
            total += slope * slope;
            cumulative.push(total);
            previous = y;
        }
        let envelope = (0..band.len())
            .map(|i| (cumulative[i + 1] - cumulative[(i + 1).saturating_sub(window)]) / window as f64)
            .collect();
        Self { band, envelope }
    }

    /// Walk the envelope, marking a beat whenever it clears the adaptive
    /// threshold outside the refractory period. Each beat lands on the
    /// band maximum of the preceding search window.
    fn locate_beats(&self, fs: f64, cfg: &PanTompkinsConfig) -> Vec<usize> {
        let refractory = ((cfg.min_rr_s * fs).round() as usize).max(1);
        let search = ((cfg.search_back_s * fs).round() as usize).max(1);
        let learning = self.envelope.len().min((fs as usize).max(1));
        let Some(mut threshold) =
            AdaptiveThreshold::learn(&self.envelope[..learning], cfg.threshold_scale)
        else {
            debug!("no QRS-band energy in the learning window");
            return Vec::new();
        };

        let mut beats: Vec<usize> = Vec::new();
        let mut last_trigger: Option<usize> = None;
        for (i, &energy) in self.envelope.iter().enumerate() {
            let clear = last_trigger.map_or(true, |t| i - t >= refractory);
            if !clear || energy < threshold.level() {
                threshold.observe_noise(energy);
                continue;
            }
            let lo = i.saturating_sub(search);
            let r = (lo..=i).fold(lo, |best, j| if self.band[j] > self.band[best] { j } else { best });
            // search-back can land on the previous beat
            if beats.last().map_or(true, |&prev| r > prev) {
                beats.push(r);
            }
            last_trigger = Some(i);
            threshold.observe_signal(energy);
        }
        beats
    }
}

/// Exponentially tracked signal and noise envelope levels.
struct AdaptiveThreshold {
    signal: f64,
    noise: f64,
    scale: f64,
}

impl AdaptiveThreshold {
    const FORGET: f64 = 0.125;

    /// Seed both levels from the mean energy of the learning window; `None`
    /// when that window carries no energy.
    fn learn(window: &[f64], scale: f64) -> Option<Self> {
        let mean = stats::mean(window);
        (mean > 0.0).then_some(Self {
            signal: mean,
            noise: mean * 0.5,
            scale,
        })
    }

    fn level(&self) -> f64 {
        self.noise + self.scale * (self.signal - self.noise).max(0.0)
    }

    fn observe_signal(&mut self, energy: f64) {
        self.signal += Self::FORGET * (energy - self.signal);
    }

    fn observe_noise(&mut self, energy: f64) {
        self.noise += Self::FORGET * (energy - self.noise);
    }
}

/// Single-pole high-pass then single-pole low-pass, fused into one pass.
/// A cutoff outside `(0, fs/2)` disables its stage.
fn qrs_band(data: &[f64], fs: f64, low_hz: f64, high_hz: f64) -> Vec<f64> {
    let dt = 1.0 / fs;
    let rc = |cutoff: f64| 1.0 / (2.0 * std::f64::consts::PI * cutoff.max(0.01));
    let hp_alpha = (low_hz > 0.0).then(|| rc(low_hz) / (rc(low_hz) + dt));
    let lp_alpha = (high_hz > 0.0 && high_hz < fs * 0.5).then(|| dt / (rc(high_hz) + dt));

    let mut prev_x = data[0];
    let mut hp_y = 0.0;
    let mut lp_y: Option<f64> = None;
    data.iter()
        .map(|&x| {
            let y = match hp_alpha {
                Some(a) => {
                    hp_y = a * (hp_y + x - prev_x);
                    prev_x = x;
                    hp_y
                }
                None => x,
            };
            match lp_alpha {
                Some(b) => {
                    let state = lp_y.get_or_insert(y);
                    *state += b * (y - *state);
                    *state
                }
                None => y,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{beat_times, synthetic_ecg};
    use chrono::Utc;

    fn conditioned(samples: Vec<f64>, fs: f64) -> ConditionedSegment {
        ConditionedSegment::new(samples, fs, Utc::now())
    }

    #[test]
    fn local_maxima_obey_threshold_and_neighbours() {
        let data = vec![0.0, 1.0, 0.0, 0.1, 0.2, 0.1, 0.0, 3.0, 3.0, 0.0, 2.0, 0.0];
        let peaks = detect_local_maxima(&data);
        // plateau at 7/8 is not a strict maximum; 0.2 is below threshold
        assert_eq!(peaks.indices(), vec![1, 10]);
        assert_eq!(peaks.amplitudes(), vec![1.0, 2.0]);
    }

    #[test]
    fn short_and_flat_inputs_have_no_peaks() {
        assert!(detect_local_maxima(&[]).is_empty());
        assert!(detect_local_maxima(&[1.0, 2.0]).is_empty());
        assert!(detect_local_maxima(&[0.0; 100]).is_empty());
    }

    #[test]
    fn endpoints_are_never_peaks() {
        let data = vec![5.0, 0.0, 0.0, 2.0, 0.0, 0.0, 5.0];
        assert_eq!(detect_local_maxima(&data).indices(), vec![3]);
    }

    #[test]
    fn detects_regular_beats() {
        let fs: f64 = 360.0;
        let beats = beat_times(0.4, 0.8, 10.0);
        let data = synthetic_ecg(fs, 10.0, &beats, 0.0, 1);
        let peaks = PeakDetector::default().detect(&conditioned(data, fs));
        assert_eq!(peaks.len(), beats.len());
        for (peak, t) in peaks.peaks.iter().zip(&beats) {
            let expected = (t * fs).round() as isize;
            assert!((peak.index as isize - expected).abs() <= 1);
        }
    }

    #[test]
    fn adaptive_detector_respects_refractory_period() {
        let fs: f64 = 250.0;
        let rr = [0.82, 0.78, 0.8, 0.79, 0.81, 0.77, 0.84, 0.88];
        let mut beats = vec![0.5];
        for interval in rr {
            let next = beats.last().copied().unwrap_or(0.0) + interval;
            beats.push(next);
        }
        let duration = beats.last().copied().unwrap_or(1.0) + 1.0;
        let data = synthetic_ecg(fs, duration, &beats, 0.0, 7);
        let detector = PeakDetector::new(PeakMethod::PanTompkins, PanTompkinsConfig::default());
        let peaks = detector.detect(&conditioned(data, fs));
        assert_eq!(peaks.len(), beats.len());
        let min_gap = (PanTompkinsConfig::default().min_rr_s * fs) as usize;
        for w in peaks.peaks.windows(2) {
            assert!(w[1].index - w[0].index >= min_gap / 2);
        }
    }

    #[test]
    fn adaptive_detector_on_flat_signal_is_empty() {
        let peaks = detect_adaptive(&[0.0; 2000], 360.0, &PanTompkinsConfig::default());
        assert!(peaks.is_empty());
    }
}
