use crate::{
    config::AbnormalityThresholds,
    metrics::stats,
    signal::{ConditionedSegment, PeakSet, RRSeries},
};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeSet, fmt};

/// Minimum RR intervals before a beat can be judged premature against the median.
const MIN_INTERVALS_FOR_PREMATURE: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Abnormality {
    /// An RR interval markedly shorter than the segment's median interval.
    PrematureBeat,
    /// An RR interval longer than the pause threshold.
    LongPause,
    /// An RR interval inside the refractory period, usually a double count.
    ImplausibleInterval,
    /// Median QRS half-amplitude width above the wide-complex threshold.
    WideComplex,
}

impl Abnormality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Abnormality::PrematureBeat => "premature-beat",
            Abnormality::LongPause => "long-pause",
            Abnormality::ImplausibleInterval => "implausible-interval",
            Abnormality::WideComplex => "wide-complex",
        }
    }
}

impl fmt::Display for Abnormality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule checks over RR intervals and complex morphology.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AbnormalityDetector {
    pub thresholds: AbnormalityThresholds,
}

impl AbnormalityDetector {
    pub fn new(thresholds: AbnormalityThresholds) -> Self {
        Self { thresholds }
    }

    /// An empty set means no rule fired.
    pub fn detect(&self, segment: &ConditionedSegment, peaks: &PeakSet) -> BTreeSet<Abnormality> {
        let rr = RRSeries::from_peaks(peaks, segment.sample_rate);
        let mut found = self.check_intervals(&rr);
        if let Some(width) = median_complex_width(&segment.samples, peaks, segment.sample_rate) {
            if width > self.thresholds.wide_complex_fwhm_s {
                found.insert(Abnormality::WideComplex);
            }
        }
        found
    }

    pub fn check_intervals(&self, rr: &RRSeries) -> BTreeSet<Abnormality> {
        let t = &self.thresholds;
        let mut found = BTreeSet::new();
        if rr.len() >= MIN_INTERVALS_FOR_PREMATURE {
            let median = stats::median(&rr.rr);
            if rr.rr.iter().any(|&x| x < t.premature_ratio * median) {
                found.insert(Abnormality::PrematureBeat);
            }
        }
        if rr.rr.iter().any(|&x| x > t.long_pause_s) {
            found.insert(Abnormality::LongPause);
        }
        if rr.rr.iter().any(|&x| x < t.refractory_s) {
            found.insert(Abnormality::ImplausibleInterval);
        }
        found
    }
}

/// Median full width at half maximum (seconds) of the complexes at `peaks`,
/// measured against the segment median. `None` without a usable complex.
pub fn median_complex_width(samples: &[f64], peaks: &PeakSet, fs: f64) -> Option<f64> {
    if samples.is_empty() || peaks.is_empty() || fs <= 0.0 {
        return None;
    }
    let baseline = stats::median(samples);
    let widths: Vec<f64> = peaks
        .peaks
        .iter()
        .filter(|p| p.index < samples.len())
        .filter_map(|p| half_max_width(samples, p.index, baseline))
        .map(|w| w / fs)
        .collect();
    if widths.is_empty() {
        None
    } else {
        Some(stats::median(&widths))
    }
}

/// Width in samples, with linear interpolation at both half-height crossings.
fn half_max_width(samples: &[f64], peak: usize, baseline: f64) -> Option<f64> {
    let height = samples[peak] - baseline;
    if height <= 0.0 {
        return None;
    }
    let half = baseline + height / 2.0;

    let mut left = peak as f64;
    let mut i = peak;
    while i > 0 {
        if samples[i - 1] <= half {
            let (lo, hi) = (samples[i - 1], samples[i]);
            left = (i - 1) as f64 + (half - lo) / (hi - lo);
            break;
        }
        i -= 1;
        left = i as f64;
    }

    let mut right = peak as f64;
    let mut j = peak;
    while j + 1 < samples.len() {
        if samples[j + 1] <= half {
            let (hi, lo) = (samples[j], samples[j + 1]);
            right = j as f64 + (hi - half) / (hi - lo);
            break;
        }
        j += 1;
        right = j as f64;
    }

    Some(right - left)
}
