//! Signal quality indices and the confidence score derived from them.

use crate::{metrics::stats, rhythm::RhythmType, signal::ConditionedSegment};
use realfft::RealFftPlanner;
use serde::{Deserialize, Serialize};

/// Kurtosis of Gaussian noise; QRS-dominated ECG sits well above it.
const GAUSSIAN_KURTOSIS: f64 = 3.0;
/// Kurtosis excess over Gaussian that earns a full kurtosis score.
const KURTOSIS_SPAN: f64 = 5.0;
/// Peak-to-noise ratio at which the score starts rising, and the span to full score.
const PEAK_NOISE_FLOOR: f64 = 3.0;
const PEAK_NOISE_SPAN: f64 = 9.0;
/// MAD to standard deviation for normally distributed noise.
const MAD_TO_SIGMA: f64 = 1.4826;
/// Confidence multiplier for rhythms decided by RR irregularity.
const IRREGULAR_RHYTHM_FACTOR: f64 = 0.9;

/// Raw quality indices of a conditioned segment and their [0, 1] scores.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    pub kurtosis: f64,
    pub peak_to_noise: f64,
    pub spectral_entropy: f64,
    pub kurtosis_score: f64,
    pub peak_to_noise_score: f64,
    pub spectral_score: f64,
}

impl SignalQuality {
    pub fn combined(&self) -> f64 {
        (self.kurtosis_score + self.peak_to_noise_score + self.spectral_score) / 3.0
    }
}

pub fn compute_kurtosis(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let mean = data.iter().copied().sum::<f64>() / data.len() as f64;
    let m2 = data.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / data.len() as f64;
    if m2 == 0.0 {
        return 0.0;
    }
    let m4 = data.iter().map(|x| (x - mean).powi(4)).sum::<f64>() / data.len() as f64;
    m4 / (m2 * m2)
}

/// Prominence of the upper tail (99th percentile over the median) relative
/// to a MAD-based noise estimate.
pub fn compute_peak_to_noise(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    let median = stats::median(data);
    let prominence = stats::percentile(data, 99.0) - median;
    let noise = (MAD_TO_SIGMA * stats::mad(data)).max(1e-12);
    (prominence / noise).max(0.0)
}

/// Shannon entropy of the power spectrum divided by its maximum, in [0, 1].
pub fn compute_spectral_entropy(data: &[f64]) -> f64 {
    let n = data.len();
    if n < 2 {
        return 0.0;
    }
    let mut planner = RealFftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    let mut buffer = data.to_vec();
    let mut spectrum = fft.make_output_vec();
    if fft.process(&mut buffer, &mut spectrum).is_err() {
        return 0.0;
    }
    let powers: Vec<f64> = spectrum.iter().map(|c| c.norm_sqr()).collect();
    let total_power: f64 = powers.iter().sum();
    if total_power == 0.0 || powers.len() < 2 {
        return 0.0;
    }
    let mut entropy = 0.0;
    for power in powers.iter().copied() {
        if power <= 0.0 {
            continue;
        }
        let p = power / total_power;
        entropy -= p * p.log2();
    }
    entropy / (powers.len() as f64).log2()
}

fn unit(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

pub fn assess(data: &[f64]) -> SignalQuality {
    if stats::std_dev(data) == 0.0 {
        return SignalQuality::default();
    }
    let kurtosis = compute_kurtosis(data);
    let peak_to_noise = compute_peak_to_noise(data);
    let spectral_entropy = compute_spectral_entropy(data);
    SignalQuality {
        kurtosis,
        peak_to_noise,
        spectral_entropy,
        kurtosis_score: unit((kurtosis - GAUSSIAN_KURTOSIS) / KURTOSIS_SPAN),
        peak_to_noise_score: unit((peak_to_noise - PEAK_NOISE_FLOOR) / PEAK_NOISE_SPAN),
        spectral_score: unit(1.0 - spectral_entropy),
    }
}

/// Confidence in an analysis result, derived from measured signal quality.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfidenceScorer;

impl ConfidenceScorer {
    /// A flat segment scores 0; rhythms decided by RR irregularity are
    /// scaled down by a fixed factor.
    pub fn score(&self, segment: &ConditionedSegment, rhythm: RhythmType) -> f64 {
        self.score_quality(&assess(&segment.samples), rhythm)
    }

    pub fn score_quality(&self, quality: &SignalQuality, rhythm: RhythmType) -> f64 {
        let factor = if rhythm.is_irregular() {
            IRREGULAR_RHYTHM_FACTOR
        } else {
            1.0
        };
        unit(factor * quality.combined())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::normalize_amplitude;
    use crate::testutil::{beat_times, synthetic_ecg};
    use chrono::Utc;
    use rand::{rngs::StdRng, Rng, SeedableRng};
    use std::f64::consts::PI;

    fn conditioned(samples: Vec<f64>) -> ConditionedSegment {
        ConditionedSegment::new(normalize_amplitude(&samples), 360.0, Utc::now())
    }

    fn noise(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        // sum of uniforms is close enough to Gaussian for kurtosis ≈ 3
        (0..n)
            .map(|_| (0..6).map(|_| rng.gen_range(-1.0..1.0)).sum::<f64>())
            .collect()
    }

    #[test]
    fn kurtosis_positive() {
        assert!(compute_kurtosis(&[1.0, 2.0, 1.0, 5.0]) >= 0.0);
        assert_eq!(compute_kurtosis(&[1.0, 1.0, 1.0]), 0.0);
    }

    #[test]
    fn spectral_entropy_in_unit_range() {
        let tone: Vec<f64> = (0..1024)
            .map(|i| (2.0 * PI * 32.0 * i as f64 / 1024.0).sin())
            .collect();
        let tone_entropy = compute_spectral_entropy(&tone);
        let noise_entropy = compute_spectral_entropy(&noise(1024, 3));
        assert!((0.0..=1.0).contains(&tone_entropy));
        assert!((0.0..=1.0).contains(&noise_entropy));
        assert!(tone_entropy < 0.1);
        assert!(noise_entropy > 0.7);
    }

    #[test]
    fn flat_segment_scores_zero() {
        let seg = conditioned(vec![0.0; 3600]);
        assert_eq!(ConfidenceScorer.score(&seg, RhythmType::Normal), 0.0);
    }

    #[test]
    fn clean_ecg_outscores_noise() {
        let fs: f64 = 360.0;
        let beats = beat_times(0.4, 0.8, 10.0);
        let ecg = conditioned(synthetic_ecg(fs, 10.0, &beats, 0.01, 11));
        let junk = conditioned(noise(3600, 5));
        let good = ConfidenceScorer.score(&ecg, RhythmType::Normal);
        let bad = ConfidenceScorer.score(&junk, RhythmType::Normal);
        assert!(good > 0.6, "clean ECG confidence {}", good);
        assert!(bad < 0.3, "noise confidence {}", bad);
        assert!((0.0..=1.0).contains(&good));
        assert!((0.0..=1.0).contains(&bad));
    }

    #[test]
    fn irregular_rhythm_lowers_confidence() {
        let fs: f64 = 360.0;
        let beats = beat_times(0.4, 0.8, 10.0);
        let ecg = conditioned(synthetic_ecg(fs, 10.0, &beats, 0.01, 11));
        let normal = ConfidenceScorer.score(&ecg, RhythmType::Normal);
        let fib = ConfidenceScorer.score(&ecg, RhythmType::Fibrillation);
        assert!(fib < normal);
    }
}
