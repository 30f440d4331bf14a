//! Synthetic recordings shared by the unit tests.

use rand::{rngs::StdRng, Rng, SeedableRng};
use std::f64::consts::PI;

/// Beat onsets starting at `first`, spaced `rr` apart, strictly before `duration`.
pub fn beat_times(first: f64, rr: f64, duration: f64) -> Vec<f64> {
    let mut beats = Vec::new();
    let mut t = first;
    while t < duration - 0.05 {
        beats.push(t);
        t += rr;
    }
    beats
}

/// Gaussian R-waves at `beats` plus uniform white noise of the given half-width.
pub fn synthetic_ecg(fs: f64, duration: f64, beats: &[f64], noise: f64, seed: u64) -> Vec<f64> {
    shaped_ecg(fs, duration, beats, 0.012, noise, seed)
}

/// Like [`synthetic_ecg`] with a configurable R-wave width (Gaussian sigma, seconds).
pub fn shaped_ecg(
    fs: f64,
    duration: f64,
    beats: &[f64],
    width: f64,
    noise: f64,
    seed: u64,
) -> Vec<f64> {
    let mut rng = StdRng::seed_from_u64(seed);
    let samples = (duration * fs).round() as usize;
    (0..samples)
        .map(|i| {
            let time = i as f64 / fs;
            let mut v = 0.0;
            for &bt in beats {
                let d = (time - bt) / width;
                if d.abs() < 8.0 {
                    v += (-0.5 * d * d).exp();
                }
            }
            if noise > 0.0 {
                v += rng.gen_range(-noise..=noise);
            }
            v
        })
        .collect()
}

/// Add baseline wander (0.3 Hz) and mains interference at `mains_hz`.
pub fn with_interference(data: &[f64], fs: f64, mains_hz: f64) -> Vec<f64> {
    data.iter()
        .enumerate()
        .map(|(i, v)| {
            let t = i as f64 / fs;
            v + 0.3 * (2.0 * PI * 0.3 * t).sin() + 0.1 * (2.0 * PI * mains_hz * t).sin() + 1.5
        })
        .collect()
}
