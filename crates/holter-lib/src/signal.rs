use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One acquisition window of raw single-channel ECG samples.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawSegment {
    /// Amplitude samples in acquisition order
    pub samples: Vec<f64>,
    /// Uniform sampling frequency in Hz
    pub sample_rate: f64,
    /// Wall-clock time of the first sample
    pub start_timestamp: DateTime<Utc>,
}

impl RawSegment {
    pub fn new(samples: Vec<f64>, sample_rate: f64, start_timestamp: DateTime<Utc>) -> Self {
        Self {
            samples,
            sample_rate,
            start_timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }

    /// Reject segments that cannot be analysed before any filtering happens.
    pub fn validate(&self) -> Result<()> {
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(Error::InvalidSegment(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        if self.samples.is_empty() {
            return Err(Error::InvalidSegment("segment has no samples".into()));
        }
        if let Some(idx) = self.samples.iter().position(|x| !x.is_finite()) {
            return Err(Error::InvalidSegment(format!(
                "sample {} is not finite ({})",
                idx, self.samples[idx]
            )));
        }
        Ok(())
    }
}

/// Filtered, amplitude-normalized samples. Same length and timing as the
/// raw segment it was derived from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionedSegment {
    pub samples: Vec<f64>,
    pub sample_rate: f64,
    pub start_timestamp: DateTime<Utc>,
}

impl ConditionedSegment {
    pub fn new(samples: Vec<f64>, sample_rate: f64, start_timestamp: DateTime<Utc>) -> Self {
        Self {
            samples,
            sample_rate,
            start_timestamp,
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / self.sample_rate
    }
}

/// A detected R-peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub index: usize,
    pub amplitude: f64,
}

/// R-peaks ordered by strictly increasing sample index.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeakSet {
    pub peaks: Vec<Peak>,
}

impl PeakSet {
    /// Build a peak set, sorting by index and dropping duplicate indices.
    pub fn from_peaks(mut peaks: Vec<Peak>) -> Self {
        peaks.sort_by_key(|p| p.index);
        peaks.dedup_by_key(|p| p.index);
        Self { peaks }
    }

    /// Build a peak set from bare indices, reading amplitudes from `samples`.
    /// Indices outside the sample range are discarded.
    pub fn from_indices(indices: &[usize], samples: &[f64]) -> Self {
        let peaks = indices
            .iter()
            .filter(|&&i| i < samples.len())
            .map(|&i| Peak {
                index: i,
                amplitude: samples[i],
            })
            .collect();
        Self::from_peaks(peaks)
    }

    pub fn len(&self) -> usize {
        self.peaks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peaks.is_empty()
    }

    pub fn indices(&self) -> Vec<usize> {
        self.peaks.iter().map(|p| p.index).collect()
    }

    pub fn amplitudes(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.amplitude).collect()
    }
}

/// RR intervals (seconds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RRSeries {
    pub rr: Vec<f64>,
}

impl RRSeries {
    pub fn from_peaks(peaks: &PeakSet, fs: f64) -> Self {
        let mut rr = Vec::new();
        for w in peaks.peaks.windows(2) {
            let dt = (w[1].index as f64 - w[0].index as f64) / fs;
            rr.push(dt);
        }
        Self { rr }
    }

    pub fn len(&self) -> usize {
        self.rr.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rr.is_empty()
    }

    pub fn mean(&self) -> f64 {
        if self.rr.is_empty() {
            return 0.0;
        }
        self.rr.iter().sum::<f64>() / self.rr.len() as f64
    }

    /// Change from each interval to the next (seconds); one shorter than the series.
    pub fn successive_differences(&self) -> Vec<f64> {
        self.rr.windows(2).map(|w| w[1] - w[0]).collect()
    }
}
