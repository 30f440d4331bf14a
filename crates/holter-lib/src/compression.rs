//! Peak-preserving piecewise-linear compression of ECG segments.

use crate::{
    detectors::peaks::detect_local_maxima,
    error::{Error, Result},
    metrics::stats,
};
use log::debug;
use serde::{Deserialize, Serialize};
use std::{
    cmp::Ordering,
    collections::{BTreeSet, BinaryHeap},
};

pub const METHOD_TAG: &str = "peak-preserving-linear";

const MAGIC: &[u8; 4] = b"HECG";
const FORMAT_VERSION: u8 = 1;
/// magic + version + fs + length + ratio + quality + count
const HEADER_LEN: usize = 4 + 1 + 8 + 4 + 8 + 8 + 4;

/// Preserved R-peaks are at least this far apart (seconds).
const PEAK_SPACING_S: f64 = 0.2;
/// Largest share of the retained budget spent on R-peaks.
const PEAK_BUDGET_SHARE: f64 = 0.25;

/// Retained samples plus what is needed to rebuild the full segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedArtifact {
    pub method: String,
    pub sample_rate: f64,
    pub original_length: usize,
    /// Requested retention ratio in (0, 1].
    pub ratio: f64,
    /// 1 − RMS reconstruction error / σ(original), clamped to [0, 1].
    pub quality: f64,
    /// Strictly increasing retained sample indices.
    pub indices: Vec<usize>,
    pub values: Vec<f64>,
}

impl CompressedArtifact {
    pub fn retained(&self) -> usize {
        self.indices.len()
    }

    pub fn decompress(&self) -> Vec<f64> {
        reconstruct(&self.indices, &self.values, self.original_length)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let count = self.indices.len();
        let mut buf = Vec::with_capacity(HEADER_LEN + count * 12);
        buf.extend_from_slice(MAGIC);
        buf.push(FORMAT_VERSION);
        buf.extend_from_slice(&self.sample_rate.to_le_bytes());
        buf.extend_from_slice(&(self.original_length as u32).to_le_bytes());
        buf.extend_from_slice(&self.ratio.to_le_bytes());
        buf.extend_from_slice(&self.quality.to_le_bytes());
        buf.extend_from_slice(&(count as u32).to_le_bytes());
        let mut prev = 0usize;
        for &idx in &self.indices {
            buf.extend_from_slice(&((idx - prev) as u32).to_le_bytes());
            prev = idx;
        }
        for v in &self.values {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut r = ByteReader::new(data);
        if r.take(4)? != MAGIC {
            return Err(Error::Compression("bad magic, not an HECG artifact".into()));
        }
        let version = r.u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::Compression(format!(
                "unsupported format version {}",
                version
            )));
        }
        let sample_rate = r.f64()?;
        let original_length = r.u32()? as usize;
        let ratio = r.f64()?;
        let quality = r.f64()?;
        let count = r.u32()? as usize;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::Compression(format!("bad sample rate {}", sample_rate)));
        }
        check_ratio(ratio)?;
        if !(0.0..=1.0).contains(&quality) {
            return Err(Error::Compression(format!("bad quality {}", quality)));
        }
        if count == 0 || count > original_length {
            return Err(Error::Compression(format!(
                "{} retained samples for a segment of {}",
                count, original_length
            )));
        }
        if r.remaining() != count * 12 {
            return Err(Error::Compression(format!(
                "payload is {} bytes, expected {}",
                r.remaining(),
                count * 12
            )));
        }
        let mut indices = Vec::with_capacity(count);
        let mut prev = 0usize;
        for k in 0..count {
            let delta = r.u32()? as usize;
            if k > 0 && delta == 0 {
                return Err(Error::Compression("indices are not strictly increasing".into()));
            }
            let idx = prev + delta;
            if idx >= original_length {
                return Err(Error::Compression(format!(
                    "index {} outside segment of {}",
                    idx, original_length
                )));
            }
            indices.push(idx);
            prev = idx;
        }
        let values = (0..count).map(|_| r.f64()).collect::<Result<Vec<_>>>()?;
        if values.iter().any(|v| !v.is_finite()) {
            return Err(Error::Compression("non-finite retained value".into()));
        }
        Ok(Self {
            method: METHOD_TAG.to_string(),
            sample_rate,
            original_length,
            ratio,
            quality,
            indices,
            values,
        })
    }
}

struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(Error::Compression(format!(
                "truncated artifact: needed {} bytes at offset {}",
                n, self.pos
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self) -> Result<u8> {
        Ok(self.take(1)?[0])
    }

    fn u32(&mut self) -> Result<u32> {
        let mut b = [0u8; 4];
        b.copy_from_slice(self.take(4)?);
        Ok(u32::from_le_bytes(b))
    }

    fn f64(&mut self) -> Result<f64> {
        let mut b = [0u8; 8];
        b.copy_from_slice(self.take(8)?);
        Ok(f64::from_le_bytes(b))
    }
}

fn check_ratio(ratio: f64) -> Result<()> {
    if ratio > 0.0 && ratio <= 1.0 {
        Ok(())
    } else {
        Err(Error::Compression(format!(
            "compression ratio must be in (0, 1], got {}",
            ratio
        )))
    }
}

/// Number of samples kept for a segment of `len` samples.
pub fn retained_budget(len: usize, ratio: f64) -> usize {
    ((len as f64 * ratio).round() as usize).clamp(1, len.max(1))
}

/// Linear interpolation between retained samples; held flat outside them.
fn reconstruct(indices: &[usize], values: &[f64], len: usize) -> Vec<f64> {
    let mut out = vec![0.0; len];
    let n = indices.len().min(values.len());
    let (indices, values) = (&indices[..n], &values[..n]);
    if indices.is_empty() {
        return out;
    }
    let first = indices[0].min(len);
    out[..first].fill(values[0]);
    for (w, v) in indices.windows(2).zip(values.windows(2)) {
        fill_segment(&mut out, w[0], w[1], v[0], v[1]);
    }
    let last = indices.len() - 1;
    if indices[last] < len {
        out[indices[last]..].fill(values[last]);
    }
    out
}

fn fill_segment(out: &mut [f64], a: usize, b: usize, va: f64, vb: f64) {
    let span = (b - a) as f64;
    for (i, slot) in out.iter_mut().enumerate().take(b).skip(a) {
        *slot = va + (vb - va) * (i - a) as f64 / span;
    }
}

/// Largest deviation from the chord between retained samples `a` and `b`.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    deviation: f64,
    index: usize,
    left: usize,
    right: usize,
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    // ties go to the earlier sample
    fn cmp(&self, other: &Self) -> Ordering {
        self.deviation
            .total_cmp(&other.deviation)
            .then_with(|| other.index.cmp(&self.index))
    }
}

fn worst_sample(data: &[f64], left: usize, right: usize) -> Option<Candidate> {
    if right <= left + 1 {
        return None;
    }
    let (va, vb) = (data[left], data[right]);
    let span = (right - left) as f64;
    let mut best = Candidate {
        deviation: -1.0,
        index: left + 1,
        left,
        right,
    };
    for i in left + 1..right {
        let chord = va + (vb - va) * (i - left) as f64 / span;
        let deviation = (data[i] - chord).abs();
        if deviation > best.deviation {
            best.deviation = deviation;
            best.index = i;
        }
    }
    Some(best)
}

/// Selects which samples to keep: endpoints, then R-peaks by amplitude,
/// then the samples worst served by the current reconstruction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompressionEngine;

impl CompressionEngine {
    pub fn compress(
        &self,
        samples: &[f64],
        sample_rate: f64,
        ratio: f64,
    ) -> Result<CompressedArtifact> {
        check_ratio(ratio)?;
        if !(sample_rate.is_finite() && sample_rate > 0.0) {
            return Err(Error::Compression(format!("bad sample rate {}", sample_rate)));
        }
        if samples.is_empty() {
            return Err(Error::Compression("cannot compress an empty segment".into()));
        }
        if samples.len() > u32::MAX as usize {
            return Err(Error::Compression(format!(
                "segment of {} samples exceeds the artifact format",
                samples.len()
            )));
        }
        if samples.iter().any(|v| !v.is_finite()) {
            return Err(Error::Compression("segment contains non-finite samples".into()));
        }
        let len = samples.len();
        let budget = retained_budget(len, ratio);
        let selected = select_samples(samples, sample_rate, budget);
        let indices: Vec<usize> = selected.into_iter().collect();
        let values: Vec<f64> = indices.iter().map(|&i| samples[i]).collect();
        let quality = reconstruction_quality(samples, &reconstruct(&indices, &values, len));
        debug!(
            "compressed {} samples to {} (ratio {}, quality {:.3})",
            len,
            indices.len(),
            ratio,
            quality
        );
        Ok(CompressedArtifact {
            method: METHOD_TAG.to_string(),
            sample_rate,
            original_length: len,
            ratio,
            quality,
            indices,
            values,
        })
    }
}

/// Tallest local maxima, at most one per spacing window, capped at a share
/// of the budget so noise crests cannot crowd out error-driven samples.
fn r_peaks(data: &[f64], sample_rate: f64, budget: usize) -> Vec<usize> {
    let cap = (budget as f64 * PEAK_BUDGET_SHARE) as usize;
    if cap == 0 {
        return Vec::new();
    }
    let gap = ((PEAK_SPACING_S * sample_rate).round() as usize).max(1);
    let mean = stats::mean(data);
    let centred: Vec<f64> = data.iter().map(|x| x - mean).collect();
    let mut candidates = detect_local_maxima(&centred).peaks;
    candidates.sort_by(|a, b| b.amplitude.total_cmp(&a.amplitude).then(a.index.cmp(&b.index)));

    let mut accepted = BTreeSet::new();
    for peak in candidates {
        if accepted.len() >= cap {
            break;
        }
        let lo = peak.index.saturating_sub(gap - 1);
        let hi = peak.index.saturating_add(gap - 1);
        if accepted.range(lo..=hi).next().is_none() {
            accepted.insert(peak.index);
        }
    }
    accepted.into_iter().collect()
}

fn select_samples(data: &[f64], sample_rate: f64, budget: usize) -> BTreeSet<usize> {
    let len = data.len();
    let mut kept = BTreeSet::new();
    for idx in [0, len - 1] {
        if kept.len() < budget {
            kept.insert(idx);
        }
    }

    for idx in r_peaks(data, sample_rate, budget) {
        if kept.len() >= budget {
            break;
        }
        kept.insert(idx);
    }

    if kept.len() >= budget {
        return kept;
    }
    let anchors: Vec<usize> = kept.iter().copied().collect();
    let mut heap: BinaryHeap<Candidate> = anchors
        .windows(2)
        .filter_map(|w| worst_sample(data, w[0], w[1]))
        .collect();
    while kept.len() < budget {
        let Some(c) = heap.pop() else { break };
        kept.insert(c.index);
        heap.extend(worst_sample(data, c.left, c.index));
        heap.extend(worst_sample(data, c.index, c.right));
    }
    kept
}

fn reconstruction_quality(original: &[f64], rebuilt: &[f64]) -> f64 {
    let n = original.len().max(1) as f64;
    let rmse = (original
        .iter()
        .zip(rebuilt)
        .map(|(a, b)| (a - b).powi(2))
        .sum::<f64>()
        / n)
        .sqrt();
    let sigma = stats::std_dev(original);
    if sigma == 0.0 {
        return if rmse == 0.0 { 1.0 } else { 0.0 };
    }
    let q = 1.0 - rmse / sigma;
    if q.is_finite() {
        q.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// Rebuild the full-length signal from an artifact.
pub fn decompress(artifact: &CompressedArtifact) -> Vec<f64> {
    artifact.decompress()
}
