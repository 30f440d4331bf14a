use crate::signal::RawSegment;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

/// Sampling rate assumed when a header omits it (WFDB default).
const DEFAULT_WFDB_FS: f64 = 250.0;

/// One entry of an MIT-format annotation file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WfdbAnnotation {
    pub sample: usize,
    pub code: u8,
}

impl WfdbAnnotation {
    /// QRS annotation codes; everything else is a rhythm, noise or signal note.
    pub fn is_beat(&self) -> bool {
        matches!(self.code, 1..=13 | 25 | 30 | 34 | 35 | 38 | 41)
    }

    /// Premature ventricular contraction (`V`).
    pub fn is_ventricular_ectopic(&self) -> bool {
        self.code == 5
    }
}

/// Load one lead of a WFDB record as physical units (ADC gain and baseline applied).
pub fn load_wfdb_segment(
    header_path: &Path,
    lead: usize,
    start: DateTime<Utc>,
) -> Result<RawSegment> {
    if !header_path.is_file() {
        anyhow::bail!("WFDB header {} not found", header_path.display());
    }
    let (header, signals) = wfdb_rust::parse_wfdb(header_path);
    if lead >= signals.len() {
        anyhow::bail!(
            "WFDB record contains {} signals, but lead {} was requested",
            signals.len(),
            lead
        );
    }
    let signal = header
        .signal_specs
        .get(lead)
        .with_context(|| format!("header has no signal entry for lead {}", lead))?;
    let gain = signal.adc_gain.unwrap_or(1.0) as f64;
    let gain = if gain == 0.0 { 1.0 } else { gain };
    let baseline = signal.baseline.or(signal.adc_zero).unwrap_or(0) as f64;
    let fs = header
        .record
        .sampling_frequency
        .map(|f| f as f64)
        .unwrap_or(DEFAULT_WFDB_FS);
    let samples = signals[lead]
        .iter()
        .map(|&adc| (adc as f64 - baseline) / gain)
        .collect();
    Ok(RawSegment::new(samples, fs, start))
}

/// Decode an MIT annotation byte stream.
pub fn parse_wfdb_annotations(buf: &[u8]) -> Vec<WfdbAnnotation> {
    let mut out = Vec::new();
    let mut idx = 0;
    let mut sample: usize = 0;
    while idx + 2 <= buf.len() {
        let word = u16::from_le_bytes([buf[idx], buf[idx + 1]]);
        idx += 2;
        let code = (word >> 10) as u8;
        let diff = (word & 0x03FF) as usize;
        if code == 0 && diff == 0 {
            break;
        }
        match code {
            // SKIP: 32-bit interval in the next two words, high half first
            59 => {
                if idx + 4 > buf.len() {
                    break;
                }
                let high = u16::from_le_bytes([buf[idx], buf[idx + 1]]) as u32;
                let low = u16::from_le_bytes([buf[idx + 2], buf[idx + 3]]) as u32;
                idx += 4;
                sample = sample.wrapping_add(((high << 16) | low) as usize);
            }
            // NUM/SUB/CHN modifiers
            60..=62 => {
                sample = sample.wrapping_add(diff);
            }
            // AUX: `diff` bytes of text, padded to an even length
            63 => {
                idx += diff;
                if diff % 2 != 0 && idx < buf.len() {
                    idx += 1;
                }
            }
            _ => {
                sample = sample.wrapping_add(diff);
                out.push(WfdbAnnotation { sample, code });
            }
        }
    }
    out
}

/// Beat sample indices from an annotation (`.atr`) file.
pub fn load_wfdb_beats(path: &Path) -> Result<Vec<usize>> {
    let buf = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok(parse_wfdb_annotations(&buf)
        .into_iter()
        .filter(WfdbAnnotation::is_beat)
        .map(|ann| ann.sample)
        .collect())
}
