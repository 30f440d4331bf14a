use crate::signal::RawSegment;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::{fmt::Display, path::Path, str::FromStr};

/// One value per line; blank lines and `#` comments are skipped.
fn parse_lines<T>(text: &str, what: &str) -> Result<Vec<T>>
where
    T: FromStr,
    T::Err: Display,
{
    let mut out = Vec::new();
    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let val = trimmed
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("{}", e))
            .with_context(|| format!("line {} is not {}: {}", idx + 1, what, trimmed))?;
        out.push(val);
    }
    if out.is_empty() {
        anyhow::bail!("no {} values found", what);
    }
    Ok(out)
}

pub fn parse_samples(text: &str) -> Result<Vec<f64>> {
    parse_lines(text, "a sample")
}

pub fn read_samples(path: &Path) -> Result<Vec<f64>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_samples(&text).with_context(|| format!("parsing {}", path.display()))
}

/// Load a text recording as one segment starting at `start`.
pub fn read_segment(path: &Path, sample_rate: f64, start: DateTime<Utc>) -> Result<RawSegment> {
    Ok(RawSegment::new(read_samples(path)?, sample_rate, start))
}

/// Reference beat positions, one sample index per line.
pub fn parse_beat_indices(text: &str) -> Result<Vec<usize>> {
    let mut beats: Vec<usize> = parse_lines(text, "a sample index")?;
    beats.sort_unstable();
    beats.dedup();
    Ok(beats)
}

pub fn read_beat_indices(path: &Path) -> Result<Vec<usize>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    parse_beat_indices(&text).with_context(|| format!("parsing {}", path.display()))
}
