use crate::error::{Error, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Mains frequency of the deployment region, used to pick the notch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NotchRegion {
    /// 50 Hz mains
    Europe,
    /// 60 Hz mains
    NorthAmerica,
}

impl NotchRegion {
    pub fn mains_hz(self) -> f64 {
        match self {
            NotchRegion::Europe => 50.0,
            NotchRegion::NorthAmerica => 60.0,
        }
    }
}

/// Which R-peak detector the pipeline runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PeakMethod {
    /// Local maximum above half a standard deviation.
    #[default]
    LocalMaximum,
    /// Adaptive-threshold detector with a refractory period.
    PanTompkins,
}

/// Parameters of the adaptive-threshold (Pan–Tompkins style) detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PanTompkinsConfig {
    /// Lower cutoff for the single-pole high-pass filter (Hz).
    pub lowcut_hz: f64,
    /// Upper cutoff for the single-pole low-pass filter (Hz).
    pub highcut_hz: f64,
    /// Moving window integration length (seconds).
    pub integration_window_s: f64,
    /// Minimum physiological RR distance / refractory period (seconds).
    pub min_rr_s: f64,
    /// Scale between noise and signal envelopes for the adaptive threshold.
    pub threshold_scale: f64,
    /// How far back to search (seconds) for the precise R-peak after a detection.
    pub search_back_s: f64,
}

impl Default for PanTompkinsConfig {
    fn default() -> Self {
        Self {
            lowcut_hz: 5.0,
            highcut_hz: 15.0,
            integration_window_s: 0.150,
            min_rr_s: 0.250,
            threshold_scale: 0.6,
            search_back_s: 0.150,
        }
    }
}

/// Thresholds of the rhythm irregularity rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RhythmThresholds {
    /// RR population variance (s²) above which a rate-normal rhythm is an arrhythmia.
    pub rr_variance_threshold: f64,
    /// RMSSD / mean RR above which successive intervals count as irregularly irregular.
    pub fibrillation_nrmssd: f64,
    /// Minimum pNN50 for the fibrillation rule.
    pub fibrillation_pnn50: f64,
    /// Fewer RR intervals than this are never judged irregular.
    pub min_intervals_for_irregularity: usize,
}

impl Default for RhythmThresholds {
    fn default() -> Self {
        Self {
            rr_variance_threshold: 0.01,
            fibrillation_nrmssd: 0.2,
            fibrillation_pnn50: 0.6,
            min_intervals_for_irregularity: 4,
        }
    }
}

/// Thresholds of the abnormality rules.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AbnormalityThresholds {
    /// An RR interval shorter than this fraction of the median RR is premature.
    pub premature_ratio: f64,
    /// RR intervals longer than this (seconds) are pauses.
    pub long_pause_s: f64,
    /// RR intervals shorter than this (seconds) are physiologically implausible.
    pub refractory_s: f64,
    /// Median half-amplitude complex width (seconds) above which complexes are wide.
    pub wide_complex_fwhm_s: f64,
}

impl Default for AbnormalityThresholds {
    fn default() -> Self {
        Self {
            premature_ratio: 0.8,
            long_pause_s: 2.0,
            refractory_s: 0.2,
            wide_complex_fwhm_s: 0.06,
        }
    }
}

/// Pipeline configuration. Fixed at construction; every pipeline instance
/// owns its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Nominal sampling rate (Hz) the filters are designed for.
    pub sample_rate: f64,
    /// Baseline-drift highpass cutoff (Hz).
    pub highpass_cutoff: f64,
    /// Noise lowpass cutoff (Hz).
    pub lowpass_cutoff: f64,
    /// Mains notch centre frequency (Hz).
    pub notch_freq: f64,
    /// Lower heart-rate clamp (bpm).
    pub min_hr: f64,
    /// Upper heart-rate clamp (bpm).
    pub max_hr: f64,
    pub default_compression_ratio: f64,
    pub peak_method: PeakMethod,
    pub pan_tompkins: PanTompkinsConfig,
    pub rhythm: RhythmThresholds,
    pub abnormality: AbnormalityThresholds,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 360.0,
            highpass_cutoff: 0.5,
            lowpass_cutoff: 40.0,
            notch_freq: NotchRegion::Europe.mains_hz(),
            min_hr: 40.0,
            max_hr: 200.0,
            default_compression_ratio: 0.1,
            peak_method: PeakMethod::LocalMaximum,
            pan_tompkins: PanTompkinsConfig::default(),
            rhythm: RhythmThresholds::default(),
            abnormality: AbnormalityThresholds::default(),
        }
    }
}

impl PipelineConfig {
    pub fn for_region(region: NotchRegion) -> Self {
        Self {
            notch_freq: region.mains_hz(),
            ..Self::default()
        }
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: Self = toml::from_str(text).map_err(|e| Error::InvalidConfig(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg = Self::from_toml_str(&contents)
            .with_context(|| format!("parsing config {}", path.display()))?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<()> {
        crate::filters::validate_cutoffs(self, self.sample_rate)?;
        if !(self.min_hr.is_finite() && self.min_hr >= 0.0) {
            return Err(Error::InvalidConfig(format!(
                "min_hr must be a non-negative number, got {}",
                self.min_hr
            )));
        }
        if !(self.max_hr.is_finite() && self.max_hr > self.min_hr) {
            return Err(Error::InvalidConfig(format!(
                "max_hr ({}) must exceed min_hr ({})",
                self.max_hr, self.min_hr
            )));
        }
        let ratio = self.default_compression_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(Error::InvalidConfig(format!(
                "default_compression_ratio must be in (0, 1], got {}",
                ratio
            )));
        }
        let positive = [
            ("rhythm.rr_variance_threshold", self.rhythm.rr_variance_threshold),
            ("rhythm.fibrillation_nrmssd", self.rhythm.fibrillation_nrmssd),
            ("abnormality.premature_ratio", self.abnormality.premature_ratio),
            ("abnormality.long_pause_s", self.abnormality.long_pause_s),
            ("abnormality.refractory_s", self.abnormality.refractory_s),
            ("abnormality.wide_complex_fwhm_s", self.abnormality.wide_complex_fwhm_s),
            ("pan_tompkins.min_rr_s", self.pan_tompkins.min_rr_s),
            (
                "pan_tompkins.integration_window_s",
                self.pan_tompkins.integration_window_s,
            ),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "{} must be positive, got {}",
                    name, value
                )));
            }
        }
        if !(0.0..=1.0).contains(&self.rhythm.fibrillation_pnn50) {
            return Err(Error::InvalidConfig(format!(
                "rhythm.fibrillation_pnn50 must be in [0, 1], got {}",
                self.rhythm.fibrillation_pnn50
            )));
        }
        Ok(())
    }
}
