//! Signal conditioning: zero-phase highpass → lowpass → notch, then
//! amplitude normalization.

pub mod zero_phase;

use crate::{
    config::PipelineConfig,
    error::{Error, Result},
    metrics::stats,
    signal::{ConditionedSegment, RawSegment},
};
use biquad::{Coefficients, ToHertz, Type};
use log::debug;

/// Order of the highpass and lowpass Butterworth stages.
pub const BUTTERWORTH_ORDER: usize = 4;
/// Quality factor of the mains notch.
pub const NOTCH_Q: f64 = 30.0;

/// Relative floor below which a filtered standard deviation counts as no variation.
const FLAT_FLOOR: f64 = 1e-9;

/// Fail unless every configured cutoff lies strictly inside (0, Nyquist).
pub fn validate_cutoffs(cfg: &PipelineConfig, sample_rate: f64) -> Result<()> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(Error::FilterDesign(format!(
            "sample rate must be positive, got {}",
            sample_rate
        )));
    }
    let nyquist = sample_rate / 2.0;
    for (name, freq) in [
        ("highpass_cutoff", cfg.highpass_cutoff),
        ("lowpass_cutoff", cfg.lowpass_cutoff),
        ("notch_freq", cfg.notch_freq),
    ] {
        if !(freq.is_finite() && freq > 0.0 && freq < nyquist) {
            return Err(Error::FilterDesign(format!(
                "{} = {} Hz is outside (0, {}) Hz for a {} Hz sample rate",
                name, freq, nyquist, sample_rate
            )));
        }
    }
    Ok(())
}

/// Quality factors of the second-order sections of an even-order Butterworth filter.
fn butterworth_qs(order: usize) -> Vec<f64> {
    (1..=order / 2)
        .map(|k| {
            let theta = (2 * k - 1) as f64 * std::f64::consts::PI / (2 * order) as f64;
            1.0 / (2.0 * theta.cos())
        })
        .collect()
}

#[derive(Debug, Clone, Copy)]
enum Band {
    Highpass,
    Lowpass,
    Notch,
}

fn design_section(band: Band, fs: f64, f0: f64, q: f64) -> Result<Coefficients<f64>> {
    let designed = match band {
        Band::Highpass => Coefficients::<f64>::from_params(Type::HighPass, fs.hz(), f0.hz(), q),
        Band::Lowpass => Coefficients::<f64>::from_params(Type::LowPass, fs.hz(), f0.hz(), q),
        Band::Notch => Coefficients::<f64>::from_params(Type::Notch, fs.hz(), f0.hz(), q),
    };
    designed.map_err(|e| {
        Error::FilterDesign(format!("{:?} {:?} at {} Hz (fs {} Hz)", band, e, f0, fs))
    })
}

#[derive(Debug, Clone)]
struct Stage {
    name: &'static str,
    sections: Vec<Coefficients<f64>>,
}

/// Coefficients for the three conditioning stages at one sample rate.
#[derive(Debug, Clone)]
pub struct FilterDesign {
    sample_rate: f64,
    stages: Vec<Stage>,
}

impl FilterDesign {
    pub fn new(cfg: &PipelineConfig, sample_rate: f64) -> Result<Self> {
        validate_cutoffs(cfg, sample_rate)?;
        let qs = butterworth_qs(BUTTERWORTH_ORDER);
        let highpass = qs
            .iter()
            .map(|&q| design_section(Band::Highpass, sample_rate, cfg.highpass_cutoff, q))
            .collect::<Result<Vec<_>>>()?;
        let lowpass = qs
            .iter()
            .map(|&q| design_section(Band::Lowpass, sample_rate, cfg.lowpass_cutoff, q))
            .collect::<Result<Vec<_>>>()?;
        let notch = vec![design_section(
            Band::Notch,
            sample_rate,
            cfg.notch_freq,
            NOTCH_Q,
        )?];
        Ok(Self {
            sample_rate,
            stages: vec![
                Stage {
                    name: "highpass",
                    sections: highpass,
                },
                Stage {
                    name: "lowpass",
                    sections: lowpass,
                },
                Stage {
                    name: "notch",
                    sections: notch,
                },
            ],
        })
    }

    pub fn sample_rate(&self) -> f64 {
        self.sample_rate
    }

    /// Run every stage zero-phase, checking each output for non-finite values.
    fn apply(&self, data: &[f64]) -> Result<Vec<f64>> {
        let mean = stats::mean(data);
        let mut current: Vec<f64> = data.iter().map(|x| x - mean).collect();
        for stage in &self.stages {
            current = zero_phase::filtfilt(&stage.sections, &current);
            ensure_finite(stage.name, &current)?;
            debug!(
                "{} stage done ({} samples, fs {} Hz)",
                stage.name,
                current.len(),
                self.sample_rate
            );
        }
        Ok(current)
    }
}

fn ensure_finite(stage: &'static str, data: &[f64]) -> Result<()> {
    if let Some(idx) = data.iter().position(|x| !x.is_finite()) {
        return Err(Error::NumericalInstability {
            stage,
            detail: format!("sample {} became {}", idx, data[idx]),
        });
    }
    Ok(())
}

/// Subtract the mean and divide by the standard deviation. A zero deviation
/// passes the data through unchanged.
pub fn normalize_amplitude(data: &[f64]) -> Vec<f64> {
    let mean = stats::mean(data);
    let sd = stats::std_dev(data);
    if sd == 0.0 {
        return data.to_vec();
    }
    data.iter().map(|x| (x - mean) / sd).collect()
}

/// True when the filtered deviation is below the numerical floor relative to
/// the raw amplitude `scale`, i.e. the segment carries no measurable variation.
fn is_flat(filtered: &[f64], scale: f64) -> bool {
    stats::std_dev(filtered) <= FLAT_FLOOR * scale.abs().max(f64::MIN_POSITIVE)
}

/// Conditions raw segments with coefficients fixed at construction.
#[derive(Debug, Clone)]
pub struct FilterChain {
    config: PipelineConfig,
    design: FilterDesign,
}

impl FilterChain {
    /// Design the filters for `config.sample_rate`. Fails with
    /// [`Error::FilterDesign`] for cutoffs outside (0, Nyquist).
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let design = FilterDesign::new(&config, config.sample_rate)?;
        Ok(Self { config, design })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn condition(&self, segment: &RawSegment) -> Result<ConditionedSegment> {
        segment.validate()?;
        let filtered = if (segment.sample_rate - self.design.sample_rate()).abs() < 1e-9 {
            self.design.apply(&segment.samples)?
        } else {
            debug!(
                "segment rate {} Hz differs from configured {} Hz; redesigning filters",
                segment.sample_rate,
                self.design.sample_rate()
            );
            FilterDesign::new(&self.config, segment.sample_rate)?.apply(&segment.samples)?
        };
        let scale = segment
            .samples
            .iter()
            .fold(0.0_f64, |acc, x| acc.max(x.abs()));
        let samples = if is_flat(&filtered, scale) {
            vec![0.0; filtered.len()]
        } else {
            normalize_amplitude(&filtered)
        };
        ensure_finite("normalize", &samples)?;
        Ok(ConditionedSegment::new(
            samples,
            segment.sample_rate,
            segment.start_timestamp,
        ))
    }
}

/// One-shot conditioning with a throwaway chain.
pub fn condition(segment: &RawSegment, config: &PipelineConfig) -> Result<ConditionedSegment> {
    FilterChain::new(*config)?.condition(segment)
}
