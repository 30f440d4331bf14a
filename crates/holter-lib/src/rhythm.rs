use crate::{
    config::RhythmThresholds,
    metrics::{hrv::hrv_time, stats},
    signal::RRSeries,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Upper bound of bradycardia (exclusive, bpm).
pub const BRADYCARDIA_BELOW: f64 = 60.0;
/// Lower bound of tachycardia (exclusive, bpm).
pub const TACHYCARDIA_ABOVE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RhythmType {
    Normal,
    Tachycardia,
    Bradycardia,
    Arrhythmia,
    Fibrillation,
}

impl RhythmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RhythmType::Normal => "normal",
            RhythmType::Tachycardia => "tachycardia",
            RhythmType::Bradycardia => "bradycardia",
            RhythmType::Arrhythmia => "arrhythmia",
            RhythmType::Fibrillation => "fibrillation",
        }
    }

    /// Whether the class was decided by interval irregularity rather than rate.
    pub fn is_irregular(&self) -> bool {
        matches!(self, RhythmType::Arrhythmia | RhythmType::Fibrillation)
    }
}

impl fmt::Display for RhythmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Maps heart rate and RR regularity to a rhythm class.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RhythmClassifier {
    pub thresholds: RhythmThresholds,
}

impl RhythmClassifier {
    pub fn new(thresholds: RhythmThresholds) -> Self {
        Self { thresholds }
    }

    /// Rate rules first (60 and 100 bpm are both normal), then, for a
    /// rate-normal rhythm with enough intervals, the fibrillation rule
    /// (high normalized RMSSD and pNN50) and the arrhythmia rule (RR variance).
    pub fn classify(&self, heart_rate: f64, rr: &RRSeries) -> RhythmType {
        if heart_rate < BRADYCARDIA_BELOW {
            return RhythmType::Bradycardia;
        }
        if heart_rate > TACHYCARDIA_ABOVE {
            return RhythmType::Tachycardia;
        }
        let t = &self.thresholds;
        if rr.len() < t.min_intervals_for_irregularity.max(2) {
            return RhythmType::Normal;
        }
        let hrv = hrv_time(rr);
        if hrv.normalized_rmssd() > t.fibrillation_nrmssd && hrv.pnn50 >= t.fibrillation_pnn50 {
            return RhythmType::Fibrillation;
        }
        if stats::variance(&rr.rr) > t.rr_variance_threshold {
            return RhythmType::Arrhythmia;
        }
        RhythmType::Normal
    }
}
