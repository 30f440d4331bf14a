pub mod hrv;
pub mod quality;
pub mod rate;
pub mod stats;

pub use quality::{ConfidenceScorer, SignalQuality};
pub use rate::{HeartRate, RateEstimator};
