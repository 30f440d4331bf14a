//! Assembles every analysis stage into one immutable result per segment.

use crate::{
    compression::{CompressedArtifact, CompressionEngine},
    config::PipelineConfig,
    detectors::{Abnormality, AbnormalityDetector, PeakDetector},
    error::Result,
    filters::FilterChain,
    metrics::{
        hrv::{hrv_time, HRVTime},
        quality::{assess, ConfidenceScorer, SignalQuality},
        rate::{HeartRate, RateEstimator},
    },
    rhythm::{RhythmClassifier, RhythmType},
    signal::{ConditionedSegment, PeakSet, RRSeries, RawSegment},
};
use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Outcome of analysing one segment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Mean heart rate in bpm, clamped to the configured range.
    pub heart_rate: f64,
    pub rhythm_type: RhythmType,
    /// Signal-quality confidence in [0, 1].
    pub confidence: f64,
    pub abnormalities: BTreeSet<Abnormality>,
    /// Start time of the analysed segment.
    pub analysis_timestamp: DateTime<Utc>,
    pub beat_count: usize,
}

/// Every intermediate product of an analysis, for inspection and reporting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentAnalysis {
    pub conditioned: ConditionedSegment,
    pub peaks: PeakSet,
    pub rate: HeartRate,
    pub rr: RRSeries,
    pub hrv: HRVTime,
    pub quality: SignalQuality,
    pub result: AnalysisResult,
}

/// The full conditioning and analysis chain for one configuration.
///
/// Holds no per-segment state, so one instance can be shared across threads.
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
    chain: FilterChain,
    detector: PeakDetector,
    rate: RateEstimator,
    classifier: RhythmClassifier,
    scorer: ConfidenceScorer,
    abnormality: AbnormalityDetector,
    compressor: CompressionEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            chain: FilterChain::new(config)?,
            detector: PeakDetector::new(config.peak_method, config.pan_tompkins),
            rate: RateEstimator::new(config.min_hr, config.max_hr),
            classifier: RhythmClassifier::new(config.rhythm),
            scorer: ConfidenceScorer,
            abnormality: AbnormalityDetector::new(config.abnormality),
            compressor: CompressionEngine,
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn condition(&self, segment: &RawSegment) -> Result<ConditionedSegment> {
        self.chain.condition(segment)
    }

    pub fn analyze(&self, segment: &RawSegment) -> Result<AnalysisResult> {
        Ok(self.analyze_detailed(segment)?.result)
    }

    pub fn analyze_detailed(&self, segment: &RawSegment) -> Result<SegmentAnalysis> {
        let conditioned = self.chain.condition(segment)?;
        let peaks = self.detector.detect(&conditioned);
        let (rate, rr) = self.rate.estimate(&peaks, conditioned.sample_rate);
        let rhythm_type = self.classifier.classify(rate.bpm, &rr);
        let quality = assess(&conditioned.samples);
        let confidence = self.scorer.score_quality(&quality, rhythm_type);
        let abnormalities = self.abnormality.detect(&conditioned, &peaks);

        let result = AnalysisResult {
            heart_rate: rate.bpm,
            rhythm_type,
            confidence,
            abnormalities,
            analysis_timestamp: segment.start_timestamp,
            beat_count: peaks.len(),
        };
        info!(
            "segment at {}: {:.1} bpm, {}, confidence {:.2}, {} beats",
            result.analysis_timestamp,
            result.heart_rate,
            result.rhythm_type,
            result.confidence,
            result.beat_count
        );
        Ok(SegmentAnalysis {
            hrv: hrv_time(&rr),
            conditioned,
            peaks,
            rate,
            rr,
            quality,
            result,
        })
    }

    /// Compress the raw samples at the configured default ratio.
    pub fn compress(&self, segment: &RawSegment) -> Result<CompressedArtifact> {
        self.compress_with_ratio(segment, self.config.default_compression_ratio)
    }

    pub fn compress_with_ratio(
        &self,
        segment: &RawSegment,
        ratio: f64,
    ) -> Result<CompressedArtifact> {
        self.compressor
            .compress(&segment.samples, segment.sample_rate, ratio)
    }

    pub fn compress_conditioned(
        &self,
        segment: &ConditionedSegment,
        ratio: f64,
    ) -> Result<CompressedArtifact> {
        self.compressor
            .compress(&segment.samples, segment.sample_rate, ratio)
    }
}
