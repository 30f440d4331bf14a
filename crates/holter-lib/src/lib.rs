pub mod compression;
pub mod config;
pub mod detectors;
pub mod error;
pub mod filters;
pub mod io;
pub mod metrics;
pub mod pipeline;
pub mod rhythm;
pub mod signal;
pub mod stream;

#[cfg(test)]
mod testutil;

pub use compression::{decompress, CompressedArtifact, CompressionEngine};
pub use config::{NotchRegion, PeakMethod, PipelineConfig};
pub use detectors::*;
pub use error::{Error, Result};
pub use filters::{condition, FilterChain};
pub use metrics::*;
pub use pipeline::{AnalysisResult, Pipeline, SegmentAnalysis};
pub use rhythm::{RhythmClassifier, RhythmType};
pub use signal::*;
pub use stream::{
    run_batch, AcquisitionFeed, BatchReport, OverflowPolicy, PushOutcome, SegmentOutcome, WorkerPool,
};
