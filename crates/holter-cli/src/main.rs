use anyhow::{anyhow, bail, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use holter_lib::{
    compression::CompressedArtifact,
    config::{NotchRegion, PeakMethod, PipelineConfig},
    detectors::{agreement::compare_beats, BeatAgreement},
    io::{csv as csv_io, text as text_io, wfdb as wfdb_io},
    metrics::{hrv::HRVTime, quality::SignalQuality, rate::HeartRate},
    pipeline::{AnalysisResult, Pipeline},
    signal::RawSegment,
    stream::{run_batch, OverflowPolicy},
};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::{
    io::{self, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Parser)]
#[command(
    name = "holter",
    version,
    about = "Holter: single-channel ECG conditioning, rhythm analysis and compression"
)]
struct Cli {
    #[command(flatten)]
    config: ConfigArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct ConfigArgs {
    /// TOML pipeline configuration; flags below override its values
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Mains region selecting the notch frequency
    #[arg(long, global = true)]
    region: Option<Region>,
    #[arg(long, global = true)]
    peak_method: Option<Method>,
    #[arg(long, global = true)]
    min_hr: Option<f64>,
    #[arg(long, global = true)]
    max_hr: Option<f64>,
}

#[derive(Args)]
struct InputArgs {
    /// Newline-delimited samples (stdin when no input is given)
    #[arg(long)]
    input: Option<PathBuf>,
    /// Read a CSV file instead; pair with --csv-column
    #[arg(long, conflicts_with = "input")]
    csv: Option<PathBuf>,
    /// Column name or zero-based index
    #[arg(long, default_value = "0")]
    csv_column: String,
    #[arg(long, conflicts_with_all = ["input", "csv"])]
    wfdb_header: Option<PathBuf>,
    #[arg(long, default_value_t = 0)]
    wfdb_lead: usize,
    /// Sampling rate in Hz; overrides rates found in the recording
    #[arg(long)]
    fs: Option<f64>,
    /// RFC 3339 time of the first sample (defaults to now)
    #[arg(long, value_parser = parse_timestamp)]
    start: Option<DateTime<Utc>>,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Region {
    #[value(name = "europe")]
    Europe,
    #[value(name = "north-america")]
    NorthAmerica,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Method {
    #[value(name = "local-maximum")]
    LocalMaximum,
    #[value(name = "pan-tompkins")]
    PanTompkins,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Policy {
    #[value(name = "block")]
    Block,
    #[value(name = "drop-newest")]
    DropNewest,
    #[value(name = "drop-oldest")]
    DropOldest,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyse one segment: heart rate, rhythm, confidence, abnormalities
    Analyze {
        #[command(flatten)]
        input: InputArgs,
        /// Include peaks, RR intervals, HRV and quality indices
        #[arg(long)]
        detailed: bool,
        /// Reference beat indices (text, or a WFDB .atr file) to score detection against
        #[arg(long)]
        annotations: Option<PathBuf>,
        #[arg(long, default_value_t = 150.0)]
        tolerance_ms: f64,
    },
    /// Print the conditioned (filtered, normalized) samples
    Condition {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Detect R-peaks in the conditioned signal
    Peaks {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Compress a segment; writes the binary artifact to --out or JSON to stdout
    Compress {
        #[command(flatten)]
        input: InputArgs,
        /// Retained fraction in (0, 1]; defaults to the configured ratio
        #[arg(long)]
        ratio: Option<f64>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Rebuild samples from a binary or JSON artifact
    Decompress {
        #[arg(long)]
        artifact: PathBuf,
    },
    /// Check a configuration and print the effective values
    Validate,
    /// Split a long recording into segments and analyse them on worker threads
    Batch {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value_t = 10.0)]
        segment_s: f64,
        #[arg(long, default_value_t = 4)]
        workers: usize,
        #[arg(long, default_value_t = 16)]
        queue: usize,
        #[arg(long, default_value = "block")]
        policy: Policy,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let base = load_config(&cli.config)?;
    match cli.command {
        Commands::Analyze {
            input,
            detailed,
            annotations,
            tolerance_ms,
        } => cmd_analyze(base, &input, detailed, annotations.as_deref(), tolerance_ms)?,
        Commands::Condition { input } => cmd_condition(base, &input)?,
        Commands::Peaks { input } => cmd_peaks(base, &input)?,
        Commands::Compress { input, ratio, out } => {
            cmd_compress(base, &input, ratio, out.as_deref())?
        }
        Commands::Decompress { artifact } => cmd_decompress(&artifact)?,
        Commands::Validate => cmd_validate(&base)?,
        Commands::Batch {
            input,
            segment_s,
            workers,
            queue,
            policy,
        } => cmd_batch(base, &input, segment_s, workers, queue, policy)?,
    }
    Ok(())
}

fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(text)
        .with_context(|| format!("'{}' is not an RFC 3339 timestamp", text))?
        .with_timezone(&Utc))
}

fn load_config(args: &ConfigArgs) -> Result<PipelineConfig> {
    let mut cfg = match &args.config {
        Some(path) => PipelineConfig::load(path)?,
        None => PipelineConfig::default(),
    };
    if let Some(region) = args.region {
        cfg.notch_freq = match region {
            Region::Europe => NotchRegion::Europe,
            Region::NorthAmerica => NotchRegion::NorthAmerica,
        }
        .mains_hz();
    }
    if let Some(method) = args.peak_method {
        cfg.peak_method = match method {
            Method::LocalMaximum => PeakMethod::LocalMaximum,
            Method::PanTompkins => PeakMethod::PanTompkins,
        };
    }
    if let Some(min_hr) = args.min_hr {
        cfg.min_hr = min_hr;
    }
    if let Some(max_hr) = args.max_hr {
        cfg.max_hr = max_hr;
    }
    Ok(cfg)
}

fn read_stdin_samples() -> Result<Vec<f64>> {
    let mut buf = String::new();
    io::stdin()
        .read_to_string(&mut buf)
        .context("reading samples from stdin")?;
    text_io::parse_samples(&buf)
}

/// Load the recording and build a pipeline whose filters match its rate.
fn load_segment(base: PipelineConfig, input: &InputArgs) -> Result<(Pipeline, RawSegment)> {
    let start = input.start.unwrap_or_else(Utc::now);
    let (samples, found_fs) = if let Some(header) = &input.wfdb_header {
        let seg = wfdb_io::load_wfdb_segment(header, input.wfdb_lead, start)?;
        (seg.samples, Some(seg.sample_rate))
    } else if let Some(path) = &input.csv {
        let column = csv_io::ColumnSelector::parse(&input.csv_column);
        let col = csv_io::read_csv_column(path, &column)?;
        (col.samples, col.sample_rate)
    } else if let Some(path) = &input.input {
        (text_io::read_samples(path)?, None)
    } else {
        (read_stdin_samples()?, None)
    };
    let fs = input.fs.or(found_fs).unwrap_or(base.sample_rate);
    let cfg = PipelineConfig {
        sample_rate: fs,
        ..base
    };
    let pipeline = Pipeline::new(cfg).context("building pipeline")?;
    Ok((pipeline, RawSegment::new(samples, fs, start)))
}

fn load_reference_beats(path: &Path) -> Result<Vec<usize>> {
    let is_atr = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("atr"))
        .unwrap_or(false);
    if is_atr {
        wfdb_io::load_wfdb_beats(path)
    } else {
        text_io::read_beat_indices(path)
    }
}

#[derive(Serialize)]
struct DetailedReport {
    #[serde(flatten)]
    result: AnalysisResult,
    sample_rate: f64,
    rate: HeartRate,
    peaks: Vec<usize>,
    rr: Vec<f64>,
    hrv: HRVTime,
    quality: SignalQuality,
    #[serde(skip_serializing_if = "Option::is_none")]
    agreement: Option<BeatAgreement>,
}

fn cmd_analyze(
    base: PipelineConfig,
    input: &InputArgs,
    detailed: bool,
    annotations: Option<&Path>,
    tolerance_ms: f64,
) -> Result<()> {
    let (pipeline, segment) = load_segment(base, input)?;
    let analysis = pipeline
        .analyze_detailed(&segment)
        .context("analysing segment")?;
    let agreement = match annotations {
        Some(path) => {
            let reference = load_reference_beats(path)?;
            let tolerance = (tolerance_ms / 1000.0 * segment.sample_rate).round() as usize;
            Some(compare_beats(
                &reference,
                &analysis.peaks.indices(),
                tolerance,
            ))
        }
        None => None,
    };
    let js = if detailed || agreement.is_some() {
        serde_json::to_string(&DetailedReport {
            sample_rate: segment.sample_rate,
            rate: analysis.rate,
            peaks: analysis.peaks.indices(),
            rr: analysis.rr.rr,
            hrv: analysis.hrv,
            quality: analysis.quality,
            agreement,
            result: analysis.result,
        })?
    } else {
        serde_json::to_string(&analysis.result)?
    };
    println!("{}", js);
    Ok(())
}

fn cmd_condition(base: PipelineConfig, input: &InputArgs) -> Result<()> {
    let (pipeline, segment) = load_segment(base, input)?;
    let conditioned = pipeline
        .condition(&segment)
        .context("conditioning segment")?;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for v in &conditioned.samples {
        writeln!(out, "{}", v)?;
    }
    out.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct PeaksOutput {
    sample_rate: f64,
    indices: Vec<usize>,
    amplitudes: Vec<f64>,
}

fn cmd_peaks(base: PipelineConfig, input: &InputArgs) -> Result<()> {
    let (pipeline, segment) = load_segment(base, input)?;
    let analysis = pipeline
        .analyze_detailed(&segment)
        .context("detecting peaks")?;
    let js = serde_json::to_string(&PeaksOutput {
        sample_rate: segment.sample_rate,
        indices: analysis.peaks.indices(),
        amplitudes: analysis.peaks.amplitudes(),
    })?;
    println!("{}", js);
    Ok(())
}

#[derive(Serialize, Deserialize)]
struct ArtifactSummary {
    method: String,
    sample_rate: f64,
    original_length: usize,
    retained: usize,
    ratio: f64,
    quality: f64,
    /// base64 of the binary artifact
    bytes: String,
}

fn cmd_compress(
    base: PipelineConfig,
    input: &InputArgs,
    ratio: Option<f64>,
    out: Option<&Path>,
) -> Result<()> {
    let (pipeline, segment) = load_segment(base, input)?;
    let ratio = ratio.unwrap_or(pipeline.config().default_compression_ratio);
    let artifact = pipeline
        .compress_with_ratio(&segment, ratio)
        .context("compressing segment")?;
    let bytes = artifact.to_bytes();
    info!(
        "kept {} of {} samples, quality {:.3}",
        artifact.retained(),
        artifact.original_length,
        artifact.quality
    );
    if let Some(path) = out {
        std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
    }
    let summary = ArtifactSummary {
        method: artifact.method.clone(),
        sample_rate: artifact.sample_rate,
        original_length: artifact.original_length,
        retained: artifact.retained(),
        ratio: artifact.ratio,
        quality: artifact.quality,
        bytes: BASE64.encode(&bytes),
    };
    println!("{}", serde_json::to_string(&summary)?);
    Ok(())
}

fn read_artifact(path: &Path) -> Result<CompressedArtifact> {
    let raw = std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let bytes = if raw.starts_with(b"HECG") {
        raw
    } else {
        let summary: ArtifactSummary = serde_json::from_slice(&raw)
            .with_context(|| format!("{} is neither a binary nor a JSON artifact", path.display()))?;
        BASE64
            .decode(summary.bytes.trim())
            .map_err(|e| anyhow!("artifact bytes are not valid base64: {}", e))?
    };
    Ok(CompressedArtifact::from_bytes(&bytes)?)
}

fn cmd_decompress(path: &Path) -> Result<()> {
    let artifact = read_artifact(path)?;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for v in artifact.decompress() {
        writeln!(out, "{}", v)?;
    }
    out.flush()?;
    Ok(())
}

fn cmd_validate(cfg: &PipelineConfig) -> Result<()> {
    cfg.validate().context("configuration rejected")?;
    println!("{}", serde_json::to_string_pretty(cfg)?);
    Ok(())
}

#[derive(Serialize)]
struct BatchLine {
    sequence: u64,
    start: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

fn cmd_batch(
    base: PipelineConfig,
    input: &InputArgs,
    segment_s: f64,
    workers: usize,
    queue: usize,
    policy: Policy,
) -> Result<()> {
    if !(segment_s.is_finite() && segment_s > 0.0) {
        bail!("--segment-s must be positive, got {}", segment_s);
    }
    let (pipeline, recording) = load_segment(base, input)?;
    let fs = recording.sample_rate;
    let seg_len = ((segment_s * fs).round() as usize).max(1);
    let policy = match policy {
        Policy::Block => OverflowPolicy::Block,
        Policy::DropNewest => OverflowPolicy::DropNewest,
        Policy::DropOldest => OverflowPolicy::DropOldest,
    };

    let starts: Vec<DateTime<Utc>> = (0..recording.samples.len().div_ceil(seg_len))
        .map(|k| {
            let offset_ms = ((k * seg_len) as f64 / fs * 1000.0).round() as i64;
            recording.start_timestamp + Duration::milliseconds(offset_ms)
        })
        .collect();
    let segments = recording
        .samples
        .chunks(seg_len)
        .zip(&starts)
        .map(|(chunk, start)| RawSegment::new(chunk.to_vec(), fs, *start));

    let report = run_batch(Arc::new(pipeline), segments, queue, policy, workers);
    if report.dropped > 0 {
        warn!("{} of {} segments dropped by the feed", report.dropped, starts.len());
    }
    info!(
        "analysed {} segments ({} queued)",
        report.outcomes.len(),
        report.queued
    );
    let outcomes = report.outcomes;
    let stdout = io::stdout();
    let mut out = io::BufWriter::new(stdout.lock());
    for outcome in outcomes {
        let start = starts
            .get(outcome.sequence as usize)
            .copied()
            .unwrap_or(recording.start_timestamp);
        let (result, error) = match outcome.result {
            Ok(result) => (Some(result), None),
            Err(err) => (None, Some(err.to_string())),
        };
        let line = BatchLine {
            sequence: outcome.sequence,
            start,
            result,
            error,
        };
        writeln!(out, "{}", serde_json::to_string(&line)?)?;
    }
    out.flush()?;
    Ok(())
}
