use assert_cmd::cargo::cargo_bin_cmd;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::Value;
use std::{
    error::Error,
    f64::consts::PI,
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

const FS: f64 = 360.0;
const START: &str = "2024-05-02T09:15:00Z";

/// Beats every `rr` seconds from 0.4 s, with baseline wander, 50 Hz mains and noise.
fn recording(duration: f64, rr: f64, seed: u64) -> (Vec<f64>, Vec<usize>) {
    let mut beats = Vec::new();
    let mut t = 0.4;
    while t < duration - 0.05 {
        beats.push(t);
        t += rr;
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let n = (duration * FS).round() as usize;
    let samples = (0..n)
        .map(|i| {
            let time = i as f64 / FS;
            let mut v = 1.5
                + 0.3 * (2.0 * PI * 0.3 * time).sin()
                + 0.1 * (2.0 * PI * 50.0 * time).sin()
                + rng.gen_range(-0.005..=0.005);
            for &bt in &beats {
                let d = (time - bt) / 0.012;
                if d.abs() < 8.0 {
                    v += (-0.5 * d * d).exp();
                }
            }
            v
        })
        .collect();
    let indices = beats.iter().map(|b| (b * FS).round() as usize).collect();
    (samples, indices)
}

fn write_lines<T: std::fmt::Display>(dir: &Path, name: &str, values: &[T]) -> PathBuf {
    let mut text = String::new();
    for v in values {
        writeln!(text, "{}", v).unwrap();
    }
    let path = dir.join(name);
    fs::write(&path, text).unwrap();
    path
}

fn run_json(args: &[&str]) -> Result<Value, Box<dyn Error>> {
    let mut cmd = cargo_bin_cmd!("holter");
    cmd.args(args);
    let output = cmd.assert().success().get_output().stdout.clone();
    Ok(serde_json::from_slice(&output)?)
}

#[test]
fn analyze_reports_normal_rhythm() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, _) = recording(10.0, 0.8, 1);
    let input = write_lines(dir.path(), "ecg.txt", &samples);

    let result = run_json(&[
        "analyze",
        "--fs",
        "360",
        "--start",
        START,
        "--input",
        input.to_str().expect("utf8 path"),
    ])?;
    assert_eq!(result["rhythm_type"], "normal");
    assert_eq!(result["beat_count"], 12);
    let hr = result["heart_rate"].as_f64().unwrap();
    assert!((hr - 75.0).abs() <= 2.0, "heart rate {}", hr);
    let confidence = result["confidence"].as_f64().unwrap();
    assert!((0.0..=1.0).contains(&confidence));
    assert_eq!(result["analysis_timestamp"], START);
    assert!(result["abnormalities"].as_array().unwrap().is_empty());
    Ok(())
}

#[test]
fn analyze_scores_against_reference_beats() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, beats) = recording(10.0, 0.8, 2);
    let input = write_lines(dir.path(), "ecg.txt", &samples);
    let reference = write_lines(dir.path(), "beats.txt", &beats);

    let report = run_json(&[
        "analyze",
        "--start",
        START,
        "--input",
        input.to_str().unwrap(),
        "--annotations",
        reference.to_str().unwrap(),
    ])?;
    assert_eq!(report["agreement"]["matched"], 12);
    assert_eq!(report["agreement"]["sensitivity"].as_f64(), Some(1.0));
    assert_eq!(report["peaks"].as_array().unwrap().len(), 12);
    assert_eq!(report["rr"].as_array().unwrap().len(), 11);
    assert!(report["hrv"]["rmssd"].as_f64().unwrap() < 0.01);
    Ok(())
}

#[test]
fn analyze_is_repeatable() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, _) = recording(10.0, 0.9, 3);
    let input = write_lines(dir.path(), "ecg.txt", &samples);
    let args = ["analyze", "--start", START, "--input", input.to_str().unwrap()];
    let a = cargo_bin_cmd!("holter").args(args).assert().success().get_output().stdout.clone();
    let b = cargo_bin_cmd!("holter").args(args).assert().success().get_output().stdout.clone();
    assert_eq!(a, b);
    Ok(())
}

#[test]
fn rejects_non_numeric_input() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let input = dir.path().join("bad.txt");
    fs::write(&input, "0.1\nnot-a-number\n")?;
    cargo_bin_cmd!("holter")
        .args(["analyze", "--input", input.to_str().unwrap()])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn compress_then_decompress() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, _) = recording(10.0, 0.8, 4);
    let input = write_lines(dir.path(), "ecg.txt", &samples);
    let artifact = dir.path().join("segment.hecg");

    let summary = run_json(&[
        "compress",
        "--input",
        input.to_str().unwrap(),
        "--ratio",
        "0.1",
        "--out",
        artifact.to_str().unwrap(),
    ])?;
    assert_eq!(summary["retained"], 360);
    assert_eq!(summary["original_length"], 3600);
    let quality = summary["quality"].as_f64().unwrap();
    assert!(quality > 0.5 && quality <= 1.0, "quality {}", quality);
    assert_eq!(&fs::read(&artifact)?[..4], b"HECG");

    let output = cargo_bin_cmd!("holter")
        .args(["decompress", "--artifact", artifact.to_str().unwrap()])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let rebuilt: Vec<f64> = String::from_utf8(output)?
        .lines()
        .map(|l| l.parse::<f64>())
        .collect::<Result<_, _>>()?;
    assert_eq!(rebuilt.len(), samples.len());
    assert_eq!(rebuilt[0], samples[0]);

    // the JSON summary is accepted as an artifact too
    let json_artifact = dir.path().join("segment.json");
    fs::write(&json_artifact, serde_json::to_vec(&summary)?)?;
    cargo_bin_cmd!("holter")
        .args(["decompress", "--artifact", json_artifact.to_str().unwrap()])
        .assert()
        .success();
    Ok(())
}

#[test]
fn compress_rejects_bad_ratio() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, _) = recording(2.0, 0.8, 5);
    let input = write_lines(dir.path(), "ecg.txt", &samples);
    for ratio in ["0", "1.5"] {
        cargo_bin_cmd!("holter")
            .args(["compress", "--input", input.to_str().unwrap(), "--ratio", ratio])
            .assert()
            .failure();
    }
    Ok(())
}

#[test]
fn validate_reads_toml_config() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let config = dir.path().join("holter.toml");
    fs::write(
        &config,
        "notch_freq = 60.0\nmin_hr = 30.0\n\n[abnormality]\nlong_pause_s = 2.5\n",
    )?;
    let cfg = run_json(&["validate", "--config", config.to_str().unwrap()])?;
    assert_eq!(cfg["notch_freq"].as_f64(), Some(60.0));
    assert_eq!(cfg["min_hr"].as_f64(), Some(30.0));
    assert_eq!(cfg["abnormality"]["long_pause_s"].as_f64(), Some(2.5));
    assert_eq!(cfg["lowpass_cutoff"].as_f64(), Some(40.0));

    let bad = dir.path().join("bad.toml");
    fs::write(&bad, "lowpass_cutoff = 500.0\n")?;
    cargo_bin_cmd!("holter")
        .args(["validate", "--config", bad.to_str().unwrap()])
        .assert()
        .failure();
    Ok(())
}

#[test]
fn region_flag_sets_notch() -> Result<(), Box<dyn Error>> {
    let cfg = run_json(&["validate", "--region", "north-america"])?;
    assert_eq!(cfg["notch_freq"].as_f64(), Some(60.0));
    Ok(())
}

#[test]
fn csv_column_with_timestamps() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, _) = recording(10.0, 0.8, 6);
    let mut text = String::from("timestamp,lead_ii\n");
    for (i, v) in samples.iter().enumerate() {
        writeln!(text, "{:.6},{}", i as f64 / FS, v)?;
    }
    let path = dir.path().join("ecg.csv");
    fs::write(&path, text)?;

    let report = run_json(&[
        "analyze",
        "--detailed",
        "--csv",
        path.to_str().unwrap(),
        "--csv-column",
        "lead_ii",
    ])?;
    let fs_found = report["sample_rate"].as_f64().unwrap();
    assert!((fs_found - FS).abs() < 0.1, "sample rate {}", fs_found);
    assert_eq!(report["rhythm_type"], "normal");
    Ok(())
}

#[test]
fn batch_analyses_every_segment() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, _) = recording(30.0, 0.75, 7);
    let input = write_lines(dir.path(), "ecg.txt", &samples);
    let output = cargo_bin_cmd!("holter")
        .args([
            "batch",
            "--input",
            input.to_str().unwrap(),
            "--start",
            START,
            "--segment-s",
            "10",
            "--workers",
            "2",
        ])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines: Vec<Value> = String::from_utf8(output)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 3);
    for (k, line) in lines.iter().enumerate() {
        assert_eq!(line["sequence"], k as u64);
        assert_eq!(line["result"]["rhythm_type"], "normal");
    }
    assert_eq!(lines[1]["start"], "2024-05-02T09:15:10Z");
    Ok(())
}

#[test]
fn batch_with_more_segments_than_the_queue_holds() -> Result<(), Box<dyn Error>> {
    let dir = TempDir::new()?;
    let (samples, _) = recording(30.0, 0.75, 11);
    let input = write_lines(dir.path(), "ecg.txt", &samples);
    let output = cargo_bin_cmd!("holter")
        .args([
            "batch",
            "--input",
            input.to_str().unwrap(),
            "--segment-s",
            "1",
            "--queue",
            "1",
            "--workers",
            "1",
        ])
        .timeout(std::time::Duration::from_secs(60))
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let lines: Vec<Value> = String::from_utf8(output)?
        .lines()
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()?;
    assert_eq!(lines.len(), 30);
    for (k, line) in lines.iter().enumerate() {
        assert_eq!(line["sequence"], k as u64);
    }
    Ok(())
}
