use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use std::{io::Read, path::Path};

/// Which CSV column carries the ECG samples.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnSelector {
    /// Header name, matched case-insensitively.
    Name(String),
    /// Zero-based column position.
    Index(usize),
}

impl ColumnSelector {
    /// Numeric text selects by position, anything else by header name.
    pub fn parse(text: &str) -> Self {
        match text.trim().parse::<usize>() {
            Ok(idx) => ColumnSelector::Index(idx),
            Err(_) => ColumnSelector::Name(text.trim().to_string()),
        }
    }
}

/// Samples read from one CSV column.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvColumn {
    pub samples: Vec<f64>,
    /// Derived from a `timestamp`/`time` column (seconds) when present.
    pub sample_rate: Option<f64>,
}

pub fn read_csv_column(path: &Path, column: &ColumnSelector) -> Result<CsvColumn> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening {}", path.display()))?;
    parse_csv_column(file, column).with_context(|| format!("reading {}", path.display()))
}

/// Parse a headed CSV stream and pull one numeric column out of it.
pub fn parse_csv_column<R: Read>(input: R, column: &ColumnSelector) -> Result<CsvColumn> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .trim(csv::Trim::All)
        .from_reader(input);
    let headers = reader.headers().context("reading header row")?.clone();
    let col = match column {
        ColumnSelector::Name(name) => headers
            .iter()
            .position(|h| h.eq_ignore_ascii_case(name))
            .with_context(|| format!("missing column '{}'", name))?,
        ColumnSelector::Index(idx) if *idx < headers.len() => *idx,
        ColumnSelector::Index(idx) => {
            return Err(anyhow!(
                "column {} requested but only {} columns present",
                idx,
                headers.len()
            ))
        }
    };
    let ts_idx = headers
        .iter()
        .position(|h| h.eq_ignore_ascii_case("timestamp") || h.eq_ignore_ascii_case("time"))
        .filter(|&i| i != col);

    let mut samples = Vec::new();
    let mut first_ts = None;
    let mut last_ts = None;
    for (row, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("reading record {}", row + 1))?;
        let value_str = record
            .get(col)
            .ok_or_else(|| anyhow!("record {} has no column {}", row + 1, col))?;
        let value: f64 = value_str
            .parse()
            .with_context(|| format!("record {}: '{}' is not a number", row + 1, value_str))?;
        samples.push(value);
        if let Some(ts) = ts_idx.and_then(|i| record.get(i)).and_then(|s| s.parse::<f64>().ok()) {
            first_ts.get_or_insert(ts);
            last_ts = Some(ts);
        }
    }
    if samples.is_empty() {
        anyhow::bail!("no numeric samples found");
    }
    let sample_rate = match (first_ts, last_ts) {
        (Some(a), Some(b)) if b > a && samples.len() > 1 => {
            Some((samples.len() - 1) as f64 / (b - a))
        }
        _ => None,
    };
    Ok(CsvColumn {
        samples,
        sample_rate,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "timestamp,MLII,V5\n0.0,0.1,1\n0.004,0.2,2\n0.008,-0.3,3\n0.012,0.4,4\n";

    #[test]
    fn reads_named_column_and_rate() {
        let col =
            parse_csv_column(SAMPLE.as_bytes(), &ColumnSelector::Name("mlii".into())).unwrap();
        assert_eq!(col.samples, vec![0.1, 0.2, -0.3, 0.4]);
        let fs = col.sample_rate.unwrap();
        assert!((fs - 250.0).abs() < 1e-6, "{}", fs);
    }

    #[test]
    fn reads_indexed_column() {
        let col = parse_csv_column(SAMPLE.as_bytes(), &ColumnSelector::parse("2")).unwrap();
        assert_eq!(col.samples, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn no_time_column_means_no_rate() {
        let col = parse_csv_column("ecg\n1\n2\n".as_bytes(), &ColumnSelector::Index(0)).unwrap();
        assert_eq!(col.sample_rate, None);
    }

    #[test]
    fn reports_missing_and_bad_values() {
        assert!(parse_csv_column(SAMPLE.as_bytes(), &ColumnSelector::parse("lead")).is_err());
        assert!(parse_csv_column(SAMPLE.as_bytes(), &ColumnSelector::Index(7)).is_err());
        assert!(parse_csv_column("ecg\n1\nx\n".as_bytes(), &ColumnSelector::Index(0)).is_err());
        assert!(parse_csv_column("ecg\n".as_bytes(), &ColumnSelector::Index(0)).is_err());
    }
}
