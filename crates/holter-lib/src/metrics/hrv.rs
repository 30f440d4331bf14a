use crate::{metrics::stats, signal::RRSeries};
use serde::{Deserialize, Serialize};

/// Time-domain variability of an RR series.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct HRVTime {
    pub n: usize,
    pub avnn: f64,
    pub sdnn: f64,
    pub rmssd: f64,
    pub pnn50: f64,
}

impl HRVTime {
    /// RMSSD relative to the mean interval.
    pub fn normalized_rmssd(&self) -> f64 {
        if self.avnn > 0.0 {
            self.rmssd / self.avnn
        } else {
            0.0
        }
    }
}

/// Successive RR changes larger than this count towards pNN50 (seconds).
const NN50_S: f64 = 0.050;

/// Time-domain HRV of `rr`. SDNN is the sample deviation; RMSSD and pNN50
/// are taken over the n-1 successive differences. Fewer than two intervals
/// leave everything but the mean at zero.
pub fn hrv_time(rr: &RRSeries) -> HRVTime {
    let n = rr.len();
    let avnn = rr.mean();
    if n < 2 {
        return HRVTime {
            n,
            avnn,
            ..HRVTime::default()
        };
    }
    let bessel = n as f64 / (n - 1) as f64;
    let diffs = rr.successive_differences();
    let mean_square = diffs.iter().map(|d| d * d).sum::<f64>() / diffs.len() as f64;
    let nn50 = diffs.iter().filter(|d| d.abs() > NN50_S).count();
    HRVTime {
        n,
        avnn,
        sdnn: (stats::variance(&rr.rr) * bessel).sqrt(),
        rmssd: mean_square.sqrt(),
        pnn50: nn50 as f64 / diffs.len() as f64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_series_has_no_variability() {
        let m = hrv_time(&RRSeries { rr: vec![0.8; 10] });
        assert_eq!(m.n, 10);
        assert!((m.avnn - 0.8).abs() < 1e-12);
        assert!(m.sdnn.abs() < 1e-12);
        assert!(m.rmssd.abs() < 1e-12);
        assert_eq!(m.pnn50, 0.0);
        assert_eq!(m.normalized_rmssd(), 0.0);
    }

    #[test]
    fn alternating_series() {
        let m = hrv_time(&RRSeries {
            rr: vec![0.6, 0.8, 0.6, 0.8, 0.6],
        });
        assert!((m.avnn - 0.68).abs() < 1e-12);
        assert!((m.rmssd - 0.2).abs() < 1e-9);
        assert!((m.pnn50 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn sdnn_is_the_sample_deviation() {
        let m = hrv_time(&RRSeries {
            rr: vec![0.7, 0.8, 0.9, 1.0],
        });
        // squared deviations sum to 0.05 over n-1 = 3
        assert!((m.sdnn - (0.05f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((m.rmssd - 0.1).abs() < 1e-12);
        // every 100 ms step exceeds 50 ms
        assert!((m.pnn50 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn single_interval_keeps_only_the_mean() {
        let m = hrv_time(&RRSeries { rr: vec![0.9] });
        assert_eq!(m.n, 1);
        assert!((m.avnn - 0.9).abs() < 1e-12);
        assert_eq!((m.sdnn, m.rmssd, m.pnn50), (0.0, 0.0, 0.0));
    }

    #[test]
    fn empty_series_is_all_zero() {
        let m = hrv_time(&RRSeries::default());
        assert_eq!(m, HRVTime::default());
    }
}
