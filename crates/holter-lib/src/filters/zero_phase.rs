//! Forward-backward (zero-phase) application of a cascade of biquad sections.
//!
//! Each pass runs transposed direct form II sections over an odd-reflected
//! extension of the input, with the section state primed to the steady-state
//! response to the first sample. As in the classic `filtfilt` this keeps
//! constant inputs free of start-up transients. The reflection is taken about
//! the mean of the samples nearest each edge rather than the single endpoint,
//! so one noisy endpoint does not set the local baseline.

use biquad::Coefficients;

/// Reflection length used at each end of the signal.
pub fn pad_len(sections: usize, len: usize) -> usize {
    (3 * (2 * sections + 1)).min(len.saturating_sub(1))
}

/// Apply `sections` forward then backward. Output has the input's length.
pub fn filtfilt(sections: &[Coefficients<f64>], data: &[f64]) -> Vec<f64> {
    if data.is_empty() || sections.is_empty() {
        return data.to_vec();
    }
    let n = data.len();
    let pad = pad_len(sections.len(), n);
    let zi = steady_state(sections);

    let mut ext = odd_extend(data, pad);
    run_cascade(sections, &zi, &mut ext);
    ext.reverse();
    run_cascade(sections, &zi, &mut ext);
    ext.reverse();

    ext[pad..pad + n].to_vec()
}

/// Reflect `pad` samples at each end about the mean of the `pad + 1` edge samples.
fn odd_extend(data: &[f64], pad: usize) -> Vec<f64> {
    let n = data.len();
    let mut out = Vec::with_capacity(n + 2 * pad);
    let window = (pad + 1).min(n);
    let first = edge_mean(&data[..window]);
    let last = edge_mean(&data[n - window..]);
    for i in (1..=pad).rev() {
        out.push(2.0 * first - data[i]);
    }
    out.extend_from_slice(data);
    for i in 1..=pad {
        out.push(2.0 * last - data[n - 1 - i]);
    }
    out
}

fn edge_mean(edge: &[f64]) -> f64 {
    edge.iter().sum::<f64>() / edge.len() as f64
}

/// Per-section state `[s1, s2]` for a unit constant input to the cascade.
fn steady_state(sections: &[Coefficients<f64>]) -> Vec<[f64; 2]> {
    let mut zi = Vec::with_capacity(sections.len());
    let mut input_gain = 1.0;
    for c in sections {
        let denom = 1.0 + c.a1 + c.a2;
        let gain = if denom.abs() > f64::EPSILON {
            (c.b0 + c.b1 + c.b2) / denom
        } else {
            0.0
        };
        zi.push([
            input_gain * (gain - c.b0),
            input_gain * (c.b2 - c.a2 * gain),
        ]);
        input_gain *= gain;
    }
    zi
}

fn run_cascade(sections: &[Coefficients<f64>], zi: &[[f64; 2]], data: &mut [f64]) {
    let Some(&x0) = data.first() else {
        return;
    };
    for (c, z) in sections.iter().zip(zi) {
        let mut s1 = z[0] * x0;
        let mut s2 = z[1] * x0;
        for sample in data.iter_mut() {
            let x = *sample;
            let y = c.b0 * x + s1;
            s1 = c.b1 * x - c.a1 * y + s2;
            s2 = c.b2 * x - c.a2 * y;
            *sample = y;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use biquad::{ToHertz, Type, Q_BUTTERWORTH_F64};

    fn lowpass() -> Vec<Coefficients<f64>> {
        vec![Coefficients::<f64>::from_params(
            Type::LowPass,
            360.0_f64.hz(),
            40.0_f64.hz(),
            Q_BUTTERWORTH_F64,
        )
        .unwrap()]
    }

    #[test]
    fn preserves_length() {
        let sections = lowpass();
        for n in [1usize, 2, 3, 7, 50] {
            let data: Vec<f64> = (0..n).map(|i| (i as f64).sin()).collect();
            assert_eq!(filtfilt(&sections, &data).len(), n);
        }
    }

    #[test]
    fn constant_input_has_no_transient() {
        let sections = lowpass();
        let data = vec![3.0; 200];
        let out = filtfilt(&sections, &data);
        for v in out {
            assert!((v - 3.0).abs() < 1e-9, "got {}", v);
        }
    }

    #[test]
    fn odd_extension_reflects_about_edge_means() {
        let ext = odd_extend(&[1.0, 2.0, 3.0, 10.0, 5.0, 6.0], 1);
        assert_eq!(ext, vec![1.0, 1.0, 2.0, 3.0, 10.0, 5.0, 6.0, 6.0]);
        let ext = odd_extend(&[1.0, 2.0, 4.0], 2);
        let m = 7.0 / 3.0;
        assert_eq!(ext.len(), 7);
        assert_eq!(ext[0], 2.0 * m - 4.0);
        assert_eq!(ext[6], 2.0 * m - 1.0);
    }

    #[test]
    fn noisy_endpoint_does_not_lift_the_tail() {
        let sections = vec![
            Coefficients::<f64>::from_params(
                Type::HighPass,
                360.0_f64.hz(),
                0.5_f64.hz(),
                Q_BUTTERWORTH_F64,
            )
            .unwrap(),
        ];
        let mut data = vec![0.0; 1000];
        data[999] = 1.0;
        let out = filtfilt(&sections, &data);
        // the spike itself stays, the samples before it stay near zero
        assert!(out[999] > 0.5, "{}", out[999]);
        assert!(out[900..990].iter().all(|x| x.abs() < 0.25), "{:?}", &out[980..990]);
    }
}
