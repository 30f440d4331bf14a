use serde::{Deserialize, Serialize};

/// Beat-by-beat agreement between reference annotations and detections.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BeatAgreement {
    pub matched: usize,
    pub false_positives: usize,
    pub false_negatives: usize,
    /// matched / reference beats; 0 with no reference beats
    pub sensitivity: f64,
    /// matched / detected beats; 0 with no detections
    pub ppv: f64,
}

/// Match each reference beat to at most one detection within
/// `tolerance` samples. Both inputs must be sorted ascending.
pub fn compare_beats(reference: &[usize], detected: &[usize], tolerance: usize) -> BeatAgreement {
    let mut matched = 0;
    let mut j = 0;
    for &r in reference {
        while j < detected.len() && detected[j] + tolerance < r {
            j += 1;
        }
        if j < detected.len() && detected[j].abs_diff(r) <= tolerance {
            matched += 1;
            j += 1;
        }
    }
    let ratio = |num: usize, den: usize| {
        if den == 0 {
            0.0
        } else {
            num as f64 / den as f64
        }
    };
    BeatAgreement {
        matched,
        false_positives: detected.len() - matched,
        false_negatives: reference.len() - matched,
        sensitivity: ratio(matched, reference.len()),
        ppv: ratio(matched, detected.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn perfect_agreement() {
        let beats = [100, 400, 700, 1000];
        let a = compare_beats(&beats, &beats, 0);
        assert_eq!(a.matched, 4);
        assert_eq!(a.false_positives, 0);
        assert_eq!(a.false_negatives, 0);
        assert_eq!(a.sensitivity, 1.0);
        assert_eq!(a.ppv, 1.0);
    }

    #[test]
    fn tolerance_and_misses() {
        let reference = [100, 400, 700, 1000];
        let detected = [3, 104, 398, 1020];
        let a = compare_beats(&reference, &detected, 5);
        assert_eq!(a.matched, 2);
        assert_eq!(a.false_positives, 2);
        assert_eq!(a.false_negatives, 2);
        assert!((a.sensitivity - 0.5).abs() < 1e-12);
        assert!((a.ppv - 0.5).abs() < 1e-12);
    }

    #[test]
    fn one_detection_matches_one_beat() {
        // a single detection between two close annotations counts once
        let a = compare_beats(&[100, 104], &[102], 5);
        assert_eq!(a.matched, 1);
        assert_eq!(a.false_negatives, 1);
        assert_eq!(a.false_positives, 0);
    }

    #[test]
    fn empty_inputs() {
        let a = compare_beats(&[], &[10, 20], 3);
        assert_eq!(a.false_positives, 2);
        assert_eq!(a.sensitivity, 0.0);
        assert_eq!(a.ppv, 0.0);
        assert_eq!(compare_beats(&[], &[], 3), BeatAgreement::default());
    }
}
