pub mod abnormality;
pub mod agreement;
pub mod peaks;

pub use abnormality::{Abnormality, AbnormalityDetector};
pub use agreement::{compare_beats, BeatAgreement};
pub use peaks::PeakDetector;
