//! Loaders that turn recordings on disk into raw segments and reference beats.

pub mod csv;
pub mod text;
pub mod wfdb;

pub use self::csv::{read_csv_column, ColumnSelector, CsvColumn};
pub use text::{read_beat_indices, read_samples, read_segment};
pub use wfdb::{load_wfdb_beats, load_wfdb_segment, WfdbAnnotation};
