//! Page content scoring
//!
//! Pure functions over plain text; no state and no I/O.

mod content;

pub use content::{count_syllables, ContentAnalyzer, ContentMetrics, Keyword};
