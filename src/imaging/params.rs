//! Parameter types for the codec.
//!
//! These structs describe *what* to produce, not *how*. The pipeline fills
//! them in from the planner's output and hands them to an
//! [`ImageBackend`](super::ImageBackend), so tests can swap in a mock codec
//! without touching the decision logic.

use super::format::OutputFormat;
use std::path::PathBuf;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(90)
    }
}

/// A single decode → resize → encode job.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeParams {
    /// Image to read: the original source or a wider cached variant.
    pub source: PathBuf,
    pub width: u32,
    pub height: u32,
    pub format: OutputFormat,
    /// Ignored by lossless encoders.
    pub quality: Quality,
}
