//! Image codec trait and shared types.
//!
//! The [`ImageBackend`] trait is the seam between cache decisions and pixel
//! work. It has two operations: identify (read dimensions without a full
//! decode) and resize (decode, resample, encode to bytes). Persisting the
//! bytes is the cache's job, which keeps partial writes out of the codec.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend).

use super::params::ResizeParams;
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

/// Trait for image codecs.
///
/// Implementations must be deterministic: the same source bytes and params
/// produce the same output bytes. Concurrent builds of one variant rely on
/// that to make "last writer wins" harmless.
pub trait ImageBackend: Sync {
    /// Get image dimensions.
    fn identify(&self, path: &Path) -> Result<Dimensions, BackendError>;

    /// Decode `params.source`, resize it, and return the encoded output.
    fn resize(&self, params: &ResizeParams) -> Result<Vec<u8>, BackendError>;
}
