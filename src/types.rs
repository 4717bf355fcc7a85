//! Shared types used across the cache, pipeline, and markup stages.
//!
//! A variant's identity is the tuple `(base_name, width, source_ext, dest_ext)`.
//! [`ImageRequest`] carries that tuple from the inbound path through the
//! pipeline; [`CacheEntry`] is the same tuple bound to a file on disk.

use crate::imaging::Dimensions;
use std::path::PathBuf;
use std::time::SystemTime;

/// One requested variant of a source image.
///
/// Extensions always carry their leading dot (`.jpg`, not `jpg`). Requests
/// are built by [`naming::decode_request`](crate::naming::decode_request) or
/// [`naming::decode_cache_name`](crate::naming::decode_cache_name), which
/// reject path traversal in `base_name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ImageRequest {
    /// Image identity without size or extension, e.g. `img/kitten`.
    pub base_name: String,
    /// Requested output width in pixels, always > 0.
    pub width: u32,
    /// Extension of the canonical source file, e.g. `.jpg`.
    pub source_ext: String,
    /// Extension of the encoded output, e.g. `.webp`.
    pub dest_ext: String,
}

impl ImageRequest {
    /// The same identity at another width. Used when the planner clamps.
    pub fn with_width(&self, width: u32) -> Self {
        Self {
            width,
            ..self.clone()
        }
    }

    /// Path of the source image relative to the source root.
    pub fn source_file_name(&self) -> String {
        format!("{}{}", self.base_name, self.source_ext)
    }
}

/// The canonical, un-resized asset behind a request.
///
/// `dimensions` stays `None` until a resize decision needs it, so a fresh
/// cache hit never pays for a decode.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceImage {
    pub path: PathBuf,
    pub modified: SystemTime,
    pub dimensions: Option<Dimensions>,
}

/// A resized variant stored in the cache directory.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub path: PathBuf,
    pub request: ImageRequest,
    pub modified: SystemTime,
}

impl CacheEntry {
    pub fn width(&self) -> u32 {
        self.request.width
    }
}
