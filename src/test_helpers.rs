//! Shared test utilities for the imagerez test suite.
//!
//! Provides a source/cache directory fixture, synthetic image writers, and
//! mtime helpers for exercising staleness and TTL logic without sleeping.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let fx = Fixture::new();
//! let source = fx.add_source("kitten.jpg", 800, 600);
//! set_mtime_ago(&source, 3600);
//! ```

use crate::config::ResizerConfig;
use filetime::FileTime;
use image::ImageEncoder;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Temp directory holding a `public/` source root and a `cache/` root.
pub struct Fixture {
    pub tmp: TempDir,
}

impl Fixture {
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        std::fs::create_dir_all(tmp.path().join("public")).unwrap();
        Self { tmp }
    }

    pub fn source_root(&self) -> PathBuf {
        self.tmp.path().join("public")
    }

    pub fn cache_root(&self) -> PathBuf {
        self.tmp.path().join("cache")
    }

    /// Default config pointed at this fixture, with opportunistic sweeps off.
    pub fn config(&self) -> ResizerConfig {
        ResizerConfig {
            source_root: self.source_root(),
            cache_root: self.cache_root(),
            sweep_probability: 0.0,
            ..ResizerConfig::default()
        }
    }

    /// Write a real JPEG under the source root, creating parent directories.
    pub fn add_source(&self, rel: &str, width: u32, height: u32) -> PathBuf {
        let path = self.source_root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        create_test_jpeg(&path, width, height);
        path
    }

    /// Write arbitrary bytes under the cache root, as a pre-existing variant.
    pub fn add_cached(&self, rel: &str, bytes: &[u8]) -> PathBuf {
        let path = self.cache_root().join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, bytes).unwrap();
        path
    }
}

// =========================================================================
// Synthetic images
// =========================================================================

/// Create a gradient JPEG with the given dimensions.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = image::RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    });
    let file = std::fs::File::create(path).unwrap();
    let writer = std::io::BufWriter::new(file);
    let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(writer, 90);
    encoder
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
}

// =========================================================================
// Modification times
// =========================================================================

/// Set a file's mtime to `secs` seconds in the past.
pub fn set_mtime_ago(path: &Path, secs: u64) {
    let when = SystemTime::now() - Duration::from_secs(secs);
    filetime::set_file_mtime(path, FileTime::from_system_time(when)).unwrap();
}

pub fn mtime(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}
