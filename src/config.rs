//! Resizer configuration.
//!
//! Handles loading, validating, and merging `imagerez.toml`. Stock defaults
//! are overridden by the user's file, then extensions are normalized and the
//! result is validated. The loaded [`ResizerConfig`] is an immutable value
//! handed to each component at construction; nothing reads it globally.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! use_cache = true                  # Persist resized variants
//! allow_upscale = false             # Never render wider than the source
//! max_size = 0                      # Max output dimension, 0 = unbounded
//! quality = 90                      # JPEG/AVIF quality (1-100)
//! route_prefix = "imagerez"         # URL "folder" handled by the resizer
//! size_separator = "-"              # Between base name and width in URLs
//! source_root = "public"            # Where source images live
//! cache_root = "writable/resizercache"
//! ttl_secs = 604800                 # Expire variants unused for this long
//! sweep_probability = 0.01          # Chance a read also sweeps the cache
//! cache_control = "public, max-age=2592000"  # "" sends no header
//! default_source_ext = ".jpg"       # For requests without an extension
//! default_dest_ext = ".jpg"
//!
//! [picture]
//! breakpoints = [576, 768, 992, 1200, 1400]
//! dprs = [1.0, 2.0]
//! source_ext = ".jpg"
//! dest_ext = ".jpg"
//! lazy = false
//! auto_sizes = false
//! lowres = "pixel64"                # pixel64 | first | last | <suffix>
//! base_url = ""
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::naming::normalize_ext;
use crate::picture::LowRes;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Default config filename looked up in the working directory.
pub const CONFIG_FILENAME: &str = "imagerez.toml";

/// Resizer configuration loaded from `imagerez.toml`.
///
/// All fields have defaults. User config files need only specify the values
/// they want to override. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResizerConfig {
    /// Persist resized variants. When off, every read re-encodes in memory.
    pub use_cache: bool,
    /// Allow rendering wider than the source image.
    pub allow_upscale: bool,
    /// Maximum output width and height in pixels. 0 disables the bound.
    pub max_size: u32,
    /// Encoding quality for lossy formats (1-100).
    pub quality: u32,
    /// Leading path segment of public URLs. Must match any rewrite rule
    /// routing requests to the resizer.
    pub route_prefix: String,
    /// Token between base name and width in public URLs.
    pub size_separator: String,
    /// Root directory of source images.
    pub source_root: PathBuf,
    /// Root directory of cached variants. Created on demand.
    pub cache_root: PathBuf,
    /// Variants untouched for longer than this are swept. 0 disables expiry.
    pub ttl_secs: u64,
    /// Probability in `[0, 1]` that a read also sweeps expired variants.
    pub sweep_probability: f64,
    /// `Cache-Control` header value passed through verbatim. An empty
    /// string in the file disables the header.
    pub cache_control: Option<String>,
    /// Source extension assumed when a request carries none.
    pub default_source_ext: String,
    /// Destination extension assumed when a request carries none.
    pub default_dest_ext: String,
    /// Defaults for `<picture>` markup.
    pub picture: PictureConfig,
}

impl Default for ResizerConfig {
    fn default() -> Self {
        Self {
            use_cache: true,
            allow_upscale: false,
            max_size: 0,
            quality: 90,
            route_prefix: "imagerez".to_string(),
            size_separator: "-".to_string(),
            source_root: PathBuf::from("public"),
            cache_root: PathBuf::from("writable/resizercache"),
            ttl_secs: 60 * 60 * 24 * 7,
            sweep_probability: 0.01,
            cache_control: Some("public, max-age=2592000".to_string()),
            default_source_ext: ".jpg".to_string(),
            default_dest_ext: ".jpg".to_string(),
            picture: PictureConfig::default(),
        }
    }
}

impl ResizerConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    /// Give every extension field exactly one leading dot.
    pub fn normalize(&mut self) {
        self.default_source_ext = normalize_ext(&self.default_source_ext);
        self.default_dest_ext = normalize_ext(&self.default_dest_ext);
        self.picture.source_ext = normalize_ext(&self.picture.source_ext);
        self.picture.dest_ext = normalize_ext(&self.picture.dest_ext);
        self.picture.breakpoints.sort_unstable_by(|a, b| b.cmp(a));
        self.picture.breakpoints.dedup();
        if self
            .cache_control
            .as_deref()
            .is_some_and(|cc| cc.trim().is_empty())
        {
            self.cache_control = None;
        }
    }

    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConfigError::Validation("quality must be 1-100".into()));
        }
        if !(0.0..=1.0).contains(&self.sweep_probability) {
            return Err(ConfigError::Validation(
                "sweep_probability must be between 0 and 1".into(),
            ));
        }
        let sep = &self.size_separator;
        if sep.is_empty()
            || sep
                .chars()
                .any(|c| c == '/' || c == '.' || c.is_ascii_digit())
        {
            return Err(ConfigError::Validation(
                "size_separator must be non-empty and contain no '/', '.' or digits".into(),
            ));
        }
        for (key, ext) in [
            ("default_source_ext", &self.default_source_ext),
            ("default_dest_ext", &self.default_dest_ext),
            ("picture.source_ext", &self.picture.source_ext),
            ("picture.dest_ext", &self.picture.dest_ext),
        ] {
            if ext.len() < 2 {
                return Err(ConfigError::Validation(format!("{key} must not be empty")));
            }
        }
        self.picture.validate()
    }
}

/// Defaults for the responsive `<picture>` generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PictureConfig {
    /// Breakpoint widths in pixels. Sorted descending on load.
    pub breakpoints: Vec<u32>,
    /// Device pixel ratios offered in every `srcset`.
    pub dprs: Vec<f64>,
    pub source_ext: String,
    pub dest_ext: String,
    /// Emit `data-srcset` / `data-src` for a client-side lazy loader.
    pub lazy: bool,
    /// Add `data-sizes="auto"` to the `<img>` in lazy mode.
    pub auto_sizes: bool,
    /// Fallback `<img src>` policy.
    pub lowres: LowRes,
    /// Prefix prepended to every generated URL, e.g. `https://cdn.example`.
    pub base_url: String,
}

impl Default for PictureConfig {
    fn default() -> Self {
        Self {
            breakpoints: vec![1400, 1200, 992, 768, 576],
            dprs: vec![1.0, 2.0],
            source_ext: ".jpg".to_string(),
            dest_ext: ".jpg".to_string(),
            lazy: false,
            auto_sizes: false,
            lowres: LowRes::Pixel,
            base_url: String::new(),
        }
    }
}

impl PictureConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.breakpoints.is_empty() || self.breakpoints.contains(&0) {
            return Err(ConfigError::Validation(
                "picture.breakpoints must be non-empty and non-zero".into(),
            ));
        }
        if self.dprs.is_empty() || self.dprs.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return Err(ConfigError::Validation(
                "picture.dprs must be non-empty positive numbers".into(),
            ));
        }
        Ok(())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
///
/// This is the canonical representation of all default values, used as the
/// base layer for merging user overrides on top.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(ResizerConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Load a config file as a raw TOML value.
///
/// Returns `Ok(None)` if the file does not exist.
/// Returns `Err` if the file exists but contains invalid TOML.
pub fn load_raw_config(path: &Path) -> Result<Option<toml::Value>, ConfigError> {
    if !path.exists() {
        return Ok(None);
    }
    let content = fs::read_to_string(path)?;
    let value: toml::Value = toml::from_str(&content)?;
    Ok(Some(value))
}

/// Merge an optional overlay onto a base value, then deserialize, normalize
/// and validate.
pub fn resolve_config(
    base: toml::Value,
    overlay: Option<toml::Value>,
) -> Result<ResizerConfig, ConfigError> {
    let merged = match overlay {
        Some(ov) => merge_toml(base, ov),
        None => base,
    };
    let mut config: ResizerConfig = merged.try_into()?;
    config.normalize();
    config.validate()?;
    Ok(config)
}

/// Load config from a TOML file, falling back to stock defaults when the
/// file is absent.
pub fn load_config(path: &Path) -> Result<ResizerConfig, ConfigError> {
    let base = stock_defaults_value()?;
    let overlay = load_raw_config(path)?;
    resolve_config(base, overlay)
}

/// Returns a fully-commented stock `imagerez.toml` with all keys and
/// explanations.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# imagerez configuration
# ======================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys will cause an error.

# Persist resized variants on disk. Turning this off re-encodes every read.
use_cache = true

# Allow rendering wider than the source image. Leave off unless you trust
# every client: a request for a huge width would otherwise be honored.
allow_upscale = false

# Maximum output width and height in pixels. 0 = unbounded.
max_size = 0

# JPEG/AVIF encoding quality (1 = worst, 100 = best).
quality = 90

# URL "folder" handled by the resizer. Must match your rewrite rule.
route_prefix = "imagerez"

# Token between base name and width in URLs (kitten-300.jpg).
size_separator = "-"

# Source images and cached variants.
source_root = "public"
cache_root = "writable/resizercache"

# Variants not read for this many seconds are removed by sweeps.
# 0 disables age-based expiry.
ttl_secs = 604800

# Chance (0-1) that a read also sweeps expired variants.
sweep_probability = 0.01

# Cache-Control header for browsers. Set to "" to send none.
cache_control = "public, max-age=2592000"

# Extensions assumed for requests without any (kitten-300).
default_source_ext = ".jpg"
default_dest_ext = ".jpg"

# ---------------------------------------------------------------------------
# <picture> markup defaults
# ---------------------------------------------------------------------------
[picture]
# Breakpoint widths in pixels.
breakpoints = [1400, 1200, 992, 768, 576]

# Device pixel ratios offered in each srcset.
dprs = [1.0, 2.0]

source_ext = ".jpg"
dest_ext = ".jpg"

# Write data-srcset/data-src for a client-side lazy loader.
lazy = false

# Add data-sizes="auto" to the <img> in lazy mode.
auto_sizes = false

# Fallback <img src>: "pixel64" (transparent pixel), "first" (smallest
# breakpoint), "last" (largest breakpoint), or any other token to point at
# "{image}{token}{dest_ext}".
lowres = "pixel64"

# Prefix for generated URLs, e.g. "https://cdn.example.com".
base_url = ""
"##
}
