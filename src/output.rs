//! CLI output formatting.
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.
//!
//! # Output Format
//!
//! ## Read
//!
//! ```text
//! kitten-300.jpg → rendered 300px
//!     Content-Type: image/jpeg
//!     Content-Length: 14112
//!     Last-Modified: Sun, 06 Nov 1994 08:49:37 GMT
//!     Cache-Control: public, max-age=2592000
//! ```
//!
//! ## Sweep / Clear
//!
//! ```text
//! Deleted 2 files
//!     kitten-300.jpg.jpg
//!     img/puppy-800.jpg.webp
//! ```
//!
//! With `--json` the deleted paths are printed as a JSON array instead.

use crate::pipeline::ImageOutput;
use std::path::{Path, PathBuf};

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

// ============================================================================
// Read
// ============================================================================

/// Summary of a served read: how it was produced, then its headers.
pub fn format_read_output(request: &str, output: &ImageOutput) -> Vec<String> {
    let origin = if output.is_cached() {
        "cached"
    } else {
        "rendered"
    };
    let mut lines = vec![format!("{request} → {origin} {}px", output.width)];
    lines.extend(
        output
            .headers()
            .into_iter()
            .map(|(name, value)| format!("{}{name}: {value}", indent(1))),
    );
    lines
}

pub fn print_read_output(request: &str, output: &ImageOutput) {
    for line in format_read_output(request, output) {
        println!("{}", line);
    }
}

// ============================================================================
// Sweep / clear
// ============================================================================

/// Deleted paths, shown relative to the cache root.
pub fn format_deleted(paths: &[PathBuf], cache_root: &Path) -> Vec<String> {
    let mut lines = vec![format!("Deleted {}", plural(paths.len(), "file"))];
    lines.extend(paths.iter().map(|p| {
        let rel = p.strip_prefix(cache_root).unwrap_or(p);
        format!("{}{}", indent(1), rel.display())
    }));
    lines
}

/// Deleted paths as a JSON array of strings.
pub fn format_deleted_json(paths: &[PathBuf]) -> Result<String, serde_json::Error> {
    let strings: Vec<String> = paths
        .iter()
        .map(|p| p.to_string_lossy().into_owned())
        .collect();
    serde_json::to_string_pretty(&strings)
}

pub fn print_deleted(paths: &[PathBuf], cache_root: &Path, json: bool) -> Result<(), serde_json::Error> {
    if json {
        println!("{}", format_deleted_json(paths)?);
    } else {
        for line in format_deleted(paths, cache_root) {
            println!("{}", line);
        }
    }
    Ok(())
}

/// Reminder that `clear` matches substrings, printed before deleting.
pub fn format_clear_warning(pattern: &str) -> String {
    format!(
        "Warning: \"{pattern}\" is matched as a case-insensitive substring; \
         every cached file containing it is deleted"
    )
}
