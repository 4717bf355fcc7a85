//! # imagerez
//!
//! Serves resized image variants on demand and caches them on disk. A request
//! names a source image, a width and up to two extensions; the first request
//! renders the variant, later ones read it back from the cache until the
//! source changes or the variant goes unread for longer than the TTL.
//!
//! ```text
//! GET /imagerez/img/kitten-300.jpg.webp
//!        │        │        │   │    └─ destination format
//!        │        │        │   └────── source extension (public/img/kitten.jpg)
//!        │        │        └────────── width
//!        │        └─────────────────── base name
//!        └──────────────────────────── route prefix
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`naming`] | Variant identity ↔ cache filenames and public URLs |
//! | [`cache`] | Cache directory I/O: lookup, staleness, alternates, sweeps |
//! | [`imaging`] | Width planner, codec trait and the `image`-crate codec |
//! | [`pipeline`] | One read request end to end, producing an [`ImageOutput`](pipeline::ImageOutput) |
//! | [`picture`] | Responsive `<picture>` markup sharing the URL scheme |
//! | [`config`] | `imagerez.toml` loading, merging and validation |
//! | [`types`] | Shared data model (`ImageRequest`, `SourceImage`, `CacheEntry`) |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## The Filename Is the Index
//!
//! Cached variants carry their full identity in their filename
//! (`kitten-300.jpg.webp`). There is no manifest to corrupt or lock; listing
//! a directory is enough to find every variant of an image, and deleting a
//! file is a complete eviction.
//!
//! ## Touch on Hit
//!
//! A cache hit refreshes the variant's mtime. The TTL sweep then removes
//! variants nobody has asked for recently, which makes it behave like an LRU
//! without any bookkeeping beyond the filesystem.
//!
//! ## No Build Locks
//!
//! Two concurrent requests for the same uncached variant both render it.
//! Writes go through a hidden temp file and an atomic rename, and rendering
//! is deterministic, so the only cost is duplicated work.
//!
//! ## Immutable Configuration
//!
//! [`ResizerConfig`](config::ResizerConfig) is loaded once and moved into the
//! [`Resizer`](pipeline::Resizer). Nothing reads configuration globally.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate (Lanczos3 resampling) and
//! `rav1e` for AVIF. No system libraries are required.

pub mod cache;
pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod picture;
pub mod pipeline;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
