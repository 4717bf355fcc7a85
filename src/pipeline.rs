//! Read pipeline: one inbound image request, end to end.
//!
//! ```text
//! parse ─▶ locate source ─▶ maybe sweep ─▶ cache lookup ──hit──▶ touch ─▶ emit
//!                                              │
//!                                             miss (or stale → evict)
//!                                              │
//!                              alternate? ─▶ identify ─▶ plan width
//!                                                            │
//!                                    clamped? re-lookup ─hit─┴─▶ touch ─▶ emit
//!                                                            │
//!                                              resize ─▶ persist ─▶ emit
//! ```
//!
//! A fresh hit never decodes anything. On a miss, the narrowest cached
//! variant at least as wide as the request stands in for the original as
//! the resize input, which is far cheaper to decode than a full-size photo.
//! An alternate that fails to decode is evicted and the original is used.
//!
//! The pipeline returns an [`ImageOutput`] descriptor or a typed
//! [`ReadError`]; turning either into an HTTP response is the caller's job.
//! Cache bookkeeping failures are logged and never fail a read.

use crate::cache::CacheStore;
use crate::config::ResizerConfig;
use crate::imaging::{
    BackendError, Dimensions, ImageBackend, OutputFormat, PlannedSize, Quality, ResizeParams,
    content_type_for_ext, plan_size,
};
use crate::naming::{NamingError, decode_request, encode_public_url};
use crate::types::{CacheEntry, ImageRequest, SourceImage};
use chrono::{DateTime, Utc};
use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum ReadError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Source image not found: {}", .0.display())]
    SourceNotFound(PathBuf),
    #[error("Imaging error: {0}")]
    Imaging(#[from] BackendError),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ReadError {
    /// HTTP status the boundary should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ReadError::InvalidRequest(_) => 400,
            ReadError::SourceNotFound(_) => 404,
            ReadError::Imaging(_) | ReadError::Io(_) => 500,
        }
    }
}

impl From<NamingError> for ReadError {
    fn from(e: NamingError) -> Self {
        ReadError::InvalidRequest(e.to_string())
    }
}

/// Where the image bytes are.
#[derive(Debug, Clone, PartialEq)]
pub enum OutputBody {
    /// Freshly encoded, possibly never written to disk.
    Bytes(Vec<u8>),
    /// A cached variant to stream from disk.
    File(PathBuf),
}

/// Everything the caller needs to answer the request.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageOutput {
    pub body: OutputBody,
    /// `None` when the destination extension has no known MIME type.
    pub content_type: Option<&'static str>,
    /// The *source* image's mtime, not the cache entry's.
    pub last_modified: SystemTime,
    pub content_length: u64,
    pub cache_control: Option<String>,
    /// Width actually served, after DPR and clamping.
    pub width: u32,
}

impl ImageOutput {
    /// Response headers in the order they should be sent.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = Vec::with_capacity(4);
        if let Some(ct) = self.content_type {
            headers.push(("Content-Type", ct.to_string()));
        }
        headers.push(("Content-Length", self.content_length.to_string()));
        headers.push(("Last-Modified", http_date(self.last_modified)));
        if let Some(cc) = &self.cache_control {
            headers.push(("Cache-Control", cc.clone()));
        }
        headers
    }

    /// Load the body into memory.
    pub fn read_bytes(&self) -> io::Result<Vec<u8>> {
        match &self.body {
            OutputBody::Bytes(bytes) => Ok(bytes.clone()),
            OutputBody::File(path) => fs::read(path),
        }
    }

    pub fn is_cached(&self) -> bool {
        matches!(self.body, OutputBody::File(_))
    }
}

/// RFC 7231 IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
pub fn http_date(time: SystemTime) -> String {
    DateTime::<Utc>::from(time)
        .format("%a, %d %b %Y %H:%M:%S GMT")
        .to_string()
}

/// Serves resized variants of images under `config.source_root`.
pub struct Resizer<B: ImageBackend> {
    config: ResizerConfig,
    store: CacheStore,
    backend: B,
}

impl<B: ImageBackend> Resizer<B> {
    pub fn new(config: ResizerConfig, backend: B) -> Self {
        let store = CacheStore::new(config.cache_root.clone());
        Self {
            config,
            store,
            backend,
        }
    }

    pub fn config(&self) -> &ResizerConfig {
        &self.config
    }

    pub fn store(&self) -> &CacheStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Public URL for a variant, using the configured prefix and separator.
    pub fn public_url(&self, base_name: &str, width: u32, source_ext: &str, dest_ext: &str) -> String {
        encode_public_url(
            base_name,
            width,
            source_ext,
            dest_ext,
            &self.config.route_prefix,
            &self.config.size_separator,
        )
    }

    /// Serve a full inbound path such as `/imagerez/kitten-300.jpg?dpr=2`.
    ///
    /// The route prefix is stripped before decoding. A `dpr` query parameter
    /// is used when `dpr` is `None`.
    pub fn read_path(&self, path: &str, dpr: Option<f64>) -> Result<ImageOutput, ReadError> {
        let (path, query) = match path.split_once('?') {
            Some((p, q)) => (p, Some(q)),
            None => (path, None),
        };
        let dpr = match (dpr, query.and_then(query_dpr)) {
            (Some(d), _) => Some(d),
            (None, Some(raw)) => Some(
                raw.parse::<f64>()
                    .map_err(|_| ReadError::InvalidRequest(format!("bad dpr: {raw}")))?,
            ),
            (None, None) => None,
        };

        let path = path.trim_start_matches('/');
        let prefix = self.config.route_prefix.trim_matches('/');
        let segment = if prefix.is_empty() {
            path
        } else {
            path.strip_prefix(prefix)
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| {
                    ReadError::InvalidRequest(format!("path outside /{prefix}/: {path}"))
                })?
        };
        self.read(segment, dpr)
    }

    /// Serve one request segment such as `img/kitten-300.jpg.webp`.
    pub fn read(&self, segment: &str, dpr: Option<f64>) -> Result<ImageOutput, ReadError> {
        let mut req = decode_request(
            segment,
            &self.config.size_separator,
            &self.config.default_source_ext,
            &self.config.default_dest_ext,
        )?;
        if let Some(dpr) = dpr {
            req.width = apply_dpr(req.width, dpr)?;
        }

        let mut source = self.locate_source(&req)?;
        let use_cache = self.config.use_cache;

        if use_cache {
            self.store
                .maybe_opportunistic_sweep(self.config.sweep_probability, self.config.ttl());
            if let Some(out) = self.cached_output(&req, &source) {
                return Ok(out);
            }
        }

        let alternate = if use_cache {
            self.store.find_alternate(
                &req.base_name,
                req.width,
                &req.source_ext,
                &req.dest_ext,
                &source,
            )
        } else {
            None
        };
        let (alternate, dims) = match alternate {
            Some(alt) => match self.backend.identify(&alt.path) {
                Ok(dims) => (Some(alt), dims),
                Err(e) => {
                    self.discard_alternate(&alt, &e);
                    (None, self.identify_source(&mut source)?)
                }
            },
            None => (None, self.identify_source(&mut source)?),
        };

        let planned = plan_size(
            req.width,
            dims.width,
            dims.height,
            self.config.allow_upscale,
            self.config.max_size,
        );
        if planned.width != req.width {
            debug!(
                requested = req.width,
                planned = planned.width,
                "width clamped"
            );
            req = req.with_width(planned.width);
            if use_cache && let Some(out) = self.cached_output(&req, &source) {
                return Ok(out);
            }
        }

        let bytes = self.render(&req, planned, alternate.as_ref(), &source)?;
        if use_cache {
            // A failed write only costs a re-render next time.
            if let Err(e) = self.store.persist(&req, &bytes) {
                warn!(request = segment, error = %e, "failed to cache variant");
            }
        }

        Ok(ImageOutput {
            content_length: bytes.len() as u64,
            body: OutputBody::Bytes(bytes),
            content_type: content_type_for_ext(&req.dest_ext),
            last_modified: source.modified,
            cache_control: self.config.cache_control.clone(),
            width: req.width,
        })
    }

    /// Delete expired variants, or all of them with `force_all`.
    pub fn sweep(&self, force_all: bool) -> Vec<PathBuf> {
        self.store.sweep(force_all, self.config.ttl())
    }

    /// Delete every variant whose name contains `pattern`, ignoring case.
    pub fn clear_for_image(&self, pattern: &str) -> Vec<PathBuf> {
        self.store.clear_for_image(pattern)
    }

    fn locate_source(&self, req: &ImageRequest) -> Result<SourceImage, ReadError> {
        let path = self.config.source_root.join(req.source_file_name());
        match fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(SourceImage {
                modified: meta.modified()?,
                path,
                dimensions: None,
            }),
            Ok(_) => Err(ReadError::SourceNotFound(path)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(ReadError::SourceNotFound(path)),
            Err(e) => Err(e.into()),
        }
    }

    /// Exact cache hit that is not older than the source. Stale entries are
    /// evicted on the way.
    fn fresh_entry(&self, req: &ImageRequest, source: &SourceImage) -> Option<CacheEntry> {
        let entry = self.store.lookup(req)?;
        if CacheStore::is_stale(&entry, source) {
            debug!(path = %entry.path.display(), "cache entry is stale");
            let _ = self.store.evict(&entry);
            return None;
        }
        Some(entry)
    }

    /// Serve a fresh exact hit, if there is one.
    fn cached_output(&self, req: &ImageRequest, source: &SourceImage) -> Option<ImageOutput> {
        let entry = self.fresh_entry(req, source)?;
        self.emit_cached(entry, source)
    }

    /// `None` when the entry can no longer be read, e.g. a concurrent sweep
    /// deleted it after lookup. The caller renders the variant instead.
    fn emit_cached(&self, entry: CacheEntry, source: &SourceImage) -> Option<ImageOutput> {
        let content_length = match fs::metadata(&entry.path) {
            Ok(meta) => meta.len(),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %entry.path.display(), "cache entry vanished");
                return None;
            }
            Err(e) => {
                warn!(path = %entry.path.display(), error = %e, "unreadable cache entry");
                return None;
            }
        };
        if let Err(e) = self.store.touch(&entry) {
            warn!(path = %entry.path.display(), error = %e, "failed to touch cache entry");
        }
        debug!(path = %entry.path.display(), "cache hit");
        Some(ImageOutput {
            content_type: content_type_for_ext(&entry.request.dest_ext),
            last_modified: source.modified,
            content_length,
            cache_control: self.config.cache_control.clone(),
            width: entry.width(),
            body: OutputBody::File(entry.path),
        })
    }

    fn identify_source(&self, source: &mut SourceImage) -> Result<Dimensions, ReadError> {
        let dims = self.backend.identify(&source.path)?;
        source.dimensions = Some(dims);
        Ok(dims)
    }

    /// Evict an alternate the codec could not read so later requests stop
    /// picking it.
    fn discard_alternate(&self, alternate: &CacheEntry, error: &BackendError) {
        warn!(
            alternate = %alternate.path.display(),
            error = %error,
            "alternate unusable, using original"
        );
        let _ = self.store.evict(alternate);
    }

    /// Resize from the alternate when there is one, falling back to the
    /// original when the alternate disappeared or failed to decode.
    fn render(
        &self,
        req: &ImageRequest,
        planned: PlannedSize,
        alternate: Option<&CacheEntry>,
        source: &SourceImage,
    ) -> Result<Vec<u8>, ReadError> {
        let format = OutputFormat::from_ext(&req.dest_ext).ok_or_else(|| {
            BackendError::UnsupportedFormat(format!("cannot encode {}", req.dest_ext))
        })?;
        let mut params = ResizeParams {
            source: alternate.map_or_else(|| source.path.clone(), |alt| alt.path.clone()),
            width: planned.width,
            height: planned.height,
            format,
            quality: Quality::new(self.config.quality),
        };

        debug!(
            source = %params.source.display(),
            width = params.width,
            height = params.height,
            ?format,
            "resizing"
        );
        match (self.backend.resize(&params), alternate) {
            (Ok(bytes), _) => Ok(bytes),
            (Err(e), Some(alt)) => {
                self.discard_alternate(alt, &e);
                params.source = source.path.clone();
                Ok(self.backend.resize(&params)?)
            }
            (Err(e), None) => Err(e.into()),
        }
    }
}

/// `floor(width * dpr)`, at least 1.
fn apply_dpr(width: u32, dpr: f64) -> Result<u32, ReadError> {
    if !dpr.is_finite() || dpr <= 0.0 {
        return Err(ReadError::InvalidRequest(format!("bad dpr: {dpr}")));
    }
    let scaled = (width as f64 * dpr).floor();
    Ok(scaled.clamp(1.0, u32::MAX as f64) as u32)
}

fn query_dpr(query: &str) -> Option<&str> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .find(|(k, _)| *k == "dpr")
        .map(|(_, v)| v)
}
