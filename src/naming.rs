//! Identity codec: variant identity ↔ filenames and public URLs.
//!
//! Every variant is identified by `(base_name, width, source_ext, dest_ext)`.
//! The same tuple shows up in three spellings:
//!
//! - **Cache filename** (internal): `{base}-{width}{source_ext}{dest_ext}`,
//!   e.g. `img/kitten-300.jpg.webp`. Always carries both extensions.
//! - **Public URL**: `{route_prefix}/{base}{sep}{width}{source_ext}[{dest_ext}]`,
//!   e.g. `imagerez/img/kitten-300.jpg`. The destination extension is
//!   dropped when it equals the source extension.
//! - **Inbound request segment**: the public URL without its route prefix.
//!
//! ## Grammar
//!
//! An extension token is a `.` followed by one or more ASCII alphanumerics.
//! The width is the run of digits after the **last** separator whose
//! remainder is exactly `digits` followed by extension tokens. Everything
//! before that separator is the base name, so base names may themselves
//! contain the separator and end in digits:
//!
//! - `photo-2024-300.jpg.jpg` → base `photo-2024`, width 300
//! - `a-1-300.png.webp` → base `a-1`, width 300
//!
//! Base names may contain `/` to address sub-directories, but no segment may
//! be empty, `.` or `..`.

use crate::types::ImageRequest;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("Malformed cache name: {0}")]
    MalformedName(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
}

/// Separator between base name and width in cache filenames. Fixed,
/// independent of the configurable public separator.
pub const CACHE_SIZE_SEPARATOR: &str = "-";

/// Ensure an extension carries exactly one leading dot: `"jpg"` → `".jpg"`.
pub fn normalize_ext(ext: &str) -> String {
    let trimmed = ext.trim().trim_start_matches('.');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(".{}", trimmed)
    }
}

/// Whether a base name is safe to join onto the source and cache roots.
///
/// Segments may not start with `.`: that rules out traversal and hidden
/// files, which the cache never serves or sweeps.
pub fn is_safe_base_name(base: &str) -> bool {
    if base.is_empty() || base.starts_with('/') || base.contains('\\') || base.contains('\0') {
        return false;
    }
    base.split('/')
        .all(|segment| !segment.is_empty() && !segment.starts_with('.'))
}

/// Build the cache filename for a request.
pub fn encode_cache_name(req: &ImageRequest) -> String {
    format!(
        "{}{}{}{}{}",
        req.base_name, CACHE_SIZE_SEPARATOR, req.width, req.source_ext, req.dest_ext
    )
}

/// Parse a cache filename back into its identity.
///
/// Callers scanning the cache directory treat an error as "not one of ours"
/// and skip the file.
pub fn decode_cache_name(name: &str) -> Result<ImageRequest, NamingError> {
    let malformed = || NamingError::MalformedName(name.to_string());
    let parts = split_identity(name, CACHE_SIZE_SEPARATOR).ok_or_else(malformed)?;
    let [source_ext, dest_ext] = parts.extensions.as_slice() else {
        return Err(malformed());
    };
    if !is_safe_base_name(parts.base) {
        return Err(malformed());
    }
    Ok(ImageRequest {
        base_name: parts.base.to_string(),
        width: parts.width,
        source_ext: source_ext.to_string(),
        dest_ext: dest_ext.to_string(),
    })
}

/// Build the externally visible URL path for a variant.
///
/// `dest_ext` is omitted when it equals `source_ext`, and
/// [`decode_request`] mirrors that rule. An empty `route_prefix` yields a
/// path relative to wherever the caller mounts it.
pub fn encode_public_url(
    base_name: &str,
    width: u32,
    source_ext: &str,
    dest_ext: &str,
    route_prefix: &str,
    size_separator: &str,
) -> String {
    let dest = if dest_ext == source_ext {
        ""
    } else {
        dest_ext
    };
    let prefix = route_prefix.trim_end_matches('/');
    let file = format!("{base_name}{size_separator}{width}{source_ext}{dest}");
    if prefix.is_empty() {
        file
    } else {
        format!("{prefix}/{file}")
    }
}

/// Parse an inbound path segment (`base-123.jpg.webp`, `base-123.jpg`, or
/// `base-123`) into a full request.
///
/// - two extension tokens → `(source, destination)`
/// - one token → the destination equals the source (declutter rule)
/// - none → `(default_source_ext, default_dest_ext)`
pub fn decode_request(
    segment: &str,
    size_separator: &str,
    default_source_ext: &str,
    default_dest_ext: &str,
) -> Result<ImageRequest, NamingError> {
    let invalid = || NamingError::InvalidRequest(segment.to_string());
    if size_separator.is_empty() {
        return Err(invalid());
    }
    let parts = split_identity(segment, size_separator).ok_or_else(invalid)?;
    if !is_safe_base_name(parts.base) {
        return Err(invalid());
    }

    let (source_ext, dest_ext) = match parts.extensions.as_slice() {
        [] => (
            normalize_ext(default_source_ext),
            normalize_ext(default_dest_ext),
        ),
        [only] => (only.to_string(), only.to_string()),
        [source, dest] => (source.to_string(), dest.to_string()),
        _ => return Err(invalid()),
    };
    if source_ext.is_empty() || dest_ext.is_empty() {
        return Err(invalid());
    }

    Ok(ImageRequest {
        base_name: parts.base.to_string(),
        width: parts.width,
        source_ext,
        dest_ext,
    })
}

// ---------------------------------------------------------------------------
// Shared grammar
// ---------------------------------------------------------------------------

struct IdentityParts<'a> {
    base: &'a str,
    width: u32,
    extensions: Vec<&'a str>,
}

/// Find the rightmost separator followed by `digits` + at most two extension
/// tokens and split the input there.
fn split_identity<'a>(input: &'a str, separator: &str) -> Option<IdentityParts<'a>> {
    let mut search_end = input.len();
    while let Some(pos) = input[..search_end].rfind(separator) {
        let rest = &input[pos + separator.len()..];
        let digit_len = rest.bytes().take_while(u8::is_ascii_digit).count();
        if digit_len > 0
            && let Some(extensions) = extension_tokens(&rest[digit_len..])
            && let Ok(width) = rest[..digit_len].parse::<u32>()
            && width > 0
            && pos > 0
        {
            return Some(IdentityParts {
                base: &input[..pos],
                width,
                extensions,
            });
        }
        search_end = pos;
    }
    None
}

/// Split `.jpg.webp` into `[".jpg", ".webp"]`. Rejects anything that is not a
/// sequence of at most two `.alnum+` tokens.
fn extension_tokens(tail: &str) -> Option<Vec<&str>> {
    let mut tokens = Vec::new();
    let mut rest = tail;
    while !rest.is_empty() {
        let body = rest.strip_prefix('.')?;
        let len = body.bytes().take_while(u8::is_ascii_alphanumeric).count();
        if len == 0 {
            return None;
        }
        tokens.push(&rest[..len + 1]);
        rest = &body[len..];
    }
    if tokens.len() > 2 {
        return None;
    }
    Some(tokens)
}
