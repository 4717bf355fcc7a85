//! Supported output formats and their MIME types.
//!
//! The destination extension of a request selects the encoder and the
//! `Content-Type` of the response. Extensions outside this table are not an
//! error at the response layer: the header is simply omitted. The codec,
//! however, refuses to encode them.

use image::ImageFormat;

/// Formats the codec can write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Gif,
    Avif,
}

impl OutputFormat {
    /// Look up a format by extension, with or without the leading dot.
    /// Matching is case-insensitive.
    pub fn from_ext(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "png" => Some(Self::Png),
            "webp" => Some(Self::WebP),
            "gif" => Some(Self::Gif),
            "avif" => Some(Self::Avif),
            _ => None,
        }
    }

    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Gif => "image/gif",
            Self::Avif => "image/avif",
        }
    }

    pub fn image_format(self) -> ImageFormat {
        match self {
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Png => ImageFormat::Png,
            Self::WebP => ImageFormat::WebP,
            Self::Gif => ImageFormat::Gif,
            Self::Avif => ImageFormat::Avif,
        }
    }

    /// Whether files of this format can be read back as a resize source.
    ///
    /// AVIF is excluded: the `image` crate's `"avif"` feature only enables the
    /// encoder, yet `ImageFormat::reading_enabled()` reports `true` for it.
    pub fn can_decode(self) -> bool {
        self != Self::Avif && self.image_format().reading_enabled()
    }
}

/// `Content-Type` for a destination extension, or `None` when unsupported.
pub fn content_type_for_ext(ext: &str) -> Option<&'static str> {
    OutputFormat::from_ext(ext).map(OutputFormat::mime_type)
}

/// Whether a file with this extension can be decoded by the codec.
pub fn is_decodable_ext(ext: &str) -> bool {
    OutputFormat::from_ext(ext).is_some_and(OutputFormat::can_decode)
}
