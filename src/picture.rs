//! Responsive `<picture>` markup.
//!
//! Builds a `<picture>` element whose `<source>` children point at resizer
//! URLs, one per breakpoint, with a `srcset` candidate per device pixel
//! ratio. No file is touched: URLs are spelled with
//! [`encode_public_url`](crate::naming::encode_public_url) and resolved by
//! the read pipeline when a browser asks for them.
//!
//! ```text
//! <picture>
//!   <source media="(min-width: 768px)" srcset="/imagerez/kitten-768.jpg, /imagerez/kitten-768.jpg?dpr=2 2x">
//!   <source srcset="/imagerez/kitten-576.jpg, /imagerez/kitten-576.jpg?dpr=2 2x">
//!   <img src="data:image/gif;base64,..." alt="">
//! </picture>
//! ```
//!
//! ## Ordering
//!
//! Browsers take the first `<source>` whose media matches. Breakpoints are
//! emitted widest first and the narrowest has no media condition, so it is
//! the unconditional fallback. Caller-supplied [`AdditionalSource`]s are
//! emitted before all breakpoints and therefore win whenever they match.
//!
//! ## Lazy mode
//!
//! With `lazy` set, `srcset` is written as `data-srcset` for a client-side
//! loader (lazysizes and similar). The `<img>` keeps its placeholder `src`
//! and carries the narrowest breakpoint's real URL in `data-src`.

use crate::config::ResizerConfig;
use crate::imaging::content_type_for_ext;
use crate::naming::{encode_public_url, normalize_ext};
use maud::{Markup, html};
use serde::{Deserialize, Serialize};

/// 1×1 transparent GIF.
pub const PIXEL_DATA_URI: &str =
    "data:image/gif;base64,R0lGODlhAQABAIAAAAAAAP///yH5BAEAAAAALAAAAAABAAEAAAIBRAA7";

/// Policy for the fallback `<img src>`.
///
/// In config files this is a single string: `"pixel64"`, `"first"`,
/// `"last"`, a literal URL (anything containing `/` or `:`), or any other
/// token, which becomes a [`LowRes::Suffix`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum LowRes {
    /// Transparent pixel data URI.
    Pixel,
    /// URL of the narrowest breakpoint.
    First,
    /// URL of the widest breakpoint.
    Last,
    /// Used verbatim.
    Custom(String),
    /// `{image}{token}{dest_ext}`, a hand-made placeholder file.
    Suffix(String),
}

impl From<String> for LowRes {
    fn from(s: String) -> Self {
        match s.as_str() {
            "" | "pixel64" | "pixel" => LowRes::Pixel,
            "first" => LowRes::First,
            "last" => LowRes::Last,
            _ if s.contains('/') || s.contains(':') => LowRes::Custom(s),
            _ => LowRes::Suffix(s),
        }
    }
}

impl From<LowRes> for String {
    fn from(l: LowRes) -> Self {
        match l {
            LowRes::Pixel => "pixel64".to_string(),
            LowRes::First => "first".to_string(),
            LowRes::Last => "last".to_string(),
            LowRes::Custom(s) | LowRes::Suffix(s) => s,
        }
    }
}

/// Extra `<source>` emitted ahead of the breakpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct AdditionalSource {
    /// Media condition, e.g. `(min-width: 600px)`.
    pub media: Option<String>,
    /// Width of the image served for this source.
    pub width: u32,
    /// Overrides [`PictureOptions::dest_ext`].
    pub dest_ext: Option<String>,
}

/// Attributes of the `<picture>` element.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PictureAttrs {
    pub class: Option<String>,
    pub id: Option<String>,
    pub style: Option<String>,
}

/// Attributes of the fallback `<img>`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ImgAttrs {
    /// Always emitted; empty marks the image as decorative.
    pub alt: String,
    pub class: Option<String>,
    pub id: Option<String>,
    pub style: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Everything [`picture`] needs.
#[derive(Debug, Clone, PartialEq)]
pub struct PictureOptions {
    /// Breakpoint widths; any order, duplicates and zeros are ignored.
    pub breakpoints: Vec<u32>,
    pub dprs: Vec<f64>,
    pub source_ext: String,
    pub dest_ext: String,
    pub lazy: bool,
    pub auto_sizes: bool,
    pub lowres: LowRes,
    pub base_url: String,
    pub route_prefix: String,
    pub size_separator: String,
    pub additional_sources: Vec<AdditionalSource>,
    pub picture_attrs: PictureAttrs,
    pub img_attrs: ImgAttrs,
}

impl PictureOptions {
    /// Defaults from the `[picture]` section plus the resizer's URL scheme.
    pub fn from_config(config: &ResizerConfig) -> Self {
        let p = &config.picture;
        Self {
            breakpoints: p.breakpoints.clone(),
            dprs: p.dprs.clone(),
            source_ext: p.source_ext.clone(),
            dest_ext: p.dest_ext.clone(),
            lazy: p.lazy,
            auto_sizes: p.auto_sizes,
            lowres: p.lowres.clone(),
            base_url: p.base_url.clone(),
            route_prefix: config.route_prefix.clone(),
            size_separator: config.size_separator.clone(),
            additional_sources: Vec::new(),
            picture_attrs: PictureAttrs::default(),
            img_attrs: ImgAttrs::default(),
        }
    }

    /// Public URL of `image` at `width`.
    pub fn url(&self, image: &str, width: u32, dest_ext: &str) -> String {
        let path = encode_public_url(
            image,
            width,
            &normalize_ext(&self.source_ext),
            &normalize_ext(dest_ext),
            &self.route_prefix,
            &self.size_separator,
        );
        join_url(&self.base_url, &path)
    }

    /// `srcset` value: the bare URL for 1x, `{url}?dpr={d} {d}x` otherwise.
    pub fn srcset(&self, image: &str, width: u32, dest_ext: &str) -> String {
        let url = self.url(image, width, dest_ext);
        self.dprs
            .iter()
            .map(|&d| {
                if d == 1.0 {
                    url.clone()
                } else {
                    format!("{url}?dpr={d} {d}x")
                }
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Breakpoints widest first, without duplicates or zeros.
    fn sorted_breakpoints(&self) -> Vec<u32> {
        let mut bps: Vec<u32> = self.breakpoints.iter().copied().filter(|&b| b > 0).collect();
        bps.sort_unstable_by(|a, b| b.cmp(a));
        bps.dedup();
        bps
    }

    fn lowres_src(&self, image: &str, breakpoints: &[u32]) -> String {
        match &self.lowres {
            LowRes::Pixel => PIXEL_DATA_URI.to_string(),
            LowRes::First => breakpoints
                .last()
                .map(|&w| self.url(image, w, &self.dest_ext))
                .unwrap_or_else(|| PIXEL_DATA_URI.to_string()),
            LowRes::Last => breakpoints
                .first()
                .map(|&w| self.url(image, w, &self.dest_ext))
                .unwrap_or_else(|| PIXEL_DATA_URI.to_string()),
            LowRes::Custom(src) => src.clone(),
            LowRes::Suffix(token) => {
                let file = format!("{image}{token}{}", normalize_ext(&self.dest_ext));
                if self.base_url.is_empty() {
                    file
                } else {
                    join_url(&self.base_url, &file)
                }
            }
        }
    }
}

fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

/// One `<source>` to render. Exactly one of the srcset fields is set.
struct SourceTag {
    media: Option<String>,
    mime: Option<&'static str>,
    srcset: Option<String>,
    data_srcset: Option<String>,
}

/// Render the `<picture>` element for `image` (a base name such as
/// `img/kitten`).
pub fn picture(image: &str, options: &PictureOptions) -> Markup {
    let breakpoints = options.sorted_breakpoints();
    let smallest = breakpoints.last().copied();
    let lazy = options.lazy;
    let tag = |media: Option<String>, dest: &str, width: u32| {
        let set = options.srcset(image, width, dest);
        let (srcset, data_srcset) = if lazy { (None, Some(set)) } else { (Some(set), None) };
        SourceTag {
            media,
            mime: content_type_for_ext(dest),
            srcset,
            data_srcset,
        }
    };

    let extra = options.additional_sources.iter().map(|s| {
        let dest = s.dest_ext.as_deref().unwrap_or(&options.dest_ext);
        tag(s.media.clone(), dest, s.width)
    });
    let generated = breakpoints.iter().map(|&bp| {
        let media = (Some(bp) != smallest).then(|| format!("(min-width: {bp}px)"));
        tag(media, options.dest_ext.as_str(), bp)
    });
    let sources: Vec<SourceTag> = extra.chain(generated).collect();

    let img_src = options.lowres_src(image, &breakpoints);
    let lazy_smallest = smallest.filter(|_| lazy);
    let img_data_src = lazy_smallest.map(|w| options.url(image, w, &options.dest_ext));
    let img_data_srcset = lazy_smallest.map(|w| options.srcset(image, w, &options.dest_ext));
    let data_sizes = (lazy && options.auto_sizes).then_some("auto");

    let pa = &options.picture_attrs;
    let ia = &options.img_attrs;
    html! {
        picture class=[pa.class.as_deref()] id=[pa.id.as_deref()] style=[pa.style.as_deref()] {
            @for source in sources {
                source media=[source.media] type=[source.mime]
                    srcset=[source.srcset] data-srcset=[source.data_srcset];
            }
            img src=(img_src) alt=(ia.alt)
                class=[ia.class.as_deref()] id=[ia.id.as_deref()] style=[ia.style.as_deref()]
                width=[ia.width] height=[ia.height]
                data-src=[img_data_src] data-srcset=[img_data_srcset] data-sizes=[data_sizes];
        }
    }
}

/// [`picture`] rendered to a string.
pub fn render_picture(image: &str, options: &PictureOptions) -> String {
    picture(image, options).into_string()
}
