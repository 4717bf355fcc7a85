//! Image codec seam and resize planning.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` |
//! | **Decode** | `image::ImageReader` (JPEG, PNG, WebP, GIF) |
//! | **Resize** | `DynamicImage::resize_exact` with `Lanczos3` |
//! | **Encode** | JPEG / PNG / WebP (lossless) / GIF / AVIF (rav1e) |
//!
//! The module is split into:
//! - **Calculations**: the pure width planner (unit testable, no I/O)
//! - **Parameters**: data structures describing a resize
//! - **Formats**: extension ↔ MIME ↔ encoder table
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]

pub mod backend;
mod calculations;
pub mod format;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, ImageBackend};
pub use calculations::{PlannedSize, plan_size, plan_width};
pub use format::{OutputFormat, content_type_for_ext};
pub use params::{Quality, ResizeParams};
pub use rust_backend::RustBackend;
