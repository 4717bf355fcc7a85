//! Pure calculation functions for output dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Output size chosen by [`plan_size`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannedSize {
    pub width: u32,
    pub height: u32,
}

/// Decide the size that must actually be rendered for a requested width.
///
/// 1. Without `allow_upscale`, the width is clamped to the source width, or
///    to the width that keeps the height within the source height.
/// 2. With `max_size > 0`, neither axis may exceed it: the width is clamped
///    first, then the height, recomputing the other axis from the aspect
///    ratio each time.
///
/// Both axes are at least 1. A source with a zero dimension has no aspect
/// ratio; it is planned as a square at the (max-clamped) requested width.
///
/// # Examples
/// ```
/// # use imagerez::imaging::plan_size;
/// // 2:1 source, no upscaling: clamped to the source width
/// assert_eq!(plan_size(3000, 1000, 500, false, 0).width, 1000);
///
/// // upscaling allowed, but max_size bounds the result
/// let planned = plan_size(3000, 1000, 500, true, 800);
/// assert_eq!((planned.width, planned.height), (800, 400));
/// ```
pub fn plan_size(
    requested_width: u32,
    source_width: u32,
    source_height: u32,
    allow_upscale: bool,
    max_size: u32,
) -> PlannedSize {
    let requested_width = requested_width.max(1);

    if source_width == 0 || source_height == 0 {
        let width = if max_size > 0 {
            requested_width.min(max_size)
        } else {
            requested_width
        };
        return PlannedSize {
            width,
            height: width,
        };
    }

    let ratio = source_width as f64 / source_height as f64;
    let requested_height = height_for(requested_width, ratio);

    let mut width = requested_width;
    if !allow_upscale && requested_width > source_width {
        width = source_width;
    } else if !allow_upscale && requested_height > source_height {
        // Rounding pushed the height past the source; keep the aspect ratio
        width = width_for(source_height, ratio);
    }
    let mut height = height_for(width, ratio);

    if max_size > 0 {
        if width > max_size {
            width = max_size;
            height = height_for(width, ratio);
        }
        if height > max_size {
            height = max_size;
            width = width_for(height, ratio);
        }
    }

    PlannedSize {
        width: width.max(1),
        height: height.max(1),
    }
}

/// Width component of [`plan_size`].
pub fn plan_width(
    requested_width: u32,
    source_width: u32,
    source_height: u32,
    allow_upscale: bool,
    max_size: u32,
) -> u32 {
    plan_size(
        requested_width,
        source_width,
        source_height,
        allow_upscale,
        max_size,
    )
    .width
}

fn height_for(width: u32, ratio: f64) -> u32 {
    (width as f64 / ratio).round() as u32
}

fn width_for(height: u32, ratio: f64) -> u32 {
    (height as f64 * ratio).round() as u32
}

#[cfg(test)]
mod tests {
    use super::*;

    fn planned(w: u32, h: u32) -> PlannedSize {
        PlannedSize {
            width: w,
            height: h,
        }
    }

    // =========================================================================
    // Upscale prevention
    // =========================================================================

    #[test]
    fn no_upscale_clamps_to_source_width() {
        assert_eq!(plan_width(3000, 1000, 500, false, 0), 1000);
        assert_eq!(plan_size(3000, 1000, 500, false, 0), planned(1000, 500));
    }

    #[test]
    fn no_upscale_smaller_request_untouched() {
        assert_eq!(plan_size(500, 1000, 500, false, 0), planned(500, 250));
    }

    #[test]
    fn no_upscale_exact_source_width() {
        assert_eq!(plan_size(1000, 1000, 500, false, 0), planned(1000, 500));
    }

    #[test]
    fn upscale_allowed_without_max() {
        assert_eq!(plan_size(3000, 1000, 500, true, 0), planned(3000, 1500));
    }

    // =========================================================================
    // max_size
    // =========================================================================

    #[test]
    fn max_size_clamps_landscape_width() {
        assert_eq!(plan_size(3000, 1000, 500, true, 800), planned(800, 400));
    }

    #[test]
    fn max_size_clamps_portrait_height() {
        // 1:2 portrait, 300 wide would be 600 tall
        assert_eq!(plan_size(300, 1000, 2000, false, 400), planned(200, 400));
    }

    #[test]
    fn max_size_square_source() {
        assert_eq!(plan_size(1000, 1000, 1000, true, 800), planned(800, 800));
    }

    #[test]
    fn max_size_not_reached() {
        assert_eq!(plan_size(600, 1000, 500, false, 800), planned(600, 300));
    }

    #[test]
    fn max_size_and_no_upscale_combined() {
        // Source is 1200 wide: no-upscale gives 1200, max_size gives 1000
        assert_eq!(plan_size(5000, 1200, 600, false, 1000), planned(1000, 500));
    }

    // =========================================================================
    // Degenerate inputs
    // =========================================================================

    #[test]
    fn result_is_never_zero() {
        assert_eq!(plan_size(1, 10000, 10, false, 0), planned(1, 1));
        assert_eq!(plan_width(0, 100, 100, false, 0), 1);
    }

    #[test]
    fn zero_source_dimension_treated_as_square() {
        assert_eq!(plan_size(500, 0, 0, false, 0), planned(500, 500));
        assert_eq!(plan_size(500, 0, 100, false, 300), planned(300, 300));
    }
}
