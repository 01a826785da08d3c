//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::{MAX_DIMENSION, ResizeSpec};

/// Calculate output dimensions for a post-composite resize.
///
/// Width and height targets preserve the aspect ratio; percent scales both
/// axes. No axis ever drops below one pixel.
///
/// # Returns
/// * `None` when the image keeps its size
/// * `Some((width, height))` otherwise
///
/// # Examples
/// ```
/// # use photomark::imaging::{ResizeSpec, calculate_resize_dimensions};
/// // 4000x3000 scaled to 800 wide → 800x600
/// assert_eq!(calculate_resize_dimensions((4000, 3000), ResizeSpec::Width(800)), Some((800, 600)));
///
/// // Half size
/// assert_eq!(calculate_resize_dimensions((4000, 3000), ResizeSpec::Percent(50)), Some((2000, 1500)));
/// ```
pub fn calculate_resize_dimensions(original: (u32, u32), resize: ResizeSpec) -> Option<(u32, u32)> {
    let (w, h) = (original.0 as f64, original.1 as f64);
    let at_least_one = |v: f64| (v.round() as u32).max(1);

    let target = match resize {
        ResizeSpec::None => return None,
        ResizeSpec::Width(target) => (target.max(1), at_least_one(h * target as f64 / w)),
        ResizeSpec::Height(target) => (at_least_one(w * target as f64 / h), target.max(1)),
        ResizeSpec::Percent(percent) => {
            let factor = percent as f64 / 100.0;
            (at_least_one(w * factor), at_least_one(h * factor))
        }
    };

    (target != original).then_some(target)
}

/// True when neither side exceeds [`MAX_DIMENSION`].
///
/// Sizes computed above saturate at `u32::MAX` rather than wrap, so an
/// absurd scale factor always fails this check.
pub fn within_max_dimension(size: (u32, u32)) -> bool {
    size.0 <= MAX_DIMENSION && size.1 <= MAX_DIMENSION
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn none_keeps_size() {
        assert_eq!(calculate_resize_dimensions((640, 480), ResizeSpec::None), None);
    }

    #[test]
    fn width_preserves_aspect() {
        assert_eq!(
            calculate_resize_dimensions((4000, 3000), ResizeSpec::Width(1000)),
            Some((1000, 750))
        );
        // Portrait
        assert_eq!(
            calculate_resize_dimensions((3000, 4000), ResizeSpec::Width(600)),
            Some((600, 800))
        );
    }

    #[test]
    fn height_preserves_aspect() {
        assert_eq!(
            calculate_resize_dimensions((1920, 1080), ResizeSpec::Height(540)),
            Some((960, 540))
        );
    }

    #[test]
    fn percent_scales_both_axes() {
        assert_eq!(
            calculate_resize_dimensions((1000, 500), ResizeSpec::Percent(25)),
            Some((250, 125))
        );
        assert_eq!(
            calculate_resize_dimensions((1000, 500), ResizeSpec::Percent(200)),
            Some((2000, 1000))
        );
    }

    #[test]
    fn never_below_one_pixel() {
        assert_eq!(
            calculate_resize_dimensions((1000, 2), ResizeSpec::Width(10)),
            Some((10, 1))
        );
        assert_eq!(
            calculate_resize_dimensions((3, 3), ResizeSpec::Percent(1)),
            Some((1, 1))
        );
    }

    #[test]
    fn huge_percent_saturates_and_fails_the_limit() {
        let size = calculate_resize_dimensions((100, 100), ResizeSpec::Percent(u32::MAX)).unwrap();
        assert_eq!(size, (u32::MAX, u32::MAX));
        assert!(!within_max_dimension(size));
        assert!(within_max_dimension((MAX_DIMENSION, 1)));
        assert!(!within_max_dimension((1, MAX_DIMENSION + 1)));
    }

    #[test]
    fn same_size_is_no_resize() {
        assert_eq!(calculate_resize_dimensions((800, 600), ResizeSpec::Width(800)), None);
        assert_eq!(calculate_resize_dimensions((800, 600), ResizeSpec::Percent(100)), None);
    }
}
