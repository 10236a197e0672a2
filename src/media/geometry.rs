// SPDX-License-Identifier: GPL-3.0-only

//! Image size alignment helpers
//!
//! These mirror the video framework's `bound_align_image` rules: each
//! dimension is rounded to the nearest aligned value and clamped into
//! aligned bounds, then the alignments are raised until their sum reaches
//! the requested combined size alignment.

use super::types::Size;

/// Position of the lowest set bit, 1-based; 0 for 0
pub fn ffs(x: u32) -> u32 {
    if x == 0 { 0 } else { x.trailing_zeros() + 1 }
}

/// Position of the highest set bit, 0-based; 0 for 0
fn fls0(x: u32) -> u32 {
    if x == 0 { 0 } else { 31 - x.leading_zeros() }
}

/// Alignment (log2) implied by a minimum pixel size, e.g. 16 -> 4
pub fn align_of(min_size: u32) -> u32 {
    ffs(min_size).saturating_sub(1)
}

/// Round `x` down to a multiple of `to` (no-op for 0)
pub fn round_down(x: i32, to: u32) -> i32 {
    if to == 0 {
        return x;
    }
    x - x.rem_euclid(to as i32)
}

/// Round `x` up to a multiple of `to`
pub fn align_up(x: u32, to: u32) -> u32 {
    if to == 0 { x } else { x.div_ceil(to) * to }
}

/// Round `x` to the nearest multiple of 2^align, then clamp it to the
/// aligned `min` (rounded up) or `max` (rounded down)
pub fn clamp_align(x: u32, min: u32, max: u32, align: u32) -> u32 {
    let align = align.min(31);
    let low_bits: u64 = (1u64 << align) - 1;
    let mask: u64 = !low_bits;
    let mut v = x as u64;
    if align > 0 {
        v = (v + (1u64 << (align - 1))) & mask;
    }
    if v < min as u64 {
        v = (min as u64 + low_bits) & mask;
    } else if v > max as u64 {
        v = max as u64 & mask;
    }
    v.min(u32::MAX as u64) as u32
}

/// Per-axis bounds for [`bound_align_image`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AxisBounds {
    pub min: u32,
    pub max: u32,
    /// log2 of the required alignment
    pub align: u32,
}

impl AxisBounds {
    pub const fn new(min: u32, max: u32, align: u32) -> Self {
        Self { min, max, align }
    }
}

/// Bound and align an image size
///
/// `size_align` is the log2 alignment the product width*height must satisfy;
/// 0 disables the combined constraint.
pub fn bound_align_image(size: Size, w: AxisBounds, h: AxisBounds, size_align: u32) -> Size {
    let mut width = clamp_align(size.width, w.min, w.max, w.align);
    let mut height = clamp_align(size.height, h.min, h.max, h.align);

    if size_align == 0 {
        return Size::new(width, height);
    }

    let mut walign = width.trailing_zeros().min(32);
    let mut halign = height.trailing_zeros().min(32);
    if walign + halign < size_align {
        let wmaxa = fls0(w.max ^ w.min.wrapping_sub(1));
        let hmaxa = fls0(h.max ^ h.min.wrapping_sub(1));

        // Raise the smaller alignment until the product is aligned enough
        let mut guard = 0;
        while halign + walign < size_align && guard < 64 {
            if halign >= hmaxa || (walign <= halign && walign < wmaxa) {
                width = clamp_align(width, w.min, w.max, walign + 1);
                walign = width.trailing_zeros().min(32);
            } else {
                height = clamp_align(height, h.min, h.max, halign + 1);
                halign = height.trailing_zeros().min(32);
            }
            guard += 1;
        }
    }

    Size::new(width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffs() {
        assert_eq!(ffs(0), 0);
        assert_eq!(ffs(1), 1);
        assert_eq!(ffs(16), 5);
        assert_eq!(align_of(16), 4);
        assert_eq!(align_of(1), 0);
    }

    #[test]
    fn test_clamp_align_rounds_to_nearest() {
        assert_eq!(clamp_align(330, 16, 4096, 4), 336);
        assert_eq!(clamp_align(327, 16, 4096, 4), 320);
        assert_eq!(clamp_align(1, 16, 4096, 4), 16);
        assert_eq!(clamp_align(9000, 16, 4096, 4), 4096);
    }

    #[test]
    fn test_clamp_align_without_alignment() {
        assert_eq!(clamp_align(241, 8, 4096, 0), 241);
        assert_eq!(clamp_align(3, 8, 4096, 0), 8);
    }

    #[test]
    fn test_round_down() {
        assert_eq!(round_down(37, 16), 32);
        assert_eq!(round_down(15, 8), 8);
        assert_eq!(round_down(0, 16), 0);
        assert_eq!(round_down(5, 0), 5);
    }

    #[test]
    fn test_bound_align_image_combined_alignment() {
        // Width odd, height odd: both need raising to reach 2^2 combined
        let size = bound_align_image(
            Size::new(17, 9),
            AxisBounds::new(1, 100, 0),
            AxisBounds::new(1, 100, 0),
            2,
        );
        assert!(size.width.trailing_zeros() + size.height.trailing_zeros() >= 2);
    }

    #[test]
    fn test_bound_align_image_already_aligned() {
        let size = bound_align_image(
            Size::new(320, 240),
            AxisBounds::new(16, 4096, 4),
            AxisBounds::new(8, 4096, 4),
            2,
        );
        assert_eq!(size, Size::new(320, 240));
    }
}
