// SPDX-License-Identifier: GPL-3.0-only

//! Shared geometry types for frames, crops and transforms

use serde::{Deserialize, Serialize};

/// Rotation applied by the post-processor, in degrees
///
/// The output rotator swaps the target axes for 90° and 270°. Variants
/// without a rotator in the transform path only accept 0° and 180°.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Rotation {
    /// No rotation
    #[default]
    None,
    /// 90 degrees
    Rotate90,
    /// 180 degrees (flip on both axes)
    Rotate180,
    /// 270 degrees
    Rotate270,
}

impl Rotation {
    /// All rotations in ascending order
    pub const ALL: [Rotation; 4] = [
        Rotation::None,
        Rotation::Rotate90,
        Rotation::Rotate180,
        Rotation::Rotate270,
    ];

    /// Create a rotation from an exact degree value
    ///
    /// Returns `None` for anything other than 0, 90, 180 or 270.
    pub fn from_degrees(degrees: i32) -> Option<Self> {
        match degrees {
            0 => Some(Rotation::None),
            90 => Some(Rotation::Rotate90),
            180 => Some(Rotation::Rotate180),
            270 => Some(Rotation::Rotate270),
            _ => None,
        }
    }

    /// Get the rotation in degrees
    pub fn degrees(&self) -> i32 {
        match self {
            Rotation::None => 0,
            Rotation::Rotate90 => 90,
            Rotation::Rotate180 => 180,
            Rotation::Rotate270 => 270,
        }
    }

    /// Check if rotation swaps width and height
    pub fn swaps_dimensions(&self) -> bool {
        matches!(self, Rotation::Rotate90 | Rotation::Rotate270)
    }
}

impl std::fmt::Display for Rotation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}°", self.degrees())
    }
}

/// Mirror flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Flip {
    /// Mirror around the Y axis
    pub horizontal: bool,
    /// Mirror around the X axis
    pub vertical: bool,
}

/// Width and height in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels covered
    pub fn area(&self) -> u32 {
        self.width * self.height
    }

    /// Axes swapped when the rotation requires it
    pub fn rotated(&self, rotation: Rotation) -> Self {
        if rotation.swaps_dimensions() {
            Self::new(self.height, self.width)
        } else {
            *self
        }
    }

    /// Parse "WxH" (as used on the command line)
    pub fn parse(s: &str) -> Option<Self> {
        let (w, h) = s.trim().split_once(['x', 'X'])?;
        Some(Self::new(w.trim().parse().ok()?, h.trim().parse().ok()?))
    }
}

impl std::fmt::Display for Size {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Crop rectangle
///
/// Offsets are signed so that negative requests can be detected and rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub const fn new(left: i32, top: i32, width: u32, height: u32) -> Self {
        Self {
            left,
            top,
            width,
            height,
        }
    }

    /// Rectangle covering `size` at the origin
    pub fn from_size(size: Size) -> Self {
        Self::new(0, 0, size.width, size.height)
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// True if the rectangle lies entirely inside a `bounds`-sized frame
    pub fn fits_within(&self, bounds: Size) -> bool {
        self.left >= 0
            && self.top >= 0
            && self.left as i64 + self.width as i64 <= bounds.width as i64
            && self.top as i64 + self.height as i64 <= bounds.height as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rotation_from_degrees() {
        assert_eq!(Rotation::from_degrees(90), Some(Rotation::Rotate90));
        assert_eq!(Rotation::from_degrees(45), None);
        assert_eq!(Rotation::from_degrees(-90), None);
        for rot in Rotation::ALL {
            assert_eq!(Rotation::from_degrees(rot.degrees()), Some(rot));
        }
    }

    #[test]
    fn test_size_rotated() {
        let size = Size::new(640, 480);
        assert_eq!(size.rotated(Rotation::Rotate90), Size::new(480, 640));
        assert_eq!(size.rotated(Rotation::Rotate180), size);
    }

    #[test]
    fn test_size_parse() {
        assert_eq!(Size::parse("1280x720"), Some(Size::new(1280, 720)));
        assert_eq!(Size::parse(" 64X64 "), Some(Size::new(64, 64)));
        assert_eq!(Size::parse("64"), None);
        assert_eq!(Size::parse("ax3"), None);
    }

    #[test]
    fn test_rect_fits_within() {
        let bounds = Size::new(320, 240);
        assert!(Rect::new(0, 0, 320, 240).fits_within(bounds));
        assert!(!Rect::new(16, 0, 320, 240).fits_within(bounds));
        assert!(!Rect::new(-1, 0, 16, 16).fits_within(bounds));
    }
}
