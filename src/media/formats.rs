// SPDX-License-Identifier: GPL-3.0-only

//! Pixel format table
//!
//! Static registry of the formats the post-processor understands, with the
//! per-plane bit depth, the plane layout and whether a format is usable for
//! memory-to-memory transforms, as a camera bus format, or both.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Four-character pixel format code, stored little-endian like V4L2 does
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FourCc(pub u32);

impl FourCc {
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(
            (code[0] as u32)
                | ((code[1] as u32) << 8)
                | ((code[2] as u32) << 16)
                | ((code[3] as u32) << 24),
        )
    }

    /// Parse a 4-character string such as "YUYV"
    pub fn parse(s: &str) -> Option<Self> {
        let bytes: [u8; 4] = s.as_bytes().try_into().ok()?;
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            Some(Self::new(&bytes))
        } else {
            None
        }
    }

    pub fn to_bytes(&self) -> [u8; 4] {
        self.0.to_le_bytes()
    }
}

impl fmt::Display for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = self.to_bytes();
        if bytes.iter().all(|b| b.is_ascii_graphic() || *b == b' ') {
            let s: String = bytes.iter().map(|&b| b as char).collect();
            write!(f, "{}", s)
        } else {
            write!(f, "0x{:08x}", self.0)
        }
    }
}

impl fmt::Debug for FourCc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FourCc({})", self)
    }
}

/// V4L2 fourcc codes of the supported formats
pub mod fourcc {
    use super::FourCc;

    pub const RGB565X: FourCc = FourCc::new(b"RGBR");
    pub const BGR666: FourCc = FourCc::new(b"BGRH");
    pub const RGB32: FourCc = FourCc::new(b"RGB4");
    pub const YUYV: FourCc = FourCc::new(b"YUYV");
    pub const UYVY: FourCc = FourCc::new(b"UYVY");
    pub const VYUY: FourCc = FourCc::new(b"VYUY");
    pub const YVYU: FourCc = FourCc::new(b"YVYU");
    pub const YUV422P: FourCc = FourCc::new(b"422P");
    pub const YUV420: FourCc = FourCc::new(b"YU12");
    pub const YUV420M: FourCc = FourCc::new(b"YM12");
}

/// Media bus codes of the camera-capable formats
pub mod mbus {
    pub const UYVY8_2X8: u32 = 0x2006;
    pub const VYUY8_2X8: u32 = 0x2007;
    pub const YUYV8_2X8: u32 = 0x2008;
    pub const YVYU8_2X8: u32 = 0x2009;
}

/// Colour encoding understood by the hardware
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ColorFormat {
    Rgb565,
    Rgb666,
    Rgb888,
    /// YUV 4:2:2 one plane, Y Cb Y Cr order
    YCbYCr422,
    /// YUV 4:2:2 one plane, Cb Y Cr Y order
    CbYCrY422,
    /// YUV 4:2:2 one plane, Cr Y Cb Y order
    CrYCbY422,
    /// YUV 4:2:2 one plane, Y Cr Y Cb order
    YCrYCb422,
    YCbCr420,
}

impl ColorFormat {
    pub fn is_rgb(&self) -> bool {
        matches!(self, Self::Rgb565 | Self::Rgb666 | Self::Rgb888)
    }

    pub fn is_yuv420(&self) -> bool {
        matches!(self, Self::YCbCr420)
    }
}

bitflags! {
    /// Capabilities of a pixel format
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct FormatFlags: u32 {
        /// Usable as source or destination of a memory-to-memory transform
        const M2M = 1 << 0;
        /// Usable as a live camera bus format
        const CAM = 1 << 1;
    }
}

/// A supported pixel format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelFormat {
    /// Human readable name
    pub name: &'static str,
    pub fourcc: FourCc,
    /// Bits per pixel of each colour plane; unused entries are 0
    pub depth: [u32; 3],
    pub color: ColorFormat,
    /// Number of separate memory buffers
    pub memplanes: usize,
    /// Number of logical colour components (may share one memory plane)
    pub colplanes: usize,
    /// Media bus code when the format can come straight off a sensor
    pub mbus_code: Option<u32>,
    pub flags: FormatFlags,
}

impl PixelFormat {
    /// Sum of the bit depth over all colour planes
    pub fn total_depth(&self) -> u32 {
        self.depth.iter().take(self.colplanes).sum()
    }

    /// Packed formats keep every component in a single plane
    pub fn is_packed(&self) -> bool {
        self.colplanes == 1
    }

    /// Formats stored in hardware tiles; none on this SoC
    pub fn is_tiled(&self) -> bool {
        false
    }
}

/// Default format assigned to both frames of a freshly opened context
pub fn default_format() -> &'static PixelFormat {
    &FORMATS[0]
}

/// The format table, in enumeration order
pub static FORMATS: [PixelFormat; 10] = [
    PixelFormat {
        name: "RGB565",
        fourcc: fourcc::RGB565X,
        depth: [16, 0, 0],
        color: ColorFormat::Rgb565,
        memplanes: 1,
        colplanes: 1,
        mbus_code: None,
        flags: FormatFlags::M2M,
    },
    PixelFormat {
        name: "BGR666",
        fourcc: fourcc::BGR666,
        depth: [32, 0, 0],
        color: ColorFormat::Rgb666,
        memplanes: 1,
        colplanes: 1,
        mbus_code: None,
        flags: FormatFlags::M2M,
    },
    PixelFormat {
        name: "XRGB-8-8-8-8, 32 bpp",
        fourcc: fourcc::RGB32,
        depth: [32, 0, 0],
        color: ColorFormat::Rgb888,
        memplanes: 1,
        colplanes: 1,
        mbus_code: None,
        flags: FormatFlags::M2M,
    },
    PixelFormat {
        name: "YUV 4:2:2 packed, YCbYCr",
        fourcc: fourcc::YUYV,
        depth: [16, 0, 0],
        color: ColorFormat::YCbYCr422,
        memplanes: 1,
        colplanes: 1,
        mbus_code: Some(mbus::YUYV8_2X8),
        flags: FormatFlags::M2M.union(FormatFlags::CAM),
    },
    PixelFormat {
        name: "YUV 4:2:2 packed, CbYCrY",
        fourcc: fourcc::UYVY,
        depth: [16, 0, 0],
        color: ColorFormat::CbYCrY422,
        memplanes: 1,
        colplanes: 1,
        mbus_code: Some(mbus::UYVY8_2X8),
        flags: FormatFlags::M2M.union(FormatFlags::CAM),
    },
    PixelFormat {
        name: "YUV 4:2:2 packed, CrYCbY",
        fourcc: fourcc::VYUY,
        depth: [16, 0, 0],
        color: ColorFormat::CrYCbY422,
        memplanes: 1,
        colplanes: 1,
        mbus_code: Some(mbus::VYUY8_2X8),
        flags: FormatFlags::M2M.union(FormatFlags::CAM),
    },
    PixelFormat {
        name: "YUV 4:2:2 packed, YCrYCb",
        fourcc: fourcc::YVYU,
        depth: [16, 0, 0],
        color: ColorFormat::YCrYCb422,
        memplanes: 1,
        colplanes: 1,
        mbus_code: Some(mbus::YVYU8_2X8),
        flags: FormatFlags::M2M.union(FormatFlags::CAM),
    },
    PixelFormat {
        name: "YUV 4:2:2 planar, Y/Cb/Cr",
        fourcc: fourcc::YUV422P,
        depth: [12, 0, 0],
        color: ColorFormat::YCbYCr422,
        memplanes: 1,
        colplanes: 3,
        mbus_code: None,
        flags: FormatFlags::M2M,
    },
    PixelFormat {
        name: "YUV 4:2:0 planar, YCbCr",
        fourcc: fourcc::YUV420,
        depth: [12, 0, 0],
        color: ColorFormat::YCbCr420,
        memplanes: 1,
        colplanes: 3,
        mbus_code: None,
        flags: FormatFlags::M2M,
    },
    PixelFormat {
        name: "YUV 4:2:0 non-contiguous 3-planar, Y/Cb/Cr",
        fourcc: fourcc::YUV420M,
        depth: [8, 2, 2],
        color: ColorFormat::YCbCr420,
        memplanes: 3,
        colplanes: 3,
        mbus_code: None,
        flags: FormatFlags::M2M,
    },
];

/// Look up a format by fourcc, restricted to formats having any of `mask`
pub fn find_format(code: FourCc, mask: FormatFlags) -> Option<&'static PixelFormat> {
    FORMATS
        .iter()
        .find(|fmt| fmt.fourcc == code && fmt.flags.intersects(mask))
}

/// Look up a format by media bus code, restricted to formats having any of `mask`
pub fn find_mbus_format(code: u32, mask: FormatFlags) -> Option<&'static PixelFormat> {
    FORMATS
        .iter()
        .find(|fmt| fmt.mbus_code == Some(code) && fmt.flags.intersects(mask))
}

/// Format at enumeration position `index`
pub fn format_by_index(index: usize) -> Option<&'static PixelFormat> {
    FORMATS.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_roundtrip_display() {
        assert_eq!(fourcc::YUYV.to_string(), "YUYV");
        assert_eq!(FourCc::parse("YUYV"), Some(fourcc::YUYV));
        assert_eq!(FourCc::parse("YUY"), None);
        assert_eq!(FourCc(0x0000_0001).to_string(), "0x00000001");
    }

    #[test]
    fn test_find_format_respects_mask() {
        assert!(find_format(fourcc::RGB565X, FormatFlags::M2M).is_some());
        assert!(find_format(fourcc::RGB565X, FormatFlags::CAM).is_none());
        assert!(find_format(fourcc::YUYV, FormatFlags::CAM).is_some());
        assert!(find_format(FourCc::new(b"MJPG"), FormatFlags::all()).is_none());
    }

    #[test]
    fn test_find_mbus_format() {
        let fmt = find_mbus_format(mbus::UYVY8_2X8, FormatFlags::CAM).unwrap();
        assert_eq!(fmt.fourcc, fourcc::UYVY);
        assert!(find_mbus_format(0x1234, FormatFlags::all()).is_none());
    }

    #[test]
    fn test_table_invariants() {
        for fmt in FORMATS.iter() {
            assert!((1..=3).contains(&fmt.memplanes), "{}", fmt.name);
            assert!(fmt.memplanes <= fmt.colplanes, "{}", fmt.name);
            assert!(fmt.depth[0] > 0, "{}", fmt.name);
            assert_eq!(fmt.mbus_code.is_some(), fmt.flags.contains(FormatFlags::CAM));
        }
        assert_eq!(default_format().fourcc, fourcc::RGB565X);
    }

    #[test]
    fn test_total_depth() {
        let yuv420m = find_format(fourcc::YUV420M, FormatFlags::M2M).unwrap();
        assert_eq!(yuv420m.total_depth(), 12);
        let yuv420 = find_format(fourcc::YUV420, FormatFlags::M2M).unwrap();
        assert_eq!(yuv420.total_depth(), 12);
    }
}
