// SPDX-License-Identifier: GPL-3.0-only

//! Per-direction frame geometry and DMA address preparation

use crate::errors::{FimcError, FimcResult};
use crate::media::formats::{ColorFormat, PixelFormat, default_format};
use crate::media::types::{Rect, Size};
use serde::Serialize;
use tracing::debug;

/// Physical addresses of the Y/Cb/Cr planes of one buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlaneAddrs {
    pub y: u64,
    pub cb: u64,
    pub cr: u64,
}

/// Crop offsets as programmed into the DMA engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DmaOffset {
    pub y_h: u32,
    pub y_v: u32,
    pub cb_h: u32,
    pub cb_v: u32,
    pub cr_h: u32,
    pub cr_v: u32,
}

/// Component order of a one-plane YUV 4:2:2 stream as the DMA engine sees it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Order422 {
    #[default]
    YCbYCr,
    YCrYCb,
    CbYCrY,
    CrYCbY,
}

impl Order422 {
    /// Register order for a colour code
    ///
    /// The DMA engine fetches 16-bit halves swapped, so each order maps to
    /// its byte-swapped counterpart.
    pub fn for_color(color: ColorFormat) -> Self {
        match color {
            ColorFormat::YCrYCb422 => Order422::CbYCrY,
            ColorFormat::CbYCrY422 => Order422::YCrYCb,
            ColorFormat::CrYCbY422 => Order422::YCbYCr,
            _ => Order422::CrYCbY,
        }
    }
}

/// Geometry and format of one side (source or destination) of a transform
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub fmt: &'static PixelFormat,
    /// Full buffer width in pixels (line stride)
    pub f_width: u32,
    pub f_height: u32,
    /// Size as negotiated by set-format
    pub o_width: u32,
    pub o_height: u32,
    /// Cropped size
    pub width: u32,
    pub height: u32,
    /// Crop offset
    pub offs_h: u32,
    pub offs_v: u32,
    /// Bytes per colour plane
    pub payload: [u64; 3],
    pub dma_offset: DmaOffset,
    pub paddr: PlaneAddrs,
}

impl Default for Frame {
    fn default() -> Self {
        Self {
            fmt: default_format(),
            f_width: 0,
            f_height: 0,
            o_width: 0,
            o_height: 0,
            width: 0,
            height: 0,
            offs_h: 0,
            offs_v: 0,
            payload: [0; 3],
            dma_offset: DmaOffset::default(),
            paddr: PlaneAddrs::default(),
        }
    }
}

impl Frame {
    /// Cropped size
    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }

    /// Current crop rectangle
    pub fn crop(&self) -> Rect {
        Rect::new(
            self.offs_h as i32,
            self.offs_v as i32,
            self.width,
            self.height,
        )
    }

    /// A frame is usable by the hardware once it has a non-empty size
    pub fn is_configured(&self) -> bool {
        self.width > 0 && self.height > 0
    }

    /// Commit a negotiated format: full size = crop = `size`, offsets reset
    pub fn set_format(&mut self, fmt: &'static PixelFormat, size: Size, bytesperline: u32) {
        self.fmt = fmt;
        self.payload = [0; 3];
        for i in 0..fmt.colplanes {
            self.payload[i] = size.width as u64 * size.height as u64 * fmt.depth[i] as u64 / 8;
        }
        self.f_width = if fmt.depth[0] > 0 {
            u32::try_from(u64::from(bytesperline) * 8 / u64::from(fmt.depth[0])).unwrap_or(u32::MAX)
        } else {
            size.width
        };
        self.f_height = size.height;
        self.width = size.width;
        self.height = size.height;
        self.o_width = size.width;
        self.o_height = size.height;
        self.offs_h = 0;
        self.offs_v = 0;
    }

    /// Commit a crop rectangle already validated against this frame
    pub fn set_crop(&mut self, rect: Rect) {
        self.offs_h = rect.left.max(0) as u32;
        self.offs_v = rect.top.max(0) as u32;
        self.width = rect.width;
        self.height = rect.height;
    }

    /// Resolve Y/Cb/Cr addresses for a buffer with the given plane addresses
    ///
    /// Single memory plane formats derive the chroma planes from the luma
    /// address; multi-plane formats take each plane from the buffer.
    pub fn prepare_addr(&self, planes: &[u64]) -> FimcResult<PlaneAddrs> {
        let y = *planes
            .first()
            .ok_or_else(|| FimcError::InvalidArgument("buffer has no planes".to_string()))?;
        let pix_size = self.width as u64 * self.height as u64;

        let addrs = if self.fmt.memplanes == 1 {
            match self.fmt.colplanes {
                1 => PlaneAddrs { y, cb: 0, cr: 0 },
                2 => PlaneAddrs {
                    y,
                    cb: y + pix_size,
                    cr: 0,
                },
                3 => {
                    let cb = y + pix_size;
                    let cr = if self.fmt.color.is_yuv420() {
                        cb + (pix_size >> 2)
                    } else {
                        cb + (pix_size >> 1)
                    };
                    PlaneAddrs { y, cb, cr }
                }
                n => {
                    return Err(FimcError::InvalidFormat(format!(
                        "{} colour planes not supported",
                        n
                    )));
                }
            }
        } else {
            let plane = |i: usize| {
                planes.get(i).copied().ok_or_else(|| {
                    FimcError::InvalidArgument(format!("buffer lacks plane {}", i))
                })
            };
            PlaneAddrs {
                y,
                cb: if self.fmt.memplanes >= 2 { plane(1)? } else { 0 },
                cr: if self.fmt.memplanes == 3 { plane(2)? } else { 0 },
            }
        };

        debug!(
            y = format!("{:#x}", addrs.y),
            cb = format!("{:#x}", addrs.cb),
            cr = format!("{:#x}", addrs.cr),
            "Plane addresses"
        );
        Ok(addrs)
    }

    /// Compute the DMA crop offsets
    ///
    /// With byte offsets (`pix_hoff == false`) the luma offset is scaled by
    /// bytes per pixel and chroma offsets are subsampled like the planes.
    pub fn prepare_dma_offset(&mut self, pix_hoff: bool) {
        let depth = self.fmt.total_depth();
        let mut off = DmaOffset {
            y_h: self.offs_h,
            y_v: self.offs_v,
            cb_h: self.offs_h,
            cb_v: self.offs_v,
            cr_h: self.offs_h,
            cr_v: self.offs_v,
        };

        if !pix_hoff {
            off.y_h *= depth >> 3;
            if self.fmt.colplanes == 3 {
                off.cb_h >>= 1;
                off.cr_h >>= 1;
            }
            if self.fmt.color.is_yuv420() {
                off.cb_v >>= 1;
                off.cr_v >>= 1;
            }
        }

        self.dma_offset = off;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::formats::{FormatFlags, find_format, fourcc};

    fn frame(code: crate::media::FourCc, w: u32, h: u32) -> Frame {
        let fmt = find_format(code, FormatFlags::M2M).unwrap();
        let mut f = Frame::default();
        let bpl = if fmt.colplanes == 1 { w * fmt.depth[0] / 8 } else { w };
        f.set_format(fmt, Size::new(w, h), bpl);
        f
    }

    #[test]
    fn test_set_format_payload_and_stride() {
        let f = frame(fourcc::RGB565X, 320, 240);
        assert_eq!(f.payload[0], 320 * 240 * 2);
        assert_eq!(f.f_width, 320);
        assert_eq!(f.crop(), Rect::new(0, 0, 320, 240));
    }

    #[test]
    fn test_prepare_addr_yuv420_single_plane() {
        let f = frame(fourcc::YUV420, 64, 32);
        let addrs = f.prepare_addr(&[0x1000]).unwrap();
        assert_eq!(addrs.cb, 0x1000 + 2048);
        assert_eq!(addrs.cr, 0x1000 + 2048 + 512);
    }

    #[test]
    fn test_prepare_addr_yuv422_planar() {
        let f = frame(fourcc::YUV422P, 64, 32);
        let addrs = f.prepare_addr(&[0]).unwrap();
        assert_eq!(addrs.cr, 2048 + 1024);
    }

    #[test]
    fn test_prepare_addr_multiplane() {
        let f = frame(fourcc::YUV420M, 64, 32);
        let addrs = f.prepare_addr(&[0x100, 0x200, 0x300]).unwrap();
        assert_eq!(addrs, PlaneAddrs { y: 0x100, cb: 0x200, cr: 0x300 });
        assert!(f.prepare_addr(&[0x100]).is_err());
    }

    #[test]
    fn test_dma_offset_byte_mode() {
        let mut f = frame(fourcc::YUV420, 64, 32);
        f.set_crop(Rect::new(16, 8, 32, 16));
        f.prepare_dma_offset(false);
        assert_eq!(f.dma_offset.y_h, 16 * (12 >> 3));
        assert_eq!(f.dma_offset.cb_h, 8);
        assert_eq!(f.dma_offset.cb_v, 4);

        f.prepare_dma_offset(true);
        assert_eq!(f.dma_offset.y_h, 16);
        assert_eq!(f.dma_offset.cb_v, 8);
    }

    #[test]
    fn test_yuv_order_mapping() {
        assert_eq!(Order422::for_color(ColorFormat::YCbYCr422), Order422::CrYCbY);
        assert_eq!(Order422::for_color(ColorFormat::CbYCrY422), Order422::YCrYCb);
    }
}
