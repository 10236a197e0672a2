// SPDX-License-Identifier: GPL-3.0-only

//! Format and crop negotiation
//!
//! Every operation validates completely before touching the context, so a
//! failed request leaves the frames exactly as they were.

use super::{Context, ContextState, DirtyFlags, Frame};
use crate::errors::{FimcError, FimcResult};
use crate::media::formats::{FormatFlags, FourCc, PixelFormat, find_format};
use crate::media::geometry::{AxisBounds, align_of, align_up, bound_align_image, round_down};
use crate::media::scaler::check_scaler_ratio;
use crate::media::types::{Rect, Size};
use crate::queue::BufType;
use serde::Serialize;
use tracing::{debug, warn};

/// V4L2 JPEG colourspace, reported for every format
pub const COLORSPACE_JPEG: u32 = 7;

/// Field order of a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum Field {
    /// Driver's choice
    #[default]
    Any,
    /// Progressive
    None,
    Top,
    Bottom,
    Interlaced,
}

/// Per-plane line stride and size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct PlaneFormat {
    pub bytesperline: u32,
    pub sizeimage: u32,
}

/// Multi-planar pixel format request / reply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PixFormatMplane {
    pub width: u32,
    pub height: u32,
    pub pixelformat: FourCc,
    pub field: Field,
    pub colorspace: u32,
    pub num_planes: usize,
    pub plane_fmt: [PlaneFormat; 3],
}

impl PixFormatMplane {
    /// A request for `pixelformat` at `size`, strides left to the driver
    pub fn new(pixelformat: FourCc, size: Size) -> Self {
        Self {
            width: size.width,
            height: size.height,
            pixelformat,
            field: Field::Any,
            colorspace: 0,
            num_planes: 0,
            plane_fmt: [PlaneFormat::default(); 3],
        }
    }

    pub fn size(&self) -> Size {
        Size::new(self.width, self.height)
    }
}

/// Capability mask used when looking up a format for `buf_type`
pub fn format_mask(buf_type: BufType) -> FormatFlags {
    if buf_type.is_output() {
        FormatFlags::M2M
    } else {
        FormatFlags::M2M | FormatFlags::CAM
    }
}

impl ContextState {
    /// Frame addressed by `buf_type`
    pub fn frame(&self, buf_type: BufType, capture_ctx: bool) -> FimcResult<&Frame> {
        match buf_type {
            BufType::VideoOutputMplane if capture_ctx => Err(FimcError::InvalidArgument(
                "no output queue in capture mode".to_string(),
            )),
            BufType::VideoOutputMplane => Ok(&self.s_frame),
            BufType::VideoCaptureMplane => Ok(&self.d_frame),
        }
    }
}

/// Which frame a crop request on `buf_type` applies to
///
/// In a capture context the capture queue crops the camera input.
fn crop_targets_source(buf_type: BufType, capture_ctx: bool) -> FimcResult<bool> {
    match buf_type {
        BufType::VideoCaptureMplane => Ok(capture_ctx),
        BufType::VideoOutputMplane if !capture_ctx => Ok(true),
        BufType::VideoOutputMplane => Err(FimcError::InvalidArgument(
            "no output queue in capture mode".to_string(),
        )),
    }
}

/// Multi-planar description of a frame
fn describe_frame(frame: &Frame) -> PixFormatMplane {
    let fmt = frame.fmt;
    let mut pix = PixFormatMplane::new(fmt.fourcc, frame.size());
    pix.field = Field::None;
    pix.colorspace = COLORSPACE_JPEG;
    pix.num_planes = fmt.memplanes;
    for i in 0..fmt.memplanes {
        let mut bpl = frame.o_width;
        if fmt.colplanes == 1 {
            bpl = bpl * fmt.depth[0] / 8;
        }
        pix.plane_fmt[i] = PlaneFormat {
            bytesperline: bpl,
            sizeimage: frame.o_width * frame.o_height * fmt.depth[i] / 8,
        };
    }
    pix
}

impl Context {
    /// Adjust a format request to what the hardware supports
    pub fn try_format(&self, buf_type: BufType, pix: &PixFormatMplane) -> FimcResult<PixFormatMplane> {
        let variant = self.variant();
        let is_output = buf_type.is_output();
        if is_output && self.is_capture() {
            return Err(FimcError::InvalidArgument(
                "no output queue in capture mode".to_string(),
            ));
        }

        let fmt = find_format(pix.pixelformat, format_mask(buf_type)).ok_or_else(|| {
            warn!(ctx = self.id(), fourcc = %pix.pixelformat, "Fourcc format invalid");
            FimcError::InvalidFormat(format!("fourcc {} not supported", pix.pixelformat))
        })?;

        let field = match pix.field {
            Field::Any | Field::None => Field::None,
            other => {
                return Err(FimcError::InvalidArgument(format!(
                    "field {:?} not supported",
                    other
                )));
            }
        };

        let (max_width, mod_x) = if is_output {
            (variant.pix_limit.scaler_dis_w, align_of(variant.min_inp_pixsize))
        } else {
            (variant.pix_limit.out_rot_dis_w, align_of(variant.min_out_pixsize))
        };
        let (mod_x, mod_y) = if fmt.is_tiled() {
            (6, 5)
        } else if self.device_id() == 1 && variant.pix_hoff {
            (mod_x, if fmt.color.is_rgb() { 0 } else { 1 })
        } else {
            (mod_x, mod_x)
        };

        let size = bound_align_image(
            pix.size(),
            AxisBounds::new(16, max_width, mod_x),
            AxisBounds::new(8, variant.pix_limit.scaler_dis_w, mod_y),
            0,
        );

        let mut out = *pix;
        out.width = size.width;
        out.height = size.height;
        out.pixelformat = fmt.fourcc;
        out.field = field;
        out.colorspace = COLORSPACE_JPEG;
        out.num_planes = fmt.memplanes;
        out.plane_fmt = [PlaneFormat::default(); 3];

        // Packed strides are in bytes, planar strides in luma pixels
        let (min_bpl, max_bpl) = if fmt.colplanes == 1 {
            (size.width * fmt.depth[0] / 8, max_width * fmt.depth[0] / 8)
        } else {
            (size.width, max_width)
        };
        let mut stride = 0;
        for i in 0..fmt.memplanes {
            let mut bpl = pix.plane_fmt[i].bytesperline;
            let pixels = if fmt.colplanes == 1 {
                u64::from(bpl) * 8 / u64::from(fmt.depth[i].max(1))
            } else {
                u64::from(bpl)
            };
            if bpl == 0 || pixels < u64::from(size.width) || bpl > max_bpl {
                bpl = min_bpl;
            }
            if i == 0 {
                stride = bpl;
            }
            out.plane_fmt[i] = PlaneFormat {
                bytesperline: stride,
                sizeimage: size.width * size.height * fmt.depth[i] / 8,
            };
        }

        debug!(ctx = self.id(), buf_type = ?buf_type, size = %size, fourcc = %fmt.fourcc, "Format adjusted");
        Ok(out)
    }

    /// Negotiate and commit a format
    ///
    /// Memory-to-memory contexts refuse while the direction's queue holds
    /// buffers. Capture contexts only accept the capture direction; their
    /// queue is checked by the capture node.
    pub fn set_format(&self, buf_type: BufType, pix: &PixFormatMplane) -> FimcResult<PixFormatMplane> {
        let out = self.try_format(buf_type, pix)?;
        let fmt = find_format(out.pixelformat, format_mask(buf_type)).ok_or_else(|| {
            FimcError::InvalidFormat(format!("fourcc {} not supported", out.pixelformat))
        })?;

        let mut state = self.state();
        if let Ok(queues) = self.queues()
            && queues.get(buf_type).is_busy()
        {
            warn!(ctx = self.id(), buf_type = ?buf_type, "Queue busy");
            return Err(FimcError::Busy(format!("{:?} queue busy", buf_type)));
        }

        self.commit_format(&mut state, buf_type, fmt, &out);
        Ok(out)
    }

    fn commit_format(
        &self,
        state: &mut ContextState,
        buf_type: BufType,
        fmt: &'static PixelFormat,
        pix: &PixFormatMplane,
    ) {
        let bytesperline = pix.plane_fmt[0].bytesperline;
        if buf_type.is_output() {
            state.s_frame.set_format(fmt, pix.size(), bytesperline);
            state.src_fmt_set = true;
        } else {
            state.d_frame.set_format(fmt, pix.size(), bytesperline);
            state.dst_fmt_set = true;
        }
        state.dirty |= DirtyFlags::PARAMS;
        debug!(
            ctx = self.id(),
            buf_type = ?buf_type,
            fourcc = %fmt.fourcc,
            size = %pix.size(),
            "Format set"
        );
    }

    /// Make the source frame follow a camera bus format
    pub fn set_source_format(&self, fmt: &'static PixelFormat, size: Size) {
        let mut state = self.state();
        let frame = &mut state.s_frame;
        frame.fmt = fmt;
        frame.f_width = size.width;
        frame.f_height = size.height;
        frame.o_width = size.width;
        frame.o_height = size.height;
        frame.width = size.width;
        frame.height = size.height;
        frame.offs_h = 0;
        frame.offs_v = 0;
        state.src_fmt_set = true;
        state.dirty |= DirtyFlags::PARAMS;
    }

    /// Current format of a direction
    pub fn get_format(&self, buf_type: BufType) -> FimcResult<PixFormatMplane> {
        let state = self.state();
        let frame = state.frame(buf_type, self.is_capture())?;
        Ok(describe_frame(frame))
    }

    /// Crop bounds and default rectangle of a direction
    pub fn crop_cap(&self, buf_type: BufType) -> FimcResult<(Rect, Rect)> {
        let state = self.state();
        let frame = state.frame(buf_type, self.is_capture())?;
        let bounds = Rect::new(0, 0, frame.f_width, frame.f_height);
        Ok((bounds, bounds))
    }

    pub fn get_crop(&self, buf_type: BufType) -> FimcResult<Rect> {
        let state = self.state();
        Ok(state.frame(buf_type, self.is_capture())?.crop())
    }

    /// Adjust a crop rectangle to the frame and hardware alignment
    pub fn try_crop(&self, buf_type: BufType, rect: Rect) -> FimcResult<Rect> {
        let state = self.state();
        self.try_crop_locked(&state, buf_type, rect)
    }

    fn try_crop_locked(&self, state: &ContextState, buf_type: BufType, rect: Rect) -> FimcResult<Rect> {
        if rect.left < 0 || rect.top < 0 {
            warn!(ctx = self.id(), left = rect.left, top = rect.top, "Negative crop offset");
            return Err(FimcError::InvalidArgument(
                "negative crop offsets not supported".to_string(),
            ));
        }

        let capture_ctx = self.is_capture();
        let is_source = crop_targets_source(buf_type, capture_ctx)?;
        let f = if is_source { &state.s_frame } else { &state.d_frame };
        let variant = self.variant();

        let mut min_size = if is_source {
            variant.min_inp_pixsize
        } else {
            variant.min_out_pixsize
        };
        let halign = if capture_ctx {
            min_size = 16;
            4
        } else if self.device_id() == 1 && variant.pix_hoff {
            if f.fmt.color.is_rgb() { 0 } else { 1 }
        } else {
            align_of(min_size)
        };

        let depth = align_up(f.fmt.total_depth(), 8).max(8);
        let size = bound_align_image(
            rect.size(),
            AxisBounds::new(min_size, f.o_width, align_of(min_size)),
            AxisBounds::new(min_size, f.o_height, halign),
            64 / depth,
        );
        // A frame smaller than the minimum crop cannot hold the aligned size
        let width = size.width.min(f.o_width);
        let height = size.height.min(f.o_height);

        let mut left = rect.left as i64;
        let mut top = rect.top as i64;
        if left + width as i64 > f.o_width as i64 {
            left = f.o_width as i64 - width as i64;
        }
        if top + height as i64 > f.o_height as i64 {
            top = f.o_height as i64 - height as i64;
        }
        let left = round_down(left.max(0) as i32, min_size);
        let top = round_down(top.max(0) as i32, if capture_ctx { 16 } else { 8 });

        let out = Rect::new(left, top, width, height);
        debug!(ctx = self.id(), ?out, full_w = f.f_width, full_h = f.f_height, "Crop adjusted");
        Ok(out)
    }

    /// Negotiate and commit a crop rectangle
    ///
    /// With both formats set the scaler ratio is re-checked against the new
    /// crop and an out-of-range request fails with `InvalidGeometry`.
    pub fn set_crop(&self, buf_type: BufType, rect: Rect) -> FimcResult<Rect> {
        let mut state = self.state();
        let out = self.try_crop_locked(&state, buf_type, rect)?;
        let is_source = crop_targets_source(buf_type, self.is_capture())?;

        if state.formats_set() {
            let (src, dst) = if is_source {
                (out.size(), state.d_frame.size())
            } else {
                (state.s_frame.size(), out.size())
            };
            check_scaler_ratio(src, dst, state.rotation)
                .inspect_err(|_| warn!(ctx = self.id(), "Out of scaler range"))?;
        }

        let frame = if is_source {
            &mut state.s_frame
        } else {
            &mut state.d_frame
        };
        frame.set_crop(out);
        state.dirty |= DirtyFlags::PARAMS;
        debug!(ctx = self.id(), buf_type = ?buf_type, crop = ?out, "Crop set");
        Ok(out)
    }
}
