// SPDX-License-Identifier: GPL-3.0-only

//! Scaler math
//!
//! The post-processor scales in two stages: a power-of-two prescaler
//! (ratio 1..=32) followed by a main scaler with an 8-bit fixed-point ratio.
//! Everything here is pure so it can be checked without hardware.

use crate::constants::{
    MAIN_SCALER_FRACTION_BITS, PRESCALER_MAX_RATIO, PRESCALER_MAX_SHIFT, SCALER_MAX_HRATIO,
    SCALER_MAX_VRATIO,
};
use crate::errors::{FimcError, FimcResult};
use crate::media::formats::PixelFormat;
use crate::media::types::{Rotation, Size};
use serde::Serialize;

/// Prescaler ratio for one axis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ScaleFactor {
    /// Power of two in 1..=32
    pub ratio: u32,
    /// log2 of `ratio`
    pub shift: u32,
}

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor { ratio: 1, shift: 0 };
}

/// Largest power-of-two prescale ratio with `src >= target * ratio`
///
/// Fails when `src >= 64 * target`, which the prescaler cannot reach.
pub fn compute_factor(src: u32, target: u32) -> FimcResult<ScaleFactor> {
    let src = src as u64;
    let target = target as u64;
    if src >= PRESCALER_MAX_RATIO as u64 * target {
        return Err(FimcError::InvalidGeometry(format!(
            "source {} too large for target {}",
            src, target
        )));
    }

    for shift in (0..=PRESCALER_MAX_SHIFT).rev() {
        let ratio = 1u64 << shift;
        if src >= target * ratio {
            return Ok(ScaleFactor {
                ratio: ratio as u32,
                shift,
            });
        }
    }
    Ok(ScaleFactor::IDENTITY)
}

/// Reject geometries the scaler cannot downscale
///
/// Axes of the destination are swapped for 90°/270° before comparing.
pub fn check_scaler_ratio(src: Size, dst: Size, rotation: Rotation) -> FimcResult<()> {
    let target = dst.rotated(rotation);
    if src.width as u64 >= SCALER_MAX_HRATIO as u64 * target.width as u64
        || src.height as u64 >= SCALER_MAX_VRATIO as u64 * target.height as u64
    {
        return Err(FimcError::InvalidGeometry(format!(
            "{} -> {} at {} exceeds scaler range",
            src, dst, rotation
        )));
    }
    Ok(())
}

/// Derived scaler configuration for one transform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct ScalerParams {
    pub enabled: bool,
    /// Source size before prescaling
    pub real_width: u32,
    pub real_height: u32,
    pub pre_hratio: u32,
    pub pre_vratio: u32,
    pub hfactor: u32,
    pub vfactor: u32,
    /// Source size after prescaling
    pub pre_dst_width: u32,
    pub pre_dst_height: u32,
    /// Main scaler ratios, 8 fraction bits
    pub main_hratio: u32,
    pub main_vratio: u32,
    pub scaleup_h: bool,
    pub scaleup_v: bool,
    /// Source and destination match exactly; no scaling required
    pub copy_mode: bool,
}

/// Compute scaler parameters for a source/destination pair
pub fn prepare_scaler(
    src: Size,
    src_fmt: &PixelFormat,
    dst: Size,
    dst_fmt: &PixelFormat,
    rotation: Rotation,
) -> FimcResult<ScalerParams> {
    let target = dst.rotated(rotation);
    if target.width == 0 || target.height == 0 {
        return Err(FimcError::InvalidGeometry(format!(
            "invalid target size: {}",
            target
        )));
    }
    if src.width == 0 || src.height == 0 {
        return Err(FimcError::InvalidGeometry(format!(
            "invalid source size: {}",
            src
        )));
    }

    let copy_mode = src_fmt.fourcc == dst_fmt.fourcc && src == dst;
    if copy_mode {
        return Ok(ScalerParams {
            enabled: true,
            real_width: src.width,
            real_height: src.height,
            pre_hratio: 1,
            pre_vratio: 1,
            hfactor: 0,
            vfactor: 0,
            pre_dst_width: src.width,
            pre_dst_height: src.height,
            main_hratio: 1 << MAIN_SCALER_FRACTION_BITS,
            main_vratio: 1 << MAIN_SCALER_FRACTION_BITS,
            scaleup_h: true,
            scaleup_v: true,
            copy_mode,
        });
    }

    let h = compute_factor(src.width, target.width)?;
    let v = compute_factor(src.height, target.height)?;

    let main_ratio = |s: u32, t: u32, shift: u32| -> u32 {
        (((s as u64) << MAIN_SCALER_FRACTION_BITS) / ((t as u64) << shift)) as u32
    };

    Ok(ScalerParams {
        enabled: true,
        real_width: src.width,
        real_height: src.height,
        pre_hratio: h.ratio,
        pre_vratio: v.ratio,
        hfactor: h.shift,
        vfactor: v.shift,
        pre_dst_width: src.width / h.ratio,
        pre_dst_height: src.height / v.ratio,
        main_hratio: main_ratio(src.width, target.width, h.shift),
        main_vratio: main_ratio(src.height, target.height, v.shift),
        scaleup_h: target.width >= src.width,
        scaleup_v: target.height >= src.height,
        copy_mode,
    })
}
