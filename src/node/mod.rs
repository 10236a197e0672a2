// SPDX-License-Identifier: GPL-3.0-only

//! Video node facades
//!
//! Each open of a video node returns a handle exposing the ioctl-style
//! operations applications use: capability query, format enumeration and
//! negotiation, buffer management, streaming, controls and cropping.
//! Dropping a handle is the close.
//!
//! - [`m2m`]: memory-to-memory transform node, one context per handle
//! - [`capture`]: camera capture node sharing the device's capture context

pub mod capture;
pub mod m2m;

pub use capture::CaptureHandle;
pub use m2m::M2mHandle;

use crate::constants::{DRIVER_VERSION, MODULE_NAME, PLATFORM_DEVICE_NAME};
use crate::context::Frame;
use crate::context::negotiation::format_mask;
use crate::errors::{FimcError, FimcResult};
use crate::media::formats::{FourCc, format_by_index};
use crate::queue::BufType;
use serde::Serialize;

/// Memory-to-memory multi-planar device
pub const CAP_VIDEO_M2M_MPLANE: u32 = 0x0000_4000;
/// Capture multi-planar device
pub const CAP_VIDEO_CAPTURE_MPLANE: u32 = 0x0000_1000;
/// Streaming I/O
pub const CAP_STREAMING: u32 = 0x0400_0000;

/// Result of a capability query
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Capability {
    pub driver: String,
    pub card: String,
    pub bus_info: String,
    pub version: u32,
    pub capabilities: u32,
}

impl Capability {
    fn new(device_id: u32, node: &str, capabilities: u32) -> Self {
        let (major, minor, patch) = DRIVER_VERSION;
        Self {
            driver: MODULE_NAME.to_string(),
            card: format!("{}.{}-{}", PLATFORM_DEVICE_NAME, device_id, node),
            bus_info: format!("platform:{}.{}", PLATFORM_DEVICE_NAME, device_id),
            version: (major << 16) | (minor << 8) | patch,
            capabilities: capabilities | CAP_STREAMING,
        }
    }
}

/// One entry of a format enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FormatDesc {
    pub index: usize,
    pub description: &'static str,
    pub pixelformat: FourCc,
}

/// The `index`-th format usable on `buf_type`
pub fn enum_fmt(buf_type: BufType, index: usize) -> FimcResult<FormatDesc> {
    let mask = format_mask(buf_type);
    (0..)
        .map_while(format_by_index)
        .filter(|fmt| fmt.flags.intersects(mask))
        .nth(index)
        .map(|fmt| FormatDesc {
            index,
            description: fmt.name,
            pixelformat: fmt.fourcc,
        })
        .ok_or_else(|| FimcError::InvalidArgument(format!("no format at index {}", index)))
}

/// Per-plane buffer sizes for a negotiated frame
pub(crate) fn queue_setup(frame: &Frame, negotiated: bool) -> FimcResult<Vec<u64>> {
    if !negotiated {
        return Err(FimcError::InvalidArgument(
            "format not negotiated".to_string(),
        ));
    }
    let fmt = frame.fmt;
    Ok((0..fmt.memplanes)
        .map(|i| frame.f_width as u64 * frame.f_height as u64 * fmt.depth[i] as u64 / 8)
        .collect())
}

/// Per-plane payload set when a buffer is queued
pub(crate) fn buf_payload(frame: &Frame) -> Vec<u64> {
    frame.payload[..frame.fmt.memplanes].to_vec()
}
