// SPDX-License-Identifier: GPL-3.0-only

//! Transform contexts
//!
//! A [`Context`] is the per-open-handle state of the driver: the source and
//! destination [`Frame`]s, rotation and flip, the derived scaler parameters
//! and the set of configuration changes still to be programmed into the
//! hardware. Memory-to-memory contexts also own their two buffer queues.
//! The camera path uses one shared capture context.
//!
//! - [`frame`]: frame geometry, plane address and DMA offset preparation
//! - [`controls`]: flip / rotation controls
//! - [`negotiation`]: format and crop negotiation

pub mod controls;
pub mod frame;
pub mod negotiation;

pub use controls::{ControlId, ControlKind, QueryControl};
pub use frame::{DmaOffset, Frame, Order422, PlaneAddrs};
pub use negotiation::{Field, PixFormatMplane, PlaneFormat};

use crate::config::Variant;
use crate::constants::{SCALER_MAX_HRATIO, SCALER_MAX_VRATIO};
use crate::errors::{FimcError, FimcResult};
use crate::media::scaler::{ScalerParams, prepare_scaler};
use crate::media::types::{Flip, Rotation};
use crate::queue::{BufType, VideoQueue};
use bitflags::bitflags;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

/// Unique id of an open context
pub type ContextId = u64;

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

bitflags! {
    /// Configuration that changed since the hardware was last programmed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DirtyFlags: u32 {
        /// Geometry, format, rotation or flip changed
        const PARAMS = 1 << 0;
        /// Source buffer address must be resolved
        const SRC_ADDR = 1 << 1;
        /// Destination buffer address must be resolved
        const DST_ADDR = 1 << 2;
    }
}

/// What a context is used for; fixed at open
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextMode {
    M2m,
    Capture,
}

/// Shutdown handshake state of a context
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContextPhase {
    #[default]
    Active,
    /// A blocking drain is waiting for the in-flight job to complete
    ShutdownRequested,
}

/// Mutable configuration of a context, guarded by the context lock
#[derive(Debug, Clone)]
pub struct ContextState {
    pub s_frame: Frame,
    pub d_frame: Frame,
    pub rotation: Rotation,
    pub flip: Flip,
    pub scaler: ScalerParams,
    pub dirty: DirtyFlags,
    pub src_fmt_set: bool,
    pub dst_fmt_set: bool,
    pub phase: ContextPhase,
    pub in_order_1p: Order422,
    pub out_order_1p: Order422,
}

impl Default for ContextState {
    fn default() -> Self {
        Self {
            s_frame: Frame::default(),
            d_frame: Frame::default(),
            rotation: Rotation::None,
            flip: Flip::default(),
            scaler: ScalerParams::default(),
            dirty: DirtyFlags::empty(),
            src_fmt_set: false,
            dst_fmt_set: false,
            phase: ContextPhase::Active,
            in_order_1p: Order422::default(),
            out_order_1p: Order422::default(),
        }
    }
}

impl ContextState {
    /// Both directions have a negotiated format
    pub fn formats_set(&self) -> bool {
        self.src_fmt_set && self.dst_fmt_set
    }

    /// Recompute scaler parameters from the current frames and rotation
    pub fn prepare_scaler(&mut self) -> FimcResult<&ScalerParams> {
        self.scaler = prepare_scaler(
            self.s_frame.size(),
            self.s_frame.fmt,
            self.d_frame.size(),
            self.d_frame.fmt,
            self.rotation,
        )?;
        Ok(&self.scaler)
    }

    /// Derive the one-plane YUV component orders from the frame formats
    pub fn set_yuv_order(&mut self) {
        self.in_order_1p = Order422::for_color(self.s_frame.fmt.color);
        self.out_order_1p = Order422::for_color(self.d_frame.fmt.color);
    }

    /// Prepare everything the next hardware run needs
    ///
    /// Pending parameter changes recompute DMA offsets and YUV orders;
    /// pending address changes resolve plane addresses from the given
    /// buffer planes.
    pub fn prepare_config(
        &mut self,
        variant: &Variant,
        src: Option<&[u64]>,
        dst: Option<&[u64]>,
    ) -> FimcResult<()> {
        if self.dirty.contains(DirtyFlags::PARAMS) {
            self.s_frame.prepare_dma_offset(variant.pix_hoff);
            self.d_frame.prepare_dma_offset(variant.pix_hoff);

            let (s, d) = (&self.s_frame, &self.d_frame);
            if s.height as u64 > SCALER_MAX_VRATIO as u64 * d.height as u64
                || s.width as u64 > SCALER_MAX_HRATIO as u64 * d.width as u64
            {
                return Err(FimcError::InvalidGeometry(format!(
                    "{}x{} -> {}x{} out of scaler range",
                    s.width, s.height, d.width, d.height
                )));
            }
            self.set_yuv_order();
        }

        self.scaler.enabled = true;

        if self.dirty.contains(DirtyFlags::SRC_ADDR)
            && let Some(planes) = src
        {
            self.s_frame.paddr = self.s_frame.prepare_addr(planes)?;
        }
        if self.dirty.contains(DirtyFlags::DST_ADDR)
            && let Some(planes) = dst
        {
            self.d_frame.paddr = self.d_frame.prepare_addr(planes)?;
        }
        Ok(())
    }
}

/// The two buffer queues of a memory-to-memory context
#[derive(Debug)]
pub struct M2mQueues {
    /// Source frames (output direction)
    pub src: VideoQueue,
    /// Destination frames (capture direction)
    pub dst: VideoQueue,
}

impl M2mQueues {
    pub fn new() -> Self {
        Self {
            src: VideoQueue::new(BufType::VideoOutputMplane),
            dst: VideoQueue::new(BufType::VideoCaptureMplane),
        }
    }

    pub fn get(&self, buf_type: BufType) -> &VideoQueue {
        match buf_type {
            BufType::VideoOutputMplane => &self.src,
            BufType::VideoCaptureMplane => &self.dst,
        }
    }

    pub fn get_mut(&mut self, buf_type: BufType) -> &mut VideoQueue {
        match buf_type {
            BufType::VideoOutputMplane => &mut self.src,
            BufType::VideoCaptureMplane => &mut self.dst,
        }
    }

    /// Both queues streaming with at least one buffer each in the driver
    pub fn job_ready(&self) -> bool {
        self.src.is_streaming()
            && self.dst.is_streaming()
            && self.src.ready_len() > 0
            && self.dst.ready_len() > 0
    }
}

impl Default for M2mQueues {
    fn default() -> Self {
        Self::new()
    }
}

/// An open transform or capture context
///
/// Lock order is device state, then context state, then context queues.
#[derive(Debug)]
pub struct Context {
    id: ContextId,
    mode: ContextMode,
    device_id: u32,
    variant: Variant,
    state: Mutex<ContextState>,
    queues: Option<Mutex<M2mQueues>>,
}

impl Context {
    /// Create a context with both frames set to the default format
    pub fn new(mode: ContextMode, device_id: u32, variant: Variant) -> Self {
        let id = NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed);
        debug!(ctx = id, mode = ?mode, "Context created");
        Self {
            id,
            mode,
            device_id,
            variant,
            state: Mutex::new(ContextState::default()),
            queues: match mode {
                ContextMode::M2m => Some(Mutex::new(M2mQueues::new())),
                ContextMode::Capture => None,
            },
        }
    }

    pub fn id(&self) -> ContextId {
        self.id
    }

    pub fn mode(&self) -> ContextMode {
        self.mode
    }

    pub fn is_capture(&self) -> bool {
        self.mode == ContextMode::Capture
    }

    pub fn device_id(&self) -> u32 {
        self.device_id
    }

    pub fn variant(&self) -> &Variant {
        &self.variant
    }

    /// Lock the context configuration
    pub fn state(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Lock the buffer queues of a memory-to-memory context
    pub fn queues(&self) -> FimcResult<MutexGuard<'_, M2mQueues>> {
        self.queues
            .as_ref()
            .map(|q| q.lock().unwrap_or_else(|e| e.into_inner()))
            .ok_or_else(|| {
                FimcError::InvalidArgument(format!("context {} has no transform queues", self.id))
            })
    }

    /// Whether the context has work for the transform scheduler
    ///
    /// A context being drained is never ready.
    pub fn job_ready(&self) -> bool {
        if self.phase() != ContextPhase::Active {
            return false;
        }
        self.queues().map(|q| q.job_ready()).unwrap_or(false)
    }

    /// Set dirty bits under the context lock
    pub fn mark_dirty(&self, flags: DirtyFlags) {
        self.state().dirty |= flags;
    }

    pub fn phase(&self) -> ContextPhase {
        self.state().phase
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_context_defaults() {
        let ctx = Context::new(ContextMode::M2m, 0, Variant::default());
        let state = ctx.state();
        assert_eq!(state.s_frame.fmt.name, "RGB565");
        assert!(!state.formats_set());
        assert!(state.dirty.is_empty());
        assert_eq!(state.phase, ContextPhase::Active);
    }

    #[test]
    fn test_ids_are_unique() {
        let a = Context::new(ContextMode::M2m, 0, Variant::default());
        let b = Context::new(ContextMode::M2m, 0, Variant::default());
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_prepare_config_resolves_addresses() {
        let ctx = Context::new(ContextMode::M2m, 0, Variant::default());
        let mut state = ctx.state();
        let size = crate::media::types::Size::new(320, 240);
        let fmt = crate::media::formats::default_format();
        state.s_frame.set_format(fmt, size, 640);
        state.d_frame.set_format(fmt, size, 640);
        state.dirty = DirtyFlags::all();
        state
            .prepare_config(ctx.variant(), Some(&[0x5000_0000]), Some(&[0x5010_0000]))
            .unwrap();
        assert_eq!(state.s_frame.paddr.y, 0x5000_0000);
        assert_eq!(state.d_frame.paddr.y, 0x5010_0000);
        assert!(state.scaler.enabled);
    }

    #[test]
    fn test_prepare_config_rejects_extreme_downscale() {
        let ctx = Context::new(ContextMode::M2m, 0, Variant::default());
        let mut state = ctx.state();
        let fmt = crate::media::formats::default_format();
        state
            .s_frame
            .set_format(fmt, crate::media::types::Size::new(4096, 240), 8192);
        state
            .d_frame
            .set_format(fmt, crate::media::types::Size::new(16, 240), 32);
        state.dirty = DirtyFlags::PARAMS;
        assert!(matches!(
            state.prepare_config(ctx.variant(), None, None),
            Err(FimcError::InvalidGeometry(_))
        ));
    }

    #[test]
    fn test_capture_context_has_no_queues() {
        let ctx = Context::new(ContextMode::Capture, 0, Variant::default());
        assert!(ctx.queues().is_err());
        assert!(!ctx.job_ready());
    }
}
