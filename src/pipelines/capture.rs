// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture pipeline
//!
//! Buffers queued by the application wait on a pending list until a
//! hardware output slot is free, then move onto the active [`SlotRing`]
//! where the hardware fills them in programming order. Every frame-end
//! interrupt retires the oldest active buffer and programs the next pending
//! one into the slot the hardware will reach next.
//!
//! All state here lives inside the device lock.

use crate::context::{Context, ContextState, DirtyFlags, PlaneAddrs};
use crate::device::{CaptureFlags, Device, DeviceShared};
use crate::errors::{FimcError, FimcResult};
use crate::hardware::{FimcHardware, MbusFormat, OutputSlot};
use crate::media::formats::{FormatFlags, find_mbus_format};
use crate::media::types::Size;
use crate::queue::{BufType, BufferState, SlotRing, VideoQueue};
use chrono::Utc;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// A capture buffer handed to the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureBuffer {
    pub index: usize,
    pub paddr: PlaneAddrs,
}

/// Capture path bookkeeping
#[derive(Debug)]
pub struct CaptureState {
    pub(crate) ctx: Arc<Context>,
    pub(crate) queue: VideoQueue,
    pending: VecDeque<CaptureBuffer>,
    active: SlotRing<CaptureBuffer>,
    frame_count: u32,
    users: usize,
    reqbufs_count: usize,
}

impl CaptureState {
    pub fn new(ctx: Arc<Context>, slots: usize) -> Self {
        Self {
            ctx,
            queue: VideoQueue::new(BufType::VideoCaptureMplane),
            pending: VecDeque::new(),
            active: SlotRing::new(slots),
            frame_count: 0,
            users: 0,
            reqbufs_count: 0,
        }
    }

    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn queue(&self) -> &VideoQueue {
        &self.queue
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Hardware output slots
    pub fn slots(&self) -> usize {
        self.active.capacity()
    }

    /// Slots of the active buffers, oldest first
    pub fn active_slots(&self) -> Vec<usize> {
        self.active.iter().map(|(slot, _)| *slot).collect()
    }

    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    pub fn users(&self) -> usize {
        self.users
    }

    pub(crate) fn add_user(&mut self) {
        self.users += 1;
    }

    pub(crate) fn remove_user(&mut self) -> usize {
        self.users = self.users.saturating_sub(1);
        self.users
    }

    pub(crate) fn set_reqbufs_count(&mut self, count: usize) {
        self.reqbufs_count = count;
    }

    fn reset(&mut self) {
        self.pending.clear();
        self.active.reset();
        self.frame_count = 0;
    }

    /// Give every buffer held by the driver back with `state`
    fn return_buffers(&mut self, state: BufferState) {
        let pending: Vec<usize> = self.pending.drain(..).map(|b| b.index).collect();
        let active: Vec<usize> = self.active.reset().into_iter().map(|(_, b)| b.index).collect();
        for index in pending.into_iter().chain(active) {
            self.queue.buffer_done(index, state);
        }
    }
}

/// Frame-end handling; returns whether a stop request was acknowledged
pub(crate) fn capture_irq(shared: &mut DeviceShared) -> bool {
    let DeviceShared {
        state,
        hw,
        capture,
        ..
    } = shared;
    let Some(cap) = capture.as_mut() else {
        warn!("Capture interrupt without a capture path");
        return false;
    };

    if state.capture_flags().contains(CaptureFlags::RUN)
        && let Some((slot, buf)) = cap.active.pop()
    {
        let sequence = cap.frame_count;
        cap.frame_count = cap.frame_count.wrapping_add(1);
        cap.queue.stamp(buf.index, sequence, Utc::now());
        cap.queue.buffer_done(buf.index, BufferState::Done);
        debug!(
            index = buf.index,
            slot,
            hw_slot = hw.frame_index(),
            sequence,
            "Frame captured"
        );
    }

    if state.capture_flags().contains(CaptureFlags::SHUT) {
        state.clear_capture(CaptureFlags::SHUT);
        return true;
    }

    if let Some(buf) = cap.pending.pop_front() {
        match cap.active.push(buf) {
            Ok(slot) => {
                hw.set_output_addr(&buf.paddr, OutputSlot::Slot(slot));
                cap.queue.mark_active(buf.index);
                debug!(index = buf.index, slot, "Buffer programmed");
            }
            Err(buf) => {
                warn!(index = buf.index, "No free output slot");
                cap.pending.push_front(buf);
            }
        }
    }

    if cap.active.is_empty() {
        state.clear_capture(CaptureFlags::RUN);
        cap.active.skip();
    } else {
        state.set_capture(CaptureFlags::RUN);
    }
    false
}

/// Hand buffer `index` of the capture queue to the driver
pub(crate) fn buf_queue(shared: &mut DeviceShared, index: usize) -> FimcResult<()> {
    let DeviceShared {
        state,
        hw,
        capture,
        ..
    } = shared;
    let cap = capture
        .as_mut()
        .ok_or_else(|| FimcError::NoDevice("no capture path".to_string()))?;

    let planes = cap.queue.buffer(index)?.plane_addrs();
    let paddr = cap.ctx.state().d_frame.prepare_addr(&planes)?;
    let buf = CaptureBuffer { index, paddr };

    if !state.capture_flags().contains(CaptureFlags::STREAM) && !cap.active.is_full() {
        let slot = if cap.reqbufs_count == 1 {
            OutputSlot::All
        } else {
            OutputSlot::Slot(cap.active.cursor())
        };
        if cap.active.push(buf).is_ok() {
            hw.set_output_addr(&paddr, slot);
            cap.queue.mark_active(index);
            debug!(index, ?slot, "Buffer programmed directly");
        }
    } else {
        cap.pending.push_back(buf);
        debug!(index, pending = cap.pending.len(), "Buffer pending");
    }

    let min_bufs = if cap.reqbufs_count > 1 { 2 } else { 1 };
    if cap.queue.is_streaming()
        && cap.active.len() >= min_bufs
        && !state.capture_flags().contains(CaptureFlags::STREAM)
    {
        hw.activate_capture();
        state.set_capture(CaptureFlags::STREAM);
        info!(active = cap.active.len(), "Capture activated");
    }
    Ok(())
}

fn program_capture(hw: &mut dyn FimcHardware, ctx: &mut ContextState) -> FimcResult<()> {
    hw.set_camera_source(ctx);
    let scaler = *ctx.prepare_scaler()?;
    hw.set_prescaler(&scaler);
    hw.set_main_scaler(&scaler);
    hw.set_target_format(ctx);
    hw.set_rotation(ctx.rotation, ctx.flip);
    hw.set_effect();
    hw.set_output_path(ctx);
    hw.set_out_dma(ctx);
    ctx.dirty.remove(DirtyFlags::PARAMS);
    Ok(())
}

/// Start the sensor and configure the hardware for capture
pub(crate) fn start_streaming(shared: &mut DeviceShared) -> FimcResult<()> {
    let DeviceShared {
        state,
        hw,
        sensor,
        capture,
    } = shared;
    let cap = capture
        .as_mut()
        .ok_or_else(|| FimcError::NoDevice("no capture path".to_string()))?;

    if let Some(sensor) = sensor.as_mut() {
        sensor.s_stream(true)?;
    }

    let ctx = Arc::clone(&cap.ctx);
    let programmed = {
        let mut cstate = ctx.state();
        cstate.dirty |= DirtyFlags::PARAMS;
        cstate
            .prepare_config(ctx.variant(), None, None)
            .and_then(|()| {
                hw.reset();
                program_capture(hw.as_mut(), &mut cstate)
            })
    };
    if let Err(err) = programmed {
        warn!(error = %err, "Capture setup failed");
        if let Some(sensor) = sensor.as_mut()
            && let Err(err) = sensor.s_stream(false)
        {
            warn!(error = %err, "Sensor stream off failed");
        }
        return Err(err);
    }

    cap.reset();
    state.set_capture(CaptureFlags::PENDING);
    info!(slots = cap.active.capacity(), "Capture started");
    Ok(())
}

/// Stop capture after the current frame and return all driver buffers
pub(crate) fn stop_capture(dev: &Device) -> FimcResult<()> {
    {
        let mut shared = dev.lock_shared();
        if !shared.state.capture_active() {
            return Ok(());
        }
        shared.state.set_capture(CaptureFlags::SHUT);
        shared.hw.deactivate_capture();
    }

    let timeout = dev.config().shutdown_timeout();
    let acked = dev.wait().wait_timeout(timeout, || {
        !dev
            .lock_shared()
            .state
            .capture_flags()
            .contains(CaptureFlags::SHUT)
    });
    if !acked {
        warn!(?timeout, "No frame end after stop request");
    }

    let mut shared = dev.lock_shared();
    let DeviceShared {
        state,
        sensor,
        capture,
        ..
    } = &mut *shared;
    if let Some(sensor) = sensor.as_mut()
        && let Err(err) = sensor.s_stream(false)
    {
        warn!(error = %err, "Sensor stream off failed");
    }
    state.clear_capture(CaptureFlags::all());
    if let Some(cap) = capture.as_mut() {
        cap.return_buffers(BufferState::Error);
    }
    info!("Capture stopped");
    Ok(())
}

/// Capture cannot be parked mid-stream
pub(crate) fn suspend(shared: &DeviceShared) -> FimcResult<()> {
    if shared.state.capture_busy() {
        return Err(FimcError::Busy("capture streaming".to_string()));
    }
    Ok(())
}

/// Reprogram the hardware after a power transition lost its registers
pub(crate) fn resume(shared: &mut DeviceShared) -> FimcResult<()> {
    let DeviceShared {
        state,
        hw,
        capture,
        ..
    } = shared;
    let Some(cap) = capture.as_mut() else {
        return Ok(());
    };
    if !state.capture_busy() {
        return Ok(());
    }

    let ctx = Arc::clone(&cap.ctx);
    program_capture(hw.as_mut(), &mut ctx.state())?;
    for (slot, buf) in cap.active.iter() {
        hw.set_output_addr(&buf.paddr, OutputSlot::Slot(*slot));
    }
    if state.capture_flags().contains(CaptureFlags::STREAM) {
        hw.activate_capture();
    }
    info!(active = cap.active.len(), "Capture resumed");
    Ok(())
}

/// Request the capture size from the sensor and follow its bus format
pub(crate) fn sync_sensor_format(shared: &mut DeviceShared) -> FimcResult<()> {
    let DeviceShared {
        sensor, capture, ..
    } = shared;
    let cap = capture
        .as_ref()
        .ok_or_else(|| FimcError::NoDevice("no capture path".to_string()))?;
    let sensor = sensor
        .as_mut()
        .ok_or_else(|| FimcError::NoDevice("no sensor attached".to_string()))?;

    let size = {
        let state = cap.ctx.state();
        Size::new(state.d_frame.o_width, state.d_frame.o_height)
    };
    let previous = sensor.mbus_format();
    let applied = sensor.set_mbus_format(MbusFormat {
        code: previous.code,
        size,
    })?;
    let Some(fmt) = find_mbus_format(applied.code, FormatFlags::CAM) else {
        if let Err(err) = sensor.set_mbus_format(previous) {
            warn!(error = %err, "Sensor format restore failed");
        }
        return Err(FimcError::InvalidArgument(format!(
            "sensor bus code {:#x} not supported",
            applied.code
        )));
    };
    cap.ctx.set_source_format(fmt, applied.size);
    debug!(sensor = sensor.name(), size = %applied.size, fourcc = %fmt.fourcc, "Source follows sensor");
    Ok(())
}
