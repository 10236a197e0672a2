// SPDX-License-Identifier: GPL-3.0-only

//! Memory-to-memory transform engine
//!
//! The engine runs one job at a time on behalf of the [`M2mScheduler`]:
//! [`device_run`] programs the hardware for the context's oldest source and
//! destination buffers and kicks the transform, the interrupt path calls
//! [`job_finish`] when the hardware is done. Full register reprogramming only
//! happens when the context changed since the previous job or one of its
//! parameters was modified; otherwise only the buffer addresses are written.
//!
//! Shutdown and suspend are bounded waits on the device wait queue, woken by
//! the interrupt path once the in-flight transform completes.

pub mod scheduler;

pub use scheduler::{JobRunner, M2mScheduler};

use crate::context::{Context, ContextPhase, DirtyFlags};
use crate::device::{Device, DeviceShared, M2mPhase};
use crate::errors::{FimcError, FimcResult};
use crate::hardware::OutputSlot;
use crate::queue::{BufferState, VideoBuffer};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Program and start a transform for the oldest buffer pair of `ctx`
///
/// A job that cannot be set up is completed right away with error status
/// so the scheduler moves on.
pub(crate) fn device_run(dev: &Device, ctx: &Arc<Context>) {
    let mut shared = dev.lock_shared();
    shared.state.set_m2m_phase(M2mPhase::Pending);

    if let Err(err) = program_job(&mut shared, ctx) {
        warn!(ctx = ctx.id(), error = %err, "Transform setup failed");
        shared.state.set_m2m_phase(M2mPhase::Idle);
        drop(shared);
        job_finish(dev, ctx, BufferState::Error);
    }
}

fn program_job(shared: &mut DeviceShared, ctx: &Context) -> FimcResult<()> {
    let mut state = ctx.state();
    state.dirty |= DirtyFlags::SRC_ADDR | DirtyFlags::DST_ADDR;

    let (src, dst) = {
        let queues = ctx.queues()?;
        (
            queues.src.ready_front().map(VideoBuffer::plane_addrs),
            queues.dst.ready_front().map(VideoBuffer::plane_addrs),
        )
    };
    let (Some(src), Some(dst)) = (src, dst) else {
        return Err(FimcError::InvalidArgument(
            "no buffer pair ready".to_string(),
        ));
    };
    state.prepare_config(ctx.variant(), Some(&src), Some(&dst))?;

    // Registers hold another context's setup
    if shared.state.last_ctx() != Some(ctx.id()) {
        state.dirty |= DirtyFlags::PARAMS;
        shared.state.set_last_ctx(Some(ctx.id()));
    }
    let params = state.dirty.contains(DirtyFlags::PARAMS);
    debug!(ctx = ctx.id(), full = params, "Programming transform");

    let hw = &mut shared.hw;
    hw.set_input_addr(&state.s_frame.paddr);

    if params {
        hw.set_input_path(&state);
        hw.set_in_dma(&state);
        let scaler = *state.prepare_scaler()?;
        hw.set_prescaler(&scaler);
        hw.set_main_scaler(&scaler);
        hw.set_target_format(&state);
        hw.set_rotation(state.rotation, state.flip);
        hw.set_effect();
    }

    hw.set_output_path(&state);
    if state
        .dirty
        .intersects(DirtyFlags::DST_ADDR | DirtyFlags::PARAMS)
    {
        hw.set_output_addr(&state.d_frame.paddr, OutputSlot::All);
    }
    if params {
        hw.set_out_dma(&state);
    }

    hw.activate_capture();
    state.dirty = DirtyFlags::empty();
    hw.activate_input_dma(true);
    Ok(())
}

/// Retire the in-flight buffer pair of `ctx` and let the scheduler move on
///
/// Must be called without the device lock held.
pub(crate) fn job_finish(dev: &Device, ctx: &Arc<Context>, result: BufferState) {
    if !dev.scheduler().is_current(ctx) {
        warn!(ctx = ctx.id(), "No job running for context");
        return;
    }

    if let Ok(mut queues) = ctx.queues() {
        if let Some(index) = queues.src.pop_ready() {
            queues.src.buffer_done(index, result);
        }
        if let Some(index) = queues.dst.pop_ready() {
            queues.dst.buffer_done(index, result);
        }
    }
    debug!(ctx = ctx.id(), result = ?result, "Job completed");

    dev.wait().wake();
    dev.scheduler().job_finish(ctx, dev);
}

/// Wait for the in-flight job of `ctx` to complete
///
/// Returns at once when no job of this context is on the hardware.
/// `Timeout` leaves the job in flight; the caller must fail it with
/// [`abort_job`].
pub fn shutdown(dev: &Device, ctx: &Context) -> FimcResult<()> {
    {
        let shared = dev.lock_shared();
        if !shared.state.m2m_pending() || !dev.scheduler().is_current(ctx) {
            return Ok(());
        }
        ctx.state().phase = ContextPhase::ShutdownRequested;
    }
    debug!(ctx = ctx.id(), "Waiting for running job");

    let timeout = dev.config().shutdown_timeout();
    if dev
        .wait()
        .wait_timeout(timeout, || ctx.phase() == ContextPhase::Active)
    {
        return Ok(());
    }

    ctx.state().phase = ContextPhase::Active;
    warn!(ctx = ctx.id(), ?timeout, "Running job did not complete");
    Err(FimcError::Timeout(format!(
        "context {} job still running after {:?}",
        ctx.id(),
        timeout
    )))
}

/// Fail the in-flight job of `ctx` after a shutdown timeout
pub(crate) fn abort_job(dev: &Device, ctx: &Arc<Context>) {
    {
        let mut shared = dev.lock_shared();
        if shared.state.m2m_pending() && dev.scheduler().is_current(ctx) {
            shared.state.set_m2m_phase(M2mPhase::Idle);
        }
    }
    job_finish(dev, ctx, BufferState::Error);
}

/// Drain the running job of `ctx` before its queues stop
pub(crate) fn stop_streaming(dev: &Device, ctx: &Arc<Context>) {
    if let Err(err) = shutdown(dev, ctx) {
        warn!(ctx = ctx.id(), error = %err, "Failing running job");
        abort_job(dev, ctx);
    }
}

/// Ask the running transform to park the hardware for a power transition
///
/// `Retry` when the hardware did not acknowledge in time; the clock must
/// then stay on.
pub(crate) fn suspend(dev: &Device) -> FimcResult<()> {
    {
        let mut shared = dev.lock_shared();
        if !shared.state.m2m_pending() {
            return Ok(());
        }
        shared.state.set_m2m_phase(M2mPhase::Suspending);
    }

    let timeout = dev.config().shutdown_timeout();
    let acked = dev.wait().wait_timeout(timeout, || {
        dev.lock_shared().state.m2m_phase() == M2mPhase::Suspended
    });

    let mut shared = dev.lock_shared();
    match shared.state.m2m_phase() {
        M2mPhase::Suspending => {
            shared.state.set_m2m_phase(M2mPhase::Pending);
            warn!(?timeout, "Transform did not acknowledge suspend");
            Err(FimcError::Retry("transform still running".to_string()))
        }
        phase => {
            debug!(?phase, acked, "Transform suspended");
            Ok(())
        }
    }
}

/// Forget the programmed context and fail a job stalled by suspend
pub(crate) fn resume(dev: &Device) {
    let stalled = {
        let mut shared = dev.lock_shared();
        shared.state.set_last_ctx(None);
        if shared.state.m2m_phase() == M2mPhase::Suspended {
            shared.state.set_m2m_phase(M2mPhase::Idle);
            true
        } else {
            false
        }
    };

    if stalled && let Some(ctx) = dev.scheduler().current() {
        info!(ctx = ctx.id(), "Failing job stalled by suspend");
        job_finish(dev, &ctx, BufferState::Error);
    }
}
