// SPDX-License-Identifier: GPL-3.0-only

//! Camera capture video node

use super::{CAP_VIDEO_CAPTURE_MPLANE, Capability, FormatDesc, buf_payload, enum_fmt, queue_setup};
use crate::context::{Context, ControlId, PixFormatMplane, QueryControl};
use crate::device::Device;
use crate::errors::{FimcError, FimcResult};
use crate::media::types::Rect;
use crate::pipelines::capture::{self, CaptureState};
use crate::queue::{BufType, VideoBuffer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const BUF_TYPE: BufType = BufType::VideoCaptureMplane;

/// An open handle on the capture node
pub struct CaptureHandle {
    device: Arc<Device>,
    ctx: Arc<Context>,
}

fn capture_path(cap: Option<&mut CaptureState>) -> FimcResult<&mut CaptureState> {
    cap.ok_or_else(|| FimcError::NoDevice("no capture path".to_string()))
}

impl CaptureHandle {
    /// Open the capture node; refused while transform contexts are in use
    pub fn open(device: &Arc<Device>) -> FimcResult<Self> {
        device.ensure_attached()?;
        let ctx = device
            .capture_ctx()
            .cloned()
            .ok_or_else(|| FimcError::NoDevice("no sensor attached".to_string()))?;

        {
            let mut shared = device.lock_shared();
            if shared.state.m2m_active() {
                warn!(users = shared.state.m2m_users(), "Capture node busy");
                return Err(FimcError::Busy("transform in use".to_string()));
            }
            capture_path(shared.capture.as_mut())?.add_user();
        }

        if let Err(err) = device.pm_get() {
            if let Some(cap) = device.lock_shared().capture.as_mut() {
                cap.remove_user();
            }
            return Err(err);
        }
        info!(ctx = ctx.id(), "Capture node opened");
        Ok(Self {
            device: Arc::clone(device),
            ctx,
        })
    }

    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn querycap(&self) -> Capability {
        Capability::new(self.device.id(), "capture", CAP_VIDEO_CAPTURE_MPLANE)
    }

    pub fn enum_fmt(&self, index: usize) -> FimcResult<FormatDesc> {
        enum_fmt(BUF_TYPE, index)
    }

    pub fn get_format(&self) -> FimcResult<PixFormatMplane> {
        self.ctx.get_format(BUF_TYPE)
    }

    pub fn try_format(&self, pix: &PixFormatMplane) -> FimcResult<PixFormatMplane> {
        self.ctx.try_format(BUF_TYPE, pix)
    }

    /// Set the capture format and make the sensor follow it
    pub fn set_format(&self, pix: &PixFormatMplane) -> FimcResult<PixFormatMplane> {
        let adjusted = self.ctx.try_format(BUF_TYPE, pix)?;
        let mut shared = self.device.lock_shared();
        let busy = shared.state.capture_active()
            || capture_path(shared.capture.as_mut())?.queue().is_busy();
        if busy {
            warn!("Capture format change while busy");
            return Err(FimcError::Busy("capture queue busy".to_string()));
        }

        let saved = self.ctx.state().clone();
        let out = self.ctx.set_format(BUF_TYPE, &adjusted)?;
        if let Err(err) = capture::sync_sensor_format(&mut shared) {
            *self.ctx.state() = saved;
            warn!(error = %err, "Sensor rejected capture format");
            return Err(err);
        }
        Ok(out)
    }

    pub fn reqbufs(&self, count: usize) -> FimcResult<usize> {
        let mut shared = self.device.lock_shared();
        if shared.state.capture_active() {
            return Err(FimcError::Busy("capture active".to_string()));
        }
        let sizes = if count > 0 {
            let state = self.ctx.state();
            queue_setup(&state.d_frame, state.dst_fmt_set)?
        } else {
            Vec::new()
        };

        let cap = capture_path(shared.capture.as_mut())?;
        let allocated = cap.queue.reqbufs(count, &sizes, &mut self.device.dma())?;
        cap.set_reqbufs_count(allocated);
        debug!(allocated, "Capture buffers requested");
        Ok(allocated)
    }

    pub fn querybuf(&self, index: usize) -> FimcResult<VideoBuffer> {
        let mut shared = self.device.lock_shared();
        capture_path(shared.capture.as_mut())?.queue.querybuf(index)
    }

    pub fn qbuf(&self, index: usize) -> FimcResult<()> {
        let payload = buf_payload(&self.ctx.state().d_frame);
        let mut shared = self.device.lock_shared();
        let handed = capture_path(shared.capture.as_mut())?
            .queue
            .qbuf(index, &payload)?;
        if let Some(index) = handed {
            capture::buf_queue(&mut shared, index)?;
        }
        Ok(())
    }

    /// Take a captured buffer; `Retry` when none is ready yet
    pub fn dqbuf(&self) -> FimcResult<VideoBuffer> {
        let mut shared = self.device.lock_shared();
        capture_path(shared.capture.as_mut())?.queue.dqbuf()
    }

    /// Wait up to `timeout` for a captured buffer
    pub fn dqbuf_timeout(&self, timeout: Duration) -> FimcResult<VideoBuffer> {
        self.device.wait().wait_timeout(timeout, || {
            self.device
                .lock_shared()
                .capture
                .as_ref()
                .is_none_or(|c| c.queue().done_len() > 0 || !c.queue().is_streaming())
        });
        self.dqbuf()
    }

    /// Start the sensor and hand queued buffers to the hardware
    pub fn streamon(&self) -> FimcResult<()> {
        self.device.ensure_attached()?;
        let mut shared = self.device.lock_shared();
        {
            let cap = capture_path(shared.capture.as_mut())?;
            if cap.queue.is_streaming() {
                return Err(FimcError::Busy("capture already streaming".to_string()));
            }
            if cap.queue.num_buffers() == 0 {
                return Err(FimcError::InvalidArgument("no buffers allocated".to_string()));
            }
        }

        capture::start_streaming(&mut shared)?;
        let queued = capture_path(shared.capture.as_mut())?.queue.streamon()?;
        for index in queued {
            capture::buf_queue(&mut shared, index)?;
        }
        info!("Capture stream on");
        Ok(())
    }

    /// Stop capture and return every buffer
    pub fn streamoff(&self) -> FimcResult<()> {
        {
            let mut shared = self.device.lock_shared();
            if !capture_path(shared.capture.as_mut())?.queue.is_streaming() {
                return Err(FimcError::InvalidArgument(
                    "capture not streaming".to_string(),
                ));
            }
        }

        capture::stop_capture(&self.device)?;
        let mut shared = self.device.lock_shared();
        let cancelled = capture_path(shared.capture.as_mut())?.queue.streamoff()?;
        info!(cancelled = cancelled.len(), "Capture stream off");
        Ok(())
    }

    pub fn query_control(&self, id: ControlId) -> QueryControl {
        self.ctx.query_control(id)
    }

    pub fn get_control(&self, id: ControlId) -> i32 {
        self.ctx.get_control(id)
    }

    pub fn set_control(&self, id: ControlId, value: i32) -> FimcResult<()> {
        if self.device.lock_shared().state.capture_active() {
            return Err(FimcError::Busy("capture active".to_string()));
        }
        self.ctx.set_control(id, value)
    }

    pub fn crop_cap(&self) -> FimcResult<(Rect, Rect)> {
        self.ctx.crop_cap(BUF_TYPE)
    }

    pub fn get_crop(&self) -> FimcResult<Rect> {
        self.ctx.get_crop(BUF_TYPE)
    }

    /// Crop the camera input
    pub fn set_crop(&self, rect: Rect) -> FimcResult<Rect> {
        if self.device.lock_shared().state.capture_active() {
            return Err(FimcError::Busy("capture active".to_string()));
        }
        self.ctx.set_crop(BUF_TYPE, rect)
    }
}

impl Drop for CaptureHandle {
    fn drop(&mut self) {
        let streaming = self
            .device
            .lock_shared()
            .capture
            .as_ref()
            .is_some_and(|c| c.queue().is_streaming());
        if streaming && let Err(err) = self.streamoff() {
            warn!(error = %err, "Stream off at close failed");
        }

        {
            let mut shared = self.device.lock_shared();
            if let Some(cap) = shared.capture.as_mut()
                && cap.remove_user() == 0
            {
                cap.queue.release(&mut self.device.dma());
            }
        }
        self.device.pm_put();
        info!(ctx = self.ctx.id(), "Capture node closed");
    }
}
