// SPDX-License-Identifier: GPL-3.0-only

//! Memory-to-memory video node

use super::{CAP_VIDEO_M2M_MPLANE, Capability, FormatDesc, buf_payload, enum_fmt, queue_setup};
use crate::context::{Context, ContextMode, ControlId, PixFormatMplane, QueryControl};
use crate::device::Device;
use crate::errors::{FimcError, FimcResult};
use crate::media::types::Rect;
use crate::pipelines::m2m;
use crate::queue::{BufType, VideoBuffer};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// An open transform context
pub struct M2mHandle {
    device: Arc<Device>,
    ctx: Arc<Context>,
}

impl M2mHandle {
    /// Open the transform node; refused while the camera path is in use
    pub fn open(device: &Arc<Device>) -> FimcResult<Self> {
        device.ensure_attached()?;
        {
            let mut shared = device.lock_shared();
            let capture_users = shared.capture.as_ref().map_or(0, |c| c.users());
            if capture_users > 0 || shared.state.capture_busy() {
                warn!(capture_users, "Transform node busy");
                return Err(FimcError::Busy("capture in use".to_string()));
            }
            shared.state.add_m2m_user();
        }

        let ctx = Arc::new(Context::new(
            ContextMode::M2m,
            device.id(),
            *device.variant(),
        ));
        info!(ctx = ctx.id(), "Transform context opened");
        Ok(Self {
            device: Arc::clone(device),
            ctx,
        })
    }

    pub fn ctx(&self) -> &Arc<Context> {
        &self.ctx
    }

    pub fn device(&self) -> &Arc<Device> {
        &self.device
    }

    pub fn querycap(&self) -> Capability {
        Capability::new(self.device.id(), "m2m", CAP_VIDEO_M2M_MPLANE)
    }

    pub fn enum_fmt(&self, buf_type: BufType, index: usize) -> FimcResult<FormatDesc> {
        enum_fmt(buf_type, index)
    }

    pub fn get_format(&self, buf_type: BufType) -> FimcResult<PixFormatMplane> {
        self.ctx.get_format(buf_type)
    }

    pub fn try_format(&self, buf_type: BufType, pix: &PixFormatMplane) -> FimcResult<PixFormatMplane> {
        self.ctx.try_format(buf_type, pix)
    }

    pub fn set_format(&self, buf_type: BufType, pix: &PixFormatMplane) -> FimcResult<PixFormatMplane> {
        self.ctx.set_format(buf_type, pix)
    }

    /// Allocate `count` buffers sized for the negotiated format
    pub fn reqbufs(&self, buf_type: BufType, count: usize) -> FimcResult<usize> {
        let sizes = if count > 0 {
            let state = self.ctx.state();
            let negotiated = if buf_type.is_output() {
                state.src_fmt_set
            } else {
                state.dst_fmt_set
            };
            queue_setup(state.frame(buf_type, false)?, negotiated)?
        } else {
            Vec::new()
        };

        let mut queues = self.ctx.queues()?;
        let allocated = queues
            .get_mut(buf_type)
            .reqbufs(count, &sizes, &mut self.device.dma())?;
        debug!(ctx = self.ctx.id(), buf_type = ?buf_type, allocated, "Buffers requested");
        Ok(allocated)
    }

    pub fn querybuf(&self, buf_type: BufType, index: usize) -> FimcResult<VideoBuffer> {
        self.ctx.queues()?.get(buf_type).querybuf(index)
    }

    /// Queue a buffer; a streaming context may become runnable
    pub fn qbuf(&self, buf_type: BufType, index: usize) -> FimcResult<()> {
        let payload = buf_payload(self.ctx.state().frame(buf_type, false)?);
        {
            let mut queues = self.ctx.queues()?;
            let queue = queues.get_mut(buf_type);
            if let Some(index) = queue.qbuf(index, &payload)? {
                queue.push_ready(index);
            }
        }
        self.device.scheduler().try_schedule(&self.ctx, &*self.device);
        Ok(())
    }

    /// Take a finished buffer; `Retry` when none is ready yet
    pub fn dqbuf(&self, buf_type: BufType) -> FimcResult<VideoBuffer> {
        self.ctx.queues()?.get_mut(buf_type).dqbuf()
    }

    /// Wait up to `timeout` for a finished buffer
    pub fn dqbuf_timeout(&self, buf_type: BufType, timeout: Duration) -> FimcResult<VideoBuffer> {
        self.device.wait().wait_timeout(timeout, || {
            self.ctx
                .queues()
                .map(|q| q.get(buf_type).done_len() > 0 || !q.get(buf_type).is_streaming())
                .unwrap_or(true)
        });
        self.dqbuf(buf_type)
    }

    /// Start streaming one direction; its format must be negotiated
    pub fn streamon(&self, buf_type: BufType) -> FimcResult<()> {
        {
            let state = self.ctx.state();
            let negotiated = if buf_type.is_output() {
                state.src_fmt_set
            } else {
                state.dst_fmt_set
            };
            if !negotiated {
                return Err(FimcError::InvalidArgument(format!(
                    "{:?} format not set",
                    buf_type
                )));
            }
        }

        self.device.pm_get()?;
        let started = {
            let mut queues = self.ctx.queues()?;
            let queue = queues.get_mut(buf_type);
            queue.streamon().map(|queued| {
                for index in queued {
                    queue.push_ready(index);
                }
            })
        };
        if let Err(err) = started {
            self.device.pm_put();
            return Err(err);
        }

        info!(ctx = self.ctx.id(), buf_type = ?buf_type, "Stream on");
        self.device.scheduler().try_schedule(&self.ctx, &*self.device);
        Ok(())
    }

    /// Stop one direction, draining the running job first
    pub fn streamoff(&self, buf_type: BufType) -> FimcResult<()> {
        if !self.ctx.queues()?.get(buf_type).is_streaming() {
            return Err(FimcError::InvalidArgument(format!(
                "{:?} queue not streaming",
                buf_type
            )));
        }

        // A queued job must not start between the drain and the queue stop
        self.device.scheduler().remove(&self.ctx);
        m2m::stop_streaming(&self.device, &self.ctx);
        self.device.pm_put();
        let cancelled = self.ctx.queues()?.get_mut(buf_type).streamoff()?;
        self.device.scheduler().remove(&self.ctx);
        info!(ctx = self.ctx.id(), buf_type = ?buf_type, cancelled = cancelled.len(), "Stream off");
        Ok(())
    }

    pub fn query_control(&self, id: ControlId) -> QueryControl {
        self.ctx.query_control(id)
    }

    pub fn get_control(&self, id: ControlId) -> i32 {
        self.ctx.get_control(id)
    }

    pub fn set_control(&self, id: ControlId, value: i32) -> FimcResult<()> {
        self.ctx.set_control(id, value)
    }

    pub fn crop_cap(&self, buf_type: BufType) -> FimcResult<(Rect, Rect)> {
        self.ctx.crop_cap(buf_type)
    }

    pub fn get_crop(&self, buf_type: BufType) -> FimcResult<Rect> {
        self.ctx.get_crop(buf_type)
    }

    pub fn set_crop(&self, buf_type: BufType, rect: Rect) -> FimcResult<Rect> {
        self.ctx.set_crop(buf_type, rect)
    }
}

impl Drop for M2mHandle {
    fn drop(&mut self) {
        for buf_type in [BufType::VideoCaptureMplane, BufType::VideoOutputMplane] {
            let streaming = self
                .ctx
                .queues()
                .map(|q| q.get(buf_type).is_streaming())
                .unwrap_or(false);
            if streaming && let Err(err) = self.streamoff(buf_type) {
                warn!(ctx = self.ctx.id(), error = %err, "Stream off at close failed");
            }
        }

        self.device.scheduler().release(&self.ctx, &*self.device);

        if let Ok(mut queues) = self.ctx.queues() {
            let mut dma = self.device.dma();
            queues.src.release(&mut dma);
            queues.dst.release(&mut dma);
        }
        self.device.lock_shared().state.remove_m2m_user();
        info!(ctx = self.ctx.id(), "Transform context closed");
    }
}
