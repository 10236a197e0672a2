// SPDX-License-Identifier: GPL-3.0-only

//! Buffer queue bridge
//!
//! A [`VideoQueue`] is the generic per-direction DMA buffer queue the video
//! nodes are built on: it owns the buffers and their DMA memory, tracks
//! which side (application, driver or hardware) holds each buffer, and
//! collects finished buffers for dequeueing. The driver-specific parts
//! (plane sizes, payloads, what "enqueue in driver" means) are supplied by
//! the caller.
//!
//! - [`dma`]: contiguous bus-address allocator backing the buffers
//! - [`ring`]: slot ring used for the capture active list

pub mod dma;
pub mod ring;

pub use dma::{DmaAllocator, DmaBuffer};
pub use ring::SlotRing;

use crate::errors::{FimcError, FimcResult};
use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use tracing::{debug, warn};

/// Maximum buffers per queue
pub const VIDEO_MAX_FRAME: usize = 32;

/// Queue direction, using the multi-planar V4L2 buffer type numbering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BufType {
    /// Frames produced by the device (transform destination / camera frames)
    VideoCaptureMplane,
    /// Frames consumed by the device (transform source)
    VideoOutputMplane,
}

impl BufType {
    pub const CAPTURE_MPLANE_RAW: u32 = 9;
    pub const OUTPUT_MPLANE_RAW: u32 = 10;

    /// Map a raw buffer type, rejecting everything but the two mplane types
    pub fn from_raw(raw: u32) -> FimcResult<Self> {
        match raw {
            Self::CAPTURE_MPLANE_RAW => Ok(Self::VideoCaptureMplane),
            Self::OUTPUT_MPLANE_RAW => Ok(Self::VideoOutputMplane),
            other => Err(FimcError::InvalidArgument(format!(
                "unsupported buffer type {}",
                other
            ))),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::VideoCaptureMplane => Self::CAPTURE_MPLANE_RAW,
            Self::VideoOutputMplane => Self::OUTPUT_MPLANE_RAW,
        }
    }

    pub fn is_output(&self) -> bool {
        matches!(self, Self::VideoOutputMplane)
    }
}

/// Ownership / completion state of a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BufferState {
    /// Owned by the application
    #[default]
    Dequeued,
    /// Queued by the application, waiting in the queue or the driver
    Queued,
    /// Programmed into the hardware
    Active,
    /// Filled successfully, waiting to be dequeued
    Done,
    /// Returned with an error, waiting to be dequeued
    Error,
}

/// A buffer and its DMA planes
#[derive(Debug, Clone)]
pub struct VideoBuffer {
    pub index: usize,
    pub planes: Vec<DmaBuffer>,
    /// Bytes used per plane
    pub payload: Vec<u64>,
    pub state: BufferState,
    pub sequence: u32,
    pub timestamp: Option<DateTime<Utc>>,
}

impl VideoBuffer {
    /// Bus address of plane `plane`
    pub fn plane_addr(&self, plane: usize) -> Option<u64> {
        self.planes.get(plane).map(|p| p.addr)
    }

    pub fn plane_addrs(&self) -> Vec<u64> {
        self.planes.iter().map(|p| p.addr).collect()
    }
}

/// One direction's buffer queue
#[derive(Debug)]
pub struct VideoQueue {
    buf_type: BufType,
    buffers: Vec<VideoBuffer>,
    /// Queued before streaming started, not yet handed to the driver
    queued: VecDeque<usize>,
    /// Handed to the driver, in submission order
    ready: VecDeque<usize>,
    /// Completed, waiting for dequeue
    done: VecDeque<usize>,
    streaming: bool,
}

impl VideoQueue {
    pub fn new(buf_type: BufType) -> Self {
        Self {
            buf_type,
            buffers: Vec::new(),
            queued: VecDeque::new(),
            ready: VecDeque::new(),
            done: VecDeque::new(),
            streaming: false,
        }
    }

    pub fn buf_type(&self) -> BufType {
        self.buf_type
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }

    /// Buffers are allocated; format changes are refused
    pub fn is_busy(&self) -> bool {
        !self.buffers.is_empty()
    }

    pub fn num_buffers(&self) -> usize {
        self.buffers.len()
    }

    /// Allocate `count` buffers with the given per-plane sizes
    ///
    /// Existing buffers are released first; `count == 0` just frees. Returns
    /// the number actually allocated, which may be lower than requested when
    /// the DMA pool runs short.
    pub fn reqbufs(
        &mut self,
        count: usize,
        plane_sizes: &[u64],
        dma: &mut DmaAllocator,
    ) -> FimcResult<usize> {
        if self.streaming {
            return Err(FimcError::Busy(format!(
                "{:?} queue is streaming",
                self.buf_type
            )));
        }
        self.release(dma);
        if count == 0 {
            return Ok(0);
        }
        if plane_sizes.is_empty() {
            return Err(FimcError::InvalidArgument("no planes to allocate".to_string()));
        }

        let count = count.min(VIDEO_MAX_FRAME);
        for index in 0..count {
            let mut planes = Vec::with_capacity(plane_sizes.len());
            let mut failed = None;
            for &size in plane_sizes {
                match dma.alloc(size) {
                    Ok(buf) => planes.push(buf),
                    Err(e) => {
                        failed = Some(e);
                        break;
                    }
                }
            }
            if let Some(err) = failed {
                for buf in planes {
                    dma.free(buf);
                }
                if index == 0 {
                    return Err(err);
                }
                warn!(requested = count, allocated = index, "Short buffer allocation");
                break;
            }
            self.buffers.push(VideoBuffer {
                index,
                planes,
                payload: vec![0; plane_sizes.len()],
                state: BufferState::Dequeued,
                sequence: 0,
                timestamp: None,
            });
        }
        debug!(buf_type = ?self.buf_type, count = self.buffers.len(), "Buffers allocated");
        Ok(self.buffers.len())
    }

    /// Free all buffers and their DMA memory
    pub fn release(&mut self, dma: &mut DmaAllocator) {
        for buf in self.buffers.drain(..) {
            for plane in buf.planes {
                dma.free(plane);
            }
        }
        self.queued.clear();
        self.ready.clear();
        self.done.clear();
    }

    pub fn buffer(&self, index: usize) -> FimcResult<&VideoBuffer> {
        self.buffers
            .get(index)
            .ok_or_else(|| FimcError::InvalidArgument(format!("buffer index {} out of range", index)))
    }

    fn buffer_mut(&mut self, index: usize) -> FimcResult<&mut VideoBuffer> {
        self.buffers
            .get_mut(index)
            .ok_or_else(|| FimcError::InvalidArgument(format!("buffer index {} out of range", index)))
    }

    pub fn querybuf(&self, index: usize) -> FimcResult<VideoBuffer> {
        self.buffer(index).cloned()
    }

    /// Queue buffer `index` with the prepared per-plane payload
    ///
    /// Returns `Some(index)` when the buffer must be handed to the driver
    /// right away (queue streaming), `None` when it waits for stream on.
    pub fn qbuf(&mut self, index: usize, payload: &[u64]) -> FimcResult<Option<usize>> {
        let streaming = self.streaming;
        let buf = self.buffer_mut(index)?;
        if buf.state != BufferState::Dequeued {
            return Err(FimcError::InvalidArgument(format!(
                "buffer {} already queued ({:?})",
                index, buf.state
            )));
        }
        for (plane, (&used, dma)) in payload.iter().zip(buf.planes.iter()).enumerate() {
            if used > dma.len {
                return Err(FimcError::InvalidArgument(format!(
                    "payload {} exceeds plane {} size {}",
                    used, plane, dma.len
                )));
            }
        }
        buf.payload = payload.to_vec();
        buf.state = BufferState::Queued;
        buf.timestamp = None;

        if streaming {
            Ok(Some(index))
        } else {
            self.queued.push_back(index);
            Ok(None)
        }
    }

    /// Take the next completed buffer
    pub fn dqbuf(&mut self) -> FimcResult<VideoBuffer> {
        match self.done.pop_front() {
            Some(index) => {
                let buf = self.buffer_mut(index)?;
                let out = buf.clone();
                buf.state = BufferState::Dequeued;
                Ok(out)
            }
            None if !self.streaming => Err(FimcError::InvalidArgument(format!(
                "{:?} queue not streaming",
                self.buf_type
            ))),
            None => Err(FimcError::Retry("no buffer ready".to_string())),
        }
    }

    /// Start streaming, returning buffers queued earlier for the driver
    pub fn streamon(&mut self) -> FimcResult<Vec<usize>> {
        if self.streaming {
            return Err(FimcError::Busy(format!(
                "{:?} queue already streaming",
                self.buf_type
            )));
        }
        if self.buffers.is_empty() {
            return Err(FimcError::InvalidArgument("no buffers allocated".to_string()));
        }
        self.streaming = true;
        Ok(self.queued.drain(..).collect())
    }

    /// Stop streaming and give every buffer back to the application
    ///
    /// Returns the indices of buffers the queue, driver or hardware still
    /// owned; those are cancelled.
    pub fn streamoff(&mut self) -> FimcResult<Vec<usize>> {
        if !self.streaming {
            return Err(FimcError::InvalidArgument(format!(
                "{:?} queue not streaming",
                self.buf_type
            )));
        }
        self.streaming = false;

        let mut cancelled = Vec::new();
        for buf in self.buffers.iter_mut() {
            if matches!(buf.state, BufferState::Queued | BufferState::Active) {
                cancelled.push(buf.index);
            }
            buf.state = BufferState::Dequeued;
        }
        self.queued.clear();
        self.ready.clear();
        self.done.clear();
        if !cancelled.is_empty() {
            debug!(buf_type = ?self.buf_type, cancelled = cancelled.len(), "Cancelled buffers");
        }
        Ok(cancelled)
    }

    /// Driver-side list: append a buffer handed over by the queue
    pub fn push_ready(&mut self, index: usize) {
        self.ready.push_back(index);
    }

    /// Driver-side list: oldest buffer handed over
    pub fn ready_front(&self) -> Option<&VideoBuffer> {
        self.ready.front().and_then(|&i| self.buffers.get(i))
    }

    /// Driver-side list: remove the oldest buffer handed over
    pub fn pop_ready(&mut self) -> Option<usize> {
        self.ready.pop_front()
    }

    pub fn ready_len(&self) -> usize {
        self.ready.len()
    }

    /// Mark a buffer as owned by the hardware
    pub fn mark_active(&mut self, index: usize) {
        if let Some(buf) = self.buffers.get_mut(index) {
            buf.state = BufferState::Active;
        }
    }

    /// Record capture metadata on a buffer
    pub fn stamp(&mut self, index: usize, sequence: u32, timestamp: DateTime<Utc>) {
        if let Some(buf) = self.buffers.get_mut(index) {
            buf.sequence = sequence;
            buf.timestamp = Some(timestamp);
        }
    }

    /// Hand a buffer back as finished with `state` (`Done` or `Error`)
    pub fn buffer_done(&mut self, index: usize, state: BufferState) {
        let Some(buf) = self.buffers.get_mut(index) else {
            warn!(index, "Completing unknown buffer");
            return;
        };
        if !matches!(buf.state, BufferState::Queued | BufferState::Active) {
            warn!(index, state = ?buf.state, "Completing buffer not owned by the driver");
            return;
        }
        buf.state = if state == BufferState::Error {
            BufferState::Error
        } else {
            BufferState::Done
        };
        self.done.push_back(index);
    }

    pub fn done_len(&self) -> usize {
        self.done.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue_with(count: usize) -> (VideoQueue, DmaAllocator) {
        let mut dma = DmaAllocator::new(0x5000_0000, 1 << 24);
        let mut q = VideoQueue::new(BufType::VideoOutputMplane);
        assert_eq!(q.reqbufs(count, &[153_600], &mut dma).unwrap(), count);
        (q, dma)
    }

    #[test]
    fn test_buf_type_from_raw() {
        assert_eq!(BufType::from_raw(9).unwrap(), BufType::VideoCaptureMplane);
        assert_eq!(BufType::from_raw(10).unwrap(), BufType::VideoOutputMplane);
        assert!(BufType::from_raw(1).is_err());
    }

    #[test]
    fn test_qbuf_before_and_after_streamon() {
        let (mut q, _dma) = queue_with(3);
        assert_eq!(q.qbuf(0, &[100]).unwrap(), None);
        assert_eq!(q.streamon().unwrap(), vec![0]);
        assert_eq!(q.qbuf(1, &[100]).unwrap(), Some(1));
        assert!(q.qbuf(1, &[100]).is_err());
    }

    #[test]
    fn test_done_and_dqbuf() {
        let (mut q, _dma) = queue_with(2);
        q.streamon().unwrap();
        let idx = q.qbuf(0, &[10]).unwrap().unwrap();
        q.push_ready(idx);
        assert!(matches!(q.dqbuf(), Err(FimcError::Retry(_))));
        let idx = q.pop_ready().unwrap();
        q.buffer_done(idx, BufferState::Done);
        let buf = q.dqbuf().unwrap();
        assert_eq!(buf.state, BufferState::Done);
        assert_eq!(q.buffer(0).unwrap().state, BufferState::Dequeued);
    }

    #[test]
    fn test_streamoff_cancels_owned_buffers() {
        let (mut q, _dma) = queue_with(3);
        q.streamon().unwrap();
        q.qbuf(0, &[10]).unwrap();
        q.qbuf(2, &[10]).unwrap();
        q.mark_active(2);
        assert_eq!(q.streamoff().unwrap(), vec![0, 2]);
        assert!(q.buffers.iter().all(|b| b.state == BufferState::Dequeued));
        assert!(q.streamoff().is_err());
    }

    #[test]
    fn test_payload_larger_than_plane_rejected() {
        let (mut q, _dma) = queue_with(1);
        assert!(q.qbuf(0, &[1 << 30]).is_err());
    }

    #[test]
    fn test_reqbufs_refused_while_streaming() {
        let (mut q, mut dma) = queue_with(1);
        q.streamon().unwrap();
        assert!(matches!(q.reqbufs(2, &[10], &mut dma), Err(FimcError::Busy(_))));
    }
}
