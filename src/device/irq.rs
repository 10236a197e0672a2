// SPDX-License-Identifier: GPL-3.0-only

//! Interrupt dispatch
//!
//! The block has one completion interrupt shared by the transform engine
//! and the capture path. [`Device::handle_irq`] decides who it belongs to
//! from the device state; [`IrqWorker`] runs it for every event raised on
//! the device's [`IrqLine`](crate::hardware::IrqLine).

use super::{CaptureFlags, Device, M2mPhase};
use crate::context::ContextPhase;
use crate::errors::FimcResult;
use crate::hardware::IrqEvent;
use crate::pipelines::{capture, m2m};
use crate::queue::BufferState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// How often the worker checks its stop signal while idle
const POLL_INTERVAL: Duration = Duration::from_millis(20);

impl Device {
    /// Handle one completion interrupt
    pub fn handle_irq(&self) {
        let mut shared = self.lock_shared();
        shared.hw.clear_irq();

        if shared.state.m2m_pending() {
            if shared.state.m2m_phase() == M2mPhase::Suspending {
                shared.state.set_m2m_phase(M2mPhase::Suspended);
                drop(shared);
                debug!("Suspend acknowledged");
                self.wait().wake();
                return;
            }

            shared.state.set_m2m_phase(M2mPhase::Idle);
            let current = self.scheduler().current();
            drop(shared);

            let Some(ctx) = current else {
                warn!("Transform completed with no running context");
                return;
            };
            m2m::job_finish(self, &ctx, BufferState::Done);

            let acked = {
                let mut state = ctx.state();
                if state.phase == ContextPhase::ShutdownRequested {
                    state.phase = ContextPhase::Active;
                    true
                } else {
                    false
                }
            };
            if acked {
                debug!(ctx = ctx.id(), "Shutdown acknowledged");
                self.wait().wake();
            }
            return;
        }

        if shared.state.capture_flags().contains(CaptureFlags::PENDING) {
            let stopped = capture::capture_irq(&mut shared);
            if !stopped && shared.capture.as_ref().is_some_and(|c| c.active_len() == 1) {
                shared.hw.deactivate_capture();
                shared.state.clear_capture(CaptureFlags::STREAM);
                debug!("Last buffer in flight, capture deactivated");
            }
            drop(shared);
            self.wait().wake();
            return;
        }

        debug!("Spurious interrupt");
    }
}

/// Thread delivering interrupt events to a device
pub struct IrqWorker {
    thread_handle: Option<JoinHandle<()>>,
    stop_signal: Arc<AtomicBool>,
    name: String,
}

impl IrqWorker {
    /// Spawn a worker draining `events` into `device`
    ///
    /// The worker exits when stopped, when the line is dropped, or when the
    /// device is gone.
    pub fn start(name: &str, device: Weak<Device>, events: Receiver<IrqEvent>) -> FimcResult<Self> {
        let stop_signal = Arc::new(AtomicBool::new(false));
        let stop_signal_clone = Arc::clone(&stop_signal);
        let name_clone = name.to_string();

        info!(name = %name, "Starting interrupt worker");

        let thread_handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                debug!(name = %name_clone, "Interrupt worker started");

                loop {
                    if stop_signal_clone.load(Ordering::SeqCst) {
                        debug!(name = %name_clone, "Stop signal received");
                        break;
                    }

                    match events.recv_timeout(POLL_INTERVAL) {
                        Ok(IrqEvent::FrameDone) => {
                            let Some(device) = device.upgrade() else {
                                debug!(name = %name_clone, "Device gone");
                                break;
                            };
                            device.handle_irq();
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => {
                            debug!(name = %name_clone, "Interrupt line closed");
                            break;
                        }
                    }
                }

                info!(name = %name_clone, "Interrupt worker exiting");
            })?;

        Ok(Self {
            thread_handle: Some(thread_handle),
            stop_signal,
            name: name.to_string(),
        })
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Signal the worker to stop (non-blocking)
    pub fn request_stop(&self) {
        debug!(name = %self.name, "Requesting interrupt worker stop");
        self.stop_signal.store(true, Ordering::SeqCst);
    }

    /// Stop the worker and wait for it to finish
    ///
    /// Called from the worker itself (the device was dropped there) it only
    /// signals.
    pub fn stop(mut self) {
        self.stop_internal();
    }

    fn stop_internal(&mut self) {
        self.request_stop();
        if let Some(handle) = self.thread_handle.take() {
            if handle.thread().id() == thread::current().id() {
                return;
            }
            if handle.join().is_err() {
                warn!(name = %self.name, "Interrupt worker panicked");
            }
        }
    }
}

impl Drop for IrqWorker {
    fn drop(&mut self) {
        self.stop_internal();
    }
}
