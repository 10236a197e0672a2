// SPDX-License-Identifier: GPL-3.0-only

//! Device operating state
//!
//! The transform engine and the capture path share one processing pipe.
//! [`DeviceState`] tracks which of them owns it, the transform engine's
//! suspend handshake and the capture sub-flags. It lives inside the device
//! lock and is read by the interrupt path to decide who a completion
//! belongs to.

use crate::context::ContextId;
use bitflags::bitflags;
use tracing::debug;

/// Who owns the processing pipe right now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatingMode {
    Idle,
    M2m,
    Capture,
}

/// Transform engine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum M2mPhase {
    #[default]
    Idle,
    /// A transform is running on the hardware
    Pending,
    /// Suspend requested while a transform runs
    Suspending,
    /// The hardware acknowledged the suspend request
    Suspended,
}

bitflags! {
    /// Capture path flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CaptureFlags: u32 {
        /// Capture configured; completions belong to the capture path
        const PENDING = 1 << 0;
        /// Capture engine activated
        const STREAM = 1 << 1;
        /// At least one buffer programmed into the hardware
        const RUN = 1 << 2;
        /// Stop requested, waiting for the next frame end
        const SHUT = 1 << 3;
    }
}

#[derive(Debug, Default)]
pub struct DeviceState {
    m2m: M2mPhase,
    capture: CaptureFlags,
    low_power: bool,
    m2m_users: usize,
    last_ctx: Option<ContextId>,
}

impl DeviceState {
    pub fn mode(&self) -> OperatingMode {
        if self.m2m_pending() {
            OperatingMode::M2m
        } else if self.capture.contains(CaptureFlags::PENDING) {
            OperatingMode::Capture
        } else {
            OperatingMode::Idle
        }
    }

    pub fn m2m_phase(&self) -> M2mPhase {
        self.m2m
    }

    pub fn set_m2m_phase(&mut self, phase: M2mPhase) {
        if self.m2m != phase {
            debug!(from = ?self.m2m, to = ?phase, "M2M phase");
            self.m2m = phase;
        }
    }

    /// A transform occupies the hardware
    pub fn m2m_pending(&self) -> bool {
        matches!(self.m2m, M2mPhase::Pending | M2mPhase::Suspending)
    }

    /// Transform contexts are open or a transform is running
    pub fn m2m_active(&self) -> bool {
        self.m2m_users > 0 || self.m2m_pending()
    }

    pub fn m2m_users(&self) -> usize {
        self.m2m_users
    }

    pub fn add_m2m_user(&mut self) {
        self.m2m_users += 1;
    }

    pub fn remove_m2m_user(&mut self) {
        self.m2m_users = self.m2m_users.saturating_sub(1);
    }

    pub fn capture_flags(&self) -> CaptureFlags {
        self.capture
    }

    pub fn set_capture(&mut self, flags: CaptureFlags) {
        self.capture |= flags;
    }

    pub fn clear_capture(&mut self, flags: CaptureFlags) {
        self.capture.remove(flags);
    }

    /// Capture configured or streaming
    pub fn capture_busy(&self) -> bool {
        self.capture
            .intersects(CaptureFlags::PENDING | CaptureFlags::STREAM)
    }

    /// Capture running or configured
    pub fn capture_active(&self) -> bool {
        self.capture
            .intersects(CaptureFlags::RUN | CaptureFlags::PENDING)
    }

    pub fn low_power(&self) -> bool {
        self.low_power
    }

    pub fn set_low_power(&mut self, on: bool) {
        self.low_power = on;
    }

    /// Context whose configuration is in the hardware registers
    pub fn last_ctx(&self) -> Option<ContextId> {
        self.last_ctx
    }

    pub fn set_last_ctx(&mut self, ctx: Option<ContextId>) {
        self.last_ctx = ctx;
    }
}
