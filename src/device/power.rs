// SPDX-License-Identifier: GPL-3.0-only

//! Power management
//!
//! Runtime PM keeps a usage count: the first [`Device::pm_get`] resumes the
//! block, the last [`Device::pm_put`] suspends it. Suspending parks whichever
//! path owns the hardware and gates its clock; a path that cannot be parked
//! keeps the clock on. System sleep goes through the same hooks, guarded by
//! the low-power flag.

use super::Device;
use crate::errors::FimcResult;
use crate::pipelines::{capture, m2m};
use tracing::{debug, info, warn};

/// Runtime PM bookkeeping
#[derive(Debug)]
pub(crate) struct PmState {
    usage: usize,
    suspended: bool,
}

impl Default for PmState {
    fn default() -> Self {
        Self {
            usage: 0,
            suspended: true,
        }
    }
}

impl Device {
    /// Runtime suspend hook
    ///
    /// `Busy` while capture streams, `Retry` when a running transform did
    /// not acknowledge; the clock stays on in both cases.
    pub fn runtime_suspend(&self) -> FimcResult<()> {
        let capture_busy = self.lock_shared().state.capture_busy();
        let result = if capture_busy {
            capture::suspend(&self.lock_shared())
        } else {
            m2m::suspend(self)
        };

        match result {
            Ok(()) => {
                self.platform().set_gate_clock(false);
                debug!("Runtime suspended");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Runtime suspend refused");
                Err(err)
            }
        }
    }

    /// Runtime resume hook
    pub fn runtime_resume(&self) -> FimcResult<()> {
        self.platform().set_gate_clock(true);
        let mut shared = self.lock_shared();
        shared.hw.reset();
        if shared.state.capture_busy() {
            return capture::resume(&mut shared);
        }
        drop(shared);
        m2m::resume(self);
        debug!("Runtime resumed");
        Ok(())
    }

    /// Take a runtime PM reference, resuming the block if it was suspended
    pub fn pm_get(&self) -> FimcResult<()> {
        let mut pm = self.pm();
        pm.usage += 1;
        if pm.suspended {
            if let Err(err) = self.runtime_resume() {
                pm.usage -= 1;
                return Err(err);
            }
            pm.suspended = false;
        }
        Ok(())
    }

    /// Drop a runtime PM reference, suspending the block on the last one
    pub fn pm_put(&self) {
        let mut pm = self.pm();
        if pm.usage == 0 {
            warn!("Unbalanced runtime PM put");
            return;
        }
        pm.usage -= 1;
        if pm.usage == 0 && !pm.suspended {
            match self.runtime_suspend() {
                Ok(()) => pm.suspended = true,
                Err(err) => debug!(error = %err, "Staying powered"),
            }
        }
    }

    pub fn pm_usage(&self) -> usize {
        self.pm().usage
    }

    pub fn is_runtime_suspended(&self) -> bool {
        self.pm().suspended
    }

    /// Suspend at detach unless already suspended
    pub(crate) fn pm_shutdown(&self) {
        let mut pm = self.pm();
        if pm.suspended {
            return;
        }
        match self.runtime_suspend() {
            Ok(()) => pm.suspended = true,
            Err(err) => warn!(error = %err, "Detaching a busy device"),
        }
    }

    /// System sleep entry
    pub fn system_suspend(&self) -> FimcResult<()> {
        let capture_busy = {
            let mut shared = self.lock_shared();
            if shared.state.low_power() {
                return Ok(());
            }
            shared.state.set_low_power(true);
            shared.state.capture_busy()
        };
        info!("Entering low power mode");

        if capture_busy {
            capture::suspend(&self.lock_shared())
        } else {
            m2m::suspend(self)
        }
    }

    /// System sleep exit; only a device in use is brought back
    pub fn system_resume(&self) -> FimcResult<()> {
        let mut shared = self.lock_shared();
        if !shared.state.low_power() {
            return Ok(());
        }
        shared.state.set_low_power(false);
        if !shared.state.m2m_active() && !shared.state.capture_busy() {
            debug!("Idle across sleep");
            return Ok(());
        }

        info!("Leaving low power mode");
        shared.hw.reset();
        if shared.state.capture_busy() {
            return capture::resume(&mut shared);
        }
        drop(shared);
        m2m::resume(self);
        Ok(())
    }
}
