// SPDX-License-Identifier: GPL-3.0-only

//! Bounded wait with an explicit waker
//!
//! Control threads block here during shutdown and suspend until the
//! interrupt path reports that the hardware acknowledged. The condition is
//! evaluated under the queue's own lock, so [`WaitQueue::wake`] must be
//! called after the device and context locks have been released.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Default)]
pub struct WaitQueue {
    seq: Mutex<u64>,
    cond: Condvar,
}

impl WaitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block until `done` returns true or `timeout` elapses
    ///
    /// Returns whether the condition was met.
    pub fn wait_timeout(&self, timeout: Duration, mut done: impl FnMut() -> bool) -> bool {
        let deadline = Instant::now() + timeout;
        let mut seq = self.seq.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if done() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            let (guard, _) = self
                .cond
                .wait_timeout(seq, deadline - now)
                .unwrap_or_else(|e| e.into_inner());
            seq = guard;
        }
    }

    /// Wake every waiter so it re-checks its condition
    pub fn wake(&self) {
        let mut seq = self.seq.lock().unwrap_or_else(|e| e.into_inner());
        *seq = seq.wrapping_add(1);
        self.cond.notify_all();
    }
}
