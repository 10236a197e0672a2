// SPDX-License-Identifier: GPL-3.0-only

//! Round-robin transform job scheduler
//!
//! A context is runnable when both its queues are streaming and each holds
//! a buffer handed to the driver. One job runs at a time; when it finishes
//! the next runnable context is started and the finished one goes to the
//! back of the line if it still has work. The scheduler lock is never held
//! while calling into the [`JobRunner`].

use crate::context::Context;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, warn};

/// Device side of the scheduler
pub trait JobRunner {
    /// Program and start a job for `ctx`
    fn device_run(&self, ctx: &Arc<Context>);

    /// Stop the running job of `ctx`; returns once it is no longer running
    fn job_abort(&self, ctx: &Arc<Context>);
}

#[derive(Debug, Default)]
struct Inner {
    queue: VecDeque<Arc<Context>>,
    current: Option<Arc<Context>>,
}

#[derive(Debug, Default)]
pub struct M2mScheduler {
    inner: Mutex<Inner>,
}

impl M2mScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Context whose job is on the hardware
    pub fn current(&self) -> Option<Arc<Context>> {
        self.lock().current.clone()
    }

    pub fn is_current(&self, ctx: &Context) -> bool {
        self.lock()
            .current
            .as_ref()
            .is_some_and(|c| c.id() == ctx.id())
    }

    pub fn is_queued(&self, ctx: &Context) -> bool {
        self.lock().queue.iter().any(|c| c.id() == ctx.id())
    }

    pub fn queued_len(&self) -> usize {
        self.lock().queue.len()
    }

    /// Queue `ctx` if it has work, then start a job if the hardware is free
    pub fn try_schedule(&self, ctx: &Arc<Context>, runner: &dyn JobRunner) {
        if ctx.job_ready() {
            let mut inner = self.lock();
            let known = inner.current.as_ref().is_some_and(|c| c.id() == ctx.id())
                || inner.queue.iter().any(|c| c.id() == ctx.id());
            if !known {
                debug!(ctx = ctx.id(), "Job queued");
                inner.queue.push_back(Arc::clone(ctx));
            }
        }
        self.try_run(runner);
    }

    fn try_run(&self, runner: &dyn JobRunner) {
        loop {
            let next = {
                let mut inner = self.lock();
                if inner.current.is_some() {
                    return;
                }
                let Some(ctx) = inner.queue.pop_front() else {
                    return;
                };
                inner.current = Some(Arc::clone(&ctx));
                ctx
            };

            if next.job_ready() {
                debug!(ctx = next.id(), "Running job");
                runner.device_run(&next);
                return;
            }

            debug!(ctx = next.id(), "Dropping stale job");
            let mut inner = self.lock();
            if inner.current.as_ref().is_some_and(|c| c.id() == next.id()) {
                inner.current = None;
            }
        }
    }

    /// Report that the job of `ctx` finished and start the next one
    ///
    /// Returns false when `ctx` was not the running context.
    pub fn job_finish(&self, ctx: &Arc<Context>, runner: &dyn JobRunner) -> bool {
        {
            let mut inner = self.lock();
            if !inner.current.as_ref().is_some_and(|c| c.id() == ctx.id()) {
                warn!(ctx = ctx.id(), "Called by an instance not currently running");
                return false;
            }
            inner.current = None;
        }
        debug!(ctx = ctx.id(), "Job finished");

        if ctx.job_ready() {
            let mut inner = self.lock();
            if !inner.queue.iter().any(|c| c.id() == ctx.id()) {
                inner.queue.push_back(Arc::clone(ctx));
            }
        }
        self.try_run(runner);
        true
    }

    /// Take `ctx` off the run queue; a running job is left alone
    pub fn remove(&self, ctx: &Context) {
        self.lock().queue.retain(|c| c.id() != ctx.id());
    }

    /// Forget `ctx` entirely, aborting its running job first
    pub fn release(&self, ctx: &Arc<Context>, runner: &dyn JobRunner) {
        if self.is_current(ctx) {
            debug!(ctx = ctx.id(), "Aborting running job");
            runner.job_abort(ctx);
        }
        self.remove(ctx);
    }
}
