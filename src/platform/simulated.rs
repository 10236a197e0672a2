// SPDX-License-Identifier: GPL-3.0-only

//! Recording platform for tests and the CLI

use super::{MemResource, Platform, Resource};
use crate::constants::{S3C64XX_PA_FIMC, S3C64XX_SZ_FIMC};
use crate::errors::{FimcError, FimcResult};
use std::sync::{Mutex, MutexGuard};

/// Platform interrupt number of the FIMC block on S3C64xx
pub const S3C64XX_IRQ_CAMIF_P: u32 = 46;

/// Something the device asked of the platform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformEvent {
    Acquired(Resource),
    Released(Resource),
    GateClock(bool),
}

#[derive(Debug, Default)]
struct Inner {
    events: Vec<PlatformEvent>,
    held: Vec<Resource>,
}

/// Platform that records requests and can be told to fail one
#[derive(Debug)]
pub struct SimulatedPlatform {
    mem: Option<MemResource>,
    irq: Option<u32>,
    fail_on: Option<Resource>,
    inner: Mutex<Inner>,
}

impl SimulatedPlatform {
    /// An S3C64xx-like platform with every resource present
    pub fn new() -> Self {
        Self {
            mem: Some(MemResource {
                start: S3C64XX_PA_FIMC,
                size: S3C64XX_SZ_FIMC,
            }),
            irq: Some(S3C64XX_IRQ_CAMIF_P),
            fail_on: None,
            inner: Mutex::new(Inner::default()),
        }
    }

    /// Make acquiring `resource` fail
    pub fn fail_on(mut self, resource: Resource) -> Self {
        self.fail_on = Some(resource);
        self
    }

    /// Describe no register window
    pub fn without_mem(mut self) -> Self {
        self.mem = None;
        self
    }

    /// Describe no interrupt
    pub fn without_irq(mut self) -> Self {
        self.irq = None;
        self
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn events(&self) -> Vec<PlatformEvent> {
        self.lock().events.clone()
    }

    /// Resources currently held, oldest first
    pub fn held(&self) -> Vec<Resource> {
        self.lock().held.clone()
    }

    /// Last gate clock state requested, if any
    pub fn gate_clock(&self) -> Option<bool> {
        self.lock().events.iter().rev().find_map(|e| match e {
            PlatformEvent::GateClock(on) => Some(*on),
            _ => None,
        })
    }
}

impl Default for SimulatedPlatform {
    fn default() -> Self {
        Self::new()
    }
}

impl Platform for SimulatedPlatform {
    fn mem_resource(&self) -> Option<MemResource> {
        self.mem
    }

    fn irq_resource(&self) -> Option<u32> {
        self.irq
    }

    fn acquire(&self, resource: Resource) -> FimcResult<()> {
        if self.fail_on == Some(resource) {
            return Err(FimcError::NoDevice(format!("failed to acquire {}", resource)));
        }
        let mut inner = self.lock();
        inner.events.push(PlatformEvent::Acquired(resource));
        inner.held.push(resource);
        Ok(())
    }

    fn release(&self, resource: Resource) {
        let mut inner = self.lock();
        inner.events.push(PlatformEvent::Released(resource));
        if let Some(pos) = inner.held.iter().rposition(|r| *r == resource) {
            inner.held.remove(pos);
        }
    }

    fn set_gate_clock(&self, enable: bool) {
        self.lock().events.push(PlatformEvent::GateClock(enable));
    }
}
