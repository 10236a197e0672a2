// SPDX-License-Identifier: GPL-3.0-only

//! Platform resources
//!
//! The [`Platform`] trait is what the device needs from the bus it sits on:
//! its register window and interrupt, clocks, runtime power management and
//! the registration of its video nodes. Every acquired resource is held by
//! a [`ResourceGuard`] that gives it back on drop; a [`ResourceStack`]
//! releases its guards newest first so a failed attach unwinds in strict
//! reverse order.
//!
//! - [`simulated`]: recording platform with failure injection

pub mod simulated;

pub use simulated::{PlatformEvent, SimulatedPlatform};

use crate::constants::FimcClock;
use crate::errors::FimcResult;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Memory resource of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemResource {
    pub start: u64,
    pub size: u64,
}

/// Something the device acquires at attach and gives back at detach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resource {
    /// Exclusive claim on the register window
    MemRegion,
    /// CPU mapping of the register window
    RegisterMap,
    /// Clock handle
    Clock(FimcClock),
    /// Clock enabled for the lifetime of the device
    ClockEnable(FimcClock),
    /// Interrupt handler installation
    IrqHandler(u32),
    /// Runtime power management enabled
    RuntimePm,
    /// Contiguous DMA allocator context
    DmaContext,
    /// Memory-to-memory video node
    M2mNode,
    /// Camera capture video node
    CaptureNode,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::MemRegion => write!(f, "register region"),
            Resource::RegisterMap => write!(f, "register mapping"),
            Resource::Clock(clk) => write!(f, "clock {}", clk),
            Resource::ClockEnable(clk) => write!(f, "clock {} enable", clk),
            Resource::IrqHandler(irq) => write!(f, "irq {}", irq),
            Resource::RuntimePm => write!(f, "runtime pm"),
            Resource::DmaContext => write!(f, "dma context"),
            Resource::M2mNode => write!(f, "m2m video node"),
            Resource::CaptureNode => write!(f, "capture video node"),
        }
    }
}

/// Host platform services
pub trait Platform: Send + Sync {
    /// Register window, if the platform describes one
    fn mem_resource(&self) -> Option<MemResource>;

    /// Interrupt number, if the platform describes one
    fn irq_resource(&self) -> Option<u32>;

    /// Acquire a resource
    fn acquire(&self, resource: Resource) -> FimcResult<()>;

    /// Give a resource back
    fn release(&self, resource: Resource);

    /// Gate clock on/off for runtime power management
    fn set_gate_clock(&self, enable: bool);
}

/// An acquired resource, released on drop
pub struct ResourceGuard {
    platform: Arc<dyn Platform>,
    resource: Resource,
}

impl ResourceGuard {
    pub fn acquire(platform: &Arc<dyn Platform>, resource: Resource) -> FimcResult<Self> {
        platform.acquire(resource)?;
        debug!(%resource, "Acquired");
        Ok(Self {
            platform: Arc::clone(platform),
            resource,
        })
    }

    pub fn resource(&self) -> Resource {
        self.resource
    }
}

impl Drop for ResourceGuard {
    fn drop(&mut self) {
        debug!(resource = %self.resource, "Releasing");
        self.platform.release(self.resource);
    }
}

/// Guards released newest first
pub struct ResourceStack {
    platform: Arc<dyn Platform>,
    guards: Vec<ResourceGuard>,
}

impl ResourceStack {
    pub fn new(platform: Arc<dyn Platform>) -> Self {
        Self {
            platform,
            guards: Vec::new(),
        }
    }

    /// Acquire `resource` and push its guard
    pub fn acquire(&mut self, resource: Resource) -> FimcResult<()> {
        let guard = ResourceGuard::acquire(&self.platform, resource)?;
        self.guards.push(guard);
        Ok(())
    }

    pub fn holds(&self, resource: Resource) -> bool {
        self.guards.iter().any(|g| g.resource() == resource)
    }

    pub fn len(&self) -> usize {
        self.guards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.guards.is_empty()
    }

    pub fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }
}

impl Drop for ResourceStack {
    fn drop(&mut self) {
        while let Some(guard) = self.guards.pop() {
            drop(guard);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stack_releases_in_reverse() {
        let sim = Arc::new(SimulatedPlatform::new());
        let platform: Arc<dyn Platform> = sim.clone();
        {
            let mut stack = ResourceStack::new(platform);
            stack.acquire(Resource::MemRegion).unwrap();
            stack.acquire(Resource::RegisterMap).unwrap();
            stack.acquire(Resource::Clock(FimcClock::Bus)).unwrap();
            assert!(stack.holds(Resource::RegisterMap));
        }
        let released: Vec<Resource> = sim
            .events()
            .into_iter()
            .filter_map(|e| match e {
                PlatformEvent::Released(r) => Some(r),
                _ => None,
            })
            .collect();
        assert_eq!(
            released,
            vec![
                Resource::Clock(FimcClock::Bus),
                Resource::RegisterMap,
                Resource::MemRegion
            ]
        );
        assert!(sim.held().is_empty());
    }

    #[test]
    fn test_failed_acquire_is_not_held() {
        let sim = Arc::new(SimulatedPlatform::new().fail_on(Resource::RegisterMap));
        let platform: Arc<dyn Platform> = sim.clone();
        let mut stack = ResourceStack::new(platform);
        stack.acquire(Resource::MemRegion).unwrap();
        assert!(stack.acquire(Resource::RegisterMap).is_err());
        assert_eq!(stack.len(), 1);
    }
}
