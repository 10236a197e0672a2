// SPDX-License-Identifier: GPL-3.0-only

//! FIMC device instance
//!
//! A [`Device`] owns everything shared between the open contexts of one
//! FIMC block: the hardware, the optional camera sensor and capture path,
//! the operating [`DeviceState`], the transform scheduler, the DMA pool and
//! the platform resources acquired at attach.
//!
//! - [`state`]: operating mode, transform phase and capture flags
//! - [`wait`]: bounded wait queue woken by the interrupt path
//! - [`irq`]: interrupt dispatcher and delivery worker
//! - [`power`]: runtime and system power management

pub mod irq;
pub mod power;
pub mod state;
pub mod wait;

pub use irq::IrqWorker;
pub use state::{CaptureFlags, DeviceState, M2mPhase, OperatingMode};
pub use wait::WaitQueue;

use crate::config::{Config, Variant};
use crate::constants::{FimcClock, PLATFORM_DEVICE_NAME};
use crate::context::{Context, ContextMode};
use crate::errors::{FimcError, FimcResult};
use crate::hardware::{
    CameraSensor, FimcHardware, IrqEvent, IrqLine, SimHandle, SimulatedFimc, SimulatedSensor,
};
use crate::media::types::Size;
use crate::pipelines::capture::CaptureState;
use crate::pipelines::m2m::{self, JobRunner, M2mScheduler};
use crate::platform::{Platform, Resource, ResourceStack, SimulatedPlatform};
use crate::queue::DmaAllocator;
use power::PmState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::{debug, info};

/// State protected by the device lock
pub(crate) struct DeviceShared {
    pub(crate) state: DeviceState,
    pub(crate) hw: Box<dyn FimcHardware>,
    pub(crate) sensor: Option<Box<dyn CameraSensor>>,
    pub(crate) capture: Option<CaptureState>,
}

/// What is wired to the block on this board
pub struct Board {
    pub hw: Box<dyn FimcHardware>,
    /// Camera on the capture port; none means no capture node
    pub sensor: Option<Box<dyn CameraSensor>>,
    /// Interrupt events, delivered by an [`IrqWorker`] when present
    pub irq: Option<Receiver<IrqEvent>>,
}

/// Snapshot of the capture path
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureStatus {
    pub flags: CaptureFlags,
    pub active: usize,
    pub pending: usize,
    pub slots: usize,
    pub active_slots: Vec<usize>,
    pub frame_count: u32,
    pub users: usize,
}

pub struct Device {
    config: Config,
    shared: Mutex<DeviceShared>,
    wait: WaitQueue,
    scheduler: M2mScheduler,
    dma: Mutex<DmaAllocator>,
    pm: Mutex<PmState>,
    capture_ctx: Option<Arc<Context>>,
    attached: AtomicBool,
    irq_worker: Mutex<Option<IrqWorker>>,
    resources: Mutex<Option<ResourceStack>>,
    platform: Arc<dyn Platform>,
}

impl Device {
    /// Bring up a device on `platform`
    ///
    /// Resources are acquired in hardware bring-up order; if any step
    /// fails, everything acquired so far is released in reverse order and
    /// no device is left behind.
    pub fn attach(config: Config, platform: Arc<dyn Platform>, board: Board) -> FimcResult<Arc<Self>> {
        config.validate()?;
        let Board { hw, sensor, irq } = board;
        let with_camera = sensor.is_some();
        let mut resources = ResourceStack::new(Arc::clone(&platform));

        let mem = platform
            .mem_resource()
            .ok_or_else(|| FimcError::NoDevice("no memory resource defined".to_string()))?;
        resources.acquire(Resource::MemRegion)?;
        resources.acquire(Resource::RegisterMap)?;

        let irq_num = platform
            .irq_resource()
            .ok_or_else(|| FimcError::NoDevice("no irq resource defined".to_string()))?;

        for clock in FimcClock::required(with_camera) {
            resources.acquire(Resource::Clock(*clock))?;
        }
        resources.acquire(Resource::ClockEnable(FimcClock::Bus))?;
        resources.acquire(Resource::IrqHandler(irq_num))?;
        resources.acquire(Resource::RuntimePm)?;
        resources.acquire(Resource::DmaContext)?;
        resources.acquire(Resource::M2mNode)?;
        if with_camera {
            resources.acquire(Resource::CaptureNode)?;
        }

        let capture_ctx = with_camera.then(|| {
            Arc::new(Context::new(
                ContextMode::Capture,
                config.device_id,
                config.variant,
            ))
        });
        let capture = capture_ctx
            .as_ref()
            .map(|ctx| CaptureState::new(Arc::clone(ctx), config.output_slots));

        let device = Arc::new(Self {
            dma: Mutex::new(DmaAllocator::new(config.dma_pool_base, config.dma_pool_size)),
            shared: Mutex::new(DeviceShared {
                state: DeviceState::default(),
                hw,
                sensor,
                capture,
            }),
            wait: WaitQueue::new(),
            scheduler: M2mScheduler::new(),
            pm: Mutex::new(PmState::default()),
            capture_ctx,
            attached: AtomicBool::new(true),
            irq_worker: Mutex::new(None),
            resources: Mutex::new(Some(resources)),
            platform,
            config,
        });

        if let Some(events) = irq {
            let name = format!("{}.{}-irq", PLATFORM_DEVICE_NAME, device.config.device_id);
            let worker = IrqWorker::start(&name, Arc::downgrade(&device), events)?;
            *device.irq_worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(worker);
        }

        device.pm_get()?;
        device.pm_put();

        info!(
            id = device.config.device_id,
            base = format!("{:#x}", mem.start),
            irq = irq_num,
            capture = with_camera,
            "FIMC attached"
        );
        Ok(device)
    }

    /// Tear the device down: park the hardware, stop interrupt delivery and
    /// release every resource in reverse acquisition order
    pub fn detach(&self) {
        if !self.attached.swap(false, Ordering::SeqCst) {
            return;
        }
        self.pm_shutdown();
        if let Some(worker) = self
            .irq_worker
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            worker.stop();
        }
        drop(self.resources.lock().unwrap_or_else(|e| e.into_inner()).take());
        info!(id = self.config.device_id, "FIMC detached");
    }

    pub fn is_attached(&self) -> bool {
        self.attached.load(Ordering::SeqCst)
    }

    pub(crate) fn ensure_attached(&self) -> FimcResult<()> {
        if self.is_attached() {
            Ok(())
        } else {
            Err(FimcError::NoDevice("device detached".to_string()))
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn variant(&self) -> &Variant {
        &self.config.variant
    }

    pub fn id(&self) -> u32 {
        self.config.device_id
    }

    pub(crate) fn lock_shared(&self) -> MutexGuard<'_, DeviceShared> {
        self.shared.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn wait(&self) -> &WaitQueue {
        &self.wait
    }

    pub fn scheduler(&self) -> &M2mScheduler {
        &self.scheduler
    }

    pub(crate) fn dma(&self) -> MutexGuard<'_, DmaAllocator> {
        self.dma.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn pm(&self) -> MutexGuard<'_, PmState> {
        self.pm.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn platform(&self) -> &Arc<dyn Platform> {
        &self.platform
    }

    /// The shared capture context, when a sensor is attached
    pub fn capture_ctx(&self) -> Option<&Arc<Context>> {
        self.capture_ctx.as_ref()
    }

    pub fn has_capture(&self) -> bool {
        self.capture_ctx.is_some()
    }

    pub fn mode(&self) -> OperatingMode {
        self.lock_shared().state.mode()
    }

    pub fn m2m_phase(&self) -> M2mPhase {
        self.lock_shared().state.m2m_phase()
    }

    pub fn capture_flags(&self) -> CaptureFlags {
        self.lock_shared().state.capture_flags()
    }

    pub fn low_power(&self) -> bool {
        self.lock_shared().state.low_power()
    }

    pub fn capture_status(&self) -> Option<CaptureStatus> {
        let shared = self.lock_shared();
        let flags = shared.state.capture_flags();
        shared.capture.as_ref().map(|cap| CaptureStatus {
            flags,
            active: cap.active_len(),
            pending: cap.pending_len(),
            slots: cap.slots(),
            active_slots: cap.active_slots(),
            frame_count: cap.frame_count(),
            users: cap.users(),
        })
    }

    /// Bytes currently allocated from the DMA pool
    pub fn dma_used(&self) -> u64 {
        self.dma().used()
    }
}

impl JobRunner for Device {
    fn device_run(&self, ctx: &Arc<Context>) {
        m2m::device_run(self, ctx);
    }

    fn job_abort(&self, ctx: &Arc<Context>) {
        m2m::stop_streaming(self, ctx);
    }
}

/// A device on simulated hardware, with handles to inspect and drive it
pub struct SimulatedDevice {
    pub device: Arc<Device>,
    pub hw: SimHandle,
    pub platform: Arc<SimulatedPlatform>,
    /// Raises the block's interrupt
    pub irq: IrqLine,
}

impl SimulatedDevice {
    /// Largest frame the simulated sensor produces
    pub const SENSOR_MAX: Size = Size::new(640, 480);

    /// Attach on a simulated S3C64xx platform
    ///
    /// With `auto_complete` every transform raises its completion interrupt
    /// as soon as it is kicked; otherwise tests raise it by hand.
    pub fn attach(config: Config, auto_complete: bool) -> FimcResult<Self> {
        Self::attach_on(config, auto_complete, SimulatedPlatform::new())
    }

    /// Attach on a prepared simulated platform
    pub fn attach_on(
        config: Config,
        auto_complete: bool,
        platform: SimulatedPlatform,
    ) -> FimcResult<Self> {
        let (line, events) = IrqLine::new();
        let mut fimc = SimulatedFimc::new(config.output_slots);
        if auto_complete {
            fimc = fimc.with_auto_complete(line.clone());
        }
        let hw = fimc.handle();
        let sensor: Option<Box<dyn CameraSensor>> = if config.has_camera() {
            Some(Box::new(SimulatedSensor::new("sim-sensor", Self::SENSOR_MAX)))
        } else {
            None
        };

        let platform = Arc::new(platform);
        let shared_platform: Arc<dyn Platform> = platform.clone();
        let device = Device::attach(
            config,
            shared_platform,
            Board {
                hw: Box::new(fimc),
                sensor,
                irq: Some(events),
            },
        )?;
        debug!(auto_complete, "Simulated device ready");

        Ok(Self {
            device,
            hw,
            platform,
            irq: line,
        })
    }
}

impl Drop for SimulatedDevice {
    fn drop(&mut self) {
        self.device.detach();
    }
}
