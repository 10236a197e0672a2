// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for attach/detach and power management

use fimc::constants::FimcClock;
use fimc::hardware::SimulatedFimc;
use fimc::media::formats::fourcc;
use fimc::platform::{PlatformEvent, Resource, SimulatedPlatform};
use fimc::{
    Board, BufType, BufferState, CaptureHandle, Config, Device, FimcError, M2mHandle, M2mPhase,
    PixFormatMplane, SimulatedDevice, Size,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

const IRQ: u32 = fimc::platform::simulated::S3C64XX_IRQ_CAMIF_P;

fn board() -> Board {
    Board {
        hw: Box::new(SimulatedFimc::new(4)),
        sensor: None,
        irq: None,
    }
}

fn acquired(events: &[PlatformEvent]) -> Vec<Resource> {
    events
        .iter()
        .filter_map(|e| match e {
            PlatformEvent::Acquired(r) => Some(*r),
            _ => None,
        })
        .collect()
}

fn released(events: &[PlatformEvent]) -> Vec<Resource> {
    events
        .iter()
        .filter_map(|e| match e {
            PlatformEvent::Released(r) => Some(*r),
            _ => None,
        })
        .collect()
}

fn open_pending(sim: &SimulatedDevice) -> M2mHandle {
    let node = M2mHandle::open(&sim.device).unwrap();
    let size = Size::new(320, 240);
    for buf_type in [BufType::VideoOutputMplane, BufType::VideoCaptureMplane] {
        node.set_format(buf_type, &PixFormatMplane::new(fourcc::YUYV, size))
            .unwrap();
        node.reqbufs(buf_type, 1).unwrap();
        node.qbuf(buf_type, 0).unwrap();
    }
    node.streamon(BufType::VideoOutputMplane).unwrap();
    node.streamon(BufType::VideoCaptureMplane).unwrap();
    assert_eq!(sim.device.m2m_phase(), M2mPhase::Pending);
    node
}

#[test]
fn test_attach_acquires_in_order() {
    let sim = SimulatedDevice::attach(Config::default(), false).unwrap();
    let events = sim.platform.events();

    assert_eq!(
        acquired(&events),
        vec![
            Resource::MemRegion,
            Resource::RegisterMap,
            Resource::Clock(FimcClock::Bus),
            Resource::Clock(FimcClock::Gate),
            Resource::Clock(FimcClock::Camera),
            Resource::ClockEnable(FimcClock::Bus),
            Resource::IrqHandler(IRQ),
            Resource::RuntimePm,
            Resource::DmaContext,
            Resource::M2mNode,
            Resource::CaptureNode,
        ]
    );
    // Attach powers the block up once to reset it, then lets it sleep
    assert_eq!(
        &events[events.len() - 2..],
        &[PlatformEvent::GateClock(true), PlatformEvent::GateClock(false)]
    );
    assert!(sim.device.is_runtime_suspended());
}

#[test]
fn test_attach_failure_unwinds_in_reverse() {
    let platform = Arc::new(SimulatedPlatform::new().fail_on(Resource::DmaContext));
    let result = Device::attach(Config::default(), platform.clone(), board());
    assert!(matches!(result, Err(FimcError::NoDevice(_))));

    let events = platform.events();
    let mut expected = acquired(&events);
    expected.reverse();
    assert_eq!(released(&events), expected);
    assert!(!expected.contains(&Resource::DmaContext));
    assert!(platform.held().is_empty());
}

#[test]
fn test_attach_without_camera_skips_camera_resources() {
    let platform = Arc::new(SimulatedPlatform::new());
    let device = Device::attach(Config::default(), platform.clone(), board()).unwrap();
    let held = platform.held();
    assert!(!held.contains(&Resource::Clock(FimcClock::Camera)));
    assert!(!held.contains(&Resource::CaptureNode));
    assert!(!device.has_capture());
    device.detach();
}

#[test]
fn test_attach_without_resources() {
    let platform = Arc::new(SimulatedPlatform::new().without_mem());
    let result = Device::attach(Config::default(), platform.clone(), board());
    assert!(matches!(result, Err(FimcError::NoDevice(_))));
    assert!(platform.events().is_empty());

    let platform = Arc::new(SimulatedPlatform::new().without_irq());
    let result = Device::attach(Config::default(), platform.clone(), board());
    assert!(matches!(result, Err(FimcError::NoDevice(_))));
    assert_eq!(
        released(&platform.events()),
        vec![Resource::RegisterMap, Resource::MemRegion]
    );
    assert!(platform.held().is_empty());
}

#[test]
fn test_attach_rejects_invalid_config() {
    let config = Config {
        output_slots: 0,
        ..Config::default()
    };
    let platform = Arc::new(SimulatedPlatform::new());
    let result = Device::attach(config, platform.clone(), board());
    assert!(matches!(result, Err(FimcError::Config(_))));
    assert!(platform.events().is_empty());
}

#[test]
fn test_detach_releases_everything_once() {
    let sim = SimulatedDevice::attach(Config::default(), false).unwrap();
    sim.device.detach();
    assert!(!sim.device.is_attached());
    assert!(sim.platform.held().is_empty());

    let events = sim.platform.events();
    let mut expected = acquired(&events);
    expected.reverse();
    assert_eq!(released(&events), expected);

    sim.device.detach();
    assert_eq!(sim.platform.events().len(), events.len());
}

#[test]
fn test_pm_references_gate_the_clock() {
    let sim = SimulatedDevice::attach(Config::default(), false).unwrap();
    sim.device.pm_get().unwrap();
    assert!(!sim.device.is_runtime_suspended());
    assert_eq!(sim.platform.gate_clock(), Some(true));

    sim.device.pm_get().unwrap();
    sim.device.pm_put();
    assert_eq!(sim.platform.gate_clock(), Some(true));

    sim.device.pm_put();
    assert!(sim.device.is_runtime_suspended());
    assert_eq!(sim.platform.gate_clock(), Some(false));

    // Unbalanced put is ignored
    sim.device.pm_put();
    assert_eq!(sim.device.pm_usage(), 0);
}

#[test]
fn test_suspend_retries_when_hardware_does_not_ack() {
    let sim = SimulatedDevice::attach(Config::default(), false).unwrap();
    let _node = open_pending(&sim);

    let err = sim.device.runtime_suspend();
    assert!(matches!(err, Err(FimcError::Retry(_))));
    assert_eq!(sim.device.m2m_phase(), M2mPhase::Pending);
    assert_eq!(sim.platform.gate_clock(), Some(true));
}

#[test]
fn test_resume_fails_job_stalled_by_suspend() {
    let config = Config {
        shutdown_timeout_ms: 2000,
        ..Config::default()
    };
    let sim = SimulatedDevice::attach(config, false).unwrap();
    let node = open_pending(&sim);

    let line = sim.irq.clone();
    let raiser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        line.raise();
    });
    sim.device.runtime_suspend().unwrap();
    raiser.join().unwrap();
    assert_eq!(sim.device.m2m_phase(), M2mPhase::Suspended);
    assert_eq!(sim.platform.gate_clock(), Some(false));

    sim.device.runtime_resume().unwrap();
    assert_eq!(sim.device.m2m_phase(), M2mPhase::Idle);
    assert!(sim.device.scheduler().current().is_none());

    let dst = node.dqbuf(BufType::VideoCaptureMplane).unwrap();
    assert_eq!(dst.state, BufferState::Error);
}

#[test]
fn test_suspend_refused_while_capturing() {
    let sim = SimulatedDevice::attach(Config::default(), false).unwrap();
    let node = CaptureHandle::open(&sim.device).unwrap();
    node.set_format(&PixFormatMplane::new(fourcc::YUYV, Size::new(320, 240)))
        .unwrap();
    node.reqbufs(2).unwrap();
    node.qbuf(0).unwrap();
    node.qbuf(1).unwrap();
    node.streamon().unwrap();

    assert!(matches!(
        sim.device.runtime_suspend(),
        Err(FimcError::Busy(_))
    ));
    assert!(matches!(
        sim.device.system_suspend(),
        Err(FimcError::Busy(_))
    ));
    assert!(sim.device.low_power());
}

#[test]
fn test_system_sleep_round_trip() {
    let sim = SimulatedDevice::attach(Config::default(), false).unwrap();
    assert!(!sim.device.low_power());

    sim.device.system_suspend().unwrap();
    assert!(sim.device.low_power());
    // Already asleep
    sim.device.system_suspend().unwrap();

    sim.device.system_resume().unwrap();
    assert!(!sim.device.low_power());
    sim.device.system_resume().unwrap();
}
