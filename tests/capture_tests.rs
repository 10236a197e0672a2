// SPDX-License-Identifier: GPL-3.0-only

//! Integration tests for the camera capture path

use fimc::device::CaptureFlags;
use fimc::hardware::{HwOp, OutputSlot, SimulatedFimc, SimulatedSensor};
use fimc::media::formats::fourcc;
use fimc::platform::{Resource, SimulatedPlatform};
use fimc::{
    Board, BufferState, CaptureHandle, Config, ControlId, Device, FimcError, PixFormatMplane,
    Rect, SimulatedDevice, Size,
};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

fn attach(slots: usize) -> SimulatedDevice {
    let config = Config {
        output_slots: slots,
        ..Config::default()
    };
    SimulatedDevice::attach(config, false).unwrap()
}

fn open_streaming(sim: &SimulatedDevice, buffers: usize) -> CaptureHandle {
    let node = CaptureHandle::open(&sim.device).unwrap();
    node.set_format(&PixFormatMplane::new(fourcc::YUYV, Size::new(320, 240)))
        .unwrap();
    assert_eq!(node.reqbufs(buffers).unwrap(), buffers);
    for index in 0..buffers {
        node.qbuf(index).unwrap();
    }
    node.streamon().unwrap();
    node
}

#[test]
fn test_streamon_fills_slots_and_activates() {
    let sim = attach(4);
    let _node = open_streaming(&sim, 4);

    let status = sim.device.capture_status().unwrap();
    assert_eq!(status.active, 2);
    assert_eq!(status.pending, 2);
    assert!(status.flags.contains(CaptureFlags::PENDING | CaptureFlags::STREAM));
    assert!(sim.hw.capture_active());
    assert_eq!(sim.hw.count(|op| *op == HwOp::ActivateCapture), 1);
}

#[test]
fn test_frames_complete_in_order() {
    let sim = attach(2);
    let node = open_streaming(&sim, 4);

    let mut sequences = Vec::new();
    for _ in 0..12 {
        sim.device.handle_irq();
        let status = sim.device.capture_status().unwrap();
        assert!(status.active <= status.slots, "{:?}", status);

        while let Ok(buf) = node.dqbuf() {
            assert_eq!(buf.state, BufferState::Done);
            assert!(buf.timestamp.is_some());
            sequences.push(buf.sequence);
            node.qbuf(buf.index).unwrap();
        }
    }

    assert!(sequences.len() >= 8, "{:?}", sequences);
    assert!(sequences.windows(2).all(|w| w[0] < w[1]));
}

#[test]
fn test_active_list_bounded_by_slots() {
    let sim = attach(3);
    let _node = open_streaming(&sim, 8);

    for _ in 0..6 {
        sim.device.handle_irq();
        let status = sim.device.capture_status().unwrap();
        assert!(status.active <= 3);
        // Every buffer is either in flight, waiting or captured
        assert_eq!(status.active + status.pending + status.frame_count as usize, 8);
    }
    let status = sim.device.capture_status().unwrap();
    assert_eq!(status.frame_count, 5);
    assert_eq!(status.pending, 0);
}

#[test]
fn test_single_buffer_uses_all_slots() {
    let sim = attach(4);
    let node = open_streaming(&sim, 1);

    assert!(sim.hw.count(|op| matches!(
        op,
        HwOp::OutputAddr {
            slot: OutputSlot::All,
            ..
        }
    )) == 1);
    assert!(sim.hw.capture_active());

    sim.device.handle_irq();
    // The last buffer in flight stops the capture after this frame
    assert!(!sim.hw.capture_active());
    sim.device.handle_irq();

    let buf = node.dqbuf().unwrap();
    assert_eq!(buf.state, BufferState::Done);
    assert_eq!(buf.sequence, 0);
}

#[test]
fn test_streamoff_returns_every_buffer() {
    let sim = attach(4);
    let node = open_streaming(&sim, 4);
    sim.device.handle_irq();

    node.streamoff().unwrap();
    let status = sim.device.capture_status().unwrap();
    assert!(status.flags.is_empty());
    assert_eq!(status.active, 0);
    assert_eq!(status.pending, 0);
    assert!(!sim.hw.capture_active());
    assert!(matches!(node.dqbuf(), Err(FimcError::InvalidArgument(_))));

    for index in 0..4 {
        assert_eq!(node.querybuf(index).unwrap().state, BufferState::Dequeued);
    }
    // Buffers can be queued and streamed again
    for index in 0..4 {
        node.qbuf(index).unwrap();
    }
    node.streamon().unwrap();
}

#[test]
fn test_stop_acknowledged_by_frame_end() {
    let sim = attach(4);
    let node = open_streaming(&sim, 4);

    let line = sim.irq.clone();
    let raiser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(20));
        line.raise();
    });
    node.streamoff().unwrap();
    raiser.join().unwrap();

    assert!(sim.device.capture_flags().is_empty());
}

#[test]
fn test_sensor_follows_capture_size() {
    let sim = attach(4);
    let node = CaptureHandle::open(&sim.device).unwrap();
    node.set_format(&PixFormatMplane::new(fourcc::RGB32, Size::new(320, 240)))
        .unwrap();

    let state = node.ctx().state();
    assert_eq!(state.s_frame.size(), Size::new(320, 240));
    assert_eq!(state.s_frame.fmt.fourcc, fourcc::YUYV);
    assert_eq!(state.d_frame.fmt.fourcc, fourcc::RGB32);
}

#[test]
fn test_changes_refused_while_streaming() {
    let sim = attach(4);
    let node = open_streaming(&sim, 2);

    let pix = PixFormatMplane::new(fourcc::YUYV, Size::new(160, 120));
    assert!(matches!(node.set_format(&pix), Err(FimcError::Busy(_))));
    assert!(matches!(node.reqbufs(4), Err(FimcError::Busy(_))));
    assert!(matches!(
        node.set_crop(Rect::new(0, 0, 160, 120)),
        Err(FimcError::Busy(_))
    ));
    assert!(matches!(
        node.set_control(ControlId::HFlip, 1),
        Err(FimcError::Busy(_))
    ));
    assert!(matches!(node.streamon(), Err(FimcError::Busy(_))));
}

#[test]
fn test_streamon_needs_buffers() {
    let sim = attach(4);
    let node = CaptureHandle::open(&sim.device).unwrap();
    node.set_format(&PixFormatMplane::new(fourcc::YUYV, Size::new(320, 240)))
        .unwrap();
    assert!(matches!(node.streamon(), Err(FimcError::InvalidArgument(_))));
    assert!(matches!(node.streamoff(), Err(FimcError::InvalidArgument(_))));
}

#[test]
fn test_no_capture_node_without_sensor() {
    let config = Config {
        sensors: 0,
        ..Config::default()
    };
    let sim = SimulatedDevice::attach(config, false).unwrap();
    assert!(!sim.device.has_capture());
    assert!(!sim.platform.held().contains(&Resource::CaptureNode));
    assert!(matches!(
        CaptureHandle::open(&sim.device),
        Err(FimcError::NoDevice(_))
    ));
}

#[test]
fn test_close_while_streaming_cleans_up() {
    let sim = attach(4);
    {
        let _node = open_streaming(&sim, 4);
        assert!(sim.device.dma_used() > 0);
    }
    let status = sim.device.capture_status().unwrap();
    assert_eq!(status.users, 0);
    assert!(status.flags.is_empty());
    assert_eq!(sim.device.dma_used(), 0);
    assert_eq!(sim.device.pm_usage(), 0);
}

#[test]
fn test_querycap_reports_capture_node() {
    let sim = attach(4);
    let node = CaptureHandle::open(&sim.device).unwrap();
    let cap = node.querycap();
    assert_eq!(cap.card, "s3c64xx-fimc.0-capture");
    assert_ne!(cap.capabilities & fimc::node::CAP_VIDEO_CAPTURE_MPLANE, 0);
    assert!(node.enum_fmt(0).is_ok());
}

#[test]
fn test_format_untouched_when_sensor_bus_unsupported() {
    let sensor = SimulatedSensor::new("raw-sensor", Size::new(640, 480)).with_code(0x3001);
    let device = Device::attach(
        Config::default(),
        Arc::new(SimulatedPlatform::new()),
        Board {
            hw: Box::new(SimulatedFimc::new(4)),
            sensor: Some(Box::new(sensor)),
            irq: None,
        },
    )
    .unwrap();
    let node = CaptureHandle::open(&device).unwrap();
    let before = node.ctx().state().clone();

    let pix = PixFormatMplane::new(fourcc::RGB32, Size::new(320, 240));
    assert!(matches!(
        node.set_format(&pix),
        Err(FimcError::InvalidArgument(_))
    ));

    {
        let state = node.ctx().state();
        assert!(!state.dst_fmt_set);
        assert_eq!(state.d_frame.fmt.fourcc, before.d_frame.fmt.fourcc);
        assert_eq!(state.d_frame.size(), before.d_frame.size());
        assert_eq!(state.s_frame.size(), before.s_frame.size());
        assert_eq!(state.dirty, before.dirty);
    }
    drop(node);
    device.detach();
}

#[test]
fn test_stop_ack_leaves_last_buffer_alone() {
    let sim = attach(2);
    let node = open_streaming(&sim, 2);
    // First frame end starts the run; both slots stay filled
    sim.device.handle_irq();
    assert_eq!(sim.device.capture_status().unwrap().active, 2);
    sim.hw.clear();

    let device = Arc::clone(&sim.device);
    let line = sim.irq.clone();
    let raiser = thread::spawn(move || {
        while !device.capture_flags().contains(CaptureFlags::SHUT) {
            thread::sleep(Duration::from_millis(1));
        }
        line.raise();
    });
    node.streamoff().unwrap();
    raiser.join().unwrap();

    assert_eq!(sim.hw.count(|op| *op == HwOp::DeactivateCapture), 1);
    assert!(sim.device.capture_flags().is_empty());
}
