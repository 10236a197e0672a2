// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands driving a simulated FIMC block
//!
//! This module provides command-line functionality for:
//! - Listing the format table
//! - Inspecting scaler parameters
//! - Running transform jobs
//! - Streaming from the simulated sensor

use fimc::media::formats::{FormatFlags, default_format, find_format, format_by_index};
use fimc::media::{check_scaler_ratio, prepare_scaler};
use fimc::{
    BufType, BufferState, CaptureHandle, Config, FimcError, FourCc, M2mHandle, PixFormatMplane,
    Rotation, SimulatedDevice, Size,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// Buffers kept in flight per queue
const MAX_INFLIGHT: usize = 4;

/// Simulated sensor frame interval
const FRAME_INTERVAL: Duration = Duration::from_millis(33);

fn parse_size(s: &str) -> Result<Size, Box<dyn std::error::Error>> {
    Size::parse(s).ok_or_else(|| format!("Invalid size '{}', expected WxH", s).into())
}

fn parse_fourcc(s: &str) -> Result<FourCc, Box<dyn std::error::Error>> {
    FourCc::parse(s).ok_or_else(|| format!("Invalid fourcc '{}'", s).into())
}

/// List the format table
pub fn list_formats() -> Result<(), Box<dyn std::error::Error>> {
    println!("Supported formats:");
    println!();
    for (index, fmt) in (0..).map_while(format_by_index).enumerate() {
        let mut usage = Vec::new();
        if fmt.flags.contains(FormatFlags::M2M) {
            usage.push("m2m");
        }
        if fmt.flags.contains(FormatFlags::CAM) {
            usage.push("camera");
        }
        let depth: Vec<String> = fmt.depth[..fmt.memplanes]
            .iter()
            .map(|d| d.to_string())
            .collect();
        println!("  [{}] {} ({})", index, fmt.fourcc, fmt.name);
        println!(
            "      Depth: {} bpp, planes: {} memory / {} colour, usage: {}",
            depth.join("/"),
            fmt.memplanes,
            fmt.colplanes,
            usage.join(", ")
        );
    }
    Ok(())
}

/// Print prescaler and main scaler parameters
pub fn show_scaler(src: &str, dst: &str, rotate: i32) -> Result<(), Box<dyn std::error::Error>> {
    let src = parse_size(src)?;
    let dst = parse_size(dst)?;
    let rotation = Rotation::from_degrees(rotate)
        .ok_or_else(|| format!("Unsupported rotation {}", rotate))?;

    check_scaler_ratio(src, dst, rotation)?;
    let fmt = default_format();
    let params = prepare_scaler(src, fmt, dst, fmt, rotation)?;

    println!("Source: {}  Destination: {}  Rotation: {}", src, dst, rotation.degrees());
    if params.copy_mode {
        println!("Copy mode: no scaling");
        return Ok(());
    }
    println!(
        "Prescaler: {}x{} (shift {}/{}), output {}x{}",
        params.pre_hratio,
        params.pre_vratio,
        params.hfactor,
        params.vfactor,
        params.pre_dst_width,
        params.pre_dst_height
    );
    println!(
        "Main scaler: h {:#x} v {:#x} ({} horizontally, {} vertically)",
        params.main_hratio,
        params.main_vratio,
        if params.scaleup_h { "up" } else { "down" },
        if params.scaleup_v { "up" } else { "down" }
    );
    Ok(())
}

/// Run `frames` transform jobs and report each one
pub fn convert(
    config: Config,
    src_fmt: &str,
    src: &str,
    dst_fmt: &str,
    dst: &str,
    frames: usize,
) -> Result<(), Box<dyn std::error::Error>> {
    if frames == 0 {
        return Err("At least one frame is required".into());
    }
    let src_fourcc = parse_fourcc(src_fmt)?;
    let dst_fourcc = parse_fourcc(dst_fmt)?;
    if find_format(src_fourcc, FormatFlags::M2M).is_none() {
        return Err(format!("Format {} cannot be a transform source", src_fourcc).into());
    }
    let src = parse_size(src)?;
    let dst = parse_size(dst)?;

    let timeout = config.shutdown_timeout() * 10;
    let sim = SimulatedDevice::attach(config, true)?;
    let node = M2mHandle::open(&sim.device)?;

    let out = node.set_format(
        BufType::VideoOutputMplane,
        &PixFormatMplane::new(src_fourcc, src),
    )?;
    let cap = node.set_format(
        BufType::VideoCaptureMplane,
        &PixFormatMplane::new(dst_fourcc, dst),
    )?;
    println!(
        "Transform: {} {}x{} -> {} {}x{}",
        out.pixelformat, out.width, out.height, cap.pixelformat, cap.width, cap.height
    );

    let count = node.reqbufs(BufType::VideoOutputMplane, frames.min(MAX_INFLIGHT))?;
    let count = node.reqbufs(BufType::VideoCaptureMplane, count)?;
    for index in 0..count {
        node.qbuf(BufType::VideoOutputMplane, index)?;
        node.qbuf(BufType::VideoCaptureMplane, index)?;
    }

    let start = Instant::now();
    node.streamon(BufType::VideoOutputMplane)?;
    node.streamon(BufType::VideoCaptureMplane)?;

    let mut queued = count;
    let mut failed = 0;
    for frame in 0..frames {
        let done = node.dqbuf_timeout(BufType::VideoCaptureMplane, timeout)?;
        let source = node.dqbuf_timeout(BufType::VideoOutputMplane, timeout)?;
        if done.state == BufferState::Error {
            failed += 1;
        }
        println!(
            "  [{}] src #{} -> dst #{} at {:#010x}: {:?}",
            frame,
            source.index,
            done.index,
            done.plane_addr(0).unwrap_or(0),
            done.state
        );

        if queued < frames {
            node.qbuf(BufType::VideoOutputMplane, source.index)?;
            node.qbuf(BufType::VideoCaptureMplane, done.index)?;
            queued += 1;
        }
    }

    let scaler = node.ctx().state().scaler;
    println!();
    println!(
        "Converted {} frame(s) in {:.1} ms, {} failed",
        frames,
        start.elapsed().as_secs_f64() * 1000.0,
        failed
    );
    println!(
        "Scaler: prescale {}x{}, main {:#x}/{:#x}{}",
        scaler.pre_hratio,
        scaler.pre_vratio,
        scaler.main_hratio,
        scaler.main_vratio,
        if scaler.copy_mode { " (copy mode)" } else { "" }
    );
    Ok(())
}

/// Stream `frames` frames from the simulated sensor (Ctrl+C stops early)
pub fn capture(config: Config, frames: usize) -> Result<(), Box<dyn std::error::Error>> {
    if !config.has_camera() {
        return Err("No camera sensor configured".into());
    }
    let timeout = config.shutdown_timeout();
    let sim = SimulatedDevice::attach(config, false)?;
    let node = CaptureHandle::open(&sim.device)?;

    let fmt = node.set_format(&PixFormatMplane::new(
        default_format().fourcc,
        SimulatedDevice::SENSOR_MAX,
    ))?;
    println!("Capture format: {} {}x{}", fmt.pixelformat, fmt.width, fmt.height);

    let count = node.reqbufs(MAX_INFLIGHT)?;
    for index in 0..count {
        node.qbuf(index)?;
    }
    node.streamon()?;

    println!("Capturing... (press Ctrl+C to stop early)");
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })?;

    let mut captured = 0;
    let mut idle = 0;
    while captured < frames {
        if stop_flag.load(Ordering::SeqCst) {
            println!();
            println!("Stopping early...");
            break;
        }
        std::thread::sleep(FRAME_INTERVAL);
        sim.hw.advance_frame();
        sim.irq.raise();

        match node.dqbuf_timeout(timeout) {
            Ok(buf) => {
                idle = 0;
                captured += 1;
                let stamp = buf
                    .timestamp
                    .map(|t| t.format("%H:%M:%S%.3f").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "  frame {:>4}  buffer #{}  {}  {:?}",
                    buf.sequence, buf.index, stamp, buf.state
                );
                node.qbuf(buf.index)?;
            }
            // The first interrupts only move buffers into the slots
            Err(FimcError::Retry(_)) if idle < MAX_INFLIGHT => idle += 1,
            Err(err) => return Err(err.into()),
        }
    }

    node.streamoff()?;
    if let Some(status) = sim.device.capture_status() {
        println!();
        println!("Captured {} frame(s), hardware frame count {}", captured, status.frame_count);
    }
    Ok(())
}

/// Print the effective configuration
pub fn print_config(config: &Config) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(config)?);
    Ok(())
}
