// SPDX-License-Identifier: GPL-3.0-only

//! Simulated FIMC block and camera sensor
//!
//! The simulated block records every programming call so tests can check
//! what the driver did, and can raise its completion interrupt by itself
//! when a transform is kicked.

use super::{CameraSensor, FimcHardware, IrqLine, MbusFormat, OutputSlot};
use crate::context::{ContextState, PlaneAddrs};
use crate::errors::{FimcError, FimcResult};
use crate::media::formats::{FourCc, mbus};
use crate::media::scaler::ScalerParams;
use crate::media::types::{Flip, Rotation, Size};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

/// One recorded programming step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HwOp {
    Reset,
    ClearIrq,
    InputAddr(PlaneAddrs),
    InputPath { fourcc: FourCc },
    InDma { width: u32, height: u32 },
    CameraSource { fourcc: FourCc, size: Size },
    Prescaler { hratio: u32, vratio: u32 },
    MainScaler { hratio: u32, vratio: u32, copy_mode: bool },
    TargetFormat { fourcc: FourCc, size: Size },
    Rotation { rotation: Rotation, flip: Flip },
    Effect,
    OutputPath,
    OutputAddr { addr: PlaneAddrs, slot: OutputSlot },
    OutDma { width: u32, height: u32 },
    ActivateCapture,
    DeactivateCapture,
    InputDma(bool),
}

#[derive(Debug)]
struct SimState {
    ops: Vec<HwOp>,
    slots: Vec<PlaneAddrs>,
    capture_active: bool,
    frame_index: usize,
}

/// Inspection handle shared with a [`SimulatedFimc`]
#[derive(Debug, Clone)]
pub struct SimHandle {
    state: Arc<Mutex<SimState>>,
}

impl SimHandle {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Every operation recorded so far
    pub fn ops(&self) -> Vec<HwOp> {
        self.lock().ops.clone()
    }

    /// Number of recorded operations matching `pred`
    pub fn count(&self, pred: impl Fn(&HwOp) -> bool) -> usize {
        self.lock().ops.iter().filter(|op| pred(op)).count()
    }

    pub fn clear(&self) {
        self.lock().ops.clear();
    }

    pub fn capture_active(&self) -> bool {
        self.lock().capture_active
    }

    /// Address programmed into output slot `slot`
    pub fn output_slot(&self, slot: usize) -> Option<PlaneAddrs> {
        self.lock().slots.get(slot).copied()
    }

    /// Advance the hardware to the next output slot, as after a captured frame
    pub fn advance_frame(&self) {
        let mut state = self.lock();
        let len = state.slots.len().max(1);
        state.frame_index = (state.frame_index + 1) % len;
    }
}

/// In-memory FIMC block
pub struct SimulatedFimc {
    state: Arc<Mutex<SimState>>,
    irq: Option<IrqLine>,
}

impl SimulatedFimc {
    /// A block with `slots` output address slots
    pub fn new(slots: usize) -> Self {
        Self {
            state: Arc::new(Mutex::new(SimState {
                ops: Vec::new(),
                slots: vec![PlaneAddrs::default(); slots.max(1)],
                capture_active: false,
                frame_index: 0,
            })),
            irq: None,
        }
    }

    /// Raise `irq` whenever a transform is started
    pub fn with_auto_complete(mut self, irq: IrqLine) -> Self {
        self.irq = Some(irq);
        self
    }

    pub fn handle(&self) -> SimHandle {
        SimHandle {
            state: Arc::clone(&self.state),
        }
    }

    fn record(&self, op: HwOp) -> MutexGuard<'_, SimState> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        debug!(?op, "hw");
        state.ops.push(op);
        state
    }
}

impl FimcHardware for SimulatedFimc {
    fn reset(&mut self) {
        let mut state = self.record(HwOp::Reset);
        state.capture_active = false;
        state.frame_index = 0;
    }

    fn clear_irq(&mut self) {
        self.record(HwOp::ClearIrq);
    }

    fn set_input_addr(&mut self, addr: &PlaneAddrs) {
        self.record(HwOp::InputAddr(*addr));
    }

    fn set_input_path(&mut self, ctx: &ContextState) {
        self.record(HwOp::InputPath {
            fourcc: ctx.s_frame.fmt.fourcc,
        });
    }

    fn set_in_dma(&mut self, ctx: &ContextState) {
        self.record(HwOp::InDma {
            width: ctx.s_frame.f_width,
            height: ctx.s_frame.f_height,
        });
    }

    fn set_camera_source(&mut self, ctx: &ContextState) {
        self.record(HwOp::CameraSource {
            fourcc: ctx.s_frame.fmt.fourcc,
            size: ctx.s_frame.size(),
        });
    }

    fn set_prescaler(&mut self, scaler: &ScalerParams) {
        self.record(HwOp::Prescaler {
            hratio: scaler.pre_hratio,
            vratio: scaler.pre_vratio,
        });
    }

    fn set_main_scaler(&mut self, scaler: &ScalerParams) {
        self.record(HwOp::MainScaler {
            hratio: scaler.main_hratio,
            vratio: scaler.main_vratio,
            copy_mode: scaler.copy_mode,
        });
    }

    fn set_target_format(&mut self, ctx: &ContextState) {
        self.record(HwOp::TargetFormat {
            fourcc: ctx.d_frame.fmt.fourcc,
            size: ctx.d_frame.size(),
        });
    }

    fn set_rotation(&mut self, rotation: Rotation, flip: Flip) {
        self.record(HwOp::Rotation { rotation, flip });
    }

    fn set_effect(&mut self) {
        self.record(HwOp::Effect);
    }

    fn set_output_path(&mut self, _ctx: &ContextState) {
        self.record(HwOp::OutputPath);
    }

    fn set_output_addr(&mut self, addr: &PlaneAddrs, slot: OutputSlot) {
        let mut state = self.record(HwOp::OutputAddr { addr: *addr, slot });
        match slot {
            OutputSlot::All => state.slots.iter_mut().for_each(|s| *s = *addr),
            OutputSlot::Slot(i) => {
                if let Some(s) = state.slots.get_mut(i) {
                    *s = *addr;
                }
            }
        }
    }

    fn set_out_dma(&mut self, ctx: &ContextState) {
        self.record(HwOp::OutDma {
            width: ctx.d_frame.f_width,
            height: ctx.d_frame.f_height,
        });
    }

    fn activate_capture(&mut self) {
        self.record(HwOp::ActivateCapture).capture_active = true;
    }

    fn deactivate_capture(&mut self) {
        self.record(HwOp::DeactivateCapture).capture_active = false;
    }

    fn activate_input_dma(&mut self, enable: bool) {
        drop(self.record(HwOp::InputDma(enable)));
        if enable && let Some(irq) = &self.irq {
            irq.raise();
        }
    }

    fn frame_index(&self) -> usize {
        self.state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .frame_index
    }
}

/// In-memory camera sensor producing YUYV frames
#[derive(Debug)]
pub struct SimulatedSensor {
    name: String,
    format: MbusFormat,
    max: Size,
    streaming: bool,
    /// Fail the next stream-on request
    pub fail_stream_on: bool,
}

impl SimulatedSensor {
    pub fn new(name: &str, max: Size) -> Self {
        Self {
            name: name.to_string(),
            format: MbusFormat {
                code: mbus::YUYV8_2X8,
                size: max,
            },
            max,
            streaming: false,
            fail_stream_on: false,
        }
    }

    /// Use a different bus code
    pub fn with_code(mut self, code: u32) -> Self {
        self.format.code = code;
        self
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
    }
}

impl CameraSensor for SimulatedSensor {
    fn name(&self) -> &str {
        &self.name
    }

    fn mbus_format(&self) -> MbusFormat {
        self.format
    }

    fn set_mbus_format(&mut self, fmt: MbusFormat) -> FimcResult<MbusFormat> {
        if fmt.size.width == 0 || fmt.size.height == 0 {
            return Err(FimcError::InvalidGeometry(format!(
                "sensor cannot produce {}",
                fmt.size
            )));
        }
        self.format.size = Size::new(
            fmt.size.width.min(self.max.width),
            fmt.size.height.min(self.max.height),
        );
        Ok(self.format)
    }

    fn s_stream(&mut self, enable: bool) -> FimcResult<()> {
        if enable && self.fail_stream_on {
            return Err(FimcError::NoDevice(format!("{} not responding", self.name)));
        }
        self.streaming = enable;
        Ok(())
    }
}
