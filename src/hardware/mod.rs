// SPDX-License-Identifier: GPL-3.0-only

//! Hardware abstraction
//!
//! [`FimcHardware`] is the programming interface of one FIMC block at the
//! level the driver core needs: addresses, paths, scaler and rotator setup,
//! and the capture/DMA enables. [`CameraSensor`] is the camera attached to
//! the capture input. Completion is signalled through an [`IrqLine`].
//!
//! - [`simulated`]: in-memory block and sensor used by tests and the CLI

pub mod simulated;

pub use simulated::{HwOp, SimHandle, SimulatedFimc, SimulatedSensor};

use crate::context::{ContextState, PlaneAddrs};
use crate::errors::FimcResult;
use crate::media::scaler::ScalerParams;
use crate::media::types::{Flip, Rotation, Size};
use std::sync::mpsc::{self, Receiver, Sender};
use tracing::warn;

/// Output address slot selection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputSlot {
    /// Program the same address into every slot
    All,
    /// A single slot
    Slot(usize),
}

/// Register programming interface of a FIMC block
///
/// Implementations must be cheap and non-blocking: every method is called
/// with the device lock held, some from the interrupt path.
pub trait FimcHardware: Send {
    /// Software reset to a known idle state
    fn reset(&mut self);

    /// Acknowledge the pending interrupt
    fn clear_irq(&mut self);

    /// Source plane addresses of the next transform
    fn set_input_addr(&mut self, addr: &PlaneAddrs);

    /// Route the input from memory, with colour format and YUV order
    fn set_input_path(&mut self, ctx: &ContextState);

    /// Input DMA geometry (full size, crop offsets)
    fn set_in_dma(&mut self, ctx: &ContextState);

    /// Route the input from the camera port
    fn set_camera_source(&mut self, ctx: &ContextState);

    fn set_prescaler(&mut self, scaler: &ScalerParams);

    fn set_main_scaler(&mut self, scaler: &ScalerParams);

    /// Output colour format and target size
    fn set_target_format(&mut self, ctx: &ContextState);

    fn set_rotation(&mut self, rotation: Rotation, flip: Flip);

    /// Image effect; the driver always programs "none"
    fn set_effect(&mut self);

    /// Route the output to memory
    fn set_output_path(&mut self, ctx: &ContextState);

    /// Destination plane addresses for one or all output slots
    fn set_output_addr(&mut self, addr: &PlaneAddrs, slot: OutputSlot);

    /// Output DMA geometry and YUV order
    fn set_out_dma(&mut self, ctx: &ContextState);

    /// Start the capture/output engine
    fn activate_capture(&mut self);

    /// Stop the capture/output engine after the current frame
    fn deactivate_capture(&mut self);

    /// Start (or stop) fetching from the input DMA; starting kicks a transform
    fn activate_input_dma(&mut self, enable: bool);

    /// Output slot the hardware writes next
    fn frame_index(&self) -> usize;
}

/// Camera bus format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MbusFormat {
    pub code: u32,
    pub size: Size,
}

/// Camera sensor attached to the capture port
pub trait CameraSensor: Send {
    fn name(&self) -> &str;

    /// Current bus format
    fn mbus_format(&self) -> MbusFormat;

    /// Request a bus format; returns what the sensor actually applied
    fn set_mbus_format(&mut self, fmt: MbusFormat) -> FimcResult<MbusFormat>;

    /// Start or stop streaming
    fn s_stream(&mut self, enable: bool) -> FimcResult<()>;
}

/// Interrupt raised by the block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    /// A transform finished or a capture frame was written
    FrameDone,
}

/// Sending side of the block's interrupt line
#[derive(Debug, Clone)]
pub struct IrqLine {
    tx: Sender<IrqEvent>,
}

impl IrqLine {
    /// Create a line and the receiver the interrupt worker drains
    pub fn new() -> (Self, Receiver<IrqEvent>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx }, rx)
    }

    /// Raise the interrupt; false once nobody listens any more
    pub fn raise(&self) -> bool {
        match self.tx.send(IrqEvent::FrameDone) {
            Ok(()) => true,
            Err(_) => {
                warn!("Interrupt raised with no handler attached");
                false
            }
        }
    }
}
