// SPDX-License-Identifier: MPL-2.0

//! FIMC - Samsung S3C64xx camera interface and video post-processor core
//!
//! This library drives the FIMC block in its two operating modes: as a
//! memory-to-memory transform engine (scaling, colour conversion, rotation
//! and flipping between two buffers) and as a camera capture path feeding
//! frames from a sensor into a ring of hardware output slots.
//!
//! # Architecture
//!
//! The crate is organized into several modules:
//!
//! - [`media`]: Format table, geometry helpers and scaler math
//! - [`context`]: Per-open frame state, format negotiation and controls
//! - [`queue`]: Video buffer queues, DMA pool and the output slot ring
//! - [`hardware`]: Register-programming trait and the simulated block
//! - [`platform`]: Board resources acquired at attach
//! - [`device`]: Device instance, interrupt dispatch and power management
//! - [`pipelines`]: M2M job engine and capture pipeline
//! - [`node`]: Video node handles applications open
//! - [`config`]: Variant limits and driver configuration
//!
//! # Example
//!
//! ```no_run
//! use fimc::{Config, M2mHandle, SimulatedDevice};
//!
//! let sim = SimulatedDevice::attach(Config::default(), true)?;
//! let node = M2mHandle::open(&sim.device)?;
//! println!("{}", node.querycap().card);
//! # Ok::<(), fimc::FimcError>(())
//! ```

pub mod config;
pub mod constants;
pub mod context;
pub mod device;
pub mod errors;
pub mod hardware;
pub mod media;
pub mod node;
pub mod pipelines;
pub mod platform;
pub mod queue;

// Re-export commonly used types
pub use config::{Config, Variant};
pub use context::{Context, ControlId, PixFormatMplane};
pub use device::{Board, CaptureStatus, Device, M2mPhase, OperatingMode, SimulatedDevice};
pub use errors::{FimcError, FimcResult};
pub use media::{FourCc, Rect, Rotation, Size};
pub use node::{CaptureHandle, M2mHandle};
pub use queue::{BufType, BufferState, VideoBuffer};
