// SPDX-License-Identifier: MPL-2.0

//! Pixel formats, geometry and scaler math
//!
//! This module holds the pure, hardware-independent parts of the driver:
//!
//! # Format Table
//!
//! The [`formats`] module is the static registry of pixel formats the
//! post-processor handles, searchable by fourcc or by camera bus code.
//!
//! # Scaling
//!
//! The [`scaler`] module computes prescaler and main scaler ratios and
//! rejects geometries outside the scaler's 64x downscale range.
//!
//! # Modules
//!
//! - [`formats`]: Format table and lookups
//! - [`geometry`]: Size clamping and alignment helpers
//! - [`scaler`]: Prescaler/main scaler ratio computation
//! - [`types`]: Size, crop rectangle, rotation and flip types

pub mod formats;
pub mod geometry;
pub mod scaler;
pub mod types;

// Re-export commonly used types
pub use formats::{ColorFormat, FormatFlags, FourCc, PixelFormat, find_format, find_mbus_format};
pub use scaler::{ScalerParams, check_scaler_ratio, compute_factor, prepare_scaler};
pub use types::{Flip, Rect, Rotation, Size};
