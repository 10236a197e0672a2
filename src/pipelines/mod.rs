// SPDX-License-Identifier: MPL-2.0

//! Processing pipelines sharing the FIMC block
//!
//! ```text
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Source queue │ ──▶ │   M2M Pipeline    │ ──▶ │  Dest queue  │
//! │  (output)    │     │  - Prescaler      │     │  (capture)   │
//! │              │     │  - Main scaler    │     │              │
//! │              │     │  - Rotator/flip   │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//!
//! ┌──────────────┐     ┌───────────────────┐     ┌──────────────┐
//! │ Camera port  │ ──▶ │ Capture Pipeline  │ ──▶ │ Capture queue│
//! │  (sensor)    │     │  - Pending list   │     │              │
//! │              │     │  - Output slots   │     │              │
//! └──────────────┘     └───────────────────┘     └──────────────┘
//! ```
//!
//! Only one pipeline owns the hardware at a time; the interrupt dispatcher
//! routes each completion by the device's operating mode.
//!
//! # Modules
//!
//! - [`m2m`]: memory-to-memory job engine and scheduler
//! - [`capture`]: camera capture with hardware slot ring

pub mod capture;
pub mod m2m;
