// SPDX-License-Identifier: GPL-3.0-only

//! Driver-wide constants

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Platform driver name
pub const MODULE_NAME: &str = "s3c-fimc";

/// Platform device name matched by the driver
pub const PLATFORM_DEVICE_NAME: &str = "s3c64xx-fimc";

/// Driver version reported by the query-capabilities operation (major, minor, patch)
pub const DRIVER_VERSION: (u32, u32, u32) = (1, 0, 0);

/// Maximum horizontal downscale ratio (source / target) of the scaler
pub const SCALER_MAX_HRATIO: u32 = 64;

/// Maximum vertical downscale ratio (source / target) of the scaler
pub const SCALER_MAX_VRATIO: u32 = 64;

/// Upper bound (exclusive) of source/target accepted by the prescaler
pub const PRESCALER_MAX_RATIO: u32 = 64;

/// Largest prescaler shift factor (ratio 32)
pub const PRESCALER_MAX_SHIFT: u32 = 5;

/// Fraction bits of the main scaler fixed-point ratio
pub const MAIN_SCALER_FRACTION_BITS: u32 = 8;

/// Number of hardware output buffer address slots
pub const FIMC_MAX_OUT_BUFS: usize = 4;

/// Bounded wait for the interrupt path to acknowledge shutdown or suspend
pub const FIMC_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(100);

/// Maximum number of colour planes of any supported format
pub const FIMC_MAX_PLANES: usize = 3;

/// Register window of the camera interface block on S3C64xx
pub const S3C64XX_PA_FIMC: u64 = 0x7800_0000;

/// Size of the register window
pub const S3C64XX_SZ_FIMC: u64 = 0x10_0000;

/// Clocks consumed by the FIMC block
///
/// The camera clock is only requested when at least one sensor is attached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FimcClock {
    /// Bus clock, enabled for the whole lifetime of the device
    Bus,
    /// Gate clock, toggled by runtime power management
    Gate,
    /// Camera (sensor master) clock
    Camera,
}

impl FimcClock {
    /// All clocks in acquisition order
    pub const ALL: [FimcClock; 3] = [FimcClock::Bus, FimcClock::Gate, FimcClock::Camera];

    /// Clock name as registered by the platform
    pub fn clock_name(&self) -> &'static str {
        match self {
            FimcClock::Bus => "fimc",
            FimcClock::Gate => "camif",
            FimcClock::Camera => "camera",
        }
    }

    /// Clocks needed for a device with or without attached sensors
    pub fn required(with_camera: bool) -> &'static [FimcClock] {
        if with_camera {
            &Self::ALL
        } else {
            &Self::ALL[..2]
        }
    }
}

impl std::fmt::Display for FimcClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.clock_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_clocks() {
        assert_eq!(FimcClock::required(false).len(), 2);
        assert_eq!(FimcClock::required(true).len(), 3);
        assert_eq!(FimcClock::required(true)[2], FimcClock::Camera);
    }

    #[test]
    fn test_prescaler_bounds_consistent() {
        assert_eq!(1u32 << (PRESCALER_MAX_SHIFT + 1), PRESCALER_MAX_RATIO);
    }
}
