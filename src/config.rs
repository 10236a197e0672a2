// SPDX-License-Identifier: GPL-3.0-only

use crate::constants::{FIMC_MAX_OUT_BUFS, FIMC_SHUTDOWN_TIMEOUT};
use crate::errors::{FimcError, FimcResult};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Largest number of hardware output slots a variant can expose
pub const MAX_OUTPUT_SLOTS: usize = 32;

/// Pixel limits of a FIMC variant
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PixLimit {
    /// Maximum width with the scaler enabled
    pub scaler_en_w: u32,
    /// Maximum width with the scaler disabled
    pub scaler_dis_w: u32,
    /// Maximum input width with the input rotator enabled
    pub in_rot_en_h: u32,
    /// Maximum output width with the output rotator enabled
    pub out_rot_en_w: u32,
    /// Maximum output width with the output rotator disabled
    pub out_rot_dis_w: u32,
}

impl Default for PixLimit {
    fn default() -> Self {
        Self {
            scaler_en_w: 2048,
            scaler_dis_w: 4096,
            in_rot_en_h: 2048,
            out_rot_en_w: 2048,
            out_rot_dis_w: 2048,
        }
    }
}

/// Per-SoC capabilities of the FIMC block
#[derive(Debug, Clone, Copy, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Variant {
    /// Minimum input size in pixels
    pub min_inp_pixsize: u32,
    /// Minimum output size in pixels
    pub min_out_pixsize: u32,
    /// Horizontal crop offset alignment
    pub hor_offs_align: u32,
    /// DMA offsets are given in pixels rather than bytes
    pub pix_hoff: bool,
    /// The transform path has a rotator (90°/270° allowed)
    pub has_rotator: bool,
    pub pix_limit: PixLimit,
}

impl Default for Variant {
    /// The S3C64xx variant
    fn default() -> Self {
        Self {
            min_inp_pixsize: 16,
            min_out_pixsize: 16,
            hor_offs_align: 8,
            pix_hoff: false,
            has_rotator: false,
            pix_limit: PixLimit::default(),
        }
    }
}

/// Driver configuration
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Instance id of the FIMC block
    pub device_id: u32,
    /// Hardware capabilities
    pub variant: Variant,
    /// Bound of the shutdown / suspend handshake wait, in milliseconds
    pub shutdown_timeout_ms: u64,
    /// Number of hardware output buffer slots used by capture
    pub output_slots: usize,
    /// Bus address of the contiguous DMA pool
    pub dma_pool_base: u64,
    /// Size of the contiguous DMA pool in bytes
    pub dma_pool_size: u64,
    /// Number of camera sensors attached (0 = no capture node)
    pub sensors: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device_id: 0,
            variant: Variant::default(),
            shutdown_timeout_ms: FIMC_SHUTDOWN_TIMEOUT.as_millis() as u64,
            output_slots: FIMC_MAX_OUT_BUFS,
            dma_pool_base: 0x5000_0000,
            dma_pool_size: 64 * 1024 * 1024,
            sensors: 1,
        }
    }
}

impl Config {
    /// Shutdown timeout as a Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }

    /// Whether a capture node is created at attach time
    pub fn has_camera(&self) -> bool {
        self.sensors > 0
    }

    /// Default location: `$XDG_CONFIG_HOME/fimc/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("fimc").join("config.json"))
    }

    /// Check the configuration for values the driver cannot honour
    pub fn validate(&self) -> FimcResult<()> {
        if self.output_slots == 0 || self.output_slots > MAX_OUTPUT_SLOTS {
            return Err(FimcError::Config(format!(
                "output_slots must be in 1..={}, got {}",
                MAX_OUTPUT_SLOTS, self.output_slots
            )));
        }
        if self.shutdown_timeout_ms == 0 {
            return Err(FimcError::Config(
                "shutdown_timeout_ms must be non-zero".to_string(),
            ));
        }
        if self.dma_pool_size == 0 {
            return Err(FimcError::Config("dma_pool_size must be non-zero".to_string()));
        }
        if self.variant.min_inp_pixsize == 0 || self.variant.min_out_pixsize == 0 {
            return Err(FimcError::Config(
                "minimum pixel sizes must be non-zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Load and validate a JSON configuration file
    pub fn load(path: &Path) -> FimcResult<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    /// Load `path` if given, else the default path if it exists, else defaults
    pub fn load_or_default(path: Option<&Path>) -> FimcResult<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Write the configuration as pretty JSON, creating parent directories
    pub fn save(&self, path: &Path) -> FimcResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(path, text)?;
        info!(path = %path.display(), "Saved configuration");
        Ok(())
    }
}
