//! Volume configuration and geometry
//!
//! The superblock formatter owns the on-disk layout; this module is the
//! read-only view the allocator consumes at mount time. Configurations are
//! plain serde structs so they can be loaded from TOML:
//!
//! ```toml
//! block_size = 4096
//! total_blocks = 262144
//! flux_start = 8
//! horizon_start = 256000
//! journal_start = 260096
//! profile = "generic"
//! device = "flash"
//! quality_mask = true
//!
//! [[topology]]
//! device_id = 0
//! window_start = 0
//! window_len = 65536
//! affinity = 100
//! ```

use crate::error::{Result, VoidError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Smallest supported block size in bytes
pub const MIN_BLOCK_SIZE: u32 = 512;

/// Blocks reserved ahead of the flux region for the superblock
pub const SUPERBLOCK_RESERVE: u64 = 8;

/// Operating profile, chosen once when the volume is mounted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// General purpose volume
    #[default]
    Generic,
    /// Memory-constrained, sequential-only volume without a quality mask
    Pico,
    /// Accelerator-attached volume (topology-aware placement)
    Ai,
    /// Metadata-heavy volume; every object is placed near the span start
    Metadata,
}

/// Media type reported by the formatter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceKind {
    #[default]
    Flash,
    Rotational,
    /// Zoned media with strict linear write order
    ZonedLinear,
}

impl DeviceKind {
    pub fn is_zoned(self) -> bool {
        matches!(self, DeviceKind::ZonedLinear)
    }
}

/// One row of the accelerator topology table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopologyEntry {
    /// Accelerator device identifier
    pub device_id: u32,
    /// First block of the window, relative to the flux start
    pub window_start: u64,
    /// Number of blocks in the window
    pub window_len: u64,
    /// Placement affinity weight
    #[serde(default)]
    pub affinity: u32,
}

/// Block layout of a mounted volume
///
/// ```text
/// [0, flux_start)                 superblock reserve
/// [flux_start, horizon_start)     flux (ballistic trajectories)
/// [horizon_start, journal_start)  horizon ring
/// [journal_start, total_blocks)   journal
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u32,
    pub total_blocks: u64,
    pub flux_start: u64,
    pub horizon_start: u64,
    pub journal_start: u64,
    pub device: DeviceKind,
}

impl Geometry {
    /// Usable trajectory span (`Phi`) in blocks
    pub fn span(&self) -> u64 {
        self.horizon_start.saturating_sub(self.flux_start)
    }

    /// Number of slots in the horizon ring
    pub fn horizon_len(&self) -> u64 {
        self.journal_start.saturating_sub(self.horizon_start)
    }

    /// Capacity of the volume in bytes, saturating at `u64::MAX`
    pub fn capacity_bytes(&self) -> u64 {
        self.total_blocks.saturating_mul(self.block_size as u64)
    }

    pub fn in_flux(&self, block: u64) -> bool {
        block >= self.flux_start && block < self.horizon_start
    }

    pub fn in_horizon(&self, block: u64) -> bool {
        block >= self.horizon_start && block < self.journal_start
    }
}

/// Mount-time configuration of a volume
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeConfig {
    pub block_size: u32,
    pub total_blocks: u64,
    pub flux_start: u64,
    pub horizon_start: u64,
    pub journal_start: u64,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub device: DeviceKind,
    /// Track per-block media quality (ignored on profiles without a mask)
    #[serde(default = "default_quality_mask")]
    pub quality_mask: bool,
    #[serde(default)]
    pub topology: Vec<TopologyEntry>,
}

fn default_quality_mask() -> bool {
    true
}

impl VolumeConfig {
    /// Build the default layout for a device of `capacity_bytes`
    ///
    /// Reserves [`SUPERBLOCK_RESERVE`] blocks up front, 1/128 of the device
    /// for the journal and 1/64 for the horizon ring; the rest is flux.
    pub fn with_layout(capacity_bytes: u64, block_size: u32, profile: Profile) -> Result<Self> {
        if block_size < MIN_BLOCK_SIZE || !block_size.is_power_of_two() {
            return Err(VoidError::InvalidGeometry(format!(
                "block size {} must be a power of two >= {}",
                block_size, MIN_BLOCK_SIZE
            )));
        }

        let total_blocks = capacity_bytes / block_size as u64;
        let journal_len = (total_blocks / 128).max(1);
        let horizon_len = (total_blocks / 64).max(1);

        let journal_start = total_blocks.saturating_sub(journal_len);
        let horizon_start = journal_start.saturating_sub(horizon_len);

        let config = VolumeConfig {
            block_size,
            total_blocks,
            flux_start: SUPERBLOCK_RESERVE,
            horizon_start,
            journal_start,
            profile,
            device: DeviceKind::default(),
            quality_mask: true,
            topology: Vec::new(),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML configuration
    pub fn from_toml_str(input: &str) -> Result<Self> {
        let config: VolumeConfig = toml::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML configuration file
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self> {
        let input = std::fs::read_to_string(path)?;
        Self::from_toml_str(&input)
    }

    /// Check the layout boundaries
    pub fn validate(&self) -> Result<()> {
        if self.block_size < MIN_BLOCK_SIZE || !self.block_size.is_power_of_two() {
            return Err(VoidError::InvalidGeometry(format!(
                "block size {} must be a power of two >= {}",
                self.block_size, MIN_BLOCK_SIZE
            )));
        }

        if self.flux_start >= self.horizon_start {
            return Err(VoidError::InvalidGeometry(format!(
                "flux start ({}) must precede horizon start ({})",
                self.flux_start, self.horizon_start
            )));
        }

        if self.horizon_start > self.journal_start || self.journal_start > self.total_blocks {
            return Err(VoidError::InvalidGeometry(format!(
                "horizon [{}, {}) must end inside the volume ({} blocks)",
                self.horizon_start, self.journal_start, self.total_blocks
            )));
        }

        Ok(())
    }

    pub fn geometry(&self) -> Geometry {
        Geometry {
            block_size: self.block_size,
            total_blocks: self.total_blocks,
            flux_start: self.flux_start,
            horizon_start: self.horizon_start,
            journal_start: self.journal_start,
            device: self.device,
        }
    }

    pub fn with_device(mut self, device: DeviceKind) -> Self {
        self.device = device;
        self
    }

    pub fn with_topology(mut self, topology: Vec<TopologyEntry>) -> Self {
        self.topology = topology;
        self
    }
}
