//! # Void Engine - Ballistic Block Allocation
//!
//! `void-engine` places the blocks of an object by computing where they go
//! instead of searching free lists. Every object carries a small trajectory
//! identity; the physical block for any logical index follows from a single
//! modular formula, so locating block one million costs the same as block
//! zero.
//!
//! - **Ballistic placement**: O(1) address resolution for any logical index
//! - **Orbital shells**: collisions move outward along deterministic shells
//! - **Armored bitmap**: every 64-bit word is guarded by a Hamming code and
//!   single-bit upsets are healed in place
//! - **Quality mask**: toxic media is never handed out
//! - **Horizon ring**: bounded fallback once the flux span saturates
//! - **Profiles**: Generic, Pico, Ai and Metadata placement policies
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use void_engine::{Intent, Profile, Result, Volume, VolumeConfig, VoidAllocator};
//!
//! # fn main() -> Result<()> {
//! // 1 GiB volume with 4 KiB blocks
//! let config = VolumeConfig::with_layout(1 << 30, 4096, Profile::Generic)?;
//! let allocator = VoidAllocator::new(Volume::mount(&config)?);
//!
//! // New object of 16 blocks
//! let (anchor, blocks) = allocator.allocate_object(0, Intent::Default, 16)?;
//!
//! // Any logical block resolves without touching the bitmap
//! if let Some(anchor) = anchor {
//!     let first = allocator.volume().resolve(&anchor, 0, 0);
//!     println!("block 0 lives at {:?}", first);
//! }
//! # let _ = blocks;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +----------------+   identity   +--------------+
//! |    genesis     |------------->| orchestrator |
//! +----------------+              +--------------+
//!         |                         |    |     |
//!     topology,                     |    |     +--> horizon ring
//!     saturation        trajectory -+    |
//!                                        v
//!                          armored bitmap + quality mask
//! ```

pub mod core;
pub mod error;

pub use crate::core::allocator::bitmap::{ArmoredBitmap, ArmoredWord, BitOutcome, BitmapOp};
pub use crate::core::allocator::genesis::{genesis, genesis_with_rng, AcceleratorContext, Genesis};
pub use crate::core::allocator::orchestrator::{
    allocate, allocate_horizon, free, Allocation, VoidAllocator, HORIZON_SHELL,
};
pub use crate::core::allocator::quality::{Quality, QualityMask};
pub use crate::core::allocator::trajectory::{resolve_trajectory, Anchor};
pub use crate::core::allocator::BlockAllocator;
pub use crate::core::config::{DeviceKind, Geometry, Profile, TopologyEntry, VolumeConfig};
pub use crate::core::profile::{Intent, ProfilePolicy};
pub use crate::core::volume::{Volume, VolumeStats, FLAG_PANIC, FLAG_SATURATED};
pub use crate::error::{Result, VoidError};
