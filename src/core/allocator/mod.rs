//! Ballistic block allocation for the Void Engine
//!
//! The allocator computes addresses instead of searching for them:
//! - [`trajectory`] maps (identity, logical index, shell) to a block
//! - [`genesis`] chooses the identity of a new object
//! - [`bitmap`] commits blocks through error-corrected atomic words
//! - [`quality`] filters out toxic media
//! - [`horizon`] is the fallback ring once the flux span saturates
//! - [`orchestrator`] ties the pieces into allocate/free

pub mod bitmap;
pub mod genesis;
pub mod horizon;
pub mod orchestrator;
pub mod quality;
pub mod trajectory;

use crate::core::allocator::orchestrator::Allocation;
use crate::core::allocator::trajectory::Anchor;
use crate::error::Result;

/// Block allocator trait
///
/// Defines the interface for mapping logical blocks of an object to physical
/// blocks and releasing them again. Implementations are shared between
/// threads, so every method takes `&self`.
pub trait BlockAllocator {
    /// Allocate the physical block for `logical` of the object `anchor`
    fn allocate(&self, anchor: &Anchor, logical: u64) -> Result<Allocation>;

    /// Free a previously allocated block
    fn free(&self, address: u64) -> Result<()>;

    /// Get total number of blocks managed
    fn total_blocks(&self) -> u64;

    /// Get number of blocks currently allocated
    fn used_blocks(&self) -> u64;
}
