//! Horizon ring
//!
//! Bounded circular log region `[horizon_start, journal_start)` used once
//! the flux span is saturated. The write head is a single atomic counter;
//! each claim takes the next slot and commits it through the armored bitmap
//! like any ballistic hit.

use crate::core::allocator::bitmap::BitmapOp;
use crate::core::volume::Volume;
use crate::error::{Result, VoidError};
use tracing::{debug, warn};

/// Claim the next free horizon slot
///
/// Walks at most one lap of the ring from the write head. Returns the
/// absolute block address; the caller accounts for the allocation.
pub fn claim_slot(volume: &Volume) -> Result<u64> {
    let geometry = volume.geometry();
    let ring = geometry.horizon_len();
    if ring == 0 {
        return Err(VoidError::HorizonFull);
    }

    for _ in 0..ring {
        let slot = volume.advance_horizon_head() % ring;
        let block = geometry.horizon_start + slot;

        if !volume.quality(block).is_usable() {
            warn!("Skipping toxic horizon slot {}", slot);
            continue;
        }

        if volume.bitmap_op(BitmapOp::Set, block)?.changed() {
            debug!("Horizon slot {} claimed (block {})", slot, block);
            return Ok(block);
        }
    }

    Err(VoidError::HorizonFull)
}
