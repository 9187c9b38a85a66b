//! Allocation orchestrator
//!
//! Drives the orbital-shell probing loop:
//!
//! 1. For each shell K, resolve the trajectory, skip Toxic media and try to
//!    set the bit. The first bit this call flips wins.
//! 2. Once every shell collided, fall back to the horizon ring unless the
//!    volume is already saturated.
//! 3. Count the allocation.
//!
//! Two callers racing the same identity and logical index resolve the same
//! candidate; exactly one wins the bitmap CAS and the other moves outward to
//! the next shell, so the final addresses are always distinct.

use crate::core::allocator::bitmap::BitmapOp;
use crate::core::allocator::genesis::{self, AcceleratorContext, Genesis};
use crate::core::allocator::horizon;
use crate::core::allocator::trajectory::Anchor;
use crate::core::allocator::BlockAllocator;
use crate::core::profile::Intent;
use crate::core::volume::Volume;
use crate::error::{Result, VoidError};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Shell reported for horizon allocations
pub const HORIZON_SHELL: u8 = 15;

/// A committed block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Allocation {
    /// Absolute block address
    pub address: u64,
    /// Orbital shell that produced it, or [`HORIZON_SHELL`]
    pub shell: u8,
}

impl Allocation {
    pub fn is_horizon(&self) -> bool {
        self.shell == HORIZON_SHELL
    }
}

/// Allocate the physical block for `logical` of the object `anchor`
pub fn allocate(volume: &Volume, anchor: &Anchor, logical: u64) -> Result<Allocation> {
    let policy = volume.policy();

    for shell in 0..policy.max_shells() {
        let block = volume.resolve(anchor, logical, shell).ok_or_else(|| {
            VoidError::InvalidGeometry("volume has no flux span".to_string())
        })?;

        if !volume.quality(block).is_usable() {
            warn!("Shell {} candidate {} is toxic; skipping", shell, block);
            continue;
        }

        if volume.bitmap_op(BitmapOp::Set, block)?.changed() {
            volume.record_allocation();
            if shell > 0 {
                debug!("Logical {} settled on shell {} at {}", logical, shell, block);
            }
            return Ok(Allocation {
                address: block,
                shell,
            });
        }
    }

    if policy.sequential_only() {
        return Err(VoidError::Collapse {
            logical_index: logical,
        });
    }

    if !volume.is_saturated() {
        debug!("Logical {} exhausted all shells; trying horizon", logical);
        match horizon::claim_slot(volume) {
            Ok(block) => {
                volume.record_allocation();
                return Ok(Allocation {
                    address: block,
                    shell: HORIZON_SHELL,
                });
            }
            Err(VoidError::HorizonFull) => {}
            Err(err) => return Err(err),
        }
    }

    Err(VoidError::Collapse {
        logical_index: logical,
    })
}

/// Allocate directly from the horizon ring
///
/// Used for objects whose genesis answered [`Genesis::HorizonFallback`].
pub fn allocate_horizon(volume: &Volume) -> Result<Allocation> {
    let block = horizon::claim_slot(volume)?;
    volume.record_allocation();
    Ok(Allocation {
        address: block,
        shell: HORIZON_SHELL,
    })
}

/// Release a block; freeing a free block is a no-op
pub fn free(volume: &Volume, address: u64) -> Result<()> {
    if volume.bitmap_op(BitmapOp::Clear, address)?.changed() {
        volume.record_free();
    } else {
        warn!("Double-free detected for block {}", address);
    }
    Ok(())
}

/// Shareable handle bundling a mounted volume with the allocation API
#[derive(Clone)]
pub struct VoidAllocator {
    volume: Arc<Volume>,
}

impl VoidAllocator {
    pub fn new(volume: Volume) -> Self {
        VoidAllocator {
            volume: Arc::new(volume),
        }
    }

    pub fn volume(&self) -> &Volume {
        &self.volume
    }

    pub fn genesis(
        &self,
        scale: u8,
        intent: Intent,
        accelerator: Option<AcceleratorContext>,
    ) -> Result<Genesis> {
        genesis::genesis(&self.volume, scale, intent, accelerator)
    }

    /// Allocate `count` consecutive logical blocks of a new object
    ///
    /// Returns the identity (if ballistic) and the committed blocks. On
    /// failure every block claimed by this call is released again.
    pub fn allocate_object(
        &self,
        scale: u8,
        intent: Intent,
        count: u64,
    ) -> Result<(Option<Anchor>, Vec<Allocation>)> {
        let identity = self.genesis(scale, intent, None)?.anchor();
        let geometry = self.volume.geometry();
        let reserve = count.min(geometry.span() + geometry.horizon_len());
        let mut blocks = Vec::with_capacity(reserve as usize);

        for logical in 0..count {
            let result = match &identity {
                Some(anchor) => allocate(&self.volume, anchor, logical),
                None => allocate_horizon(&self.volume),
            };

            match result {
                Ok(allocation) => blocks.push(allocation),
                Err(err) => return Err(self.abandon(&blocks, err)),
            }
        }

        Ok((identity, blocks))
    }

    /// Release every block of a failed object and hand back its error
    fn abandon(&self, blocks: &[Allocation], err: VoidError) -> VoidError {
        for allocation in blocks {
            if let Err(free_err) = free(&self.volume, allocation.address) {
                error!(
                    "Failed to release block {} during rollback: {}",
                    allocation.address, free_err
                );
            }
        }
        err
    }
}

impl BlockAllocator for VoidAllocator {
    fn allocate(&self, anchor: &Anchor, logical: u64) -> Result<Allocation> {
        allocate(&self.volume, anchor, logical)
    }

    fn free(&self, address: u64) -> Result<()> {
        free(&self.volume, address)
    }

    fn total_blocks(&self) -> u64 {
        self.volume.geometry().total_blocks
    }

    fn used_blocks(&self) -> u64 {
        self.volume.used_blocks()
    }
}
