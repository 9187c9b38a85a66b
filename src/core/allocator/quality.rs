//! Per-block media quality mask
//!
//! Two bits per block, 32 blocks per atomic word. The allocator only reads
//! it; the repair path may downgrade a clean block to Bronze and the
//! formatter may condemn a block as Toxic. Nothing ever upgrades a block.

use crate::error::{Result, VoidError};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

const BLOCKS_PER_WORD: u64 = 32;
const ENTRY_MASK: u64 = 0b11;

/// Every entry set to Silver
const ALL_SILVER: u64 = 0xAAAA_AAAA_AAAA_AAAA;

/// Media health classification of a block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Quality {
    /// Unusable media; never allocated
    Toxic = 0,
    /// Healed or degraded media; still usable
    Bronze = 1,
    /// Clean media
    Silver = 2,
    Reserved = 3,
}

impl Quality {
    pub fn from_bits(bits: u64) -> Self {
        match bits & ENTRY_MASK {
            0 => Quality::Toxic,
            1 => Quality::Bronze,
            2 => Quality::Silver,
            _ => Quality::Reserved,
        }
    }

    pub fn is_usable(self) -> bool {
        !matches!(self, Quality::Toxic)
    }
}

pub struct QualityMask {
    words: Box<[AtomicU64]>,
    total_blocks: u64,
}

impl QualityMask {
    /// Create a mask with every block classified Silver
    pub fn new(total_blocks: u64) -> Self {
        let num_words = total_blocks.div_ceil(BLOCKS_PER_WORD) as usize;
        let words = (0..num_words).map(|_| AtomicU64::new(ALL_SILVER)).collect();

        QualityMask {
            words,
            total_blocks,
        }
    }

    pub fn len(&self) -> u64 {
        self.total_blocks
    }

    pub fn is_empty(&self) -> bool {
        self.total_blocks == 0
    }

    fn locate(&self, block: u64) -> Result<(usize, u32)> {
        if block >= self.total_blocks {
            return Err(VoidError::InvalidBlockId(block));
        }
        let shift = ((block % BLOCKS_PER_WORD) * 2) as u32;
        Ok(((block / BLOCKS_PER_WORD) as usize, shift))
    }

    /// Classification of `block`; blocks outside the mask read as Toxic
    pub fn get(&self, block: u64) -> Quality {
        match self.locate(block) {
            Ok((word, shift)) => {
                Quality::from_bits(self.words[word].load(Ordering::Acquire) >> shift)
            }
            Err(_) => Quality::Toxic,
        }
    }

    /// Downgrade a Silver block to Bronze after a successful repair
    ///
    /// Returns `Ok(false)` if the block already was Bronze. Toxic and
    /// reserved entries are refused.
    pub fn downgrade(&self, block: u64) -> Result<bool> {
        let (word, shift) = self.locate(block)?;
        let cell = &self.words[word];

        let mut current = cell.load(Ordering::Acquire);
        loop {
            let from = Quality::from_bits(current >> shift);
            match from {
                Quality::Bronze => return Ok(false),
                Quality::Silver => {}
                _ => {
                    return Err(VoidError::QualityTransition {
                        block,
                        from,
                        to: Quality::Bronze,
                    })
                }
            }

            let next = (current & !(ENTRY_MASK << shift)) | ((Quality::Bronze as u64) << shift);
            match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => {
                    debug!("Block {} downgraded to Bronze", block);
                    return Ok(true);
                }
                Err(observed) => current = observed,
            }
        }
    }

    /// Condemn a block as Toxic
    pub fn mark_toxic(&self, block: u64) -> Result<()> {
        let (word, shift) = self.locate(block)?;
        self.words[word].fetch_and(!(ENTRY_MASK << shift), Ordering::AcqRel);
        debug!("Block {} marked Toxic", block);
        Ok(())
    }

    /// Number of blocks currently in `quality`
    pub fn count(&self, quality: Quality) -> u64 {
        (0..self.total_blocks)
            .filter(|&block| self.get(block) == quality)
            .count() as u64
    }
}
