//! Armored occupancy bitmap
//!
//! One bit per block (0 = free, 1 = allocated), grouped into 64-bit words.
//! Every word travels with an extended Hamming (72,64) guard that corrects
//! any single flipped bit and detects any two. The data word and its guard
//! form one 16-byte unit that only ever changes through a compare-exchange of
//! the whole unit, so readers never observe data and guard out of step.

use crate::error::{Result, VoidError};
use crossbeam::utils::CachePadded;
use portable_atomic::AtomicU128;
use std::ops::Range;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{error, warn};

/// Maximum compare-exchange attempts before reporting starvation
pub const CAS_RETRY_LIMIT: usize = 1024;

const CHECK_BITS: u64 = 0x7F;
const OVERALL_PARITY: u64 = 0x80;
const GUARD_MASK: u64 = CHECK_BITS | OVERALL_PARITY;

/// Hamming position (1..=71) of each data bit; powers of two hold check bits
const DATA_POSITIONS: [u8; 64] = data_positions();

const fn data_positions() -> [u8; 64] {
    let mut table = [0u8; 64];
    let mut position: u32 = 1;
    let mut bit = 0;
    while bit < 64 {
        if !position.is_power_of_two() {
            table[bit] = position as u8;
            bit += 1;
        }
        position += 1;
    }
    table
}

fn syndrome(data: u64) -> u64 {
    let mut syndrome = 0u64;
    let mut rest = data;
    while rest != 0 {
        let bit = rest.trailing_zeros() as usize;
        syndrome ^= DATA_POSITIONS[bit] as u64;
        rest &= rest - 1;
    }
    syndrome
}

/// Compute the SEC-DED guard for `data`
pub fn encode_guard(data: u64) -> u64 {
    let check = syndrome(data);
    let parity = (data.count_ones() + check.count_ones()) & 1;
    check | ((parity as u64) << 7)
}

/// Result of validating a word against its guard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Integrity {
    /// Data and guard agree
    Clean,
    /// A single bit was wrong; carries the corrected data
    Corrected(u64),
    /// Two or more bits were wrong; the data cannot be trusted
    Uncorrectable,
}

/// 64 occupancy bits plus their guard, updated as one atomic unit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArmoredWord {
    pub data: u64,
    pub guard: u64,
}

impl ArmoredWord {
    pub const CLEAR: ArmoredWord = ArmoredWord { data: 0, guard: 0 };

    pub fn new(data: u64) -> Self {
        ArmoredWord {
            data,
            guard: encode_guard(data),
        }
    }

    /// Pack into the 128-bit cell layout (`data | guard << 64`)
    pub fn to_bits(self) -> u128 {
        self.data as u128 | (self.guard as u128) << 64
    }

    pub fn from_bits(bits: u128) -> Self {
        ArmoredWord {
            data: bits as u64,
            guard: (bits >> 64) as u64,
        }
    }

    /// Validate the data against the guard
    pub fn integrity(&self) -> Integrity {
        let stored_check = self.guard & CHECK_BITS;
        let stored_parity = (self.guard & OVERALL_PARITY) >> 7;
        let stray = self.guard & !GUARD_MASK != 0;

        let syndrome = syndrome(self.data) ^ stored_check;
        let parity =
            (self.data.count_ones() + stored_check.count_ones() + stored_parity as u32) & 1;

        match (syndrome, parity) {
            (0, 0) if !stray => Integrity::Clean,
            (0, 0) => Integrity::Corrected(self.data),
            (_, 0) => Integrity::Uncorrectable,
            // Overall parity bit or one of the check bits flipped
            (0, _) => Integrity::Corrected(self.data),
            (s, _) if s.is_power_of_two() => Integrity::Corrected(self.data),
            (s, _) => DATA_POSITIONS
                .iter()
                .position(|&p| p as u64 == s)
                .map_or(Integrity::Uncorrectable, |bit| {
                    Integrity::Corrected(self.data ^ (1u64 << bit))
                }),
        }
    }
}

/// Bitmap operation selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BitmapOp {
    Test,
    Set,
    Clear,
}

/// Outcome of a bitmap operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitOutcome {
    /// Bit state before the operation
    pub was_set: bool,
    /// Bit state after the operation
    pub is_set: bool,
    /// A single-bit error in the word was corrected on the way
    pub healed: bool,
}

impl BitOutcome {
    pub fn changed(&self) -> bool {
        self.was_set != self.is_set
    }
}

/// Occupancy bitmap with inline error correction
pub struct ArmoredBitmap {
    words: Box<[AtomicU128]>,
    total_bits: u64,
    heals: CachePadded<AtomicU64>,
}

impl ArmoredBitmap {
    /// Create a bitmap tracking `total_bits` blocks, all free
    pub fn new(total_bits: u64) -> Self {
        let num_words = total_bits.div_ceil(64) as usize;
        let words = (0..num_words)
            .map(|_| AtomicU128::new(ArmoredWord::CLEAR.to_bits()))
            .collect();

        ArmoredBitmap {
            words,
            total_bits,
            heals: CachePadded::new(AtomicU64::new(0)),
        }
    }

    /// Number of blocks tracked
    pub fn len(&self) -> u64 {
        self.total_bits
    }

    pub fn is_empty(&self) -> bool {
        self.total_bits == 0
    }

    pub fn word_count(&self) -> usize {
        self.words.len()
    }

    /// Number of single-bit errors corrected so far
    pub fn heal_count(&self) -> u64 {
        self.heals.load(Ordering::Relaxed)
    }

    fn locate(&self, index: u64) -> Result<(usize, u64)> {
        if index >= self.total_bits {
            return Err(VoidError::InvalidBlockId(index));
        }
        Ok(((index / 64) as usize, 1u64 << (index % 64)))
    }

    /// Whether word updates compile to a native 128-bit compare-exchange
    pub fn is_lock_free() -> bool {
        AtomicU128::is_lock_free()
    }

    fn load_word(&self, word: usize) -> ArmoredWord {
        ArmoredWord::from_bits(self.words[word].load(Ordering::Acquire))
    }

    /// Run `op` against the bit for block `index`
    pub fn apply(&self, op: BitmapOp, index: u64) -> Result<BitOutcome> {
        self.apply_bounded(op, index, CAS_RETRY_LIMIT)
    }

    /// [`apply`](Self::apply) with an explicit compare-exchange budget
    pub(crate) fn apply_bounded(
        &self,
        op: BitmapOp,
        index: u64,
        limit: usize,
    ) -> Result<BitOutcome> {
        let (word, mask) = self.locate(index)?;
        let cell = &self.words[word];

        for _ in 0..limit {
            let current = self.load_word(word);
            let (data, corrected) = match current.integrity() {
                Integrity::Clean => (current.data, false),
                Integrity::Corrected(data) => (data, true),
                Integrity::Uncorrectable => {
                    error!("Uncorrectable corruption in bitmap word {}", word);
                    return Err(VoidError::BitmapCorruption { word });
                }
            };

            let was_set = data & mask != 0;
            let next = match op {
                BitmapOp::Test => data,
                BitmapOp::Set => data | mask,
                BitmapOp::Clear => data & !mask,
            };

            if next == data && !corrected {
                return Ok(BitOutcome {
                    was_set,
                    is_set: was_set,
                    healed: false,
                });
            }

            let swapped = cell.compare_exchange(
                current.to_bits(),
                ArmoredWord::new(next).to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            );
            if swapped.is_ok() {
                if corrected {
                    self.heals.fetch_add(1, Ordering::Relaxed);
                    warn!("Healed single-bit error in bitmap word {}", word);
                }
                return Ok(BitOutcome {
                    was_set,
                    is_set: next & mask != 0,
                    healed: corrected,
                });
            }
        }

        error!("CAS retry limit exceeded on bitmap word {}", word);
        Err(VoidError::CasStarvation { word })
    }

    /// Read a bit, healing its word if needed
    pub fn test(&self, index: u64) -> Result<BitOutcome> {
        self.apply(BitmapOp::Test, index)
    }

    /// Mark a block allocated; returns whether the bit changed
    pub fn set(&self, index: u64) -> Result<bool> {
        Ok(self.apply(BitmapOp::Set, index)?.changed())
    }

    /// Mark a block free; returns whether the bit changed
    pub fn clear(&self, index: u64) -> Result<bool> {
        Ok(self.apply(BitmapOp::Clear, index)?.changed())
    }

    /// Count allocated blocks in `range` without modifying any word
    pub fn count_set_in(&self, range: Range<u64>) -> Result<u64> {
        let end = range.end.min(self.total_bits);
        let mut start = range.start;
        let mut count = 0u64;

        while start < end {
            let word = (start / 64) as usize;
            let first = start % 64;
            let last = (end - (word as u64) * 64).min(64);

            let current = self.load_word(word);
            let data = match current.integrity() {
                Integrity::Clean => current.data,
                Integrity::Corrected(data) => data,
                Integrity::Uncorrectable => {
                    return Err(VoidError::BitmapCorruption { word });
                }
            };

            let high = if last == 64 { u64::MAX } else { (1u64 << last) - 1 };
            let low = (1u64 << first) - 1;
            count += (data & high & !low).count_ones() as u64;

            start = (word as u64 + 1) * 64;
        }

        Ok(count)
    }

    /// Validate every word, healing single-bit errors
    ///
    /// Returns the indices of words with uncorrectable damage.
    pub fn scrub(&self) -> Vec<usize> {
        let mut damaged = Vec::new();
        for word in 0..self.words.len() {
            if let Err(VoidError::BitmapCorruption { word }) =
                self.apply(BitmapOp::Test, word as u64 * 64)
            {
                damaged.push(word);
            }
        }
        damaged
    }

    /// Raw word access for the repair path
    pub fn load_raw(&self, word: usize) -> Option<ArmoredWord> {
        (word < self.words.len()).then(|| self.load_word(word))
    }

    /// Overwrite a raw word, guard included, without validation
    pub fn store_raw(&self, word: usize, value: ArmoredWord) -> Result<()> {
        let cell = self
            .words
            .get(word)
            .ok_or(VoidError::InvalidBlockId(word as u64 * 64))?;
        cell.store(value.to_bits(), Ordering::Release);
        Ok(())
    }
}
