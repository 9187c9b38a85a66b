use crate::core::allocator::quality::Quality;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VoidError {
    #[error("Trajectory collapse: all orbital shells and the horizon exhausted for logical index {logical_index}")]
    Collapse { logical_index: u64 },

    #[error("Horizon ring exhausted: every slot is occupied")]
    HorizonFull,

    #[error("Accelerator window exhausted for device {device}")]
    AcceleratorWindowExhausted { device: u32 },

    #[error("Uncorrectable bitmap corruption in armored word {word}")]
    BitmapCorruption { word: usize },

    #[error("Compare-and-swap starvation on armored word {word}")]
    CasStarvation { word: usize },

    #[error("Invalid block ID: {0}")]
    InvalidBlockId(u64),

    #[error("Invalid volume geometry: {0}")]
    InvalidGeometry(String),

    #[error("Illegal quality transition for block {block}: {from:?} -> {to:?}")]
    QualityTransition { block: u64, from: Quality, to: Quality },

    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl VoidError {
    /// True for outcomes that mean "no space", as opposed to faults.
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self,
            VoidError::Collapse { .. }
                | VoidError::HorizonFull
                | VoidError::AcceleratorWindowExhausted { .. }
        )
    }

    /// True for uncorrectable media faults that poison the volume.
    pub fn is_fatal(&self) -> bool {
        matches!(self, VoidError::BitmapCorruption { .. })
    }
}

pub type Result<T> = std::result::Result<T, VoidError>;
