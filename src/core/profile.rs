//! Profile policies
//!
//! Each operating profile is a zero-sized policy selected once at mount.
//! The allocator asks the policy instead of branching on the profile in the
//! hot path.

use crate::core::config::Profile;

/// Placement intent supplied at object genesis
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Intent {
    #[default]
    Default,
    /// Blocks must be laid out back to back (unit orbit vector)
    Contiguous,
    /// Small, hot objects kept near the start of the span
    Metadata,
}

/// Behaviour that differs between operating profiles
pub trait ProfilePolicy: Send + Sync {
    /// Profile this policy implements
    fn profile(&self) -> Profile;

    /// Number of orbital shells probed before escalating
    fn max_shells(&self) -> u8;

    /// Only unit vectors and shell 0 are allowed
    fn sequential_only(&self) -> bool {
        false
    }

    /// Whether the volume carries a quality mask
    fn supports_quality_mask(&self) -> bool {
        true
    }

    /// Whether an accelerator context is honoured at genesis
    fn uses_topology(&self) -> bool {
        true
    }

    /// Usage percentage at which genesis redirects to the horizon
    fn saturation_percent(&self) -> u64 {
        90
    }

    /// Intent actually applied for a requested intent
    fn effective_intent(&self, intent: Intent) -> Intent {
        intent
    }
}

/// Orbital shells probed on full profiles
pub const MAX_SHELLS: u8 = 12;

pub struct GenericPolicy;

impl ProfilePolicy for GenericPolicy {
    fn profile(&self) -> Profile {
        Profile::Generic
    }

    fn max_shells(&self) -> u8 {
        MAX_SHELLS
    }
}

/// Memory-constrained profile: sequential writes, no quality mask
pub struct PicoPolicy;

impl ProfilePolicy for PicoPolicy {
    fn profile(&self) -> Profile {
        Profile::Pico
    }

    fn max_shells(&self) -> u8 {
        1
    }

    fn sequential_only(&self) -> bool {
        true
    }

    fn supports_quality_mask(&self) -> bool {
        false
    }

    fn uses_topology(&self) -> bool {
        false
    }

    fn effective_intent(&self, _intent: Intent) -> Intent {
        Intent::Contiguous
    }
}

pub struct AiPolicy;

impl ProfilePolicy for AiPolicy {
    fn profile(&self) -> Profile {
        Profile::Ai
    }

    fn max_shells(&self) -> u8 {
        MAX_SHELLS
    }

    fn saturation_percent(&self) -> u64 {
        95
    }
}

pub struct MetadataPolicy;

impl ProfilePolicy for MetadataPolicy {
    fn profile(&self) -> Profile {
        Profile::Metadata
    }

    fn max_shells(&self) -> u8 {
        MAX_SHELLS
    }

    fn effective_intent(&self, intent: Intent) -> Intent {
        match intent {
            Intent::Contiguous => Intent::Contiguous,
            _ => Intent::Metadata,
        }
    }
}

impl Profile {
    /// Policy implementing this profile
    pub fn policy(self) -> &'static dyn ProfilePolicy {
        match self {
            Profile::Generic => &GenericPolicy,
            Profile::Pico => &PicoPolicy,
            Profile::Ai => &AiPolicy,
            Profile::Metadata => &MetadataPolicy,
        }
    }
}
