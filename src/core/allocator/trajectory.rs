//! Trajectory engine
//!
//! Maps an object's identity and a logical block index to a physical block
//! by modular arithmetic instead of searching free space:
//!
//! ```text
//! S      = 2^M                       (cluster stride)
//! units  = max(Phi >> M, 1)          (clusters in the flux span)
//! offset = ((G >> M) + N*V + Theta(K)) mod units
//! block  = flux_start + offset * S
//! ```
//!
//! Everything here is a pure function of its inputs. Replay after a crash
//! recomputes the exact same addresses.

use crate::core::config::Geometry;
use serde::{Deserialize, Serialize};

/// Orbit vectors are 48-bit quantities
pub const ORBIT_VECTOR_MASK: u64 = (1 << 48) - 1;

/// Largest usable fractal scale (stride 2^63)
pub const MAX_FRACTAL_SCALE: u8 = 63;

/// Additive jitter for shells 0..=3 (triangular growth)
const SHELL_JITTER: [u64; 4] = [0, 1, 3, 6];

/// First shell that switches from jitter to gravity assist
const ASSIST_SHELL: u8 = SHELL_JITTER.len() as u8;

const ASSIST_ROTATION: u32 = 17;
const ASSIST_MIX: u64 = 0xA5A5_A5A5_A5A5_A5A5;

/// Allocation identity of an object
///
/// Created once at genesis and shared by every logical block of the object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Anchor {
    /// Gravity center `G`
    pub gravity: u64,
    /// Orbit vector `V` (48 bits)
    pub orbit: u64,
    /// Fractal scale `M` (log2 of the cluster stride)
    pub scale: u8,
}

impl Anchor {
    pub fn new(gravity: u64, orbit: u64, scale: u8) -> Self {
        Anchor {
            gravity,
            orbit: orbit & ORBIT_VECTOR_MASK,
            scale: scale.min(MAX_FRACTAL_SCALE),
        }
    }

    /// Resolve `logical` on `shell` for this identity
    pub fn resolve(&self, geometry: &Geometry, logical: u64, shell: u8) -> Option<u64> {
        resolve_trajectory(
            geometry,
            self.gravity,
            self.orbit,
            logical,
            self.scale,
            shell,
        )
    }
}

/// Greatest common divisor
pub fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

/// Substitute a unit vector when `vector` would only reach a sub-orbit of
/// `modulus`
pub fn enforce_coprime(vector: u64, modulus: u64) -> u64 {
    if modulus <= 1 || gcd(vector, modulus) != 1 {
        1
    } else {
        vector
    }
}

/// Derive a fresh vector to break out of resonant cycles
///
/// The result is always odd and fits in 48 bits.
pub fn gravity_assist(vector: u64) -> u64 {
    ((vector.rotate_left(ASSIST_ROTATION) ^ ASSIST_MIX) & ORBIT_VECTOR_MASK) | 1
}

/// Additive jitter for a jitter shell; zero for assist shells
pub fn shell_jitter(shell: u8) -> u64 {
    SHELL_JITTER.get(shell as usize).copied().unwrap_or(0)
}

/// Vector and additive offset used for `shell`
fn orbital_parameters(orbit: u64, shell: u8) -> (u64, u64) {
    if shell < ASSIST_SHELL {
        return (orbit, shell_jitter(shell));
    }

    let mut vector = orbit;
    for _ in 0..(shell - ASSIST_SHELL + 1) {
        vector = gravity_assist(vector);
    }
    (vector, 0)
}

/// Resolve a physical block for (G, V, N, M, K)
///
/// Returns `None` only when the volume has no flux span. Zoned-linear media
/// ignore `shell` so writes stay in linear order.
pub fn resolve_trajectory(
    geometry: &Geometry,
    gravity: u64,
    orbit: u64,
    logical: u64,
    scale: u8,
    shell: u8,
) -> Option<u64> {
    let span = geometry.span();
    if span == 0 {
        return None;
    }

    let scale = scale.min(MAX_FRACTAL_SCALE) as u32;
    let stride = 1u64 << scale;
    let units = (span >> scale).max(1);

    let shell = if geometry.device.is_zoned() { 0 } else { shell };
    let (vector, jitter) = orbital_parameters(orbit & ORBIT_VECTOR_MASK, shell);
    let vector = enforce_coprime(vector, units);

    let units = units as u128;
    let base = ((gravity >> scale) as u128) % units;
    let step = ((logical as u128) % units) * ((vector as u128) % units) % units;
    let offset = (base + step + jitter as u128) % units;

    Some(geometry.flux_start + (offset as u64) * stride)
}
