//! Genesis policy
//!
//! Picks the trajectory identity (gravity center and orbit vector) for a new
//! object. The profile policy and the caller's intent constrain the choice:
//!
//! - default: random odd 48-bit vector coprime to the span, random center
//! - contiguous intent or sequential-only profile: unit vector
//! - metadata intent: center inside the first 10% of the span
//! - accelerator context: the first [`PROBE_HOPS`] blocks stay inside the
//!   device's topology window
//!
//! A saturated volume gets no ballistic identity at all; genesis answers
//! [`Genesis::HorizonFallback`] instead.

use crate::core::allocator::trajectory::{gcd, Anchor, MAX_FRACTAL_SCALE, ORBIT_VECTOR_MASK};
use crate::core::profile::Intent;
use crate::core::volume::{Volume, FLAG_SATURATED};
use crate::error::{Result, VoidError};
use rand::Rng;
use tracing::{debug, info, warn};

/// Logical blocks that must stay inside an accelerator window
pub const PROBE_HOPS: u64 = 8;

/// Share of the span reserved for metadata placement
pub const METADATA_SPAN_PERCENT: u64 = 10;

/// Random vectors tried before settling for a unit vector
const VECTOR_ATTEMPTS: usize = 64;

/// Accelerator the calling thread is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AcceleratorContext {
    pub device_id: u32,
    /// Fail instead of falling back when the window is full
    pub strict: bool,
}

impl AcceleratorContext {
    pub fn new(device_id: u32) -> Self {
        AcceleratorContext {
            device_id,
            strict: false,
        }
    }

    pub fn strict(device_id: u32) -> Self {
        AcceleratorContext {
            device_id,
            strict: true,
        }
    }
}

/// Outcome of object genesis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Genesis {
    /// Identity for ballistic allocation
    Ballistic(Anchor),
    /// Flux span saturated; allocate from the horizon instead
    HorizonFallback,
}

impl Genesis {
    pub fn anchor(&self) -> Option<Anchor> {
        match self {
            Genesis::Ballistic(anchor) => Some(*anchor),
            Genesis::HorizonFallback => None,
        }
    }
}

/// Flux-relative block window
#[derive(Debug, Clone, Copy)]
struct Window {
    start: u64,
    len: u64,
}

/// Create the identity for a new object using the thread RNG
pub fn genesis(
    volume: &Volume,
    scale: u8,
    intent: Intent,
    accelerator: Option<AcceleratorContext>,
) -> Result<Genesis> {
    genesis_with_rng(volume, scale, intent, accelerator, &mut rand::thread_rng())
}

/// Create the identity for a new object drawing randomness from `rng`
pub fn genesis_with_rng<R: Rng + ?Sized>(
    volume: &Volume,
    scale: u8,
    intent: Intent,
    accelerator: Option<AcceleratorContext>,
    rng: &mut R,
) -> Result<Genesis> {
    if volume.is_saturated() || volume.usage_saturated() {
        if volume.raise_flag(FLAG_SATURATED) {
            info!(
                "Volume saturated ({} of {} blocks used); new objects go to the horizon",
                volume.used_blocks(),
                volume.span()
            );
        }
        return Ok(Genesis::HorizonFallback);
    }

    let policy = volume.policy();
    let intent = policy.effective_intent(intent);
    let scale = scale.min(MAX_FRACTAL_SCALE);

    if let Some(context) = accelerator.filter(|_| policy.uses_topology()) {
        match resolve_window(volume, context.device_id) {
            Some(window) => {
                if let Some(anchor) = place_in_window(volume, context, window, scale, rng)? {
                    return Ok(Genesis::Ballistic(anchor));
                }
            }
            None => debug!(
                "Accelerator {} has no usable window; using global pool",
                context.device_id
            ),
        }
    }

    let span = volume.span();
    let units = (span >> scale).max(1);

    let orbit = if intent == Intent::Contiguous || policy.sequential_only() {
        1
    } else {
        random_orbit(units, rng)
    };

    let gravity = match intent {
        Intent::Metadata => rng.gen_range(0..(span * METADATA_SPAN_PERCENT / 100).max(1)),
        _ => rng.gen_range(0..span),
    };

    Ok(Genesis::Ballistic(Anchor::new(gravity, orbit, scale)))
}

/// Odd 48-bit vector coprime to `modulus`, or 1
fn random_orbit<R: Rng + ?Sized>(modulus: u64, rng: &mut R) -> u64 {
    for _ in 0..VECTOR_ATTEMPTS {
        let vector = (rng.gen::<u64>() & ORBIT_VECTOR_MASK) | 1;
        if gcd(vector, modulus) == 1 {
            return vector;
        }
    }
    1
}

/// Vector in `[1, max]` coprime to both `window` and `span` units, or 1
///
/// The trajectory engine replaces vectors sharing a factor with the span, so
/// the anchor must carry one it will actually fly.
fn bounded_orbit<R: Rng + ?Sized>(max: u64, window: u64, span: u64, rng: &mut R) -> u64 {
    for _ in 0..VECTOR_ATTEMPTS {
        let vector = rng.gen_range(1..=max);
        if gcd(vector, window) == 1 && gcd(vector, span) == 1 {
            return vector;
        }
    }
    1
}

/// Topology window of `device_id`, clipped to the flux span
///
/// Unknown devices and windows outside the span resolve to `None`.
fn resolve_window(volume: &Volume, device_id: u32) -> Option<Window> {
    let entry = volume.lookup_topology(device_id)?;
    let span = volume.span();

    if entry.window_len == 0 || entry.window_start >= span {
        return None;
    }

    Some(Window {
        start: entry.window_start,
        len: entry.window_len.min(span - entry.window_start),
    })
}

fn place_in_window<R: Rng + ?Sized>(
    volume: &Volume,
    context: AcceleratorContext,
    window: Window,
    scale: u8,
    rng: &mut R,
) -> Result<Option<Anchor>> {
    let flux_start = volume.geometry().flux_start;
    let absolute = flux_start + window.start..flux_start + window.start + window.len;

    if volume.bitmap().count_set_in(absolute)? >= window.len {
        if context.strict {
            return Err(VoidError::AcceleratorWindowExhausted {
                device: context.device_id,
            });
        }
        warn!(
            "Accelerator {} window is full; using global pool",
            context.device_id
        );
        return Ok(None);
    }

    let stride = 1u64 << scale;
    let first_unit = window.start.div_ceil(stride);
    let end_unit = (window.start + window.len) / stride;
    let units = end_unit.saturating_sub(first_unit);

    if units == 0 {
        return Ok(None);
    }

    if units < PROBE_HOPS {
        return Ok(Some(Anchor::new(first_unit * stride, 1, scale)));
    }

    let max_vector = (units - 1) / (PROBE_HOPS - 1);
    let span_units = (volume.span() >> scale).max(1);
    let orbit = bounded_orbit(max_vector, units, span_units, rng);
    let room = units - (PROBE_HOPS - 1) * orbit;
    let gravity_unit = first_unit + rng.gen_range(0..room);

    debug!(
        "Accelerator {} genesis: center {} vector {}",
        context.device_id,
        gravity_unit * stride,
        orbit
    );

    Ok(Some(Anchor::new(gravity_unit * stride, orbit, scale)))
}
