//! Mounted volume state
//!
//! A `Volume` owns everything the allocator mutates for the lifetime of a
//! mount: the armored bitmap, the optional quality mask, the used-block
//! counter, the sticky state flags and the horizon write head. All of it is
//! atomic, so a volume is shared between threads behind an `Arc` with no
//! outer lock.

use crate::core::allocator::bitmap::{ArmoredBitmap, BitOutcome, BitmapOp};
use crate::core::allocator::quality::{Quality, QualityMask};
use crate::core::allocator::trajectory::Anchor;
use crate::core::config::{Geometry, Profile, TopologyEntry, VolumeConfig};
use crate::core::profile::ProfilePolicy;
use crate::error::{Result, VoidError};
use crossbeam::utils::CachePadded;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use tracing::{error, info};

/// Usage crossed the saturation threshold; new objects go to the horizon
pub const FLAG_SATURATED: u32 = 1 << 0;

/// Uncorrectable bitmap corruption was observed
pub const FLAG_PANIC: u32 = 1 << 1;

pub struct Volume {
    geometry: Geometry,
    policy: &'static dyn ProfilePolicy,
    topology: Vec<TopologyEntry>,
    bitmap: ArmoredBitmap,
    quality: Option<QualityMask>,
    used: CachePadded<AtomicU64>,
    horizon_head: CachePadded<AtomicU64>,
    flags: AtomicU32,
}

impl Volume {
    /// Mount a volume described by `config`
    pub fn mount(config: &VolumeConfig) -> Result<Self> {
        config.validate()?;

        let geometry = config.geometry();
        let policy = config.profile.policy();
        let quality = (config.quality_mask && policy.supports_quality_mask())
            .then(|| QualityMask::new(geometry.total_blocks));

        info!(
            "Mounting {:?} volume: {} blocks, flux span {}, horizon {} slots",
            config.profile,
            geometry.total_blocks,
            geometry.span(),
            geometry.horizon_len()
        );

        Ok(Volume {
            geometry,
            policy,
            topology: config.topology.clone(),
            bitmap: ArmoredBitmap::new(geometry.total_blocks),
            quality,
            used: CachePadded::new(AtomicU64::new(0)),
            horizon_head: CachePadded::new(AtomicU64::new(0)),
            flags: AtomicU32::new(0),
        })
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    /// Usable trajectory span (`Phi`)
    pub fn span(&self) -> u64 {
        self.geometry.span()
    }

    pub fn policy(&self) -> &'static dyn ProfilePolicy {
        self.policy
    }

    pub fn profile(&self) -> Profile {
        self.policy.profile()
    }

    pub fn topology(&self) -> &[TopologyEntry] {
        &self.topology
    }

    /// Topology entry for an accelerator, if the table knows it
    pub fn lookup_topology(&self, device_id: u32) -> Option<&TopologyEntry> {
        self.topology.iter().find(|entry| entry.device_id == device_id)
    }

    pub fn bitmap(&self) -> &ArmoredBitmap {
        &self.bitmap
    }

    pub fn quality_mask(&self) -> Option<&QualityMask> {
        self.quality.as_ref()
    }

    /// Quality of `block`; Silver everywhere when the volume has no mask
    pub fn quality(&self, block: u64) -> Quality {
        self.quality
            .as_ref()
            .map_or(Quality::Silver, |mask| mask.get(block))
    }

    /// Resolve a logical block of `anchor` on `shell`
    pub fn resolve(&self, anchor: &Anchor, logical: u64, shell: u8) -> Option<u64> {
        anchor.resolve(&self.geometry, logical, shell)
    }

    /// Bitmap operation that raises the panic flag on uncorrectable damage
    pub fn bitmap_op(&self, op: BitmapOp, block: u64) -> Result<BitOutcome> {
        let outcome = self.bitmap.apply(op, block);
        if let Err(VoidError::BitmapCorruption { word }) = &outcome {
            if self.raise_flag(FLAG_PANIC) {
                error!("Volume panic: bitmap word {} is uncorrectable", word);
            }
        }
        outcome
    }

    pub fn used_blocks(&self) -> u64 {
        self.used.load(Ordering::Acquire)
    }

    /// Seed the used-block counter, e.g. after journal replay
    pub fn restore_used_blocks(&self, used: u64) {
        self.used.store(used, Ordering::Release);
    }

    /// Count one more allocated block; wraps on overflow
    pub(crate) fn record_allocation(&self) {
        self.used.fetch_add(1, Ordering::AcqRel);
    }

    /// Count one freed block; wraps on underflow
    pub(crate) fn record_free(&self) {
        self.used.fetch_sub(1, Ordering::AcqRel);
    }

    /// Whether usage has reached the profile's saturation threshold
    pub fn usage_saturated(&self) -> bool {
        let used = self.used_blocks() as u128;
        let span = self.span() as u128;
        used * 100 >= span * self.policy.saturation_percent() as u128
    }

    pub fn flags(&self) -> u32 {
        self.flags.load(Ordering::Acquire)
    }

    /// Set a sticky flag; returns true if this call set it first
    pub fn raise_flag(&self, flag: u32) -> bool {
        self.flags.fetch_or(flag, Ordering::AcqRel) & flag == 0
    }

    pub fn is_saturated(&self) -> bool {
        self.flags() & FLAG_SATURATED != 0
    }

    pub fn is_panicked(&self) -> bool {
        self.flags() & FLAG_PANIC != 0
    }

    /// Advance the horizon write head, returning the previous raw position
    pub(crate) fn advance_horizon_head(&self) -> u64 {
        self.horizon_head.fetch_add(1, Ordering::AcqRel)
    }

    /// Next horizon slot index
    pub fn horizon_head(&self) -> u64 {
        match self.geometry.horizon_len() {
            0 => 0,
            len => self.horizon_head.load(Ordering::Acquire) % len,
        }
    }

    /// Position the horizon write head, e.g. after journal replay
    pub fn set_horizon_head(&self, slot: u64) {
        self.horizon_head.store(slot, Ordering::Release);
    }

    pub fn stats(&self) -> VolumeStats {
        VolumeStats {
            span: self.span(),
            used_blocks: self.used_blocks(),
            horizon_head: self.horizon_head(),
            heals: self.bitmap.heal_count(),
            saturated: self.is_saturated(),
            panicked: self.is_panicked(),
        }
    }
}

/// Point-in-time view of volume counters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VolumeStats {
    pub span: u64,
    pub used_blocks: u64,
    pub horizon_head: u64,
    pub heals: u64,
    pub saturated: bool,
    pub panicked: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Profile;

    fn volume(profile: Profile) -> Volume {
        let config = VolumeConfig::with_layout(64 * 1024 * 1024, 4096, profile).unwrap();
        Volume::mount(&config).unwrap()
    }

    #[test]
    fn test_mount_generic() {
        let volume = volume(Profile::Generic);
        assert_eq!(volume.profile(), Profile::Generic);
        assert!(volume.quality_mask().is_some());
        assert_eq!(volume.bitmap().len(), volume.geometry().total_blocks);
        assert_eq!(volume.used_blocks(), 0);
        assert_eq!(volume.flags(), 0);
    }

    #[test]
    fn test_pico_has_no_quality_mask() {
        let volume = volume(Profile::Pico);
        assert!(volume.quality_mask().is_none());
        assert_eq!(volume.quality(volume.geometry().flux_start), Quality::Silver);
    }

    #[test]
    fn test_mount_rejects_invalid_config() {
        let mut config = VolumeConfig::with_layout(64 * 1024 * 1024, 4096, Profile::Generic).unwrap();
        config.flux_start = config.horizon_start;
        assert!(Volume::mount(&config).is_err());
    }

    #[test]
    fn test_sticky_flags() {
        let volume = volume(Profile::Generic);
        assert!(volume.raise_flag(FLAG_SATURATED));
        assert!(!volume.raise_flag(FLAG_SATURATED));
        assert!(volume.is_saturated());
        assert!(!volume.is_panicked());
    }

    #[test]
    fn test_bitmap_op_raises_panic() {
        let volume = volume(Profile::Generic);
        let mut raw = volume.bitmap().load_raw(0).unwrap();
        raw.data ^= 0b101;
        volume.bitmap().store_raw(0, raw).unwrap();

        assert!(matches!(
            volume.bitmap_op(BitmapOp::Test, 0),
            Err(VoidError::BitmapCorruption { word: 0 })
        ));
        assert!(volume.is_panicked());
    }

    #[test]
    fn test_usage_saturation_threshold() {
        let volume = volume(Profile::Generic);
        let span = volume.span();

        volume.restore_used_blocks(span * 89 / 100);
        assert!(!volume.usage_saturated());

        volume.restore_used_blocks(span * 9 / 10 + 1);
        assert!(volume.usage_saturated());
    }

    #[test]
    fn test_used_counter_wraps() {
        let volume = volume(Profile::Generic);
        volume.restore_used_blocks(u64::MAX);
        volume.record_allocation();
        assert_eq!(volume.used_blocks(), 0);
        volume.record_free();
        assert_eq!(volume.used_blocks(), u64::MAX);
    }

    #[test]
    fn test_horizon_head_wraps() {
        let volume = volume(Profile::Generic);
        let len = volume.geometry().horizon_len();
        volume.set_horizon_head(len - 1);
        assert_eq!(volume.horizon_head(), len - 1);
        volume.advance_horizon_head();
        assert_eq!(volume.horizon_head(), 0);
    }
}
