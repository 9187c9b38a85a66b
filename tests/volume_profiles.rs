//! End-to-end allocation tests across profiles and device kinds

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;
use void_engine::{
    allocate, free, genesis_with_rng, AcceleratorContext, Anchor, BlockAllocator, DeviceKind,
    Genesis, Intent, Profile, TopologyEntry, Volume, VolumeConfig, VoidAllocator, VoidError,
};

const MIB: u64 = 1024 * 1024;
const GIB: u64 = 1024 * MIB;

fn mount(capacity: u64, profile: Profile) -> Volume {
    Volume::mount(&VolumeConfig::with_layout(capacity, 4096, profile).unwrap()).unwrap()
}

#[test]
fn test_gib_volume_far_index() {
    let volume = mount(GIB, Profile::Generic);
    let anchor = Anchor::new(0, 1, 0);

    let allocation = allocate(&volume, &anchor, 100_000).unwrap();
    assert_eq!(allocation.shell, 0);

    let origin = volume.resolve(&anchor, 0, 0).unwrap();
    assert_ne!(origin, allocation.address);
    assert!(!volume.bitmap().test(origin).unwrap().is_set);
    assert!(volume.bitmap().test(allocation.address).unwrap().is_set);
}

#[test]
fn test_double_free_both_clear() {
    let volume = mount(GIB, Profile::Generic);
    let allocation = allocate(&volume, &Anchor::new(9, 11, 0), 3).unwrap();

    for _ in 0..2 {
        free(&volume, allocation.address).unwrap();
        assert!(!volume.bitmap().test(allocation.address).unwrap().is_set);
    }
    assert_eq!(volume.used_blocks(), 0);
}

#[test]
fn test_object_blocks_are_distinct() {
    let allocator = VoidAllocator::new(mount(256 * MIB, Profile::Generic));

    let mut seen = HashSet::new();
    for _ in 0..20 {
        let (anchor, blocks) = allocator.allocate_object(0, Intent::Default, 64).unwrap();
        assert!(anchor.is_some());
        for allocation in blocks {
            assert!(seen.insert(allocation.address), "Block {} allocated twice!", allocation.address);
            assert!(allocator.volume().geometry().in_flux(allocation.address) || allocation.is_horizon());
        }
    }
    assert_eq!(allocator.used_blocks(), 20 * 64);
}

#[test]
fn test_object_count_beyond_capacity_collapses() {
    let allocator = VoidAllocator::new(mount(16 * MIB, Profile::Pico));

    let err = allocator
        .allocate_object(0, Intent::Default, u64::MAX)
        .unwrap_err();
    assert!(err.is_exhaustion());
    assert_eq!(allocator.used_blocks(), 0);
    assert_eq!(
        allocator.volume().bitmap().count_set_in(0..allocator.total_blocks()).unwrap(),
        0
    );
}

#[test]
fn test_fractal_scale_spacing() {
    let volume = mount(GIB, Profile::Generic);
    let anchor = Anchor::new(0, 1, 4);
    let flux = volume.geometry().flux_start;

    for logical in 0..16 {
        let allocation = allocate(&volume, &anchor, logical).unwrap();
        assert_eq!(allocation.address, flux + logical * 16);
    }
}

#[test]
fn test_pico_volume_is_sequential() {
    let volume = mount(16 * MIB, Profile::Pico);
    let mut rng = StdRng::seed_from_u64(21);
    assert!(volume.quality_mask().is_none());

    let anchor = genesis_with_rng(&volume, 0, Intent::Default, None, &mut rng)
        .unwrap()
        .anchor()
        .unwrap();
    assert_eq!(anchor.orbit, 1);

    let first = allocate(&volume, &anchor, 0).unwrap();
    let second = allocate(&volume, &anchor, 1).unwrap();
    let span = volume.span();
    let flux = volume.geometry().flux_start;
    assert_eq!((second.address - flux) % span, (first.address - flux + 1) % span);

    assert!(matches!(
        allocate(&volume, &anchor, 1),
        Err(VoidError::Collapse { logical_index: 1 })
    ));
}

#[test]
fn test_zoned_device_never_leaves_shell_zero_target() {
    let config = VolumeConfig::with_layout(64 * MIB, 4096, Profile::Generic)
        .unwrap()
        .with_device(DeviceKind::ZonedLinear);
    let volume = Volume::mount(&config).unwrap();
    let anchor = Anchor::new(100, 1, 0);

    let target = volume.resolve(&anchor, 0, 0).unwrap();
    for shell in 1..12 {
        assert_eq!(volume.resolve(&anchor, 0, shell), Some(target));
    }

    allocate(&volume, &anchor, 0).unwrap();
    let retry = allocate(&volume, &anchor, 0).unwrap();
    assert!(retry.is_horizon());
}

#[test]
fn test_accelerator_affinity_end_to_end() {
    let topology = vec![
        TopologyEntry {
            device_id: 0,
            window_start: 0,
            window_len: 4096,
            affinity: 100,
        },
        TopologyEntry {
            device_id: 1,
            window_start: 8192,
            window_len: 4096,
            affinity: 100,
        },
    ];
    let config = VolumeConfig::with_layout(256 * MIB, 4096, Profile::Ai)
        .unwrap()
        .with_topology(topology);
    let volume = Volume::mount(&config).unwrap();
    let flux = volume.geometry().flux_start;
    let mut rng = StdRng::seed_from_u64(33);

    for _ in 0..20 {
        let genesis = genesis_with_rng(
            &volume,
            0,
            Intent::Default,
            Some(AcceleratorContext::new(1)),
            &mut rng,
        )
        .unwrap();
        let anchor = match genesis {
            Genesis::Ballistic(anchor) => anchor,
            Genesis::HorizonFallback => panic!("unexpected saturation"),
        };

        for logical in 0..8 {
            let allocation = allocate(&volume, &anchor, logical).unwrap();
            if allocation.shell == 0 {
                assert!((flux + 8192..flux + 12288).contains(&allocation.address));
            }
        }
    }
}

#[test]
fn test_strict_accelerator_window_exhaustion() {
    let topology = vec![TopologyEntry {
        device_id: 7,
        window_start: 64,
        window_len: 32,
        affinity: 1,
    }];
    let config = VolumeConfig::with_layout(64 * MIB, 4096, Profile::Ai)
        .unwrap()
        .with_topology(topology);
    let allocator = VoidAllocator::new(Volume::mount(&config).unwrap());
    let flux = allocator.volume().geometry().flux_start;

    let anchor = Anchor::new(64, 1, 0);
    for logical in 0..32 {
        let allocation = BlockAllocator::allocate(&allocator, &anchor, logical).unwrap();
        assert_eq!(allocation.address, flux + 64 + logical);
    }

    let err = allocator
        .genesis(0, Intent::Default, Some(AcceleratorContext::strict(7)))
        .unwrap_err();
    assert!(matches!(err, VoidError::AcceleratorWindowExhausted { device: 7 }));
    assert!(err.is_exhaustion());

    assert!(allocator
        .genesis(0, Intent::Default, Some(AcceleratorContext::new(7)))
        .is_ok());
}

#[test]
fn test_metadata_profile_keeps_objects_low() {
    let volume = mount(GIB, Profile::Metadata);
    let mut rng = StdRng::seed_from_u64(44);
    let limit = volume.span() / 10;

    for _ in 0..100 {
        let anchor = genesis_with_rng(&volume, 0, Intent::Default, None, &mut rng)
            .unwrap()
            .anchor()
            .unwrap();
        assert!(anchor.gravity < limit);
    }
}

#[test]
fn test_used_counter_wraps_without_fault() {
    let volume = mount(64 * MIB, Profile::Generic);
    volume.restore_used_blocks(u64::MAX);

    let allocation = allocate(&volume, &Anchor::new(0, 1, 0), 0).unwrap();
    assert_eq!(volume.used_blocks(), 0);

    free(&volume, allocation.address).unwrap();
    assert_eq!(volume.used_blocks(), u64::MAX);
}

#[test]
fn test_stats_snapshot() {
    let volume = mount(64 * MIB, Profile::Generic);
    allocate(&volume, &Anchor::new(0, 1, 0), 0).unwrap();

    let stats = volume.stats();
    assert_eq!(stats.span, volume.span());
    assert_eq!(stats.used_blocks, 1);
    assert_eq!(stats.heals, 0);
    assert!(!stats.saturated);
    assert!(!stats.panicked);
}
