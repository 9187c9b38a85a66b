//! Concurrent allocation stress tests
//!
//! The hot path has no global lock; these tests race many threads on one
//! volume and check that no block is ever handed out twice.

use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::{Arc, Barrier};
use std::thread;
use void_engine::{
    allocate, free, genesis, Anchor, Genesis, Intent, Profile, Volume, VolumeConfig, VoidError,
};

const GIB: u64 = 1024 * 1024 * 1024;

fn shared_volume(profile: Profile) -> Arc<Volume> {
    let config = VolumeConfig::with_layout(GIB, 4096, profile).unwrap();
    Arc::new(Volume::mount(&config).unwrap())
}

#[test]
fn test_same_identity_same_index_two_threads() {
    for round in 0..50 {
        let volume = shared_volume(Profile::Generic);
        let anchor = Anchor::new(round * 7919, 104_729, 0);
        let barrier = Arc::new(Barrier::new(2));

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let volume = volume.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    allocate(&volume, &anchor, 42).unwrap()
                })
            })
            .collect();

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_ne!(results[0].address, results[1].address);
        assert_ne!(results[0].shell, results[1].shell);
        assert_eq!(volume.used_blocks(), 2);
    }
}

#[test]
fn test_many_threads_unique_blocks() {
    let volume = shared_volume(Profile::Generic);
    let seen = Arc::new(Mutex::new(HashSet::new()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let volume = volume.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for _ in 0..25 {
                    let anchor = match genesis(&volume, 0, Intent::Default, None).unwrap() {
                        Genesis::Ballistic(anchor) => anchor,
                        Genesis::HorizonFallback => panic!("empty volume reported saturation"),
                    };

                    for logical in 0..40 {
                        let allocation = allocate(&volume, &anchor, logical).unwrap();
                        assert!(
                            seen.lock().insert(allocation.address),
                            "Block {} allocated twice!",
                            allocation.address
                        );
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(seen.lock().len(), 8 * 25 * 40);
    assert_eq!(volume.used_blocks(), 8 * 25 * 40);
}

#[test]
fn test_shared_identity_contention() {
    // Every thread uses one identity; collisions push callers outward
    let volume = shared_volume(Profile::Generic);
    let anchor = Anchor::new(0, 1, 0);
    let seen = Arc::new(Mutex::new(HashSet::new()));
    let barrier = Arc::new(Barrier::new(6));

    let handles: Vec<_> = (0..6)
        .map(|_| {
            let volume = volume.clone();
            let seen = seen.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                for logical in 0..100 {
                    match allocate(&volume, &anchor, logical) {
                        Ok(allocation) => assert!(seen.lock().insert(allocation.address)),
                        Err(VoidError::Collapse { .. }) => {}
                        Err(err) => panic!("unexpected error: {}", err),
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(volume.used_blocks(), seen.lock().len() as u64);
}

#[test]
fn test_concurrent_allocate_and_free() {
    let volume = shared_volume(Profile::Ai);

    let handles: Vec<_> = (0..4u64)
        .map(|thread_id| {
            let volume = volume.clone();
            thread::spawn(move || {
                let anchor = Anchor::new(thread_id * 10_000, 1, 0);
                for _ in 0..50 {
                    let blocks: Vec<u64> = (0..32)
                        .map(|logical| allocate(&volume, &anchor, logical).unwrap().address)
                        .collect();
                    for block in blocks {
                        free(&volume, block).unwrap();
                    }
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(volume.used_blocks(), 0);
    assert_eq!(volume.bitmap().count_set_in(0..volume.geometry().total_blocks).unwrap(), 0);
}
