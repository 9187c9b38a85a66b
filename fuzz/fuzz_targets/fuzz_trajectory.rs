#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use void_engine::{resolve_trajectory, DeviceKind, Geometry};

#[derive(Arbitrary, Debug)]
struct Input {
    flux_start: u32,
    span: u64,
    gravity: u64,
    orbit: u64,
    logical: u64,
    scale: u8,
    shell: u8,
    zoned: bool,
}

fuzz_target!(|input: Input| {
    let flux_start = input.flux_start as u64;
    let span = input.span % (1 << 48);
    let geometry = Geometry {
        block_size: 4096,
        total_blocks: flux_start + span,
        flux_start,
        horizon_start: flux_start + span,
        journal_start: flux_start + span,
        device: if input.zoned {
            DeviceKind::ZonedLinear
        } else {
            DeviceKind::Flash
        },
    };

    let block = resolve_trajectory(
        &geometry,
        input.gravity,
        input.orbit,
        input.logical,
        input.scale,
        input.shell,
    );

    match block {
        None => assert_eq!(span, 0),
        Some(block) => {
            let stride = 1u64 << input.scale.min(63);
            assert!(block >= flux_start);
            assert!(block - flux_start < span.max(stride));
            assert_eq!((block - flux_start) % stride, 0);
        }
    }
});
