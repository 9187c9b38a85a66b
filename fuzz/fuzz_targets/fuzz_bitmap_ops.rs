#![no_main]
use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use std::collections::HashSet;
use void_engine::{ArmoredBitmap, ArmoredWord, BitmapOp};

const BITS: u64 = 1024;

#[derive(Arbitrary, Debug)]
enum Action {
    Set(u16),
    Clear(u16),
    Test(u16),
    FlipBit { word: u8, bit: u8 },
}

fuzz_target!(|actions: Vec<Action>| {
    let bitmap = ArmoredBitmap::new(BITS);
    let mut model = HashSet::new();

    for action in actions {
        let (op, index) = match action {
            Action::Set(index) => (BitmapOp::Set, index),
            Action::Clear(index) => (BitmapOp::Clear, index),
            Action::Test(index) => (BitmapOp::Test, index),
            Action::FlipBit { word, bit } => {
                let word = word as usize % (BITS / 64) as usize;
                let current = bitmap.load_raw(word).unwrap();
                // Only single-bit damage; it must always heal
                if current == ArmoredWord::new(current.data) {
                    let mut damaged = current;
                    damaged.data ^= 1 << (bit % 64);
                    bitmap.store_raw(word, damaged).unwrap();
                }
                continue;
            }
        };

        let index = index as u64 % BITS;
        let outcome = bitmap.apply(op, index).unwrap();
        assert_eq!(outcome.was_set, model.contains(&index));

        match op {
            BitmapOp::Set => {
                model.insert(index);
            }
            BitmapOp::Clear => {
                model.remove(&index);
            }
            BitmapOp::Test => {}
        }
        assert_eq!(outcome.is_set, model.contains(&index));
    }

    assert_eq!(bitmap.count_set_in(0..BITS).unwrap(), model.len() as u64);
});
