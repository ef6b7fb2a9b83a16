#![no_main]
extern crate garmr;

use libfuzzer_sys::fuzz_target;

use garmr::kdc::murmur3_32;

fuzz_target!(|input: (u32, &[u8])| {
    let (seed, data) = input;

    // The hash must stay a pure function of seed and data.
    let first = murmur3_32(seed, data);
    assert_eq!(first, murmur3_32(seed, data));
});
