#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // Bounded output keeps iterations fast.
    let expected_len = u32::from_le_bytes([data[0], data[1], data[2], data[3]]) as usize % (1 << 20);
    let _ = rf_root::decompress::decompress(&data[4..], expected_len);
});
