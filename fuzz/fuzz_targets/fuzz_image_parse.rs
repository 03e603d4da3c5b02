#![no_main]

use libfuzzer_sys::fuzz_target;
use pescope::Image;

fuzz_target!(|data: &[u8]| {
    // Opening arbitrary bytes must never panic, only return errors.
    let _ = Image::parse(data);
});
