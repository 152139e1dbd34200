#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let (name, care_of) = s.split_once('\n').map_or((s, None), |(n, c)| (n, Some(c)));
        for slot in mvj::laske::split_name(name, care_of).iter().flatten() {
            assert!(slot.chars().count() <= 35);
        }
    }
});
