#![no_main]

use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes, including latin-1, must parse or fail cleanly.
    if let Ok(Some(line)) = mvj::laske::parse_payment_line(data) {
        assert!(line.amount >= rust_decimal::Decimal::ZERO);
        assert!(line.filing_code.starts_with("288"));
    }
});
