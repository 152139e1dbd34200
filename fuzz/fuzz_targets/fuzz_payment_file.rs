#![no_main]

use chrono::NaiveDate;
use libfuzzer_sys::fuzz_target;
use mvj::core::Store;

fuzz_target!(|data: &[u8]| {
    // Every line refers to an unknown invoice, so nothing may be recorded.
    let mut store = Store::new();
    let now = NaiveDate::from_ymd_opt(2020, 3, 16)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap();
    let imported = mvj::laske::import_payment_file(&mut store, "MR_OUT_FUZZ_1", data, now);
    assert_eq!(imported.payment_count, 0);
    assert!(store.payment_import_log.is_processed("MR_OUT_FUZZ_1"));
});
