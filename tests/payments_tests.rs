#![cfg(feature = "laske")]

use std::fs;

use chrono::{NaiveDate, NaiveDateTime};
use mvj::core::*;
use mvj::laske::{self, LaskeSettings, LocalDirTransport, Transport};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn now() -> NaiveDateTime {
    date(2020, 3, 16).and_hms_opt(7, 30, 0).unwrap()
}

fn line(record: char, paid: &str, number: u64, euros: u64, cents: u64) -> String {
    format!(
        "{record}{:20}{paid}{:<16}{number:020}{:14}{euros:08}{cents:02}{:3}",
        "", "28800001234", "", ""
    )
}

fn settings() -> LaskeSettings {
    LaskeSettings {
        payments_import_id: Some("ID340".into()),
        ..LaskeSettings::default()
    }
}

/// One numbered invoice of 124,00 on a lease subject to 24 % VAT.
fn store_with_invoice(vat_subject: bool) -> (Store, InvoiceId) {
    let mut store = Store::new();
    let mut unit = ServiceUnit::new(1, "MaKe", ServiceUnitKind::Make);
    unit.first_invoice_number = 12345;
    store.insert_service_unit(unit);
    store.insert_receivable_type(ReceivableType::new(2, "Maanvuokraus", 1));
    store.insert_contact(Contact::business(200, "Asunto Oy Testi", "1234567-8"));
    store.add_vat(Vat {
        percent: dec!(24),
        start_date: date(2013, 1, 1),
        end_date: None,
    });
    let mut lease = Lease::new(
        10,
        LeaseIdentifier {
            type_code: "T1".into(),
            municipality: 1,
            district: 12,
            sequence: 3,
        },
        1,
    );
    lease.is_subject_to_vat = vat_subject;
    store.insert_lease(lease);

    let draft = InvoiceDraft::new(10, 200, date(2020, 3, 2)).add_row(RowDraft::new(2, dec!(124)));
    let id = create_charge_invoice(&mut store, draft, date(2020, 2, 15)).unwrap();
    assert_eq!(generate_invoice_number(&mut store, id).unwrap(), 12345);
    (store, id)
}

#[test]
fn vat_is_removed_from_paid_amount() {
    let (mut store, id) = store_with_invoice(true);
    let content = line('3', "200315", 12345, 124, 0);
    let imported =
        laske::import_payment_file(&mut store, "MR_OUT_ID340_1", content.as_bytes(), now());

    assert_eq!(imported.payment_count, 1);
    assert_eq!(imported.error_count, 0);
    assert_eq!(imported.invoices, vec![id]);
    let invoice = store.invoice(id).unwrap();
    assert_eq!(invoice.payments.len(), 1);
    assert_eq!(invoice.payments[0].paid_amount, dec!(100.00));
    assert_eq!(invoice.payments[0].paid_date, date(2020, 3, 15));
    assert_eq!(invoice.payments[0].filing_code.as_deref(), Some("28800001234"));
    assert_eq!(invoice.outstanding_amount, dec!(24));
}

#[test]
fn amount_is_kept_without_vat() {
    let (mut store, id) = store_with_invoice(false);
    let content = line('5', "200315", 12345, 124, 0);
    laske::import_payment_file(&mut store, "MR_OUT_ID340_1", content.as_bytes(), now());
    let invoice = store.invoice(id).unwrap();
    assert_eq!(invoice.payments[0].paid_amount, dec!(124));
    assert_eq!(invoice.outstanding_amount, Decimal::ZERO);
    assert_eq!(invoice.state, InvoiceState::Paid);
}

#[test]
fn duplicate_and_bad_lines() {
    let (mut store, id) = store_with_invoice(false);
    let content = [
        line('0', "200315", 0, 0, 0),
        line('3', "200315", 12345, 20, 50),
        line('3', "200315", 12345, 20, 50),
        line('7', "200315", 99999, 1, 0),
        "garbage".to_string(),
    ]
    .join("\r\n");
    let imported =
        laske::import_payment_file(&mut store, "MR_OUT_ID340_2", content.as_bytes(), now());

    assert_eq!(imported.payment_count, 1);
    // Unknown invoice number.
    assert_eq!(imported.error_count, 1);
    assert_eq!(store.invoice(id).unwrap().payments.len(), 1);
    assert!(store.payment_import_log.is_processed("MR_OUT_ID340_2"));
}

#[test]
fn import_from_transport_archives_files() {
    let (mut store, id) = store_with_invoice(false);
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("MR_OUT_ID340_20200316"),
        line('3', "200315", 12345, 124, 0),
    )
    .unwrap();
    fs::write(dir.path().join("MR_OUT_OTHER_20200316"), line('3', "200315", 12345, 1, 0)).unwrap();
    let mut transport = LocalDirTransport::new(dir.path());

    let summary = laske::import_payments(&mut store, &settings(), &mut transport, now()).unwrap();
    assert_eq!(summary.files.len(), 1);
    assert_eq!(summary.payment_count(), 1);
    assert!(summary.failed_files.is_empty());
    assert_eq!(store.invoice(id).unwrap().state, InvoiceState::Paid);
    assert!(
        dir.path()
            .join(laske::ARCHIVE_DIR)
            .join("MR_OUT_ID340_20200316")
            .exists()
    );
    assert_eq!(transport.list().unwrap(), vec!["MR_OUT_OTHER_20200316".to_string()]);

    // A file already in the log is not imported again.
    fs::write(
        dir.path().join("MR_OUT_ID340_20200316"),
        line('3', "200315", 12345, 124, 0),
    )
    .unwrap();
    let summary = laske::import_payments(&mut store, &settings(), &mut transport, now()).unwrap();
    assert!(summary.files.is_empty());
    assert_eq!(store.invoice(id).unwrap().payments.len(), 1);
}

#[test]
fn import_needs_an_id() {
    let mut store = Store::new();
    let dir = tempfile::tempdir().unwrap();
    let err = laske::import_payments(
        &mut store,
        &LaskeSettings::default(),
        &mut LocalDirTransport::new(dir.path()),
        now(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "config");
}
