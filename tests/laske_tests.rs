#![cfg(feature = "laske")]

use std::cell::RefCell;
use std::fs;

use chrono::{NaiveDate, NaiveDateTime};
use mvj::core::rent::{ContractRent, PeriodType, Rent, RentType};
use mvj::core::*;
use mvj::laske::{
    self, ExportNotifier, ExportSummary, LaskeSettings, LaskeValues, LocalDirTransport,
    build_sales_order, export_invoices, is_valid_reference, to_laske_xml,
};
use rust_decimal_macros::dec;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn now() -> NaiveDateTime {
    date(2017, 6, 20).and_hms_opt(6, 0, 0).unwrap()
}

fn settings(export_root: &std::path::Path) -> LaskeSettings {
    LaskeSettings {
        export_root: Some(export_root.to_path_buf()),
        due_date_offset_days: 0,
        payments_import_id: Some("ID340".into()),
        values: LaskeValues {
            distribution_channel: "10".into(),
            division: "10".into(),
            sales_office: "2826".into(),
            pmntterm: "Z100".into(),
            sales_group: None,
            order_reason: None,
        },
        ..LaskeSettings::default()
    }
}

/// Lease 10 with two half tenants and an INDEX rent of 1200 a year.
fn store(kind: ServiceUnitKind) -> Store {
    let mut store = Store::new();
    store.index.set_yearly_average(2016, dec!(1976));

    let mut unit = ServiceUnit::new(1, "Maankäyttö", kind);
    unit.laske_sender_id = "ID340".into();
    unit.laske_sales_org = "2800".into();
    unit.first_invoice_number = 1_000_001;
    unit.default_receivable_type_rent = Some(2);
    store.insert_service_unit(unit);
    let mut rent_type = ReceivableType::new(2, "Maanvuokraus", 1);
    rent_type.sap_material_code = Some("10111000".into());
    rent_type.sap_order_item_number = Some("2800061".into());
    store.insert_receivable_type(rent_type);
    store.insert_intended_use(IntendedUse {
        id: 7,
        name: "Asunto".into(),
        service_unit: Some(1),
    });

    let mut lease = Lease::new(
        10,
        LeaseIdentifier {
            type_code: "A1".into(),
            municipality: 1,
            district: 4,
            sequence: 1,
        },
        1,
    );
    lease.start_date = Some(date(2000, 1, 1));
    lease.intended_use = Some("Asuntotontti, kerrostalo ja liiketila".into());
    for i in 0..2u64 {
        let mut contact = Contact::person(200 + i, "Testi", &format!("Vuokralainen {i}"));
        contact.address = Some("Testikatu 1".into());
        contact.postal_code = Some("00100".into());
        contact.city = Some("Helsinki".into());
        store.insert_contact(contact);
        lease.tenants.push(Tenant::new(100 + i, 1, 2).with_contact(TenantContact::new(
            300 + i,
            200 + i,
            TenantContactRole::Tenant,
            None,
            None,
        )));
    }
    let mut rent = Rent::new(50, RentType::Index);
    rent.due_dates_per_year = Some(12);
    rent.elementary_index = Some(dec!(1976));
    rent.contract_rents.push(ContractRent {
        id: 51,
        intended_use: Some(7),
        amount: dec!(1200),
        period: PeriodType::PerYear,
        base_amount: None,
        base_amount_period: None,
        base_year_rent: None,
        index: None,
        start_date: None,
        end_date: None,
    });
    lease.rents.push(rent);
    store.insert_lease(lease);
    store
}

fn july_invoices(store: &mut Store) -> Vec<InvoiceId> {
    let july = DateRange::month(2017, 7).unwrap();
    generate_invoices_for_period(store, 10, &july, date(2017, 6, 15)).unwrap()
}

#[derive(Default)]
struct RecordingNotifier {
    summaries: RefCell<Vec<ExportSummary>>,
}

impl ExportNotifier for RecordingNotifier {
    fn export_finished(&self, summary: &ExportSummary) {
        self.summaries.borrow_mut().push(summary.clone());
    }
}

#[test]
fn make_bill_texts() {
    let mut store = store(ServiceUnitKind::Make);
    let ids = july_invoices(&mut store);
    generate_invoice_number(&mut store, ids[0]).unwrap();
    let order = build_sales_order(&store, ids[0], &settings(std::path::Path::new("/tmp"))).unwrap();

    let bill: Vec<&str> = order.bill_text.iter().flatten().map(String::as_str).collect();
    insta::assert_snapshot!(bill.join("\n"), @r"
    Vuokraustunnus: A1104-1  Ajalta: 01.07.2017-31.07.2017
    Päättymispvm: -  Käyttötarkoitus: Asuntotontti, kerrostalo
    Indeksin tark.pvm: 1.1.  Vuosivuokra: 1200,00
    ");

    let item = &order.line_items[0];
    assert_eq!(item.net_price.as_deref(), Some("50,00"));
    assert_eq!(item.material.as_deref(), Some("10111000"));
    assert_eq!(item.order_item_number.as_deref(), Some("2800061"));
    assert_eq!(
        item.line_text[0].as_deref(),
        Some("Maanvuokraus, Asunto, 01.07.2017-31.07.2017")
    );
    assert_eq!(item.line_text[3].as_deref(), Some(laske::LATE_PAYMENT_NOTICE[0]));
}

#[test]
fn akv_bill_texts_are_blank() {
    let mut store = store(ServiceUnitKind::Akv);
    let ids = july_invoices(&mut store);
    generate_invoice_number(&mut store, ids[0]).unwrap();
    let order = build_sales_order(&store, ids[0], &settings(std::path::Path::new("/tmp"))).unwrap();
    assert!(order.bill_text.iter().all(|t| t.as_deref() == Some("")));

    let xml = to_laske_xml(&[order]).unwrap();
    for n in 1..=6 {
        assert!(xml.contains(&format!("<BillTextL{n}></BillTextL{n}>")), "{xml}");
    }
}

#[test]
fn export_writes_uploads_and_logs() {
    let root = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let mut store = store(ServiceUnitKind::Make);
    let ids = july_invoices(&mut store);
    let mut transport = LocalDirTransport::new(remote.path());
    let notifier = RecordingNotifier::default();

    let summary = export_invoices(
        &mut store,
        1,
        None,
        &settings(root.path()),
        &mut transport,
        &notifier,
        now(),
    )
    .unwrap();

    assert_eq!(summary.sent, ids);
    assert!(summary.failed.is_empty());
    let filename = summary.filename.clone().unwrap();
    assert!(filename.starts_with("MTIL_IN_ID340_"));
    assert!(root.path().join(&filename).exists());

    let xml = fs::read_to_string(remote.path().join(&filename)).unwrap();
    assert_eq!(xml.matches("<SBO_SalesOrder>").count(), 2);
    assert!(xml.contains("<PMNTTERM>Z100</PMNTTERM>"));
    assert!(xml.contains("<OrderType>ZTY1</OrderType>"));
    for id in &ids {
        let invoice = store.invoice(*id).unwrap();
        assert_eq!(invoice.sent_to_sap_at, Some(now()));
        let number = invoice.number.unwrap();
        let reference = laske::payment_reference(ServiceUnitKind::Make, number).unwrap();
        assert!(reference.starts_with(&format!("288{number}")));
        assert!(is_valid_reference(&reference));
        assert!(xml.contains(&format!("<PaymentReference>{reference}</PaymentReference>")));
    }

    let log = &store.export_logs[&summary.log.unwrap()];
    assert_eq!(log.items.len(), 2);
    assert!(log.items.iter().all(|i| i.status == ExportStatus::Sent));
    assert_eq!(notifier.summaries.borrow().len(), 1);

    // Nothing left to send.
    let again = export_invoices(
        &mut store,
        1,
        None,
        &settings(root.path()),
        &mut transport,
        &notifier,
        now(),
    )
    .unwrap();
    assert!(again.sent.is_empty());
    assert_eq!(again.log, None);
}

#[test]
fn invalid_order_is_logged_and_kept_unsent() {
    let root = tempfile::tempdir().unwrap();
    let remote = tempfile::tempdir().unwrap();
    let mut store = store(ServiceUnitKind::Make);
    let ids = july_invoices(&mut store);
    let bad = store.invoice(ids[1]).unwrap().recipient;
    store.contacts.get_mut(&bad).unwrap().sap_sales_office = Some("TOO LONG".into());

    let summary = export_invoices(
        &mut store,
        1,
        None,
        &settings(root.path()),
        &mut LocalDirTransport::new(remote.path()),
        &laske::TracingNotifier,
        now(),
    )
    .unwrap();

    assert_eq!(summary.sent, vec![ids[0]]);
    assert_eq!(summary.failed.len(), 1);
    let failed = &summary.failed[0];
    assert_eq!(failed.invoice, ids[1]);
    assert_eq!(failed.lease_identifier, "A1104-1");
    assert!(failed.information.contains("SalesOrder.SalesOffice"));
    assert!(failed.information.contains("no more than 4 characters"));
    assert_eq!(store.invoice(ids[1]).unwrap().sent_to_sap_at, None);
    assert!(store.invoice(ids[1]).unwrap().number.is_some());

    let log = &store.export_logs[&summary.log.unwrap()];
    let item = log.items.iter().find(|i| i.invoice == ids[1]).unwrap();
    assert_eq!(item.status, ExportStatus::Failed);
}

#[test]
fn export_needs_existing_directory() {
    let mut store = store(ServiceUnitKind::Make);
    july_invoices(&mut store);
    let missing = std::env::temp_dir().join("mvj-missing-export-root");
    let err = export_invoices(
        &mut store,
        1,
        None,
        &settings(&missing),
        &mut LocalDirTransport::new(&missing),
        &laske::TracingNotifier,
        now(),
    )
    .unwrap_err();
    assert_eq!(err.kind(), "transport");
}

#[test]
fn value_date_uses_adjusted_due_date_and_offset() {
    let mut store = store(ServiceUnitKind::Make);
    let draft = InvoiceDraft::new(10, 200, date(2021, 1, 6))
        .add_row(RowDraft::new(2, dec!(10)).tenant(100));
    let id = create_charge_invoice(&mut store, draft, date(2021, 1, 1)).unwrap();
    assert_eq!(store.invoice(id).unwrap().adjusted_due_date, Some(date(2021, 1, 7)));
    generate_invoice_number(&mut store, id).unwrap();

    let mut settings = settings(std::path::Path::new("/tmp"));
    settings.due_date_offset_days = 2;
    let order = build_sales_order(&store, id, &settings).unwrap();
    assert_eq!(order.value_date.as_deref(), Some("20210105"));
    assert_eq!(order.billing_date.as_deref(), Some("20210101"));
}

#[test]
fn credit_note_refers_to_original_order() {
    let mut store = store(ServiceUnitKind::Make);
    let ids = july_invoices(&mut store);
    let number = generate_invoice_number(&mut store, ids[0]).unwrap();
    let note = credit_invoice(&mut store, ids[0], None, date(2017, 7, 10)).unwrap();
    generate_invoice_number(&mut store, note).unwrap();

    let order = build_sales_order(&store, note, &settings(std::path::Path::new("/tmp"))).unwrap();
    assert_eq!(order.original_order, Some(number.to_string()));
    assert_eq!(order.order_type.as_deref(), Some(laske::ORDER_TYPE_CREDIT_NOTE));
}

#[test]
fn unnumbered_invoice_cannot_be_rendered() {
    let mut store = store(ServiceUnitKind::Make);
    let ids = july_invoices(&mut store);
    let settings = settings(std::path::Path::new("/tmp"));
    let err = build_sales_order(&store, ids[0], &settings).unwrap_err();
    assert_eq!(err.kind(), "state-precondition");
}
