//! Laske export job: invoices of a service unit to one `MTIL_IN_*` file.

use std::fs;

use chrono::{Duration, NaiveDate, NaiveDateTime};
use serde_json::json;

use super::adapter::{InvoiceContext, adapter_for, billing_date};
use super::party::party_from_contact;
use super::reference::payment_reference;
use super::sales_order::{
    LineItem, ORDER_TYPE_CHARGE, ORDER_TYPE_CREDIT_NOTE, SalesOrder, to_laske_xml,
};
use super::settings::LaskeSettings;
use super::transport::Transport;
use super::validate::{errors_json, validate_sales_order};
use super::xml_utils::format_net_price;
use crate::core::{
    BillingError, ExportLog, ExportLogId, ExportLogItem, ExportStatus, InvoiceId, InvoiceRow,
    InvoiceType, Lease, ReceivableType, ServiceUnit, ServiceUnitId, Store,
    generate_invoice_number,
};

const MATERIAL_DESCRIPTION_LEN: usize = 40;

fn non_empty(value: &Option<String>) -> Option<String> {
    value.as_deref().filter(|v| !v.trim().is_empty()).map(String::from)
}

fn laske_date(date: NaiveDate) -> String {
    date.format("%Y%m%d").to_string()
}

/// SAP accounting codes of one line item. At most one of `wbs_element`
/// and `order_item_number` is set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SapCodes {
    pub material: Option<String>,
    pub wbs_element: Option<String>,
    pub order_item_number: Option<String>,
}

impl SapCodes {
    fn preferring_wbs(
        material: &Option<String>,
        project: &Option<String>,
        order_item: &Option<String>,
    ) -> Self {
        let wbs_element = non_empty(project);
        let order_item_number = if wbs_element.is_some() { None } else { non_empty(order_item) };
        Self {
            material: non_empty(material),
            wbs_element,
            order_item_number,
        }
    }
}

/// SAP codes of a row with receivable type `receivable_type`.
///
/// The unit's default rent type without codes of its own inherits them
/// from the lease type; the default collateral type always books to its
/// project. An internal order on the lease replaces the codes of rent rows,
/// and of every row in KUVA units.
pub fn sap_codes(unit: &ServiceUnit, lease: &Lease, receivable_type: &ReceivableType) -> SapCodes {
    let is_rent = unit.default_receivable_type_rent == Some(receivable_type.id);
    let mut codes = if is_rent && !receivable_type.has_sap_codes() {
        let lease_type = &lease.lease_type;
        SapCodes::preferring_wbs(
            &lease_type.sap_material_code,
            &lease_type.sap_project_number,
            &lease_type.sap_order_item_number,
        )
    } else if unit.default_receivable_type_collateral == Some(receivable_type.id) {
        SapCodes {
            material: non_empty(&receivable_type.sap_material_code),
            wbs_element: non_empty(&receivable_type.sap_project_number),
            order_item_number: None,
        }
    } else {
        SapCodes::preferring_wbs(
            &receivable_type.sap_material_code,
            &receivable_type.sap_project_number,
            &receivable_type.sap_order_item_number,
        )
    };

    if let Some(internal_order) = non_empty(&lease.internal_order)
        && (unit.kind.is_kuva() || is_rent)
    {
        codes.order_item_number = Some(internal_order);
        codes.wbs_element = None;
    }
    codes
}

fn line_item(
    ctx: &InvoiceContext<'_>,
    row: &InvoiceRow,
    is_last: bool,
) -> Result<LineItem, BillingError> {
    let receivable_type = ctx.store.receivable_type(row.receivable_type)?;
    let codes = sap_codes(ctx.service_unit, ctx.lease, receivable_type);
    Ok(LineItem {
        material: codes.material,
        material_description: Some(
            receivable_type
                .name
                .chars()
                .take(MATERIAL_DESCRIPTION_LEN)
                .collect(),
        ),
        quantity: Some("1,00".into()),
        net_price: Some(format_net_price(row.amount)),
        line_text: adapter_for(ctx.service_unit.kind).line_texts(ctx, row, is_last),
        order_item_number: codes.order_item_number,
        wbs_element: codes.wbs_element,
        ..LineItem::default()
    })
}

/// Build the sales order of a numbered invoice.
pub fn build_sales_order(
    store: &Store,
    invoice_id: InvoiceId,
    settings: &LaskeSettings,
) -> Result<SalesOrder, BillingError> {
    let invoice = store.invoice(invoice_id)?;
    let lease = store.lease(invoice.lease)?;
    let service_unit = store.service_unit(invoice.service_unit)?;
    let recipient = store.contact(invoice.recipient)?;
    let number = invoice
        .number
        .ok_or_else(|| BillingError::State(format!("invoice {invoice_id} has no number")))?;

    let ctx = InvoiceContext {
        store,
        invoice,
        lease,
        service_unit,
    };
    let adapter = adapter_for(service_unit.kind);

    let original_order = match invoice.credited_invoice {
        Some(credited) => store.invoice(credited)?.number.map(|n| n.to_string()),
        None => None,
    };
    let order_type = match invoice.invoice_type {
        InvoiceType::Charge => ORDER_TYPE_CHARGE,
        InvoiceType::CreditNote => ORDER_TYPE_CREDIT_NOTE,
    };

    let rows: Vec<&InvoiceRow> = invoice.active_rows().collect();
    let line_items = rows
        .iter()
        .enumerate()
        .map(|(i, row)| line_item(&ctx, row, i + 1 == rows.len()))
        .collect::<Result<Vec<_>, _>>()?;

    let value_date = invoice.adjusted_due_date.unwrap_or(invoice.due_date)
        - Duration::days(settings.due_date_offset_days);
    let party = party_from_contact(recipient);
    let values = &settings.values;

    Ok(SalesOrder {
        sender_id: Some(service_unit.laske_sender_id.clone()),
        reference: Some(number.to_string()),
        original_order,
        contract_number: non_empty(&lease.contract_number),
        order_type: Some(order_type.into()),
        sales_org: Some(service_unit.laske_sales_org.clone()),
        distribution_channel: Some(values.distribution_channel.clone()),
        division: Some(values.division.clone()),
        sales_office: non_empty(&recipient.sap_sales_office)
            .or_else(|| Some(values.sales_office.clone())),
        sales_group: values.sales_group.clone(),
        bill_text: adapter.bill_texts(&ctx),
        reference_text: Some(lease.identifier.to_string()),
        pmntterm: Some(values.pmntterm.clone()),
        order_reason: values.order_reason.clone(),
        billing_date: Some(laske_date(billing_date(invoice))),
        value_date: Some(laske_date(value_date)),
        payment_reference: Some(payment_reference(service_unit.kind, number)?),
        order_party: party.clone(),
        billing_party1: party.clone(),
        payer_party: party,
        line_items,
        ..SalesOrder::default()
    })
}

/// An invoice left out of an export file.
#[derive(Debug, Clone, PartialEq)]
pub struct FailedInvoice {
    pub invoice: InvoiceId,
    pub number: Option<u64>,
    pub lease_identifier: String,
    pub kind: &'static str,
    pub information: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExportSummary {
    pub service_unit: ServiceUnitId,
    /// `None` when there was nothing to export.
    pub log: Option<ExportLogId>,
    pub filename: Option<String>,
    pub sent: Vec<InvoiceId>,
    pub failed: Vec<FailedInvoice>,
}

impl ExportSummary {
    fn empty(service_unit: ServiceUnitId) -> Self {
        Self {
            service_unit,
            log: None,
            filename: None,
            sent: Vec::new(),
            failed: Vec::new(),
        }
    }
}

/// Receives the outcome of every export run that produced a log.
pub trait ExportNotifier {
    fn export_finished(&self, summary: &ExportSummary);
}

/// Reports export results through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl ExportNotifier for TracingNotifier {
    fn export_finished(&self, summary: &ExportSummary) {
        tracing::info!(
            service_unit = summary.service_unit,
            file = summary.filename.as_deref().unwrap_or("-"),
            sent = summary.sent.len(),
            failed = summary.failed.len(),
            "Laske export finished"
        );
        for failed in &summary.failed {
            tracing::warn!(
                invoice = failed.invoice,
                number = failed.number,
                lease = %failed.lease_identifier,
                kind = failed.kind,
                "invoice not exported"
            );
        }
    }
}

fn failure(
    store: &Store,
    invoice: InvoiceId,
    kind: &'static str,
    information: String,
) -> FailedInvoice {
    let found = store.invoice(invoice).ok();
    let lease_identifier = found
        .and_then(|i| store.lease(i.lease).ok())
        .map(|l| l.identifier.to_string())
        .unwrap_or_default();
    FailedInvoice {
        invoice,
        number: found.and_then(|i| i.number),
        lease_identifier,
        kind,
        information,
    }
}

/// Export unsent invoices of `service_unit` to Laske.
///
/// With `only`, just those invoices are considered. Invoices failing
/// rendering or validation are logged as failed; the others are written to
/// one file under the export root, uploaded and marked sent.
pub fn export_invoices(
    store: &mut Store,
    service_unit: ServiceUnitId,
    only: Option<&[InvoiceId]>,
    settings: &LaskeSettings,
    transport: &mut dyn Transport,
    notifier: &dyn ExportNotifier,
    now: NaiveDateTime,
) -> Result<ExportSummary, BillingError> {
    let export_root = settings.export_root()?.to_path_buf();
    if !export_root.is_dir() {
        return Err(BillingError::Transport(format!(
            "export directory {} does not exist",
            export_root.display()
        )));
    }
    let sender_id = store.service_unit(service_unit)?.laske_sender_id.clone();

    let candidates: Vec<InvoiceId> = store
        .invoices
        .values()
        .filter(|i| i.service_unit == service_unit && !i.is_deleted() && !i.is_sent())
        .filter(|i| only.is_none_or(|ids| ids.contains(&i.id)))
        .map(|i| i.id)
        .collect();
    if candidates.is_empty() {
        tracing::info!(service_unit, "no invoices to export");
        return Ok(ExportSummary::empty(service_unit));
    }

    for id in &candidates {
        generate_invoice_number(store, *id)?;
    }

    let log_id = store.next_id();
    let mut summary = ExportSummary {
        log: Some(log_id),
        ..ExportSummary::empty(service_unit)
    };
    let mut items = Vec::with_capacity(candidates.len());
    let mut orders = Vec::new();

    for id in candidates {
        let failed = match build_sales_order(store, id, settings) {
            Ok(order) => {
                let errors = validate_sales_order(&order);
                if errors.is_empty() {
                    orders.push(order);
                    summary.sent.push(id);
                    continue;
                }
                failure(store, id, "codec-validation", errors_json(&errors))
            }
            Err(err) => {
                let information =
                    json!({ "error": err.kind(), "message": err.to_string() }).to_string();
                failure(store, id, err.kind(), information)
            }
        };
        tracing::warn!(
            invoice = id,
            kind = failed.kind,
            information = %failed.information,
            "sales order rejected"
        );
        items.push(ExportLogItem {
            invoice: id,
            status: ExportStatus::Failed,
            information: Some(failed.information.clone()),
        });
        summary.failed.push(failed);
    }

    if !orders.is_empty() {
        let filename = format!("MTIL_IN_{sender_id}_{log_id:08}.xml");
        let xml = to_laske_xml(&orders)?;
        let path = export_root.join(&filename);
        fs::write(&path, xml)
            .map_err(|e| BillingError::Transport(format!("write {}: {e}", path.display())))?;
        transport.upload(&path, &filename)?;
        tracing::info!(file = %filename, orders = orders.len(), "export file uploaded");

        for id in &summary.sent {
            let invoice = store.invoice_mut(*id)?;
            invoice.sent_to_sap_at = Some(now);
            items.push(ExportLogItem {
                invoice: *id,
                status: ExportStatus::Sent,
                information: None,
            });
        }
        summary.filename = Some(filename);
    }

    store.export_logs.insert(
        log_id,
        ExportLog {
            id: log_id,
            service_unit,
            started_at: now,
            ended_at: Some(now),
            filename: summary.filename.clone(),
            items,
        },
    );
    notifier.export_finished(&summary);
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{LeaseIdentifier, ServiceUnitKind};

    fn lease() -> Lease {
        let mut lease = Lease::new(
            1,
            LeaseIdentifier {
                type_code: "A1".into(),
                municipality: 1,
                district: 4,
                sequence: 1,
            },
            1,
        );
        lease.lease_type.sap_material_code = Some("L100".into());
        lease.lease_type.sap_project_number = Some("2800100".into());
        lease.lease_type.sap_order_item_number = Some("2800001".into());
        lease
    }

    fn unit(kind: ServiceUnitKind) -> ServiceUnit {
        let mut unit = ServiceUnit::new(1, "MaKe", kind);
        unit.default_receivable_type_rent = Some(10);
        unit.default_receivable_type_collateral = Some(11);
        unit
    }

    #[test]
    fn rent_without_codes_inherits_lease_type() {
        let rent = ReceivableType::new(10, "Maanvuokraus", 1);
        let codes = sap_codes(&unit(ServiceUnitKind::Make), &lease(), &rent);
        assert_eq!(codes.material.as_deref(), Some("L100"));
        assert_eq!(codes.wbs_element.as_deref(), Some("2800100"));
        assert_eq!(codes.order_item_number, None);

        let mut lease = lease();
        lease.lease_type.sap_project_number = None;
        let codes = sap_codes(&unit(ServiceUnitKind::Make), &lease, &rent);
        assert_eq!(codes.wbs_element, None);
        assert_eq!(codes.order_item_number.as_deref(), Some("2800001"));
    }

    #[test]
    fn collateral_and_other_types_use_their_own_codes() {
        let mut collateral = ReceivableType::new(11, "Vakuus", 1);
        collateral.sap_material_code = Some("V1".into());
        collateral.sap_project_number = Some("2800200".into());
        collateral.sap_order_item_number = Some("ignored".into());
        let codes = sap_codes(&unit(ServiceUnitKind::Make), &lease(), &collateral);
        assert_eq!(codes.wbs_element.as_deref(), Some("2800200"));
        assert_eq!(codes.order_item_number, None);

        let mut other = ReceivableType::new(12, "Korko", 1);
        other.sap_order_item_number = Some("2800300".into());
        let codes = sap_codes(&unit(ServiceUnitKind::Make), &lease(), &other);
        assert_eq!(codes.material, None);
        assert_eq!(codes.order_item_number.as_deref(), Some("2800300"));
    }

    #[test]
    fn internal_order_overrides() {
        let mut lease = lease();
        lease.internal_order = Some("123456".into());
        let rent = ReceivableType::new(10, "Maanvuokraus", 1);
        let codes = sap_codes(&unit(ServiceUnitKind::Make), &lease, &rent);
        assert_eq!(codes.order_item_number.as_deref(), Some("123456"));
        assert_eq!(codes.wbs_element, None);

        let mut other = ReceivableType::new(12, "Korko", 1);
        other.sap_project_number = Some("2800300".into());
        let make = sap_codes(&unit(ServiceUnitKind::Make), &lease, &other);
        assert_eq!(make.wbs_element.as_deref(), Some("2800300"));
        let kuva = sap_codes(&unit(ServiceUnitKind::KuvaUpa), &lease, &other);
        assert_eq!(kuva.wbs_element, None);
        assert_eq!(kuva.order_item_number.as_deref(), Some("123456"));
    }
}
