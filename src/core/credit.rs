//! Credit notes.
//!
//! A credit note is a `CreditNote` invoice whose rows point at the charge
//! rows they credit. Credit rows carry positive amounts; the amount keeper
//! subtracts them from the charge's outstanding amount.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::amounts::update_amounts;
use super::entities::*;
use super::error::BillingError;
use super::money::round_cents;
use super::shares::Fraction;
use super::store::Store;

/// Result of crediting an invoice set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetCredit {
    pub invoiceset: InvoiceSetId,
    pub credit_notes: Vec<InvoiceId>,
}

/// Part of a charge row not yet credited.
pub fn uncredited_amount(store: &Store, invoice: InvoiceId, row: &InvoiceRow) -> Decimal {
    let credited: Decimal = store
        .credit_notes_for(invoice)
        .flat_map(Invoice::active_rows)
        .filter(|r| r.credited_row == Some(row.id))
        .map(|r| r.amount)
        .sum();
    (row.amount - credited).max(Decimal::ZERO)
}

fn charge_invoice(store: &Store, id: InvoiceId) -> Result<&Invoice, BillingError> {
    let invoice = store.invoice(id)?;
    if invoice.invoice_type != InvoiceType::Charge {
        return Err(BillingError::State(format!(
            "only charge invoices can be credited, invoice {id} is a credit note"
        )));
    }
    Ok(invoice)
}

/// Rows of `invoice` with the given receivable type that still have
/// something left to credit, with their remainders.
fn creditable_rows(
    store: &Store,
    invoice: &Invoice,
    receivable_type: ReceivableTypeId,
) -> Vec<(InvoiceRow, Decimal)> {
    invoice
        .active_rows()
        .filter(|r| r.receivable_type == receivable_type)
        .map(|r| (r.clone(), uncredited_amount(store, invoice.id, r)))
        .filter(|(_, left)| *left > Decimal::ZERO)
        .collect()
}

/// Weights of rows: tenant shares when every row has a tenant, equal
/// weights otherwise.
fn row_weights(lease: &Lease, rows: &[&InvoiceRow]) -> Vec<Fraction> {
    let tenant_shares: Option<Vec<Fraction>> = rows
        .iter()
        .map(|r| r.tenant.and_then(|t| lease.tenant(t)).map(Tenant::share))
        .collect();
    match tenant_shares {
        Some(shares) if shares.iter().any(|s| !s.is_zero()) => shares,
        _ => {
            let n = rows.len() as i128;
            rows.iter().map(|_| Fraction::new(1, n)).collect()
        }
    }
}

/// Split `amount` by `weights` into cents; the last part takes the rounding
/// remainder.
fn distribute(amount: Decimal, weights: &[Fraction]) -> Result<Vec<Decimal>, BillingError> {
    let total: Fraction = weights.iter().copied().sum();
    if total.is_zero() {
        return Err(BillingError::Arithmetic("credit weights sum to zero".into()));
    }
    let mut parts = Vec::with_capacity(weights.len());
    let mut assigned = Decimal::ZERO;
    for (i, weight) in weights.iter().enumerate() {
        let part = if i + 1 == weights.len() {
            amount - assigned
        } else {
            round_cents(weight.ratio_of(total).of(amount)?)
        };
        assigned += part;
        parts.push(part);
    }
    Ok(parts)
}

fn credit_note_for(
    store: &mut Store,
    parent: &Invoice,
    rows: Vec<(InvoiceRow, Decimal)>,
    set: Option<InvoiceSetId>,
    notes: Option<String>,
    today: NaiveDate,
) -> Result<InvoiceId, BillingError> {
    let id = store.next_id();
    let mut credit_rows = Vec::with_capacity(rows.len());
    for (row, amount) in rows {
        credit_rows.push(InvoiceRow {
            id: store.next_id(),
            tenant: row.tenant,
            receivable_type: row.receivable_type,
            intended_use: row.intended_use,
            billing_period: row.billing_period,
            amount,
            description: row.description,
            credited_row: Some(row.id),
            deleted: false,
        });
    }
    let credit_note = Invoice {
        id,
        lease: parent.lease,
        service_unit: parent.service_unit,
        invoiceset: set,
        number: None,
        recipient: parent.recipient,
        sent_to_sap_at: None,
        sap_id: None,
        due_date: parent.due_date,
        adjusted_due_date: None,
        invoicing_date: Some(today),
        state: InvoiceState::Paid,
        billing_period: parent.billing_period,
        postpone_date: None,
        total_amount: Decimal::ZERO,
        billed_amount: Decimal::ZERO,
        outstanding_amount: Decimal::ZERO,
        payment_notification_date: None,
        collection_charge: None,
        collection_stage: None,
        delivery_method: parent.delivery_method,
        invoice_type: InvoiceType::CreditNote,
        notes,
        description: None,
        generated: false,
        credited_invoice: Some(parent.id),
        interest_invoice_for: None,
        rows: credit_rows,
        payments: Vec::new(),
        deleted: false,
    };
    store.invoices.insert(id, credit_note);
    update_amounts(store, id)?;
    tracing::info!(invoice = parent.id, credit_note = id, "invoice credited");
    Ok(id)
}

/// Credit everything still uncredited on a charge invoice.
pub fn credit_invoice(
    store: &mut Store,
    id: InvoiceId,
    notes: Option<String>,
    today: NaiveDate,
) -> Result<InvoiceId, BillingError> {
    store.atomic(|store| {
        let parent = charge_invoice(store, id)?.clone();
        let rows: Vec<(InvoiceRow, Decimal)> = parent
            .active_rows()
            .map(|r| (r.clone(), uncredited_amount(store, id, r)))
            .filter(|(_, left)| *left > Decimal::ZERO)
            .collect();
        if rows.is_empty() {
            return Err(BillingError::State(format!("invoice {id} is already fully credited")));
        }
        credit_note_for(store, &parent, rows, None, notes, today)
    })
}

/// Credit rows of the `parent` for `amount` of one receivable type.
fn credit_rows_by_amount(
    store: &Store,
    parent: &Invoice,
    amount: Decimal,
    receivable_type: ReceivableTypeId,
) -> Result<Vec<(InvoiceRow, Decimal)>, BillingError> {
    let rows = creditable_rows(store, parent, receivable_type);
    let remainder: Decimal = rows.iter().map(|(_, left)| *left).sum();
    if rows.is_empty() {
        return Err(BillingError::State(format!(
            "invoice {} has nothing left to credit for receivable type {receivable_type}",
            parent.id
        )));
    }
    if amount > remainder {
        return Err(BillingError::Arithmetic(format!(
            "credit amount {amount} exceeds the uncredited amount {remainder} of invoice {}",
            parent.id
        )));
    }

    let lease = store.lease(parent.lease)?;
    let row_refs: Vec<&InvoiceRow> = rows.iter().map(|(row, _)| row).collect();
    let parts = distribute(amount, &row_weights(lease, &row_refs))?;

    let mut out = Vec::with_capacity(rows.len());
    for ((row, left), part) in rows.into_iter().zip(parts) {
        if part > left {
            return Err(BillingError::Arithmetic(format!(
                "credit {part} exceeds the uncredited amount {left} of row {}",
                row.id
            )));
        }
        if !part.is_zero() {
            out.push((row, part));
        }
    }
    Ok(out)
}

/// Credit `amount` of one receivable type on a charge invoice, spread over
/// its rows by tenant share.
pub fn credit_invoice_by_amount(
    store: &mut Store,
    id: InvoiceId,
    amount: Decimal,
    receivable_type: ReceivableTypeId,
    notes: Option<String>,
    today: NaiveDate,
) -> Result<InvoiceId, BillingError> {
    if amount <= Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "credit amount must be positive, got {amount}"
        )));
    }
    store.atomic(|store| {
        store.receivable_type(receivable_type)?;
        let parent = charge_invoice(store, id)?.clone();
        let rows = credit_rows_by_amount(store, &parent, amount, receivable_type)?;
        credit_note_for(store, &parent, rows, None, notes, today)
    })
}

/// Credit `amount` of one receivable type across the charge invoices of a
/// set. Each invoice takes its fraction of the set; the fractions must add up
/// to exactly one. The credit notes form a new set.
pub fn credit_invoice_set(
    store: &mut Store,
    set: InvoiceSetId,
    amount: Decimal,
    receivable_type: ReceivableTypeId,
    notes: Option<String>,
    today: NaiveDate,
) -> Result<SetCredit, BillingError> {
    if amount <= Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "credit amount must be positive, got {amount}"
        )));
    }
    store.atomic(|store| {
        store.receivable_type(receivable_type)?;
        let lease_id = store.invoice_set(set)?.lease;
        let invoices: Vec<Invoice> = store
            .invoices_in_set(set)
            .into_iter()
            .filter_map(|id| store.invoices.get(&id))
            .filter(|i| i.invoice_type == InvoiceType::Charge)
            .filter(|i| i.active_rows().any(|r| r.receivable_type == receivable_type))
            .cloned()
            .collect();
        if invoices.is_empty() {
            return Err(BillingError::State(format!(
                "invoice set {set} has no charge rows of receivable type {receivable_type}"
            )));
        }

        let shares = invoice_shares(store.lease(lease_id)?, &invoices, receivable_type);
        let sum: Fraction = shares.iter().copied().sum();
        if sum != Fraction::ONE {
            return Err(BillingError::Arithmetic(format!(
                "invoice shares of set {set} add up to {sum}, not 1"
            )));
        }
        let parts = distribute(amount, &shares)?;

        let mut planned = Vec::with_capacity(invoices.len());
        for (invoice, part) in invoices.iter().zip(parts) {
            if part.is_zero() {
                continue;
            }
            planned.push((invoice, credit_rows_by_amount(store, invoice, part, receivable_type)?));
        }

        let billing_period = store.invoice_set(set)?.billing_period;
        let credit_set = store.next_id();
        store.insert_invoice_set(InvoiceSet {
            id: credit_set,
            lease: lease_id,
            billing_period,
            deleted: false,
        });
        let mut credit_notes = Vec::with_capacity(planned.len());
        for (invoice, rows) in planned {
            credit_notes.push(credit_note_for(
                store,
                invoice,
                rows,
                Some(credit_set),
                notes.clone(),
                today,
            )?);
        }
        Ok(SetCredit {
            invoiceset: credit_set,
            credit_notes,
        })
    })
}

/// Fraction of the set each invoice stands for: the shares of the distinct
/// tenants on its rows of the receivable type when every such row in the
/// set has a tenant, else its fraction of the row count.
fn invoice_shares(
    lease: &Lease,
    invoices: &[Invoice],
    receivable_type: ReceivableTypeId,
) -> Vec<Fraction> {
    let rows_of = |invoice: &Invoice| -> Vec<InvoiceRow> {
        invoice
            .active_rows()
            .filter(|r| r.receivable_type == receivable_type)
            .cloned()
            .collect()
    };
    let per_invoice: Vec<Vec<InvoiceRow>> = invoices.iter().map(rows_of).collect();
    let all_have_tenants = per_invoice
        .iter()
        .flatten()
        .all(|r| r.tenant.and_then(|t| lease.tenant(t)).is_some());

    if all_have_tenants {
        per_invoice
            .iter()
            .map(|rows| {
                let tenants: BTreeSet<TenantId> = rows.iter().filter_map(|r| r.tenant).collect();
                tenants
                    .into_iter()
                    .filter_map(|t| lease.tenant(t))
                    .map(Tenant::share)
                    .sum()
            })
            .collect()
    } else {
        let total: usize = per_invoice.iter().map(Vec::len).sum();
        per_invoice
            .iter()
            .map(|rows| Fraction::new(rows.len() as i128, total as i128))
            .collect()
    }
}

/// Credited amount per charge row of `invoice`.
pub fn credited_rows(store: &Store, invoice: InvoiceId) -> BTreeMap<InvoiceRowId, Decimal> {
    let mut out = BTreeMap::new();
    for row in store.credit_notes_for(invoice).flat_map(Invoice::active_rows) {
        if let Some(credited) = row.credited_row {
            *out.entry(credited).or_insert(Decimal::ZERO) += row.amount;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::amounts::{InvoiceDraft, RowDraft, add_payment, create_charge_invoice};
    use rust_decimal_macros::dec;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn store() -> Store {
        let mut store = Store::new();
        store.insert_service_unit(ServiceUnit::new(1, "MaKe", ServiceUnitKind::Make));
        store.insert_receivable_type(ReceivableType::new(2, "Maanvuokraus", 1));
        store.insert_receivable_type(ReceivableType::new(3, "Vakuus", 1));
        store.insert_contact(Contact::person(4, "Matti", "Virtanen"));
        let mut lease = Lease::new(
            5,
            LeaseIdentifier {
                type_code: "A1".into(),
                municipality: 1,
                district: 4,
                sequence: 1,
            },
            1,
        );
        lease.tenants = vec![Tenant::new(11, 1, 3), Tenant::new(12, 1, 3), Tenant::new(13, 1, 3)];
        store.insert_lease(lease);
        store
    }

    fn charge(store: &mut Store, rows: &[(Option<TenantId>, Decimal)]) -> InvoiceId {
        let mut draft = InvoiceDraft::new(5, 4, d(2024, 3, 1));
        for (tenant, amount) in rows {
            let mut row = RowDraft::new(2, *amount);
            if let Some(tenant) = tenant {
                row = row.tenant(*tenant);
            }
            draft = draft.add_row(row);
        }
        create_charge_invoice(store, draft, d(2024, 2, 1)).unwrap()
    }

    fn credit_amounts(store: &Store, credit_note: InvoiceId) -> Vec<Decimal> {
        store.invoice(credit_note).unwrap().rows.iter().map(|r| r.amount).collect()
    }

    #[test]
    fn full_credit_refunds() {
        let mut store = store();
        let id = charge(&mut store, &[(Some(11), dec!(60)), (Some(12), dec!(40))]);
        let note = credit_invoice(&mut store, id, None, d(2024, 3, 2)).unwrap();
        assert_eq!(credit_amounts(&store, note), vec![dec!(60), dec!(40)]);
        let parent = store.invoice(id).unwrap();
        assert_eq!(parent.state, InvoiceState::Refunded);
        assert_eq!(parent.outstanding_amount, Decimal::ZERO);
        assert_eq!(store.invoice(note).unwrap().state, InvoiceState::Paid);

        let again = credit_invoice(&mut store, id, None, d(2024, 3, 2)).unwrap_err();
        assert_eq!(again.kind(), "state-precondition");
        assert!(credit_invoice(&mut store, note, None, d(2024, 3, 2)).is_err());
    }

    #[test]
    fn by_amount_splits_by_tenant_share() {
        let mut store = store();
        let id = charge(
            &mut store,
            &[(Some(11), dec!(100)), (Some(12), dec!(100)), (Some(13), dec!(100))],
        );
        let note =
            credit_invoice_by_amount(&mut store, id, dec!(100), 2, None, d(2024, 3, 2)).unwrap();
        assert_eq!(credit_amounts(&store, note), vec![dec!(33.33), dec!(33.33), dec!(33.34)]);
        assert_eq!(store.invoice(id).unwrap().outstanding_amount, dec!(200));
        assert_eq!(store.invoice(id).unwrap().state, InvoiceState::Open);
    }

    #[test]
    fn by_amount_without_tenants_is_equal() {
        let mut store = store();
        let id = charge(&mut store, &[(Some(11), dec!(50)), (None, dec!(50))]);
        let note =
            credit_invoice_by_amount(&mut store, id, dec!(10), 2, None, d(2024, 3, 2)).unwrap();
        assert_eq!(credit_amounts(&store, note), vec![dec!(5.00), dec!(5)]);
    }

    #[test]
    fn credit_bounds() {
        let mut store = store();
        let id = charge(&mut store, &[(Some(11), dec!(30)), (Some(12), dec!(30))]);
        let err = credit_invoice_by_amount(&mut store, id, dec!(60.01), 2, None, d(2024, 3, 2))
            .unwrap_err();
        assert_eq!(err.kind(), "domain-arithmetic");
        assert!(store.credit_notes_for(id).next().is_none());

        credit_invoice_by_amount(&mut store, id, dec!(60), 2, None, d(2024, 3, 2)).unwrap();
        assert_eq!(store.invoice(id).unwrap().state, InvoiceState::Refunded);
        assert!(credit_invoice_by_amount(&mut store, id, dec!(1), 3, None, d(2024, 3, 2)).is_err());
    }

    #[test]
    fn credit_after_payment_keeps_outstanding_at_zero() {
        let mut store = store();
        let id = charge(&mut store, &[(Some(11), dec!(100))]);
        add_payment(&mut store, id, dec!(100), d(2024, 3, 1), None).unwrap();
        credit_invoice_by_amount(&mut store, id, dec!(20), 2, None, d(2024, 3, 2)).unwrap();
        let invoice = store.invoice(id).unwrap();
        assert_eq!(invoice.outstanding_amount, Decimal::ZERO);
        assert_eq!(invoice.state, InvoiceState::Paid);
        assert_eq!(credited_rows(&store, id).values().copied().sum::<Decimal>(), dec!(20));
    }
}
