//! Invoice amount keeper and invoice mutations.
//!
//! Every mutation runs inside [`Store::atomic`] and ends with
//! [`update_amounts`], which keeps these invariants:
//!
//! * `billed_amount` is the sum of the live rows,
//! * `total_amount` is the sum over same-type live invoices of the set,
//! * `outstanding_amount = max(0, billed + collection_charge − payments − credited)`,
//! * a charge is `Refunded` when fully credited, `Paid` when nothing is
//!   outstanding, `Open` otherwise; credit notes are always `Paid`.

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::calendar::adjust_to_business_day;
use super::date_range::DateRange;
use super::entities::*;
use super::error::BillingError;
use super::store::Store;

/// Amount fields of an invoice before or after a recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AmountSnapshot {
    pub billed_amount: Decimal,
    pub total_amount: Decimal,
    pub outstanding_amount: Decimal,
    pub state: InvoiceState,
}

impl AmountSnapshot {
    fn of(invoice: &Invoice) -> Self {
        Self {
            billed_amount: invoice.billed_amount,
            total_amount: invoice.total_amount,
            outstanding_amount: invoice.outstanding_amount,
            state: invoice.state,
        }
    }
}

/// Receives every change of invoice amounts, e.g. for an audit log.
pub trait AuditObserver: Send + Sync {
    fn amounts_changed(&self, invoice: InvoiceId, before: &AmountSnapshot, after: &AmountSnapshot);
}

/// Builder for a new invoice row.
#[derive(Debug, Clone)]
pub struct RowDraft {
    receivable_type: ReceivableTypeId,
    amount: Decimal,
    tenant: Option<TenantId>,
    intended_use: Option<IntendedUseId>,
    billing_period: Option<DateRange>,
    description: Option<String>,
}

impl RowDraft {
    pub fn new(receivable_type: ReceivableTypeId, amount: Decimal) -> Self {
        Self {
            receivable_type,
            amount,
            tenant: None,
            intended_use: None,
            billing_period: None,
            description: None,
        }
    }

    pub fn tenant(mut self, tenant: TenantId) -> Self {
        self.tenant = Some(tenant);
        self
    }

    pub fn intended_use(mut self, intended_use: IntendedUseId) -> Self {
        self.intended_use = Some(intended_use);
        self
    }

    pub fn billing_period(mut self, period: DateRange) -> Self {
        self.billing_period = Some(period);
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    fn build(self, id: InvoiceRowId) -> InvoiceRow {
        InvoiceRow {
            id,
            tenant: self.tenant,
            receivable_type: self.receivable_type,
            intended_use: self.intended_use,
            billing_period: self.billing_period,
            amount: self.amount,
            description: self.description,
            credited_row: None,
            deleted: false,
        }
    }
}

/// Builder for a manually created charge invoice.
///
/// ```
/// use mvj::core::*;
/// use rust_decimal_macros::dec;
/// use chrono::NaiveDate;
///
/// let draft = InvoiceDraft::new(1, 10, NaiveDate::from_ymd_opt(2024, 3, 1).unwrap())
///     .notes("Korvaus")
///     .add_row(RowDraft::new(5, dec!(120.00)).tenant(3));
/// assert_eq!(draft.row_count(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct InvoiceDraft {
    lease: LeaseId,
    recipient: ContactId,
    due_date: NaiveDate,
    billing_period: Option<DateRange>,
    notes: Option<String>,
    delivery_method: Option<DeliveryMethod>,
    rows: Vec<RowDraft>,
}

impl InvoiceDraft {
    pub fn new(lease: LeaseId, recipient: ContactId, due_date: NaiveDate) -> Self {
        Self {
            lease,
            recipient,
            due_date,
            billing_period: None,
            notes: None,
            delivery_method: None,
            rows: Vec::new(),
        }
    }

    pub fn billing_period(mut self, period: DateRange) -> Self {
        self.billing_period = Some(period);
        self
    }

    pub fn notes(mut self, notes: impl Into<String>) -> Self {
        self.notes = Some(notes.into());
        self
    }

    pub fn delivery_method(mut self, method: DeliveryMethod) -> Self {
        self.delivery_method = Some(method);
        self
    }

    pub fn add_row(mut self, row: RowDraft) -> Self {
        self.rows.push(row);
        self
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Changes to the header of an unsent invoice. `None` keeps the value.
#[derive(Debug, Clone, Default)]
pub struct InvoiceEdit {
    pub recipient: Option<ContactId>,
    pub due_date: Option<NaiveDate>,
    pub billing_period: Option<DateRange>,
    pub postpone_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub delivery_method: Option<DeliveryMethod>,
}

/// Changes to a row of an unsent invoice. `None` keeps the value.
#[derive(Debug, Clone, Default)]
pub struct RowEdit {
    pub amount: Option<Decimal>,
    pub receivable_type: Option<ReceivableTypeId>,
    pub description: Option<String>,
}

// --- Recalculation ---

/// Sum of live credit-note rows crediting `invoice`.
pub fn credited_amount(store: &Store, invoice: InvoiceId) -> Decimal {
    store
        .credit_notes_for(invoice)
        .map(Invoice::rows_total)
        .sum()
}

/// Recompute the amounts of `invoice`, its set siblings of the same type and
/// the invoice it credits.
pub fn update_amounts(store: &mut Store, invoice: InvoiceId) -> Result<(), BillingError> {
    let parent = store
        .invoices
        .get(&invoice)
        .ok_or_else(|| BillingError::not_found("invoice", invoice))?
        .credited_invoice;
    refresh_group(store, invoice)?;
    if let Some(parent) = parent {
        refresh_group(store, parent)?;
    }
    Ok(())
}

/// Refresh every live same-type member of the set `invoice` belongs to. A
/// deleted invoice still triggers the refresh of its siblings.
fn refresh_group(store: &mut Store, invoice: InvoiceId) -> Result<(), BillingError> {
    let (set, invoice_type) = {
        let inv = store
            .invoices
            .get(&invoice)
            .ok_or_else(|| BillingError::not_found("invoice", invoice))?;
        (inv.invoiceset, inv.invoice_type)
    };
    let members: Vec<InvoiceId> = match set {
        Some(set) => store
            .invoices
            .values()
            .filter(|i| !i.deleted && i.invoiceset == Some(set) && i.invoice_type == invoice_type)
            .map(|i| i.id)
            .collect(),
        None if store.invoices.get(&invoice).is_some_and(|i| !i.deleted) => vec![invoice],
        None => Vec::new(),
    };
    let total: Decimal = members
        .iter()
        .filter_map(|id| store.invoices.get(id))
        .map(Invoice::rows_total)
        .sum();
    for id in members {
        refresh_invoice(store, id, total)?;
    }
    Ok(())
}

fn refresh_invoice(store: &mut Store, id: InvoiceId, total: Decimal) -> Result<(), BillingError> {
    let credited = credited_amount(store, id);
    let calendar = store.calendar;
    let observer = store.observer();
    let invoice = store.invoice_mut(id)?;
    let before = AmountSnapshot::of(invoice);

    let billed = invoice.rows_total();
    invoice.billed_amount = billed;
    invoice.total_amount = total;
    match invoice.invoice_type {
        InvoiceType::CreditNote => {
            invoice.outstanding_amount = Decimal::ZERO;
            invoice.state = InvoiceState::Paid;
        }
        InvoiceType::Charge => {
            let owed = billed + invoice.collection_charge.unwrap_or_default()
                - invoice.payments_total()
                - credited;
            invoice.outstanding_amount = owed.max(Decimal::ZERO);
            invoice.state = if credited > Decimal::ZERO && credited >= billed {
                InvoiceState::Refunded
            } else if invoice.outstanding_amount.is_zero() {
                InvoiceState::Paid
            } else {
                InvoiceState::Open
            };
        }
    }
    invoice.adjusted_due_date = Some(adjust_to_business_day(invoice.due_date, &calendar));

    let after = AmountSnapshot::of(invoice);
    if before != after {
        if let Some(observer) = observer {
            observer.amounts_changed(id, &before, &after);
        }
    }
    Ok(())
}

fn ensure_unsent(invoice: &Invoice) -> Result<(), BillingError> {
    if invoice.is_sent() {
        return Err(BillingError::State(format!(
            "invoice {} has already been sent to SAP",
            invoice.id
        )));
    }
    Ok(())
}

fn check_receivable_type(store: &Store, id: ReceivableTypeId) -> Result<(), BillingError> {
    let receivable_type = store.receivable_type(id)?;
    if !receivable_type.is_active {
        return Err(BillingError::Validation(format!(
            "receivable type {} is not active",
            receivable_type.name
        )));
    }
    Ok(())
}

// --- Mutations ---

/// Create an unsent, open charge invoice from a draft.
pub fn create_charge_invoice(
    store: &mut Store,
    draft: InvoiceDraft,
    today: NaiveDate,
) -> Result<InvoiceId, BillingError> {
    store.atomic(|store| {
        let service_unit = store.lease(draft.lease)?.service_unit;
        store.contact(draft.recipient)?;
        if draft.rows.is_empty() {
            return Err(BillingError::Validation("invoice must have at least one row".into()));
        }
        for row in &draft.rows {
            check_receivable_type(store, row.receivable_type)?;
        }

        let id = store.next_id();
        let mut rows = Vec::with_capacity(draft.rows.len());
        for row in draft.rows {
            let row_id = store.next_id();
            rows.push(row.build(row_id));
        }
        let invoice = Invoice {
            id,
            lease: draft.lease,
            service_unit,
            invoiceset: None,
            number: None,
            recipient: draft.recipient,
            sent_to_sap_at: None,
            sap_id: None,
            due_date: draft.due_date,
            adjusted_due_date: None,
            invoicing_date: Some(today),
            state: InvoiceState::Open,
            billing_period: draft.billing_period,
            postpone_date: None,
            total_amount: Decimal::ZERO,
            billed_amount: Decimal::ZERO,
            outstanding_amount: Decimal::ZERO,
            payment_notification_date: None,
            collection_charge: None,
            collection_stage: None,
            delivery_method: draft.delivery_method,
            invoice_type: InvoiceType::Charge,
            notes: draft.notes,
            description: None,
            generated: false,
            credited_invoice: None,
            interest_invoice_for: None,
            rows,
            payments: Vec::new(),
            deleted: false,
        };
        store.invoices.insert(id, invoice);
        update_amounts(store, id)?;
        Ok(id)
    })
}

pub fn edit_invoice(
    store: &mut Store,
    id: InvoiceId,
    edit: InvoiceEdit,
) -> Result<(), BillingError> {
    store.atomic(|store| {
        ensure_unsent(store.invoice(id)?)?;
        if let Some(recipient) = edit.recipient {
            store.contact(recipient)?;
        }
        let invoice = store.invoice_mut(id)?;
        if let Some(recipient) = edit.recipient {
            invoice.recipient = recipient;
        }
        if let Some(due_date) = edit.due_date {
            invoice.due_date = due_date;
        }
        if let Some(period) = edit.billing_period {
            invoice.billing_period = Some(period);
        }
        if let Some(postpone) = edit.postpone_date {
            invoice.postpone_date = Some(postpone);
        }
        if let Some(notes) = edit.notes {
            invoice.notes = Some(notes);
        }
        if let Some(method) = edit.delivery_method {
            invoice.delivery_method = Some(method);
        }
        update_amounts(store, id)
    })
}

pub fn add_row(
    store: &mut Store,
    id: InvoiceId,
    row: RowDraft,
) -> Result<InvoiceRowId, BillingError> {
    store.atomic(|store| {
        ensure_unsent(store.invoice(id)?)?;
        check_receivable_type(store, row.receivable_type)?;
        let row_id = store.next_id();
        store.invoice_mut(id)?.rows.push(row.build(row_id));
        update_amounts(store, id)?;
        Ok(row_id)
    })
}

pub fn update_row(
    store: &mut Store,
    id: InvoiceId,
    row: InvoiceRowId,
    edit: RowEdit,
) -> Result<(), BillingError> {
    store.atomic(|store| {
        ensure_unsent(store.invoice(id)?)?;
        if let Some(receivable_type) = edit.receivable_type {
            check_receivable_type(store, receivable_type)?;
        }
        let target = store
            .invoice_mut(id)?
            .rows
            .iter_mut()
            .find(|r| r.id == row && !r.deleted)
            .ok_or_else(|| BillingError::not_found("invoice row", row))?;
        if let Some(amount) = edit.amount {
            target.amount = amount;
        }
        if let Some(receivable_type) = edit.receivable_type {
            target.receivable_type = receivable_type;
        }
        if let Some(description) = edit.description {
            target.description = Some(description);
        }
        update_amounts(store, id)
    })
}

pub fn delete_row(store: &mut Store, id: InvoiceId, row: InvoiceRowId) -> Result<(), BillingError> {
    store.atomic(|store| {
        ensure_unsent(store.invoice(id)?)?;
        let target = store
            .invoice_mut(id)?
            .rows
            .iter_mut()
            .find(|r| r.id == row && !r.deleted)
            .ok_or_else(|| BillingError::not_found("invoice row", row))?;
        target.deleted = true;
        update_amounts(store, id)
    })
}

/// Soft-delete an unsent invoice; its siblings and credited parent are
/// recomputed.
pub fn delete_invoice(store: &mut Store, id: InvoiceId) -> Result<(), BillingError> {
    store.atomic(|store| {
        ensure_unsent(store.invoice(id)?)?;
        store.invoice_mut(id)?.deleted = true;
        update_amounts(store, id)
    })
}

/// Record a payment. Payments are accepted after the invoice has been sent.
pub fn add_payment(
    store: &mut Store,
    id: InvoiceId,
    paid_amount: Decimal,
    paid_date: NaiveDate,
    filing_code: Option<String>,
) -> Result<InvoicePaymentId, BillingError> {
    if paid_amount <= Decimal::ZERO {
        return Err(BillingError::Validation(format!(
            "paid amount must be positive, got {paid_amount}"
        )));
    }
    store.atomic(|store| {
        let invoice = store.invoice(id)?;
        if invoice.invoice_type != InvoiceType::Charge {
            return Err(BillingError::State(format!(
                "invoice {id} is not a charge invoice"
            )));
        }
        if invoice
            .payments
            .iter()
            .any(|p| p.paid_amount == paid_amount && p.paid_date == paid_date)
        {
            return Err(BillingError::Duplicate(format!(
                "payment of {paid_amount} on {paid_date} already recorded for invoice {id}"
            )));
        }
        let payment_id = store.next_id();
        store.invoice_mut(id)?.payments.push(InvoicePayment {
            id: payment_id,
            paid_amount,
            paid_date,
            filing_code,
        });
        update_amounts(store, id)?;
        Ok(payment_id)
    })
}

pub fn set_collection_charge(
    store: &mut Store,
    id: InvoiceId,
    charge: Option<Decimal>,
) -> Result<(), BillingError> {
    if charge.is_some_and(|c| c < Decimal::ZERO) {
        return Err(BillingError::Validation("collection charge must not be negative".into()));
    }
    store.atomic(|store| {
        store.invoice_mut(id)?.collection_charge = charge;
        update_amounts(store, id)
    })
}

pub fn set_collection_stage(
    store: &mut Store,
    id: InvoiceId,
    stage: Option<CollectionStage>,
) -> Result<(), BillingError> {
    let invoice = store.invoice_mut(id)?;
    if invoice.invoice_type != InvoiceType::Charge {
        return Err(BillingError::State(format!(
            "invoice {id} is not a charge invoice"
        )));
    }
    invoice.collection_stage = stage;
    tracing::info!(invoice = id, ?stage, "collection stage set");
    Ok(())
}

/// Number of the invoice, drawn from its service unit's sequence on first
/// use. An assigned number never changes.
pub fn generate_invoice_number(store: &mut Store, id: InvoiceId) -> Result<u64, BillingError> {
    let invoice = store.invoice(id)?;
    if let Some(number) = invoice.number {
        return Ok(number);
    }
    let unit = store.service_unit(invoice.service_unit)?;
    let number = store
        .sequences
        .next_number(&unit.invoice_number_sequence_name, unit.first_invoice_number)?;
    store.invoice_mut(id)?.number = Some(number);
    tracing::debug!(invoice = id, number, "invoice number assigned");
    Ok(number)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calendar::CalendarKind;
    use rust_decimal_macros::dec;
    use std::sync::{Arc, Mutex};

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn store() -> Store {
        let mut store = Store::new();
        store.calendar = CalendarKind::FinnishBankHolidays;
        let mut unit = ServiceUnit::new(1, "MaKe", ServiceUnitKind::Make);
        unit.invoice_number_sequence_name = "make".into();
        unit.first_invoice_number = 1_000;
        store.insert_service_unit(unit);
        store.insert_receivable_type(ReceivableType::new(2, "Maanvuokraus", 1));
        store.insert_contact(Contact::person(3, "Maija", "Meikäläinen"));
        store.insert_lease(Lease::new(
            4,
            LeaseIdentifier {
                type_code: "A1".into(),
                municipality: 1,
                district: 4,
                sequence: 1,
            },
            1,
        ));
        store
    }

    fn charge(store: &mut Store, amount: Decimal) -> InvoiceId {
        let draft = InvoiceDraft::new(4, 3, d(2021, 1, 6)).add_row(RowDraft::new(2, amount));
        create_charge_invoice(store, draft, d(2020, 12, 15)).unwrap()
    }

    #[test]
    fn new_invoice_amounts() {
        let mut store = store();
        let id = charge(&mut store, dec!(124.00));
        let invoice = store.invoice(id).unwrap();
        assert_eq!(invoice.billed_amount, dec!(124.00));
        assert_eq!(invoice.total_amount, dec!(124.00));
        assert_eq!(invoice.outstanding_amount, dec!(124.00));
        assert_eq!(invoice.state, InvoiceState::Open);
        // Epiphany
        assert_eq!(invoice.adjusted_due_date, Some(d(2021, 1, 7)));
    }

    #[test]
    fn payments_and_collection_charge() {
        let mut store = store();
        let id = charge(&mut store, dec!(100));
        set_collection_charge(&mut store, id, Some(dec!(5))).unwrap();
        assert_eq!(store.invoice(id).unwrap().outstanding_amount, dec!(105));

        add_payment(&mut store, id, dec!(105), d(2021, 1, 7), None).unwrap();
        let invoice = store.invoice(id).unwrap();
        assert_eq!(invoice.outstanding_amount, Decimal::ZERO);
        assert_eq!(invoice.state, InvoiceState::Paid);

        let dup = add_payment(&mut store, id, dec!(105), d(2021, 1, 7), None).unwrap_err();
        assert_eq!(dup.kind(), "duplicate");
        assert_eq!(store.invoice(id).unwrap().payments.len(), 1);
    }

    #[test]
    fn overpayment_clamps_outstanding() {
        let mut store = store();
        let id = charge(&mut store, dec!(50));
        add_payment(&mut store, id, dec!(80), d(2021, 1, 7), None).unwrap();
        assert_eq!(store.invoice(id).unwrap().outstanding_amount, Decimal::ZERO);
    }

    #[test]
    fn sent_invoice_is_frozen_except_payments() {
        let mut store = store();
        let id = charge(&mut store, dec!(50));
        let row = store.invoice(id).unwrap().rows[0].id;
        store.invoice_mut(id).unwrap().sent_to_sap_at =
            Some(d(2021, 1, 1).and_hms_opt(8, 0, 0).unwrap());

        let edit = RowEdit {
            amount: Some(dec!(10)),
            ..Default::default()
        };
        assert_eq!(update_row(&mut store, id, row, edit).unwrap_err().kind(), "state-precondition");
        assert!(delete_invoice(&mut store, id).is_err());
        assert!(add_payment(&mut store, id, dec!(10), d(2021, 2, 1), None).is_ok());
        assert!(set_collection_stage(&mut store, id, Some(CollectionStage::Reminder)).is_ok());
    }

    #[test]
    fn row_edits_recompute() {
        let mut store = store();
        let id = charge(&mut store, dec!(50));
        let extra = add_row(&mut store, id, RowDraft::new(2, dec!(25))).unwrap();
        assert_eq!(store.invoice(id).unwrap().billed_amount, dec!(75));
        delete_row(&mut store, id, extra).unwrap();
        assert_eq!(store.invoice(id).unwrap().billed_amount, dec!(50));
        assert!(delete_row(&mut store, id, extra).is_err());
    }

    #[test]
    fn numbers_are_lazy_and_immutable() {
        let mut store = store();
        let a = charge(&mut store, dec!(1));
        let b = charge(&mut store, dec!(2));
        assert_eq!(store.invoice(a).unwrap().number, None);
        assert_eq!(generate_invoice_number(&mut store, b).unwrap(), 1_000);
        assert_eq!(generate_invoice_number(&mut store, a).unwrap(), 1_001);
        assert_eq!(generate_invoice_number(&mut store, b).unwrap(), 1_000);
    }

    #[test]
    fn failed_mutation_rolls_back() {
        let mut store = store();
        let id = charge(&mut store, dec!(50));
        let err = add_row(&mut store, id, RowDraft::new(99, dec!(1))).unwrap_err();
        assert_eq!(err.kind(), "not-found");
        assert_eq!(store.invoice(id).unwrap().rows.len(), 1);
    }

    #[derive(Default)]
    struct Recorder(Mutex<Vec<(InvoiceId, Decimal, Decimal)>>);

    impl AuditObserver for Recorder {
        fn amounts_changed(
            &self,
            invoice: InvoiceId,
            before: &AmountSnapshot,
            after: &AmountSnapshot,
        ) {
            self.0
                .lock()
                .unwrap()
                .push((invoice, before.outstanding_amount, after.outstanding_amount));
        }
    }

    #[test]
    fn observer_sees_changes() {
        let mut store = store();
        let recorder = Arc::new(Recorder::default());
        store.set_observer(recorder.clone());
        let id = charge(&mut store, dec!(40));
        add_payment(&mut store, id, dec!(10), d(2021, 1, 8), None).unwrap();
        let seen = recorder.0.lock().unwrap().clone();
        assert_eq!(seen.last(), Some(&(id, dec!(40), dec!(30))));
    }
}
