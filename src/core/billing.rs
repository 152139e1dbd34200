//! Rent calculation engine: from lease rents to invoice data and persisted
//! charge invoices.
//!
//! For every due date in the requested range the payable amounts of all
//! rents are collected, decomposed through the tenancy shares into rows per
//! contact, rounded to cents and balanced so that no cent is lost.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::amounts::update_amounts;
use super::date_range::{
    DateRange, combine_ranges, fix_amount_for_overlap, subtract_range_from_range,
};
use super::entities::*;
use super::error::{BillingError, into_validation_error};
use super::money::round_cents;
use super::rent::{
    AdjustmentUsage, Explanation, Rent, amount_for_period, billing_periods_in_range,
};
use super::shares::resolve_shares;
use super::store::Store;

/// One row of a would-be invoice.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceRowDatum {
    pub tenant: TenantId,
    pub receivable_type: ReceivableTypeId,
    pub intended_use: Option<IntendedUseId>,
    pub billing_period: DateRange,
    pub amount: Decimal,
}

/// A would-be charge invoice for one recipient.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDatum {
    pub recipient: ContactId,
    pub due_date: NaiveDate,
    pub billing_period: DateRange,
    pub invoicing_date: NaiveDate,
    pub state: InvoiceState,
    pub billed_amount: Decimal,
    pub outstanding_amount: Decimal,
    pub rows: Vec<InvoiceRowDatum>,
}

/// Everything billed on one due date.
#[derive(Debug, Clone, PartialEq)]
pub struct PeriodInvoiceData {
    pub due_date: NaiveDate,
    /// Union of the billing periods of all rents due on this date.
    pub billing_period: DateRange,
    /// Cent-rounded total of the period; equals the sum of all row amounts.
    pub amount: Decimal,
    pub explanation: Explanation,
    pub invoices: Vec<InvoiceDatum>,
    /// Tenant share portions no contact was responsible for.
    pub gaps: BTreeMap<TenantId, Vec<DateRange>>,
    /// `AmountTotal` adjustment usage caused by this period.
    pub usage: AdjustmentUsage,
}

type RowKey = (TenantId, NaiveDate, ReceivableTypeId, Option<IntendedUseId>);

/// One rent's contribution to a due date.
struct RentPart {
    receivable_type: ReceivableTypeId,
    billing_period: DateRange,
    buckets: BTreeMap<Option<IntendedUseId>, Decimal>,
}

#[derive(Default)]
struct DueDateAccumulator {
    periods: Vec<DateRange>,
    parts: Vec<RentPart>,
    explanation: Explanation,
}

/// Receivable type a rent is billed under.
pub fn rent_receivable_type(
    unit: &ServiceUnit,
    rent: &Rent,
) -> Result<ReceivableTypeId, BillingError> {
    if unit.use_rent_override_receivable_type {
        if let Some(receivable_type) = rent.override_receivable_type {
            return Ok(receivable_type);
        }
    }
    unit.default_receivable_type_rent.ok_or_else(|| {
        BillingError::Validation(format!(
            "service unit {} has no default rent receivable type",
            unit.name
        ))
    })
}

fn validate_lease(lease: &Lease) -> Result<(), BillingError> {
    let mut errors = Vec::new();
    for rent in lease.active_rents() {
        errors.extend(rent.validate());
    }
    for tenant in lease.active_tenants() {
        errors.extend(tenant.validate());
    }
    into_validation_error(errors)
}

/// Invoice data of `lease` for every due date in `range`, ordered by due
/// date. Nothing is persisted.
pub fn calculate_invoice_data(
    store: &Store,
    lease: LeaseId,
    range: &DateRange,
    today: NaiveDate,
) -> Result<Vec<PeriodInvoiceData>, BillingError> {
    let lease = store.lease(lease)?;
    let unit = store.service_unit(lease.service_unit)?;
    validate_lease(lease)?;

    let ctx = store.rent_context();
    let lease_span = lease.span();
    let position = lease.lease_type.due_dates_position;

    let mut schedule: BTreeMap<NaiveDate, Vec<(&Rent, DateRange)>> = BTreeMap::new();
    for rent in lease.active_rents() {
        for scheduled in billing_periods_in_range(rent, &lease_span, position, range)? {
            schedule
                .entry(scheduled.due_date)
                .or_default()
                .push((rent, scheduled.billing_period));
        }
    }

    // Due dates generated before are recalculated from the amount they
    // started with, not from what they left behind.
    let mut usage = AdjustmentUsage::default();
    for rent in lease.active_rents() {
        for adjustment in &rent.rent_adjustments {
            let recorded = adjustment.consumed_since(range.start);
            if !recorded.is_zero() {
                usage.add(adjustment.id, -recorded);
            }
        }
    }
    let mut out = Vec::with_capacity(schedule.len());
    for (due_date, rents) in schedule {
        let before = usage.clone();
        let mut acc = DueDateAccumulator::default();
        for (rent, period) in rents {
            let calculated = amount_for_period(rent, &lease_span, &period, &ctx, &mut usage)?;
            acc.periods.push(period);
            acc.explanation.extend(calculated.explanation);
            acc.parts.push(RentPart {
                receivable_type: rent_receivable_type(unit, rent)?,
                billing_period: period,
                buckets: calculated.buckets,
            });
        }
        let mut period_usage = AdjustmentUsage::default();
        for (id, used) in usage.iter() {
            let delta = used - before.used(id);
            if !delta.is_zero() {
                period_usage.add(id, delta);
            }
        }
        out.push(build_period(lease, due_date, acc, period_usage, today)?);
    }
    Ok(out)
}

fn build_period(
    lease: &Lease,
    due_date: NaiveDate,
    acc: DueDateAccumulator,
    usage: AdjustmentUsage,
    today: NaiveDate,
) -> Result<PeriodInvoiceData, BillingError> {
    let merged = combine_ranges(&acc.periods);
    let billing_period = match (merged.first(), merged.last()) {
        (Some(first), Some(last)) => DateRange::new(first.start, last.end)?,
        _ => {
            return Err(BillingError::InvalidDate(format!(
                "no billing period for due date {due_date}"
            )));
        }
    };

    let resolution = resolve_shares(lease.active_tenants(), &billing_period);
    for (tenant, gaps) in &resolution.gaps {
        for gap in gaps {
            tracing::warn!(
                lease = %lease.identifier,
                tenant,
                gap = %gap,
                "tenant share has no responsible contact"
            );
        }
    }

    // contact -> (tenant, sub-range start, receivable type, intended use) -> row
    let mut rows: BTreeMap<ContactId, BTreeMap<RowKey, InvoiceRowDatum>> = BTreeMap::new();
    for (contact, by_tenant) in &resolution.shares {
        for (tenant_id, ranges) in by_tenant {
            let Some(tenant) = lease.tenant(*tenant_id) else {
                continue;
            };
            for sub in ranges {
                for part in &acc.parts {
                    let Some(overlap) = sub.overlap(&part.billing_period) else {
                        continue;
                    };
                    let rest = subtract_range_from_range(&part.billing_period, &overlap);
                    for (intended_use, bucket) in &part.buckets {
                        let share = tenant.share_for(*intended_use).of(*bucket)?;
                        let amount = fix_amount_for_overlap(share, &overlap, &rest);
                        let key = (*tenant_id, overlap.start, part.receivable_type, *intended_use);
                        rows.entry(*contact)
                            .or_default()
                            .entry(key)
                            .and_modify(|row| {
                                row.amount += amount;
                                row.billing_period = DateRange {
                                    start: row.billing_period.start.min(overlap.start),
                                    end: row.billing_period.end.max(overlap.end),
                                };
                            })
                            .or_insert(InvoiceRowDatum {
                                tenant: *tenant_id,
                                receivable_type: part.receivable_type,
                                intended_use: *intended_use,
                                billing_period: overlap,
                                amount,
                            });
                    }
                }
            }
        }
    }

    let unrounded: Decimal = rows
        .values()
        .flat_map(BTreeMap::values)
        .map(|row| row.amount)
        .sum();
    let target = round_cents(unrounded);

    let mut invoices: Vec<InvoiceDatum> = rows
        .into_iter()
        .map(|(recipient, rows)| {
            let rows: Vec<InvoiceRowDatum> = rows
                .into_values()
                .map(|mut row| {
                    row.amount = round_cents(row.amount);
                    row
                })
                .collect();
            InvoiceDatum {
                recipient,
                due_date,
                billing_period,
                invoicing_date: today,
                state: InvoiceState::Open,
                billed_amount: Decimal::ZERO,
                outstanding_amount: Decimal::ZERO,
                rows,
            }
        })
        .filter(|invoice| !invoice.rows.is_empty())
        .collect();

    let rounded: Decimal = invoices
        .iter()
        .flat_map(|i| &i.rows)
        .map(|r| r.amount)
        .sum();
    let diff = target - rounded;
    if !diff.is_zero() {
        if let Some(row) = invoices.last_mut().and_then(|i| i.rows.last_mut()) {
            row.amount += diff;
        }
    }
    for invoice in &mut invoices {
        let total: Decimal = invoice.rows.iter().map(|r| r.amount).sum();
        invoice.billed_amount = total;
        invoice.outstanding_amount = total;
        if total.is_zero() {
            invoice.state = InvoiceState::Paid;
        }
    }

    Ok(PeriodInvoiceData {
        due_date,
        billing_period,
        amount: target,
        explanation: acc.explanation,
        invoices,
        gaps: resolution.gaps,
        usage,
    })
}

fn find_existing(store: &Store, lease: LeaseId, datum: &InvoiceDatum) -> Option<InvoiceId> {
    store
        .invoices_for_lease(lease)
        .find(|i| {
            i.invoice_type == InvoiceType::Charge
                && i.recipient == datum.recipient
                && i.due_date == datum.due_date
                && i.billing_period == Some(datum.billing_period)
        })
        .map(|i| i.id)
}

fn persist_invoice(
    store: &mut Store,
    lease: &Lease,
    datum: InvoiceDatum,
    set: Option<InvoiceSetId>,
) -> Result<InvoiceId, BillingError> {
    let id = store.next_id();
    let mut rows = Vec::with_capacity(datum.rows.len());
    for row in datum.rows {
        rows.push(InvoiceRow {
            id: store.next_id(),
            tenant: Some(row.tenant),
            receivable_type: row.receivable_type,
            intended_use: row.intended_use,
            billing_period: Some(row.billing_period),
            amount: row.amount,
            description: None,
            credited_row: None,
            deleted: false,
        });
    }
    let invoice = Invoice {
        id,
        lease: lease.id,
        service_unit: lease.service_unit,
        invoiceset: set,
        number: None,
        recipient: datum.recipient,
        sent_to_sap_at: None,
        sap_id: None,
        due_date: datum.due_date,
        adjusted_due_date: None,
        invoicing_date: Some(datum.invoicing_date),
        state: datum.state,
        billing_period: Some(datum.billing_period),
        postpone_date: None,
        total_amount: Decimal::ZERO,
        billed_amount: datum.billed_amount,
        outstanding_amount: datum.outstanding_amount,
        payment_notification_date: None,
        collection_charge: None,
        collection_stage: None,
        delivery_method: None,
        invoice_type: InvoiceType::Charge,
        notes: None,
        description: None,
        generated: true,
        credited_invoice: None,
        interest_invoice_for: None,
        rows,
        payments: Vec::new(),
        deleted: false,
    };
    store.invoices.insert(id, invoice);
    Ok(id)
}

/// Take the usage of `due_date` off `amount_left`, once per due date.
fn consume_adjustments(
    store: &mut Store,
    lease: LeaseId,
    due_date: NaiveDate,
    usage: &AdjustmentUsage,
) -> Result<(), BillingError> {
    if usage.is_empty() {
        return Ok(());
    }
    let lease = store.lease_mut(lease)?;
    for rent in &mut lease.rents {
        for adjustment in &mut rent.rent_adjustments {
            let used = usage.used(adjustment.id);
            if used.is_zero() || adjustment.consumed.contains_key(&due_date) {
                continue;
            }
            let left = adjustment
                .amount_left
                .or(adjustment.full_amount)
                .unwrap_or_default();
            adjustment.amount_left = Some((left - used).max(Decimal::ZERO));
            adjustment.consumed.insert(due_date, used);
        }
    }
    Ok(())
}

/// Persist the invoices of `lease` for every due date in `range`.
///
/// Invoices already generated for the same recipient, due date and billing
/// period are skipped, so re-running is harmless. Returns the new invoices.
pub fn generate_invoices_for_period(
    store: &mut Store,
    lease: LeaseId,
    range: &DateRange,
    today: NaiveDate,
) -> Result<Vec<InvoiceId>, BillingError> {
    store.atomic(|store| {
        let periods = calculate_invoice_data(store, lease, range, today)?;
        let lease = store.lease(lease)?.clone();
        let mut created = Vec::new();

        for period in periods {
            let mut existing_set = None;
            let mut fresh = Vec::new();
            for datum in period.invoices {
                match find_existing(store, lease.id, &datum) {
                    Some(id) => {
                        existing_set = existing_set.or(store.invoice(id)?.invoiceset);
                    }
                    None => fresh.push(datum),
                }
            }
            if fresh.is_empty() {
                tracing::debug!(
                    lease = %lease.identifier,
                    due_date = %period.due_date,
                    "already invoiced"
                );
                continue;
            }

            let member_count = store
                .invoices_for_lease(lease.id)
                .filter(|i| {
                    i.invoice_type == InvoiceType::Charge
                        && i.due_date == period.due_date
                        && i.billing_period == Some(period.billing_period)
                })
                .count()
                + fresh.len();
            let set = match existing_set {
                Some(set) => Some(set),
                None if member_count > 1 => {
                    let id = store.next_id();
                    store.insert_invoice_set(InvoiceSet {
                        id,
                        lease: lease.id,
                        billing_period: Some(period.billing_period),
                        deleted: false,
                    });
                    Some(id)
                }
                None => None,
            };

            let mut ids = Vec::with_capacity(fresh.len());
            for datum in fresh {
                ids.push(persist_invoice(store, &lease, datum, set)?);
            }
            for id in &ids {
                update_amounts(store, *id)?;
            }
            consume_adjustments(store, lease.id, period.due_date, &period.usage)?;
            tracing::info!(
                lease = %lease.identifier,
                due_date = %period.due_date,
                amount = %period.amount,
                invoices = ids.len(),
                "invoices generated"
            );
            created.extend(ids);
        }
        Ok(created)
    })
}

/// Outcome of a monthly generation run.
#[derive(Debug, Default)]
pub struct GenerationReport {
    pub created: BTreeMap<LeaseId, Vec<InvoiceId>>,
    pub failures: Vec<(LeaseId, BillingError)>,
}

impl GenerationReport {
    pub fn invoice_count(&self) -> usize {
        self.created.values().map(Vec::len).sum()
    }
}

/// Generate invoices due in the given month for every invoiceable lease, in
/// lease id order. A failing lease is rolled back, logged and reported; the
/// run continues with the next lease.
pub fn generate_invoices_for_month(
    store: &mut Store,
    year: i32,
    month: u32,
    today: NaiveDate,
) -> Result<GenerationReport, BillingError> {
    let range = DateRange::month(year, month)?;
    let leases: Vec<LeaseId> = store
        .leases
        .values()
        .filter(|l| l.is_invoiceable())
        .map(|l| l.id)
        .collect();

    let mut report = GenerationReport::default();
    for lease in leases {
        match generate_invoices_for_period(store, lease, &range, today) {
            Ok(ids) if ids.is_empty() => {}
            Ok(ids) => {
                report.created.insert(lease, ids);
            }
            Err(err) => {
                tracing::warn!(lease, kind = err.kind(), error = %err, "invoice generation failed");
                report.failures.push((lease, err));
            }
        }
    }
    tracing::info!(
        year,
        month,
        invoices = report.invoice_count(),
        failures = report.failures.len(),
        "monthly invoicing finished"
    );
    Ok(report)
}
