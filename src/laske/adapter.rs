//! Per-service-unit bill and line texts.
//!
//! MaKe (and the KUVA units, which share its layout) describe the lease on
//! the bill and end the last line item with a notice about late payment.
//! AKV leaves the bill texts blank and describes the leased object on every
//! line item.

use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;

use super::xml_utils::format_net_price;
use crate::core::money::round_cents;
use crate::core::rent::{AdjustmentUsage, amount_for_period};
use crate::core::{DateRange, Invoice, InvoiceRow, Lease, ServiceUnit, ServiceUnitKind, Store};

pub const TEXT_LINE_LEN: usize = 70;
const INTENDED_USE_LEN: usize = 25;

/// Appended to the last line item of MaKe invoices.
pub const LATE_PAYMENT_NOTICE: [&str; 3] = [
    "Eräpäivän jälkeen maksetuille suorituksille peritään korkolain",
    "mukainen viivästyskorko. Maksamattomat laskut siirretään",
    "perintään ja niistä peritään perimispalkkiot.",
];

/// Everything the text adapters may look at.
#[derive(Clone, Copy)]
pub struct InvoiceContext<'a> {
    pub store: &'a Store,
    pub invoice: &'a Invoice,
    pub lease: &'a Lease,
    pub service_unit: &'a ServiceUnit,
}

pub trait TextAdapter: Sync {
    fn bill_texts(&self, ctx: &InvoiceContext<'_>) -> [Option<String>; 6];

    fn line_texts(
        &self,
        ctx: &InvoiceContext<'_>,
        row: &InvoiceRow,
        is_last: bool,
    ) -> [Option<String>; 6];
}

pub struct MakeAdapter;
pub struct AkvAdapter;

pub fn adapter_for(kind: ServiceUnitKind) -> &'static dyn TextAdapter {
    match kind {
        ServiceUnitKind::Akv => &AkvAdapter,
        _ => &MakeAdapter,
    }
}

fn truncate(value: &str, max: usize) -> String {
    value.chars().take(max).collect()
}

fn fi_date(date: NaiveDate) -> String {
    date.format("%d.%m.%Y").to_string()
}

fn into_slots<const N: usize>(lines: impl IntoIterator<Item = String>) -> [Option<String>; N] {
    let mut out: [Option<String>; N] = std::array::from_fn(|_| None);
    for (slot, line) in out.iter_mut().zip(lines) {
        *slot = Some(truncate(&line, TEXT_LINE_LEN));
    }
    out
}

fn wrap(text: &str, max_lines: usize) -> Vec<String> {
    textwrap::wrap(text, TEXT_LINE_LEN)
        .into_iter()
        .take(max_lines)
        .map(|line| line.into_owned())
        .collect()
}

/// Yearly rent of the lease for the cycle year of `date`, with the index
/// review day of the first rent active on that date.
fn yearly_rent(ctx: &InvoiceContext<'_>, date: NaiveDate) -> Option<(&'static str, Decimal)> {
    let lease_span = ctx.lease.span();
    let rents: Vec<_> = ctx
        .lease
        .active_rents()
        .filter(|r| r.active_span(&lease_span).is_some_and(|s| s.contains(date)))
        .collect();
    let first = rents.first()?;
    let year = first.cycle.cycle_year_of(date);
    let rent_context = ctx.store.rent_context();

    let mut total = Decimal::ZERO;
    for rent in &rents {
        let range = match rent.cycle.range(year) {
            Ok(range) => range,
            Err(err) => {
                tracing::warn!(lease = %ctx.lease.identifier, error = %err, "no rent cycle");
                return None;
            }
        };
        let mut usage = AdjustmentUsage::default();
        match amount_for_period(rent, &lease_span, &range, &rent_context, &mut usage) {
            Ok(amount) => total += amount.amount,
            Err(err) => {
                tracing::warn!(
                    lease = %ctx.lease.identifier,
                    error = %err,
                    "yearly rent unavailable"
                );
                return None;
            }
        }
    }
    Some((first.cycle.review_day(), round_cents(total)))
}

fn row_description(ctx: &InvoiceContext<'_>, row: &InvoiceRow) -> String {
    let mut parts = Vec::new();
    if let Ok(receivable_type) = ctx.store.receivable_type(row.receivable_type) {
        parts.push(receivable_type.name.clone());
    }
    if let Some(intended_use) = row.intended_use.and_then(|id| ctx.store.intended_use(id).ok()) {
        parts.push(intended_use.name.clone());
    }
    if let Some(period) = row.billing_period {
        parts.push(period.to_string());
    }
    if let Some(description) = row.description.as_deref().filter(|d| !d.is_empty()) {
        parts.push(description.to_string());
    }
    parts.join(", ")
}

impl TextAdapter for MakeAdapter {
    fn bill_texts(&self, ctx: &InvoiceContext<'_>) -> [Option<String>; 6] {
        let lease = ctx.lease;
        let invoice = ctx.invoice;
        let mut lines = Vec::with_capacity(5);

        let period = invoice
            .billing_period
            .map_or_else(|| "-".to_string(), |p| p.to_string());
        lines.push(format!("Vuokraustunnus: {}  Ajalta: {period}", lease.identifier));

        let end = lease.end_date.map_or_else(|| "-".to_string(), fi_date);
        let intended_use = truncate(lease.intended_use.as_deref().unwrap_or("-"), INTENDED_USE_LEN);
        let intended_use = intended_use.trim_end();
        lines.push(format!("Päättymispvm: {end}  Käyttötarkoitus: {intended_use}"));

        let date = invoice.billing_period.map_or(invoice.due_date, |p: DateRange| p.start);
        if let Some((review_day, yearly)) = yearly_rent(ctx, date) {
            lines.push(format!(
                "Indeksin tark.pvm: {review_day}  Vuosivuokra: {}",
                format_net_price(yearly)
            ));
        }

        if let Some(area) = lease.active_areas().next() {
            let address = lease.primary_address().map_or("", |a| a.address.as_str());
            lines.push(format!("Vuokrakohde: {}, {address}", area.identifier));
        }

        if let Some(notes) = invoice.notes.as_deref().filter(|n| !n.is_empty()) {
            lines.push(notes.to_string());
        }
        into_slots(lines)
    }

    fn line_texts(
        &self,
        ctx: &InvoiceContext<'_>,
        row: &InvoiceRow,
        is_last: bool,
    ) -> [Option<String>; 6] {
        let text = row_description(ctx, row);
        if !is_last {
            return into_slots(wrap(&text, 6));
        }
        let mut slots: [Option<String>; 6] = into_slots(wrap(&text, 3));
        for (slot, line) in slots[3..].iter_mut().zip(LATE_PAYMENT_NOTICE) {
            *slot = Some(line.to_string());
        }
        slots
    }
}

impl TextAdapter for AkvAdapter {
    fn bill_texts(&self, _ctx: &InvoiceContext<'_>) -> [Option<String>; 6] {
        std::array::from_fn(|_| Some(String::new()))
    }

    fn line_texts(
        &self,
        ctx: &InvoiceContext<'_>,
        row: &InvoiceRow,
        _is_last: bool,
    ) -> [Option<String>; 6] {
        let lease = ctx.lease;
        let intended_use = row
            .intended_use
            .and_then(|id| ctx.store.intended_use(id).ok())
            .map(|u| u.name.clone())
            .or_else(|| lease.intended_use.clone())
            .unwrap_or_else(|| "-".into());
        let area = lease.total_area().normalize().to_string().replace('.', ",");
        let district = lease.district_name.as_deref().unwrap_or("-");
        let address = lease.primary_address();
        let street = address.map_or("-", |a| a.address.as_str());
        let postal = address.and_then(|a| a.postal_code.as_deref()).unwrap_or("-");

        let decision = lease
            .decisions
            .iter()
            .filter(|d| d.reference_number.is_some())
            .max_by_key(|d| d.decision_date);
        let decision_text = match decision {
            Some(d) => format!(
                "{}, {} § {}",
                d.reference_number.as_deref().unwrap_or("-"),
                d.decision_date.map_or_else(|| "-".to_string(), fi_date),
                d.section.as_deref().unwrap_or("-")
            ),
            None => "-".to_string(),
        };
        let period = row
            .billing_period
            .or(ctx.invoice.billing_period)
            .map_or_else(|| "-".to_string(), |p| p.to_string());

        let text = format!(
            "Kohde: {intended_use}, noin {area} m², {district} ({}), {street}, {postal}. Päätös: {decision_text}. {period}",
            lease.identifier
        );
        into_slots(wrap(&text, 6))
    }
}

/// Billing date of an invoice: the first day of its due date's month.
pub fn billing_date(invoice: &Invoice) -> NaiveDate {
    invoice.due_date.with_day(1).unwrap_or(invoice.due_date)
}
