//! In-memory arena holding every aggregate root.
//!
//! Entities refer to each other by id. Soft-deleted entities stay in the maps
//! and are filtered by the lookups. Mutations that must be all-or-nothing run
//! inside [`Store::atomic`].

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use super::amounts::AuditObserver;
use super::calendar::CalendarKind;
use super::entities::*;
use super::error::BillingError;
use super::index::IndexStore;
use super::numbering::SharedSequences;
use super::rent::RentContext;

#[derive(Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Store {
    pub service_units: BTreeMap<ServiceUnitId, ServiceUnit>,
    pub contacts: BTreeMap<ContactId, Contact>,
    pub leases: BTreeMap<LeaseId, Lease>,
    pub receivable_types: BTreeMap<ReceivableTypeId, ReceivableType>,
    pub intended_uses: BTreeMap<IntendedUseId, IntendedUse>,
    pub vats: Vec<Vat>,
    pub invoices: BTreeMap<InvoiceId, Invoice>,
    pub invoice_sets: BTreeMap<InvoiceSetId, InvoiceSet>,
    pub export_logs: BTreeMap<ExportLogId, ExportLog>,
    pub payment_import_log: PaymentImportLog,
    pub index: IndexStore,
    pub calendar: CalendarKind,
    pub sequences: SharedSequences,
    next_id: u64,
    #[serde(skip)]
    observer: Option<Arc<dyn AuditObserver>>,
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("service_units", &self.service_units.len())
            .field("leases", &self.leases.len())
            .field("invoices", &self.invoices.len())
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the store; on error every change made by `f` is
    /// undone. Invoice number sequences are shared and keep their advances.
    pub fn atomic<T>(
        &mut self,
        f: impl FnOnce(&mut Store) -> Result<T, BillingError>,
    ) -> Result<T, BillingError> {
        let snapshot = self.clone();
        match f(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                *self = snapshot;
                Err(err)
            }
        }
    }

    /// Allocate a fresh id, unique across all entity kinds.
    pub fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn reserve_id(&mut self, id: u64) {
        self.next_id = self.next_id.max(id);
    }

    pub fn set_observer(&mut self, observer: Arc<dyn AuditObserver>) {
        self.observer = Some(observer);
    }

    pub fn observer(&self) -> Option<Arc<dyn AuditObserver>> {
        self.observer.clone()
    }

    pub fn rent_context(&self) -> RentContext<'_> {
        RentContext::new(&self.index)
    }

    // --- Inserts ---

    pub fn insert_service_unit(&mut self, unit: ServiceUnit) {
        self.reserve_id(unit.id);
        self.service_units.insert(unit.id, unit);
    }

    pub fn insert_contact(&mut self, contact: Contact) {
        self.reserve_id(contact.id);
        self.contacts.insert(contact.id, contact);
    }

    pub fn insert_receivable_type(&mut self, receivable_type: ReceivableType) {
        self.reserve_id(receivable_type.id);
        self.receivable_types.insert(receivable_type.id, receivable_type);
    }

    pub fn insert_intended_use(&mut self, intended_use: IntendedUse) {
        self.reserve_id(intended_use.id);
        self.intended_uses.insert(intended_use.id, intended_use);
    }

    pub fn add_vat(&mut self, vat: Vat) {
        self.vats.push(vat);
    }

    pub fn insert_lease(&mut self, lease: Lease) {
        self.reserve_id(lease.id);
        for tenant in &lease.tenants {
            self.reserve_id(tenant.id);
            for contact in &tenant.contacts {
                self.reserve_id(contact.id);
            }
        }
        for rent in &lease.rents {
            self.reserve_id(rent.id);
            for adjustment in &rent.rent_adjustments {
                self.reserve_id(adjustment.id);
            }
        }
        self.leases.insert(lease.id, lease);
    }

    /// Insert a pre-built invoice. Its number, if any, is registered with the
    /// service unit's sequence.
    pub fn insert_invoice(&mut self, invoice: Invoice) -> Result<(), BillingError> {
        self.reserve_id(invoice.id);
        for row in &invoice.rows {
            self.reserve_id(row.id);
        }
        for payment in &invoice.payments {
            self.reserve_id(payment.id);
        }
        if let Some(number) = invoice.number {
            let unit = self.service_unit(invoice.service_unit)?;
            self.sequences.advance_past(
                &unit.invoice_number_sequence_name,
                unit.first_invoice_number,
                number,
            );
        }
        if let Some(set) = invoice.invoiceset {
            self.reserve_id(set);
        }
        self.invoices.insert(invoice.id, invoice);
        Ok(())
    }

    pub fn insert_invoice_set(&mut self, set: InvoiceSet) {
        self.reserve_id(set.id);
        self.invoice_sets.insert(set.id, set);
    }

    /// Register every invoice number found in the data with its sequence.
    pub fn sync_sequences(&self) {
        for invoice in self.invoices.values() {
            let (Some(number), Some(unit)) =
                (invoice.number, self.service_units.get(&invoice.service_unit))
            else {
                continue;
            };
            self.sequences.advance_past(
                &unit.invoice_number_sequence_name,
                unit.first_invoice_number,
                number,
            );
        }
    }

    // --- Lookups ---

    pub fn service_unit(&self, id: ServiceUnitId) -> Result<&ServiceUnit, BillingError> {
        self.service_units
            .get(&id)
            .ok_or_else(|| BillingError::not_found("service unit", id))
    }

    pub fn contact(&self, id: ContactId) -> Result<&Contact, BillingError> {
        self.contacts
            .get(&id)
            .filter(|c| !c.deleted)
            .ok_or_else(|| BillingError::not_found("contact", id))
    }

    pub fn lease(&self, id: LeaseId) -> Result<&Lease, BillingError> {
        self.leases
            .get(&id)
            .filter(|l| !l.deleted)
            .ok_or_else(|| BillingError::not_found("lease", id))
    }

    pub fn lease_mut(&mut self, id: LeaseId) -> Result<&mut Lease, BillingError> {
        self.leases
            .get_mut(&id)
            .filter(|l| !l.deleted)
            .ok_or_else(|| BillingError::not_found("lease", id))
    }

    pub fn receivable_type(&self, id: ReceivableTypeId) -> Result<&ReceivableType, BillingError> {
        self.receivable_types
            .get(&id)
            .ok_or_else(|| BillingError::not_found("receivable type", id))
    }

    pub fn intended_use(&self, id: IntendedUseId) -> Result<&IntendedUse, BillingError> {
        self.intended_uses
            .get(&id)
            .ok_or_else(|| BillingError::not_found("intended use", id))
    }

    pub fn invoice(&self, id: InvoiceId) -> Result<&Invoice, BillingError> {
        self.invoices
            .get(&id)
            .filter(|i| !i.deleted)
            .ok_or_else(|| BillingError::not_found("invoice", id))
    }

    pub fn invoice_mut(&mut self, id: InvoiceId) -> Result<&mut Invoice, BillingError> {
        self.invoices
            .get_mut(&id)
            .filter(|i| !i.deleted)
            .ok_or_else(|| BillingError::not_found("invoice", id))
    }

    pub fn invoice_set(&self, id: InvoiceSetId) -> Result<&InvoiceSet, BillingError> {
        self.invoice_sets
            .get(&id)
            .filter(|s| !s.deleted)
            .ok_or_else(|| BillingError::not_found("invoice set", id))
    }

    pub fn invoice_by_number(&self, number: u64) -> Option<&Invoice> {
        self.invoices
            .values()
            .find(|i| !i.deleted && i.number == Some(number))
    }

    /// Live invoices of a lease in id order.
    pub fn invoices_for_lease(&self, lease: LeaseId) -> impl Iterator<Item = &Invoice> {
        self.invoices
            .values()
            .filter(move |i| !i.deleted && i.lease == lease)
    }

    /// Live members of an invoice set in id order.
    pub fn invoices_in_set(&self, set: InvoiceSetId) -> Vec<InvoiceId> {
        self.invoices
            .values()
            .filter(|i| !i.deleted && i.invoiceset == Some(set))
            .map(|i| i.id)
            .collect()
    }

    /// Live credit notes crediting `invoice`.
    pub fn credit_notes_for(&self, invoice: InvoiceId) -> impl Iterator<Item = &Invoice> {
        self.invoices
            .values()
            .filter(move |i| !i.deleted && i.credited_invoice == Some(invoice))
    }

    pub fn vat_on(&self, date: NaiveDate) -> Option<&Vat> {
        self.vats.iter().find(|v| v.is_valid_on(date))
    }

    // --- Lease lifecycle ---

    /// Mark rent info complete (`Some`) or incomplete (`None`). Marking it
    /// incomplete also disables invoicing.
    pub fn set_rent_info_completed(
        &mut self,
        lease: LeaseId,
        at: Option<NaiveDateTime>,
    ) -> Result<(), BillingError> {
        let lease = self.lease_mut(lease)?;
        lease.rent_info_completed_at = at;
        if at.is_none() {
            lease.is_invoicing_enabled_at = None;
        }
        Ok(())
    }

    /// Enable (`Some`) or disable (`None`) invoicing. Enabling requires
    /// completed rent info.
    pub fn set_invoicing_enabled(
        &mut self,
        lease: LeaseId,
        at: Option<NaiveDateTime>,
    ) -> Result<(), BillingError> {
        let lease = self.lease_mut(lease)?;
        if at.is_some() && lease.rent_info_completed_at.is_none() {
            return Err(BillingError::State(format!(
                "rent info of lease {} is not completed",
                lease.identifier
            )));
        }
        lease.is_invoicing_enabled_at = at;
        Ok(())
    }
}
