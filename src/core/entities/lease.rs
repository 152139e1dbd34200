use std::fmt;

use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{ContactId, DecisionId, LeaseId, ReceivableTypeId, ServiceUnitId, Tenant};
use crate::core::date_range::Span;
use crate::core::rent::Rent;

/// Well-known service units. The kind selects the payment-reference prefix
/// and the Laske text adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceUnitKind {
    Make,
    Akv,
    KuvaLipa,
    KuvaUpa,
    KuvaNup,
    Other,
}

impl ServiceUnitKind {
    pub fn is_kuva(self) -> bool {
        matches!(self, Self::KuvaLipa | Self::KuvaUpa | Self::KuvaNup)
    }

    /// SAP prefix of payment references.
    pub fn sap_prefix(self) -> &'static str {
        if self.is_kuva() { "297" } else { "288" }
    }
}

/// A billing tenant of the system with its own numbering and Laske identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceUnit {
    pub id: ServiceUnitId,
    pub name: String,
    pub kind: ServiceUnitKind,
    pub invoice_number_sequence_name: String,
    pub first_invoice_number: u64,
    #[serde(default)]
    pub first_contract_number: Option<u64>,
    pub laske_sender_id: String,
    pub laske_sales_org: String,
    #[serde(default)]
    pub default_receivable_type_rent: Option<ReceivableTypeId>,
    #[serde(default)]
    pub default_receivable_type_collateral: Option<ReceivableTypeId>,
    #[serde(default)]
    pub use_rent_override_receivable_type: bool,
    #[serde(default)]
    pub is_application_received_at_mandatory: bool,
}

impl ServiceUnit {
    /// A service unit whose invoice number sequence is named after `name`.
    pub fn new(id: ServiceUnitId, name: &str, kind: ServiceUnitKind) -> Self {
        Self {
            id,
            name: name.to_string(),
            kind,
            invoice_number_sequence_name: name.to_lowercase(),
            first_invoice_number: 1,
            first_contract_number: None,
            laske_sender_id: String::new(),
            laske_sales_org: String::new(),
            default_receivable_type_rent: None,
            default_receivable_type_collateral: None,
            use_rent_override_receivable_type: false,
            is_application_received_at_mandatory: false,
        }
    }
}

/// Lease identifier, e.g. `A1104-1`: type code, municipality, two-digit
/// district and sequence.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LeaseIdentifier {
    pub type_code: String,
    pub municipality: u32,
    pub district: u32,
    pub sequence: u32,
}

impl fmt::Display for LeaseIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{:02}-{}",
            self.type_code, self.municipality, self.district, self.sequence
        )
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DueDatesPosition {
    #[default]
    StartOfMonth,
    MiddleOfMonth,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseType {
    pub identifier: String,
    pub name: String,
    pub sap_material_code: Option<String>,
    pub sap_project_number: Option<String>,
    pub sap_order_item_number: Option<String>,
    pub due_dates_position: DueDatesPosition,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseAreaAddress {
    pub address: String,
    pub postal_code: Option<String>,
    pub city: Option<String>,
    pub is_primary: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanUnit {
    pub identifier: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LeaseArea {
    pub identifier: String,
    /// Square metres.
    pub area: Decimal,
    pub addresses: Vec<LeaseAreaAddress>,
    pub plan_units: Vec<PlanUnit>,
    pub archived_decision: Option<DecisionId>,
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Decision {
    pub id: DecisionId,
    #[serde(default)]
    pub reference_number: Option<String>,
    #[serde(default)]
    pub decision_date: Option<NaiveDate>,
    #[serde(default)]
    pub section: Option<String>,
}

/// Root aggregate: a land lease with its areas, tenants and rents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Lease {
    pub id: LeaseId,
    pub identifier: LeaseIdentifier,
    pub service_unit: ServiceUnitId,
    #[serde(default)]
    pub lessor: Option<ContactId>,
    #[serde(default)]
    pub lease_type: LeaseType,
    #[serde(default)]
    pub start_date: Option<NaiveDate>,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    #[serde(default)]
    pub is_invoicing_enabled_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub rent_info_completed_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub internal_order: Option<String>,
    #[serde(default)]
    pub is_subject_to_vat: bool,
    #[serde(default)]
    pub intended_use: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub district_name: Option<String>,
    #[serde(default)]
    pub contract_number: Option<String>,
    #[serde(default)]
    pub lease_areas: Vec<LeaseArea>,
    #[serde(default)]
    pub decisions: Vec<Decision>,
    #[serde(default)]
    pub tenants: Vec<Tenant>,
    #[serde(default)]
    pub rents: Vec<Rent>,
    #[serde(default)]
    pub deleted: bool,
}

impl Lease {
    pub fn new(id: LeaseId, identifier: LeaseIdentifier, service_unit: ServiceUnitId) -> Self {
        Self {
            id,
            identifier,
            service_unit,
            lessor: None,
            lease_type: LeaseType::default(),
            start_date: None,
            end_date: None,
            is_invoicing_enabled_at: None,
            rent_info_completed_at: None,
            internal_order: None,
            is_subject_to_vat: false,
            intended_use: None,
            notes: None,
            district_name: None,
            contract_number: None,
            lease_areas: Vec::new(),
            decisions: Vec::new(),
            tenants: Vec::new(),
            rents: Vec::new(),
            deleted: false,
        }
    }

    pub fn span(&self) -> Span {
        Span {
            start: self.start_date,
            end: self.end_date,
        }
    }

    /// Invoices are generated only once invoicing is enabled, which in turn
    /// requires completed rent info.
    pub fn is_invoiceable(&self) -> bool {
        !self.deleted
            && self.is_invoicing_enabled_at.is_some()
            && self.rent_info_completed_at.is_some()
    }

    pub fn active_tenants(&self) -> impl Iterator<Item = &Tenant> {
        self.tenants.iter().filter(|t| !t.deleted)
    }

    pub fn active_rents(&self) -> impl Iterator<Item = &Rent> {
        self.rents.iter().filter(|r| !r.deleted)
    }

    pub fn tenant(&self, id: super::TenantId) -> Option<&Tenant> {
        self.tenants.iter().find(|t| t.id == id)
    }

    pub fn active_areas(&self) -> impl Iterator<Item = &LeaseArea> {
        self.lease_areas.iter().filter(|a| !a.deleted)
    }

    /// Primary address of the first area, falling back to its first address.
    pub fn primary_address(&self) -> Option<&LeaseAreaAddress> {
        let area = self.active_areas().next()?;
        area.addresses
            .iter()
            .find(|a| a.is_primary)
            .or_else(|| area.addresses.first())
    }

    pub fn total_area(&self) -> Decimal {
        self.active_areas().map(|a| a.area).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifier_format() {
        let id = LeaseIdentifier {
            type_code: "A1".into(),
            municipality: 1,
            district: 4,
            sequence: 1,
        };
        assert_eq!(id.to_string(), "A1104-1");
    }

    #[test]
    fn sap_prefixes() {
        assert_eq!(ServiceUnitKind::Make.sap_prefix(), "288");
        assert_eq!(ServiceUnitKind::Akv.sap_prefix(), "288");
        assert_eq!(ServiceUnitKind::KuvaUpa.sap_prefix(), "297");
    }
}
