use chrono::{NaiveDate, NaiveDateTime};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{
    ContactId, IntendedUseId, InvoiceId, InvoicePaymentId, InvoiceRowId, InvoiceSetId, LeaseId,
    ReceivableTypeId, ServiceUnitId, TenantId,
};
use crate::core::date_range::DateRange;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceType {
    #[default]
    Charge,
    CreditNote,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceState {
    #[default]
    Open,
    Paid,
    Refunded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryMethod {
    Mail,
    Electronic,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionStage {
    Reminder,
    DemandLetter,
    Collection,
    Court,
}

impl std::str::FromStr for CollectionStage {
    type Err = crate::core::error::BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "reminder" => Ok(Self::Reminder),
            "demand_letter" => Ok(Self::DemandLetter),
            "collection" => Ok(Self::Collection),
            "court" => Ok(Self::Court),
            other => Err(crate::core::error::BillingError::Validation(format!(
                "unknown collection stage '{other}'"
            ))),
        }
    }
}

/// One charge line of an invoice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRow {
    pub id: InvoiceRowId,
    #[serde(default)]
    pub tenant: Option<TenantId>,
    pub receivable_type: ReceivableTypeId,
    #[serde(default)]
    pub intended_use: Option<IntendedUseId>,
    #[serde(default)]
    pub billing_period: Option<DateRange>,
    pub amount: Decimal,
    #[serde(default)]
    pub description: Option<String>,
    /// On credit-note rows: the charge row being credited.
    #[serde(default)]
    pub credited_row: Option<InvoiceRowId>,
    #[serde(default)]
    pub deleted: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoicePayment {
    pub id: InvoicePaymentId,
    pub paid_amount: Decimal,
    pub paid_date: NaiveDate,
    #[serde(default)]
    pub filing_code: Option<String>,
}

/// Sibling invoices generated for the same lease and billing period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceSet {
    pub id: InvoiceSetId,
    pub lease: LeaseId,
    #[serde(default)]
    pub billing_period: Option<DateRange>,
    #[serde(default)]
    pub deleted: bool,
}

/// A statement owed by a single recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub id: InvoiceId,
    pub lease: LeaseId,
    pub service_unit: ServiceUnitId,
    #[serde(default)]
    pub invoiceset: Option<InvoiceSetId>,
    /// Assigned lazily from the service unit's sequence; immutable once set.
    #[serde(default)]
    pub number: Option<u64>,
    pub recipient: ContactId,
    #[serde(default)]
    pub sent_to_sap_at: Option<NaiveDateTime>,
    #[serde(default)]
    pub sap_id: Option<String>,
    pub due_date: NaiveDate,
    #[serde(default)]
    pub adjusted_due_date: Option<NaiveDate>,
    #[serde(default)]
    pub invoicing_date: Option<NaiveDate>,
    #[serde(default)]
    pub state: InvoiceState,
    #[serde(default)]
    pub billing_period: Option<DateRange>,
    #[serde(default)]
    pub postpone_date: Option<NaiveDate>,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub billed_amount: Decimal,
    #[serde(default)]
    pub outstanding_amount: Decimal,
    #[serde(default)]
    pub payment_notification_date: Option<NaiveDate>,
    #[serde(default)]
    pub collection_charge: Option<Decimal>,
    #[serde(default)]
    pub collection_stage: Option<CollectionStage>,
    #[serde(default)]
    pub delivery_method: Option<DeliveryMethod>,
    #[serde(default)]
    pub invoice_type: InvoiceType,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub generated: bool,
    #[serde(default)]
    pub credited_invoice: Option<InvoiceId>,
    #[serde(default)]
    pub interest_invoice_for: Option<InvoiceId>,
    #[serde(default)]
    pub rows: Vec<InvoiceRow>,
    #[serde(default)]
    pub payments: Vec<InvoicePayment>,
    #[serde(default)]
    pub deleted: bool,
}

impl Invoice {
    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_sent(&self) -> bool {
        self.sent_to_sap_at.is_some()
    }

    pub fn active_rows(&self) -> impl Iterator<Item = &InvoiceRow> {
        self.rows.iter().filter(|r| !r.deleted)
    }

    pub fn row(&self, id: InvoiceRowId) -> Option<&InvoiceRow> {
        self.rows.iter().find(|r| r.id == id && !r.deleted)
    }

    pub fn rows_total(&self) -> Decimal {
        self.active_rows().map(|r| r.amount).sum()
    }

    pub fn payments_total(&self) -> Decimal {
        self.payments.iter().map(|p| p.paid_amount).sum()
    }
}
