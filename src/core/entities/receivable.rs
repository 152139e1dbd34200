use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::{IntendedUseId, ReceivableTypeId, ServiceUnitId};

/// Monetary category of an invoice row, with its SAP cost-object codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceivableType {
    pub id: ReceivableTypeId,
    pub name: String,
    pub service_unit: ServiceUnitId,
    #[serde(default)]
    pub sap_material_code: Option<String>,
    #[serde(default)]
    pub sap_project_number: Option<String>,
    #[serde(default)]
    pub sap_order_item_number: Option<String>,
    #[serde(default = "default_true")]
    pub is_active: bool,
}

fn default_true() -> bool {
    true
}

impl ReceivableType {
    pub fn new(id: ReceivableTypeId, name: &str, service_unit: ServiceUnitId) -> Self {
        Self {
            id,
            name: name.to_string(),
            service_unit,
            sap_material_code: None,
            sap_project_number: None,
            sap_order_item_number: None,
            is_active: true,
        }
    }

    pub fn has_sap_codes(&self) -> bool {
        [
            &self.sap_material_code,
            &self.sap_project_number,
            &self.sap_order_item_number,
        ]
        .iter()
        .any(|code| code.as_deref().is_some_and(|c| !c.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntendedUse {
    pub id: IntendedUseId,
    pub name: String,
    #[serde(default)]
    pub service_unit: Option<ServiceUnitId>,
}

/// VAT percent valid over a date range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Vat {
    pub percent: Decimal,
    pub start_date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl Vat {
    pub fn is_valid_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && self.end_date.is_none_or(|end| date <= end)
    }
}
