//! Laske `SBO_SalesOrder` document model and its XML rendering.
//!
//! Every element is an optional string with a maximum length. `None` is not
//! written; `Some("")` is written as an empty element.

use super::xml_utils::{XmlResult, XmlWriter};
use crate::core::BillingError;

pub const ORDER_TYPE_CHARGE: &str = "ZTY1";
pub const ORDER_TYPE_CREDIT_NOTE: &str = "ZHY1";

/// One element of the document in output order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field<'a> {
    pub name: &'static str,
    pub max_len: usize,
    pub required: bool,
    pub value: Option<&'a str>,
}

impl<'a> Field<'a> {
    fn new(name: &'static str, max_len: usize, value: &'a Option<String>) -> Self {
        Self {
            name,
            max_len,
            required: false,
            value: value.as_deref(),
        }
    }

    fn required(name: &'static str, max_len: usize, value: &'a Option<String>) -> Self {
        Self {
            required: true,
            ..Self::new(name, max_len, value)
        }
    }
}

const PRIORITY_NAMES: [&str; 4] = [
    "PriorityName1",
    "PriorityName2",
    "PriorityName3",
    "PriorityName4",
];
const INFO_NAMES: [&str; 4] = ["InfoName1", "InfoName2", "InfoName3", "InfoName4"];
const HIDDEN_TEXTS: [&str; 6] = [
    "HiddenTextL1",
    "HiddenTextL2",
    "HiddenTextL3",
    "HiddenTextL4",
    "HiddenTextL5",
    "HiddenTextL6",
];
const BILL_TEXTS: [&str; 6] = [
    "BillTextL1",
    "BillTextL2",
    "BillTextL3",
    "BillTextL4",
    "BillTextL5",
    "BillTextL6",
];
const LINE_TEXTS: [&str; 6] = [
    "LineTextL1",
    "LineTextL2",
    "LineTextL3",
    "LineTextL4",
    "LineTextL5",
    "LineTextL6",
];

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Party {
    pub sap_customer_id: Option<String>,
    pub customer_id: Option<String>,
    pub customer_yid: Option<String>,
    pub customer_ovt: Option<String>,
    pub temporary_address1: Option<String>,
    pub temporary_address2: Option<String>,
    pub temporary_po_code: Option<String>,
    pub temporary_po_city: Option<String>,
    pub temporary_po_postalcode: Option<String>,
    pub temporary_city: Option<String>,
    pub temporary_postalcode: Option<String>,
    pub priority_name: [Option<String>; 4],
    pub priority_address1: Option<String>,
    pub priority_address2: Option<String>,
    pub priority_po_code: Option<String>,
    pub priority_po_city: Option<String>,
    pub priority_po_postalcode: Option<String>,
    pub priority_city: Option<String>,
    pub priority_postalcode: Option<String>,
    pub info_customer_id: Option<String>,
    pub info_customer_yid: Option<String>,
    pub info_customer_ovt: Option<String>,
    pub info_name: [Option<String>; 4],
    pub info_address1: Option<String>,
    pub info_address2: Option<String>,
    pub info_po_code: Option<String>,
    pub info_po_city: Option<String>,
    pub info_po_postalcode: Option<String>,
    pub info_city: Option<String>,
    pub info_postalcode: Option<String>,
}

impl Party {
    pub fn fields(&self) -> Vec<Field<'_>> {
        let mut fields = vec![
            Field::new("SAPCustomerID", 10, &self.sap_customer_id),
            Field::new("CustomerID", 11, &self.customer_id),
            Field::new("CustomerYID", 9, &self.customer_yid),
            Field::new("CustomerOVT", 18, &self.customer_ovt),
            Field::new("TemporaryAddress1", 35, &self.temporary_address1),
            Field::new("TemporaryAddress2", 35, &self.temporary_address2),
            Field::new("TemporaryPOCode", 35, &self.temporary_po_code),
            Field::new("TemporaryPOCity", 35, &self.temporary_po_city),
            Field::new("TemporaryPOPostalcode", 9, &self.temporary_po_postalcode),
            Field::new("TemporaryCity", 35, &self.temporary_city),
            Field::new("TemporaryPostalcode", 9, &self.temporary_postalcode),
        ];
        fields.extend(
            PRIORITY_NAMES
                .iter()
                .zip(&self.priority_name)
                .map(|(name, value)| Field::new(name, 35, value)),
        );
        fields.extend([
            Field::new("PriorityAddress1", 35, &self.priority_address1),
            Field::new("PriorityAddress2", 35, &self.priority_address2),
            Field::new("PriorityPOCode", 35, &self.priority_po_code),
            Field::new("PriorityPOCity", 35, &self.priority_po_city),
            Field::new("PriorityPOPostalcode", 9, &self.priority_po_postalcode),
            Field::new("PriorityCity", 35, &self.priority_city),
            Field::new("PriorityPostalcode", 9, &self.priority_postalcode),
            Field::new("InfoCustomerID", 11, &self.info_customer_id),
            Field::new("InfoCustomerYID", 9, &self.info_customer_yid),
            Field::new("InfoCustomerOVT", 18, &self.info_customer_ovt),
        ]);
        fields.extend(
            INFO_NAMES
                .iter()
                .zip(&self.info_name)
                .map(|(name, value)| Field::new(name, 35, value)),
        );
        fields.extend([
            Field::new("InfoAddress1", 35, &self.info_address1),
            Field::new("InfoAddress2", 35, &self.info_address2),
            Field::new("InfoPOCode", 35, &self.info_po_code),
            Field::new("InfoPOCity", 35, &self.info_po_city),
            Field::new("InfoPOPostalcode", 9, &self.info_po_postalcode),
            Field::new("InfoCity", 35, &self.info_city),
            Field::new("InfoPostalcode", 9, &self.info_postalcode),
        ]);
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LineItem {
    pub grouping_factor: Option<String>,
    pub material: Option<String>,
    pub material_description: Option<String>,
    pub quantity: Option<String>,
    pub unit: Option<String>,
    pub net_price: Option<String>,
    pub tax_code: Option<String>,
    pub line_text: [Option<String>; 6],
    pub profit_center: Option<String>,
    pub order_item_number: Option<String>,
    pub wbs_element: Option<String>,
    pub functional_area: Option<String>,
    pub business_entity: Option<String>,
    pub building: Option<String>,
    pub rental_object: Option<String>,
}

impl LineItem {
    pub fn fields(&self) -> Vec<Field<'_>> {
        let mut fields = vec![
            Field::new("GroupingFactor", 35, &self.grouping_factor),
            Field::new("Material", 18, &self.material),
            Field::new("MaterialDescription", 40, &self.material_description),
            Field::new("Quantity", 13, &self.quantity),
            Field::new("Unit", 3, &self.unit),
            Field::required("NetPrice", 14, &self.net_price),
            Field::new("TaxCode", 1, &self.tax_code),
        ];
        fields.extend(
            LINE_TEXTS
                .iter()
                .zip(&self.line_text)
                .map(|(name, value)| Field::new(name, 70, value)),
        );
        fields.extend([
            Field::new("ProfitCenter", 10, &self.profit_center),
            Field::new("OrderItemNumber", 12, &self.order_item_number),
            Field::new("WBS_Element", 16, &self.wbs_element),
            Field::new("FunctionalArea", 6, &self.functional_area),
            Field::new("BusinessEntity", 8, &self.business_entity),
            Field::new("Building", 8, &self.building),
            Field::new("RentalObject", 8, &self.rental_object),
        ]);
        fields
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SalesOrder {
    pub sender_id: Option<String>,
    pub reference: Option<String>,
    pub original_order: Option<String>,
    pub contract_number: Option<String>,
    pub order_type: Option<String>,
    pub sales_org: Option<String>,
    pub distribution_channel: Option<String>,
    pub division: Option<String>,
    pub sales_office: Option<String>,
    pub sales_group: Option<String>,
    pub po_number: Option<String>,
    pub billing_block: Option<String>,
    pub sales_district: Option<String>,
    pub hidden_text: [Option<String>; 6],
    pub bill_text: [Option<String>; 6],
    pub reference_text: Option<String>,
    pub pmntterm: Option<String>,
    pub order_reason: Option<String>,
    pub billing_date: Option<String>,
    pub pricing_date: Option<String>,
    pub value_date: Option<String>,
    pub payment_reference: Option<String>,
    pub already_printed_flag: Option<String>,
    pub order_party: Party,
    pub billing_party1: Party,
    pub billing_party2: Option<Party>,
    pub payer_party: Party,
    pub line_items: Vec<LineItem>,
}

impl SalesOrder {
    /// Header elements in document order.
    pub fn header_fields(&self) -> Vec<Field<'_>> {
        let mut fields = vec![
            Field::required("SenderId", 5, &self.sender_id),
            Field::new("Reference", 10, &self.reference),
            Field::new("OriginalOrder", 10, &self.original_order),
            Field::new("ContractNumber", 11, &self.contract_number),
            Field::required("OrderType", 4, &self.order_type),
            Field::required("SalesOrg", 4, &self.sales_org),
            Field::required("DistributionChannel", 2, &self.distribution_channel),
            Field::required("Division", 2, &self.division),
            Field::required("SalesOffice", 4, &self.sales_office),
            Field::new("SalesGroup", 3, &self.sales_group),
            Field::new("PONumber", 35, &self.po_number),
            Field::new("BillingBlock", 4, &self.billing_block),
            Field::new("SalesDistrict", 6, &self.sales_district),
        ];
        fields.extend(
            HIDDEN_TEXTS
                .iter()
                .zip(&self.hidden_text)
                .map(|(name, value)| Field::new(name, 70, value)),
        );
        fields.extend(
            BILL_TEXTS
                .iter()
                .zip(&self.bill_text)
                .map(|(name, value)| Field::new(name, 70, value)),
        );
        fields.extend([
            Field::new("ReferenceText", 20, &self.reference_text),
            Field::new("PMNTTERM", 4, &self.pmntterm),
            Field::new("OrderReason", 3, &self.order_reason),
            Field::new("BillingDate", 8, &self.billing_date),
            Field::new("PricingDate", 8, &self.pricing_date),
            Field::new("ValueDate", 8, &self.value_date),
            Field::new("PaymentReference", 30, &self.payment_reference),
            Field::new("AlreadyPrintedFlag", 1, &self.already_printed_flag),
        ]);
        fields
    }

    /// Parties in document order with their element names.
    pub fn parties(&self) -> Vec<(&'static str, &Party)> {
        let mut parties = vec![
            ("OrderParty", &self.order_party),
            ("BillingParty1", &self.billing_party1),
        ];
        if let Some(party) = &self.billing_party2 {
            parties.push(("BillingParty2", party));
        }
        parties.push(("PayerParty", &self.payer_party));
        parties
    }

    fn write(&self, w: &mut XmlWriter) -> Result<(), BillingError> {
        w.start_element("SBO_SalesOrder")?;
        write_fields(w, &self.header_fields())?;
        for (name, party) in self.parties() {
            w.start_element(name)?;
            write_fields(w, &party.fields())?;
            w.end_element(name)?;
        }
        for item in &self.line_items {
            w.start_element("LineItem")?;
            write_fields(w, &item.fields())?;
            w.end_element("LineItem")?;
        }
        w.end_element("SBO_SalesOrder")?;
        Ok(())
    }
}

fn write_fields(w: &mut XmlWriter, fields: &[Field<'_>]) -> Result<(), BillingError> {
    for field in fields {
        w.optional_element(field.name, field.value)?;
    }
    Ok(())
}

/// Render sales orders as one `SBO_SalesOrderContainer` document.
pub fn to_laske_xml(orders: &[SalesOrder]) -> XmlResult {
    if orders.is_empty() {
        return Err(BillingError::Codec("a container needs at least one sales order".into()));
    }
    let mut w = XmlWriter::new()?;
    w.start_element("SBO_SalesOrderContainer")?;
    for order in orders {
        order.write(&mut w)?;
    }
    w.end_element("SBO_SalesOrderContainer")?;
    w.into_string()
}
