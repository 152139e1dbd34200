use super::reference::is_valid_reference;
use super::sales_order::{Field, SalesOrder};
use crate::core::{ValidationError, errors_by_field};

fn check_fields(prefix: &str, fields: &[Field<'_>], errors: &mut Vec<ValidationError>) {
    for field in fields {
        let path = format!("{prefix}.{}", field.name);
        match field.value {
            None | Some("") if field.required => {
                errors.push(ValidationError::new(path, "This field is required."));
            }
            Some(value) => {
                let len = value.chars().count();
                if len > field.max_len {
                    errors.push(ValidationError::new(
                        path,
                        format!(
                            "Ensure this field has no more than {} characters (it has {len}).",
                            field.max_len
                        ),
                    ));
                }
            }
            None => {}
        }
    }
}

/// Validate a sales order before it is written to an export file.
///
/// Returns all errors found; an empty list means the order can be sent.
pub fn validate_sales_order(order: &SalesOrder) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    check_fields("SalesOrder", &order.header_fields(), &mut errors);
    for (name, party) in order.parties() {
        check_fields(&format!("SalesOrder.{name}"), &party.fields(), &mut errors);
    }

    if let Some(reference) = order.payment_reference.as_deref()
        && !is_valid_reference(reference)
    {
        errors.push(ValidationError::new(
            "SalesOrder.PaymentReference",
            "Payment reference check digit does not match.",
        ));
    }

    if order.line_items.is_empty() {
        errors.push(ValidationError::new(
            "SalesOrder.LineItem",
            "At least one line item is required.",
        ));
    }
    for (i, item) in order.line_items.iter().enumerate() {
        let prefix = format!("SalesOrder.LineItem[{i}]");
        check_fields(&prefix, &item.fields(), &mut errors);
        if item.wbs_element.is_some() && item.order_item_number.is_some() {
            errors.push(ValidationError::new(
                prefix,
                "WBS_Element and OrderItemNumber are mutually exclusive.",
            ));
        }
    }

    errors
}

/// Errors as a JSON object keyed by field, as stored in export log items.
pub fn errors_json(errors: &[ValidationError]) -> String {
    serde_json::to_string(&errors_by_field(errors)).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::laske::sales_order::LineItem;

    fn order() -> SalesOrder {
        SalesOrder {
            sender_id: Some("ID340".into()),
            order_type: Some("ZTY1".into()),
            sales_org: Some("2800".into()),
            distribution_channel: Some("10".into()),
            division: Some("10".into()),
            sales_office: Some("2826".into()),
            payment_reference: Some("1232".into()),
            line_items: vec![LineItem {
                net_price: Some("10,00".into()),
                ..Default::default()
            }],
            ..Default::default()
        }
    }

    #[test]
    fn complete_order_is_valid() {
        assert!(validate_sales_order(&order()).is_empty());
    }

    #[test]
    fn length_and_presence() {
        let mut order = order();
        order.sender_id = None;
        order.order_party.priority_name[0] = Some("x".repeat(36));
        let errors = validate_sales_order(&order);
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(
            fields,
            ["SalesOrder.SenderId", "SalesOrder.OrderParty.PriorityName1"]
        );
        assert!(errors[1].message.contains("no more than 35 characters (it has 36)"));
    }

    #[test]
    fn lengths_count_characters_not_bytes() {
        let mut order = order();
        order.order_party.priority_name[0] = Some("ä".repeat(35));
        assert!(validate_sales_order(&order).is_empty());
    }

    #[test]
    fn reference_and_exclusive_codes() {
        let mut order = order();
        order.payment_reference = Some("1234".into());
        order.line_items[0].wbs_element = Some("2800001".into());
        order.line_items[0].order_item_number = Some("28001".into());
        let errors = validate_sales_order(&order);
        assert_eq!(errors.len(), 2);
        let json = errors_json(&errors);
        assert!(json.contains("\"SalesOrder.PaymentReference\""));
        assert!(json.contains("\"SalesOrder.LineItem[0]\""));
    }
}
