use serde::{Deserialize, Serialize};

use super::ContactId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactType {
    Person,
    Business,
    Unit,
    Other,
    Association,
}

/// A person, business or organisational unit that can hold or pay a lease.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contact {
    pub id: ContactId,
    pub contact_type: ContactType,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Name of a non-person contact.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub care_of: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub postal_code: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub national_identification_number: Option<String>,
    #[serde(default)]
    pub business_id: Option<String>,
    #[serde(default)]
    pub electronic_billing_address: Option<String>,
    #[serde(default)]
    pub sap_customer_number: Option<String>,
    #[serde(default)]
    pub sap_sales_office: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub deleted: bool,
}

impl Contact {
    pub fn person(id: ContactId, first_name: &str, last_name: &str) -> Self {
        Self {
            first_name: Some(first_name.to_string()),
            last_name: Some(last_name.to_string()),
            ..Self::empty(id, ContactType::Person)
        }
    }

    pub fn business(id: ContactId, name: &str, business_id: &str) -> Self {
        Self {
            name: Some(name.to_string()),
            business_id: Some(business_id.to_string()),
            ..Self::empty(id, ContactType::Business)
        }
    }

    pub fn empty(id: ContactId, contact_type: ContactType) -> Self {
        Self {
            id,
            contact_type,
            first_name: None,
            last_name: None,
            name: None,
            care_of: None,
            address: None,
            postal_code: None,
            city: None,
            country: None,
            national_identification_number: None,
            business_id: None,
            electronic_billing_address: None,
            sap_customer_number: None,
            sap_sales_office: None,
            language: None,
            deleted: false,
        }
    }

    pub fn is_person(&self) -> bool {
        self.contact_type == ContactType::Person
    }

    /// "First Last" for persons, otherwise the organisation name.
    pub fn display_name(&self) -> String {
        if self.is_person() {
            let parts: Vec<&str> = [self.first_name.as_deref(), self.last_name.as_deref()]
                .into_iter()
                .flatten()
                .filter(|s| !s.trim().is_empty())
                .collect();
            parts.join(" ")
        } else {
            self.name.clone().unwrap_or_default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names() {
        assert_eq!(
            Contact::person(1, "Maija", "Meikäläinen").display_name(),
            "Maija Meikäläinen"
        );
        assert_eq!(Contact::business(2, "Rakennus Oy", "1234567-8").display_name(), "Rakennus Oy");
        let mut nameless = Contact::person(3, "", "Virtanen");
        nameless.first_name = None;
        assert_eq!(nameless.display_name(), "Virtanen");
    }
}
